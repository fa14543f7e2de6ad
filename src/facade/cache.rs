use std::any::Any;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::core::{Result, Value};
use crate::meta::TypeId;

/// A cached record, downcast back to its concrete type on read.
pub type CachedRecord = Arc<dyn Any + Send + Sync>;

/// Process-wide record cache shared by every connection of a database.
pub trait EntityCache: Send + Sync {
    fn get(&self, type_id: TypeId, key: &Value) -> Result<Option<CachedRecord>>;

    fn put(&self, type_id: TypeId, key: Value, record: CachedRecord) -> Result<()>;

    fn evict(&self, type_id: TypeId, key: &Value) -> Result<()>;

    /// Drops every entry of one type.
    fn evict_type(&self, type_id: TypeId) -> Result<()>;

    fn clear(&self) -> Result<()>;
}

/// Bounded least-recently-used cache.
pub struct LruEntityCache {
    entries: Mutex<LruCache<(TypeId, Value), CachedRecord>>,
}

impl LruEntityCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.entries.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.entries.lock()?.is_empty())
    }
}

impl EntityCache for LruEntityCache {
    fn get(&self, type_id: TypeId, key: &Value) -> Result<Option<CachedRecord>> {
        let mut entries = self.entries.lock()?;
        Ok(entries.get(&(type_id, key.clone())).cloned())
    }

    fn put(&self, type_id: TypeId, key: Value, record: CachedRecord) -> Result<()> {
        self.entries.lock()?.put((type_id, key), record);
        Ok(())
    }

    fn evict(&self, type_id: TypeId, key: &Value) -> Result<()> {
        self.entries.lock()?.pop(&(type_id, key.clone()));
        Ok(())
    }

    fn evict_type(&self, type_id: TypeId) -> Result<()> {
        let mut entries = self.entries.lock()?;
        let stale: Vec<(TypeId, Value)> = entries
            .iter()
            .filter(|((id, _), _)| *id == type_id)
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            entries.pop(&key);
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.lock()?.clear();
        Ok(())
    }
}
