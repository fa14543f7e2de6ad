use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::core::Result;

/// Store of fully expanded SQL templates, keyed by buffered query id.
pub trait QueryBuffer: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<String>>;

    fn put(&self, id: &str, sql: String) -> Result<()>;
}

pub struct LruQueryBuffer {
    entries: Mutex<LruCache<String, String>>,
}

impl LruQueryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl QueryBuffer for LruQueryBuffer {
    fn get(&self, id: &str) -> Result<Option<String>> {
        Ok(self.entries.lock()?.get(id).cloned())
    }

    fn put(&self, id: &str, sql: String) -> Result<()> {
        self.entries.lock()?.put(id.to_string(), sql);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_round_trip() {
        let buffer = LruQueryBuffer::new(2);
        buffer.put("a", "SELECT 1".into()).unwrap();
        assert_eq!(buffer.get("a").unwrap().as_deref(), Some("SELECT 1"));
        assert_eq!(buffer.get("b").unwrap(), None);
    }
}
