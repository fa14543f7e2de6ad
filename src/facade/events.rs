use std::any::Any;
use std::sync::{Arc, Mutex};

use crate::core::{Result, Value};
use crate::meta::{ChangeKind, Entity, TypeId};

/// Notification that a record was created, changed or deleted.
#[derive(Debug, Clone)]
pub struct DomainEvent {
    pub kind: ChangeKind,
    pub type_name: String,
    pub type_id: TypeId,
    pub key: Value,
    pub record: Arc<dyn Any + Send + Sync>,
}

impl DomainEvent {
    pub fn new<T: Entity>(kind: ChangeKind, record: &T) -> Self {
        let description = T::description();
        Self {
            kind,
            type_name: description.type_name.clone(),
            type_id: description.type_id,
            key: record.key(),
            record: Arc::new(record.clone()),
        }
    }

    /// The record snapshot, if it is a `T`.
    pub fn record<T: Entity>(&self) -> Option<&T> {
        self.record.downcast_ref::<T>()
    }
}

/// Process-wide sink for domain events.
pub trait EventHub: Send + Sync {
    fn deliver(&self, event: &DomainEvent) -> Result<()>;
}

/// Event hub that keeps every delivered event in order.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<DomainEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Result<Vec<DomainEvent>> {
        Ok(self.events.lock()?.clone())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.events.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.events.lock()?.is_empty())
    }

    pub fn clear(&self) -> Result<()> {
        self.events.lock()?.clear();
        Ok(())
    }
}

impl EventHub for EventLog {
    fn deliver(&self, event: &DomainEvent) -> Result<()> {
        self.events.lock()?.push(event.clone());
        Ok(())
    }
}
