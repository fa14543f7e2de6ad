use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use uuid::Uuid;

use crate::core::{DbError, Result, Value};
use crate::facade::{DomainEvent, EventHub};
use crate::meta::TypeId;

use super::Connection;

/// An open transaction and the events it holds back until commit.
pub(crate) struct ActiveTransaction {
    id: Uuid,
    pending: Mutex<VecDeque<DomainEvent>>,
    /// Cache entries written inside the transaction; evicted on rollback.
    cached: Mutex<Vec<(TypeId, Value)>>,
}

impl ActiveTransaction {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            pending: Mutex::new(VecDeque::new()),
            cached: Mutex::new(Vec::new()),
        }
    }

    fn enqueue(&self, event: DomainEvent) -> Result<()> {
        self.pending.lock()?.push_back(event);
        Ok(())
    }

    fn drain(&self) -> Result<Vec<DomainEvent>> {
        Ok(self.pending.lock()?.drain(..).collect())
    }

    /// Hands the pending events to `hub` in order, holding the queue lock
    /// for the whole delivery. Events after a failed one are dropped.
    fn deliver(&self, hub: Option<&Arc<dyn EventHub>>) -> Result<usize> {
        let mut pending = self.pending.lock()?;
        let count = pending.len();
        let Some(hub) = hub else {
            pending.clear();
            return Ok(count);
        };
        while let Some(event) = pending.pop_front() {
            if let Err(err) = hub.deliver(&event) {
                pending.clear();
                return Err(err);
            }
        }
        Ok(count)
    }

    fn remember_cached(&self, type_id: TypeId, key: Value) -> Result<()> {
        self.cached.lock()?.push((type_id, key));
        Ok(())
    }
}

impl Connection {
    /// Begin a new transaction
    ///
    /// # Examples
    ///
    /// ```ignore
    /// conn.begin_transaction()?;
    /// conn.save(&mut first)?;
    /// conn.save(&mut second)?;
    /// conn.commit_transaction()?; // both events are delivered here, in order
    /// ```
    pub fn begin_transaction(&mut self) -> Result<()> {
        if self.transaction.is_some() {
            return Err(DbError::Transaction("Transaction already active".into()));
        }

        self.driver_mut()?.begin()?;
        let transaction = ActiveTransaction::new();
        debug!("Connection {} began transaction {}", self.id, transaction.id);
        self.transaction = Some(transaction);
        Ok(())
    }

    /// Commit the current transaction, then deliver its buffered events in
    /// the order they were recorded
    pub fn commit_transaction(&mut self) -> Result<()> {
        let Some(transaction) = self.transaction.as_ref() else {
            return Err(DbError::Transaction("No active transaction".into()));
        };
        let id = transaction.id;

        let driver = self
            .driver
            .as_deref_mut()
            .ok_or_else(|| DbError::Commit(Box::new(DbError::Transaction("Connection is closed".into()))))?;
        driver.commit().map_err(|err| DbError::Commit(Box::new(err)))?;

        // The driver transaction is gone; the reference goes with it.
        let Some(transaction) = self.transaction.take() else {
            return Ok(());
        };
        let delivered = transaction
            .deliver(self.db.events())
            .map_err(|err| DbError::Commit(Box::new(err)))?;
        debug!(
            "Connection {} committed transaction {}, delivered {} event(s)",
            self.id, id, delivered
        );
        Ok(())
    }

    /// Roll back the current transaction and discard its buffered events
    pub fn rollback_transaction(&mut self) -> Result<()> {
        let Some(transaction) = self.transaction.take() else {
            return Err(DbError::Transaction("No active transaction".into()));
        };

        let discarded = transaction.drain().map(|e| e.len()).unwrap_or(0);
        debug!(
            "Connection {} rolled back transaction {}, discarding {} event(s)",
            self.id, transaction.id, discarded
        );

        let cached = transaction
            .cached
            .lock()
            .map(|mut c| std::mem::take(&mut *c))
            .unwrap_or_default();
        for (type_id, key) in &cached {
            if let Err(err) = self.db.cache().evict(*type_id, key) {
                warn!("Could not evict rolled back record {}: {}", key, err);
            }
        }

        let driver = self.driver_mut()?;
        driver.rollback().map_err(|err| {
            warn!("Rollback of transaction {} failed: {}", transaction.id, err);
            DbError::Transaction(format!("Rollback failed: {}", err))
        })
    }

    /// Notes a cache write so a rollback can undo it.
    pub(crate) fn track_cached(&self, type_id: TypeId, key: &Value) -> Result<()> {
        match &self.transaction {
            Some(transaction) => transaction.remember_cached(type_id, key.clone()),
            None => Ok(()),
        }
    }

    /// Delivers `event` now, or queues it while a transaction is open.
    pub(crate) fn publish(&mut self, event: DomainEvent) -> Result<()> {
        if self.silent {
            return Ok(());
        }

        match &self.transaction {
            Some(transaction) => transaction.enqueue(event),
            None => match self.db.events() {
                Some(hub) => hub.deliver(&event),
                None => Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::EventLog;
    use crate::meta::ChangeKind;

    fn event(key: i64) -> DomainEvent {
        DomainEvent {
            kind: ChangeKind::Created,
            type_name: "Note".into(),
            type_id: 42,
            key: Value::Integer(key),
            record: Arc::new(key),
        }
    }

    struct RejectSecond {
        seen: Mutex<Vec<Value>>,
    }

    impl EventHub for RejectSecond {
        fn deliver(&self, event: &DomainEvent) -> Result<()> {
            let mut seen = self.seen.lock()?;
            if seen.len() == 1 {
                return Err(DbError::Transaction("hub is full".into()));
            }
            seen.push(event.key.clone());
            Ok(())
        }
    }

    #[test]
    fn test_deliver_preserves_order_and_empties_queue() {
        let transaction = ActiveTransaction::new();
        for key in 1..=3 {
            transaction.enqueue(event(key)).unwrap();
        }

        let log = Arc::new(EventLog::new());
        let hub: Arc<dyn EventHub> = log.clone();
        assert_eq!(transaction.deliver(Some(&hub)).unwrap(), 3);

        let keys: Vec<Value> = log.events().unwrap().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
        assert!(transaction.drain().unwrap().is_empty());
    }

    #[test]
    fn test_delivery_failure_drops_remaining_events() {
        let transaction = ActiveTransaction::new();
        for key in 1..=3 {
            transaction.enqueue(event(key)).unwrap();
        }

        let reject = Arc::new(RejectSecond {
            seen: Mutex::new(Vec::new()),
        });
        let hub: Arc<dyn EventHub> = reject.clone();
        assert!(transaction.deliver(Some(&hub)).is_err());
        assert_eq!(*reject.seen.lock().unwrap(), vec![Value::Integer(1)]);
        assert!(transaction.drain().unwrap().is_empty());
    }

    #[test]
    fn test_deliver_without_hub_discards() {
        let transaction = ActiveTransaction::new();
        transaction.enqueue(event(1)).unwrap();
        assert_eq!(transaction.deliver(None).unwrap(), 1);
        assert!(transaction.drain().unwrap().is_empty());
    }
}
