// ============================================================================
// Connection Engine
// ============================================================================
//
// One `Connection` is one unit of work: it owns a driver connection, the
// optional active transaction with its pending event queue, and the silent
// flag. Operations are split by concern:
//
//   query.rs        command building, row mapping, traced execution
//   crud.rs         save / delete / load / reload / exist / is_unique
//   select.rs       select variants and aggregates
//   transaction.rs  begin / commit / rollback and event delivery
//   schema.rs       schema synchronization and DDL
//   ledger.rs       per-type schema version ledger
//   reader.rs       forward-only typed reader
//
// ============================================================================

pub mod config;
mod crud;
pub mod ledger;
pub mod options;
mod query;
pub mod reader;
mod schema;
mod select;
mod transaction;

use log::{debug, warn};

use crate::core::{DbError, Result};
use crate::driver::DriverConnection;
use crate::facade::Database;

pub use config::{ConflictPolicy, Configuration};
pub use ledger::SystemDatabaseInformation;
pub use options::{OrderMode, ReadOptions, RecordFilter, SaveOptions};
pub use reader::ForwardReader;

use transaction::ActiveTransaction;

/// Database connection handle
///
/// Not safe for concurrent use; run one connection per thread.
pub struct Connection {
    /// Unique connection ID
    id: u64,
    /// Shared database facade
    db: Database,
    /// Native connection, `None` once closed
    driver: Option<Box<dyn DriverConnection>>,
    /// Active transaction (if any)
    transaction: Option<ActiveTransaction>,
    /// Suppresses events and change logging
    silent: bool,
    /// Whether the schema ledger table is known to exist
    ledger_ready: bool,
}

impl Connection {
    pub(crate) fn open(db: Database, id: u64) -> Result<Self> {
        let driver = db.driver_factory().connect(db.config())?;
        debug!("Connection {} opened", id);
        Ok(Self {
            id,
            db,
            driver: Some(driver),
            transaction: None,
            silent: false,
            ledger_ready: false,
        })
    }

    /// Get connection ID
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Check if connection is active
    pub fn is_active(&self) -> bool {
        self.driver.is_some()
    }

    /// Check if connection is in a transaction
    pub fn is_in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// Suppress domain events and change logging for subsequent operations
    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    /// Close the connection, rolling back an open transaction first
    pub fn close(&mut self) -> Result<()> {
        if self.transaction.is_some() {
            self.rollback_transaction()?;
        }

        if let Some(mut driver) = self.driver.take() {
            driver.close()?;
            debug!("Connection {} closed", self.id);
        }
        Ok(())
    }

    pub(crate) fn driver_mut(&mut self) -> Result<&mut (dyn DriverConnection + 'static)> {
        self.driver
            .as_deref_mut()
            .ok_or_else(|| DbError::Transaction("Connection is closed".into()))
    }

    /// Runs `op` with the silent flag raised, restoring it afterwards.
    pub(crate) fn silently<R>(&mut self, op: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        let previous = self.silent;
        self.silent = true;
        let result = op(self);
        self.silent = previous;
        result
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Ensure connection is closed and transaction rolled back
        if let Err(err) = self.close() {
            warn!("Connection {} did not close cleanly: {}", self.id, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Configuration;

    fn create_test_connection() -> Connection {
        let db = Database::open(Configuration::default()).unwrap();
        db.get_connection().unwrap()
    }

    #[test]
    fn test_connection_creation() {
        let conn = create_test_connection();
        assert!(conn.is_active());
        assert!(!conn.is_in_transaction());
        assert!(!conn.is_silent());
    }

    #[test]
    fn test_transaction_lifecycle() {
        let mut conn = create_test_connection();

        assert!(conn.begin_transaction().is_ok());
        assert!(conn.is_in_transaction());
        assert!(matches!(conn.begin_transaction(), Err(DbError::Transaction(_))));

        assert!(conn.commit_transaction().is_ok());
        assert!(!conn.is_in_transaction());
    }

    #[test]
    fn test_transaction_rollback() {
        let mut conn = create_test_connection();

        assert!(conn.begin_transaction().is_ok());
        assert!(conn.rollback_transaction().is_ok());
        assert!(!conn.is_in_transaction());
        assert!(matches!(conn.rollback_transaction(), Err(DbError::Transaction(_))));
    }

    #[test]
    fn test_connection_close() {
        let mut conn = create_test_connection();
        conn.begin_transaction().unwrap();

        assert!(conn.close().is_ok());
        assert!(!conn.is_active());
        assert!(!conn.is_in_transaction());

        // Should fail after close
        assert!(conn.query_raw("SELECT 1", &[]).is_err());
        assert!(matches!(conn.begin_transaction(), Err(DbError::Transaction(_))));
    }

    #[test]
    fn test_silently_restores_flag() {
        let mut conn = create_test_connection();
        let seen = conn.silently(|c| Ok(c.is_silent())).unwrap();
        assert!(seen);
        assert!(!conn.is_silent());
    }
}
