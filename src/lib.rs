// ============================================================================
// dbweave Library
// ============================================================================
//
// A synchronous data-access engine: typed records described by static
// metadata, dialect SQL templates, change-tracked saves, transactional event
// buffering and versioned schema synchronization.
//
// ============================================================================

pub mod connection;
pub mod core;
pub mod dialect;
pub mod driver;
pub mod facade;
pub mod meta;
pub mod result;

pub use core::{DataType, DbError, FromValue, Result, Row, Value};
pub use result::QueryResult;

pub use connection::{
    Configuration, ConflictPolicy, Connection, ForwardReader, OrderMode, ReadOptions,
    RecordFilter, SaveOptions, SystemDatabaseInformation,
};
pub use dialect::{Dialect, QueryKind, Translator, TriggerEvent};
pub use driver::{Command, DriverConnection, DriverFactory, RowCursor};
pub use facade::{
    ChangeLogger, Database, DatabaseBuilder, DatabaseHooks, DomainEvent, EntityCache, EventHub,
    EventLog, ExecutionTrace, LogChangeLogger, LruEntityCache, LruQueryBuffer, MemoryChangeLog,
    QueryBuffer,
};
pub use meta::{
    ChangeInformation, ChangeKind, Entity, FieldChange, ForeignKeyAction, ModelInfo,
    PropertyDescription, RecordState, TypeDescription, TypeId,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_query() {
        let db = Database::open(Configuration::default()).unwrap();
        let mut conn = db.get_connection().unwrap();
        let result = conn.query_raw("SELECT 1 AS one", &[]).unwrap();
        assert_eq!(result.columns, vec!["one"]);
        assert_eq!(result.first_value(), Some(&Value::Integer(1)));
    }
}
