use std::collections::VecDeque;
use std::sync::Mutex;

use log::debug;
use rusqlite::{OpenFlags, params_from_iter};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use uuid::Uuid;

use crate::connection::Configuration;
use crate::core::{DATETIME_FORMAT, DbError, Result, Row, Value};
use crate::result::QueryResult;

use super::{Command, DriverConnection, DriverFactory, RowCursor};

pub const MEMORY_PATH: &str = ":memory:";

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Integer(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Float(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Boolean(b) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Guid(g) => ToSqlOutput::Owned(SqlValue::Text(g.to_string())),
            Value::DateTime(d) => {
                ToSqlOutput::Owned(SqlValue::Text(d.format(DATETIME_FORMAT).to_string()))
            }
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

fn open_uri_connection(uri: &str) -> Result<rusqlite::Connection> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    Ok(rusqlite::Connection::open_with_flags(uri, flags)?)
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}

/// rusqlite-backed driver connection.
pub struct SqliteDriver {
    conn: Option<rusqlite::Connection>,
}

impl SqliteDriver {
    /// Open a file database, or a private one for `:memory:`
    pub fn open(path: &str) -> Result<Self> {
        let conn = if path == MEMORY_PATH {
            rusqlite::Connection::open_in_memory()?
        } else {
            rusqlite::Connection::open(path)?
        };
        Self::prepared(conn, path)
    }

    /// Open a `file:` URI, e.g. a named shared-cache memory database
    pub fn open_uri(uri: &str) -> Result<Self> {
        Self::prepared(open_uri_connection(uri)?, uri)
    }

    fn prepared(conn: rusqlite::Connection, path: &str) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        debug!("Opened SQLite database at {}", path);
        Ok(Self { conn: Some(conn) })
    }

    fn conn(&self) -> Result<&rusqlite::Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| DbError::Driver("SQLite connection is closed".into()))
    }

    fn run_query(&self, command: &Command) -> Result<QueryResult> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&command.sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query(params_from_iter(command.parameters.iter()))?;
        while let Some(row) = cursor.next()? {
            let mut values: Row = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_value_ref(row.get_ref(i)?));
            }
            rows.push(values);
        }

        Ok(QueryResult::new(columns, rows))
    }
}

impl DriverConnection for SqliteDriver {
    fn execute(&mut self, command: &Command) -> Result<u64> {
        let conn = self.conn()?;
        if command.parameters.is_empty() {
            // Batch mode accepts multi-statement DDL.
            conn.execute_batch(&command.sql)?;
            return Ok(conn.changes() as u64);
        }
        let affected = conn.execute(&command.sql, params_from_iter(command.parameters.iter()))?;
        Ok(affected as u64)
    }

    fn query(&mut self, command: &Command) -> Result<QueryResult> {
        self.run_query(command)
    }

    fn open_cursor(&mut self, command: &Command) -> Result<Option<Box<dyn RowCursor>>> {
        // Statements borrow the connection, so rows are buffered up front.
        let result = self.run_query(command)?;
        Ok(Some(Box::new(BufferedCursor {
            columns: result.columns,
            rows: result.rows.into(),
        })))
    }

    fn begin(&mut self) -> Result<()> {
        self.conn()?.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.conn()?.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.conn()?.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, err)| DbError::from(err))?;
        }
        Ok(())
    }
}

struct BufferedCursor {
    columns: Vec<String>,
    rows: VecDeque<Row>,
}

impl RowCursor for BufferedCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        Ok(self.rows.pop_front())
    }
}

/// Opens one SQLite connection per engine connection.
///
/// `:memory:` maps to a named shared-cache database owned by the factory.
/// An anchor connection keeps it alive while no engine connection is open,
/// so every connection of one `Database` sees the same tables.
#[derive(Debug, Default)]
pub struct SqliteDriverFactory {
    memory: Mutex<Option<MemoryAnchor>>,
}

#[derive(Debug)]
struct MemoryAnchor {
    uri: String,
    _conn: rusqlite::Connection,
}

impl SqliteDriverFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn memory_uri(&self) -> Result<String> {
        let mut memory = self.memory.lock()?;
        if let Some(anchor) = memory.as_ref() {
            return Ok(anchor.uri.clone());
        }

        let uri = format!(
            "file:dbweave-{}?mode=memory&cache=shared",
            Uuid::new_v4().simple()
        );
        let conn = open_uri_connection(&uri)?;
        debug!("Anchored shared in-memory database {}", uri);
        *memory = Some(MemoryAnchor {
            uri: uri.clone(),
            _conn: conn,
        });
        Ok(uri)
    }
}

impl DriverFactory for SqliteDriverFactory {
    fn connect(&self, config: &Configuration) -> Result<Box<dyn DriverConnection>> {
        let driver = if config.connection_string == MEMORY_PATH {
            SqliteDriver::open_uri(&self.memory_uri()?)?
        } else {
            SqliteDriver::open(&config.connection_string)?
        };
        Ok(Box::new(driver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_execute_and_query() {
        let mut driver = SqliteDriver::open(":memory:").unwrap();
        driver
            .execute(&Command::new("CREATE TABLE t (id INTEGER, name TEXT, flag BOOLEAN)"))
            .unwrap();
        let affected = driver
            .execute(
                &Command::new("INSERT INTO t VALUES (?, ?, ?)")
                    .bind(1)
                    .bind("one")
                    .bind(true),
            )
            .unwrap();
        assert_eq!(affected, 1);

        let result = driver.query(&Command::new("SELECT id, name, flag FROM t")).unwrap();
        assert_eq!(result.columns, vec!["id", "name", "flag"]);
        assert_eq!(
            result.rows,
            vec![vec![Value::Integer(1), Value::Text("one".into()), Value::Integer(1)]]
        );
    }

    #[test]
    fn test_guid_parameter_is_text() {
        let mut driver = SqliteDriver::open(":memory:").unwrap();
        let id = Uuid::new_v4();
        let value = driver
            .query_scalar(&Command::new("SELECT ?").bind(id))
            .unwrap();
        assert_eq!(value, Some(Value::Text(id.to_string())));
    }

    #[test]
    fn test_rollback_discards_writes() {
        let mut driver = SqliteDriver::open(":memory:").unwrap();
        driver.execute(&Command::new("CREATE TABLE t (id INTEGER)")).unwrap();
        driver.begin().unwrap();
        driver.execute(&Command::new("INSERT INTO t VALUES (?)").bind(1)).unwrap();
        driver.rollback().unwrap();

        let count = driver.query_scalar(&Command::new("SELECT COUNT(*) FROM t")).unwrap();
        assert_eq!(count, Some(Value::Integer(0)));
    }

    #[test]
    fn test_cursor_yields_rows_in_order() {
        let mut driver = SqliteDriver::open(":memory:").unwrap();
        driver
            .execute(&Command::new(
                "CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (1); INSERT INTO t VALUES (2);",
            ))
            .unwrap();
        let mut cursor = driver
            .open_cursor(&Command::new("SELECT id FROM t ORDER BY id"))
            .unwrap()
            .unwrap();
        assert_eq!(cursor.next_row().unwrap(), Some(vec![Value::Integer(1)]));
        assert_eq!(cursor.next_row().unwrap(), Some(vec![Value::Integer(2)]));
        assert_eq!(cursor.next_row().unwrap(), None);
    }

    #[test]
    fn test_factory_shares_memory_database() {
        let factory = SqliteDriverFactory::new();
        let config = Configuration::sqlite(MEMORY_PATH);

        let mut first = factory.connect(&config).unwrap();
        first.execute(&Command::new("CREATE TABLE t (id INTEGER)")).unwrap();
        first.execute(&Command::new("INSERT INTO t VALUES (?)").bind(7)).unwrap();
        first.close().unwrap();

        let mut second = factory.connect(&config).unwrap();
        let value = second.query_scalar(&Command::new("SELECT id FROM t")).unwrap();
        assert_eq!(value, Some(Value::Integer(7)));

        // Another factory gets its own database.
        let mut other = SqliteDriverFactory::new().connect(&config).unwrap();
        assert!(other.query(&Command::new("SELECT id FROM t")).is_err());
    }

    #[test]
    fn test_closed_driver_reports_error() {
        let mut driver = SqliteDriver::open(":memory:").unwrap();
        driver.close().unwrap();
        assert!(matches!(
            driver.query(&Command::new("SELECT 1")),
            Err(DbError::Driver(_))
        ));
    }
}
