//! Driver seam.
//!
//! The engine talks to a database exclusively through [`DriverConnection`].
//! SQLite ships in-crate; other dialects plug in their own [`DriverFactory`].

pub mod sqlite;

use std::fmt;

use crate::connection::Configuration;
use crate::core::{Result, Row, Value};
use crate::result::QueryResult;

pub use sqlite::{SqliteDriver, SqliteDriverFactory};

/// A finished statement with positional parameters in binding order.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub sql: String,
    pub parameters: Vec<Value>,
}

impl Command {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameters(sql: impl Into<String>, parameters: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            parameters,
        }
    }

    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.parameters.push(value.into());
        self
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)?;
        if !self.parameters.is_empty() {
            let params: Vec<String> = self.parameters.iter().map(|p| p.to_string()).collect();
            write!(f, " [{}]", params.join(", "))?;
        }
        Ok(())
    }
}

/// Forward-only row source.
pub trait RowCursor: Send {
    fn columns(&self) -> &[String];

    fn next_row(&mut self) -> Result<Option<Row>>;
}

/// A native database connection.
pub trait DriverConnection: Send {
    /// Runs a statement and returns the affected row count.
    fn execute(&mut self, command: &Command) -> Result<u64>;

    fn query(&mut self, command: &Command) -> Result<QueryResult>;

    fn query_scalar(&mut self, command: &Command) -> Result<Option<Value>> {
        let result = self.query(command)?;
        Ok(result.first_value().cloned())
    }

    /// Opens a forward reader, or `None` if the driver cannot produce one.
    fn open_cursor(&mut self, command: &Command) -> Result<Option<Box<dyn RowCursor>>>;

    fn begin(&mut self) -> Result<()>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

pub trait DriverFactory: Send + Sync {
    fn connect(&self, config: &Configuration) -> Result<Box<dyn DriverConnection>>;
}
