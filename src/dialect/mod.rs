//! SQL dialects (Strategy pattern).
//!
//! A [`Translator`] owns everything that differs between database engines:
//! the SQL template for each logical operation, DDL type names, row-limit
//! syntax, trigger event keywords and value conversion to and from the
//! driver's native representation.

pub mod mssql;
pub mod postgres;
pub mod sqlite;
pub mod template;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::{DataType, DbError, Result, Value};
use crate::result::QueryResult;

pub use mssql::SqlServerTranslator;
pub use postgres::PostgresTranslator;
pub use sqlite::SqliteTranslator;
pub use template::{Bindings, Placeholder, SqlTemplate, quote_literal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sqlite,
    Postgres,
    SqlServer,
}

impl Dialect {
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "sqlite" => Some(Self::Sqlite),
            "postgres" | "postgresql" => Some(Self::Postgres),
            "sqlserver" | "mssql" => Some(Self::SqlServer),
            _ => None,
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::SqlServer => "sqlserver",
        }
    }

    pub fn translator(&self) -> Arc<dyn Translator> {
        match self {
            Self::Sqlite => Arc::new(SqliteTranslator::new()),
            Self::Postgres => Arc::new(PostgresTranslator::new()),
            Self::SqlServer => Arc::new(SqlServerTranslator::new()),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.scheme())
    }
}

/// Logical operation a template is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Select,
    Count,
    Sum,
    Delete,
    Exist,
    Insert,
    Update,
    NextKey,
    ExistTable,
    CreateTable,
    DropTable,
    ChangedTrigger,
    GetScheme,
    CreateField,
    AlterFieldSize,
    DropField,
    CreateIndex,
    DropIndex,
    ExistForeignKey,
    CreateForeignKey,
    ExistView,
    CreateView,
    DropView,
    SetComment,
    GetComment,
    ExistTrigger,
    CreateTrigger,
    DropTrigger,
    ExistProcedure,
    CreateProcedure,
    DropProcedure,
}

impl QueryKind {
    /// Operations built by the read/delete query pipeline.
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            Self::Select | Self::Count | Self::Sum | Self::Delete | Self::Exist
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerEvent {
    BeforeInsert,
    AfterInsert,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
}

/// Row-limit fragments: `prefix` fills the `#TOP#` slot, `suffix` is
/// appended after the rest of the statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowLimit {
    pub prefix: String,
    pub suffix: String,
}

/// One live column as reported by the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnScheme {
    pub name: String,
    pub type_name: String,
    pub size: Option<u32>,
    pub nullable: bool,
}

pub trait Translator: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Template for `kind`, or `None` if the dialect cannot express it.
    fn template(&self, kind: QueryKind) -> Option<&'static str>;

    /// DDL type fragment for a declared field type.
    fn field_type(&self, data_type: DataType, max_length: u32) -> String;

    fn row_limit(&self, limit: usize) -> RowLimit;

    fn trigger_event(&self, event: TriggerEvent) -> Result<&'static str>;

    /// Converts a domain value into what the driver expects as a parameter.
    fn to_native(&self, value: &Value) -> Value {
        value.clone()
    }

    /// Converts a raw driver value into the domain representation of `data_type`.
    fn from_native(&self, value: Value, data_type: DataType) -> Result<Value> {
        data_type.coerce(value)
    }

    /// Final rewrite applied to every generated statement (parameter markers).
    fn finalize(&self, sql: String) -> String {
        sql
    }

    /// Statement appended to bulk deletes when the dialect reports the
    /// deleted row count through a scalar result rather than the command's
    /// affected-row count.
    fn delete_count_scalar(&self) -> Option<&'static str> {
        None
    }

    /// Whether a one-row select with descending order must be issued with a
    /// larger cap and truncated client-side.
    fn caps_descending_single_row(&self) -> bool {
        false
    }

    /// Builds column descriptions from a `GetScheme` result with the columns
    /// `(name, type, size, nullable)`.
    fn read_scheme(&self, result: &QueryResult) -> Result<Vec<ColumnScheme>> {
        result
            .rows
            .iter()
            .map(|row| {
                let name = row
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(|| DbError::Driver("Scheme row lacks a column name".into()))?
                    .to_string();
                let type_name = row.get(1).map(|v| v.to_string()).unwrap_or_default();
                let size = row
                    .get(2)
                    .and_then(Value::as_i64)
                    .and_then(|s| u32::try_from(s).ok())
                    .or_else(|| declared_size(&type_name));
                let nullable = row.get(3).map_or(true, Value::as_bool);
                Ok(ColumnScheme {
                    name,
                    type_name,
                    size,
                    nullable,
                })
            })
            .collect()
    }
}

/// Extracts `n` from type names such as `VARCHAR(n)`.
pub fn declared_size(type_name: &str) -> Option<u32> {
    let open = type_name.find('(')?;
    let close = type_name[open..].find(')')? + open;
    type_name[open + 1..close]
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

/// Rewrites `?` markers into numbered `$n` markers, leaving string literals
/// and quoted identifiers untouched.
pub fn number_parameters(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut index = 0;
    let mut quote: Option<char> = None;

    for c in sql.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                out.push(c);
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    out.push(c);
                }
                '?' => {
                    index += 1;
                    out.push('$');
                    out.push_str(&index.to_string());
                }
                _ => out.push(c),
            },
        }
    }

    out
}
