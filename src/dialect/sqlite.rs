//! SQLite SQL dialect.
//!
//! SQLite stores guids and datetimes as text and booleans as integers. It
//! cannot widen columns, add foreign keys to an existing table, attach
//! column comments or host stored procedures; those templates are absent.

use crate::core::{DATETIME_FORMAT, DataType, DbError, Result, Value};

use super::{Dialect, QueryKind, RowLimit, Translator, TriggerEvent};

#[derive(Debug, Clone, Default)]
pub struct SqliteTranslator;

impl SqliteTranslator {
    pub fn new() -> Self {
        Self
    }
}

impl Translator for SqliteTranslator {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn template(&self, kind: QueryKind) -> Option<&'static str> {
        Some(match kind {
            QueryKind::Select => "SELECT #FIELDNAMES# FROM #TABLENAME#",
            QueryKind::Count => "SELECT COUNT(#FIELDNAMES#) FROM #TABLENAME#",
            QueryKind::Sum => "SELECT SUM(#FIELDNAMES#) FROM #TABLENAME#",
            QueryKind::Delete => "DELETE FROM #TABLENAME#",
            QueryKind::Exist => "SELECT #FIELDNAMEKEY# FROM #TABLENAME#",
            QueryKind::Insert => "INSERT INTO #TABLENAME# (#FIELDNAMES#) VALUES (#VALUES#)",
            QueryKind::Update => "UPDATE #TABLENAME# SET #ASSIGNMENTS# WHERE #FIELDNAMEKEY# = ?",
            QueryKind::NextKey => "SELECT COALESCE(MAX(#FIELDNAMEKEY#), 0) + 1 FROM #TABLENAME#",
            QueryKind::ExistTable => {
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?"
            }
            QueryKind::CreateTable => concat!(
                "CREATE TABLE #TABLENAME# (",
                "#FIELDNAMEKEY# #KEYTYPE# NOT NULL PRIMARY KEY, ",
                "#CREATEDFIELD# #FIELDTYPE# NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')), ",
                "#CHANGEDFIELD# #FIELDTYPE# NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')))"
            ),
            QueryKind::ChangedTrigger => concat!(
                "CREATE TRIGGER IF NOT EXISTS #NAME# AFTER UPDATE ON #TABLENAME# FOR EACH ROW ",
                "WHEN NEW.#CHANGEDFIELD# = OLD.#CHANGEDFIELD# BEGIN ",
                "UPDATE #TABLENAME# SET #CHANGEDFIELD# = (strftime('%Y-%m-%d %H:%M:%f', 'now')) ",
                "WHERE #FIELDNAMEKEY# = NEW.#FIELDNAMEKEY#; END"
            ),
            QueryKind::GetScheme => {
                "SELECT name, type, NULL, CASE \"notnull\" WHEN 1 THEN 0 ELSE 1 END FROM pragma_table_info(?)"
            }
            QueryKind::CreateField => {
                "ALTER TABLE #TABLENAME# ADD COLUMN #FIELDNAME# #FIELDTYPE##FIELDOPTIONS#"
            }
            QueryKind::DropField => "ALTER TABLE #TABLENAME# DROP COLUMN #FIELDNAME#",
            QueryKind::CreateIndex => "CREATE #UNIQUE#INDEX #NAME# ON #TABLENAME# (#FIELDNAME#)",
            QueryKind::DropIndex => "DROP INDEX IF EXISTS #NAME#",
            QueryKind::ExistView => {
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'view' AND name = ?"
            }
            QueryKind::CreateView => "CREATE VIEW #TABLENAME# AS #QUERY#",
            QueryKind::DropView => "DROP VIEW IF EXISTS #TABLENAME#",
            QueryKind::DropTable => "DROP TABLE #TABLENAME#",
            QueryKind::ExistTrigger => {
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'trigger' AND name = ?"
            }
            QueryKind::CreateTrigger => {
                "CREATE TRIGGER #NAME# #EVENT# ON #TABLENAME# FOR EACH ROW BEGIN #BODY# END"
            }
            QueryKind::DropTrigger => "DROP TRIGGER IF EXISTS #NAME#",
            QueryKind::AlterFieldSize
            | QueryKind::ExistForeignKey
            | QueryKind::CreateForeignKey
            | QueryKind::SetComment
            | QueryKind::GetComment
            | QueryKind::ExistProcedure
            | QueryKind::CreateProcedure
            | QueryKind::DropProcedure => return None,
        })
    }

    fn field_type(&self, data_type: DataType, max_length: u32) -> String {
        match data_type {
            DataType::Enum | DataType::Int32 => "INTEGER".into(),
            DataType::Boolean => "BOOLEAN".into(),
            DataType::Byte => "TINYINT".into(),
            DataType::Int16 => "SMALLINT".into(),
            DataType::Int64 => "BIGINT".into(),
            DataType::Date => "DATE".into(),
            DataType::Time => "TIME".into(),
            DataType::DateTime => "DATETIME".into(),
            DataType::Decimal => "DECIMAL(18,4)".into(),
            DataType::Double => "DOUBLE".into(),
            DataType::Float => "REAL".into(),
            DataType::Guid => "VARCHAR(36)".into(),
            DataType::Binary | DataType::Object => "BLOB".into(),
            DataType::String if max_length > 0 => format!("VARCHAR({})", max_length),
            DataType::String => "TEXT".into(),
        }
    }

    fn row_limit(&self, limit: usize) -> RowLimit {
        RowLimit {
            prefix: String::new(),
            suffix: format!(" LIMIT {}", limit),
        }
    }

    fn trigger_event(&self, event: TriggerEvent) -> Result<&'static str> {
        Ok(match event {
            TriggerEvent::BeforeInsert => "BEFORE INSERT",
            TriggerEvent::AfterInsert => "AFTER INSERT",
            TriggerEvent::BeforeUpdate => "BEFORE UPDATE",
            TriggerEvent::AfterUpdate => "AFTER UPDATE",
            TriggerEvent::BeforeDelete => "BEFORE DELETE",
            TriggerEvent::AfterDelete => "AFTER DELETE",
        })
    }

    fn to_native(&self, value: &Value) -> Value {
        match value {
            Value::Boolean(b) => Value::Integer(i64::from(*b)),
            Value::Guid(g) => Value::Text(g.to_string()),
            Value::DateTime(d) => Value::Text(d.format(DATETIME_FORMAT).to_string()),
            other => other.clone(),
        }
    }

    fn from_native(&self, value: Value, data_type: DataType) -> Result<Value> {
        data_type.coerce(value).map_err(|err| match err {
            DbError::TypeMismatch(msg) => DbError::TypeMismatch(format!("sqlite: {}", msg)),
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_field_types() {
        let t = SqliteTranslator::new();
        assert_eq!(t.field_type(DataType::String, 50), "VARCHAR(50)");
        assert_eq!(t.field_type(DataType::String, 0), "TEXT");
        assert_eq!(t.field_type(DataType::Enum, 0), "INTEGER");
        assert_eq!(t.field_type(DataType::Object, 0), "BLOB");
    }

    #[test]
    fn test_native_conversion_round_trip() {
        let t = SqliteTranslator::new();
        let id = Uuid::new_v4();
        let native = t.to_native(&Value::Guid(id));
        assert_eq!(native, Value::Text(id.to_string()));
        assert_eq!(t.from_native(native, DataType::Guid).unwrap(), Value::Guid(id));
        assert_eq!(t.to_native(&Value::Boolean(true)), Value::Integer(1));
    }

    #[test]
    fn test_unsupported_templates_absent() {
        let t = SqliteTranslator::new();
        assert!(t.template(QueryKind::AlterFieldSize).is_none());
        assert!(t.template(QueryKind::CreateForeignKey).is_none());
        assert!(t.template(QueryKind::CreateProcedure).is_none());
    }

    #[test]
    fn test_row_limit_is_trailing() {
        let limit = SqliteTranslator::new().row_limit(5);
        assert!(limit.prefix.is_empty());
        assert_eq!(limit.suffix, " LIMIT 5");
    }
}
