//! SQL Server dialect.
//!
//! Row limits are a `TOP n` prefix, and bulk deletes report their count
//! through `@@ROWCOUNT`.

use crate::core::{DataType, DbError, Result};

use super::{Dialect, QueryKind, RowLimit, Translator, TriggerEvent};

#[derive(Debug, Clone, Default)]
pub struct SqlServerTranslator;

impl SqlServerTranslator {
    pub fn new() -> Self {
        Self
    }
}

impl Translator for SqlServerTranslator {
    fn dialect(&self) -> Dialect {
        Dialect::SqlServer
    }

    fn template(&self, kind: QueryKind) -> Option<&'static str> {
        Some(match kind {
            QueryKind::Select => "SELECT #TOP##FIELDNAMES# FROM #TABLENAME#",
            QueryKind::Count => "SELECT COUNT(#FIELDNAMES#) FROM #TABLENAME#",
            QueryKind::Sum => "SELECT SUM(#FIELDNAMES#) FROM #TABLENAME#",
            QueryKind::Delete => "DELETE FROM #TABLENAME#",
            QueryKind::Exist => "SELECT #TOP##FIELDNAMEKEY# FROM #TABLENAME#",
            QueryKind::Insert => "INSERT INTO #TABLENAME# (#FIELDNAMES#) VALUES (#VALUES#)",
            QueryKind::Update => "UPDATE #TABLENAME# SET #ASSIGNMENTS# WHERE #FIELDNAMEKEY# = ?",
            QueryKind::NextKey => "SELECT COALESCE(MAX(#FIELDNAMEKEY#), 0) + 1 FROM #TABLENAME#",
            QueryKind::ExistTable => {
                "SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_TYPE = 'BASE TABLE' AND TABLE_NAME = ?"
            }
            QueryKind::CreateTable => concat!(
                "CREATE TABLE #TABLENAME# (",
                "#FIELDNAMEKEY# #KEYTYPE# NOT NULL PRIMARY KEY, ",
                "#CREATEDFIELD# #FIELDTYPE# NOT NULL DEFAULT SYSDATETIME(), ",
                "#CHANGEDFIELD# #FIELDTYPE# NOT NULL DEFAULT SYSDATETIME())"
            ),
            QueryKind::ChangedTrigger => concat!(
                "CREATE TRIGGER #NAME# ON #TABLENAME# AFTER UPDATE AS BEGIN SET NOCOUNT ON; ",
                "IF NOT UPDATE(#CHANGEDFIELD#) UPDATE t SET #CHANGEDFIELD# = SYSDATETIME() ",
                "FROM #TABLENAME# t INNER JOIN inserted i ON t.#FIELDNAMEKEY# = i.#FIELDNAMEKEY# END"
            ),
            QueryKind::DropTable => "DROP TABLE #TABLENAME#",
            QueryKind::GetScheme => concat!(
                "SELECT COLUMN_NAME, DATA_TYPE, CHARACTER_MAXIMUM_LENGTH, ",
                "CASE IS_NULLABLE WHEN 'YES' THEN 1 ELSE 0 END ",
                "FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_NAME = ? ORDER BY ORDINAL_POSITION"
            ),
            QueryKind::CreateField => "ALTER TABLE #TABLENAME# ADD #FIELDNAME# #FIELDTYPE##FIELDOPTIONS#",
            QueryKind::AlterFieldSize => {
                "ALTER TABLE #TABLENAME# ALTER COLUMN #FIELDNAME# nvarchar(#SIZE#)"
            }
            QueryKind::DropField => "ALTER TABLE #TABLENAME# DROP COLUMN #FIELDNAME#",
            QueryKind::CreateIndex => "CREATE #UNIQUE#INDEX #NAME# ON #TABLENAME# (#FIELDNAME#)",
            QueryKind::DropIndex => "DROP INDEX IF EXISTS #NAME# ON #TABLENAME#",
            QueryKind::ExistForeignKey => "SELECT COUNT(*) FROM sys.foreign_keys WHERE name = ?",
            QueryKind::CreateForeignKey => concat!(
                "ALTER TABLE #TABLENAME# ADD CONSTRAINT #NAME# FOREIGN KEY (#FIELDNAME#) ",
                "REFERENCES #REFTABLE# (#REFFIELD#) ON UPDATE #ONUPDATE# ON DELETE #ONDELETE#"
            ),
            QueryKind::ExistView => "SELECT COUNT(*) FROM INFORMATION_SCHEMA.VIEWS WHERE TABLE_NAME = ?",
            QueryKind::CreateView => "CREATE VIEW #TABLENAME# AS #QUERY#",
            QueryKind::DropView => "DROP VIEW IF EXISTS #TABLENAME#",
            QueryKind::SetComment => concat!(
                "EXEC sp_addextendedproperty 'MS_Description', #COMMENT#, ",
                "'SCHEMA', 'dbo', 'TABLE', '#TABLENAME#', 'COLUMN', '#FIELDNAME#'"
            ),
            QueryKind::GetComment => concat!(
                "SELECT CAST(value AS nvarchar(4000)) FROM fn_listextendedproperty(",
                "'MS_Description', 'SCHEMA', 'dbo', 'TABLE', ?, 'COLUMN', ?)"
            ),
            QueryKind::ExistTrigger => "SELECT COUNT(*) FROM sys.triggers WHERE name = ?",
            QueryKind::CreateTrigger => "CREATE TRIGGER #NAME# ON #TABLENAME# #EVENT# AS BEGIN #BODY# END",
            QueryKind::DropTrigger => "DROP TRIGGER IF EXISTS #NAME#",
            QueryKind::ExistProcedure => "SELECT COUNT(*) FROM sys.procedures WHERE name = ?",
            QueryKind::CreateProcedure => "CREATE PROCEDURE #NAME# AS BEGIN #BODY# END",
            QueryKind::DropProcedure => "DROP PROCEDURE IF EXISTS #NAME#",
        })
    }

    fn field_type(&self, data_type: DataType, max_length: u32) -> String {
        match data_type {
            DataType::Enum | DataType::Int32 => "int".into(),
            DataType::Boolean => "bit".into(),
            DataType::Byte => "tinyint".into(),
            DataType::Int16 => "smallint".into(),
            DataType::Int64 => "bigint".into(),
            DataType::Date => "date".into(),
            DataType::Time => "time".into(),
            DataType::DateTime => "datetime2(3)".into(),
            DataType::Decimal => "decimal(18,4)".into(),
            DataType::Double => "float".into(),
            DataType::Float => "real".into(),
            DataType::Guid => "uniqueidentifier".into(),
            DataType::Binary | DataType::Object => "varbinary(max)".into(),
            DataType::String if max_length > 0 && max_length <= 4000 => {
                format!("nvarchar({})", max_length)
            }
            DataType::String => "nvarchar(max)".into(),
        }
    }

    fn row_limit(&self, limit: usize) -> RowLimit {
        RowLimit {
            prefix: format!("TOP {} ", limit),
            suffix: String::new(),
        }
    }

    fn trigger_event(&self, event: TriggerEvent) -> Result<&'static str> {
        match event {
            TriggerEvent::AfterInsert => Ok("AFTER INSERT"),
            TriggerEvent::AfterUpdate => Ok("AFTER UPDATE"),
            TriggerEvent::AfterDelete => Ok("AFTER DELETE"),
            other => Err(DbError::Unsupported(format!(
                "SQL Server has no {:?} triggers",
                other
            ))),
        }
    }

    fn delete_count_scalar(&self) -> Option<&'static str> {
        Some("; SELECT @@ROWCOUNT")
    }

    fn caps_descending_single_row(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_limit_is_prefix() {
        let limit = SqlServerTranslator::new().row_limit(3);
        assert_eq!(limit.prefix, "TOP 3 ");
        assert!(limit.suffix.is_empty());
    }

    #[test]
    fn test_before_triggers_unsupported() {
        let t = SqlServerTranslator::new();
        assert!(t.trigger_event(TriggerEvent::AfterUpdate).is_ok());
        assert!(matches!(
            t.trigger_event(TriggerEvent::BeforeInsert),
            Err(DbError::Unsupported(_))
        ));
    }

    #[test]
    fn test_memo_strings() {
        let t = SqlServerTranslator::new();
        assert_eq!(t.field_type(DataType::String, 200), "nvarchar(200)");
        assert_eq!(t.field_type(DataType::String, 10_000), "nvarchar(max)");
    }
}
