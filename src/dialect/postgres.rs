//! PostgreSQL SQL dialect.
//!
//! Uses numbered `$n` parameter markers, a trailing `LIMIT`, and a
//! `BEFORE UPDATE` trigger function to maintain the changed timestamp.

use crate::core::{DataType, Result};

use super::{Dialect, QueryKind, RowLimit, Translator, TriggerEvent, number_parameters};

#[derive(Debug, Clone, Default)]
pub struct PostgresTranslator;

impl PostgresTranslator {
    pub fn new() -> Self {
        Self
    }
}

impl Translator for PostgresTranslator {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
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
                "SELECT COUNT(*) FROM information_schema.tables WHERE table_type = 'BASE TABLE' AND table_name = ?"
            }
            QueryKind::CreateTable => concat!(
                "CREATE TABLE #TABLENAME# (",
                "#FIELDNAMEKEY# #KEYTYPE# NOT NULL PRIMARY KEY, ",
                "#CREATEDFIELD# #FIELDTYPE# NOT NULL DEFAULT now(), ",
                "#CHANGEDFIELD# #FIELDTYPE# NOT NULL DEFAULT now())"
            ),
            QueryKind::ChangedTrigger => concat!(
                "CREATE OR REPLACE FUNCTION #NAME#_fn() RETURNS trigger AS $$ ",
                "BEGIN NEW.#CHANGEDFIELD# := now(); RETURN NEW; END; $$ LANGUAGE plpgsql; ",
                "CREATE TRIGGER #NAME# BEFORE UPDATE ON #TABLENAME# ",
                "FOR EACH ROW EXECUTE FUNCTION #NAME#_fn()"
            ),
            QueryKind::DropTable => "DROP TABLE #TABLENAME#",
            QueryKind::GetScheme => concat!(
                "SELECT column_name, data_type, character_maximum_length, ",
                "CASE is_nullable WHEN 'YES' THEN 1 ELSE 0 END ",
                "FROM information_schema.columns WHERE table_name = ? ORDER BY ordinal_position"
            ),
            QueryKind::CreateField => {
                "ALTER TABLE #TABLENAME# ADD COLUMN #FIELDNAME# #FIELDTYPE##FIELDOPTIONS#"
            }
            QueryKind::AlterFieldSize => {
                "ALTER TABLE #TABLENAME# ALTER COLUMN #FIELDNAME# TYPE varchar(#SIZE#)"
            }
            QueryKind::DropField => "ALTER TABLE #TABLENAME# DROP COLUMN #FIELDNAME#",
            QueryKind::CreateIndex => "CREATE #UNIQUE#INDEX #NAME# ON #TABLENAME# (#FIELDNAME#)",
            QueryKind::DropIndex => "DROP INDEX IF EXISTS #NAME#",
            QueryKind::ExistForeignKey => concat!(
                "SELECT COUNT(*) FROM information_schema.table_constraints ",
                "WHERE constraint_type = 'FOREIGN KEY' AND constraint_name = ?"
            ),
            QueryKind::CreateForeignKey => concat!(
                "ALTER TABLE #TABLENAME# ADD CONSTRAINT #NAME# FOREIGN KEY (#FIELDNAME#) ",
                "REFERENCES #REFTABLE# (#REFFIELD#) ON UPDATE #ONUPDATE# ON DELETE #ONDELETE#"
            ),
            QueryKind::ExistView => "SELECT COUNT(*) FROM information_schema.views WHERE table_name = ?",
            QueryKind::CreateView => "CREATE VIEW #TABLENAME# AS #QUERY#",
            QueryKind::DropView => "DROP VIEW IF EXISTS #TABLENAME#",
            QueryKind::SetComment => "COMMENT ON COLUMN #TABLENAME#.#FIELDNAME# IS #COMMENT#",
            QueryKind::GetComment => concat!(
                "SELECT col_description(c.oid, a.attnum) FROM pg_class c ",
                "JOIN pg_attribute a ON a.attrelid = c.oid WHERE c.relname = ? AND a.attname = ?"
            ),
            QueryKind::ExistTrigger => {
                "SELECT COUNT(*) FROM information_schema.triggers WHERE trigger_name = ?"
            }
            QueryKind::CreateTrigger => {
                "CREATE TRIGGER #NAME# #EVENT# ON #TABLENAME# FOR EACH ROW #BODY#"
            }
            QueryKind::DropTrigger => "DROP TRIGGER IF EXISTS #NAME# ON #TABLENAME#",
            QueryKind::ExistProcedure => {
                "SELECT COUNT(*) FROM information_schema.routines WHERE routine_name = ?"
            }
            QueryKind::CreateProcedure => {
                "CREATE OR REPLACE PROCEDURE #NAME#() LANGUAGE plpgsql AS $$ BEGIN #BODY# END $$"
            }
            QueryKind::DropProcedure => "DROP PROCEDURE IF EXISTS #NAME#",
        })
    }

    fn field_type(&self, data_type: DataType, max_length: u32) -> String {
        match data_type {
            DataType::Enum | DataType::Int32 => "integer".into(),
            DataType::Boolean => "boolean".into(),
            DataType::Byte | DataType::Int16 => "smallint".into(),
            DataType::Int64 => "bigint".into(),
            DataType::Date => "date".into(),
            DataType::Time => "time".into(),
            DataType::DateTime => "timestamp(3)".into(),
            DataType::Decimal => "numeric(18,4)".into(),
            DataType::Double => "double precision".into(),
            DataType::Float => "real".into(),
            DataType::Guid => "uuid".into(),
            DataType::Binary | DataType::Object => "bytea".into(),
            DataType::String if max_length > 0 && max_length <= 10_485_760 => {
                format!("varchar({})", max_length)
            }
            DataType::String => "text".into(),
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

    fn finalize(&self, sql: String) -> String {
        number_parameters(&sql)
    }
}
