use std::sync::OnceLock;

use chrono::NaiveDateTime;

use crate::core::{DataType, FromValue, Result, Value};
use crate::meta::{Entity, PropertyDescription, RecordState, TypeDescription, TypeId};

/// Type id reserved for the ledger itself.
pub const LEDGER_TYPE_ID: TypeId = 1;

/// Schema version ledger row: which version of a type's table was last
/// reconciled.
#[derive(Debug, Clone, Default)]
pub struct SystemDatabaseInformation {
    pub type_id: i64,
    pub table_name: String,
    pub version: i32,
    pub created: Option<NaiveDateTime>,
    pub changed: Option<NaiveDateTime>,
    state: RecordState,
}

impl SystemDatabaseInformation {
    pub fn new(description: &TypeDescription) -> Self {
        Self {
            type_id: description.type_id as i64,
            table_name: description.table_name.clone(),
            ..Self::default()
        }
    }
}

impl Entity for SystemDatabaseInformation {
    fn description() -> &'static TypeDescription {
        static DESCRIPTION: OnceLock<TypeDescription> = OnceLock::new();
        DESCRIPTION.get_or_init(|| {
            TypeDescription::table(
                "SystemDatabaseInformation",
                "system_database_information",
                LEDGER_TYPE_ID,
                1,
            )
            .field(PropertyDescription::new("TypeId", DataType::Int64).primary_key())
            .field(PropertyDescription::new("TableName", DataType::String).max_length(128))
            .field(PropertyDescription::new("Version", DataType::Int32))
            .field(PropertyDescription::new("Created", DataType::DateTime).created())
            .field(PropertyDescription::new("Changed", DataType::DateTime).changed())
        })
    }

    fn get_value(&self, field: &str) -> Option<Value> {
        Some(match field {
            "TypeId" => Value::Integer(self.type_id),
            "TableName" => Value::Text(self.table_name.clone()),
            "Version" => Value::Integer(i64::from(self.version)),
            "Created" => self.created.into(),
            "Changed" => self.changed.into(),
            _ => return None,
        })
    }

    fn set_value(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "TypeId" => self.type_id = i64::from_value(value)?,
            "TableName" => self.table_name = String::from_value(value)?,
            "Version" => self.version = i32::from_value(value)?,
            "Created" => self.created = Option::from_value(value)?,
            "Changed" => self.changed = Option::from_value(value)?,
            _ => {}
        }
        Ok(())
    }

    fn record_state(&self) -> &RecordState {
        &self.state
    }

    fn record_state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }
}
