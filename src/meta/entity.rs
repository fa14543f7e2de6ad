use std::collections::{HashMap, HashSet};

use crate::core::{Result, Value};

use super::description::TypeDescription;
use super::info::ModelInfo;

/// A record type the engine can persist.
///
/// Implementations expose a static [`TypeDescription`] plus name-based field
/// accessors; this takes the place of runtime reflection.
///
/// ```ignore
/// impl Entity for Customer {
///     fn description() -> &'static TypeDescription {
///         static DESCRIPTION: OnceLock<TypeDescription> = OnceLock::new();
///         DESCRIPTION.get_or_init(|| TypeDescription::table("Customer", "customers", 1001, 1) /* ... */)
///     }
///     // ...
/// }
/// ```
pub trait Entity: Clone + Default + Send + Sync + 'static {
    fn description() -> &'static TypeDescription;

    /// Current value of `field`, or `None` if the type has no such field.
    fn get_value(&self, field: &str) -> Option<Value>;

    fn set_value(&mut self, field: &str, value: Value) -> Result<()>;

    fn record_state(&self) -> &RecordState;

    fn record_state_mut(&mut self) -> &mut RecordState;

    /// Runs before every save.
    fn before_save(&mut self) -> Result<()> {
        Ok(())
    }

    /// Lets a type adjust the lightweight projections built by `select_infos`.
    fn customize_info(_info: &mut ModelInfo) {}

    fn key(&self) -> Value {
        Self::description()
            .primary_key()
            .ok()
            .and_then(|pk| self.get_value(&pk.name))
            .unwrap_or(Value::Null)
    }
}

/// Change-tracking state carried by every record.
///
/// The snapshot holds the field values as they were last read from or
/// written to the database. A record without a snapshot has never been
/// persisted and reports every field as changed.
#[derive(Debug, Clone, Default)]
pub struct RecordState {
    snapshot: Option<HashMap<String, Value>>,
    delayed_loaded: HashSet<String>,
}

impl RecordState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_tracked(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Value recorded for `field` when the record was last synchronized.
    pub fn original(&self, field: &str) -> Option<&Value> {
        self.snapshot.as_ref().and_then(|s| s.get(field))
    }

    /// Names of the fields whose current value differs from the snapshot.
    pub fn changed_fields<E: Entity>(&self, record: &E) -> Vec<String> {
        let description = E::description();
        description
            .fields
            .iter()
            .filter(|field| {
                let current = record.get_value(&field.name).unwrap_or(Value::Null);
                match &self.snapshot {
                    None => true,
                    Some(snapshot) => snapshot.get(&field.name) != Some(&current),
                }
            })
            .map(|field| field.name.clone())
            .collect()
    }

    /// Delayed fields count as loaded on records that were never persisted,
    /// since their in-memory value is authoritative.
    pub fn is_delayed_loaded(&self, field: &str) -> bool {
        self.snapshot.is_none() || self.delayed_loaded.contains(field)
    }

    pub fn mark_delayed_loaded(&mut self, field: impl Into<String>) {
        self.delayed_loaded.insert(field.into());
    }

    pub(crate) fn set_original(&mut self, field: &str, value: Value) {
        self.snapshot
            .get_or_insert_with(HashMap::new)
            .insert(field.to_string(), value);
    }

    /// Marks every field as unchanged.
    pub fn reset<E: Entity>(record: &mut E) {
        let snapshot = E::description()
            .fields
            .iter()
            .map(|field| {
                let value = record.get_value(&field.name).unwrap_or(Value::Null);
                (field.name.clone(), value)
            })
            .collect();
        record.record_state_mut().snapshot = Some(snapshot);
    }

    /// Forgets the snapshot so the record is treated as never persisted.
    pub fn detach(&mut self) {
        self.snapshot = None;
        self.delayed_loaded.clear();
    }
}
