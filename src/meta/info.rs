use std::collections::BTreeMap;
use std::fmt;

use crate::core::Value;

use super::description::TypeId;

/// Lightweight projection of a record: key, display caption and a small bag
/// of named extra values.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub key: Value,
    pub caption: String,
    pub data: BTreeMap<String, Value>,
}

impl ModelInfo {
    pub fn new(key: Value, caption: impl Into<String>) -> Self {
        Self {
            key,
            caption: caption.into(),
            data: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.data.insert(name.into(), value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Changed,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Changed => write!(f, "changed"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub old_value: Value,
    pub new_value: Value,
}

/// Audit record of one create, update or delete.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeInformation {
    pub kind: ChangeKind,
    pub type_name: String,
    pub type_id: TypeId,
    pub key: Value,
    /// Only populated for updates, and only with loggable fields.
    pub changes: Vec<FieldChange>,
}
