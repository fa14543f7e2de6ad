use std::time::Duration;

use crate::core::Value;
use crate::driver::Command;
use crate::meta::TypeDescription;

/// Diagnostic record of one command, handed to [`DatabaseHooks`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionTrace {
    pub connection_id: u64,
    pub sql: String,
    pub parameters: Vec<Value>,
    /// Set once the command finished.
    pub elapsed: Option<Duration>,
    /// Affected or returned rows, when the command succeeded.
    pub rows: Option<u64>,
}

impl ExecutionTrace {
    pub fn new(connection_id: u64, command: &Command) -> Self {
        Self {
            connection_id,
            sql: command.sql.clone(),
            parameters: command.parameters.clone(),
            elapsed: None,
            rows: None,
        }
    }
}

/// Callbacks a [`Database`](crate::Database) runs around engine activity.
///
/// Every method has an empty default.
pub trait DatabaseHooks: Send + Sync {
    fn before_execute(&self, _trace: &ExecutionTrace) {}

    fn after_execute(&self, _trace: &ExecutionTrace) {}

    fn after_save(&self, _description: &TypeDescription, _key: &Value) {}

    fn after_delete(&self, _description: &TypeDescription, _key: &Value) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl DatabaseHooks for NoHooks {}
