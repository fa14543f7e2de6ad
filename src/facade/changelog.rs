use std::sync::Mutex;

use log::info;

use crate::core::Result;
use crate::meta::ChangeInformation;

/// Receives audit records of saves and deletes on audited types.
pub trait ChangeLogger: Send + Sync {
    fn log_change(&self, change: &ChangeInformation) -> Result<()>;
}

/// Writes audit records through the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogChangeLogger;

impl ChangeLogger for LogChangeLogger {
    fn log_change(&self, change: &ChangeInformation) -> Result<()> {
        if change.changes.is_empty() {
            info!("{} {} '{}'", change.type_name, change.kind, change.key);
            return Ok(());
        }

        let fields: Vec<String> = change
            .changes
            .iter()
            .map(|c| format!("{}: {} -> {}", c.field, c.old_value, c.new_value))
            .collect();
        info!(
            "{} {} '{}' ({})",
            change.type_name,
            change.kind,
            change.key,
            fields.join(", ")
        );
        Ok(())
    }
}

/// Keeps audit records in memory.
#[derive(Debug, Default)]
pub struct MemoryChangeLog {
    entries: Mutex<Vec<ChangeInformation>>,
}

impl MemoryChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Result<Vec<ChangeInformation>> {
        Ok(self.entries.lock()?.clone())
    }
}

impl ChangeLogger for MemoryChangeLog {
    fn log_change(&self, change: &ChangeInformation) -> Result<()> {
        self.entries.lock()?.push(change.clone());
        Ok(())
    }
}
