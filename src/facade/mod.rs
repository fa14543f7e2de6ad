pub mod buffer;
pub mod cache;
pub mod changelog;
pub mod database;
pub mod events;
pub mod hooks;

pub use buffer::{LruQueryBuffer, QueryBuffer};
pub use cache::{CachedRecord, EntityCache, LruEntityCache};
pub use changelog::{ChangeLogger, LogChangeLogger, MemoryChangeLog};
pub use database::{Database, DatabaseBuilder};
pub use events::{DomainEvent, EventHub, EventLog};
pub use hooks::{DatabaseHooks, ExecutionTrace, NoHooks};
