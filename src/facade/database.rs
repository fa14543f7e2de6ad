use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, info};

use crate::connection::{Configuration, Connection};
use crate::core::{DbError, Result, Value};
use crate::dialect::{Dialect, Translator};
use crate::driver::{DriverFactory, SqliteDriverFactory};
use crate::meta::{Entity, TypeDescription, TypeKind, TypeRegistry};

use super::buffer::{LruQueryBuffer, QueryBuffer};
use super::cache::{EntityCache, LruEntityCache};
use super::changelog::{ChangeLogger, LogChangeLogger};
use super::events::EventHub;
use super::hooks::{DatabaseHooks, NoHooks};

struct DatabaseInner {
    config: Configuration,
    translator: Arc<dyn Translator>,
    registry: TypeRegistry,
    cache: Arc<dyn EntityCache>,
    query_buffer: Arc<dyn QueryBuffer>,
    hooks: Arc<dyn DatabaseHooks>,
    events: Option<Arc<dyn EventHub>>,
    change_log: Arc<dyn ChangeLogger>,
    driver: Arc<dyn DriverFactory>,
    next_connection_id: AtomicU64,
}

/// Database facade
///
/// Owns everything connections share: configuration, translator, type
/// registry, entity cache, query buffer, hooks, event hub and the driver
/// factory. Cloning is cheap; every clone refers to the same state.
///
/// # Examples
///
/// ```no_run
/// use dbweave::{Configuration, Database};
///
/// # fn main() -> dbweave::Result<()> {
/// let db = Database::open(Configuration::sqlite("app.db"))?;
/// let mut conn = db.get_connection()?;
/// let tables = conn.query_raw("SELECT name FROM sqlite_master", &[])?;
/// tables.print();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    /// Open with the default collaborators for `config`
    pub fn open(config: Configuration) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: Configuration) -> DatabaseBuilder {
        DatabaseBuilder::new(config)
    }

    pub fn config(&self) -> &Configuration {
        &self.inner.config
    }

    pub fn translator(&self) -> &Arc<dyn Translator> {
        &self.inner.translator
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.inner.registry
    }

    pub fn cache(&self) -> &Arc<dyn EntityCache> {
        &self.inner.cache
    }

    pub fn query_buffer(&self) -> &Arc<dyn QueryBuffer> {
        &self.inner.query_buffer
    }

    pub fn hooks(&self) -> &Arc<dyn DatabaseHooks> {
        &self.inner.hooks
    }

    pub fn events(&self) -> Option<&Arc<dyn EventHub>> {
        self.inner.events.as_ref()
    }

    pub fn change_log(&self) -> &Arc<dyn ChangeLogger> {
        &self.inner.change_log
    }

    pub(crate) fn driver_factory(&self) -> &Arc<dyn DriverFactory> {
        &self.inner.driver
    }

    /// Open a new connection
    pub fn get_connection(&self) -> Result<Connection> {
        let id = self.inner.next_connection_id.fetch_add(1, Ordering::Relaxed);
        Connection::open(self.clone(), id)
    }

    /// Register a persistent type for `check_all` and foreign-key resolution
    pub fn register<T: Entity>(&self) -> Result<()> {
        self.inner.registry.register::<T>()
    }

    pub fn from_cache<T: Entity>(&self, key: &Value) -> Result<Option<T>> {
        let description = T::description();
        let hit = self.inner.cache.get(description.type_id, key)?;
        Ok(hit.and_then(|record| record.downcast_ref::<T>().cloned()))
    }

    pub fn to_cache<T: Entity>(&self, record: &T) -> Result<()> {
        let description = T::description();
        self.inner
            .cache
            .put(description.type_id, record.key(), Arc::new(record.clone()))
    }

    pub fn evict<T: Entity>(&self, key: &Value) -> Result<()> {
        self.inner.cache.evict(T::description().type_id, key)
    }

    /// Reconcile the schema of every registered type, tables before views.
    ///
    /// When the configuration lists base types, only types whose
    /// `base_type` is listed take part.
    pub fn check_all(&self, force: bool) -> Result<()> {
        let config = &self.inner.config;
        let descriptions = self.inner.registry.all()?;
        let selected = |desc: &&'static TypeDescription| {
            let allowed = if desc.is_view() {
                &config.view_base_types
            } else {
                &config.table_base_types
            };
            allowed.is_empty()
                || desc
                    .base_type
                    .as_ref()
                    .is_some_and(|base| allowed.iter().any(|a| a == base))
        };

        let (views, tables): (Vec<_>, Vec<_>) = descriptions
            .into_iter()
            .filter(selected)
            .partition(|desc| matches!(desc.kind, TypeKind::View { .. }));

        let mut conn = self.get_connection()?;
        for desc in tables.into_iter().chain(views) {
            debug!("Checking schema of {}", desc.type_name);
            conn.check_description(desc, force)?;
        }
        conn.close()
    }
}

/// Builder for [`Database`] with injectable collaborators
pub struct DatabaseBuilder {
    config: Configuration,
    translator: Option<Arc<dyn Translator>>,
    cache: Option<Arc<dyn EntityCache>>,
    query_buffer: Option<Arc<dyn QueryBuffer>>,
    hooks: Option<Arc<dyn DatabaseHooks>>,
    events: Option<Arc<dyn EventHub>>,
    change_log: Option<Arc<dyn ChangeLogger>>,
    driver: Option<Arc<dyn DriverFactory>>,
}

impl DatabaseBuilder {
    pub fn new(config: Configuration) -> Self {
        Self {
            config,
            translator: None,
            cache: None,
            query_buffer: None,
            hooks: None,
            events: None,
            change_log: None,
            driver: None,
        }
    }

    pub fn translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn EntityCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn query_buffer(mut self, buffer: Arc<dyn QueryBuffer>) -> Self {
        self.query_buffer = Some(buffer);
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn DatabaseHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn events(mut self, hub: Arc<dyn EventHub>) -> Self {
        self.events = Some(hub);
        self
    }

    pub fn change_log(mut self, logger: Arc<dyn ChangeLogger>) -> Self {
        self.change_log = Some(logger);
        self
    }

    pub fn driver(mut self, factory: Arc<dyn DriverFactory>) -> Self {
        self.driver = Some(factory);
        self
    }

    pub fn build(self) -> Result<Database> {
        self.config.validate()?;

        let driver: Arc<dyn DriverFactory> = match (self.driver, self.config.dialect) {
            (Some(driver), _) => driver,
            (None, Dialect::Sqlite) => Arc::new(SqliteDriverFactory::new()),
            (None, dialect) => {
                return Err(DbError::Configuration(format!(
                    "No built-in driver for {}; supply one with DatabaseBuilder::driver",
                    dialect
                )));
            }
        };

        let translator = self
            .translator
            .unwrap_or_else(|| self.config.dialect.translator());
        if translator.dialect() != self.config.dialect {
            return Err(DbError::Configuration(format!(
                "Translator speaks {} but the configuration expects {}",
                translator.dialect(),
                self.config.dialect
            )));
        }

        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(LruEntityCache::new(self.config.cache_capacity)));
        let query_buffer = self
            .query_buffer
            .unwrap_or_else(|| Arc::new(LruQueryBuffer::new(self.config.query_buffer_capacity)));

        info!("Opening {} database {}", self.config.dialect, self.config.to_url());

        Ok(Database {
            inner: Arc::new(DatabaseInner {
                translator,
                registry: TypeRegistry::new(),
                cache,
                query_buffer,
                hooks: self.hooks.unwrap_or_else(|| Arc::new(NoHooks)),
                events: self.events,
                change_log: self.change_log.unwrap_or_else(|| Arc::new(LogChangeLogger)),
                driver,
                next_connection_id: AtomicU64::new(1),
                config: self.config,
            }),
        })
    }
}
