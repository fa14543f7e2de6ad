use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::core::Value;
use crate::meta::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderMode {
    #[default]
    Ascending,
    Descending,
}

impl OrderMode {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// Row-level predicate applied to materialized records after the query ran.
pub type RecordFilter = Arc<dyn Fn(&dyn Any) -> bool + Send + Sync>;

/// Shapes a read: projection, ordering, grouping, row cap and post-filtering.
///
/// # Examples
///
/// ```
/// use dbweave::{OrderMode, ReadOptions};
///
/// let options = ReadOptions::new()
///     .order_by("Name", OrderMode::Descending)
///     .maximum_record_count(20);
/// assert_eq!(options.maximum_record_count, 20);
/// ```
#[derive(Clone, Default)]
pub struct ReadOptions {
    /// Explicit field subset; empty selects the declared fields.
    pub fields: Vec<String>,
    pub order_by: Option<String>,
    pub order_mode: OrderMode,
    pub group_on: Option<String>,
    /// Row cap; 0 means unlimited.
    pub maximum_record_count: usize,
    pub filter: Option<RecordFilter>,
    /// Primary key of a row that must be present in the result.
    ///
    /// The row is fetched after the limit and the filter are applied, so a
    /// select may return `maximum_record_count + 1` records.
    pub always_include: Option<Value>,
    /// Exclude rows whose archive field is set.
    pub ignore_archived: bool,
    pub load_delayed: bool,
    /// Bind arguments without dialect conversion.
    pub skip_translator: bool,
    pub use_query_buffer: bool,
    /// Identifier of the buffered template, generated on first use.
    pub buffered_query_id: OnceLock<String>,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn order_by(mut self, field: &str, mode: OrderMode) -> Self {
        self.order_by = Some(field.to_string());
        self.order_mode = mode;
        self
    }

    pub fn group_on(mut self, clause: &str) -> Self {
        self.group_on = Some(clause.to_string());
        self
    }

    pub fn maximum_record_count(mut self, count: usize) -> Self {
        self.maximum_record_count = count;
        self
    }

    pub fn filter(mut self, filter: RecordFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Typed post-filter; records of other types never match.
    pub fn filter_records<T, F>(self, predicate: F) -> Self
    where
        T: Entity,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.filter(Arc::new(move |record: &dyn Any| {
            record.downcast_ref::<T>().is_some_and(&predicate)
        }))
    }

    /// Make sure the row with `key` is returned, even beyond the row limit
    pub fn always_include(mut self, key: impl Into<Value>) -> Self {
        self.always_include = Some(key.into());
        self
    }

    pub fn ignore_archived(mut self, ignore: bool) -> Self {
        self.ignore_archived = ignore;
        self
    }

    pub fn load_delayed(mut self, load: bool) -> Self {
        self.load_delayed = load;
        self
    }

    pub fn skip_translator(mut self, skip: bool) -> Self {
        self.skip_translator = skip;
        self
    }

    pub fn use_query_buffer(mut self, enabled: bool) -> Self {
        self.use_query_buffer = enabled;
        self
    }

    /// Copy for a derived query; the buffered query id is fixed first so
    /// the copy shares it.
    pub(crate) fn derived(&self) -> Self {
        if self.use_query_buffer {
            self.buffered_query_id
                .get_or_init(|| uuid::Uuid::new_v4().to_string());
        }
        self.clone()
    }

    pub(crate) fn accepts(&self, record: &dyn Any) -> bool {
        self.filter.as_ref().is_none_or(|f| f(record))
    }
}

impl fmt::Debug for ReadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOptions")
            .field("fields", &self.fields)
            .field("order_by", &self.order_by)
            .field("order_mode", &self.order_mode)
            .field("group_on", &self.group_on)
            .field("maximum_record_count", &self.maximum_record_count)
            .field("filter", &self.filter.is_some())
            .field("always_include", &self.always_include)
            .field("ignore_archived", &self.ignore_archived)
            .field("load_delayed", &self.load_delayed)
            .field("skip_translator", &self.skip_translator)
            .field("use_query_buffer", &self.use_query_buffer)
            .field("buffered_query_id", &self.buffered_query_id.get())
            .finish()
    }
}

/// Controls a single save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Explicit field subset; empty means the changed fields.
    pub fields: Vec<String>,
    /// Insert even if a row with the key exists.
    pub force_create: bool,
    /// Write every field, changed or not.
    pub write_all_fields: bool,
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn force_create(mut self, force: bool) -> Self {
        self.force_create = force;
        self
    }

    pub fn write_all_fields(mut self, all: bool) -> Self {
        self.write_all_fields = all;
        self
    }
}
