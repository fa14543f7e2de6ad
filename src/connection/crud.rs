use std::cmp::Ordering;
use std::sync::Arc;

use log::debug;
use uuid::Uuid;

use crate::core::{DataType, DbError, Result, Value};
use crate::dialect::{Bindings, Placeholder, QueryKind};
use crate::driver::Command;
use crate::facade::DomainEvent;
use crate::meta::{
    ChangeInformation, ChangeKind, Entity, FieldChange, PropertyDescription, RecordState,
    TypeDescription,
};

use super::config::ConflictPolicy;
use super::options::{ReadOptions, SaveOptions};
use super::query::Projection;
use super::Connection;

fn key_filter(description: &TypeDescription) -> Result<String> {
    Ok(format!("{} = ?", description.primary_key()?.name))
}

impl Connection {
    /// Insert or update `record`, writing only its changed fields
    pub fn save<T: Entity>(&mut self, record: &mut T) -> Result<bool> {
        self.save_with(record, &SaveOptions::default())
    }

    /// Insert or update `record`
    ///
    /// A record is inserted when `force_create` is set, its key is empty or
    /// no row with its key exists. Returns whether a row was written.
    pub fn save_with<T: Entity>(&mut self, record: &mut T, options: &SaveOptions) -> Result<bool> {
        record.before_save()?;

        let description = T::description();
        if description.is_view() {
            return Err(DbError::Configuration(format!(
                "{} maps a view and cannot be saved",
                description.type_name
            )));
        }
        description.validate()?;
        let pk = description.primary_key()?;

        let mut key = record.get_value(&pk.name).unwrap_or(Value::Null);
        let is_new =
            options.force_create || key.is_empty_key() || !self.exist_key(description, &key)?;

        if !is_new {
            self.check_conflict(description, record, &key)?;
        }

        let selected: Option<Vec<String>> = if !options.fields.is_empty() {
            Some(options.fields.clone())
        } else if !is_new && !options.write_all_fields {
            let mut changed = record.record_state().changed_fields(record);
            for field in description.fields.iter().filter(|f| f.always_save) {
                if !changed.contains(&field.name) {
                    changed.push(field.name.clone());
                }
            }
            Some(changed)
        } else {
            None
        };

        let mut columns: Vec<&'static PropertyDescription> = Vec::new();
        for field in &description.fields {
            if field.is_primary_key() {
                if is_new {
                    if key.is_empty_key() {
                        key = self.generate_key(description, field)?;
                        record.set_value(&field.name, key.clone())?;
                    }
                    columns.push(field);
                }
                continue;
            }

            if field.system.is_timestamp() {
                let explicit = record.get_value(&field.name).is_some_and(|v| !v.is_null());
                if !(is_new && options.force_create && explicit) {
                    continue;
                }
            }

            if field.delayed && !record.record_state().is_delayed_loaded(&field.name) {
                continue;
            }

            if let Some(selected) = &selected {
                if !selected.iter().any(|s| s.eq_ignore_ascii_case(&field.name)) {
                    continue;
                }
            }

            columns.push(field);
        }

        if !is_new && columns.is_empty() {
            debug!("{} '{}' has no changes to save", description.type_name, key);
            return Ok(true);
        }

        let translator = self.translator();
        let values: Vec<Value> = columns
            .iter()
            .map(|f| translator.to_native(&record.get_value(&f.name).unwrap_or(Value::Null)))
            .collect();

        let command = if is_new {
            let names: Vec<&str> = columns.iter().map(|f| f.name.as_str()).collect();
            let sql = self.render(
                QueryKind::Insert,
                &Bindings::new()
                    .bind(Placeholder::TableName, description.table_name.clone())
                    .bind(Placeholder::FieldNames, names.join(", "))
                    .bind(Placeholder::Values, vec!["?"; columns.len()].join(", ")),
            )?;
            Command::with_parameters(sql, values)
        } else {
            let assignments: Vec<String> =
                columns.iter().map(|f| format!("{} = ?", f.name)).collect();
            let sql = self.render(
                QueryKind::Update,
                &Bindings::new()
                    .bind(Placeholder::TableName, description.table_name.clone())
                    .bind(Placeholder::Assignments, assignments.join(", "))
                    .bind(Placeholder::FieldNameKey, pk.name.clone()),
            )?;
            let mut parameters = values;
            parameters.push(translator.to_native(&key));
            Command::with_parameters(sql, parameters)
        };

        if self.execute_command(&command)? == 0 {
            return Ok(false);
        }

        let kind = if is_new {
            ChangeKind::Created
        } else {
            ChangeKind::Changed
        };

        let audit = description.audited && !self.silent;
        let changes: Vec<FieldChange> = if audit && !is_new {
            columns
                .iter()
                .filter(|f| f.loggable)
                .map(|f| FieldChange {
                    field: f.name.clone(),
                    old_value: record
                        .record_state()
                        .original(&f.name)
                        .cloned()
                        .unwrap_or(Value::Null),
                    new_value: record.get_value(&f.name).unwrap_or(Value::Null),
                })
                .collect()
        } else {
            Vec::new()
        };

        self.refresh_timestamps(description, record, &key)?;

        if audit {
            self.db.change_log().log_change(&ChangeInformation {
                kind,
                type_name: description.type_name.clone(),
                type_id: description.type_id,
                key: key.clone(),
                changes,
            })?;
        }

        RecordState::reset(record);
        for field in columns.iter().filter(|f| f.delayed) {
            record.record_state_mut().mark_delayed_loaded(field.name.clone());
        }

        self.db.hooks().after_save(description, &key);
        if description.cached {
            self.db
                .cache()
                .put(description.type_id, key.clone(), Arc::new(record.clone()))?;
            self.track_cached(description.type_id, &key)?;
        }

        self.publish(DomainEvent::new(kind, &*record))?;
        Ok(true)
    }

    /// Delete `record` by its key; succeeds only if exactly one row went away
    pub fn delete<T: Entity>(&mut self, record: &T) -> Result<bool> {
        let description = T::description();
        let key = record.key();
        if key.is_empty_key() {
            return Ok(false);
        }

        let command = self.build_query(
            QueryKind::Delete,
            Some(description),
            &Projection::Key,
            &key_filter(description)?,
            std::slice::from_ref(&key),
            &ReadOptions::default(),
        )?;
        if self.execute_command(&command)? != 1 {
            return Ok(false);
        }

        if description.audited && !self.silent {
            self.db.change_log().log_change(&ChangeInformation {
                kind: ChangeKind::Deleted,
                type_name: description.type_name.clone(),
                type_id: description.type_id,
                key: key.clone(),
                changes: Vec::new(),
            })?;
        }

        self.db.hooks().after_delete(description, &key);
        if description.cached {
            self.db.cache().evict(description.type_id, &key)?;
        }

        self.publish(DomainEvent::new(ChangeKind::Deleted, record))?;
        Ok(true)
    }

    /// Load the record with `key`, then delete it
    pub fn delete_key<T: Entity>(&mut self, key: impl Into<Value>) -> Result<bool> {
        match self.load_with::<T>(key, true)? {
            Some(record) => self.delete(&record),
            None => Ok(false),
        }
    }

    /// Bulk delete by WHERE fragment; returns the number of rows removed.
    ///
    /// No per-record events or change log entries are produced.
    pub fn delete_where<T: Entity>(&mut self, query: &str, args: &[Value]) -> Result<u64> {
        let description = T::description();
        let mut command = self.build_query(
            QueryKind::Delete,
            Some(description),
            &Projection::Declared,
            query,
            args,
            &ReadOptions::default(),
        )?;

        let affected = match self.db.translator().delete_count_scalar() {
            Some(suffix) => {
                command.sql.push_str(suffix);
                u64::try_from(self.count_command(&command)?).unwrap_or(0)
            }
            None => self.execute_command(&command)?,
        };

        if description.cached && affected > 0 {
            self.db.cache().evict_type(description.type_id)?;
        }
        Ok(affected)
    }

    /// Load by primary key, consulting the cache for cached types
    pub fn load<T: Entity>(&mut self, key: impl Into<Value>) -> Result<Option<T>> {
        self.load_with(key, false)
    }

    pub fn load_with<T: Entity>(
        &mut self,
        key: impl Into<Value>,
        ignore_cache: bool,
    ) -> Result<Option<T>> {
        let mut record = T::default();
        let found = self.load_into(key, &mut record, ignore_cache)?;
        Ok(found.then_some(record))
    }

    /// Load by primary key into an existing instance; returns whether a row was found
    pub fn load_into<T: Entity>(
        &mut self,
        key: impl Into<Value>,
        into: &mut T,
        ignore_cache: bool,
    ) -> Result<bool> {
        let key = key.into();
        let description = T::description();
        if key.is_empty_key() {
            return Ok(false);
        }

        if description.cached && !ignore_cache {
            if let Some(hit) = self.db.from_cache::<T>(&key)? {
                debug!("{} '{}' served from cache", description.type_name, key);
                *into = hit;
                return Ok(true);
            }
        }

        let found = self.select_single_into(
            &key_filter(description)?,
            std::slice::from_ref(&key),
            &ReadOptions::default(),
            into,
        )?;

        if found && description.cached {
            self.track_cached(description.type_id, &key)?;
            self.db
                .cache()
                .put(description.type_id, key, Arc::new(into.clone()))?;
        }
        Ok(found)
    }

    /// Reload `record` unless its changed timestamp matches the stored one;
    /// returns whether a reload happened
    pub fn reload<T: Entity>(&mut self, record: &mut T) -> Result<bool> {
        let description = T::description();
        let key = record.key();

        if let Some(changed) = description.changed_field() {
            let current = record.get_value(&changed.name).unwrap_or(Value::Null);
            if !current.is_null() {
                let stored = self.stored_value(description, changed, &key)?;
                if stored.as_ref() == Some(&current) {
                    return Ok(false);
                }
            }
        }

        self.load_into(key, record, true)
    }

    /// Fetch one delayed field of `record` and mark it loaded
    pub fn load_delayed<T: Entity>(&mut self, record: &mut T, field: &str) -> Result<()> {
        let description = T::description();
        let property = description.get_field(field).ok_or_else(|| {
            DbError::NotFound(format!("{}.{}", description.type_name, field))
        })?;

        let key = record.key();
        let value = self.stored_value(description, property, &key)?.ok_or_else(|| {
            DbError::NotFound(format!("{} '{}'", description.type_name, key))
        })?;

        record.set_value(&property.name, value.clone())?;
        let state = record.record_state_mut();
        state.set_original(&property.name, value);
        state.mark_delayed_loaded(property.name.clone());
        Ok(())
    }

    /// Whether a row with `key` exists
    pub fn exist<T: Entity>(&mut self, key: impl Into<Value>) -> Result<bool> {
        self.exist_key(T::description(), &key.into())
    }

    /// Whether no other row holds `value` in `field`
    pub fn is_unique<T: Entity>(
        &mut self,
        record: &T,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<bool> {
        let description = T::description();
        let property = description.get_field(field).ok_or_else(|| {
            DbError::NotFound(format!("{}.{}", description.type_name, field))
        })?;
        let pk = description.primary_key()?;

        let key = record.key();
        let (query, args) = if key.is_empty_key() {
            (format!("{} = ?", property.name), vec![value.into()])
        } else {
            (
                format!("{} = ? AND {} <> ?", property.name, pk.name),
                vec![value.into(), key],
            )
        };

        let command = self.build_query(
            QueryKind::Count,
            Some(description),
            &Projection::Key,
            &query,
            &args,
            &ReadOptions::default(),
        )?;
        Ok(self.count_command(&command)? == 0)
    }

    pub(crate) fn exist_key(&mut self, description: &TypeDescription, key: &Value) -> Result<bool> {
        if key.is_empty_key() {
            return Ok(false);
        }
        let pk = description.primary_key()?;
        let command = self.build_query(
            QueryKind::Exist,
            Some(description),
            &Projection::Key,
            &key_filter(description)?,
            std::slice::from_ref(key),
            &ReadOptions::default(),
        )?;

        match self.scalar_command(&command)? {
            Some(found) => Ok(self.translator().from_native(found, pk.data_type)? == *key),
            None => Ok(false),
        }
    }

    /// Current stored value of one field, `None` if the row is gone.
    pub(crate) fn stored_value(
        &mut self,
        description: &TypeDescription,
        field: &PropertyDescription,
        key: &Value,
    ) -> Result<Option<Value>> {
        let command = self.build_query(
            QueryKind::Select,
            Some(description),
            &Projection::Columns(vec![field.name.clone()]),
            &key_filter(description)?,
            std::slice::from_ref(key),
            &ReadOptions::default(),
        )?;
        let result = self.query_command(&command)?;
        match result.rows.into_iter().next().and_then(|row| row.into_iter().next()) {
            Some(value) => Ok(Some(self.translator().from_native(value, field.data_type)?)),
            None => Ok(None),
        }
    }

    fn check_conflict<T: Entity>(
        &mut self,
        description: &TypeDescription,
        record: &T,
        key: &Value,
    ) -> Result<()> {
        if self.db.config().conflict_policy != ConflictPolicy::FirstWins {
            return Ok(());
        }
        let Some(changed) = description.changed_field() else {
            return Ok(());
        };

        let current = record.get_value(&changed.name).unwrap_or(Value::Null);
        if current.is_null() {
            return Ok(());
        }

        if let Some(stored) = self.stored_value(description, changed, key)? {
            if !stored.is_null() && stored.compare(&current)? == Ordering::Greater {
                return Err(DbError::ConcurrencyConflict {
                    type_name: description.type_name.clone(),
                    key: key.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Reads the database-maintained timestamps back into `record`.
    fn refresh_timestamps<T: Entity>(
        &mut self,
        description: &TypeDescription,
        record: &mut T,
        key: &Value,
    ) -> Result<()> {
        let fields: Vec<&PropertyDescription> = description
            .created_field()
            .into_iter()
            .chain(description.changed_field())
            .collect();
        if fields.is_empty() {
            return Ok(());
        }

        let command = self.build_query(
            QueryKind::Select,
            Some(description),
            &Projection::Columns(fields.iter().map(|f| f.name.clone()).collect()),
            &key_filter(description)?,
            std::slice::from_ref(key),
            &ReadOptions::default(),
        )?;
        let result = self.query_command(&command)?;
        let translator = self.translator();

        if let Some(row) = result.rows.into_iter().next() {
            for (field, value) in fields.iter().zip(row) {
                record.set_value(&field.name, translator.from_native(value, field.data_type)?)?;
            }
        }
        Ok(())
    }

    fn generate_key(
        &mut self,
        description: &TypeDescription,
        pk: &PropertyDescription,
    ) -> Result<Value> {
        match pk.data_type {
            DataType::Guid => Ok(Value::Guid(Uuid::new_v4())),
            DataType::String => Ok(Value::Text(Uuid::new_v4().to_string())),
            t if t.is_integral() => {
                let sql = self.render(
                    QueryKind::NextKey,
                    &Bindings::new()
                        .bind(Placeholder::TableName, description.table_name.clone())
                        .bind(Placeholder::FieldNameKey, pk.name.clone()),
                )?;
                let next = self.count_command(&Command::new(sql))?;
                Ok(Value::Integer(next.max(1)))
            }
            other => Err(DbError::Configuration(format!(
                "Cannot generate a {} key for {}",
                other, description.type_name
            ))),
        }
    }
}
