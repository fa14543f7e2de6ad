use std::collections::HashMap;
use std::mem;

use crate::core::{DbError, Result, Value};
use crate::dialect::QueryKind;
use crate::meta::{Entity, ModelInfo, TypeDescription};
use crate::result::QueryResult;

use super::options::{OrderMode, ReadOptions};
use super::query::{Projection, RowMapper};
use super::reader::ForwardReader;
use super::Connection;

/// Caption plus info fields, read as one row of a lightweight projection.
fn project_info<T: Entity>(record: &T) -> ModelInfo {
    let description = T::description();
    let caption = description
        .caption_fields
        .iter()
        .filter_map(|f| record.get_value(f))
        .filter(|v| !v.is_null())
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ");

    let mut info = ModelInfo::new(record.key(), caption);
    for field in &description.info_fields {
        if let Some(value) = record.get_value(field) {
            info.insert(field.clone(), value);
        }
    }
    T::customize_info(&mut info);
    info
}

fn info_options(description: &TypeDescription, options: &ReadOptions) -> ReadOptions {
    let mut narrowed = options.derived();
    if narrowed.fields.is_empty() {
        narrowed.fields = description
            .caption_fields
            .iter()
            .chain(&description.info_fields)
            .cloned()
            .collect();
    }
    narrowed
}

impl Connection {
    /// Typed select by WHERE fragment (or full SELECT)
    ///
    /// The post-filter runs on materialized records; `always_include`
    /// appends its row when the query did not return it.
    pub fn select<T: Entity>(
        &mut self,
        query: &str,
        args: &[Value],
        options: &ReadOptions,
    ) -> Result<Vec<T>> {
        let description = T::description();
        let command = self.build_query(
            QueryKind::Select,
            Some(description),
            &Projection::Declared,
            query,
            args,
            options,
        )?;
        let result = self.query_command(&command)?;
        let mapper = RowMapper::new(description, self.translator(), &result.columns);

        let mut records = Vec::with_capacity(result.rows.len());
        for row in result.rows {
            let record: T = mapper.read(row)?;
            if options.accepts(&record) {
                records.push(record);
            }
        }

        if let Some(key) = options.always_include.as_ref().filter(|k| !k.is_empty_key()) {
            if !records.iter().any(|r| r.key() == *key) {
                if let Some(extra) = self.fetch_by_key::<T>(key, options)? {
                    records.push(extra);
                }
            }
        }

        Ok(records)
    }

    /// First matching record, or `None`
    pub fn select_single<T: Entity>(
        &mut self,
        query: &str,
        args: &[Value],
        options: &ReadOptions,
    ) -> Result<Option<T>> {
        let mut record = T::default();
        let found = self.select_single_into(query, args, options, &mut record)?;
        Ok(found.then_some(record))
    }

    /// Fill `into` from the first matching row; returns whether one was found
    pub fn select_single_into<T: Entity>(
        &mut self,
        query: &str,
        args: &[Value],
        options: &ReadOptions,
        into: &mut T,
    ) -> Result<bool> {
        let description = T::description();
        let options = self.single_row_options(options);
        let command = self.build_query(
            QueryKind::Select,
            Some(description),
            &Projection::Declared,
            query,
            args,
            &options,
        )?;
        let result = self.query_command(&command)?;
        let mapper = RowMapper::new(description, self.translator(), &result.columns);

        for row in result.rows {
            let mut record = T::default();
            mapper.read_into(row, &mut record)?;
            if options.accepts(&record) {
                *into = record;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Lightweight key/caption projections
    pub fn select_infos<T: Entity>(
        &mut self,
        query: &str,
        args: &[Value],
        options: &ReadOptions,
    ) -> Result<Vec<ModelInfo>> {
        let options = info_options(T::description(), options);
        let records: Vec<T> = self.select(query, args, &options)?;
        Ok(records.iter().map(project_info).collect())
    }

    pub fn select_single_info<T: Entity>(
        &mut self,
        query: &str,
        args: &[Value],
        options: &ReadOptions,
    ) -> Result<Option<ModelInfo>> {
        let options = info_options(T::description(), options);
        let record: Option<T> = self.select_single(query, args, &options)?;
        Ok(record.as_ref().map(project_info))
    }

    /// Forward-only typed reader over the matching rows
    ///
    /// Fails with `ReaderUnavailable` if the driver cannot stream.
    pub fn select_reader<T: Entity>(
        &mut self,
        query: &str,
        args: &[Value],
        options: &ReadOptions,
    ) -> Result<ForwardReader<T>> {
        let description = T::description();
        let command = self.build_query(
            QueryKind::Select,
            Some(description),
            &Projection::Declared,
            query,
            args,
            options,
        )?;
        let cursor = self.cursor_command(&command)?;
        let mapper = RowMapper::new(description, self.translator(), cursor.columns());
        Ok(ForwardReader::new(cursor, mapper, options.filter.clone()))
    }

    /// Untyped tabular result; columns of known fields are converted from
    /// their native representation.
    pub fn select_data_table<T: Entity>(
        &mut self,
        query: &str,
        args: &[Value],
        options: &ReadOptions,
    ) -> Result<QueryResult> {
        let description = T::description();
        let command = self.build_query(
            QueryKind::Select,
            Some(description),
            &Projection::Declared,
            query,
            args,
            options,
        )?;
        let mut result = self.query_command(&command)?;
        let translator = self.translator();

        let fields: Vec<_> = result
            .columns
            .iter()
            .map(|c| description.get_field(c))
            .collect();
        for row in &mut result.rows {
            for (value, field) in row.iter_mut().zip(&fields) {
                if let Some(field) = field {
                    let native = mem::replace(value, Value::Null);
                    *value = translator.from_native(native, field.data_type)?;
                }
            }
        }
        Ok(result)
    }

    /// Two-column projection as a map from `key_field` to `value_field`
    pub fn select_dictionary<T: Entity>(
        &mut self,
        key_field: &str,
        value_field: &str,
        query: &str,
        args: &[Value],
        options: &ReadOptions,
    ) -> Result<HashMap<Value, Value>> {
        let description = T::description();
        let lookup = |name: &str| {
            description.get_field(name).ok_or_else(|| {
                DbError::NotFound(format!("{}.{}", description.type_name, name))
            })
        };
        let key = lookup(key_field)?;
        let value = lookup(value_field)?;

        let command = self.build_query(
            QueryKind::Select,
            Some(description),
            &Projection::Columns(vec![key.name.clone(), value.name.clone()]),
            query,
            args,
            options,
        )?;
        let result = self.query_command(&command)?;
        let translator = self.translator();

        let mut map = HashMap::with_capacity(result.rows.len());
        for row in result.rows {
            let mut cells = row.into_iter();
            let (Some(k), Some(v)) = (cells.next(), cells.next()) else {
                continue;
            };
            map.insert(
                translator.from_native(k, key.data_type)?,
                translator.from_native(v, value.data_type)?,
            );
        }
        Ok(map)
    }

    /// Number of rows matching the WHERE fragment
    pub fn count<T: Entity>(&mut self, query: &str, args: &[Value]) -> Result<i64> {
        self.count_with::<T>(query, args, &ReadOptions::default())
    }

    pub fn count_with<T: Entity>(
        &mut self,
        query: &str,
        args: &[Value],
        options: &ReadOptions,
    ) -> Result<i64> {
        let command = self.build_query(
            QueryKind::Count,
            Some(T::description()),
            &Projection::Key,
            query,
            args,
            options,
        )?;
        self.count_command(&command)
    }

    /// Sum of a numeric field over the matching rows; 0 when none match
    pub fn sum<T: Entity>(&mut self, field: &str, query: &str, args: &[Value]) -> Result<f64> {
        let description = T::description();
        let property = description.get_field(field).ok_or_else(|| {
            DbError::NotFound(format!("{}.{}", description.type_name, field))
        })?;

        let command = self.build_query(
            QueryKind::Sum,
            Some(description),
            &Projection::Columns(vec![property.name.clone()]),
            query,
            args,
            &ReadOptions::default(),
        )?;
        Ok(self
            .scalar_command(&command)?
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0))
    }

    /// Row with `key`, read with the caller's projection but none of its
    /// row shaping.
    fn fetch_by_key<T: Entity>(&mut self, key: &Value, options: &ReadOptions) -> Result<Option<T>> {
        let pk = T::description().primary_key()?;
        let narrowed = ReadOptions {
            fields: options.fields.clone(),
            load_delayed: options.load_delayed,
            skip_translator: options.skip_translator,
            ..ReadOptions::default()
        };
        self.select_single(
            &format!("{} = ?", pk.name),
            std::slice::from_ref(key),
            &narrowed,
        )
    }

    /// One-row variant of `options`.
    ///
    /// Dialects that cannot combine a one-row limit with descending order
    /// read a few rows and keep the first.
    fn single_row_options(&self, options: &ReadOptions) -> ReadOptions {
        let mut single = options.derived();
        single.always_include = None;
        let capped = self.db.translator().caps_descending_single_row()
            && single.order_by.is_some()
            && single.order_mode == OrderMode::Descending;
        single.maximum_record_count = if single.filter.is_some() {
            // the first row may be filtered out
            options.maximum_record_count
        } else if capped {
            self.db.config().descending_single_row_cap
        } else {
            1
        };
        single
    }
}
