use std::sync::{Arc, OnceLock};
use std::time::Instant;

use log::debug;
use regex::Regex;
use uuid::Uuid;

use crate::core::{DbError, Result, Row, Value};
use crate::dialect::{Bindings, Placeholder, QueryKind, RowLimit, SqlTemplate, Translator};
use crate::driver::{Command, DriverConnection, RowCursor};
use crate::facade::ExecutionTrace;
use crate::meta::{Entity, PropertyDescription, RecordState, TypeDescription};
use crate::result::QueryResult;

use super::Connection;
use super::options::ReadOptions;

/// What `#FIELDNAMES#` expands to.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Projection {
    /// Declared fields shaped by the read options.
    Declared,
    /// The primary key only.
    Key,
    /// Exactly these columns.
    Columns(Vec<String>),
}

fn full_select_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^\s*select\s").expect("select pattern is valid"))
}

/// A complete `SELECT` statement bypasses templating.
pub(crate) fn is_full_select(query: &str) -> bool {
    full_select_pattern().is_match(query)
}

/// `&&` / `||` shorthand to SQL `and` / `or`.
pub(crate) fn normalize_operators(query: &str) -> String {
    query.replace("&&", " and ").replace("||", " or ")
}

fn field_list(
    description: &TypeDescription,
    projection: &Projection,
    options: &ReadOptions,
) -> Result<String> {
    let pk = description.primary_key()?;
    match projection {
        Projection::Key => Ok(pk.name.clone()),
        Projection::Columns(columns) => Ok(columns.join(", ")),
        Projection::Declared => {
            if options.fields.is_empty()
                && (options.load_delayed || !description.has_delayed_fields())
            {
                return Ok("*".into());
            }

            let mut names: Vec<&str> = if options.fields.is_empty() {
                description
                    .fields
                    .iter()
                    .filter(|f| options.load_delayed || !f.delayed)
                    .map(|f| f.name.as_str())
                    .collect()
            } else {
                options.fields.iter().map(String::as_str).collect()
            };

            if !names.iter().any(|n| n.eq_ignore_ascii_case(&pk.name)) {
                names.insert(0, &pk.name);
            }
            Ok(names.join(", "))
        }
    }
}

fn require<'a>(
    description: Option<&'a TypeDescription>,
    placeholder: Placeholder,
) -> Result<&'a TypeDescription> {
    description.ok_or_else(|| {
        DbError::Template(format!(
            "{} needs type metadata, but none was supplied",
            placeholder.token()
        ))
    })
}

/// Maps result columns onto the fields of one type.
pub(crate) struct RowMapper {
    translator: Arc<dyn Translator>,
    slots: Vec<Option<&'static PropertyDescription>>,
}

impl RowMapper {
    pub(crate) fn new(
        description: &'static TypeDescription,
        translator: Arc<dyn Translator>,
        columns: &[String],
    ) -> Self {
        Self {
            translator,
            slots: columns.iter().map(|c| description.get_field(c)).collect(),
        }
    }

    /// Overwrites the mapped fields of `record` and marks it unchanged.
    pub(crate) fn read_into<T: Entity>(&self, row: Row, record: &mut T) -> Result<()> {
        for (value, slot) in row.into_iter().zip(&self.slots) {
            if let Some(field) = slot {
                let value = self.translator.from_native(value, field.data_type)?;
                record.set_value(&field.name, value)?;
            }
        }

        RecordState::reset(record);
        for field in self.slots.iter().flatten().filter(|f| f.delayed) {
            record.record_state_mut().mark_delayed_loaded(field.name.clone());
        }
        Ok(())
    }

    pub(crate) fn read<T: Entity>(&self, row: Row) -> Result<T> {
        let mut record = T::default();
        self.read_into(row, &mut record)?;
        Ok(record)
    }
}

impl Connection {
    pub(crate) fn translator(&self) -> Arc<dyn Translator> {
        Arc::clone(self.db.translator())
    }

    /// Arguments as the driver expects them.
    pub(crate) fn native_parameters(&self, args: &[Value], skip_translator: bool) -> Vec<Value> {
        if skip_translator {
            return args.to_vec();
        }
        let translator = self.db.translator();
        args.iter().map(|a| translator.to_native(a)).collect()
    }

    /// Parsed template for `kind`, or `Unsupported` if the dialect has none.
    pub(crate) fn template(&self, kind: QueryKind) -> Result<SqlTemplate> {
        let text = self.db.translator().template(kind).ok_or_else(|| {
            DbError::Unsupported(format!(
                "{} has no template for {:?}",
                self.db.config().dialect,
                kind
            ))
        })?;
        SqlTemplate::parse(text)
    }

    pub(crate) fn supports(&self, kind: QueryKind) -> bool {
        self.db.translator().template(kind).is_some()
    }

    /// Renders `kind` and finalizes parameter markers.
    pub(crate) fn render(&self, kind: QueryKind, bindings: &Bindings) -> Result<String> {
        let sql = self.template(kind)?.render(bindings)?;
        Ok(self.db.translator().finalize(sql))
    }

    /// Turns a WHERE fragment (or a full SELECT) plus read options into a
    /// parameterized command.
    pub(crate) fn build_query(
        &self,
        kind: QueryKind,
        description: Option<&TypeDescription>,
        projection: &Projection,
        query: &str,
        args: &[Value],
        options: &ReadOptions,
    ) -> Result<Command> {
        let translator = self.db.translator();
        let mut parameters = self.native_parameters(args, options.skip_translator);

        if is_full_select(query) {
            return Ok(Command::with_parameters(
                translator.finalize(query.to_string()),
                parameters,
            ));
        }

        let archive_field = description
            .filter(|_| options.ignore_archived)
            .and_then(|d| d.archive_field.as_deref());
        if archive_field.is_some() {
            parameters.push(translator.to_native(&Value::Boolean(false)));
        }

        let limit = match kind {
            QueryKind::Select => options.maximum_record_count,
            QueryKind::Exist => 1,
            _ => 0,
        };

        let buffer_key = if options.use_query_buffer {
            let id = options
                .buffered_query_id
                .get_or_init(|| Uuid::new_v4().to_string());
            let type_id = description.map_or(0, |d| d.type_id);
            // Narrowed copies share the id, so the field shape is part of the key.
            Some(format!(
                "{}:{:?}:{}:{}:{:?}:{}:{}",
                id,
                kind,
                type_id,
                limit,
                projection,
                options.fields.join(","),
                options.load_delayed
            ))
        } else {
            None
        };

        if let Some(key) = &buffer_key {
            if let Some(sql) = self.db.query_buffer().get(key)? {
                debug!("Reusing buffered query {}", key);
                return Ok(Command::with_parameters(sql, parameters));
            }
        }

        let template = self.template(kind)?;
        let row_limit = if limit > 0 {
            translator.row_limit(limit)
        } else {
            RowLimit::default()
        };

        let mut bindings = Bindings::new().bind(Placeholder::Top, row_limit.prefix.clone());
        if template.contains(Placeholder::FieldNames) {
            let desc = require(description, Placeholder::FieldNames)?;
            bindings.set(Placeholder::FieldNames, field_list(desc, projection, options)?);
        }
        if template.contains(Placeholder::TableName) {
            let desc = require(description, Placeholder::TableName)?;
            bindings.set(Placeholder::TableName, desc.table_name.clone());
        }
        if template.contains(Placeholder::FieldNameKey) {
            let desc = require(description, Placeholder::FieldNameKey)?;
            bindings.set(Placeholder::FieldNameKey, desc.primary_key()?.name.clone());
        }

        let mut sql = template.render(&bindings)?;

        let mut conditions = Vec::new();
        let filter = normalize_operators(query.trim());
        if !filter.trim().is_empty() {
            conditions.push(if archive_field.is_some() {
                format!("({})", filter.trim())
            } else {
                filter.trim().to_string()
            });
        }
        if let Some(archive) = archive_field {
            conditions.push(format!("({} IS NULL OR {} = ?)", archive, archive));
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        if let Some(group) = options.group_on.as_deref().filter(|g| !g.trim().is_empty()) {
            sql.push_str(" GROUP BY ");
            sql.push_str(group);
        }

        if kind != QueryKind::Delete {
            if let Some(order) = options.order_by.as_deref().filter(|o| !o.trim().is_empty()) {
                sql.push_str(&format!(" ORDER BY {} {}", order, options.order_mode.as_sql()));
            }
        }

        sql.push_str(&row_limit.suffix);
        let sql = translator.finalize(sql);

        if let Some(key) = &buffer_key {
            self.db.query_buffer().put(key, sql.clone())?;
        }

        Ok(Command::with_parameters(sql, parameters))
    }

    fn traced<R>(
        &mut self,
        command: &Command,
        op: impl FnOnce(&mut (dyn DriverConnection + 'static), &Command) -> Result<R>,
        rows: impl FnOnce(&R) -> u64,
    ) -> Result<R> {
        let id = self.id;
        let hooks = Arc::clone(self.db.hooks());
        let driver = self.driver_mut()?;

        let span = tracing::debug_span!(
            "db.execute",
            connection = id,
            sql = %command.sql,
            parameters = command.parameters.len()
        );
        let _enter = span.enter();

        let mut trace = ExecutionTrace::new(id, command);
        hooks.before_execute(&trace);
        debug!("Executing: {}", command);

        let started = Instant::now();
        let result = op(driver, command);
        let elapsed = started.elapsed();
        trace.elapsed = Some(elapsed);

        match &result {
            Ok(value) => {
                let count = rows(value);
                trace.rows = Some(count);
                tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, rows = count, "command finished");
            }
            Err(err) => {
                tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, error = %err, "command failed");
            }
        }

        hooks.after_execute(&trace);
        result
    }

    pub(crate) fn execute_command(&mut self, command: &Command) -> Result<u64> {
        self.traced(command, |driver, cmd| driver.execute(cmd), |rows| *rows)
    }

    pub(crate) fn query_command(&mut self, command: &Command) -> Result<QueryResult> {
        self.traced(command, |driver, cmd| driver.query(cmd), |result| {
            result.row_count() as u64
        })
    }

    pub(crate) fn scalar_command(&mut self, command: &Command) -> Result<Option<Value>> {
        self.traced(command, |driver, cmd| driver.query_scalar(cmd), |value| {
            u64::from(value.is_some())
        })
    }

    pub(crate) fn cursor_command(&mut self, command: &Command) -> Result<Box<dyn RowCursor>> {
        let cursor = self.traced(command, |driver, cmd| driver.open_cursor(cmd), |_| 0)?;
        cursor.ok_or_else(|| {
            DbError::ReaderUnavailable(format!("Driver refused a reader for '{}'", command.sql))
        })
    }

    /// Runs a COUNT-style command and reads the number it returns.
    pub(crate) fn count_command(&mut self, command: &Command) -> Result<i64> {
        Ok(self
            .scalar_command(command)?
            .and_then(|v| v.as_i64())
            .unwrap_or(0))
    }

    /// Raw statement passthrough; returns the affected row count.
    pub fn execute_raw(&mut self, sql: &str, args: &[Value]) -> Result<u64> {
        let command = Command::with_parameters(
            self.db.translator().finalize(sql.to_string()),
            self.native_parameters(args, false),
        );
        self.execute_command(&command)
    }

    /// Raw query passthrough.
    pub fn query_raw(&mut self, sql: &str, args: &[Value]) -> Result<QueryResult> {
        let command = Command::with_parameters(
            self.db.translator().finalize(sql.to_string()),
            self.native_parameters(args, false),
        );
        self.query_command(&command)
    }
}
