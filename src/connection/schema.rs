use std::collections::HashSet;

use log::{debug, info, warn};

use crate::core::{DataType, DbError, Result, Value};
use crate::dialect::{
    Bindings, ColumnScheme, Placeholder, QueryKind, SqlTemplate, TriggerEvent, quote_literal,
};
use crate::driver::Command;
use crate::meta::{Entity, PropertyDescription, TypeDescription, TypeId, TypeKind};

use super::ledger::SystemDatabaseInformation;
use super::options::SaveOptions;
use super::Connection;

fn index_name(description: &TypeDescription, field: &str) -> String {
    format!("IX_{}_{}", description.type_id, field)
}

fn foreign_key_name(description: &TypeDescription, field: &str) -> String {
    format!("FK_{}_{}", description.table_name, field)
}

fn changed_trigger_name(description: &TypeDescription) -> String {
    format!("TR_{}_changed", description.table_name)
}

impl Connection {
    /// Reconcile the live schema of `T` with its declaration
    ///
    /// Runs only when forced or when the ledger records an older version.
    /// Returns whether reconciliation ran.
    pub fn check<T: Entity>(&mut self, force: bool) -> Result<bool> {
        self.check_description(T::description(), force)
    }

    pub fn check_description(
        &mut self,
        description: &'static TypeDescription,
        force: bool,
    ) -> Result<bool> {
        let mut visited = HashSet::new();
        self.check_type(description, force, &mut visited)
    }

    fn check_type(
        &mut self,
        description: &'static TypeDescription,
        force: bool,
        visited: &mut HashSet<TypeId>,
    ) -> Result<bool> {
        if !visited.insert(description.type_id) {
            return Ok(false);
        }
        description
            .validate()
            .map_err(|err| DbError::schema(&description.type_name, err))?;

        self.ensure_ledger()?;
        let stored =
            self.load_with::<SystemDatabaseInformation>(description.type_id as i64, true)?;
        let is_new = stored.is_none();
        let mut ledger = stored.unwrap_or_else(|| SystemDatabaseInformation::new(description));

        let version = i32::try_from(description.version).map_err(|_| {
            DbError::schema(&description.type_name, "version does not fit the ledger")
        })?;
        if !force && !is_new && ledger.version >= version {
            debug!(
                "Schema of {} is at version {}, nothing to do",
                description.type_name, ledger.version
            );
            return Ok(false);
        }

        info!(
            "Synchronizing schema of {} ({} -> {})",
            description.type_name, ledger.version, version
        );
        let synced = if description.is_view() {
            self.sync_view(description)
        } else {
            self.sync_table(description, visited)
        };
        synced.map_err(|err| match err {
            err @ DbError::Schema { .. } => err,
            other => DbError::schema(&description.type_name, other),
        })?;

        if is_new || ledger.version != version || ledger.table_name != description.table_name {
            ledger.version = version;
            ledger.table_name = description.table_name.clone();
            let options = SaveOptions::new().force_create(is_new);
            self.silently(|conn| conn.save_with(&mut ledger, &options))?;
        }
        Ok(true)
    }

    fn ensure_ledger(&mut self) -> Result<()> {
        if self.ledger_ready {
            return Ok(());
        }
        let description = SystemDatabaseInformation::description();
        if !self.exist_table(&description.table_name)? {
            self.sync_table(description, &mut HashSet::new())?;
        }
        self.ledger_ready = true;
        Ok(())
    }

    fn sync_table(
        &mut self,
        description: &'static TypeDescription,
        visited: &mut HashSet<TypeId>,
    ) -> Result<()> {
        let table = &description.table_name;
        if !self.exist_table(table)? {
            self.create_table_for(description)?;
        }

        let live = self.get_scheme(table)?;
        let find = |name: &str| live.iter().find(|c| c.name.eq_ignore_ascii_case(name));

        for field in &description.fields {
            if field.system.is_timestamp() || field.is_primary_key() {
                continue;
            }

            match find(&field.name) {
                None => self.add_field(description, field)?,
                Some(column) => self.widen_field(description, field, column)?,
            }

            if field.indexed || field.unique {
                let name = index_name(description, &field.name);
                self.drop_index(table, &name)?;
                self.create_index(table, &name, &field.name, field.unique)?;
            }

            if field.foreign_key.is_some() {
                self.ensure_foreign_key(description, field, visited)?;
            }
        }

        if self.db.config().allow_drop_columns {
            for column in &live {
                if description.get_field(&column.name).is_none() {
                    self.drop_index(table, &index_name(description, &column.name))?;
                    self.drop_field(table, &column.name)?;
                }
            }
        }
        Ok(())
    }

    fn sync_view(&mut self, description: &TypeDescription) -> Result<()> {
        let TypeKind::View { base_query } = &description.kind else {
            return Err(DbError::Configuration(format!(
                "{} is not a view",
                description.type_name
            )));
        };

        let projection = description
            .fields
            .iter()
            .map(|f| match &f.source {
                Some(source) => format!("{} AS {}", source, f.name),
                None => f.name.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        let query = SqlTemplate::parse(base_query)?
            .render(&Bindings::new().bind(Placeholder::Fields, projection))?;

        let view = &description.table_name;
        if self.exist_view(view)? {
            self.drop_view(view)?;
        }
        self.create_view(view, &query)
    }

    /// Creates the table with its key and timestamp columns plus the
    /// changed-timestamp trigger, atomically unless a transaction is
    /// already open.
    fn create_table_for(&mut self, description: &TypeDescription) -> Result<()> {
        let pk = description.primary_key()?;
        let missing = |what: &str| {
            DbError::Configuration(format!("{} has no {} field", description.type_name, what))
        };
        let created = description.created_field().ok_or_else(|| missing("created"))?;
        let changed = description.changed_field().ok_or_else(|| missing("changed"))?;
        let translator = self.translator();

        let table = Bindings::new()
            .bind(Placeholder::TableName, description.table_name.clone())
            .bind(Placeholder::FieldNameKey, pk.name.clone())
            .bind(Placeholder::KeyType, translator.field_type(pk.data_type, pk.max_length))
            .bind(Placeholder::CreatedField, created.name.clone())
            .bind(Placeholder::ChangedField, changed.name.clone())
            .bind(Placeholder::FieldType, translator.field_type(DataType::DateTime, 0));
        let trigger = Bindings::new()
            .bind(Placeholder::Name, changed_trigger_name(description))
            .bind(Placeholder::TableName, description.table_name.clone())
            .bind(Placeholder::ChangedField, changed.name.clone())
            .bind(Placeholder::FieldNameKey, pk.name.clone());

        let owned = !self.is_in_transaction();
        if owned {
            self.driver_mut()?.begin()?;
        }

        let result = self
            .ddl(QueryKind::CreateTable, &table)
            .and_then(|_| self.ddl(QueryKind::ChangedTrigger, &trigger));

        match result {
            Ok(_) if owned => self.driver_mut()?.commit(),
            Ok(_) => Ok(()),
            Err(err) => {
                if owned {
                    if let Err(rollback) = self.driver_mut().and_then(|d| d.rollback()) {
                        warn!(
                            "Rollback after failed creation of {} failed: {}",
                            description.table_name, rollback
                        );
                    }
                }
                Err(DbError::schema(&description.type_name, err))
            }
        }
    }

    fn add_field(&mut self, description: &TypeDescription, field: &PropertyDescription) -> Result<()> {
        let translator = self.translator();
        let options = match &field.default_value {
            Some(default) => format!(" NOT NULL DEFAULT {}", sql_literal(&translator.to_native(default))),
            None => String::new(),
        };

        self.ddl(
            QueryKind::CreateField,
            &Bindings::new()
                .bind(Placeholder::TableName, description.table_name.clone())
                .bind(Placeholder::FieldName, field.name.clone())
                .bind(Placeholder::FieldType, translator.field_type(field.data_type, field.max_length))
                .bind(Placeholder::FieldOptions, options),
        )?;

        if let Some(comment) = &field.description {
            if self.supports(QueryKind::SetComment) {
                self.set_comment(&description.table_name, &field.name, comment)?;
            } else {
                debug!(
                    "{} cannot store column comments, skipping {}.{}",
                    self.db.config().dialect,
                    description.table_name,
                    field.name
                );
            }
        }
        Ok(())
    }

    fn widen_field(
        &mut self,
        description: &TypeDescription,
        field: &PropertyDescription,
        column: &ColumnScheme,
    ) -> Result<()> {
        if field.data_type != DataType::String || field.max_length == 0 {
            return Ok(());
        }
        let Some(size) = column.size.filter(|s| *s < field.max_length) else {
            return Ok(());
        };

        if !self.supports(QueryKind::AlterFieldSize) {
            debug!(
                "{} cannot widen {}.{} from {} to {}",
                self.db.config().dialect,
                description.table_name,
                field.name,
                size,
                field.max_length
            );
            return Ok(());
        }

        self.ddl(
            QueryKind::AlterFieldSize,
            &Bindings::new()
                .bind(Placeholder::TableName, description.table_name.clone())
                .bind(Placeholder::FieldName, field.name.clone())
                .bind(Placeholder::Size, field.max_length.to_string()),
        )?;
        Ok(())
    }

    fn ensure_foreign_key(
        &mut self,
        description: &TypeDescription,
        field: &PropertyDescription,
        visited: &mut HashSet<TypeId>,
    ) -> Result<()> {
        let Some(target) = &field.foreign_key else {
            return Ok(());
        };
        let referenced = self.db.registry().get(target.type_id)?;
        if !self.exist_table(&referenced.table_name)? {
            self.check_type(referenced, false, visited)?;
        }

        if !self.supports(QueryKind::CreateForeignKey) {
            debug!(
                "{} cannot add foreign keys to existing tables, skipping {}.{}",
                self.db.config().dialect,
                description.table_name,
                field.name
            );
            return Ok(());
        }

        let name = foreign_key_name(description, &field.name);
        if self.exists(QueryKind::ExistForeignKey, &[Value::from(name.as_str())])? {
            return Ok(());
        }
        self.create_constraint(description, field, referenced, &name)
    }

    fn create_constraint(
        &mut self,
        description: &TypeDescription,
        field: &PropertyDescription,
        referenced: &TypeDescription,
        name: &str,
    ) -> Result<()> {
        let Some(target) = &field.foreign_key else {
            return Err(DbError::Configuration(format!(
                "{}.{} does not reference another type",
                description.type_name, field.name
            )));
        };
        self.ddl(
            QueryKind::CreateForeignKey,
            &Bindings::new()
                .bind(Placeholder::Name, name)
                .bind(Placeholder::TableName, description.table_name.clone())
                .bind(Placeholder::FieldName, field.name.clone())
                .bind(Placeholder::RefTable, referenced.table_name.clone())
                .bind(Placeholder::RefField, referenced.primary_key()?.name.clone())
                .bind(Placeholder::OnUpdate, target.on_update.as_sql())
                .bind(Placeholder::OnDelete, target.on_delete.as_sql()),
        )?;
        Ok(())
    }

    fn ddl(&mut self, kind: QueryKind, bindings: &Bindings) -> Result<u64> {
        let sql = self.render(kind, bindings)?;
        info!("Schema change: {}", sql);
        self.execute_command(&Command::new(sql))
    }

    /// Runs a name-probe template returning a count.
    fn exists(&mut self, kind: QueryKind, args: &[Value]) -> Result<bool> {
        let sql = self.render(kind, &Bindings::new())?;
        let command = Command::with_parameters(sql, self.native_parameters(args, false));
        Ok(self.count_command(&command)? > 0)
    }

    pub fn exist_table(&mut self, table: &str) -> Result<bool> {
        self.exists(QueryKind::ExistTable, &[Value::from(table)])
    }

    /// Create the table of `T` if it is missing, without the ledger
    pub fn create_table<T: Entity>(&mut self) -> Result<()> {
        let description = T::description();
        if self.exist_table(&description.table_name)? {
            return Ok(());
        }
        self.create_table_for(description)
    }

    pub fn drop_table(&mut self, table: &str) -> Result<()> {
        self.ddl(
            QueryKind::DropTable,
            &Bindings::new().bind(Placeholder::TableName, table),
        )?;
        Ok(())
    }

    /// Add the column for one declared field of `T`
    pub fn create_field<T: Entity>(&mut self, field: &str) -> Result<()> {
        let description = T::description();
        let property = description.get_field(field).ok_or_else(|| {
            DbError::NotFound(format!("{}.{}", description.type_name, field))
        })?;
        self.add_field(description, property)
    }

    pub fn drop_field(&mut self, table: &str, field: &str) -> Result<()> {
        self.ddl(
            QueryKind::DropField,
            &Bindings::new()
                .bind(Placeholder::TableName, table)
                .bind(Placeholder::FieldName, field),
        )?;
        Ok(())
    }

    pub fn create_index(&mut self, table: &str, name: &str, field: &str, unique: bool) -> Result<()> {
        self.ddl(
            QueryKind::CreateIndex,
            &Bindings::new()
                .bind(Placeholder::Unique, if unique { "UNIQUE " } else { "" })
                .bind(Placeholder::Name, name)
                .bind(Placeholder::TableName, table)
                .bind(Placeholder::FieldName, field),
        )?;
        Ok(())
    }

    /// Drop an index; a missing index is not an error
    pub fn drop_index(&mut self, table: &str, name: &str) -> Result<()> {
        self.ddl(
            QueryKind::DropIndex,
            &Bindings::new()
                .bind(Placeholder::Name, name)
                .bind(Placeholder::TableName, table),
        )?;
        Ok(())
    }

    /// Add the foreign-key constraint declared on `field` of `T`
    pub fn create_foreign_key_constraint<T: Entity>(&mut self, field: &str) -> Result<()> {
        let description = T::description();
        let property = description.get_field(field).ok_or_else(|| {
            DbError::NotFound(format!("{}.{}", description.type_name, field))
        })?;
        let Some(target) = &property.foreign_key else {
            return Err(DbError::Configuration(format!(
                "{}.{} does not reference another type",
                description.type_name, property.name
            )));
        };
        let referenced = self.db.registry().get(target.type_id)?;
        let name = foreign_key_name(description, &property.name);
        self.create_constraint(description, property, referenced, &name)
    }

    /// Live columns of `table`
    pub fn get_scheme(&mut self, table: &str) -> Result<Vec<ColumnScheme>> {
        let sql = self.render(QueryKind::GetScheme, &Bindings::new())?;
        let command = Command::with_parameters(sql, vec![Value::from(table)]);
        let result = self.query_command(&command)?;
        self.db.translator().read_scheme(&result)
    }

    pub fn get_comment(&mut self, table: &str, field: &str) -> Result<Option<String>> {
        let sql = self.render(QueryKind::GetComment, &Bindings::new())?;
        let command =
            Command::with_parameters(sql, vec![Value::from(table), Value::from(field)]);
        Ok(self
            .scalar_command(&command)?
            .filter(|v| !v.is_null())
            .map(|v| v.to_string()))
    }

    pub fn set_comment(&mut self, table: &str, field: &str, comment: &str) -> Result<()> {
        self.ddl(
            QueryKind::SetComment,
            &Bindings::new()
                .bind(Placeholder::TableName, table)
                .bind(Placeholder::FieldName, field)
                .bind(Placeholder::Comment, quote_literal(comment)),
        )?;
        Ok(())
    }

    pub fn exist_view(&mut self, view: &str) -> Result<bool> {
        self.exists(QueryKind::ExistView, &[Value::from(view)])
    }

    pub fn create_view(&mut self, view: &str, query: &str) -> Result<()> {
        self.ddl(
            QueryKind::CreateView,
            &Bindings::new()
                .bind(Placeholder::TableName, view)
                .bind(Placeholder::Query, query),
        )?;
        Ok(())
    }

    pub fn drop_view(&mut self, view: &str) -> Result<()> {
        self.ddl(
            QueryKind::DropView,
            &Bindings::new().bind(Placeholder::TableName, view),
        )?;
        Ok(())
    }

    pub fn exist_trigger(&mut self, name: &str) -> Result<bool> {
        self.exists(QueryKind::ExistTrigger, &[Value::from(name)])
    }

    pub fn create_trigger(
        &mut self,
        name: &str,
        table: &str,
        event: TriggerEvent,
        body: &str,
    ) -> Result<()> {
        let event = self.db.translator().trigger_event(event)?;
        self.ddl(
            QueryKind::CreateTrigger,
            &Bindings::new()
                .bind(Placeholder::Name, name)
                .bind(Placeholder::Event, event)
                .bind(Placeholder::TableName, table)
                .bind(Placeholder::Body, body),
        )?;
        Ok(())
    }

    pub fn drop_trigger(&mut self, name: &str, table: &str) -> Result<()> {
        self.ddl(
            QueryKind::DropTrigger,
            &Bindings::new()
                .bind(Placeholder::Name, name)
                .bind(Placeholder::TableName, table),
        )?;
        Ok(())
    }

    pub fn exist_procedure(&mut self, name: &str) -> Result<bool> {
        self.exists(QueryKind::ExistProcedure, &[Value::from(name)])
    }

    pub fn create_procedure(&mut self, name: &str, body: &str) -> Result<()> {
        self.ddl(
            QueryKind::CreateProcedure,
            &Bindings::new()
                .bind(Placeholder::Name, name)
                .bind(Placeholder::Body, body),
        )?;
        Ok(())
    }

    pub fn drop_procedure(&mut self, name: &str) -> Result<()> {
        self.ddl(
            QueryKind::DropProcedure,
            &Bindings::new().bind(Placeholder::Name, name),
        )?;
        Ok(())
    }
}

/// Literal form of a native value inside DDL.
fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".into(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Boolean(b) => if *b { "1" } else { "0" }.into(),
        Value::Text(s) => quote_literal(s),
        other => quote_literal(&other.to_string()),
    }
}
