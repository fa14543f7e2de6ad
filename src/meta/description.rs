use crate::core::{DataType, DbError, Result, Value};

/// Stable numeric identifier of a persistent type.
///
/// Used as the key of the schema ledger and inside generated index names, so
/// it must never change once a type has been deployed.
pub type TypeId = u64;

/// Engine-managed role of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SystemField {
    #[default]
    None,
    PrimaryKey,
    TimestampCreated,
    TimestampChanged,
}

impl SystemField {
    pub fn is_timestamp(&self) -> bool {
        matches!(self, Self::TimestampCreated | Self::TimestampChanged)
    }
}

/// Referential action applied by a foreign-key constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForeignKeyAction {
    #[default]
    NoAction,
    Cascade,
    SetNull,
    SetDefault,
    Restrict,
}

impl ForeignKeyAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
            Self::Restrict => "RESTRICT",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyTarget {
    pub type_id: TypeId,
    pub on_update: ForeignKeyAction,
    pub on_delete: ForeignKeyAction,
}

/// Storage metadata of one persistent field.
#[derive(Debug, Clone)]
pub struct PropertyDescription {
    pub name: String,
    pub data_type: DataType,
    pub system: SystemField,
    pub nullable: bool,
    /// Declared maximum length of string fields; 0 means unbounded.
    pub max_length: u32,
    pub delayed: bool,
    pub unique: bool,
    pub indexed: bool,
    pub always_save: bool,
    pub loggable: bool,
    pub description: Option<String>,
    pub default_value: Option<Value>,
    pub foreign_key: Option<ForeignKeyTarget>,
    /// Source expression of a view column.
    pub source: Option<String>,
}

impl PropertyDescription {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            system: SystemField::None,
            nullable: true,
            max_length: 0,
            delayed: false,
            unique: false,
            indexed: false,
            always_save: false,
            loggable: false,
            description: None,
            default_value: None,
            foreign_key: None,
            source: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.system = SystemField::PrimaryKey;
        self.nullable = false;
        self
    }

    pub fn created(mut self) -> Self {
        self.system = SystemField::TimestampCreated;
        self
    }

    pub fn changed(mut self) -> Self {
        self.system = SystemField::TimestampChanged;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn max_length(mut self, length: u32) -> Self {
        self.max_length = length;
        self
    }

    pub fn delayed(mut self) -> Self {
        self.delayed = true;
        self
    }

    /// Unique fields are always indexed.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self.indexed = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn always_save(mut self) -> Self {
        self.always_save = true;
        self
    }

    pub fn loggable(mut self) -> Self {
        self.loggable = true;
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn references(
        mut self,
        type_id: TypeId,
        on_update: ForeignKeyAction,
        on_delete: ForeignKeyAction,
    ) -> Self {
        self.foreign_key = Some(ForeignKeyTarget {
            type_id,
            on_update,
            on_delete,
        });
        self
    }

    pub fn source(mut self, expression: impl Into<String>) -> Self {
        self.source = Some(expression.into());
        self
    }

    pub fn is_primary_key(&self) -> bool {
        self.system == SystemField::PrimaryKey
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Table,
    /// A view; `base_query` contains a `#FIELDS#` placeholder that receives
    /// the projection built from each field's source expression.
    View { base_query: String },
}

/// Complete storage description of a persistent type.
#[derive(Debug, Clone)]
pub struct TypeDescription {
    pub type_name: String,
    pub type_id: TypeId,
    pub version: u32,
    pub table_name: String,
    pub kind: TypeKind,
    pub fields: Vec<PropertyDescription>,
    pub cached: bool,
    pub audited: bool,
    pub caption_fields: Vec<String>,
    pub info_fields: Vec<String>,
    pub archive_field: Option<String>,
    pub base_type: Option<String>,
}

impl TypeDescription {
    pub fn table(
        type_name: impl Into<String>,
        table_name: impl Into<String>,
        type_id: TypeId,
        version: u32,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            type_id,
            version,
            table_name: table_name.into(),
            kind: TypeKind::Table,
            fields: Vec::new(),
            cached: false,
            audited: false,
            caption_fields: Vec::new(),
            info_fields: Vec::new(),
            archive_field: None,
            base_type: None,
        }
    }

    pub fn view(
        type_name: impl Into<String>,
        view_name: impl Into<String>,
        type_id: TypeId,
        version: u32,
        base_query: impl Into<String>,
    ) -> Self {
        Self {
            kind: TypeKind::View {
                base_query: base_query.into(),
            },
            ..Self::table(type_name, view_name, type_id, version)
        }
    }

    pub fn field(mut self, field: PropertyDescription) -> Self {
        self.fields.push(field);
        self
    }

    pub fn cached(mut self) -> Self {
        self.cached = true;
        self
    }

    pub fn audited(mut self) -> Self {
        self.audited = true;
        self
    }

    pub fn caption_fields(mut self, fields: &[&str]) -> Self {
        self.caption_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn info_fields(mut self, fields: &[&str]) -> Self {
        self.info_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn archive_field(mut self, field: impl Into<String>) -> Self {
        self.archive_field = Some(field.into());
        self
    }

    pub fn base_type(mut self, name: impl Into<String>) -> Self {
        self.base_type = Some(name.into());
        self
    }

    pub fn is_view(&self) -> bool {
        matches!(self.kind, TypeKind::View { .. })
    }

    pub fn get_field(&self, name: &str) -> Option<&PropertyDescription> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    fn system_field(&self, role: SystemField) -> Option<&PropertyDescription> {
        self.fields.iter().find(|f| f.system == role)
    }

    pub fn primary_key(&self) -> Result<&PropertyDescription> {
        self.system_field(SystemField::PrimaryKey).ok_or_else(|| {
            DbError::Configuration(format!("Type '{}' has no primary key field", self.type_name))
        })
    }

    pub fn created_field(&self) -> Option<&PropertyDescription> {
        self.system_field(SystemField::TimestampCreated)
    }

    pub fn changed_field(&self) -> Option<&PropertyDescription> {
        self.system_field(SystemField::TimestampChanged)
    }

    pub fn has_delayed_fields(&self) -> bool {
        self.fields.iter().any(|f| f.delayed)
    }

    /// Checks the structural invariants the engine relies on: exactly one
    /// primary key, and for tables exactly one created and one changed
    /// timestamp.
    pub fn validate(&self) -> Result<()> {
        let count = |role: SystemField| self.fields.iter().filter(|f| f.system == role).count();

        if self.table_name.trim().is_empty() {
            return Err(DbError::Configuration(format!(
                "Type '{}' is not mapped to a table or view",
                self.type_name
            )));
        }

        if count(SystemField::PrimaryKey) != 1 {
            return Err(DbError::Configuration(format!(
                "Type '{}' must declare exactly one primary key field",
                self.type_name
            )));
        }

        if self.kind == TypeKind::Table {
            if count(SystemField::TimestampCreated) != 1 {
                return Err(DbError::Configuration(format!(
                    "Table type '{}' must declare exactly one created timestamp field",
                    self.type_name
                )));
            }
            if count(SystemField::TimestampChanged) != 1 {
                return Err(DbError::Configuration(format!(
                    "Table type '{}' must declare exactly one changed timestamp field",
                    self.type_name
                )));
            }
        }

        if let TypeKind::View { base_query } = &self.kind {
            if !base_query.contains("#FIELDS#") {
                return Err(DbError::Configuration(format!(
                    "View type '{}' base query lacks a #FIELDS# placeholder",
                    self.type_name
                )));
            }
        }

        Ok(())
    }
}
