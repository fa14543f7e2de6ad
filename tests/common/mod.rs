#![allow(dead_code)]

use std::sync::{Arc, Mutex, OnceLock};

use chrono::NaiveDateTime;
use dbweave::core::DataType;
use dbweave::meta::ModelInfo;
use dbweave::{
    Configuration, Database, DatabaseHooks, Entity, EventLog, ExecutionTrace, FromValue,
    ForeignKeyAction, MemoryChangeLog, PropertyDescription, RecordState, Result,
    TypeDescription, Value,
};
use tempfile::TempDir;
use uuid::Uuid;

pub const CUSTOMER_TYPE: u64 = 1001;
pub const ORDER_TYPE: u64 = 1002;
pub const SUMMARY_TYPE: u64 = 1003;

#[derive(Debug, Clone, Default)]
pub struct Customer {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub balance: f64,
    pub notes: String,
    pub archived: bool,
    pub created_at: Option<NaiveDateTime>,
    pub changed_at: Option<NaiveDateTime>,
    state: RecordState,
}

impl Customer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
            ..Self::default()
        }
    }
}

impl Entity for Customer {
    fn description() -> &'static TypeDescription {
        static DESCRIPTION: OnceLock<TypeDescription> = OnceLock::new();
        DESCRIPTION.get_or_init(|| {
            TypeDescription::table("Customer", "customers", CUSTOMER_TYPE, 1)
                .field(PropertyDescription::new("Id", DataType::Guid).primary_key())
                .field(
                    PropertyDescription::new("Name", DataType::String)
                        .max_length(100)
                        .loggable()
                        .description("Display name"),
                )
                .field(
                    PropertyDescription::new("Email", DataType::String)
                        .max_length(200)
                        .indexed(),
                )
                .field(PropertyDescription::new("Balance", DataType::Double).default_value(0.0))
                .field(PropertyDescription::new("Notes", DataType::String).delayed())
                .field(PropertyDescription::new("Archived", DataType::Boolean).default_value(false))
                .field(PropertyDescription::new("CreatedAt", DataType::DateTime).created())
                .field(PropertyDescription::new("ChangedAt", DataType::DateTime).changed())
                .cached()
                .audited()
                .caption_fields(&["Name"])
                .info_fields(&["Email"])
                .archive_field("Archived")
        })
    }

    fn get_value(&self, field: &str) -> Option<Value> {
        Some(match field {
            "Id" => Value::Guid(self.id),
            "Name" => Value::Text(self.name.clone()),
            "Email" => Value::Text(self.email.clone()),
            "Balance" => Value::Float(self.balance),
            "Notes" => Value::Text(self.notes.clone()),
            "Archived" => Value::Boolean(self.archived),
            "CreatedAt" => self.created_at.into(),
            "ChangedAt" => self.changed_at.into(),
            _ => return None,
        })
    }

    fn set_value(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "Id" => self.id = Uuid::from_value(value)?,
            "Name" => self.name = String::from_value(value)?,
            "Email" => self.email = String::from_value(value)?,
            "Balance" => self.balance = f64::from_value(value)?,
            "Notes" => self.notes = String::from_value(value)?,
            "Archived" => self.archived = bool::from_value(value)?,
            "CreatedAt" => self.created_at = Option::from_value(value)?,
            "ChangedAt" => self.changed_at = Option::from_value(value)?,
            _ => {}
        }
        Ok(())
    }

    fn record_state(&self) -> &RecordState {
        &self.state
    }

    fn record_state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }

    fn customize_info(info: &mut ModelInfo) {
        info.caption = info.caption.to_uppercase();
    }
}

#[derive(Debug, Clone, Default)]
pub struct Order {
    pub id: i64,
    pub customer_id: Uuid,
    pub amount: f64,
    pub created_at: Option<NaiveDateTime>,
    pub changed_at: Option<NaiveDateTime>,
    state: RecordState,
}

impl Order {
    pub fn new(customer: &Customer, amount: f64) -> Self {
        Self {
            customer_id: customer.id,
            amount,
            ..Self::default()
        }
    }
}

impl Entity for Order {
    fn description() -> &'static TypeDescription {
        static DESCRIPTION: OnceLock<TypeDescription> = OnceLock::new();
        DESCRIPTION.get_or_init(|| {
            TypeDescription::table("Order", "orders", ORDER_TYPE, 1)
                .field(PropertyDescription::new("Id", DataType::Int64).primary_key())
                .field(
                    PropertyDescription::new("CustomerId", DataType::Guid).references(
                        CUSTOMER_TYPE,
                        ForeignKeyAction::Cascade,
                        ForeignKeyAction::Cascade,
                    ),
                )
                .field(PropertyDescription::new("Amount", DataType::Double))
                .field(PropertyDescription::new("CreatedAt", DataType::DateTime).created())
                .field(PropertyDescription::new("ChangedAt", DataType::DateTime).changed())
        })
    }

    fn get_value(&self, field: &str) -> Option<Value> {
        Some(match field {
            "Id" => Value::Integer(self.id),
            "CustomerId" => Value::Guid(self.customer_id),
            "Amount" => Value::Float(self.amount),
            "CreatedAt" => self.created_at.into(),
            "ChangedAt" => self.changed_at.into(),
            _ => return None,
        })
    }

    fn set_value(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "Id" => self.id = i64::from_value(value)?,
            "CustomerId" => self.customer_id = Uuid::from_value(value)?,
            "Amount" => self.amount = f64::from_value(value)?,
            "CreatedAt" => self.created_at = Option::from_value(value)?,
            "ChangedAt" => self.changed_at = Option::from_value(value)?,
            _ => {}
        }
        Ok(())
    }

    fn record_state(&self) -> &RecordState {
        &self.state
    }

    fn record_state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }
}

/// Read-only aggregate over customers and their orders.
#[derive(Debug, Clone, Default)]
pub struct CustomerSummary {
    pub id: Uuid,
    pub name: String,
    pub order_count: i64,
    pub total: f64,
    state: RecordState,
}

impl Entity for CustomerSummary {
    fn description() -> &'static TypeDescription {
        static DESCRIPTION: OnceLock<TypeDescription> = OnceLock::new();
        DESCRIPTION.get_or_init(|| {
            TypeDescription::view(
                "CustomerSummary",
                "customer_summaries",
                SUMMARY_TYPE,
                1,
                "SELECT #FIELDS# FROM customers c LEFT JOIN orders o ON o.CustomerId = c.Id GROUP BY c.Id, c.Name",
            )
            .field(
                PropertyDescription::new("Id", DataType::Guid)
                    .primary_key()
                    .source("c.Id"),
            )
            .field(PropertyDescription::new("Name", DataType::String).source("c.Name"))
            .field(PropertyDescription::new("OrderCount", DataType::Int64).source("COUNT(o.Id)"))
            .field(
                PropertyDescription::new("Total", DataType::Double)
                    .source("COALESCE(SUM(o.Amount), 0)"),
            )
        })
    }

    fn get_value(&self, field: &str) -> Option<Value> {
        Some(match field {
            "Id" => Value::Guid(self.id),
            "Name" => Value::Text(self.name.clone()),
            "OrderCount" => Value::Integer(self.order_count),
            "Total" => Value::Float(self.total),
            _ => return None,
        })
    }

    fn set_value(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "Id" => self.id = Uuid::from_value(value)?,
            "Name" => self.name = String::from_value(value)?,
            "OrderCount" => self.order_count = i64::from_value(value)?,
            "Total" => self.total = f64::from_value(value)?,
            _ => {}
        }
        Ok(())
    }

    fn record_state(&self) -> &RecordState {
        &self.state
    }

    fn record_state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }
}

/// Records the SQL of every executed command.
#[derive(Debug, Default)]
pub struct CountingHooks {
    statements: Mutex<Vec<String>>,
}

impl CountingHooks {
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.statements.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.statements.lock().unwrap().clear();
    }

    pub fn ddl(&self) -> Vec<String> {
        self.statements()
            .into_iter()
            .filter(|sql| {
                let upper = sql.trim_start().to_uppercase();
                upper.starts_with("CREATE") || upper.starts_with("ALTER") || upper.starts_with("DROP")
            })
            .collect()
    }
}

impl DatabaseHooks for CountingHooks {
    fn after_execute(&self, trace: &ExecutionTrace) {
        self.statements.lock().unwrap().push(trace.sql.clone());
    }
}

pub struct Harness {
    pub db: Database,
    pub hooks: Arc<CountingHooks>,
    pub events: Arc<EventLog>,
    pub changes: Arc<MemoryChangeLog>,
    _dir: TempDir,
}

/// Database on a fresh SQLite file with all test types registered and synced.
pub fn harness() -> Harness {
    harness_with(|config| config)
}

pub fn harness_with(configure: impl FnOnce(Configuration) -> Configuration) -> Harness {
    let harness = unsynced_harness_with(configure);
    harness.db.check_all(false).unwrap();
    harness.hooks.clear();
    harness
}

/// Like [`harness_with`], but no schema has been created yet.
pub fn unsynced_harness_with(configure: impl FnOnce(Configuration) -> Configuration) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.db");
    let config = configure(Configuration::sqlite(path.to_str().unwrap()));

    let hooks = Arc::new(CountingHooks::default());
    let events = Arc::new(EventLog::new());
    let changes = Arc::new(MemoryChangeLog::new());
    let db = Database::builder(config)
        .hooks(hooks.clone())
        .events(events.clone())
        .change_log(changes.clone())
        .build()
        .unwrap();

    db.register::<Customer>().unwrap();
    db.register::<Order>().unwrap();
    db.register::<CustomerSummary>().unwrap();

    Harness {
        db,
        hooks,
        events,
        changes,
        _dir: dir,
    }
}
