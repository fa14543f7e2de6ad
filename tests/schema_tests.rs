/// Schema synchronization tests
///
/// Versioned check, table/view creation, additive column changes and DDL
/// helpers against SQLite.
/// Run with: cargo test --test schema_tests
mod common;

use std::sync::OnceLock;

use common::{Customer, CustomerSummary, Order, harness, unsynced_harness_with};
use dbweave::core::DataType;
use dbweave::{
    Configuration, Database, DbError, Entity, FromValue, PropertyDescription, RecordState, Result, SystemDatabaseInformation,
    TriggerEvent, TypeDescription, Value,
};

#[test]
fn test_check_creates_tables_and_records_version() {
    let h = unsynced_harness_with(|config| config);
    let mut conn = h.db.get_connection().unwrap();

    assert!(!conn.exist_table("customers").unwrap());
    assert!(conn.check::<Customer>(false).unwrap());
    assert!(conn.exist_table("customers").unwrap());

    let ledger: SystemDatabaseInformation = conn
        .load(Customer::description().type_id as i64)
        .unwrap()
        .unwrap();
    assert_eq!(ledger.table_name, "customers");
    assert_eq!(ledger.version, 1);

    let columns: Vec<String> = conn
        .get_scheme("customers")
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    for expected in ["Id", "CreatedAt", "ChangedAt", "Name", "Email", "Balance", "Notes", "Archived"] {
        assert!(columns.iter().any(|c| c == expected), "missing column {}", expected);
    }
}

#[test]
fn test_second_check_emits_no_ddl() {
    let h = harness();
    let mut conn = h.db.get_connection().unwrap();

    assert!(!conn.check::<Customer>(false).unwrap());
    h.db.check_all(false).unwrap();
    assert!(h.hooks.ddl().is_empty(), "unexpected DDL: {:?}", h.hooks.ddl());

    // Forcing runs the sync again but leaves the ledger alone.
    assert!(conn.check::<Customer>(true).unwrap());
    assert!(
        h.hooks
            .statements()
            .iter()
            .all(|sql| !sql.contains("system_database_information") || sql.starts_with("SELECT"))
    );
}

#[test]
fn test_foreign_key_target_is_created_first() {
    let h = unsynced_harness_with(|config| config);
    let mut conn = h.db.get_connection().unwrap();

    conn.check::<Order>(false).unwrap();
    assert!(conn.exist_table("orders").unwrap());
    assert!(conn.exist_table("customers").unwrap());

    // The target went through a full check and has its own ledger row.
    let ledger: Option<SystemDatabaseInformation> =
        conn.load(Customer::description().type_id as i64).unwrap();
    assert!(ledger.is_some());
}

#[test]
fn test_views_are_created_from_sources() {
    let h = harness();
    let mut conn = h.db.get_connection().unwrap();

    assert!(conn.exist_view("customer_summaries").unwrap());
    let columns: Vec<String> = conn
        .get_scheme("customer_summaries")
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(columns, vec!["Id", "Name", "OrderCount", "Total"]);

    // Forced sync drops and recreates.
    assert!(conn.check::<CustomerSummary>(true).unwrap());
    assert!(conn.exist_view("customer_summaries").unwrap());
}

#[derive(Debug, Clone, Default)]
struct Widget {
    id: i64,
    label: String,
    state: RecordState,
}

fn widget_description(version: u32, extra: bool) -> TypeDescription {
    let mut description = TypeDescription::table("Widget", "widgets", 2001, version)
        .field(PropertyDescription::new("Id", DataType::Int64).primary_key())
        .field(PropertyDescription::new("Label", DataType::String).max_length(40))
        .field(PropertyDescription::new("CreatedAt", DataType::DateTime).created())
        .field(PropertyDescription::new("ChangedAt", DataType::DateTime).changed());
    if extra {
        description = description.field(
            PropertyDescription::new("Weight", DataType::Int32)
                .default_value(7)
                .indexed(),
        );
    }
    description
}

impl Entity for Widget {
    fn description() -> &'static TypeDescription {
        static DESCRIPTION: OnceLock<TypeDescription> = OnceLock::new();
        DESCRIPTION.get_or_init(|| widget_description(1, false))
    }

    fn get_value(&self, field: &str) -> Option<Value> {
        Some(match field {
            "Id" => Value::Integer(self.id),
            "Label" => Value::Text(self.label.clone()),
            _ => return None,
        })
    }

    fn set_value(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "Id" => self.id = i64::from_value(value)?,
            "Label" => self.label = String::from_value(value)?,
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

#[test]
fn test_new_version_adds_columns_and_indexes() {
    let h = unsynced_harness_with(|config| config);
    let mut conn = h.db.get_connection().unwrap();

    conn.check::<Widget>(false).unwrap();
    let mut widget = Widget {
        label: "gear".into(),
        ..Widget::default()
    };
    conn.save(&mut widget).unwrap();

    let v2: &'static TypeDescription = Box::leak(Box::new(widget_description(2, true)));
    h.hooks.clear();
    assert!(conn.check_description(v2, false).unwrap());

    let ddl = h.hooks.ddl();
    assert!(ddl.iter().any(|sql| sql.starts_with("ALTER TABLE widgets ADD COLUMN Weight INTEGER NOT NULL DEFAULT 7")));
    assert!(ddl.iter().any(|sql| sql == "CREATE INDEX IX_2001_Weight ON widgets (Weight)"));

    // Existing rows pick up the default.
    let result = conn.query_raw("SELECT Weight FROM widgets", &[]).unwrap();
    assert_eq!(result.first_value(), Some(&Value::Integer(7)));

    // Version 2 is now recorded; the same check is a no-op.
    h.hooks.clear();
    assert!(!conn.check_description(v2, false).unwrap());
    assert!(h.hooks.ddl().is_empty());
}

#[test]
fn test_drop_columns_when_allowed() {
    let h = unsynced_harness_with(|config| config.allow_drop_columns(true));
    let mut conn = h.db.get_connection().unwrap();

    let v2: &'static TypeDescription = Box::leak(Box::new(widget_description(2, true)));
    conn.check_description(v2, false).unwrap();
    assert!(conn.get_scheme("widgets").unwrap().iter().any(|c| c.name == "Weight"));

    let v3: &'static TypeDescription = Box::leak(Box::new(widget_description(3, false)));
    conn.check_description(v3, false).unwrap();
    assert!(!conn.get_scheme("widgets").unwrap().iter().any(|c| c.name == "Weight"));
}

#[test]
fn test_invalid_description_is_schema_error() {
    let h = unsynced_harness_with(|config| config);
    let mut conn = h.db.get_connection().unwrap();

    let broken: &'static TypeDescription = Box::leak(Box::new(
        TypeDescription::table("Broken", "broken", 2002, 1)
            .field(PropertyDescription::new("Id", DataType::Int64).primary_key()),
    ));
    let err = conn.check_description(broken, false).unwrap_err();
    assert!(matches!(err, DbError::Schema { ref type_name, .. } if type_name == "Broken"));
    assert!(!conn.exist_table("broken").unwrap());
}

#[test]
fn test_triggers_and_unsupported_procedures() {
    let h = harness();
    let mut conn = h.db.get_connection().unwrap();

    // The changed-timestamp trigger comes with the table.
    assert!(conn.exist_trigger("TR_customers_changed").unwrap());

    conn.create_trigger(
        "TR_orders_audit",
        "orders",
        TriggerEvent::AfterInsert,
        "UPDATE orders SET Amount = Amount WHERE Id = NEW.Id;",
    )
    .unwrap();
    assert!(conn.exist_trigger("TR_orders_audit").unwrap());
    conn.drop_trigger("TR_orders_audit", "orders").unwrap();
    assert!(!conn.exist_trigger("TR_orders_audit").unwrap());

    assert!(matches!(
        conn.create_procedure("p_noop", "SELECT 1;"),
        Err(DbError::Unsupported(_))
    ));
    assert!(matches!(
        conn.get_comment("customers", "Name"),
        Err(DbError::Unsupported(_))
    ));
}

#[test]
fn test_field_and_table_helpers() {
    let h = unsynced_harness_with(|config| config);
    let mut conn = h.db.get_connection().unwrap();

    conn.create_table::<Widget>().unwrap();
    assert!(conn.exist_table("widgets").unwrap());
    conn.create_field::<Widget>("Label").unwrap();
    conn.create_index("widgets", "IX_widgets_label", "Label", true).unwrap();

    conn.execute_raw("INSERT INTO widgets (Id, Label) VALUES (1, 'a')", &[]).unwrap();
    assert!(
        conn.execute_raw("INSERT INTO widgets (Id, Label) VALUES (2, 'a')", &[])
            .is_err()
    );

    conn.drop_index("widgets", "IX_widgets_label").unwrap();
    conn.drop_field("widgets", "Label").unwrap();
    assert!(!conn.get_scheme("widgets").unwrap().iter().any(|c| c.name == "Label"));

    conn.drop_table("widgets").unwrap();
    assert!(!conn.exist_table("widgets").unwrap());
}

#[test]
fn test_default_memory_database_is_shared_by_connections() {
    let db = Database::open(Configuration::default()).unwrap();
    db.register::<Customer>().unwrap();
    db.register::<Order>().unwrap();
    db.register::<CustomerSummary>().unwrap();
    db.check_all(false).unwrap();

    let mut customer = Customer::new("Memo");
    let mut writer = db.get_connection().unwrap();
    assert!(writer.save(&mut customer).unwrap());
    writer.close().unwrap();

    let mut reader = db.get_connection().unwrap();
    assert!(reader.exist_table("customers").unwrap());
    assert!(reader.exist::<Customer>(customer.id).unwrap());
}
