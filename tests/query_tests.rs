/// Query tests
///
/// Select variants, read options, aggregates, readers and the entity cache.
/// Run with: cargo test --test query_tests
mod common;

use common::{Customer, CustomerSummary, Harness, Order, harness};
use dbweave::{Connection, OrderMode, ReadOptions, Value};

fn seed(h: &Harness) -> (Connection, Vec<Customer>) {
    let mut conn = h.db.get_connection().unwrap();
    let mut customers = Vec::new();
    for (name, balance) in [("Alpha", 10.0), ("Bravo", 20.0), ("Charlie", 30.0), ("Delta", 40.0)] {
        let mut customer = Customer::new(name);
        customer.balance = balance;
        conn.save(&mut customer).unwrap();
        customers.push(customer);
    }
    h.hooks.clear();
    (conn, customers)
}

fn names(records: &[Customer]) -> Vec<&str> {
    records.iter().map(|c| c.name.as_str()).collect()
}

#[test]
fn test_select_with_order_and_limit() {
    let h = harness();
    let (mut conn, _) = seed(&h);

    let options = ReadOptions::new()
        .order_by("Name", OrderMode::Descending)
        .maximum_record_count(2);
    let records: Vec<Customer> = conn.select("", &[], &options).unwrap();
    assert_eq!(names(&records), vec!["Delta", "Charlie"]);
}

#[test]
fn test_select_with_arguments_and_shorthand_operators() {
    let h = harness();
    let (mut conn, _) = seed(&h);

    let options = ReadOptions::new().order_by("Name", OrderMode::Ascending);
    let records: Vec<Customer> = conn
        .select(
            "Balance > ? && Balance < ? || Name = ?",
            &[Value::from(15.0), Value::from(35.0), Value::from("Alpha")],
            &options,
        )
        .unwrap();
    assert_eq!(names(&records), vec!["Alpha", "Bravo", "Charlie"]);
}

#[test]
fn test_always_include_survives_filter_and_limit() {
    let h = harness();
    let (mut conn, customers) = seed(&h);
    let delta = customers[3].id;

    let options = ReadOptions::new()
        .order_by("Name", OrderMode::Ascending)
        .maximum_record_count(2)
        .filter_records::<Customer, _>(|c| c.balance < 15.0)
        .always_include(delta);
    let records: Vec<Customer> = conn.select("", &[], &options).unwrap();
    assert_eq!(names(&records), vec!["Alpha", "Delta"]);
}

#[test]
fn test_always_include_may_exceed_limit() {
    let h = harness();
    let (mut conn, customers) = seed(&h);

    let options = ReadOptions::new()
        .order_by("Name", OrderMode::Ascending)
        .maximum_record_count(2)
        .always_include(customers[3].id);
    let records: Vec<Customer> = conn.select("", &[], &options).unwrap();
    assert_eq!(names(&records), vec!["Alpha", "Bravo", "Delta"]);
}

#[test]
fn test_full_select_bypasses_templates() {
    let h = harness();
    let (mut conn, _) = seed(&h);

    let records: Vec<Customer> = conn
        .select(
            "SELECT * FROM customers WHERE Name = ?",
            &[Value::from("Bravo")],
            &ReadOptions::new(),
        )
        .unwrap();
    assert_eq!(names(&records), vec!["Bravo"]);
}

#[test]
fn test_select_single() {
    let h = harness();
    let (mut conn, _) = seed(&h);

    let options = ReadOptions::new().order_by("Balance", OrderMode::Descending);
    let richest: Customer = conn.select_single("", &[], &options).unwrap().unwrap();
    assert_eq!(richest.name, "Delta");

    let missing: Option<Customer> = conn
        .select_single("Name = ?", &[Value::from("Nobody")], &ReadOptions::new())
        .unwrap();
    assert!(missing.is_none());
}

#[test]
fn test_ignore_archived() {
    let h = harness();
    let (mut conn, mut customers) = seed(&h);

    customers[0].archived = true;
    conn.save(&mut customers[0]).unwrap();

    let all = conn.count::<Customer>("", &[]).unwrap();
    let live = conn
        .count_with::<Customer>("", &[], &ReadOptions::new().ignore_archived(true))
        .unwrap();
    assert_eq!(all, 4);
    assert_eq!(live, 3);
}

#[test]
fn test_infos_use_caption_and_customization() {
    let h = harness();
    let (mut conn, customers) = seed(&h);

    let options = ReadOptions::new().order_by("Name", OrderMode::Ascending);
    let infos = conn.select_infos::<Customer>("", &[], &options).unwrap();
    assert_eq!(infos.len(), 4);
    assert_eq!(infos[0].caption, "ALPHA");
    assert_eq!(infos[0].key, Value::Guid(customers[0].id));
    assert_eq!(infos[0].get("Email"), Some(&Value::from("alpha@example.com")));

    let single = conn
        .select_single_info::<Customer>("Name = ?", &[Value::from("Bravo")], &ReadOptions::new())
        .unwrap()
        .unwrap();
    assert_eq!(single.caption, "BRAVO");
}

#[test]
fn test_reader_streams_records() {
    let h = harness();
    let (mut conn, _) = seed(&h);

    let options = ReadOptions::new()
        .order_by("Name", OrderMode::Ascending)
        .filter_records::<Customer, _>(|c| c.name != "Bravo");
    let mut reader = conn.select_reader::<Customer>("", &[], &options).unwrap();
    let first = reader.read().unwrap().unwrap();
    assert_eq!(first.name, "Alpha");

    let rest: Vec<Customer> = reader.by_ref().collect::<dbweave::Result<_>>().unwrap();
    assert_eq!(names(&rest), vec!["Charlie", "Delta"]);
    reader.close();
    assert!(reader.is_closed());

    // The connection stays usable after the reader is closed.
    assert_eq!(conn.count::<Customer>("", &[]).unwrap(), 4);
}

#[test]
fn test_data_table_and_dictionary() {
    let h = harness();
    let (mut conn, customers) = seed(&h);

    let table = conn
        .select_data_table::<Customer>(
            "Name = ?",
            &[Value::from("Charlie")],
            &ReadOptions::new().fields(&["Name", "Balance"]),
        )
        .unwrap();
    assert_eq!(table.columns, vec!["Id", "Name", "Balance"]);
    assert_eq!(table.value(0, "Id"), Some(&Value::Guid(customers[2].id)));
    assert_eq!(table.value(0, "Balance"), Some(&Value::Float(30.0)));

    let map = conn
        .select_dictionary::<Customer>("Id", "Name", "", &[], &ReadOptions::new())
        .unwrap();
    assert_eq!(map.len(), 4);
    assert_eq!(map.get(&Value::Guid(customers[1].id)), Some(&Value::from("Bravo")));
}

#[test]
fn test_count_and_sum() {
    let h = harness();
    let (mut conn, customers) = seed(&h);

    for amount in [5.0, 7.5] {
        conn.save(&mut Order::new(&customers[0], amount)).unwrap();
    }
    conn.save(&mut Order::new(&customers[1], 100.0)).unwrap();

    assert_eq!(conn.count::<Order>("", &[]).unwrap(), 3);
    let alpha_total = conn
        .sum::<Order>("Amount", "CustomerId = ?", &[Value::Guid(customers[0].id)])
        .unwrap();
    assert_eq!(alpha_total, 12.5);
    assert_eq!(
        conn.sum::<Order>("Amount", "Amount > ?", &[Value::from(1000.0)]).unwrap(),
        0.0
    );
}

#[test]
fn test_view_reads() {
    let h = harness();
    let (mut conn, customers) = seed(&h);
    conn.save(&mut Order::new(&customers[2], 4.0)).unwrap();
    conn.save(&mut Order::new(&customers[2], 6.0)).unwrap();

    let summary: CustomerSummary = conn
        .select_single("Name = ?", &[Value::from("Charlie")], &ReadOptions::new())
        .unwrap()
        .unwrap();
    assert_eq!(summary.id, customers[2].id);
    assert_eq!(summary.order_count, 2);
    assert_eq!(summary.total, 10.0);
}

#[test]
fn test_query_buffer_reuses_expansion() {
    let h = harness();
    let (mut conn, _) = seed(&h);

    let options = ReadOptions::new().use_query_buffer(true);
    let first: Vec<Customer> = conn
        .select("Name = ?", &[Value::from("Alpha")], &options)
        .unwrap();
    let second: Vec<Customer> = conn
        .select("Name = ?", &[Value::from("Bravo")], &options)
        .unwrap();
    assert_eq!(names(&first), vec!["Alpha"]);
    assert_eq!(names(&second), vec!["Bravo"]);

    let statements = h.hooks.statements();
    assert_eq!(statements[0], statements[1]);
}

#[test]
fn test_buffered_infos_do_not_narrow_later_selects() {
    let h = harness();
    let (mut conn, _) = seed(&h);

    let options = ReadOptions::new().use_query_buffer(true);
    let args = [Value::from("Delta")];
    let infos = conn.select_infos::<Customer>("Name = ?", &args, &options).unwrap();
    assert_eq!(infos.len(), 1);

    let records: Vec<Customer> = conn.select("Name = ?", &args, &options).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].balance, 40.0);

    let statements = h.hooks.statements();
    assert_ne!(statements[0], statements[1]);
}

#[test]
fn test_cached_load_skips_database() {
    let h = harness();
    let (mut conn, customers) = seed(&h);
    let id = customers[0].id;

    let first: Customer = conn.load(id).unwrap().unwrap();
    h.hooks.clear();

    let second: Customer = conn.load(id).unwrap().unwrap();
    assert_eq!(second.name, first.name);
    assert_eq!(h.hooks.count(), 0);

    let _: Customer = conn.load_with(id, true).unwrap().unwrap();
    assert_eq!(h.hooks.count(), 1);
}

#[test]
fn test_cache_follows_save_and_delete() {
    let h = harness();
    let (mut conn, mut customers) = seed(&h);
    let id = customers[1].id;

    customers[1].name = "Bravo Prime".into();
    conn.save(&mut customers[1]).unwrap();
    let cached = h.db.from_cache::<Customer>(&Value::Guid(id)).unwrap().unwrap();
    assert_eq!(cached.name, "Bravo Prime");

    conn.delete(&customers[1]).unwrap();
    assert!(h.db.from_cache::<Customer>(&Value::Guid(id)).unwrap().is_none());
    assert!(conn.load::<Customer>(id).unwrap().is_none());
}

#[test]
fn test_rollback_evicts_cached_writes() {
    let h = harness();
    let mut conn = h.db.get_connection().unwrap();

    conn.begin_transaction().unwrap();
    let mut customer = Customer::new("Ephemeral");
    conn.save(&mut customer).unwrap();
    assert!(h.db.from_cache::<Customer>(&Value::Guid(customer.id)).unwrap().is_some());
    conn.rollback_transaction().unwrap();

    assert!(h.db.from_cache::<Customer>(&Value::Guid(customer.id)).unwrap().is_none());
    assert!(conn.load::<Customer>(customer.id).unwrap().is_none());
}
