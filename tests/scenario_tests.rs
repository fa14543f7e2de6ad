/// End-to-end customer lifecycle.
/// Run with: cargo test --test scenario_tests
mod common;

use std::thread;
use std::time::Duration;

use common::{Customer, harness};
use dbweave::ChangeKind;

#[test]
fn test_customer_lifecycle() {
    let h = harness();
    let mut conn = h.db.get_connection().unwrap();

    let mut customer = Customer::new("Acme");
    assert!(conn.save(&mut customer).unwrap());
    assert!(!customer.id.is_nil());
    let created_at = customer.created_at.unwrap();
    let first_changed = customer.changed_at.unwrap();

    let mut loaded: Customer = conn.load(customer.id).unwrap().unwrap();
    assert_eq!(loaded.name, "Acme");

    thread::sleep(Duration::from_millis(5));
    h.events.clear().unwrap();
    loaded.name = "Acme Inc".into();
    assert!(conn.save(&mut loaded).unwrap());
    assert!(loaded.changed_at.unwrap() > first_changed);
    assert_eq!(loaded.created_at, Some(created_at));

    let events = h.events.events().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, ChangeKind::Changed);
    assert_eq!(events[0].record::<Customer>().unwrap().name, "Acme Inc");

    assert!(conn.delete(&loaded).unwrap());
    assert!(conn.load::<Customer>(customer.id).unwrap().is_none());
    assert!(!conn.exist::<Customer>(customer.id).unwrap());
}
