//! Fixtures shared by this directory's integration tests: a model exercised
//! through the real `#[derive(Model)]` expansion (the crate's own
//! `exec`/`txn` unit tests use a hand-written `Model` impl instead, since
//! they live inside the crate and predate the derive crate being wired up)
//! plus an executor backed by `FakeWire`.

#![cfg(feature = "test-util")]

use std::sync::Arc;
use tabletheory::{Clock, Executor, FixedClock};

#[derive(Debug, Clone, PartialEq, tabletheory::Model)]
#[model(table = "orders")]
pub struct Order {
    #[model(pk)]
    pub pk: String,
    #[model(sk)]
    pub sk: String,
    pub customer_name: String,
    pub quantity: i64,
    #[model(version)]
    pub version: i64,
    #[model(created_at)]
    pub created_at: Option<String>,
    #[model(updated_at)]
    pub updated_at: Option<String>,
}

impl Order {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>, customer_name: impl Into<String>, quantity: i64) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
            customer_name: customer_name.into(),
            quantity,
            version: 0,
            created_at: None,
            updated_at: None,
        }
    }
}

pub fn frozen_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock::new("2026-02-01T00:00:00.000000000Z", 1769904000))
}

pub fn fake_executor() -> Executor {
    let wire = Arc::new(tabletheory::wire::fake::FakeWire::new());
    Executor::new(wire, frozen_clock())
}

pub fn order_key(pk: &str, sk: &str) -> tabletheory::wire::Item {
    let mut key = tabletheory::wire::Item::new();
    key.insert("pk".to_string(), tabletheory::AttributeValue::S(pk.to_string()));
    key.insert("sk".to_string(), tabletheory::AttributeValue::S(sk.to_string()));
    key
}
