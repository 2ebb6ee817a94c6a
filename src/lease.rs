//! C9 — the lease manager (spec §4.9).
//!
//! Advisory, best-effort mutual exclusion on a single keyed record.
//! Grounded on the same conditional-write shape the executor (C6) and
//! transaction builder (C7) already use — `attribute_not_exists`/
//! `attribute_exists` conditions compiled through a
//! [`crate::expr::PlaceholderAllocator`] — applied here to the three
//! fixed lease operations instead of a model's own put/update/delete.

use crate::clock::Clock;
use crate::deadline::Ctx;
use crate::error::LeaseError;
use crate::expr::PlaceholderAllocator;
use crate::value::AttributeValue;
use crate::wire::{ConditionalWriteError, DeleteItemRequest, PutItemRequest, UpdateItemRequest, Wire};
use crate::wire::Item;
use std::sync::Arc;

/// A held lease: the key it was acquired on plus the token that proves
/// ownership for `refresh`/`release`.
#[derive(Debug, Clone)]
pub struct Lease {
    pub table: String,
    pub key: Item,
    pub token: String,
    pub expires_at: i64,
}

/// How long past `expires_at` a lease record's own store-level TTL
/// attribute is padded, so an abandoned lease is eventually reaped by the
/// store even if nobody ever calls `release`.
const DEFAULT_TTL_BUFFER_SECONDS: i64 = 3600;

pub struct LeaseManager {
    wire: Arc<dyn Wire>,
    clock: Arc<dyn Clock>,
    table: String,
    ttl_buffer_seconds: i64,
}

impl LeaseManager {
    pub fn new(wire: Arc<dyn Wire>, clock: Arc<dyn Clock>, table: impl Into<String>) -> Self {
        Self { wire, clock, table: table.into(), ttl_buffer_seconds: DEFAULT_TTL_BUFFER_SECONDS }
    }

    pub fn with_ttl_buffer_seconds(mut self, seconds: i64) -> Self {
        self.ttl_buffer_seconds = seconds;
        self
    }

    /// Acquire a lease on `key`, valid for `lease_seconds` from now.
    /// Succeeds if the record doesn't exist yet or its previous lease has
    /// already expired; otherwise fails with [`LeaseError::LeaseHeld`].
    pub async fn acquire(&self, ctx: &Ctx, key: Item, lease_seconds: i64) -> Result<Lease, LeaseError> {
        ctx.check_deadline()?;

        let now = self.clock.now_epoch_seconds();
        let token = uuid::Uuid::new_v4().to_string();
        let expires_at = now + lease_seconds;
        let ttl = expires_at + self.ttl_buffer_seconds;

        let mut item = key.clone();
        item.insert("lease_token".to_string(), AttributeValue::S(token.clone()));
        item.insert("expires_at".to_string(), AttributeValue::n(expires_at));
        item.insert("ttl".to_string(), AttributeValue::n(ttl));

        let mut alloc = PlaceholderAllocator::new();
        let not_exists = key
            .keys()
            .map(|k| format!("attribute_not_exists({})", alloc.name("c", k)))
            .collect::<Vec<_>>()
            .join(" AND ");
        let expires_ph = alloc.name("c", "expires_at");
        let now_val = alloc.value("c", AttributeValue::n(now));
        let condition = format!("({not_exists}) OR {expires_ph} <= {now_val}");
        let (names, values) = alloc.into_parts();

        let result = self
            .wire
            .put_item(PutItemRequest {
                table: self.table.clone(),
                item,
                condition_expression: Some(condition),
                expression_attribute_names: Some(names),
                expression_attribute_values: Some(values),
            })
            .await;

        match result {
            Ok(()) => Ok(Lease { table: self.table.clone(), key, token, expires_at }),
            Err(ConditionalWriteError::ConditionFailed) => Err(LeaseError::LeaseHeld),
            Err(ConditionalWriteError::Wire(e)) => Err(LeaseError::Wire(e)),
        }
    }

    /// Extend a held lease's expiry by `lease_seconds` from now. Fails
    /// with [`LeaseError::LeaseNotOwned`] if the token no longer matches
    /// or the lease has already expired.
    pub async fn refresh(&self, ctx: &Ctx, lease: &Lease, lease_seconds: i64) -> Result<Lease, LeaseError> {
        ctx.check_deadline()?;

        let now = self.clock.now_epoch_seconds();
        let new_expires_at = now + lease_seconds;
        let new_ttl = new_expires_at + self.ttl_buffer_seconds;

        let mut alloc = PlaceholderAllocator::new();
        let expires_name = alloc.name("u", "expires_at");
        let ttl_name = alloc.name("u", "ttl");
        let expires_val = alloc.value("u", AttributeValue::n(new_expires_at));
        let ttl_val = alloc.value("u", AttributeValue::n(new_ttl));
        let update_expression = format!("SET {expires_name} = {expires_val}, {ttl_name} = {ttl_val}");

        let token_name = alloc.name("c", "lease_token");
        let token_val = alloc.value("c", AttributeValue::S(lease.token.clone()));
        let now_val = alloc.value("c", AttributeValue::n(now));
        let condition = format!("{token_name} = {token_val} AND {expires_name} > {now_val}");
        let (names, values) = alloc.into_parts();

        let result = self
            .wire
            .update_item(UpdateItemRequest {
                table: self.table.clone(),
                key: lease.key.clone(),
                update_expression,
                condition_expression: Some(condition),
                expression_attribute_names: Some(names),
                expression_attribute_values: Some(values),
                return_values_all_new: false,
            })
            .await;

        match result {
            Ok(_) => Ok(Lease {
                table: lease.table.clone(),
                key: lease.key.clone(),
                token: lease.token.clone(),
                expires_at: new_expires_at,
            }),
            Err(ConditionalWriteError::ConditionFailed) => Err(LeaseError::LeaseNotOwned),
            Err(ConditionalWriteError::Wire(e)) => Err(LeaseError::Wire(e)),
        }
    }

    /// Release a held lease. A conditional failure (the token no longer
    /// matches, e.g. the lease already expired and was reacquired by
    /// someone else) is silently swallowed, per spec §4.9 — releasing a
    /// lease you no longer own is a no-op, not an error.
    pub async fn release(&self, ctx: &Ctx, lease: &Lease) -> Result<(), LeaseError> {
        ctx.check_deadline()?;

        let mut alloc = PlaceholderAllocator::new();
        let token_name = alloc.name("c", "lease_token");
        let token_val = alloc.value("c", AttributeValue::S(lease.token.clone()));
        let condition = format!("{token_name} = {token_val}");
        let (names, values) = alloc.into_parts();

        let result = self
            .wire
            .delete_item(DeleteItemRequest {
                table: lease.table.clone(),
                key: lease.key.clone(),
                condition_expression: Some(condition),
                expression_attribute_names: Some(names),
                expression_attribute_values: Some(values),
            })
            .await;

        match result {
            Ok(()) | Err(ConditionalWriteError::ConditionFailed) => Ok(()),
            Err(ConditionalWriteError::Wire(e)) => Err(LeaseError::Wire(e)),
        }
    }
}

// `FakeWire` keeps every table as a flat, condition-blind store (see its
// own doc comment) — the same reason `exec::tests` never drives a
// conditional-failure path through it. These tests exercise the
// request/response shape and the happy path; the `attribute_not_exists`/
// `lease_token =`/`expires_at` conditions themselves are compiled the same
// way `Executor::put`/`update` build theirs and are only actually enforced
// by a real store.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::wire::fake::FakeWire;
    use crate::wire::GetItemRequest;
    use std::collections::HashMap;

    fn manager_at(epoch_seconds: i64) -> LeaseManager {
        let wire = Arc::new(FakeWire::new());
        let clock = Arc::new(FixedClock::new("2026-01-16T00:00:00.000000000Z", epoch_seconds));
        LeaseManager::new(wire, clock, "locks")
    }

    fn key(pk: &str) -> Item {
        let mut m = HashMap::new();
        m.insert("pk".to_string(), AttributeValue::S(pk.to_string()));
        m
    }

    #[tokio::test]
    async fn acquire_returns_lease_with_expiry_and_writes_token() {
        let mgr = manager_at(1_000);
        let lease = mgr.acquire(&Ctx::new(), key("res-1"), 60).await.unwrap();
        assert_eq!(lease.expires_at, 1_060);
        assert!(!lease.token.is_empty());

        let stored = mgr
            .wire
            .get_item(GetItemRequest { table: "locks".to_string(), key: key("res-1"), consistent_read: true, ..Default::default() })
            .await
            .unwrap()
            .item
            .unwrap();
        assert_eq!(stored.get("lease_token"), Some(&AttributeValue::S(lease.token.clone())));
        assert_eq!(stored.get("expires_at"), Some(&AttributeValue::n(1_060)));
        assert_eq!(stored.get("ttl"), Some(&AttributeValue::n(1_060 + DEFAULT_TTL_BUFFER_SECONDS)));
    }

    #[tokio::test]
    async fn refresh_bumps_expiry_and_keeps_token() {
        let mgr = manager_at(1_000);
        let lease = mgr.acquire(&Ctx::new(), key("res-1"), 60).await.unwrap();

        let later_clock = Arc::new(FixedClock::new("2026-01-16T00:00:00.000000000Z", 1_030));
        let mgr_later = LeaseManager { wire: mgr.wire.clone(), clock: later_clock, table: mgr.table.clone(), ttl_buffer_seconds: mgr.ttl_buffer_seconds };
        let refreshed = mgr_later.refresh(&Ctx::new(), &lease, 60).await.unwrap();
        assert_eq!(refreshed.token, lease.token);
        assert_eq!(refreshed.expires_at, 1_090);
    }

    #[tokio::test]
    async fn release_removes_the_lease_record() {
        let mgr = manager_at(1_000);
        let lease = mgr.acquire(&Ctx::new(), key("res-1"), 60).await.unwrap();
        mgr.release(&Ctx::new(), &lease).await.unwrap();

        let stored = mgr
            .wire
            .get_item(GetItemRequest { table: "locks".to_string(), key: key("res-1"), consistent_read: true, ..Default::default() })
            .await
            .unwrap()
            .item;
        assert!(stored.is_none());

        // Releasing again is a no-op, not an error.
        mgr.release(&Ctx::new(), &lease).await.unwrap();
    }
}
