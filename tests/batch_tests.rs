#![cfg(feature = "test-util")]

mod common;

use common::{fake_executor, order_key, Order};
use tabletheory::exec::BatchWriteOp;
use tabletheory::retry::BackoffPolicy;
use tabletheory::Ctx;

#[tokio::test]
async fn batch_write_then_batch_get_round_trips_every_item() {
    let exec = fake_executor();
    let ctx = Ctx::new();
    let policy = BackoffPolicy::default();

    let ops = vec![
        BatchWriteOp::Put(Order::new("cust#1", "order#1", "Ada", 1)),
        BatchWriteOp::Put(Order::new("cust#1", "order#2", "Ada", 2)),
        BatchWriteOp::Put(Order::new("cust#2", "order#1", "Grace", 3)),
    ];
    exec.batch_write::<Order>(&ctx, ops, &policy).await.unwrap();

    let keys = vec![
        Some(order_key("cust#1", "order#1")),
        Some(order_key("cust#1", "order#2")),
        Some(order_key("cust#2", "order#1")),
    ];
    let fetched: Vec<Option<Order>> = exec.batch_get(&ctx, keys, false, &policy).await.unwrap();

    assert_eq!(fetched.len(), 3);
    assert_eq!(fetched[0].as_ref().unwrap().customer_name, "Ada");
    assert_eq!(fetched[1].as_ref().unwrap().quantity, 2);
    assert_eq!(fetched[2].as_ref().unwrap().customer_name, "Grace");
}

#[tokio::test]
async fn batch_get_returns_none_for_keys_that_are_missing_or_absent_in_the_request() {
    let exec = fake_executor();
    let ctx = Ctx::new();
    let policy = BackoffPolicy::default();

    exec.put(&ctx, &Order::new("cust#3", "order#1", "Katherine", 1), false).await.unwrap();

    let keys = vec![
        Some(order_key("cust#3", "order#1")),
        None,
        Some(order_key("cust#3", "order#missing")),
    ];
    let fetched: Vec<Option<Order>> = exec.batch_get(&ctx, keys, false, &policy).await.unwrap();

    assert_eq!(fetched.len(), 2);
    assert_eq!(fetched[0].as_ref().unwrap().customer_name, "Katherine");
    assert!(fetched[1].is_none());
}

#[tokio::test]
async fn batch_write_delete_removes_the_item() {
    let exec = fake_executor();
    let ctx = Ctx::new();
    let policy = BackoffPolicy::default();

    exec.put(&ctx, &Order::new("cust#4", "order#1", "Margaret", 1), false).await.unwrap();

    let ops: Vec<BatchWriteOp<Order>> = vec![BatchWriteOp::Delete(order_key("cust#4", "order#1"))];
    exec.batch_write::<Order>(&ctx, ops, &policy).await.unwrap();

    let fetched: Vec<Option<Order>> =
        exec.batch_get(&ctx, vec![Some(order_key("cust#4", "order#1"))], false, &policy).await.unwrap();
    assert!(fetched[0].is_none());
}
