#![cfg(feature = "test-util")]

mod common;

use common::{fake_executor, order_key, Order};
use tabletheory::{Ctx, UpdateSpec};

#[tokio::test]
async fn put_then_get_round_trips_through_the_derive_macro() {
    let exec = fake_executor();
    let ctx = Ctx::new();
    let order = Order::new("cust#1", "order#1", "Ada Lovelace", 3);

    exec.put(&ctx, &order, false).await.unwrap();

    let fetched: Order = exec.get(&ctx, order_key("cust#1", "order#1")).await.unwrap();
    assert_eq!(fetched.customer_name, "Ada Lovelace");
    assert_eq!(fetched.quantity, 3);
    assert_eq!(fetched.version, 0);
    assert!(fetched.created_at.is_some());
    assert!(fetched.updated_at.is_some());
}

#[tokio::test]
async fn get_on_a_missing_key_is_not_found() {
    let exec = fake_executor();
    let ctx = Ctx::new();

    let err = exec.get::<Order>(&ctx, order_key("cust#nope", "order#nope")).await.unwrap_err();
    assert!(matches!(err, tabletheory::error::GetError::NotFound));
}

// `FakeWire::update_item` (see its own doc comment) never interprets the
// compiled `update_expression` string — it just hands back whatever is
// already stored at the key, the same reason its conditions are never
// enforced. So this exercises the request/response shape (the call
// succeeds and the existing item round-trips back through `Model::from_item`)
// rather than the field mutation itself, which only a real store applies.
#[tokio::test]
async fn update_against_an_existing_key_round_trips_its_current_attributes() {
    let exec = fake_executor();
    let ctx = Ctx::new();
    let order = Order::new("cust#2", "order#1", "Grace Hopper", 1);
    exec.put(&ctx, &order, false).await.unwrap();

    let spec = UpdateSpec {
        sets: vec![tabletheory::expr::update::SetAction::Assign(
            "quantity".to_string(),
            tabletheory::AttributeValue::n(5),
        )],
        ..Default::default()
    };
    let updated: Order = exec.update(&ctx, order_key("cust#2", "order#1"), spec).await.unwrap();

    assert_eq!(updated.customer_name, "Grace Hopper");
}

#[tokio::test]
async fn delete_removes_the_item() {
    let exec = fake_executor();
    let ctx = Ctx::new();
    let order = Order::new("cust#3", "order#1", "Margaret Hamilton", 2);
    exec.put(&ctx, &order, false).await.unwrap();

    exec.delete::<Order>(&ctx, order_key("cust#3", "order#1"), None).await.unwrap();

    let err = exec.get::<Order>(&ctx, order_key("cust#3", "order#1")).await.unwrap_err();
    assert!(matches!(err, tabletheory::error::GetError::NotFound));
}

#[tokio::test]
async fn put_overwrites_an_existing_item_with_the_same_key() {
    let exec = fake_executor();
    let ctx = Ctx::new();
    let first = Order::new("cust#4", "order#1", "Katherine Johnson", 1);
    exec.put(&ctx, &first, false).await.unwrap();

    let second = Order::new("cust#4", "order#1", "Katherine Johnson", 9);
    exec.put(&ctx, &second, false).await.unwrap();

    let fetched: Order = exec.get(&ctx, order_key("cust#4", "order#1")).await.unwrap();
    assert_eq!(fetched.quantity, 9);
}
