#![cfg(feature = "test-util")]

mod common;

use common::{fake_executor, order_key, Order};
use tabletheory::expr::update::SetAction;
use tabletheory::{Ctx, Transaction};

// `FakeWire::transact_write_items` (see its doc comment) treats `Update` as
// a presence check only — it never applies the compiled update expression
// to a key that's already present. So this checks the create and delete
// ops' actual effect and confirms the update op commits without error,
// rather than asserting a field value only a real store would apply.
#[tokio::test]
async fn transaction_commits_a_mixed_put_update_delete_batch() {
    let exec = fake_executor();
    let ctx = Ctx::new();

    // Seed one order the transaction will update and one it will delete.
    exec.put(&ctx, &Order::new("cust#1", "order#update", "Ada", 1), false).await.unwrap();
    exec.put(&ctx, &Order::new("cust#1", "order#delete", "Ada", 1), false).await.unwrap();

    let mut txn = Transaction::new(&exec);
    txn.create(&Order::new("cust#1", "order#new", "Ada", 7)).await;
    txn.update_with_builder::<Order>(order_key("cust#1", "order#update"), |b| {
        b.set(SetAction::Assign("quantity".to_string(), tabletheory::AttributeValue::n(42)))
    })
    .await;
    txn.delete::<Order>(order_key("cust#1", "order#delete"), None).await;

    assert_eq!(txn.len(), 3);
    txn.execute(&ctx).await.unwrap();

    let created: Order = exec.get(&ctx, order_key("cust#1", "order#new")).await.unwrap();
    assert_eq!(created.quantity, 7);

    // Still present: the update op's key-exists check passed.
    let updated: Order = exec.get(&ctx, order_key("cust#1", "order#update")).await.unwrap();
    assert_eq!(updated.customer_name, "Ada");

    let deleted = exec.get::<Order>(&ctx, order_key("cust#1", "order#delete")).await;
    assert!(deleted.is_err());
}

#[tokio::test]
async fn an_empty_transaction_is_a_no_op() {
    let exec = fake_executor();
    let ctx = Ctx::new();
    let txn = Transaction::new(&exec);

    assert!(txn.is_empty());
    txn.execute(&ctx).await.unwrap();
}

#[tokio::test]
async fn too_many_operations_latches_an_error_returned_from_execute() {
    let exec = fake_executor();
    let ctx = Ctx::new();
    let mut txn = Transaction::new(&exec);

    for i in 0..26 {
        txn.put(&Order::new("cust#1", format!("order#{i}"), "Ada", 1)).await;
    }

    let err = txn.execute(&ctx).await.unwrap_err();
    assert!(matches!(err, tabletheory::error::TransactError::TooManyOperations(_)));
}
