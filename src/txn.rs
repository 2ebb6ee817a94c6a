//! C7 — the transaction builder (spec §4.5).
//!
//! Grounded on `encrypted_table/mod.rs`'s `DynamoRecordPatch::
//! into_transact_write_items` (build up typed put/delete patches, then
//! assemble them into one `Vec<TransactWriteItem>` right before sending) and
//! the teacher's 25-item chunking limit, generalized from a single model's
//! patch set to heterogeneous `Put`/`Create`/`Update`/`Delete`/
//! `ConditionCheck` ops across possibly-different models.
//!
//! [`Transaction`] accumulates operations with the same "latch the first
//! error, keep accepting (and ignoring) further appends" rule the teacher's
//! query builder doesn't need but transactions do: a caller builds the
//! whole op list before committing, and a mid-build encryption or
//! expression-compile failure should surface once, at `execute`, rather
//! than panicking or silently truncating the op list.

use crate::deadline::Ctx;
use crate::error::{TransactError, TransactionFailure};
use crate::exec::{Executor, UpdateSpec};
use crate::expr::filter::FilterExpr;
use crate::expr::update::{SetAction, UpdateBuilder};
use crate::expr::{combine_conditions, exists_condition, PlaceholderAllocator};
use crate::registry::Model;
use crate::value::AttributeValue;
use crate::wire::{CancellationCode, CancellationReason, Item, TransactWriteOp, Wire};

/// The store's hard limit on operations in one `TransactWriteItems` call.
const MAX_OPERATIONS: usize = 25;

#[derive(Clone)]
struct OpLabel {
    kind: &'static str,
    model: String,
}

/// Accumulates heterogeneous write operations for one atomic commit.
///
/// Every `put`/`create`/`update`/`update_with_builder`/`delete`/
/// `condition_check` call is `async` because `Put`/`Update` may need to seal
/// encrypted fields before the op is queued — the same per-attribute
/// envelope step [`Executor::put`]/[`Executor::update`] apply outside a
/// transaction. None of these methods return a `Result`: once any one of
/// them fails (too many operations, an encryption or expression-compile
/// error) the builder latches that error and every later call becomes a
/// no-op, per spec §4.5 ("an operation-level error short-circuits further
/// appends"). The latched error, if any, is what [`Transaction::execute`]
/// returns.
pub struct Transaction<'a> {
    executor: &'a Executor,
    items: Vec<TransactWriteOp>,
    labels: Vec<OpLabel>,
    error: Option<TransactError>,
}

impl<'a> Transaction<'a> {
    pub fn new(executor: &'a Executor) -> Self {
        Self { executor, items: Vec::new(), labels: Vec::new(), error: None }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn push(&mut self, op: TransactWriteOp, kind: &'static str, model: String) {
        if self.error.is_some() {
            return;
        }
        if self.items.len() >= MAX_OPERATIONS {
            self.error = Some(TransactError::TooManyOperations(self.items.len() + 1));
            return;
        }
        self.items.push(op);
        self.labels.push(OpLabel { kind, model });
    }

    /// Put the model's full item, unconditionally. Stamps `created_at`/
    /// `updated_at`/`version` exactly as [`Executor::put`] does.
    pub async fn put<M: Model>(&mut self, model: &M) {
        self.put_inner(model, false).await
    }

    /// Put the model's full item with an implicit
    /// `attribute_not_exists(pk[, sk])` condition — the spec's `Create`.
    pub async fn create<M: Model>(&mut self, model: &M) {
        self.put_inner(model, true).await
    }

    async fn put_inner<M: Model>(&mut self, model: &M, if_not_exists: bool) {
        if self.error.is_some() {
            return;
        }
        let meta = M::metadata();
        let mut item = model.to_item();

        let now = self.executor.clock().now_rfc3339();
        if let Some(idx) = meta.created_at_field {
            item.insert(meta.fields[idx].db_name.clone(), AttributeValue::S(now.clone()));
        }
        if let Some(idx) = meta.updated_at_field {
            item.insert(meta.fields[idx].db_name.clone(), AttributeValue::S(now.clone()));
        }
        if let Some(idx) = meta.version_field {
            let db_name = &meta.fields[idx].db_name;
            if !item.contains_key(db_name) {
                item.insert(db_name.clone(), AttributeValue::n(0));
            }
        }

        let item = match self.executor.encrypt_item(meta, item).await {
            Ok(item) => item,
            Err(e) => {
                self.error = Some(e.into());
                return;
            }
        };

        let mut alloc = PlaceholderAllocator::new();
        let condition = if_not_exists.then(|| exists_condition(&mut alloc, &meta.pk, meta.sk.as_deref(), true));
        let (names, values) = alloc.into_parts();

        self.push(
            TransactWriteOp::Put {
                table: meta.table_name.clone(),
                item,
                condition_expression: condition,
                names: (!names.is_empty()).then_some(names),
                values: (!values.is_empty()).then_some(values),
            },
            if if_not_exists { "create" } else { "put" },
            meta.type_name.clone(),
        );
    }

    /// Field-list update, the same `UpdateSpec` shape [`Executor::update`]
    /// takes outside a transaction. Always stamps `updated_at` when the
    /// model declares that role field, and always requires the key to
    /// already exist (`attribute_exists(pk[, sk])`), ANDed with any
    /// caller-supplied `spec.condition`.
    pub async fn update<M: Model>(&mut self, key: Item, spec: UpdateSpec) {
        if self.error.is_some() {
            return;
        }
        let builder = UpdateBuilder {
            sets: spec.sets,
            removes: spec.removes,
            adds: spec.adds,
            deletes: spec.deletes,
        };
        self.push_update::<M>(key, builder, spec.condition).await;
    }

    /// Update via the fluent [`UpdateBuilder`] DSL instead of a
    /// pre-assembled [`UpdateSpec`] — the spec's `UpdateWithBuilder`. The
    /// closure runs against a fresh, empty builder and returns the one to
    /// compile; no wire call happens until the whole transaction commits.
    pub async fn update_with_builder<M: Model>(
        &mut self,
        key: Item,
        build: impl FnOnce(UpdateBuilder) -> UpdateBuilder,
    ) {
        if self.error.is_some() {
            return;
        }
        let builder = build(UpdateBuilder::new());
        self.push_update::<M>(key, builder, None).await;
    }

    async fn push_update<M: Model>(&mut self, key: Item, mut builder: UpdateBuilder, condition: Option<FilterExpr>) {
        let meta = M::metadata();

        if let Some(idx) = meta.updated_at_field {
            let db_name = meta.fields[idx].db_name.clone();
            builder.sets.push(SetAction::Assign(db_name, AttributeValue::S(self.executor.clock().now_rfc3339())));
        }

        if let Err(e) = self.executor.encrypt_update_sets(meta, &mut builder.sets).await {
            self.error = Some(e.into());
            return;
        }

        let mut alloc = PlaceholderAllocator::new();
        let update_expression = match builder.compile(&mut alloc, meta) {
            Ok(expr) => expr,
            Err(e) => {
                self.error = Some(e.into());
                return;
            }
        };

        let exists = exists_condition(&mut alloc, &meta.pk, meta.sk.as_deref(), false);
        let condition_expression = match &condition {
            Some(extra) => {
                if let Err(e) = crate::expr::check_no_encrypted_refs(extra, meta) {
                    self.error = Some(e.into());
                    return;
                }
                let extra_compiled = match extra.compile(&mut alloc, "c") {
                    Ok(c) => c,
                    Err(e) => {
                        self.error = Some(e.into());
                        return;
                    }
                };
                combine_conditions(Some(exists), Some(extra_compiled))
            }
            None => Some(exists),
        };

        let (names, values) = alloc.into_parts();

        self.push(
            TransactWriteOp::Update {
                table: meta.table_name.clone(),
                key,
                update_expression,
                condition_expression,
                names: (!names.is_empty()).then_some(names),
                values: (!values.is_empty()).then_some(values),
            },
            "update",
            meta.type_name.clone(),
        );
    }

    /// Delete, with an optional condition (no implicit existence check —
    /// deleting a key that is already gone is not an error here, matching
    /// [`Executor::delete`]).
    pub async fn delete<M: Model>(&mut self, key: Item, condition: Option<FilterExpr>) {
        if self.error.is_some() {
            return;
        }
        let meta = M::metadata();

        let mut alloc = PlaceholderAllocator::new();
        let condition_expression = match &condition {
            Some(expr) => {
                if let Err(e) = crate::expr::check_no_encrypted_refs(expr, meta) {
                    self.error = Some(e.into());
                    return;
                }
                match expr.compile(&mut alloc, "c") {
                    Ok(c) => Some(c),
                    Err(e) => {
                        self.error = Some(e.into());
                        return;
                    }
                }
            }
            None => None,
        };
        let (names, values) = alloc.into_parts();

        self.push(
            TransactWriteOp::Delete {
                table: meta.table_name.clone(),
                key,
                condition_expression,
                names: (!names.is_empty()).then_some(names),
                values: (!values.is_empty()).then_some(values),
            },
            "delete",
            meta.type_name.clone(),
        );
    }

    /// A condition check with no associated write: the whole transaction
    /// fails if `condition` does not hold for the item at `key`, but the
    /// item itself is untouched.
    pub async fn condition_check<M: Model>(&mut self, key: Item, condition: FilterExpr) {
        if self.error.is_some() {
            return;
        }
        let meta = M::metadata();

        if let Err(e) = crate::expr::check_no_encrypted_refs(&condition, meta) {
            self.error = Some(e.into());
            return;
        }

        let mut alloc = PlaceholderAllocator::new();
        let condition_expression = match condition.compile(&mut alloc, "c") {
            Ok(c) => c,
            Err(e) => {
                self.error = Some(e.into());
                return;
            }
        };
        let (names, values) = alloc.into_parts();

        self.push(
            TransactWriteOp::ConditionCheck {
                table: meta.table_name.clone(),
                key,
                condition_expression,
                names: (!names.is_empty()).then_some(names),
                values: (!values.is_empty()).then_some(values),
            },
            "condition_check",
            meta.type_name.clone(),
        );
    }

    /// Commit every accumulated operation as a single atomic write, with a
    /// fresh client-request idempotency token per attempt. Retries only
    /// when every non-`None` cancellation reason is one of
    /// `TransactionConflict`/`ProvisionedThroughputExceeded`/
    /// `ThrottlingError`/`InternalServerError` (real DynamoDB cancellation
    /// responses carry one reason per operation, `None` for the ones that
    /// weren't themselves the problem — those don't make the transaction
    /// non-retryable), on the fixed `{100,200,400,800}ms` schedule. A
    /// `ConditionalCheckFailed` reason, or schedule exhaustion, is terminal.
    pub async fn execute(mut self, ctx: &Ctx) -> Result<(), TransactError> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        ctx.check_deadline()?;
        if self.items.is_empty() {
            return Ok(());
        }

        let schedule = crate::retry::FixedSchedule::transaction_default();
        let mut attempt = 0usize;

        loop {
            ctx.check_deadline()?;
            let idempotency_token = uuid::Uuid::new_v4().to_string();

            match self.executor.wire().transact_write_items(self.items.clone(), idempotency_token).await {
                Ok(()) => return Ok(()),
                Err(wire_err) => {
                    if self.is_retryable(&wire_err.cancellation_reasons) && attempt < schedule.max_retries() {
                        schedule.sleep(ctx, attempt).await?;
                        attempt += 1;
                        continue;
                    }
                    return Err(self.terminal_failure(wire_err.cancellation_reasons));
                }
            }
        }
    }

    fn is_retryable(&self, reasons: &[CancellationReason]) -> bool {
        let real: Vec<&CancellationReason> = reasons.iter().filter(|r| r.code != CancellationCode::None).collect();
        !real.is_empty()
            && real.iter().all(|r| {
                matches!(
                    r.code,
                    CancellationCode::TransactionConflict
                        | CancellationCode::ProvisionedThroughputExceeded
                        | CancellationCode::ThrottlingError
                        | CancellationCode::InternalServerError
                )
            })
    }

    fn terminal_failure(&self, reasons: Vec<CancellationReason>) -> TransactError {
        let originating = reasons
            .iter()
            .enumerate()
            .find(|(_, r)| r.code != CancellationCode::None)
            .or_else(|| reasons.iter().enumerate().next());

        let Some((index, reason)) = originating else {
            return TransactError::Failed(TransactionFailure {
                operation_index: 0,
                operation_kind: "unknown",
                model: String::new(),
                message: "transaction cancelled with no cancellation reasons reported".to_string(),
                was_condition_check: false,
            });
        };

        let label = self.labels.get(index);
        TransactError::Failed(TransactionFailure {
            operation_index: index,
            operation_kind: label.map(|l| l.kind).unwrap_or("unknown"),
            model: label.map(|l| l.model.clone()).unwrap_or_default(),
            message: reason.message.clone().unwrap_or_else(|| "transaction cancelled".to_string()),
            was_condition_check: reason.code == CancellationCode::ConditionalCheckFailed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExprError;
    use crate::exec::test_support::{widget_executor, Widget};
    use crate::expr::filter::{Cond, FilterExpr};
    use crate::value::AttributeValue;
    use std::collections::HashMap;

    fn widget_key(pk: &str) -> Item {
        let mut k = HashMap::new();
        k.insert("pk".to_string(), AttributeValue::S(pk.to_string()));
        k
    }

    #[tokio::test]
    async fn commits_put_and_delete_atomically() {
        let exec = widget_executor();
        exec.put(&Ctx::new(), &Widget::new("keep", "first"), false).await.unwrap();
        exec.put(&Ctx::new(), &Widget::new("doomed", "second"), false).await.unwrap();

        let mut txn = Transaction::new(&exec);
        txn.put(&Widget::new("new", "third")).await;
        txn.delete::<Widget>(widget_key("doomed"), None).await;
        assert_eq!(txn.len(), 2);
        txn.execute(&Ctx::new()).await.unwrap();

        exec.get::<Widget>(&Ctx::new(), widget_key("new")).await.unwrap();
        let err = exec.get::<Widget>(&Ctx::new(), widget_key("doomed")).await.unwrap_err();
        assert!(matches!(err, crate::error::GetError::NotFound));
    }

    #[tokio::test]
    async fn too_many_operations_latches_and_surfaces_on_execute() {
        let exec = widget_executor();
        let mut txn = Transaction::new(&exec);
        for i in 0..26 {
            txn.put(&Widget::new(format!("w{i}"), "x")).await;
        }
        let err = txn.execute(&Ctx::new()).await.unwrap_err();
        assert!(matches!(err, TransactError::TooManyOperations(26)));
    }

    #[tokio::test]
    async fn condition_check_on_plain_field_queues_normally() {
        let exec = widget_executor();
        let mut txn = Transaction::new(&exec);
        txn.condition_check::<Widget>(
            widget_key("p"),
            FilterExpr::Leaf(Cond::Eq("name".to_string(), AttributeValue::S("x".into()))),
        )
        .await;
        assert_eq!(txn.len(), 1);
    }

    #[tokio::test]
    async fn condition_check_rejects_encrypted_field_reference() {
        use crate::registry::{AttrType, FieldMeta, ModelMetadata};
        use once_cell::sync::Lazy;

        struct Secret {
            pk: String,
            ssn: String,
        }

        static SECRET_META: Lazy<ModelMetadata> = Lazy::new(|| {
            let mut pk = FieldMeta::scalar("pk", AttrType::S);
            pk.is_pk = true;
            let mut ssn = FieldMeta::scalar("ssn", AttrType::S);
            ssn.is_encrypted = true;
            ModelMetadata::build("Secret", "secrets", vec![pk, ssn], vec![]).unwrap()
        });

        impl Model for Secret {
            fn metadata() -> &'static ModelMetadata {
                &SECRET_META
            }
            fn to_item(&self) -> HashMap<String, AttributeValue> {
                let mut m = HashMap::new();
                m.insert("pk".to_string(), AttributeValue::S(self.pk.clone()));
                m.insert("ssn".to_string(), AttributeValue::S(self.ssn.clone()));
                m
            }
            fn from_item(item: HashMap<String, AttributeValue>) -> Result<Self, crate::error::ConvertError> {
                Ok(Secret {
                    pk: item.get("pk").and_then(|v| v.as_s()).unwrap_or_default().to_string(),
                    ssn: item.get("ssn").and_then(|v| v.as_s()).unwrap_or_default().to_string(),
                })
            }
        }

        let exec = widget_executor();
        let mut txn = Transaction::new(&exec);
        txn.condition_check::<Secret>(
            widget_key("p"),
            FilterExpr::Leaf(Cond::Eq("ssn".to_string(), AttributeValue::S("123-45-6789".into()))),
        )
        .await;

        assert_eq!(txn.len(), 0);
        let err = txn.execute(&Ctx::new()).await.unwrap_err();
        assert!(matches!(err, TransactError::Expr(ExprError::EncryptedFieldNotQueryable(_))));
    }
}
