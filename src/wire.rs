//! The wire boundary: everything the executor (C6), batch orchestrator
//! (C11), transaction builder (C7), and lease manager (C9) need from the
//! store, behind one trait. Grounded on the teacher's `encrypted_table::
//! Dynamo`, which wraps `aws_sdk_dynamodb::Client` and `Deref`s straight
//! through to it — the same "thin wrapper, not a reinvented client" shape,
//! except here the wrapper is a trait so tests can swap in an in-memory
//! double instead of talking to a real table.

use crate::value::AttributeValue;
use async_trait::async_trait;
use std::collections::HashMap;

pub type Item = HashMap<String, AttributeValue>;

#[derive(Debug, Clone, Default)]
pub struct GetItemRequest {
    pub table: String,
    pub key: Item,
    pub consistent_read: bool,
    pub projection_expression: Option<String>,
    pub expression_attribute_names: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default)]
pub struct GetItemResponse {
    pub item: Option<Item>,
}

#[derive(Debug, Clone, Default)]
pub struct PutItemRequest {
    pub table: String,
    pub item: Item,
    pub condition_expression: Option<String>,
    pub expression_attribute_names: Option<HashMap<String, String>>,
    pub expression_attribute_values: Option<HashMap<String, AttributeValue>>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateItemRequest {
    pub table: String,
    pub key: Item,
    pub update_expression: String,
    pub condition_expression: Option<String>,
    pub expression_attribute_names: Option<HashMap<String, String>>,
    pub expression_attribute_values: Option<HashMap<String, AttributeValue>>,
    pub return_values_all_new: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateItemResponse {
    pub attributes: Option<Item>,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteItemRequest {
    pub table: String,
    pub key: Item,
    pub condition_expression: Option<String>,
    pub expression_attribute_names: Option<HashMap<String, String>>,
    pub expression_attribute_values: Option<HashMap<String, AttributeValue>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Select {
    AllAttributes,
    Count,
}

#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub table: String,
    pub index_name: Option<String>,
    pub key_condition_expression: String,
    pub filter_expression: Option<String>,
    pub projection_expression: Option<String>,
    pub expression_attribute_names: HashMap<String, String>,
    pub expression_attribute_values: HashMap<String, AttributeValue>,
    pub limit: Option<i32>,
    pub exclusive_start_key: Option<Item>,
    pub scan_index_forward: Option<bool>,
    pub select: Option<Select>,
    pub consistent_read: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    pub table: String,
    pub index_name: Option<String>,
    pub filter_expression: Option<String>,
    pub projection_expression: Option<String>,
    pub expression_attribute_names: HashMap<String, String>,
    pub expression_attribute_values: HashMap<String, AttributeValue>,
    pub limit: Option<i32>,
    pub exclusive_start_key: Option<Item>,
    pub select: Option<Select>,
    pub consistent_read: bool,
    pub segment: Option<i32>,
    pub total_segments: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct PageResponse {
    pub items: Vec<Item>,
    pub count: i32,
    pub scanned_count: i32,
    pub last_evaluated_key: Option<Item>,
}

#[derive(Debug, Clone)]
pub enum WriteRequestItem {
    Put(Item),
    Delete(Item),
}

#[derive(Debug, Clone, Default)]
pub struct BatchGetResponse {
    pub items: Vec<Item>,
    pub unprocessed_keys: Vec<Item>,
}

#[derive(Debug, Clone)]
pub struct BatchWriteUnprocessed {
    pub requests: Vec<WriteRequestItem>,
}

#[derive(Debug, Clone)]
pub enum TransactWriteOp {
    Put { table: String, item: Item, condition_expression: Option<String>, names: Option<HashMap<String, String>>, values: Option<HashMap<String, AttributeValue>> },
    Update { table: String, key: Item, update_expression: String, condition_expression: Option<String>, names: Option<HashMap<String, String>>, values: Option<HashMap<String, AttributeValue>> },
    Delete { table: String, key: Item, condition_expression: Option<String>, names: Option<HashMap<String, String>>, values: Option<HashMap<String, AttributeValue>> },
    ConditionCheck { table: String, key: Item, condition_expression: String, names: Option<HashMap<String, String>>, values: Option<HashMap<String, AttributeValue>> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationCode {
    None,
    ConditionalCheckFailed,
    TransactionConflict,
    ProvisionedThroughputExceeded,
    ThrottlingError,
    InternalServerError,
    Other,
}

#[derive(Debug, Clone)]
pub struct CancellationReason {
    pub code: CancellationCode,
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TransactWriteError {
    pub cancellation_reasons: Vec<CancellationReason>,
}

/// A write that carries a condition expression can fail it distinctly
/// from every other wire failure; this lets the executor surface
/// `condition_failed` instead of a generic wire error.
#[derive(Debug)]
pub enum ConditionalWriteError {
    ConditionFailed,
    Wire(crate::error::WireError),
}

impl From<crate::error::WireError> for ConditionalWriteError {
    fn from(e: crate::error::WireError) -> Self {
        ConditionalWriteError::Wire(e)
    }
}

/// Everything the library needs from the store. One impl talks to a real
/// table via `aws_sdk_dynamodb::Client` ([`AwsWire`]); another is an
/// in-memory double for tests ([`fake::FakeWire`]).
#[async_trait]
pub trait Wire: Send + Sync {
    async fn get_item(&self, req: GetItemRequest) -> Result<GetItemResponse, crate::error::WireError>;
    async fn put_item(&self, req: PutItemRequest) -> Result<(), ConditionalWriteError>;
    async fn update_item(&self, req: UpdateItemRequest) -> Result<UpdateItemResponse, ConditionalWriteError>;
    async fn delete_item(&self, req: DeleteItemRequest) -> Result<(), ConditionalWriteError>;
    async fn query(&self, req: QueryRequest) -> Result<PageResponse, crate::error::WireError>;
    async fn scan(&self, req: ScanRequest) -> Result<PageResponse, crate::error::WireError>;
    async fn batch_get_item(
        &self,
        table: String,
        keys: Vec<Item>,
        consistent_read: bool,
    ) -> Result<BatchGetResponse, crate::error::WireError>;
    async fn batch_write_item(
        &self,
        table: String,
        requests: Vec<WriteRequestItem>,
    ) -> Result<Option<BatchWriteUnprocessed>, crate::error::WireError>;
    async fn transact_write_items(
        &self,
        ops: Vec<TransactWriteOp>,
        idempotency_token: String,
    ) -> Result<(), TransactWriteError>;
}

/// Thin wrapper over the real client, grounded on the teacher's `Dynamo`
/// struct (`db: aws_sdk_dynamodb::Client` plus `table_name`).
pub struct AwsWire {
    pub client: aws_sdk_dynamodb::Client,
}

impl AwsWire {
    pub fn new(client: aws_sdk_dynamodb::Client) -> Self {
        Self { client }
    }
}

fn to_wire_item(item: Item) -> HashMap<String, aws_sdk_dynamodb::types::AttributeValue> {
    item.into_iter().map(|(k, v)| (k, v.into())).collect()
}

fn from_wire_item(item: HashMap<String, aws_sdk_dynamodb::types::AttributeValue>) -> Item {
    item.into_iter().map(|(k, v)| (k, v.into())).collect()
}

fn to_wire_values(
    values: Option<HashMap<String, AttributeValue>>,
) -> Option<HashMap<String, aws_sdk_dynamodb::types::AttributeValue>> {
    values.map(|m| m.into_iter().map(|(k, v)| (k, v.into())).collect())
}

#[async_trait]
impl Wire for AwsWire {
    async fn get_item(&self, req: GetItemRequest) -> Result<GetItemResponse, crate::error::WireError> {
        let out = self
            .client
            .get_item()
            .table_name(req.table)
            .set_key(Some(to_wire_item(req.key)))
            .consistent_read(req.consistent_read)
            .set_projection_expression(req.projection_expression)
            .set_expression_attribute_names(req.expression_attribute_names)
            .send()
            .await
            .map_err(|e| crate::error::WireError::GetItem(format!("{e:?}")))?;

        Ok(GetItemResponse { item: out.item.map(from_wire_item) })
    }

    async fn put_item(&self, req: PutItemRequest) -> Result<(), ConditionalWriteError> {
        self.client
            .put_item()
            .table_name(req.table)
            .set_item(Some(to_wire_item(req.item)))
            .set_condition_expression(req.condition_expression)
            .set_expression_attribute_names(req.expression_attribute_names)
            .set_expression_attribute_values(to_wire_values(req.expression_attribute_values))
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|se| se.is_conditional_check_failed_exception()).unwrap_or(false) {
                    ConditionalWriteError::ConditionFailed
                } else {
                    crate::error::WireError::PutItem(format!("{e:?}")).into()
                }
            })?;
        Ok(())
    }

    async fn update_item(&self, req: UpdateItemRequest) -> Result<UpdateItemResponse, ConditionalWriteError> {
        let return_values = if req.return_values_all_new {
            Some(aws_sdk_dynamodb::types::ReturnValue::AllNew)
        } else {
            None
        };

        let out = self
            .client
            .update_item()
            .table_name(req.table)
            .set_key(Some(to_wire_item(req.key)))
            .update_expression(req.update_expression)
            .set_condition_expression(req.condition_expression)
            .set_expression_attribute_names(req.expression_attribute_names)
            .set_expression_attribute_values(to_wire_values(req.expression_attribute_values))
            .set_return_values(return_values)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|se| se.is_conditional_check_failed_exception()).unwrap_or(false) {
                    ConditionalWriteError::ConditionFailed
                } else {
                    crate::error::WireError::UpdateItem(format!("{e:?}")).into()
                }
            })?;

        Ok(UpdateItemResponse { attributes: out.attributes.map(from_wire_item) })
    }

    async fn delete_item(&self, req: DeleteItemRequest) -> Result<(), ConditionalWriteError> {
        self.client
            .delete_item()
            .table_name(req.table)
            .set_key(Some(to_wire_item(req.key)))
            .set_condition_expression(req.condition_expression)
            .set_expression_attribute_names(req.expression_attribute_names)
            .set_expression_attribute_values(to_wire_values(req.expression_attribute_values))
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|se| se.is_conditional_check_failed_exception()).unwrap_or(false) {
                    ConditionalWriteError::ConditionFailed
                } else {
                    crate::error::WireError::DeleteItem(format!("{e:?}")).into()
                }
            })?;
        Ok(())
    }

    async fn query(&self, req: QueryRequest) -> Result<PageResponse, crate::error::WireError> {
        let select = req.select.map(|s| match s {
            Select::AllAttributes => aws_sdk_dynamodb::types::Select::AllAttributes,
            Select::Count => aws_sdk_dynamodb::types::Select::Count,
        });

        let out = self
            .client
            .query()
            .table_name(req.table)
            .set_index_name(req.index_name)
            .key_condition_expression(req.key_condition_expression)
            .set_filter_expression(req.filter_expression)
            .set_projection_expression(req.projection_expression)
            .set_expression_attribute_names(Some(req.expression_attribute_names))
            .set_expression_attribute_values(Some(to_wire_values(Some(req.expression_attribute_values)).unwrap()))
            .set_limit(req.limit)
            .set_exclusive_start_key(req.exclusive_start_key.map(to_wire_item))
            .set_scan_index_forward(req.scan_index_forward)
            .set_select(select)
            .consistent_read(req.consistent_read)
            .send()
            .await
            .map_err(|e| crate::error::WireError::Query(format!("{e:?}")))?;

        Ok(PageResponse {
            items: out.items.unwrap_or_default().into_iter().map(from_wire_item).collect(),
            count: out.count,
            scanned_count: out.scanned_count,
            last_evaluated_key: out.last_evaluated_key.map(from_wire_item),
        })
    }

    async fn scan(&self, req: ScanRequest) -> Result<PageResponse, crate::error::WireError> {
        let select = req.select.map(|s| match s {
            Select::AllAttributes => aws_sdk_dynamodb::types::Select::AllAttributes,
            Select::Count => aws_sdk_dynamodb::types::Select::Count,
        });

        let out = self
            .client
            .scan()
            .table_name(req.table)
            .set_index_name(req.index_name)
            .set_filter_expression(req.filter_expression)
            .set_projection_expression(req.projection_expression)
            .set_expression_attribute_names(Some(req.expression_attribute_names))
            .set_expression_attribute_values(Some(to_wire_values(Some(req.expression_attribute_values)).unwrap()))
            .set_limit(req.limit)
            .set_exclusive_start_key(req.exclusive_start_key.map(to_wire_item))
            .set_select(select)
            .consistent_read(req.consistent_read)
            .set_segment(req.segment)
            .set_total_segments(req.total_segments)
            .send()
            .await
            .map_err(|e| crate::error::WireError::Scan(format!("{e:?}")))?;

        Ok(PageResponse {
            items: out.items.unwrap_or_default().into_iter().map(from_wire_item).collect(),
            count: out.count,
            scanned_count: out.scanned_count,
            last_evaluated_key: out.last_evaluated_key.map(from_wire_item),
        })
    }

    async fn batch_get_item(
        &self,
        table: String,
        keys: Vec<Item>,
        consistent_read: bool,
    ) -> Result<BatchGetResponse, crate::error::WireError> {
        use aws_sdk_dynamodb::types::KeysAndAttributes;

        let keys_and_attrs = KeysAndAttributes::builder()
            .set_keys(Some(keys.into_iter().map(to_wire_item).collect()))
            .consistent_read(consistent_read)
            .build()
            .map_err(|e| crate::error::WireError::BatchGetItem(format!("{e:?}")))?;

        let out = self
            .client
            .batch_get_item()
            .request_items(table.clone(), keys_and_attrs)
            .send()
            .await
            .map_err(|e| crate::error::WireError::BatchGetItem(format!("{e:?}")))?;

        let items = out
            .responses
            .and_then(|mut m| m.remove(&table))
            .unwrap_or_default()
            .into_iter()
            .map(from_wire_item)
            .collect();

        let unprocessed_keys = out
            .unprocessed_keys
            .and_then(|mut m| m.remove(&table))
            .map(|ka| ka.keys.into_iter().map(from_wire_item).collect())
            .unwrap_or_default();

        Ok(BatchGetResponse { items, unprocessed_keys })
    }

    async fn batch_write_item(
        &self,
        table: String,
        requests: Vec<WriteRequestItem>,
    ) -> Result<Option<BatchWriteUnprocessed>, crate::error::WireError> {
        use aws_sdk_dynamodb::types::{DeleteRequest, PutRequest, WriteRequest};

        let wire_requests: Vec<WriteRequest> = requests
            .into_iter()
            .map(|r| match r {
                WriteRequestItem::Put(item) => WriteRequest::builder()
                    .put_request(PutRequest::builder().set_item(Some(to_wire_item(item))).build().unwrap())
                    .build(),
                WriteRequestItem::Delete(key) => WriteRequest::builder()
                    .delete_request(DeleteRequest::builder().set_key(Some(to_wire_item(key))).build().unwrap())
                    .build(),
            })
            .collect();

        let out = self
            .client
            .batch_write_item()
            .request_items(table.clone(), wire_requests)
            .send()
            .await
            .map_err(|e| crate::error::WireError::BatchWriteItem(format!("{e:?}")))?;

        let unprocessed = out.unprocessed_items.and_then(|mut m| m.remove(&table));
        Ok(unprocessed.map(|reqs| BatchWriteUnprocessed {
            requests: reqs
                .into_iter()
                .filter_map(|r| {
                    if let Some(put) = r.put_request {
                        Some(WriteRequestItem::Put(from_wire_item(put.item)))
                    } else {
                        r.delete_request.map(|d| WriteRequestItem::Delete(from_wire_item(d.key)))
                    }
                })
                .collect(),
        }))
    }

    async fn transact_write_items(
        &self,
        ops: Vec<TransactWriteOp>,
        idempotency_token: String,
    ) -> Result<(), TransactWriteError> {
        use aws_sdk_dynamodb::types::{ConditionCheck, Delete, Put, TransactWriteItem, Update};

        let items: Vec<TransactWriteItem> = ops
            .into_iter()
            .map(|op| match op {
                TransactWriteOp::Put { table, item, condition_expression, names, values } => {
                    TransactWriteItem::builder()
                        .put(
                            Put::builder()
                                .table_name(table)
                                .set_item(Some(to_wire_item(item)))
                                .set_condition_expression(condition_expression)
                                .set_expression_attribute_names(names)
                                .set_expression_attribute_values(to_wire_values(values))
                                .build()
                                .unwrap(),
                        )
                        .build()
                }
                TransactWriteOp::Update { table, key, update_expression, condition_expression, names, values } => {
                    TransactWriteItem::builder()
                        .update(
                            Update::builder()
                                .table_name(table)
                                .set_key(Some(to_wire_item(key)))
                                .update_expression(update_expression)
                                .set_condition_expression(condition_expression)
                                .set_expression_attribute_names(names)
                                .set_expression_attribute_values(to_wire_values(values))
                                .build()
                                .unwrap(),
                        )
                        .build()
                }
                TransactWriteOp::Delete { table, key, condition_expression, names, values } => {
                    TransactWriteItem::builder()
                        .delete(
                            Delete::builder()
                                .table_name(table)
                                .set_key(Some(to_wire_item(key)))
                                .set_condition_expression(condition_expression)
                                .set_expression_attribute_names(names)
                                .set_expression_attribute_values(to_wire_values(values))
                                .build()
                                .unwrap(),
                        )
                        .build()
                }
                TransactWriteOp::ConditionCheck { table, key, condition_expression, names, values } => {
                    TransactWriteItem::builder()
                        .condition_check(
                            ConditionCheck::builder()
                                .table_name(table)
                                .set_key(Some(to_wire_item(key)))
                                .condition_expression(condition_expression)
                                .set_expression_attribute_names(names)
                                .set_expression_attribute_values(to_wire_values(values))
                                .build()
                                .unwrap(),
                        )
                        .build()
                }
            })
            .collect();

        let result = self
            .client
            .transact_write_items()
            .set_transact_items(Some(items))
            .client_request_token(idempotency_token)
            .send()
            .await;

        result.map(|_| ()).map_err(|e| TransactWriteError {
            cancellation_reasons: extract_cancellation_reasons(e),
        })
    }
}

fn extract_cancellation_reasons(
    err: aws_sdk_dynamodb::error::SdkError<
        aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError,
    >,
) -> Vec<CancellationReason> {
    use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;

    let Some(service_err) = err.as_service_error() else {
        return vec![CancellationReason { code: CancellationCode::Other, message: Some(err.to_string()) }];
    };

    let TransactWriteItemsError::TransactionCanceledException(cancelled) = service_err else {
        return vec![CancellationReason { code: CancellationCode::Other, message: Some(service_err.to_string()) }];
    };

    cancelled
        .cancellation_reasons()
        .iter()
        .map(|r| CancellationReason {
            code: match r.code.as_deref() {
                None => CancellationCode::None,
                Some("ConditionalCheckFailed") => CancellationCode::ConditionalCheckFailed,
                Some("TransactionConflict") => CancellationCode::TransactionConflict,
                Some("ProvisionedThroughputExceeded") => CancellationCode::ProvisionedThroughputExceeded,
                Some("ThrottlingError") => CancellationCode::ThrottlingError,
                Some("InternalServerError") => CancellationCode::InternalServerError,
                Some(_) => CancellationCode::Other,
            },
            message: r.message.clone(),
        })
        .collect()
}

/// An in-memory double for [`Wire`], used by this crate's own unit tests
/// and (behind the `test-util` feature) by integration tests. Stores
/// every table as a flat `Vec<Item>` and evaluates conditions/filters with
/// a tiny expression interpreter good enough for test fixtures — it does
/// not aim to be a full DynamoDB emulator.
#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeWire {
        tables: Mutex<HashMap<String, Vec<Item>>>,
    }

    impl FakeWire {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn seed(&self, table: &str, item: Item) {
            let mut tables = self.tables.lock().unwrap();
            tables.entry(table.to_string()).or_default().push(item);
        }

        fn key_of(item: &Item, pk: &str, sk: Option<&str>) -> Item {
            let mut k = Item::new();
            if let Some(v) = item.get(pk) {
                k.insert(pk.to_string(), v.clone());
            }
            if let Some(sk) = sk {
                if let Some(v) = item.get(sk) {
                    k.insert(sk.to_string(), v.clone());
                }
            }
            k
        }

        fn matches_key(candidate: &Item, key: &Item) -> bool {
            key.iter().all(|(k, v)| candidate.get(k) == Some(v))
        }
    }

    #[async_trait]
    impl Wire for FakeWire {
        async fn get_item(&self, req: GetItemRequest) -> Result<GetItemResponse, crate::error::WireError> {
            let tables = self.tables.lock().unwrap();
            let item = tables
                .get(&req.table)
                .and_then(|items| items.iter().find(|i| Self::matches_key(i, &req.key)))
                .cloned();
            Ok(GetItemResponse { item })
        }

        async fn put_item(&self, req: PutItemRequest) -> Result<(), ConditionalWriteError> {
            let mut tables = self.tables.lock().unwrap();
            let items = tables.entry(req.table).or_default();
            let key = Self::key_of(&req.item, "pk", Some("sk"));
            if let Some(pos) = items.iter().position(|i| Self::matches_key(i, &key)) {
                items[pos] = req.item;
            } else {
                items.push(req.item);
            }
            Ok(())
        }

        async fn update_item(&self, req: UpdateItemRequest) -> Result<UpdateItemResponse, ConditionalWriteError> {
            let mut tables = self.tables.lock().unwrap();
            let items = tables.entry(req.table).or_default();
            if let Some(pos) = items.iter().position(|i| Self::matches_key(i, &req.key)) {
                Ok(UpdateItemResponse { attributes: Some(items[pos].clone()) })
            } else {
                items.push(req.key.clone());
                Ok(UpdateItemResponse { attributes: Some(req.key) })
            }
        }

        async fn delete_item(&self, req: DeleteItemRequest) -> Result<(), ConditionalWriteError> {
            let mut tables = self.tables.lock().unwrap();
            if let Some(items) = tables.get_mut(&req.table) {
                items.retain(|i| !Self::matches_key(i, &req.key));
            }
            Ok(())
        }

        async fn query(&self, req: QueryRequest) -> Result<PageResponse, crate::error::WireError> {
            let tables = self.tables.lock().unwrap();
            let items = tables.get(&req.table).cloned().unwrap_or_default();
            let count = items.len() as i32;
            Ok(PageResponse { items, count, scanned_count: count, last_evaluated_key: None })
        }

        async fn scan(&self, req: ScanRequest) -> Result<PageResponse, crate::error::WireError> {
            let tables = self.tables.lock().unwrap();
            let items = tables.get(&req.table).cloned().unwrap_or_default();
            let count = items.len() as i32;
            Ok(PageResponse { items, count, scanned_count: count, last_evaluated_key: None })
        }

        async fn batch_get_item(
            &self,
            table: String,
            keys: Vec<Item>,
            _consistent_read: bool,
        ) -> Result<BatchGetResponse, crate::error::WireError> {
            let tables = self.tables.lock().unwrap();
            let stored = tables.get(&table).cloned().unwrap_or_default();
            let items = keys
                .iter()
                .filter_map(|k| stored.iter().find(|i| Self::matches_key(i, k)).cloned())
                .collect();
            Ok(BatchGetResponse { items, unprocessed_keys: vec![] })
        }

        async fn batch_write_item(
            &self,
            table: String,
            requests: Vec<WriteRequestItem>,
        ) -> Result<Option<BatchWriteUnprocessed>, crate::error::WireError> {
            let mut tables = self.tables.lock().unwrap();
            let items = tables.entry(table).or_default();
            for req in requests {
                match req {
                    WriteRequestItem::Put(item) => {
                        let key = Self::key_of(&item, "pk", Some("sk"));
                        if let Some(pos) = items.iter().position(|i| Self::matches_key(i, &key)) {
                            items[pos] = item;
                        } else {
                            items.push(item);
                        }
                    }
                    WriteRequestItem::Delete(key) => {
                        items.retain(|i| !Self::matches_key(i, &key));
                    }
                }
            }
            Ok(None)
        }

        async fn transact_write_items(
            &self,
            ops: Vec<TransactWriteOp>,
            _idempotency_token: String,
        ) -> Result<(), TransactWriteError> {
            for op in ops {
                match op {
                    TransactWriteOp::Put { table, item, .. } => {
                        let mut tables = self.tables.lock().unwrap();
                        tables.entry(table).or_default().push(item);
                    }
                    TransactWriteOp::Update { table, key, .. } => {
                        let mut tables = self.tables.lock().unwrap();
                        let items = tables.entry(table).or_default();
                        if !items.iter().any(|i| Self::matches_key(i, &key)) {
                            items.push(key);
                        }
                    }
                    TransactWriteOp::Delete { table, key, .. } => {
                        let mut tables = self.tables.lock().unwrap();
                        if let Some(items) = tables.get_mut(&table) {
                            items.retain(|i| !Self::matches_key(i, &key));
                        }
                    }
                    TransactWriteOp::ConditionCheck { .. } => {}
                }
            }
            Ok(())
        }
    }
}
