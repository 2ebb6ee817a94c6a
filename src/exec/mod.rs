//! C6 — the query executor (spec §4.4).
//!
//! Grounded on the teacher's `EncryptedTable`: one struct holding a wire
//! client plus the cipher, with `get`/`put`/`query`/`delete` methods that
//! each (a) check a precondition, (b) seal/unseal the attributes that need
//! it, (c) call the wire, (d) convert the response back to the caller's
//! type. The executor here is the same shape, generalized from "encrypt
//! the searchable attributes" to "apply a model's full role-field and
//! encryption rules before/after every wire call."

use crate::clock::Clock;
use crate::crypto::{self, KeyService};
use crate::deadline::Ctx;
use crate::error::{
    BatchGetError, BatchWriteError, CryptoError, DeleteError, GetError, PutError, QueryError,
    ScanError, UpdateError,
};
use crate::expr::filter::FilterExpr;
use crate::expr::key_condition::KeyCondition;
use crate::expr::update::{RemoveTarget, SetAction, UpdateBuilder};
use crate::expr::PlaceholderAllocator;
use crate::registry::{Model, ModelMetadata};
use crate::value::AttributeValue;
use crate::wire::{
    DeleteItemRequest, GetItemRequest, Item, PutItemRequest, QueryRequest, ScanRequest, Select,
    UpdateItemRequest, Wire,
};
use std::sync::Arc;

mod batch;
mod scan_fanout;

pub use batch::BatchWriteOp;

/// Key management for a single executor: every model with encrypted
/// fields is gated on this being present, per spec §4.6's fail-closed
/// rule — there is no silent plaintext fallback.
#[derive(Clone)]
pub struct CryptoConfig {
    pub key_id: String,
    pub key_service: Arc<dyn KeyService>,
}

/// One page of typed results, mirroring [`crate::wire::PageResponse`] but
/// with items already converted through [`Model::from_item`].
#[derive(Debug)]
pub struct Page<M> {
    pub items: Vec<M>,
    pub count: i32,
    pub scanned_count: i32,
    pub last_evaluated_key: Option<Item>,
}

#[derive(Debug, Default, Clone)]
pub struct QueryOptions {
    pub index_name: Option<String>,
    pub filter: Option<FilterExpr>,
    pub limit: Option<i32>,
    pub exclusive_start_key: Option<Item>,
    pub scan_index_forward: Option<bool>,
    pub consistent_read: bool,
}

#[derive(Debug, Default, Clone)]
pub struct ScanOptions {
    pub index_name: Option<String>,
    pub filter: Option<FilterExpr>,
    pub limit: Option<i32>,
    pub exclusive_start_key: Option<Item>,
    pub consistent_read: bool,
    pub segment: Option<i32>,
    pub total_segments: Option<i32>,
}

/// A caller-assembled update: the same four sections [`UpdateBuilder`]
/// accumulates, plus an optional extra condition ANDed onto the one the
/// executor derives (existence of the key, for plain updates).
#[derive(Debug, Default)]
pub struct UpdateSpec {
    pub sets: Vec<SetAction>,
    pub removes: Vec<RemoveTarget>,
    pub adds: Vec<crate::expr::update::AddAction>,
    pub deletes: Vec<crate::expr::update::DeleteAction>,
    pub condition: Option<FilterExpr>,
}

/// Runs every public read/write operation against a [`Wire`], applying a
/// model's role-field lifecycle, encryption, and deadline rules uniformly.
///
/// Cheaply [`Clone`]: every field is an `Arc` or a small `Clone` value, so
/// [`scan_all_segments`](Executor::scan_all_segments) can hand an owned copy
/// to each segment's spawned task.
#[derive(Clone)]
pub struct Executor {
    wire: Arc<dyn Wire>,
    crypto: Option<CryptoConfig>,
    clock: Arc<dyn Clock>,
}

impl Executor {
    pub fn new(wire: Arc<dyn Wire>, clock: Arc<dyn Clock>) -> Self {
        Self { wire, crypto: None, clock }
    }

    pub fn with_crypto(mut self, crypto: CryptoConfig) -> Self {
        self.crypto = Some(crypto);
        self
    }

    /// Fail-closed gate: a model with encrypted fields cannot be used by
    /// an executor with no configured key service, in either direction.
    pub(crate) fn require_crypto(&self, meta: &'static ModelMetadata) -> Result<Option<&CryptoConfig>, CryptoError> {
        if !meta.has_encrypted_fields {
            return Ok(None);
        }
        self.crypto
            .as_ref()
            .map(Some)
            .ok_or_else(|| CryptoError::NotConfigured(meta.type_name.clone()))
    }

    pub(crate) async fn encrypt_item(
        &self,
        meta: &'static ModelMetadata,
        mut item: Item,
    ) -> Result<Item, CryptoError> {
        let Some(cfg) = self.require_crypto(meta)? else {
            return Ok(item);
        };
        for db_name in meta.encrypted_db_names() {
            if let Some(plaintext) = item.get(db_name) {
                if plaintext.is_null() {
                    continue;
                }
                let envelope =
                    crypto::encrypt_attribute(plaintext, db_name, &cfg.key_id, cfg.key_service.as_ref())
                        .await?;
                item.insert(db_name.to_string(), envelope.into_attribute_value());
            }
        }
        Ok(item)
    }

    pub(crate) async fn decrypt_item(
        &self,
        meta: &'static ModelMetadata,
        mut item: Item,
    ) -> Result<Item, CryptoError> {
        let Some(cfg) = self.require_crypto(meta)? else {
            return Ok(item);
        };
        for db_name in meta.encrypted_db_names() {
            if let Some(stored) = item.get(db_name) {
                if stored.is_null() {
                    continue;
                }
                let envelope = crypto::envelope::Envelope::from_attribute_value(stored)?;
                let plaintext =
                    crypto::decrypt_attribute(&envelope, db_name, &cfg.key_id, cfg.key_service.as_ref())
                        .await?;
                item.insert(db_name.to_string(), plaintext);
            }
        }
        Ok(item)
    }

    pub async fn get<M: Model>(&self, ctx: &Ctx, key: Item) -> Result<M, GetError> {
        ctx.check_deadline()?;
        let meta = M::metadata();

        let out = self
            .wire
            .get_item(GetItemRequest {
                table: meta.table_name.clone(),
                key,
                consistent_read: false,
                projection_expression: None,
                expression_attribute_names: None,
            })
            .await?;

        let item = out.item.ok_or(GetError::NotFound)?;
        let item = self.decrypt_item(meta, item).await?;
        Ok(M::from_item(item)?)
    }

    /// Put the model's full item, stamping the lifecycle role fields per
    /// spec §4.4.3: `created_at`/`updated_at` set to the clock, `version`
    /// initialized to `0` when the item does not already carry one.
    ///
    /// `if_not_exists` adds `attribute_not_exists(pk[, sk])` as the
    /// condition (the `Create` semantics spec §4.5 also uses for
    /// transactions); when false the put is unconditional.
    pub async fn put<M: Model>(&self, ctx: &Ctx, model: &M, if_not_exists: bool) -> Result<(), PutError> {
        ctx.check_deadline()?;
        let meta = M::metadata();
        let mut item = model.to_item();

        let now = self.clock.now_rfc3339();
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

        let item = self.encrypt_item(meta, item).await?;

        let mut alloc = PlaceholderAllocator::new();
        let condition = if if_not_exists {
            Some(crate::expr::exists_condition(&mut alloc, &meta.pk, meta.sk.as_deref(), true))
        } else {
            None
        };
        let (names, values) = alloc.into_parts();

        self.wire
            .put_item(PutItemRequest {
                table: meta.table_name.clone(),
                item,
                condition_expression: condition,
                expression_attribute_names: (!names.is_empty()).then_some(names),
                expression_attribute_values: (!values.is_empty()).then_some(values),
            })
            .await?;
        Ok(())
    }

    /// Apply an update, always stamping `updated_at` to the clock when the
    /// model declares that role field, and returning the item DynamoDB
    /// reports back (`ReturnValues=ALL_NEW`) converted to `M`.
    /// Pre-encrypt every `SetAction::Assign` targeting an encrypted field
    /// before the update is compiled — `UpdateBuilder::compile` otherwise
    /// allows `SET f = :v` on an encrypted field (it's the one action
    /// encrypted fields do support) but has no access to a key service to
    /// actually seal the value. Shared by [`Executor::update`] and the
    /// transaction builder's `Update`/`UpdateWithBuilder` ops so the two
    /// don't drift.
    pub(crate) async fn encrypt_update_sets(
        &self,
        meta: &'static ModelMetadata,
        sets: &mut [SetAction],
    ) -> Result<(), CryptoError> {
        for action in sets {
            if let SetAction::Assign(field, value) = action {
                if let Some(fm) = meta.field(field) {
                    if fm.is_encrypted && !value.is_null() {
                        let cfg = self
                            .require_crypto(meta)?
                            .expect("is_encrypted implies has_encrypted_fields");
                        let envelope =
                            crypto::encrypt_attribute(value, &fm.db_name, &cfg.key_id, cfg.key_service.as_ref())
                                .await?;
                        *value = envelope.into_attribute_value();
                    }
                }
            }
        }
        Ok(())
    }

    pub async fn update<M: Model>(
        &self,
        ctx: &Ctx,
        key: Item,
        mut spec: UpdateSpec,
    ) -> Result<M, UpdateError> {
        ctx.check_deadline()?;
        let meta = M::metadata();

        let now_set = if let Some(idx) = meta.updated_at_field {
            let db_name = meta.fields[idx].db_name.clone();
            Some(SetAction::Assign(db_name, AttributeValue::S(self.clock.now_rfc3339())))
        } else {
            None
        };
        if let Some(action) = now_set {
            spec.sets.push(action);
        }

        self.encrypt_update_sets(meta, &mut spec.sets).await?;

        let mut alloc = PlaceholderAllocator::new();
        let builder = UpdateBuilder {
            sets: spec.sets,
            removes: spec.removes,
            adds: spec.adds,
            deletes: spec.deletes,
        };
        let update_expression = builder.compile(&mut alloc, meta)?;

        let exists = crate::expr::exists_condition(&mut alloc, &meta.pk, meta.sk.as_deref(), false);
        let condition = if let Some(extra) = &spec.condition {
            crate::expr::check_no_encrypted_refs(extra, meta)?;
            let extra_compiled = extra.compile(&mut alloc, "c")?;
            crate::expr::combine_conditions(Some(exists), Some(extra_compiled))
        } else {
            Some(exists)
        };

        let (names, values) = alloc.into_parts();

        let out = self
            .wire
            .update_item(UpdateItemRequest {
                table: meta.table_name.clone(),
                key,
                update_expression,
                condition_expression: condition,
                expression_attribute_names: (!names.is_empty()).then_some(names),
                expression_attribute_values: (!values.is_empty()).then_some(values),
                return_values_all_new: true,
            })
            .await?;

        let item = out.attributes.ok_or(UpdateError::Wire(crate::error::WireError::UpdateItem(
            "update_item did not return ALL_NEW attributes".to_string(),
        )))?;
        let item = self.decrypt_item(meta, item).await?;
        Ok(M::from_item(item)?)
    }

    pub async fn delete<M: Model>(
        &self,
        ctx: &Ctx,
        key: Item,
        condition: Option<FilterExpr>,
    ) -> Result<(), DeleteError> {
        ctx.check_deadline()?;
        let meta = M::metadata();

        let mut alloc = PlaceholderAllocator::new();
        let condition_expression = match condition {
            Some(expr) => {
                crate::expr::check_no_encrypted_refs(&expr, meta)?;
                Some(expr.compile(&mut alloc, "c")?)
            }
            None => None,
        };
        let (names, values) = alloc.into_parts();

        self.wire
            .delete_item(DeleteItemRequest {
                table: meta.table_name.clone(),
                key,
                condition_expression,
                expression_attribute_names: (!names.is_empty()).then_some(names),
                expression_attribute_values: (!values.is_empty()).then_some(values),
            })
            .await?;
        Ok(())
    }

    pub async fn query<M: Model>(
        &self,
        ctx: &Ctx,
        key_condition: KeyCondition,
        opts: QueryOptions,
    ) -> Result<Page<M>, QueryError> {
        ctx.check_deadline()?;
        let meta = M::metadata();

        let mut alloc = PlaceholderAllocator::new();
        let key_condition_expression = key_condition.compile(&mut alloc)?;
        let filter_expression = match &opts.filter {
            Some(f) => {
                crate::expr::check_no_encrypted_refs(f, meta)?;
                Some(f.compile(&mut alloc, "f")?)
            }
            None => None,
        };
        let (names, values) = alloc.into_parts();

        let out = self
            .wire
            .query(QueryRequest {
                table: meta.table_name.clone(),
                index_name: opts.index_name,
                key_condition_expression,
                filter_expression,
                projection_expression: None,
                expression_attribute_names: names,
                expression_attribute_values: values,
                limit: opts.limit,
                exclusive_start_key: opts.exclusive_start_key,
                scan_index_forward: opts.scan_index_forward,
                select: Some(Select::AllAttributes),
                consistent_read: opts.consistent_read,
            })
            .await?;

        self.page_into::<M>(meta, out).await
    }

    pub async fn scan<M: Model>(&self, ctx: &Ctx, opts: ScanOptions) -> Result<Page<M>, ScanError> {
        ctx.check_deadline()?;
        let meta = M::metadata();

        let mut alloc = PlaceholderAllocator::new();
        let filter_expression = match &opts.filter {
            Some(f) => {
                crate::expr::check_no_encrypted_refs(f, meta)?;
                Some(f.compile(&mut alloc, "f")?)
            }
            None => None,
        };
        let (names, values) = alloc.into_parts();

        let out = self
            .wire
            .scan(ScanRequest {
                table: meta.table_name.clone(),
                index_name: opts.index_name,
                filter_expression,
                projection_expression: None,
                expression_attribute_names: names,
                expression_attribute_values: values,
                limit: opts.limit,
                exclusive_start_key: opts.exclusive_start_key,
                select: Some(Select::AllAttributes),
                consistent_read: opts.consistent_read,
                segment: opts.segment,
                total_segments: opts.total_segments,
            })
            .await?;

        self.page_into_scan::<M>(meta, out).await
    }

    async fn page_into<M: Model>(
        &self,
        meta: &'static ModelMetadata,
        page: crate::wire::PageResponse,
    ) -> Result<Page<M>, QueryError> {
        let mut items = Vec::with_capacity(page.items.len());
        for raw in page.items {
            let decrypted = self.decrypt_item(meta, raw).await?;
            items.push(M::from_item(decrypted)?);
        }
        Ok(Page {
            items,
            count: page.count,
            scanned_count: page.scanned_count,
            last_evaluated_key: page.last_evaluated_key,
        })
    }

    async fn page_into_scan<M: Model>(
        &self,
        meta: &'static ModelMetadata,
        page: crate::wire::PageResponse,
    ) -> Result<Page<M>, ScanError> {
        let mut items = Vec::with_capacity(page.items.len());
        for raw in page.items {
            let decrypted = self.decrypt_item(meta, raw).await?;
            items.push(M::from_item(decrypted)?);
        }
        Ok(Page {
            items,
            count: page.count,
            scanned_count: page.scanned_count,
            last_evaluated_key: page.last_evaluated_key,
        })
    }

    /// Fetch up to 100 keys in one request, decrypting each returned item.
    /// Chunking across the 100-key limit and unprocessed-key retry live in
    /// [`crate::exec::batch`]; this is the single-request primitive it
    /// calls per chunk.
    pub async fn batch_get_raw(
        &self,
        table: &str,
        keys: Vec<Item>,
        consistent_read: bool,
    ) -> Result<crate::wire::BatchGetResponse, BatchGetError> {
        Ok(self.wire.batch_get_item(table.to_string(), keys, consistent_read).await?)
    }

    pub async fn batch_write_raw(
        &self,
        table: &str,
        requests: Vec<crate::wire::WriteRequestItem>,
    ) -> Result<Option<crate::wire::BatchWriteUnprocessed>, BatchWriteError> {
        Ok(self.wire.batch_write_item(table.to_string(), requests).await?)
    }

    pub fn wire(&self) -> &Arc<dyn Wire> {
        &self.wire
    }

    pub fn crypto(&self) -> Option<&CryptoConfig> {
        self.crypto.as_ref()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

/// Fixtures shared by this module's own tests and `exec::batch`/
/// `exec::scan_fanout`'s tests — a minimal model with every lifecycle role
/// field, backed by [`crate::wire::fake::FakeWire`] and a frozen clock.
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::registry::{AttrType, FieldMeta};
    use crate::value::AttributeValue;
    use crate::wire::fake::FakeWire;
    use once_cell::sync::Lazy;
    use std::collections::HashMap;

    pub(crate) struct Widget {
        pub(crate) pk: String,
        pub(crate) name: String,
        pub(crate) version: i64,
        pub(crate) created_at: Option<String>,
        pub(crate) updated_at: Option<String>,
    }

    impl Widget {
        pub(crate) fn new(pk: impl Into<String>, name: impl Into<String>) -> Self {
            Self { pk: pk.into(), name: name.into(), version: 0, created_at: None, updated_at: None }
        }
    }

    static WIDGET_META: Lazy<ModelMetadata> = Lazy::new(|| {
        let mut pk = FieldMeta::scalar("pk", AttrType::S);
        pk.is_pk = true;
        let name = FieldMeta::scalar("name", AttrType::S);
        let mut version = FieldMeta::scalar("version", AttrType::N);
        version.is_version = true;
        let mut created_at = FieldMeta::scalar("created_at", AttrType::S);
        created_at.is_created_at = true;
        let mut updated_at = FieldMeta::scalar("updated_at", AttrType::S);
        updated_at.is_updated_at = true;
        ModelMetadata::build("Widget", "widgets", vec![pk, name, version, created_at, updated_at], vec![])
            .unwrap()
    });

    impl Model for Widget {
        fn metadata() -> &'static ModelMetadata {
            &WIDGET_META
        }

        fn to_item(&self) -> HashMap<String, AttributeValue> {
            let mut m = HashMap::new();
            m.insert("pk".to_string(), AttributeValue::S(self.pk.clone()));
            m.insert("name".to_string(), AttributeValue::S(self.name.clone()));
            m.insert("version".to_string(), AttributeValue::n(self.version));
            m
        }

        fn from_item(item: HashMap<String, AttributeValue>) -> Result<Self, crate::error::ConvertError> {
            Ok(Widget {
                pk: item.get("pk").and_then(|v| v.as_s()).unwrap_or_default().to_string(),
                name: item.get("name").and_then(|v| v.as_s()).unwrap_or_default().to_string(),
                version: item
                    .get("version")
                    .and_then(|v| v.as_n())
                    .and_then(|n| n.parse().ok())
                    .unwrap_or(0),
                created_at: item.get("created_at").and_then(|v| v.as_s()).map(str::to_string),
                updated_at: item.get("updated_at").and_then(|v| v.as_s()).map(str::to_string),
            })
        }
    }

    pub(crate) fn widget_executor() -> Executor {
        let wire = Arc::new(FakeWire::new());
        let clock = Arc::new(crate::clock::FixedClock::new("2026-01-16T00:00:00.000000000Z", 1768521600));
        Executor::new(wire, clock)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{widget_executor, Widget};
    use super::*;
    use crate::crypto::FakeKeyService;
    use crate::registry::{AttrType, FieldMeta};
    use crate::value::AttributeValue;
    use once_cell::sync::Lazy;
    use std::collections::HashMap;

    #[tokio::test]
    async fn put_stamps_lifecycle_fields_and_version() {
        let exec = widget_executor();
        let widget = Widget {
            pk: "p".into(),
            name: "gadget".into(),
            version: 0,
            created_at: None,
            updated_at: None,
        };
        exec.put(&Ctx::new(), &widget, false).await.unwrap();

        let mut key = HashMap::new();
        key.insert("pk".to_string(), AttributeValue::S("p".into()));
        let fetched: Widget = exec.get(&Ctx::new(), key).await.unwrap();
        assert_eq!(fetched.created_at.as_deref(), Some("2026-01-16T00:00:00.000000000Z"));
        assert_eq!(fetched.updated_at.as_deref(), Some("2026-01-16T00:00:00.000000000Z"));
        assert_eq!(fetched.version, 0);
    }

    #[tokio::test]
    async fn get_missing_item_is_not_found() {
        let exec = widget_executor();
        let mut key = HashMap::new();
        key.insert("pk".to_string(), AttributeValue::S("missing".into()));
        let err = exec.get::<Widget>(&Ctx::new(), key).await.unwrap_err();
        assert!(matches!(err, GetError::NotFound));
    }

    #[tokio::test]
    async fn encrypted_model_without_crypto_config_fails_closed() {
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
        let secret = Secret { pk: "p".into(), ssn: "123-45-6789".into() };
        let err = exec.put(&Ctx::new(), &secret, false).await.unwrap_err();
        assert!(matches!(err, PutError::Crypto(CryptoError::NotConfigured(_))));

        // Sanity: configuring a key service lets the same put succeed.
        let exec = Executor::new(exec.wire.clone(), exec.clock.clone()).with_crypto(CryptoConfig {
            key_id: "fake-key".to_string(),
            key_service: Arc::new(FakeKeyService::new()),
        });
        exec.put(&Ctx::new(), &secret, false).await.unwrap();
    }
}
