//! C4 — the expression builder (spec §4.3).
//!
//! Grounded on the teacher's `encrypted_table/query.rs::QueryBuilder`: a
//! fluent builder (`.eq(name, value)`, `.starts_with(...)`) that
//! accumulates typed parts and compiles them on `send()`/`build()`. We keep
//! that accumulate-then-compile shape but replace the teacher's
//! term-index compound query compilation with DynamoDB's native
//! `ExpressionAttributeNames`/`Values` compilation, and add the
//! placeholder-disjointness bookkeeping spec §4.3 requires.

pub mod filter;
pub mod key_condition;
pub mod update;

use crate::error::ExprError;
use crate::registry::ModelMetadata;
use crate::value::AttributeValue;
use std::collections::HashMap;

/// Allocates `#name`/`:value` placeholders from disjoint, sequential
/// namespaces and tracks every key emitted so far (including user-supplied
/// raw-expression keys) to enforce uniqueness across the whole compiled
/// query, per spec §4.3.
#[derive(Debug, Default)]
pub struct PlaceholderAllocator {
    names: HashMap<String, String>,
    names_out: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
    next_name: usize,
    next_value: usize,
    seen_keys: std::collections::HashSet<String>,
}

impl PlaceholderAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate (or reuse) a `#..` placeholder for the given attribute name.
    /// `prefix` groups the placeholder by the section that requested it
    /// (`f` for filter, `c` for condition, `u` for update, `p` for
    /// projection) purely for readability; uniqueness does not depend on it.
    pub fn name(&mut self, prefix: &str, attr_name: &str) -> String {
        if let Some(existing) = self.names.get(attr_name) {
            return existing.clone();
        }
        self.next_name += 1;
        let key = format!("#{prefix}{}", self.next_name);
        self.names.insert(attr_name.to_string(), key.clone());
        self.names_out.insert(key.clone(), attr_name.to_string());
        self.seen_keys.insert(key.clone());
        key
    }

    pub fn value(&mut self, prefix: &str, value: AttributeValue) -> String {
        self.next_value += 1;
        let key = format!(":{prefix}{}", self.next_value);
        self.values.insert(key.clone(), value);
        self.seen_keys.insert(key.clone());
        key
    }

    /// Merge a user-supplied raw expression's placeholder maps, rejecting
    /// any key that collides with a builder-emitted key or with another
    /// user-supplied key already merged in this query.
    pub fn merge_raw(
        &mut self,
        raw_names: Option<HashMap<String, String>>,
        raw_values: Option<HashMap<String, AttributeValue>>,
    ) -> Result<(), ExprError> {
        for (k, v) in raw_names.into_iter().flatten() {
            if !self.seen_keys.insert(k.clone()) {
                return Err(ExprError::DuplicatePlaceholder(k));
            }
            self.names_out.insert(k, v);
        }
        for (k, v) in raw_values.into_iter().flatten() {
            if !self.seen_keys.insert(k.clone()) {
                return Err(ExprError::DuplicatePlaceholder(k));
            }
            self.values.insert(k, v);
        }
        Ok(())
    }

    pub fn into_parts(
        self,
    ) -> (
        HashMap<String, String>,
        HashMap<String, AttributeValue>,
    ) {
        (self.names_out, self.values)
    }
}

/// Fully compiled query/write ready to hand to the executor (C6): every
/// expression string plus the placeholder maps that resolve it.
#[derive(Debug, Default, Clone)]
pub struct CompiledQuery {
    pub key_condition_expression: Option<String>,
    pub filter_expression: Option<String>,
    pub condition_expression: Option<String>,
    pub update_expression: Option<String>,
    pub projection_expression: Option<String>,
    pub expression_attribute_names: HashMap<String, String>,
    pub expression_attribute_values: HashMap<String, AttributeValue>,
    pub index_name: Option<String>,
    pub limit: Option<i32>,
    pub exclusive_start_key: Option<HashMap<String, AttributeValue>>,
    pub scan_index_forward: Option<bool>,
    pub consistent_read: bool,
}

/// Combine a builder-generated condition with a user-supplied raw one, per
/// spec §4.3: `(<builder>) AND (<raw>)`, builder first, either side may be
/// empty.
pub fn combine_conditions(builder: Option<String>, raw: Option<String>) -> Option<String> {
    match (builder, raw) {
        (Some(b), Some(r)) => Some(format!("({b}) AND ({r})")),
        (Some(b), None) => Some(b),
        (None, Some(r)) => Some(r),
        (None, None) => None,
    }
}

/// `attribute_exists(#pk)[ AND attribute_exists(#sk)]`, used by
/// `IfNotExists`'s negation and by the transaction builder's implicit
/// `Create` condition (spec §4.5).
pub fn exists_condition(
    alloc: &mut PlaceholderAllocator,
    pk: &str,
    sk: Option<&str>,
    negate: bool,
) -> String {
    let func = if negate { "attribute_not_exists" } else { "attribute_exists" };
    let pk_ph = alloc.name("c", pk);
    let mut expr = format!("{func}({pk_ph})");
    if let Some(sk) = sk {
        let sk_ph = alloc.name("c", sk);
        expr = format!("{expr} AND {func}({sk_ph})");
    }
    expr
}

/// Reject any reference to an encrypted attribute in a filter/condition
/// tree, per spec §4.6: encrypted fields are never queryable, since the
/// store only ever sees their opaque envelope.
pub fn check_no_encrypted_refs(expr: &filter::FilterExpr, meta: &ModelMetadata) -> Result<(), ExprError> {
    for field in expr.referenced_fields() {
        if meta.field(field).map(|f| f.is_encrypted).unwrap_or(false) {
            return Err(ExprError::EncryptedFieldNotQueryable(field.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_placeholder_reused_for_same_attribute() {
        let mut alloc = PlaceholderAllocator::new();
        let a = alloc.name("f", "status");
        let b = alloc.name("f", "status");
        assert_eq!(a, b);
    }

    #[test]
    fn detects_raw_collision_with_builder_key() {
        let mut alloc = PlaceholderAllocator::new();
        let v = alloc.value("v", AttributeValue::n(1));
        let mut raw_values = HashMap::new();
        raw_values.insert(v, AttributeValue::n(2));
        let err = alloc.merge_raw(None, Some(raw_values)).unwrap_err();
        assert!(matches!(err, ExprError::DuplicatePlaceholder(_)));
    }

    #[test]
    fn combine_conditions_orders_builder_first() {
        let combined = combine_conditions(Some("a".into()), Some("b".into()));
        assert_eq!(combined.unwrap(), "(a) AND (b)");
    }
}
