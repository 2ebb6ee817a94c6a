//! Key-condition grammar (spec §4.3):
//! `#pk = :pk [AND (#sk = :sk | #sk <op> :sk | begins_with(#sk,:sk) |
//! #sk BETWEEN :a AND :b)]`.

use super::PlaceholderAllocator;
use crate::error::ExprError;
use crate::value::AttributeValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKeyOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
    BeginsWith,
}

impl SortKeyOp {
    fn as_str(self) -> &'static str {
        match self {
            SortKeyOp::Eq => "=",
            SortKeyOp::Lt => "<",
            SortKeyOp::Le => "<=",
            SortKeyOp::Gt => ">",
            SortKeyOp::Ge => ">=",
            SortKeyOp::BeginsWith => "begins_with",
        }
    }
}

#[derive(Debug, Clone)]
pub enum SortKeyCondition {
    Compare(SortKeyOp, AttributeValue),
    Between(AttributeValue, AttributeValue),
}

/// A Query's key condition: partition key equality plus an optional sort
/// key refinement. Scan never carries one of these.
#[derive(Debug, Clone)]
pub struct KeyCondition {
    pub pk_name: String,
    pub pk_value: AttributeValue,
    pub sk_name: Option<String>,
    pub sk_condition: Option<SortKeyCondition>,
}

impl KeyCondition {
    pub fn pk_only(pk_name: impl Into<String>, pk_value: AttributeValue) -> Self {
        Self {
            pk_name: pk_name.into(),
            pk_value,
            sk_name: None,
            sk_condition: None,
        }
    }

    pub fn with_sort_key(
        mut self,
        sk_name: impl Into<String>,
        condition: SortKeyCondition,
    ) -> Self {
        self.sk_name = Some(sk_name.into());
        self.sk_condition = Some(condition);
        self
    }

    /// Compile to a key condition expression string, allocating placeholders
    /// from the shared allocator so this composes with filter/update/raw
    /// placeholders under one disjointness check.
    pub fn compile(&self, alloc: &mut PlaceholderAllocator) -> Result<String, ExprError> {
        let pk_ph = alloc.name("k", &self.pk_name);
        let pk_val_ph = alloc.value("k", self.pk_value.clone());
        let mut expr = format!("{pk_ph} = {pk_val_ph}");

        if let (Some(sk_name), Some(cond)) = (&self.sk_name, &self.sk_condition) {
            let sk_ph = alloc.name("k", sk_name);
            let sk_expr = match cond {
                SortKeyCondition::Compare(SortKeyOp::BeginsWith, v) => {
                    let v_ph = alloc.value("k", v.clone());
                    format!("begins_with({sk_ph}, {v_ph})")
                }
                SortKeyCondition::Compare(op, v) => {
                    let v_ph = alloc.value("k", v.clone());
                    format!("{sk_ph} {} {v_ph}", op.as_str())
                }
                SortKeyCondition::Between(lo, hi) => {
                    let lo_ph = alloc.value("k", lo.clone());
                    let hi_ph = alloc.value("k", hi.clone());
                    format!("{sk_ph} BETWEEN {lo_ph} AND {hi_ph}")
                }
            };
            expr = format!("{expr} AND {sk_expr}");
        }

        Ok(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_pk_only() {
        let mut alloc = PlaceholderAllocator::new();
        let kc = KeyCondition::pk_only("pk", AttributeValue::S("u#1".into()));
        let expr = kc.compile(&mut alloc).unwrap();
        assert_eq!(expr, "#k1 = :k1");
    }

    #[test]
    fn compiles_begins_with() {
        let mut alloc = PlaceholderAllocator::new();
        let kc = KeyCondition::pk_only("pk", AttributeValue::S("u#1".into())).with_sort_key(
            "sk",
            SortKeyCondition::Compare(SortKeyOp::BeginsWith, AttributeValue::S("order#".into())),
        );
        let expr = kc.compile(&mut alloc).unwrap();
        assert_eq!(expr, "#k1 = :k1 AND begins_with(#k2, :k2)");
    }

    #[test]
    fn compiles_between() {
        let mut alloc = PlaceholderAllocator::new();
        let kc = KeyCondition::pk_only("pk", AttributeValue::S("u#1".into())).with_sort_key(
            "sk",
            SortKeyCondition::Between(AttributeValue::n(1), AttributeValue::n(10)),
        );
        let expr = kc.compile(&mut alloc).unwrap();
        assert_eq!(expr, "#k1 = :k1 AND #k2 BETWEEN :k2 AND :k3");
    }
}
