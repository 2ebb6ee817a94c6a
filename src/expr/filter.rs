//! Filter/condition grammar (spec §4.3): `=, !=, <, <=, >, >=, BETWEEN,
//! IN (<=100 values), BEGINS_WITH, CONTAINS, attribute_exists,
//! attribute_not_exists`, composed with `AND`/`OR` including parenthesized
//! nested groups.

use super::PlaceholderAllocator;
use crate::error::ExprError;
use crate::value::AttributeValue;

const MAX_IN_VALUES: usize = 100;

#[derive(Debug, Clone)]
pub enum Cond {
    Eq(String, AttributeValue),
    Ne(String, AttributeValue),
    Lt(String, AttributeValue),
    Le(String, AttributeValue),
    Gt(String, AttributeValue),
    Ge(String, AttributeValue),
    Between(String, AttributeValue, AttributeValue),
    In(String, Vec<AttributeValue>),
    BeginsWith(String, AttributeValue),
    Contains(String, AttributeValue),
    AttributeExists(String),
    AttributeNotExists(String),
}

impl Cond {
    fn field_name(&self) -> &str {
        match self {
            Cond::Eq(f, _)
            | Cond::Ne(f, _)
            | Cond::Lt(f, _)
            | Cond::Le(f, _)
            | Cond::Gt(f, _)
            | Cond::Ge(f, _)
            | Cond::Between(f, _, _)
            | Cond::In(f, _)
            | Cond::BeginsWith(f, _)
            | Cond::Contains(f, _)
            | Cond::AttributeExists(f)
            | Cond::AttributeNotExists(f) => f,
        }
    }
}

/// A filter/condition expression tree. Leaves are [`Cond`]; `And`/`Or`
/// compose children with parenthesized grouping so precedence never
/// depends on DynamoDB's default operator precedence.
#[derive(Debug, Clone)]
pub enum FilterExpr {
    Leaf(Cond),
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
}

impl FilterExpr {
    pub fn and(parts: Vec<FilterExpr>) -> Self {
        FilterExpr::And(parts)
    }

    pub fn or(parts: Vec<FilterExpr>) -> Self {
        FilterExpr::Or(parts)
    }

    /// Every attribute name this tree references, leaves of nested groups
    /// included — used to reject encrypted-field references before
    /// compiling (spec §4.6's `encrypted_field_not_queryable` rule).
    pub fn referenced_fields(&self) -> Vec<&str> {
        match self {
            FilterExpr::Leaf(cond) => vec![cond.field_name()],
            FilterExpr::And(parts) | FilterExpr::Or(parts) => {
                parts.iter().flat_map(|p| p.referenced_fields()).collect()
            }
        }
    }

    /// Compile this tree into a single expression string, with group
    /// placeholders drawn from `prefix` (`"f"` for filters, `"c"` for
    /// conditions per spec §4.3).
    pub fn compile(
        &self,
        alloc: &mut PlaceholderAllocator,
        prefix: &str,
    ) -> Result<String, ExprError> {
        match self {
            FilterExpr::Leaf(cond) => compile_cond(cond, alloc, prefix),
            FilterExpr::And(parts) => compile_group(parts, alloc, prefix, "AND"),
            FilterExpr::Or(parts) => compile_group(parts, alloc, prefix, "OR"),
        }
    }
}

fn compile_group(
    parts: &[FilterExpr],
    alloc: &mut PlaceholderAllocator,
    prefix: &str,
    joiner: &str,
) -> Result<String, ExprError> {
    let compiled: Vec<String> = parts
        .iter()
        .map(|p| p.compile(alloc, prefix))
        .collect::<Result<_, _>>()?;
    Ok(format!(
        "({})",
        compiled.join(&format!(" {joiner} "))
    ))
}

fn compile_cond(
    cond: &Cond,
    alloc: &mut PlaceholderAllocator,
    prefix: &str,
) -> Result<String, ExprError> {
    Ok(match cond {
        Cond::Eq(f, v) => binop(alloc, prefix, f, "=", v.clone()),
        Cond::Ne(f, v) => binop(alloc, prefix, f, "<>", v.clone()),
        Cond::Lt(f, v) => binop(alloc, prefix, f, "<", v.clone()),
        Cond::Le(f, v) => binop(alloc, prefix, f, "<=", v.clone()),
        Cond::Gt(f, v) => binop(alloc, prefix, f, ">", v.clone()),
        Cond::Ge(f, v) => binop(alloc, prefix, f, ">=", v.clone()),
        Cond::Between(f, lo, hi) => {
            let f_ph = alloc.name(prefix, f);
            let lo_ph = alloc.value(prefix, lo.clone());
            let hi_ph = alloc.value(prefix, hi.clone());
            format!("{f_ph} BETWEEN {lo_ph} AND {hi_ph}")
        }
        Cond::In(f, values) => {
            if values.len() > MAX_IN_VALUES {
                return Err(ExprError::TooManyInValues(values.len()));
            }
            let f_ph = alloc.name(prefix, f);
            let value_phs: Vec<String> = values
                .iter()
                .map(|v| alloc.value(prefix, v.clone()))
                .collect();
            format!("{f_ph} IN ({})", value_phs.join(", "))
        }
        Cond::BeginsWith(f, v) => {
            let f_ph = alloc.name(prefix, f);
            let v_ph = alloc.value(prefix, v.clone());
            format!("begins_with({f_ph}, {v_ph})")
        }
        Cond::Contains(f, v) => {
            let f_ph = alloc.name(prefix, f);
            let v_ph = alloc.value(prefix, v.clone());
            format!("contains({f_ph}, {v_ph})")
        }
        Cond::AttributeExists(f) => {
            let f_ph = alloc.name(prefix, f);
            format!("attribute_exists({f_ph})")
        }
        Cond::AttributeNotExists(f) => {
            let f_ph = alloc.name(prefix, f);
            format!("attribute_not_exists({f_ph})")
        }
    })
}

fn binop(
    alloc: &mut PlaceholderAllocator,
    prefix: &str,
    field: &str,
    op: &str,
    value: AttributeValue,
) -> String {
    let f_ph = alloc.name(prefix, field);
    let v_ph = alloc.value(prefix, value);
    format!("{f_ph} {op} {v_ph}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_simple_eq() {
        let mut alloc = PlaceholderAllocator::new();
        let expr = FilterExpr::Leaf(Cond::Eq("status".into(), AttributeValue::S("ok".into())));
        assert_eq!(expr.compile(&mut alloc, "f").unwrap(), "#f1 = :f1");
    }

    #[test]
    fn compiles_and_or_groups() {
        let mut alloc = PlaceholderAllocator::new();
        let expr = FilterExpr::And(vec![
            FilterExpr::Leaf(Cond::Eq("status".into(), AttributeValue::S("ok".into()))),
            FilterExpr::Or(vec![
                FilterExpr::Leaf(Cond::Gt("score".into(), AttributeValue::n(5))),
                FilterExpr::Leaf(Cond::AttributeNotExists("archived".into())),
            ]),
        ]);
        let compiled = expr.compile(&mut alloc, "f").unwrap();
        assert_eq!(compiled, "(#f1 = :f1 AND (#f2 > :f2 OR attribute_not_exists(#f3)))");
    }

    #[test]
    fn rejects_too_many_in_values() {
        let mut alloc = PlaceholderAllocator::new();
        let values = (0..101).map(AttributeValue::n).collect();
        let expr = FilterExpr::Leaf(Cond::In("id".into(), values));
        let err = expr.compile(&mut alloc, "f").unwrap_err();
        assert!(matches!(err, ExprError::TooManyInValues(101)));
    }
}
