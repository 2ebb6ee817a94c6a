//! C12 — advisory input validation (spec §4.3's identifier/operator rules,
//! §9 Open Question 2).
//!
//! This is defense-in-depth, not a security boundary: the store speaks a
//! typed wire protocol, not SQL, so there is no query text for anything
//! here to actually get injected into. It exists to reject malformed or
//! suspicious identifiers, operators, and values with a clear
//! `invalid_operator`/`invalid_value`/`injection_attempt` error before they
//! reach the expression builder, rather than surfacing as an opaque wire
//! failure. Do not rely on a successful validation as an authorization or
//! sanitization guarantee.

use crate::error::ValidateError;
use crate::value::AttributeValue;

/// Operators the expression builder (`src/expr`) actually compiles.
/// Anything outside this set is rejected before a [`crate::expr`] call
/// ever sees it.
const ALLOWED_OPERATORS: &[&str] = &[
    "=", "<>", "!=", "<", "<=", ">", ">=", "BETWEEN", "IN", "BEGINS_WITH", "CONTAINS",
    "attribute_exists", "attribute_not_exists",
];

const MAX_IDENTIFIER_LEN: usize = 255;
const MAX_STRING_VALUE_LEN: usize = 400 * 1024;

/// An attribute or placeholder-target identifier: non-empty, ASCII
/// alphanumeric/underscore/dot (dot for nested document paths),
/// not starting with a digit, under the length DynamoDB itself enforces
/// for attribute names.
pub fn validate_identifier(name: &str) -> Result<(), ValidateError> {
    if name.is_empty() || name.len() > MAX_IDENTIFIER_LEN {
        return Err(ValidateError::InvalidIdentifier(name.to_string()));
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(ValidateError::InvalidIdentifier(name.to_string()));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '#' || c == '[' || c == ']') {
        return Err(ValidateError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

pub fn validate_operator(op: &str) -> Result<(), ValidateError> {
    if ALLOWED_OPERATORS.contains(&op) {
        Ok(())
    } else {
        Err(ValidateError::InvalidOperator(op.to_string()))
    }
}

/// Reject values DynamoDB's own `N` type cannot represent (`NaN`,
/// infinities) and strings/binaries past the size this crate supports
/// without chunking.
pub fn validate_value(value: &AttributeValue) -> Result<(), ValidateError> {
    match value {
        AttributeValue::N(n) => {
            let parsed: f64 = n
                .parse()
                .map_err(|_| ValidateError::InvalidValue(format!("`{n}` is not a valid number")))?;
            if !parsed.is_finite() {
                return Err(ValidateError::InvalidValue(format!("`{n}` is not finite")));
            }
            Ok(())
        }
        AttributeValue::S(s) if s.len() > MAX_STRING_VALUE_LEN => {
            Err(ValidateError::InvalidValue("string value exceeds the maximum supported length".to_string()))
        }
        AttributeValue::B(b) if b.len() > MAX_STRING_VALUE_LEN => {
            Err(ValidateError::InvalidValue("binary value exceeds the maximum supported length".to_string()))
        }
        AttributeValue::L(items) => {
            for item in items {
                validate_value(item)?;
            }
            Ok(())
        }
        AttributeValue::M(map) => {
            for (k, v) in map {
                validate_identifier(k)?;
                validate_value(v)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Tokens with no legitimate use in an attribute name or raw placeholder
/// that this crate supplies to the wire — present almost exclusively in
/// attempts to break out of the expression grammar.
const SUSPICIOUS_TOKENS: &[&str] = &["--", "/*", "*/", ";", "\0"];

/// Flag raw, user-authored expression fragments (e.g. text fed to
/// `FilterExpr`'s raw-condition escape hatch) that contain tokens with no
/// legitimate meaning in this crate's expression grammar. Advisory only —
/// see the module doc comment.
pub fn validate_no_injection(raw: &str) -> Result<(), ValidateError> {
    for token in SUSPICIOUS_TOKENS {
        if raw.contains(token) {
            return Err(ValidateError::InjectionAttempt(raw.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_identifiers() {
        assert!(validate_identifier("order_id").is_ok());
        assert!(validate_identifier("profile.address.city").is_ok());
        assert!(validate_identifier("#pk0").is_ok());
    }

    #[test]
    fn rejects_empty_and_digit_led_identifiers() {
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1field").is_err());
    }

    #[test]
    fn rejects_unknown_operator() {
        assert!(validate_operator("DROP TABLE").is_err());
        assert!(validate_operator("=").is_ok());
    }

    #[test]
    fn rejects_non_finite_numbers() {
        let err = validate_value(&AttributeValue::n("NaN")).unwrap_err();
        assert!(matches!(err, ValidateError::InvalidValue(_)));
    }

    #[test]
    fn accepts_nested_list_and_map_values() {
        let value = AttributeValue::L(vec![AttributeValue::n(1), AttributeValue::S("ok".to_string())]);
        assert!(validate_value(&value).is_ok());
    }

    #[test]
    fn flags_comment_style_injection_tokens() {
        let err = validate_no_injection("title = :v; DROP TABLE users --").unwrap_err();
        assert!(matches!(err, ValidateError::InjectionAttempt(_)));
    }

    #[test]
    fn passes_ordinary_raw_expressions() {
        assert!(validate_no_injection("attribute_exists(pk) AND #v > :v").is_ok());
    }
}
