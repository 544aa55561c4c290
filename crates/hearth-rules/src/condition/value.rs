//! Wire-value coercion and comparison for attribute conditions.

use serde_json::Value;

/// Comparison operator used by attribute conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Ne => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
        }
    }
}

/// Boolean combinator used by [`crate::condition::BooleanCondition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanOp {
    And,
    Or,
    Not,
}

impl BooleanOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BooleanOp::And => "and",
            BooleanOp::Or => "or",
            BooleanOp::Not => "not",
        }
    }
}

/// Coerce an incoming wire value to the JSON "shape" of `target` (the literal that defines the
/// condition's expected type). String->bool coercion treats a fixed vocabulary of truthy tokens
/// (case-insensitive) as `true`; anything else is `false`. Coercion failures fall back to the
/// raw incoming value, per spec.
pub fn coerce_value(target: &Value, incoming: &Value) -> Value {
    match target {
        Value::Bool(_) => Value::Bool(coerce_bool(incoming)),
        Value::Number(n) if n.is_f64() && !n.is_i64() && !n.is_u64() => match as_f64(incoming) {
            Some(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or_else(|| incoming.clone()),
            None => incoming.clone(),
        },
        Value::Number(_) => match as_i64(incoming) {
            Some(i) => Value::Number(i.into()),
            None => incoming.clone(),
        },
        Value::String(_) => Value::String(stringify(incoming)),
        _ => incoming.clone(),
    }
}

const TRUTHY_TOKENS: &[&str] = &["true", "1", "yes", "on", "active", "open"];

fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => TRUTHY_TOKENS.contains(&s.to_lowercase().as_str()),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        _ => false,
    }
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        Value::Bool(b) => Some(*b as i64),
        _ => None,
    }
}

pub(crate) fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Compare two values under `op`. Ordering comparisons with a null/missing operand on either
/// side evaluate to `false`; equality comparisons use plain JSON equality.
pub fn compare_values(op: ComparisonOp, left: &Value, right: &Value) -> bool {
    match op {
        ComparisonOp::Eq => left == right,
        ComparisonOp::Ne => left != right,
        ComparisonOp::Lt | ComparisonOp::Le | ComparisonOp::Gt | ComparisonOp::Ge => {
            if left.is_null() || right.is_null() {
                return false;
            }
            let (Some(l), Some(r)) = (as_f64(left), as_f64(right)) else {
                return false;
            };
            match op {
                ComparisonOp::Lt => l < r,
                ComparisonOp::Le => l <= r,
                ComparisonOp::Gt => l > r,
                ComparisonOp::Ge => l >= r,
                _ => unreachable!(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_bool_truthy_tokens() {
        let target = json!(false);
        for token in ["true", "1", "Yes", "ON", "Active", "open"] {
            assert_eq!(coerce_value(&target, &json!(token)), json!(true));
        }
        assert_eq!(coerce_value(&target, &json!("nope")), json!(false));
    }

    #[test]
    fn test_coerce_int_from_string() {
        let target = json!(0);
        assert_eq!(coerce_value(&target, &json!("42")), json!(42));
    }

    #[test]
    fn test_coerce_falls_back_on_failure() {
        let target = json!(0);
        assert_eq!(coerce_value(&target, &json!("not a number")), json!("not a number"));
    }

    #[test]
    fn test_compare_ordering_with_null_is_false() {
        assert!(!compare_values(ComparisonOp::Lt, &Value::Null, &json!(5)));
        assert!(!compare_values(ComparisonOp::Gt, &json!(5), &Value::Null));
    }

    #[test]
    fn test_compare_equality_and_ordering() {
        assert!(compare_values(ComparisonOp::Eq, &json!("on"), &json!("on")));
        assert!(compare_values(ComparisonOp::Lt, &json!(1), &json!(2)));
        assert!(compare_values(ComparisonOp::Ge, &json!(2), &json!(2)));
    }
}
