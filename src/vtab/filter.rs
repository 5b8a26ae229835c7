//! Post-search scalar-column predicates.
//!
//! The host's query planner pushes equality/range constraints on user
//! scalar columns down to the bridge; they are evaluated after retrieval,
//! against the values read back from the scalar shadow table.

use std::cmp::Ordering;

use crate::host::Value;

/// Comparison operator of one pushed-down constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// One pushed-down predicate `column OP value`.
#[derive(Debug, Clone)]
pub struct ColumnFilter {
    /// Scalar column the predicate addresses.
    pub column: String,
    /// Comparison operator.
    pub op: FilterOp,
    /// Right-hand side constant.
    pub value: Value,
}

/// SQL-style comparison: numeric values compare across Integer/Real,
/// text and blobs compare within their own type, everything else is
/// incomparable.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
        (Value::Real(x), Value::Real(y)) => x.partial_cmp(y),
        (Value::Integer(x), Value::Real(y)) => (*x as f64).partial_cmp(y),
        (Value::Real(x), Value::Integer(y)) => x.partial_cmp(&(*y as f64)),
        (Value::Text(x), Value::Text(y)) => Some(x.as_str().cmp(y.as_str())),
        (Value::Blob(x), Value::Blob(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

impl ColumnFilter {
    /// Evaluates the predicate against a stored value.
    ///
    /// NULL never matches, matching SQL comparison semantics.
    #[must_use]
    pub fn matches(&self, actual: &Value) -> bool {
        if actual.is_null() || self.value.is_null() {
            return false;
        }
        let Some(ordering) = compare(actual, &self.value) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => ordering == Ordering::Equal,
            FilterOp::Ne => ordering != Ordering::Equal,
            FilterOp::Lt => ordering == Ordering::Less,
            FilterOp::Le => ordering != Ordering::Greater,
            FilterOp::Gt => ordering == Ordering::Greater,
            FilterOp::Ge => ordering != Ordering::Less,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(op: FilterOp, value: Value) -> ColumnFilter {
        ColumnFilter {
            column: "c".into(),
            op,
            value,
        }
    }

    #[test]
    fn test_integer_comparisons() {
        assert!(filter(FilterOp::Eq, Value::Integer(5)).matches(&Value::Integer(5)));
        assert!(filter(FilterOp::Ne, Value::Integer(5)).matches(&Value::Integer(6)));
        assert!(filter(FilterOp::Lt, Value::Integer(5)).matches(&Value::Integer(4)));
        assert!(filter(FilterOp::Ge, Value::Integer(5)).matches(&Value::Integer(5)));
        assert!(!filter(FilterOp::Gt, Value::Integer(5)).matches(&Value::Integer(5)));
    }

    #[test]
    fn test_numeric_affinity() {
        assert!(filter(FilterOp::Eq, Value::Real(5.0)).matches(&Value::Integer(5)));
        assert!(filter(FilterOp::Lt, Value::Integer(5)).matches(&Value::Real(4.5)));
    }

    #[test]
    fn test_text_comparison() {
        assert!(filter(FilterOp::Eq, Value::Text("abc".into()))
            .matches(&Value::Text("abc".into())));
        assert!(filter(FilterOp::Lt, Value::Text("b".into()))
            .matches(&Value::Text("a".into())));
    }

    #[test]
    fn test_null_never_matches() {
        assert!(!filter(FilterOp::Eq, Value::Null).matches(&Value::Null));
        assert!(!filter(FilterOp::Ne, Value::Integer(1)).matches(&Value::Null));
        assert!(!filter(FilterOp::Eq, Value::Null).matches(&Value::Integer(1)));
    }

    #[test]
    fn test_type_mismatch_never_matches() {
        assert!(!filter(FilterOp::Eq, Value::Text("1".into())).matches(&Value::Integer(1)));
        assert!(!filter(FilterOp::Ne, Value::Text("1".into())).matches(&Value::Integer(1)));
    }
}
