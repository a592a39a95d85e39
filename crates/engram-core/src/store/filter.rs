//! Store-Neutral Filter Grammar
//!
//! A filter maps payload keys to conditions: scalar equality, `$in`
//! membership, or numeric ranges (`$gte`/`$lte`/`$gt`/`$lt`). Both store
//! implementations evaluate filters with this one matcher, so range and
//! `$in` semantics cannot diverge between them.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::StoreError;

/// A single payload-key condition
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Scalar equality; numbers compare numerically (`5 == 5.0`)
    Eq(Value),
    /// Membership in a value set
    In(Vec<Value>),
    /// Numeric range; any subset of the four bounds
    Range {
        /// Inclusive lower bound
        gte: Option<f64>,
        /// Inclusive upper bound
        lte: Option<f64>,
        /// Exclusive lower bound
        gt: Option<f64>,
        /// Exclusive upper bound
        lt: Option<f64>,
    },
}

/// A conjunction of per-key conditions (BTreeMap for stable ordering)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter(pub BTreeMap<String, Condition>);

impl Filter {
    /// Empty filter (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality condition
    pub fn eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), Condition::Eq(value.into()));
        self
    }

    /// Add a membership condition
    pub fn any_of(mut self, key: impl Into<String>, values: Vec<Value>) -> Self {
        self.0.insert(key.into(), Condition::In(values));
        self
    }

    /// Add a range condition
    pub fn range(
        mut self,
        key: impl Into<String>,
        gte: Option<f64>,
        lte: Option<f64>,
        gt: Option<f64>,
        lt: Option<f64>,
    ) -> Self {
        self.0.insert(key.into(), Condition::Range { gte, lte, gt, lt });
        self
    }

    /// True when every condition holds against the payload. A missing key
    /// fails the filter.
    pub fn matches(&self, payload: &Map<String, Value>) -> bool {
        self.0.iter().all(|(key, condition)| {
            let Some(value) = payload.get(key) else {
                return false;
            };
            condition_matches(condition, value)
        })
    }

    /// Parse the wire form: `{key: scalar | {$in: [...]} | {$gte: n, ...}}`
    pub fn from_json(object: &Value) -> Result<Self, StoreError> {
        let Some(map) = object.as_object() else {
            return Err(StoreError::InvalidFilter(
                "filter must be a JSON object".to_string(),
            ));
        };

        let mut conditions = BTreeMap::new();
        for (key, spec) in map {
            conditions.insert(key.clone(), parse_condition(key, spec)?);
        }
        Ok(Self(conditions))
    }

    /// True when the filter has no conditions
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn parse_condition(key: &str, spec: &Value) -> Result<Condition, StoreError> {
    let Some(object) = spec.as_object() else {
        // Bare scalar (or array/null) is equality
        return Ok(Condition::Eq(spec.clone()));
    };

    let has_operators = object.keys().any(|k| k.starts_with('$'));
    if !has_operators {
        return Ok(Condition::Eq(spec.clone()));
    }

    if let Some(values) = object.get("$in") {
        if object.len() != 1 {
            return Err(StoreError::InvalidFilter(format!(
                "key '{}': $in cannot be combined with other operators",
                key
            )));
        }
        let Some(values) = values.as_array() else {
            return Err(StoreError::InvalidFilter(format!(
                "key '{}': $in requires an array",
                key
            )));
        };
        return Ok(Condition::In(values.clone()));
    }

    let mut gte = None;
    let mut lte = None;
    let mut gt = None;
    let mut lt = None;
    for (op, bound) in object {
        let Some(bound) = bound.as_f64() else {
            return Err(StoreError::InvalidFilter(format!(
                "key '{}': {} requires a number",
                key, op
            )));
        };
        match op.as_str() {
            "$gte" => gte = Some(bound),
            "$lte" => lte = Some(bound),
            "$gt" => gt = Some(bound),
            "$lt" => lt = Some(bound),
            other => {
                return Err(StoreError::InvalidFilter(format!(
                    "key '{}': unknown operator '{}'",
                    key, other
                )));
            }
        }
    }
    Ok(Condition::Range { gte, lte, gt, lt })
}

fn condition_matches(condition: &Condition, value: &Value) -> bool {
    match condition {
        Condition::Eq(expected) => value_eq(expected, value),
        Condition::In(values) => values.iter().any(|expected| value_eq(expected, value)),
        Condition::Range { gte, lte, gt, lt } => {
            let Some(n) = value.as_f64() else {
                return false;
            };
            if let Some(bound) = gte {
                if n < *bound {
                    return false;
                }
            }
            if let Some(bound) = lte {
                if n > *bound {
                    return false;
                }
            }
            if let Some(bound) = gt {
                if n <= *bound {
                    return false;
                }
            }
            if let Some(bound) = lt {
                if n >= *bound {
                    return false;
                }
            }
            true
        }
    }
}

/// JSON equality with numeric coercion: `5` equals `5.0`
fn value_eq(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn equality_matches_scalars() {
        let filter = Filter::new().eq("language", "rust");
        assert!(filter.matches(&payload(json!({"language": "rust"}))));
        assert!(!filter.matches(&payload(json!({"language": "python"}))));
        assert!(!filter.matches(&payload(json!({}))));
    }

    #[test]
    fn numeric_equality_coerces_integer_and_float() {
        let filter = Filter::new().eq("count", 5);
        assert!(filter.matches(&payload(json!({"count": 5.0}))));
    }

    #[test]
    fn in_condition() {
        let filter = Filter::new().any_of("category", vec![json!("fact"), json!("event")]);
        assert!(filter.matches(&payload(json!({"category": "event"}))));
        assert!(!filter.matches(&payload(json!({"category": "workflow"}))));
    }

    #[test]
    fn range_bounds_are_half_open_where_specified() {
        // Midnight boundary: $gte includes it, $lt excludes the next one
        let midnight = 1_700_000_000.0;
        let next_midnight = midnight + 86_400.0;
        let filter = Filter::new().range("timestamp", Some(midnight), None, None, Some(next_midnight));

        assert!(filter.matches(&payload(json!({"timestamp": midnight}))));
        assert!(filter.matches(&payload(json!({"timestamp": midnight + 1.0}))));
        assert!(!filter.matches(&payload(json!({"timestamp": next_midnight}))));
    }

    #[test]
    fn exclusive_bounds() {
        let filter = Filter::new().range("importance", None, None, Some(0.5), None);
        assert!(!filter.matches(&payload(json!({"importance": 0.5}))));
        assert!(filter.matches(&payload(json!({"importance": 0.51}))));
    }

    #[test]
    fn parse_wire_grammar() {
        let filter = Filter::from_json(&json!({
            "project": "engram",
            "language": {"$in": ["rust", "python"]},
            "timestamp": {"$gte": 100, "$lt": 200},
        }))
        .unwrap();

        assert!(filter.matches(&payload(json!({
            "project": "engram", "language": "rust", "timestamp": 150,
        }))));
        assert!(!filter.matches(&payload(json!({
            "project": "engram", "language": "go", "timestamp": 150,
        }))));
        assert!(!filter.matches(&payload(json!({
            "project": "engram", "language": "rust", "timestamp": 200,
        }))));
    }

    #[test]
    fn parse_rejects_unknown_operator() {
        let err = Filter::from_json(&json!({"x": {"$like": "a%"}}));
        assert!(err.is_err());
    }

    #[test]
    fn parse_rejects_in_mixed_with_range() {
        let err = Filter::from_json(&json!({"x": {"$in": [1], "$gte": 0}}));
        assert!(err.is_err());
    }

    #[test]
    fn range_over_non_number_fails() {
        let filter = Filter::new().range("timestamp", Some(0.0), None, None, None);
        assert!(!filter.matches(&payload(json!({"timestamp": "2026-01-01"}))));
    }
}
