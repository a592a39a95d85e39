//! Tools
//!
//! One module per tool family, each exposing `schema()` functions and
//! `execute_*` handlers. Schemas and validators read from the same enum
//! constant tables in `engram_core::enums`, so the advertised enum lists
//! and the accepted values cannot drift apart.
//!
//! Validation is strict: out-of-range numbers and unknown enum literals
//! are rejected with messages that enumerate what is permitted. Mutation
//! responses are minimal (`{ok, id}`) to preserve caller token budget.

pub mod code;
pub mod context;
pub mod ghap;
pub mod git;
pub mod learning;
pub mod memory;
pub mod search;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use engram_core::EngineError;

// ============================================================================
// TOOL ERRORS
// ============================================================================

/// A structured tool error: `{error: {kind, message, hint?, ...}}`
#[derive(Debug, Clone)]
pub struct ToolError {
    /// Stable error kind
    pub kind: String,
    /// Human-readable message
    pub message: String,
    /// Actionable hint, when one exists
    pub hint: Option<String>,
    /// Extra structured fields merged into the error object (e.g. the
    /// live id for `active_ghap_exists`)
    pub data: Option<Value>,
}

impl ToolError {
    /// A validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: "validation_error".to_string(),
            message: message.into(),
            hint: Some("check the parameter constraints in the tool schema".to_string()),
            data: None,
        }
    }

    /// Render as the wire error envelope
    pub fn to_json(&self) -> Value {
        let mut error = serde_json::Map::new();
        error.insert("kind".to_string(), json!(self.kind));
        error.insert("message".to_string(), json!(self.message));
        if let Some(hint) = &self.hint {
            error.insert("hint".to_string(), json!(hint));
        }
        if let Some(Value::Object(extra)) = &self.data {
            for (key, value) in extra {
                error.insert(key.clone(), value.clone());
            }
        }
        json!({ "error": Value::Object(error) })
    }
}

impl From<EngineError> for ToolError {
    fn from(e: EngineError) -> Self {
        let data = match &e {
            EngineError::ActiveGhapExists { id } => Some(json!({ "id": id })),
            _ => None,
        };
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
            hint: e.hint().map(str::to_string),
            data,
        }
    }
}

/// Tool execution result
pub type ToolResult = std::result::Result<Value, ToolError>;

// ============================================================================
// ARGUMENT HELPERS
// ============================================================================

/// Deserialize tool arguments; a malformed body is a validation error
pub(crate) fn parse_args<T: DeserializeOwned>(args: Option<Value>) -> Result<T, ToolError> {
    let value = args.unwrap_or_else(|| json!({}));
    serde_json::from_value(value).map_err(|e| ToolError::validation(format!("invalid arguments: {}", e)))
}

/// Strict integer bound check; never clamps
pub(crate) fn check_range_u(
    name: &str,
    value: usize,
    min: usize,
    max: usize,
) -> Result<usize, ToolError> {
    if value < min || value > max {
        return Err(ToolError::validation(format!(
            "{} {} out of range; must be within [{}, {}]",
            name, value, min, max
        )));
    }
    Ok(value)
}

/// Strict float bound check; never clamps
pub(crate) fn check_range_f(
    name: &str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<f64, ToolError> {
    if !value.is_finite() || value < min || value > max {
        return Err(ToolError::validation(format!(
            "{} {} out of range; must be within [{}, {}]",
            name, value, min, max
        )));
    }
    Ok(value)
}

/// Parse a closed-set enum literal; the error enumerates the valid options
pub(crate) fn parse_closed<T>(value: &str) -> Result<T, ToolError>
where
    T: std::str::FromStr<Err = String>,
{
    value.parse().map_err(ToolError::validation)
}

/// Parse an RFC-3339 timestamp argument
pub(crate) fn parse_rfc3339(
    name: &str,
    value: &str,
) -> Result<chrono::DateTime<chrono::Utc>, ToolError> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&chrono::Utc))
        .map_err(|_| {
            ToolError::validation(format!(
                "{} '{}' is not an RFC-3339 timestamp",
                name, value
            ))
        })
}

// ============================================================================
// SCHEMA HELPERS
// ============================================================================

/// String property
pub(crate) fn string_prop(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

/// Enum property built from a closed set's literal table
pub(crate) fn enum_prop(description: &str, options: Vec<&'static str>) -> Value {
    json!({ "type": "string", "description": description, "enum": options })
}

/// Bounded integer property
pub(crate) fn int_prop(description: &str, min: usize, max: usize, default: usize) -> Value {
    json!({
        "type": "integer",
        "description": description,
        "minimum": min,
        "maximum": max,
        "default": default,
    })
}

/// Bounded number property
pub(crate) fn number_prop(description: &str, min: f64, max: f64, default: f64) -> Value {
    json!({
        "type": "number",
        "description": description,
        "minimum": min,
        "maximum": max,
        "default": default,
    })
}

/// Boolean property
pub(crate) fn bool_prop(description: &str, default: bool) -> Value {
    json!({ "type": "boolean", "description": description, "default": default })
}

/// String-array property
pub(crate) fn string_array_prop(description: &str) -> Value {
    json!({
        "type": "array",
        "items": { "type": "string" },
        "description": description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_conversion_keeps_kind_and_id() {
        let err: ToolError = EngineError::ActiveGhapExists { id: "g1".into() }.into();
        assert_eq!(err.kind, "active_ghap_exists");
        let json = err.to_json();
        assert_eq!(json["error"]["id"], "g1");
        assert_eq!(json["error"]["kind"], "active_ghap_exists");
    }

    #[test]
    fn range_check_rejects_not_clamps() {
        assert!(check_range_u("limit", 0, 1, 50).is_err());
        assert!(check_range_u("limit", 51, 1, 50).is_err());
        assert_eq!(check_range_u("limit", 50, 1, 50).unwrap(), 50);

        let err = check_range_f("importance", 1.2, 0.0, 1.0).unwrap_err();
        assert!(err.message.contains("[0, 1]"));
    }

    #[test]
    fn internal_error_json_has_no_hint() {
        let err: ToolError = EngineError::Internal("boom".into()).into();
        let json = err.to_json();
        assert!(json["error"].get("hint").is_none());
        assert_eq!(json["error"]["kind"], "internal_error");
    }
}
