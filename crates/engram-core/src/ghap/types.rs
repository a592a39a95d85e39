//! GHAP Entry Types
//!
//! The ACTIVE in-memory form plus the start/update/resolve inputs.
//! Transitions are total functions on these types: they either produce
//! the next state or a typed error, never a partial mutation.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::enums::{Domain, Outcome, Strategy};
use crate::error::{EngineError, Result};

/// An ACTIVE (unresolved) GHAP entry
#[derive(Debug, Clone, Serialize)]
pub struct GhapEntry {
    /// Entry id
    pub id: String,
    /// Owning session
    pub session_id: String,
    /// Creation time; immutable
    pub created_at: DateTime<Utc>,
    /// Problem domain
    pub domain: Domain,
    /// Approach taken
    pub strategy: Strategy,
    /// What the episode tries to achieve
    pub goal: String,
    /// The belief under test
    pub hypothesis: String,
    /// What is being done
    pub action: String,
    /// The expected observation
    pub prediction: String,
    /// Starts at 1; incremented on every update
    pub iteration_count: u32,
}

/// Input to `start_ghap`
#[derive(Debug, Clone)]
pub struct GhapStart {
    /// Problem domain
    pub domain: Domain,
    /// Approach taken
    pub strategy: Strategy,
    /// Goal text
    pub goal: String,
    /// Hypothesis text
    pub hypothesis: String,
    /// Action text
    pub action: String,
    /// Prediction text
    pub prediction: String,
}

impl GhapStart {
    /// All four narrative fields are required and non-empty
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        for (name, value) in [
            ("goal", &self.goal),
            ("hypothesis", &self.hypothesis),
            ("action", &self.action),
            ("prediction", &self.prediction),
        ] {
            if value.trim().is_empty() {
                missing.push(name);
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Input to `update_ghap`; at least one field must be present
#[derive(Debug, Clone, Default)]
pub struct GhapUpdate {
    /// Revised hypothesis
    pub hypothesis: Option<String>,
    /// Revised action
    pub action: Option<String>,
    /// Revised prediction
    pub prediction: Option<String>,
}

impl GhapUpdate {
    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        self.hypothesis.is_none() && self.action.is_none() && self.prediction.is_none()
    }
}

/// Input to `resolve_ghap`
#[derive(Debug, Clone)]
pub struct Resolution {
    /// How the episode ended
    pub outcome: Outcome,
    /// Required iff falsified
    pub surprise: Option<String>,
    /// Required iff falsified
    pub root_cause: Option<String>,
    /// Optional takeaway
    pub lesson: Option<String>,
}

impl Resolution {
    /// A falsified outcome requires both `surprise` and `root_cause`; the
    /// error names every missing field
    pub fn validate(&self) -> Result<()> {
        if self.outcome != Outcome::Falsified {
            return Ok(());
        }
        let mut missing = Vec::new();
        if self.surprise.as_deref().is_none_or(|s| s.trim().is_empty()) {
            missing.push("surprise");
        }
        if self.root_cause.as_deref().is_none_or(|s| s.trim().is_empty()) {
            missing.push("root_cause");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Validation(format!(
                "a falsified outcome requires: {}",
                missing.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_validation_names_missing_fields() {
        let start = GhapStart {
            domain: Domain::Testing,
            strategy: Strategy::TestDriven,
            goal: String::new(),
            hypothesis: "h".to_string(),
            action: "  ".to_string(),
            prediction: "p".to_string(),
        };
        let err = start.validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("goal"));
        assert!(message.contains("action"));
        assert!(!message.contains("hypothesis"));
    }

    #[test]
    fn falsified_without_fields_names_both() {
        let resolution = Resolution {
            outcome: Outcome::Falsified,
            surprise: None,
            root_cause: Some("".to_string()),
            lesson: None,
        };
        let err = resolution.validate().unwrap_err();
        assert!(err.to_string().contains("surprise"));
        assert!(err.to_string().contains("root_cause"));
    }

    #[test]
    fn confirmed_needs_no_extra_fields() {
        let resolution = Resolution {
            outcome: Outcome::Confirmed,
            surprise: None,
            root_cause: None,
            lesson: None,
        };
        assert!(resolution.validate().is_ok());
    }
}
