//! Static policy rule definitions.
//!
//! A [`Rule`] matches a request when every clause it declares holds: the
//! resource kind, the action, the principal's roles, each `when` condition,
//! and the legacy `conditions` value. Rules are evaluated in declared order
//! and the first match decides.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::condition::Condition;

// ============================================================================
// Errors
// ============================================================================

/// Error raised when a rule is rejected at registration time.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Unknown condition operator: {0}")]
    UnknownOperator(String),

    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Invalid expression '{expression}': {error}")]
    InvalidExpression { expression: String, error: String },

    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Rule {rule}: {source}")]
    InvalidRule {
        rule: String,
        #[source]
        source: Box<PolicyError>,
    },
}

pub type Result<T> = std::result::Result<T, PolicyError>;

// ============================================================================
// Effect
// ============================================================================

/// The effect of a policy rule: allow or deny access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Effect {
    /// Grant access.
    #[serde(alias = "allow", alias = "Allow")]
    Allow,
    /// Deny access.
    #[serde(alias = "deny", alias = "Deny")]
    Deny,
}

impl Default for Effect {
    /// Defaults to `Deny` (deny unless explicitly allowed).
    fn default() -> Self {
        Self::Deny
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allow => write!(f, "ALLOW"),
            Self::Deny => write!(f, "DENY"),
        }
    }
}

// ============================================================================
// Legacy conditions
// ============================================================================

/// The older single-valued `conditions` clause.
///
/// Either one expression string, or an object whose every key/value pair must
/// hold as an `eq` comparison (keys are attribute paths).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LegacyConditions {
    Expression(String),
    Pairs(Map<String, Value>),
}

// ============================================================================
// Rule
// ============================================================================

/// A static role/attribute-based authorization rule.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Rule {
    /// Human-readable name cited in decision reasons and audit records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Resource kind to match. Absent or `*` matches any kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Action to match. Absent or `*` matches any action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Acceptable roles. When present, the principal must hold at least one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
    /// Conditions that must all hold.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub when: Vec<Condition>,
    /// Legacy single conditions value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<LegacyConditions>,
    /// Effect applied when the rule matches.
    pub effect: Effect,
}

impl Rule {
    /// Creates an empty rule with the given effect. With no clauses it
    /// matches every request.
    pub fn new(effect: Effect) -> Self {
        Self {
            effect,
            ..Self::default()
        }
    }

    pub fn allow() -> Self {
        Self::new(Effect::Allow)
    }

    pub fn deny() -> Self {
        Self::new(Effect::Deny)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn on_resource(mut self, kind: impl Into<String>) -> Self {
        self.resource = Some(kind.into());
        self
    }

    pub fn for_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = Some(roles.into_iter().map(Into::into).collect());
        self
    }

    /// Adds a condition to the `when` list.
    pub fn when(mut self, condition: Condition) -> Self {
        self.when.push(condition);
        self
    }

    pub fn with_legacy_conditions(mut self, conditions: LegacyConditions) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// Label used in reasons and logs: the name, or the rule's position.
    pub fn label(&self, index: usize) -> String {
        self.name.clone().unwrap_or_else(|| format!("#{index}"))
    }
}

// ============================================================================
// Tests
// ============================================================================
