//! # warden-types: Core types for `Warden`
//!
//! This crate contains the request-side types shared across the Warden
//! policy decision point:
//! - Free-form attribute maps ([`Attributes`])
//! - The actor being authorized ([`Principal`])
//! - The object being acted upon ([`Resource`])
//! - The merged evaluation context handed to condition evaluation
//!   ([`EvaluationContext`])
//!
//! These values are created by the calling system per request and are never
//! persisted by the decision core.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A free-form attribute map (string key to arbitrary typed value).
pub type Attributes = Map<String, Value>;

// ============================================================================
// Principal
// ============================================================================

/// The authenticated actor (user or service) being authorized.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Principal {
    /// Stable identifier of the actor.
    pub id: String,
    /// Role names held by the actor, in the order the identity provider supplied
    /// them. Duplicates are tolerated.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Additional attributes (department, clearance, tenant, ...).
    #[serde(default)]
    pub attributes: Attributes,
}

impl Principal {
    /// Creates a principal with no roles or attributes.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: Vec::new(),
            attributes: Attributes::new(),
        }
    }

    /// Adds a role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Replaces the role list.
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Sets a single attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Returns true if the principal holds the given role.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Renders the principal as the `principal` namespace of an evaluation
    /// context. `id` and `roles` take precedence over same-named attributes.
    pub fn to_value(&self) -> Value {
        let mut map = self.attributes.clone();
        map.insert("id".to_string(), Value::String(self.id.clone()));
        map.insert(
            "roles".to_string(),
            Value::Array(self.roles.iter().cloned().map(Value::String).collect()),
        );
        Value::Object(map)
    }
}

// ============================================================================
// Resource
// ============================================================================

/// The object being acted upon, typed by `kind`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Resource {
    /// Type tag (e.g. "document", "invoice").
    pub kind: String,
    /// Instance identifier, when the request targets one object.
    #[serde(default)]
    pub id: Option<String>,
    /// Additional attributes (owner, classification, ...).
    #[serde(default)]
    pub attributes: Attributes,
}

impl Resource {
    /// Creates a resource of the given kind with no identifier.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: None,
            attributes: Attributes::new(),
        }
    }

    /// Sets the instance identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets a single attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Renders the resource as the `resource` namespace of an evaluation
    /// context. `kind` and `id` take precedence over same-named attributes.
    pub fn to_value(&self) -> Value {
        let mut map = self.attributes.clone();
        map.insert("kind".to_string(), Value::String(self.kind.clone()));
        map.insert(
            "id".to_string(),
            self.id.clone().map_or(Value::Null, Value::String),
        );
        Value::Object(map)
    }
}

// ============================================================================
// Evaluation Context
// ============================================================================

/// The merged attribute tree that conditions are evaluated against.
///
/// Layout:
///
/// ```text
/// {
///   "principal": { "id": .., "roles": [..], ..attributes },
///   "resource":  { "kind": .., "id": .., ..attributes },
///   "action":    "read",
///   "context":   { ..environment attributes }
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationContext {
    root: Value,
}

impl EvaluationContext {
    /// Builds the context for one authorization request.
    pub fn new(
        principal: &Principal,
        resource: &Resource,
        action: &str,
        environment: &Attributes,
    ) -> Self {
        let mut root = Map::new();
        root.insert("principal".to_string(), principal.to_value());
        root.insert("resource".to_string(), resource.to_value());
        root.insert("action".to_string(), Value::String(action.to_string()));
        root.insert("context".to_string(), Value::Object(environment.clone()));
        Self {
            root: Value::Object(root),
        }
    }

    /// Wraps an arbitrary JSON value as a context (used for flat contexts).
    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    /// Returns the root of the attribute tree.
    pub fn as_value(&self) -> &Value {
        &self.root
    }
}

// ============================================================================
// Tests
// ============================================================================
