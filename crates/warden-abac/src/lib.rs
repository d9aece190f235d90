//! # warden-abac: Attribute-Based Access Control
//!
//! Provides the static half of the Warden policy decision point:
//! - **Condition evaluation**: structured `{left, op, right}` comparisons and a
//!   restricted boolean expression language, both fail-secure
//! - **Policy rule matching**: ordered rules over resource kind, action,
//!   roles and conditions, first match wins, deny by default
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Access Request                              │
//! │  (Principal + Resource + Action + Context)   │
//! └─────────────────┬───────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  PolicyRuleMatcher                           │
//! │  ├─ Walk rules in declared order             │
//! │  ├─ Match kind / action / roles              │
//! │  └─ ConditionEvaluator for `when` clauses    │
//! └─────────────────┬───────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  Decision                                    │
//! │  - allowed / effect                          │
//! │  - Matched rule                              │
//! │  - Human-readable reason                     │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Free-form expressions are never handed to a general-purpose interpreter:
//! they are parsed by [`expression::parse`] into a small AST limited to
//! literals, `principal.*` / `resource.*` / `context.*` paths, comparisons and
//! `&&` / `||`.
//!
//! ## Examples
//!
//! ```
//! use warden_abac::{Condition, PolicyRuleMatcher, Rule};
//! use warden_types::{Principal, Resource};
//!
//! let matcher = PolicyRuleMatcher::with_rules([
//!     Rule::allow()
//!         .named("admins-read-docs")
//!         .on_resource("doc")
//!         .for_action("read")
//!         .with_roles(["ADMIN"])
//!         .when(Condition::expression("resource.archived != true")),
//! ])?;
//!
//! let alice = Principal::new("alice").with_role("ADMIN");
//! let decision = matcher.evaluate(&alice, &Resource::new("doc"), "read");
//! assert!(decision.allowed);
//!
//! let bob = Principal::new("bob").with_role("VIEWER");
//! assert!(!matcher.evaluate(&bob, &Resource::new("doc"), "read").allowed);
//! # Ok::<(), warden_abac::PolicyError>(())
//! ```

pub mod condition;
pub mod expression;
pub mod matcher;
pub mod path;
pub mod policy;

pub use condition::{Condition, ConditionEvaluator, Operator, ValidationResult, evaluate_condition};
pub use expression::{Expr, ExpressionError};
pub use matcher::{AccessRequest, Decision, NO_MATCHING_POLICY, PolicyRuleMatcher};
pub use policy::{Effect, LegacyConditions, PolicyError, Rule};
