//! # Warden: a policy decision point
//!
//! Given a principal, a resource, an action and live situational context,
//! Warden decides `ALLOW`, `DENY`, `REQUIRE_MFA` or `BLOCK_TEMPORARILY` and
//! justifies the decision.
//!
//! ```text
//! caller resolves AccessContext
//!         │
//!         ▼
//! ┌──────────────────────────┐   non-ALLOW action
//! │ ConditionalAccessEngine  │ ─────────────────────► denial + required steps
//! └────────────┬─────────────┘
//!              │ ALLOW / no rule matched
//!              ▼
//! ┌──────────────────────────┐
//! │ PolicyRuleMatcher        │ ─► first matching rule, or default deny
//! └────────────┬─────────────┘
//!              ▼
//!        AuditSink (fire-and-forget)
//! ```
//!
//! The compliance mapper is administrative and sits outside the request
//! path; [`config::WardenConfig::compliance_mapper`] builds one from
//! configuration.
//!
//! ## Examples
//!
//! ```
//! use chrono::Utc;
//! use warden::{AccessContext, PolicyDecisionPoint, Principal, Resource};
//! use warden::abac::{PolicyRuleMatcher, Rule};
//! use warden::access::ConditionalAccessEngine;
//!
//! let matcher = PolicyRuleMatcher::with_rules([
//!     Rule::allow().on_resource("doc").for_action("read").with_roles(["ADMIN"]),
//! ])?;
//! let pdp = PolicyDecisionPoint::new(matcher, ConditionalAccessEngine::new());
//!
//! let alice = Principal::new("alice").with_role("ADMIN");
//! let ctx = AccessContext::new("alice", "10.0.0.8", Utc::now());
//! assert!(pdp.authorize(&alice, &Resource::new("doc"), "read", &ctx).allowed);
//! # Ok::<(), warden::abac::PolicyError>(())
//! ```

pub mod audit;
pub mod pdp;

pub use warden_abac as abac;
pub use warden_access as access;
pub use warden_compliance as compliance;
pub use warden_config as config;

pub use audit::{AuditError, AuditSink, DecisionRecord, MemoryAuditSink, TracingAuditSink};
pub use pdp::{Authorization, DecisionSource, PolicyDecisionPoint};
pub use warden_access::AccessContext;
pub use warden_types::{Attributes, Principal, Resource};
