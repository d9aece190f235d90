//! # warden-access: Conditional Access
//!
//! Context-triggered rules that run ahead of static role/attribute policy.
//! A rule inspects the resolved [`AccessContext`] (device, geolocation, time,
//! network, behavioral risk) and, when it matches, produces one of the
//! [`AccessAction`]s `ALLOW`, `DENY`, `REQUIRE_MFA` or `BLOCK_TEMPORARILY`.
//!
//! The engine also owns the per-principal trusted device registry consulted by
//! `requireTrustedDevice` conditions.
//!
//! ## Examples
//!
//! ```
//! use chrono::Utc;
//! use warden_access::{
//!     AccessAction, AccessContext, ConditionalAccessEngine, ConditionalAccessRule, GeoConditions,
//! };
//!
//! let engine = ConditionalAccessEngine::new();
//! engine.register_rule(
//!     ConditionalAccessRule::new("geo-block", "Geo block", AccessAction::Deny).with_geo_conditions(
//!         GeoConditions {
//!             blocked_countries: vec!["KP".to_string()],
//!             ..GeoConditions::default()
//!         },
//!     ),
//! )?;
//!
//! let ctx = AccessContext::new("alice", "198.51.100.4", Utc::now()).with_country("KP");
//! let decision = engine.evaluate(&ctx);
//! assert!(!decision.allowed);
//! assert_eq!(decision.action, AccessAction::Deny);
//! # Ok::<(), warden_access::AccessError>(())
//! ```

pub mod context;
pub mod engine;
pub mod rule;
pub mod trust;

pub use context::{
    AccessContext, BehaviorMetrics, ContextResolver, GeoLocation, NetworkInfo, ResolveError,
};
pub use engine::{AccessDecision, ConditionalAccessEngine, NO_RULES_MATCHED};
pub use rule::{
    AccessAction, AccessError, BehaviorConditions, ConditionalAccessRule, DeviceConditions,
    GeoConditions, HourRange, NetworkConditions, STEP_CORPORATE_NETWORK, STEP_MFA,
    STEP_TRUSTED_DEVICE, STEP_VPN, TimeConditions,
};
pub use trust::TrustedDeviceRegistry;
