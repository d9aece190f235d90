//! Resolved situational context for one access attempt.
//!
//! Everything here is resolved by the caller (geo-IP, device fingerprinting,
//! network classification, behavioral risk) before evaluation. The engine
//! never performs lookups of its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Context parts
// ============================================================================

/// Resolved geolocation of the request origin.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoLocation {
    /// ISO 3166-1 alpha-2 country code (e.g. "US", "DE").
    pub country: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl GeoLocation {
    pub fn country(country: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            ..Self::default()
        }
    }
}

/// Resolved network classification.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    #[serde(default, alias = "isVPN")]
    pub is_vpn: bool,
    #[serde(default)]
    pub is_corporate: bool,
    /// Range the address was classified into, if known.
    #[serde(default)]
    pub ip_range: Option<String>,
}

/// Resolved behavioral metrics for the principal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorMetrics {
    /// Risk score, 0 (benign) to 100 (hostile).
    #[serde(default)]
    pub risk_score: u8,
    #[serde(default)]
    pub anomaly_detected: bool,
    #[serde(default)]
    pub failed_attempts: u32,
    #[serde(default)]
    pub recent_attempts: u32,
}

// ============================================================================
// AccessContext
// ============================================================================

/// The fully resolved situational data for one access attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessContext {
    /// The principal attempting access.
    #[serde(alias = "userId")]
    pub principal_id: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub device_fingerprint: Option<String>,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub geo_location: Option<GeoLocation>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub network: Option<NetworkInfo>,
    #[serde(default)]
    pub behavior: Option<BehaviorMetrics>,
}

impl AccessContext {
    /// Creates a context with only the mandatory fields.
    pub fn new(
        principal_id: impl Into<String>,
        ip_address: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            principal_id: principal_id.into(),
            device_id: None,
            device_fingerprint: None,
            ip_address: ip_address.into(),
            user_agent: None,
            geo_location: None,
            timestamp,
            network: None,
            behavior: None,
        }
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.device_fingerprint = Some(fingerprint.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_geo(mut self, geo: GeoLocation) -> Self {
        self.geo_location = Some(geo);
        self
    }

    /// Shorthand for a geolocation carrying only the country.
    pub fn with_country(self, country: impl Into<String>) -> Self {
        self.with_geo(GeoLocation::country(country))
    }

    pub fn with_network(mut self, network: NetworkInfo) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_behavior(mut self, behavior: BehaviorMetrics) -> Self {
        self.behavior = Some(behavior);
        self
    }

    /// Country of the request origin, if resolved.
    pub fn country(&self) -> Option<&str> {
        self.geo_location.as_ref().map(|g| g.country.as_str())
    }

    pub fn is_vpn(&self) -> bool {
        self.network.as_ref().is_some_and(|n| n.is_vpn)
    }

    pub fn is_corporate_network(&self) -> bool {
        self.network.as_ref().is_some_and(|n| n.is_corporate)
    }
}

// ============================================================================
// Context resolution
// ============================================================================

/// Error returned by a [`ContextResolver`].
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Context resolution failed: {0}")]
    Failed(String),

    #[error("Context resolution timed out after {0:?}")]
    TimedOut(std::time::Duration),
}

/// Assembles an [`AccessContext`] from a raw request.
///
/// Implementations own geo-IP lookup, device fingerprinting, network
/// classification and risk scoring, plus any timeout policy for them. A
/// resolution failure must be treated as a denial by the caller.
pub trait ContextResolver<R: ?Sized>: Send + Sync {
    fn resolve(&self, request: &R) -> Result<AccessContext, ResolveError>;
}
