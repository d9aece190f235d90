//! Conditional access rule definitions.
//!
//! A rule carries up to five independent sub-condition blocks (device, geo,
//! time, network, behavior) and the action taken when it matches. How the
//! blocks combine is implemented in [`crate::engine`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const STEP_MFA: &str = "Complete MFA verification";
pub const STEP_VPN: &str = "Connect to VPN";
pub const STEP_TRUSTED_DEVICE: &str = "Register this device as trusted";
pub const STEP_CORPORATE_NETWORK: &str = "Connect to corporate network";

// ============================================================================
// Errors
// ============================================================================

/// Error raised when a rule is rejected at registration time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("Conditional access rule id must not be empty")]
    EmptyRuleId,

    #[error("Conditional access rule '{0}' is already registered")]
    DuplicateRule(String),

    #[error("Invalid conditional access rule '{id}': {reason}")]
    InvalidRule { id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, AccessError>;

// ============================================================================
// Action
// ============================================================================

/// Outcome configured on a conditional access rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessAction {
    Allow,
    Deny,
    RequireMfa,
    BlockTemporarily,
}

impl std::fmt::Display for AccessAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Allow => write!(f, "ALLOW"),
            Self::Deny => write!(f, "DENY"),
            Self::RequireMfa => write!(f, "REQUIRE_MFA"),
            Self::BlockTemporarily => write!(f, "BLOCK_TEMPORARILY"),
        }
    }
}

// ============================================================================
// Sub-conditions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConditions {
    /// The context device must be in the principal's trusted set.
    #[serde(default, alias = "require_trusted_device")]
    pub require_trusted_device: bool,
    /// Device ids that trigger the rule outright.
    #[serde(default, alias = "block_devices")]
    pub block_devices: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoConditions {
    /// Countries that trigger the rule outright.
    #[serde(default, alias = "blocked_countries")]
    pub blocked_countries: Vec<String>,
    /// When set, requests from any other country are outside the rule.
    #[serde(default, alias = "allowed_countries")]
    pub allowed_countries: Option<Vec<String>>,
    /// Requests not over a VPN trigger the rule.
    #[serde(default, alias = "requireVPN", alias = "require_vpn")]
    pub require_vpn: bool,
}

/// Hour-of-day window in UTC. `start` is inclusive, `end` exclusive; a window
/// with `start > end` wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourRange {
    pub start: u8,
    pub end: u8,
}

impl HourRange {
    pub fn new(start: u8, end: u8) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, hour: u32) -> bool {
        let (start, end) = (u32::from(self.start), u32::from(self.end));
        if start <= end {
            (start..end).contains(&hour)
        } else {
            hour >= start || hour < end
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeConditions {
    #[serde(default, alias = "allowed_hours")]
    pub allowed_hours: Option<HourRange>,
    /// Allowed weekdays, 0 = Sunday through 6 = Saturday.
    #[serde(default, alias = "allowed_days")]
    pub allowed_days: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConditions {
    /// Requests from outside the corporate network trigger the rule.
    #[serde(default, alias = "require_corporate_network")]
    pub require_corporate_network: bool,
    /// Address prefixes considered inside; an address outside all of them
    /// triggers the rule.
    #[serde(default, alias = "allowedIPRanges", alias = "allowed_ip_ranges")]
    pub allowed_ip_ranges: Option<Vec<String>>,
    /// Address prefixes that trigger the rule outright.
    #[serde(default, alias = "blockedIPRanges", alias = "blocked_ip_ranges")]
    pub blocked_ip_ranges: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorConditions {
    /// Risk scores strictly above this trigger the rule.
    #[serde(default, alias = "risk_score_threshold")]
    pub risk_score_threshold: Option<u8>,
    #[serde(default, alias = "block_on_anomaly")]
    pub block_on_anomaly: bool,
    /// Any configured value, true or false, triggers the rule.
    #[serde(default, alias = "requireMFA", alias = "require_mfa")]
    pub require_mfa: Option<bool>,
    /// Failed-attempt counts strictly above this trigger the rule.
    #[serde(default, alias = "max_failed_attempts")]
    pub max_failed_attempts: Option<u32>,
}

// ============================================================================
// ConditionalAccessRule
// ============================================================================

fn enabled_by_default() -> bool {
    true
}

/// A context-triggered rule, evaluated in ascending `priority`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalAccessRule {
    pub id: String,
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Lower values are evaluated first.
    #[serde(default)]
    pub priority: i32,
    #[serde(default, alias = "device_conditions")]
    pub device_conditions: Option<DeviceConditions>,
    #[serde(default, alias = "geo_conditions")]
    pub geo_conditions: Option<GeoConditions>,
    #[serde(default, alias = "time_conditions")]
    pub time_conditions: Option<TimeConditions>,
    #[serde(default, alias = "network_conditions")]
    pub network_conditions: Option<NetworkConditions>,
    #[serde(default, alias = "behavior_conditions")]
    pub behavior_conditions: Option<BehaviorConditions>,
    pub action: AccessAction,
    #[serde(default, alias = "grace_period_secs")]
    pub grace_period_secs: Option<u64>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "Utc::now", alias = "created_at")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now", alias = "updated_at")]
    pub updated_at: DateTime<Utc>,
}

impl ConditionalAccessRule {
    /// Creates an enabled rule with priority 0 and no sub-conditions.
    pub fn new(id: impl Into<String>, name: impl Into<String>, action: AccessAction) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            priority: 0,
            device_conditions: None,
            geo_conditions: None,
            time_conditions: None,
            network_conditions: None,
            behavior_conditions: None,
            action,
            grace_period_secs: None,
            description: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_device_conditions(mut self, conditions: DeviceConditions) -> Self {
        self.device_conditions = Some(conditions);
        self
    }

    pub fn with_geo_conditions(mut self, conditions: GeoConditions) -> Self {
        self.geo_conditions = Some(conditions);
        self
    }

    pub fn with_time_conditions(mut self, conditions: TimeConditions) -> Self {
        self.time_conditions = Some(conditions);
        self
    }

    pub fn with_network_conditions(mut self, conditions: NetworkConditions) -> Self {
        self.network_conditions = Some(conditions);
        self
    }

    pub fn with_behavior_conditions(mut self, conditions: BehaviorConditions) -> Self {
        self.behavior_conditions = Some(conditions);
        self
    }

    pub fn with_grace_period(mut self, secs: u64) -> Self {
        self.grace_period_secs = Some(secs);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Remediation steps implied by the configured sub-conditions.
    pub fn required_steps(&self) -> Vec<String> {
        let mut steps = Vec::new();

        let mfa_configured = self
            .behavior_conditions
            .as_ref()
            .is_some_and(|b| b.require_mfa == Some(true));
        if self.action == AccessAction::RequireMfa || mfa_configured {
            steps.push(STEP_MFA.to_string());
        }
        if self.geo_conditions.as_ref().is_some_and(|g| g.require_vpn) {
            steps.push(STEP_VPN.to_string());
        }
        if self
            .device_conditions
            .as_ref()
            .is_some_and(|d| d.require_trusted_device)
        {
            steps.push(STEP_TRUSTED_DEVICE.to_string());
        }
        if self
            .network_conditions
            .as_ref()
            .is_some_and(|n| n.require_corporate_network)
        {
            steps.push(STEP_CORPORATE_NETWORK.to_string());
        }

        steps
    }

    /// Registration-time shape check.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(AccessError::EmptyRuleId);
        }
        let invalid = |reason: String| AccessError::InvalidRule {
            id: self.id.clone(),
            reason,
        };

        if let Some(time) = &self.time_conditions {
            if let Some(hours) = time.allowed_hours {
                if hours.start > 23 || hours.end > 24 {
                    return Err(invalid(format!(
                        "allowed hours {}..{} are out of range",
                        hours.start, hours.end
                    )));
                }
                if hours.start == hours.end {
                    return Err(invalid("allowed hours window is empty".to_string()));
                }
            }
            if let Some(days) = &time.allowed_days {
                if let Some(day) = days.iter().find(|d| **d > 6) {
                    return Err(invalid(format!("allowed day {day} is not in 0..=6")));
                }
            }
        }

        if let Some(network) = &self.network_conditions {
            // An empty prefix contains every address.
            let mut ranges = network
                .allowed_ip_ranges
                .iter()
                .flatten()
                .chain(&network.blocked_ip_ranges);
            if ranges.any(|range| range.trim().is_empty()) {
                return Err(invalid("IP range prefixes must not be empty".to_string()));
            }
        }

        if let Some(behavior) = &self.behavior_conditions {
            if let Some(threshold) = behavior.risk_score_threshold {
                if threshold > 100 {
                    return Err(invalid(format!("risk score threshold {threshold} exceeds 100")));
                }
            }
        }

        Ok(())
    }
}
