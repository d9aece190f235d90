//! Conditional access engine.
//!
//! Rules are kept sorted by ascending priority and evaluated in that order;
//! the first enabled rule whose conditions match decides the outcome. When no
//! rule matches, access is allowed and the static policy layer decides.
//!
//! Within one rule the sub-condition blocks are checked in a fixed order
//! (device, geo, time, network, behavior). Each block may force the rule to
//! match, force it not to match, or defer to the next block. A rule whose
//! blocks all defer matches.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::AccessContext;
use crate::rule::{
    AccessAction, AccessError, BehaviorConditions, ConditionalAccessRule, DeviceConditions,
    GeoConditions, NetworkConditions, Result, TimeConditions,
};
use crate::trust::TrustedDeviceRegistry;

/// Reason reported when no conditional rule matched.
pub const NO_RULES_MATCHED: &str = "No conditional access rules matched";

// ============================================================================
// Decision
// ============================================================================

/// Outcome of conditional access evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessDecision {
    /// True only when the resulting action is `Allow`.
    pub allowed: bool,
    pub action: AccessAction,
    pub reason: String,
    /// Remediation steps derived from the matched rule.
    pub required_steps: Vec<String>,
    /// Id of the rule that decided, `None` when nothing matched.
    pub matched_rule: Option<String>,
    pub grace_period_secs: Option<u64>,
}

impl AccessDecision {
    fn no_match() -> Self {
        Self {
            allowed: true,
            action: AccessAction::Allow,
            reason: NO_RULES_MATCHED.to_string(),
            required_steps: Vec::new(),
            matched_rule: None,
            grace_period_secs: None,
        }
    }

    fn from_rule(rule: &ConditionalAccessRule) -> Self {
        let reason = if rule.description.is_empty() {
            format!("Conditional access rule '{}' matched", rule.name)
        } else {
            rule.description.clone()
        };
        Self {
            allowed: rule.action == AccessAction::Allow,
            action: rule.action,
            reason,
            required_steps: rule.required_steps(),
            matched_rule: Some(rule.id.clone()),
            grace_period_secs: rule.grace_period_secs,
        }
    }
}

/// Per-block verdict while matching one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Match,
    NoMatch,
    Continue,
}

// ============================================================================
// ConditionalAccessEngine
// ============================================================================

/// Evaluates context-triggered rules and owns the trusted device registry.
#[derive(Debug, Default)]
pub struct ConditionalAccessEngine {
    rules: RwLock<Arc<Vec<ConditionalAccessRule>>>,
    trusted_devices: TrustedDeviceRegistry,
}

impl ConditionalAccessEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine from a rule list, validating every rule.
    pub fn with_rules(rules: impl IntoIterator<Item = ConditionalAccessRule>) -> Result<Self> {
        let engine = Self::new();
        for rule in rules {
            engine.register_rule(rule)?;
        }
        Ok(engine)
    }

    /// Validates and inserts a rule, keeping the list ordered by priority.
    ///
    /// Rules with equal priority keep their registration order.
    pub fn register_rule(&self, rule: ConditionalAccessRule) -> Result<()> {
        rule.validate()?;

        let mut guard = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        if guard.iter().any(|r| r.id == rule.id) {
            return Err(AccessError::DuplicateRule(rule.id));
        }

        info!(
            rule = %rule.id,
            priority = rule.priority,
            action = %rule.action,
            enabled = rule.enabled,
            "Conditional access rule registered"
        );

        let mut next = guard.as_ref().clone();
        next.push(rule);
        next.sort_by_key(|r| r.priority);
        *guard = Arc::new(next);
        Ok(())
    }

    /// Removes a rule by id. Returns `false` if it was not registered.
    pub fn remove_rule(&self, id: &str) -> bool {
        let mut guard = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        let before = guard.len();
        let next: Vec<_> = guard.iter().filter(|r| r.id != id).cloned().collect();
        if next.len() == before {
            return false;
        }
        *guard = Arc::new(next);
        info!(rule = %id, "Conditional access rule removed");
        true
    }

    /// Enables or disables a rule. Returns `false` if it was not registered.
    pub fn set_rule_enabled(&self, id: &str, enabled: bool) -> bool {
        let mut guard = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        let Some(position) = guard.iter().position(|r| r.id == id) else {
            return false;
        };
        let mut next = guard.as_ref().clone();
        next[position].enabled = enabled;
        next[position].updated_at = chrono::Utc::now();
        *guard = Arc::new(next);
        info!(rule = %id, enabled, "Conditional access rule toggled");
        true
    }

    /// Returns the current rule snapshot in evaluation order.
    pub fn rules(&self) -> Arc<Vec<ConditionalAccessRule>> {
        Arc::clone(&self.rules.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.rules().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules().is_empty()
    }

    /// Evaluates `context` against the enabled rules in priority order.
    pub fn evaluate(&self, context: &AccessContext) -> AccessDecision {
        let rules = self.rules();

        for rule in rules.iter().filter(|r| r.enabled) {
            if self.matches_rule(context, rule) {
                let decision = AccessDecision::from_rule(rule);
                if decision.allowed {
                    debug!(principal = %context.principal_id, rule = %rule.id, "Conditional access rule allowed request");
                } else {
                    warn!(
                        principal = %context.principal_id,
                        rule = %rule.id,
                        action = %rule.action,
                        ip = %context.ip_address,
                        "Conditional access rule triggered"
                    );
                }
                return decision;
            }
        }

        debug!(principal = %context.principal_id, "No conditional access rule matched");
        AccessDecision::no_match()
    }

    /// Returns true if `rule`'s conditions are triggered by `context`.
    ///
    /// The rule's `enabled` flag is not consulted here.
    pub fn matches_rule(&self, context: &AccessContext, rule: &ConditionalAccessRule) -> bool {
        let verdicts = [
            rule.device_conditions
                .as_ref()
                .map(|c| self.check_device(context, c)),
            rule.geo_conditions.as_ref().map(|c| check_geo(context, c)),
            rule.time_conditions.as_ref().map(|c| check_time(context, c)),
            rule.network_conditions
                .as_ref()
                .map(|c| check_network(context, c)),
            rule.behavior_conditions
                .as_ref()
                .map(|c| check_behavior(context, c)),
        ];

        for verdict in verdicts.into_iter().flatten() {
            match verdict {
                Verdict::Match => return true,
                Verdict::NoMatch => return false,
                Verdict::Continue => {}
            }
        }
        true
    }

    fn check_device(&self, context: &AccessContext, conditions: &DeviceConditions) -> Verdict {
        let device = context.device_id.as_deref();

        if conditions.require_trusted_device {
            let trusted =
                device.is_some_and(|d| self.trusted_devices.is_trusted(&context.principal_id, d));
            if !trusted {
                return Verdict::NoMatch;
            }
        }
        if device.is_some_and(|d| conditions.block_devices.iter().any(|b| b == d)) {
            return Verdict::Match;
        }
        Verdict::Continue
    }

    // ------------------------------------------------------------------------
    // Trusted devices
    // ------------------------------------------------------------------------

    pub fn mark_device_as_trusted(&self, principal_id: &str, device_id: &str) -> bool {
        self.trusted_devices.mark(principal_id, device_id)
    }

    pub fn revoke_trusted_device(&self, principal_id: &str, device_id: &str) -> bool {
        self.trusted_devices.revoke(principal_id, device_id)
    }

    pub fn get_trusted_devices(&self, principal_id: &str) -> Vec<String> {
        self.trusted_devices.devices(principal_id)
    }

    pub fn is_device_trusted(&self, principal_id: &str, device_id: &str) -> bool {
        self.trusted_devices.is_trusted(principal_id, device_id)
    }
}

fn check_geo(context: &AccessContext, conditions: &GeoConditions) -> Verdict {
    let country = context.country();

    if country.is_some_and(|c| conditions.blocked_countries.iter().any(|b| b == c)) {
        return Verdict::Match;
    }
    if let Some(allowed) = &conditions.allowed_countries {
        if !country.is_some_and(|c| allowed.iter().any(|a| a == c)) {
            return Verdict::NoMatch;
        }
    }
    if conditions.require_vpn && !context.is_vpn() {
        return Verdict::Match;
    }
    Verdict::Continue
}

fn check_time(context: &AccessContext, conditions: &TimeConditions) -> Verdict {
    if let Some(hours) = conditions.allowed_hours {
        if !hours.contains(context.timestamp.hour()) {
            return Verdict::NoMatch;
        }
    }
    if let Some(days) = &conditions.allowed_days {
        let today = context.timestamp.weekday().num_days_from_sunday();
        if !days.iter().any(|d| u32::from(*d) == today) {
            return Verdict::NoMatch;
        }
    }
    Verdict::Continue
}

fn check_network(context: &AccessContext, conditions: &NetworkConditions) -> Verdict {
    if conditions.require_corporate_network && !context.is_corporate_network() {
        return Verdict::Match;
    }
    let ip = context.ip_address.as_str();
    if let Some(allowed) = &conditions.allowed_ip_ranges {
        if !allowed.iter().any(|prefix| ip.starts_with(prefix.as_str())) {
            return Verdict::Match;
        }
    }
    if conditions
        .blocked_ip_ranges
        .iter()
        .any(|prefix| ip.starts_with(prefix.as_str()))
    {
        return Verdict::Match;
    }
    Verdict::Continue
}

fn check_behavior(context: &AccessContext, conditions: &BehaviorConditions) -> Verdict {
    if let Some(behavior) = &context.behavior {
        if conditions
            .risk_score_threshold
            .is_some_and(|threshold| behavior.risk_score > threshold)
        {
            return Verdict::Match;
        }
        if conditions.block_on_anomaly && behavior.anomaly_detected {
            return Verdict::Match;
        }
        if conditions
            .max_failed_attempts
            .is_some_and(|max| behavior.failed_attempts > max)
        {
            return Verdict::Match;
        }
    }
    if conditions.require_mfa.is_some() {
        return Verdict::Match;
    }
    Verdict::Continue
}

// ============================================================================
// Tests
// ============================================================================
