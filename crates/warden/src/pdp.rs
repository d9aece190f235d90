//! The policy decision point.
//!
//! Conditional access runs first. A matching rule with any action other than
//! `ALLOW` short-circuits to a denial carrying that action and its remediation
//! steps; otherwise the static rule matcher decides, denying by default.
//! Every decision is offered to the audit sink after it is made.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use warden_abac::{Decision, Effect, PolicyRuleMatcher};
use warden_access::{
    AccessAction, AccessContext, AccessDecision, ConditionalAccessEngine, ContextResolver,
};
use warden_config::{ConfigError, WardenConfig};
use warden_types::{Attributes, Principal, Resource};

use crate::audit::{AuditSink, DecisionRecord, TracingAuditSink};

// ============================================================================
// Authorization
// ============================================================================

/// Which layer produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionSource {
    /// A conditional access rule intervened.
    ConditionalAccess,
    /// The static rule matcher decided.
    Policy,
    /// The access context could not be established.
    ContextResolution,
}

/// Combined outcome of one authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    pub allowed: bool,
    pub source: DecisionSource,
    /// Conditional access action; `Allow` when no rule intervened.
    pub access_action: AccessAction,
    /// Static rule effect, absent when the static layer was not consulted.
    pub effect: Option<Effect>,
    pub reason: String,
    /// Conditional rule id or static rule label.
    pub matched_rule: Option<String>,
    pub required_steps: Vec<String>,
    pub grace_period_secs: Option<u64>,
}

impl Authorization {
    /// A denial that did not come from either engine.
    pub fn denied(source: DecisionSource, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            source,
            access_action: AccessAction::Deny,
            effect: Some(Effect::Deny),
            reason: reason.into(),
            matched_rule: None,
            required_steps: Vec::new(),
            grace_period_secs: None,
        }
    }

    fn from_conditional(decision: AccessDecision) -> Self {
        Self {
            allowed: false,
            source: DecisionSource::ConditionalAccess,
            access_action: decision.action,
            effect: None,
            reason: decision.reason,
            matched_rule: decision.matched_rule,
            required_steps: decision.required_steps,
            grace_period_secs: decision.grace_period_secs,
        }
    }

    fn from_policy(decision: Decision) -> Self {
        Self {
            allowed: decision.allowed,
            source: DecisionSource::Policy,
            access_action: AccessAction::Allow,
            effect: Some(decision.effect),
            reason: decision.reason,
            matched_rule: decision.matched_rule,
            required_steps: Vec::new(),
            grace_period_secs: None,
        }
    }

    /// The outcome as one label: the conditional action when one intervened,
    /// the static effect otherwise.
    pub fn effect_label(&self) -> String {
        if self.access_action != AccessAction::Allow {
            self.access_action.to_string()
        } else {
            self.effect.unwrap_or_default().to_string()
        }
    }

    pub fn requires_mfa(&self) -> bool {
        self.access_action == AccessAction::RequireMfa
    }
}

// ============================================================================
// PolicyDecisionPoint
// ============================================================================

/// Static rules plus conditional access, with optional auditing.
pub struct PolicyDecisionPoint {
    matcher: PolicyRuleMatcher,
    engine: ConditionalAccessEngine,
    audit: Option<Arc<dyn AuditSink>>,
}

impl std::fmt::Debug for PolicyDecisionPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyDecisionPoint")
            .field("matcher", &self.matcher)
            .field("engine", &self.engine)
            .field("audit", &self.audit.is_some())
            .finish()
    }
}

impl Default for PolicyDecisionPoint {
    fn default() -> Self {
        Self::new(PolicyRuleMatcher::new(), ConditionalAccessEngine::new())
    }
}

impl PolicyDecisionPoint {
    pub fn new(matcher: PolicyRuleMatcher, engine: ConditionalAccessEngine) -> Self {
        Self {
            matcher,
            engine,
            audit: None,
        }
    }

    /// Forwards every decision to `sink`.
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Builds both engines from a loaded configuration.
    ///
    /// Installs a [`TracingAuditSink`] when `engine.audit_enabled` is set.
    pub fn from_config(config: &WardenConfig) -> Result<Self, ConfigError> {
        let matcher = PolicyRuleMatcher::new().with_evaluator(config.engine.evaluator());
        for (index, rule) in config.rules.iter().enumerate() {
            matcher
                .add_rule(rule.clone())
                .map_err(|source| ConfigError::InvalidRule {
                    rule: rule.label(index),
                    source,
                })?;
        }
        let engine = ConditionalAccessEngine::with_rules(config.conditional_rules.iter().cloned())?;

        let pdp = Self::new(matcher, engine);
        Ok(if config.engine.audit_enabled {
            pdp.with_audit_sink(Arc::new(TracingAuditSink))
        } else {
            pdp
        })
    }

    pub fn matcher(&self) -> &PolicyRuleMatcher {
        &self.matcher
    }

    pub fn engine(&self) -> &ConditionalAccessEngine {
        &self.engine
    }

    /// Authorizes one request against an already resolved context.
    ///
    /// The context is also exposed to static rule conditions under the
    /// `context` namespace (e.g. `context.geoLocation.country`).
    pub fn authorize(
        &self,
        principal: &Principal,
        resource: &Resource,
        action: &str,
        context: &AccessContext,
    ) -> Authorization {
        let authorization = self.decide(principal, resource, action, context);
        self.emit(
            DecisionRecord::new(&principal.id, resource, action, &authorization)
                .with_metadata(request_metadata(context)),
        );
        authorization
    }

    /// Resolves the context first; a resolution failure is a denial.
    pub fn authorize_with<R, C>(
        &self,
        resolver: &C,
        principal: &Principal,
        resource: &Resource,
        action: &str,
        request: &R,
    ) -> Authorization
    where
        R: ?Sized,
        C: ContextResolver<R> + ?Sized,
    {
        match resolver.resolve(request) {
            Ok(context) => self.authorize(principal, resource, action, &context),
            Err(e) => {
                warn!(principal = %principal.id, error = %e, "Access context resolution failed; denying");
                let authorization =
                    Authorization::denied(DecisionSource::ContextResolution, e.to_string());
                self.emit(DecisionRecord::new(&principal.id, resource, action, &authorization));
                authorization
            }
        }
    }

    fn decide(
        &self,
        principal: &Principal,
        resource: &Resource,
        action: &str,
        context: &AccessContext,
    ) -> Authorization {
        if context.principal_id != principal.id {
            warn!(
                principal = %principal.id,
                context_principal = %context.principal_id,
                "Access context belongs to another principal; denying"
            );
            return Authorization::denied(
                DecisionSource::ContextResolution,
                "Access context does not belong to the requesting principal",
            );
        }

        let conditional = self.engine.evaluate(context);
        if conditional.action != AccessAction::Allow {
            return Authorization::from_conditional(conditional);
        }

        let environment = environment(context);
        let decision = self
            .matcher
            .evaluate_with_context(principal, resource, action, &environment);
        debug!(principal = %principal.id, allowed = decision.allowed, "Static policy decided");
        Authorization::from_policy(decision)
    }

    fn emit(&self, record: DecisionRecord) {
        let Some(sink) = &self.audit else {
            return;
        };
        match catch_unwind(AssertUnwindSafe(|| sink.record(&record))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(principal = %record.principal_id, error = %e, "Audit sink failed"),
            Err(_) => warn!(principal = %record.principal_id, "Audit sink panicked"),
        }
    }
}

/// The context as a JSON object for the `context` namespace.
fn environment(context: &AccessContext) -> Attributes {
    match serde_json::to_value(context) {
        Ok(Value::Object(map)) => map,
        Ok(_) => Attributes::new(),
        Err(e) => {
            warn!(error = %e, "Failed to expose access context to policy conditions");
            Attributes::new()
        }
    }
}

fn request_metadata(context: &AccessContext) -> Attributes {
    let mut metadata = Attributes::new();
    metadata.insert("ipAddress".to_string(), Value::from(context.ip_address.clone()));
    if let Some(device) = &context.device_id {
        metadata.insert("deviceId".to_string(), Value::from(device.clone()));
    }
    if let Some(agent) = &context.user_agent {
        metadata.insert("userAgent".to_string(), Value::from(agent.clone()));
    }
    if let Some(country) = context.country() {
        metadata.insert("country".to_string(), Value::from(country));
    }
    metadata
}
