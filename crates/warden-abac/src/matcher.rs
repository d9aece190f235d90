//! Static policy decision engine.
//!
//! Matches an authorization request against an ordered list of rules. The
//! first matching rule wins; if no rule matches the request is denied.
//!
//! The rule list is held as an immutable `Arc<Vec<Rule>>` snapshot behind a
//! read-write lock. Evaluation clones the `Arc` and matches without holding
//! the lock; registration builds a new vector and swaps it in.

use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use warden_types::{Attributes, EvaluationContext, Principal, Resource};

use crate::condition::{ConditionEvaluator, Operator};
use crate::path;
use crate::policy::{Effect, LegacyConditions, PolicyError, Result, Rule};

/// Reason reported when no rule matched.
pub const NO_MATCHING_POLICY: &str = "no matching policy";

// ============================================================================
// Decision
// ============================================================================

/// The result of evaluating a request against the rule list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether access is allowed.
    pub allowed: bool,
    /// Effect of the matched rule, or `Deny` when the default applied.
    pub effect: Effect,
    /// Human-readable explanation citing the rule.
    pub reason: String,
    /// Label of the matched rule, `None` when the default applied.
    pub matched_rule: Option<String>,
}

impl Decision {
    fn default_deny() -> Self {
        Self {
            allowed: false,
            effect: Effect::Deny,
            reason: NO_MATCHING_POLICY.to_string(),
            matched_rule: None,
        }
    }
}

// ============================================================================
// Request
// ============================================================================

/// One authorization request with its merged evaluation context.
#[derive(Debug, Clone)]
pub struct AccessRequest<'a> {
    pub principal: &'a Principal,
    pub resource: &'a Resource,
    pub action: &'a str,
    context: EvaluationContext,
}

impl<'a> AccessRequest<'a> {
    pub fn new(
        principal: &'a Principal,
        resource: &'a Resource,
        action: &'a str,
        environment: &Attributes,
    ) -> Self {
        Self {
            principal,
            resource,
            action,
            context: EvaluationContext::new(principal, resource, action, environment),
        }
    }

    /// The merged attribute tree conditions are evaluated against.
    pub fn context(&self) -> &Value {
        self.context.as_value()
    }
}

// ============================================================================
// PolicyRuleMatcher
// ============================================================================

/// Policy decision core over an ordered list of static rules.
#[derive(Debug, Default)]
pub struct PolicyRuleMatcher {
    rules: RwLock<Arc<Vec<Rule>>>,
    evaluator: ConditionEvaluator,
}

impl PolicyRuleMatcher {
    /// Creates a matcher with no rules (every request is denied).
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a custom condition evaluator.
    pub fn with_evaluator(mut self, evaluator: ConditionEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Creates a matcher from a rule list, validating every rule.
    pub fn with_rules(rules: impl IntoIterator<Item = Rule>) -> Result<Self> {
        let matcher = Self::new();
        matcher.add_rules(rules)?;
        Ok(matcher)
    }

    /// Validates and appends a rule.
    ///
    /// Malformed conditions are rejected here so misconfiguration is caught
    /// before it can silently fail closed at evaluation time.
    pub fn add_rule(&self, rule: Rule) -> Result<()> {
        self.add_rules(std::iter::once(rule))
    }

    /// Validates and appends several rules atomically: either all are added
    /// or none are.
    pub fn add_rules(&self, rules: impl IntoIterator<Item = Rule>) -> Result<()> {
        let mut guard = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        let mut next: Vec<Rule> = guard.as_ref().clone();

        for rule in rules {
            let index = next.len();
            self.validate_rule(&rule)
                .map_err(|source| PolicyError::InvalidRule {
                    rule: rule.label(index),
                    source: Box::new(source),
                })?;
            info!(
                rule = %rule.label(index),
                effect = %rule.effect,
                resource = ?rule.resource,
                action = ?rule.action,
                "Policy rule registered"
            );
            next.push(rule);
        }

        *guard = Arc::new(next);
        Ok(())
    }

    /// Removes all rules.
    pub fn clear(&self) {
        let mut guard = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(Vec::new());
        info!("Policy rules cleared");
    }

    /// Returns the current rule snapshot.
    pub fn rules(&self) -> Arc<Vec<Rule>> {
        Arc::clone(&self.rules.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.rules().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules().is_empty()
    }

    fn validate_rule(&self, rule: &Rule) -> Result<()> {
        for condition in &rule.when {
            self.evaluator.validate_condition(condition)?;
        }
        if let Some(LegacyConditions::Expression(expression)) = &rule.conditions {
            let result = ConditionEvaluator::validate(expression);
            if !result.valid {
                return Err(PolicyError::InvalidExpression {
                    expression: expression.clone(),
                    error: result.error.unwrap_or_default(),
                });
            }
        }
        Ok(())
    }

    /// Returns true only if every clause of `rule` holds for `request`.
    pub fn match_rule(&self, rule: &Rule, request: &AccessRequest<'_>) -> bool {
        let resource_ok = rule
            .resource
            .as_deref()
            .is_none_or(|kind| kind == "*" || kind == request.resource.kind);
        if !resource_ok {
            return false;
        }

        let action_ok = rule
            .action
            .as_deref()
            .is_none_or(|action| action == "*" || action == request.action);
        if !action_ok {
            return false;
        }

        if let Some(roles) = &rule.roles {
            if !request.principal.roles.iter().any(|r| roles.contains(r)) {
                return false;
            }
        }

        let ctx = request.context();
        if !rule
            .when
            .iter()
            .all(|cond| self.evaluator.evaluate_condition(cond, ctx))
        {
            return false;
        }

        match &rule.conditions {
            None => true,
            Some(LegacyConditions::Expression(expression)) => {
                self.evaluator.evaluate_expression(expression, ctx)
            }
            Some(LegacyConditions::Pairs(pairs)) => pairs.iter().all(|(key, expected)| {
                self.evaluator
                    .compare(Operator::Eq, path::resolve(ctx, key), Some(expected))
            }),
        }
    }

    /// Decides a request with no environment attributes.
    pub fn evaluate(&self, principal: &Principal, resource: &Resource, action: &str) -> Decision {
        self.evaluate_with_context(principal, resource, action, &Attributes::new())
    }

    /// Decides a request. The first matching rule wins; no match is a denial.
    ///
    /// # Postcondition
    ///
    /// Always returns a `Decision`; malformed conditions count as non-matching.
    pub fn evaluate_with_context(
        &self,
        principal: &Principal,
        resource: &Resource,
        action: &str,
        environment: &Attributes,
    ) -> Decision {
        let rules = self.rules();
        let request = AccessRequest::new(principal, resource, action, environment);

        for (index, rule) in rules.iter().enumerate() {
            if self.match_rule(rule, &request) {
                let label = rule.label(index);
                debug!(
                    principal = %principal.id,
                    resource = %resource.kind,
                    action = %action,
                    rule = %label,
                    effect = %rule.effect,
                    "Policy rule matched"
                );
                return Decision {
                    allowed: rule.effect == Effect::Allow,
                    effect: rule.effect,
                    reason: format!("Matched rule '{label}': {}", rule.effect),
                    matched_rule: Some(label),
                };
            }
        }

        warn!(
            principal = %principal.id,
            resource = %resource.kind,
            action = %action,
            "No matching policy; denying by default"
        );
        Decision::default_deny()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use serde_json::{Map, json};

    fn admin() -> Principal {
        Principal::new("alice").with_role("ADMIN")
    }

    fn viewer() -> Principal {
        Principal::new("bob").with_role("VIEWER")
    }

    fn doc() -> Resource {
        Resource::new("doc")
    }

    fn admin_read_rule() -> Rule {
        Rule::allow()
            .on_resource("doc")
            .for_action("read")
            .with_roles(["ADMIN"])
    }

    #[test]
    fn test_default_deny_when_empty() {
        let matcher = PolicyRuleMatcher::new();
        let decision = matcher.evaluate(&admin(), &doc(), "read");
        assert!(!decision.allowed);
        assert_eq!(decision.effect, Effect::Deny);
        assert_eq!(decision.reason, NO_MATCHING_POLICY);
        assert!(decision.matched_rule.is_none());
    }

    #[test]
    fn test_role_gated_allow() {
        let matcher = PolicyRuleMatcher::with_rules([admin_read_rule()]).unwrap();

        let decision = matcher.evaluate(&admin(), &doc(), "read");
        assert!(decision.allowed);
        assert_eq!(decision.effect, Effect::Allow);
        assert_eq!(decision.matched_rule.as_deref(), Some("#0"));

        let decision = matcher.evaluate(&viewer(), &doc(), "read");
        assert!(!decision.allowed);
        assert_eq!(decision.reason, NO_MATCHING_POLICY);
    }

    #[test]
    fn test_resource_and_action_must_match() {
        let matcher = PolicyRuleMatcher::with_rules([admin_read_rule()]).unwrap();
        assert!(!matcher.evaluate(&admin(), &Resource::new("invoice"), "read").allowed);
        assert!(!matcher.evaluate(&admin(), &doc(), "delete").allowed);
    }

    #[test]
    fn test_wildcards_and_absent_clauses() {
        let matcher = PolicyRuleMatcher::with_rules([
            Rule::allow().on_resource("*").for_action("*").with_roles(["ADMIN"]),
            Rule::allow().for_action("list"),
        ])
        .unwrap();

        assert!(matcher.evaluate(&admin(), &Resource::new("anything"), "purge").allowed);
        assert!(matcher.evaluate(&viewer(), &Resource::new("anything"), "list").allowed);
        assert!(!matcher.evaluate(&viewer(), &Resource::new("anything"), "purge").allowed);
    }

    #[test]
    fn test_first_match_wins() {
        let matcher = PolicyRuleMatcher::with_rules([
            Rule::deny().named("deny-archived").when(Condition::compare(
                "resource.archived",
                "eq",
                true,
            )),
            Rule::allow().named("allow-all"),
        ])
        .unwrap();

        let archived = doc().with_attribute("archived", true);
        let decision = matcher.evaluate(&admin(), &archived, "read");
        assert!(!decision.allowed);
        assert_eq!(decision.matched_rule.as_deref(), Some("deny-archived"));
        assert_eq!(decision.reason, "Matched rule 'deny-archived': DENY");

        let decision = matcher.evaluate(&admin(), &doc(), "read");
        assert!(decision.allowed);
        assert_eq!(decision.matched_rule.as_deref(), Some("allow-all"));
    }

    #[test]
    fn test_when_conditions_are_anded() {
        let matcher = PolicyRuleMatcher::with_rules([Rule::allow()
            .when(Condition::compare("principal.level", "gte", 2))
            .when(Condition::expression("principal.department == resource.department"))])
        .unwrap();

        let p = Principal::new("u")
            .with_attribute("level", 3)
            .with_attribute("department", "eng");
        assert!(matcher.evaluate(&p, &doc().with_attribute("department", "eng"), "read").allowed);
        assert!(!matcher.evaluate(&p, &doc().with_attribute("department", "ops"), "read").allowed);

        let junior = Principal::new("u")
            .with_attribute("level", 1)
            .with_attribute("department", "eng");
        assert!(!matcher.evaluate(&junior, &doc().with_attribute("department", "eng"), "read").allowed);
    }

    #[test]
    fn test_legacy_expression_conditions() {
        let matcher = PolicyRuleMatcher::with_rules([Rule::allow().with_legacy_conditions(
            LegacyConditions::Expression("resource.owner == principal.id".to_string()),
        )])
        .unwrap();

        assert!(matcher.evaluate(&admin(), &doc().with_attribute("owner", "alice"), "edit").allowed);
        assert!(!matcher.evaluate(&admin(), &doc().with_attribute("owner", "bob"), "edit").allowed);
    }

    #[test]
    fn test_legacy_pair_conditions() {
        let mut pairs = Map::new();
        pairs.insert("department".to_string(), json!("eng"));
        pairs.insert("resource.classification".to_string(), json!("internal"));

        let matcher = PolicyRuleMatcher::with_rules([
            Rule::allow().with_legacy_conditions(LegacyConditions::Pairs(pairs)),
        ])
        .unwrap();

        let p = Principal::new("u").with_attribute("department", "eng");
        let internal = doc().with_attribute("classification", "internal");
        assert!(matcher.evaluate(&p, &internal, "read").allowed);

        let secret = doc().with_attribute("classification", "secret");
        assert!(!matcher.evaluate(&p, &secret, "read").allowed);
    }

    #[test]
    fn test_environment_attributes() {
        let matcher = PolicyRuleMatcher::with_rules([
            Rule::allow().when(Condition::expression("context.country == 'US'")),
        ])
        .unwrap();

        let mut env = Attributes::new();
        env.insert("country".to_string(), json!("US"));
        assert!(matcher.evaluate_with_context(&admin(), &doc(), "read", &env).allowed);

        env.insert("country".to_string(), json!("DE"));
        assert!(!matcher.evaluate_with_context(&admin(), &doc(), "read", &env).allowed);
        assert!(!matcher.evaluate(&admin(), &doc(), "read").allowed);
    }

    #[test]
    fn test_registration_rejects_malformed_rules() {
        let matcher = PolicyRuleMatcher::new();

        let err = matcher
            .add_rule(Rule::allow().named("bad").when(Condition::expression("principal.x ===")))
            .unwrap_err();
        assert!(matches!(err, PolicyError::InvalidRule { ref rule, .. } if rule == "bad"));

        assert!(matcher
            .add_rule(Rule::allow().when(Condition::compare("a", "approx", 1)))
            .is_err());
        assert!(matcher
            .add_rule(Rule::allow().with_legacy_conditions(LegacyConditions::Expression(
                "nonsense".to_string()
            )))
            .is_err());
        assert!(matcher.is_empty());
    }

    #[test]
    fn test_match_patterns_compiled_at_registration() {
        let matcher = PolicyRuleMatcher::with_rules([Rule::allow()
            .named("corp-mail")
            .when(Condition::compare("principal.email", "match", r"@corp\.example$"))])
        .unwrap();
        assert_eq!(matcher.evaluator.cached_patterns(), 1);

        let insider = Principal::new("alice").with_attribute("email", "alice@corp.example");
        let outsider = Principal::new("eve").with_attribute("email", "eve@example.org");
        for _ in 0..3 {
            assert!(matcher.evaluate(&insider, &doc(), "read").allowed);
            assert!(!matcher.evaluate(&outsider, &doc(), "read").allowed);
        }
        assert_eq!(matcher.evaluator.cached_patterns(), 1);

        let err = matcher
            .add_rule(Rule::allow().named("broken").when(Condition::compare(
                "principal.email",
                "match",
                "([a-z]+",
            )))
            .unwrap_err();
        assert!(matches!(err, PolicyError::InvalidRule { ref rule, .. } if rule == "broken"));
        assert_eq!(matcher.len(), 1);
        assert_eq!(matcher.evaluator.cached_patterns(), 1);
    }

    #[test]
    fn test_add_rules_is_atomic() {
        let matcher = PolicyRuleMatcher::new();
        let result = matcher.add_rules([
            Rule::allow(),
            Rule::deny().when(Condition::compare("a", "bogus", 1)),
        ]);
        assert!(result.is_err());
        assert_eq!(matcher.len(), 0);
    }

    #[test]
    fn test_clear() {
        let matcher = PolicyRuleMatcher::with_rules([Rule::allow()]).unwrap();
        assert!(matcher.evaluate(&viewer(), &doc(), "read").allowed);
        matcher.clear();
        assert!(!matcher.evaluate(&viewer(), &doc(), "read").allowed);
    }

    #[test]
    fn test_concurrent_evaluation_during_registration() {
        let matcher = Arc::new(PolicyRuleMatcher::new());
        let writer = {
            let matcher = Arc::clone(&matcher);
            std::thread::spawn(move || {
                for i in 0..50 {
                    matcher
                        .add_rule(Rule::deny().named(format!("r{i}")).for_action("never"))
                        .unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let matcher = Arc::clone(&matcher);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let d = matcher.evaluate(&admin(), &doc(), "read");
                        assert!(!d.allowed);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(matcher.len(), 50);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// With no rules configured every request is denied.
            #[test]
            fn unconfigured_requests_are_denied(
                id in "[a-z]{1,8}",
                roles in proptest::collection::vec("[A-Z]{1,6}", 0..4),
                kind in "[a-z]{1,8}",
                action in "[a-z]{1,8}",
            ) {
                let matcher = PolicyRuleMatcher::new();
                let principal = Principal::new(id).with_roles(roles);
                let decision = matcher.evaluate(&principal, &Resource::new(kind), &action);
                prop_assert!(!decision.allowed);
                prop_assert_eq!(decision.reason, NO_MATCHING_POLICY);
            }

            /// Rules scoped to other resources never grant access.
            #[test]
            fn rules_for_other_resources_do_not_apply(kind in "[a-z]{1,8}", action in "[a-z]{1,8}") {
                prop_assume!(kind != "doc");
                let matcher = PolicyRuleMatcher::with_rules([Rule::allow().on_resource("doc")]).unwrap();
                let decision = matcher.evaluate(&admin(), &Resource::new(kind), &action);
                prop_assert!(!decision.allowed);
            }
        }
    }
}
