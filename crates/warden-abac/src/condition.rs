//! Condition evaluation.
//!
//! A [`Condition`] is either a structured comparison (`left` path, `op`,
//! `right` literal) or a free-form expression in the restricted grammar of
//! [`crate::expression`]. Evaluation is fail-secure: unknown operators,
//! unparseable expressions, invalid regex patterns and missing attributes all
//! evaluate to `false` and are logged, never propagated.
//!
//! `match` patterns are compiled once, when a rule is validated, and reused
//! from a cache shared by every clone of the evaluator.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use tracing::warn;

use crate::expression;
use crate::path;
use crate::policy::PolicyError;

/// Default compiled-size limit for `match`/`regex` patterns, in bytes.
pub const DEFAULT_REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Operator tokens recognized by [`ConditionEvaluator::validate`].
const EXPRESSION_OPERATORS: [&str; 8] = ["==", "!=", ">=", "<=", ">", "<", "&&", "||"];

// ============================================================================
// Operator
// ============================================================================

/// Comparison operator of a structured condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `eq` / `==`
    Eq,
    /// `neq` / `!=`
    Neq,
    /// `in`: right must be a sequence containing left.
    In,
    /// `gt` / `>`
    Gt,
    /// `gte` / `>=`
    Gte,
    /// `lt` / `<`
    Lt,
    /// `lte` / `<=`
    Lte,
    /// `match` / `regex`: left must be a string matching the right pattern.
    Match,
    /// `startsWith`
    StartsWith,
    /// `endsWith`
    EndsWith,
}

impl Operator {
    /// Parses an operator name or symbol. Returns `None` for unknown operators.
    pub fn parse(op: &str) -> Option<Self> {
        let parsed = match op {
            "eq" | "==" | "===" => Self::Eq,
            "neq" | "ne" | "!=" | "!==" => Self::Neq,
            "in" => Self::In,
            "gt" | ">" => Self::Gt,
            "gte" | ">=" => Self::Gte,
            "lt" | "<" => Self::Lt,
            "lte" | "<=" => Self::Lte,
            "match" | "regex" => Self::Match,
            "startsWith" | "starts_with" => Self::StartsWith,
            "endsWith" | "ends_with" => Self::EndsWith,
            _ => return None,
        };
        Some(parsed)
    }
}

// ============================================================================
// Condition
// ============================================================================

/// A single side-effect free condition.
///
/// The structured form takes precedence when both shapes are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    /// `{ left, op, right }` comparison against a context attribute.
    Comparison {
        left: String,
        op: String,
        right: Value,
    },
    /// `{ expression }` in the restricted expression grammar.
    Expression { expression: String },
}

impl Condition {
    /// Creates a structured comparison.
    pub fn compare(left: impl Into<String>, op: impl Into<String>, right: impl Into<Value>) -> Self {
        Self::Comparison {
            left: left.into(),
            op: op.into(),
            right: right.into(),
        }
    }

    /// Creates a free-form expression condition.
    pub fn expression(expression: impl Into<String>) -> Self {
        Self::Expression {
            expression: expression.into(),
        }
    }
}

/// Outcome of a static expression check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
        }
    }
}

// ============================================================================
// ConditionEvaluator
// ============================================================================

/// Compiled `match` patterns keyed by source text.
type PatternCache = Arc<RwLock<HashMap<String, Regex>>>;

/// Evaluates conditions against a merged attribute tree.
///
/// Clones share one compiled-pattern cache, so an instance can be shared
/// freely across threads.
#[derive(Debug, Clone)]
pub struct ConditionEvaluator {
    regex_size_limit: usize,
    patterns: PatternCache,
}

impl Default for ConditionEvaluator {
    fn default() -> Self {
        Self {
            regex_size_limit: DEFAULT_REGEX_SIZE_LIMIT,
            patterns: PatternCache::default(),
        }
    }
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the compiled-size limit for regex patterns.
    ///
    /// Starts a fresh pattern cache, since cached patterns were compiled under
    /// the previous limit.
    pub fn with_regex_size_limit(mut self, limit: usize) -> Self {
        self.regex_size_limit = limit;
        self.patterns = PatternCache::default();
        self
    }

    /// Evaluates one condition. Never panics and never returns an error:
    /// anything malformed evaluates to `false`.
    pub fn evaluate_condition(&self, condition: &Condition, ctx: &Value) -> bool {
        match condition {
            Condition::Comparison { left, op, right } => {
                let Some(operator) = Operator::parse(op) else {
                    warn!(op = %op, left = %left, "Invalid condition: unknown operator");
                    return false;
                };
                let lhs = path::resolve(ctx, left);
                self.compare(operator, lhs, Some(right))
            }
            Condition::Expression { expression } => self.evaluate_expression(expression, ctx),
        }
    }

    /// Parses an expression once so it can be evaluated repeatedly with
    /// [`expression::Expr::evaluate`].
    pub fn parse_expression(source: &str) -> Result<expression::Expr, expression::ExpressionError> {
        expression::parse(source)
    }

    /// Parses and evaluates a free-form expression. Parse failures evaluate to
    /// `false`.
    pub fn evaluate_expression(&self, source: &str, ctx: &Value) -> bool {
        match expression::parse(source) {
            Ok(expr) => expr.evaluate(self, ctx),
            Err(e) => {
                warn!(expression = %source, error = %e, "Invalid condition expression");
                false
            }
        }
    }

    /// Applies `op` to already-resolved operands. `None` is "undefined".
    pub fn compare(&self, op: Operator, left: Option<&Value>, right: Option<&Value>) -> bool {
        let (Some(left), Some(right)) = (left, right) else {
            return op == Operator::Neq;
        };

        match op {
            Operator::Eq => values_equal(left, right),
            Operator::Neq => !values_equal(left, right),
            Operator::In => right
                .as_array()
                .is_some_and(|items| items.iter().any(|item| values_equal(left, item))),
            Operator::Gt => numeric_cmp(left, right) == Some(Ordering::Greater),
            Operator::Gte => matches!(
                numeric_cmp(left, right),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Operator::Lt => numeric_cmp(left, right) == Some(Ordering::Less),
            Operator::Lte => matches!(
                numeric_cmp(left, right),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Operator::Match => match (left.as_str(), right.as_str()) {
                (Some(text), Some(pattern)) => self.regex_matches(pattern, text),
                _ => false,
            },
            Operator::StartsWith => match (left.as_str(), right.as_str()) {
                (Some(text), Some(prefix)) => text.starts_with(prefix),
                _ => false,
            },
            Operator::EndsWith => match (left.as_str(), right.as_str()) {
                (Some(text), Some(suffix)) => text.ends_with(suffix),
                _ => false,
            },
        }
    }

    fn regex_matches(&self, pattern: &str, text: &str) -> bool {
        match self.compiled(pattern) {
            Ok(re) => re.is_match(text),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "Invalid condition: bad regex pattern");
                false
            }
        }
    }

    /// Returns the cached regex for `pattern`, compiling it on first use.
    /// Invalid patterns are never cached.
    fn compiled(&self, pattern: &str) -> Result<Regex, regex::Error> {
        if let Some(re) = self
            .patterns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(pattern)
        {
            return Ok(re.clone());
        }

        let re = RegexBuilder::new(pattern)
            .size_limit(self.regex_size_limit)
            .build()?;
        self.patterns
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pattern.to_string(), re.clone());
        Ok(re)
    }

    /// Number of compiled patterns held in the cache.
    pub fn cached_patterns(&self) -> usize {
        self.patterns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Lightweight static check of a free-form expression, used when rules are
    /// registered: the expression must be non-empty, contain a recognized
    /// operator, and parse under the restricted grammar.
    pub fn validate(source: &str) -> ValidationResult {
        if source.trim().is_empty() {
            return ValidationResult::invalid("Expression is empty");
        }
        if !EXPRESSION_OPERATORS.iter().any(|op| source.contains(op)) {
            return ValidationResult::invalid("Expression contains no recognized operator");
        }
        match expression::parse(source) {
            Ok(_) => ValidationResult::ok(),
            Err(e) => ValidationResult::invalid(e.to_string()),
        }
    }

    /// Registration-time check of either condition shape.
    pub fn validate_condition(&self, condition: &Condition) -> Result<(), PolicyError> {
        match condition {
            Condition::Comparison { left, op, right } => {
                if left.trim().is_empty() {
                    return Err(PolicyError::InvalidCondition(
                        "condition has an empty left-hand path".to_string(),
                    ));
                }
                let operator = Operator::parse(op)
                    .ok_or_else(|| PolicyError::UnknownOperator(op.clone()))?;
                match operator {
                    Operator::In if !right.is_array() => Err(PolicyError::InvalidCondition(
                        format!("'in' on '{left}' requires a list on the right-hand side"),
                    )),
                    Operator::Match => {
                        let pattern = right.as_str().ok_or_else(|| {
                            PolicyError::InvalidCondition(format!(
                                "'{op}' on '{left}' requires a string pattern"
                            ))
                        })?;
                        self.compiled(pattern)
                            .map(|_| ())
                            .map_err(|e| PolicyError::InvalidPattern {
                                pattern: pattern.to_string(),
                                reason: e.to_string(),
                            })
                    }
                    _ => Ok(()),
                }
            }
            Condition::Expression { expression } => {
                let result = Self::validate(expression);
                if result.valid {
                    Ok(())
                } else {
                    Err(PolicyError::InvalidExpression {
                        expression: expression.clone(),
                        error: result.error.unwrap_or_default(),
                    })
                }
            }
        }
    }
}

/// Evaluates one condition with the default evaluator.
pub fn evaluate_condition(condition: &Condition, ctx: &Value) -> bool {
    ConditionEvaluator::default().evaluate_condition(condition, ctx)
}

// ============================================================================
// Helpers
// ============================================================================

/// JSON equality with numeric normalization, so `1 == 1.0`.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        _ => a == b,
    }
}

/// Integers compare exactly; `f64` is only used when a float is involved.
fn numbers_equal(x: &Number, y: &Number) -> bool {
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return a == b;
    }
    if x.is_f64() || y.is_f64() {
        return x.as_f64() == y.as_f64();
    }
    // A negative integer against one above i64::MAX.
    false
}

/// Coerces a value to a number: numbers as-is, numeric strings parsed.
fn to_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.trim().is_empty() => s.trim().parse().ok(),
        _ => None,
    }
}

fn numeric_cmp(left: &Value, right: &Value) -> Option<Ordering> {
    let l = to_number(left)?;
    let r = to_number(right)?;
    l.partial_cmp(&r)
}

// ============================================================================
// Tests
// ============================================================================
