//! Decision audit records and sinks.
//!
//! Sinks are fire-and-forget: the decision point logs and swallows any error
//! or panic a sink raises, so auditing can never change a decision.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use warden_types::Attributes;

use crate::pdp::{Authorization, DecisionSource};

/// Error reported by an [`AuditSink`].
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),

    #[error("Audit record rejected: {0}")]
    Rejected(String),
}

/// One authorization decision as handed to an audit sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRecord {
    pub principal_id: String,
    /// Resource kind.
    pub resource: String,
    pub resource_id: Option<String>,
    pub action: String,
    pub allowed: bool,
    /// `ALLOW`, `DENY`, `REQUIRE_MFA` or `BLOCK_TEMPORARILY`.
    pub effect: String,
    pub reason: String,
    pub source: DecisionSource,
    pub matched_rule: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Optional request metadata (address, device, user agent).
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub metadata: Attributes,
}

impl DecisionRecord {
    pub fn new(
        principal_id: impl Into<String>,
        resource: &warden_types::Resource,
        action: impl Into<String>,
        authorization: &Authorization,
    ) -> Self {
        Self {
            principal_id: principal_id.into(),
            resource: resource.kind.clone(),
            resource_id: resource.id.clone(),
            action: action.into(),
            allowed: authorization.allowed,
            effect: authorization.effect_label(),
            reason: authorization.reason.clone(),
            source: authorization.source,
            matched_rule: authorization.matched_rule.clone(),
            timestamp: Utc::now(),
            metadata: Attributes::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Attributes) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Receives decision records.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &DecisionRecord) -> Result<(), AuditError>;
}

/// Writes decision records as structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &DecisionRecord) -> Result<(), AuditError> {
        if record.allowed {
            info!(
                principal = %record.principal_id,
                resource = %record.resource,
                resource_id = ?record.resource_id,
                action = %record.action,
                effect = %record.effect,
                rule = ?record.matched_rule,
                "Access granted"
            );
        } else {
            warn!(
                principal = %record.principal_id,
                resource = %record.resource,
                resource_id = ?record.resource_id,
                action = %record.action,
                effect = %record.effect,
                source = ?record.source,
                reason = %record.reason,
                "Access denied"
            );
        }
        Ok(())
    }
}

/// Keeps records in memory; useful for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<DecisionRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DecisionRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: &DecisionRecord) -> Result<(), AuditError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}
