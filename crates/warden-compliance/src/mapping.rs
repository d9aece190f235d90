//! Policy-to-control mapping records and their evidence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Evidence kind recorded when a mapping is created.
pub const POLICY_EVIDENCE: &str = "policy";

/// A typed evidence entry attached to a mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    #[serde(rename = "type")]
    pub kind: String,
    /// Arbitrary payload.
    #[serde(default)]
    pub data: Value,
    pub recorded_at: DateTime<Utc>,
}

impl Evidence {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            recorded_at: Utc::now(),
        }
    }

    /// The entry every mapping starts with.
    pub fn policy(policy_id: &str, policy_name: &str, mapped_at: DateTime<Utc>) -> Self {
        Self {
            kind: POLICY_EVIDENCE.to_string(),
            data: json!({
                "policyId": policy_id,
                "policyName": policy_name,
                "mappedAt": mapped_at.to_rfc3339(),
            }),
            recorded_at: mapped_at,
        }
    }
}

/// Associates one policy with controls of one framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceMapping {
    pub policy_id: String,
    pub policy_name: String,
    pub framework_id: String,
    pub control_ids: Vec<String>,
    pub evidence: Vec<Evidence>,
    pub mapped_at: DateTime<Utc>,
}

impl ComplianceMapping {
    pub fn new(
        policy_id: impl Into<String>,
        policy_name: impl Into<String>,
        framework_id: impl Into<String>,
        control_ids: Vec<String>,
    ) -> Self {
        let policy_id = policy_id.into();
        let policy_name = policy_name.into();
        let mapped_at = Utc::now();
        Self {
            evidence: vec![Evidence::policy(&policy_id, &policy_name, mapped_at)],
            policy_id,
            policy_name,
            framework_id: framework_id.into(),
            control_ids,
            mapped_at,
        }
    }

    /// Storage key, `frameworkId:policyId`.
    pub fn key(&self) -> String {
        mapping_key(&self.framework_id, &self.policy_id)
    }
}

pub(crate) fn mapping_key(framework_id: &str, policy_id: &str) -> String {
    format!("{framework_id}:{policy_id}")
}
