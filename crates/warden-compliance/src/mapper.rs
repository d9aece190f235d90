//! Compliance mapper: frameworks, policy mappings and coverage.
//!
//! Mappings are stored under `frameworkId:policyId`; repeated mappings of the
//! same policy accumulate under one key. All reads take a shared lock and
//! never perform I/O.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{PoisonError, RwLock};

use tracing::{debug, info};

use crate::framework::ComplianceFramework;
use crate::mapping::{ComplianceMapping, Evidence, mapping_key};
use crate::report::{ComplianceLevel, ComplianceReport, ComplianceStatus, coverage, recommendations};
use crate::{ComplianceError, Result};

#[derive(Debug, Default)]
struct MapperState {
    /// Registration order is preserved for listing.
    frameworks: Vec<ComplianceFramework>,
    mappings: BTreeMap<String, Vec<ComplianceMapping>>,
}

impl MapperState {
    fn framework(&self, id: &str) -> Option<&ComplianceFramework> {
        self.frameworks.iter().find(|f| f.id == id)
    }

    fn framework_mappings<'a>(
        &'a self,
        framework_id: &'a str,
    ) -> impl Iterator<Item = &'a ComplianceMapping> + 'a {
        self.mappings
            .values()
            .flatten()
            .filter(move |m| m.framework_id == framework_id)
    }
}

/// Associates policies with framework controls and reports coverage.
#[derive(Debug)]
pub struct ComplianceMapper {
    state: RwLock<MapperState>,
}

impl Default for ComplianceMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl ComplianceMapper {
    /// Creates a mapper seeded with the built-in framework catalog.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MapperState {
                frameworks: ComplianceFramework::builtin(),
                mappings: BTreeMap::new(),
            }),
        }
    }

    /// Creates a mapper with no frameworks.
    pub fn empty() -> Self {
        Self {
            state: RwLock::new(MapperState::default()),
        }
    }

    /// Registers an additional framework.
    pub fn add_framework(&self, framework: ComplianceFramework) -> Result<()> {
        if framework.id.trim().is_empty() {
            return Err(ComplianceError::InvalidFramework(
                "framework id must not be empty".to_string(),
            ));
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.framework(&framework.id).is_some() {
            return Err(ComplianceError::DuplicateFramework(framework.id));
        }
        info!(
            framework = %framework.id,
            controls = framework.total_controls(),
            "Compliance framework registered"
        );
        state.frameworks.push(framework);
        Ok(())
    }

    pub fn get_framework(&self, id: &str) -> Option<ComplianceFramework> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .framework(id)
            .cloned()
    }

    /// All frameworks in registration order.
    pub fn get_frameworks(&self) -> Vec<ComplianceFramework> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .frameworks
            .clone()
    }

    /// Maps a policy to controls of a framework and stores the record.
    ///
    /// Duplicate control ids are collapsed. The stored record starts with a
    /// `policy` evidence entry.
    pub fn map_policy<I, S>(
        &self,
        policy_id: &str,
        policy_name: &str,
        framework_id: &str,
        control_ids: I,
    ) -> Result<ComplianceMapping>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = BTreeSet::new();
        let controls: Vec<String> = control_ids
            .into_iter()
            .map(Into::into)
            .filter(|c| seen.insert(c.clone()))
            .collect();
        if controls.is_empty() {
            return Err(ComplianceError::EmptyControls {
                framework: framework_id.to_string(),
                policy: policy_id.to_string(),
            });
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let framework = state
            .framework(framework_id)
            .ok_or_else(|| ComplianceError::UnknownFramework(framework_id.to_string()))?;

        let unknown: Vec<String> = controls
            .iter()
            .filter(|c| !framework.has_control(c))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(ComplianceError::UnknownControls {
                framework: framework_id.to_string(),
                controls: unknown,
            });
        }

        let mapping = ComplianceMapping::new(policy_id, policy_name, framework_id, controls);
        info!(
            framework = %framework_id,
            policy = %policy_id,
            controls = ?mapping.control_ids,
            "Policy mapped to compliance controls"
        );
        state
            .mappings
            .entry(mapping.key())
            .or_default()
            .push(mapping.clone());
        Ok(mapping)
    }

    /// Appends evidence to the most recent mapping of `policy_id`.
    pub fn add_evidence(&self, framework_id: &str, policy_id: &str, evidence: Evidence) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let mapping = state
            .mappings
            .get_mut(&mapping_key(framework_id, policy_id))
            .and_then(|records| records.last_mut())
            .ok_or_else(|| ComplianceError::UnknownMapping {
                framework: framework_id.to_string(),
                policy: policy_id.to_string(),
            })?;
        info!(framework = %framework_id, policy = %policy_id, kind = %evidence.kind, "Compliance evidence recorded");
        mapping.evidence.push(evidence);
        Ok(())
    }

    /// Removes every mapping of `policy_id` within a framework and returns how
    /// many records were dropped.
    pub fn unmap_policy(&self, framework_id: &str, policy_id: &str) -> usize {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let removed = state
            .mappings
            .remove(&mapping_key(framework_id, policy_id))
            .map_or(0, |records| records.len());
        if removed > 0 {
            info!(framework = %framework_id, policy = %policy_id, removed, "Policy unmapped");
        }
        removed
    }

    pub fn get_mappings(&self, framework_id: &str) -> Vec<ComplianceMapping> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .framework_mappings(framework_id)
            .cloned()
            .collect()
    }

    /// Mappings of `policy_id` across every framework.
    pub fn get_policy_mappings(&self, policy_id: &str) -> Vec<ComplianceMapping> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .mappings
            .values()
            .flatten()
            .filter(|m| m.policy_id == policy_id)
            .cloned()
            .collect()
    }

    /// Coverage of a framework. Unknown frameworks report zero coverage.
    pub fn get_compliance_status(&self, framework_id: &str) -> ComplianceStatus {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let total_controls = state.framework(framework_id).map_or(0, ComplianceFramework::total_controls);
        let mappings: Vec<ComplianceMapping> = state.framework_mappings(framework_id).cloned().collect();
        let mapped_controls = mappings
            .iter()
            .flat_map(|m| m.control_ids.iter())
            .collect::<BTreeSet<_>>()
            .len();

        ComplianceStatus {
            framework: framework_id.to_string(),
            mapped_controls,
            total_controls,
            coverage: coverage(mapped_controls, total_controls),
            mappings,
        }
    }

    /// Builds a report for a framework; unknown ids yield a `not-found` report.
    pub fn generate_compliance_report(&self, framework_id: &str) -> ComplianceReport {
        let Some(framework) = self.get_framework(framework_id) else {
            debug!(framework = %framework_id, "Compliance report requested for unknown framework");
            return ComplianceReport::not_found(framework_id);
        };

        let status = self.get_compliance_status(framework_id);
        let mapped: BTreeSet<&String> = status
            .mappings
            .iter()
            .flat_map(|m| m.control_ids.iter())
            .collect();
        let unmapped_controls: Vec<String> = framework
            .controls
            .iter()
            .filter(|c| !mapped.contains(&c.id))
            .map(|c| c.id.clone())
            .collect();
        let mapped_policies: Vec<String> = status
            .mappings
            .iter()
            .map(|m| m.policy_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let level = ComplianceLevel::from_coverage(status.coverage);
        debug!(framework = %framework_id, coverage = status.coverage, status = %level, "Compliance report generated");

        ComplianceReport {
            framework: framework.id.clone(),
            framework_name: Some(framework.name.clone()),
            generated_at: chrono::Utc::now(),
            status: level,
            coverage: status.coverage,
            recommendations: recommendations(
                &framework.name,
                status.coverage,
                mapped_policies.len(),
                &unmapped_controls,
            ),
            mapped_policies,
            unmapped_controls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::ComplianceControl;
    use proptest::prelude::*;
    use serde_json::json;

    fn five_controls() -> ComplianceFramework {
        (1..=5).fold(ComplianceFramework::new("F", "Framework F", "1"), |f, i| {
            f.with_control(ComplianceControl::new(format!("c{i}"), format!("Control {i}"), "", "test"))
        })
    }

    fn mapper() -> ComplianceMapper {
        let mapper = ComplianceMapper::empty();
        mapper.add_framework(five_controls()).unwrap();
        mapper
    }

    #[test]
    fn test_coverage_forty_percent_is_non_compliant() {
        let mapper = mapper();
        mapper.map_policy("p1", "P1", "F", ["c1", "c2"]).unwrap();

        let status = mapper.get_compliance_status("F");
        assert_eq!(status.mapped_controls, 2);
        assert_eq!(status.total_controls, 5);
        assert!((status.coverage - 40.0).abs() < f64::EPSILON);

        let report = mapper.generate_compliance_report("F");
        assert_eq!(report.status, ComplianceLevel::NonCompliant);
        assert_eq!(report.unmapped_controls, vec!["c3", "c4", "c5"]);
        assert_eq!(report.mapped_policies, vec!["p1"]);
    }

    #[test]
    fn test_partially_compliant_at_sixty_percent() {
        let mapper = mapper();
        mapper.map_policy("p1", "P1", "F", ["c1", "c2"]).unwrap();
        mapper.map_policy("p2", "P2", "F", ["c2", "c3"]).unwrap();

        let report = mapper.generate_compliance_report("F");
        assert!((report.coverage - 60.0).abs() < f64::EPSILON);
        assert_eq!(report.status, ComplianceLevel::PartiallyCompliant);
        assert_eq!(report.mapped_policies, vec!["p1", "p2"]);
    }

    #[test]
    fn test_compliant_at_eighty_percent() {
        let mapper = mapper();
        mapper.map_policy("p1", "P1", "F", ["c1", "c2", "c3", "c4"]).unwrap();
        let report = mapper.generate_compliance_report("F");
        assert!(report.is_compliant());
    }

    #[test]
    fn test_distinct_controls_counted_once() {
        let mapper = mapper();
        mapper.map_policy("p1", "P1", "F", ["c1", "c1"]).unwrap();
        mapper.map_policy("p1", "P1 again", "F", ["c1"]).unwrap();

        let status = mapper.get_compliance_status("F");
        assert_eq!(status.mappings.len(), 2);
        assert_eq!(status.mapped_controls, 1);
        assert_eq!(status.mappings[0].control_ids, vec!["c1"]);
    }

    #[test]
    fn test_unknown_framework_is_not_found() {
        let mapper = ComplianceMapper::new();
        let status = mapper.get_compliance_status("nope");
        assert_eq!(status.total_controls, 0);
        assert!(status.coverage.abs() < f64::EPSILON);

        let report = mapper.generate_compliance_report("nope");
        assert_eq!(report.status, ComplianceLevel::NotFound);
        assert!(report.framework_name.is_none());
    }

    #[test]
    fn test_map_policy_rejects_bad_input() {
        let mapper = mapper();
        assert!(matches!(
            mapper.map_policy("p1", "P1", "missing", ["c1"]),
            Err(ComplianceError::UnknownFramework(_))
        ));
        assert!(matches!(
            mapper.map_policy("p1", "P1", "F", ["c1", "c9"]),
            Err(ComplianceError::UnknownControls { controls, .. }) if controls == vec!["c9".to_string()]
        ));
        assert!(matches!(
            mapper.map_policy("p1", "P1", "F", Vec::<String>::new()),
            Err(ComplianceError::EmptyControls { .. })
        ));
        assert!(mapper.get_mappings("F").is_empty());
    }

    #[test]
    fn test_add_framework_rejects_duplicates() {
        let mapper = ComplianceMapper::new();
        let count = mapper.get_frameworks().len();
        assert!(matches!(
            mapper.add_framework(ComplianceFramework::new("soc2", "again", "1")),
            Err(ComplianceError::DuplicateFramework(_))
        ));
        mapper.add_framework(five_controls()).unwrap();
        assert_eq!(mapper.get_frameworks().len(), count + 1);
        assert_eq!(mapper.get_framework("F").map(|f| f.total_controls()), Some(5));
    }

    #[test]
    fn test_evidence_and_unmap() {
        let mapper = mapper();
        mapper.map_policy("p1", "P1", "F", ["c1"]).unwrap();
        mapper
            .add_evidence("F", "p1", Evidence::new("review", json!({ "by": "auditor" })))
            .unwrap();
        assert!(mapper.add_evidence("F", "p2", Evidence::new("review", json!(null))).is_err());

        let mappings = mapper.get_policy_mappings("p1");
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].evidence.len(), 2);

        assert_eq!(mapper.unmap_policy("F", "p1"), 1);
        assert_eq!(mapper.unmap_policy("F", "p1"), 0);
        assert!(mapper.get_mappings("F").is_empty());
    }

    #[test]
    fn test_builtin_frameworks_are_mappable() {
        let mapper = ComplianceMapper::new();
        mapper
            .map_policy("mfa-required", "Require MFA", "hipaa", ["164.312(d)"])
            .unwrap();
        let report = mapper.generate_compliance_report("hipaa");
        assert_eq!(report.framework_name.as_deref(), Some("HIPAA Security Rule"));
        assert!(!report.unmapped_controls.contains(&"164.312(d)".to_string()));
    }

    proptest! {
        #[test]
        fn prop_coverage_bounded_and_consistent(picks in proptest::collection::vec(1usize..=5, 0..12)) {
            let mapper = mapper();
            for (i, pick) in picks.iter().enumerate() {
                mapper.map_policy(&format!("p{i}"), "P", "F", [format!("c{pick}")]).unwrap();
            }
            let distinct = picks.iter().collect::<BTreeSet<_>>().len();
            let report = mapper.generate_compliance_report("F");

            prop_assert!((0.0..=100.0).contains(&report.coverage));
            prop_assert_eq!(report.unmapped_controls.len(), 5 - distinct);
            prop_assert_eq!(report.status, ComplianceLevel::from_coverage(report.coverage));
        }
    }
}
