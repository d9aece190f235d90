//! Configuration management for Warden
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (WARDEN_* prefix, highest precedence)
//! 2. warden.local.toml (gitignored, local overrides)
//! 3. warden.toml (git-tracked, project config)
//! 4. ~/.config/warden/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)
//!
//! A loaded configuration is validated before it is returned: every static
//! rule condition must parse, every conditional access rule must pass its
//! registration checks, and the compliance mapper must build from the
//! configured frameworks and mappings.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use warden_abac::{ConditionEvaluator, PolicyRuleMatcher, Rule};
use warden_access::ConditionalAccessRule;
use warden_compliance::{ComplianceFramework, ComplianceMapper};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::{ConfigLoader, ENV_PREFIX};
pub use paths::{LOCAL_CONFIG_FILE, PROJECT_CONFIG_FILE, Paths};

/// Main Warden configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub engine: EngineConfig,
    /// Static rules, evaluated in declared order.
    pub rules: Vec<Rule>,
    pub conditional_rules: Vec<ConditionalAccessRule>,
    /// Frameworks registered next to the built-in catalog.
    pub frameworks: Vec<ComplianceFramework>,
    pub mappings: Vec<MappingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Forward every decision to the audit sink.
    pub audit_enabled: bool,
    /// Compiled size limit for `match` patterns, in bytes.
    pub regex_size_limit: usize,
    /// Seed the compliance mapper with the built-in frameworks.
    pub include_builtin_frameworks: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            audit_enabled: true,
            regex_size_limit: warden_abac::condition::DEFAULT_REGEX_SIZE_LIMIT,
            include_builtin_frameworks: true,
        }
    }
}

impl EngineConfig {
    pub fn evaluator(&self) -> ConditionEvaluator {
        ConditionEvaluator::new().with_regex_size_limit(self.regex_size_limit)
    }
}

/// A policy-to-control mapping applied when the compliance mapper is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingConfig {
    pub policy_id: String,
    #[serde(default)]
    pub policy_name: String,
    /// Framework id.
    pub framework: String,
    pub controls: Vec<String>,
}

impl WardenConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Parse a single TOML file without layering.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every rule the way the engines would at registration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // A scratch matcher runs the same checks as registration.
        let matcher = PolicyRuleMatcher::new().with_evaluator(self.engine.evaluator());
        for (index, rule) in self.rules.iter().enumerate() {
            matcher
                .add_rule(rule.clone())
                .map_err(|source| ConfigError::InvalidRule {
                    rule: rule.label(index),
                    source,
                })?;
        }

        let mut ids = HashSet::new();
        for rule in &self.conditional_rules {
            rule.validate()?;
            if !ids.insert(rule.id.as_str()) {
                return Err(warden_access::AccessError::DuplicateRule(rule.id.clone()).into());
            }
        }

        let mut framework_ids = HashSet::new();
        for framework in &self.frameworks {
            if !framework_ids.insert(framework.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "framework '{}' is declared twice",
                    framework.id
                )));
            }
        }

        for mapping in &self.mappings {
            if mapping.policy_id.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "mapping to framework '{}' has an empty policy_id",
                    mapping.framework
                )));
            }
        }

        self.compliance_mapper()
            .map_err(|e| ConfigError::ValidationError(format!("compliance: {e}")))?;

        Ok(())
    }

    /// Builds a compliance mapper: the built-in catalog (unless disabled), the
    /// configured frameworks, then the configured mappings.
    pub fn compliance_mapper(&self) -> warden_compliance::Result<ComplianceMapper> {
        let mapper = if self.engine.include_builtin_frameworks {
            ComplianceMapper::new()
        } else {
            ComplianceMapper::empty()
        };

        for framework in &self.frameworks {
            mapper.add_framework(framework.clone())?;
        }
        for mapping in &self.mappings {
            let name = if mapping.policy_name.is_empty() {
                &mapping.policy_id
            } else {
                &mapping.policy_name
            };
            mapper.map_policy(
                &mapping.policy_id,
                name,
                &mapping.framework,
                mapping.controls.iter().cloned(),
            )?;
        }

        Ok(mapper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_abac::{Condition, Effect};
    use warden_access::AccessAction;
    use warden_compliance::{ComplianceControl, ComplianceLevel};

    fn mapping(policy: &str, framework: &str, controls: &[&str]) -> MappingConfig {
        MappingConfig {
            policy_id: policy.to_string(),
            policy_name: String::new(),
            framework: framework.to_string(),
            controls: controls.iter().map(ToString::to_string).collect(),
        }
    }

    #[test]
    fn test_default_config() {
        let config = WardenConfig::default();
        assert!(config.engine.audit_enabled);
        assert_eq!(config.engine.regex_size_limit, 1 << 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_expression() {
        let config = WardenConfig {
            rules: vec![
                Rule::allow().named("ok"),
                Rule::new(Effect::Deny)
                    .named("bad")
                    .when(Condition::expression("principal.x ===")),
            ],
            ..WardenConfig::default()
        };
        match config.validate() {
            Err(ConfigError::InvalidRule { rule, .. }) => assert_eq!(rule, "bad"),
            other => panic!("expected InvalidRule, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_duplicate_conditional_ids() {
        let rule = ConditionalAccessRule::new("dup", "dup", AccessAction::Deny);
        let config = WardenConfig {
            conditional_rules: vec![rule.clone(), rule],
            ..WardenConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConditionalRule(_))
        ));
    }

    #[test]
    fn test_compliance_mapper_from_config() {
        let config = WardenConfig {
            frameworks: vec![
                ComplianceFramework::new("internal", "Internal", "1")
                    .with_control(ComplianceControl::new("IAS-1", "Least privilege", "", "access"))
                    .with_control(ComplianceControl::new("IAS-2", "MFA", "", "auth")),
            ],
            mappings: vec![mapping("admins-read-docs", "internal", &["IAS-1"])],
            ..WardenConfig::default()
        };
        assert!(config.validate().is_ok());

        let mapper = config.compliance_mapper().unwrap();
        assert!(mapper.get_framework("soc2").is_some());

        let report = mapper.generate_compliance_report("internal");
        assert_eq!(report.status, ComplianceLevel::PartiallyCompliant);
        assert_eq!(
            mapper.get_policy_mappings("admins-read-docs")[0].policy_name,
            "admins-read-docs"
        );
    }

    #[test]
    fn test_validate_rejects_unknown_mapped_control() {
        let config = WardenConfig {
            mappings: vec![mapping("p1", "soc2", &["NOPE-1"])],
            ..WardenConfig::default()
        };
        match config.validate() {
            Err(ConfigError::ValidationError(msg)) => assert!(msg.contains("NOPE-1"), "{msg}"),
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_builtin_framework_collision() {
        let mut config = WardenConfig {
            frameworks: vec![ComplianceFramework::new("hipaa", "Local HIPAA", "1")],
            ..WardenConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        // Without the built-in catalog the id is free.
        config.engine.include_builtin_frameworks = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_mapping_to_excluded_builtin() {
        let mut config = WardenConfig::default();
        config.engine.include_builtin_frameworks = false;
        config.mappings.push(mapping("p", "soc2", &["CC6.1"]));
        assert!(config.compliance_mapper().is_err());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.toml");
        std::fs::write(
            &path,
            r#"
[[rules]]
resource = "doc"
action = "read"
effect = "ALLOW"
"#,
        )
        .unwrap();

        let config = WardenConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.rules.len(), 1);

        std::fs::write(&path, "[[rules]\n").unwrap();
        assert!(matches!(
            WardenConfig::from_toml_file(&path),
            Err(ConfigError::ParseError { .. })
        ));
        assert!(matches!(
            WardenConfig::from_toml_file(dir.path().join("missing.toml")),
            Err(ConfigError::ReadError { .. })
        ));
    }
}
