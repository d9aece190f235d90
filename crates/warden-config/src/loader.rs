//! Configuration loader with multi-source merging

use crate::{Paths, WardenConfig};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Default environment variable prefix.
pub const ENV_PREFIX: &str = "WARDEN";

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    include_user_config: bool,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            include_user_config: true,
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Skip ~/.config/warden/config.toml
    pub fn without_user_config(mut self) -> Self {
        self.include_user_config = false;
        self
    }

    /// Load configuration from all sources with proper precedence, then
    /// validate every rule it declares.
    pub fn load(self) -> Result<WardenConfig> {
        let mut builder = config::Config::builder();

        // 1. Built-in defaults
        let defaults = WardenConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. User config (~/.config/warden/config.toml)
        if self.include_user_config {
            let paths = Paths::new();
            if let Ok(user_config_file) = paths.user_config_file() {
                if user_config_file.exists() {
                    builder = builder.add_source(
                        config::File::from(user_config_file)
                            .required(false)
                            .format(config::FileFormat::Toml),
                    );
                }
            }
        }

        // 3. Project config (warden.toml)
        let project_config_file = Paths::project_config_file(&self.project_dir);
        if project_config_file.exists() {
            builder = builder.add_source(
                config::File::from(project_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 4. Local config (warden.local.toml)
        let local_config_file = Paths::local_config_file(&self.project_dir);
        if local_config_file.exists() {
            builder = builder.add_source(
                config::File::from(local_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 5. Environment variables (WARDEN_ENGINE__AUDIT_ENABLED=false)
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let warden_config: WardenConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        warden_config
            .validate()
            .context("Configuration failed validation")?;

        Ok(warden_config)
    }

}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use warden_abac::Effect;
    use warden_access::AccessAction;

    fn loader(dir: &Path) -> ConfigLoader {
        ConfigLoader::new()
            .with_project_dir(dir)
            .without_user_config()
    }

    #[test]
    fn test_load_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = loader(temp_dir.path()).load().expect("Failed to load config");

        assert!(config.engine.audit_enabled);
        assert!(config.engine.include_builtin_frameworks);
        assert!(config.rules.is_empty());
        assert!(config.conditional_rules.is_empty());
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        let config_content = r#"
[engine]
regex_size_limit = 65536

[[rules]]
name = "admins-read-docs"
resource = "doc"
action = "read"
roles = ["ADMIN"]
effect = "ALLOW"

[[rules.when]]
left = "principal.level"
op = "gte"
right = 2

[[rules]]
name = "archived-deny"
conditions = "resource.archived == true"
effect = "DENY"

[[conditional_rules]]
id = "geo-block"
name = "Geo block"
priority = 1
action = "DENY"
description = "Access from this country is not permitted"

[conditional_rules.geo_conditions]
blocked_countries = ["KP"]

[[frameworks]]
id = "internal"
name = "Internal Access Standard"
version = "1"

[[frameworks.controls]]
id = "IAS-1"
name = "Least privilege"

[[mappings]]
policy_id = "admins-read-docs"
policy_name = "Admins read docs"
framework = "internal"
controls = ["IAS-1"]
"#;
        fs::write(project_dir.join("warden.toml"), config_content).expect("Failed to write config");

        let config = loader(project_dir).load().expect("Failed to load config");

        assert_eq!(config.engine.regex_size_limit, 65536);
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.rules[0].effect, Effect::Allow);
        assert_eq!(config.rules[0].when.len(), 1);
        assert_eq!(config.conditional_rules.len(), 1);
        assert_eq!(config.conditional_rules[0].action, AccessAction::Deny);
        assert_eq!(
            config.conditional_rules[0]
                .geo_conditions
                .as_ref()
                .map(|g| g.blocked_countries.clone()),
            Some(vec!["KP".to_string()])
        );
        assert_eq!(config.frameworks[0].controls.len(), 1);
        assert_eq!(config.mappings[0].controls, vec!["IAS-1"]);
    }

    #[test]
    fn test_local_overrides() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("warden.toml"),
            r#"
[engine]
audit_enabled = true
"#,
        )
        .expect("Failed to write project config");

        fs::write(
            project_dir.join("warden.local.toml"),
            r#"
[engine]
audit_enabled = false
"#,
        )
        .expect("Failed to write local config");

        let config = loader(project_dir).load().expect("Failed to load config");

        // Local config should override project config
        assert!(!config.engine.audit_enabled);
    }

    #[test]
    fn test_invalid_rule_rejected() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("warden.toml"),
            r#"
[[rules]]
name = "broken"
conditions = "principal.x ==="
effect = "ALLOW"
"#,
        )
        .expect("Failed to write config");

        let err = loader(project_dir).load().unwrap_err();
        assert!(format!("{err:#}").contains("broken"));
    }

    #[test]
    fn test_unknown_mapped_control_rejected() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("warden.toml"),
            r#"
[[mappings]]
policy_id = "admins-read-docs"
framework = "soc2"
controls = ["NOPE-1"]
"#,
        )
        .expect("Failed to write config");

        let err = loader(project_dir).load().unwrap_err();
        assert!(format!("{err:#}").contains("NOPE-1"));
    }

    #[test]
    fn test_builtin_framework_id_collision_rejected() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("warden.toml"),
            r#"
[[frameworks]]
id = "hipaa"
name = "Local HIPAA profile"
version = "1"
"#,
        )
        .expect("Failed to write config");

        let err = loader(project_dir).load().unwrap_err();
        assert!(format!("{err:#}").contains("hipaa"));

        fs::write(
            project_dir.join("warden.local.toml"),
            "[engine]\ninclude_builtin_frameworks = false\n",
        )
        .expect("Failed to write local config");
        let config = loader(project_dir).load().expect("Failed to load config");
        assert_eq!(config.compliance_mapper().unwrap().get_frameworks().len(), 1);
    }

    // Environment overrides use a double underscore between nested keys:
    //
    // WARDEN_ENGINE__AUDIT_ENABLED=false
    // WARDEN_ENGINE__REGEX_SIZE_LIMIT=65536
    //
    // They are not exercised here because the process environment is shared
    // between parallel tests.
}
