//! Warden CLI
//!
//! Check configuration, inspect compliance coverage and run one-off
//! authorization decisions.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;
use warden::config::{ConfigLoader, PROJECT_CONFIG_FILE, Paths, WardenConfig};
use warden::{AccessContext, PolicyDecisionPoint, Principal, Resource};

#[derive(Parser)]
#[command(name = "warden")]
#[command(version, about = "Warden policy decision point", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory holding warden.toml (defaults to the current dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate the layered configuration
    Check,

    /// List compliance frameworks
    Frameworks,

    /// Generate a compliance report
    Report {
        /// Framework id (e.g. soc2, hipaa)
        #[arg(short, long)]
        framework: String,

        /// Output file path; prints to stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Authorize a single request
    Authorize {
        /// Principal as JSON: {"id": .., "roles": [..], "attributes": {..}}
        #[arg(long)]
        principal_json: String,

        /// Resource as JSON: {"kind": .., "id": .., "attributes": {..}}
        #[arg(long)]
        resource_json: String,

        /// Action name
        #[arg(short, long)]
        action: String,

        /// Access context as JSON; defaults to an empty context for the principal
        #[arg(long)]
        context_json: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Check => check(&config, cli.config.as_deref()),
        Commands::Frameworks => list_frameworks(&config)?,
        Commands::Report { framework, output } => {
            generate_report(&config, &framework, output.as_deref())?;
        }
        Commands::Authorize {
            principal_json,
            resource_json,
            action,
            context_json,
        } => {
            authorize(
                &config,
                &principal_json,
                &resource_json,
                &action,
                context_json.as_deref(),
            )?;
        }
    }

    Ok(())
}

fn load_config(project_dir: Option<&Path>) -> Result<WardenConfig> {
    let loader = match project_dir {
        Some(dir) => ConfigLoader::new().with_project_dir(dir),
        None => ConfigLoader::new(),
    };
    loader.load().context("Failed to load Warden configuration")
}

fn check(config: &WardenConfig, project_dir: Option<&Path>) {
    let project_dir = project_dir.unwrap_or_else(|| Path::new("."));
    if !Paths::is_initialized(project_dir) {
        warn!(
            "No {} in {}; only defaults, user config and environment apply",
            PROJECT_CONFIG_FILE,
            project_dir.display()
        );
    }

    println!("Configuration OK");
    println!("  Static rules:       {}", config.rules.len());
    println!("  Conditional rules:  {}", config.conditional_rules.len());
    println!("  Extra frameworks:   {}", config.frameworks.len());
    println!("  Mappings:           {}", config.mappings.len());
    println!(
        "  Audit:              {}",
        if config.engine.audit_enabled { "enabled" } else { "disabled" }
    );
}

fn list_frameworks(config: &WardenConfig) -> Result<()> {
    let mapper = config.compliance_mapper().context("Failed to apply compliance mappings")?;

    println!("Compliance Frameworks:");
    println!();
    for framework in mapper.get_frameworks() {
        let status = mapper.get_compliance_status(&framework.id);
        println!("  {} - {} ({})", framework.id, framework.name, framework.version);
        println!(
            "      Controls: {} mapped / {} total ({:.1}%)",
            status.mapped_controls, status.total_controls, status.coverage
        );
    }
    Ok(())
}

fn generate_report(config: &WardenConfig, framework: &str, output: Option<&Path>) -> Result<()> {
    info!("Generating {} compliance report...", framework);

    let mapper = config.compliance_mapper().context("Failed to apply compliance mappings")?;
    let report = mapper.generate_compliance_report(framework);

    match output {
        Some(path) => {
            report
                .to_json_file(path)
                .with_context(|| format!("Failed to write JSON report to {}", path.display()))?;
            println!("✓ JSON report written to: {}", path.display());
        }
        None => println!("{}", report.to_json().context("Failed to serialize report")?),
    }

    println!("\nCompliance Summary:");
    println!("  Framework: {}", report.framework_name.as_deref().unwrap_or(framework));
    println!("  Coverage:  {:.1}%", report.coverage);
    println!("  Status:    {}", report.status);

    Ok(())
}

fn authorize(
    config: &WardenConfig,
    principal_json: &str,
    resource_json: &str,
    action: &str,
    context_json: Option<&str>,
) -> Result<()> {
    let principal: Principal =
        serde_json::from_str(principal_json).context("Invalid --principal-json")?;
    let resource: Resource =
        serde_json::from_str(resource_json).context("Invalid --resource-json")?;
    let context = match context_json {
        Some(raw) => serde_json::from_str::<AccessContext>(raw).context("Invalid --context-json")?,
        None => AccessContext::new(principal.id.clone(), "", Utc::now()),
    };
    if principal.id.is_empty() {
        bail!("principal id must not be empty");
    }

    let pdp = PolicyDecisionPoint::from_config(config).context("Failed to build decision point")?;
    let authorization = pdp.authorize(&principal, &resource, action, &context);

    println!(
        "{}",
        serde_json::to_string_pretty(&authorization).context("Failed to serialize decision")?
    );
    Ok(())
}
