//! # warden-compliance: Compliance Control Mapping
//!
//! Associates policy identifiers with controls inside named compliance
//! frameworks and reports coverage. Used administratively, never on the
//! per-request path.
//!
//! A mapper starts with a built-in catalog (SOC 2, ISO 27001, GDPR, HIPAA,
//! PCI DSS); further frameworks can be registered. Coverage is the share of a
//! framework's controls referenced by at least one mapping:
//!
//! | Coverage | Status                |
//! |----------|-----------------------|
//! | >= 80%   | `compliant`           |
//! | >= 50%   | `partially-compliant` |
//! | < 50%    | `non-compliant`       |
//!
//! Unknown framework ids report zero coverage and a `not-found` status rather
//! than failing.

use thiserror::Error;

pub mod framework;
pub mod mapper;
pub mod mapping;
pub mod report;

pub use framework::{ComplianceControl, ComplianceFramework};
pub use mapper::ComplianceMapper;
pub use mapping::{ComplianceMapping, Evidence, POLICY_EVIDENCE};
pub use report::{ComplianceLevel, ComplianceReport, ComplianceStatus};

/// Error types for compliance administration.
#[derive(Debug, Error)]
pub enum ComplianceError {
    #[error("Invalid framework: {0}")]
    InvalidFramework(String),

    #[error("Framework already registered: {0}")]
    DuplicateFramework(String),

    #[error("Unknown framework: {0}")]
    UnknownFramework(String),

    #[error("Controls not defined by framework {framework}: {controls:?}")]
    UnknownControls {
        framework: String,
        controls: Vec<String>,
    },

    #[error("Mapping of policy {policy} to {framework} lists no controls")]
    EmptyControls { framework: String, policy: String },

    #[error("No mapping of policy {policy} in framework {framework}")]
    UnknownMapping { framework: String, policy: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ComplianceError>;
