//! Compliance frameworks and the built-in control catalog.

use serde::{Deserialize, Serialize};

/// A single control within a framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceControl {
    /// Framework-specific identifier (e.g. "CC6.1", "164.312(b)").
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
}

impl ComplianceControl {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            category: category.into(),
        }
    }
}

/// A named catalog of controls that policies can be mapped against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceFramework {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    /// Controls in catalog order.
    #[serde(default)]
    pub controls: Vec<ComplianceControl>,
}

impl ComplianceFramework {
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            controls: Vec::new(),
        }
    }

    pub fn with_control(mut self, control: ComplianceControl) -> Self {
        self.controls.push(control);
        self
    }

    pub fn has_control(&self, control_id: &str) -> bool {
        self.controls.iter().any(|c| c.id == control_id)
    }

    pub fn control(&self, control_id: &str) -> Option<&ComplianceControl> {
        self.controls.iter().find(|c| c.id == control_id)
    }

    pub fn total_controls(&self) -> usize {
        self.controls.len()
    }

    /// Built-in frameworks seeded into every mapper.
    pub fn builtin() -> Vec<Self> {
        vec![soc2(), iso27001(), gdpr(), hipaa(), pci_dss()]
    }
}

fn soc2() -> ComplianceFramework {
    ComplianceFramework::new("soc2", "SOC 2 Type II", "2017")
        .with_control(ComplianceControl::new(
            "CC6.1",
            "Logical access security",
            "Logical access security software, infrastructure and architectures",
            "access-control",
        ))
        .with_control(ComplianceControl::new(
            "CC6.2",
            "User registration and authorization",
            "New internal and external users are registered and authorized before access is granted",
            "access-control",
        ))
        .with_control(ComplianceControl::new(
            "CC6.3",
            "Role-based access",
            "Access to data and assets is authorized, modified or removed based on roles",
            "access-control",
        ))
        .with_control(ComplianceControl::new(
            "CC6.6",
            "Boundary protection",
            "Logical access security measures protect against threats from outside system boundaries",
            "network",
        ))
        .with_control(ComplianceControl::new(
            "CC7.2",
            "Security monitoring",
            "System components are monitored for anomalies indicative of malicious acts",
            "monitoring",
        ))
}

fn iso27001() -> ComplianceFramework {
    ComplianceFramework::new("iso27001", "ISO/IEC 27001", "2022")
        .with_control(ComplianceControl::new(
            "A.5.15",
            "Access control",
            "Rules to control physical and logical access are established and implemented",
            "access-control",
        ))
        .with_control(ComplianceControl::new(
            "A.5.18",
            "Access rights",
            "Access rights are provisioned, reviewed, modified and removed per policy",
            "access-control",
        ))
        .with_control(ComplianceControl::new(
            "A.8.5",
            "Secure authentication",
            "Secure authentication technologies and procedures are implemented",
            "authentication",
        ))
        .with_control(ComplianceControl::new(
            "A.8.16",
            "Monitoring activities",
            "Networks, systems and applications are monitored for anomalous behavior",
            "monitoring",
        ))
        .with_control(ComplianceControl::new(
            "A.8.24",
            "Use of cryptography",
            "Rules for the effective use of cryptography are defined and implemented",
            "cryptography",
        ))
}

fn gdpr() -> ComplianceFramework {
    ComplianceFramework::new("gdpr", "General Data Protection Regulation", "2016/679")
        .with_control(ComplianceControl::new(
            "Art.5(1)(f)",
            "Integrity and confidentiality",
            "Personal data is processed with appropriate security",
            "security",
        ))
        .with_control(ComplianceControl::new(
            "Art.25",
            "Data protection by design",
            "Technical measures implement data protection principles by default",
            "privacy",
        ))
        .with_control(ComplianceControl::new(
            "Art.30",
            "Records of processing",
            "Records of processing activities are maintained",
            "accountability",
        ))
        .with_control(ComplianceControl::new(
            "Art.32",
            "Security of processing",
            "Measures ensure a level of security appropriate to the risk",
            "security",
        ))
}

fn hipaa() -> ComplianceFramework {
    ComplianceFramework::new("hipaa", "HIPAA Security Rule", "45 CFR 164")
        .with_control(ComplianceControl::new(
            "164.312(a)(1)",
            "Access control",
            "Allow access only to persons or software programs granted access rights",
            "access-control",
        ))
        .with_control(ComplianceControl::new(
            "164.312(a)(2)(iv)",
            "Encryption and decryption",
            "Mechanism to encrypt and decrypt electronic protected health information",
            "cryptography",
        ))
        .with_control(ComplianceControl::new(
            "164.312(b)",
            "Audit controls",
            "Record and examine activity in systems that contain ePHI",
            "audit",
        ))
        .with_control(ComplianceControl::new(
            "164.312(c)(1)",
            "Integrity",
            "Protect ePHI from improper alteration or destruction",
            "integrity",
        ))
        .with_control(ComplianceControl::new(
            "164.312(d)",
            "Person or entity authentication",
            "Verify that a person seeking access is the one claimed",
            "authentication",
        ))
}

fn pci_dss() -> ComplianceFramework {
    ComplianceFramework::new("pci-dss", "PCI DSS", "4.0")
        .with_control(ComplianceControl::new(
            "Req.3",
            "Protect stored account data",
            "Stored cardholder data is protected",
            "cryptography",
        ))
        .with_control(ComplianceControl::new(
            "Req.7",
            "Restrict access by business need to know",
            "Access to system components and data is restricted by need to know",
            "access-control",
        ))
        .with_control(ComplianceControl::new(
            "Req.8",
            "Identify users and authenticate access",
            "Users are identified and authenticated, including MFA for remote access",
            "authentication",
        ))
        .with_control(ComplianceControl::new(
            "Req.10",
            "Log and monitor all access",
            "Access to system components and cardholder data is logged and monitored",
            "audit",
        ))
}
