use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Functional areas assessed by the catalog. Serialized with the display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DomainName {
    #[serde(rename = "Identity & Access")]
    IdentityAccess,
    #[serde(rename = "Threat Protection")]
    ThreatProtection,
    #[serde(rename = "Data Protection")]
    DataProtection,
    #[serde(rename = "Compliance")]
    Compliance,
    #[serde(rename = "Application Registration")]
    AppRegistration,
    #[serde(rename = "Email Security")]
    EmailSecurity,
    #[serde(rename = "Collaboration")]
    Collaboration,
    #[serde(rename = "Device Management")]
    DeviceManagement,
    #[serde(rename = "Alerting")]
    Alerting,
    #[serde(rename = "Privileged Roles")]
    PrivilegedRoles,
}

impl DomainName {
    pub const ALL: [DomainName; 10] = [
        DomainName::IdentityAccess,
        DomainName::ThreatProtection,
        DomainName::DataProtection,
        DomainName::Compliance,
        DomainName::AppRegistration,
        DomainName::EmailSecurity,
        DomainName::Collaboration,
        DomainName::DeviceManagement,
        DomainName::Alerting,
        DomainName::PrivilegedRoles,
    ];

    /// Short key accepted on the command line and in config files.
    pub const fn key(self) -> &'static str {
        match self {
            DomainName::IdentityAccess => "identity",
            DomainName::ThreatProtection => "threat-protection",
            DomainName::DataProtection => "data-protection",
            DomainName::Compliance => "compliance",
            DomainName::AppRegistration => "app-registrations",
            DomainName::EmailSecurity => "email",
            DomainName::Collaboration => "collaboration",
            DomainName::DeviceManagement => "devices",
            DomainName::Alerting => "alerting",
            DomainName::PrivilegedRoles => "privileged-roles",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            DomainName::IdentityAccess => "Identity & Access",
            DomainName::ThreatProtection => "Threat Protection",
            DomainName::DataProtection => "Data Protection",
            DomainName::Compliance => "Compliance",
            DomainName::AppRegistration => "Application Registration",
            DomainName::EmailSecurity => "Email Security",
            DomainName::Collaboration => "Collaboration",
            DomainName::DeviceManagement => "Device Management",
            DomainName::Alerting => "Alerting",
            DomainName::PrivilegedRoles => "Privileged Roles",
        }
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for DomainName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        DomainName::ALL
            .into_iter()
            .find(|d| d.key().eq_ignore_ascii_case(s) || d.display_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let keys: Vec<&str> = DomainName::ALL.iter().map(|d| d.key()).collect();
                format!("unknown domain: {s} (expected one of {})", keys.join("|"))
            })
    }
}
