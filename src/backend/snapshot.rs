use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::access::{BackendError, ErrorKind};
use crate::backend::*;

/// Backend that answers from a tenant export document instead of live APIs.
#[derive(Debug, Clone, Default)]
pub struct SnapshotBackend {
    name: String,
    export: TenantExport,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TenantExport {
    tenant: Option<String>,
    identity_policy: Option<Served<IdentityPolicy>>,
    conditional_access_policies: Option<Served<Vec<ConditionalAccessPolicy>>>,
    guest_settings: Option<Served<GuestSettings>>,
    threat_policies: Option<Served<ThreatPolicies>>,
    dlp_policies: Option<Served<Vec<DlpPolicy>>>,
    sensitivity_labels: Option<Served<Vec<SensitivityLabel>>>,
    audit_config: Option<Served<AuditConfig>>,
    retention_policies: Option<Served<Vec<RetentionPolicy>>>,
    app_registrations: Option<Served<Vec<AppRegistration>>>,
    consent_settings: Option<Served<ConsentSettings>>,
    transport_rules: Option<Served<Vec<TransportRule>>>,
    mail_forwarding: Option<Served<MailForwarding>>,
    email_auth_records: Option<Served<Vec<EmailAuthRecord>>>,
    sharing_settings: Option<Served<SharingSettings>>,
    device_compliance: Option<Served<DeviceCompliance>>,
    alert_policies: Option<Served<Vec<AlertPolicy>>>,
    role_assignments: Option<Served<Vec<RoleAssignment>>>,
}

/// An export member is either the captured payload or a recorded error.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Served<T> {
    Recorded { error: RecordedError },
    Value(T),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordedError {
    kind: ErrorKind,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    retry_after_secs: Option<u64>,
}

impl SnapshotBackend {
    pub fn load(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read tenant export: {}", path.display()))?;
        Self::from_json(&s)
            .with_context(|| format!("failed to parse tenant export: {}", path.display()))
    }

    pub fn from_json(s: &str) -> Result<Self> {
        let export: TenantExport =
            serde_json::from_str(s).context("tenant export is not valid JSON")?;
        let name = match export.tenant.as_deref() {
            Some(tenant) if !tenant.trim().is_empty() => format!("snapshot:{}", tenant.trim()),
            _ => "snapshot".to_string(),
        };
        Ok(Self { name, export })
    }

    pub fn tenant(&self) -> Option<&str> {
        self.export.tenant.as_deref()
    }
}

fn serve<T: Clone>(operation: &str, slot: &Option<Served<T>>) -> Result<T, BackendError> {
    match slot {
        None => Err(BackendError::not_found(format!(
            "{operation} is not present in the tenant export"
        ))),
        Some(Served::Value(value)) => Ok(value.clone()),
        Some(Served::Recorded { error }) => {
            let message = error
                .message
                .clone()
                .unwrap_or_else(|| format!("recorded {} error", error.kind));
            let mut err = BackendError::new(error.kind, message);
            if let Some(secs) = error.retry_after_secs {
                err = err.with_retry_after(Duration::from_secs(secs));
            }
            Err(err)
        }
    }
}

#[async_trait]
impl TenantBackend for SnapshotBackend {
    fn name(&self) -> &str {
        if self.name.is_empty() {
            "snapshot"
        } else {
            &self.name
        }
    }

    async fn identity_policy(&self) -> Result<IdentityPolicy, BackendError> {
        serve("identity_policy", &self.export.identity_policy)
    }

    async fn conditional_access_policies(
        &self,
    ) -> Result<Vec<ConditionalAccessPolicy>, BackendError> {
        serve(
            "conditional_access_policies",
            &self.export.conditional_access_policies,
        )
    }

    async fn guest_settings(&self) -> Result<GuestSettings, BackendError> {
        serve("guest_settings", &self.export.guest_settings)
    }

    async fn threat_policies(&self) -> Result<ThreatPolicies, BackendError> {
        serve("threat_policies", &self.export.threat_policies)
    }

    async fn dlp_policies(&self) -> Result<Vec<DlpPolicy>, BackendError> {
        serve("dlp_policies", &self.export.dlp_policies)
    }

    async fn sensitivity_labels(&self) -> Result<Vec<SensitivityLabel>, BackendError> {
        serve("sensitivity_labels", &self.export.sensitivity_labels)
    }

    async fn audit_config(&self) -> Result<AuditConfig, BackendError> {
        serve("audit_config", &self.export.audit_config)
    }

    async fn retention_policies(&self) -> Result<Vec<RetentionPolicy>, BackendError> {
        serve("retention_policies", &self.export.retention_policies)
    }

    async fn app_registrations(&self) -> Result<Vec<AppRegistration>, BackendError> {
        serve("app_registrations", &self.export.app_registrations)
    }

    async fn consent_settings(&self) -> Result<ConsentSettings, BackendError> {
        serve("consent_settings", &self.export.consent_settings)
    }

    async fn transport_rules(&self) -> Result<Vec<TransportRule>, BackendError> {
        serve("transport_rules", &self.export.transport_rules)
    }

    async fn mail_forwarding(&self) -> Result<MailForwarding, BackendError> {
        serve("mail_forwarding", &self.export.mail_forwarding)
    }

    async fn email_auth_records(&self) -> Result<Vec<EmailAuthRecord>, BackendError> {
        serve("email_auth_records", &self.export.email_auth_records)
    }

    async fn sharing_settings(&self) -> Result<SharingSettings, BackendError> {
        serve("sharing_settings", &self.export.sharing_settings)
    }

    async fn device_compliance(&self) -> Result<DeviceCompliance, BackendError> {
        serve("device_compliance", &self.export.device_compliance)
    }

    async fn alert_policies(&self) -> Result<Vec<AlertPolicy>, BackendError> {
        serve("alert_policies", &self.export.alert_policies)
    }

    async fn role_assignments(&self) -> Result<Vec<RoleAssignment>, BackendError> {
        serve("role_assignments", &self.export.role_assignments)
    }
}
