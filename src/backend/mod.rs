//! Read capabilities the checks need from the tenant's administrative APIs.
//!
//! Each method is one backend call. Default bodies answer `NotFound`, which
//! checks read as "feature not licensed or not configured", so a backend only
//! implements what it can actually serve.

mod model;
mod snapshot;

pub use model::*;
pub use snapshot::SnapshotBackend;

use async_trait::async_trait;

use crate::access::BackendError;

fn unsupported(operation: &str) -> BackendError {
    BackendError::not_found(format!("{operation} is not provided by this backend"))
}

#[async_trait]
pub trait TenantBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn identity_policy(&self) -> Result<IdentityPolicy, BackendError> {
        Err(unsupported("identity_policy"))
    }

    async fn conditional_access_policies(
        &self,
    ) -> Result<Vec<ConditionalAccessPolicy>, BackendError> {
        Err(unsupported("conditional_access_policies"))
    }

    async fn guest_settings(&self) -> Result<GuestSettings, BackendError> {
        Err(unsupported("guest_settings"))
    }

    async fn threat_policies(&self) -> Result<ThreatPolicies, BackendError> {
        Err(unsupported("threat_policies"))
    }

    async fn dlp_policies(&self) -> Result<Vec<DlpPolicy>, BackendError> {
        Err(unsupported("dlp_policies"))
    }

    async fn sensitivity_labels(&self) -> Result<Vec<SensitivityLabel>, BackendError> {
        Err(unsupported("sensitivity_labels"))
    }

    async fn audit_config(&self) -> Result<AuditConfig, BackendError> {
        Err(unsupported("audit_config"))
    }

    async fn retention_policies(&self) -> Result<Vec<RetentionPolicy>, BackendError> {
        Err(unsupported("retention_policies"))
    }

    async fn app_registrations(&self) -> Result<Vec<AppRegistration>, BackendError> {
        Err(unsupported("app_registrations"))
    }

    async fn consent_settings(&self) -> Result<ConsentSettings, BackendError> {
        Err(unsupported("consent_settings"))
    }

    async fn transport_rules(&self) -> Result<Vec<TransportRule>, BackendError> {
        Err(unsupported("transport_rules"))
    }

    async fn mail_forwarding(&self) -> Result<MailForwarding, BackendError> {
        Err(unsupported("mail_forwarding"))
    }

    async fn email_auth_records(&self) -> Result<Vec<EmailAuthRecord>, BackendError> {
        Err(unsupported("email_auth_records"))
    }

    async fn sharing_settings(&self) -> Result<SharingSettings, BackendError> {
        Err(unsupported("sharing_settings"))
    }

    async fn device_compliance(&self) -> Result<DeviceCompliance, BackendError> {
        Err(unsupported("device_compliance"))
    }

    async fn alert_policies(&self) -> Result<Vec<AlertPolicy>, BackendError> {
        Err(unsupported("alert_policies"))
    }

    async fn role_assignments(&self) -> Result<Vec<RoleAssignment>, BackendError> {
        Err(unsupported("role_assignments"))
    }
}
