//! Check catalog and per-domain orchestration.
//!
//! The catalog is a static registry: [`catalog`] builds one [`Domain`] per
//! functional area, each holding its checks as plain function pointers.

mod alerting;
mod apps;
mod collaboration;
mod compliance;
mod data;
mod devices;
mod email;
mod identity;
mod roles;
mod threat;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::access::{AccessError, AccessLayer, BackendError};
use crate::backend::TenantBackend;
use crate::core::{CheckResult, CheckStatus, DomainName, DomainSummary, Finding, Severity};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// What a check body returns before it is turned into a [`CheckResult`].
pub type Evaluation = Result<Vec<Finding>, Interrupted>;

pub type CheckFn = fn(CheckContext) -> BoxFuture<Evaluation>;

#[derive(Debug, Clone)]
pub enum Interrupted {
    /// The capability is not licensed or not configured in the tenant.
    NotConfigured(String),
    Failed(AccessError),
}

#[derive(Debug, Clone)]
pub struct CheckContext {
    pub access: AccessLayer,
    pub domain: DomainName,
    pub check_id: &'static str,
    pub now: OffsetDateTime,
}

impl CheckContext {
    pub fn finding(&self, severity: Severity, title: impl Into<String>) -> Finding {
        Finding::new(self.domain, self.check_id, severity, title)
    }

    pub async fn fetch<T, F, Fut>(&self, operation: &str, f: F) -> Result<T, Interrupted>
    where
        F: Fn(Arc<dyn TenantBackend>) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        match self.access.call(operation, f).await {
            Ok(value) => Ok(value),
            Err(err) if err.is_not_found() => Err(Interrupted::NotConfigured(format!(
                "{operation} is not available in this tenant"
            ))),
            Err(err) => Err(Interrupted::Failed(err)),
        }
    }

    /// Like [`CheckContext::fetch`], but a missing capability is `Ok(None)`.
    pub async fn fetch_optional<T, F, Fut>(
        &self,
        operation: &str,
        f: F,
    ) -> Result<Option<T>, Interrupted>
    where
        F: Fn(Arc<dyn TenantBackend>) -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        match self.access.call(operation, f).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(Interrupted::Failed(err)),
        }
    }
}

#[derive(Clone)]
pub struct Check {
    pub id: &'static str,
    pub control: &'static str,
    run: CheckFn,
}

impl std::fmt::Debug for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Check")
            .field("id", &self.id)
            .field("control", &self.control)
            .finish()
    }
}

impl Check {
    pub fn new(id: &'static str, control: &'static str, run: CheckFn) -> Self {
        Self { id, control, run }
    }

    pub async fn run(&self, access: &AccessLayer, domain: DomainName) -> CheckResult {
        let ctx = CheckContext {
            access: access.clone(),
            domain,
            check_id: self.id,
            now: OffsetDateTime::now_utc(),
        };
        match (self.run)(ctx).await {
            Ok(findings) => CheckResult::succeeded(self.id, findings),
            Err(Interrupted::NotConfigured(note)) => CheckResult::warning(self.id, note),
            Err(Interrupted::Failed(err)) => CheckResult::failed(self.id, err),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Domain {
    pub name: DomainName,
    pub checks: Vec<Check>,
}

#[derive(Debug, Clone)]
pub struct DomainResult {
    pub domain: DomainName,
    pub findings: Vec<Finding>,
    pub failed_check_count: usize,
    pub summary: DomainSummary,
}

impl Domain {
    pub fn new(name: DomainName, checks: Vec<Check>) -> Self {
        Self { name, checks }
    }

    /// Runs every check in order. A failed check is recorded and its siblings
    /// still run; failures surface as one Info "assessment incomplete" finding.
    pub async fn run(&self, access: &AccessLayer) -> DomainResult {
        let total = self.checks.len();
        let mut findings = Vec::new();
        let mut failed: Vec<(&Check, AccessError)> = Vec::new();
        let mut warnings = Vec::new();

        for (idx, check) in self.checks.iter().enumerate() {
            let result = check.run(access, self.name).await;
            match result.status {
                CheckStatus::Failed => {
                    if let Some(failure) = result.error {
                        warn!(
                            domain = %self.name,
                            check = check.id,
                            kind = %failure.source.kind(),
                            error = %failure.source,
                            "check failed"
                        );
                        failed.push((check, failure.source));
                    }
                }
                CheckStatus::SucceededWithWarning => {
                    let note = result.warning.unwrap_or_default();
                    info!(domain = %self.name, check = check.id, note = %note, "check skipped");
                    warnings.push(format!("{}: {note}", check.id));
                }
                CheckStatus::Succeeded => {}
            }
            info!(
                domain = %self.name,
                check = check.id,
                completed = idx + 1,
                total,
                findings = result.findings.len(),
                "check finished"
            );
            findings.extend(result.findings);
        }

        let failed_check_count = failed.len();
        let failed_checks: Vec<String> = failed.iter().map(|(c, _)| c.id.to_string()).collect();
        if !failed.is_empty() {
            findings.push(incomplete_finding(self.name, &failed));
        }

        DomainResult {
            domain: self.name,
            failed_check_count,
            summary: DomainSummary {
                domain: self.name,
                checks_run: total,
                failed_checks,
                warnings,
                findings: findings.len(),
            },
            findings,
        }
    }
}

impl Domain {
    /// Result for a domain whose run ended abnormally before it could report.
    /// Every check counts as failed and one Info finding says so.
    pub fn interrupted(&self, reason: &str) -> DomainResult {
        let failed_checks: Vec<String> = self.checks.iter().map(|c| c.id.to_string()).collect();
        let finding = Finding::new(
            self.name,
            format!("{}.assessment-incomplete", self.name.key()),
            Severity::Info,
            format!(
                "{} assessment incomplete: {} control(s) not evaluated",
                self.name,
                failed_checks.len()
            ),
        )
        .description(format!(
            "The domain run ended abnormally ({reason}), so none of its results are included: {}",
            failed_checks.join(", ")
        ))
        .remediation("Run the assessment again. If the domain keeps failing, re-run with `--verbose` and report the log.");

        DomainResult {
            domain: self.name,
            failed_check_count: failed_checks.len(),
            summary: DomainSummary {
                domain: self.name,
                checks_run: self.checks.len(),
                failed_checks,
                warnings: Vec::new(),
                findings: 1,
            },
            findings: vec![finding],
        }
    }
}

fn incomplete_finding(domain: DomainName, failed: &[(&Check, AccessError)]) -> Finding {
    let controls: Vec<String> = failed
        .iter()
        .map(|(check, err)| format!("{} ({}): {err}", check.control, check.id))
        .collect();
    Finding::new(
        domain,
        format!("{}.assessment-incomplete", domain.key()),
        Severity::Info,
        format!(
            "{domain} assessment incomplete: {} control(s) not evaluated",
            failed.len()
        ),
    )
    .description(format!(
        "The following controls could not be evaluated, so this domain's results understate its risk: {}",
        controls.join("; ")
    ))
    .remediation(
        "Confirm the assessment identity holds the required read permissions and that the backend services are reachable, then run the assessment again.",
    )
}

/// The full check catalog, in presentation order of domains.
pub fn catalog() -> Vec<Domain> {
    DomainName::ALL.into_iter().map(domain_for).collect()
}

pub fn domain_for(name: DomainName) -> Domain {
    match name {
        DomainName::IdentityAccess => identity::domain(),
        DomainName::ThreatProtection => threat::domain(),
        DomainName::DataProtection => data::domain(),
        DomainName::Compliance => compliance::domain(),
        DomainName::AppRegistration => apps::domain(),
        DomainName::EmailSecurity => email::domain(),
        DomainName::Collaboration => collaboration::domain(),
        DomainName::DeviceManagement => devices::domain(),
        DomainName::Alerting => alerting::domain(),
        DomainName::PrivilegedRoles => roles::domain(),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub key: &'static str,
    pub name: DomainName,
    pub checks: Vec<CatalogCheck>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogCheck {
    pub id: &'static str,
    pub control: &'static str,
}

pub fn describe_catalog(domains: &[Domain]) -> Vec<CatalogEntry> {
    domains
        .iter()
        .map(|d| CatalogEntry {
            key: d.name.key(),
            name: d.name,
            checks: d
                .checks
                .iter()
                .map(|c| CatalogCheck {
                    id: c.id,
                    control: c.control,
                })
                .collect(),
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::testing::access_for;
    use super::*;
    use std::collections::HashSet;

    async fn always_auth_failure(ctx: CheckContext) -> Evaluation {
        ctx.fetch("role_assignments", |b| async move { b.role_assignments().await })
            .await?;
        Ok(vec![])
    }

    async fn always_succeeds(ctx: CheckContext) -> Evaluation {
        let policies = ctx
            .fetch("alert_policies", |b| async move { b.alert_policies().await })
            .await?;
        Ok(vec![ctx.finding(
            Severity::Medium,
            format!("{} alert policies", policies.len()),
        )])
    }

    async fn not_configured(ctx: CheckContext) -> Evaluation {
        ctx.fetch("dlp_policies", |b| async move { b.dlp_policies().await })
            .await?;
        Ok(vec![])
    }

    const EXPORT: &str = r#"{
        "roleAssignments": { "error": { "kind": "authFailure", "message": "401" } },
        "alertPolicies": []
    }"#;

    #[tokio::test]
    async fn failing_check_does_not_stop_siblings() {
        let domain = Domain::new(
            DomainName::Alerting,
            vec![
                Check::new("test.auth", "Always rejected", |ctx| Box::pin(always_auth_failure(ctx))),
                Check::new("test.ok", "Always fine", |ctx| Box::pin(always_succeeds(ctx))),
            ],
        );

        let result = domain.run(&access_for(EXPORT)).await;
        assert_eq!(result.failed_check_count, 1);
        assert_eq!(result.findings.len(), 2);
        assert_eq!(result.findings[0].check_id, "test.ok");
        assert_eq!(result.findings[0].severity, Severity::Medium);

        let incomplete = &result.findings[1];
        assert_eq!(incomplete.severity, Severity::Info);
        assert_eq!(incomplete.check_id, "alerting.assessment-incomplete");
        assert!(incomplete.description.contains("test.auth"));
        assert_eq!(result.summary.failed_checks, vec!["test.auth".to_string()]);
    }

    #[tokio::test]
    async fn not_configured_capability_is_a_warning_not_a_failure() {
        let domain = Domain::new(
            DomainName::DataProtection,
            vec![Check::new("test.dlp", "DLP", |ctx| Box::pin(not_configured(ctx)))],
        );
        let check = &domain.checks[0];
        let result = check.run(&access_for("{}"), domain.name).await;
        assert_eq!(result.status, CheckStatus::SucceededWithWarning);
        assert!(result.findings.is_empty());

        let domain_result = domain.run(&access_for("{}")).await;
        assert_eq!(domain_result.failed_check_count, 0);
        assert!(domain_result.findings.is_empty());
        assert_eq!(domain_result.summary.warnings.len(), 1);
    }

    #[tokio::test]
    async fn failed_check_carries_access_error_and_no_findings() {
        let check = Check::new("test.auth", "Always rejected", |ctx| Box::pin(always_auth_failure(ctx)));
        let result = check.run(&access_for(EXPORT), DomainName::Alerting).await;
        assert!(result.is_failed());
        assert!(result.findings.is_empty());
        let failure = result.error.expect("failure detail");
        assert_eq!(failure.source.kind(), crate::access::ErrorKind::AuthFailure);
    }

    /// Throttles the first `throttle` alert-policy calls, then answers.
    struct ThrottledAlerts {
        throttle: u32,
        calls: std::sync::atomic::AtomicU32,
    }

    #[async_trait::async_trait]
    impl TenantBackend for ThrottledAlerts {
        fn name(&self) -> &str {
            "throttled"
        }

        async fn alert_policies(&self) -> Result<Vec<crate::backend::AlertPolicy>, BackendError> {
            let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            if call <= self.throttle {
                return Err(BackendError::throttled("429 too many requests"));
            }
            Ok(vec![])
        }
    }

    async fn alert_check_with_throttling(throttle: u32) -> (CheckResult, u32) {
        let backend = Arc::new(ThrottledAlerts {
            throttle,
            calls: std::sync::atomic::AtomicU32::new(0),
        });
        let access = AccessLayer::new(
            backend.clone(),
            crate::access::RetryPolicy {
                max_retries: 3,
                base_delay: std::time::Duration::from_secs(2),
                call_timeout: std::time::Duration::from_secs(30),
            },
        );
        let domain = domain_for(DomainName::Alerting);
        let check = domain
            .checks
            .iter()
            .find(|c| c.id == "alerting.policies")
            .expect("alerting.policies in catalog");
        let result = check.run(&access, domain.name).await;
        (result, backend.calls.load(std::sync::atomic::Ordering::SeqCst))
    }

    #[tokio::test(start_paused = true)]
    async fn check_succeeds_when_throttled_max_retries_times() {
        let (result, calls) = alert_check_with_throttling(3).await;
        assert_eq!(calls, 4);
        assert_eq!(result.status, CheckStatus::Succeeded);
        assert!(result.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn check_fails_with_throttled_once_retries_run_out() {
        let (result, calls) = alert_check_with_throttling(4).await;
        assert_eq!(calls, 4);
        assert_eq!(result.status, CheckStatus::Failed);
        assert!(result.findings.is_empty());
        let failure = result.error.expect("failure detail");
        assert_eq!(failure.check_id, "alerting.policies");
        assert_eq!(failure.source.kind(), crate::access::ErrorKind::Throttled);
    }

    #[test]
    fn catalog_covers_every_domain_with_unique_check_ids() {
        let domains = catalog();
        assert_eq!(domains.len(), DomainName::ALL.len());
        let mut seen = HashSet::new();
        for d in &domains {
            assert!(!d.checks.is_empty(), "{} has no checks", d.name);
            for c in &d.checks {
                assert!(seen.insert(c.id), "duplicate check id {}", c.id);
            }
        }
    }

    #[tokio::test]
    async fn empty_export_never_fails_a_check() {
        let access = access_for("{}");
        for domain in catalog() {
            let result = domain.run(&access).await;
            assert_eq!(
                result.failed_check_count, 0,
                "{} failed on an empty export",
                domain.name
            );
        }
    }
}
