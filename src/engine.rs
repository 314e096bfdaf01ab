use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::access::AccessLayer;
use crate::checks::{Domain, DomainResult};
use crate::core::{
    AssessmentRun, DomainName, Finding, RUN_TRUNCATED_CHECK_ID, RunBuilder, ScoringConfig,
    Severity,
};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Overall run deadline. `None` lets the run take as long as it needs.
    pub deadline: Option<Duration>,
    pub max_concurrent_domains: usize,
    pub scoring: ScoringConfig,
    pub show_progress: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            deadline: Some(Duration::from_secs(300)),
            max_concurrent_domains: 4,
            scoring: ScoringConfig::default(),
            show_progress: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Engine {
    opts: EngineOptions,
    access: AccessLayer,
}

enum Next {
    Joined(Option<Result<(usize, DomainResult), tokio::task::JoinError>>),
    DeadlineReached,
}

impl Engine {
    pub fn new(access: AccessLayer, opts: EngineOptions) -> Self {
        Self { opts, access }
    }

    /// Runs every catalog domain not in `excluded` and freezes the result.
    ///
    /// Domains run on their own tasks, at most `max_concurrent_domains` at a
    /// time. Each task hands back its own [`DomainResult`]; only this function
    /// writes to the run, and it merges in catalog order so the finding order
    /// does not depend on scheduling.
    pub async fn run(&self, catalog: Vec<Domain>, excluded: &[DomainName]) -> AssessmentRun {
        let effective: Vec<Domain> = catalog
            .into_iter()
            .filter(|d| !excluded.contains(&d.name))
            .collect();
        let requested: Vec<DomainName> = effective.iter().map(|d| d.name).collect();
        let mut excluded_sorted: Vec<DomainName> = excluded.to_vec();
        excluded_sorted.sort();
        excluded_sorted.dedup();

        let mut builder = RunBuilder::start(
            requested.clone(),
            excluded_sorted,
            self.opts.scoring.clone(),
        );
        if effective.is_empty() {
            info!("no domains left after exclusions; nothing to assess");
            return builder.freeze();
        }

        info!(
            domains = effective.len(),
            max_concurrent = self.opts.max_concurrent_domains,
            backend = self.access.backend_name(),
            max_retries = self.access.policy().max_retries,
            call_timeout_ms = self.access.policy().call_timeout.as_millis() as u64,
            "assessment started"
        );

        let pb = self.progress_bar(effective.len());
        let permits = Arc::new(Semaphore::new(self.opts.max_concurrent_domains.max(1)));
        let mut tasks = JoinSet::new();
        let mut task_domains: HashMap<tokio::task::Id, usize> = HashMap::new();
        for (idx, domain) in effective.iter().cloned().enumerate() {
            let access = self.access.clone();
            let permits = Arc::clone(&permits);
            let handle = tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                info!(domain = %domain.name, checks = domain.checks.len(), "domain started");
                let result = domain.run(&access).await;
                info!(
                    domain = %domain.name,
                    findings = result.findings.len(),
                    failed_checks = result.failed_check_count,
                    "domain finished"
                );
                (idx, result)
            });
            task_domains.insert(handle.id(), idx);
        }

        let deadline = self.opts.deadline.map(|d| tokio::time::Instant::now() + d);
        let mut completed: Vec<Option<DomainResult>> = vec![None; requested.len()];
        let mut truncated = false;
        loop {
            let next = match deadline {
                Some(at) => tokio::select! {
                    biased;
                    joined = tasks.join_next() => Next::Joined(joined),
                    _ = tokio::time::sleep_until(at) => Next::DeadlineReached,
                },
                None => Next::Joined(tasks.join_next().await),
            };
            match next {
                Next::Joined(None) => break,
                Next::Joined(Some(Ok((idx, result)))) => {
                    if let Some(pb) = &pb {
                        pb.set_message(result.domain.to_string());
                        pb.inc(1);
                    }
                    completed[idx] = Some(result);
                }
                Next::Joined(Some(Err(err))) => {
                    let Some(&idx) = task_domains.get(&err.id()) else {
                        error!(error = %err, "unknown domain task ended abnormally");
                        continue;
                    };
                    let domain = &effective[idx];
                    error!(
                        domain = %domain.name,
                        error = %err,
                        "domain task ended abnormally; its results are lost"
                    );
                    if let Some(pb) = &pb {
                        pb.inc(1);
                    }
                    let reason = if err.is_panic() {
                        "the domain task panicked"
                    } else {
                        "the domain task was cancelled"
                    };
                    completed[idx] = Some(domain.interrupted(reason));
                }
                Next::DeadlineReached => {
                    truncated = true;
                    tasks.abort_all();
                    break;
                }
            }
        }
        if let Some(pb) = pb {
            pb.finish_and_clear();
        }

        let mut abandoned = Vec::new();
        for (name, result) in requested.iter().zip(completed) {
            match result {
                Some(result) => builder.append(result.summary, result.findings),
                None => abandoned.push(*name),
            }
        }

        if truncated && !abandoned.is_empty() {
            warn!(
                abandoned = ?abandoned.iter().map(|d| d.key()).collect::<Vec<_>>(),
                "run deadline exceeded; in-flight domains abandoned"
            );
            builder.mark_truncated(self.truncation_finding(&abandoned));
        }

        let run = builder.freeze();
        info!(
            findings = run.findings().len(),
            risk_score = run.risk_score(),
            risk_band = %run.risk_band(),
            truncated = run.truncated(),
            "assessment finished"
        );
        run
    }

    fn truncation_finding(&self, abandoned: &[DomainName]) -> Finding {
        let names: Vec<String> = abandoned.iter().map(|d| d.to_string()).collect();
        let limit = self
            .opts
            .deadline
            .map(|d| format!("{}s", d.as_secs()))
            .unwrap_or_else(|| "configured".to_string());
        Finding::new(
            abandoned[0],
            RUN_TRUNCATED_CHECK_ID,
            Severity::Info,
            "Assessment run truncated",
        )
        .description(format!(
            "The run exceeded its {limit} deadline. Partial results from these domains were discarded: {}.",
            names.join(", ")
        ))
        .remediation(
            "Raise the run timeout or exclude slow domains, then run the assessment again to cover the abandoned domains.",
        )
    }

    fn progress_bar(&self, domains: usize) -> Option<indicatif::ProgressBar> {
        use std::io::IsTerminal;
        if !self.opts.show_progress || !std::io::stderr().is_terminal() {
            return None;
        }
        let pb = indicatif::ProgressBar::new(domains as u64);
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        let style = indicatif::ProgressStyle::with_template(
            "{spinner} assessing domains {pos}/{len} {wide_msg}",
        )
        .unwrap_or_else(|_| indicatif::ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{BackendError, RetryPolicy};
    use crate::backend::{AlertPolicy, AuditConfig, SnapshotBackend, TenantBackend};
    use crate::checks::catalog;
    use async_trait::async_trait;

    /// Serves the audit config at once and never answers for alert policies.
    struct StalledAlerts;

    #[async_trait]
    impl TenantBackend for StalledAlerts {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn audit_config(&self) -> Result<AuditConfig, BackendError> {
            Ok(AuditConfig {
                unified_audit_log_enabled: false,
                retention_days: 0,
            })
        }

        async fn alert_policies(&self) -> Result<Vec<AlertPolicy>, BackendError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec![])
        }
    }

    /// Serves the audit config and panics when asked for alert policies.
    struct PanickyAlerts;

    #[async_trait]
    impl TenantBackend for PanickyAlerts {
        fn name(&self) -> &str {
            "panicky"
        }

        async fn audit_config(&self) -> Result<AuditConfig, BackendError> {
            Ok(AuditConfig {
                unified_audit_log_enabled: true,
                retention_days: 365,
            })
        }

        async fn alert_policies(&self) -> Result<Vec<AlertPolicy>, BackendError> {
            panic!("alert policy payload could not be decoded");
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 1,
            base_delay: Duration::from_millis(1),
            call_timeout: Duration::from_secs(7200),
        }
    }

    fn engine(backend: Arc<dyn TenantBackend>, opts: EngineOptions) -> Engine {
        Engine::new(AccessLayer::new(backend, policy()), opts)
    }

    fn all_but(keep: &[DomainName]) -> Vec<DomainName> {
        DomainName::ALL
            .into_iter()
            .filter(|d| !keep.contains(d))
            .collect()
    }

    const EXPORT: &str = r#"{
        "identityPolicy": { "securityDefaultsEnabled": false, "legacyAuthBlocked": false, "totalUsers": 10, "mfaRegisteredUsers": 3 },
        "auditConfig": { "unifiedAuditLogEnabled": false, "retentionDays": 90 },
        "sharingSettings": { "externalSharing": "anyone", "teamsOpenFederation": true },
        "roleAssignments": { "error": { "kind": "authFailure", "message": "403 insufficient privileges" } },
        "alertPolicies": []
    }"#;

    #[tokio::test]
    async fn excluding_every_domain_is_an_empty_low_run() {
        let engine = engine(Arc::new(SnapshotBackend::default()), EngineOptions::default());
        let run = engine.run(catalog(), &DomainName::ALL).await;
        assert!(run.findings().is_empty());
        assert!(run.domains_requested().is_empty());
        assert_eq!(run.domains_excluded().len(), DomainName::ALL.len());
        assert_eq!(run.risk_score(), 0);
        assert_eq!(run.risk_band(), crate::core::RiskBand::Low);
        assert!(!run.truncated());
    }

    #[tokio::test]
    async fn concurrent_and_sequential_runs_merge_in_catalog_order() {
        let backend: Arc<dyn TenantBackend> =
            Arc::new(SnapshotBackend::from_json(EXPORT).expect("export"));
        let sequential = engine(
            Arc::clone(&backend),
            EngineOptions {
                max_concurrent_domains: 1,
                ..EngineOptions::default()
            },
        )
        .run(catalog(), &[])
        .await;
        let concurrent = engine(
            backend,
            EngineOptions {
                max_concurrent_domains: 8,
                ..EngineOptions::default()
            },
        )
        .run(catalog(), &[])
        .await;

        let ids = |run: &AssessmentRun| -> Vec<String> {
            run.findings().iter().map(|f| f.check_id.clone()).collect()
        };
        assert_eq!(ids(&sequential), ids(&concurrent));
        assert_eq!(sequential.domains_requested().to_vec(), DomainName::ALL.to_vec());
        assert_eq!(sequential.domain_summaries().len(), DomainName::ALL.len());

        let domains: Vec<DomainName> = sequential.findings().iter().map(|f| f.domain).collect();
        let mut sorted = domains.clone();
        sorted.sort_by_key(|d| DomainName::ALL.iter().position(|x| x == d));
        assert_eq!(domains, sorted);
    }

    #[tokio::test]
    async fn failed_checks_surface_as_incomplete_finding() {
        let backend = Arc::new(SnapshotBackend::from_json(EXPORT).unwrap());
        let run = engine(backend, EngineOptions::default())
            .run(catalog(), &all_but(&[DomainName::PrivilegedRoles]))
            .await;
        assert_eq!(run.failed_check_count(), 2);
        assert_eq!(run.findings().len(), 1);
        assert_eq!(run.findings()[0].check_id, "privileged-roles.assessment-incomplete");
        assert_eq!(run.findings()[0].severity, Severity::Info);
        assert!(!run.truncated());
    }

    #[tokio::test]
    async fn panicked_domain_is_reported_as_incomplete() {
        let run = engine(Arc::new(PanickyAlerts), EngineOptions::default())
            .run(
                catalog(),
                &all_but(&[DomainName::Compliance, DomainName::Alerting]),
            )
            .await;

        assert_eq!(
            run.domains_requested().to_vec(),
            vec![DomainName::Compliance, DomainName::Alerting]
        );
        let summaries: Vec<DomainName> =
            run.domain_summaries().iter().map(|s| s.domain).collect();
        assert_eq!(summaries, vec![DomainName::Compliance, DomainName::Alerting]);
        assert_eq!(
            run.domain_summaries()[1].failed_checks,
            vec!["alerting.policies".to_string()]
        );
        assert_eq!(run.failed_check_count(), 1);
        assert!(!run.truncated());

        let alerting: Vec<&Finding> = run
            .findings()
            .iter()
            .filter(|f| f.domain == DomainName::Alerting)
            .collect();
        assert_eq!(alerting.len(), 1);
        assert_eq!(alerting[0].check_id, "alerting.assessment-incomplete");
        assert_eq!(alerting[0].severity, Severity::Info);
        assert!(alerting[0].description.contains("panicked"));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_abandons_in_flight_domains() {
        let run = engine(
            Arc::new(StalledAlerts),
            EngineOptions {
                deadline: Some(Duration::from_secs(60)),
                ..EngineOptions::default()
            },
        )
        .run(
            catalog(),
            &all_but(&[DomainName::Compliance, DomainName::Alerting]),
        )
        .await;

        assert!(run.truncated());
        assert!(!run.truncated_without_findings());
        assert_eq!(run.domain_summaries().len(), 1);
        assert_eq!(run.domain_summaries()[0].domain, DomainName::Compliance);

        let ids: Vec<&str> = run.findings().iter().map(|f| f.check_id.as_str()).collect();
        assert_eq!(ids, vec!["compliance.audit-log", RUN_TRUNCATED_CHECK_ID]);
        let annotation = &run.findings()[1];
        assert_eq!(annotation.domain, DomainName::Alerting);
        assert_eq!(annotation.severity, Severity::Info);
        assert!(annotation.description.contains("Alerting"));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_with_nothing_gathered_is_detectable() {
        let run = engine(
            Arc::new(StalledAlerts),
            EngineOptions {
                deadline: Some(Duration::from_secs(5)),
                ..EngineOptions::default()
            },
        )
        .run(catalog(), &all_but(&[DomainName::Alerting]))
        .await;
        assert!(run.truncated());
        assert!(run.truncated_without_findings());
        assert_eq!(run.findings().len(), 1);
    }
}
