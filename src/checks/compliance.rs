use crate::checks::{Check, CheckContext, Domain, Evaluation};
use crate::core::{DomainName, Severity};

const MIN_AUDIT_RETENTION_DAYS: u32 = 90;

pub fn domain() -> Domain {
    Domain::new(
        DomainName::Compliance,
        vec![
            Check::new("compliance.audit-log", "Unified audit logging", |ctx| {
                Box::pin(audit_log(ctx))
            }),
            Check::new(
                "compliance.retention-policies",
                "Retention policies in place",
                |ctx| Box::pin(retention_policies(ctx)),
            ),
        ],
    )
}

async fn audit_log(ctx: CheckContext) -> Evaluation {
    let audit = ctx
        .fetch("audit_config", |b| async move { b.audit_config().await })
        .await?;

    if !audit.unified_audit_log_enabled {
        return Ok(vec![
            ctx.finding(Severity::Critical, "Unified audit logging is disabled")
                .description("User and administrator activity is not recorded, so incidents cannot be investigated after the fact.")
                .remediation("Turn on audit log search in the compliance portal.")
                .compliance(["CIS Controls v8 8.2", "NIST 800-53 AU-2", "NIST 800-53 AU-12"])
                .reference("https://learn.microsoft.com/en-us/purview/audit-log-enable-disable"),
        ]);
    }

    if audit.retention_days < MIN_AUDIT_RETENTION_DAYS {
        return Ok(vec![
            ctx.finding(
                Severity::Medium,
                format!("Audit logs are kept for only {} days", audit.retention_days),
            )
            .description(format!(
                "Audit records are retained for less than {MIN_AUDIT_RETENTION_DAYS} days, shorter than typical breach discovery times."
            ))
            .remediation("Create an audit retention policy of at least 90 days, or export audit logs to a SIEM with longer retention.")
            .compliance(["CIS Controls v8 8.10", "NIST 800-53 AU-11"]),
        ]);
    }

    Ok(vec![])
}

async fn retention_policies(ctx: CheckContext) -> Evaluation {
    let policies = ctx
        .fetch("retention_policies", |b| async move { b.retention_policies().await })
        .await?;
    if policies.iter().any(|p| p.enabled) {
        return Ok(vec![]);
    }
    Ok(vec![
        ctx.finding(Severity::Low, "No retention policies are enabled")
            .description("Mail and documents can be permanently deleted by users before any legal or regulatory hold applies.")
            .remediation("Define retention policies for Exchange, SharePoint and OneDrive that match the organisation's record-keeping obligations.")
            .compliance(["NIST 800-53 AU-11", "NIST 800-53 SI-12"]),
    ])
}
