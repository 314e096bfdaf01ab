use crate::backend::ThreatPolicies;
use crate::checks::{Check, CheckContext, Domain, Evaluation, Interrupted};
use crate::core::{DomainName, Finding, Severity};

pub fn domain() -> Domain {
    Domain::new(
        DomainName::ThreatProtection,
        vec![
            Check::new("threat.safe-links", "Safe Links enabled", |ctx| {
                Box::pin(safe_links(ctx))
            }),
            Check::new(
                "threat.safe-attachments",
                "Safe Attachments enabled",
                |ctx| Box::pin(safe_attachments(ctx)),
            ),
            Check::new(
                "threat.anti-phishing",
                "Impersonation protection enabled",
                |ctx| Box::pin(anti_phishing(ctx)),
            ),
            Check::new(
                "threat.zero-hour-purge",
                "Zero-hour auto purge enabled",
                |ctx| Box::pin(zero_hour_purge(ctx)),
            ),
        ],
    )
}

/// Threat policies are a licensed add-on; absence becomes one Info finding.
async fn policies(ctx: &CheckContext) -> Result<Result<ThreatPolicies, Finding>, Interrupted> {
    let policies = ctx
        .fetch_optional("threat_policies", |b| async move { b.threat_policies().await })
        .await?;
    Ok(policies.ok_or_else(|| {
        ctx.finding(Severity::Info, "Advanced threat protection is not licensed")
            .description("The tenant returned no threat protection policies, which usually means the add-on is not licensed. Link and attachment detonation are unavailable.")
            .remediation("Evaluate licensing advanced threat protection, or compensate with stricter transport rules and attachment type filtering.")
    }))
}

async fn safe_links(ctx: CheckContext) -> Evaluation {
    let policies = match policies(&ctx).await? {
        Ok(p) => p,
        Err(info) => return Ok(vec![info]),
    };
    if policies.safe_links_enabled {
        return Ok(vec![]);
    }
    Ok(vec![
        ctx.finding(Severity::High, "Safe Links is not enabled")
            .description("URLs in email and Office documents are not rewritten or checked at click time.")
            .remediation("Create a Safe Links policy covering all recipients, or enable the built-in protection preset.")
            .compliance(["CIS Controls v8 9.3", "NIST 800-53 SI-3"])
            .reference("https://learn.microsoft.com/en-us/defender-office-365/safe-links-about"),
    ])
}

async fn safe_attachments(ctx: CheckContext) -> Evaluation {
    let policies = match policies(&ctx).await? {
        Ok(p) => p,
        Err(_) => return Ok(vec![]),
    };
    if policies.safe_attachments_enabled {
        return Ok(vec![]);
    }
    Ok(vec![
        ctx.finding(Severity::High, "Safe Attachments is not enabled")
            .description("Attachments are delivered without sandbox detonation.")
            .remediation("Create a Safe Attachments policy in Block mode for all recipients.")
            .compliance(["CIS Controls v8 9.7", "NIST 800-53 SI-3"])
            .reference("https://learn.microsoft.com/en-us/defender-office-365/safe-attachments-about"),
    ])
}

async fn anti_phishing(ctx: CheckContext) -> Evaluation {
    let policies = match policies(&ctx).await? {
        Ok(p) => p,
        Err(_) => return Ok(vec![]),
    };
    if policies.impersonation_protection_enabled {
        return Ok(vec![]);
    }
    Ok(vec![
        ctx.finding(Severity::Medium, "Impersonation protection is not configured")
            .description("Anti-phishing policies do not protect executives or owned domains against impersonation.")
            .remediation("Enable user and domain impersonation protection and mailbox intelligence in the anti-phishing policy.")
            .compliance(["CIS Controls v8 9.2", "NIST 800-53 SI-8"]),
    ])
}

async fn zero_hour_purge(ctx: CheckContext) -> Evaluation {
    let policies = match policies(&ctx).await? {
        Ok(p) => p,
        Err(_) => return Ok(vec![]),
    };
    if policies.zero_hour_purge_enabled {
        return Ok(vec![]);
    }
    Ok(vec![
        ctx.finding(Severity::Medium, "Zero-hour auto purge is disabled")
            .description("Messages later identified as malware or phishing stay in user mailboxes.")
            .remediation("Enable zero-hour auto purge for malware and phishing in the anti-malware and anti-spam policies.")
            .compliance(["NIST 800-53 SI-3"]),
    ])
}
