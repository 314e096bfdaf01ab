use crate::backend::DmarcPolicy;
use crate::checks::{Check, CheckContext, Domain, Evaluation};
use crate::core::{DomainName, Severity};

pub fn domain() -> Domain {
    Domain::new(
        DomainName::EmailSecurity,
        vec![
            Check::new("email.transport-rules", "Risky mail flow rules", |ctx| {
                Box::pin(transport_rules(ctx))
            }),
            Check::new(
                "email.external-forwarding",
                "Automatic external forwarding blocked",
                |ctx| Box::pin(external_forwarding(ctx)),
            ),
            Check::new(
                "email.authentication-records",
                "SPF, DKIM and DMARC published",
                |ctx| Box::pin(authentication_records(ctx)),
            ),
        ],
    )
}

async fn transport_rules(ctx: CheckContext) -> Evaluation {
    let rules = ctx
        .fetch("transport_rules", |b| async move { b.transport_rules().await })
        .await?;

    let mut findings = Vec::new();
    let redirecting: Vec<&str> = rules
        .iter()
        .filter(|r| r.enabled && r.redirects_externally)
        .map(|r| r.name.as_str())
        .collect();
    if !redirecting.is_empty() {
        findings.push(
            ctx.finding(Severity::High, "Mail flow rules redirect mail to external recipients")
                .description(format!(
                    "Enabled rules that copy or redirect messages outside the organisation: {}. Attackers create such rules to exfiltrate mail silently.",
                    redirecting.join(", ")
                ))
                .remediation("Confirm each rule has a business owner and remove any that were not created through change control.")
                .compliance(["CIS Controls v8 3.3", "NIST 800-53 SC-7"]),
        );
    }

    let bypassing: Vec<&str> = rules
        .iter()
        .filter(|r| r.enabled && r.bypasses_spam_filtering)
        .map(|r| r.name.as_str())
        .collect();
    if !bypassing.is_empty() {
        findings.push(
            ctx.finding(Severity::Medium, "Mail flow rules bypass spam filtering")
                .description(format!(
                    "Rules that set the spam confidence level to -1: {}.",
                    bypassing.join(", ")
                ))
                .remediation("Replace spam filter bypass rules with tenant allow list entries scoped to authenticated senders.")
                .compliance(["NIST 800-53 SI-8"]),
        );
    }
    Ok(findings)
}

async fn external_forwarding(ctx: CheckContext) -> Evaluation {
    let forwarding = ctx
        .fetch("mail_forwarding", |b| async move { b.mail_forwarding().await })
        .await?;

    let mut findings = Vec::new();
    if forwarding.external_forwarding_allowed {
        findings.push(
            ctx.finding(Severity::High, "Automatic forwarding to external domains is allowed")
                .description("The outbound spam policy permits mailboxes to auto-forward to any external address.")
                .remediation("Set automatic forwarding to Off in the outbound spam filter policy and allow exceptions per mailbox only.")
                .compliance(["CIS Controls v8 3.3", "NIST 800-53 AC-4"])
                .reference("https://learn.microsoft.com/en-us/defender-office-365/outbound-spam-policies-external-email-forwarding"),
        );
    }
    if !forwarding.external_forwarding_mailboxes.is_empty() {
        findings.push(
            ctx.finding(
                Severity::Medium,
                format!(
                    "{} mailboxes forward mail externally",
                    forwarding.external_forwarding_mailboxes.len()
                ),
            )
            .description(format!(
                "Mailboxes with external forwarding configured: {}.",
                forwarding.external_forwarding_mailboxes.join(", ")
            ))
            .remediation("Review each forwarding target with the mailbox owner and remove any that are not required."),
        );
    }
    Ok(findings)
}

async fn authentication_records(ctx: CheckContext) -> Evaluation {
    let records = ctx
        .fetch("email_auth_records", |b| async move { b.email_auth_records().await })
        .await?;

    let mut findings = Vec::new();
    for record in &records {
        let mut gaps = Vec::new();
        if !record.spf_present {
            gaps.push("no SPF record");
        }
        if !record.dkim_enabled {
            gaps.push("DKIM signing disabled");
        }
        let severity = match record.dmarc_policy {
            None => {
                gaps.push("no DMARC record");
                Severity::High
            }
            Some(DmarcPolicy::None) => {
                gaps.push("DMARC policy is p=none");
                Severity::Medium
            }
            Some(_) if !record.spf_present || !record.dkim_enabled => Severity::Medium,
            Some(_) => continue,
        };
        findings.push(
            ctx.finding(
                severity,
                format!("Email authentication incomplete for {}", record.domain),
            )
            .description(format!("{}: {}.", record.domain, gaps.join(", ")))
            .remediation("Publish SPF, enable DKIM signing and move DMARC to quarantine or reject once reports show legitimate senders aligned.")
            .compliance(["CIS Controls v8 9.5", "NIST 800-53 SC-8"]),
        );
    }
    Ok(findings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testing::{run_check, titles};

    #[tokio::test]
    async fn disabled_rules_are_ignored() {
        let export = r#"{
            "transportRules": [
                { "name": "copy-to-gmail", "enabled": false, "redirectsExternally": true },
                { "name": "vendor-allow", "enabled": true, "bypassesSpamFiltering": true }
            ]
        }"#;
        let result = run_check(&domain(), "email.transport-rules", export).await;
        assert_eq!(
            titles(&result),
            vec![(Severity::Medium, "Mail flow rules bypass spam filtering".to_string())]
        );
    }

    #[tokio::test]
    async fn dmarc_grading_per_domain() {
        let export = r#"{
            "emailAuthRecords": [
                { "domain": "contoso.com", "spfPresent": true, "dkimEnabled": true, "dmarcPolicy": "reject" },
                { "domain": "fabrikam.com", "spfPresent": true, "dkimEnabled": false },
                { "domain": "tailspin.com", "spfPresent": true, "dkimEnabled": true, "dmarcPolicy": "none" }
            ]
        }"#;
        let result = run_check(&domain(), "email.authentication-records", export).await;
        assert_eq!(result.findings.len(), 2);
        assert_eq!(result.findings[0].severity, Severity::High);
        assert!(result.findings[0].title.ends_with("fabrikam.com"));
        assert!(result.findings[0].description.contains("DKIM signing disabled"));
        assert_eq!(result.findings[1].severity, Severity::Medium);
    }

    #[tokio::test]
    async fn forwarding_policy_and_mailboxes_reported_separately() {
        let export = r#"{
            "mailForwarding": { "externalForwardingAllowed": true, "externalForwardingMailboxes": ["ceo@contoso.com"] }
        }"#;
        let result = run_check(&domain(), "email.external-forwarding", export).await;
        assert_eq!(result.findings.len(), 2);
        assert!(result.findings[1].description.contains("ceo@contoso.com"));
    }
}
