use time::Duration;

use crate::checks::{Check, CheckContext, Domain, Evaluation};
use crate::core::{DomainName, Severity};

const EXPIRY_WARNING_DAYS: i64 = 30;

pub fn domain() -> Domain {
    Domain::new(
        DomainName::AppRegistration,
        vec![
            Check::new(
                "apps.credential-expiry",
                "Application credentials current",
                |ctx| Box::pin(credential_expiry(ctx)),
            ),
            Check::new(
                "apps.high-privilege",
                "High-privilege application permissions",
                |ctx| Box::pin(high_privilege(ctx)),
            ),
            Check::new("apps.user-consent", "User consent to applications", |ctx| {
                Box::pin(user_consent(ctx))
            }),
        ],
    )
}

async fn credential_expiry(ctx: CheckContext) -> Evaluation {
    let apps = ctx
        .fetch("app_registrations", |b| async move { b.app_registrations().await })
        .await?;

    let horizon = ctx.now + Duration::days(EXPIRY_WARNING_DAYS);
    let mut expired = Vec::new();
    let mut expiring = Vec::new();
    for app in &apps {
        if app.credentials.iter().any(|c| c.expires_at <= ctx.now) {
            expired.push(app.display_name.as_str());
        } else if app.credentials.iter().any(|c| c.expires_at <= horizon) {
            expiring.push(app.display_name.as_str());
        }
    }

    let mut findings = Vec::new();
    if !expired.is_empty() {
        findings.push(
            ctx.finding(
                Severity::Low,
                format!("{} applications have expired credentials", expired.len()),
            )
            .description(format!(
                "Expired secrets or certificates left on registrations: {}.",
                expired.join(", ")
            ))
            .remediation("Remove expired credentials and confirm the applications are still in use.")
            .compliance(["NIST 800-53 IA-5"]),
        );
    }
    if !expiring.is_empty() {
        findings.push(
            ctx.finding(
                Severity::Info,
                format!(
                    "{} application credentials expire within {EXPIRY_WARNING_DAYS} days",
                    expiring.len()
                ),
            )
            .description(format!("Applications affected: {}.", expiring.join(", ")))
            .remediation("Rotate these credentials before they expire, preferring certificates or managed identities over client secrets."),
        );
    }
    Ok(findings)
}

async fn high_privilege(ctx: CheckContext) -> Evaluation {
    let apps = ctx
        .fetch("app_registrations", |b| async move { b.app_registrations().await })
        .await?;

    let privileged: Vec<String> = apps
        .iter()
        .filter(|a| !a.high_privilege_permissions.is_empty())
        .map(|a| {
            format!(
                "{} ({})",
                a.display_name,
                a.high_privilege_permissions.join(", ")
            )
        })
        .collect();
    if privileged.is_empty() {
        return Ok(vec![]);
    }

    Ok(vec![
        ctx.finding(
            Severity::High,
            format!(
                "{} applications hold tenant-wide high-privilege permissions",
                privileged.len()
            ),
        )
        .description(format!(
            "Application permissions such as full mailbox or directory write access let a compromised app credential act on the whole tenant: {}.",
            privileged.join("; ")
        ))
        .remediation("Review each grant, replace application permissions with narrower or resource-scoped permissions, and remove unused applications.")
        .compliance(["CIS Controls v8 5.4", "NIST 800-53 AC-6"]),
    ])
}

async fn user_consent(ctx: CheckContext) -> Evaluation {
    let consent = ctx
        .fetch("consent_settings", |b| async move { b.consent_settings().await })
        .await?;
    if !consent.users_can_consent {
        return Ok(vec![]);
    }
    Ok(vec![
        ctx.finding(Severity::Medium, "Users can consent to third-party applications")
            .description("Any user can grant an external application access to their data, which is the entry point for consent phishing.")
            .remediation("Disable user consent or restrict it to verified publishers and low-risk permissions, and enable the admin consent workflow.")
            .compliance(["CIS Controls v8 2.5", "NIST 800-53 CM-11"]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testing::run_check;

    #[tokio::test]
    async fn classifies_expired_and_expiring_credentials() {
        let export = r#"{
            "appRegistrations": [
                { "displayName": "legacy-sync", "credentials": [ { "kind": "secret", "expiresAt": "2001-01-01T00:00:00Z" } ] },
                { "displayName": "future-app", "credentials": [ { "kind": "certificate", "expiresAt": "2999-01-01T00:00:00Z" } ] }
            ]
        }"#;
        let result = run_check(&domain(), "apps.credential-expiry", export).await;
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].severity, Severity::Low);
        assert!(result.findings[0].description.contains("legacy-sync"));
    }

    #[tokio::test]
    async fn high_privilege_permissions_are_listed() {
        let export = r#"{
            "appRegistrations": [
                { "displayName": "mailer", "highPrivilegePermissions": ["Mail.ReadWrite"] },
                { "displayName": "reader" }
            ]
        }"#;
        let result = run_check(&domain(), "apps.high-privilege", export).await;
        assert_eq!(result.findings.len(), 1);
        assert!(result.findings[0].description.contains("mailer (Mail.ReadWrite)"));
        assert!(!result.findings[0].description.contains("reader"));
    }
}
