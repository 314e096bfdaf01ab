use crate::backend::{GuestAccessLevel, PolicyState};
use crate::checks::{Check, CheckContext, Domain, Evaluation};
use crate::core::{DomainName, Severity};

pub fn domain() -> Domain {
    Domain::new(
        DomainName::IdentityAccess,
        vec![
            Check::new(
                "identity.mfa-enforcement",
                "Strong authentication enforced tenant-wide",
                |ctx| Box::pin(mfa_enforcement(ctx)),
            ),
            Check::new(
                "identity.legacy-auth",
                "Legacy authentication blocked",
                |ctx| Box::pin(legacy_auth(ctx)),
            ),
            Check::new(
                "identity.mfa-registration",
                "Users registered for MFA",
                |ctx| Box::pin(mfa_registration(ctx)),
            ),
            Check::new(
                "identity.password-expiry",
                "Password expiration policy",
                |ctx| Box::pin(password_expiry(ctx)),
            ),
            Check::new(
                "identity.guest-access",
                "Guest user access restrictions",
                |ctx| Box::pin(guest_access(ctx)),
            ),
        ],
    )
}

async fn mfa_enforcement(ctx: CheckContext) -> Evaluation {
    let identity = ctx
        .fetch("identity_policy", |b| async move { b.identity_policy().await })
        .await?;
    if identity.security_defaults_enabled {
        return Ok(vec![]);
    }

    let policies = ctx
        .fetch_optional("conditional_access_policies", |b| async move {
            b.conditional_access_policies().await
        })
        .await?
        .unwrap_or_default();

    let enforcing = policies
        .iter()
        .any(|p| p.state == PolicyState::Enabled && p.requires_mfa && p.targets_all_users);
    if enforcing {
        return Ok(vec![]);
    }

    let report_only: Vec<&str> = policies
        .iter()
        .filter(|p| p.state == PolicyState::ReportOnly && p.requires_mfa)
        .map(|p| p.name.as_str())
        .collect();

    let mut description = "Neither security defaults nor an enabled conditional access policy requires multi-factor authentication for all users.".to_string();
    if !report_only.is_empty() {
        description.push_str(&format!(
            " Policies in report-only mode that would require MFA: {}.",
            report_only.join(", ")
        ));
    }

    Ok(vec![
        ctx.finding(Severity::Critical, "MFA is not enforced for all users")
            .description(description)
            .remediation("Enable security defaults, or create a conditional access policy that targets all users and requires multi-factor authentication for every cloud app.")
            .compliance(["CIS Controls v8 6.3", "CIS Controls v8 6.5", "NIST 800-53 IA-2(1)"])
            .reference("https://learn.microsoft.com/en-us/entra/fundamentals/security-defaults"),
    ])
}

async fn legacy_auth(ctx: CheckContext) -> Evaluation {
    let identity = ctx
        .fetch("identity_policy", |b| async move { b.identity_policy().await })
        .await?;
    if identity.legacy_auth_blocked || identity.security_defaults_enabled {
        return Ok(vec![]);
    }

    let policies = ctx
        .fetch_optional("conditional_access_policies", |b| async move {
            b.conditional_access_policies().await
        })
        .await?
        .unwrap_or_default();
    if policies
        .iter()
        .any(|p| p.state == PolicyState::Enabled && p.blocks_legacy_auth)
    {
        return Ok(vec![]);
    }

    Ok(vec![
        ctx.finding(Severity::High, "Legacy authentication is allowed")
            .description("Legacy protocols (basic authentication over IMAP, POP, SMTP AUTH and older Office clients) cannot perform MFA and remain open to password spray attacks.")
            .remediation("Block legacy authentication with a conditional access policy targeting all users and the 'Other clients' and 'Exchange ActiveSync' client app conditions.")
            .compliance(["CIS Controls v8 4.8", "NIST 800-53 IA-2"])
            .reference("https://learn.microsoft.com/en-us/entra/identity/conditional-access/block-legacy-authentication"),
    ])
}

async fn mfa_registration(ctx: CheckContext) -> Evaluation {
    let identity = ctx
        .fetch("identity_policy", |b| async move { b.identity_policy().await })
        .await?;
    if identity.total_users == 0 {
        return Ok(vec![]);
    }

    let unregistered = identity
        .total_users
        .saturating_sub(identity.mfa_registered_users);
    if unregistered == 0 {
        return Ok(vec![]);
    }

    let pct = f64::from(identity.mfa_registered_users) * 100.0 / f64::from(identity.total_users);
    let severity = if pct < 50.0 {
        Severity::High
    } else if pct < 90.0 {
        Severity::Medium
    } else {
        Severity::Low
    };

    Ok(vec![
        ctx.finding(severity, format!("{unregistered} users are not registered for MFA"))
            .description(format!(
                "{} of {} users ({pct:.1}%) have registered an MFA method. Unregistered users can be enrolled by whoever first signs in with their password.",
                identity.mfa_registered_users, identity.total_users
            ))
            .remediation("Enable the authentication methods registration campaign and require MFA registration at next sign-in for unregistered users.")
            .compliance(["CIS Controls v8 6.3", "NIST 800-53 IA-2(1)"]),
    ])
}

async fn password_expiry(ctx: CheckContext) -> Evaluation {
    let identity = ctx
        .fetch("identity_policy", |b| async move { b.identity_policy().await })
        .await?;
    if identity.non_expiring_password_users == 0 {
        return Ok(vec![]);
    }

    Ok(vec![
        ctx.finding(
            Severity::Low,
            format!(
                "{} accounts have non-expiring passwords",
                identity.non_expiring_password_users
            ),
        )
        .description("Accounts with passwords that never expire are acceptable only when MFA protects them; otherwise a leaked password stays valid indefinitely.")
        .remediation("Require MFA for these accounts, or review whether service accounts can move to workload identities.")
        .compliance(["CIS Controls v8 5.2", "NIST 800-53 IA-5"]),
    ])
}

async fn guest_access(ctx: CheckContext) -> Evaluation {
    let Some(guests) = ctx
        .fetch_optional("guest_settings", |b| async move { b.guest_settings().await })
        .await?
    else {
        return Ok(vec![
            ctx.finding(Severity::Info, "Guest access settings could not be read")
                .description("The directory did not return external collaboration settings; guest access restrictions were not evaluated.")
                .remediation("Review External Identities > External collaboration settings manually."),
        ]);
    };

    let mut findings = Vec::new();
    if guests.access_level == GuestAccessLevel::SameAsMembers {
        findings.push(
            ctx.finding(Severity::Medium, "Guests have the same directory access as members")
                .description(format!(
                    "Guest users ({} in the tenant) can enumerate users, groups and applications like full members.",
                    guests.guest_count
                ))
                .remediation("Set guest user access to 'Guest users have limited access to properties and memberships of directory objects' or stricter.")
                .compliance(["CIS Controls v8 3.3", "NIST 800-53 AC-3"]),
        );
    }
    if !guests.invitations_restricted {
        findings.push(
            ctx.finding(Severity::Low, "Any user can invite guests")
                .description("Guest invitations are not restricted to administrators or a designated role.")
                .remediation("Limit guest invitations to users assigned to specific admin roles.")
                .compliance(["NIST 800-53 AC-2"]),
        );
    }
    Ok(findings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testing::{run_check, titles};
    use crate::core::CheckStatus;

    #[tokio::test]
    async fn security_defaults_satisfy_mfa_enforcement() {
        let export = r#"{
            "identityPolicy": { "securityDefaultsEnabled": true, "legacyAuthBlocked": false, "totalUsers": 10, "mfaRegisteredUsers": 10 }
        }"#;
        let result = run_check(&domain(), "identity.mfa-enforcement", export).await;
        assert_eq!(result.status, CheckStatus::Succeeded);
        assert!(result.findings.is_empty());
    }

    #[tokio::test]
    async fn report_only_policy_still_raises_critical() {
        let export = r#"{
            "identityPolicy": { "securityDefaultsEnabled": false, "legacyAuthBlocked": true, "totalUsers": 10, "mfaRegisteredUsers": 10 },
            "conditionalAccessPolicies": [
                { "name": "Require MFA", "state": "reportOnly", "requiresMfa": true, "targetsAllUsers": true }
            ]
        }"#;
        let result = run_check(&domain(), "identity.mfa-enforcement", export).await;
        assert_eq!(
            titles(&result),
            vec![(Severity::Critical, "MFA is not enforced for all users".to_string())]
        );
        assert!(result.findings[0].description.contains("Require MFA"));
        assert!(!result.findings[0].compliance_refs.is_empty());
    }

    #[tokio::test]
    async fn non_expiring_passwords_are_counted() {
        let export = r#"{
            "identityPolicy": { "securityDefaultsEnabled": true, "legacyAuthBlocked": true, "totalUsers": 10, "mfaRegisteredUsers": 10, "nonExpiringPasswordUsers": 3 }
        }"#;
        let result = run_check(&domain(), "identity.password-expiry", export).await;
        assert_eq!(
            titles(&result),
            vec![(Severity::Low, "3 accounts have non-expiring passwords".to_string())]
        );
    }

    #[tokio::test]
    async fn mfa_registration_severity_scales_with_coverage() {
        let export = r#"{
            "identityPolicy": { "securityDefaultsEnabled": true, "legacyAuthBlocked": true, "totalUsers": 100, "mfaRegisteredUsers": 40 }
        }"#;
        let result = run_check(&domain(), "identity.mfa-registration", export).await;
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.findings[0].severity, Severity::High);
        assert_eq!(result.findings[0].title, "60 users are not registered for MFA");
    }

    #[tokio::test]
    async fn missing_guest_settings_yield_info() {
        let result = run_check(&domain(), "identity.guest-access", "{}").await;
        assert_eq!(result.status, CheckStatus::Succeeded);
        assert_eq!(result.findings[0].severity, Severity::Info);
    }

    #[tokio::test]
    async fn missing_identity_policy_is_a_warning() {
        let result = run_check(&domain(), "identity.legacy-auth", "{}").await;
        assert_eq!(result.status, CheckStatus::SucceededWithWarning);
        assert!(result.findings.is_empty());
    }
}
