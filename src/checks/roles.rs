use std::collections::BTreeSet;

use crate::checks::{Check, CheckContext, Domain, Evaluation};
use crate::core::{DomainName, Severity};

const GLOBAL_ADMIN: &str = "Global Administrator";
const MIN_GLOBAL_ADMINS: usize = 2;
const MAX_GLOBAL_ADMINS: usize = 4;

pub fn domain() -> Domain {
    Domain::new(
        DomainName::PrivilegedRoles,
        vec![
            Check::new(
                "roles.global-admin-count",
                "Global administrator count",
                |ctx| Box::pin(global_admin_count(ctx)),
            ),
            Check::new(
                "roles.permanent-assignments",
                "Standing privileged access",
                |ctx| Box::pin(permanent_assignments(ctx)),
            ),
        ],
    )
}

async fn global_admin_count(ctx: CheckContext) -> Evaluation {
    let assignments = ctx
        .fetch("role_assignments", |b| async move { b.role_assignments().await })
        .await?;

    let admins: BTreeSet<&str> = assignments
        .iter()
        .filter(|a| a.role.eq_ignore_ascii_case(GLOBAL_ADMIN))
        .map(|a| a.principal.as_str())
        .collect();
    let count = admins.len();

    let finding = if count > MAX_GLOBAL_ADMINS {
        ctx.finding(Severity::High, format!("{count} accounts hold Global Administrator"))
            .description(format!(
                "More than {MAX_GLOBAL_ADMINS} global administrators widens the set of accounts whose compromise gives full tenant control."
            ))
            .remediation("Move administrators to least-privileged roles such as User, Exchange or Security Administrator and keep two to four global administrators including break-glass accounts.")
    } else if count < MIN_GLOBAL_ADMINS {
        ctx.finding(Severity::Medium, format!("Only {count} Global Administrator account"))
            .description("A single global administrator leaves no way to recover the tenant if that account is lost or locked out.")
            .remediation("Create a second, cloud-only emergency access account excluded from conditional access and store its credentials offline.")
    } else {
        return Ok(vec![]);
    };
    Ok(vec![
        finding
            .compliance(["CIS Controls v8 5.4", "NIST 800-53 AC-6(5)"])
            .reference("https://learn.microsoft.com/en-us/entra/identity/role-based-access-control/best-practices"),
    ])
}

async fn permanent_assignments(ctx: CheckContext) -> Evaluation {
    let assignments = ctx
        .fetch("role_assignments", |b| async move { b.role_assignments().await })
        .await?;

    let permanent: Vec<String> = assignments
        .iter()
        .filter(|a| a.permanent)
        .map(|a| format!("{} ({})", a.principal, a.role))
        .collect();
    if permanent.is_empty() {
        return Ok(vec![]);
    }
    Ok(vec![
        ctx.finding(
            Severity::Medium,
            format!("{} privileged role assignments are permanent", permanent.len()),
        )
        .description(format!(
            "Standing assignments stay active without just-in-time activation: {}.",
            permanent.join(", ")
        ))
        .remediation("Convert permanent assignments to eligible ones with privileged identity management and require approval or MFA on activation.")
        .compliance(["CIS Controls v8 6.8", "NIST 800-53 AC-2(7)"]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testing::run_check;

    fn export(admins: usize) -> String {
        let rows: Vec<String> = (0..admins)
            .map(|i| {
                format!(
                    r#"{{ "role": "Global Administrator", "principal": "admin{i}@contoso.com", "permanent": false }}"#
                )
            })
            .collect();
        format!(r#"{{ "roleAssignments": [{}] }}"#, rows.join(","))
    }

    #[tokio::test]
    async fn admin_count_outside_range() {
        let d = domain();
        let many = run_check(&d, "roles.global-admin-count", &export(6)).await;
        assert_eq!(many.findings[0].severity, Severity::High);

        let one = run_check(&d, "roles.global-admin-count", &export(1)).await;
        assert_eq!(one.findings[0].severity, Severity::Medium);

        let ok = run_check(&d, "roles.global-admin-count", &export(3)).await;
        assert!(ok.findings.is_empty());
    }

    #[tokio::test]
    async fn permanent_assignments_listed() {
        let export = r#"{
            "roleAssignments": [
                { "role": "Exchange Administrator", "principal": "ops@contoso.com", "permanent": true },
                { "role": "Global Administrator", "principal": "ga@contoso.com", "permanent": false }
            ]
        }"#;
        let result = run_check(&domain(), "roles.permanent-assignments", export).await;
        assert_eq!(result.findings.len(), 1);
        assert!(result.findings[0].description.contains("ops@contoso.com (Exchange Administrator)"));
    }
}
