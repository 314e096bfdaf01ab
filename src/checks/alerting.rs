use crate::checks::{Check, CheckContext, Domain, Evaluation};
use crate::core::{DomainName, Severity};

pub fn domain() -> Domain {
    Domain::new(
        DomainName::Alerting,
        vec![Check::new(
            "alerting.policies",
            "Security alert policies active",
            |ctx| Box::pin(policies(ctx)),
        )],
    )
}

async fn policies(ctx: CheckContext) -> Evaluation {
    let policies = ctx
        .fetch("alert_policies", |b| async move { b.alert_policies().await })
        .await?;

    let enabled = policies.iter().filter(|p| p.enabled).count();
    if enabled == 0 {
        return Ok(vec![
            ctx.finding(Severity::High, "No alert policies are enabled")
                .description("Suspicious activity such as mass deletion, forwarding rule creation or elevation of privilege raises no alert.")
                .remediation("Enable the default alert policies and route them to a monitored mailbox or SIEM.")
                .compliance(["CIS Controls v8 8.11", "NIST 800-53 SI-4"]),
        ]);
    }

    let silent: Vec<&str> = policies
        .iter()
        .filter(|p| p.enabled && p.notify.is_empty())
        .map(|p| p.name.as_str())
        .collect();
    if silent.is_empty() {
        return Ok(vec![]);
    }
    Ok(vec![
        ctx.finding(
            Severity::Low,
            format!("{} alert policies notify nobody", silent.len()),
        )
        .description(format!(
            "These policies raise alerts that are only visible in the portal: {}.",
            silent.join(", ")
        ))
        .remediation("Add notification recipients so alerts reach someone who will act on them.")
        .compliance(["NIST 800-53 IR-6"]),
    ])
}
