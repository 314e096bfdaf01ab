use crate::backend::DlpMode;
use crate::checks::{Check, CheckContext, Domain, Evaluation};
use crate::core::{DomainName, Severity};

pub fn domain() -> Domain {
    Domain::new(
        DomainName::DataProtection,
        vec![
            Check::new("data.dlp-policies", "DLP policies enforced", |ctx| {
                Box::pin(dlp_policies(ctx))
            }),
            Check::new(
                "data.sensitivity-labels",
                "Sensitivity labels published",
                |ctx| Box::pin(sensitivity_labels(ctx)),
            ),
        ],
    )
}

async fn dlp_policies(ctx: CheckContext) -> Evaluation {
    let Some(policies) = ctx
        .fetch_optional("dlp_policies", |b| async move { b.dlp_policies().await })
        .await?
    else {
        return Ok(vec![
            ctx.finding(Severity::Info, "Data loss prevention is not available")
                .description("No DLP policy service answered for this tenant; the feature is likely not licensed.")
                .remediation("Confirm the tenant's licensing includes data loss prevention before relying on it."),
        ]);
    };

    let enforced = policies.iter().filter(|p| p.mode == DlpMode::Enforce).count();
    if enforced > 0 {
        return Ok(vec![]);
    }

    let (severity, title) = if policies.is_empty() {
        (Severity::High, "No DLP policies are configured".to_string())
    } else {
        (
            Severity::Medium,
            format!("{} DLP policies exist but none is enforced", policies.len()),
        )
    };
    let names: Vec<&str> = policies.iter().map(|p| p.name.as_str()).collect();

    Ok(vec![
        ctx.finding(severity, title)
            .description(if names.is_empty() {
                "Sensitive data such as credit card or national ID numbers can leave the tenant by email or sharing without inspection.".to_string()
            } else {
                format!("Policies in test or off mode: {}.", names.join(", "))
            })
            .remediation("Create DLP policies for the sensitive information types that matter to the organisation and move them from test mode to enforcement once tuned.")
            .compliance(["CIS Controls v8 3.13", "NIST 800-53 SC-7(10)"])
            .reference("https://learn.microsoft.com/en-us/purview/dlp-learn-about-dlp"),
    ])
}

async fn sensitivity_labels(ctx: CheckContext) -> Evaluation {
    let labels = ctx
        .fetch("sensitivity_labels", |b| async move { b.sensitivity_labels().await })
        .await?;
    if labels.iter().any(|l| l.published) {
        return Ok(vec![]);
    }
    Ok(vec![
        ctx.finding(Severity::Low, "No sensitivity labels are published")
            .description(if labels.is_empty() {
                "No sensitivity labels are defined, so documents and mail cannot be classified.".to_string()
            } else {
                format!(
                    "{} labels are defined but none is published to users.",
                    labels.len()
                )
            })
            .remediation("Define a label taxonomy and publish it with a label policy, ideally with a default label for new documents.")
            .compliance(["CIS Controls v8 3.7", "NIST 800-53 AC-16"]),
    ])
}
