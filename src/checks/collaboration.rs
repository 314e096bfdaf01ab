use crate::backend::{SharingLevel, SharingSettings};
use crate::checks::{Check, CheckContext, Domain, Evaluation, Interrupted};
use crate::core::{DomainName, Severity};

const MAX_ANONYMOUS_LINK_DAYS: u32 = 30;

pub fn domain() -> Domain {
    Domain::new(
        DomainName::Collaboration,
        vec![
            Check::new("collab.external-sharing", "External sharing level", |ctx| {
                Box::pin(external_sharing(ctx))
            }),
            Check::new(
                "collab.anonymous-links",
                "Anonymous link expiration",
                |ctx| Box::pin(anonymous_links(ctx)),
            ),
            Check::new(
                "collab.teams-external-access",
                "Teams external access",
                |ctx| Box::pin(teams_external_access(ctx)),
            ),
        ],
    )
}

async fn sharing(ctx: &CheckContext) -> Result<SharingSettings, Interrupted> {
    ctx.fetch("sharing_settings", |b| async move { b.sharing_settings().await })
        .await
}

async fn external_sharing(ctx: CheckContext) -> Evaluation {
    let settings = sharing(&ctx).await?;
    let finding = match settings.external_sharing {
        SharingLevel::Anyone => ctx
            .finding(Severity::High, "Files can be shared with anyone via anonymous links")
            .description("SharePoint and OneDrive allow links that work without sign-in, so shared content can be forwarded to anyone.")
            .remediation("Lower the organisation sharing level to 'New and existing guests' and allow anonymous links only on specific sites.")
            .compliance(["CIS Controls v8 3.3", "NIST 800-53 AC-3"])
            .reference("https://learn.microsoft.com/en-us/sharepoint/turn-external-sharing-on-or-off"),
        SharingLevel::NewAndExistingGuests => ctx
            .finding(Severity::Low, "Users can share with new external guests")
            .description("Any user can invite a new external guest by sharing a file.")
            .remediation("Restrict sharing to existing guests or to allowed partner domains if open guest invitation is not needed."),
        SharingLevel::ExistingGuests | SharingLevel::Disabled => return Ok(vec![]),
    };
    Ok(vec![finding])
}

async fn anonymous_links(ctx: CheckContext) -> Evaluation {
    let settings = sharing(&ctx).await?;
    if settings.external_sharing < SharingLevel::Anyone {
        return Ok(vec![]);
    }
    let finding = match settings.anonymous_link_expiry_days {
        None => ctx
            .finding(Severity::Medium, "Anonymous links never expire")
            .description("Links created for anyone stay valid until someone removes them."),
        Some(days) if days > MAX_ANONYMOUS_LINK_DAYS => ctx
            .finding(
                Severity::Low,
                format!("Anonymous links expire after {days} days"),
            )
            .description(format!(
                "Anonymous links stay valid longer than {MAX_ANONYMOUS_LINK_DAYS} days."
            )),
        Some(_) => return Ok(vec![]),
    };
    Ok(vec![
        finding
            .remediation("Set an expiration of 30 days or less for anyone links and default them to view-only.")
            .compliance(["NIST 800-53 AC-3"]),
    ])
}

async fn teams_external_access(ctx: CheckContext) -> Evaluation {
    let settings = sharing(&ctx).await?;
    if !settings.teams_open_federation {
        return Ok(vec![]);
    }
    Ok(vec![
        ctx.finding(Severity::Medium, "Teams accepts chat from any external organisation")
            .description("Open federation lets users in any Teams tenant start chats and calls, a common delivery path for phishing and malware.")
            .remediation("Restrict external access to an allow list of partner domains.")
            .compliance(["NIST 800-53 AC-4", "NIST 800-53 SC-7"]),
    ])
}
