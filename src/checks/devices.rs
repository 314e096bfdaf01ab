use crate::checks::{Check, CheckContext, Domain, Evaluation};
use crate::core::{DomainName, Severity};

pub fn domain() -> Domain {
    Domain::new(
        DomainName::DeviceManagement,
        vec![
            Check::new(
                "devices.compliance-policies",
                "Device compliance policies defined",
                |ctx| Box::pin(compliance_policies(ctx)),
            ),
            Check::new("devices.noncompliant", "Non-compliant devices", |ctx| {
                Box::pin(noncompliant(ctx))
            }),
        ],
    )
}

async fn compliance_policies(ctx: CheckContext) -> Evaluation {
    let Some(devices) = ctx
        .fetch_optional("device_compliance", |b| async move { b.device_compliance().await })
        .await?
    else {
        return Ok(vec![
            ctx.finding(Severity::Info, "Device management is not enrolled")
                .description("No device management service answered for this tenant, so device posture cannot be used in access decisions.")
                .remediation("Enrol corporate devices in a mobile device management service if device-based conditional access is required."),
        ]);
    };

    let mut findings = Vec::new();
    if devices.policy_count == 0 {
        findings.push(
            ctx.finding(Severity::High, "No device compliance policies are defined")
                .description(format!(
                    "{} managed devices are not evaluated against any compliance baseline.",
                    devices.total_devices
                ))
                .remediation("Create compliance policies for each platform requiring encryption, a screen lock and a minimum OS version.")
                .compliance(["CIS Controls v8 4.1", "NIST 800-53 CM-6"]),
        );
    }
    if devices.no_policy_devices_compliant {
        findings.push(
            ctx.finding(Severity::Medium, "Devices without a policy are marked compliant")
                .description("The tenant-wide setting treats devices with no assigned compliance policy as compliant, which satisfies device-based conditional access by default.")
                .remediation("Change 'Mark devices with no compliance policy assigned as' to Not compliant."),
        );
    }
    Ok(findings)
}

async fn noncompliant(ctx: CheckContext) -> Evaluation {
    let devices = ctx
        .fetch("device_compliance", |b| async move { b.device_compliance().await })
        .await?;
    if devices.noncompliant_devices == 0 || devices.total_devices == 0 {
        return Ok(vec![]);
    }

    let share = f64::from(devices.noncompliant_devices) / f64::from(devices.total_devices);
    let severity = if share >= 0.2 {
        Severity::High
    } else if share >= 0.05 {
        Severity::Medium
    } else {
        Severity::Low
    };
    Ok(vec![
        ctx.finding(
            severity,
            format!(
                "{} of {} devices are non-compliant",
                devices.noncompliant_devices, devices.total_devices
            ),
        )
        .description("Non-compliant devices are missing required security settings such as encryption or OS updates.")
        .remediation("Follow up with device owners and block access from non-compliant devices with conditional access.")
        .compliance(["CIS Controls v8 4.1", "NIST 800-53 CM-2"]),
    ])
}
