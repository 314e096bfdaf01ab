use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::core::{DomainName, Severity};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub domain: DomainName,
    pub check_id: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub remediation: String,
    pub compliance_refs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl Finding {
    pub fn new(
        domain: DomainName,
        check_id: impl Into<String>,
        severity: Severity,
        title: impl Into<String>,
    ) -> Self {
        Self {
            domain,
            check_id: check_id.into(),
            title: title.into(),
            description: String::new(),
            severity,
            remediation: String::new(),
            compliance_refs: Vec::new(),
            reference: None,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = remediation.into();
        self
    }

    pub fn compliance<I, S>(mut self, refs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.compliance_refs.extend(refs.into_iter().map(Into::into));
        self
    }

    pub fn reference(mut self, url: impl Into<String>) -> Self {
        self.reference = Some(url.into());
        self
    }
}
