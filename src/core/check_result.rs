use serde::{Deserialize, Serialize};

use crate::access::AccessError;
use crate::core::Finding;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckStatus {
    Succeeded,
    SucceededWithWarning,
    Failed,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("check {check_id} failed: {source}")]
pub struct CheckFailure {
    pub check_id: String,
    #[source]
    pub source: AccessError,
}

/// Outcome of one check execution. A failed result never carries findings.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub check_id: String,
    pub status: CheckStatus,
    pub findings: Vec<Finding>,
    pub warning: Option<String>,
    pub error: Option<CheckFailure>,
}

impl CheckResult {
    pub fn succeeded(check_id: impl Into<String>, findings: Vec<Finding>) -> Self {
        Self {
            check_id: check_id.into(),
            status: CheckStatus::Succeeded,
            findings,
            warning: None,
            error: None,
        }
    }

    pub fn warning(check_id: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            check_id: check_id.into(),
            status: CheckStatus::SucceededWithWarning,
            findings: Vec::new(),
            warning: Some(note.into()),
            error: None,
        }
    }

    pub fn failed(check_id: impl Into<String>, source: AccessError) -> Self {
        let check_id = check_id.into();
        Self {
            status: CheckStatus::Failed,
            findings: Vec::new(),
            warning: None,
            error: Some(CheckFailure {
                check_id: check_id.clone(),
                source,
            }),
            check_id,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == CheckStatus::Failed
    }
}
