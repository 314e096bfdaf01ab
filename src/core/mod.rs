mod check_result;
mod domain;
mod finding;
mod run;
mod score;
mod severity;

pub use check_result::{CheckFailure, CheckResult, CheckStatus};
pub use domain::DomainName;
pub use finding::Finding;
pub use run::{AssessmentRun, DomainSummary, RUN_TRUNCATED_CHECK_ID, RunBuilder};
pub use score::{RiskBand, ScoringConfig, StatusCounts, risk_score};
pub use severity::Severity;
