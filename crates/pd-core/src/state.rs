//! Issue lifecycle and caravan status.

use serde::{Deserialize, Serialize};

/// The two kinds of trackable issue. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Work,
    Decision,
}

impl IssueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueKind::Work => "work",
            IssueKind::Decision => "decision",
        }
    }

    pub fn is_decision(self) -> bool {
        matches!(self, IssueKind::Decision)
    }
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    #[default]
    Open,
    Closed,
}

impl IssueStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueStatus::Open => "open",
            IssueStatus::Closed => "closed",
        }
    }

    pub fn is_open(self) -> bool {
        matches!(self, IssueStatus::Open)
    }
}

impl std::fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A caravan's status tag.
///
/// Pipeline definitions are data and may name fallback states freely
/// (`return_to_miner`), so this is a validated string newtype rather than a
/// closed enum. Well-known statuses get constructors below.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaravanStatus(pub String);

impl CaravanStatus {
    pub const STAKED: &'static str = "staked";
    pub const WORKING: &'static str = "working";
    pub const BLOCKED: &'static str = "blocked";
    pub const READY_FOR_REVIEW: &'static str = "ready-for-review";
    pub const DELIVERED: &'static str = "delivered";
    pub const PIPELINE_FAILED: &'static str = "pipeline-failed";
    pub const ABANDONED: &'static str = "abandoned";

    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn staked() -> Self {
        Self(Self::STAKED.to_string())
    }

    pub fn working() -> Self {
        Self(Self::WORKING.to_string())
    }

    pub fn blocked() -> Self {
        Self(Self::BLOCKED.to_string())
    }

    pub fn ready_for_review() -> Self {
        Self(Self::READY_FOR_REVIEW.to_string())
    }

    pub fn delivered() -> Self {
        Self(Self::DELIVERED.to_string())
    }

    pub fn pipeline_failed() -> Self {
        Self(Self::PIPELINE_FAILED.to_string())
    }

    pub fn abandoned() -> Self {
        Self(Self::ABANDONED.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is(&self, tag: &str) -> bool {
        self.0 == tag
    }

    /// Terminal statuses: the caravan will not be scheduled again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.0.as_str(),
            Self::DELIVERED | Self::PIPELINE_FAILED | Self::ABANDONED
        )
    }
}

impl std::fmt::Display for CaravanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{CaravanStatus, IssueKind, IssueStatus};

    #[test]
    fn issue_kind_serializes_snake_case() {
        let json = serde_json::to_string(&IssueKind::Decision).expect("serialize kind");
        assert_eq!(json, "\"decision\"");
        let decoded: IssueKind = serde_json::from_str("\"work\"").expect("deserialize kind");
        assert_eq!(decoded, IssueKind::Work);
    }

    #[test]
    fn only_decision_kind_is_decision() {
        assert!(IssueKind::Decision.is_decision());
        assert!(!IssueKind::Work.is_decision());
    }

    #[test]
    fn issue_status_default_is_open() {
        assert_eq!(IssueStatus::default(), IssueStatus::Open);
        assert!(IssueStatus::Open.is_open());
        assert!(!IssueStatus::Closed.is_open());
    }

    #[test]
    fn caravan_status_serializes_as_bare_string() {
        let status = CaravanStatus::ready_for_review();
        let json = serde_json::to_string(&status).expect("serialize status");
        assert_eq!(json, "\"ready-for-review\"");
        let decoded: CaravanStatus = serde_json::from_str("\"return_to_miner\"").expect("decode");
        assert_eq!(decoded, CaravanStatus::new("return_to_miner"));
    }

    #[test]
    fn terminal_statuses() {
        assert!(CaravanStatus::delivered().is_terminal());
        assert!(CaravanStatus::pipeline_failed().is_terminal());
        assert!(CaravanStatus::abandoned().is_terminal());
        assert!(!CaravanStatus::working().is_terminal());
        assert!(!CaravanStatus::new("return_to_miner").is_terminal());
    }

    #[test]
    fn status_tag_comparison() {
        let status = CaravanStatus::blocked();
        assert!(status.is(CaravanStatus::BLOCKED));
        assert!(!status.is(CaravanStatus::WORKING));
        assert_eq!(status.as_str(), "blocked");
    }
}
