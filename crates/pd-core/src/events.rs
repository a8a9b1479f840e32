use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ClaimId, EventId, IssueId};

/// Orchestration events, appended to the JSONL event log and the sqlite
/// ledger. Variant names are the stable wire tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CaravanStaked {
        task: String,
    },
    CaravanStatusChanged {
        from: String,
        to: String,
    },
    DecisionRaised {
        work_issue: IssueId,
        decision_issue: IssueId,
    },
    ResolverSpawned {
        decision_issue: IssueId,
        session: String,
    },
    ResolverSpawnSkipped {
        decision_issue: IssueId,
        reason: String,
    },
    DecisionResolved {
        decision_issue: IssueId,
    },
    WorkerRespawned {
        work_issue: IssueId,
        decision_issue: IssueId,
        session: String,
    },
    RespawnSkipped {
        work_issue: IssueId,
        decision_issue: IssueId,
        reason: String,
    },
    PipelineEntered {
        pipeline: String,
        stage: String,
    },
    StagePassed {
        pipeline: String,
        stage: String,
    },
    StageFailed {
        pipeline: String,
        stage: String,
        fallback: Option<String>,
    },
    Delivered {
        pipeline: String,
    },
    PipelineFailed {
        pipeline: String,
        stage: String,
    },
    CaravanAbandoned,
    Error {
        code: String,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub claim_id: Option<ClaimId>,
    pub issue_id: Option<IssueId>,
    pub at: DateTime<Utc>,
    pub kind: EventKind,
}

/// Stable tag for an event kind, used for ledger indexing.
pub fn event_kind_tag(kind: &EventKind) -> &'static str {
    match kind {
        EventKind::CaravanStaked { .. } => "caravan_staked",
        EventKind::CaravanStatusChanged { .. } => "caravan_status_changed",
        EventKind::DecisionRaised { .. } => "decision_raised",
        EventKind::ResolverSpawned { .. } => "resolver_spawned",
        EventKind::ResolverSpawnSkipped { .. } => "resolver_spawn_skipped",
        EventKind::DecisionResolved { .. } => "decision_resolved",
        EventKind::WorkerRespawned { .. } => "worker_respawned",
        EventKind::RespawnSkipped { .. } => "respawn_skipped",
        EventKind::PipelineEntered { .. } => "pipeline_entered",
        EventKind::StagePassed { .. } => "stage_passed",
        EventKind::StageFailed { .. } => "stage_failed",
        EventKind::Delivered { .. } => "delivered",
        EventKind::PipelineFailed { .. } => "pipeline_failed",
        EventKind::CaravanAbandoned => "caravan_abandoned",
        EventKind::Error { .. } => "error",
    }
}
