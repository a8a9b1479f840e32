//! Decision-flow controller — the blocking protocol between workers and
//! resolvers.
//!
//! Per (work issue, decision issue) pair the cycle is
//! `WORKING -> BLOCKED -> RESPAWN_PENDING -> WORKING`, driven by hook
//! events. Durable writes go to the issue tracker first; in-memory state
//! advances only after the collaborator confirms, so a failed call leaves
//! nothing to roll back.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use pd_beads::{BeadsError, CreateIssue, IssueStore};
use pd_core::state::IssueKind;
use pd_core::types::{
    Caravan, CaravanName, ClaimId, IssueId, IssuePriority, ProspectRole, SessionName,
};
use pd_sessions::{AgentCommandSpec, LaunchError, LaunchRequest, SessionLauncher};

use crate::tracker::{DependencyTracker, RespawnClaim, TrackerError};

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error("issue tracker collaborator failed: {source}")]
    Issues {
        #[from]
        source: BeadsError,
    },
    #[error("session launcher collaborator failed: {source}")]
    Sessions {
        #[from]
        source: LaunchError,
    },
}

impl FlowError {
    /// True when the underlying collaborator was unreachable; such calls
    /// are retried with backoff, with no state to undo.
    pub fn is_unavailable(&self) -> bool {
        match self {
            FlowError::Tracker(_) => false,
            FlowError::Issues { source } => source.is_unavailable(),
            FlowError::Sessions { source } => source.is_unavailable(),
        }
    }
}

/// The handoff payload recorded when a worker blocks and read back on
/// respawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePayload {
    pub resume_task: String,
    pub resume_context: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedComment {
    pub decision: IssueId,
    pub payload: ResumePayload,
}

/// Render the structured "blocked" comment appended to a work issue.
///
/// The shape is load-bearing: `parse_blocked_comment` must read the payload
/// back verbatim, and resolver agents grep for the `BLOCKED:` line.
pub fn render_blocked_comment(decision: &IssueId, payload: &ResumePayload) -> String {
    format!(
        "BLOCKED: waiting for {decision}\nresume-task: {}\nresume-context: {}",
        payload.resume_task, payload.resume_context
    )
}

/// Parse a blocked comment. The resume-task value runs to the end of its
/// line; the resume-context value runs to the end of the comment, so
/// multi-line context survives the round trip.
pub fn parse_blocked_comment(text: &str) -> Option<BlockedComment> {
    let rest = text.strip_prefix("BLOCKED: waiting for ")?;
    let (first_line, remainder) = rest.split_once('\n')?;
    let decision = IssueId::new(first_line.trim());

    let rest = remainder.strip_prefix("resume-task: ")?;
    let (task_line, remainder) = rest.split_once('\n')?;
    let resume_context = remainder.strip_prefix("resume-context: ")?;

    Some(BlockedComment {
        decision,
        payload: ResumePayload {
            resume_task: task_line.to_string(),
            resume_context: resume_context.to_string(),
        },
    })
}

/// Find the newest blocked comment, preferring one that names `decision`.
pub fn latest_blocked_comment(comments: &[String], decision: &IssueId) -> Option<BlockedComment> {
    let parsed: Vec<BlockedComment> = comments
        .iter()
        .filter_map(|comment| parse_blocked_comment(comment))
        .collect();
    parsed
        .iter()
        .rev()
        .find(|comment| &comment.decision == decision)
        .or_else(|| parsed.last())
        .cloned()
}

/// The prompt a respawned worker receives, with the handoff payload
/// injected verbatim.
pub fn build_resume_prompt(
    work: &IssueId,
    decision: &IssueId,
    payload: &ResumePayload,
) -> String {
    format!(
        "Decision {decision} has been resolved. Read its closing comment with \
         `bd show {decision}`, then resume work on issue {work}.\n\
         resume-task: {}\nresume-context: {}",
        payload.resume_task, payload.resume_context
    )
}

fn build_resolver_prompt(decision: &IssueId, question: &str) -> String {
    format!(
        "You are resolving blocking decision {decision}: \"{question}\". \
         Investigate the repository, record your answer as a comment on the \
         issue, then close it with `bd close {decision} --reason <summary>`. \
         Dependent workers respawn when you close it."
    )
}

/// Everything the controller needs to launch sessions and create issues.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub decision_label: String,
    pub resolver_role: ProspectRole,
    pub session_prefix: String,
    pub agent_bin: String,
    pub install_dir: PathBuf,
    pub project_dir: PathBuf,
    pub bin_path: PathBuf,
    pub decision_priority: IssuePriority,
}

/// A worker raising a blocking decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaiseDecision {
    pub claim_id: ClaimId,
    pub work_issue: IssueId,
    pub title: String,
    pub labels: Vec<String>,
    pub resume: ResumePayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverSpawn {
    Spawned { session: SessionName },
    AlreadyActive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockOutcome {
    pub decision_issue: IssueId,
    pub resolver: ResolverSpawn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespawnResult {
    Respawned { session: SessionName },
    /// Other open decision edges remain; the worker stays blocked.
    StillBlocked,
    /// A duplicate close event already claimed this edge.
    AlreadyRespawned,
    /// The caravan was abandoned; its edges are stale.
    Stale,
    /// The worker's session is already running.
    SessionActive { session: SessionName },
    /// No caravan is registered for this work issue.
    MissingCaravan,
    /// No blocked comment to restore the worker from.
    MissingHandoff,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespawnOutcome {
    pub work_issue: IssueId,
    pub result: RespawnResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// The closed issue is not a decision issue known to the tracker.
    Ignored,
    /// The decision had no active blockers.
    NoDependents,
    Resolved { respawns: Vec<RespawnOutcome> },
}

pub struct DecisionFlow {
    pub config: FlowConfig,
    pub tracker: Arc<DependencyTracker>,
}

impl DecisionFlow {
    pub fn new(config: FlowConfig, tracker: Arc<DependencyTracker>) -> Self {
        Self { config, tracker }
    }

    /// `WORKING -> BLOCKED`: create the decision issue, record the edge,
    /// append the handoff comment, then spawn the resolver. All durable
    /// writes happen before any in-memory state moves.
    pub fn block_on_decision(
        &self,
        req: &RaiseDecision,
        store: &dyn IssueStore,
        launcher: &dyn SessionLauncher,
    ) -> Result<BlockOutcome, FlowError> {
        let mut labels = req.labels.clone();
        if !labels.iter().any(|label| label == &self.config.decision_label) {
            labels.push(self.config.decision_label.clone());
        }

        let decision = store.create(&CreateIssue {
            title: req.title.clone(),
            kind: IssueKind::Decision,
            labels,
            priority: self.config.decision_priority,
        })?;
        store.add_dependency(&req.work_issue, &decision)?;
        store.add_comment(&req.work_issue, &render_blocked_comment(&decision, &req.resume))?;

        self.tracker.insert_issue(
            &decision,
            IssueKind::Decision,
            pd_core::state::IssueStatus::Open,
        );
        self.tracker.record_dependency(&req.work_issue, &decision)?;

        let resolver = self.spawn_resolver(&decision, &req.title, launcher)?;
        Ok(BlockOutcome {
            decision_issue: decision,
            resolver,
        })
    }

    /// Launch a resolver session for an open decision issue. Idempotent
    /// keyed on the decision id: the tracker claim is the fast path, the
    /// multiplexer's session table the durable one.
    pub fn spawn_resolver(
        &self,
        decision: &IssueId,
        question: &str,
        launcher: &dyn SessionLauncher,
    ) -> Result<ResolverSpawn, FlowError> {
        let session = SessionName::for_resolver(&self.config.session_prefix, decision);

        if !self.tracker.claim_resolver(decision) {
            return Ok(ResolverSpawn::AlreadyActive);
        }
        match launcher.session_exists(&session) {
            Ok(true) => return Ok(ResolverSpawn::AlreadyActive),
            Ok(false) => {}
            Err(err) => {
                self.tracker.release_resolver(decision);
                return Err(err.into());
            }
        }

        let request = LaunchRequest {
            spec: AgentCommandSpec {
                role: self.config.resolver_role,
                claim_id: ClaimId::new(format!("pm-{decision}")),
                caravan_name: CaravanName(format!("decision-{decision}")),
                session_name: session.clone(),
                agent_bin: self.config.agent_bin.clone(),
                install_dir: self.config.install_dir.clone(),
                project_dir: self.config.project_dir.clone(),
                bin_path: self.config.bin_path.clone(),
                prompt: build_resolver_prompt(decision, question),
            },
            workdir: self.config.project_dir.clone(),
        };
        match launcher.launch(&request) {
            Ok(session) => Ok(ResolverSpawn::Spawned { session }),
            Err(err) => {
                self.tracker.release_resolver(decision);
                Err(err.into())
            }
        }
    }

    /// `BLOCKED -> RESPAWN_PENDING -> WORKING`: a decision issue closed.
    /// Every dependent work issue whose last open edge this was gets its
    /// worker relaunched with the handoff payload; everything else resolves
    /// to a recorded no-op.
    pub fn resolve_decision(
        &self,
        decision: &IssueId,
        caravans_by_work: &HashMap<IssueId, Caravan>,
        store: &dyn IssueStore,
        launcher: &dyn SessionLauncher,
    ) -> Result<ResolveOutcome, FlowError> {
        match self.tracker.kind_of(decision) {
            Some(kind) if kind.is_decision() => {}
            _ => return Ok(ResolveOutcome::Ignored),
        }

        self.tracker.mark_closed(decision);

        let dependents = self.tracker.dependents_of(decision);
        if dependents.is_empty() {
            return Ok(ResolveOutcome::NoDependents);
        }

        let mut respawns = Vec::new();
        for work in dependents {
            let result = self.respawn_worker(&work, decision, caravans_by_work, store, launcher)?;
            respawns.push(RespawnOutcome {
                work_issue: work,
                result,
            });
        }
        Ok(ResolveOutcome::Resolved { respawns })
    }

    fn respawn_worker(
        &self,
        work: &IssueId,
        decision: &IssueId,
        caravans_by_work: &HashMap<IssueId, Caravan>,
        store: &dyn IssueStore,
        launcher: &dyn SessionLauncher,
    ) -> Result<RespawnResult, FlowError> {
        // Blocked is conjunctive: respawn only once the last open decision
        // edge has closed.
        if self.tracker.is_blocked(work) {
            return Ok(RespawnResult::StillBlocked);
        }

        match self.tracker.claim_respawn(work, decision) {
            RespawnClaim::Claimed => {}
            RespawnClaim::AlreadyClaimed => return Ok(RespawnResult::AlreadyRespawned),
            RespawnClaim::Stale => return Ok(RespawnResult::Stale),
            RespawnClaim::Unknown => return Ok(RespawnResult::AlreadyRespawned),
        }

        let Some(caravan) = caravans_by_work.get(work) else {
            self.tracker.release_respawn(work, decision);
            return Ok(RespawnResult::MissingCaravan);
        };

        let comments = match store.list_comments(work) {
            Ok(comments) => comments,
            Err(err) => {
                self.tracker.release_respawn(work, decision);
                return Err(err.into());
            }
        };
        let Some(blocked) = latest_blocked_comment(&comments, decision) else {
            self.tracker.release_respawn(work, decision);
            return Ok(RespawnResult::MissingHandoff);
        };

        let session = SessionName::for_claim(&self.config.session_prefix, &caravan.claim_id);
        match launcher.session_exists(&session) {
            Ok(true) => return Ok(RespawnResult::SessionActive { session }),
            Ok(false) => {}
            Err(err) => {
                self.tracker.release_respawn(work, decision);
                return Err(err.into());
            }
        }

        let request = LaunchRequest {
            spec: AgentCommandSpec {
                role: caravan.role,
                claim_id: caravan.claim_id.clone(),
                caravan_name: caravan.name.clone(),
                session_name: session.clone(),
                agent_bin: self.config.agent_bin.clone(),
                install_dir: self.config.install_dir.clone(),
                project_dir: self.config.project_dir.clone(),
                bin_path: self.config.bin_path.clone(),
                prompt: build_resume_prompt(work, decision, &blocked.payload),
            },
            workdir: self.config.project_dir.clone(),
        };
        match launcher.launch(&request) {
            Ok(session) => Ok(RespawnResult::Respawned { session }),
            Err(err) => {
                self.tracker.release_respawn(work, decision);
                Err(err.into())
            }
        }
    }
}
