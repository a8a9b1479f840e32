//! Engine service — owns the tracker, ledger, event log, decision flow,
//! and delivery pipeline, and applies hook events to them.
//!
//! One `EngineService` per process; there is no hidden global state. After
//! a restart, `reconcile` rebuilds the tracker cache from the durable issue
//! tracker using the ledger's known-issue list.

use chrono::Utc;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pd_beads::IssueStore;
use pd_core::config::PaydirtConfig;
use pd_core::events::{Event, EventKind};
use pd_core::state::{CaravanStatus, IssueKind, IssueStatus};
use pd_core::types::{Caravan, ClaimId, EventId, Issue, IssueId, ProspectRole};
use pd_goldflow::{delivery_pipeline, Advance, GoldflowError, PipelineExecutor, StageRunner};
use pd_sessions::SessionLauncher;

use crate::decision_flow::{
    BlockOutcome, DecisionFlow, FlowConfig, FlowError, RaiseDecision, ResolveOutcome,
    ResolverSpawn, RespawnResult, ResumePayload,
};
use crate::event_log::{EventLogError, JsonlEventLog};
use crate::hook::{classify_command, CommandClass, HookEvent};
use crate::ledger::{IssueRecord, LedgerError, SqliteLedger};
use crate::retry::{run_with_backoff, BackoffPolicy};
use crate::tracker::{DependencyTracker, ReconcileReport};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    EventLog(#[from] EventLogError),
    #[error(transparent)]
    Flow(#[from] FlowError),
    #[error(transparent)]
    Goldflow(#[from] GoldflowError),
    #[error(transparent)]
    Beads(#[from] pd_beads::BeadsError),
}

/// What one hook event did, for the caller to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineReport {
    /// The command matched no recognized shape. Not an error.
    Dropped,
    /// The closed issue was not a decision issue.
    Ignored,
    /// A worker blocked behind a new decision issue.
    Blocked { decision_issue: IssueId },
    /// A decision closed; zero or more workers respawned.
    Resolved { respawned: Vec<IssueId> },
}

pub struct EngineService {
    pub config: PaydirtConfig,
    pub bin_path: PathBuf,
    pub project_dir: PathBuf,
    pub ledger: SqliteLedger,
    pub event_log: JsonlEventLog,
    pub tracker: Arc<DependencyTracker>,
    pub flow: DecisionFlow,
    pub delivery: PipelineExecutor,
    backoff: BackoffPolicy,
}

impl EngineService {
    pub fn open(config: PaydirtConfig, bin_path: PathBuf) -> Result<Self, EngineError> {
        let project_dir = config
            .sessions
            .project_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));

        if let Some(parent) = config.engine.ledger_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| EngineError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let ledger = SqliteLedger::open(&config.engine.ledger_path)?;
        ledger.migrate()?;

        let event_log = JsonlEventLog::new(&config.engine.event_log_root);
        event_log.ensure_layout()?;

        let tracker = Arc::new(DependencyTracker::new());
        let flow = DecisionFlow::new(
            FlowConfig {
                decision_label: config.tracker.decision_label.clone(),
                resolver_role: ProspectRole::ShiftBoss,
                session_prefix: config.sessions.session_prefix.clone(),
                agent_bin: config.sessions.agent_bin.clone(),
                install_dir: config.sessions.install_dir.clone(),
                project_dir: project_dir.clone(),
                bin_path: bin_path.clone(),
                decision_priority: pd_core::types::IssuePriority(
                    config.tracker.decision_priority,
                ),
            },
            Arc::clone(&tracker),
        );
        let delivery = PipelineExecutor::new(delivery_pipeline(), project_dir.clone());
        let backoff = BackoffPolicy::new(
            config.engine.backoff_max_attempts,
            Duration::from_millis(config.engine.backoff_base_ms),
        );

        Ok(Self {
            config,
            bin_path,
            project_dir,
            ledger,
            event_log,
            tracker,
            flow,
            delivery,
            backoff,
        })
    }

    /// Cold-start recovery: refresh every ledger-known issue from the
    /// durable tracker, then replay spawn/respawn claims from the event
    /// history so duplicate events stay no-ops across restarts.
    pub fn reconcile(&self, store: &dyn IssueStore) -> Result<ReconcileReport, EngineError> {
        let ids = self.ledger.list_known_issue_ids()?;
        let report = self.tracker.reconcile(
            store,
            &ids,
            &self.config.tracker.decision_label,
        )?;

        for event in self.ledger.list_events_with_tag("resolver_spawned")? {
            if let EventKind::ResolverSpawned { decision_issue, .. } = event.kind {
                let _ = self.tracker.claim_resolver(&decision_issue);
            }
        }
        for event in self.ledger.list_events_with_tag("worker_respawned")? {
            if let EventKind::WorkerRespawned {
                work_issue,
                decision_issue,
                ..
            } = event.kind
            {
                let _ = self.tracker.claim_respawn(&work_issue, &decision_issue);
            }
        }
        for caravan in self.ledger.list_caravans_by_status(&CaravanStatus::abandoned())? {
            if let Some(work) = &caravan.work_issue {
                self.tracker.mark_stale(work);
            }
        }
        Ok(report)
    }

    pub fn register_caravan(&self, caravan: &Caravan) -> Result<(), EngineError> {
        self.ledger.upsert_caravan(caravan)?;
        if let Some(work) = &caravan.work_issue {
            self.tracker
                .insert_issue(work, IssueKind::Work, IssueStatus::Open);
            self.ledger.upsert_issue(&IssueRecord {
                issue: Issue::new(work.clone(), IssueKind::Work, caravan.task.clone(), Utc::now()),
                claim_id: Some(caravan.claim_id.clone()),
            })?;
        }
        Ok(())
    }

    /// Apply one hook event: classify, run the decision-flow protocol with
    /// backoff on collaborator outages, and persist the resulting events.
    pub fn handle_event(
        &mut self,
        event: &HookEvent,
        store: &dyn IssueStore,
        launcher: &dyn SessionLauncher,
    ) -> Result<EngineReport, EngineError> {
        match event {
            HookEvent::ToolCommand {
                claim_id,
                work_issue,
                command,
            } => {
                match classify_command(command, &self.config.tracker.decision_label) {
                    CommandClass::Unrecognized => Ok(EngineReport::Dropped),
                    CommandClass::CreateDecision { title, labels } => self.handle_create_decision(
                        claim_id,
                        work_issue.as_ref(),
                        title,
                        labels,
                        store,
                        launcher,
                    ),
                    CommandClass::CloseIssue { issue_id } => {
                        self.handle_close(&issue_id, store, launcher)
                    }
                }
            }
            HookEvent::IssueClosed { issue_id } => self.handle_close(issue_id, store, launcher),
        }
    }

    fn handle_create_decision(
        &mut self,
        claim_id: &ClaimId,
        work_issue: Option<&IssueId>,
        title: String,
        labels: Vec<String>,
        store: &dyn IssueStore,
        launcher: &dyn SessionLauncher,
    ) -> Result<EngineReport, EngineError> {
        let caravan = self.ledger.load_caravan(claim_id)?;
        let work = match work_issue
            .cloned()
            .or_else(|| caravan.as_ref().and_then(|c| c.work_issue.clone()))
        {
            Some(work) => work,
            None => {
                // A decision with no work issue to block cannot gate
                // anything; surface and drop.
                self.record_event(
                    Some(claim_id),
                    None,
                    EventKind::Error {
                        code: "decision.no_work_issue".to_string(),
                        message: format!("decision '{title}' raised with no active work issue"),
                    },
                )?;
                return Ok(EngineReport::Dropped);
            }
        };

        self.tracker
            .insert_issue(&work, IssueKind::Work, IssueStatus::Open);

        let task = caravan
            .as_ref()
            .map(|c| c.task.clone())
            .unwrap_or_else(|| format!("work issue {work}"));
        let req = RaiseDecision {
            claim_id: claim_id.clone(),
            work_issue: work.clone(),
            title: title.clone(),
            labels,
            resume: ResumePayload {
                resume_task: format!("Continue the task: {task}"),
                resume_context: format!("Blocked at decision: {title}"),
            },
        };

        let backoff = self.backoff;
        let outcome = run_with_backoff(
            &backoff,
            || self.flow.block_on_decision(&req, store, launcher),
            FlowError::is_unavailable,
            std::thread::sleep,
        )?;
        let BlockOutcome {
            decision_issue,
            resolver,
        } = outcome;

        let now = Utc::now();
        self.ledger.upsert_issue(&IssueRecord {
            issue: Issue::new(work.clone(), IssueKind::Work, task, now),
            claim_id: Some(claim_id.clone()),
        })?;
        self.ledger.upsert_issue(&IssueRecord {
            issue: Issue::new(decision_issue.clone(), IssueKind::Decision, title, now),
            claim_id: Some(claim_id.clone()),
        })?;

        if let Some(mut caravan) = caravan {
            let from = caravan.status.clone();
            caravan.status = CaravanStatus::blocked();
            caravan.work_issue = Some(work.clone());
            caravan.updated_at = now;
            self.ledger.upsert_caravan(&caravan)?;
            self.record_event(
                Some(claim_id),
                None,
                EventKind::CaravanStatusChanged {
                    from: from.as_str().to_string(),
                    to: CaravanStatus::BLOCKED.to_string(),
                },
            )?;
        }

        self.record_event(
            Some(claim_id),
            Some(&decision_issue),
            EventKind::DecisionRaised {
                work_issue: work,
                decision_issue: decision_issue.clone(),
            },
        )?;
        match resolver {
            ResolverSpawn::Spawned { session } => {
                self.record_event(
                    Some(claim_id),
                    Some(&decision_issue),
                    EventKind::ResolverSpawned {
                        decision_issue: decision_issue.clone(),
                        session: session.0,
                    },
                )?;
            }
            ResolverSpawn::AlreadyActive => {
                self.record_event(
                    Some(claim_id),
                    Some(&decision_issue),
                    EventKind::ResolverSpawnSkipped {
                        decision_issue: decision_issue.clone(),
                        reason: "resolver already active".to_string(),
                    },
                )?;
            }
        }

        Ok(EngineReport::Blocked {
            decision_issue,
        })
    }

    fn handle_close(
        &mut self,
        issue_id: &IssueId,
        store: &dyn IssueStore,
        launcher: &dyn SessionLauncher,
    ) -> Result<EngineReport, EngineError> {
        let caravans_by_work = self.caravans_by_work()?;

        let backoff = self.backoff;
        let outcome = run_with_backoff(
            &backoff,
            || {
                self.flow
                    .resolve_decision(issue_id, &caravans_by_work, store, launcher)
            },
            FlowError::is_unavailable,
            std::thread::sleep,
        )?;

        match outcome {
            ResolveOutcome::Ignored => Ok(EngineReport::Ignored),
            ResolveOutcome::NoDependents => {
                self.mark_issue_closed(issue_id)?;
                self.record_event(
                    None,
                    Some(issue_id),
                    EventKind::DecisionResolved {
                        decision_issue: issue_id.clone(),
                    },
                )?;
                Ok(EngineReport::Resolved {
                    respawned: Vec::new(),
                })
            }
            ResolveOutcome::Resolved { respawns } => {
                self.mark_issue_closed(issue_id)?;
                self.record_event(
                    None,
                    Some(issue_id),
                    EventKind::DecisionResolved {
                        decision_issue: issue_id.clone(),
                    },
                )?;

                let mut respawned = Vec::new();
                let now = Utc::now();
                for outcome in respawns {
                    let claim = caravans_by_work
                        .get(&outcome.work_issue)
                        .map(|caravan| caravan.claim_id.clone());
                    match outcome.result {
                        RespawnResult::Respawned { session } => {
                            if let Some(mut caravan) =
                                caravans_by_work.get(&outcome.work_issue).cloned()
                            {
                                let from = caravan.status.clone();
                                caravan.status = CaravanStatus::working();
                                caravan.updated_at = now;
                                self.ledger.upsert_caravan(&caravan)?;
                                self.record_event(
                                    Some(&caravan.claim_id),
                                    None,
                                    EventKind::CaravanStatusChanged {
                                        from: from.as_str().to_string(),
                                        to: CaravanStatus::WORKING.to_string(),
                                    },
                                )?;
                            }
                            self.record_event(
                                claim.as_ref(),
                                Some(&outcome.work_issue),
                                EventKind::WorkerRespawned {
                                    work_issue: outcome.work_issue.clone(),
                                    decision_issue: issue_id.clone(),
                                    session: session.0,
                                },
                            )?;
                            respawned.push(outcome.work_issue);
                        }
                        ref skipped => {
                            self.record_event(
                                claim.as_ref(),
                                Some(&outcome.work_issue),
                                EventKind::RespawnSkipped {
                                    work_issue: outcome.work_issue.clone(),
                                    decision_issue: issue_id.clone(),
                                    reason: skip_reason(skipped).to_string(),
                                },
                            )?;
                        }
                    }
                }
                Ok(EngineReport::Resolved { respawned })
            }
        }
    }

    /// Poll-advance every non-terminal caravan through the delivery
    /// pipeline. Configuration errors are surfaced to the event log and
    /// leave the caravan untouched.
    pub fn advance_delivery(
        &mut self,
        runner: &mut dyn StageRunner,
    ) -> Result<Vec<(ClaimId, Advance)>, EngineError> {
        let caravans = self.ledger.list_caravans()?;
        let mut results = Vec::new();
        let now = Utc::now();

        for mut caravan in caravans {
            if caravan.status.is_terminal() {
                continue;
            }
            let before = caravan.status.clone();
            let advance = match self.delivery.advance(&mut caravan, runner, now) {
                Ok(advance) => advance,
                Err(err @ GoldflowError::MissingInput { .. }) => {
                    self.record_event(
                        Some(&caravan.claim_id),
                        None,
                        EventKind::Error {
                            code: "pipeline.configuration".to_string(),
                            message: err.to_string(),
                        },
                    )?;
                    continue;
                }
                Err(err) => {
                    self.record_event(
                        Some(&caravan.claim_id),
                        None,
                        EventKind::Error {
                            code: "pipeline.collaborator".to_string(),
                            message: err.to_string(),
                        },
                    )?;
                    continue;
                }
            };

            let pipeline = self.delivery.pipeline_name().to_string();
            match &advance {
                Advance::NotTriggered | Advance::Pending { .. } => {}
                Advance::Entered { stage } => {
                    self.record_event(
                        Some(&caravan.claim_id),
                        None,
                        EventKind::PipelineEntered {
                            pipeline: pipeline.clone(),
                            stage: stage.clone(),
                        },
                    )?;
                }
                Advance::Passed { from, .. } => {
                    self.record_event(
                        Some(&caravan.claim_id),
                        None,
                        EventKind::StagePassed {
                            pipeline: pipeline.clone(),
                            stage: from.clone(),
                        },
                    )?;
                }
                Advance::Delivered => {
                    self.record_event(
                        Some(&caravan.claim_id),
                        None,
                        EventKind::Delivered {
                            pipeline: pipeline.clone(),
                        },
                    )?;
                }
                Advance::ReturnedTo { stage, status } => {
                    self.record_event(
                        Some(&caravan.claim_id),
                        None,
                        EventKind::StageFailed {
                            pipeline: pipeline.clone(),
                            stage: stage.clone(),
                            fallback: Some(status.as_str().to_string()),
                        },
                    )?;
                }
                Advance::Failed { stage } => {
                    self.record_event(
                        Some(&caravan.claim_id),
                        None,
                        EventKind::PipelineFailed {
                            pipeline: pipeline.clone(),
                            stage: stage.clone(),
                        },
                    )?;
                }
            }

            if caravan.status != before {
                self.ledger.upsert_caravan(&caravan)?;
                self.record_event(
                    Some(&caravan.claim_id),
                    None,
                    EventKind::CaravanStatusChanged {
                        from: before.as_str().to_string(),
                        to: caravan.status.as_str().to_string(),
                    },
                )?;
            }
            if !matches!(advance, Advance::NotTriggered) {
                results.push((caravan.claim_id.clone(), advance));
            }
        }
        Ok(results)
    }

    /// Abandon a caravan: pending edges go stale (late closes become
    /// no-ops), any in-flight stage evaluation is dropped, and the status
    /// turns terminal.
    pub fn abandon(&mut self, claim_id: &ClaimId) -> Result<Option<Caravan>, EngineError> {
        let Some(mut caravan) = self.ledger.load_caravan(claim_id)? else {
            return Ok(None);
        };

        if let Some(work) = &caravan.work_issue {
            self.tracker.mark_stale(work);
        }
        self.delivery.exit(claim_id);

        let from = caravan.status.clone();
        caravan.status = CaravanStatus::abandoned();
        caravan.updated_at = Utc::now();
        self.ledger.upsert_caravan(&caravan)?;
        self.record_event(
            Some(claim_id),
            None,
            EventKind::CaravanStatusChanged {
                from: from.as_str().to_string(),
                to: CaravanStatus::ABANDONED.to_string(),
            },
        )?;
        self.record_event(Some(claim_id), None, EventKind::CaravanAbandoned)?;
        Ok(Some(caravan))
    }

    pub fn record_event(
        &self,
        claim_id: Option<&ClaimId>,
        issue_id: Option<&IssueId>,
        kind: EventKind,
    ) -> Result<(), EngineError> {
        let at = Utc::now();
        let event = Event {
            id: EventId(self.ledger.next_event_id(at)?),
            claim_id: claim_id.cloned(),
            issue_id: issue_id.cloned(),
            at,
            kind,
        };
        self.ledger.append_event(&event)?;
        self.event_log.append_both(&event)?;
        Ok(())
    }

    fn caravans_by_work(&self) -> Result<HashMap<IssueId, Caravan>, EngineError> {
        let mut map = HashMap::new();
        for caravan in self.ledger.list_caravans()? {
            if let Some(work) = caravan.work_issue.clone() {
                map.insert(work, caravan);
            }
        }
        Ok(map)
    }

    fn mark_issue_closed(&self, issue_id: &IssueId) -> Result<(), EngineError> {
        // Tracker state was already updated inside resolve_decision; mirror
        // the closure into the ledger row if one exists.
        if let Some(kind) = self.tracker.kind_of(issue_id) {
            let mut issue = Issue::new(issue_id.clone(), kind, "", Utc::now());
            issue.status = IssueStatus::Closed;
            self.ledger.upsert_issue(&IssueRecord {
                issue,
                claim_id: None,
            })?;
        }
        Ok(())
    }
}

fn skip_reason(result: &RespawnResult) -> &'static str {
    match result {
        RespawnResult::Respawned { .. } => "respawned",
        RespawnResult::StillBlocked => "other decisions still open",
        RespawnResult::AlreadyRespawned => "duplicate close event",
        RespawnResult::Stale => "caravan abandoned",
        RespawnResult::SessionActive { .. } => "session already running",
        RespawnResult::MissingCaravan => "no caravan registered for work issue",
        RespawnResult::MissingHandoff => "no blocked comment to restore from",
    }
}
