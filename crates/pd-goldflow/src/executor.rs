//! Pipeline executor — advances a caravan through a pipeline one step per
//! call, with pass/fail gating and fallback transitions.
//!
//! `advance` is poll-based: a pending stage is simply re-evaluated on the
//! next call, and every outcome is data for the caller to persist.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use pd_core::state::CaravanStatus;
use pd_core::types::{Caravan, ClaimId};

use crate::error::GoldflowError;
use crate::types::{Pipeline, Stage};

/// Result of one stage evaluation by a processor or verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Pass,
    Fail,
    Pending,
}

/// The collaborator seam: whatever runs a stage — launching a processor
/// session, polling CI — sits behind this trait.
pub trait StageRunner {
    fn run_stage(&mut self, caravan: &Caravan, stage: &Stage) -> Result<StageStatus, GoldflowError>;
}

/// What one `advance` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// The caravan's status does not trigger this pipeline.
    NotTriggered,
    /// The caravan entered stage 0. The stage runs on the next call.
    Entered { stage: String },
    /// The current stage passed; the caravan moved to the next one.
    Passed { from: String, to: String },
    /// The final stage passed; the caravan is delivered.
    Delivered,
    /// The stage failed and the caravan took its fallback transition.
    ReturnedTo { stage: String, status: CaravanStatus },
    /// The stage failed with no fallback; the pipeline failed.
    Failed { stage: String },
    /// The stage is still pending; nothing changed.
    Pending { stage: String },
}

/// Drives caravans through one pipeline. A caravan occupies exactly one
/// stage at a time, or none.
#[derive(Debug)]
pub struct PipelineExecutor {
    pipeline: Pipeline,
    /// Root against which relative required-input paths are resolved.
    inputs_root: PathBuf,
    positions: HashMap<ClaimId, usize>,
}

impl PipelineExecutor {
    pub fn new(pipeline: Pipeline, inputs_root: impl Into<PathBuf>) -> Self {
        Self {
            pipeline,
            inputs_root: inputs_root.into(),
            positions: HashMap::new(),
        }
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline.name
    }

    /// The stage a caravan currently occupies, if it is inside the pipeline.
    pub fn stage_of(&self, claim_id: &ClaimId) -> Option<&Stage> {
        self.positions
            .get(claim_id)
            .and_then(|index| self.pipeline.stage(*index))
    }

    /// Drop a caravan from the pipeline without touching its status. Used
    /// when a caravan is abandoned mid-flight.
    pub fn exit(&mut self, claim_id: &ClaimId) {
        self.positions.remove(claim_id);
    }

    /// Advance a caravan by one step: enter the pipeline if its status
    /// triggers it, or evaluate its current stage.
    pub fn advance(
        &mut self,
        caravan: &mut Caravan,
        runner: &mut dyn StageRunner,
        now: DateTime<Utc>,
    ) -> Result<Advance, GoldflowError> {
        let index = match self.positions.get(&caravan.claim_id) {
            Some(index) => *index,
            None => {
                if !self.pipeline.trigger.matches(&caravan.status) {
                    return Ok(Advance::NotTriggered);
                }
                let Some(first) = self.pipeline.stage(0) else {
                    return Ok(Advance::NotTriggered);
                };
                let stage_name = first.name.clone();
                self.positions.insert(caravan.claim_id.clone(), 0);
                return Ok(Advance::Entered { stage: stage_name });
            }
        };

        let Some(stage) = self.pipeline.stage(index) else {
            // Position past the end can only come from a pipeline redefined
            // underneath a running caravan; treat as done.
            self.positions.remove(&caravan.claim_id);
            return Ok(Advance::NotTriggered);
        };

        self.check_required_inputs(stage)?;

        let stage_name = stage.name.clone();
        let on_fail = stage.on_fail.clone();
        let status = runner.run_stage(caravan, stage)?;

        match status {
            StageStatus::Pending => Ok(Advance::Pending { stage: stage_name }),
            StageStatus::Pass => {
                let next_index = index + 1;
                match self.pipeline.stage(next_index) {
                    Some(next) => {
                        let to = next.name.clone();
                        self.positions.insert(caravan.claim_id.clone(), next_index);
                        Ok(Advance::Passed {
                            from: stage_name,
                            to,
                        })
                    }
                    None => {
                        self.positions.remove(&caravan.claim_id);
                        caravan.status = CaravanStatus::delivered();
                        caravan.updated_at = now;
                        Ok(Advance::Delivered)
                    }
                }
            }
            StageStatus::Fail => {
                self.positions.remove(&caravan.claim_id);
                match on_fail {
                    Some(fallback) => {
                        caravan.status = fallback.clone();
                        caravan.updated_at = now;
                        Ok(Advance::ReturnedTo {
                            stage: stage_name,
                            status: fallback,
                        })
                    }
                    None => {
                        caravan.status = CaravanStatus::pipeline_failed();
                        caravan.updated_at = now;
                        Ok(Advance::Failed { stage: stage_name })
                    }
                }
            }
        }
    }

    fn check_required_inputs(&self, stage: &Stage) -> Result<(), GoldflowError> {
        for (key, path) in &stage.required_inputs {
            let resolved = if path.is_absolute() {
                path.clone()
            } else {
                self.inputs_root.join(path)
            };
            if !resolved.exists() {
                return Err(GoldflowError::MissingInput {
                    pipeline: self.pipeline.name.clone(),
                    stage: stage.name.clone(),
                    key: key.clone(),
                    path: resolved,
                });
            }
        }
        Ok(())
    }
}

/// Resolve a required-input path the way the executor does. Exposed so
/// callers can report configuration problems ahead of time.
pub fn resolve_input(inputs_root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        inputs_root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use pd_core::state::CaravanStatus;
    use pd_core::types::{Caravan, CaravanName, ClaimId, ProspectRole};

    use super::{Advance, PipelineExecutor, StageRunner, StageStatus};
    use crate::delivery::{delivery_pipeline, RETURN_TO_MINER};
    use crate::error::GoldflowError;
    use crate::types::{Pipeline, Stage, Trigger};

    struct ScriptedRunner {
        script: Vec<StageStatus>,
        calls: Vec<String>,
    }

    impl ScriptedRunner {
        fn new(script: Vec<StageStatus>) -> Self {
            Self {
                script,
                calls: Vec::new(),
            }
        }
    }

    impl StageRunner for ScriptedRunner {
        fn run_stage(
            &mut self,
            _caravan: &Caravan,
            stage: &Stage,
        ) -> Result<StageStatus, GoldflowError> {
            self.calls.push(stage.name.clone());
            if self.script.is_empty() {
                Ok(StageStatus::Pending)
            } else {
                Ok(self.script.remove(0))
            }
        }
    }

    fn mk_caravan(status: CaravanStatus) -> Caravan {
        let mut caravan = Caravan::new(
            ClaimId::new("pd-test"),
            CaravanName("test-caravan".to_string()),
            "Test task",
            ProspectRole::Miner,
            Utc::now(),
        );
        caravan.status = status;
        caravan
    }

    fn two_stage_pipeline(second_on_fail: Option<CaravanStatus>) -> Pipeline {
        let mut second = Stage::processor("B", "runner-b");
        second.on_fail = second_on_fail;
        Pipeline {
            name: "two-step".to_string(),
            trigger: Trigger::StatusEquals(CaravanStatus::ready_for_review()),
            stages: vec![Stage::processor("A", "runner-a"), second],
        }
    }

    fn mk_executor(pipeline: Pipeline) -> PipelineExecutor {
        PipelineExecutor::new(pipeline, std::env::temp_dir())
    }

    #[test]
    fn advance_is_a_noop_when_status_does_not_trigger() {
        let mut executor = mk_executor(two_stage_pipeline(None));
        let mut caravan = mk_caravan(CaravanStatus::working());
        let mut runner = ScriptedRunner::new(vec![]);

        let outcome = executor
            .advance(&mut caravan, &mut runner, Utc::now())
            .expect("advance");
        assert_eq!(outcome, Advance::NotTriggered);
        assert!(runner.calls.is_empty());
        assert!(executor.stage_of(&caravan.claim_id).is_none());
    }

    #[test]
    fn triggered_caravan_enters_stage_zero_without_running_it() {
        let mut executor = mk_executor(two_stage_pipeline(None));
        let mut caravan = mk_caravan(CaravanStatus::ready_for_review());
        let mut runner = ScriptedRunner::new(vec![]);

        let outcome = executor
            .advance(&mut caravan, &mut runner, Utc::now())
            .expect("advance");
        assert_eq!(
            outcome,
            Advance::Entered {
                stage: "A".to_string()
            }
        );
        assert!(runner.calls.is_empty());
        assert_eq!(
            executor.stage_of(&caravan.claim_id).map(|s| s.name.as_str()),
            Some("A")
        );
    }

    #[test]
    fn passes_run_through_to_delivered() {
        let mut executor = mk_executor(two_stage_pipeline(None));
        let mut caravan = mk_caravan(CaravanStatus::ready_for_review());
        let mut runner = ScriptedRunner::new(vec![StageStatus::Pass, StageStatus::Pass]);

        executor
            .advance(&mut caravan, &mut runner, Utc::now())
            .expect("enter");
        let outcome = executor
            .advance(&mut caravan, &mut runner, Utc::now())
            .expect("run A");
        assert_eq!(
            outcome,
            Advance::Passed {
                from: "A".to_string(),
                to: "B".to_string()
            }
        );

        let outcome = executor
            .advance(&mut caravan, &mut runner, Utc::now())
            .expect("run B");
        assert_eq!(outcome, Advance::Delivered);
        assert_eq!(caravan.status, CaravanStatus::delivered());
        assert!(executor.stage_of(&caravan.claim_id).is_none());
        assert_eq!(runner.calls, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn failing_stage_with_fallback_returns_the_caravan_not_delivered() {
        let fallback = CaravanStatus::new("return_to_x");
        let mut executor = mk_executor(two_stage_pipeline(Some(fallback.clone())));
        let mut caravan = mk_caravan(CaravanStatus::ready_for_review());
        let mut runner = ScriptedRunner::new(vec![StageStatus::Pass, StageStatus::Fail]);

        executor
            .advance(&mut caravan, &mut runner, Utc::now())
            .expect("enter");
        executor
            .advance(&mut caravan, &mut runner, Utc::now())
            .expect("A passes");
        let outcome = executor
            .advance(&mut caravan, &mut runner, Utc::now())
            .expect("B fails");

        assert_eq!(
            outcome,
            Advance::ReturnedTo {
                stage: "B".to_string(),
                status: fallback.clone()
            }
        );
        assert_eq!(caravan.status, fallback);
        assert_ne!(caravan.status, CaravanStatus::delivered());
        assert!(executor.stage_of(&caravan.claim_id).is_none());
    }

    #[test]
    fn failing_stage_without_fallback_fails_the_pipeline() {
        let mut executor = mk_executor(two_stage_pipeline(None));
        let mut caravan = mk_caravan(CaravanStatus::ready_for_review());
        let mut runner = ScriptedRunner::new(vec![StageStatus::Fail]);

        executor
            .advance(&mut caravan, &mut runner, Utc::now())
            .expect("enter");
        let outcome = executor
            .advance(&mut caravan, &mut runner, Utc::now())
            .expect("A fails");

        assert_eq!(
            outcome,
            Advance::Failed {
                stage: "A".to_string()
            }
        );
        assert_eq!(caravan.status, CaravanStatus::pipeline_failed());
    }

    #[test]
    fn pending_stage_changes_nothing_and_is_reevaluated() {
        let mut executor = mk_executor(two_stage_pipeline(None));
        let mut caravan = mk_caravan(CaravanStatus::ready_for_review());
        let mut runner =
            ScriptedRunner::new(vec![StageStatus::Pending, StageStatus::Pending]);

        executor
            .advance(&mut caravan, &mut runner, Utc::now())
            .expect("enter");
        for _ in 0..2 {
            let outcome = executor
                .advance(&mut caravan, &mut runner, Utc::now())
                .expect("pending poll");
            assert_eq!(
                outcome,
                Advance::Pending {
                    stage: "A".to_string()
                }
            );
        }
        assert_eq!(caravan.status, CaravanStatus::ready_for_review());
        assert_eq!(
            executor.stage_of(&caravan.claim_id).map(|s| s.name.as_str()),
            Some("A")
        );
    }

    #[test]
    fn missing_required_input_halts_before_the_runner() {
        let mut pipeline = two_stage_pipeline(None);
        pipeline.stages[0] = Stage::processor("A", "runner-a")
            .with_required_input("pr_template", "definitely/not/here.md");
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut executor = PipelineExecutor::new(pipeline, tmp.path());

        let mut caravan = mk_caravan(CaravanStatus::ready_for_review());
        let mut runner = ScriptedRunner::new(vec![StageStatus::Pass]);

        executor
            .advance(&mut caravan, &mut runner, Utc::now())
            .expect("enter");
        let err = executor
            .advance(&mut caravan, &mut runner, Utc::now())
            .expect_err("missing input should halt");
        assert!(matches!(
            err,
            GoldflowError::MissingInput { ref key, .. } if key == "pr_template"
        ));
        // The runner never ran and the caravan kept its stage and status.
        assert!(runner.calls.is_empty());
        assert_eq!(caravan.status, CaravanStatus::ready_for_review());
        assert_eq!(
            executor.stage_of(&caravan.claim_id).map(|s| s.name.as_str()),
            Some("A")
        );
    }

    #[test]
    fn required_input_present_lets_the_stage_run() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let template = tmp.path().join("PULL_REQUEST_TEMPLATE.md");
        std::fs::write(&template, "## Summary\n").expect("write template");

        let mut pipeline = two_stage_pipeline(None);
        pipeline.stages[0] = Stage::processor("A", "runner-a")
            .with_required_input("pr_template", "PULL_REQUEST_TEMPLATE.md");
        let mut executor = PipelineExecutor::new(pipeline, tmp.path());

        let mut caravan = mk_caravan(CaravanStatus::ready_for_review());
        let mut runner = ScriptedRunner::new(vec![StageStatus::Pass]);

        executor
            .advance(&mut caravan, &mut runner, Utc::now())
            .expect("enter");
        let outcome = executor
            .advance(&mut caravan, &mut runner, Utc::now())
            .expect("stage runs");
        assert_eq!(
            outcome,
            Advance::Passed {
                from: "A".to_string(),
                to: "B".to_string()
            }
        );
        assert_eq!(runner.calls, vec!["A".to_string()]);
    }

    #[test]
    fn delivery_review_gate_failure_returns_to_miner_without_advancing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut executor = PipelineExecutor::new(delivery_pipeline(), tmp.path());
        let mut caravan = mk_caravan(CaravanStatus::ready_for_review());
        let mut runner = ScriptedRunner::new(vec![StageStatus::Fail]);

        let outcome = executor
            .advance(&mut caravan, &mut runner, Utc::now())
            .expect("enter");
        assert_eq!(
            outcome,
            Advance::Entered {
                stage: "review-gate-1".to_string()
            }
        );

        let outcome = executor
            .advance(&mut caravan, &mut runner, Utc::now())
            .expect("review-gate-1 fails");
        assert_eq!(
            outcome,
            Advance::ReturnedTo {
                stage: "review-gate-1".to_string(),
                status: CaravanStatus::new(RETURN_TO_MINER)
            }
        );
        assert_eq!(caravan.status, CaravanStatus::new(RETURN_TO_MINER));
        // The stage pointer never moved past review-gate-1.
        assert_eq!(runner.calls, vec!["review-gate-1".to_string()]);
        assert!(executor.stage_of(&caravan.claim_id).is_none());
    }

    #[test]
    fn exit_drops_the_caravan_without_touching_status() {
        let mut executor = mk_executor(two_stage_pipeline(None));
        let mut caravan = mk_caravan(CaravanStatus::ready_for_review());
        let mut runner = ScriptedRunner::new(vec![]);

        executor
            .advance(&mut caravan, &mut runner, Utc::now())
            .expect("enter");
        executor.exit(&caravan.claim_id);
        assert!(executor.stage_of(&caravan.claim_id).is_none());
        assert_eq!(caravan.status, CaravanStatus::ready_for_review());
    }
}
