//! File-based stage runner.
//!
//! Processors and verifiers report stage verdicts by dropping a file at
//! `<gates_root>/<claim>/<stage>` containing `pass` or `fail` — the same
//! drop-file convention the dashboard uses for new-caravan notifications.
//! A missing or not-yet-decided file leaves the stage pending, which the
//! poll-based executor simply re-evaluates next tick.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use pd_core::types::{Caravan, ClaimId};
use pd_goldflow::{GoldflowError, Stage, StageRunner, StageStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileGateRunner {
    pub gates_root: PathBuf,
}

impl FileGateRunner {
    pub fn new(gates_root: impl Into<PathBuf>) -> Self {
        Self {
            gates_root: gates_root.into(),
        }
    }

    pub fn verdict_path(&self, claim_id: &ClaimId, stage: &str) -> PathBuf {
        self.gates_root.join(&claim_id.0).join(stage)
    }
}

impl StageRunner for FileGateRunner {
    fn run_stage(&mut self, caravan: &Caravan, stage: &Stage) -> Result<StageStatus, GoldflowError> {
        let path = self.verdict_path(&caravan.claim_id, &stage.name);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(parse_verdict(&text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(StageStatus::Pending),
            Err(err) => Err(GoldflowError::Collaborator {
                stage: stage.name.clone(),
                message: format!("cannot read verdict file {}: {err}", path.display()),
            }),
        }
    }
}

fn parse_verdict(text: &str) -> StageStatus {
    match text.trim().to_ascii_lowercase().as_str() {
        "pass" | "ok" => StageStatus::Pass,
        "fail" => StageStatus::Fail,
        // Anything else is a verdict still being written.
        _ => StageStatus::Pending,
    }
}

/// Drop a verdict file the way a processor would.
pub fn write_verdict(
    gates_root: &Path,
    claim_id: &ClaimId,
    stage: &str,
    verdict: &str,
) -> std::io::Result<()> {
    let dir = gates_root.join(&claim_id.0);
    fs::create_dir_all(&dir)?;
    fs::write(dir.join(stage), verdict)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use pd_core::types::{Caravan, CaravanName, ClaimId, ProspectRole};
    use pd_goldflow::{Stage, StageRunner, StageStatus};

    use super::{write_verdict, FileGateRunner};

    fn mk_caravan() -> Caravan {
        Caravan::new(
            ClaimId::new("pd-abc"),
            CaravanName("test".to_string()),
            "Test task",
            ProspectRole::Miner,
            Utc::now(),
        )
    }

    #[test]
    fn missing_verdict_file_is_pending() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut runner = FileGateRunner::new(tmp.path());
        let status = runner
            .run_stage(&mk_caravan(), &Stage::processor("review-gate-1", "assayer"))
            .expect("run stage");
        assert_eq!(status, StageStatus::Pending);
    }

    #[test]
    fn pass_and_fail_verdicts_are_read_back() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let caravan = mk_caravan();
        let mut runner = FileGateRunner::new(tmp.path());

        write_verdict(tmp.path(), &caravan.claim_id, "review-gate-1", "pass\n")
            .expect("write pass");
        let status = runner
            .run_stage(&caravan, &Stage::processor("review-gate-1", "assayer"))
            .expect("run stage");
        assert_eq!(status, StageStatus::Pass);

        write_verdict(tmp.path(), &caravan.claim_id, "ci-gate", "FAIL").expect("write fail");
        let status = runner
            .run_stage(&caravan, &Stage::verifier("ci-gate", "github-actions"))
            .expect("run stage");
        assert_eq!(status, StageStatus::Fail);
    }

    #[test]
    fn unparseable_verdict_stays_pending() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let caravan = mk_caravan();
        write_verdict(tmp.path(), &caravan.claim_id, "review-gate-1", "writing...")
            .expect("write partial");

        let mut runner = FileGateRunner::new(tmp.path());
        let status = runner
            .run_stage(&caravan, &Stage::processor("review-gate-1", "assayer"))
            .expect("run stage");
        assert_eq!(status, StageStatus::Pending);
    }
}
