//! The delivery pipeline.
//!
//! Triggered when a caravan is ready for review. Runs through the review
//! gates, creates the PR, waits for CI, then sinks.

use pd_core::state::CaravanStatus;

use crate::types::{Pipeline, Stage, Trigger};

pub const RETURN_TO_MINER: &str = "return_to_miner";

pub fn delivery_pipeline() -> Pipeline {
    Pipeline {
        name: "delivery".to_string(),
        trigger: Trigger::StatusEquals(CaravanStatus::ready_for_review()),
        stages: vec![
            Stage::processor("review-gate-1", "assayer")
                .with_capability("requesting-code-review")
                .with_on_fail(CaravanStatus::new(RETURN_TO_MINER)),
            Stage::processor("review-gate-2", "code-review-toolkit")
                .with_on_fail(CaravanStatus::new(RETURN_TO_MINER)),
            Stage::processor("pr-creation", "trail-boss")
                .with_capability("finishing-a-development-branch")
                .with_required_input("pr_template", ".github/PULL_REQUEST_TEMPLATE.md"),
            Stage::verifier("ci-gate", "github-actions")
                .with_on_fail(CaravanStatus::new(RETURN_TO_MINER)),
            Stage::processor("delivered", "sink"),
        ],
    }
}
