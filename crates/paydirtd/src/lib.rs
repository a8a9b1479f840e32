//! Paydirt engine crate — decision-gated orchestration over an issue
//! tracker and a terminal multiplexer.

pub mod decision_flow;
pub mod engine;
pub mod event_log;
pub mod gate_runner;
pub mod hook;
pub mod ledger;
pub mod retry;
pub mod tracker;

pub use decision_flow::*;
pub use engine::*;
pub use event_log::*;
pub use gate_runner::*;
pub use hook::*;
pub use ledger::*;
pub use retry::*;
pub use tracker::*;

#[cfg(test)]
mod tests {
    use super::{classify_command, CommandClass, DependencyTracker};
    use pd_core::types::IssueId;

    #[test]
    fn crate_root_reexports_classifier_and_tracker() {
        let class = classify_command("bd close pd-1", "pd:decision");
        assert_eq!(
            class,
            CommandClass::CloseIssue {
                issue_id: IssueId::new("pd-1")
            }
        );

        let tracker = DependencyTracker::new();
        assert!(!tracker.is_blocked(&IssueId::new("pd-w1")));
    }
}
