//! Validation for engine configuration.

use serde::{Deserialize, Serialize};

use crate::config::PaydirtConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub level: ValidationLevel,
    pub code: &'static str,
    pub message: String,
}

pub trait Validate {
    fn validate(&self) -> Vec<ValidationIssue>;
}

impl Validate for PaydirtConfig {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.tracker.decision_label.trim().is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "tracker.decision_label.empty",
                message: "decision label is empty — no create command can ever match"
                    .to_string(),
            });
        } else if !self.tracker.decision_label.contains(':') {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "tracker.decision_label.unnamespaced",
                message: format!(
                    "decision label '{}' has no namespace — it may collide with user labels",
                    self.tracker.decision_label
                ),
            });
        }

        if self.tracker.decision_priority >= self.tracker.work_priority {
            issues.push(ValidationIssue {
                level: ValidationLevel::Warning,
                code: "tracker.priority.decision_not_higher",
                message: format!(
                    "decision priority {} does not outrank work priority {} — resolvers may starve",
                    self.tracker.decision_priority, self.tracker.work_priority
                ),
            });
        }

        if self.sessions.session_prefix.trim().is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "sessions.session_prefix.empty",
                message: "session prefix is empty — session names would collide with user sessions"
                    .to_string(),
            });
        }

        if self.engine.collaborator_timeout_secs == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "engine.timeout.zero",
                message: "collaborator timeout cannot be 0".to_string(),
            });
        }

        if self.engine.backoff_max_attempts == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "engine.backoff.attempts_zero",
                message: "backoff attempts must be greater than zero — transient tracker outages would be fatal"
                    .to_string(),
            });
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::{Validate, ValidationLevel};
    use crate::config::PaydirtConfig;

    #[test]
    fn default_config_is_valid() {
        let config = PaydirtConfig::default();
        assert!(config.validate().is_empty());
    }

    #[test]
    fn empty_decision_label_is_an_error() {
        let mut config = PaydirtConfig::default();
        config.tracker.decision_label = "  ".to_string();

        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|issue| issue.code == "tracker.decision_label.empty"
                && issue.level == ValidationLevel::Error));
    }

    #[test]
    fn unnamespaced_decision_label_is_a_warning() {
        let mut config = PaydirtConfig::default();
        config.tracker.decision_label = "decision".to_string();

        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|issue| issue.code == "tracker.decision_label.unnamespaced"
                && issue.level == ValidationLevel::Warning));
    }

    #[test]
    fn inverted_priorities_are_flagged() {
        let mut config = PaydirtConfig::default();
        config.tracker.decision_priority = 3;
        config.tracker.work_priority = 1;

        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|issue| issue.code == "tracker.priority.decision_not_higher"));
    }

    #[test]
    fn zero_timeout_and_zero_attempts_are_errors() {
        let mut config = PaydirtConfig::default();
        config.engine.collaborator_timeout_secs = 0;
        config.engine.backoff_max_attempts = 0;

        let issues = config.validate();
        assert!(issues.iter().any(|issue| issue.code == "engine.timeout.zero"));
        assert!(issues
            .iter()
            .any(|issue| issue.code == "engine.backoff.attempts_zero"));
    }
}
