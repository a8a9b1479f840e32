use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum GoldflowError {
    /// A stage declares a required input that is absent. Configuration
    /// error: reported before the stage runs, the caravan keeps its prior
    /// state.
    #[error("stage '{stage}' of pipeline '{pipeline}' is missing required input '{key}' at {path}")]
    MissingInput {
        pipeline: String,
        stage: String,
        key: String,
        path: PathBuf,
    },
    /// The stage's processor or verifier could not be reached. The advance
    /// call aborts with no state change; the caller retries.
    #[error("stage '{stage}' collaborator unavailable: {message}")]
    Collaborator { stage: String, message: String },
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::GoldflowError;

    #[test]
    fn missing_input_names_pipeline_stage_and_key() {
        let err = GoldflowError::MissingInput {
            pipeline: "delivery".to_string(),
            stage: "pr-creation".to_string(),
            key: "pr_template".to_string(),
            path: PathBuf::from(".github/PULL_REQUEST_TEMPLATE.md"),
        };
        let text = err.to_string();
        assert!(text.contains("pr-creation"));
        assert!(text.contains("pr_template"));
        assert!(text.contains("delivery"));
    }

    #[test]
    fn collaborator_error_formats_stage_and_message() {
        let err = GoldflowError::Collaborator {
            stage: "ci-gate".to_string(),
            message: "verifier timed out".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "stage 'ci-gate' collaborator unavailable: verifier timed out"
        );
    }
}
