use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use pd_core::state::IssueKind;
use pd_core::types::{IssueId, IssuePriority};

use crate::command::BeadsCli;
use crate::error::BeadsError;
use crate::types::{parse_comments_json, parse_created_issue_id, parse_show_json, IssueSnapshot};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateIssue {
    pub title: String,
    pub kind: IssueKind,
    pub labels: Vec<String>,
    pub priority: IssuePriority,
}

/// The issue-tracker collaborator contract the engine consumes. All calls
/// are synchronous request/response.
pub trait IssueStore {
    fn create(&self, req: &CreateIssue) -> Result<IssueId, BeadsError>;
    fn close(&self, id: &IssueId, reason: &str) -> Result<(), BeadsError>;
    fn show(&self, id: &IssueId) -> Result<IssueSnapshot, BeadsError>;
    fn add_dependency(&self, from: &IssueId, to: &IssueId) -> Result<(), BeadsError>;
    fn add_comment(&self, id: &IssueId, text: &str) -> Result<(), BeadsError>;
    fn list_comments(&self, id: &IssueId) -> Result<Vec<String>, BeadsError>;
}

/// `IssueStore` over the `bd` CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeadsStore {
    pub cli: BeadsCli,
    pub workdir: PathBuf,
}

impl BeadsStore {
    pub fn new(cli: BeadsCli, workdir: impl Into<PathBuf>) -> Self {
        Self {
            cli,
            workdir: workdir.into(),
        }
    }
}

/// Arguments for `bd create`. The tracker's type vocabulary does not
/// distinguish decisions — the decision label does — so both kinds map to
/// the task type.
pub fn create_args(req: &CreateIssue) -> Vec<String> {
    let mut args = vec![
        "create".to_string(),
        "--title".to_string(),
        req.title.clone(),
        "--type".to_string(),
        "task".to_string(),
        "--priority".to_string(),
        req.priority.as_arg(),
    ];
    for label in &req.labels {
        args.push("--label".to_string());
        args.push(label.clone());
    }
    args
}

impl IssueStore for BeadsStore {
    fn create(&self, req: &CreateIssue) -> Result<IssueId, BeadsError> {
        let args = create_args(req);
        let output = self.cli.run(&self.workdir, &args)?;
        parse_created_issue_id(&output.stdout).ok_or_else(|| BeadsError::ParseOutput {
            command: format!("{} create", self.cli.binary.display()),
            message: format!("no 'Created issue:' line in output: {}", output.stdout),
        })
    }

    fn close(&self, id: &IssueId, reason: &str) -> Result<(), BeadsError> {
        self.cli
            .run(&self.workdir, ["close", id.as_ref(), "--reason", reason])?;
        Ok(())
    }

    fn show(&self, id: &IssueId) -> Result<IssueSnapshot, BeadsError> {
        let output = self.cli.run(&self.workdir, ["show", id.as_ref(), "--json"])?;
        parse_show_json(&output.stdout).map_err(|message| BeadsError::ParseOutput {
            command: format!("{} show {id} --json", self.cli.binary.display()),
            message,
        })
    }

    fn add_dependency(&self, from: &IssueId, to: &IssueId) -> Result<(), BeadsError> {
        self.cli
            .run(&self.workdir, ["dep", "add", from.as_ref(), to.as_ref()])?;
        Ok(())
    }

    fn add_comment(&self, id: &IssueId, text: &str) -> Result<(), BeadsError> {
        self.cli
            .run(&self.workdir, ["comments", "add", id.as_ref(), text])?;
        Ok(())
    }

    fn list_comments(&self, id: &IssueId) -> Result<Vec<String>, BeadsError> {
        let output = self
            .cli
            .run(&self.workdir, ["comments", id.as_ref(), "--json"])?;
        parse_comments_json(&output.stdout).map_err(|message| BeadsError::ParseOutput {
            command: format!("{} comments {id} --json", self.cli.binary.display()),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use pd_core::state::IssueKind;
    use pd_core::types::IssuePriority;

    use super::{create_args, CreateIssue};

    fn mk_request() -> CreateIssue {
        CreateIssue {
            title: "DECISION: Which auth provider?".to_string(),
            kind: IssueKind::Decision,
            labels: vec!["pd:decision".to_string(), "e2e-test".to_string()],
            priority: IssuePriority::DECISION,
        }
    }

    #[test]
    fn create_args_include_title_type_and_priority() {
        let args = create_args(&mk_request());
        assert_eq!(args[0], "create");
        assert!(args.windows(2).any(|pair| {
            pair[0] == "--title" && pair[1] == "DECISION: Which auth provider?"
        }));
        assert!(args.windows(2).any(|pair| pair[0] == "--type" && pair[1] == "task"));
        assert!(args.windows(2).any(|pair| pair[0] == "--priority" && pair[1] == "1"));
    }

    #[test]
    fn create_args_repeat_label_flag_per_label() {
        let args = create_args(&mk_request());
        let labels: Vec<&String> = args
            .windows(2)
            .filter(|pair| pair[0] == "--label")
            .map(|pair| &pair[1])
            .collect();
        assert_eq!(labels, vec!["pd:decision", "e2e-test"]);
    }

    #[test]
    fn create_args_for_work_issue_use_work_priority() {
        let req = CreateIssue {
            title: "Implement auth feature".to_string(),
            kind: IssueKind::Work,
            labels: Vec::new(),
            priority: IssuePriority::WORK,
        };
        let args = create_args(&req);
        assert!(args.windows(2).any(|pair| pair[0] == "--priority" && pair[1] == "3"));
        assert!(!args.iter().any(|arg| arg == "--label"));
    }
}
