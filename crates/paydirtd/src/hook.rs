//! Hook dispatcher — classifies observed tool-invocation commands.
//!
//! Classification is a pure function of the command text: a structured
//! tokenizer plus explicit verb/flag/label rules, stateless per call.
//! Anything that matches neither recognized shape is dropped silently.

use serde::{Deserialize, Serialize};

use pd_core::types::{ClaimId, IssueId};

/// One observed tool invocation or lifecycle transition, consumed once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HookEvent {
    ToolCommand {
        claim_id: ClaimId,
        /// The work issue the emitting caravan is driving, when known.
        #[serde(default)]
        work_issue: Option<IssueId>,
        command: String,
    },
    IssueClosed {
        issue_id: IssueId,
    },
}

/// The classification of one raw command string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandClass {
    CreateDecision { title: String, labels: Vec<String> },
    CloseIssue { issue_id: IssueId },
    Unrecognized,
}

/// Classify a raw command string against the recognized shapes.
///
/// An issue-creation command counts as `CreateDecision` when it carries both
/// a title and the decision label, with the label flag in either the
/// space-separated or the equals-separated form. A close command yields the
/// first token after the close verb as the issue id.
pub fn classify_command(command: &str, decision_label: &str) -> CommandClass {
    let tokens = tokenize(command);
    if tokens.len() < 2 || tokens[0] != "bd" {
        return CommandClass::Unrecognized;
    }

    match tokens[1].as_str() {
        "create" => classify_create(&tokens[2..], decision_label),
        "close" => classify_close(&tokens[2..]),
        _ => CommandClass::Unrecognized,
    }
}

fn classify_create(args: &[String], decision_label: &str) -> CommandClass {
    let mut labels = Vec::new();
    let mut title: Option<String> = None;

    let mut index = 0;
    while index < args.len() {
        if let Some(value) = flag_value(args, &mut index, "--label") {
            labels.push(value);
            continue;
        }
        if let Some(value) = flag_value(args, &mut index, "--title") {
            title = Some(value);
            continue;
        }
        index += 1;
    }

    match title {
        Some(title) if labels.iter().any(|label| label == decision_label) => {
            CommandClass::CreateDecision { title, labels }
        }
        _ => CommandClass::Unrecognized,
    }
}

fn classify_close(args: &[String]) -> CommandClass {
    match args.first() {
        Some(token) if !token.starts_with('-') => CommandClass::CloseIssue {
            issue_id: IssueId::new(token.as_str()),
        },
        _ => CommandClass::Unrecognized,
    }
}

/// Read a `--flag value` or `--flag=value` pair at `args[*index]`, advancing
/// the index past what was consumed.
fn flag_value(args: &[String], index: &mut usize, flag: &str) -> Option<String> {
    let token = args.get(*index)?;
    if token == flag {
        let value = args.get(*index + 1)?.clone();
        *index += 2;
        return Some(value);
    }
    if let Some(rest) = token.strip_prefix(flag) {
        if let Some(value) = rest.strip_prefix('=') {
            *index += 1;
            return Some(value.to_string());
        }
    }
    None
}

/// Split a shell-like command into tokens, honoring single and double
/// quotes. No escape processing — hook payloads are already unescaped.
fn tokenize(command: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for ch in command.chars() {
        match quote {
            Some(q) => {
                if ch == q {
                    quote = None;
                } else {
                    current.push(ch);
                }
            }
            None => {
                if ch == '\'' || ch == '"' {
                    quote = Some(ch);
                    in_token = true;
                } else if ch.is_whitespace() {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                } else {
                    current.push(ch);
                    in_token = true;
                }
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}
