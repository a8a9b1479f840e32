use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use pd_core::state::IssueStatus;
use pd_core::types::IssueId;

/// What the engine needs to know about an issue from `bd show`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSnapshot {
    pub status: IssueStatus,
    pub labels: BTreeSet<String>,
    pub dependencies: BTreeSet<IssueId>,
}

/// Extract the id the tracker prints after creating an issue
/// ("Created issue: <id>"). Explicit parser — no incidental string shape.
pub fn parse_created_issue_id(output: &str) -> Option<IssueId> {
    for line in output.lines() {
        if let Some(rest) = line.split("Created issue:").nth(1) {
            let token = rest.split_whitespace().next()?;
            return Some(IssueId::new(token));
        }
    }
    None
}

/// Parse the JSON document printed by `bd show <id> --json`.
///
/// Tolerates both a bare issue object and a `{"issue": {...}}` wrapper, and
/// dependencies given either as id strings or as objects carrying an `id`
/// field. Any status other than "closed" counts as open — the tracker has
/// richer states, the engine only needs open/closed.
pub fn parse_show_json(raw: &str) -> Result<IssueSnapshot, String> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|err| format!("invalid json: {err}"))?;
    let issue = value.get("issue").unwrap_or(&value);

    let status_tag = issue
        .get("status")
        .and_then(|v| v.as_str())
        .ok_or_else(|| "missing 'status' field".to_string())?;
    let status = if status_tag.eq_ignore_ascii_case("closed") {
        IssueStatus::Closed
    } else {
        IssueStatus::Open
    };

    let labels = issue
        .get("labels")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str())
                .map(str::to_string)
                .collect::<BTreeSet<_>>()
        })
        .unwrap_or_default();

    let dependencies = issue
        .get("dependencies")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .or_else(|| {
                            item.get("id")
                                .and_then(|id| id.as_str())
                                .map(str::to_string)
                        })
                })
                .map(IssueId::new)
                .collect::<BTreeSet<_>>()
        })
        .unwrap_or_default();

    Ok(IssueSnapshot {
        status,
        labels,
        dependencies,
    })
}

/// Parse the JSON document printed by `bd comments <id> --json`: an ordered
/// array of either bare strings or objects carrying a `text` field.
pub fn parse_comments_json(raw: &str) -> Result<Vec<String>, String> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|err| format!("invalid json: {err}"))?;
    let items = value
        .as_array()
        .or_else(|| value.get("comments").and_then(|v| v.as_array()))
        .ok_or_else(|| "expected a json array of comments".to_string())?;

    Ok(items
        .iter()
        .filter_map(|item| {
            item.as_str()
                .map(str::to_string)
                .or_else(|| {
                    item.get("text")
                        .and_then(|text| text.as_str())
                        .map(str::to_string)
                })
        })
        .collect())
}
