//! Core types for the paydirt orchestration engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::state::{CaravanStatus, IssueKind, IssueStatus};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IssueId(pub String);

impl IssueId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for IssueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IssueId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimId(pub String);

impl ClaimId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a claim id from a timestamp: `pd-` plus base-36 millis.
    pub fn generate(at: DateTime<Utc>) -> Self {
        let millis = at.timestamp_millis().max(0) as u64;
        Self(format!("pd-{}", to_base36(millis)))
    }
}

impl std::fmt::Display for ClaimId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ClaimId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EventId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A Caravan's display name, derived from its task text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaravanName(pub String);

impl CaravanName {
    /// Derive a name from free-form task text: first 30 characters,
    /// whitespace collapsed to dashes, lowercased.
    pub fn from_task(task: &str) -> Self {
        let prefix: String = task.chars().take(30).collect();
        let mut out = String::with_capacity(prefix.len());
        let mut last_dash = false;
        for ch in prefix.trim().chars() {
            if ch.is_whitespace() {
                if !last_dash {
                    out.push('-');
                    last_dash = true;
                }
            } else {
                for lower in ch.to_lowercase() {
                    out.push(lower);
                }
                last_dash = false;
            }
        }
        Self(out)
    }

    pub fn standalone(role: ProspectRole) -> Self {
        Self(format!("standalone-{}", role.as_str()))
    }
}

impl std::fmt::Display for CaravanName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A terminal-multiplexer session name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionName(pub String);

impl SessionName {
    /// The canonical session name for a caravan: `paydirt-<claim>`.
    pub fn for_claim(prefix: &str, claim_id: &ClaimId) -> Self {
        Self(format!("{prefix}-{claim_id}"))
    }

    /// The deterministic session name for the resolver of a decision issue.
    /// Keyed on the decision-issue id so duplicate spawn requests collide on
    /// the same session name.
    pub fn for_resolver(prefix: &str, decision: &IssueId) -> Self {
        Self(format!("{prefix}-pm-{decision}"))
    }
}

impl std::fmt::Display for SessionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Issue priority on the tracker's numeric scale — lower is more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssuePriority(pub u8);

impl IssuePriority {
    /// Decision issues outrank ordinary work.
    pub const DECISION: IssuePriority = IssuePriority(1);
    pub const WORK: IssuePriority = IssuePriority(3);

    pub fn as_arg(self) -> String {
        self.0.to_string()
    }
}

/// Agent roles — a closed enumeration. Selected at spawn time, immutable for
/// the life of the process instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProspectRole {
    CampBoss,
    TrailBoss,
    Surveyor,
    ShiftBoss,
    Miner,
    Assayer,
    Canary,
    Smelter,
    ClaimAgent,
    Scout,
}

impl ProspectRole {
    pub const ALL: [ProspectRole; 10] = [
        ProspectRole::CampBoss,
        ProspectRole::TrailBoss,
        ProspectRole::Surveyor,
        ProspectRole::ShiftBoss,
        ProspectRole::Miner,
        ProspectRole::Assayer,
        ProspectRole::Canary,
        ProspectRole::Smelter,
        ProspectRole::ClaimAgent,
        ProspectRole::Scout,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProspectRole::CampBoss => "camp-boss",
            ProspectRole::TrailBoss => "trail-boss",
            ProspectRole::Surveyor => "surveyor",
            ProspectRole::ShiftBoss => "shift-boss",
            ProspectRole::Miner => "miner",
            ProspectRole::Assayer => "assayer",
            ProspectRole::Canary => "canary",
            ProspectRole::Smelter => "smelter",
            ProspectRole::ClaimAgent => "claim-agent",
            ProspectRole::Scout => "scout",
        }
    }

    /// The prospect definition file for this role, relative to the
    /// prospects directory.
    pub fn definition_file(self) -> String {
        format!("{}.md", self.as_str())
    }
}

impl std::str::FromStr for ProspectRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "camp-boss" => Ok(ProspectRole::CampBoss),
            "trail-boss" => Ok(ProspectRole::TrailBoss),
            "surveyor" => Ok(ProspectRole::Surveyor),
            "shift-boss" => Ok(ProspectRole::ShiftBoss),
            "miner" => Ok(ProspectRole::Miner),
            "assayer" => Ok(ProspectRole::Assayer),
            "canary" => Ok(ProspectRole::Canary),
            "smelter" => Ok(ProspectRole::Smelter),
            "claim-agent" => Ok(ProspectRole::ClaimAgent),
            "scout" => Ok(ProspectRole::Scout),
            other => {
                let valid = ProspectRole::ALL
                    .iter()
                    .map(|role| role.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(format!("invalid prospect role '{other}'. valid roles: {valid}"))
            }
        }
    }
}

impl std::fmt::Display for ProspectRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of trackable work or a blocking question, as cached by the engine.
/// The issue tracker itself remains the durable source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: IssueId,
    pub kind: IssueKind,
    pub status: IssueStatus,
    pub title: String,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    #[serde(default)]
    pub dependencies: BTreeSet<IssueId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Issue {
    pub fn new(id: IssueId, kind: IssueKind, title: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id,
            kind,
            status: IssueStatus::Open,
            title: title.into(),
            labels: BTreeSet::new(),
            dependencies: BTreeSet::new(),
            created_at: at,
            updated_at: at,
        }
    }
}

/// One long-running coordinated unit of work, bound to one terminal session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caravan {
    pub claim_id: ClaimId,
    pub name: CaravanName,
    pub task: String,
    pub status: CaravanStatus,
    pub role: ProspectRole,
    /// The work issue the caravan's agent is driving, once known.
    #[serde(default)]
    pub work_issue: Option<IssueId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Caravan {
    pub fn new(
        claim_id: ClaimId,
        name: CaravanName,
        task: impl Into<String>,
        role: ProspectRole,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            claim_id,
            name,
            task: task.into(),
            status: CaravanStatus::staked(),
            role,
            work_issue: None,
            created_at: at,
            updated_at: at,
        }
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
