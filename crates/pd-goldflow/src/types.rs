//! Pipeline and stage definitions. Defined statically, never mutated at
//! runtime.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use pd_core::state::CaravanStatus;

/// What evaluates a stage: a processor (an agent role or tool that does the
/// work) or a verifier (an external check that only judges).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRunnerRef {
    Processor(String),
    Verifier(String),
}

impl StageRunnerRef {
    pub fn name(&self) -> &str {
        match self {
            StageRunnerRef::Processor(name) | StageRunnerRef::Verifier(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub name: String,
    pub runner: StageRunnerRef,
    /// Capabilities the processor must carry (informational for spawn).
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// External inputs that must exist before the stage may run.
    #[serde(default)]
    pub required_inputs: BTreeMap<String, PathBuf>,
    /// Where to send the caravan when this stage fails. Without a fallback,
    /// a failure fails the whole pipeline.
    #[serde(default)]
    pub on_fail: Option<CaravanStatus>,
}

impl Stage {
    pub fn processor(name: &str, runner: &str) -> Self {
        Self {
            name: name.to_string(),
            runner: StageRunnerRef::Processor(runner.to_string()),
            capabilities: Vec::new(),
            required_inputs: BTreeMap::new(),
            on_fail: None,
        }
    }

    pub fn verifier(name: &str, runner: &str) -> Self {
        Self {
            name: name.to_string(),
            runner: StageRunnerRef::Verifier(runner.to_string()),
            capabilities: Vec::new(),
            required_inputs: BTreeMap::new(),
            on_fail: None,
        }
    }

    pub fn with_capability(mut self, capability: &str) -> Self {
        self.capabilities.push(capability.to_string());
        self
    }

    pub fn with_required_input(mut self, key: &str, path: impl Into<PathBuf>) -> Self {
        self.required_inputs.insert(key.to_string(), path.into());
        self
    }

    pub fn with_on_fail(mut self, status: CaravanStatus) -> Self {
        self.on_fail = Some(status);
        self
    }
}

/// The condition that pulls a caravan into a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    StatusEquals(CaravanStatus),
}

impl Trigger {
    pub fn matches(&self, status: &CaravanStatus) -> bool {
        match self {
            Trigger::StatusEquals(wanted) => status == wanted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub name: String,
    pub trigger: Trigger,
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn stage(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index)
    }
}
