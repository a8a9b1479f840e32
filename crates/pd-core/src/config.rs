//! Configuration for the paydirt engine.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize config at {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: toml::ser::Error,
    },
    #[error("failed to create config parent directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write config file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaydirtConfig {
    pub tracker: TrackerConfig,
    pub sessions: SessionsConfig,
    pub engine: EngineConfig,
}

/// Issue-tracker collaborator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Issue tracker binary.
    pub bd_bin: String,
    /// Label that marks an issue as a blocking decision.
    pub decision_label: String,
    /// Numeric priority for decision issues (lower is more urgent).
    pub decision_priority: u8,
    /// Numeric priority for ordinary work issues.
    pub work_priority: u8,
}

/// Session-launcher collaborator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Terminal multiplexer binary.
    pub tmux_bin: String,
    /// Prefix for session names (`<prefix>-<claim>`).
    pub session_prefix: String,
    /// Agent runtime binary launched inside each session.
    pub agent_bin: String,
    /// Paydirt installation directory (holds prospect definitions).
    pub install_dir: PathBuf,
    /// Project directory agents work in. Defaults to the cwd when absent.
    #[serde(default)]
    pub project_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to the sqlite ledger.
    pub ledger_path: PathBuf,
    /// Root directory for the JSONL event log.
    pub event_log_root: PathBuf,
    /// Directory where stage runners drop gate verdict files.
    pub gates_root: PathBuf,
    /// Timeout for each collaborator call, in seconds.
    pub collaborator_timeout_secs: u64,
    /// Retry attempts for collaborator calls that time out or fail to spawn.
    pub backoff_max_attempts: u32,
    /// Base delay for exponential backoff, in milliseconds.
    pub backoff_base_ms: u64,
}

impl Default for PaydirtConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig {
                bd_bin: "bd".to_string(),
                decision_label: "pd:decision".to_string(),
                decision_priority: 1,
                work_priority: 3,
            },
            sessions: SessionsConfig {
                tmux_bin: "tmux".to_string(),
                session_prefix: "paydirt".to_string(),
                agent_bin: "claude".to_string(),
                install_dir: PathBuf::from("/opt/paydirt"),
                project_dir: None,
            },
            engine: EngineConfig {
                ledger_path: PathBuf::from(".paydirt/state.sqlite"),
                event_log_root: PathBuf::from(".paydirt/events"),
                gates_root: PathBuf::from(".paydirt/gates"),
                collaborator_timeout_secs: 30,
                backoff_max_attempts: 3,
                backoff_base_ms: 250,
            },
        }
    }
}

pub fn parse_config(contents: &str) -> Result<PaydirtConfig, toml::de::Error> {
    toml::from_str(contents)
}

pub fn load_config(path: impl AsRef<Path>) -> Result<PaydirtConfig, ConfigError> {
    let path_ref = path.as_ref();
    let body = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
        path: path_ref.to_path_buf(),
        source,
    })?;
    parse_config(&body).map_err(|source| ConfigError::Parse {
        path: path_ref.to_path_buf(),
        source,
    })
}

pub fn save_config(path: impl AsRef<Path>, config: &PaydirtConfig) -> Result<(), ConfigError> {
    let path_ref = path.as_ref();
    if let Some(parent_dir) = path_ref.parent().map(Path::to_path_buf) {
        fs::create_dir_all(&parent_dir).map_err(|source| ConfigError::CreateDir {
            path: parent_dir,
            source,
        })?;
    }

    let body = toml::to_string_pretty(config).map_err(|source| ConfigError::Serialize {
        path: path_ref.to_path_buf(),
        source,
    })?;
    fs::write(path_ref, body).map_err(|source| ConfigError::Write {
        path: path_ref.to_path_buf(),
        source,
    })?;
    Ok(())
}
