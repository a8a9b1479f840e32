//! Session-launcher collaborator — wraps tmux behind the `SessionLauncher`
//! contract and builds the agent invocation each session runs.

pub mod command;
pub mod error;
pub mod launcher;

pub use command::{
    build_agent_command, build_env_vars, prospect_path, shell_quote, AgentCommandSpec,
};
pub use error::LaunchError;
pub use launcher::{LaunchRequest, SessionLauncher, TmuxLauncher};
