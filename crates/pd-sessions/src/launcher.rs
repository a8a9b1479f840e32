use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use pd_core::types::SessionName;

use crate::command::{build_agent_command, AgentCommandSpec};
use crate::error::LaunchError;

/// One session-launch request: the command spec plus where to run it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub spec: AgentCommandSpec,
    /// Working directory for the new session.
    pub workdir: PathBuf,
}

/// The session-launcher collaborator contract the engine consumes.
pub trait SessionLauncher {
    /// Create a detached session running the agent. Launching a session
    /// whose name already exists is the caller's idempotency check —
    /// `session_exists` first.
    fn launch(&self, request: &LaunchRequest) -> Result<SessionName, LaunchError>;
    fn session_exists(&self, name: &SessionName) -> Result<bool, LaunchError>;
    fn attach(&self, name: &SessionName) -> Result<(), LaunchError>;
}

/// `SessionLauncher` over the tmux CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxLauncher {
    pub tmux_bin: PathBuf,
}

impl Default for TmuxLauncher {
    fn default() -> Self {
        Self {
            tmux_bin: PathBuf::from("tmux"),
        }
    }
}

impl TmuxLauncher {
    pub fn new(tmux_bin: impl Into<PathBuf>) -> Self {
        Self {
            tmux_bin: tmux_bin.into(),
        }
    }

    /// Kill a session outright. Used by `abandon`; not part of the engine's
    /// launcher contract.
    pub fn kill_session(&self, name: &SessionName) -> Result<(), LaunchError> {
        let rendered = format!("{} kill-session -t {name}", self.tmux_bin.display());
        let output = Command::new(&self.tmux_bin)
            .args(["kill-session", "-t", name.as_ref()])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| LaunchError::Io {
                command: rendered.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(LaunchError::CommandFailed {
                command: rendered,
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }

    fn run_tmux(&self, args: &[&str]) -> Result<(), LaunchError> {
        let rendered = render_command(&self.tmux_bin, args);
        let output = Command::new(&self.tmux_bin)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| LaunchError::Io {
                command: rendered.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(LaunchError::CommandFailed {
                command: rendered,
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }
}

impl SessionLauncher for TmuxLauncher {
    fn launch(&self, request: &LaunchRequest) -> Result<SessionName, LaunchError> {
        if request.spec.prompt.trim().is_empty() {
            return Err(LaunchError::InvalidRequest {
                message: "prompt must not be empty".to_string(),
            });
        }

        let session = request.spec.session_name.clone();
        let agent_command = build_agent_command(&request.spec);
        self.run_tmux(&[
            "new-session",
            "-d",
            "-s",
            session.as_ref(),
            "-c",
            &request.workdir.display().to_string(),
            &agent_command,
        ])?;
        Ok(session)
    }

    fn session_exists(&self, name: &SessionName) -> Result<bool, LaunchError> {
        let rendered = format!("{} has-session -t {name}", self.tmux_bin.display());
        let output = Command::new(&self.tmux_bin)
            .args(["has-session", "-t", name.as_ref()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|source| LaunchError::Io {
                command: rendered,
                source,
            })?;
        // tmux exits non-zero both for "no such session" and for "no server
        // running" — either way the session is not there.
        Ok(output.status.success())
    }

    fn attach(&self, name: &SessionName) -> Result<(), LaunchError> {
        let rendered = format!("{} attach-session -t {name}", self.tmux_bin.display());
        let status = Command::new(&self.tmux_bin)
            .args(["attach-session", "-t", name.as_ref()])
            .status()
            .map_err(|source| LaunchError::Io {
                command: rendered.clone(),
                source,
            })?;
        if !status.success() {
            return Err(LaunchError::CommandFailed {
                command: rendered,
                status: status.code(),
                stderr: String::new(),
            });
        }
        Ok(())
    }
}

fn render_command(binary: &Path, args: &[&str]) -> String {
    let mut rendered = binary.to_string_lossy().into_owned();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(arg);
    }
    rendered
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pd_core::types::{CaravanName, ClaimId, ProspectRole, SessionName};

    use super::{LaunchRequest, SessionLauncher, TmuxLauncher};
    use crate::command::AgentCommandSpec;
    use crate::error::LaunchError;

    fn mk_request(prompt: &str) -> LaunchRequest {
        LaunchRequest {
            spec: AgentCommandSpec {
                role: ProspectRole::Miner,
                claim_id: ClaimId::new("pd-test"),
                caravan_name: CaravanName("test".to_string()),
                session_name: SessionName("paydirt-pd-test".to_string()),
                agent_bin: "claude".to_string(),
                install_dir: PathBuf::from("/opt/paydirt"),
                project_dir: PathBuf::from("/tmp"),
                bin_path: PathBuf::from("/usr/local/bin/paydirt"),
                prompt: prompt.to_string(),
            },
            workdir: PathBuf::from("/tmp"),
        }
    }

    #[test]
    fn launch_rejects_empty_prompt_before_spawning() {
        let launcher = TmuxLauncher::default();
        let err = launcher
            .launch(&mk_request("   "))
            .expect_err("empty prompt must fail");
        assert!(matches!(
            err,
            LaunchError::InvalidRequest { message } if message.contains("prompt")
        ));
    }

    #[test]
    fn missing_binary_classifies_as_io_error() {
        let launcher = TmuxLauncher::new("/definitely/missing/tmux-binary");
        let err = launcher
            .launch(&mk_request("do work"))
            .expect_err("missing binary should fail");
        assert!(err.is_unavailable());
        match err {
            LaunchError::Io { command, source } => {
                assert!(command.contains("/definitely/missing/tmux-binary"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected Io, got {other:?}"),
        }
    }

    #[test]
    fn session_exists_reports_false_without_a_server() {
        // `false` stands in for tmux's non-zero "no session" exit.
        let launcher = TmuxLauncher::new("false");
        let exists = launcher
            .session_exists(&SessionName("paydirt-nope".to_string()))
            .expect("probe should not error");
        assert!(!exists);
    }

    #[test]
    fn session_exists_reports_true_on_success_exit() {
        let launcher = TmuxLauncher::new("true");
        let exists = launcher
            .session_exists(&SessionName("paydirt-yes".to_string()))
            .expect("probe should not error");
        assert!(exists);
    }

    #[test]
    fn launch_request_round_trips_through_json() {
        let request = mk_request("do work");
        let json = serde_json::to_string(&request).expect("serialize request");
        let decoded: LaunchRequest = serde_json::from_str(&json).expect("deserialize request");
        assert_eq!(decoded, request);
    }
}
