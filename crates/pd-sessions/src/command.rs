//! Builds the agent invocation that runs inside a launched session.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use pd_core::types::{CaravanName, ClaimId, ProspectRole, SessionName};

/// Everything needed to render one agent invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCommandSpec {
    pub role: ProspectRole,
    pub claim_id: ClaimId,
    pub caravan_name: CaravanName,
    pub session_name: SessionName,
    /// Agent runtime binary (e.g. `claude`).
    pub agent_bin: String,
    /// Paydirt installation directory (plugin resources, prospect files).
    pub install_dir: PathBuf,
    /// The user's project directory the agent works in.
    pub project_dir: PathBuf,
    /// Path to the paydirt executable, handed to agents as `PAYDIRT_BIN`.
    pub bin_path: PathBuf,
    pub prompt: String,
}

/// Environment variables every launched agent process receives.
pub fn build_env_vars(spec: &AgentCommandSpec) -> Vec<(String, String)> {
    vec![
        ("PAYDIRT_PROSPECT".to_string(), spec.role.as_str().to_string()),
        ("PAYDIRT_CLAIM".to_string(), spec.claim_id.0.clone()),
        ("PAYDIRT_CARAVAN".to_string(), spec.caravan_name.0.clone()),
        ("PAYDIRT_SESSION".to_string(), spec.session_name.0.clone()),
        (
            "PAYDIRT_BIN".to_string(),
            spec.bin_path.display().to_string(),
        ),
    ]
}

/// Render the full shell invocation for the session: env assignments
/// followed by the agent runtime with its plugin, directory, and prospect
/// flags, ending with the quoted prompt.
pub fn build_agent_command(spec: &AgentCommandSpec) -> String {
    let mut rendered = String::new();
    for (key, value) in build_env_vars(spec) {
        rendered.push_str(&key);
        rendered.push('=');
        rendered.push_str(&shell_quote(&value));
        rendered.push(' ');
    }

    rendered.push_str(&shell_quote(&spec.agent_bin));
    rendered.push_str(" --plugin-dir ");
    rendered.push_str(&shell_quote(&spec.install_dir.display().to_string()));
    rendered.push_str(" --add-dir ");
    rendered.push_str(&shell_quote(&spec.install_dir.display().to_string()));
    rendered.push_str(" --add-dir ");
    rendered.push_str(&shell_quote(&spec.project_dir.display().to_string()));
    rendered.push_str(" --agent ");
    rendered.push_str(&shell_quote(&prospect_path(&spec.install_dir, spec.role)));
    rendered.push(' ');
    rendered.push_str(&shell_quote(&spec.prompt));
    rendered
}

/// Path to a prospect definition file under the install directory.
pub fn prospect_path(install_dir: &Path, role: ProspectRole) -> String {
    install_dir
        .join("prospects")
        .join(role.definition_file())
        .display()
        .to_string()
}

pub fn shell_quote(value: &str) -> String {
    let escaped = value.replace('\'', "'\"'\"'");
    format!("'{escaped}'")
}
