use anyhow::Context;
use chrono::Utc;
use std::env;
use std::fs::OpenOptions;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pd_beads::{BeadsCli, BeadsStore};
use pd_core::config::{load_config, ConfigError, PaydirtConfig};
use pd_core::state::CaravanStatus;
use pd_core::types::{
    Caravan, CaravanName, ClaimId, IssueId, ProspectRole, SessionName,
};
use pd_core::validation::{Validate, ValidationLevel};
use pd_core::EventKind;
use pd_sessions::{
    build_agent_command, build_env_vars, AgentCommandSpec, LaunchError, LaunchRequest,
    SessionLauncher, TmuxLauncher,
};
use paydirtd::{EngineError, EngineService, FileGateRunner, HookEvent};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_CONFIG_PATH: &str = "config/paydirt.toml";
const NEW_CARAVAN_NOTICE_FILE: &str = "/tmp/paydirt-new-caravans";
const LEDGER_VIEW_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
enum HookCliArgs {
    ToolCommand {
        claim: ClaimId,
        work: Option<IssueId>,
        command: Option<String>,
    },
    IssueClosed {
        issue: IssueId,
    },
    Watch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliCommand {
    Stake { task: String },
    Continue { claim: Option<ClaimId> },
    Survey { claim: Option<ClaimId> },
    Abandon { claim: Option<ClaimId> },
    Prospect {
        role: String,
        task: Option<String>,
        claim: Option<ClaimId>,
    },
    Boomtown,
    Ledger,
    Hook(HookCliArgs),
    Help,
    Version,
}

#[derive(Debug, thiserror::Error)]
enum MainError {
    #[error("{0}")]
    Args(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Ledger(#[from] paydirtd::LedgerError),
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn help_text() -> String {
    format!(
        "\
Paydirt v{VERSION} - Multi-agent orchestrator

Usage:
  paydirt <command> [options]
  pd <command> [options]

Commands:
  stake \"task\"      Start new Caravan (stake a claim)
  continue [id]     Resume existing Caravan
  survey [id]       Show status
  abandon [id]      Stop Caravan
  prospect <role>   Spawn specific Prospect
  boomtown          Open Dashboard
  ledger            View history
  hook <event>      Apply a hook event (tool-command, issue-closed, watch)

Options:
  -h, --help        Show this help
  -v, --version     Show version
  --dry-run         Preview without executing
"
    )
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    let (command, dry_run) = match parse_cli_args(&args) {
        Ok(parsed) => parsed,
        Err(MainError::Args(message)) => {
            eprintln!("{message}");
            eprintln!("{}", help_text());
            std::process::exit(1);
        }
        Err(err) => {
            eprintln!("paydirt: {err}");
            std::process::exit(1);
        }
    };

    match run(command, dry_run) {
        Ok(()) => {}
        Err(err) => {
            eprintln!("paydirt: {err}");
            std::process::exit(1);
        }
    }
}

/// Flags that consume a value argument.
const VALUE_FLAGS: [&str; 4] = ["--task", "--claim", "--work", "--command"];

fn parse_cli_args(args: &[String]) -> Result<(CliCommand, bool), MainError> {
    let mut dry_run = false;
    let mut words = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok((CliCommand::Help, dry_run)),
            "-v" | "--version" => return Ok((CliCommand::Version, dry_run)),
            "--dry-run" => dry_run = true,
            other if VALUE_FLAGS.contains(&other) => {
                // Value read back out of the raw argv by flag_value.
                let _ = iter.next();
            }
            other if other.starts_with("--") => {}
            other => words.push(other.to_string()),
        }
    }

    let Some(command) = words.first() else {
        return Err(MainError::Args("missing command".to_string()));
    };

    let command = match command.as_str() {
        "stake" => CliCommand::Stake {
            task: words
                .get(1)
                .cloned()
                .ok_or_else(|| MainError::Args("stake requires a task".to_string()))?,
        },
        "continue" => CliCommand::Continue {
            claim: words.get(1).cloned().map(ClaimId::new),
        },
        "survey" => CliCommand::Survey {
            claim: words.get(1).cloned().map(ClaimId::new),
        },
        "abandon" => CliCommand::Abandon {
            claim: words.get(1).cloned().map(ClaimId::new),
        },
        "prospect" => CliCommand::Prospect {
            role: words
                .get(1)
                .cloned()
                .ok_or_else(|| MainError::Args("prospect requires a role".to_string()))?,
            task: flag_value(args, "--task"),
            claim: flag_value(args, "--claim").map(ClaimId::new),
        },
        "boomtown" => CliCommand::Boomtown,
        "ledger" => CliCommand::Ledger,
        "hook" => CliCommand::Hook(parse_hook_args(&words[1..], args)?),
        other => {
            return Err(MainError::Args(format!("unknown command '{other}'")));
        }
    };
    Ok((command, dry_run))
}

fn parse_hook_args(words: &[String], raw: &[String]) -> Result<HookCliArgs, MainError> {
    let Some(event) = words.first() else {
        return Err(MainError::Args(
            "hook requires an event: tool-command, issue-closed, watch".to_string(),
        ));
    };
    match event.as_str() {
        "tool-command" => {
            let claim = flag_value(raw, "--claim")
                .map(ClaimId::new)
                .ok_or_else(|| MainError::Args("hook tool-command requires --claim".to_string()))?;
            Ok(HookCliArgs::ToolCommand {
                claim,
                work: flag_value(raw, "--work").map(IssueId::new),
                command: flag_value(raw, "--command"),
            })
        }
        "issue-closed" => {
            let issue = words
                .get(1)
                .cloned()
                .map(IssueId::new)
                .ok_or_else(|| MainError::Args("hook issue-closed requires an issue id".to_string()))?;
            Ok(HookCliArgs::IssueClosed { issue })
        }
        "watch" => Ok(HookCliArgs::Watch),
        other => Err(MainError::Args(format!("unknown hook event '{other}'"))),
    }
}

/// Look up `--flag value` or `--flag=value` in the raw argv. Flag values
/// with spaces arrive as single argv entries, so no re-tokenizing here.
fn flag_value(raw: &[String], flag: &str) -> Option<String> {
    let mut iter = raw.iter();
    while let Some(arg) = iter.next() {
        if arg == flag {
            return iter.next().cloned();
        }
        if let Some(rest) = arg.strip_prefix(flag) {
            if let Some(value) = rest.strip_prefix('=') {
                return Some(value.to_string());
            }
        }
    }
    None
}

struct Runtime {
    config: PaydirtConfig,
    engine: EngineService,
    store: BeadsStore,
    launcher: TmuxLauncher,
    bin_path: PathBuf,
    project_dir: PathBuf,
}

impl Runtime {
    fn open() -> Result<Self, MainError> {
        let config_path = Path::new(DEFAULT_CONFIG_PATH);
        let config = if config_path.exists() {
            load_config(config_path)?
        } else {
            PaydirtConfig::default()
        };

        let issues = config.validate();
        let mut fatal = Vec::new();
        for issue in &issues {
            match issue.level {
                ValidationLevel::Error => fatal.push(format!("{}: {}", issue.code, issue.message)),
                ValidationLevel::Warning => {
                    eprintln!("warning: {}: {}", issue.code, issue.message);
                }
            }
        }
        if !fatal.is_empty() {
            return Err(MainError::InvalidConfig(fatal.join("; ")));
        }

        let bin_path = env::current_exe().unwrap_or_else(|_| PathBuf::from("paydirt"));
        let project_dir = config
            .sessions
            .project_dir
            .clone()
            .or_else(|| env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        let store = BeadsStore::new(
            BeadsCli::new(
                &config.tracker.bd_bin,
                Duration::from_secs(config.engine.collaborator_timeout_secs),
            ),
            &project_dir,
        );
        let launcher = TmuxLauncher::new(&config.sessions.tmux_bin);
        let engine = EngineService::open(config.clone(), bin_path.clone())?;

        Ok(Self {
            config,
            engine,
            store,
            launcher,
            bin_path,
            project_dir,
        })
    }

    fn agent_spec(
        &self,
        role: ProspectRole,
        claim: &ClaimId,
        name: &CaravanName,
        session: &SessionName,
        prompt: String,
    ) -> AgentCommandSpec {
        AgentCommandSpec {
            role,
            claim_id: claim.clone(),
            caravan_name: name.clone(),
            session_name: session.clone(),
            agent_bin: self.config.sessions.agent_bin.clone(),
            install_dir: self.config.sessions.install_dir.clone(),
            project_dir: self.project_dir.clone(),
            bin_path: self.bin_path.clone(),
            prompt,
        }
    }

    /// Resolve `[id]` arguments: an explicit claim, or the most recently
    /// updated non-terminal caravan.
    fn resolve_claim(&self, claim: Option<ClaimId>) -> Result<Option<Caravan>, MainError> {
        match claim {
            Some(claim) => Ok(self.engine.ledger.load_caravan(&claim)?),
            None => Ok(self
                .engine
                .ledger
                .list_caravans()?
                .into_iter()
                .find(|caravan| !caravan.status.is_terminal())),
        }
    }
}

fn run(command: CliCommand, dry_run: bool) -> Result<(), MainError> {
    match command {
        CliCommand::Help => {
            println!("{}", help_text());
            Ok(())
        }
        CliCommand::Version => {
            println!("Paydirt v{VERSION}");
            Ok(())
        }
        CliCommand::Stake { task } => run_stake(&task, dry_run),
        CliCommand::Continue { claim } => run_continue(claim),
        CliCommand::Survey { claim } => run_survey(claim),
        CliCommand::Abandon { claim } => run_abandon(claim),
        CliCommand::Prospect { role, task, claim } => run_prospect(&role, task, claim, dry_run),
        CliCommand::Boomtown => run_boomtown(),
        CliCommand::Ledger => run_ledger(),
        CliCommand::Hook(args) => run_hook(args),
    }
}

fn run_stake(task: &str, dry_run: bool) -> Result<(), MainError> {
    let runtime = Runtime::open()?;
    println!("Staking claim for: \"{task}\"");

    let claim = ClaimId::generate(Utc::now());
    let name = CaravanName::from_task(task);
    let session = SessionName::for_claim(&runtime.config.sessions.session_prefix, &claim);
    let prompt =
        format!("You are the Trail Boss coordinating this Caravan. The task is: \"{task}\".");
    let spec = runtime.agent_spec(ProspectRole::TrailBoss, &claim, &name, &session, prompt);

    if dry_run {
        println!("\n[DRY RUN] Would execute:");
        println!("{}", build_agent_command(&spec));
        println!("\nSession name: {session}");
        return Ok(());
    }

    if runtime.launcher.session_exists(&session)? {
        println!("\nSession \"{session}\" already exists, attaching...");
        runtime.launcher.attach(&session)?;
        return Ok(());
    }

    println!("\nCreating Caravan session: {session}");
    runtime.launcher.launch(&LaunchRequest {
        spec,
        workdir: runtime.project_dir.clone(),
    })?;
    notify_new_caravan(&claim, task);

    let mut caravan = Caravan::new(claim.clone(), name, task, ProspectRole::TrailBoss, Utc::now());
    caravan.status = CaravanStatus::working();
    runtime.engine.register_caravan(&caravan)?;
    runtime.engine.record_event(
        Some(&claim),
        None,
        EventKind::CaravanStaked {
            task: task.to_string(),
        },
    )?;

    println!("Caravan started: {claim}");
    println!("\nAttaching to session... (press Ctrl+b d to detach)");
    runtime.launcher.attach(&session)?;
    Ok(())
}

fn run_continue(claim: Option<ClaimId>) -> Result<(), MainError> {
    let mut runtime = Runtime::open()?;
    runtime.engine.reconcile(&runtime.store)?;

    let Some(caravan) = runtime.resolve_claim(claim)? else {
        println!("No caravan to continue.");
        return Ok(());
    };

    let mut runner = FileGateRunner::new(&runtime.config.engine.gates_root);
    let advanced = runtime.engine.advance_delivery(&mut runner)?;
    for (claim_id, advance) in &advanced {
        println!("{claim_id}: {advance:?}");
    }

    let session =
        SessionName::for_claim(&runtime.config.sessions.session_prefix, &caravan.claim_id);
    if runtime.launcher.session_exists(&session)? {
        println!("Attaching to {session}...");
        runtime.launcher.attach(&session)?;
        return Ok(());
    }

    println!("Relaunching {} as {}...", caravan.claim_id, caravan.role);
    let prompt = format!(
        "Resume Caravan {}: \"{}\". Check `bd show` for current issue state before continuing.",
        caravan.claim_id, caravan.task
    );
    let spec = runtime.agent_spec(
        caravan.role,
        &caravan.claim_id,
        &caravan.name,
        &session,
        prompt,
    );
    runtime.launcher.launch(&LaunchRequest {
        spec,
        workdir: runtime.project_dir.clone(),
    })?;
    runtime.launcher.attach(&session)?;
    Ok(())
}

fn run_survey(claim: Option<ClaimId>) -> Result<(), MainError> {
    let runtime = Runtime::open()?;
    runtime.engine.reconcile(&runtime.store)?;
    match claim {
        Some(claim) => {
            let Some(caravan) = runtime.engine.ledger.load_caravan(&claim)? else {
                println!("No caravan with claim {claim}.");
                return Ok(());
            };
            print_caravan_detail(&runtime, &caravan);
        }
        None => {
            let caravans = runtime.engine.ledger.list_caravans()?;
            if caravans.is_empty() {
                println!("No caravans staked.");
                return Ok(());
            }
            print_roster(&caravans);
        }
    }
    Ok(())
}

fn run_abandon(claim: Option<ClaimId>) -> Result<(), MainError> {
    let mut runtime = Runtime::open()?;
    let Some(caravan) = runtime.resolve_claim(claim)? else {
        println!("No caravan to abandon.");
        return Ok(());
    };

    let Some(abandoned) = runtime.engine.abandon(&caravan.claim_id)? else {
        println!("No caravan with claim {}.", caravan.claim_id);
        return Ok(());
    };

    let session =
        SessionName::for_claim(&runtime.config.sessions.session_prefix, &abandoned.claim_id);
    // The session may already be gone; abandoning is still complete.
    if runtime.launcher.session_exists(&session).unwrap_or(false) {
        let _ = runtime.launcher.kill_session(&session);
    }
    println!("Abandoned caravan {}.", abandoned.claim_id);
    Ok(())
}

fn run_prospect(
    role: &str,
    task: Option<String>,
    claim: Option<ClaimId>,
    dry_run: bool,
) -> Result<(), MainError> {
    let role: ProspectRole = role
        .parse()
        .map_err(MainError::Args)?;
    let runtime = Runtime::open()?;

    let claim = claim.unwrap_or_else(|| ClaimId::generate(Utc::now()));
    let name = match &task {
        Some(task) => CaravanName::from_task(task),
        None => CaravanName::standalone(role),
    };
    let session = SessionName::for_claim(&runtime.config.sessions.session_prefix, &claim);
    let prompt = match &task {
        Some(task) => format!("You are a {role} prospect. Your task is: \"{task}\"."),
        None => format!("You are a {role} prospect. Awaiting instructions."),
    };

    println!("Spawning Prospect: {role}");
    println!("Caravan: {claim}");

    let spec = runtime.agent_spec(role, &claim, &name, &session, prompt);
    if dry_run {
        println!("\n[DRY RUN] Would execute:");
        println!("{}", build_agent_command(&spec));
        for (key, value) in build_env_vars(&spec) {
            println!("  {key}={value}");
        }
        return Ok(());
    }

    runtime.launcher.launch(&LaunchRequest {
        spec,
        workdir: runtime.project_dir.clone(),
    })?;

    let task_text = task.unwrap_or_else(|| format!("standalone {role}"));
    let mut caravan = Caravan::new(claim.clone(), name, task_text, role, Utc::now());
    caravan.status = CaravanStatus::working();
    runtime.engine.register_caravan(&caravan)?;

    println!("Prospect started in session {session}.");
    Ok(())
}

fn run_boomtown() -> Result<(), MainError> {
    let runtime = Runtime::open()?;
    let caravans = runtime.engine.ledger.list_caravans()?;
    println!("Boomtown — {} caravan(s)", caravans.len());
    if caravans.is_empty() {
        println!("Nothing staked yet. Try: paydirt stake \"your task\"");
        return Ok(());
    }
    print_roster(&caravans);
    Ok(())
}

fn run_ledger() -> Result<(), MainError> {
    let runtime = Runtime::open()?;
    let events = runtime.engine.ledger.list_recent_events(LEDGER_VIEW_LIMIT)?;
    if events.is_empty() {
        println!("Ledger is empty.");
        return Ok(());
    }
    for event in events {
        let claim = event
            .claim_id
            .as_ref()
            .map(|id| id.0.as_str())
            .unwrap_or("-");
        println!(
            "{}  {:24}  {}",
            event.at.format("%Y-%m-%d %H:%M:%S"),
            claim,
            pd_core::events::event_kind_tag(&event.kind),
        );
    }
    Ok(())
}

fn run_hook(args: HookCliArgs) -> Result<(), MainError> {
    let mut runtime = Runtime::open()?;
    runtime.engine.reconcile(&runtime.store)?;

    match args {
        HookCliArgs::ToolCommand {
            claim,
            work,
            command,
        } => {
            let command = match command {
                Some(command) => command,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_line(&mut buf)?;
                    buf.trim_end().to_string()
                }
            };
            let event = HookEvent::ToolCommand {
                claim_id: claim,
                work_issue: work,
                command,
            };
            let report = runtime
                .engine
                .handle_event(&event, &runtime.store, &runtime.launcher)?;
            println!("{report:?}");
            tick_pipelines(&mut runtime)?;
            Ok(())
        }
        HookCliArgs::IssueClosed { issue } => {
            let event = HookEvent::IssueClosed { issue_id: issue };
            let report = runtime
                .engine
                .handle_event(&event, &runtime.store, &runtime.launcher)?;
            println!("{report:?}");
            tick_pipelines(&mut runtime)?;
            Ok(())
        }
        HookCliArgs::Watch => run_hook_watch(&mut runtime),
    }
}

/// Long-running inbox: one JSON hook event per stdin line, until EOF or a
/// termination signal. A malformed line is logged and skipped; the stream
/// is at-least-once, so the sender can replay.
fn run_hook_watch(runtime: &mut Runtime) -> Result<(), MainError> {
    let term = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        let _ = signal_hook::flag::register(signal, Arc::clone(&term));
    }

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        if term.load(Ordering::Relaxed) {
            break;
        }
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Err(err) = apply_watch_line(runtime, &line) {
            eprintln!("hook watch: {err:#}");
        }
    }
    Ok(())
}

fn apply_watch_line(runtime: &mut Runtime, line: &str) -> anyhow::Result<()> {
    let event: HookEvent = serde_json::from_str(line)
        .with_context(|| format!("malformed hook event: {line}"))?;
    let report = runtime
        .engine
        .handle_event(&event, &runtime.store, &runtime.launcher)
        .context("applying hook event")?;
    println!("{report:?}");
    tick_pipelines(runtime).context("advancing pipelines")?;
    Ok(())
}

fn tick_pipelines(runtime: &mut Runtime) -> Result<(), MainError> {
    let mut runner = FileGateRunner::new(&runtime.config.engine.gates_root);
    let advanced = runtime.engine.advance_delivery(&mut runner)?;
    for (claim_id, advance) in advanced {
        println!("{claim_id}: {advance:?}");
    }
    Ok(())
}

fn print_roster(caravans: &[Caravan]) {
    println!("{:<14} {:<30} {:<18} {:<12}", "CLAIM", "CARAVAN", "STATUS", "ROLE");
    for caravan in caravans {
        println!(
            "{:<14} {:<30} {:<18} {:<12}",
            caravan.claim_id.0, caravan.name.0, caravan.status.as_str(), caravan.role
        );
    }
}

fn print_caravan_detail(runtime: &Runtime, caravan: &Caravan) {
    println!("Claim:    {}", caravan.claim_id);
    println!("Caravan:  {}", caravan.name);
    println!("Task:     {}", caravan.task);
    println!("Status:   {}", caravan.status);
    println!("Role:     {}", caravan.role);
    if let Some(work) = &caravan.work_issue {
        println!("Work:     {work}");
        println!(
            "Blocked:  {}",
            runtime.engine.tracker.is_blocked(work)
        );
    }
    if let Some(stage) = runtime.engine.delivery.stage_of(&caravan.claim_id) {
        println!("Stage:    {} ({})", stage.name, runtime.engine.delivery.pipeline_name());
    }
    match runtime.engine.ledger.list_events_for_claim(&caravan.claim_id) {
        Ok(events) if !events.is_empty() => {
            println!("History:");
            for event in events.iter().rev().take(10) {
                println!(
                    "  {}  {}",
                    event.at.format("%Y-%m-%d %H:%M:%S"),
                    pd_core::events::event_kind_tag(&event.kind)
                );
            }
        }
        _ => {}
    }
}

/// Append to the dashboard notification file. Write errors are ignored —
/// the dashboard is advisory.
fn notify_new_caravan(claim: &ClaimId, task: &str) {
    let summary: String = task.chars().take(50).collect();
    let line = format!("{claim}: {summary}\n");
    if let Ok(mut file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(NEW_CARAVAN_NOTICE_FILE)
    {
        let _ = file.write_all(line.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use pd_core::types::{ClaimId, IssueId};

    use super::{parse_cli_args, CliCommand, HookCliArgs, MainError};

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_stake_with_task() {
        let (command, dry_run) =
            parse_cli_args(&args(&["stake", "Implement auth"])).expect("parse");
        assert_eq!(
            command,
            CliCommand::Stake {
                task: "Implement auth".to_string()
            }
        );
        assert!(!dry_run);
    }

    #[test]
    fn stake_without_task_is_an_args_error() {
        let err = parse_cli_args(&args(&["stake"])).expect_err("missing task");
        assert!(matches!(err, MainError::Args(message) if message.contains("task")));
    }

    #[test]
    fn parses_optional_claim_commands() {
        let (command, _) = parse_cli_args(&args(&["survey"])).expect("parse");
        assert_eq!(command, CliCommand::Survey { claim: None });

        let (command, _) = parse_cli_args(&args(&["abandon", "pd-abc"])).expect("parse");
        assert_eq!(
            command,
            CliCommand::Abandon {
                claim: Some(ClaimId::new("pd-abc"))
            }
        );
    }

    #[test]
    fn parses_prospect_with_flags_and_dry_run() {
        let (command, dry_run) = parse_cli_args(&args(&[
            "prospect",
            "surveyor",
            "--claim",
            "pd-envtest",
            "--task",
            "Test task",
            "--dry-run",
        ]))
        .expect("parse");
        assert!(dry_run);
        assert_eq!(
            command,
            CliCommand::Prospect {
                role: "surveyor".to_string(),
                task: Some("Test task".to_string()),
                claim: Some(ClaimId::new("pd-envtest")),
            }
        );
    }

    #[test]
    fn parses_hook_tool_command() {
        let (command, _) = parse_cli_args(&args(&[
            "hook",
            "tool-command",
            "--claim=pd-abc",
            "--work",
            "pd-w1",
            "--command",
            "bd close pd-d1",
        ]))
        .expect("parse");
        assert_eq!(
            command,
            CliCommand::Hook(HookCliArgs::ToolCommand {
                claim: ClaimId::new("pd-abc"),
                work: Some(IssueId::new("pd-w1")),
                command: Some("bd close pd-d1".to_string()),
            })
        );
    }

    #[test]
    fn parses_hook_issue_closed_and_watch() {
        let (command, _) =
            parse_cli_args(&args(&["hook", "issue-closed", "pd-d1"])).expect("parse");
        assert_eq!(
            command,
            CliCommand::Hook(HookCliArgs::IssueClosed {
                issue: IssueId::new("pd-d1")
            })
        );

        let (command, _) = parse_cli_args(&args(&["hook", "watch"])).expect("parse");
        assert_eq!(command, CliCommand::Hook(HookCliArgs::Watch));
    }

    #[test]
    fn help_and_version_flags_win_over_commands() {
        let (command, _) = parse_cli_args(&args(&["stake", "task", "--help"])).expect("parse");
        assert_eq!(command, CliCommand::Help);

        let (command, _) = parse_cli_args(&args(&["-v"])).expect("parse");
        assert_eq!(command, CliCommand::Version);
    }

    #[test]
    fn missing_and_unknown_commands_are_args_errors() {
        assert!(matches!(
            parse_cli_args(&[]).expect_err("missing"),
            MainError::Args(_)
        ));
        assert!(matches!(
            parse_cli_args(&args(&["mine-gold"])).expect_err("unknown"),
            MainError::Args(_)
        ));
    }
}
