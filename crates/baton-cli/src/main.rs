//! Baton - turn-based multi-agent orchestration CLI
//!
//! ## Commands
//!
//! - `run`: drive a task through the role chain with a scripted backend
//! - `ledger`: inspect, export and verify a task's ledger
//! - `roles`: list the built-in roles in default order

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn, Level};

use baton_core::config::BatonConfig;
use baton_core::{
    agents_for_task, cancel_pair, CancelToken, ExecutionResult, FsSessionStore,
    OrchestrationContext, Orchestrator, ScriptedBackend, SessionStore, ROLES,
};
use baton_ledger::{AgentLedgerEntry, FsLedger, LedgerStore, LedgerSummary};

#[derive(Parser)]
#[command(name = "baton")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Turn-based multi-agent orchestration with a replayable ledger", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file
    #[arg(long, global = true, default_value = "baton.toml")]
    config: PathBuf,

    /// Directory holding one subdirectory per task
    #[arg(long, global = true, env = "BATON_TASKS_ROOT")]
    tasks_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task through the role chain
    Run {
        #[arg(long)]
        task_id: String,

        /// Task goal handed to every role
        #[arg(short, long)]
        description: String,

        /// Scripted responses per role (JSON: {"planner": [...], ...})
        #[arg(short, long)]
        script: PathBuf,

        /// Initial context (JSON object)
        #[arg(long)]
        context: Option<PathBuf>,

        #[arg(long)]
        max_turns: Option<u32>,

        #[arg(long)]
        turn_timeout_secs: Option<u64>,

        /// Continue from the ledger's last recorded turn
        #[arg(long)]
        resume: bool,

        /// Workspace the agents operate on (default: current directory)
        #[arg(long)]
        workspace: Option<PathBuf>,
    },

    /// Inspect a task's ledger
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },

    /// List the built-in roles in default order
    Roles,
}

#[derive(Subcommand)]
enum LedgerAction {
    /// Print entries as JSON lines
    Show {
        task_id: String,

        /// Only entries of this role
        #[arg(long)]
        agent: Option<String>,

        /// Only entries of this turn
        #[arg(long)]
        turn: Option<u32>,
    },

    /// Export the ledger as CSV
    Export {
        task_id: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print totals and per-role turn counts
    Stats { task_id: String },

    /// Check turn ordering and print (or compare) the replay digest
    Verify {
        task_id: String,

        /// Expected replay digest
        #[arg(long)]
        digest: Option<String>,
    },
}

/// Inputs of `baton run` after flag parsing.
struct RunRequest {
    task_id: String,
    description: String,
    script: PathBuf,
    context: Option<PathBuf>,
    max_turns: Option<u32>,
    turn_timeout_secs: Option<u64>,
    resume: bool,
    workspace: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = BatonConfig::load(&cli.config)
        .await
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?
        .apply_env()
        .context("Invalid BATON_* environment")?;
    if let Some(root) = cli.tasks_root {
        config.tasks_root = root;
    }
    config.log_json |= cli.json;
    config.validate().context("Invalid configuration")?;

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    baton_core::init_tracing(config.log_json, level);

    match cli.command {
        Commands::Run {
            task_id,
            description,
            script,
            context,
            max_turns,
            turn_timeout_secs,
            resume,
            workspace,
        } => {
            let request = RunRequest {
                task_id,
                description,
                script,
                context,
                max_turns,
                turn_timeout_secs,
                resume,
                workspace,
            };
            cmd_run(&config, request).await
        }
        Commands::Ledger { action } => match action {
            LedgerAction::Show {
                task_id,
                agent,
                turn,
            } => cmd_ledger_show(&config.tasks_root, &task_id, agent.as_deref(), turn).await,
            LedgerAction::Export { task_id, output } => {
                cmd_ledger_export(&config.tasks_root, &task_id, output.as_deref()).await
            }
            LedgerAction::Stats { task_id } => cmd_ledger_stats(&config.tasks_root, &task_id).await,
            LedgerAction::Verify { task_id, digest } => {
                cmd_ledger_verify(&config.tasks_root, &task_id, digest.as_deref()).await
            }
        },
        Commands::Roles => cmd_roles(),
    }
}

async fn cmd_run(config: &BatonConfig, request: RunRequest) -> Result<()> {
    let (handle, token) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping at the next turn boundary");
            handle.cancel();
        }
    });

    let result = run_task(config, request, token).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn run_task(
    config: &BatonConfig,
    request: RunRequest,
    cancel: CancelToken,
) -> Result<ExecutionResult> {
    let script = tokio::fs::read_to_string(&request.script)
        .await
        .with_context(|| format!("Failed to read script {}", request.script.display()))?;
    let backend = Arc::new(
        ScriptedBackend::from_json(&script)
            .with_context(|| format!("Invalid script {}", request.script.display()))?,
    );

    let initial_context = match &request.context {
        Some(path) => read_json(path).await?,
        None => Value::Object(Default::default()),
    };

    let workspace = match request.workspace {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to resolve current directory")?,
    };
    let sessions = FsSessionStore::new(&config.tasks_root);
    let session = sessions
        .open(&request.task_id, &workspace.display().to_string())
        .await
        .with_context(|| format!("Failed to open session for task {}", request.task_id))?;

    let context = OrchestrationContext::new(&request.task_id, request.description)
        .with_initial_context(initial_context)
        .with_max_turns(request.max_turns.unwrap_or(config.max_turns))
        .with_workspace_root(session.workspace_root.clone());

    let mut options = config.execution_options();
    if let Some(secs) = request.turn_timeout_secs {
        options.turn_timeout = Some(Duration::from_secs(secs));
    }
    options.resume |= request.resume;

    let mut orchestrator = Orchestrator::with_fs_ledger(context, &config.tasks_root)
        .context("Failed to open task ledger")?
        .with_options(options);
    orchestrator
        .initialize()
        .await
        .context("Failed to initialize task ledger")?;
    for agent in agents_for_task(&request.task_id, backend) {
        orchestrator.register_agent(agent);
    }

    info!(
        task_id = %request.task_id,
        session_id = %session.session_id,
        workspace = %session.workspace_root,
        "starting run"
    );
    let result = orchestrator.execute_with_cancel(cancel).await?;

    sessions
        .touch(&request.task_id)
        .await
        .context("Failed to update session")?;
    Ok(result)
}

async fn read_json(path: &Path) -> Result<Value> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn open_ledger(tasks_root: &Path, task_id: &str) -> Result<FsLedger> {
    FsLedger::new(tasks_root, task_id).with_context(|| format!("Invalid task id '{task_id}'"))
}

async fn filtered_entries(
    ledger: &dyn LedgerStore,
    agent: Option<&str>,
    turn: Option<u32>,
) -> Result<Vec<AgentLedgerEntry>> {
    let entries = ledger.read_all().await.context("Failed to read ledger")?;
    Ok(entries
        .into_iter()
        .filter(|e| agent.map_or(true, |a| e.agent == a))
        .filter(|e| turn.map_or(true, |t| e.turn == t))
        .collect())
}

async fn cmd_ledger_show(
    tasks_root: &Path,
    task_id: &str,
    agent: Option<&str>,
    turn: Option<u32>,
) -> Result<()> {
    let ledger = open_ledger(tasks_root, task_id)?;
    let entries = filtered_entries(&ledger, agent, turn).await?;
    if entries.is_empty() {
        println!("No ledger entries for task '{task_id}'");
        return Ok(());
    }
    for entry in entries {
        println!("{}", serde_json::to_string(&entry)?);
    }
    Ok(())
}

async fn cmd_ledger_export(tasks_root: &Path, task_id: &str, output: Option<&Path>) -> Result<()> {
    let ledger = open_ledger(tasks_root, task_id)?;
    let csv = ledger.export_csv().await.context("Failed to read ledger")?;
    match output {
        Some(path) => {
            tokio::fs::write(path, format!("{csv}\n"))
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Exported ledger of task '{task_id}' to {}", path.display());
        }
        None => println!("{csv}"),
    }
    Ok(())
}

async fn cmd_ledger_stats(tasks_root: &Path, task_id: &str) -> Result<()> {
    let ledger = open_ledger(tasks_root, task_id)?;
    let summary: LedgerSummary = ledger.summary().await.context("Failed to read ledger")?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[derive(Debug, Serialize)]
struct VerifyReport {
    entries: usize,
    replay_digest: String,
}

/// Check that turns strictly increase within each run and every entry
/// belongs to `task_id`, then compare the replay digest against `expected`
/// when given. A turn-1 entry starts a new run.
fn verify_entries(
    task_id: &str,
    entries: &[AgentLedgerEntry],
    expected: Option<&str>,
) -> Result<VerifyReport> {
    for pair in entries.windows(2) {
        if pair[1].turn != 1 && pair[1].turn <= pair[0].turn {
            bail!(
                "Turn order violated: turn {} ({}) follows turn {} ({})",
                pair[1].turn,
                pair[1].agent,
                pair[0].turn,
                pair[0].agent
            );
        }
    }
    if let Some(foreign) = entries.iter().find(|e| e.task_id != task_id) {
        bail!(
            "Entry for turn {} belongs to task '{}'",
            foreign.turn,
            foreign.task_id
        );
    }

    let summary = LedgerSummary::from_entries(entries);
    if let Some(expected) = expected {
        if !summary.replay_digest.eq_ignore_ascii_case(expected) {
            bail!(
                "Replay digest mismatch: expected {expected}, got {}",
                summary.replay_digest
            );
        }
    }
    Ok(VerifyReport {
        entries: summary.entries,
        replay_digest: summary.replay_digest,
    })
}

async fn cmd_ledger_verify(tasks_root: &Path, task_id: &str, digest: Option<&str>) -> Result<()> {
    let ledger = open_ledger(tasks_root, task_id)?;
    let entries = ledger.read_all().await.context("Failed to read ledger")?;
    let report = verify_entries(task_id, &entries, digest)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_roles() -> Result<()> {
    for (position, role) in ROLES.iter().enumerate() {
        println!(
            "{}. {:<11} max_tokens={:<6} auto_approve={}",
            position + 1,
            role.name.as_str(),
            role.max_tokens,
            role.auto_approve
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_core::ExecutionStatus;
    use serde_json::json;

    fn config(root: &Path) -> BatonConfig {
        BatonConfig {
            tasks_root: root.join("tasks"),
            ..BatonConfig::default()
        }
    }

    fn request(dir: &Path, script: Value) -> RunRequest {
        let script_path = dir.join("script.json");
        std::fs::write(&script_path, script.to_string()).unwrap();
        RunRequest {
            task_id: "cli-task".to_string(),
            description: "add a health endpoint".to_string(),
            script: script_path,
            context: None,
            max_turns: None,
            turn_timeout_secs: None,
            resume: false,
            workspace: Some(dir.join("work")),
        }
    }

    fn full_script() -> Value {
        json!({
            "planner": [{"subtasks": ["t1"], "nextAgent": "coder"}],
            "coder": [{"completed": ["t1"], "nextAgent": "tester"}],
            "tester": [{"passed": ["unit"], "nextAgent": "docs"}],
            "docs": [{"updated": [], "nextAgent": "integrator"}],
            "integrator": [{"merged": true, "nextAgent": null}]
        })
    }

    #[tokio::test]
    async fn run_task_writes_ledger_and_session() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());

        let result = run_task(&cfg, request(dir.path(), full_script()), CancelToken::never())
            .await
            .unwrap();

        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.turn, 5);
        assert!(cfg.tasks_root.join("cli-task").join("agent.ledger").exists());
        assert!(cfg.tasks_root.join("cli-task").join("session.json").exists());
    }

    #[tokio::test]
    async fn run_task_honours_max_turns_and_resume() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());

        let mut first = request(dir.path(), full_script());
        first.max_turns = Some(2);
        let cut = run_task(&cfg, first, CancelToken::never()).await.unwrap();
        assert_eq!(cut.status, ExecutionStatus::Incomplete);

        let mut second = request(dir.path(), full_script());
        second.resume = true;
        let done = run_task(&cfg, second, CancelToken::never()).await.unwrap();
        assert_eq!(done.status, ExecutionStatus::Success);
        assert_eq!(done.turn, 5);
        assert_eq!(done.ledger_entries, 5);
    }

    #[tokio::test]
    async fn run_task_rejects_missing_script() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = request(dir.path(), full_script());
        req.script = dir.path().join("missing.json");
        let err = run_task(&config(dir.path()), req, CancelToken::never())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read script"));
    }

    #[tokio::test]
    async fn filters_select_by_agent_and_turn() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        run_task(&cfg, request(dir.path(), full_script()), CancelToken::never())
            .await
            .unwrap();

        let ledger = open_ledger(&cfg.tasks_root, "cli-task").unwrap();
        let coder = filtered_entries(&ledger, Some("coder"), None).await.unwrap();
        assert_eq!(coder.len(), 1);
        assert_eq!(coder[0].turn, 2);
        let third = filtered_entries(&ledger, None, Some(3)).await.unwrap();
        assert_eq!(third[0].agent, "tester");
    }

    #[test]
    fn verify_accepts_matching_digest_and_rejects_others() {
        let entries = vec![
            AgentLedgerEntry::new("planner", "t", 1, "Execute planner", "{}", 0, 0.0),
            AgentLedgerEntry::new("coder", "t", 2, "Execute coder", "{}", 0, 0.0),
        ];
        let report = verify_entries("t", &entries, None).unwrap();
        assert_eq!(report.entries, 2);

        assert!(verify_entries("t", &entries, Some(&report.replay_digest)).is_ok());
        assert!(verify_entries("t", &entries, Some("deadbeef")).is_err());
    }

    #[test]
    fn verify_rejects_out_of_order_turns_and_foreign_entries() {
        let out_of_order = vec![
            AgentLedgerEntry::new("planner", "t", 2, "Execute planner", "{}", 0, 0.0),
            AgentLedgerEntry::new("coder", "t", 2, "Execute coder", "{}", 0, 0.0),
        ];
        assert!(verify_entries("t", &out_of_order, None).is_err());

        let foreign = vec![AgentLedgerEntry::new("planner", "other", 1, "Execute planner", "{}", 0, 0.0)];
        assert!(verify_entries("t", &foreign, None).is_err());
    }

    #[tokio::test]
    async fn verify_accepts_ledger_of_two_fresh_runs() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        run_task(&cfg, request(dir.path(), full_script()), CancelToken::never())
            .await
            .unwrap();
        run_task(&cfg, request(dir.path(), full_script()), CancelToken::never())
            .await
            .unwrap();

        let ledger = open_ledger(&cfg.tasks_root, "cli-task").unwrap();
        let entries = ledger.read_all().await.unwrap();
        let turns: Vec<u32> = entries.iter().map(|e| e.turn).collect();
        assert_eq!(turns, vec![1, 2, 3, 4, 5, 1, 2, 3, 4, 5]);

        let report = verify_entries("cli-task", &entries, None).unwrap();
        assert_eq!(report.entries, 10);
    }

    #[test]
    fn verify_rejects_regression_inside_a_run() {
        let entries = vec![
            AgentLedgerEntry::new("planner", "t", 1, "Execute planner", "{}", 0, 0.0),
            AgentLedgerEntry::new("coder", "t", 3, "Execute coder", "{}", 0, 0.0),
            AgentLedgerEntry::new("tester", "t", 2, "Execute tester", "{}", 0, 0.0),
        ];
        assert!(verify_entries("t", &entries, None).is_err());
    }

    #[test]
    fn cli_parses_run_and_ledger_commands() {
        let cli = Cli::try_parse_from([
            "baton", "run", "--task-id", "t", "-d", "x", "-s", "s.json", "--max-turns", "3",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Run { max_turns: Some(3), .. }));

        let cli = Cli::try_parse_from(["baton", "ledger", "verify", "t", "--digest", "ab"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Ledger {
                action: LedgerAction::Verify { .. }
            }
        ));
    }
}
