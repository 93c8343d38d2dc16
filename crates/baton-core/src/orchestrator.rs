//! The turn loop.
//!
//! An [`Orchestrator`] owns one task's ledger and the agents registered for
//! it. `execute()` runs one agent per turn, strictly sequentially, records a
//! ledger entry for every executed turn and follows each turn's handoff
//! until no role is left, the turn ceiling is reached, a turn times out or
//! the caller cancels.
//!
//! State machine: `idle -> ready -> running -> terminal`. A terminal
//! orchestrator may be executed again (e.g. to resume).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use baton_ledger::{FsLedger, LedgerStore};
use serde_json::Value;
use tracing::{debug, warn, Instrument};

use crate::agent::{Agent, TokenUsage};
use crate::cancel::CancelToken;
use crate::collaborators::CheckpointStore;
use crate::domain::{
    ExecutionResult, ExecutionStatus, OrchestrationContext, OrchestrationError, Result,
    TurnContext,
};
use crate::metrics::METRICS;
use crate::obs;
use crate::report::TurnOutput;
use crate::resume::{find_resume_point, ResumePoint};
use crate::roles;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Constructed, ledger not yet initialized
    Idle,
    Ready,
    /// Inside `execute()`
    Running,
    Terminal,
}

impl std::fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrchestratorState::Idle => "idle",
            OrchestratorState::Ready => "ready",
            OrchestratorState::Running => "running",
            OrchestratorState::Terminal => "terminal",
        };
        f.write_str(s)
    }
}

/// Knobs that do not belong to the task itself.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExecutionOptions {
    /// Upper bound on a single agent call; `None` waits indefinitely
    pub turn_timeout: Option<Duration>,
    /// Continue from the ledger's last turn instead of restarting at turn 1
    pub resume: bool,
}

/// Where the loop starts, after consulting the ledger if resuming.
enum StartPoint {
    Run {
        turn: u32,
        role: String,
        previous_output: Option<String>,
    },
    AlreadyComplete {
        turn: u32,
        role: String,
        output: String,
    },
}

pub struct Orchestrator {
    context: OrchestrationContext,
    ledger: Arc<dyn LedgerStore>,
    agents: HashMap<String, Box<dyn Agent>>,
    /// Invocations per role in the current run
    role_turns: HashMap<String, u32>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    options: ExecutionOptions,
    state: OrchestratorState,
    turn: u32,
}

impl Orchestrator {
    /// Validate `context` and bind it to `ledger`. The ledger must belong to
    /// the same task.
    pub fn new(mut context: OrchestrationContext, ledger: Arc<dyn LedgerStore>) -> Result<Self> {
        context.validate()?;
        if ledger.task_id() != context.task_id {
            return Err(OrchestrationError::InvalidContext(format!(
                "ledger belongs to task '{}', context to '{}'",
                ledger.task_id(),
                context.task_id
            )));
        }
        Ok(Self {
            context,
            ledger,
            agents: HashMap::new(),
            role_turns: HashMap::new(),
            checkpoints: None,
            options: ExecutionOptions::default(),
            state: OrchestratorState::Idle,
            turn: 0,
        })
    }

    /// Use the file ledger at `<tasks_root>/<task_id>/agent.ledger`.
    pub fn with_fs_ledger(context: OrchestrationContext, tasks_root: impl AsRef<Path>) -> Result<Self> {
        let ledger = FsLedger::new(tasks_root, &context.task_id)?;
        Self::new(context, Arc::new(ledger))
    }

    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.options.turn_timeout = Some(timeout);
        self
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.options.resume = resume;
        self
    }

    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// Prepare the ledger's storage. Idempotent.
    pub async fn initialize(&mut self) -> Result<()> {
        self.ledger.initialize().await?;
        if self.state == OrchestratorState::Idle {
            self.state = OrchestratorState::Ready;
        }
        debug!(task_id = %self.context.task_id, "orchestrator ready");
        Ok(())
    }

    /// Register `agent` under its role. A later registration for the same
    /// role replaces the earlier one.
    pub fn register_agent(&mut self, agent: Box<dyn Agent>) {
        if agent.task_id() != self.context.task_id {
            warn!(
                role = %agent.role(),
                agent_task = %agent.task_id(),
                task_id = %self.context.task_id,
                "agent registered for a different task"
            );
        }
        let role = agent.role().to_string();
        if self.agents.insert(role.clone(), agent).is_some() {
            debug!(role = %role, "replaced previously registered agent");
        }
    }

    /// Registered role names, sorted.
    pub fn registered_roles(&self) -> Vec<&str> {
        let mut roles: Vec<&str> = self.agents.keys().map(String::as_str).collect();
        roles.sort_unstable();
        roles
    }

    /// Run the turn loop to a terminal status.
    pub async fn execute(&mut self) -> Result<ExecutionResult> {
        self.execute_with_cancel(CancelToken::never()).await
    }

    /// Like [`execute`](Self::execute), but stops at the next turn boundary
    /// once `cancel` fires. An in-flight agent call is never interrupted.
    pub async fn execute_with_cancel(&mut self, cancel: CancelToken) -> Result<ExecutionResult> {
        match self.state {
            OrchestratorState::Ready | OrchestratorState::Terminal => {}
            state => return Err(OrchestrationError::NotReady { state }),
        }

        let task_id = self.context.task_id.clone();
        let span = obs::task_span(&task_id);
        let started = Instant::now();
        self.state = OrchestratorState::Running;

        let outcome = self.run(&cancel).instrument(span).await;
        self.state = OrchestratorState::Terminal;

        match &outcome {
            Ok(result) => obs::emit_orchestration_finished(
                &task_id,
                &result.status.to_string(),
                result.turn,
                started.elapsed().as_millis() as u64,
            ),
            Err(err) => obs::emit_orchestration_failed(&task_id, err),
        }
        METRICS.flush();
        outcome
    }

    async fn run(&mut self, cancel: &CancelToken) -> Result<ExecutionResult> {
        self.role_turns.clear();
        let mut artifacts: Vec<Value> = Vec::new();

        let (mut turn, mut role, mut previous_output) = match self.start_point().await? {
            StartPoint::Run {
                turn,
                role,
                previous_output,
            } => (turn, role, previous_output),
            StartPoint::AlreadyComplete { turn, role, output } => {
                self.turn = turn;
                return self
                    .finish(ExecutionStatus::Success, turn, role, output, artifacts)
                    .await;
            }
        };

        obs::emit_orchestration_started(&self.context.task_id, &role, self.context.max_turns);

        let task_id = self.context.task_id.clone();
        let max_turns = self.context.max_turns;
        let mut last_turn = turn - 1;
        let mut output = previous_output.clone().unwrap_or_default();

        let status = loop {
            if turn > max_turns {
                debug!(turn, max_turns, pending_role = %role, "turn ceiling reached");
                break ExecutionStatus::Incomplete;
            }
            if cancel.is_cancelled() {
                obs::emit_cancelled(&task_id, last_turn);
                break ExecutionStatus::Incomplete;
            }

            let role_turn = self.role_turn(&role) + 1;
            let turn_ctx =
                TurnContext::build(&self.context, &role, turn, role_turn, previous_output.as_deref());

            let agent = self
                .agents
                .get_mut(&role)
                .ok_or_else(|| OrchestrationError::UnregisteredRole { role: role.clone() })?;

            obs::emit_turn_started(&task_id, turn, &role, role_turn);
            let limit = self.options.turn_timeout;
            let executed = match limit {
                Some(limit) => tokio::time::timeout(limit, agent.execute(&turn_ctx))
                    .await
                    .ok(),
                None => Some(agent.execute(&turn_ctx).await),
            };
            METRICS.inc_turns();

            let (parsed, raw, usage, turn_artifacts, timed_out) = match executed {
                Some(Ok(out)) => (
                    TurnOutput::parse(&role, &out.result),
                    out.result,
                    out.usage.unwrap_or_default(),
                    out.artifacts,
                    false,
                ),
                Some(Err(source)) => {
                    return Err(OrchestrationError::Agent {
                        role: role.clone(),
                        turn,
                        source,
                    })
                }
                None => {
                    let secs = limit.map_or(0, |d| d.as_secs());
                    METRICS.inc_timeouts();
                    obs::emit_turn_timed_out(&task_id, turn, &role, secs);
                    let parsed = TurnOutput::timed_out(secs);
                    let raw = parsed.ledger_result();
                    (parsed, raw, TokenUsage::default(), Vec::new(), true)
                }
            };

            if parsed.report.is_malformed() && !timed_out {
                METRICS.inc_malformed();
                obs::emit_malformed_output(&task_id, turn, &role);
            }

            let entry = agent.ledger_entry(
                turn,
                &format!("Execute {role}"),
                &parsed.ledger_result(),
                usage,
            );
            self.ledger.append(&entry).await?;
            METRICS.inc_appends();
            obs::emit_ledger_appended(&task_id, turn, &role, entry.tokens_used);

            *self.role_turns.entry(role.clone()).or_insert(0) += 1;
            artifacts.extend(turn_artifacts);
            self.turn = turn;
            last_turn = turn;
            output = raw;

            if let Some(store) = &self.checkpoints {
                let id = store
                    .checkpoint(&task_id, turn)
                    .await
                    .map_err(|source| OrchestrationError::Checkpoint { turn, source })?;
                debug!(turn, checkpoint = %id, "checkpoint taken");
            }

            if timed_out {
                break ExecutionStatus::Failed;
            }

            let next = parsed.handoff.resolve(&role);
            obs::emit_turn_completed(&task_id, turn, &role, next.as_deref());
            match next {
                None => break ExecutionStatus::Success,
                Some(next) => {
                    previous_output = Some(output.clone());
                    role = next;
                    turn += 1;
                }
            }
        };

        self.finish(status, last_turn, role, output, artifacts).await
    }

    /// Turn 1 with the first role, unless resuming from a non-empty ledger.
    async fn start_point(&mut self) -> Result<StartPoint> {
        let fresh = StartPoint::Run {
            turn: 1,
            role: roles::first().to_string(),
            previous_output: None,
        };
        if !self.options.resume {
            return Ok(fresh);
        }

        Ok(match find_resume_point(self.ledger.as_ref()).await? {
            ResumePoint::Fresh => fresh,
            ResumePoint::Continue {
                turn,
                role,
                previous_output,
            } => {
                let summary = self.ledger.summary().await?;
                for (agent, count) in summary.per_agent {
                    self.role_turns.insert(agent, count as u32);
                }
                obs::emit_resumed(&self.context.task_id, turn, &role);
                StartPoint::Run {
                    turn,
                    role,
                    previous_output: Some(previous_output),
                }
            }
            ResumePoint::Complete { last } => {
                debug!(turn = last.turn, "task already complete, nothing to resume");
                StartPoint::AlreadyComplete {
                    turn: last.turn,
                    role: last.agent,
                    output: last.result,
                }
            }
        })
    }

    /// Build the terminal summary, re-reading ledger totals from storage.
    async fn finish(
        &self,
        status: ExecutionStatus,
        turn: u32,
        agent: String,
        output: String,
        artifacts: Vec<Value>,
    ) -> Result<ExecutionResult> {
        let summary = self.ledger.summary().await?;
        Ok(ExecutionResult {
            status,
            turn,
            agent,
            output,
            artifacts,
            ledger_entries: summary.entries,
            total_tokens: summary.total_tokens,
            total_cost: summary.total_cost,
        })
    }

    pub fn context(&self) -> &OrchestrationContext {
        &self.context
    }

    pub fn ledger(&self) -> &dyn LedgerStore {
        self.ledger.as_ref()
    }

    /// Current or last executed global turn (0 before the first turn).
    pub fn turn(&self) -> u32 {
        self.turn
    }

    /// How many times `role` has been invoked in the current run.
    pub fn role_turn(&self, role: &str) -> u32 {
        self.role_turns.get(role).copied().unwrap_or(0)
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// The ledger as CSV.
    pub async fn export_history(&self) -> Result<String> {
        Ok(self.ledger.export_csv().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedAgent;
    use baton_ledger::fakes::MemoryLedger;

    fn orchestrator(task_id: &str) -> Orchestrator {
        Orchestrator::new(
            OrchestrationContext::new(task_id, "demo"),
            Arc::new(MemoryLedger::new(task_id)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn execute_before_initialize_is_rejected() {
        let mut orch = orchestrator("t");
        let err = orch.execute().await.unwrap_err();
        assert!(matches!(
            err,
            OrchestrationError::NotReady {
                state: OrchestratorState::Idle
            }
        ));
    }

    #[tokio::test]
    async fn initialize_moves_to_ready_and_execute_to_terminal() {
        let mut orch = orchestrator("t");
        assert_eq!(orch.state(), OrchestratorState::Idle);
        orch.initialize().await.unwrap();
        assert_eq!(orch.state(), OrchestratorState::Ready);

        orch.register_agent(Box::new(
            ScriptedAgent::new("planner", "t").respond(r#"{"nextAgent":null}"#),
        ));
        orch.execute().await.unwrap();
        assert_eq!(orch.state(), OrchestratorState::Terminal);
    }

    #[test]
    fn ledger_for_another_task_is_rejected() {
        let result = Orchestrator::new(
            OrchestrationContext::new("a", "demo"),
            Arc::new(MemoryLedger::new("b")),
        );
        assert!(matches!(result, Err(OrchestrationError::InvalidContext(_))));
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let mut orch = orchestrator("t");
        orch.register_agent(Box::new(ScriptedAgent::new("coder", "t")));
        orch.register_agent(Box::new(ScriptedAgent::new("coder", "t")));
        orch.register_agent(Box::new(ScriptedAgent::new("planner", "t")));
        assert_eq!(orch.registered_roles(), vec!["coder", "planner"]);
    }

    #[tokio::test]
    async fn role_turns_count_invocations_per_role() {
        let mut orch = orchestrator("t");
        orch.initialize().await.unwrap();
        orch.register_agent(Box::new(
            ScriptedAgent::new("planner", "t")
                .respond(r#"{"nextAgent":"coder"}"#)
                .respond(r#"{"nextAgent":null}"#),
        ));
        orch.register_agent(Box::new(
            ScriptedAgent::new("coder", "t").respond(r#"{"nextAgent":"planner"}"#),
        ));

        let result = orch.execute().await.unwrap();
        assert_eq!(result.turn, 3);
        assert_eq!(orch.turn(), 3);
        assert_eq!(orch.role_turn("planner"), 2);
        assert_eq!(orch.role_turn("coder"), 1);
        assert_eq!(orch.role_turn("docs"), 0);
    }

    #[test]
    fn state_display() {
        assert_eq!(OrchestratorState::Running.to_string(), "running");
        assert_eq!(OrchestratorState::Terminal.to_string(), "terminal");
    }
}
