//! In-memory fakes for agents and collaborator traits (testing only)

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::agent::{Agent, AgentOutput};
use crate::collaborators::{CheckpointStore, Session, SessionStore};
use crate::domain::{AgentError, AgentResult, CollaboratorError, CollaboratorResult, TurnContext};

/// Agent that replays queued outputs and records every context it sees.
///
/// Runs out with [`AgentError::ScriptExhausted`].
pub struct ScriptedAgent {
    role: String,
    task_id: String,
    outputs: VecDeque<AgentOutput>,
    delay: Option<Duration>,
    seen: Arc<Mutex<Vec<TurnContext>>>,
}

impl ScriptedAgent {
    pub fn new(role: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            task_id: task_id.into(),
            outputs: VecDeque::new(),
            delay: None,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a raw result string.
    pub fn respond(mut self, result: impl Into<String>) -> Self {
        self.outputs.push_back(AgentOutput::new(result));
        self
    }

    pub fn respond_with(mut self, output: AgentOutput) -> Self {
        self.outputs.push_back(output);
        self
    }

    /// Sleep before every response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared view of the contexts passed to `execute`, in call order.
    pub fn seen(&self) -> Arc<Mutex<Vec<TurnContext>>> {
        Arc::clone(&self.seen)
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn role(&self) -> &str {
        &self.role
    }

    fn task_id(&self) -> &str {
        &self.task_id
    }

    async fn execute(&mut self, ctx: &TurnContext) -> AgentResult<AgentOutput> {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ctx.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outputs
            .pop_front()
            .ok_or_else(|| AgentError::ScriptExhausted {
                role: self.role.clone(),
            })
    }
}

/// Records every checkpoint request as `(task_id, step)`.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: Mutex<Vec<(String, u32)>>,
    restored: Mutex<Vec<(String, u32)>>,
    fail: AtomicBool,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `checkpoint` fail.
    pub fn fail_checkpoints(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn checkpoints(&self) -> Vec<(String, u32)> {
        self.checkpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn restored(&self) -> Vec<(String, u32)> {
        self.restored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn checkpoint(&self, task_id: &str, step: u32) -> CollaboratorResult<String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Io(std::io::Error::other(
                "injected checkpoint failure",
            )));
        }
        self.checkpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((task_id.to_string(), step));
        Ok(format!("{task_id}@{step}"))
    }

    async fn restore(&self, task_id: &str, step: u32) -> CollaboratorResult<()> {
        let known = self
            .checkpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|(t, s)| t == task_id && *s == step);
        if !known {
            return Err(CollaboratorError::NotFound(format!("{task_id}@{step}")));
        }
        self.restored
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((task_id.to_string(), step));
        Ok(())
    }
}

/// Session store held in a map keyed by task id.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn open(&self, task_id: &str, workspace_root: &str) -> CollaboratorResult<Session> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let session = sessions
            .entry(task_id.to_string())
            .and_modify(|s| s.last_activity = Utc::now())
            .or_insert_with(|| Session::new(task_id, workspace_root));
        Ok(session.clone())
    }

    async fn load(&self, task_id: &str) -> CollaboratorResult<Option<Session>> {
        Ok(self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(task_id)
            .cloned())
    }

    async fn touch(&self, task_id: &str) -> CollaboratorResult<Session> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let session = sessions
            .get_mut(task_id)
            .ok_or_else(|| CollaboratorError::NotFound(format!("session for task {task_id}")))?;
        session.last_activity = Utc::now();
        Ok(session.clone())
    }
}
