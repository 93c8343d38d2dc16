//! Run input (`OrchestrationContext`) and per-turn input (`TurnContext`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{OrchestrationError, Result};

/// Turn ceiling used when the caller does not pick one.
pub const DEFAULT_MAX_TURNS: u32 = 20;

/// Input to a single orchestration run. Immutable once the run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationContext {
    /// Stable identifier, also the ledger's storage key
    pub task_id: String,
    /// Human-readable task goal
    pub description: String,
    /// Structured payload seeding turn 1; must be a JSON object
    pub initial_context: Value,
    pub max_turns: u32,
    /// Workspace the agents operate on, as handed over by the session store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<String>,
}

impl OrchestrationContext {
    pub fn new(task_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            description: description.into(),
            initial_context: Value::Object(Map::new()),
            max_turns: DEFAULT_MAX_TURNS,
            workspace_root: None,
        }
    }

    pub fn with_initial_context(mut self, initial_context: Value) -> Self {
        self.initial_context = initial_context;
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_workspace_root(mut self, workspace_root: impl Into<String>) -> Self {
        self.workspace_root = Some(workspace_root.into());
        self
    }

    /// Check the invariants the turn loop relies on.
    ///
    /// A `null` initial context is normalised to `{}`.
    pub fn validate(&mut self) -> Result<()> {
        baton_ledger::validate_task_id(&self.task_id)
            .map_err(|e| OrchestrationError::InvalidContext(e.to_string()))?;
        if self.max_turns == 0 {
            return Err(OrchestrationError::InvalidContext(
                "max_turns must be a positive integer".to_string(),
            ));
        }
        match self.initial_context {
            Value::Object(_) => Ok(()),
            Value::Null => {
                self.initial_context = Value::Object(Map::new());
                Ok(())
            }
            _ => Err(OrchestrationError::InvalidContext(
                "initial_context must be a JSON object".to_string(),
            )),
        }
    }
}

/// Everything an agent sees for one turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnContext {
    pub task_id: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<String>,
    /// Role being executed
    pub role: String,
    /// Global, 1-based turn number
    pub turn: u32,
    /// How many times this role has been invoked in this run, including now
    pub role_turn: u32,
    /// `initial_context` shallow-merged with `previousOutput` and `turn`
    pub payload: Value,
}

impl TurnContext {
    /// Build the context for `turn`.
    ///
    /// `previous_output` is the raw result string of the previous turn, or
    /// `None` on the first turn of a run (serialized as `null`).
    pub fn build(
        ctx: &OrchestrationContext,
        role: &str,
        turn: u32,
        role_turn: u32,
        previous_output: Option<&str>,
    ) -> Self {
        let mut payload = match &ctx.initial_context {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        payload.insert(
            "previousOutput".to_string(),
            previous_output.map_or(Value::Null, |s| Value::String(s.to_string())),
        );
        payload.insert("turn".to_string(), Value::from(turn));

        Self {
            task_id: ctx.task_id.clone(),
            description: ctx.description.clone(),
            workspace_root: ctx.workspace_root.clone(),
            role: role.to_string(),
            turn,
            role_turn,
            payload: Value::Object(payload),
        }
    }

    /// Raw result of the previous turn, if any.
    pub fn previous_output(&self) -> Option<&str> {
        self.payload.get("previousOutput").and_then(Value::as_str)
    }
}
