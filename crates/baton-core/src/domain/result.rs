//! Terminal outcome of an orchestration run.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminal status of an orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Stopped because no role follows (explicit stop, malformed output,
    /// or the default chain ran out).
    Success,
    /// A turn exceeded the per-turn timeout.
    Failed,
    /// Cut off by the turn ceiling or cancelled with a handoff pending.
    Incomplete,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Incomplete => "incomplete",
        };
        write!(f, "{s}")
    }
}

/// Terminal summary of an orchestration run. Never persisted directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    /// Last turn executed
    pub turn: u32,
    /// Role active at termination
    pub agent: String,
    /// Raw, untruncated result of the last turn
    pub output: String,
    /// Artifacts of every turn, in turn order
    pub artifacts: Vec<Value>,
    /// Ledger totals, re-read from storage
    pub ledger_entries: usize,
    pub total_tokens: u64,
    pub total_cost: f64,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}
