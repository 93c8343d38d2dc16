//! The audited unit of work: one [`AgentLedgerEntry`] per executed turn.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

/// Maximum number of characters of a turn's serialized output kept in the ledger.
pub const RESULT_MAX_CHARS: usize = 500;

/// One audited turn.
///
/// Serialized field names are camelCase so the on-disk JSON Lines format
/// stays readable by external tooling (`taskId`, `tokensUsed`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentLedgerEntry {
    /// Epoch milliseconds at which the entry was built
    pub timestamp: i64,
    /// Role name of the agent that executed the turn
    pub agent: String,
    pub task_id: String,
    /// 1-based, strictly increasing within a task
    pub turn: u32,
    /// Short label, e.g. "Execute planner"
    pub action: String,
    /// Serialized turn output, truncated to [`RESULT_MAX_CHARS`]
    pub result: String,
    pub tokens_used: u64,
    pub cost: f64,
}

impl AgentLedgerEntry {
    /// Build an entry stamped with the current time. `result` is truncated.
    pub fn new(
        agent: impl Into<String>,
        task_id: impl Into<String>,
        turn: u32,
        action: impl Into<String>,
        result: &str,
        tokens_used: u64,
        cost: f64,
    ) -> Self {
        Self {
            timestamp: Utc::now().timestamp_millis(),
            agent: agent.into(),
            task_id: task_id.into(),
            turn,
            action: action.into(),
            result: truncate_result(result),
            tokens_used,
            cost: cost.max(0.0),
        }
    }
}

/// Keep at most [`RESULT_MAX_CHARS`] characters, never splitting a code point.
pub fn truncate_result(result: &str) -> String {
    match result.char_indices().nth(RESULT_MAX_CHARS) {
        Some((idx, _)) => result[..idx].to_string(),
        None => result.to_string(),
    }
}

/// Reject task ids that cannot safely be used as a single path component.
pub fn validate_task_id(task_id: &str) -> LedgerResult<()> {
    let reason = if task_id.trim().is_empty() {
        Some("must not be empty")
    } else if task_id.contains('/') || task_id.contains('\\') {
        Some("must not contain path separators")
    } else if task_id.contains("..") {
        Some("must not contain '..'")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(LedgerError::InvalidTaskId {
            task_id: task_id.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
