//! Resume-point computation from a task's ledger.
//!
//! Only the last entry matters. Its recorded result (possibly truncated)
//! decides whether the task is finished or which role runs next.

use baton_ledger::{AgentLedgerEntry, LedgerResult, LedgerStore};
use serde_json::Value;

use crate::report::Handoff;
use crate::roles;

/// Where a resumed run picks up.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumePoint {
    /// Empty ledger: start at turn 1 with the first role.
    Fresh,
    /// Continue at `turn` with `role`.
    Continue {
        turn: u32,
        role: String,
        /// Recorded result of the last turn, fed to the next one
        previous_output: String,
    },
    /// The last recorded turn already ended the task.
    Complete { last: AgentLedgerEntry },
}

/// Decide the resume point from the ledger's last entry.
pub async fn find_resume_point(ledger: &dyn LedgerStore) -> LedgerResult<ResumePoint> {
    Ok(match ledger.last().await? {
        None => ResumePoint::Fresh,
        Some(last) => resume_after(last),
    })
}

pub fn resume_after(last: AgentLedgerEntry) -> ResumePoint {
    let next_turn = last.turn + 1;
    let next_role = match serde_json::from_str::<Value>(&last.result) {
        // Truncated or otherwise unreadable: fall back to the default chain.
        Err(_) => roles::after(&last.agent).map(str::to_string),
        Ok(value) if value.get("timedOut") == Some(&Value::Bool(true)) => {
            Some(last.agent.clone())
        }
        Ok(value) => Handoff::from_value(&value).resolve(&last.agent),
    };

    match next_role {
        Some(role) => ResumePoint::Continue {
            turn: next_turn,
            role,
            previous_output: last.result,
        },
        None => ResumePoint::Complete { last },
    }
}
