//! Structured lifecycle events for orchestration runs.
//!
//! Every event carries an `event = "..."` field so log pipelines can filter
//! on it. Verbosity is controlled through `BATON_LOG` (see [`crate::telemetry`]).

use tracing::{info, warn};

/// Span covering one `execute()` call, tagged with the task id.
///
/// Attach it with `tracing::Instrument` so it stays correct across `.await`.
pub fn task_span(task_id: &str) -> tracing::Span {
    tracing::info_span!("baton.task", task_id = %task_id)
}

pub fn emit_orchestration_started(task_id: &str, first_role: &str, max_turns: u32) {
    info!(
        event = "orchestration.started",
        task_id = %task_id,
        first_role = %first_role,
        max_turns = max_turns,
    );
}

pub fn emit_turn_started(task_id: &str, turn: u32, role: &str, role_turn: u32) {
    info!(
        event = "turn.started",
        task_id = %task_id,
        turn = turn,
        role = %role,
        role_turn = role_turn,
    );
}

/// Emit event: turn finished, with the resolved successor (if any).
pub fn emit_turn_completed(task_id: &str, turn: u32, role: &str, next: Option<&str>) {
    info!(
        event = "turn.completed",
        task_id = %task_id,
        turn = turn,
        role = %role,
        next_role = next.unwrap_or("-"),
    );
}

/// Emit event: agent output was not JSON and was replaced by the stop sentinel.
pub fn emit_malformed_output(task_id: &str, turn: u32, role: &str) {
    warn!(
        event = "turn.malformed_output",
        task_id = %task_id,
        turn = turn,
        role = %role,
    );
}

pub fn emit_turn_timed_out(task_id: &str, turn: u32, role: &str, timeout_secs: u64) {
    warn!(
        event = "turn.timed_out",
        task_id = %task_id,
        turn = turn,
        role = %role,
        timeout_secs = timeout_secs,
    );
}

pub fn emit_ledger_appended(task_id: &str, turn: u32, agent: &str, tokens_used: u64) {
    info!(
        event = "ledger.appended",
        task_id = %task_id,
        turn = turn,
        agent = %agent,
        tokens_used = tokens_used,
    );
}

pub fn emit_resumed(task_id: &str, turn: u32, role: &str) {
    info!(event = "orchestration.resumed", task_id = %task_id, turn = turn, role = %role);
}

pub fn emit_cancelled(task_id: &str, turn: u32) {
    warn!(event = "orchestration.cancelled", task_id = %task_id, turn = turn);
}

/// Emit event: run reached a terminal status.
pub fn emit_orchestration_finished(task_id: &str, status: &str, turn: u32, duration_ms: u64) {
    info!(
        event = "orchestration.finished",
        task_id = %task_id,
        status = %status,
        turn = turn,
        duration_ms = duration_ms,
    );
}

/// Emit event: run aborted with a fatal error (warning level).
pub fn emit_orchestration_failed(task_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "orchestration.failed", task_id = %task_id, error = %error);
}
