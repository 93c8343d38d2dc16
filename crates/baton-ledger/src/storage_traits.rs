//! Storage trait definitions for baton
//!
//! `LedgerStore` is the durable, append-only audit trail of one task.
//! Backends implement the three primitive operations (`initialize`,
//! `append`, `read_all`); every query, aggregate and export is derived
//! from `read_all` so it always reflects durable state.
//!
//! In-memory fakes are provided for testing via the `fakes` module.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::entry::AgentLedgerEntry;
use crate::error::LedgerResult;

/// CSV header emitted by [`export_csv`].
pub const CSV_HEADER: &str = "timestamp,agent,turn,action,tokens,cost";

/// Per-task append-only turn ledger.
///
/// Guarantees:
/// - `append` never rewrites or removes an existing entry.
/// - `read_all` after `append(e)` returns `e` as the last element.
/// - `read_all` on a task with no history returns an empty list.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Task id this ledger is keyed by.
    fn task_id(&self) -> &str;

    /// Acquire the task's storage. Idempotent.
    async fn initialize(&self) -> LedgerResult<()>;

    /// Persist one entry. Propagates I/O failures; never drops an entry.
    async fn append(&self, entry: &AgentLedgerEntry) -> LedgerResult<()>;

    /// Every recorded entry, in append order.
    async fn read_all(&self) -> LedgerResult<Vec<AgentLedgerEntry>>;

    /// Entries produced by the named role.
    async fn by_agent(&self, agent: &str) -> LedgerResult<Vec<AgentLedgerEntry>> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .filter(|e| e.agent == agent)
            .collect())
    }

    /// Entries recorded for a given global turn.
    async fn by_turn(&self, turn: u32) -> LedgerResult<Vec<AgentLedgerEntry>> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .filter(|e| e.turn == turn)
            .collect())
    }

    /// Most recently appended entry, if any.
    async fn last(&self) -> LedgerResult<Option<AgentLedgerEntry>> {
        Ok(self.read_all().await?.pop())
    }

    async fn total_tokens(&self) -> LedgerResult<u64> {
        Ok(self.read_all().await?.iter().map(|e| e.tokens_used).sum())
    }

    async fn total_cost(&self) -> LedgerResult<f64> {
        Ok(self.read_all().await?.iter().map(|e| e.cost).sum())
    }

    /// Tabular snapshot of the whole ledger, see [`export_csv`].
    async fn export_csv(&self) -> LedgerResult<String> {
        Ok(export_csv(&self.read_all().await?))
    }

    /// Aggregate accounting over the whole ledger.
    async fn summary(&self) -> LedgerResult<LedgerSummary> {
        Ok(LedgerSummary::from_entries(&self.read_all().await?))
    }
}

/// Aggregate view of a ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub entries: usize,
    pub total_tokens: u64,
    pub total_cost: f64,
    /// Highest turn recorded (0 when empty)
    pub last_turn: u32,
    /// Number of turns per role name, sorted by name
    pub per_agent: BTreeMap<String, usize>,
    /// See [`replay_digest`]
    pub replay_digest: String,
}

impl LedgerSummary {
    pub fn from_entries(entries: &[AgentLedgerEntry]) -> Self {
        let mut per_agent = BTreeMap::new();
        for entry in entries {
            *per_agent.entry(entry.agent.clone()).or_insert(0) += 1;
        }
        Self {
            entries: entries.len(),
            total_tokens: entries.iter().map(|e| e.tokens_used).sum(),
            total_cost: entries.iter().map(|e| e.cost).sum(),
            last_turn: entries.iter().map(|e| e.turn).max().unwrap_or(0),
            per_agent,
            replay_digest: replay_digest(entries),
        }
    }
}

/// Render entries as CSV: [`CSV_HEADER`] plus one row per entry.
///
/// Commas inside `action` become `;` so rows split cleanly on `,` without a
/// quoting layer. Rows are joined with `\n`, without a trailing newline.
pub fn export_csv(entries: &[AgentLedgerEntry]) -> String {
    let mut lines = Vec::with_capacity(entries.len() + 1);
    lines.push(CSV_HEADER.to_string());
    for e in entries {
        lines.push(format!(
            "{},{},{},{},{},{}",
            e.timestamp,
            e.agent,
            e.turn,
            e.action.replace(',', ";"),
            e.tokens_used,
            e.cost
        ));
    }
    lines.join("\n")
}

/// SHA-256 hex digest of `serde_json::to_vec(entries)`.
///
/// Two ledgers with identical entries produce identical digests, so the
/// value can be used for golden comparisons and tamper checks.
pub fn replay_digest(entries: &[AgentLedgerEntry]) -> String {
    // Serializing a slice of plain structs cannot fail.
    let bytes = serde_json::to_vec(entries).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(agent: &str, turn: u32, action: &str, tokens: u64, cost: f64) -> AgentLedgerEntry {
        let mut e = AgentLedgerEntry::new(agent, "t-1", turn, action, "{}", tokens, cost);
        e.timestamp = 1_700_000_000_000 + turn as i64;
        e
    }

    #[test]
    fn csv_has_header_and_one_row_per_entry() {
        let csv = export_csv(&[
            entry("planner", 1, "Execute planner", 10, 0.25),
            entry("coder", 2, "Execute coder", 0, 0.0),
        ]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "1700000000001,planner,1,Execute planner,10,0.25");
        assert_eq!(lines[2], "1700000000002,coder,2,Execute coder,0,0");
    }

    #[test]
    fn csv_replaces_commas_in_action() {
        let csv = export_csv(&[entry("coder", 1, "Execute coder, retry", 0, 0.0)]);
        let row = csv.lines().nth(1).unwrap();
        assert!(row.contains("Execute coder; retry"));
        assert_eq!(row.split(',').count(), 6);
    }

    #[test]
    fn csv_for_empty_ledger_is_header_only() {
        assert_eq!(export_csv(&[]), CSV_HEADER);
    }

    #[test]
    fn replay_digest_is_stable_and_content_sensitive() {
        let a = vec![entry("planner", 1, "Execute planner", 0, 0.0)];
        let b = a.clone();
        assert_eq!(replay_digest(&a), replay_digest(&b));
        assert_eq!(replay_digest(&a).len(), 64);

        let c = vec![entry("coder", 1, "Execute coder", 0, 0.0)];
        assert_ne!(replay_digest(&a), replay_digest(&c));
    }

    #[test]
    fn summary_aggregates_tokens_cost_and_roles() {
        let entries = vec![
            entry("planner", 1, "Execute planner", 100, 0.5),
            entry("coder", 2, "Execute coder", 50, 0.25),
            entry("coder", 3, "Execute coder", 25, 0.25),
        ];
        let summary = LedgerSummary::from_entries(&entries);
        assert_eq!(summary.entries, 3);
        assert_eq!(summary.total_tokens, 175);
        assert!((summary.total_cost - 1.0).abs() < f64::EPSILON);
        assert_eq!(summary.last_turn, 3);
        assert_eq!(summary.per_agent.get("coder"), Some(&2));
    }
}
