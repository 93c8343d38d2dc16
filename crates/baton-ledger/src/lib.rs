//! Baton-Ledger: durable turn log for baton orchestrations
//!
//! Every executed turn of an orchestration is recorded as one
//! [`AgentLedgerEntry`]. The ledger is append-only and keyed by task id; it
//! is the mechanism behind auditing, forensic replay and resumability.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: crash-safe streaming appends and whole-ledger reads.
//!
//! ## Key Components
//!
//! - `LedgerStore`: backend-agnostic trait with derived queries and exports
//! - `FsLedger`: JSON Lines file at `<tasks_root>/<task_id>/agent.ledger`
//! - `fakes::MemoryLedger`: in-memory implementation for tests

pub mod entry;
mod error;
pub mod fakes;
pub mod fs_ledger;
pub mod storage_traits;

pub use entry::{truncate_result, validate_task_id, AgentLedgerEntry, RESULT_MAX_CHARS};
pub use error::{LedgerError, LedgerResult};
pub use fs_ledger::{FsLedger, LEDGER_FILE_NAME};
pub use storage_traits::{
    export_csv, replay_digest, LedgerStore, LedgerSummary, CSV_HEADER,
};
