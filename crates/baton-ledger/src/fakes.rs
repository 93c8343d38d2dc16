//! In-memory fakes for storage traits (testing only)
//!
//! `MemoryLedger` satisfies the `LedgerStore` contract without touching the
//! filesystem. Failure injection lets tests exercise the I/O error path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::entry::AgentLedgerEntry;
use crate::error::{LedgerError, LedgerResult};
use crate::storage_traits::LedgerStore;

/// In-memory ledger backed by a `Vec<AgentLedgerEntry>`.
#[derive(Debug)]
pub struct MemoryLedger {
    task_id: String,
    entries: Mutex<Vec<AgentLedgerEntry>>,
    fail_appends: AtomicBool,
}

impl MemoryLedger {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            entries: Mutex::new(Vec::new()),
            fail_appends: AtomicBool::new(false),
        }
    }

    /// Seed the ledger with pre-existing history, e.g. from a crashed run.
    pub fn with_entries(task_id: impl Into<String>, entries: Vec<AgentLedgerEntry>) -> Self {
        let ledger = Self::new(task_id);
        *ledger.entries.lock().unwrap_or_else(PoisonError::into_inner) = entries;
        ledger
    }

    /// Make every subsequent `append` fail with an I/O error.
    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    fn task_id(&self) -> &str {
        &self.task_id
    }

    async fn initialize(&self) -> LedgerResult<()> {
        Ok(())
    }

    async fn append(&self, entry: &AgentLedgerEntry) -> LedgerResult<()> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(LedgerError::Io {
                path: format!("memory://{}", self.task_id),
                source: std::io::Error::other("injected append failure"),
            });
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
        Ok(())
    }

    async fn read_all(&self) -> LedgerResult<Vec<AgentLedgerEntry>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
