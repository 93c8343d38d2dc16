//! JSON Lines ledger on the local filesystem.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use std::io::SeekFrom;

use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

use crate::entry::{validate_task_id, AgentLedgerEntry};
use crate::error::{LedgerError, LedgerResult};
use crate::storage_traits::LedgerStore;

/// File name of the per-task JSON Lines ledger.
pub const LEDGER_FILE_NAME: &str = "agent.ledger";

/// Filesystem-backed ledger: one JSON object per line.
///
/// Layout: `<tasks_root>/<task_id>/agent.ledger`
///
/// Each append writes one complete, newline-terminated line in a single
/// `write_all`, so a concurrent reader sees a prefix of whole entries. A
/// torn trailing line left by a crash fails to parse and is skipped; the
/// next append starts on a fresh line so it is never glued onto the tear.
#[derive(Debug, Clone)]
pub struct FsLedger {
    task_id: String,
    task_dir: PathBuf,
    path: PathBuf,
}

impl FsLedger {
    /// Bind a ledger to `task_id` under `tasks_root`. Does not touch the disk.
    pub fn new(tasks_root: impl AsRef<Path>, task_id: &str) -> LedgerResult<Self> {
        validate_task_id(task_id)?;
        let task_dir = tasks_root.as_ref().join(task_id);
        let path = task_dir.join(LEDGER_FILE_NAME);
        Ok(Self {
            task_id: task_id.to_string(),
            task_dir,
            path,
        })
    }

    /// Path of the ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding this task's durable state.
    pub fn task_dir(&self) -> &Path {
        &self.task_dir
    }
}

#[async_trait]
impl LedgerStore for FsLedger {
    fn task_id(&self) -> &str {
        &self.task_id
    }

    async fn initialize(&self) -> LedgerResult<()> {
        fs::create_dir_all(&self.task_dir)
            .await
            .map_err(|e| LedgerError::io(&self.task_dir, e))?;
        debug!(task_id = %self.task_id, dir = %self.task_dir.display(), "ledger initialized");
        Ok(())
    }

    async fn append(&self, entry: &AgentLedgerEntry) -> LedgerResult<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| LedgerError::io(&self.path, e))?;

        if !ends_with_newline(&mut file)
            .await
            .map_err(|e| LedgerError::io(&self.path, e))?
        {
            warn!(task_id = %self.task_id, "ledger ends with a torn line, starting a new one");
            line.insert(0, '\n');
        }

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| LedgerError::io(&self.path, e))?;
        file.flush()
            .await
            .map_err(|e| LedgerError::io(&self.path, e))?;

        debug!(task_id = %self.task_id, turn = entry.turn, agent = %entry.agent, "ledger entry appended");
        Ok(())
    }

    async fn read_all(&self) -> LedgerResult<Vec<AgentLedgerEntry>> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LedgerError::io(&self.path, e)),
        };

        let entries = content
            .split(|b| *b == b'\n')
            .enumerate()
            .filter(|(_, l)| !l.iter().all(u8::is_ascii_whitespace))
            .filter_map(|(idx, line)| {
                match serde_json::from_slice::<AgentLedgerEntry>(line) {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        warn!(
                            task_id = %self.task_id,
                            line = idx + 1,
                            error = %e,
                            "skipping unparsable ledger line"
                        );
                        None
                    }
                }
            })
            .collect();

        Ok(entries)
    }
}

/// True for an empty file or one whose last byte is `\n`.
async fn ends_with_newline(file: &mut fs::File) -> std::io::Result<bool> {
    if file.metadata().await?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_ledger() -> (tempfile::TempDir, FsLedger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FsLedger::new(dir.path(), "task-1").unwrap();
        (dir, ledger)
    }

    fn entry(turn: u32) -> AgentLedgerEntry {
        AgentLedgerEntry::new("planner", "task-1", turn, "Execute planner", "{}", 0, 0.0)
    }

    #[tokio::test]
    async fn layout_is_task_dir_slash_agent_ledger() {
        let (dir, ledger) = make_ledger();
        assert_eq!(ledger.path(), dir.path().join("task-1").join("agent.ledger"));
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let (_dir, ledger) = make_ledger();
        ledger.initialize().await.unwrap();
        ledger.initialize().await.unwrap();
        assert!(ledger.task_dir().is_dir());
    }

    #[tokio::test]
    async fn read_all_without_file_is_empty() {
        let (_dir, ledger) = make_ledger();
        assert!(ledger.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_writes_one_line_per_entry() {
        let (_dir, ledger) = make_ledger();
        ledger.initialize().await.unwrap();
        ledger.append(&entry(1)).await.unwrap();
        ledger.append(&entry(2)).await.unwrap();

        let raw = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(raw.lines().count(), 2);
        assert!(raw.ends_with('\n'));
    }

    #[tokio::test]
    async fn append_without_initialize_fails_loudly() {
        let (_dir, ledger) = make_ledger();
        let err = ledger.append(&entry(1)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Io { .. }));
    }

    #[tokio::test]
    async fn torn_trailing_line_is_skipped() {
        let (_dir, ledger) = make_ledger();
        ledger.initialize().await.unwrap();
        ledger.append(&entry(1)).await.unwrap();

        let mut raw = std::fs::read_to_string(ledger.path()).unwrap();
        raw.push_str(r#"{"timestamp":17000,"agent":"co"#);
        std::fs::write(ledger.path(), raw).unwrap();

        let entries = ledger.read_all().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].turn, 1);
    }

    #[tokio::test]
    async fn append_after_torn_line_is_readable() {
        let (_dir, ledger) = make_ledger();
        ledger.initialize().await.unwrap();
        ledger.append(&entry(1)).await.unwrap();

        let mut raw = std::fs::read_to_string(ledger.path()).unwrap();
        raw.push_str(r#"{"timestamp":17000,"agent":"co"#);
        std::fs::write(ledger.path(), raw).unwrap();

        let second = entry(2);
        ledger.append(&second).await.unwrap();

        let entries = ledger.read_all().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries.last(), Some(&second));
        assert!(std::fs::read_to_string(ledger.path()).unwrap().ends_with('\n'));
    }

    #[tokio::test]
    async fn torn_multibyte_tail_is_skipped() {
        let (_dir, ledger) = make_ledger();
        ledger.initialize().await.unwrap();
        ledger.append(&entry(1)).await.unwrap();

        let accented = AgentLedgerEntry::new("coder", "task-1", 2, "Execute coder", "café", 0, 0.0);
        let line = serde_json::to_vec(&accented).unwrap();
        let cut = line.windows(2).position(|w| w == [0xC3, 0xA9]).unwrap() + 1;
        let mut raw = std::fs::read(ledger.path()).unwrap();
        raw.extend_from_slice(&line[..cut]);
        std::fs::write(ledger.path(), raw).unwrap();

        let entries = ledger.read_all().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].turn, 1);
    }

    #[tokio::test]
    async fn rejects_path_like_task_ids() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            FsLedger::new(dir.path(), "../escape"),
            Err(LedgerError::InvalidTaskId { .. })
        ));
    }
}
