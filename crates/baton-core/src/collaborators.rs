//! External collaborators of a run: the session store that hands over the
//! workspace, and the checkpoint store called at role boundaries.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::domain::{CollaboratorError, CollaboratorResult};

/// File name of the session record inside a task directory.
pub const SESSION_FILE_NAME: &str = "session.json";

/// Workspace binding for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: Uuid,
    pub workspace_root: String,
    pub task_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(task_id: impl Into<String>, workspace_root: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            workspace_root: workspace_root.into(),
            task_id: task_id.into(),
            created_at: now,
            last_activity: now,
        }
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the task's session, or create one bound to `workspace_root`.
    async fn open(&self, task_id: &str, workspace_root: &str) -> CollaboratorResult<Session>;

    async fn load(&self, task_id: &str) -> CollaboratorResult<Option<Session>>;

    /// Bump `last_activity`. Fails with `NotFound` for an unknown task.
    async fn touch(&self, task_id: &str) -> CollaboratorResult<Session>;
}

/// Opaque snapshot hook invoked after each turn.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Snapshot the workspace after `step`; returns a checkpoint id.
    async fn checkpoint(&self, task_id: &str, step: u32) -> CollaboratorResult<String>;

    async fn restore(&self, task_id: &str, step: u32) -> CollaboratorResult<()>;
}

/// Session store keeping `<root>/<task_id>/session.json`, written atomically.
pub struct FsSessionStore {
    root: PathBuf,
}

impl FsSessionStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn session_path(&self, task_id: &str) -> CollaboratorResult<PathBuf> {
        baton_ledger::validate_task_id(task_id)?;
        Ok(self.root.join(task_id).join(SESSION_FILE_NAME))
    }

    async fn write(&self, session: &Session) -> CollaboratorResult<()> {
        let path = self.session_path(&session.task_id)?;
        let bytes = serde_json::to_vec_pretty(session)?;
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(|e| CollaboratorError::Io(std::io::Error::other(e)))?
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> CollaboratorResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| CollaboratorError::NotFound(path.display().to_string()))?;
    std::fs::create_dir_all(dir)?;

    // Write to a temp file in the same directory, then rename over the target.
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl SessionStore for FsSessionStore {
    async fn open(&self, task_id: &str, workspace_root: &str) -> CollaboratorResult<Session> {
        if let Some(existing) = self.load(task_id).await? {
            return self.touch(&existing.task_id).await;
        }
        let session = Session::new(task_id, workspace_root);
        self.write(&session).await?;
        tracing::debug!(task_id = %task_id, session_id = %session.session_id, "session created");
        Ok(session)
    }

    async fn load(&self, task_id: &str) -> CollaboratorResult<Option<Session>> {
        let path = self.session_path(task_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn touch(&self, task_id: &str) -> CollaboratorResult<Session> {
        let mut session = self
            .load(task_id)
            .await?
            .ok_or_else(|| CollaboratorError::NotFound(format!("session for task {task_id}")))?;
        session.last_activity = Utc::now();
        self.write(&session).await?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_creates_then_reuses_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSessionStore::new(dir.path());

        let first = store.open("task-1", "/work/app").await.unwrap();
        assert!(dir.path().join("task-1").join(SESSION_FILE_NAME).exists());

        let second = store.open("task-1", "/elsewhere").await.unwrap();
        assert_eq!(second.session_id, first.session_id);
        assert_eq!(second.workspace_root, "/work/app");
        assert!(second.last_activity >= first.last_activity);
    }

    #[tokio::test]
    async fn load_missing_is_none_and_touch_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSessionStore::new(dir.path());
        assert!(store.load("nope").await.unwrap().is_none());
        assert!(matches!(
            store.touch("nope").await,
            Err(CollaboratorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn rejects_path_like_task_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSessionStore::new(dir.path());
        assert!(matches!(
            store.open("../escape", "/w").await,
            Err(CollaboratorError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn session_file_uses_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSessionStore::new(dir.path());
        store.open("task-2", "/w").await.unwrap();
        let raw = std::fs::read_to_string(dir.path().join("task-2").join(SESSION_FILE_NAME)).unwrap();
        assert!(raw.contains("\"sessionId\""));
        assert!(raw.contains("\"workspaceRoot\""));
    }
}
