//! Conversation and task memory
//!
//! SQLite store for what was said and which routed tasks ran. Lives in
//! $XDG_DATA_HOME/leo/memory.db by default (see `paths::memory_db_path`).

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{LeoError, Result};

/// Lifecycle of a routed task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub timestamp: DateTime<Utc>,
    pub role: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub id: i64,
    pub goal: String,
    pub status: TaskStatus,
    pub last_step: Option<String>,
    pub updated_at: DateTime<Utc>,
}

pub struct MemoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl MemoryStore {
    /// Open or create the store at `path`
    pub async fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!("Opening memory database at: {}", path.display());

        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            Ok(Connection::open(&path)?)
        })
        .await
        .map_err(|e| LeoError::Internal(format!("memory open task failed: {}", e)))??;

        Self::with_schema(conn).await
    }

    /// Throwaway store, for tests and `--no-memory` style runs
    pub async fn in_memory() -> Result<Self> {
        Self::with_schema(Connection::open_in_memory()?).await
    }

    async fn with_schema(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store
            .with_conn(|conn| {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS conversation (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        timestamp TEXT NOT NULL,
                        role TEXT NOT NULL,
                        message TEXT NOT NULL
                    );
                    CREATE TABLE IF NOT EXISTS tasks (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        goal TEXT NOT NULL,
                        status TEXT NOT NULL,
                        last_step TEXT,
                        updated_at TEXT NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);",
                )
            })
            .await?;
        debug!("Memory schema ready");
        Ok(store)
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            f(&conn).map_err(LeoError::from)
        })
        .await
        .map_err(|e| LeoError::Internal(format!("memory task failed: {}", e)))?
    }

    /// Append one conversation line
    pub async fn add_message(&self, role: &str, message: &str) -> Result<()> {
        let role = role.to_string();
        let message = message.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO conversation (timestamp, role, message) VALUES (?1, ?2, ?3)",
                params![Utc::now(), role, message],
            )
            .map(|_| ())
        })
        .await
    }

    /// Last `limit` conversation lines, oldest first
    pub async fn recent(&self, limit: usize) -> Result<Vec<ChatTurn>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp, role, message FROM conversation
                 ORDER BY id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], |row| {
                Ok(ChatTurn {
                    timestamp: row.get(0)?,
                    role: row.get(1)?,
                    message: row.get(2)?,
                })
            })?;
            let mut turns = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            turns.reverse();
            Ok(turns)
        })
        .await
    }

    pub async fn start_task(&self, goal: &str) -> Result<i64> {
        let goal = goal.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO tasks (goal, status, updated_at) VALUES (?1, ?2, ?3)",
                params![goal, TaskStatus::InProgress.as_str(), Utc::now()],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn update_task(&self, id: i64, last_step: &str) -> Result<()> {
        let last_step = last_step.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE tasks SET last_step = ?1, updated_at = ?2 WHERE id = ?3",
                params![last_step, Utc::now(), id],
            )
            .map(|_| ())
        })
        .await
    }

    pub async fn finish_task(&self, id: i64, status: TaskStatus) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), Utc::now(), id],
            )
            .map(|_| ())
        })
        .await
    }

    /// Most recently started task that has not finished
    pub async fn current_task(&self) -> Result<Option<TaskRecord>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, goal, status, last_step, updated_at FROM tasks
                 WHERE status = ?1 ORDER BY id DESC LIMIT 1",
                params![TaskStatus::InProgress.as_str()],
                task_from_row,
            )
            .optional()
        })
        .await
    }

    pub async fn task(&self, id: i64) -> Result<Option<TaskRecord>> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, goal, status, last_step, updated_at FROM tasks WHERE id = ?1",
                params![id],
                task_from_row,
            )
            .optional()
        })
        .await
    }
}

fn task_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRecord> {
    let status: String = row.get(2)?;
    Ok(TaskRecord {
        id: row.get(0)?,
        goal: row.get(1)?,
        status: TaskStatus::parse(&status).unwrap_or(TaskStatus::Failed),
        last_step: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

/// Conversation lines as router context
pub fn format_context(turns: &[ChatTurn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role, t.message))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_conversation_recent_is_chronological() {
        let store = MemoryStore::in_memory().await.unwrap();
        store.add_message("user", "install vim").await.unwrap();
        store.add_message("assistant", "vim is already installed.").await.unwrap();
        store.add_message("user", "thanks").await.unwrap();

        let recent = store.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "vim is already installed.");
        assert_eq!(recent[1].role, "user");
        assert_eq!(
            format_context(&recent),
            "assistant: vim is already installed.\nuser: thanks"
        );
    }

    #[tokio::test]
    async fn test_task_lifecycle() {
        let store = MemoryStore::in_memory().await.unwrap();
        assert!(store.current_task().await.unwrap().is_none());

        let id = store.start_task("set up nginx").await.unwrap();
        store.update_task(id, "apt-get update").await.unwrap();

        let current = store.current_task().await.unwrap().unwrap();
        assert_eq!(current.id, id);
        assert_eq!(current.goal, "set up nginx");
        assert_eq!(current.last_step.as_deref(), Some("apt-get update"));
        assert_eq!(current.status, TaskStatus::InProgress);

        store.finish_task(id, TaskStatus::Completed).await.unwrap();
        assert!(store.current_task().await.unwrap().is_none());
        assert_eq!(
            store.task(id).await.unwrap().unwrap().status,
            TaskStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/memory.db");
        {
            let store = MemoryStore::open(path.clone()).await.unwrap();
            store.add_message("user", "hello").await.unwrap();
        }
        let reopened = MemoryStore::open(path).await.unwrap();
        assert_eq!(reopened.recent(10).await.unwrap().len(), 1);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            TaskStatus::InProgress,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::parse("bogus"), None);
    }
}
