//! Local storage backend: one table per record kind.
//!
//! Storage location for the file-backed variant: `<dir>/files.jsonl`,
//! `<dir>/tool_results.jsonl`, `<dir>/sessions.jsonl`.

use std::path::Path;

use async_trait::async_trait;
use stepwise_core::error::StorageError;
use stepwise_core::storage::{FileRecord, SessionRecord, StorageBackend, ToolResultRecord};
use tracing::info;

use crate::table::Table;

pub struct LocalStorage {
    name: &'static str,
    files: Table<FileRecord>,
    tool_results: Table<ToolResultRecord>,
    sessions: Table<SessionRecord>,
}

impl LocalStorage {
    /// Non-persistent storage, for tests and throwaway runs.
    pub fn in_memory() -> Self {
        Self {
            name: "memory",
            files: Table::in_memory(),
            tool_results: Table::in_memory(),
            sessions: Table::in_memory(),
        }
    }

    /// JSONL-backed storage rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        info!(dir = %dir.display(), "Opening local storage");
        Self {
            name: "file",
            files: Table::open(dir.join("files.jsonl")),
            tool_results: Table::open(dir.join("tool_results.jsonl")),
            sessions: Table::open(dir.join("sessions.jsonl")),
        }
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    fn name(&self) -> &str {
        self.name
    }

    async fn create_file(&self, record: FileRecord) -> Result<FileRecord, StorageError> {
        self.files.insert(record).await
    }

    async fn get_file(&self, id: &str) -> Result<Option<FileRecord>, StorageError> {
        Ok(self.files.get(id).await)
    }

    async fn update_file(&self, record: FileRecord) -> Result<Option<FileRecord>, StorageError> {
        self.files.replace(record).await
    }

    async fn list_files(&self) -> Result<Vec<FileRecord>, StorageError> {
        Ok(self.files.all().await)
    }

    async fn find_files_by_name(&self, name: &str) -> Result<Vec<FileRecord>, StorageError> {
        Ok(self.files.filter(|f| f.name == name).await)
    }

    async fn delete_file(&self, id: &str) -> Result<bool, StorageError> {
        self.files.remove(id).await
    }

    async fn create_tool_result(&self, record: ToolResultRecord) -> Result<ToolResultRecord, StorageError> {
        self.tool_results.insert(record).await
    }

    async fn get_tool_result(&self, id: &str) -> Result<Option<ToolResultRecord>, StorageError> {
        Ok(self.tool_results.get(id).await)
    }

    async fn update_tool_result(
        &self,
        record: ToolResultRecord,
    ) -> Result<Option<ToolResultRecord>, StorageError> {
        self.tool_results.replace(record).await
    }

    async fn list_tool_results(&self) -> Result<Vec<ToolResultRecord>, StorageError> {
        Ok(self.tool_results.all().await)
    }

    async fn find_tool_results_by_task(&self, task_id: &str) -> Result<Vec<ToolResultRecord>, StorageError> {
        Ok(self.tool_results.filter(|r| r.task_id == task_id).await)
    }

    async fn delete_tool_result(&self, id: &str) -> Result<bool, StorageError> {
        self.tool_results.remove(id).await
    }

    async fn create_session(&self, record: SessionRecord) -> Result<SessionRecord, StorageError> {
        self.sessions.insert(record).await
    }

    async fn get_session(&self, id: &str) -> Result<Option<SessionRecord>, StorageError> {
        Ok(self.sessions.get(id).await)
    }

    async fn update_session(&self, record: SessionRecord) -> Result<SessionRecord, StorageError> {
        let id = record.id.clone();
        self.sessions
            .replace(record)
            .await?
            .ok_or(StorageError::NotFound { kind: "session", id })
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, StorageError> {
        let mut sessions = self.sessions.all().await;
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    async fn delete_session(&self, id: &str) -> Result<bool, StorageError> {
        self.sessions.remove(id).await
    }
}
