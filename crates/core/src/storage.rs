//! Storage trait: persistence for step outputs and session history.
//!
//! Three record kinds, each keyed by id: files (step outputs), tool results
//! (one per executed step, keyed by `step_uuid`) and sessions (rendered
//! history for replay). Calls are independent; the last writer wins.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::message::Role;
use crate::plan::Status;
use crate::tool::ToolDefinition;

/// A stored step output. Text is stored as-is, binary payloads as base64.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub content: String,
    pub created_at: i64,
}

impl FileRecord {
    pub fn meta(&self) -> FileMeta {
        FileMeta {
            id: self.id.clone(),
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
        }
    }
}

/// File metadata without the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub id: String,
    pub name: String,
    pub mime_type: String,
}

/// Outcome of one executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultRecord {
    /// The step's `step_uuid`.
    pub id: String,
    pub step_id: String,
    pub task_id: String,
    pub step_goal: String,
    pub result: String,
    pub is_error: bool,
    pub result_file: String,
    pub file_id: Option<String>,
    /// Schema of the tool that ran, if it was found.
    pub tool: Option<ToolDefinition>,
    pub should_act: bool,
    pub input: Option<serde_json::Value>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub name: String,
    pub nodes: Vec<SessionNode>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One rendered message of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionNode {
    pub id: String,
    pub role: Role,
    pub parent: Option<String>,
    pub content: Vec<SessionContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionContent {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        attachments: Vec<FileMeta>,
    },
    Thinking {
        text: String,
    },
    Task {
        task_uuid: String,
        task_goal: String,
        status: Status,
        steps: Vec<SessionStep>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStep {
    pub step_uuid: String,
    pub step_goal: String,
    pub tool_name: String,
    pub status: Status,
}

/// The storage backend trait.
///
/// Implementations: in-memory (for testing), JSON-lines files.
/// `create_*` fails on an existing id; `update_*` keeps `id` and
/// `created_at` and replaces everything else.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// The backend name (e.g., "memory", "file").
    fn name(&self) -> &str;

    // --- Files ---
    async fn create_file(&self, record: FileRecord) -> std::result::Result<FileRecord, StorageError>;
    async fn get_file(&self, id: &str) -> std::result::Result<Option<FileRecord>, StorageError>;
    async fn update_file(&self, record: FileRecord) -> std::result::Result<Option<FileRecord>, StorageError>;
    async fn list_files(&self) -> std::result::Result<Vec<FileRecord>, StorageError>;
    async fn find_files_by_name(&self, name: &str) -> std::result::Result<Vec<FileRecord>, StorageError>;
    async fn delete_file(&self, id: &str) -> std::result::Result<bool, StorageError>;

    // --- Tool results ---
    async fn create_tool_result(
        &self,
        record: ToolResultRecord,
    ) -> std::result::Result<ToolResultRecord, StorageError>;
    async fn get_tool_result(&self, id: &str) -> std::result::Result<Option<ToolResultRecord>, StorageError>;
    async fn update_tool_result(
        &self,
        record: ToolResultRecord,
    ) -> std::result::Result<Option<ToolResultRecord>, StorageError>;
    async fn list_tool_results(&self) -> std::result::Result<Vec<ToolResultRecord>, StorageError>;
    async fn find_tool_results_by_task(
        &self,
        task_id: &str,
    ) -> std::result::Result<Vec<ToolResultRecord>, StorageError>;
    async fn delete_tool_result(&self, id: &str) -> std::result::Result<bool, StorageError>;

    // --- Sessions ---
    async fn create_session(&self, record: SessionRecord) -> std::result::Result<SessionRecord, StorageError>;
    async fn get_session(&self, id: &str) -> std::result::Result<Option<SessionRecord>, StorageError>;
    /// Fails with `NotFound` when the session does not exist.
    async fn update_session(&self, record: SessionRecord) -> std::result::Result<SessionRecord, StorageError>;
    async fn list_sessions(&self) -> std::result::Result<Vec<SessionRecord>, StorageError>;
    async fn delete_session(&self, id: &str) -> std::result::Result<bool, StorageError>;
}
