//! Wire protocol for streamed agent output.
//!
//! A run produces `message_start`, then any number of content blocks framed
//! by `content_block_start` / `content_block_delta` / `content_block_stop`,
//! and ends with `message_stop`. `status_block` is a side channel announcing
//! phase changes and is not part of block framing.

use serde::{Deserialize, Serialize};

use crate::plan::{Status, Task};
use crate::state::AgentState;
use crate::tool::ToolContent;

/// One chunk of the output stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentChunk {
    MessageStart {
        message: MessageStartInfo,
    },
    MessageStop {
        message: MessageStopInfo,
    },
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockStop {
        index: usize,
        stop_timestamp: i64,
    },
    StatusBlock {
        status: AgentState,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageStartInfo {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub parent: String,
    pub start_timestamp: i64,
    #[serde(default)]
    pub content: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageStopInfo {
    pub id: String,
    pub stop_reason: StopReason,
}

/// Typed payload of a content block chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        text: String,
    },
    Task(Task),
    TaskStatus {
        task_uuid: String,
        status: Status,
    },
    ToolUse {
        task_uuid: String,
        step_uuid: String,
        input: Option<serde_json::Value>,
        /// `None` until the tool-call decision has been made.
        should_act: Option<bool>,
    },
    ToolResult {
        task_uuid: String,
        step_uuid: String,
        content: Vec<ToolContent>,
        #[serde(rename = "isError")]
        is_error: bool,
    },
}

/// Kind of a content block, used for framing decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Text,
    Thinking,
    Task,
}

impl ContentBlock {
    /// The block family this payload belongs to. Step-level payloads
    /// (task status, tool use, tool result) live inside a task block.
    pub fn kind(&self) -> BlockKind {
        match self {
            ContentBlock::Text { .. } => BlockKind::Text,
            ContentBlock::Thinking { .. } => BlockKind::Thinking,
            ContentBlock::Task(_)
            | ContentBlock::TaskStatus { .. }
            | ContentBlock::ToolUse { .. }
            | ContentBlock::ToolResult { .. } => BlockKind::Task,
        }
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
