//! # stepwise core
//!
//! Domain types, traits, and error definitions for the stepwise agent.
//! This crate has no framework dependencies: it defines the plan model,
//! the streamed wire protocol, and the seams (model provider, tools,
//! storage) that the other crates implement against.

pub mod error;
pub mod message;
pub mod plan;
pub mod protocol;
pub mod provider;
pub mod state;
pub mod storage;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{AgentError, Error, ProviderError, Result, StorageError, ToolError};
pub use message::{Message, Role};
pub use plan::{Plan, Status, Step, Task};
pub use protocol::{AgentChunk, BlockKind, ContentBlock, StopReason};
pub use provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, TextGenerator};
pub use state::{AgentState, ContextUpdate, StateContext};
pub use storage::{
    FileMeta, FileRecord, SessionContent, SessionNode, SessionRecord, SessionStep, StorageBackend,
    ToolResultRecord,
};
pub use tool::{
    Tool, ToolContent, ToolDefinition, ToolInvocation, ToolOutput, ToolProvider, ToolResult,
};
