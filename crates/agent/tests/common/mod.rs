//! Scripted model backends and chunk helpers shared by the engine tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use stepwise_agent::{AgentService, AgentSettings, LanguageModel, TaskRequest, ToolActor};
use stepwise_core::error::ProviderError;
use stepwise_core::message::Message;
use stepwise_core::protocol::{AgentChunk, ContentBlock, StopReason};
use stepwise_core::provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk};
use stepwise_core::state::AgentState;
use stepwise_storage::LocalStorage;
use stepwise_tools::CalculatorTool;

// ── Scripted provider ────────────────────────────────────────────────────

/// A scripted reply that makes the request fail.
pub const FAILED_REPLY: &str = "<scripted failure>";

/// Replies with scripted texts in order. Streamed requests get the whole
/// reply as one chunk. Loads, unloads and calls are logged per model.
pub struct ScriptedProvider {
    replies: Mutex<Vec<String>>,
    call_count: Mutex<usize>,
    events: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies),
            call_count: Mutex::new(0),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    /// Entries like `load:planner`, `call:tools`, `unload:tools`.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut count = self.call_count.lock().unwrap();
        let replies = self.replies.lock().unwrap();
        if *count >= replies.len() {
            panic!("ScriptedProvider exhausted: call #{}, have {}", *count, replies.len());
        }
        let reply = replies[*count].clone();
        *count += 1;
        self.events.lock().unwrap().push(format!("call:{}", request.model));
        if reply == FAILED_REPLY {
            return Err(ProviderError::Network("scripted failure".into()));
        }
        Ok(ProviderResponse {
            message: Message::assistant(reply),
            usage: None,
            model: request.model,
        })
    }

    async fn load(&self, model: &str) -> Result<(), ProviderError> {
        self.events.lock().unwrap().push(format!("load:{model}"));
        Ok(())
    }

    async fn unload(&self, model: &str) -> Result<(), ProviderError> {
        self.events.lock().unwrap().push(format!("unload:{model}"));
        Ok(())
    }
}

/// Streams never produce anything until the run is cancelled.
#[derive(Default)]
pub struct HangingProvider {
    senders: Mutex<Vec<tokio::sync::mpsc::Sender<Result<StreamChunk, ProviderError>>>>,
}

#[async_trait::async_trait]
impl Provider for HangingProvider {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::NotConfigured("hanging".into()))
    }

    async fn stream(&self, _request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        self.senders.lock().unwrap().push(tx);
        Ok(rx)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

pub const ONE_STEP_PLAN: &str = r#"<think>add the numbers</think><plan>{"tasks":[{"task_goal":"compute the sum","steps":[{"step_goal":"add 2 and 2","tool_name":"calculator","result_file":"sum"}]}]}</plan>"#;

pub const CALCULATOR_CALL: &str =
    r#"{"type":"function","id":"call_1","function":{"name":"calculator","arguments":{"code":"return 2+2;"}}}"#;

pub fn service(provider: Arc<dyn Provider>, storage: Arc<LocalStorage>) -> AgentService {
    let tools = Arc::new(ToolActor::with_tools(vec![Arc::new(CalculatorTool)]));
    let planner = LanguageModel::new(provider, "planner");
    let tool_model = planner.sharing("tools");
    AgentService::new(tools, storage, planner, tool_model, AgentSettings::default())
}

pub async fn run(service: &AgentService, request: TaskRequest) -> Vec<AgentChunk> {
    let stream = service.task_stream(request);
    tokio::time::timeout(Duration::from_secs(10), stream.collect())
        .await
        .expect("run did not finish")
}

pub fn stop_reason(chunks: &[AgentChunk]) -> Option<StopReason> {
    match chunks.last() {
        Some(AgentChunk::MessageStop { message }) => Some(message.stop_reason),
        _ => None,
    }
}

pub fn statuses(chunks: &[AgentChunk]) -> Vec<AgentState> {
    chunks
        .iter()
        .filter_map(|c| match c {
            AgentChunk::StatusBlock { status } => Some(*status),
            _ => None,
        })
        .collect()
}

pub fn deltas(chunks: &[AgentChunk]) -> Vec<&ContentBlock> {
    chunks
        .iter()
        .filter_map(|c| match c {
            AgentChunk::ContentBlockDelta { content_block, .. } => Some(content_block),
            _ => None,
        })
        .collect()
}

pub fn answer(chunks: &[AgentChunk]) -> String {
    deltas(chunks)
        .into_iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

pub fn assert_balanced(chunks: &[AgentChunk]) {
    let starts = chunks
        .iter()
        .filter(|c| matches!(c, AgentChunk::ContentBlockStart { .. }))
        .count();
    let stops = chunks
        .iter()
        .filter(|c| matches!(c, AgentChunk::ContentBlockStop { .. }))
        .count();
    assert_eq!(starts, stops, "unbalanced blocks: {chunks:#?}");
    assert!(matches!(chunks.first(), Some(AgentChunk::MessageStart { .. })));
}
