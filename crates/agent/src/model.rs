//! Language-model gateway.
//!
//! [`LanguageModel`] wraps a [`Provider`] and a model id and exposes the
//! four interactions the engine needs: free-form completion (whole or
//! streamed), a single-tool call decision, and a context-selection question.
//! Access is serialized by a mutex that may be shared between several
//! gateways when they run on one engine.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use stepwise_core::error::{AgentError, Error};
use stepwise_core::message::Message;
use stepwise_core::plan::Step;
use stepwise_core::provider::{ChunkReceiver, Provider, ProviderRequest, TextGenerator};
use stepwise_core::tool::{ToolDefinition, ToolInvocation};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::parse::{SegmentKind, ThinkingExtractor};
use crate::prompt;

/// A model id bound to a provider, with exclusive access.
#[derive(Clone)]
pub struct LanguageModel {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    gate: Arc<Mutex<()>>,
}

impl std::fmt::Debug for LanguageModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageModel")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl LanguageModel {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.6,
            max_tokens: None,
            gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Another model id on the same engine. Both gateways share one lock.
    pub fn sharing(&self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..self.clone()
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    fn request(&self, messages: Vec<Message>, stream: bool) -> ProviderRequest {
        let mut request = ProviderRequest::new(&self.model, messages)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);
        request.stream = stream;
        request
    }

    /// Whole completion. An empty reply is an error.
    pub async fn ask(&self, messages: Vec<Message>) -> Result<String, Error> {
        let _guard = self.gate.lock().await;
        debug!(model = %self.model, stream = false, "model request");
        let response = self.provider.complete(self.request(messages, false)).await?;
        if response.message.content.is_empty() {
            return Err(AgentError::MalformedResponse("empty response from model".into()).into());
        }
        Ok(response.message.content)
    }

    /// Streamed completion. The model stays locked until the stream is
    /// drained or dropped.
    pub async fn ask_stream(&self, messages: Vec<Message>) -> Result<TextStream, Error> {
        let guard = self.gate.clone().lock_owned().await;
        debug!(model = %self.model, stream = true, "model request");
        let rx = self.provider.stream(self.request(messages, true)).await?;
        Ok(TextStream {
            rx,
            finished: false,
            _guard: guard,
        })
    }

    /// Ask the model to call `tool` for `step`, or decline.
    ///
    /// Anything other than a well-formed call of this very tool counts as a
    /// decline and yields `None`.
    pub async fn tool_call(
        &self,
        step: &Step,
        tool: &ToolDefinition,
        context: &[Message],
    ) -> Result<Option<ToolInvocation>, Error> {
        let schema = pretty(&tool.to_params());
        let mut messages = vec![Message::system(prompt::tool_call_system(&schema))];
        messages.extend(context.iter().cloned());
        messages.push(Message::user(prompt::tool_call_user(&step.step_goal)));

        let reply = self.ask(messages).await?;
        Ok(parse_tool_call(&reply, &tool.name))
    }

    /// Ask whether earlier step results should be loaded for `step`.
    pub async fn tool_context(
        &self,
        step: &Step,
        tool: &ToolDefinition,
        history: &str,
    ) -> Result<ContextDecision, Error> {
        let schema = pretty(&tool.to_params());
        let messages = vec![
            Message::system(prompt::tool_context_system(history, &schema)),
            Message::user(prompt::tool_context_user(&step.step_goal)),
        ];
        let reply = self.ask(messages).await?;
        Ok(serde_json::from_str(extract_json(&reply)).unwrap_or_else(|e| {
            warn!(error = %e, "unreadable context decision, using none");
            ContextDecision::default()
        }))
    }

    pub async fn reload(&self) -> Result<(), Error> {
        let _guard = self.gate.lock().await;
        self.provider.load(&self.model).await?;
        Ok(())
    }

    pub async fn unload(&self) -> Result<(), Error> {
        let _guard = self.gate.lock().await;
        self.provider.unload(&self.model).await?;
        Ok(())
    }
}

#[async_trait]
impl TextGenerator for LanguageModel {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: Vec<Message>) -> Result<String, Error> {
        let reply = self.ask(messages).await?;
        Ok(strip_thinking(&reply))
    }
}

/// Everything after a leading `<think>` section.
pub fn strip_thinking(text: &str) -> String {
    let mut extractor = ThinkingExtractor::new();
    let mut segments = extractor.push(text);
    segments.extend(extractor.finish());
    let content: String = segments
        .into_iter()
        .filter(|s| s.kind == SegmentKind::Content)
        .map(|s| s.text)
        .collect();
    content.trim().to_string()
}

/// Text deltas of one streamed completion, in arrival order.
pub struct TextStream {
    rx: ChunkReceiver,
    finished: bool,
    _guard: OwnedMutexGuard<()>,
}

impl TextStream {
    /// Next non-empty delta, `None` once the reply is complete.
    pub async fn next(&mut self) -> Option<Result<String, Error>> {
        while !self.finished {
            match self.rx.recv().await {
                Some(Ok(chunk)) => {
                    self.finished = chunk.done;
                    if let Some(text) = chunk.content.filter(|t| !t.is_empty()) {
                        return Some(Ok(text));
                    }
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
                None => self.finished = true,
            }
        }
        None
    }
}

/// Which earlier results a context-hungry tool wants to see.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ContextDecision {
    #[serde(default)]
    pub use_context: bool,

    /// Step uuids of the results to load.
    #[serde(default, alias = "steps", alias = "files")]
    pub references: Vec<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Reply {
    Function {
        #[serde(default)]
        id: Option<String>,
        function: FunctionCall,
    },
    Final {},
}

#[derive(Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

fn parse_tool_call(reply: &str, expected: &str) -> Option<ToolInvocation> {
    let reply: Reply = match serde_json::from_str(extract_json(reply)) {
        Ok(reply) => reply,
        Err(e) => {
            warn!(tool = expected, error = %e, "unreadable tool call, treating as no action");
            return None;
        }
    };
    let Reply::Function { id, function } = reply else {
        debug!(tool = expected, "model declined to call tool");
        return None;
    };
    if function.name != expected {
        warn!(tool = expected, called = %function.name, "model called a different tool");
        return None;
    }
    // some models encode arguments as a JSON string
    let arguments = match function.arguments {
        serde_json::Value::String(raw) => {
            serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
        }
        serde_json::Value::Null => serde_json::json!({}),
        other => other,
    };
    Some(ToolInvocation {
        id: id.unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
        name: function.name,
        arguments,
    })
}

/// Strip a leading `<think>` section and a Markdown code fence.
pub(crate) fn extract_json(text: &str) -> &str {
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("<think>") {
        text = match rest.find("</think>") {
            Some(end) => rest[end + "</think>".len()..].trim(),
            None => "",
        };
    }
    if let Some(rest) = text.strip_prefix("```") {
        let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
        text = body.trim_end().strip_suffix("```").unwrap_or(body).trim();
    }
    text
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
