//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act in the world:
//! evaluate code, fetch pages, ask a model to write text, or anything an
//! external tool provider exposes. Every plan step is dispatched to exactly
//! one tool, looked up by name.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ToolError;
use crate::message::Message;

/// A tool definition advertised to the language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Function-calling schema in the OpenAI `tools` array shape.
    pub fn to_params(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// A concrete request to run a tool, produced by the tool-call decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Call ID chosen by the model (or generated when missing)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// One item of tool output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
    Audio {
        data: String,
        #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
    Resource {
        resource: serde_json::Value,
    },
    ResourceLink {
        uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl ToolContent {
    pub fn text(text: impl Into<String>) -> Self {
        ToolContent::Text { text: text.into() }
    }

    /// The text payload, if this is a text item.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ToolContent::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Raw output of a tool, before normalization.
///
/// `content` is optional and unconstrained here; the agent reduces it to
/// exactly one text or image item before anything else sees it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<ToolContent>>,

    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Some(vec![ToolContent::text(text)]),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: Some(vec![ToolContent::text(text)]),
            is_error: true,
        }
    }
}

/// Normalized tool result: always exactly one content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<ToolContent>,

    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(item: ToolContent) -> Self {
        Self {
            content: vec![item],
            is_error: false,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::success(ToolContent::text(text))
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::text(text)],
            is_error: true,
        }
    }

    /// The single content item.
    pub fn item(&self) -> Option<&ToolContent> {
        self.content.first()
    }

    /// Text of the single item, if it is text.
    pub fn text_content(&self) -> Option<&str> {
        self.item().and_then(ToolContent::as_text)
    }
}

/// The core Tool trait.
///
/// Each tool (calculator, web_fetch, llm_generator, provider tools) implements
/// this trait and is registered with the agent's tool actor.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "calculator").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the planner).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Whether earlier step results may be pulled into this tool's context.
    fn needs_context(&self) -> bool {
        false
    }

    /// Run the tool. `context` holds prior results selected for this step.
    async fn invoke(
        &self,
        call: &ToolInvocation,
        context: &[Message],
    ) -> std::result::Result<ToolOutput, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// An external source of tools (an MCP server, a browser bridge, ...).
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Identifier used to remove the provider's tools again.
    fn name(&self) -> &str;

    async fn list_tools(&self) -> std::result::Result<Vec<ToolDefinition>, ToolError>;

    async fn invoke(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolOutput, ToolError>;
}
