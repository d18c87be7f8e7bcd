//! Web search tool: keyword search through a public search API.
//!
//! Two backends: the DuckDuckGo Instant Answer API (no key needed) and a
//! SearXNG instance's JSON endpoint. Either way the top five hits come back
//! as one text block.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use stepwise_core::error::ToolError;
use stepwise_core::message::Message;
use stepwise_core::tool::{Tool, ToolInvocation, ToolOutput};
use tracing::debug;

const MAX_HITS: usize = 5;
const NO_RESULTS: &str = "No results found";

/// Where searches go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchBackend {
    DuckDuckGo { endpoint: String },
    SearXng { endpoint: String },
}

impl SearchBackend {
    pub fn duckduckgo() -> Self {
        Self::DuckDuckGo {
            endpoint: "https://api.duckduckgo.com".into(),
        }
    }

    pub fn searxng(endpoint: impl Into<String>) -> Self {
        Self::SearXng {
            endpoint: endpoint.into(),
        }
    }

    /// Build from the `[tools]` config values. `None` for an unknown name.
    pub fn from_name(name: &str, endpoint: Option<&str>) -> Option<Self> {
        match name {
            "duckduckgo" => Some(match endpoint {
                Some(endpoint) => Self::DuckDuckGo {
                    endpoint: endpoint.into(),
                },
                None => Self::duckduckgo(),
            }),
            "searxng" => Some(Self::searxng(endpoint.unwrap_or("https://searx.be"))),
            _ => None,
        }
    }
}

impl Default for SearchBackend {
    fn default() -> Self {
        Self::duckduckgo()
    }
}

pub struct WebSearchTool {
    client: reqwest::Client,
    backend: SearchBackend,
}

impl WebSearchTool {
    pub fn new(backend: SearchBackend, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, backend }
    }

    async fn search(&self, query: &str) -> Result<String, reqwest::Error> {
        match &self.backend {
            SearchBackend::DuckDuckGo { endpoint } => {
                let body: Value = self
                    .client
                    .get(format!("{}/", endpoint.trim_end_matches('/')))
                    .query(&[("q", query), ("format", "json"), ("no_html", "1")])
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                Ok(render_duckduckgo(&body))
            }
            SearchBackend::SearXng { endpoint } => {
                let body: Value = self
                    .client
                    .get(format!("{}/search", endpoint.trim_end_matches('/')))
                    .query(&[("q", query), ("format", "json")])
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?;
                Ok(render_searxng(&body))
            }
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for a query and return the top results as text."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search keywords"
                }
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, call: &ToolInvocation, _context: &[Message]) -> Result<ToolOutput, ToolError> {
        let Some(query) = call.arguments["query"].as_str() else {
            return Ok(ToolOutput::error("Missing required argument: query"));
        };

        match self.search(query).await {
            Ok(text) => {
                debug!(query, backend = ?self.backend, chars = text.len(), "searched");
                Ok(ToolOutput::text(text))
            }
            Err(e) => Ok(ToolOutput::error(format!("search for {query:?} failed: {e}"))),
        }
    }
}

fn render_duckduckgo(body: &Value) -> String {
    let mut lines = Vec::new();
    if let Some(summary) = body["Abstract"].as_str().filter(|s| !s.is_empty()) {
        lines.push(format!("Summary: {summary}"));
    }
    let topics: Vec<&str> = body["RelatedTopics"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|topic| topic["Text"].as_str())
        .take(MAX_HITS)
        .collect();
    if !topics.is_empty() {
        lines.push("Related topics:".into());
        lines.extend(topics.into_iter().map(|t| format!("- {t}")));
    }
    if lines.is_empty() {
        NO_RESULTS.into()
    } else {
        lines.join("\n")
    }
}

fn render_searxng(body: &Value) -> String {
    let hits: Vec<String> = body["results"]
        .as_array()
        .into_iter()
        .flatten()
        .take(MAX_HITS)
        .map(|hit| {
            format!(
                "- {}\n  {}\n  {}",
                hit["title"].as_str().unwrap_or_default(),
                hit["url"].as_str().unwrap_or_default(),
                hit["content"].as_str().unwrap_or_default(),
            )
        })
        .collect();
    if hits.is_empty() {
        NO_RESULTS.into()
    } else {
        hits.join("\n\n")
    }
}
