//! Web fetch tool: HTTP GET of a page or API endpoint.

use std::time::Duration;

use async_trait::async_trait;
use stepwise_core::error::ToolError;
use stepwise_core::message::Message;
use stepwise_core::tool::{Tool, ToolInvocation, ToolOutput};
use tracing::debug;

/// Bodies longer than this are cut before they reach the agent.
const MAX_BODY_CHARS: usize = 20_000;

pub struct WebFetchTool {
    client: reqwest::Client,
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl WebFetchTool {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL with HTTP GET and return the response body. JSON responses are \
         pretty-printed. Use it to read web pages or query public JSON APIs."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The http:// or https:// URL to fetch"
                }
            },
            "required": ["url"]
        })
    }

    async fn invoke(&self, call: &ToolInvocation, _context: &[Message]) -> Result<ToolOutput, ToolError> {
        let url = call.arguments["url"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("missing 'url' argument".into()))?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidArguments(
                "URL must start with http:// or https://".into(),
            ));
        }

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return Ok(ToolOutput::error(format!("request to {url} failed: {e}"))),
        };
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("could not read body from {url}: {e}")))?;
        debug!(url, status = status.as_u16(), bytes = body.len(), "fetched");

        let body = pretty_json(&body).unwrap_or(body);
        let body = clip(&body);
        if status.is_success() {
            Ok(ToolOutput::text(body))
        } else {
            Ok(ToolOutput::error(format!("HTTP {status} from {url}\n{body}")))
        }
    }
}

fn pretty_json(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    serde_json::to_string_pretty(&value).ok()
}

fn clip(body: &str) -> String {
    match body.char_indices().nth(MAX_BODY_CHARS) {
        Some((cut, _)) => format!("{}\n[truncated]", &body[..cut]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn call(url: &str) -> ToolInvocation {
        ToolInvocation {
            id: "call_1".into(),
            name: "web_fetch".into(),
            arguments: serde_json::json!({ "url": url }),
        }
    }

    /// Serve one canned HTTP response and return its base URL.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn rejects_non_http_urls() {
        let result = WebFetchTool::default().invoke(&call("file:///etc/passwd"), &[]).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn json_body_is_pretty_printed() {
        let url = serve_once("200 OK", r#"{"a":1}"#).await;
        let output = WebFetchTool::default().invoke(&call(&url), &[]).await.unwrap();
        assert_eq!(output, ToolOutput::text("{\n  \"a\": 1\n}"));
    }

    #[tokio::test]
    async fn non_success_status_is_error_output() {
        let url = serve_once("404 Not Found", "missing").await;
        let output = WebFetchTool::default().invoke(&call(&url), &[]).await.unwrap();
        assert!(output.is_error);
    }

    #[test]
    fn long_bodies_are_clipped() {
        let body = "x".repeat(MAX_BODY_CHARS + 10);
        assert!(clip(&body).ends_with("[truncated]"));
        assert_eq!(clip("short"), "short");
    }
}
