//! Full pipeline tests: config file, file-backed storage, built-in tools and
//! the agent service wired together the way the CLI does it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use stepwise_agent::{AgentService, HistoryContent, Models, TaskRequest, ToolActor};
use stepwise_config::AppConfig;
use stepwise_core::error::ProviderError;
use stepwise_core::message::Message;
use stepwise_core::protocol::{AgentChunk, ContentBlock, StopReason};
use stepwise_core::tool::ToolContent;
use stepwise_core::provider::{Provider, ProviderRequest, ProviderResponse};
use stepwise_storage::LocalStorage;
use stepwise_tools::{ToolSettings, default_tools};

/// Replies in order and records which model each request asked for.
struct ScriptedProvider {
    replies: Mutex<Vec<String>>,
    models: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            models: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut models = self.models.lock().unwrap();
        let replies = self.replies.lock().unwrap();
        let reply = replies
            .get(models.len())
            .cloned()
            .unwrap_or_else(|| panic!("ScriptedProvider exhausted after {} calls", models.len()));
        models.push(request.model.clone());
        Ok(ProviderResponse {
            message: Message::assistant(reply),
            usage: None,
            model: request.model,
        })
    }
}

const CONFIG: &str = r#"
provider = "ollama"
temperature = 0.2

[models]
plan_model = "planner-7b"
tool_model = "caller-1b"
shared_engine = true

[agent]
max_rethink_rounds = 3

[tools]
disabled = ["web_fetch"]
"#;

const REPLIES: [&str; 3] = [
    r#"<think>one addition</think><plan>{"tasks":[{"task_goal":"add","steps":[{"step_goal":"add 2 and 2","tool_name":"calculator","result_file":"sum"}]}]}</plan>"#,
    r#"{"type":"function","id":"call_1","function":{"name":"calculator","arguments":"{\"code\":\"return 2+2;\"}"}}"#,
    "<status>done</status><final>2+2 is 4</final>",
];

fn load_config(dir: &std::path::Path) -> AppConfig {
    let path = dir.join("config.toml");
    let body = format!("{CONFIG}\n[storage]\nbackend = \"file\"\npath = {:?}\n", dir.join("data"));
    std::fs::write(&path, body).unwrap();
    AppConfig::load_from(&path).unwrap()
}

fn build(config: &AppConfig, provider: Arc<ScriptedProvider>) -> AgentService {
    let settings = ToolSettings {
        http_timeout: Duration::from_secs(config.tools.web_fetch_timeout_secs),
        ..ToolSettings::default()
    };
    let models = Models::from_config(config, provider);
    let tools = Arc::new(ToolActor::with_tools(default_tools(models.generator(), &settings)));
    for name in &config.tools.disabled {
        tools.disable(name);
    }
    let storage = Arc::new(LocalStorage::open(config.storage.resolved_path()));
    AgentService::from_config(config, models, storage, tools)
}

#[tokio::test]
async fn e2e_config_to_persisted_history() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(dir.path());
    assert_eq!(config.agent.max_rethink_rounds, 3);

    let provider = Arc::new(ScriptedProvider::new(&REPLIES));
    let service = build(&config, provider.clone());
    assert_eq!(service.settings().max_rethink_rounds, 3);

    let chunks: Vec<AgentChunk> = tokio::time::timeout(
        Duration::from_secs(10),
        service
            .task_stream(TaskRequest::new("2+2?").with_session("demo"))
            .collect(),
    )
    .await
    .unwrap();
    assert!(matches!(
        chunks.last(),
        Some(AgentChunk::MessageStop { message }) if message.stop_reason == StopReason::Success
    ));

    // planner, tool caller, planner
    assert_eq!(
        *provider.models.lock().unwrap(),
        vec!["planner-7b", "caller-1b", "planner-7b"]
    );

    // a second process sees the same history on disk
    let reopened = build(&config, Arc::new(ScriptedProvider::new(&[])));
    let sessions = reopened.sessions().await.unwrap();
    assert_eq!(sessions.len(), 1);
    let history = reopened.history("demo").await.unwrap().unwrap();
    let step = history.nodes[1]
        .content
        .iter()
        .find_map(|c| match c {
            HistoryContent::Task { steps, .. } => steps.first().cloned(),
            _ => None,
        })
        .unwrap();
    assert_eq!(step.result.as_deref(), Some("4"));
    assert_eq!(step.attachment.unwrap().name, "sum");
}

#[tokio::test]
async fn e2e_writing_step_uses_the_tool_model() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(dir.path());
    let provider = Arc::new(ScriptedProvider::new(&[
        r#"<plan>{"tasks":[{"task_goal":"write","steps":[{"step_goal":"a haiku about rust","tool_name":"writing_expert"}]}]}</plan>"#,
        r#"{"type":"function","id":"call_1","function":{"name":"writing_expert","arguments":{"task":"a haiku about rust"}}}"#,
        "<think>five seven five</think>\nOxide on the gate",
        "<status>done</status><final>Oxide on the gate</final>",
    ]));
    let service = build(&config, provider.clone());

    let chunks: Vec<AgentChunk> = tokio::time::timeout(
        Duration::from_secs(10),
        service.task_stream(TaskRequest::new("haiku")).collect(),
    )
    .await
    .unwrap();
    let result = chunks
        .iter()
        .find_map(|c| match c {
            AgentChunk::ContentBlockDelta {
                content_block: ContentBlock::ToolResult { content, .. },
                ..
            } => Some(content.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(result, vec![ToolContent::text("Oxide on the gate")]);
    assert_eq!(
        *provider.models.lock().unwrap(),
        vec!["planner-7b", "caller-1b", "caller-1b", "planner-7b"]
    );
}

#[tokio::test]
async fn e2e_disabled_tools_are_hidden_from_the_planner() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(dir.path());
    let service = build(&config, Arc::new(ScriptedProvider::new(&[])));

    let listing = service.tool_descriptions();
    assert!(listing.contains("calculator"));
    assert!(listing.contains("llm_generator"));
    assert!(!listing.contains("web_fetch"));
    // still registered
    assert!(service.tools().get("web_fetch").is_some());

    assert!(service.enable_tool("web_fetch"));
    assert!(service.tool_descriptions().contains("web_fetch"));
}

#[test]
fn e2e_default_config_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, AppConfig::default_toml()).unwrap();
    let config = AppConfig::load_from(&path).unwrap();
    assert_eq!(config.agent.max_rethink_rounds, 10);
    assert!(config.models.shared_engine);
}
