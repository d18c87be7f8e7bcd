//! The public entry point: one service per process, one stream per request.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stepwise_config::{AgentConfig, AppConfig};
use stepwise_core::error::{StorageError, ToolError};
use stepwise_core::provider::{Provider, TextGenerator};
use stepwise_core::storage::StorageBackend;
use stepwise_core::tool::ToolProvider;
use tracing::{Instrument, info, info_span};

use crate::channel::{TaskStream, channel};
use crate::controller::{AgentController, Engine};
use crate::model::LanguageModel;
use crate::policy::{DefaultPolicy, Policy};
use crate::session::{self, HistoryResponse, SessionSummary};
use crate::tool_actor::ToolActor;
use crate::tool_call::ToolCaller;

/// One user request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub input: String,
    /// Append the finished run to this session's history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl TaskRequest {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            session_id: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSettings {
    pub max_rethink_rounds: u32,
    pub context_char_budget: usize,
    pub channel_capacity: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

impl AgentSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            max_rethink_rounds: config.max_rethink_rounds,
            context_char_budget: config.context_char_budget,
            channel_capacity: config.channel_capacity.max(1),
        }
    }
}

/// The plan and tool roles of one engine.
#[derive(Debug, Clone)]
pub struct Models {
    pub planner: LanguageModel,
    pub tools: LanguageModel,
}

impl Models {
    /// With `shared_engine` both roles go through one gate, so a tool never
    /// reaches the model while the planner holds it.
    pub fn from_config(config: &AppConfig, provider: Arc<dyn Provider>) -> Self {
        let planner = LanguageModel::new(provider.clone(), &config.models.plan_model)
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens);
        let tools = if config.models.shared_engine {
            planner.sharing(&config.models.tool_model)
        } else {
            LanguageModel::new(provider, &config.models.tool_model)
                .with_temperature(config.temperature)
                .with_max_tokens(config.max_tokens)
        };
        Self { planner, tools }
    }

    /// The tool role as a text generator for the writing tools.
    pub fn generator(&self) -> Arc<dyn TextGenerator> {
        Arc::new(self.tools.clone())
    }
}

pub struct AgentService {
    engine: Engine,
    settings: AgentSettings,
}

impl AgentService {
    pub fn new(
        tools: Arc<ToolActor>,
        storage: Arc<dyn StorageBackend>,
        planner: LanguageModel,
        tool_model: LanguageModel,
        settings: AgentSettings,
    ) -> Self {
        let caller = ToolCaller::new(tool_model, storage.clone()).with_context_budget(settings.context_char_budget);
        let policy: Arc<dyn Policy> = Arc::new(DefaultPolicy::new(settings.max_rethink_rounds));
        Self {
            engine: Engine {
                tools,
                policy,
                planner,
                caller,
                storage,
            },
            settings,
        }
    }

    /// Build a service from configuration and models made by
    /// [`Models::from_config`]. The tools should already hold
    /// `models.tools` for any writing they do.
    pub fn from_config(
        config: &AppConfig,
        models: Models,
        storage: Arc<dyn StorageBackend>,
        tools: Arc<ToolActor>,
    ) -> Self {
        Self::new(tools, storage, models.planner, models.tools, AgentSettings::from_config(&config.agent))
    }

    /// Swap the phase-selection policy.
    pub fn with_policy(mut self, policy: Arc<dyn Policy>) -> Self {
        self.engine.policy = policy;
        self
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn tools(&self) -> &Arc<ToolActor> {
        &self.engine.tools
    }

    /// Start a run in the background and return its chunk stream.
    /// Dropping the stream cancels the run.
    pub fn task_stream(&self, request: TaskRequest) -> TaskStream {
        let user_message_id = uuid::Uuid::new_v4().to_string();
        let (ctx, stream) = channel(self.settings.channel_capacity, user_message_id.clone());
        let span = info_span!("task", message_id = %ctx.message_id(), user_message_id = %user_message_id);
        info!(parent: &span, input_len = request.input.len(), session = ?request.session_id, "task accepted");

        let controller = AgentController::new(self.engine.clone(), ctx, request);
        tokio::spawn(
            async move {
                controller.execute().await;
            }
            .instrument(span),
        );
        stream
    }

    pub async fn add_provider(&self, provider: Arc<dyn ToolProvider>) -> Result<usize, ToolError> {
        self.engine.tools.add_provider(provider).await
    }

    pub fn remove_provider(&self, name: &str) -> usize {
        self.engine.tools.remove_provider(name)
    }

    pub fn enable_tool(&self, name: &str) -> bool {
        self.engine.tools.enable(name)
    }

    pub fn disable_tool(&self, name: &str) -> bool {
        self.engine.tools.disable(name)
    }

    /// The tool listing the planner sees.
    pub fn tool_descriptions(&self) -> String {
        self.engine.tools.list_descriptions()
    }

    pub async fn history(&self, session_id: &str) -> Result<Option<HistoryResponse>, StorageError> {
        session::load_history(self.engine.storage.as_ref(), session_id).await
    }

    pub async fn sessions(&self) -> Result<Vec<SessionSummary>, StorageError> {
        session::list_sessions(self.engine.storage.as_ref()).await
    }
}
