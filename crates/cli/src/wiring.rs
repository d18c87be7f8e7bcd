//! Building the agent service from configuration.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use stepwise_agent::{AgentService, Models, ToolActor};
use stepwise_config::AppConfig;
use stepwise_core::storage::StorageBackend;
use stepwise_storage::LocalStorage;
use stepwise_tools::{SearchBackend, ToolSettings, default_tools};
use tracing::{info, warn};

pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => {
            let mut config = AppConfig::load_from(path)?;
            config.apply_env(|key| std::env::var(key).ok());
            config
        }
        None => AppConfig::load()?,
    };
    Ok(config)
}

pub fn storage(config: &AppConfig) -> Arc<dyn StorageBackend> {
    match config.storage.backend.as_str() {
        "memory" => Arc::new(LocalStorage::in_memory()),
        _ => Arc::new(LocalStorage::open(config.storage.resolved_path())),
    }
}

pub fn tool_settings(config: &AppConfig) -> ToolSettings {
    let search = SearchBackend::from_name(
        &config.tools.search_provider,
        config.tools.search_endpoint.as_deref(),
    )
    .unwrap_or_default();
    ToolSettings {
        http_timeout: Duration::from_secs(config.tools.web_fetch_timeout_secs),
        search,
    }
}

pub fn service(config: &AppConfig) -> AgentService {
    let provider = stepwise_providers::build_from_config(config);
    if !config.has_api_key() && config.provider != "ollama" {
        warn!(provider = %config.provider, "no api key configured");
    }
    let models = Models::from_config(config, provider);
    let tools = Arc::new(ToolActor::with_tools(default_tools(models.generator(), &tool_settings(config))));
    for name in &config.tools.disabled {
        if !tools.disable(name) {
            warn!(tool = %name, "cannot disable unknown tool");
        }
    }
    info!(
        provider = %config.provider,
        plan_model = %config.models.plan_model,
        tool_model = %config.models.tool_model,
        tools = tools.names().len(),
        "agent ready"
    );
    AgentService::from_config(config, models, storage(config), tools)
}
