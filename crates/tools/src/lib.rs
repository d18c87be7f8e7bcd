//! Built-in tool implementations for stepwise.
//!
//! Tools give plan steps a way to act: evaluate arithmetic, fetch a URL,
//! search the web, or have the language model write text, either freely or
//! as a code or writing specialist. Tools exposed by an external
//! [`ToolProvider`](stepwise_core::ToolProvider) are wrapped by
//! [`provider_tools`].

pub mod calculator;
pub mod expert;
pub mod llm_generator;
pub mod provider;
pub mod web_fetch;
pub mod web_search;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use stepwise_core::provider::TextGenerator;
use stepwise_core::tool::Tool;

pub use calculator::CalculatorTool;
pub use expert::ExpertTool;
pub use llm_generator::LlmGeneratorTool;
pub use provider::{ProviderTool, provider_tools};
pub use web_fetch::WebFetchTool;
pub use web_search::{SearchBackend, WebSearchTool};

/// Built-in tool settings.
#[derive(Debug, Clone)]
pub struct ToolSettings {
    /// Timeout for `web_fetch` and `web_search` requests.
    pub http_timeout: Duration,
    pub search: SearchBackend,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(30),
            search: SearchBackend::default(),
        }
    }
}

/// The built-in tool set, in the order the planner sees it. The writing
/// tools share `generator`, normally the engine's tool model.
pub fn default_tools(generator: Arc<dyn TextGenerator>, settings: &ToolSettings) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(CalculatorTool),
        Arc::new(LlmGeneratorTool::new(generator.clone())),
        Arc::new(ExpertTool::code(generator.clone())),
        Arc::new(ExpertTool::writing(generator)),
        Arc::new(WebFetchTool::new(settings.http_timeout)),
        Arc::new(WebSearchTool::new(settings.search.clone(), settings.http_timeout)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Recording;

    #[test]
    fn default_tool_names() {
        let names: Vec<String> = default_tools(Recording::replying(""), &ToolSettings::default())
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["calculator", "llm_generator", "code_expert", "writing_expert", "web_fetch", "web_search"]
        );
    }

    #[test]
    fn writing_tools_ask_for_context() {
        let tools = default_tools(Recording::replying(""), &ToolSettings::default());
        let hungry: Vec<&str> = tools.iter().filter(|t| t.needs_context()).map(|t| t.name()).collect();
        assert_eq!(hungry, vec!["llm_generator", "code_expert", "writing_expert"]);
    }
}
