//! The pluggable endpoint registry.
//!
//! Each [`EndpointPlugin`] knows how to format a request payload for one
//! wire-format family and how to extract content and usage counts from its
//! responses. The registry is process-local and populated at startup.

mod chat;
mod completions;
mod embeddings;
mod rankings;

pub use chat::ChatPlugin;
pub use completions::CompletionsPlugin;
pub use embeddings::EmbeddingsPlugin;
pub use rankings::RankingsPlugin;

use std::collections::HashMap;
use std::sync::Arc;

use aiperf_common::config::EndpointConfig;
use aiperf_common::enums::EndpointType;
use aiperf_common::models::{ResponseContent, Turn};
use aiperf_common::{AIPerfError, AIPerfResult};

/// Token counts extracted from an API usage block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageCounts {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub reasoning_tokens: Option<u64>,
}

/// Content and usage extracted from one raw response or SSE event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedChunk {
    pub content: Option<ResponseContent>,
    pub usage: UsageCounts,
}

/// One endpoint wire-format family.
pub trait EndpointPlugin: Send + Sync {
    fn endpoint_type(&self) -> EndpointType;

    /// Request path appended to the endpoint base URL.
    fn default_path(&self) -> &'static str;

    /// Build the request body for one turn.
    fn format_payload(
        &self,
        config: &EndpointConfig,
        turn: &Turn,
    ) -> AIPerfResult<serde_json::Value>;

    /// Extract content and usage from one raw response or SSE data value.
    /// Unrecognized bodies yield an empty chunk, never an error.
    fn parse_response(&self, raw: &str) -> ParsedChunk;
}

/// Process-local plugin registry keyed by endpoint type.
pub struct EndpointRegistry {
    plugins: HashMap<EndpointType, Arc<dyn EndpointPlugin>>,
}

impl EndpointRegistry {
    /// Registry with every builtin plugin.
    pub fn with_builtin_plugins() -> Self {
        let mut registry = Self {
            plugins: HashMap::new(),
        };
        registry.register(Arc::new(ChatPlugin));
        registry.register(Arc::new(CompletionsPlugin));
        registry.register(Arc::new(EmbeddingsPlugin));
        registry.register(Arc::new(RankingsPlugin));
        registry
    }

    pub fn register(&mut self, plugin: Arc<dyn EndpointPlugin>) {
        self.plugins.insert(plugin.endpoint_type(), plugin);
    }

    pub fn get(&self, endpoint_type: EndpointType) -> AIPerfResult<Arc<dyn EndpointPlugin>> {
        self.plugins.get(&endpoint_type).cloned().ok_or_else(|| {
            AIPerfError::FactoryCreation(format!(
                "no endpoint plugin registered for {endpoint_type:?}"
            ))
        })
    }
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::with_builtin_plugins()
    }
}

/// Resolve the request path for a configured endpoint.
pub fn request_path(config: &EndpointConfig, plugin: &dyn EndpointPlugin) -> String {
    config
        .custom_path
        .clone()
        .unwrap_or_else(|| plugin.default_path().to_string())
}

pub(crate) fn usage_from_json(value: &serde_json::Value) -> UsageCounts {
    let usage = &value["usage"];
    UsageCounts {
        prompt_tokens: usage["prompt_tokens"].as_u64(),
        completion_tokens: usage["completion_tokens"].as_u64(),
        reasoning_tokens: usage["completion_tokens_details"]["reasoning_tokens"].as_u64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_resolves_builtin_plugins() {
        let registry = EndpointRegistry::with_builtin_plugins();
        for endpoint_type in [
            EndpointType::Chat,
            EndpointType::Completions,
            EndpointType::Embeddings,
            EndpointType::Rankings,
        ] {
            let plugin = registry.get(endpoint_type).expect("plugin");
            assert_eq!(plugin.endpoint_type(), endpoint_type);
        }
    }

    #[test]
    fn test_custom_path_overrides_default() {
        let registry = EndpointRegistry::with_builtin_plugins();
        let plugin = registry.get(EndpointType::Chat).expect("plugin");
        let mut config = EndpointConfig::default();
        assert_eq!(request_path(&config, plugin.as_ref()), "/v1/chat/completions");
        config.custom_path = Some("/custom/api".to_string());
        assert_eq!(request_path(&config, plugin.as_ref()), "/custom/api");
    }
}
