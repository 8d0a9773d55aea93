//! Legacy text completions.

use aiperf_common::config::EndpointConfig;
use aiperf_common::enums::EndpointType;
use aiperf_common::models::{ResponseContent, Turn};
use aiperf_common::AIPerfResult;
use serde_json::json;

use crate::endpoints::{usage_from_json, EndpointPlugin, ParsedChunk};

pub struct CompletionsPlugin;

impl EndpointPlugin for CompletionsPlugin {
    fn endpoint_type(&self) -> EndpointType {
        EndpointType::Completions
    }

    fn default_path(&self) -> &'static str {
        "/v1/completions"
    }

    fn format_payload(
        &self,
        config: &EndpointConfig,
        turn: &Turn,
    ) -> AIPerfResult<serde_json::Value> {
        let model = turn
            .model
            .clone()
            .unwrap_or_else(|| config.model_name.clone());
        let mut payload = json!({
            "model": model,
            "prompt": turn.texts.join("\n"),
            "stream": config.streaming,
        });
        if let Some(max_tokens) = turn.max_tokens.or(config.max_tokens) {
            payload["max_tokens"] = json!(max_tokens);
        }
        Ok(payload)
    }

    fn parse_response(&self, raw: &str) -> ParsedChunk {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
            return ParsedChunk::default();
        };
        let content = value["choices"][0]["text"]
            .as_str()
            .filter(|text| !text.is_empty())
            .map(|text| ResponseContent::Text {
                text: text.to_string(),
            });
        ParsedChunk {
            content,
            usage: usage_from_json(&value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_and_parse_round() {
        let mut config = EndpointConfig::default();
        config.model_name = "m".to_string();
        config.streaming = false;
        let payload = CompletionsPlugin
            .format_payload(&config, &Turn::text("prompt text"))
            .expect("payload");
        assert_eq!(payload["prompt"], "prompt text");
        assert_eq!(payload["stream"], false);

        let chunk =
            CompletionsPlugin.parse_response(r#"{"choices":[{"text":"out"}]}"#);
        assert_eq!(
            chunk.content,
            Some(ResponseContent::Text {
                text: "out".to_string()
            })
        );
    }
}
