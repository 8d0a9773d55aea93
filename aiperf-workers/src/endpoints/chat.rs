//! OpenAI-style chat completions.

use aiperf_common::config::EndpointConfig;
use aiperf_common::enums::EndpointType;
use aiperf_common::models::{ResponseContent, Turn};
use aiperf_common::AIPerfResult;
use serde_json::json;

use crate::endpoints::{usage_from_json, EndpointPlugin, ParsedChunk};

pub struct ChatPlugin;

impl EndpointPlugin for ChatPlugin {
    fn endpoint_type(&self) -> EndpointType {
        EndpointType::Chat
    }

    fn default_path(&self) -> &'static str {
        "/v1/chat/completions"
    }

    fn format_payload(
        &self,
        config: &EndpointConfig,
        turn: &Turn,
    ) -> AIPerfResult<serde_json::Value> {
        let role = turn.role.clone().unwrap_or_else(|| "user".to_string());
        let content = turn.texts.join("\n");
        let model = turn
            .model
            .clone()
            .unwrap_or_else(|| config.model_name.clone());

        let mut payload = json!({
            "model": model,
            "messages": [{"role": role, "content": content}],
            "stream": config.streaming,
        });
        if let Some(max_tokens) = turn.max_tokens.or(config.max_tokens) {
            payload["max_tokens"] = json!(max_tokens);
        }
        if config.streaming {
            payload["stream_options"] = json!({"include_usage": true});
        }
        Ok(payload)
    }

    fn parse_response(&self, raw: &str) -> ParsedChunk {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
            return ParsedChunk::default();
        };
        let choice = &value["choices"][0];
        // Streaming chunks carry a delta, unary responses a full message.
        let text = choice["delta"]["content"]
            .as_str()
            .or_else(|| choice["message"]["content"].as_str());
        let reasoning = choice["delta"]["reasoning_content"]
            .as_str()
            .or_else(|| choice["message"]["reasoning_content"].as_str());

        let content = match (text, reasoning) {
            (Some(text), _) if !text.is_empty() => Some(ResponseContent::Text {
                text: text.to_string(),
            }),
            (_, Some(reasoning)) if !reasoning.is_empty() => {
                Some(ResponseContent::ReasoningText {
                    text: reasoning.to_string(),
                })
            }
            _ => None,
        };

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
    fn test_streaming_payload_shape() {
        let mut config = EndpointConfig::default();
        config.model_name = "test-llm".to_string();
        config.max_tokens = Some(256);
        let payload = ChatPlugin
            .format_payload(&config, &Turn::text("hello"))
            .expect("payload");
        assert_eq!(payload["model"], "test-llm");
        assert_eq!(payload["messages"][0]["content"], "hello");
        assert_eq!(payload["stream"], true);
        assert_eq!(payload["max_tokens"], 256);
        assert_eq!(payload["stream_options"]["include_usage"], true);
    }

    #[test]
    fn test_turn_overrides_win() {
        let mut config = EndpointConfig::default();
        config.model_name = "base".to_string();
        let mut turn = Turn::text("hi");
        turn.model = Some("override".to_string());
        turn.max_tokens = Some(8);
        let payload = ChatPlugin.format_payload(&config, &turn).expect("payload");
        assert_eq!(payload["model"], "override");
        assert_eq!(payload["max_tokens"], 8);
    }

    #[test]
    fn test_parse_streaming_delta() {
        let chunk = ChatPlugin.parse_response(
            r#"{"choices":[{"delta":{"content":"tok"}}]}"#,
        );
        assert_eq!(
            chunk.content,
            Some(ResponseContent::Text {
                text: "tok".to_string()
            })
        );
    }

    #[test]
    fn test_parse_unary_message_with_usage() {
        let chunk = ChatPlugin.parse_response(
            r#"{"choices":[{"message":{"content":"full"}}],"usage":{"prompt_tokens":11,"completion_tokens":7}}"#,
        );
        assert_eq!(
            chunk.content,
            Some(ResponseContent::Text {
                text: "full".to_string()
            })
        );
        assert_eq!(chunk.usage.prompt_tokens, Some(11));
        assert_eq!(chunk.usage.completion_tokens, Some(7));
    }

    #[test]
    fn test_parse_garbage_is_empty_chunk() {
        let chunk = ChatPlugin.parse_response("not json");
        assert_eq!(chunk, ParsedChunk::default());
    }
}
