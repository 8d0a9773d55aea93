//! Embeddings endpoints.

use aiperf_common::config::EndpointConfig;
use aiperf_common::enums::EndpointType;
use aiperf_common::models::{ResponseContent, Turn};
use aiperf_common::AIPerfResult;
use serde_json::json;

use crate::endpoints::{usage_from_json, EndpointPlugin, ParsedChunk};

pub struct EmbeddingsPlugin;

impl EndpointPlugin for EmbeddingsPlugin {
    fn endpoint_type(&self) -> EndpointType {
        EndpointType::Embeddings
    }

    fn default_path(&self) -> &'static str {
        "/v1/embeddings"
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
        Ok(json!({
            "model": model,
            "input": turn.texts,
        }))
    }

    fn parse_response(&self, raw: &str) -> ParsedChunk {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
            return ParsedChunk::default();
        };
        let content = value["data"][0]["embedding"].as_array().map(|values| {
            ResponseContent::Embedding {
                values: values
                    .iter()
                    .filter_map(|v| v.as_f64())
                    .map(|v| v as f32)
                    .collect(),
            }
        });
        ParsedChunk {
            content,
            usage: usage_from_json(&value),
        }
    }
}
