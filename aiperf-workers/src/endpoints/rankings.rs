//! Rankings endpoints.

use aiperf_common::config::EndpointConfig;
use aiperf_common::enums::EndpointType;
use aiperf_common::models::{ResponseContent, Turn};
use aiperf_common::AIPerfResult;
use serde_json::json;

use crate::endpoints::{usage_from_json, EndpointPlugin, ParsedChunk};

pub struct RankingsPlugin;

impl EndpointPlugin for RankingsPlugin {
    fn endpoint_type(&self) -> EndpointType {
        EndpointType::Rankings
    }

    fn default_path(&self) -> &'static str {
        "/v1/ranking"
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
        // First text is the query, the rest are passages.
        let (query, passages) = turn
            .texts
            .split_first()
            .map(|(q, rest)| (q.clone(), rest.to_vec()))
            .unwrap_or_default();
        Ok(json!({
            "model": model,
            "query": {"text": query},
            "passages": passages
                .iter()
                .map(|p| json!({"text": p}))
                .collect::<Vec<_>>(),
        }))
    }

    fn parse_response(&self, raw: &str) -> ParsedChunk {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
            return ParsedChunk::default();
        };
        let content = value["rankings"].as_array().map(|rankings| {
            ResponseContent::Ranking {
                scores: rankings
                    .iter()
                    .filter_map(|r| r["logit"].as_f64().or_else(|| r["score"].as_f64()))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_and_passages_split() {
        let config = EndpointConfig {
            model_name: "ranker".to_string(),
            ..Default::default()
        };
        let turn = Turn {
            texts: vec!["query".to_string(), "p1".to_string(), "p2".to_string()],
            ..Default::default()
        };
        let payload = RankingsPlugin.format_payload(&config, &turn).expect("payload");
        assert_eq!(payload["query"]["text"], "query");
        assert_eq!(payload["passages"].as_array().expect("passages").len(), 2);
    }

    #[test]
    fn test_parse_ranking_scores() {
        let chunk = RankingsPlugin
            .parse_response(r#"{"rankings":[{"index":0,"logit":1.5},{"index":1,"logit":-0.5}]}"#);
        assert_eq!(
            chunk.content,
            Some(ResponseContent::Ranking {
                scores: vec![1.5, -0.5]
            })
        );
    }
}
