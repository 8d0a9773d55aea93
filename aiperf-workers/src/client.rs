//! The inference HTTP client.

use async_trait::async_trait;
use futures::StreamExt;
use tracing::debug;

use aiperf_common::config::EndpointConfig;
use aiperf_common::models::{ErrorDetails, RequestRecord, ResponseData};
use aiperf_common::{perf_ns, time_ns, AIPerfError, AIPerfResult};

use crate::sse::{parse_sse_message, SSEMessageSplitter, SSE_DONE_SENTINEL};

/// Sends one formatted payload to an inference endpoint and produces a raw
/// request record. Implementations must stamp `timestamp_ns`,
/// `start_perf_ns`, `end_perf_ns`, and per-response `perf_ns` themselves so
/// that timing reflects the wire, not the caller.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn send_request(
        &self,
        config: &EndpointConfig,
        path: &str,
        payload: &serde_json::Value,
    ) -> AIPerfResult<RequestRecord>;
}

/// reqwest-backed client with SSE stream draining.
pub struct HttpInferenceClient {
    http: reqwest::Client,
}

impl HttpInferenceClient {
    pub fn new(config: &EndpointConfig) -> AIPerfResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AIPerfError::InferenceRequest(e.to_string()))?;
        Ok(Self { http })
    }

    async fn drain_sse_stream(
        response: reqwest::Response,
        record: &mut RequestRecord,
    ) -> AIPerfResult<()> {
        let mut splitter = SSEMessageSplitter::new();
        let mut stream = response.bytes_stream();
        'stream: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| AIPerfError::InferenceRequest(e.to_string()))?;
            for message in splitter.feed(&chunk) {
                let arrived_perf_ns = perf_ns();
                let fields = parse_sse_message(&message)?;
                for field in fields.into_iter().filter(|f| f.is_data()) {
                    if field.value == SSE_DONE_SENTINEL {
                        break 'stream;
                    }
                    record.responses.push(ResponseData {
                        perf_ns: arrived_perf_ns,
                        raw: field.value,
                    });
                }
            }
        }
        if let Some(tail) = splitter.finish() {
            let arrived_perf_ns = perf_ns();
            for field in parse_sse_message(&tail)?.into_iter().filter(|f| f.is_data()) {
                if field.value != SSE_DONE_SENTINEL {
                    record.responses.push(ResponseData {
                        perf_ns: arrived_perf_ns,
                        raw: field.value,
                    });
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn send_request(
        &self,
        config: &EndpointConfig,
        path: &str,
        payload: &serde_json::Value,
    ) -> AIPerfResult<RequestRecord> {
        let url = format!("{}{}", config.url.trim_end_matches('/'), path);

        let mut record = RequestRecord {
            timestamp_ns: time_ns(),
            start_perf_ns: perf_ns(),
            ..Default::default()
        };

        let response = self
            .http
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| AIPerfError::InferenceRequest(e.to_string()))?;

        let status = response.status();
        record.status = Some(status.as_u16());

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            record.end_perf_ns = perf_ns();
            record.error = Some(
                ErrorDetails::new(
                    "InferenceRequestError",
                    format!("server returned {status}: {body}"),
                )
                .with_code(status.as_u16()),
            );
            return Ok(record);
        }

        let is_event_stream = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("text/event-stream"))
            .unwrap_or(false);

        if is_event_stream {
            match Self::drain_sse_stream(response, &mut record).await {
                Ok(()) => {}
                Err(AIPerfError::SSEResponse { message, code }) => {
                    record.error = Some(
                        ErrorDetails::new("SSEResponseError", message).with_code(code),
                    );
                }
                Err(e) => return Err(e),
            }
        } else {
            let body = response
                .text()
                .await
                .map_err(|e| AIPerfError::InferenceRequest(e.to_string()))?;
            record.responses.push(ResponseData {
                perf_ns: perf_ns(),
                raw: body,
            });
        }

        record.end_perf_ns = perf_ns();
        debug!(
            url,
            responses = record.responses.len(),
            latency_ns = record.end_perf_ns - record.start_perf_ns,
            "inference request finished"
        );
        Ok(record)
    }
}
