//! The record processor service: raw inference results in, metric records
//! out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::trace;

use aiperf_common::comms::{CommAddress, PushClient};
use aiperf_common::config::UserConfig;
use aiperf_common::enums::ServiceType;
use aiperf_common::messages::{
    Command, CommandMessage, InferenceResultsMessage, Message, MetricRecordsMessage,
};
use aiperf_common::models::{
    MetricRecordData, MetricRecordMetadata, ParsedResponse, ParsedResponseRecord, RequestRecord,
};
use aiperf_common::service::{
    CommandOutcome, PullBinding, Service, ServiceContext, ServiceSpec,
};
use aiperf_common::{time_ns, AIPerfError, AIPerfResult};
use aiperf_metrics::{MetricRegistry, RecordMetricPipeline};
use aiperf_workers::endpoints::{EndpointPlugin, EndpointRegistry, UsageCounts};

/// Stateless converter from raw request records to metric records.
pub struct RecordProcessor {
    config: RwLock<Arc<UserConfig>>,
    pipeline: RecordMetricPipeline,
    plugin: Arc<dyn EndpointPlugin>,
    push: RwLock<Option<PushClient>>,
    session_counter: AtomicU64,
}

impl RecordProcessor {
    pub fn new(config: Arc<UserConfig>) -> AIPerfResult<Self> {
        let registry = Arc::new(MetricRegistry::with_builtin_metrics()?);
        let endpoint_registry = EndpointRegistry::with_builtin_plugins();
        let plugin = endpoint_registry.get(config.endpoint.endpoint_type)?;
        Ok(Self {
            config: RwLock::new(config),
            pipeline: RecordMetricPipeline::new(registry),
            plugin,
            push: RwLock::new(None),
            session_counter: AtomicU64::new(0),
        })
    }

    /// Parse raw responses into content, token counts, and usage reporting.
    pub fn parse_record(&self, mut record: RequestRecord) -> ParsedResponseRecord {
        record.create_error_from_invalid();
        if record.error.is_some() {
            return ParsedResponseRecord {
                record,
                ..Default::default()
            };
        }

        let mut responses = Vec::with_capacity(record.responses.len());
        let mut usage = UsageCounts::default();
        let mut text_chunks = 0u64;
        for response in &record.responses {
            let chunk = self.plugin.parse_response(&response.raw);
            if chunk.usage.prompt_tokens.is_some() || chunk.usage.completion_tokens.is_some() {
                usage = chunk.usage;
            }
            if let Some(content) = chunk.content {
                text_chunks += 1;
                responses.push(ParsedResponse {
                    perf_ns: response.perf_ns,
                    data: content,
                });
            }
        }

        let input_token_count = record.input_token_count.unwrap_or(0);
        // Prefer server-reported counts; fall back to one token per
        // streamed content chunk.
        let output_token_count = usage.completion_tokens.unwrap_or(text_chunks);

        ParsedResponseRecord {
            record,
            responses,
            input_token_count,
            output_token_count,
            reasoning_token_count: usage.reasoning_tokens,
            api_prompt_token_count: usage.prompt_tokens,
            api_completion_token_count: usage.completion_tokens,
        }
    }

    /// Build the metric record for one raw result.
    pub fn process(
        &self,
        worker_id: &str,
        record_processor_id: &str,
        record: RequestRecord,
    ) -> AIPerfResult<MetricRecordData> {
        let parsed = self.parse_record(record);
        let record = &parsed.record;

        let latency_ns = (record.end_perf_ns - record.start_perf_ns).max(0) as u64;
        let ack_ns = record
            .responses
            .first()
            .map(|r| (r.perf_ns - record.start_perf_ns).max(0) as u64)
            .map(|offset| record.timestamp_ns + offset);

        let metadata = MetricRecordMetadata {
            session_num: self.session_counter.fetch_add(1, Ordering::Relaxed),
            conversation_id: record.conversation_id.clone(),
            turn_index: record.turn_index,
            request_start_ns: record.timestamp_ns,
            request_ack_ns: ack_ns,
            request_end_ns: record.timestamp_ns + latency_ns,
            worker_id: worker_id.to_string(),
            record_processor_id: record_processor_id.to_string(),
            benchmark_phase: record.credit_phase.unwrap_or_default(),
            x_request_id: None,
            x_correlation_id: None,
        };

        if let Some(error) = &record.error {
            return Ok(MetricRecordData {
                metadata,
                metrics: Default::default(),
                error: Some(error.clone()),
            });
        }

        let metrics = self.pipeline.evaluate(&parsed)?;
        Ok(MetricRecordData {
            metadata,
            metrics,
            error: None,
        })
    }

    fn push_client(&self) -> AIPerfResult<PushClient> {
        self.push
            .read()
            .clone()
            .ok_or_else(|| AIPerfError::NotInitialized("records push client".to_string()))
    }
}

#[async_trait]
impl Service for RecordProcessor {
    fn spec(&self) -> ServiceSpec {
        let mut spec = ServiceSpec::component(ServiceType::RecordProcessor);
        spec.pull_bindings = vec![PullBinding::new(CommAddress::InferenceResults)];
        spec
    }

    async fn on_init(&self, ctx: &Arc<ServiceContext>) -> AIPerfResult<()> {
        *self.push.write() = Some(ctx.comms().create_push_client(CommAddress::Records)?);
        Ok(())
    }

    async fn on_command(
        &self,
        _ctx: &Arc<ServiceContext>,
        command: &CommandMessage,
    ) -> AIPerfResult<CommandOutcome> {
        match &command.command {
            Command::ProfileConfigure { config } => {
                *self.config.write() = Arc::new((**config).clone());
                Ok(CommandOutcome::Success(None))
            }
            Command::ProfileStart => Ok(CommandOutcome::Success(None)),
            Command::ProfileCancel => Ok(CommandOutcome::Acknowledged),
            _ => Ok(CommandOutcome::Unhandled),
        }
    }

    async fn on_pull_message(
        &self,
        ctx: &Arc<ServiceContext>,
        _address: CommAddress,
        message: Message,
    ) -> AIPerfResult<()> {
        let Message::InferenceResults(InferenceResultsMessage {
            service_id: worker_id,
            record,
            ..
        }) = message
        else {
            return Ok(());
        };
        trace!(worker_id, "processing inference result");
        let data = self.process(&worker_id, &ctx.service_id, record)?;
        self.push_client()?
            .push(Message::MetricRecords(MetricRecordsMessage {
                service_id: ctx.service_id.clone(),
                request_ns: time_ns(),
                data,
            }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aiperf_common::enums::CreditPhase;
    use aiperf_common::models::ResponseData;
    use aiperf_metrics::builtin::tags;

    fn processor() -> RecordProcessor {
        let mut config = UserConfig::default();
        config.endpoint.model_name = "m".to_string();
        RecordProcessor::new(Arc::new(config)).expect("processor")
    }

    fn chat_chunk(text: &str) -> String {
        format!(r#"{{"choices":[{{"delta":{{"content":"{text}"}}}}]}}"#)
    }

    fn valid_record() -> RequestRecord {
        RequestRecord {
            conversation_id: Some("s1".to_string()),
            timestamp_ns: 1_000,
            start_perf_ns: 1_000_000,
            end_perf_ns: 3_000_000,
            responses: vec![
                ResponseData {
                    perf_ns: 2_000_000,
                    raw: chat_chunk("a"),
                },
                ResponseData {
                    perf_ns: 3_000_000,
                    raw: chat_chunk("b"),
                },
            ],
            credit_phase: Some(CreditPhase::Profiling),
            input_token_count: Some(12),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_record_produces_metrics() {
        let data = processor()
            .process("worker_1", "rp_1", valid_record())
            .expect("process");
        assert!(data.valid());
        assert_eq!(data.metadata.worker_id, "worker_1");
        assert_eq!(data.metadata.benchmark_phase, CreditPhase::Profiling);
        assert!(data.metrics.contains_key(tags::REQUEST_LATENCY));
        // Two content chunks and no usage block: chunk-count fallback.
        assert_eq!(
            data.metrics[tags::OUTPUT_TOKEN_COUNT]
                .as_scalar()
                .expect("scalar"),
            2.0
        );
    }

    #[test]
    fn test_invalid_record_downgraded_to_error() {
        let mut record = valid_record();
        record.start_perf_ns = -1;
        let data = processor()
            .process("worker_1", "rp_1", record)
            .expect("process");
        assert!(!data.valid());
        let error = data.error.expect("error details");
        assert_eq!(error.error_type, "InvalidInferenceResultError");
        assert!(data.metrics.is_empty());
    }

    #[test]
    fn test_usage_block_wins_over_chunk_count() {
        let mut record = valid_record();
        record.responses.push(ResponseData {
            perf_ns: 3_000_000,
            raw: r#"{"choices":[{"delta":{}}],"usage":{"prompt_tokens":10,"completion_tokens":42}}"#
                .to_string(),
        });
        let data = processor()
            .process("worker_1", "rp_1", record)
            .expect("process");
        assert_eq!(
            data.metrics[tags::OUTPUT_TOKEN_COUNT]
                .as_scalar()
                .expect("scalar"),
            42.0
        );
        // Client count 12 vs API 10.
        assert!(data.metrics.contains_key(tags::USAGE_PROMPT_TOKENS_DIFF));
    }

    #[test]
    fn test_session_numbers_increment() {
        let processor = processor();
        let a = processor
            .process("w", "rp", valid_record())
            .expect("process");
        let b = processor
            .process("w", "rp", valid_record())
            .expect("process");
        assert_eq!(a.metadata.session_num + 1, b.metadata.session_num);
    }
}
