//! The dataset manager service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info};

use aiperf_common::comms::CommAddress;
use aiperf_common::config::UserConfig;
use aiperf_common::constants::INPUTS_JSON_FILE;
use aiperf_common::enums::ServiceType;
use aiperf_common::messages::{
    Command, CommandMessage, ConversationResponseMessage, DatasetTimingResponseMessage, Message,
};
use aiperf_common::models::{Conversation, TimingEntry};
use aiperf_common::service::{CommandOutcome, Service, ServiceContext, ServiceSpec};
use aiperf_common::{time_ns, AIPerfError, AIPerfResult};
use aiperf_workers::endpoints::EndpointRegistry;

use crate::composer::{load_corpus_file, SyntheticComposer};

/// The loaded conversation corpus.
struct Corpus {
    conversations: Vec<Conversation>,
    by_id: HashMap<String, usize>,
}

impl Corpus {
    fn new(conversations: Vec<Conversation>) -> Self {
        let by_id = conversations
            .iter()
            .enumerate()
            .map(|(i, c)| (c.session_id.clone(), i))
            .collect();
        Self {
            conversations,
            by_id,
        }
    }
}

/// Exclusively owns the conversation corpus. Serves conversation turns and
/// the fixed-schedule timing table over req/rep, and writes the formatted
/// request payloads to `inputs.json` once configured.
pub struct DatasetManager {
    config: RwLock<Arc<UserConfig>>,
    registry: EndpointRegistry,
    corpus: RwLock<Option<Arc<Corpus>>>,
    ready_tx: watch::Sender<bool>,
    next_index: AtomicUsize,
}

impl DatasetManager {
    pub fn new(config: Arc<UserConfig>) -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            config: RwLock::new(config),
            registry: EndpointRegistry::with_builtin_plugins(),
            corpus: RwLock::new(None),
            ready_tx,
            next_index: AtomicUsize::new(0),
        }
    }

    fn configure(&self, config: Arc<UserConfig>) -> AIPerfResult<()> {
        let conversations = match &config.input.file {
            Some(path) => load_corpus_file(path)?,
            None => {
                let mut composer = SyntheticComposer::new(config.input.random_seed);
                composer.compose(&config.input)
            }
        };
        info!(conversations = conversations.len(), "dataset corpus ready");

        self.write_inputs_json(&config, &conversations)?;

        *self.config.write() = config;
        *self.corpus.write() = Some(Arc::new(Corpus::new(conversations)));
        let _ = self.ready_tx.send(true);
        Ok(())
    }

    /// Persist the formatted request payloads for reproducibility.
    fn write_inputs_json(
        &self,
        config: &UserConfig,
        conversations: &[Conversation],
    ) -> AIPerfResult<()> {
        let plugin = self.registry.get(config.endpoint.endpoint_type)?;
        let mut data = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let payloads = conversation
                .turns
                .iter()
                .map(|turn| plugin.format_payload(&config.endpoint, turn))
                .collect::<AIPerfResult<Vec<_>>>()?;
            data.push(json!({
                "session_id": conversation.session_id,
                "payloads": payloads,
            }));
        }

        let artifact_dir = &config.output.artifact_directory;
        std::fs::create_dir_all(artifact_dir)?;
        let path = artifact_dir.join(INPUTS_JSON_FILE);
        std::fs::write(&path, serde_json::to_vec_pretty(&json!({ "data": data }))?)?;
        debug!(path = %path.display(), "wrote inputs.json");
        Ok(())
    }

    /// Block until the corpus is configured.
    async fn wait_ready(&self) {
        let mut rx = self.ready_tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    fn corpus(&self) -> AIPerfResult<Arc<Corpus>> {
        self.corpus
            .read()
            .clone()
            .ok_or_else(|| AIPerfError::NotInitialized("dataset corpus".to_string()))
    }

    fn pick_conversation(&self, conversation_id: Option<&str>) -> AIPerfResult<Conversation> {
        let corpus = self.corpus()?;
        match conversation_id {
            Some(id) => {
                let index = corpus.by_id.get(id).ok_or_else(|| {
                    AIPerfError::InvalidState(format!("unknown conversation id: {id}"))
                })?;
                Ok(corpus.conversations[*index].clone())
            }
            None => {
                let index =
                    self.next_index.fetch_add(1, Ordering::Relaxed) % corpus.conversations.len();
                Ok(corpus.conversations[index].clone())
            }
        }
    }

    /// The static timing table for fixed-schedule mode, sorted by offset.
    fn timing_schedule(&self) -> AIPerfResult<Vec<TimingEntry>> {
        let corpus = self.corpus()?;
        let config = self.config.read().clone();
        let mut entries: Vec<TimingEntry> = corpus
            .conversations
            .iter()
            .enumerate()
            .map(|(i, conversation)| TimingEntry {
                conversation_id: conversation.session_id.clone(),
                delay_ms: conversation
                    .turns
                    .first()
                    .and_then(|t| t.delay_ms)
                    .unwrap_or(i as u64 * config.input.schedule_delay_ms),
            })
            .collect();
        entries.sort_by_key(|e| e.delay_ms);
        Ok(entries)
    }
}

#[async_trait]
impl Service for DatasetManager {
    fn spec(&self) -> ServiceSpec {
        let mut spec = ServiceSpec::component(ServiceType::DatasetManager);
        spec.reply_bindings = vec![CommAddress::DatasetManagerProxyFrontend];
        spec
    }

    async fn on_command(
        &self,
        _ctx: &Arc<ServiceContext>,
        command: &CommandMessage,
    ) -> AIPerfResult<CommandOutcome> {
        match &command.command {
            Command::ProfileConfigure { config } => {
                self.configure(Arc::new((**config).clone()))?;
                Ok(CommandOutcome::Success(None))
            }
            Command::ProfileStart => Ok(CommandOutcome::Success(None)),
            Command::ProfileCancel => Ok(CommandOutcome::Acknowledged),
            _ => Ok(CommandOutcome::Unhandled),
        }
    }

    async fn on_request(
        &self,
        ctx: &Arc<ServiceContext>,
        message: Message,
    ) -> AIPerfResult<Message> {
        match message {
            Message::ConversationRequest(request) => {
                self.wait_ready().await;
                let conversation =
                    self.pick_conversation(request.conversation_id.as_deref())?;
                Ok(Message::ConversationResponse(ConversationResponseMessage {
                    service_id: ctx.service_id.clone(),
                    request_ns: time_ns(),
                    request_id: request.request_id,
                    conversation,
                }))
            }
            Message::DatasetTimingRequest(request) => {
                self.wait_ready().await;
                Ok(Message::DatasetTimingResponse(DatasetTimingResponseMessage {
                    service_id: ctx.service_id.clone(),
                    request_ns: time_ns(),
                    request_id: request.request_id,
                    timing_data: self.timing_schedule()?,
                }))
            }
            other => Err(AIPerfError::InvalidState(format!(
                "unexpected dataset request: {:?}",
                other.message_type()
            ))),
        }
    }
}
