//! Client abstractions over the hub's channel fabric.

use std::time::Duration;

use tokio::sync::{broadcast, oneshot};
use tracing::{debug, warn};

use crate::comms::address::CommAddress;
use crate::constants::DEFAULT_COMMS_REQUEST_TIMEOUT;
use crate::error::{AIPerfError, AIPerfResult};
use crate::messages::Message;

/// One in-flight req/rep exchange.
pub struct RpcEnvelope {
    pub message: Message,
    pub reply_tx: oneshot::Sender<Message>,
}

/// Publishing half of a pub/sub address.
#[derive(Clone)]
pub struct PubClient {
    address: CommAddress,
    sender: broadcast::Sender<Message>,
}

impl PubClient {
    pub(crate) fn new(address: CommAddress, sender: broadcast::Sender<Message>) -> Self {
        Self { address, sender }
    }

    /// Publish a message. A send with no subscribers is not a failure.
    pub fn publish(&self, message: Message) {
        if self.sender.send(message).is_err() {
            debug!(address = %self.address, "published message with no subscribers");
        }
    }
}

/// Subscribing half of a pub/sub address.
pub struct SubClient {
    address: CommAddress,
    receiver: broadcast::Receiver<Message>,
}

impl SubClient {
    pub(crate) fn new(address: CommAddress, receiver: broadcast::Receiver<Message>) -> Self {
        Self { address, receiver }
    }

    /// Receive the next message in broker order. Returns `None` when the
    /// address has been torn down. Lagged messages are dropped with a
    /// warning.
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            match self.receiver.recv().await {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        address = %self.address,
                        skipped, "subscriber lagged; messages dropped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Producing half of a push/pull queue.
#[derive(Clone)]
pub struct PushClient {
    address: CommAddress,
    sender: flume::Sender<Message>,
}

impl PushClient {
    pub(crate) fn new(address: CommAddress, sender: flume::Sender<Message>) -> Self {
        Self { address, sender }
    }

    pub async fn push(&self, message: Message) -> AIPerfResult<()> {
        self.sender.send_async(message).await.map_err(|_| {
            AIPerfError::CommunicationClientNotFound(format!(
                "push address {} is closed",
                self.address
            ))
        })
    }
}

/// Consuming half of a push/pull queue. Clones compete for messages.
#[derive(Clone)]
pub struct PullClient {
    #[allow(dead_code)]
    address: CommAddress,
    receiver: flume::Receiver<Message>,
}

impl PullClient {
    pub(crate) fn new(address: CommAddress, receiver: flume::Receiver<Message>) -> Self {
        Self { address, receiver }
    }

    /// Receive the next queued message; `None` when the queue is torn down.
    pub async fn recv(&self) -> Option<Message> {
        self.receiver.recv_async().await.ok()
    }
}

/// Requesting half of a req/rep address.
#[derive(Clone)]
pub struct RequestClient {
    address: CommAddress,
    sender: flume::Sender<RpcEnvelope>,
}

impl RequestClient {
    pub(crate) fn new(address: CommAddress, sender: flume::Sender<RpcEnvelope>) -> Self {
        Self { address, sender }
    }

    /// Send a request and wait for the reply, with the default timeout.
    pub async fn request(&self, message: Message) -> AIPerfResult<Message> {
        self.request_with_timeout(message, DEFAULT_COMMS_REQUEST_TIMEOUT)
            .await
    }

    /// Send a request and wait for the reply. A timeout surfaces as a typed
    /// error, not a broken connection.
    pub async fn request_with_timeout(
        &self,
        message: Message,
        timeout: Duration,
    ) -> AIPerfResult<Message> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send_async(RpcEnvelope { message, reply_tx })
            .await
            .map_err(|_| {
                AIPerfError::CommunicationClientNotFound(format!(
                    "request address {} is closed",
                    self.address
                ))
            })?;
        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(AIPerfError::CommunicationClientNotFound(format!(
                "replier for {} went away",
                self.address
            ))),
            Err(_) => Err(AIPerfError::Timeout(timeout)),
        }
    }
}

/// Reply half of one received request.
pub struct Responder {
    reply_tx: oneshot::Sender<Message>,
}

impl Responder {
    /// Send the reply. Failure means the requester gave up (e.g. timed out).
    pub fn send(self, message: Message) {
        if self.reply_tx.send(message).is_err() {
            debug!("requester dropped before reply was sent");
        }
    }
}

/// Replying half of a req/rep address.
#[derive(Clone)]
pub struct ReplyClient {
    #[allow(dead_code)]
    address: CommAddress,
    receiver: flume::Receiver<RpcEnvelope>,
}

impl ReplyClient {
    pub(crate) fn new(address: CommAddress, receiver: flume::Receiver<RpcEnvelope>) -> Self {
        Self { address, receiver }
    }

    /// Receive the next request; `None` when the address is torn down.
    pub async fn recv(&self) -> Option<(Message, Responder)> {
        let envelope = self.receiver.recv_async().await.ok()?;
        Some((
            envelope.message,
            Responder {
                reply_tx: envelope.reply_tx,
            },
        ))
    }
}
