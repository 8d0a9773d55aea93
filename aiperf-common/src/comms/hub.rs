//! The in-process message hub and client factory.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::comms::address::CommAddress;
use crate::comms::clients::{
    PubClient, PullClient, PushClient, ReplyClient, RequestClient, RpcEnvelope, SubClient,
};
use crate::config::CommsConfig;
use crate::constants::EVENT_BUS_CAPACITY;
use crate::error::{AIPerfError, AIPerfResult};
use crate::messages::Message;

/// Channel fabric for one logical address.
enum AddressChannel {
    /// Fan-out to every subscriber (pub/sub).
    Broadcast(broadcast::Sender<Message>),
    /// Load-balanced MPMC queue (push/pull): competing pullers each receive
    /// a disjoint subset of messages.
    Queue(flume::Sender<Message>, flume::Receiver<Message>),
    /// Req/rep queue carrying a reply channel per request.
    Rpc(flume::Sender<RpcEnvelope>, flume::Receiver<RpcEnvelope>),
}

/// The process-wide broker. Addresses are bound by the proxy manager; all
/// clients connect through [`Comms`].
#[derive(Default)]
pub struct MessageBusHub {
    channels: DashMap<CommAddress, AddressChannel>,
}

impl MessageBusHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an address. Exactly one binder per address; a second bind is an
    /// error.
    pub fn bind(&self, address: CommAddress) -> AIPerfResult<()> {
        if self.channels.contains_key(&address) {
            return Err(AIPerfError::CommunicationCreate(format!(
                "address {address} is already bound"
            )));
        }
        let channel = match address {
            CommAddress::EventBus | CommAddress::Command | CommAddress::Response => {
                let (tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
                AddressChannel::Broadcast(tx)
            }
            CommAddress::DatasetManagerProxyFrontend => {
                let (tx, rx) = flume::unbounded();
                AddressChannel::Rpc(tx, rx)
            }
            _ => {
                let (tx, rx) = flume::unbounded();
                AddressChannel::Queue(tx, rx)
            }
        };
        self.channels.insert(address, channel);
        Ok(())
    }

    /// Tear down every bound address.
    pub fn unbind_all(&self) {
        self.channels.clear();
    }

    /// Whether any address is currently bound.
    pub fn is_up(&self) -> bool {
        !self.channels.is_empty()
    }

    fn broadcast_sender(&self, address: CommAddress) -> AIPerfResult<broadcast::Sender<Message>> {
        match self.channels.get(&address) {
            Some(entry) => match entry.value() {
                AddressChannel::Broadcast(tx) => Ok(tx.clone()),
                _ => Err(AIPerfError::CommunicationClientNotFound(format!(
                    "{address} is not a pub/sub address"
                ))),
            },
            None => Err(AIPerfError::CommunicationClientNotFound(address.to_string())),
        }
    }

    fn queue(
        &self,
        address: CommAddress,
    ) -> AIPerfResult<(flume::Sender<Message>, flume::Receiver<Message>)> {
        match self.channels.get(&address) {
            Some(entry) => match entry.value() {
                AddressChannel::Queue(tx, rx) => Ok((tx.clone(), rx.clone())),
                _ => Err(AIPerfError::CommunicationClientNotFound(format!(
                    "{address} is not a push/pull address"
                ))),
            },
            None => Err(AIPerfError::CommunicationClientNotFound(address.to_string())),
        }
    }

    fn rpc(
        &self,
        address: CommAddress,
    ) -> AIPerfResult<(flume::Sender<RpcEnvelope>, flume::Receiver<RpcEnvelope>)> {
        match self.channels.get(&address) {
            Some(entry) => match entry.value() {
                AddressChannel::Rpc(tx, rx) => Ok((tx.clone(), rx.clone())),
                _ => Err(AIPerfError::CommunicationClientNotFound(format!(
                    "{address} is not a req/rep address"
                ))),
            },
            None => Err(AIPerfError::CommunicationClientNotFound(address.to_string())),
        }
    }
}

/// A service's connection to the hub.
#[derive(Clone)]
pub struct Comms {
    hub: Arc<MessageBusHub>,
    config: CommsConfig,
}

impl Comms {
    pub fn new(hub: Arc<MessageBusHub>, config: CommsConfig) -> Self {
        Self { hub, config }
    }

    /// The endpoint table this fabric was configured with.
    pub fn config(&self) -> &CommsConfig {
        &self.config
    }

    /// Whether the fabric is up (proxies running).
    pub fn is_up(&self) -> bool {
        self.hub.is_up()
    }

    pub fn create_pub_client(&self, address: CommAddress) -> AIPerfResult<PubClient> {
        Ok(PubClient::new(address, self.hub.broadcast_sender(address)?))
    }

    pub fn create_sub_client(&self, address: CommAddress) -> AIPerfResult<SubClient> {
        let sender = self.hub.broadcast_sender(address)?;
        Ok(SubClient::new(address, sender.subscribe()))
    }

    pub fn create_push_client(&self, address: CommAddress) -> AIPerfResult<PushClient> {
        let (tx, _) = self.hub.queue(address)?;
        Ok(PushClient::new(address, tx))
    }

    pub fn create_pull_client(&self, address: CommAddress) -> AIPerfResult<PullClient> {
        let (_, rx) = self.hub.queue(address)?;
        Ok(PullClient::new(address, rx))
    }

    pub fn create_request_client(&self, address: CommAddress) -> AIPerfResult<RequestClient> {
        let (tx, _) = self.hub.rpc(address)?;
        Ok(RequestClient::new(address, tx))
    }

    pub fn create_reply_client(&self, address: CommAddress) -> AIPerfResult<ReplyClient> {
        let (_, rx) = self.hub.rpc(address)?;
        Ok(ReplyClient::new(address, rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{CreditsCompleteMessage, Message};

    fn hub_with_all_addresses() -> Arc<MessageBusHub> {
        let hub = Arc::new(MessageBusHub::new());
        for address in CommAddress::ALL {
            hub.bind(address).expect("bind address");
        }
        hub
    }

    fn test_message(id: &str) -> Message {
        Message::CreditsComplete(CreditsCompleteMessage {
            service_id: id.to_string(),
            request_ns: 1,
        })
    }

    #[test]
    fn test_double_bind_rejected() {
        let hub = MessageBusHub::new();
        hub.bind(CommAddress::EventBus).expect("first bind");
        assert!(hub.bind(CommAddress::EventBus).is_err());
    }

    #[test]
    fn test_client_for_unbound_address_rejected() {
        let hub = Arc::new(MessageBusHub::new());
        let comms = Comms::new(hub, CommsConfig::default());
        assert!(comms.create_pub_client(CommAddress::EventBus).is_err());
    }

    #[tokio::test]
    async fn test_pub_sub_delivery_order() {
        let comms = Comms::new(hub_with_all_addresses(), CommsConfig::default());
        let mut sub = comms
            .create_sub_client(CommAddress::EventBus)
            .expect("sub client");
        let publisher = comms
            .create_pub_client(CommAddress::EventBus)
            .expect("pub client");

        for i in 0..3 {
            publisher.publish(test_message(&format!("svc_{i}")));
        }
        for i in 0..3 {
            let msg = sub.recv().await.expect("message");
            assert_eq!(msg.service_id(), format!("svc_{i}"));
        }
    }

    #[tokio::test]
    async fn test_push_pull_load_balances() {
        let comms = Comms::new(hub_with_all_addresses(), CommsConfig::default());
        let push = comms
            .create_push_client(CommAddress::CreditDrop)
            .expect("push client");
        let pull_a = comms
            .create_pull_client(CommAddress::CreditDrop)
            .expect("pull client a");
        let pull_b = comms
            .create_pull_client(CommAddress::CreditDrop)
            .expect("pull client b");

        for i in 0..4 {
            push.push(test_message(&format!("m{i}"))).await.expect("push");
        }

        // Competing consumers split the queue without duplication.
        let mut seen = Vec::new();
        for _ in 0..2 {
            seen.push(pull_a.recv().await.expect("recv a"));
            seen.push(pull_b.recv().await.expect("recv b"));
        }
        let mut ids: Vec<String> = seen
            .iter()
            .map(|m| m.service_id().to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["m0", "m1", "m2", "m3"]);
    }
}
