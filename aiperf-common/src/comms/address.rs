//! Logical comm addresses.

use serde::{Deserialize, Serialize};

use crate::config::CommsConfig;

/// A logical address on the comms fabric.
///
/// Each address resolves to a concrete endpoint through [`CommsConfig`];
/// the in-process hub routes purely by the logical value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommAddress {
    /// Pub/sub event bus carrying status, heartbeats, and progress.
    EventBus,
    /// Broadcast command bus.
    Command,
    /// Broadcast command-response bus.
    Response,
    /// Load-balanced credit drop queue (timing manager → workers).
    CreditDrop,
    /// Credit return queue (workers → timing manager).
    CreditReturn,
    /// Processed metric records queue (record processors → records manager).
    Records,
    /// Raw inference results queue (workers → record processors).
    InferenceResults,
    /// Req/rep front-end of the dataset manager.
    DatasetManagerProxyFrontend,
}

impl CommAddress {
    /// All addresses the proxy manager must stand up.
    pub const ALL: [CommAddress; 8] = [
        CommAddress::EventBus,
        CommAddress::Command,
        CommAddress::Response,
        CommAddress::CreditDrop,
        CommAddress::CreditReturn,
        CommAddress::Records,
        CommAddress::InferenceResults,
        CommAddress::DatasetManagerProxyFrontend,
    ];

    /// The configured endpoint for this address.
    pub fn endpoint(&self, config: &CommsConfig) -> String {
        let port = match self {
            CommAddress::EventBus => config.event_bus_pub_port,
            CommAddress::Command => config.event_bus_sub_port,
            CommAddress::Response => config.req_rep_port,
            CommAddress::CreditDrop => config.credit_drop_port,
            CommAddress::CreditReturn => config.credit_return_port,
            CommAddress::Records => config.records_port,
            CommAddress::InferenceResults => config.inference_push_pull_port,
            CommAddress::DatasetManagerProxyFrontend => config.conversation_data_port,
        };
        format!("tcp://{}:{}", config.host, port)
    }
}

impl std::fmt::Display for CommAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CommAddress::EventBus => "event_bus",
            CommAddress::Command => "command",
            CommAddress::Response => "response",
            CommAddress::CreditDrop => "credit_drop",
            CommAddress::CreditReturn => "credit_return",
            CommAddress::Records => "records",
            CommAddress::InferenceResults => "inference_results",
            CommAddress::DatasetManagerProxyFrontend => "dataset_manager_proxy_frontend",
        };
        f.write_str(name)
    }
}
