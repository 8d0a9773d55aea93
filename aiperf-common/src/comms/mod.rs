//! The comms fabric: address-routed pub/sub, push/pull, and req/rep clients
//! over a brokered in-process hub.
//!
//! Exactly one process-wide hub exists per run. The [`ProxyManager`] stands
//! up every address before any service connects and tears them down last.
//! Clients are cheap handles; all of them are `Clone`.

mod address;
mod clients;
mod hub;
mod proxy;

pub use address::CommAddress;
pub use clients::{
    PubClient, PullClient, PushClient, ReplyClient, Responder, RequestClient, SubClient,
};
pub use hub::{Comms, MessageBusHub};
pub use proxy::ProxyManager;
