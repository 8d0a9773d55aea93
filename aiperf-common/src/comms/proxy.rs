//! Proxy bring-up and tear-down.

use std::sync::Arc;

use tracing::{debug, info};

use crate::comms::address::CommAddress;
use crate::comms::hub::MessageBusHub;
use crate::config::CommsConfig;
use crate::error::AIPerfResult;

/// Stands up the broker proxies for every logical address before any service
/// binds or connects, and tears them down last.
pub struct ProxyManager {
    hub: Arc<MessageBusHub>,
    config: CommsConfig,
    started: parking_lot::Mutex<bool>,
}

impl ProxyManager {
    pub fn new(hub: Arc<MessageBusHub>, config: CommsConfig) -> Self {
        Self {
            hub,
            config,
            started: parking_lot::Mutex::new(false),
        }
    }

    /// Bind every address. Idempotent per manager.
    pub fn initialize_and_start(&self) -> AIPerfResult<()> {
        let mut started = self.started.lock();
        if *started {
            return Ok(());
        }
        for address in CommAddress::ALL {
            self.hub.bind(address)?;
            debug!(
                address = %address,
                endpoint = %address.endpoint(&self.config),
                "proxy bound"
            );
        }
        *started = true;
        info!("comms proxies running");
        Ok(())
    }

    /// Tear down every address. Clients observe closed channels.
    pub fn stop(&self) {
        let mut started = self.started.lock();
        if !*started {
            return;
        }
        self.hub.unbind_all();
        *started = false;
        info!("comms proxies stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_is_idempotent() {
        let hub = Arc::new(MessageBusHub::new());
        let manager = ProxyManager::new(hub.clone(), CommsConfig::default());
        manager.initialize_and_start().expect("first start");
        manager.initialize_and_start().expect("second start");
        assert!(hub.is_up());
        manager.stop();
        assert!(!hub.is_up());
    }
}
