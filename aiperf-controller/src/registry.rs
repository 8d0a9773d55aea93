//! Registry of known services and their observed states.

use dashmap::DashMap;

use aiperf_common::enums::{
    LifecycleState, ServiceRegistrationStatus, ServiceType,
};
use aiperf_common::models::ServiceRunInfo;
use aiperf_common::time_ns;

/// What the controller knows about every service in the system.
#[derive(Default)]
pub struct ServiceRegistry {
    services: DashMap<String, ServiceRunInfo>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service, or refresh it when re-registering (stable command
    /// ids make duplicate registrations idempotent).
    pub fn register(
        &self,
        service_id: &str,
        service_type: ServiceType,
        state: LifecycleState,
    ) {
        let now = time_ns();
        self.services
            .entry(service_id.to_string())
            .and_modify(|info| {
                info.last_seen = now;
                info.state = state;
                info.registration_status = ServiceRegistrationStatus::Registered;
            })
            .or_insert_with(|| ServiceRunInfo {
                service_type,
                service_id: service_id.to_string(),
                registration_status: ServiceRegistrationStatus::Registered,
                first_seen: now,
                last_seen: now,
                state,
            });
    }

    /// Record a heartbeat or status update for a known service.
    pub fn observe(&self, service_id: &str, state: LifecycleState) -> bool {
        match self.services.get_mut(service_id) {
            Some(mut info) => {
                info.last_seen = time_ns();
                info.state = state;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, service_id: &str) {
        self.services.remove(service_id);
    }

    /// Number of registered services of the given type.
    pub fn registered_count(&self, service_type: ServiceType) -> usize {
        self.services
            .iter()
            .filter(|entry| {
                entry.service_type == service_type
                    && entry.registration_status == ServiceRegistrationStatus::Registered
            })
            .count()
    }

    /// Ids of every registered service.
    pub fn registered_ids(&self) -> Vec<String> {
        self.services
            .iter()
            .filter(|entry| entry.registration_status == ServiceRegistrationStatus::Registered)
            .map(|entry| entry.service_id.clone())
            .collect()
    }

    pub fn get(&self, service_id: &str) -> Option<ServiceRunInfo> {
        self.services.get(service_id).map(|info| info.clone())
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
