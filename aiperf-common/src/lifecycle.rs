//! Lifecycle state tracking and child lifecycle cascade.

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::enums::LifecycleState;
use crate::error::{AIPerfError, AIPerfResult};

/// Thread-safe holder of a lifecycle state with transition validation.
pub struct StateCell {
    state: RwLock<LifecycleState>,
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LifecycleState::Created),
        }
    }

    /// The current state.
    pub fn current(&self) -> LifecycleState {
        *self.state.read()
    }

    /// Transition to `next`, returning the previous state.
    ///
    /// Illegal transitions (backwards, or out of a terminal state) fail.
    pub fn transition(&self, next: LifecycleState) -> AIPerfResult<LifecycleState> {
        let mut state = self.state.write();
        if !state.can_transition_to(next) {
            return Err(AIPerfError::InvalidState(format!(
                "illegal lifecycle transition {} -> {}",
                *state, next
            )));
        }
        let old = *state;
        *state = next;
        Ok(old)
    }

    /// Whether the state is Stopping, Stopped, or Failed.
    pub fn is_stopping_or_done(&self) -> bool {
        matches!(
            self.current(),
            LifecycleState::Stopping | LifecycleState::Stopped | LifecycleState::Failed
        )
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// A lifecycle-bearing child owned by a service.
///
/// `initialize` cascades children before the parent finishes starting, and
/// `stop` cascades after the parent's own stop hooks, in reverse attach
/// order.
#[async_trait]
pub trait ChildLifecycle: Send + Sync {
    /// Identifier used in lifecycle error reporting.
    fn lifecycle_id(&self) -> String;

    async fn initialize(&self) -> AIPerfResult<()> {
        Ok(())
    }

    async fn stop(&self) -> AIPerfResult<()> {
        Ok(())
    }
}

/// Ordered collection of attached child lifecycles.
#[derive(Default)]
pub struct ChildLifecycles {
    children: tokio::sync::Mutex<Vec<Box<dyn ChildLifecycle>>>,
}

impl ChildLifecycles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a child. Children initialize in attach order and stop in
    /// reverse order.
    pub async fn attach(&self, child: Box<dyn ChildLifecycle>) {
        self.children.lock().await.push(child);
    }

    /// Initialize every child in attach order, failing on the first error.
    pub async fn initialize_all(&self) -> AIPerfResult<()> {
        let children = self.children.lock().await;
        for child in children.iter() {
            child.initialize().await.map_err(|e| {
                AIPerfError::LifecycleOperation {
                    operation: "initialize child".to_string(),
                    lifecycle_id: child.lifecycle_id(),
                    reason: e.to_string(),
                }
            })?;
        }
        Ok(())
    }

    /// Stop every child in reverse attach order. Errors are collected, not
    /// short-circuited.
    pub async fn stop_all(&self) -> Vec<AIPerfError> {
        let children = self.children.lock().await;
        let mut errors = Vec::new();
        for child in children.iter().rev() {
            if let Err(e) = child.stop().await {
                errors.push(e);
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_state_cell_enforces_monotonicity() {
        let cell = StateCell::new();
        cell.transition(LifecycleState::Initializing)
            .expect("created -> initializing");
        cell.transition(LifecycleState::Initialized)
            .expect("initializing -> initialized");
        assert!(cell.transition(LifecycleState::Created).is_err());
        cell.transition(LifecycleState::Failed).expect("-> failed");
        assert!(cell.transition(LifecycleState::Stopped).is_err());
    }

    struct OrderedChild {
        id: usize,
        init_order: Arc<AtomicUsize>,
        stop_log: Arc<parking_lot::Mutex<Vec<usize>>>,
    }

    #[async_trait]
    impl ChildLifecycle for OrderedChild {
        fn lifecycle_id(&self) -> String {
            format!("child_{}", self.id)
        }

        async fn initialize(&self) -> AIPerfResult<()> {
            self.init_order.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) -> AIPerfResult<()> {
            self.stop_log.lock().push(self.id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_children_stop_in_reverse_order() {
        let children = ChildLifecycles::new();
        let init_order = Arc::new(AtomicUsize::new(0));
        let stop_log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for id in 0..3 {
            children
                .attach(Box::new(OrderedChild {
                    id,
                    init_order: init_order.clone(),
                    stop_log: stop_log.clone(),
                }))
                .await;
        }
        children.initialize_all().await.expect("init all");
        assert_eq!(init_order.load(Ordering::SeqCst), 3);
        let errors = children.stop_all().await;
        assert!(errors.is_empty());
        assert_eq!(*stop_log.lock(), vec![2, 1, 0]);
    }
}
