//! Credit phase orchestration shared by every issuing strategy.
//!
//! Phase flow: `Idle -> Warmup (optional) -> Profiling -> Complete`.
//! The orchestrator owns the per-phase counters, publishes the phase
//! lifecycle messages, and latches completion so it fires exactly once.

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info};

use aiperf_common::comms::PushClient;
use aiperf_common::enums::CreditPhase;
use aiperf_common::messages::{
    CreditDropMessage, CreditPhaseCompleteMessage, CreditPhaseProgressMessage,
    CreditPhaseSendingCompleteMessage, CreditPhaseStartMessage, CreditReturnMessage, Message,
};
use aiperf_common::service::ServiceContext;
use aiperf_common::{time_ns, AIPerfResult};
use std::sync::Arc;

/// Counters and flags for the active phase.
#[derive(Debug, Clone)]
struct ActivePhase {
    phase: CreditPhase,
    sent: u64,
    completed: u64,
    start_ns: u64,
    sending_complete: bool,
    complete_published: bool,
    timeout_triggered: bool,
    expected_duration_sec: Option<f64>,
}

/// A point-in-time view of the active phase.
#[derive(Debug, Clone, Copy)]
pub struct PhaseSnapshot {
    pub phase: CreditPhase,
    pub sent: u64,
    pub completed: u64,
}

/// Shared credit phase state machine.
pub struct PhaseOrchestrator {
    ctx: Arc<ServiceContext>,
    drop_client: PushClient,
    /// Cancellation budget applied to every dropped credit.
    cancel_after_ns: Option<u64>,
    state: Mutex<Option<ActivePhase>>,
    completed_tx: watch::Sender<u64>,
    done_tx: watch::Sender<bool>,
    cancel_tx: watch::Sender<bool>,
}

impl PhaseOrchestrator {
    pub fn new(
        ctx: Arc<ServiceContext>,
        drop_client: PushClient,
        cancel_after_ns: Option<u64>,
    ) -> Self {
        let (completed_tx, _) = watch::channel(0);
        let (done_tx, _) = watch::channel(false);
        let (cancel_tx, _) = watch::channel(false);
        Self {
            ctx,
            drop_client,
            cancel_after_ns,
            state: Mutex::new(None),
            completed_tx,
            done_tx,
            cancel_tx,
        }
    }

    /// Enter a new phase and announce it.
    pub fn begin(
        &self,
        phase: CreditPhase,
        total_expected_requests: Option<u64>,
        expected_duration_sec: Option<f64>,
    ) {
        let start_ns = time_ns();
        *self.state.lock() = Some(ActivePhase {
            phase,
            sent: 0,
            completed: 0,
            start_ns,
            sending_complete: false,
            complete_published: false,
            timeout_triggered: false,
            expected_duration_sec,
        });
        let _ = self.completed_tx.send(0);
        let _ = self.done_tx.send(false);
        info!(%phase, ?total_expected_requests, ?expected_duration_sec, "credit phase starting");
        self.ctx
            .publish(Message::CreditPhaseStart(CreditPhaseStartMessage {
                service_id: self.ctx.service_id.clone(),
                request_ns: time_ns(),
                phase,
                start_ns,
                total_expected_requests,
                expected_duration_sec,
            }));
    }

    /// Drop one credit into the worker queue.
    pub async fn drop_credit(
        &self,
        conversation_id: Option<String>,
        credit_drop_ns: Option<u64>,
    ) -> AIPerfResult<()> {
        let phase = {
            let mut state = self.state.lock();
            let active = state.as_mut().ok_or_else(|| {
                aiperf_common::AIPerfError::InvalidState(
                    "credit dropped outside an active phase".to_string(),
                )
            })?;
            active.sent += 1;
            active.phase
        };
        self.drop_client
            .push(Message::CreditDrop(CreditDropMessage {
                service_id: self.ctx.service_id.clone(),
                request_ns: time_ns(),
                phase,
                conversation_id,
                credit_drop_ns,
                should_cancel: self.cancel_after_ns.is_some(),
                cancel_after_ns: self.cancel_after_ns,
            }))
            .await
    }

    /// Record one credit return for the active phase.
    pub fn note_return(&self, message: &CreditReturnMessage) {
        let mut completed_now = None;
        {
            let mut state = self.state.lock();
            if let Some(active) = state.as_mut() {
                if active.phase == message.phase {
                    active.completed += 1;
                    completed_now = Some(active.completed);
                }
            }
        }
        if let Some(completed) = completed_now {
            let _ = self.completed_tx.send(completed);
            self.maybe_complete();
        }
    }

    /// The sender has issued its last credit for this phase.
    pub fn finish_sending(&self) {
        let announce = {
            let mut state = self.state.lock();
            match state.as_mut() {
                Some(active) if !active.sending_complete => {
                    active.sending_complete = true;
                    Some((active.phase, active.sent))
                }
                _ => None,
            }
        };
        if let Some((phase, sent)) = announce {
            debug!(%phase, sent, "credit phase sending complete");
            self.ctx.publish(Message::CreditPhaseSendingComplete(
                CreditPhaseSendingCompleteMessage {
                    service_id: self.ctx.service_id.clone(),
                    request_ns: time_ns(),
                    phase,
                    sent,
                    sent_end_ns: time_ns(),
                },
            ));
        }
        self.maybe_complete();
    }

    /// Publish phase completion once all issued credits have returned.
    fn maybe_complete(&self) {
        let publish = {
            let mut state = self.state.lock();
            match state.as_mut() {
                Some(active)
                    if active.sending_complete
                        && active.completed >= active.sent
                        && !active.complete_published =>
                {
                    active.complete_published = true;
                    Some((active.phase, active.sent, false))
                }
                _ => None,
            }
        };
        if let Some((phase, final_count, timeout)) = publish {
            self.publish_complete(phase, final_count, timeout, false);
        }
    }

    /// Duration expiry: close the phase counting outstanding credits as
    /// timed out.
    pub fn timeout_complete(&self) {
        let publish = {
            let mut state = self.state.lock();
            match state.as_mut() {
                Some(active) if !active.complete_published => {
                    active.complete_published = true;
                    active.timeout_triggered = true;
                    active.sending_complete = true;
                    Some((active.phase, active.sent))
                }
                _ => None,
            }
        };
        if let Some((phase, final_count)) = publish {
            self.publish_complete(phase, final_count, true, false);
        }
    }

    /// Cancel the run: close the active phase immediately.
    pub fn cancel(&self) {
        let publish = {
            let mut state = self.state.lock();
            match state.as_mut() {
                Some(active) if !active.complete_published => {
                    active.complete_published = true;
                    Some((active.phase, active.sent))
                }
                _ => None,
            }
        };
        let _ = self.cancel_tx.send(true);
        if let Some((phase, final_count)) = publish {
            self.publish_complete(phase, final_count, false, true);
        } else {
            let _ = self.done_tx.send(true);
        }
    }

    fn publish_complete(
        &self,
        phase: CreditPhase,
        final_request_count: u64,
        timeout_triggered: bool,
        cancelled: bool,
    ) {
        info!(
            %phase,
            final_request_count, timeout_triggered, cancelled, "credit phase complete"
        );
        self.ctx
            .publish(Message::CreditPhaseComplete(CreditPhaseCompleteMessage {
                service_id: self.ctx.service_id.clone(),
                request_ns: time_ns(),
                phase,
                end_ns: time_ns(),
                final_request_count,
                timeout_triggered,
                cancelled,
            }));
        let _ = self.done_tx.send(true);
    }

    /// Publish periodic progress for the active phase.
    pub fn publish_progress(&self) {
        if let Some(snapshot) = self.snapshot() {
            self.ctx
                .publish(Message::CreditPhaseProgress(CreditPhaseProgressMessage {
                    service_id: self.ctx.service_id.clone(),
                    request_ns: time_ns(),
                    phase: snapshot.phase,
                    sent: snapshot.sent,
                    completed: snapshot.completed,
                }));
        }
    }

    pub fn snapshot(&self) -> Option<PhaseSnapshot> {
        self.state.lock().as_ref().map(|active| PhaseSnapshot {
            phase: active.phase,
            sent: active.sent,
            completed: active.completed,
        })
    }

    pub fn expected_duration_sec(&self) -> Option<f64> {
        self.state.lock().as_ref().and_then(|a| a.expected_duration_sec)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// Watch of the completed-credit counter for the active phase.
    pub fn subscribe_completed(&self) -> watch::Receiver<u64> {
        self.completed_tx.subscribe()
    }

    pub fn subscribe_cancel(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }

    /// Resolve when the active phase has fully completed (or was cancelled).
    pub async fn wait_done(&self) {
        let mut rx = self.done_tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
