//! Backend command worker - processes HTTP commands off the hot path
//!
//! This worker decouples backend REST calls from the controller loop so
//! network I/O never blocks event processing. The controller enqueues
//! commands via an mpsc channel; results that the controller cares about
//! (purchase outcomes, door snapshots) are re-injected into the main event
//! channel.

use crate::domain::types::{DoorId, EventType, ParsedEvent, PaymentMethod};
use crate::infra::metrics::Metrics;
use crate::io::backend::BackendClient;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{info, warn};

/// A backend command to be processed by the worker
#[derive(Debug)]
pub enum BackendCmd {
    /// Purchase one unit from a door
    Purchase {
        door: DoorId,
        method: PaymentMethod,
        price_cents: Option<u64>,
        /// When the command was enqueued (for queue delay measurement)
        enqueued_at: Instant,
    },
    /// Fetch a fresh door/stock snapshot
    RefreshDoors,
    /// Maintenance dispense cycle without a sale
    TestDispense(DoorId),
    /// Close a door after dispensing
    CloseDoor(DoorId),
    /// Clear the remote restock redirect flag
    ClearRedirect,
}

/// Worker that processes backend commands asynchronously
pub struct BackendWorker {
    /// REST client for the vending backend
    backend: Arc<BackendClient>,
    /// Receiver for backend commands
    cmd_rx: mpsc::Receiver<BackendCmd>,
    /// Event channel for re-injecting results into the controller loop
    event_tx: mpsc::Sender<ParsedEvent>,
    /// Metrics for recording latency and queue delay
    metrics: Arc<Metrics>,
}

impl BackendWorker {
    pub fn new(
        backend: Arc<BackendClient>,
        cmd_rx: mpsc::Receiver<BackendCmd>,
        event_tx: mpsc::Sender<ParsedEvent>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { backend, cmd_rx, event_tx, metrics }
    }

    /// Run the worker, processing commands until the channel closes
    pub async fn run(mut self) {
        info!("backend_worker_started");

        while let Some(cmd) = self.cmd_rx.recv().await {
            self.metrics.record_backend_cmd();
            match cmd {
                BackendCmd::Purchase { door, method, price_cents, enqueued_at } => {
                    // Measure queue delay (time from enqueue to processing start)
                    let queue_delay_us = enqueued_at.elapsed().as_micros() as u64;
                    self.metrics.record_backend_queue_delay(queue_delay_us);

                    // Warn if queue delay exceeds 1ms - indicates backlog
                    if queue_delay_us > 1000 {
                        warn!(
                            door = %door,
                            queue_delay_us = %queue_delay_us,
                            "backend_cmd_queue_delay_high"
                        );
                    }

                    let (outcome, latency_us) =
                        self.backend.purchase(&door, method, price_cents).await;
                    self.metrics.record_backend_latency(latency_us);
                    self.inject(EventType::PurchaseResult(outcome));
                }
                BackendCmd::RefreshDoors => match self.backend.fetch_doors().await {
                    Ok(doors) => {
                        self.inject(EventType::DoorsSnapshot(doors));
                    }
                    Err(e) => {
                        // Stale mirror is acceptable; the next refresh retries
                        warn!(error = %e, "doors_refresh_failed");
                    }
                },
                BackendCmd::TestDispense(door) => {
                    self.backend.test_dispense(&door).await;
                }
                BackendCmd::CloseDoor(door) => {
                    self.backend.close_door(&door).await;
                }
                BackendCmd::ClearRedirect => {
                    self.backend.clear_redirect().await;
                }
            }
        }

        info!("backend_worker_stopped");
    }

    fn inject(&self, event_type: EventType) {
        match self.event_tx.try_send(ParsedEvent::new(event_type)) {
            Ok(()) => {}
            Err(TrySendError::Full(e)) => {
                warn!(event = %e.event_type.as_str(), "backend_result_dropped: channel full");
            }
            Err(TrySendError::Closed(_)) => {
                warn!("backend_result_channel_closed");
            }
        }
    }
}

/// Create a backend command channel and worker
///
/// Returns the sender (for the controller) and the worker (to be spawned)
pub fn create_backend_worker(
    backend: Arc<BackendClient>,
    event_tx: mpsc::Sender<ParsedEvent>,
    metrics: Arc<Metrics>,
    buffer_size: usize,
) -> (mpsc::Sender<BackendCmd>, BackendWorker) {
    let (cmd_tx, cmd_rx) = mpsc::channel(buffer_size);
    let worker = BackendWorker::new(backend, cmd_rx, event_tx, metrics);
    (cmd_tx, worker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::config::Config;

    #[tokio::test]
    async fn test_purchase_result_injected() {
        let backend = Arc::new(BackendClient::new(&Config::default()));
        let metrics = Arc::new(Metrics::new());
        let (event_tx, mut event_rx) = mpsc::channel(8);
        let (cmd_tx, worker) = create_backend_worker(backend, event_tx, metrics, 8);

        tokio::spawn(worker.run());

        cmd_tx
            .send(BackendCmd::Purchase {
                door: DoorId::from("A1"),
                method: PaymentMethod::Card,
                price_cents: Some(250),
                enqueued_at: Instant::now(),
            })
            .await
            .unwrap();

        let event = event_rx.recv().await.unwrap();
        match event.event_type {
            EventType::PurchaseResult(outcome) => {
                assert_eq!(outcome.door, DoorId::from("A1"));
                assert!(outcome.success); // mock backend always succeeds
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_worker_stops_when_channel_closes() {
        let backend = Arc::new(BackendClient::new(&Config::default()));
        let metrics = Arc::new(Metrics::new());
        let (event_tx, _event_rx) = mpsc::channel(8);
        let (cmd_tx, worker) = create_backend_worker(backend, event_tx, metrics, 8);

        let handle = tokio::spawn(worker.run());
        drop(cmd_tx);
        handle.await.unwrap();
    }
}
