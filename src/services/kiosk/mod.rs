//! Kiosk event orchestration
//!
//! The KioskController is the central event processor that coordinates:
//! - Secret-sequence detection (restock mode unlock)
//! - Idle/screensaver session timing
//! - Door selection and the purchase round-trip
//! - Catalog reconciliation against backend snapshots
//!
//! All mutable state lives here, on one task; producers only feed the
//! event channel.

mod handlers;
#[cfg(test)]
mod tests;

use crate::domain::types::{DoorId, EventType, ParsedEvent, SessionState};
use crate::infra::config::Config;
use crate::infra::metrics::{Metrics, SESSION_STATE_ACTIVE, SESSION_STATE_IDLE};
use crate::io::backend_worker::BackendCmd;
use crate::io::display::DisplaySender;
use crate::io::receipts::ReceiptLog;
use crate::services::catalog::DoorCatalog;
use crate::services::sequence::SequenceDetector;
use crate::services::session::SessionTimer;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::info;

/// Deadline resolution for both detectors
const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Central event processor for the kiosk touch surface
pub struct KioskController {
    /// Local mirror of backend door/product state
    pub(crate) catalog: DoorCatalog,
    /// Secret-sequence matcher (side channel on every door touch)
    pub(crate) sequence: SequenceDetector,
    /// Idle/screensaver machine
    pub(crate) session: SessionTimer,
    /// Currently selected door, if any
    pub(crate) selection: Option<DoorId>,
    /// Receipt log for confirmed purchases
    pub(crate) receipts: ReceiptLog,
    /// Application configuration
    pub(crate) config: Config,
    /// Backend command queue (worker does the HTTP)
    pub(crate) backend_tx: mpsc::Sender<BackendCmd>,
    /// Metrics collector
    pub(crate) metrics: Arc<Metrics>,
    /// Display command sender (optional)
    pub(crate) display: Option<DisplaySender>,
}

impl KioskController {
    /// Create a new controller with the given configuration and dependencies.
    ///
    /// Fails on invalid detector configuration (empty sequence, zero
    /// timeouts); the service must not start half-configured.
    pub fn new(
        config: Config,
        backend_tx: mpsc::Sender<BackendCmd>,
        metrics: Arc<Metrics>,
        display: Option<DisplaySender>,
    ) -> anyhow::Result<Self> {
        let now = Instant::now();
        let sequence = SequenceDetector::new(
            config.expected_sequence(),
            Duration::from_secs(config.step_timeout_secs()),
        )?;
        let session = SessionTimer::new(
            Duration::from_secs(config.idle_timeout_secs()),
            config.start_idle(),
            now,
        )?;
        let receipts = ReceiptLog::new(config.receipts_file(), config.site_id());

        metrics.set_session_state(if session.is_idle() {
            SESSION_STATE_IDLE
        } else {
            SESSION_STATE_ACTIVE
        });

        Ok(Self {
            catalog: DoorCatalog::new(),
            sequence,
            session,
            selection: None,
            receipts,
            config,
            backend_tx,
            metrics,
            display,
        })
    }

    /// Start the controller, consuming events from the channel.
    ///
    /// The tick drives deadline expiry for both detectors; everything else
    /// is event-driven.
    pub async fn run(&mut self, mut event_rx: mpsc::Receiver<ParsedEvent>) {
        let mut tick_interval = interval(TICK_INTERVAL);

        loop {
            tokio::select! {
                // Process incoming events
                event = event_rx.recv() => {
                    match event {
                        Some(e) => self.process_event(e),
                        None => break, // Channel closed
                    }
                }
                // Periodic tick for deadline expiry
                _ = tick_interval.tick() => {
                    self.tick(Instant::now());
                }
            }
        }

        info!("kiosk_controller_stopped");
    }

    /// Process a single event, dispatching to the appropriate handler
    pub fn process_event(&mut self, event: ParsedEvent) {
        let process_start = Instant::now();

        match event.event_type {
            EventType::DoorTouch(door) => {
                self.handle_door_touch(&door, event.received_at);
            }
            EventType::Activity => {
                self.handle_activity(event.received_at);
            }
            EventType::Cancel => {
                self.handle_cancel(event.received_at);
            }
            EventType::PurchaseRequest(method) => {
                self.handle_purchase_request(method, event.received_at);
            }
            EventType::PurchaseResult(outcome) => {
                self.handle_purchase_result(outcome);
            }
            EventType::DoorsSnapshot(doors) => {
                self.handle_doors_snapshot(doors);
            }
            EventType::RemoteActivation => {
                self.handle_remote_activation();
            }
            EventType::Unknown(_) => {}
        }

        // Record processing latency (lock-free)
        let latency_us = process_start.elapsed().as_micros() as u64;
        self.metrics.record_event_processed(latency_us);
    }

    /// Drive deadline expiry for both detectors.
    ///
    /// On idle expiry the selection is cleared BEFORE the screensaver is
    /// shown: the surface cannot be mid-purchase and idle at once.
    pub fn tick(&mut self, now: Instant) {
        if self.sequence.poll(now) {
            self.metrics.record_sequence_timeout();
            self.publish_sequence_progress();
        }

        if self.session.poll(now) {
            self.enter_idle();
        }
    }

    /// Current session state
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Currently selected door, if any
    pub fn selection(&self) -> Option<&DoorId> {
        self.selection.as_ref()
    }
}
