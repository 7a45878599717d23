//! Event handlers for the KioskController
//!
//! Each handler processes a specific event type, updating detector and
//! selection state and triggering side effects (backend commands, display
//! payloads).

use super::KioskController;
use crate::domain::catalog::Door;
use crate::domain::receipt::{epoch_ms, Receipt};
use crate::domain::types::{DoorId, PaymentMethod, PurchaseOutcome};
use crate::infra::metrics::{SESSION_STATE_ACTIVE, SESSION_STATE_IDLE};
use crate::io::backend_worker::BackendCmd;
use crate::io::display::{PurchaseResultPayload, SelectionPayload, SequenceProgressPayload};
use crate::services::sequence::SequenceOutcome;
use crate::services::session::ActivityOutcome;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};

impl KioskController {
    /// Handle a door touch.
    ///
    /// The sequence detector sees every touch first, as a transparent side
    /// channel; normal selection handling runs regardless of the matcher's
    /// outcome. Every touch is qualifying activity.
    pub(crate) fn handle_door_touch(&mut self, door: &DoorId, now: Instant) {
        self.metrics.record_touch(door.as_str());

        match self.sequence.observe(door, now) {
            SequenceOutcome::Advanced => {
                if self.sequence.progress().matched == 1 {
                    self.metrics.record_sequence_started();
                }
                self.publish_sequence_progress();
            }
            SequenceOutcome::Restarted => {
                self.metrics.record_sequence_reset();
                self.metrics.record_sequence_started();
                self.publish_sequence_progress();
            }
            SequenceOutcome::Reset => {
                self.metrics.record_sequence_reset();
                self.publish_sequence_progress();
            }
            SequenceOutcome::Activated => {
                self.metrics.record_sequence_completed();
                self.activate_restock("sequence");
            }
            SequenceOutcome::Idle => {}
        }

        self.note_activity(now);

        // Normal selection handling; untouched by the matcher above
        if self.catalog.is_selectable(door) {
            self.select_door(door.clone());
        } else {
            debug!(door = %door, "door_not_selectable");
        }
    }

    /// Handle generic qualifying activity
    pub(crate) fn handle_activity(&mut self, now: Instant) {
        self.note_activity(now);
    }

    /// Handle a selection dismissal from the surface
    pub(crate) fn handle_cancel(&mut self, now: Instant) {
        self.note_activity(now);
        if self.selection.is_some() {
            self.clear_selection();
        }
    }

    /// Handle a purchase request for the current selection.
    ///
    /// The HTTP round-trip runs on the backend worker; the result comes
    /// back as a PurchaseResult event.
    pub(crate) fn handle_purchase_request(&mut self, method: PaymentMethod, now: Instant) {
        self.note_activity(now);

        let Some(door) = self.selection.clone() else {
            warn!(method = %method.as_str(), "purchase_without_selection");
            return;
        };

        let price_cents = self.catalog.price_cents(&door);
        let cmd = BackendCmd::Purchase { door: door.clone(), method, price_cents, enqueued_at: now };

        match self.backend_tx.try_send(cmd) {
            Ok(()) => {
                info!(door = %door, method = %method.as_str(), "purchase_enqueued");
            }
            Err(e) => {
                self.metrics.record_backend_cmd_dropped();
                warn!(door = %door, error = %e, "purchase_enqueue_failed");
            }
        }
    }

    /// Handle a purchase result from the backend worker
    pub(crate) fn handle_purchase_result(&mut self, outcome: PurchaseOutcome) {
        let price_cents = self.catalog.price_cents(&outcome.door);
        self.metrics.record_purchase(outcome.success);

        if outcome.success {
            self.catalog.apply_purchase(&outcome.door, outcome.remaining_stock);
            self.receipts.write_receipt(&Receipt::from_outcome(&outcome, price_cents));
        } else {
            info!(
                door = %outcome.door,
                error = %outcome.error.as_deref().unwrap_or("unknown"),
                "purchase_failed"
            );
        }

        if let Some(ref display) = self.display {
            display.send_purchase_result(PurchaseResultPayload {
                site: None,
                ts: epoch_ms(),
                door: outcome.door.0.clone(),
                method: outcome.method.as_str().to_string(),
                success: outcome.success,
                remaining_stock: outcome.remaining_stock,
                error: outcome.error.clone(),
            });
        }

        // Either way the purchase flow is over; back to the grid
        if self.selection.is_some() {
            self.clear_selection();
        }
    }

    /// Handle a fresh door/stock snapshot from the backend
    pub(crate) fn handle_doors_snapshot(&mut self, doors: HashMap<DoorId, Door>) {
        self.catalog.apply_snapshot(doors);

        let mut door_ids: Vec<String> =
            self.catalog.door_ids().into_iter().map(|d| d.0).collect();
        door_ids.sort();
        self.metrics.set_doors(&door_ids);

        // The snapshot may have invalidated the live selection
        if let Some(door) = self.selection.clone() {
            if !self.catalog.is_selectable(&door) {
                info!(door = %door, "selection_invalidated_by_snapshot");
                self.clear_selection();
            }
        }
    }

    /// Handle the remote restock redirect flag.
    ///
    /// Same activation path as a completed touch sequence; afterwards the
    /// flag is cleared on the backend so it only fires once per request.
    pub(crate) fn handle_remote_activation(&mut self) {
        self.metrics.record_remote_activation();
        self.activate_restock("remote");

        if self.backend_tx.try_send(BackendCmd::ClearRedirect).is_err() {
            self.metrics.record_backend_cmd_dropped();
            warn!("clear_redirect_enqueue_failed");
        }
    }

    /// Shared restock activation path (touch sequence or remote flag).
    ///
    /// The restock UI and the purchase UI are mutually exclusive, so any
    /// live selection is cleared before the mode switch is published.
    pub(crate) fn activate_restock(&mut self, source: &str) {
        info!(source = %source, "restock_activated");

        if self.selection.is_some() {
            self.clear_selection();
        }
        self.publish_sequence_progress();

        if let Some(ref display) = self.display {
            display.send_restock(source);
        }
    }

    /// Register qualifying activity, waking the session if needed
    fn note_activity(&mut self, now: Instant) {
        if self.session.note_activity(now) == ActivityOutcome::Woke {
            self.metrics.record_wake();
            self.metrics.set_session_state(SESSION_STATE_ACTIVE);
            if let Some(ref display) = self.display {
                display.send_screensaver(false);
            }
        }
    }

    /// Enter the idle state: clear any in-progress selection FIRST, then
    /// show the screensaver. The surface cannot be mid-purchase and idle
    /// at once, so this ordering is a correctness requirement.
    pub(crate) fn enter_idle(&mut self) {
        if self.selection.is_some() {
            self.clear_selection();
        }

        self.metrics.record_idle_entered();
        self.metrics.set_session_state(SESSION_STATE_IDLE);
        info!("screensaver_shown");

        if let Some(ref display) = self.display {
            display.send_screensaver(true);
        }
    }

    /// Set the selection and publish its state
    fn select_door(&mut self, door: DoorId) {
        info!(door = %door, "door_selected");
        let payload = SelectionPayload {
            site: None,
            ts: epoch_ms(),
            door: Some(door.0.clone()),
            price_cents: self.catalog.price_cents(&door),
            stock: self.catalog.stock(&door),
            state: self.catalog.get(&door).map(|d| d.state().as_str().to_string()),
        };

        self.selection = Some(door);
        self.metrics.set_selection_active(true);

        if let Some(ref display) = self.display {
            display.send_selection(payload);
        }
    }

    /// Clear the selection and publish the cleared state
    pub(crate) fn clear_selection(&mut self) {
        if let Some(door) = self.selection.take() {
            debug!(door = %door, "selection_cleared");
        }
        self.metrics.set_selection_active(false);

        if let Some(ref display) = self.display {
            display.send_selection(SelectionPayload {
                site: None,
                ts: epoch_ms(),
                door: None,
                price_cents: None,
                stock: None,
                state: None,
            });
        }
    }

    /// Publish the current sequence progress readout
    pub(crate) fn publish_sequence_progress(&mut self) {
        let progress = self.sequence.progress();
        self.metrics.set_sequence_matched(progress.matched as u64);

        if let Some(ref display) = self.display {
            display.send_sequence_progress(SequenceProgressPayload {
                site: None,
                ts: epoch_ms(),
                matched: progress.matched,
                total: progress.total,
                next: if progress.matched > 0 { progress.next.map(|d| d.0) } else { None },
            });
        }
    }
}
