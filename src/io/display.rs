//! Typed channel for display commands
//!
//! The rendering surface subscribes to the display topics; the controller
//! sends typed payloads through this channel without blocking. Uses bounded
//! mpsc channels to prevent unbounded memory growth.

use crate::domain::receipt::epoch_ms;
use crate::infra::metrics::{MetricsSummary, METRICS_NUM_BUCKETS};
use serde::Serialize;
use tokio::sync::mpsc;

/// Messages that can be sent to the display publisher
#[derive(Debug)]
pub enum DisplayMessage {
    /// Screensaver on/off
    Screensaver(ScreensaverPayload),
    /// Current selection state (None door = cleared)
    Selection(SelectionPayload),
    /// Secret-sequence progress readout
    SequenceProgress(SequenceProgressPayload),
    /// Restock mode activation (QoS 1 - must not be missed)
    Restock(RestockPayload),
    /// Purchase result for the result screen
    PurchaseResult(PurchaseResultPayload),
    /// Periodic metrics snapshot
    Metrics(MetricsPayload),
}

/// Payload for screensaver transitions
#[derive(Debug, Clone, Serialize)]
pub struct ScreensaverPayload {
    /// Kiosk identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    /// Timestamp (epoch ms)
    pub ts: u64,
    /// true = show the attract screen, false = hide it
    pub on: bool,
}

/// Payload for selection state
///
/// `door` of None means the selection was cleared; the surface must always
/// receive the clear before a screensaver-on for the same transition.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    pub ts: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub door: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_cents: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
    /// Derived door state (available, low_stock, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Payload for secret-sequence progress, recomputed after every touch
#[derive(Debug, Clone, Serialize)]
pub struct SequenceProgressPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    pub ts: u64,
    pub matched: usize,
    pub total: usize,
    /// Next expected door, omitted when the sequence just reset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

/// Payload for restock activation
#[derive(Debug, Clone, Serialize)]
pub struct RestockPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    pub ts: u64,
    /// Trigger source: "sequence" or "remote"
    pub source: String,
}

/// Payload for purchase results
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseResultPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    pub ts: u64,
    pub door: String,
    pub method: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_stock: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Payload for metrics snapshot
#[derive(Debug, Serialize)]
pub struct MetricsPayload {
    /// Kiosk identifier
    pub site: String,
    /// Timestamp (epoch ms)
    pub ts: u64,
    /// Current session state (active, idle)
    pub session_state: String,
    /// Total events processed
    pub events_total: u64,
    /// Events per second
    pub events_per_sec: f64,
    /// Average processing latency (microseconds)
    pub avg_latency_us: u64,
    /// Max processing latency (microseconds)
    pub max_latency_us: u64,
    /// Event processing latency histogram buckets (Prometheus-style exponential)
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub lat_buckets: [u64; METRICS_NUM_BUCKETS],
    /// 50th percentile latency (µs)
    pub lat_p50_us: u64,
    /// 99th percentile latency (µs)
    pub lat_p99_us: u64,
    /// Total door touches
    pub touches_total: u64,
    /// Secret sequence attempts / completions / timeouts
    pub seq_started: u64,
    pub seq_completed: u64,
    pub seq_timeouts: u64,
    /// Idle transitions and wakes
    pub idle_entered: u64,
    pub wakes: u64,
    /// Purchases confirmed and failed
    pub purchases: u64,
    pub purchase_failures: u64,
    /// Backend command count and latency
    pub backend_cmds: u64,
    pub backend_lat_avg_us: u64,
    pub backend_lat_p99_us: u64,
    /// Current queue depths (snapshot)
    pub event_queue_depth: u64,
    pub backend_queue_depth: u64,
    /// Whether a selection is live
    pub selection_active: bool,
    /// Catalog size / currently selectable doors
    pub doors: usize,
    pub selectable: usize,
}

impl MetricsPayload {
    /// Create a metrics payload from a summary with site info
    pub fn from_summary(summary: MetricsSummary, site: String, session_state: &str) -> Self {
        Self {
            site,
            ts: epoch_ms(),
            session_state: session_state.to_string(),
            events_total: summary.events_total,
            events_per_sec: summary.events_per_sec,
            avg_latency_us: summary.avg_process_latency_us,
            max_latency_us: summary.max_process_latency_us,
            lat_buckets: summary.lat_buckets,
            lat_p50_us: summary.lat_p50_us,
            lat_p99_us: summary.lat_p99_us,
            touches_total: summary.touches_total,
            seq_started: summary.sequence_started_total,
            seq_completed: summary.sequence_completed_total,
            seq_timeouts: summary.sequence_timeout_total,
            idle_entered: summary.idle_entered_total,
            wakes: summary.wake_total,
            purchases: summary.purchases_total,
            purchase_failures: summary.purchase_failures_total,
            backend_cmds: summary.backend_cmds_sent,
            backend_lat_avg_us: summary.backend_lat_avg_us,
            backend_lat_p99_us: summary.backend_lat_p99_us,
            event_queue_depth: summary.event_queue_depth,
            backend_queue_depth: summary.backend_queue_depth,
            selection_active: summary.selection_active,
            doors: summary.catalog_doors,
            selectable: summary.selectable_doors,
        }
    }
}

/// Sender handle for display messages
///
/// Clone this to share across multiple producers.
/// Non-blocking - if the channel is full, messages are dropped.
#[derive(Clone)]
pub struct DisplaySender {
    tx: mpsc::Sender<DisplayMessage>,
    site_id: String,
}

impl DisplaySender {
    /// Create a new sender from an mpsc sender
    pub fn new(tx: mpsc::Sender<DisplayMessage>, site_id: String) -> Self {
        Self { tx, site_id }
    }

    /// Send a screensaver on/off command
    pub fn send_screensaver(&self, on: bool) {
        let payload =
            ScreensaverPayload { site: Some(self.site_id.clone()), ts: epoch_ms(), on };
        let _ = self.tx.try_send(DisplayMessage::Screensaver(payload));
    }

    /// Send the current selection state
    /// Injects site_id into the payload
    pub fn send_selection(&self, mut payload: SelectionPayload) {
        payload.site = Some(self.site_id.clone());
        let _ = self.tx.try_send(DisplayMessage::Selection(payload));
    }

    /// Send a sequence progress readout
    /// Injects site_id into the payload
    pub fn send_sequence_progress(&self, mut payload: SequenceProgressPayload) {
        payload.site = Some(self.site_id.clone());
        let _ = self.tx.try_send(DisplayMessage::SequenceProgress(payload));
    }

    /// Send a restock activation
    pub fn send_restock(&self, source: &str) {
        let payload = RestockPayload {
            site: Some(self.site_id.clone()),
            ts: epoch_ms(),
            source: source.to_string(),
        };
        let _ = self.tx.try_send(DisplayMessage::Restock(payload));
    }

    /// Send a purchase result
    /// Injects site_id into the payload
    pub fn send_purchase_result(&self, mut payload: PurchaseResultPayload) {
        payload.site = Some(self.site_id.clone());
        let _ = self.tx.try_send(DisplayMessage::PurchaseResult(payload));
    }

    /// Send a metrics snapshot with current session state
    pub fn send_metrics(&self, summary: MetricsSummary, session_state: &str) {
        let payload = MetricsPayload::from_summary(summary, self.site_id.clone(), session_state);
        let _ = self.tx.try_send(DisplayMessage::Metrics(payload));
    }
}

/// Create a new display channel pair
///
/// Returns (sender, receiver) where sender can be cloned and shared.
/// Buffer size determines how many messages can be queued.
/// site_id is injected into every payload for downstream consumers.
pub fn create_display_channel(
    buffer_size: usize,
    site_id: String,
) -> (DisplaySender, mpsc::Receiver<DisplayMessage>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (DisplaySender::new(tx, site_id), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_payload_serialization() {
        let payload = SelectionPayload {
            site: Some("kiosk-01".to_string()),
            ts: 1767617600000,
            door: Some("A1".to_string()),
            price_cents: Some(250),
            stock: Some(3),
            state: Some("available".to_string()),
        };

        let json = serde_json::to_string(&payload).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["door"], "A1");
        assert_eq!(parsed["price_cents"], 250);
    }

    #[test]
    fn test_cleared_selection_omits_fields() {
        let payload = SelectionPayload {
            site: None,
            ts: 1767617600000,
            door: None,
            price_cents: None,
            stock: None,
            state: None,
        };

        let json = serde_json::to_string(&payload).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed.get("door").is_none());
        assert!(parsed.get("price_cents").is_none());
    }

    #[tokio::test]
    async fn test_sender_injects_site() {
        let (sender, mut rx) = create_display_channel(8, "kiosk-02".to_string());

        sender.send_screensaver(true);
        match rx.recv().await.unwrap() {
            DisplayMessage::Screensaver(p) => {
                assert_eq!(p.site.as_deref(), Some("kiosk-02"));
                assert!(p.on);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_full_channel_drops_without_blocking() {
        let (sender, mut rx) = create_display_channel(1, "kiosk".to_string());

        sender.send_screensaver(true);
        sender.send_screensaver(false); // dropped, channel full

        assert!(matches!(rx.recv().await.unwrap(), DisplayMessage::Screensaver(p) if p.on));
        assert!(rx.try_recv().is_err());
    }
}
