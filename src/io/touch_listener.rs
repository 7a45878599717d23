//! TCP listener for wired touch panel events
//!
//! Some installations wire the touch panel controller directly instead of
//! going through MQTT. Protocol is line-oriented:
//!   "TOUCH <door_id>"   - door square touched
//!   "ACTIVITY"          - generic qualifying activity
//!   "CANCEL"            - selection dismissed
//!   "BUY <method>"      - purchase the current selection

use crate::domain::types::{EventType, ParsedEvent, PaymentMethod};
use crate::infra::metrics::Metrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Touch listener configuration
#[derive(Debug, Clone)]
pub struct TouchListenerConfig {
    pub port: u16,
    pub enabled: bool,
}

impl Default for TouchListenerConfig {
    fn default() -> Self {
        Self { port: 25901, enabled: true }
    }
}

/// Start the touch TCP listener
///
/// Accepts connections from wired panels; each connection gets its own task
/// that feeds parsed events into the controller channel via try_send (never
/// blocking, drops counted in metrics).
pub async fn start_touch_listener(
    config: TouchListenerConfig,
    event_tx: mpsc::Sender<ParsedEvent>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if !config.enabled {
        info!("touch_listener_disabled");
        return Ok(());
    }

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(port = %config.port, "touch_listener_started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("touch_listener_shutdown");
                    return Ok(());
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let tx = event_tx.clone();
                        let m = metrics.clone();
                        let peer_ip = peer.ip().to_string();
                        tokio::spawn(async move {
                            read_panel_lines(stream, peer_ip, tx, m).await;
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "touch_listener_accept_failed");
                    }
                }
            }
        }
    }
}

/// Consume lines from one panel connection until it closes
async fn read_panel_lines(
    stream: TcpStream,
    peer_ip: String,
    event_tx: mpsc::Sender<ParsedEvent>,
    metrics: Arc<Metrics>,
) {
    debug!(ip = %peer_ip, "panel_connection_accepted");

    let mut lines = BufReader::new(stream).lines();
    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    while let Ok(Some(raw)) = lines.next_line().await {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        let Some(event_type) = parse_touch_line(line) else {
            debug!(peer_ip = %peer_ip, line = %line, "panel_unknown_message");
            continue;
        };

        debug!(peer_ip = %peer_ip, event_type = %event_type.as_str(), "panel_event_received");

        match event_tx.try_send(ParsedEvent::new(event_type)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                metrics.record_touch_event_dropped();
                if last_drop_warn.elapsed() > Duration::from_secs(1) {
                    warn!(peer_ip = %peer_ip, "panel_event_dropped: channel full");
                    last_drop_warn = Instant::now();
                }
            }
            Err(TrySendError::Closed(_)) => {
                warn!(peer_ip = %peer_ip, "panel_event_channel_closed");
                return;
            }
        }
    }

    debug!(peer_ip = %peer_ip, "panel_connection_closed");
}

/// Parse one panel protocol line into an event type
pub fn parse_touch_line(line: &str) -> Option<EventType> {
    if let Some(door) = line.strip_prefix("TOUCH ") {
        let door = door.trim();
        if door.is_empty() {
            return None;
        }
        return Some(EventType::DoorTouch(door.into()));
    }
    if let Some(method) = line.strip_prefix("BUY ") {
        return PaymentMethod::parse(method.trim()).map(EventType::PurchaseRequest);
    }
    match line {
        "ACTIVITY" => Some(EventType::Activity),
        "CANCEL" => Some(EventType::Cancel),
        _ => None,
    }
}
