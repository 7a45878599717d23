//! MQTT client for receiving touch surface events
//!
//! The on-screen UI publishes one JSON object per input event on the touch
//! topic. Events are relayed to the controller loop via try_send so the
//! MQTT eventloop is never blocked; drops are counted in metrics and logged
//! (rate-limited).

use crate::domain::types::{EventType, ParsedEvent, PaymentMethod, TouchMessage};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Start the MQTT client and send parsed events to the channel
pub async fn start_touch_client(
    config: &Config,
    event_tx: mpsc::Sender<ParsedEvent>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let client_id = format!("kiosk-touch-{}", std::process::id());
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    // Set credentials if configured
    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    client.subscribe(config.touch_topic(), QoS::AtMostOnce).await?;

    info!(
        topic = %config.touch_topic(),
        host = %config.mqtt_host(),
        port = %config.mqtt_port(),
        "touch_client_subscribed"
    );

    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    loop {
        tokio::select! {
            // Check for shutdown signal
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("touch_client_shutdown");
                    return Ok(());
                }
            }
            // Process MQTT events
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let received_at = Instant::now();

                        match std::str::from_utf8(&publish.payload) {
                            Ok(json_str) => {
                                let Some(event) = parse_touch_message(json_str, received_at) else {
                                    debug!(topic = %publish.topic, "touch_message_ignored");
                                    continue;
                                };

                                debug!(event_type = %event.event_type.as_str(), "touch_event_parsed");
                                if let Err(e) = event_tx.try_send(event) {
                                    match e {
                                        TrySendError::Full(_) => {
                                            metrics.record_touch_event_dropped();
                                            if last_drop_warn.elapsed() > Duration::from_secs(1) {
                                                warn!("touch_event_dropped: channel full");
                                                last_drop_warn = Instant::now();
                                            }
                                        }
                                        TrySendError::Closed(_) => {
                                            warn!("touch_event_channel_closed");
                                            return Ok(());
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "touch_payload_not_utf8");
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("touch_client_connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "touch_client_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}

/// Parse one touch surface JSON message into an event
///
/// Returns None for malformed payloads and unknown message types; the touch
/// surface is noisy and this layer just filters.
pub fn parse_touch_message(json_str: &str, received_at: Instant) -> Option<ParsedEvent> {
    let message: TouchMessage = match serde_json::from_str(json_str) {
        Ok(m) => m,
        Err(e) => {
            debug!(error = %e, "touch_message_parse_failed");
            return None;
        }
    };

    let event_type = match message.msg_type.as_str() {
        "DOOR_TOUCH" => {
            let door = message.door?;
            if door.is_empty() {
                return None;
            }
            EventType::DoorTouch(door.as_str().into())
        }
        "ACTIVITY" => EventType::Activity,
        "CANCEL" => EventType::Cancel,
        "PURCHASE" => {
            let method = PaymentMethod::parse(message.method.as_deref()?)?;
            EventType::PurchaseRequest(method)
        }
        other => {
            debug!(msg_type = %other, "touch_message_unknown_type");
            return None;
        }
    };

    Some(ParsedEvent { event_type, received_at })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::DoorId;

    #[test]
    fn test_parse_door_touch() {
        let json = r#"{"type": "DOOR_TOUCH", "door": "A1"}"#;
        let event = parse_touch_message(json, Instant::now()).unwrap();
        assert_eq!(event.event_type, EventType::DoorTouch(DoorId::from("A1")));
    }

    #[test]
    fn test_parse_activity() {
        let json = r#"{"type": "ACTIVITY"}"#;
        let event = parse_touch_message(json, Instant::now()).unwrap();
        assert_eq!(event.event_type, EventType::Activity);
    }

    #[test]
    fn test_parse_cancel() {
        let json = r#"{"type": "CANCEL"}"#;
        let event = parse_touch_message(json, Instant::now()).unwrap();
        assert_eq!(event.event_type, EventType::Cancel);
    }

    #[test]
    fn test_parse_purchase() {
        let json = r#"{"type": "PURCHASE", "method": "contactless"}"#;
        let event = parse_touch_message(json, Instant::now()).unwrap();
        assert_eq!(
            event.event_type,
            EventType::PurchaseRequest(PaymentMethod::Contactless)
        );
    }

    #[test]
    fn test_parse_purchase_unknown_method_rejected() {
        let json = r#"{"type": "PURCHASE", "method": "barter"}"#;
        assert!(parse_touch_message(json, Instant::now()).is_none());
    }

    #[test]
    fn test_parse_door_touch_without_door_rejected() {
        assert!(parse_touch_message(r#"{"type": "DOOR_TOUCH"}"#, Instant::now()).is_none());
        assert!(
            parse_touch_message(r#"{"type": "DOOR_TOUCH", "door": ""}"#, Instant::now()).is_none()
        );
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(parse_touch_message("not json", Instant::now()).is_none());
    }

    #[test]
    fn test_parse_unknown_type() {
        let json = r#"{"type": "SWIPE", "door": "A1"}"#;
        assert!(parse_touch_message(json, Instant::now()).is_none());
    }
}
