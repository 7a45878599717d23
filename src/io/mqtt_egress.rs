//! MQTT publisher for display commands
//!
//! Publishes controller output to MQTT topics for the rendering surface:
//! - kiosk/display/screensaver - screensaver on/off (QoS 0)
//! - kiosk/display/selection - selection state (QoS 0)
//! - kiosk/display/sequence - secret-sequence progress (QoS 0)
//! - kiosk/display/restock - restock activation (QoS 1)
//! - kiosk/display/results - purchase results (QoS 0)
//! - kiosk/display/metrics - periodic metrics snapshots (QoS 0)

use crate::infra::config::Config;
use crate::io::display::DisplayMessage;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// MQTT publisher actor
///
/// Receives messages from the display channel and publishes to MQTT topics.
pub struct DisplayPublisher {
    client: AsyncClient,
    rx: mpsc::Receiver<DisplayMessage>,
    screensaver_topic: String,
    selection_topic: String,
    sequence_topic: String,
    restock_topic: String,
    results_topic: String,
    metrics_topic: String,
}

impl DisplayPublisher {
    /// Create a new display publisher
    ///
    /// Connects to the broker at the configured MQTT host/port.
    pub fn new(config: &Config, rx: mpsc::Receiver<DisplayMessage>) -> Self {
        let client_id = format!("kiosk-display-{}", std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        mqttoptions.set_clean_session(true);

        // Set credentials if configured
        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
            mqttoptions.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(mqttoptions, 100);

        // Spawn the eventloop handler
        tokio::spawn(async move {
            let mut eventloop = eventloop;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("display_publisher_connected");
                    }
                    Ok(Event::Incoming(Packet::PubAck(_))) => {
                        // QoS 1 acknowledgement received
                        debug!("display_publisher_puback");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "display_publisher_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self {
            client,
            rx,
            screensaver_topic: config.display_screensaver_topic().to_string(),
            selection_topic: config.display_selection_topic().to_string(),
            sequence_topic: config.display_sequence_topic().to_string(),
            restock_topic: config.display_restock_topic().to_string(),
            results_topic: config.display_results_topic().to_string(),
            metrics_topic: config.display_metrics_topic().to_string(),
        }
    }

    /// Run the publisher loop
    ///
    /// Processes messages from the channel and publishes to MQTT.
    /// Runs until shutdown signal is received.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            screensaver = %self.screensaver_topic,
            selection = %self.selection_topic,
            sequence = %self.sequence_topic,
            restock = %self.restock_topic,
            results = %self.results_topic,
            "display_publisher_started"
        );

        loop {
            tokio::select! {
                // Check for shutdown
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("display_publisher_shutdown");
                        // Drain remaining messages
                        while let Ok(msg) = self.rx.try_recv() {
                            self.publish_message(msg).await;
                        }
                        return;
                    }
                }
                // Process messages
                Some(msg) = self.rx.recv() => {
                    self.publish_message(msg).await;
                }
            }
        }
    }

    async fn publish_message(&self, msg: DisplayMessage) {
        match msg {
            DisplayMessage::Screensaver(payload) => {
                self.publish_qos0(&self.screensaver_topic, &payload, "screensaver").await;
            }
            DisplayMessage::Selection(payload) => {
                self.publish_qos0(&self.selection_topic, &payload, "selection").await;
            }
            DisplayMessage::SequenceProgress(payload) => {
                self.publish_qos0(&self.sequence_topic, &payload, "sequence").await;
            }
            DisplayMessage::Restock(payload) => {
                // Use QoS 1 for restock activation (at-least-once delivery):
                // missing this one strands the operator at the machine
                if let Ok(json) = serde_json::to_string(&payload) {
                    if let Err(e) = self
                        .client
                        .publish(&self.restock_topic, QoS::AtLeastOnce, false, json.as_bytes())
                        .await
                    {
                        error!(error = %e, "display_restock_publish_failed");
                    }
                }
            }
            DisplayMessage::PurchaseResult(payload) => {
                self.publish_qos0(&self.results_topic, &payload, "result").await;
            }
            DisplayMessage::Metrics(payload) => {
                self.publish_qos0(&self.metrics_topic, &payload, "metrics").await;
            }
        }
    }

    /// Publish a serializable payload fire-and-forget
    async fn publish_qos0<T: serde::Serialize>(&self, topic: &str, payload: &T, label: &str) {
        if let Ok(json) = serde_json::to_string(payload) {
            if let Err(e) =
                self.client.publish(topic, QoS::AtMostOnce, false, json.as_bytes()).await
            {
                debug!(error = %e, topic = %topic, "display_{label}_publish_failed");
            }
        }
    }
}
