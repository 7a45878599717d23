//! Embedded MQTT broker using rumqttd
//!
//! A kiosk runs self-contained: the touch surface, display surface, and this
//! controller all connect to a broker hosted in-process, so the machine
//! needs no external infrastructure.

use crate::infra::config::Config as AppConfig;
use rumqttd::{Broker, Config, ConnectionSettings, RouterConfig, ServerSettings};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Assemble the rumqttd config for a single local listener.
///
/// Sized for one kiosk's handful of local clients, not a fleet.
fn broker_config(listen: SocketAddr) -> Config {
    let server = ServerSettings {
        name: "v4".to_string(),
        listen,
        tls: None,
        next_connection_delay_ms: 1,
        connections: ConnectionSettings {
            connection_timeout_ms: 5000,
            max_payload_size: 65536,
            max_inflight_count: 200,
            auth: None,
            dynamic_filters: false,
            external_auth: None,
        },
    };

    Config {
        id: 0,
        router: RouterConfig {
            max_segment_size: 10485760,
            max_segment_count: 10,
            max_connections: 64,
            max_outgoing_packet_count: 200,
            initialized_filters: None,
            ..Default::default()
        },
        v4: Some(HashMap::from([("v4".to_string(), server)])),
        v5: None,
        ws: None,
        prometheus: None,
        metrics: None,
        bridge: None,
        console: None,
        cluster: None,
    }
}

/// Start the embedded MQTT broker on its own thread.
///
/// rumqttd's `start()` blocks, so it gets a dedicated OS thread; a failed
/// start is logged and the controller keeps running (an external broker at
/// the same address still works).
pub fn start_embedded_broker(app_config: &AppConfig) {
    let addr_str = format!("{}:{}", app_config.broker_bind_address(), app_config.broker_port());
    let listen: SocketAddr = match addr_str.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!(error = %e, addr = %addr_str, "broker_invalid_bind_address");
            return;
        }
    };

    let config = broker_config(listen);
    thread::spawn(move || {
        if let Err(e) = Broker::new(config).start() {
            warn!(error = %e, "broker_start_failed");
        }
    });

    // Give the listener a moment to bind before clients connect
    thread::sleep(Duration::from_millis(100));
    info!(addr = %addr_str, "broker_started");
}
