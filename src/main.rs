//! Kiosk controller - event-loop service for a vending-machine touchscreen
//!
//! Consumes touch events from MQTT and a wired TCP panel, runs the secret
//! sequence detector and the idle/screensaver timer, mirrors backend stock,
//! and publishes typed display commands back over MQTT.
//!
//! Module structure:
//! - `domain/` - Core types (DoorId, events, catalog entries, receipts)
//! - `io/` - External interfaces (MQTT, TCP panel, backend REST, display)
//! - `services/` - Business logic (KioskController, detectors, catalog)
//! - `infra/` - Infrastructure (Config, Metrics, Broker)

use clap::Parser;
use kiosk_controller::domain::types::{EventType, ParsedEvent};
use kiosk_controller::infra::{Config, Metrics};
use kiosk_controller::io::{
    create_backend_worker, create_display_channel, start_touch_listener, BackendClient,
    BackendCmd, DisplayPublisher, TouchListenerConfig,
};
use kiosk_controller::services::KioskController;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Kiosk controller - vending machine touchscreen service
#[derive(Parser, Debug)]
#[command(name = "kiosk-controller", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(git = %env!("GIT_HASH"), "kiosk-controller starting");

    // Parse command line arguments using clap
    let args = Args::parse();

    // Load configuration from TOML file (needed for broker config)
    let config = Config::load_from_path(&args.config);

    // Bad detector configuration must stop the service before any task runs
    config.validate()?;

    // Start embedded MQTT broker with config
    kiosk_controller::infra::broker::start_embedded_broker(&config);

    // Log configuration
    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        mqtt_host = %config.mqtt_host(),
        mqtt_port = %config.mqtt_port(),
        touch_topic = %config.touch_topic(),
        backend_url = %config.backend_url(),
        sequence = ?config.expected_sequence(),
        step_timeout_secs = %config.step_timeout_secs(),
        idle_timeout_secs = %config.idle_timeout_secs(),
        start_idle = %config.start_idle(),
        prometheus_port = %config.prometheus_port(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Create shared components
    let backend = Arc::new(BackendClient::new(&config));
    let metrics = Arc::new(Metrics::new());

    // Register configured sequence doors so touch counters exist from boot;
    // the first catalog snapshot replaces this with the full grid
    let seed_doors: Vec<String> =
        config.expected_sequence().iter().map(|d| d.0.clone()).collect();
    metrics.set_doors(&seed_doors);

    // Create event channel (bounded for backpressure)
    let (event_tx, event_rx) = mpsc::channel::<ParsedEvent>(1000);

    // Start backend command worker (HTTP off the hot path)
    let (backend_tx, backend_worker) =
        create_backend_worker(backend.clone(), event_tx.clone(), metrics.clone(), 100);
    tokio::spawn(backend_worker.run());

    // Start MQTT touch client
    let mqtt_config = config.clone();
    let mqtt_tx = event_tx.clone();
    let mqtt_metrics = metrics.clone();
    let mqtt_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = kiosk_controller::io::mqtt::start_touch_client(
            &mqtt_config,
            mqtt_tx,
            mqtt_metrics,
            mqtt_shutdown,
        )
        .await
        {
            tracing::error!(error = %e, "touch MQTT client error");
        }
    });

    // Start touch panel TCP listener
    let listener_config = TouchListenerConfig {
        port: config.touch_listener_port(),
        enabled: config.touch_listener_enabled(),
    };
    let listener_tx = event_tx.clone();
    let listener_metrics = metrics.clone();
    let listener_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) =
            start_touch_listener(listener_config, listener_tx, listener_metrics, listener_shutdown)
                .await
        {
            tracing::error!(error = %e, "touch listener error");
        }
    });

    // Start Prometheus metrics HTTP server (if port > 0)
    let prometheus_port = config.prometheus_port();
    if prometheus_port > 0 {
        let prom_metrics = metrics.clone();
        let prom_site = config.site_id().to_string();
        let prom_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = kiosk_controller::io::prometheus::start_metrics_server(
                prometheus_port,
                prom_metrics,
                prom_site,
                prom_shutdown,
            )
            .await
            {
                tracing::error!(error = %e, "Prometheus metrics server error");
            }
        });
    }

    // Start metrics reporter (lock-free reads with full summary)
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            // Catalog counts live in the controller; the report carries zeros
            // here and the display snapshot fills them in
            let summary = metrics_clone.report(0, 0);
            summary.log();
        }
    });

    // Poll the remote restock redirect flag and feed it into the same
    // activation path as the touch sequence (if enabled)
    let poll_secs = config.redirect_poll_secs();
    if poll_secs > 0 {
        let poll_backend = backend.clone();
        let poll_tx = event_tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(poll_secs));
            loop {
                interval.tick().await;
                match poll_backend.redirect_requested().await {
                    Ok(true) => {
                        let _ = poll_tx.try_send(ParsedEvent::new(EventType::RemoteActivation));
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, "redirect_poll_failed");
                    }
                }
            }
        });
    }

    // Fetch the door catalog at boot and refresh it periodically
    let refresh_tx = backend_tx.clone();
    let refresh_secs = config.refresh_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(refresh_secs.max(1)));
        loop {
            interval.tick().await;
            let _ = refresh_tx.send(BackendCmd::RefreshDoors).await;
        }
    });

    // Create display channel and publisher (if enabled)
    let display_sender = if config.display_enabled() {
        let (display_sender, display_rx) =
            create_display_channel(1000, config.site_id().to_string());

        // Start MQTT display publisher
        let publisher = DisplayPublisher::new(&config, display_rx);
        let publisher_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            publisher.run(publisher_shutdown).await;
        });

        // Start metrics display publisher (separate from logging)
        let metrics_display = display_sender.clone();
        let metrics_for_display = metrics.clone();
        let display_interval = config.display_metrics_interval_secs();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(display_interval));
            loop {
                interval.tick().await;
                let snapshot = metrics_for_display.snapshot();
                let state = if snapshot.session_state
                    == kiosk_controller::infra::metrics::SESSION_STATE_IDLE
                {
                    "idle"
                } else {
                    "active"
                };
                let summary = metrics_for_display.report(0, 0);
                metrics_display.send_metrics(summary, state);
            }
        });

        Some(display_sender)
    } else {
        None
    };

    // Start controller (main event processing loop)
    let mut controller = KioskController::new(config, backend_tx, metrics, display_sender)?;
    info!("kiosk_controller_started");

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run controller - consumes events until channel closes
    controller.run(event_rx).await;

    info!("kiosk-controller shutdown complete");
    Ok(())
}
