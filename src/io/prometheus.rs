//! Prometheus metrics HTTP endpoint
//!
//! Exposes kiosk metrics in Prometheus text format at /metrics.
//! Uses hyper for the HTTP server. Scrapes read a non-resetting snapshot,
//! so they never disturb the periodic log reporter.

use crate::infra::metrics::{Metrics, MetricsSnapshot, SESSION_STATE_IDLE};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write the per-door touch counter family
fn write_door_touches(output: &mut String, site: &str, door_touches: &[(String, u64)]) {
    let name = "kiosk_door_touches_total";
    let _ = writeln!(output, "# HELP {name} Door touches by door id");
    let _ = writeln!(output, "# TYPE {name} counter");
    for (door, count) in door_touches {
        let _ = writeln!(output, "{name}{{site=\"{site}\",door=\"{door}\"}} {count}");
    }
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(snapshot: &MetricsSnapshot, site_id: &str) -> String {
    let mut output = String::with_capacity(4096);
    let s = snapshot;

    write_metric(
        &mut output,
        "kiosk_events_total",
        "Total input events processed",
        MetricType::Counter,
        site_id,
        s.events_total,
    );
    write_metric(
        &mut output,
        "kiosk_touches_total",
        "Total door touches observed",
        MetricType::Counter,
        site_id,
        s.touches_total,
    );
    write_door_touches(&mut output, site_id, &s.door_touches);
    write_metric(
        &mut output,
        "kiosk_sequence_started_total",
        "Secret sequence attempts started",
        MetricType::Counter,
        site_id,
        s.sequence_started_total,
    );
    write_metric(
        &mut output,
        "kiosk_sequence_completed_total",
        "Secret sequence completions",
        MetricType::Counter,
        site_id,
        s.sequence_completed_total,
    );
    write_metric(
        &mut output,
        "kiosk_sequence_reset_total",
        "Secret sequence aborts on a wrong door",
        MetricType::Counter,
        site_id,
        s.sequence_reset_total,
    );
    write_metric(
        &mut output,
        "kiosk_sequence_timeout_total",
        "Secret sequence step-timeout expiries",
        MetricType::Counter,
        site_id,
        s.sequence_timeout_total,
    );
    write_metric(
        &mut output,
        "kiosk_remote_activations_total",
        "Restock activations from the remote redirect flag",
        MetricType::Counter,
        site_id,
        s.remote_activations_total,
    );
    write_metric(
        &mut output,
        "kiosk_idle_entered_total",
        "Transitions into the idle/screensaver state",
        MetricType::Counter,
        site_id,
        s.idle_entered_total,
    );
    write_metric(
        &mut output,
        "kiosk_wakes_total",
        "Wakes out of the idle state",
        MetricType::Counter,
        site_id,
        s.wake_total,
    );
    write_metric(
        &mut output,
        "kiosk_purchases_total",
        "Confirmed purchases",
        MetricType::Counter,
        site_id,
        s.purchases_total,
    );
    write_metric(
        &mut output,
        "kiosk_purchase_failures_total",
        "Failed purchase attempts",
        MetricType::Counter,
        site_id,
        s.purchase_failures_total,
    );
    write_metric(
        &mut output,
        "kiosk_backend_cmds_total",
        "Backend REST commands sent",
        MetricType::Counter,
        site_id,
        s.backend_cmds_sent,
    );
    write_metric(
        &mut output,
        "kiosk_touch_events_dropped_total",
        "Touch events dropped on a full channel",
        MetricType::Counter,
        site_id,
        s.touch_events_dropped,
    );
    write_metric(
        &mut output,
        "kiosk_backend_cmds_dropped_total",
        "Backend commands dropped on a full channel",
        MetricType::Counter,
        site_id,
        s.backend_cmds_dropped,
    );
    write_metric(
        &mut output,
        "kiosk_event_queue_depth",
        "Current event channel depth",
        MetricType::Gauge,
        site_id,
        s.event_queue_depth,
    );
    write_metric(
        &mut output,
        "kiosk_backend_queue_depth",
        "Current backend command channel depth",
        MetricType::Gauge,
        site_id,
        s.backend_queue_depth,
    );
    write_metric(
        &mut output,
        "kiosk_session_idle",
        "Whether the session is idle (1) or active (0)",
        MetricType::Gauge,
        site_id,
        (s.session_state == SESSION_STATE_IDLE) as u64,
    );
    write_metric(
        &mut output,
        "kiosk_sequence_matched",
        "Current matched length of the secret sequence",
        MetricType::Gauge,
        site_id,
        s.sequence_matched,
    );
    write_metric(
        &mut output,
        "kiosk_selection_active",
        "Whether a door selection is live",
        MetricType::Gauge,
        site_id,
        s.selection_active,
    );

    output
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    site_id: String,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&metrics.snapshot(), &site_id);
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail"))
        }
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("not found")))
            .expect("static response should not fail")),
    }
}

/// Start the Prometheus metrics HTTP server
pub async fn start_metrics_server(
    port: u16,
    metrics: Arc<Metrics>,
    site_id: String,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let listener = TcpListener::bind(addr).await?;

    info!(port = %port, "metrics_server_started");

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("metrics_server_shutdown");
                    return Ok(());
                }
            }
            result = listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let site_id = site_id.clone();
                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                handle_request(req, metrics.clone(), site_id.clone())
                            });
                            if let Err(e) =
                                http1::Builder::new().serve_connection(io, service).await
                            {
                                error!(error = %e, "metrics_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "metrics_accept_failed");
                    }
                }
            }
        }
    }
}
