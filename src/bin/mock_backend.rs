//! Mock Vending Backend HTTP Server
//!
//! Simulates the vending backend REST API for local testing.
//!
//! Endpoints:
//! - GET  /api/doors - door/product/stock snapshot
//! - POST /api/purchase - decrement stock, return remaining
//! - GET  /api/restock/redirect-status - remote restock flag
//! - POST /api/restock/request-redirect - set the flag (curl this to test)
//! - POST /api/restock/clear-redirect - clear the flag
//! - POST /api/test/dispense/{door} - GPIO test cycle (logged only)
//! - POST /api/hardware/door/{door}/close - door close (logged only)
//!
//! Usage:
//!   cargo run --bin mock_backend -- --port 5000

use bytes::Bytes;
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser, Debug)]
#[command(name = "mock_backend")]
#[command(about = "Mock vending backend for local simulation")]
struct Args {
    /// HTTP port to listen on
    #[arg(short, long, default_value = "5000")]
    port: u16,

    /// Initial stock per door
    #[arg(long, default_value = "5")]
    stock: u32,

    /// Simulated payment processing delay (ms)
    #[arg(long, default_value = "400")]
    payment_delay_ms: u64,
}

/// One mock door entry
#[derive(Debug, Clone)]
struct MockDoor {
    name: String,
    price_cents: u64,
    stock: u32,
    min_stock: u32,
    enabled: bool,
}

/// Shared mutable backend state
#[derive(Debug)]
struct MockState {
    doors: BTreeMap<String, MockDoor>,
    redirect_requested: bool,
    purchases: u64,
}

impl MockState {
    fn new(stock: u32) -> Self {
        let mut doors = BTreeMap::new();
        for (i, id) in ["A1", "B2", "C3", "D4", "A2", "B3", "C1", "D2"].iter().enumerate() {
            doors.insert(
                id.to_string(),
                MockDoor {
                    name: format!("Product {}", i + 1),
                    price_cents: 150 + (i as u64) * 50,
                    stock,
                    min_stock: 1,
                    enabled: true,
                },
            );
        }
        // One deliberately empty door so the grid has a dead square
        doors.insert(
            "E5".to_string(),
            MockDoor {
                name: String::new(),
                price_cents: 0,
                stock: 0,
                min_stock: 0,
                enabled: false,
            },
        );
        Self { doors, redirect_requested: false, purchases: 0 }
    }

    fn doors_json(&self) -> Value {
        let doors: serde_json::Map<String, Value> = self
            .doors
            .iter()
            .map(|(id, door)| {
                let product = if door.enabled {
                    json!({
                        "name": door.name,
                        "price_cents": door.price_cents,
                        "stock": door.stock,
                        "min_stock": door.min_stock,
                    })
                } else {
                    Value::Null
                };
                (id.clone(), json!({"enabled": door.enabled, "product": product}))
            })
            .collect();
        json!({"success": true, "doors": doors})
    }
}

fn json_response(status: StatusCode, body: Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .expect("static response should not fail")
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<Mutex<MockState>>,
    payment_delay_ms: u64,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/api/doors") => {
            let state = state.lock();
            json_response(StatusCode::OK, state.doors_json())
        }

        (&Method::POST, "/api/purchase") => {
            let body = req.collect().await.map(|b| b.to_bytes()).unwrap_or_default();
            let parsed: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
            let door_id = parsed["door_id"].as_str().unwrap_or("").to_string();
            let method_name = parsed["payment_method"].as_str().unwrap_or("?").to_string();

            // Simulate the payment round-trip before touching stock
            tokio::time::sleep(std::time::Duration::from_millis(payment_delay_ms)).await;

            let mut guard = state.lock();
            let state = &mut *guard;
            match state.doors.get_mut(&door_id) {
                Some(door) if door.enabled && door.stock > 0 => {
                    door.stock -= 1;
                    let remaining = door.stock;
                    state.purchases += 1;
                    println!(
                        "purchase door={} method={} remaining={}",
                        door_id, method_name, remaining
                    );
                    json_response(
                        StatusCode::OK,
                        json!({"success": true, "remaining_stock": remaining}),
                    )
                }
                Some(_) => json_response(
                    StatusCode::OK,
                    json!({"success": false, "error": "out of stock"}),
                ),
                None => json_response(
                    StatusCode::OK,
                    json!({"success": false, "error": "unknown door"}),
                ),
            }
        }

        (&Method::GET, "/api/restock/redirect-status") => {
            let state = state.lock();
            json_response(
                StatusCode::OK,
                json!({"success": true, "redirect_requested": state.redirect_requested}),
            )
        }

        (&Method::POST, "/api/restock/request-redirect") => {
            state.lock().redirect_requested = true;
            println!("redirect flag set");
            json_response(StatusCode::OK, json!({"success": true}))
        }

        (&Method::POST, "/api/restock/clear-redirect") => {
            state.lock().redirect_requested = false;
            println!("redirect flag cleared");
            json_response(StatusCode::OK, json!({"success": true}))
        }

        _ if method == Method::POST && path.starts_with("/api/test/dispense/") => {
            let door = path.trim_start_matches("/api/test/dispense/");
            println!("test dispense door={}", door);
            json_response(StatusCode::OK, json!({"success": true}))
        }

        _ if method == Method::POST
            && path.starts_with("/api/hardware/door/")
            && path.ends_with("/close") =>
        {
            let door = path
                .trim_start_matches("/api/hardware/door/")
                .trim_end_matches("/close");
            println!("door close door={}", door);
            json_response(StatusCode::OK, json!({"success": true}))
        }

        _ => json_response(
            StatusCode::NOT_FOUND,
            json!({"success": false, "error": "not found"}),
        ),
    };

    Ok(response)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let state = Arc::new(Mutex::new(MockState::new(args.stock)));

    let addr: SocketAddr = ([0, 0, 0, 0], args.port).into();
    let listener = TcpListener::bind(addr).await?;
    println!(
        "mock backend listening on :{} ({} doors, stock {})",
        args.port,
        state.lock().doors.len(),
        args.stock
    );

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = state.clone();
        let delay = args.payment_delay_ms;
        tokio::spawn(async move {
            let service =
                service_fn(move |req| handle_request(req, state.clone(), delay));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                eprintln!("connection error: {e}");
            }
        });
    }
}
