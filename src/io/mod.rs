//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `mqtt` - MQTT client for receiving touch surface events
//! - `touch_listener` - TCP listener for wired touch panels
//! - `display` - Typed channel for display commands
//! - `mqtt_egress` - MQTT publisher for display commands
//! - `backend` - REST client for the vending backend
//! - `backend_worker` - Async backend command worker
//! - `receipts` - Receipt output to file (JSONL format)
//! - `prometheus` - Prometheus metrics HTTP endpoint

pub mod backend;
pub mod backend_worker;
pub mod display;
pub mod mqtt;
pub mod mqtt_egress;
pub mod prometheus;
pub mod receipts;
pub mod touch_listener;

// Re-export commonly used types
pub use backend::BackendClient;
pub use backend_worker::{create_backend_worker, BackendCmd, BackendWorker};
pub use display::{
    create_display_channel, DisplaySender, PurchaseResultPayload, SelectionPayload,
    SequenceProgressPayload,
};
pub use mqtt_egress::DisplayPublisher;
pub use receipts::ReceiptLog;
pub use touch_listener::{start_touch_listener, TouchListenerConfig};
