//! Shared types for the kiosk controller

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

use crate::domain::catalog::Door;

/// Newtype wrapper for door identifiers to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DoorId(pub String);

impl DoorId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DoorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DoorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Session classification for the idle/screensaver machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Idle,
}

impl SessionState {
    pub fn as_str(&self) -> &str {
        match self {
            SessionState::Active => "active",
            SessionState::Idle => "idle",
        }
    }
}

/// Payment method selected on the touch surface
///
/// The backend validates and executes the payment; the controller only
/// relays the method string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMethod {
    Cash,
    Card,
    Contactless,
    Paypal,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Contactless => "contactless",
            PaymentMethod::Paypal => "paypal",
        }
    }

    /// Parse a method string; unknown methods are rejected at ingress
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cash" => Some(PaymentMethod::Cash),
            "card" => Some(PaymentMethod::Card),
            "contactless" => Some(PaymentMethod::Contactless),
            "paypal" => Some(PaymentMethod::Paypal),
            _ => None,
        }
    }
}

/// Result of a purchase command, relayed from the backend worker
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseOutcome {
    pub door: DoorId,
    pub method: PaymentMethod,
    pub success: bool,
    /// Server-confirmed remaining stock (authoritative when present)
    pub remaining_stock: Option<u32>,
    pub error: Option<String>,
}

/// Touch surface message structure for parsing (MQTT JSON payloads)
#[derive(Debug, Deserialize)]
pub struct TouchMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub door: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
}

/// Parsed event for internal processing
#[derive(Debug, Clone)]
pub struct ParsedEvent {
    pub event_type: EventType,
    pub received_at: Instant,
}

impl ParsedEvent {
    pub fn new(event_type: EventType) -> Self {
        Self { event_type, received_at: Instant::now() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventType {
    /// A door square was touched (fed to selection AND the sequence detector)
    DoorTouch(DoorId),
    /// Generic qualifying activity (pointer/key/touch anywhere)
    Activity,
    /// The user dismissed the current selection
    Cancel,
    /// The touch surface requested a purchase of the current selection
    PurchaseRequest(PaymentMethod),
    /// Backend worker finished a purchase attempt
    PurchaseResult(PurchaseOutcome),
    /// Fresh door/stock snapshot from the backend
    DoorsSnapshot(HashMap<DoorId, Door>),
    /// Remote restock redirect flag observed on the backend
    RemoteActivation,
    Unknown(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::DoorTouch(_) => "door_touch",
            EventType::Activity => "activity",
            EventType::Cancel => "cancel",
            EventType::PurchaseRequest(_) => "purchase_request",
            EventType::PurchaseResult(_) => "purchase_result",
            EventType::DoorsSnapshot(_) => "doors_snapshot",
            EventType::RemoteActivation => "remote_activation",
            EventType::Unknown(s) => s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_method_parse() {
        assert_eq!(PaymentMethod::parse("contactless"), Some(PaymentMethod::Contactless));
        assert_eq!(PaymentMethod::parse("cash"), Some(PaymentMethod::Cash));
        assert_eq!(PaymentMethod::parse("bitcoin"), None);
        assert_eq!(PaymentMethod::parse(""), None);
    }

    #[test]
    fn test_door_id_display() {
        let door = DoorId::from("A1");
        assert_eq!(door.to_string(), "A1");
        assert_eq!(door.as_str(), "A1");
    }

    #[test]
    fn test_session_state_as_str() {
        assert_eq!(SessionState::Active.as_str(), "active");
        assert_eq!(SessionState::Idle.as_str(), "idle");
    }
}
