//! Receipt model for confirmed purchases

use crate::domain::types::{DoorId, PaymentMethod, PurchaseOutcome};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Controller-side record of a server-confirmed purchase
///
/// The backend owns the real sales ledger; this is the kiosk's local
/// append-only trail for reconciliation.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub rid: String, // UUIDv7 receipt ID
    pub ts: u64,     // epoch ms
    pub door: DoorId,
    pub method: PaymentMethod,
    pub price_cents: Option<u64>,
    /// Remaining stock the server reported after the sale
    pub remaining_stock: Option<u32>,
}

impl Receipt {
    pub fn from_outcome(outcome: &PurchaseOutcome, price_cents: Option<u64>) -> Self {
        Self {
            rid: new_uuid_v7(),
            ts: epoch_ms(),
            door: outcome.door.clone(),
            method: outcome.method,
            price_cents,
            remaining_stock: outcome.remaining_stock,
        }
    }

    /// Serialize to a single JSON object (one line in the receipt log)
    pub fn to_json(&self) -> String {
        self.to_json_with_site(None)
    }

    /// Serialize with an optional site identifier for multi-kiosk fleets
    pub fn to_json_with_site(&self, site: Option<&str>) -> String {
        let mut obj = serde_json::Map::new();
        if let Some(site) = site {
            obj.insert("site".to_string(), serde_json::Value::String(site.to_string()));
        }
        obj.insert("rid".to_string(), serde_json::Value::String(self.rid.clone()));
        obj.insert("ts".to_string(), serde_json::Value::Number(self.ts.into()));
        obj.insert("door".to_string(), serde_json::Value::String(self.door.0.clone()));
        obj.insert(
            "method".to_string(),
            serde_json::Value::String(self.method.as_str().to_string()),
        );
        if let Some(price) = self.price_cents {
            obj.insert("price_cents".to_string(), serde_json::Value::Number(price.into()));
        }
        if let Some(remaining) = self.remaining_stock {
            obj.insert("remaining".to_string(), serde_json::Value::Number(remaining.into()));
        }
        serde_json::Value::Object(obj).to_string()
    }
}
