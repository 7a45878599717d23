//! Local door catalog with optimistic stock reconciliation
//!
//! Mirrors the backend's door/product table. Snapshots from the backend
//! replace the mirror wholesale; purchase results reconcile single doors,
//! preferring the server-confirmed remaining stock over the optimistic
//! decrement.

use crate::domain::catalog::{Door, DoorState};
use crate::domain::types::DoorId;
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub struct DoorCatalog {
    doors: HashMap<DoorId, Door>,
}

impl DoorCatalog {
    pub fn new() -> Self {
        Self { doors: HashMap::new() }
    }

    /// Replace the mirror with a server-confirmed snapshot
    pub fn apply_snapshot(&mut self, doors: HashMap<DoorId, Door>) {
        info!(doors = %doors.len(), "catalog_snapshot_applied");
        self.doors = doors;
    }

    pub fn get(&self, door: &DoorId) -> Option<&Door> {
        self.doors.get(door)
    }

    /// Whether the door can be selected for purchase right now.
    /// Unknown doors are not selectable (they may still be part of the
    /// secret sequence).
    pub fn is_selectable(&self, door: &DoorId) -> bool {
        self.doors.get(door).is_some_and(Door::is_selectable)
    }

    pub fn price_cents(&self, door: &DoorId) -> Option<u64> {
        self.doors.get(door).and_then(|d| d.product.as_ref()).map(|p| p.price_cents)
    }

    pub fn stock(&self, door: &DoorId) -> Option<u32> {
        self.doors.get(door).and_then(|d| d.product.as_ref()).map(|p| p.stock)
    }

    /// Reconcile a door after a confirmed sale.
    ///
    /// The server-confirmed remaining stock is authoritative when present;
    /// otherwise fall back to an optimistic decrement. Returns the door's
    /// new derived state.
    pub fn apply_purchase(&mut self, door: &DoorId, remaining: Option<u32>) -> Option<DoorState> {
        let Some(entry) = self.doors.get_mut(door) else {
            warn!(door = %door, "purchase_for_unknown_door");
            return None;
        };
        let Some(product) = entry.product.as_mut() else {
            warn!(door = %door, "purchase_for_empty_door");
            return None;
        };

        match remaining {
            Some(server_stock) => {
                if server_stock + 1 != product.stock {
                    debug!(
                        door = %door,
                        local = %product.stock,
                        server = %server_stock,
                        "stock_drift_corrected"
                    );
                }
                product.stock = server_stock;
            }
            None => {
                product.stock = product.stock.saturating_sub(1);
            }
        }

        let state = entry.state();
        info!(
            door = %door,
            stock = %entry.product.as_ref().map(|p| p.stock).unwrap_or(0),
            state = %state.as_str(),
            "catalog_reconciled"
        );
        Some(state)
    }

    pub fn len(&self) -> usize {
        self.doors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doors.is_empty()
    }

    /// Count of doors currently selectable (for metrics reporting)
    pub fn selectable_count(&self) -> usize {
        self.doors.values().filter(|d| d.is_selectable()).count()
    }

    /// Door ids in the catalog (for metrics registration)
    pub fn door_ids(&self) -> Vec<DoorId> {
        self.doors.keys().cloned().collect()
    }
}

impl Default for DoorCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::Product;

    fn snapshot() -> HashMap<DoorId, Door> {
        let mut doors = HashMap::new();
        doors.insert(
            DoorId::from("A1"),
            Door {
                enabled: true,
                product: Some(Product {
                    name: "Cola".to_string(),
                    price_cents: 250,
                    stock: 3,
                    min_stock: 1,
                }),
            },
        );
        doors.insert(DoorId::from("B2"), Door { enabled: true, product: None });
        doors
    }

    #[test]
    fn test_snapshot_replaces_mirror() {
        let mut catalog = DoorCatalog::new();
        assert!(catalog.is_empty());

        catalog.apply_snapshot(snapshot());
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.selectable_count(), 1);
    }

    #[test]
    fn test_selectable_gating() {
        let mut catalog = DoorCatalog::new();
        catalog.apply_snapshot(snapshot());

        assert!(catalog.is_selectable(&DoorId::from("A1")));
        assert!(!catalog.is_selectable(&DoorId::from("B2"))); // empty door
        assert!(!catalog.is_selectable(&DoorId::from("X9"))); // unknown door
    }

    #[test]
    fn test_purchase_with_server_stock() {
        let mut catalog = DoorCatalog::new();
        catalog.apply_snapshot(snapshot());

        // Server says 1 remaining even though local mirror had 3: server wins
        let state = catalog.apply_purchase(&DoorId::from("A1"), Some(1));
        assert_eq!(state, Some(DoorState::LowStock));
        assert_eq!(catalog.stock(&DoorId::from("A1")), Some(1));
    }

    #[test]
    fn test_purchase_optimistic_decrement() {
        let mut catalog = DoorCatalog::new();
        catalog.apply_snapshot(snapshot());

        let state = catalog.apply_purchase(&DoorId::from("A1"), None);
        assert_eq!(catalog.stock(&DoorId::from("A1")), Some(2));
        assert_eq!(state, Some(DoorState::Available));
    }

    #[test]
    fn test_purchase_to_zero_marks_out_of_stock() {
        let mut catalog = DoorCatalog::new();
        catalog.apply_snapshot(snapshot());

        let state = catalog.apply_purchase(&DoorId::from("A1"), Some(0));
        assert_eq!(state, Some(DoorState::OutOfStock));
        assert!(!catalog.is_selectable(&DoorId::from("A1")));
    }

    #[test]
    fn test_purchase_unknown_door_ignored() {
        let mut catalog = DoorCatalog::new();
        catalog.apply_snapshot(snapshot());

        assert_eq!(catalog.apply_purchase(&DoorId::from("Z9"), Some(1)), None);
        assert_eq!(catalog.apply_purchase(&DoorId::from("B2"), Some(1)), None);
    }

    #[test]
    fn test_optimistic_decrement_saturates() {
        let mut catalog = DoorCatalog::new();
        catalog.apply_snapshot(snapshot());

        catalog.apply_purchase(&DoorId::from("A1"), Some(0));
        // Another decrement without server stock must not underflow
        catalog.apply_purchase(&DoorId::from("A1"), None);
        assert_eq!(catalog.stock(&DoorId::from("A1")), Some(0));
    }
}
