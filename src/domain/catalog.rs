//! Catalog entries mirrored from the vending backend
//!
//! The backend owns the authoritative door/product/stock table; the
//! controller keeps a local mirror for selection gating and optimistic
//! display updates.

use serde::{Deserialize, Serialize};

/// Product loaded in a door
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    /// Price in cents (avoids float money)
    pub price_cents: u64,
    pub stock: u32,
    #[serde(default)]
    pub min_stock: u32,
}

/// A dispensing door and its current contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Door {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub product: Option<Product>,
}

fn default_enabled() -> bool {
    true
}

/// Derived availability of a door, recomputed after every mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorState {
    Available,
    LowStock,
    OutOfStock,
    Disabled,
}

impl DoorState {
    pub fn as_str(&self) -> &str {
        match self {
            DoorState::Available => "available",
            DoorState::LowStock => "low_stock",
            DoorState::OutOfStock => "out_of_stock",
            DoorState::Disabled => "disabled",
        }
    }
}

impl Door {
    /// Compute the derived state the same way the backend does:
    /// disabled or empty door wins, then stock 0, then low-stock threshold.
    pub fn state(&self) -> DoorState {
        if !self.enabled {
            return DoorState::Disabled;
        }
        match &self.product {
            None => DoorState::Disabled,
            Some(p) if p.stock == 0 => DoorState::OutOfStock,
            Some(p) if p.stock <= p.min_stock => DoorState::LowStock,
            Some(_) => DoorState::Available,
        }
    }

    /// A door can be selected for purchase when it has sellable stock
    pub fn is_selectable(&self) -> bool {
        matches!(self.state(), DoorState::Available | DoorState::LowStock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn door_with_stock(stock: u32, min_stock: u32) -> Door {
        Door {
            enabled: true,
            product: Some(Product {
                name: "Cola".to_string(),
                price_cents: 250,
                stock,
                min_stock,
            }),
        }
    }

    #[test]
    fn test_state_available() {
        assert_eq!(door_with_stock(10, 2).state(), DoorState::Available);
    }

    #[test]
    fn test_state_low_stock() {
        assert_eq!(door_with_stock(2, 2).state(), DoorState::LowStock);
        assert_eq!(door_with_stock(1, 2).state(), DoorState::LowStock);
    }

    #[test]
    fn test_state_out_of_stock() {
        assert_eq!(door_with_stock(0, 2).state(), DoorState::OutOfStock);
    }

    #[test]
    fn test_state_disabled() {
        let door = Door { enabled: false, product: None };
        assert_eq!(door.state(), DoorState::Disabled);

        let empty = Door { enabled: true, product: None };
        assert_eq!(empty.state(), DoorState::Disabled);
    }

    #[test]
    fn test_selectable() {
        assert!(door_with_stock(10, 2).is_selectable());
        assert!(door_with_stock(1, 2).is_selectable());
        assert!(!door_with_stock(0, 2).is_selectable());
        assert!(!Door { enabled: false, product: None }.is_selectable());
    }

    #[test]
    fn test_door_deserialize_defaults() {
        // enabled defaults to true, product to None
        let door: Door = serde_json::from_str("{}").unwrap();
        assert!(door.enabled);
        assert!(door.product.is_none());
    }
}
