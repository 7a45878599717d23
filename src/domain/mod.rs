//! Domain models - core types for the kiosk controller
//!
//! This module contains the canonical data types used throughout the system:
//! - `DoorId` - addressable dispensing unit key ("A1", "B2", ...)
//! - `Door`/`Product` - catalog entries mirrored from the vending backend
//! - `ParsedEvent`/`EventType` - input events from the touch surfaces
//! - `SessionState` - Active/Idle session classification
//! - `Receipt` - controller-side record of a confirmed purchase

pub mod catalog;
pub mod receipt;
pub mod types;
