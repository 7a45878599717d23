//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `kiosk` - Central event orchestrator and selection state management
//! - `sequence` - Secret touch-sequence detection for restock mode
//! - `session` - Idle/screensaver session timer
//! - `catalog` - Local door catalog with optimistic stock reconciliation

pub mod catalog;
pub mod kiosk;
pub mod sequence;
pub mod session;

// Re-export commonly used types
pub use catalog::DoorCatalog;
pub use kiosk::KioskController;
pub use sequence::{SequenceDetector, SequenceOutcome, SequenceProgress};
pub use session::{ActivityOutcome, SessionTimer};
