//! kaskade-core – Gemeinsame Typen, Events und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Kaskade-Crates gemeinsam genutzt werden.

pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{KaskadeError, Result};
pub use event::RelayEvent;
pub use types::{LinkArt, RaumId, TeilnehmerId};
