//! Shared types for safeguard
//!
//! This crate defines the vocabulary shared by the engine and its collaborators:
//! - Foreground events and block decisions
//! - Location fixes, providers, and the geofence
//! - Verification and presentation states
//! - The NDJSON signal records replayed into the service

mod events;
mod types;

pub use events::*;
pub use types::*;
