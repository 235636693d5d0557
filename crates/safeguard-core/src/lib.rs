//! Access enforcement engine for safeguard
//!
//! This crate is the heart of safeguard, containing:
//! - Location gate (best-fix arbitration, geofence evaluation)
//! - Block/allow decision per foreground change
//! - Block presentation (absorb → home → message → dismiss) with debounce
//! - Verification state machine (Armed -> Checking -> Succeeded | Failed)
//! - A single timer queue with cancel groups, driven by monotonic time

mod actuator;
mod decider;
mod engine;
mod events;
mod location;
mod scheduler;
mod verification;

pub use actuator::*;
pub use decider::*;
pub use engine::*;
pub use events::*;
pub use location::*;
pub use scheduler::*;
pub use verification::*;
