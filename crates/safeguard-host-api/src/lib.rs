//! Collaborator interfaces for the safeguard engine
//!
//! This crate defines the capability-based boundary between the enforcement
//! core and the platform: presenting the block surface, querying the
//! foreground app, positioning providers, and the block log. It contains no
//! platform code itself.

mod capabilities;
mod location;
mod mock;
mod traits;

pub use capabilities::*;
pub use location::*;
pub use mock::*;
pub use traits::*;
