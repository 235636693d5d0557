//! Shared utilities for safeguard
//!
//! This crate provides:
//! - ID types (PackageId, SessionId, PresentationId)
//! - Time utilities (monotonic time, mockable wall clock)
//! - Error types
//! - Default paths for config and data directories

mod error;
mod ids;
mod paths;
mod time;

pub use error::*;
pub use ids::*;
pub use paths::*;
pub use time::*;
