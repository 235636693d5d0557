//! Host capabilities model

use serde::{Deserialize, Serialize};

/// Describes which platform permissions the engine was granted.
///
/// Missing capabilities never stop enforcement; they select the conservative
/// fallback for the affected signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCapabilities {
    /// Can query the current foreground app (usage access)
    pub can_query_foreground: bool,

    /// Can draw the absorbing surface over other apps
    pub can_draw_overlay: bool,

    /// Can request location fixes
    pub can_access_location: bool,

    /// Can open the system app-details page
    pub can_open_app_details: bool,
}

impl HostCapabilities {
    /// Nothing granted. Verification treats the foreground as unknown.
    pub fn minimal() -> Self {
        Self {
            can_query_foreground: false,
            can_draw_overlay: false,
            can_access_location: false,
            can_open_app_details: false,
        }
    }

    /// Every permission granted
    pub fn full() -> Self {
        Self {
            can_query_foreground: true,
            can_draw_overlay: true,
            can_access_location: true,
            can_open_app_details: true,
        }
    }

    /// Names of the capabilities that are missing, for startup warnings
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.can_query_foreground {
            missing.push("foreground query");
        }
        if !self.can_draw_overlay {
            missing.push("overlay");
        }
        if !self.can_access_location {
            missing.push("location");
        }
        if !self.can_open_app_details {
            missing.push("app details");
        }
        missing
    }
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self::full()
    }
}
