//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Service-level settings
    #[serde(default)]
    pub daemon: RawDaemonConfig,

    /// Presentation and verification timings
    #[serde(default)]
    pub enforcement: RawEnforcement,

    /// What to block
    #[serde(default)]
    pub policy: RawPolicy,

    /// Allowed area
    #[serde(default)]
    pub location: RawLocation,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawDaemonConfig {
    /// Data directory for the block log
    pub data_dir: Option<PathBuf>,

    /// Package id of safeguard itself (never blocked)
    pub own_package: Option<String>,

    /// Engine tick interval in milliseconds
    pub tick_interval_ms: Option<u64>,

    /// How long to wait for a single provider fix
    pub fix_timeout_ms: Option<u64>,
}

/// Enforcement timings, all in milliseconds
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawEnforcement {
    pub home_delay_ms: Option<u64>,
    pub message_delay_ms: Option<u64>,
    pub auto_dismiss_ms: Option<u64>,
    pub debounce_ms: Option<u64>,
    pub verify_grace_ms: Option<u64>,
    pub verify_interval_ms: Option<u64>,
    pub verify_budget_ms: Option<u64>,
    pub verify_max_attempts: Option<u32>,
}

/// Block lists
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawPolicy {
    /// Master switch. Defaults to enabled.
    pub enabled: Option<bool>,

    /// Packages blocked outside the allowed area
    #[serde(default)]
    pub blocked: Vec<String>,

    /// Packages blocked everywhere while hide mode is active
    #[serde(default)]
    pub hidden: Vec<String>,

    #[serde(default)]
    pub hide_mode_active: bool,
}

/// Geofence settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawLocation {
    #[serde(default)]
    pub gate_enabled: bool,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    /// Allowed radius in meters (default 100)
    pub radius_m: Option<f64>,

    /// Fixes older than this are treated as no fix at all
    pub max_fix_age_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
            config_version = 1

            [daemon]
            own_package = "com.example.safeguard"

            [enforcement]
            home_delay_ms = 350
            verify_max_attempts = 5

            [policy]
            blocked = ["com.example.chat", "com.example.video"]
            hidden = ["com.example.secret"]
            hide_mode_active = true

            [location]
            gate_enabled = true
            latitude = 47.6062
            longitude = -122.3321
            radius_m = 250.0
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.policy.blocked.len(), 2);
        assert!(config.policy.hide_mode_active);
        assert_eq!(config.enforcement.home_delay_ms, Some(350));
        assert_eq!(config.location.radius_m, Some(250.0));
        assert_eq!(config.daemon.own_package.as_deref(), Some("com.example.safeguard"));
    }

    #[test]
    fn sections_are_optional() {
        let config: RawConfig = toml::from_str("config_version = 1").unwrap();
        assert!(config.policy.blocked.is_empty());
        assert!(config.policy.enabled.is_none());
        assert!(!config.location.gate_enabled);
    }
}
