//! Validated policy structures

use crate::schema::{RawConfig, RawDaemonConfig, RawEnforcement, RawLocation, RawPolicy};
use safeguard_api::Geofence;
use safeguard_util::{PackageId, data_dir_without_env};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Packages that keep the device usable. These are never blocked, and any
/// package inside one of these families is exempt too.
pub const SYSTEM_CRITICAL_PACKAGES: &[&str] = &[
    "com.android.systemui",
    "android",
    "com.android.phone",
    "com.android.settings",
    "com.android.launcher",
    "com.android.launcher3",
    "com.sec.android.app.launcher",
    "com.android.dialer",
    "com.google.android.gms",
    "com.android.packageinstaller",
    "com.android.emergency",
    "com.android.incallui",
];

pub fn is_system_critical(package: &PackageId) -> bool {
    SYSTEM_CRITICAL_PACKAGES
        .iter()
        .any(|root| package.belongs_to(root))
}

/// Default package id of safeguard itself
pub const DEFAULT_OWN_PACKAGE: &str = "com.example.safeguard";

/// Default allowed radius when only a center is configured
pub const DEFAULT_RADIUS_M: f64 = 100.0;

/// Fully validated configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub daemon: DaemonConfig,
    pub timings: EnforcementTimings,
    pub policy: Policy,
}

impl Config {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            daemon: DaemonConfig::from_raw(raw.daemon),
            timings: EnforcementTimings::from_raw(&raw.enforcement, &raw.location),
            policy: Policy::from_raw(raw.policy, raw.location),
        }
    }
}

/// Snapshot of what to block. Read fresh for every foreground event.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    /// Master switch
    pub enforcement_enabled: bool,
    pub blocked_packages: HashSet<PackageId>,
    pub hidden_packages: HashSet<PackageId>,
    pub hide_mode_active: bool,
    pub geofence: Option<Geofence>,
    pub location_gate_enabled: bool,
}

impl Policy {
    fn from_raw(raw: RawPolicy, location: RawLocation) -> Self {
        let geofence = match (location.latitude, location.longitude) {
            (Some(lat), Some(lng)) => Some(Geofence::new(
                lat,
                lng,
                location.radius_m.unwrap_or(DEFAULT_RADIUS_M),
            )),
            _ => None,
        };

        Self {
            enforcement_enabled: raw.enabled.unwrap_or(true),
            blocked_packages: raw.blocked.into_iter().map(PackageId::new).collect(),
            hidden_packages: raw.hidden.into_iter().map(PackageId::new).collect(),
            hide_mode_active: raw.hide_mode_active,
            geofence,
            location_gate_enabled: location.gate_enabled,
        }
    }

    pub fn is_blocked(&self, package: &PackageId) -> bool {
        self.blocked_packages.contains(package)
    }

    pub fn is_hidden(&self, package: &PackageId) -> bool {
        self.hidden_packages.contains(package)
    }

    /// Geofence that is actually usable (present and not the 0,0 sentinel)
    pub fn configured_geofence(&self) -> Option<&Geofence> {
        self.geofence.as_ref().filter(|g| g.is_configured())
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            enforcement_enabled: true,
            blocked_packages: HashSet::new(),
            hidden_packages: HashSet::new(),
            hide_mode_active: false,
            geofence: None,
            location_gate_enabled: false,
        }
    }
}

/// Presentation and verification timings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnforcementTimings {
    /// Absorbing surface mounted → send the user home
    pub home_delay: Duration,
    /// Absorbing surface mounted → show the block message
    pub message_delay: Duration,
    /// Absorbing surface mounted → dismiss automatically
    pub auto_dismiss: Duration,
    /// Repeat activations this soon after a close are dropped
    pub debounce: Duration,
    pub verify_grace: Duration,
    pub verify_interval: Duration,
    pub verify_budget: Duration,
    pub verify_max_attempts: u32,
    /// Fixes older than this count as no fix
    pub max_fix_age: Duration,
}

impl EnforcementTimings {
    fn from_raw(raw: &RawEnforcement, location: &RawLocation) -> Self {
        let d = Self::default();
        let ms = |v: Option<u64>, default: Duration| v.map(Duration::from_millis).unwrap_or(default);

        Self {
            home_delay: ms(raw.home_delay_ms, d.home_delay),
            message_delay: ms(raw.message_delay_ms, d.message_delay),
            auto_dismiss: ms(raw.auto_dismiss_ms, d.auto_dismiss),
            debounce: ms(raw.debounce_ms, d.debounce),
            verify_grace: ms(raw.verify_grace_ms, d.verify_grace),
            verify_interval: ms(raw.verify_interval_ms, d.verify_interval),
            verify_budget: ms(raw.verify_budget_ms, d.verify_budget),
            verify_max_attempts: raw.verify_max_attempts.unwrap_or(d.verify_max_attempts),
            max_fix_age: ms(location.max_fix_age_ms, d.max_fix_age),
        }
    }
}

impl Default for EnforcementTimings {
    fn default() -> Self {
        Self {
            home_delay: Duration::from_millis(350),
            message_delay: Duration::from_millis(450),
            auto_dismiss: Duration::from_secs(30),
            debounce: Duration::from_millis(1000),
            verify_grace: Duration::from_secs(3),
            verify_interval: Duration::from_secs(1),
            verify_budget: Duration::from_secs(10),
            verify_max_attempts: 5,
            max_fix_age: Duration::from_millis(300_000),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub data_dir: PathBuf,
    pub own_package: PackageId,
    pub tick_interval: Duration,
    pub fix_timeout: Duration,
}

impl DaemonConfig {
    fn from_raw(raw: RawDaemonConfig) -> Self {
        let d = Self::default();
        Self {
            data_dir: raw.data_dir.unwrap_or(d.data_dir),
            own_package: raw.own_package.map(PackageId::new).unwrap_or(d.own_package),
            tick_interval: raw
                .tick_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(d.tick_interval),
            fix_timeout: raw
                .fix_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(d.fix_timeout),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: data_dir_without_env(),
            own_package: PackageId::new(DEFAULT_OWN_PACKAGE),
            tick_interval: Duration::from_millis(50),
            fix_timeout: Duration::from_secs(30),
        }
    }
}
