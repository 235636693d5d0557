//! Shared types for the enforcement engine

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use safeguard_util::{PackageId, SessionId};
use std::fmt;
use std::time::Duration;

/// Positioning provider that produced a fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    /// Primary provider (satellite)
    Gps,
    /// Secondary provider (cell / wifi)
    Network,
    /// Piggybacks on fixes requested by other apps
    Passive,
}

impl ProviderId {
    pub const ALL: [ProviderId; 3] = [ProviderId::Gps, ProviderId::Network, ProviderId::Passive];
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderId::Gps => "gps",
            ProviderId::Network => "network",
            ProviderId::Passive => "passive",
        };
        f.write_str(name)
    }
}

/// A single position report. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Estimated horizontal accuracy radius in meters (smaller is better)
    pub accuracy_m: f32,
    pub timestamp: DateTime<Local>,
    pub provider: ProviderId,
}

impl LocationFix {
    /// Age of the fix relative to `now`. Fixes stamped in the future have zero age.
    pub fn age(&self, now: DateTime<Local>) -> Duration {
        (now - self.timestamp).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Allowed area: center coordinate plus radius
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_m: f64,
}

impl Geofence {
    pub fn new(latitude: f64, longitude: f64, radius_m: f64) -> Self {
        Self {
            latitude,
            longitude,
            radius_m,
        }
    }

    /// Settings storage uses (0, 0) to mean "no area configured"
    pub fn is_configured(&self) -> bool {
        !(self.latitude == 0.0 && self.longitude == 0.0)
    }
}

/// Observed app switch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForegroundEvent {
    pub package: PackageId,
    pub timestamp: DateTime<Local>,
}

impl ForegroundEvent {
    pub fn new(package: impl Into<PackageId>, timestamp: DateTime<Local>) -> Self {
        Self {
            package: package.into(),
            timestamp,
        }
    }
}

/// Result of querying the currently foregrounded app
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForegroundQuery {
    App(PackageId),
    /// Capability denied or no recent usage data
    Unknown,
}

impl ForegroundQuery {
    /// True only when the query positively identifies `package` as foreground
    pub fn is(&self, package: &PackageId) -> bool {
        matches!(self, ForegroundQuery::App(current) if current == package)
    }
}

/// Why a package was blocked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    Blocklist,
    Hidden,
    None,
}

/// Per-event enforcement verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDecision {
    pub package: PackageId,
    pub should_block: bool,
    pub reason: BlockReason,
}

impl BlockDecision {
    pub fn allow(package: PackageId) -> Self {
        Self {
            package,
            should_block: false,
            reason: BlockReason::None,
        }
    }

    pub fn block(package: PackageId, reason: BlockReason) -> Self {
        Self {
            package,
            should_block: true,
            reason,
        }
    }
}

/// Why the location gate reached its verdict
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocationAssessment {
    /// Location gate switched off in settings
    GateDisabled,
    /// No allowed area configured
    GeofenceUnset,
    /// No fix has ever been obtained
    NoFix,
    /// Best fix is older than the staleness ceiling
    Stale { age: Duration },
    Inside { distance_m: f64 },
    Outside { distance_m: f64 },
}

impl LocationAssessment {
    /// Outside the allowed area. A disabled gate or unset area is never outside.
    pub fn is_outside(&self) -> bool {
        matches!(
            self,
            LocationAssessment::NoFix
                | LocationAssessment::Stale { .. }
                | LocationAssessment::Outside { .. }
        )
    }

    /// Verdict was forced by missing data rather than by a measurement
    pub fn needs_fresh_fix(&self) -> bool {
        matches!(self, LocationAssessment::NoFix | LocationAssessment::Stale { .. })
    }

    /// Location can only relax blocking: a blocklisted app is let through
    /// only on a fresh fix inside a configured area with the gate on.
    pub fn permits_blocklisted(&self) -> bool {
        matches!(self, LocationAssessment::Inside { .. })
    }
}

/// Verification session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationState {
    /// Waiting out the grace delay
    Armed,
    /// Periodic confirmation ticks running
    Checking,
    Succeeded,
    Failed,
}

impl VerificationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, VerificationState::Succeeded | VerificationState::Failed)
    }
}

/// Why a verification session gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationFailure {
    AttemptsExhausted,
    BudgetExhausted,
}

/// Terminal result of a verification session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerificationOutcome {
    Succeeded { attempts: u32 },
    Failed { attempts: u32, cause: VerificationFailure },
}

/// Visible stage of the block presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentationStage {
    /// Transparent, input-swallowing surface over the blocked app
    Absorbing,
    /// "App keeps failing" message with App info / Close buttons
    Message,
}

/// Button pressed on the block message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAction {
    AppInfo,
    Close,
}

/// Presentation summary for status displays
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresentationInfo {
    pub target: PackageId,
    pub stage: PresentationStage,
    pub shown_for: Duration,
}

/// Verification session summary for status displays
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationInfo {
    pub session_id: SessionId,
    pub target: PackageId,
    pub state: VerificationState,
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Snapshot of the engine for the settings/status UI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub enforcement_enabled: bool,
    pub presentation: Option<PresentationInfo>,
    pub verifications: Vec<VerificationInfo>,
    pub best_fix: Option<LocationFix>,
    pub location: LocationAssessment,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn geofence_sentinel() {
        assert!(!Geofence::new(0.0, 0.0, 100.0).is_configured());
        assert!(Geofence::new(10.0, 0.0, 100.0).is_configured());
        assert!(Geofence::new(0.0, 20.0, 100.0).is_configured());
    }

    #[test]
    fn fix_age_never_negative() {
        let now = Local::now();
        let fix = LocationFix {
            latitude: 1.0,
            longitude: 2.0,
            accuracy_m: 10.0,
            timestamp: now + TimeDelta::seconds(5),
            provider: ProviderId::Gps,
        };
        assert_eq!(fix.age(now), Duration::ZERO);

        let old = LocationFix {
            timestamp: now - TimeDelta::milliseconds(400_000),
            ..fix
        };
        assert_eq!(old.age(now), Duration::from_millis(400_000));
    }

    #[test]
    fn foreground_query_unknown_matches_nothing() {
        let pkg = PackageId::new("com.example.chat");
        assert!(ForegroundQuery::App(pkg.clone()).is(&pkg));
        assert!(!ForegroundQuery::Unknown.is(&pkg));
        assert!(!ForegroundQuery::App(PackageId::new("other")).is(&pkg));
    }

    #[test]
    fn assessment_verdicts() {
        assert!(LocationAssessment::NoFix.is_outside());
        assert!(LocationAssessment::NoFix.needs_fresh_fix());
        assert!(LocationAssessment::Outside { distance_m: 500.0 }.is_outside());
        assert!(!LocationAssessment::Outside { distance_m: 500.0 }.needs_fresh_fix());
        assert!(!LocationAssessment::Inside { distance_m: 50.0 }.is_outside());
        assert!(!LocationAssessment::GateDisabled.is_outside());
        assert!(!LocationAssessment::GeofenceUnset.is_outside());

        assert!(LocationAssessment::Inside { distance_m: 50.0 }.permits_blocklisted());
        assert!(!LocationAssessment::GateDisabled.permits_blocklisted());
        assert!(!LocationAssessment::GeofenceUnset.permits_blocklisted());
        assert!(!LocationAssessment::Stale { age: Duration::from_secs(400) }.permits_blocklisted());
    }

    #[test]
    fn decision_serialization() {
        let decision = BlockDecision::block(PackageId::new("x"), BlockReason::Hidden);
        let json = serde_json::to_string(&decision).unwrap();
        assert!(json.contains("\"reason\":\"hidden\""));
    }
}
