//! Best-fix arbitration and geofence evaluation

use chrono::{DateTime, Local, TimeDelta};
use safeguard_api::{Geofence, LocationAssessment, LocationFix};
use safeguard_config::Policy;
use safeguard_host_api::LocationProvider;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// A fix this much newer than the current best always wins
pub const SIGNIFICANT_TIME_DELTA: Duration = Duration::from_secs(120);

/// Accuracy loss (meters) beyond which a fix is never preferred
pub const SIGNIFICANT_ACCURACY_DELTA_M: f32 = 200.0;

/// Mean Earth radius (meters)
pub const EARTH_MEAN_RADIUS_M: f64 = 6_371_008.8;

/// Whether `candidate` should replace `current` as the best known fix.
///
/// Freshness dominates outside a two minute window. Inside it, a more
/// accurate fix always wins, and a slightly less accurate one wins only when
/// it comes from a different provider.
pub fn is_better_location(candidate: &LocationFix, current: Option<&LocationFix>) -> bool {
    let Some(current) = current else {
        return true;
    };

    let time_delta = candidate.timestamp - current.timestamp;
    let window = TimeDelta::from_std(SIGNIFICANT_TIME_DELTA).unwrap_or(TimeDelta::MAX);
    if time_delta > window {
        return true;
    }
    if time_delta < -window {
        return false;
    }

    let accuracy_delta = candidate.accuracy_m - current.accuracy_m;
    if accuracy_delta < 0.0 {
        return true;
    }

    let significantly_less_accurate = accuracy_delta > SIGNIFICANT_ACCURACY_DELTA_M;
    !significantly_less_accurate && candidate.provider != current.provider
}

/// Great-circle distance in meters (haversine)
pub fn haversine_distance_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_MEAN_RADIUS_M * c
}

/// Distance from a fix to the geofence center
pub fn distance_to_center(fix: &LocationFix, fence: &Geofence) -> f64 {
    haversine_distance_m(fix.latitude, fix.longitude, fence.latitude, fence.longitude)
}

/// Owns the single "current best fix" cell
#[derive(Debug)]
pub struct LocationTracker {
    best: Option<LocationFix>,
    max_fix_age: Duration,
}

impl LocationTracker {
    pub fn new(max_fix_age: Duration) -> Self {
        Self {
            best: None,
            max_fix_age,
        }
    }

    pub fn best(&self) -> Option<&LocationFix> {
        self.best.as_ref()
    }

    pub fn set_max_fix_age(&mut self, max_fix_age: Duration) {
        self.max_fix_age = max_fix_age;
    }

    /// Offer a fix. Returns true if it became the new best.
    pub fn record_fix(&mut self, candidate: LocationFix) -> bool {
        if is_better_location(&candidate, self.best.as_ref()) {
            debug!(
                provider = %candidate.provider,
                accuracy_m = candidate.accuracy_m,
                "New best location fix"
            );
            self.best = Some(candidate);
            true
        } else {
            trace!(provider = %candidate.provider, "Fix rejected, current best kept");
            false
        }
    }

    /// Seed the cell from each available provider's cached fix
    pub fn seed_from_last_known(&mut self, providers: &[Arc<dyn LocationProvider>]) -> bool {
        let mut improved = false;
        for provider in providers.iter().filter(|p| p.is_available()) {
            if let Some(fix) = provider.last_known() {
                improved |= self.record_fix(fix);
            }
        }
        improved
    }

    /// Evaluate the location gate for `policy`, with the reason
    pub fn assess(&self, policy: &Policy, now: DateTime<Local>) -> LocationAssessment {
        if !policy.location_gate_enabled {
            return LocationAssessment::GateDisabled;
        }
        let Some(fence) = policy.configured_geofence() else {
            return LocationAssessment::GeofenceUnset;
        };
        let Some(fix) = &self.best else {
            return LocationAssessment::NoFix;
        };

        let age = fix.age(now);
        if age > self.max_fix_age {
            return LocationAssessment::Stale { age };
        }

        let distance_m = distance_to_center(fix, fence);
        if distance_m > fence.radius_m {
            LocationAssessment::Outside { distance_m }
        } else {
            LocationAssessment::Inside { distance_m }
        }
    }

    pub fn is_outside_allowed_area(&self, policy: &Policy, now: DateTime<Local>) -> bool {
        self.assess(policy, now).is_outside()
    }
}
