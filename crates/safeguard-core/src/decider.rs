//! Per-event block/allow decision

use safeguard_api::{BlockDecision, BlockReason, ForegroundEvent, LocationAssessment};
use safeguard_config::{Policy, is_system_critical};
use safeguard_util::PackageId;

/// Decide whether the newly foregrounded app must be blocked.
///
/// Rules, first match wins:
/// 1. enforcement switched off: allow
/// 2. our own package or a system-critical package: allow
/// 3. hide mode on and the package is hidden: block, location ignored
/// 4. not blocklisted: allow
/// 5. blocklisted: allow only when the location gate places the device inside
///    the allowed area, otherwise block
///
/// `location` is only consulted for blocklisted packages.
pub fn decide(
    event: &ForegroundEvent,
    policy: &Policy,
    location: impl FnOnce() -> LocationAssessment,
    own_package: &PackageId,
) -> BlockDecision {
    let package = event.package.clone();

    if !policy.enforcement_enabled || package.is_empty() {
        return BlockDecision::allow(package);
    }

    if &package == own_package || is_system_critical(&package) {
        return BlockDecision::allow(package);
    }

    if policy.hide_mode_active && policy.is_hidden(&package) {
        return BlockDecision::block(package, BlockReason::Hidden);
    }

    if !policy.is_blocked(&package) {
        return BlockDecision::allow(package);
    }

    if location().permits_blocklisted() {
        BlockDecision::allow(package)
    } else {
        BlockDecision::block(package, BlockReason::Blocklist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use std::cell::Cell;
    use std::time::Duration;

    fn own() -> PackageId {
        PackageId::new("com.example.safeguard")
    }

    fn event(pkg: &str) -> ForegroundEvent {
        ForegroundEvent::new(pkg, Local::now())
    }

    fn policy_blocking(pkgs: &[&str]) -> Policy {
        Policy {
            blocked_packages: pkgs.iter().map(|p| PackageId::new(*p)).collect(),
            ..Policy::default()
        }
    }

    fn never_called() -> LocationAssessment {
        panic!("location must not be consulted")
    }

    #[test]
    fn blocklisted_with_gate_disabled_is_blocked() {
        let policy = policy_blocking(&["com.example.chat"]);
        let decision = decide(
            &event("com.example.chat"),
            &policy,
            || LocationAssessment::GateDisabled,
            &own(),
        );
        assert!(decision.should_block);
        assert_eq!(decision.reason, BlockReason::Blocklist);
    }

    #[test]
    fn blocklisted_is_blocked_for_every_non_inside_verdict() {
        let policy = policy_blocking(&["x"]);
        for assessment in [
            LocationAssessment::GateDisabled,
            LocationAssessment::GeofenceUnset,
            LocationAssessment::NoFix,
            LocationAssessment::Stale { age: Duration::from_millis(400_000) },
            LocationAssessment::Outside { distance_m: 101.0 },
        ] {
            let decision = decide(&event("x"), &policy, || assessment, &own());
            assert!(decision.should_block, "{:?} should block", assessment);
        }

        let inside = decide(
            &event("x"),
            &policy,
            || LocationAssessment::Inside { distance_m: 50.0 },
            &own(),
        );
        assert!(!inside.should_block);
        assert_eq!(inside.reason, BlockReason::None);
    }

    #[test]
    fn hidden_ignores_location() {
        let policy = Policy {
            hidden_packages: [PackageId::new("y")].into_iter().collect(),
            hide_mode_active: true,
            ..Policy::default()
        };
        let decision = decide(&event("y"), &policy, never_called, &own());
        assert!(decision.should_block);
        assert_eq!(decision.reason, BlockReason::Hidden);
    }

    #[test]
    fn hidden_without_hide_mode_falls_through() {
        let policy = Policy {
            hidden_packages: [PackageId::new("y")].into_iter().collect(),
            hide_mode_active: false,
            ..Policy::default()
        };
        let decision = decide(&event("y"), &policy, never_called, &own());
        assert!(!decision.should_block);
    }

    #[test]
    fn system_and_own_packages_are_exempt() {
        let policy = Policy {
            blocked_packages: ["com.android.settings", "com.google.android.gms.ui", "com.example.safeguard"]
                .into_iter()
                .map(PackageId::new)
                .collect(),
            hidden_packages: [PackageId::new("com.android.systemui")].into_iter().collect(),
            hide_mode_active: true,
            ..Policy::default()
        };

        for pkg in [
            "com.android.settings",
            "com.google.android.gms.ui",
            "com.example.safeguard",
            "com.android.systemui",
        ] {
            let decision = decide(&event(pkg), &policy, never_called, &own());
            assert!(!decision.should_block, "{} must never be blocked", pkg);
        }
    }

    #[test]
    fn own_package_exemption_is_exact() {
        let policy = policy_blocking(&["com.example.safeguard.helper"]);
        let decision = decide(
            &event("com.example.safeguard.helper"),
            &policy,
            || LocationAssessment::GateDisabled,
            &own(),
        );
        assert!(decision.should_block);
        assert_eq!(decision.reason, BlockReason::Blocklist);

        // Dotted children of system packages stay exempt
        let policy = policy_blocking(&["com.android.settings.intelligence"]);
        let decision = decide(&event("com.android.settings.intelligence"), &policy, never_called, &own());
        assert!(!decision.should_block);
    }

    #[test]
    fn master_switch_off_allows_everything() {
        let policy = Policy {
            enforcement_enabled: false,
            hidden_packages: [PackageId::new("y")].into_iter().collect(),
            hide_mode_active: true,
            ..policy_blocking(&["x"])
        };
        assert!(!decide(&event("x"), &policy, never_called, &own()).should_block);
        assert!(!decide(&event("y"), &policy, never_called, &own()).should_block);
    }

    #[test]
    fn location_only_consulted_for_blocklisted() {
        let policy = policy_blocking(&["x"]);
        let calls = Cell::new(0);
        let assess = || {
            calls.set(calls.get() + 1);
            LocationAssessment::NoFix
        };

        decide(&event("not.listed"), &policy, assess, &own());
        assert_eq!(calls.get(), 0);

        decide(&event("x"), &policy, assess, &own());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn padded_event_package_matches_policy() {
        let policy = policy_blocking(&["com.example.chat"]);
        let decision = decide(
            &event("  com.example.chat "),
            &policy,
            || LocationAssessment::GateDisabled,
            &own(),
        );
        assert!(decision.should_block);
    }
}
