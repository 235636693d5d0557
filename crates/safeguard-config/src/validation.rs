//! Configuration validation

use crate::policy::{EnforcementTimings, is_system_critical};
use crate::schema::{RawConfig, RawLocation};
use safeguard_util::PackageId;
use std::time::Duration;
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("[{section}] {message}")]
    InvalidPackage { section: String, message: String },

    #[error("System-critical package cannot be blocked: {0}")]
    SystemCriticalBlocked(String),

    #[error("Location error: {0}")]
    LocationError(String),

    #[error("Timing error: {0}")]
    TimingError(String),

    #[error("Global config error: {0}")]
    GlobalError(String),
}

/// Validate a raw configuration
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    errors.extend(validate_package_list("policy.blocked", &config.policy.blocked));
    errors.extend(validate_package_list("policy.hidden", &config.policy.hidden));

    for raw in &config.policy.blocked {
        let pkg = PackageId::new(raw.as_str());
        if !pkg.is_empty() && is_system_critical(&pkg) {
            errors.push(ValidationError::SystemCriticalBlocked(pkg.to_string()));
        }
    }

    if let Some(own) = &config.daemon.own_package
        && own.trim().is_empty()
    {
        errors.push(ValidationError::GlobalError(
            "own_package cannot be empty".into(),
        ));
    }

    if config.daemon.tick_interval_ms == Some(0) {
        errors.push(ValidationError::GlobalError(
            "tick_interval_ms must be positive".into(),
        ));
    }

    errors.extend(validate_location(&config.location));

    let timings = crate::Config::from_raw(config.clone()).timings;
    errors.extend(validate_timings(&timings));

    errors
}

fn validate_package_list(section: &str, packages: &[String]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for raw in packages {
        let pkg = PackageId::new(raw.as_str());
        if pkg.is_empty() {
            errors.push(ValidationError::InvalidPackage {
                section: section.to_string(),
                message: "package id cannot be empty".into(),
            });
        } else if pkg.as_str().contains(char::is_whitespace) {
            errors.push(ValidationError::InvalidPackage {
                section: section.to_string(),
                message: format!("package id '{}' contains whitespace", pkg),
            });
        } else if !seen.insert(pkg.clone()) {
            errors.push(ValidationError::InvalidPackage {
                section: section.to_string(),
                message: format!("duplicate package id '{}'", pkg),
            });
        }
    }

    errors
}

fn validate_location(location: &RawLocation) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    match (location.latitude, location.longitude) {
        (Some(lat), Some(lng)) => {
            if !(-90.0..=90.0).contains(&lat) {
                errors.push(ValidationError::LocationError(format!(
                    "latitude {} is outside [-90, 90]",
                    lat
                )));
            }
            if !(-180.0..=180.0).contains(&lng) {
                errors.push(ValidationError::LocationError(format!(
                    "longitude {} is outside [-180, 180]",
                    lng
                )));
            }
        }
        (None, None) => {}
        _ => errors.push(ValidationError::LocationError(
            "latitude and longitude must be set together".into(),
        )),
    }

    if let Some(radius) = location.radius_m
        && !(radius > 0.0 && radius.is_finite())
    {
        errors.push(ValidationError::LocationError(format!(
            "radius_m must be positive, got {}",
            radius
        )));
    }

    errors
}

fn validate_timings(t: &EnforcementTimings) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if t.message_delay <= t.home_delay {
        errors.push(ValidationError::TimingError(format!(
            "message_delay ({}ms) must come after home_delay ({}ms)",
            t.message_delay.as_millis(),
            t.home_delay.as_millis()
        )));
    }
    if t.auto_dismiss <= t.message_delay {
        errors.push(ValidationError::TimingError(
            "auto_dismiss must come after message_delay".into(),
        ));
    }
    if t.verify_max_attempts == 0 {
        errors.push(ValidationError::TimingError(
            "verify_max_attempts must be at least 1".into(),
        ));
    }
    if t.verify_interval == Duration::ZERO {
        errors.push(ValidationError::TimingError(
            "verify_interval must be positive".into(),
        ));
    }
    if t.verify_budget <= t.verify_grace {
        errors.push(ValidationError::TimingError(
            "verify_budget must exceed verify_grace".into(),
        ));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errors_for(toml_str: &str) -> Vec<ValidationError> {
        let raw: RawConfig = toml::from_str(toml_str).unwrap();
        validate_config(&raw)
    }

    #[test]
    fn minimal_config_is_valid() {
        assert!(errors_for("config_version = 1").is_empty());
    }

    #[test]
    fn empty_and_duplicate_packages() {
        let errors = errors_for(
            r#"
            config_version = 1
            [policy]
            blocked = ["com.example.chat", "  ", "com.example.chat "]
            "#,
        );
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.to_string().contains("cannot be empty")));
        assert!(errors.iter().any(|e| e.to_string().contains("duplicate")));
    }

    #[test]
    fn system_critical_in_blocklist() {
        let errors = errors_for(
            r#"
            config_version = 1
            [policy]
            blocked = ["com.android.systemui", "com.google.android.gms.location"]
            "#,
        );
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|e| matches!(e, ValidationError::SystemCriticalBlocked(_))));
    }

    #[test]
    fn hidden_system_packages_allowed_by_validation() {
        // The decider exempts them at runtime; hiding is not an error
        let errors = errors_for(
            r#"
            config_version = 1
            [policy]
            hidden = ["com.android.settings"]
            "#,
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn location_ranges() {
        let errors = errors_for(
            r#"
            config_version = 1
            [location]
            latitude = 91.0
            longitude = -181.0
            radius_m = 0.0
            "#,
        );
        assert_eq!(errors.len(), 3);

        let errors = errors_for(
            r#"
            config_version = 1
            [location]
            latitude = 45.0
            "#,
        );
        assert!(matches!(errors.as_slice(), [ValidationError::LocationError(_)]));
    }

    #[test]
    fn timing_sanity() {
        let errors = errors_for(
            r#"
            config_version = 1
            [enforcement]
            home_delay_ms = 500
            message_delay_ms = 400
            verify_max_attempts = 0
            verify_grace_ms = 10000
            verify_budget_ms = 5000
            "#,
        );
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| matches!(e, ValidationError::TimingError(_))));
    }
}
