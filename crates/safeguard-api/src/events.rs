//! Signal records replayed into the service
//!
//! The service consumes newline-delimited JSON, one record per line. Blank
//! lines and lines starting with `#` are skipped so recorded traces can carry
//! notes.
//!
//! ```text
//! {"type":"foreground","package":"com.example.chat"}
//! {"type":"fix","latitude":47.6,"longitude":-122.3,"accuracy_m":12.0,"provider":"gps"}
//! {"type":"wait","ms":1000}
//! {"type":"user_action","action":"close"}
//! ```

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use safeguard_util::PackageId;
use thiserror::Error;

use crate::{ForegroundEvent, LocationFix, ProviderId, UserAction};

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("line {line}: timestamp {ms} is out of range")]
    BadTimestamp { line: usize, ms: i64 },
}

/// One input record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalRecord {
    /// The foreground app changed
    Foreground {
        package: PackageId,
        /// Event time in epoch milliseconds. Replay time when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at_ms: Option<i64>,
    },

    /// A positioning provider delivered a fix
    Fix {
        latitude: f64,
        longitude: f64,
        accuracy_m: f32,
        provider: ProviderId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        at_ms: Option<i64>,
    },

    /// A positioning provider failed or was denied
    ProviderFailed { provider: ProviderId, error: String },

    /// The user pressed a button on the block message
    UserAction { action: UserAction },

    /// Re-read the config file and swap in the new policy
    ReloadPolicy,

    /// Let the clock run before the next record
    Wait { ms: u64 },
}

impl SignalRecord {
    /// Parse one NDJSON line. `Ok(None)` for blank and comment lines.
    pub fn parse_line(line_no: usize, line: &str) -> Result<Option<Self>, SignalError> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(None);
        }

        let record: SignalRecord = serde_json::from_str(trimmed).map_err(|source| {
            SignalError::Malformed {
                line: line_no,
                source,
            }
        })?;

        if let Some(ms) = record.at_ms() {
            if safeguard_util::from_epoch_millis(ms).is_none() {
                return Err(SignalError::BadTimestamp { line: line_no, ms });
            }
        }

        Ok(Some(record))
    }

    fn at_ms(&self) -> Option<i64> {
        match self {
            SignalRecord::Foreground { at_ms, .. } | SignalRecord::Fix { at_ms, .. } => *at_ms,
            _ => None,
        }
    }

    fn stamp(at_ms: Option<i64>, fallback: DateTime<Local>) -> DateTime<Local> {
        at_ms
            .and_then(safeguard_util::from_epoch_millis)
            .unwrap_or(fallback)
    }

    /// Convert a `foreground` record into an event, stamped with `now` if the
    /// record carries no timestamp.
    pub fn to_foreground_event(&self, now: DateTime<Local>) -> Option<ForegroundEvent> {
        match self {
            SignalRecord::Foreground { package, at_ms } => Some(ForegroundEvent {
                package: package.clone(),
                timestamp: Self::stamp(*at_ms, now),
            }),
            _ => None,
        }
    }

    /// Convert a `fix` record into a location fix
    pub fn to_fix(&self, now: DateTime<Local>) -> Option<LocationFix> {
        match self {
            SignalRecord::Fix {
                latitude,
                longitude,
                accuracy_m,
                provider,
                at_ms,
            } => Some(LocationFix {
                latitude: *latitude,
                longitude: *longitude,
                accuracy_m: *accuracy_m,
                timestamp: Self::stamp(*at_ms, now),
                provider: *provider,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_blank_and_comment_lines() {
        assert!(SignalRecord::parse_line(1, "").unwrap().is_none());
        assert!(SignalRecord::parse_line(2, "   ").unwrap().is_none());
        assert!(SignalRecord::parse_line(3, "# leaving the house").unwrap().is_none());
    }

    #[test]
    fn parses_foreground_record() {
        let record = SignalRecord::parse_line(1, r#"{"type":"foreground","package":" com.example.chat "}"#)
            .unwrap()
            .unwrap();
        let now = Local::now();
        let event = record.to_foreground_event(now).unwrap();
        assert_eq!(event.package.as_str(), "com.example.chat");
        assert_eq!(event.timestamp, now);
        assert!(record.to_fix(now).is_none());
    }

    #[test]
    fn parses_fix_with_timestamp() {
        let line = r#"{"type":"fix","latitude":47.6,"longitude":-122.3,"accuracy_m":12.5,"provider":"network","at_ms":1700000000000}"#;
        let record = SignalRecord::parse_line(1, line).unwrap().unwrap();
        let fix = record.to_fix(Local::now()).unwrap();
        assert_eq!(fix.provider, ProviderId::Network);
        assert_eq!(fix.accuracy_m, 12.5);
        assert_eq!(fix.timestamp.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn parses_control_records() {
        assert_eq!(
            SignalRecord::parse_line(1, r#"{"type":"user_action","action":"app_info"}"#).unwrap(),
            Some(SignalRecord::UserAction {
                action: UserAction::AppInfo
            })
        );
        assert_eq!(
            SignalRecord::parse_line(1, r#"{"type":"reload_policy"}"#).unwrap(),
            Some(SignalRecord::ReloadPolicy)
        );
        assert_eq!(
            SignalRecord::parse_line(1, r#"{"type":"wait","ms":350}"#).unwrap(),
            Some(SignalRecord::Wait { ms: 350 })
        );
    }

    #[test]
    fn malformed_line_reports_line_number() {
        let err = SignalRecord::parse_line(7, r#"{"type":"teleport"}"#).unwrap_err();
        assert!(err.to_string().starts_with("line 7:"));
    }

    #[test]
    fn out_of_range_timestamp_rejected() {
        let line = format!(r#"{{"type":"foreground","package":"a.b","at_ms":{}}}"#, i64::MAX);
        assert!(matches!(
            SignalRecord::parse_line(4, &line),
            Err(SignalError::BadTimestamp { line: 4, .. })
        ));
    }
}
