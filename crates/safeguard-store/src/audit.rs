//! Audit event types

use chrono::{DateTime, Local};
use safeguard_api::{BlockReason, VerificationOutcome};
use safeguard_util::{PackageId, SessionId};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    /// Daemon started
    DaemonStarted,

    /// Daemon stopped
    DaemonStopped,

    /// Policy loaded or reloaded
    PolicyLoaded { blocked: usize, hidden: usize },

    /// Config reload requested
    ConfigReloaded { success: bool },

    /// An app was blocked and the block screen admitted
    AppBlocked {
        package: PackageId,
        reason: BlockReason,
    },

    /// The block screen could not be shown
    PresentationFailed { package: PackageId, error: String },

    /// Presentation flag was set with no surface behind it
    StalePresentationReset { package: PackageId },

    /// A verification session reached a terminal state
    VerificationFinished {
        session_id: SessionId,
        package: PackageId,
        outcome: VerificationOutcome,
    },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    /// Event timestamp
    pub timestamp: DateTime<Local>,

    /// Event type and details
    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: safeguard_util::now(),
            event,
        }
    }
}
