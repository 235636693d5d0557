//! Core events emitted by the engine

use safeguard_api::{BlockReason, LocationAssessment, ProviderId, VerificationOutcome};
use safeguard_util::{PackageId, PresentationId, SessionId};
use std::time::Duration;

/// Why an activation request did not produce a presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// Arrived within the debounce window after the last close
    Debounced,
    /// A live presentation is already on screen
    AlreadyShowing,
}

/// Why a presentation went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissCause {
    AutoDismiss,
    UserClose,
    AppInfo,
    /// Replaced by a forced re-activation
    Superseded,
    Shutdown,
}

/// Events emitted by the core engine
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    /// Foreground change required no action
    Allowed { package: PackageId },

    /// Foreground change was blocked and a presentation started
    Blocked {
        package: PackageId,
        reason: BlockReason,
        presentation_id: PresentationId,
    },

    /// Block decision stood but no new presentation was started
    ActivationSuppressed {
        package: PackageId,
        reason: SuppressReason,
    },

    /// The absorbing surface could not be mounted
    PresentationFailed { package: PackageId, error: String },

    /// Presentation flag was set with no surface behind it and was reset
    StalePresentationReset { package: PackageId },

    /// The blocked app was sent to the background
    SentHome { presentation_id: PresentationId },

    /// The block message replaced the absorbing surface
    BlockMessageShown {
        presentation_id: PresentationId,
        package: PackageId,
        app_name: String,
    },

    /// The presentation ended
    PresentationDismissed {
        presentation_id: PresentationId,
        package: PackageId,
        cause: DismissCause,
        shown_for: Duration,
    },

    /// The verdict was forced by missing or stale location data
    FreshFixRequested { assessment: LocationAssessment },

    /// A fix replaced the current best
    LocationUpdated {
        provider: ProviderId,
        accuracy_m: f32,
    },

    VerificationStarted {
        session_id: SessionId,
        package: PackageId,
    },

    /// A check found the block had not stuck and re-activated it
    VerificationRetried {
        session_id: SessionId,
        package: PackageId,
        attempt: u32,
    },

    VerificationFinished {
        session_id: SessionId,
        package: PackageId,
        outcome: VerificationOutcome,
    },

    /// Policy was reloaded
    PolicyReloaded { blocked: usize, hidden: usize },
}
