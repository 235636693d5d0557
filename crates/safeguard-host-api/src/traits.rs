//! Collaborator traits

use async_trait::async_trait;
use chrono::{DateTime, Local};
use safeguard_api::{ForegroundQuery, LocationFix, ProviderId, UserAction};
use safeguard_util::PackageId;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::LocationSignal;

/// Errors from platform collaborators
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Provider {0} is unavailable")]
    ProviderUnavailable(ProviderId),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Surface failed: {0}")]
    SurfaceFailed(String),

    #[error("Not supported")]
    NotSupported,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type HostResult<T> = Result<T, HostError>;

/// Content of the block message shown over the offending app
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMessage {
    pub target: PackageId,
    pub app_name: String,
    pub text: String,
    pub actions: Vec<(UserAction, String)>,
}

impl BlockMessage {
    /// The "app keeps failing" message with App info / Close buttons
    pub fn failing_app(target: PackageId, app_name: impl Into<String>) -> Self {
        let app_name = app_name.into();
        Self {
            text: format!("{} keeps failing", app_name),
            target,
            app_name,
            actions: vec![
                (UserAction::AppInfo, "App info".into()),
                (UserAction::Close, "Close app".into()),
            ],
        }
    }
}

/// Draws the blocking UI and drives navigation away from the blocked app.
///
/// Implementations are shared between the engine and the platform glue, so
/// all methods take `&self`.
pub trait BlockPresenter: Send + Sync {
    /// Mount the transparent surface that swallows all input
    fn mount_absorbing_surface(&self, target: &PackageId) -> HostResult<()>;

    /// Replace the surface content with the block message
    fn show_block_message(&self, message: &BlockMessage) -> HostResult<()>;

    /// Remove the surface. Must tolerate being called with nothing mounted.
    fn remove_surface(&self);

    /// Whether the surface is actually attached right now
    fn is_surface_mounted(&self) -> bool;

    /// Navigate to the home screen
    fn go_home(&self) -> HostResult<()>;

    /// Open the system app-details page for `target`
    fn open_app_details(&self, target: &PackageId) -> HostResult<()>;

    /// Human-readable label from the package manager, if known
    fn display_name(&self, _target: &PackageId) -> Option<String> {
        None
    }
}

/// Answers "which app is in the foreground right now"
pub trait ForegroundSource: Send + Sync {
    /// `Unknown` when the usage-access capability is denied or no data is recent
    fn current_foreground(&self) -> ForegroundQuery;
}

/// A positioning provider (primary, secondary or passive)
#[async_trait]
pub trait LocationProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Enabled in system settings and permitted
    fn is_available(&self) -> bool;

    /// Cached fix from the platform, if any
    fn last_known(&self) -> Option<LocationFix>;

    /// Request a single fresh fix
    async fn request_single(&self) -> HostResult<LocationFix>;

    /// Start continuous updates at `cadence`. Every fix the platform delivers
    /// is sent through `tx` until [`LocationProvider::unsubscribe`] is called.
    /// A second call replaces the first subscription.
    fn subscribe(
        &self,
        cadence: UpdateCadence,
        tx: mpsc::UnboundedSender<LocationSignal>,
    ) -> HostResult<()>;

    fn unsubscribe(&self);
}

/// Minimum spacing between continuous updates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateCadence {
    pub interval: Duration,
    pub min_distance_m: f64,
}

impl UpdateCadence {
    /// Cadence used for each provider. The passive provider only sees fixes
    /// requested by others, so it is never subscribed.
    pub fn for_provider(id: ProviderId) -> Option<Self> {
        match id {
            ProviderId::Gps => Some(Self {
                interval: Duration::from_secs(15),
                min_distance_m: 5.0,
            }),
            ProviderId::Network => Some(Self {
                interval: Duration::from_secs(30),
                min_distance_m: 10.0,
            }),
            ProviderId::Passive => None,
        }
    }
}

/// Fire-and-forget sink for block events
pub trait BlockRecorder: Send + Sync {
    fn record_block_event(&self, package: &PackageId, at: DateTime<Local>) -> HostResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failing_app_message() {
        let msg = BlockMessage::failing_app(PackageId::new("com.example.chat"), "Chat");
        assert_eq!(msg.text, "Chat keeps failing");
        assert_eq!(msg.actions.len(), 2);
        assert_eq!(msg.actions[0].0, UserAction::AppInfo);
        assert_eq!(msg.actions[1].0, UserAction::Close);
    }

    #[test]
    fn network_updates_are_half_as_frequent() {
        let gps = UpdateCadence::for_provider(ProviderId::Gps).unwrap();
        let network = UpdateCadence::for_provider(ProviderId::Network).unwrap();
        assert_eq!(network.interval, gps.interval * 2);
        assert_eq!(network.min_distance_m, gps.min_distance_m * 2.0);
        assert!(UpdateCadence::for_provider(ProviderId::Passive).is_none());
    }

    #[test]
    fn host_error_display() {
        let err = HostError::ProviderUnavailable(ProviderId::Gps);
        assert_eq!(err.to_string(), "Provider gps is unavailable");
    }
}
