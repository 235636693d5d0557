//! Host collaborators for replay mode
//!
//! There is no real screen here: the replay screen keeps the state a device
//! would have (which app is in front, whether the block surface is attached)
//! and logs every call the engine makes.

use async_trait::async_trait;
use safeguard_api::{ForegroundQuery, LocationFix, ProviderId};
use safeguard_host_api::{
    BlockMessage, BlockPresenter, ForegroundSource, HostError, HostResult, LocationProvider,
    LocationSignal, UpdateCadence,
};
use safeguard_util::PackageId;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Package that takes the foreground when the engine sends the user home
pub const HOME_PACKAGE: &str = "com.android.launcher3";

/// Package that takes the foreground when app details are opened
pub const SETTINGS_PACKAGE: &str = "com.android.settings";

#[derive(Debug)]
struct ScreenState {
    foreground: ForegroundQuery,
    surface: Option<PackageId>,
}

/// Simulated screen fed by the signal stream
#[derive(Debug)]
pub struct ReplayScreen {
    state: Mutex<ScreenState>,
}

impl ReplayScreen {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ScreenState {
                foreground: ForegroundQuery::Unknown,
                surface: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScreenState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// A foreground record arrived
    pub fn set_foreground(&self, package: &PackageId) {
        self.lock().foreground = ForegroundQuery::App(package.clone());
    }
}

impl Default for ReplayScreen {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockPresenter for ReplayScreen {
    fn mount_absorbing_surface(&self, target: &PackageId) -> HostResult<()> {
        info!(package = %target, "Absorbing surface mounted");
        self.lock().surface = Some(target.clone());
        Ok(())
    }

    fn show_block_message(&self, message: &BlockMessage) -> HostResult<()> {
        let mut state = self.lock();
        if state.surface.is_none() {
            return Err(HostError::SurfaceFailed("no surface to draw on".into()));
        }
        let actions: Vec<&str> = message.actions.iter().map(|(_, label)| label.as_str()).collect();
        info!(package = %message.target, text = %message.text, actions = ?actions, "Block message shown");
        state.surface = Some(message.target.clone());
        Ok(())
    }

    fn remove_surface(&self) {
        if let Some(target) = self.lock().surface.take() {
            info!(package = %target, "Block surface removed");
        }
    }

    fn is_surface_mounted(&self) -> bool {
        self.lock().surface.is_some()
    }

    fn go_home(&self) -> HostResult<()> {
        info!("Navigating to home screen");
        self.lock().foreground = ForegroundQuery::App(PackageId::new(HOME_PACKAGE));
        Ok(())
    }

    fn open_app_details(&self, target: &PackageId) -> HostResult<()> {
        info!(package = %target, "Opening app details");
        self.lock().foreground = ForegroundQuery::App(PackageId::new(SETTINGS_PACKAGE));
        Ok(())
    }
}

impl ForegroundSource for ReplayScreen {
    fn current_foreground(&self) -> ForegroundQuery {
        self.lock().foreground.clone()
    }
}

/// Positioning provider fed by fix records.
///
/// The trace already holds what the platform delivered, so a subscribed
/// provider forwards every fix without applying its cadence.
#[derive(Debug)]
pub struct ReplayLocationProvider {
    id: ProviderId,
    last: Mutex<Option<LocationFix>>,
    subscriber: Mutex<Option<mpsc::UnboundedSender<LocationSignal>>>,
}

impl ReplayLocationProvider {
    pub fn new(id: ProviderId) -> Self {
        Self {
            id,
            last: Mutex::new(None),
            subscriber: Mutex::new(None),
        }
    }

    /// Take a fix from the stream. Returns true when it was delivered as a
    /// continuous update.
    pub fn observe(&self, fix: &LocationFix) -> bool {
        if fix.provider != self.id {
            return false;
        }
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Some(fix.clone());

        match self.subscriber.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            Some(tx) => tx.send(LocationSignal::Fix(fix.clone())).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl LocationProvider for ReplayLocationProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn is_available(&self) -> bool {
        true
    }

    fn last_known(&self) -> Option<LocationFix> {
        self.last.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn request_single(&self) -> HostResult<LocationFix> {
        self.last_known()
            .ok_or(HostError::ProviderUnavailable(self.id))
    }

    fn subscribe(
        &self,
        cadence: UpdateCadence,
        tx: mpsc::UnboundedSender<LocationSignal>,
    ) -> HostResult<()> {
        debug!(provider = %self.id, cadence = ?cadence, "Replay provider subscribed");
        *self.subscriber.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        Ok(())
    }

    fn unsubscribe(&self) {
        self.subscriber.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}
