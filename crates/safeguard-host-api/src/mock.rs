//! Mock collaborators for testing

use async_trait::async_trait;
use chrono::{DateTime, Local};
use safeguard_api::{ForegroundQuery, LocationFix, ProviderId};
use safeguard_util::PackageId;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::{
    BlockMessage, BlockPresenter, BlockRecorder, ForegroundSource, HostError, HostResult,
    LocationProvider, LocationSignal, UpdateCadence,
};

/// A call observed by [`MockPresenter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenterCall {
    Mount(PackageId),
    ShowMessage(BlockMessage),
    Remove,
    GoHome,
    OpenAppDetails(PackageId),
}

#[derive(Default)]
struct PresenterState {
    mounted: bool,
    calls: Vec<PresenterCall>,
    labels: HashMap<PackageId, String>,
}

/// Mock presenter that records every call
#[derive(Default)]
pub struct MockPresenter {
    state: Mutex<PresenterState>,

    /// Configure mounting the surface to fail
    pub fail_mount: AtomicBool,

    /// Configure opening app details to fail
    pub fail_app_details: AtomicBool,
}

impl MockPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<PresenterCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn count(&self, pred: impl Fn(&PresenterCall) -> bool) -> usize {
        self.state.lock().unwrap().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn set_fail_mount(&self, fail: bool) {
        self.fail_mount.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_app_details(&self, fail: bool) {
        self.fail_app_details.store(fail, Ordering::SeqCst);
    }

    pub fn set_label(&self, package: &str, label: &str) {
        self.state
            .lock()
            .unwrap()
            .labels
            .insert(PackageId::new(package), label.to_string());
    }

    /// Simulate the platform tearing the surface down behind our back
    pub fn drop_surface(&self) {
        self.state.lock().unwrap().mounted = false;
    }
}

impl BlockPresenter for MockPresenter {
    fn mount_absorbing_surface(&self, target: &PackageId) -> HostResult<()> {
        if self.fail_mount.load(Ordering::SeqCst) {
            return Err(HostError::SurfaceFailed("Mock mount failure".into()));
        }
        let mut state = self.state.lock().unwrap();
        state.mounted = true;
        state.calls.push(PresenterCall::Mount(target.clone()));
        Ok(())
    }

    fn show_block_message(&self, message: &BlockMessage) -> HostResult<()> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(PresenterCall::ShowMessage(message.clone()));
        Ok(())
    }

    fn remove_surface(&self) {
        let mut state = self.state.lock().unwrap();
        state.mounted = false;
        state.calls.push(PresenterCall::Remove);
    }

    fn is_surface_mounted(&self) -> bool {
        self.state.lock().unwrap().mounted
    }

    fn go_home(&self) -> HostResult<()> {
        self.state.lock().unwrap().calls.push(PresenterCall::GoHome);
        Ok(())
    }

    fn open_app_details(&self, target: &PackageId) -> HostResult<()> {
        if self.fail_app_details.load(Ordering::SeqCst) {
            return Err(HostError::NotSupported);
        }
        self.state
            .lock()
            .unwrap()
            .calls
            .push(PresenterCall::OpenAppDetails(target.clone()));
        Ok(())
    }

    fn display_name(&self, target: &PackageId) -> Option<String> {
        self.state.lock().unwrap().labels.get(target).cloned()
    }
}

/// Mock foreground source with a settable answer
pub struct MockForeground {
    current: Mutex<ForegroundQuery>,
}

impl MockForeground {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(ForegroundQuery::Unknown),
        }
    }

    pub fn set(&self, query: ForegroundQuery) {
        *self.current.lock().unwrap() = query;
    }

    pub fn set_app(&self, package: &str) {
        self.set(ForegroundQuery::App(PackageId::new(package)));
    }
}

impl Default for MockForeground {
    fn default() -> Self {
        Self::new()
    }
}

impl ForegroundSource for MockForeground {
    fn current_foreground(&self) -> ForegroundQuery {
        self.current.lock().unwrap().clone()
    }
}

/// Mock positioning provider with a queue of scripted results
pub struct MockLocationProvider {
    id: ProviderId,
    available: AtomicBool,
    last_known: Mutex<Option<LocationFix>>,
    results: Mutex<VecDeque<HostResult<LocationFix>>>,
    delay: Mutex<Option<Duration>>,
    requests: AtomicU64,
    subscription: Mutex<Option<(UpdateCadence, mpsc::UnboundedSender<LocationSignal>)>>,
    fail_subscribe: AtomicBool,
}

impl MockLocationProvider {
    pub fn new(id: ProviderId) -> Self {
        Self {
            id,
            available: AtomicBool::new(true),
            last_known: Mutex::new(None),
            results: Mutex::new(VecDeque::new()),
            delay: Mutex::new(None),
            requests: AtomicU64::new(0),
            subscription: Mutex::new(None),
            fail_subscribe: AtomicBool::new(false),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_last_known(&self, fix: Option<LocationFix>) {
        *self.last_known.lock().unwrap() = fix;
    }

    pub fn push_result(&self, result: HostResult<LocationFix>) {
        self.results.lock().unwrap().push_back(result);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn set_fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    /// Cadence of the live subscription, if any
    pub fn cadence(&self) -> Option<UpdateCadence> {
        self.subscription.lock().unwrap().as_ref().map(|(cadence, _)| *cadence)
    }

    /// Deliver a continuous update. False when nobody is subscribed.
    pub fn emit(&self, fix: LocationFix) -> bool {
        match self.subscription.lock().unwrap().as_ref() {
            Some((_, tx)) => tx.send(LocationSignal::Fix(fix)).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl LocationProvider for MockLocationProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn last_known(&self) -> Option<LocationFix> {
        self.last_known.lock().unwrap().clone()
    }

    async fn request_single(&self) -> HostResult<LocationFix> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(HostError::ProviderUnavailable(self.id)))
    }

    fn subscribe(
        &self,
        cadence: UpdateCadence,
        tx: mpsc::UnboundedSender<LocationSignal>,
    ) -> HostResult<()> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(HostError::PermissionDenied("location updates".into()));
        }
        *self.subscription.lock().unwrap() = Some((cadence, tx));
        Ok(())
    }

    fn unsubscribe(&self) {
        self.subscription.lock().unwrap().take();
    }
}

/// Mock block recorder
#[derive(Default)]
pub struct MockRecorder {
    records: Mutex<Vec<(PackageId, DateTime<Local>)>>,

    /// Configure recording to fail
    pub fail: AtomicBool,
}

impl MockRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(PackageId, DateTime<Local>)> {
        self.records.lock().unwrap().clone()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl BlockRecorder for MockRecorder {
    fn record_block_event(&self, package: &PackageId, at: DateTime<Local>) -> HostResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HostError::Internal("Mock recorder failure".into()));
        }
        self.records.lock().unwrap().push((package.clone(), at));
        Ok(())
    }
}
