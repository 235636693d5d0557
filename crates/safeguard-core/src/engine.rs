//! Access enforcement engine

use chrono::{DateTime, Local};
use safeguard_api::{
    BlockReason, EngineStatus, ForegroundEvent, ForegroundQuery, LocationAssessment, UserAction,
};
use safeguard_config::{EnforcementTimings, PolicyStore, is_system_critical};
use safeguard_host_api::{
    BlockPresenter, BlockRecorder, ForegroundSource, HostCapabilities, LocationProvider,
    LocationSignal,
};
use safeguard_store::{AuditEvent, AuditEventType, Store};
use safeguard_util::{MonotonicInstant, PackageId, PresentationId, SafeguardError, SessionId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    Activation, BlockActuator, CheckVerdict, CoreEvent, DismissCause, LocationTracker,
    PresentationStep, Scheduler, VerificationSupervisor, decide,
};

/// Minimum spacing between two fresh-fix requests
pub const FIX_REQUEST_COOLDOWN: Duration = Duration::from_secs(10);

/// Work item carried by the engine's timer queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineTask {
    Presentation {
        id: PresentationId,
        step: PresentationStep,
    },
    VerificationCheck {
        session_id: SessionId,
    },
}

/// Platform collaborators the engine drives
#[derive(Clone)]
pub struct EngineHost {
    pub presenter: Arc<dyn BlockPresenter>,
    pub foreground: Arc<dyn ForegroundSource>,
    pub recorder: Arc<dyn BlockRecorder>,
    pub capabilities: HostCapabilities,
}

/// The access enforcement engine.
///
/// Every method takes `&mut self`; callers serialize access (the daemon keeps
/// the engine behind a single async mutex).
pub struct EnforcementEngine {
    policy: Arc<dyn PolicyStore>,
    store: Arc<dyn Store>,
    host: EngineHost,
    own_package: PackageId,
    location: LocationTracker,
    actuator: BlockActuator,
    supervisor: VerificationSupervisor,
    scheduler: Scheduler<EngineTask>,
    last_foreground: Option<PackageId>,
    last_fix_request: Option<MonotonicInstant>,
}

impl EnforcementEngine {
    pub fn new(
        policy: Arc<dyn PolicyStore>,
        store: Arc<dyn Store>,
        host: EngineHost,
        timings: EnforcementTimings,
        own_package: PackageId,
    ) -> Result<Self, SafeguardError> {
        if own_package.is_empty() {
            return Err(SafeguardError::InvalidPackage(own_package.to_string()));
        }

        for missing in host.capabilities.missing() {
            warn!(capability = missing, "Capability not granted, using conservative fallback");
        }

        let snapshot = policy.snapshot();
        info!(
            own_package = %own_package,
            blocked = snapshot.blocked_packages.len(),
            hidden = snapshot.hidden_packages.len(),
            gate = snapshot.location_gate_enabled,
            "Enforcement engine initialized"
        );
        let _ = store.append_audit(AuditEvent::new(AuditEventType::PolicyLoaded {
            blocked: snapshot.blocked_packages.len(),
            hidden: snapshot.hidden_packages.len(),
        }));

        let actuator = BlockActuator::new(
            host.presenter.clone(),
            timings,
            host.capabilities.can_open_app_details,
        );

        Ok(Self {
            policy,
            store,
            own_package,
            location: LocationTracker::new(timings.max_fix_age),
            actuator,
            supervisor: VerificationSupervisor::new(timings),
            scheduler: Scheduler::new(),
            host,
            last_foreground: None,
            last_fix_request: None,
        })
    }

    pub fn own_package(&self) -> &PackageId {
        &self.own_package
    }

    pub fn last_foreground(&self) -> Option<&PackageId> {
        self.last_foreground.as_ref()
    }

    pub fn location(&self) -> &LocationTracker {
        &self.location
    }

    /// Apply new timings to presentations and sessions started from now on
    pub fn set_timings(&mut self, timings: EnforcementTimings) {
        self.actuator.set_timings(timings);
        self.supervisor.set_timings(timings);
        self.location.set_max_fix_age(timings.max_fix_age);
    }

    /// Handle a foreground app change
    pub fn on_foreground_app_changed(
        &mut self,
        event: &ForegroundEvent,
        now: DateTime<Local>,
        now_mono: MonotonicInstant,
    ) -> Vec<CoreEvent> {
        let mut events = Vec::new();
        let policy = self.policy.snapshot();
        self.last_foreground = Some(event.package.clone());

        let mut assessed: Option<LocationAssessment> = None;
        let location = &self.location;
        let decision = decide(
            event,
            &policy,
            || {
                let assessment = location.assess(&policy, now);
                assessed = Some(assessment);
                assessment
            },
            &self.own_package,
        );

        if let Some(assessment) = assessed {
            debug!(package = %event.package, assessment = ?assessment, "Location gate consulted");
            events.extend(self.maybe_request_fix(assessment, now_mono));
        }

        if !decision.should_block {
            debug!(package = %decision.package, "Foreground app allowed");
            events.push(CoreEvent::Allowed {
                package: decision.package,
            });
            return events;
        }

        let package = decision.package;
        info!(package = %package, reason = ?decision.reason, "Blocking foreground app");

        let activation = self
            .actuator
            .activate(&package, false, now_mono, &mut self.scheduler);
        events.extend(self.handle_activation(&package, activation, Some((decision.reason, now))));

        // Always verify, so a debounced repeat still gets corrected
        let session_id = self.arm_verification(&package, now_mono);
        events.push(CoreEvent::VerificationStarted {
            session_id,
            package,
        });

        events
    }

    /// Translate an activation result into events, audit entries and the
    /// block log. `blocked` carries the block reason and wall time for
    /// first activations; forced retries pass `None`.
    fn handle_activation(
        &self,
        package: &PackageId,
        activation: Activation,
        blocked: Option<(BlockReason, DateTime<Local>)>,
    ) -> Vec<CoreEvent> {
        let mut events = Vec::new();

        match activation {
            Activation::Presented {
                id,
                stale_reset,
                replaced,
            } => {
                if stale_reset {
                    let _ = self.store.append_audit(AuditEvent::new(
                        AuditEventType::StalePresentationReset {
                            package: package.clone(),
                        },
                    ));
                    events.push(CoreEvent::StalePresentationReset {
                        package: package.clone(),
                    });
                }
                events.extend(replaced);

                if let Some((reason, at)) = blocked {
                    if let Err(e) = self.host.recorder.record_block_event(package, at) {
                        warn!(package = %package, error = %e, "Failed to record block event");
                    }
                    let _ = self.store.append_audit(AuditEvent::new(AuditEventType::AppBlocked {
                        package: package.clone(),
                        reason,
                    }));
                    events.push(CoreEvent::Blocked {
                        package: package.clone(),
                        reason,
                        presentation_id: id,
                    });
                }
            }
            Activation::Suppressed(reason) => {
                events.push(CoreEvent::ActivationSuppressed {
                    package: package.clone(),
                    reason,
                });
            }
            Activation::Failed(error) => {
                let _ = self.store.append_audit(AuditEvent::new(
                    AuditEventType::PresentationFailed {
                        package: package.clone(),
                        error: error.clone(),
                    },
                ));
                events.push(CoreEvent::PresentationFailed {
                    package: package.clone(),
                    error,
                });
            }
        }

        events
    }

    fn maybe_request_fix(
        &mut self,
        assessment: LocationAssessment,
        now_mono: MonotonicInstant,
    ) -> Option<CoreEvent> {
        if !assessment.needs_fresh_fix() {
            return None;
        }
        if !self.host.capabilities.can_access_location {
            debug!("No location access, not requesting a fix");
            return None;
        }
        if let Some(last) = self.last_fix_request
            && now_mono.duration_since(last) < FIX_REQUEST_COOLDOWN
        {
            return None;
        }

        self.last_fix_request = Some(now_mono);
        info!(assessment = ?assessment, "Requesting a fresh location fix");
        Some(CoreEvent::FreshFixRequested { assessment })
    }

    /// True while a presentation or verification session exists for `package`
    pub fn is_engine_blocking(&self, package: &PackageId) -> bool {
        self.actuator.is_showing_for(package) || self.supervisor.is_verifying(package)
    }

    /// Start a verification session for `package`
    pub fn start_verification(
        &mut self,
        package: &PackageId,
        now_mono: MonotonicInstant,
    ) -> Result<SessionId, SafeguardError> {
        if package.is_empty() {
            return Err(SafeguardError::InvalidPackage(package.to_string()));
        }
        if package == &self.own_package || is_system_critical(package) {
            return Err(SafeguardError::ExemptPackage(package.clone()));
        }
        Ok(self.arm_verification(package, now_mono))
    }

    fn arm_verification(&mut self, package: &PackageId, now_mono: MonotonicInstant) -> SessionId {
        self.supervisor
            .start_session(package, now_mono, &mut self.scheduler)
    }

    /// Feed the result of a positioning request
    pub fn on_location_signal(&mut self, signal: LocationSignal) -> Vec<CoreEvent> {
        match signal {
            LocationSignal::Fix(fix) => {
                self.last_fix_request = None;
                let provider = fix.provider;
                let accuracy_m = fix.accuracy_m;
                if self.location.record_fix(fix) {
                    vec![CoreEvent::LocationUpdated {
                        provider,
                        accuracy_m,
                    }]
                } else {
                    Vec::new()
                }
            }
            LocationSignal::Failed { provider, error } => {
                warn!(provider = %provider, error = %error, "Location provider failed");
                Vec::new()
            }
        }
    }

    /// Seed the best fix from the providers' cached locations
    pub fn seed_location(&mut self, providers: &[Arc<dyn LocationProvider>]) -> Vec<CoreEvent> {
        if !self.location.seed_from_last_known(providers) {
            return Vec::new();
        }
        self.location
            .best()
            .map(|fix| CoreEvent::LocationUpdated {
                provider: fix.provider,
                accuracy_m: fix.accuracy_m,
            })
            .into_iter()
            .collect()
    }

    /// Handle a button press on the block message
    pub fn on_user_action(&mut self, action: UserAction, now_mono: MonotonicInstant) -> Vec<CoreEvent> {
        self.actuator
            .on_user_action(action, now_mono, &mut self.scheduler)
    }

    /// Run every timer due at `now_mono`
    pub fn tick(&mut self, now_mono: MonotonicInstant) -> Vec<CoreEvent> {
        let mut events = Vec::new();

        // Popped one at a time so cancellations made while dispatching hold
        while let Some(due) = self.scheduler.pop_next_due(now_mono) {
            match due.task {
                EngineTask::Presentation { id, step } => {
                    events.extend(self.actuator.on_step(id, step, due.at, &mut self.scheduler));
                }
                EngineTask::VerificationCheck { session_id } => {
                    events.extend(self.run_check(session_id, due.at));
                }
            }
        }

        events
    }

    fn run_check(&mut self, session_id: SessionId, at: MonotonicInstant) -> Vec<CoreEvent> {
        let presenting = self.actuator.is_presenting();
        let foreground = if self.host.capabilities.can_query_foreground {
            self.host.foreground.current_foreground()
        } else {
            ForegroundQuery::Unknown
        };

        let Some(verdict) =
            self.supervisor
                .on_check(session_id, presenting, &foreground, at, &mut self.scheduler)
        else {
            return Vec::new();
        };

        match verdict {
            CheckVerdict::Retry { target, attempt } => {
                let mut events = vec![CoreEvent::VerificationRetried {
                    session_id,
                    package: target.clone(),
                    attempt,
                }];
                let activation = self.actuator.activate(&target, true, at, &mut self.scheduler);
                events.extend(self.handle_activation(&target, activation, None));
                events
            }
            CheckVerdict::Finished { target, outcome } => {
                let _ = self.store.append_audit(AuditEvent::new(
                    AuditEventType::VerificationFinished {
                        session_id,
                        package: target.clone(),
                        outcome,
                    },
                ));
                vec![CoreEvent::VerificationFinished {
                    session_id,
                    package: target,
                    outcome,
                }]
            }
        }
    }

    /// Earliest pending timer, for callers that sleep between ticks
    pub fn next_deadline(&self) -> Option<MonotonicInstant> {
        self.scheduler.next_deadline()
    }

    /// Re-read the policy after an external change
    pub fn on_policy_changed(&mut self) -> CoreEvent {
        let snapshot = self.policy.snapshot();
        let blocked = snapshot.blocked_packages.len();
        let hidden = snapshot.hidden_packages.len();

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::PolicyLoaded { blocked, hidden }));
        info!(blocked, hidden, "Policy reloaded");

        CoreEvent::PolicyReloaded { blocked, hidden }
    }

    /// Snapshot for status displays
    pub fn status(&self, now: DateTime<Local>, now_mono: MonotonicInstant) -> EngineStatus {
        let policy = self.policy.snapshot();
        EngineStatus {
            enforcement_enabled: policy.enforcement_enabled,
            presentation: self.actuator.current(now_mono),
            verifications: self.supervisor.infos(now_mono),
            best_fix: self.location.best().cloned(),
            location: self.location.assess(&policy, now),
        }
    }

    /// Tear down the presentation and every verification session
    pub fn shutdown(&mut self, now_mono: MonotonicInstant) -> Vec<CoreEvent> {
        let cancelled = self.supervisor.cancel_all(&mut self.scheduler);
        let dismissed = self
            .actuator
            .deactivate(DismissCause::Shutdown, now_mono, &mut self.scheduler);
        info!(
            cancelled_sessions = cancelled,
            pending_timers = self.scheduler.len(),
            "Enforcement engine shut down"
        );
        dismissed.into_iter().collect()
    }
}
