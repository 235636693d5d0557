//! Block presentation: absorb input, send the app home, show the message

use safeguard_api::{PresentationInfo, PresentationStage, UserAction};
use safeguard_config::EnforcementTimings;
use safeguard_host_api::{BlockMessage, BlockPresenter};
use safeguard_util::{MonotonicInstant, PackageId, PresentationId, SafeguardError};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{CoreEvent, DismissCause, EngineTask, Scheduler, SuppressReason, TimerGroup};

/// Delayed steps of one presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationStep {
    GoHome,
    ShowMessage,
    AutoDismiss,
}

/// Result of an activation request
#[derive(Debug, Clone, PartialEq)]
pub enum Activation {
    Presented {
        id: PresentationId,
        /// A flagged presentation with no live surface was reset first
        stale_reset: bool,
        /// Dismissal of the presentation a forced activation tore down
        replaced: Option<CoreEvent>,
    },
    Suppressed(SuppressReason),
    Failed(String),
}

impl Activation {
    pub fn is_presented(&self) -> bool {
        matches!(self, Activation::Presented { .. })
    }
}

#[derive(Debug, Clone)]
struct ActivePresentation {
    id: PresentationId,
    target: PackageId,
    stage: PresentationStage,
    shown_at: MonotonicInstant,
}

impl ActivePresentation {
    fn group(&self) -> TimerGroup {
        TimerGroup::Presentation(self.id)
    }
}

/// Human-readable app name when the package manager has no label
pub fn fallback_display_name(package: &PackageId) -> String {
    let segment = package.last_segment();
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "this app".to_string(),
    }
}

/// Owner of the single, exclusive block surface
pub struct BlockActuator {
    presenter: Arc<dyn BlockPresenter>,
    timings: EnforcementTimings,
    can_open_app_details: bool,
    showing: Option<ActivePresentation>,
    last_close: Option<MonotonicInstant>,
}

impl BlockActuator {
    pub fn new(
        presenter: Arc<dyn BlockPresenter>,
        timings: EnforcementTimings,
        can_open_app_details: bool,
    ) -> Self {
        Self {
            presenter,
            timings,
            can_open_app_details,
            showing: None,
            last_close: None,
        }
    }

    pub fn set_timings(&mut self, timings: EnforcementTimings) {
        self.timings = timings;
    }

    /// Presentation flag is set
    pub fn is_showing(&self) -> bool {
        self.showing.is_some()
    }

    pub fn is_showing_for(&self, package: &PackageId) -> bool {
        self.showing.as_ref().is_some_and(|p| &p.target == package)
    }

    /// Flag is set and the surface is really attached
    pub fn is_presenting(&self) -> bool {
        self.showing.is_some() && self.presenter.is_surface_mounted()
    }

    pub fn current(&self, now: MonotonicInstant) -> Option<PresentationInfo> {
        self.showing.as_ref().map(|p| PresentationInfo {
            target: p.target.clone(),
            stage: p.stage,
            shown_for: now.duration_since(p.shown_at),
        })
    }

    pub fn display_name(&self, package: &PackageId) -> String {
        self.presenter
            .display_name(package)
            .filter(|label| !label.trim().is_empty())
            .unwrap_or_else(|| fallback_display_name(package))
    }

    /// Request a block presentation for `target`.
    ///
    /// `forced` skips the debounce and replaces whatever is on screen.
    pub fn activate(
        &mut self,
        target: &PackageId,
        forced: bool,
        now: MonotonicInstant,
        scheduler: &mut Scheduler<EngineTask>,
    ) -> Activation {
        let mut stale_reset = false;
        let mut replaced = None;

        if forced {
            replaced = self.dismiss(DismissCause::Superseded, now, scheduler);
        } else {
            if let Some(current) = &self.showing {
                if self.presenter.is_surface_mounted() {
                    debug!(package = %target, showing = %current.target, "Presentation already on screen");
                    return Activation::Suppressed(SuppressReason::AlreadyShowing);
                }

                warn!(
                    presentation_id = %current.id,
                    package = %current.target,
                    "Presentation flagged as showing but surface is gone, resetting"
                );
                let group = current.group();
                self.showing = None;
                scheduler.cancel_group(group);
                stale_reset = true;
            }

            // A stale flag is never a duplicate, even inside the window
            if !stale_reset
                && let Some(closed_at) = self.last_close
                && now.duration_since(closed_at) <= self.timings.debounce
            {
                debug!(package = %target, "Activation debounced");
                return Activation::Suppressed(SuppressReason::Debounced);
            }
        }

        match self.present(target, now, scheduler) {
            Ok(id) => Activation::Presented {
                id,
                stale_reset,
                replaced,
            },
            Err(e) => {
                warn!(package = %target, error = %e, "Block presentation failed");
                Activation::Failed(e.to_string())
            }
        }
    }

    fn present(
        &mut self,
        target: &PackageId,
        now: MonotonicInstant,
        scheduler: &mut Scheduler<EngineTask>,
    ) -> Result<PresentationId, SafeguardError> {
        let id = PresentationId::new();

        if let Err(e) = self.presenter.mount_absorbing_surface(target) {
            self.presenter.remove_surface();
            return Err(SafeguardError::presentation(e.to_string()));
        }

        let group = TimerGroup::Presentation(id);
        let t = &self.timings;
        for (delay, step) in [
            (t.home_delay, PresentationStep::GoHome),
            (t.message_delay, PresentationStep::ShowMessage),
            (t.auto_dismiss, PresentationStep::AutoDismiss),
        ] {
            scheduler.schedule(group, now + delay, EngineTask::Presentation { id, step });
        }

        self.showing = Some(ActivePresentation {
            id,
            target: target.clone(),
            stage: PresentationStage::Absorbing,
            shown_at: now,
        });

        info!(presentation_id = %id, package = %target, "Absorbing surface mounted");
        Ok(id)
    }

    /// Tear the presentation down. Safe to call at any point, any number of times.
    pub fn deactivate(
        &mut self,
        cause: DismissCause,
        now: MonotonicInstant,
        scheduler: &mut Scheduler<EngineTask>,
    ) -> Option<CoreEvent> {
        self.last_close = Some(now);
        self.dismiss(cause, now, scheduler)
    }

    /// Remove the current presentation without touching the debounce clock
    fn dismiss(
        &mut self,
        cause: DismissCause,
        now: MonotonicInstant,
        scheduler: &mut Scheduler<EngineTask>,
    ) -> Option<CoreEvent> {
        let presentation = self.showing.take()?;

        scheduler.cancel_group(presentation.group());
        self.presenter.remove_surface();

        let shown_for = now.duration_since(presentation.shown_at);
        info!(
            presentation_id = %presentation.id,
            package = %presentation.target,
            cause = ?cause,
            shown_ms = shown_for.as_millis() as u64,
            "Presentation dismissed"
        );

        Some(CoreEvent::PresentationDismissed {
            presentation_id: presentation.id,
            package: presentation.target,
            cause,
            shown_for,
        })
    }

    /// Run a due presentation step. Steps of a presentation that is no
    /// longer current are dropped.
    pub fn on_step(
        &mut self,
        id: PresentationId,
        step: PresentationStep,
        now: MonotonicInstant,
        scheduler: &mut Scheduler<EngineTask>,
    ) -> Option<CoreEvent> {
        let current = self.showing.as_ref().filter(|p| p.id == id)?;
        let target = current.target.clone();

        match step {
            PresentationStep::GoHome => {
                if let Err(e) = self.presenter.go_home() {
                    warn!(presentation_id = %id, error = %e, "Failed to navigate home");
                }
                Some(CoreEvent::SentHome { presentation_id: id })
            }
            PresentationStep::ShowMessage => {
                let app_name = self.display_name(&target);
                let message = BlockMessage::failing_app(target.clone(), app_name.clone());
                if let Err(e) = self.presenter.show_block_message(&message) {
                    // Absorbing surface stays up until dismissal
                    warn!(presentation_id = %id, error = %e, "Failed to show block message");
                    return None;
                }
                if let Some(p) = self.showing.as_mut() {
                    p.stage = PresentationStage::Message;
                }
                Some(CoreEvent::BlockMessageShown {
                    presentation_id: id,
                    package: target,
                    app_name,
                })
            }
            PresentationStep::AutoDismiss => {
                let event = self.deactivate(DismissCause::AutoDismiss, now, scheduler);
                if let Err(e) = self.presenter.go_home() {
                    warn!(presentation_id = %id, error = %e, "Failed to navigate home after dismissal");
                }
                event
            }
        }
    }

    /// Handle a button press on the block message
    pub fn on_user_action(
        &mut self,
        action: UserAction,
        now: MonotonicInstant,
        scheduler: &mut Scheduler<EngineTask>,
    ) -> Vec<CoreEvent> {
        let Some(target) = self.showing.as_ref().map(|p| p.target.clone()) else {
            debug!(action = ?action, "User action with no presentation showing");
            return Vec::new();
        };

        match action {
            UserAction::Close => {
                let event = self.deactivate(DismissCause::UserClose, now, scheduler);
                if let Err(e) = self.presenter.go_home() {
                    warn!(error = %e, "Failed to navigate home on close");
                }
                event.into_iter().collect()
            }
            UserAction::AppInfo => {
                let opened = self.can_open_app_details
                    && match self.presenter.open_app_details(&target) {
                        Ok(()) => true,
                        Err(e) => {
                            warn!(package = %target, error = %e, "Failed to open app details");
                            false
                        }
                    };
                let event = self.deactivate(DismissCause::AppInfo, now, scheduler);
                if !opened && let Err(e) = self.presenter.go_home() {
                    warn!(error = %e, "Failed to navigate home");
                }
                event.into_iter().collect()
            }
        }
    }
}
