//! Bounded self-verification of block presentations
//!
//! After a block, a session waits out a grace delay and then checks once per
//! interval that a presentation is up and the blocked app is no longer in the
//! foreground. A negative check asks the engine to re-activate the block.
//! The session ends on success or when either the attempt limit or the time
//! budget runs out, whichever comes first.

use safeguard_api::{
    ForegroundQuery, VerificationFailure, VerificationInfo, VerificationOutcome, VerificationState,
};
use safeguard_config::EnforcementTimings;
use safeguard_util::{MonotonicInstant, PackageId, SessionId};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::{EngineTask, Scheduler, TimerGroup};

/// A running verification session
#[derive(Debug, Clone)]
pub struct VerificationSession {
    pub id: SessionId,
    pub target: PackageId,
    pub started_at: MonotonicInstant,
    pub attempts: u32,
    pub state: VerificationState,
}

impl VerificationSession {
    fn info(&self, now: MonotonicInstant) -> VerificationInfo {
        VerificationInfo {
            session_id: self.id,
            target: self.target.clone(),
            state: self.state,
            attempts: self.attempts,
            elapsed: now.duration_since(self.started_at),
        }
    }
}

/// What a check tick concluded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckVerdict {
    /// Session ended; it has been discarded
    Finished {
        target: PackageId,
        outcome: VerificationOutcome,
    },
    /// Block did not stick: re-activate and check again
    Retry { target: PackageId, attempt: u32 },
}

/// Owns every verification session, at most one per target package
pub struct VerificationSupervisor {
    timings: EnforcementTimings,
    sessions: HashMap<SessionId, VerificationSession>,
}

impl VerificationSupervisor {
    pub fn new(timings: EnforcementTimings) -> Self {
        Self {
            timings,
            sessions: HashMap::new(),
        }
    }

    pub fn set_timings(&mut self, timings: EnforcementTimings) {
        self.timings = timings;
    }

    /// Start verifying `target`, replacing any session already running for it
    pub fn start_session(
        &mut self,
        target: &PackageId,
        now: MonotonicInstant,
        scheduler: &mut Scheduler<EngineTask>,
    ) -> SessionId {
        if let Some(old) = self.session_for(target).map(|s| s.id) {
            self.cancel(old, scheduler);
            debug!(session_id = %old, package = %target, "Verification session replaced");
        }

        let id = SessionId::new();
        self.sessions.insert(
            id,
            VerificationSession {
                id,
                target: target.clone(),
                started_at: now,
                attempts: 0,
                state: VerificationState::Armed,
            },
        );
        scheduler.schedule(
            TimerGroup::Verification(id),
            now + self.timings.verify_grace,
            EngineTask::VerificationCheck { session_id: id },
        );

        info!(session_id = %id, package = %target, "Verification armed");
        id
    }

    /// Run one check tick.
    ///
    /// `presenting` is whether a block presentation is live; `foreground` is
    /// the current foreground app, `Unknown` when it cannot be queried.
    /// Returns `None` for a session that no longer exists.
    pub fn on_check(
        &mut self,
        session_id: SessionId,
        presenting: bool,
        foreground: &ForegroundQuery,
        now: MonotonicInstant,
        scheduler: &mut Scheduler<EngineTask>,
    ) -> Option<CheckVerdict> {
        let max_attempts = self.timings.verify_max_attempts;
        let budget = self.timings.verify_budget;
        let session = self.sessions.get_mut(&session_id)?;
        session.state = VerificationState::Checking;

        let elapsed = now.duration_since(session.started_at);
        if elapsed >= budget {
            let attempts = session.attempts;
            return Some(self.finish(
                session_id,
                VerificationOutcome::Failed {
                    attempts,
                    cause: VerificationFailure::BudgetExhausted,
                },
            ));
        }

        session.attempts += 1;
        let attempts = session.attempts;
        let target_in_front = foreground.is(&session.target);

        if presenting && !target_in_front {
            return Some(self.finish(session_id, VerificationOutcome::Succeeded { attempts }));
        }

        if attempts >= max_attempts {
            return Some(self.finish(
                session_id,
                VerificationOutcome::Failed {
                    attempts,
                    cause: VerificationFailure::AttemptsExhausted,
                },
            ));
        }

        debug!(
            session_id = %session_id,
            package = %session.target,
            attempt = attempts,
            presenting,
            target_in_front,
            "Block did not stick, retrying"
        );
        let target = session.target.clone();
        scheduler.schedule(
            TimerGroup::Verification(session_id),
            now + self.timings.verify_interval,
            EngineTask::VerificationCheck { session_id },
        );
        Some(CheckVerdict::Retry {
            target,
            attempt: attempts,
        })
    }

    fn finish(&mut self, session_id: SessionId, outcome: VerificationOutcome) -> CheckVerdict {
        // Terminal: the session is discarded, never re-armed
        let target = self
            .sessions
            .remove(&session_id)
            .map(|s| s.target)
            .unwrap_or_else(|| PackageId::new(""));

        match outcome {
            VerificationOutcome::Succeeded { attempts } => {
                info!(session_id = %session_id, package = %target, attempts, "Block verified");
            }
            VerificationOutcome::Failed { attempts, cause } => {
                warn!(
                    session_id = %session_id,
                    package = %target,
                    attempts,
                    cause = ?cause,
                    "Block verification failed"
                );
            }
        }

        CheckVerdict::Finished { target, outcome }
    }

    /// Drop a session and its pending checks
    pub fn cancel(&mut self, session_id: SessionId, scheduler: &mut Scheduler<EngineTask>) -> bool {
        scheduler.cancel_group(TimerGroup::Verification(session_id));
        self.sessions.remove(&session_id).is_some()
    }

    pub fn cancel_all(&mut self, scheduler: &mut Scheduler<EngineTask>) -> usize {
        let ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        for id in &ids {
            self.cancel(*id, scheduler);
        }
        ids.len()
    }

    pub fn session(&self, session_id: SessionId) -> Option<&VerificationSession> {
        self.sessions.get(&session_id)
    }

    pub fn session_for(&self, target: &PackageId) -> Option<&VerificationSession> {
        self.sessions.values().find(|s| &s.target == target)
    }

    pub fn is_verifying(&self, target: &PackageId) -> bool {
        self.session_for(target).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Running sessions, oldest first
    pub fn infos(&self, now: MonotonicInstant) -> Vec<VerificationInfo> {
        let mut sessions: Vec<_> = self.sessions.values().collect();
        sessions.sort_by_key(|s| s.started_at);
        sessions.into_iter().map(|s| s.info(now)).collect()
    }
}
