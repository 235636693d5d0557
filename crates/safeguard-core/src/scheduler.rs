//! Deterministic timer queue with cancel groups
//!
//! Every delayed step of the engine (presentation stages, verification ticks)
//! is a timer in one of these queues. Timers belong to a group so a whole
//! presentation or verification session can be cancelled in one call, which
//! makes it impossible to leave a stale step behind.

use safeguard_util::{MonotonicInstant, PresentationId, SessionId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Handle for a scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// Cancel group a timer belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerGroup {
    Presentation(PresentationId),
    Verification(SessionId),
}

/// A timer whose deadline has passed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueTimer<T> {
    pub id: TimerId,
    pub group: TimerGroup,
    pub at: MonotonicInstant,
    pub task: T,
}

#[derive(Debug)]
pub struct Scheduler<T> {
    next_id: u64,
    queue: BTreeMap<(MonotonicInstant, TimerId), (TimerGroup, T)>,
    deadlines: HashMap<TimerId, MonotonicInstant>,
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            queue: BTreeMap::new(),
            deadlines: HashMap::new(),
        }
    }

    pub fn schedule(&mut self, group: TimerGroup, at: MonotonicInstant, task: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.queue.insert((at, id), (group, task));
        self.deadlines.insert(id, at);
        id
    }

    /// Cancel one timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.deadlines.remove(&id) {
            Some(at) => self.queue.remove(&(at, id)).is_some(),
            None => false,
        }
    }

    /// Cancel every pending timer of `group`. Returns how many were removed.
    pub fn cancel_group(&mut self, group: TimerGroup) -> usize {
        let before = self.queue.len();
        let deadlines = &mut self.deadlines;
        self.queue.retain(|(_, id), (g, _)| {
            if *g == group {
                deadlines.remove(id);
                false
            } else {
                true
            }
        });
        before - self.queue.len()
    }

    /// Remove and return the earliest timer due at `now`, if any.
    ///
    /// Ties on the deadline resolve in scheduling order.
    pub fn pop_next_due(&mut self, now: MonotonicInstant) -> Option<DueTimer<T>> {
        let (&(at, _), _) = self.queue.first_key_value()?;
        if at > now {
            return None;
        }
        let ((at, id), (group, task)) = self.queue.pop_first()?;
        self.deadlines.remove(&id);
        Some(DueTimer {
            id,
            group,
            at,
            task,
        })
    }

    /// Drain every timer due at `now`, in firing order
    pub fn pop_due(&mut self, now: MonotonicInstant) -> Vec<DueTimer<T>> {
        std::iter::from_fn(|| self.pop_next_due(now)).collect()
    }

    pub fn pending_in_group(&self, group: TimerGroup) -> usize {
        self.queue.values().filter(|(g, _)| *g == group).count()
    }

    /// Deadline of the earliest pending timer
    pub fn next_deadline(&self) -> Option<MonotonicInstant> {
        self.queue.keys().next().map(|(at, _)| *at)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn fires_in_deadline_then_insertion_order() {
        let t0 = MonotonicInstant::now();
        let group = TimerGroup::Presentation(PresentationId::new());
        let mut sched = Scheduler::new();

        sched.schedule(group, t0 + ms(450), "message");
        sched.schedule(group, t0 + ms(350), "home");
        sched.schedule(group, t0 + ms(350), "home-2");

        assert!(sched.pop_due(t0 + ms(100)).is_empty());

        let due: Vec<_> = sched.pop_due(t0 + ms(450)).into_iter().map(|d| d.task).collect();
        assert_eq!(due, vec!["home", "home-2", "message"]);
        assert!(sched.is_empty());
    }

    #[test]
    fn cancel_single_timer() {
        let t0 = MonotonicInstant::now();
        let group = TimerGroup::Verification(SessionId::new());
        let mut sched = Scheduler::new();

        let a = sched.schedule(group, t0 + ms(10), 1);
        let b = sched.schedule(group, t0 + ms(20), 2);

        assert!(sched.cancel(a));
        assert!(!sched.cancel(a));
        assert_eq!(sched.next_deadline(), Some(t0 + ms(20)));

        let due = sched.pop_due(t0 + ms(30));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, b);
        assert!(!sched.cancel(b));
    }

    #[test]
    fn cancel_group_leaves_other_groups() {
        let t0 = MonotonicInstant::now();
        let first = TimerGroup::Presentation(PresentationId::new());
        let second = TimerGroup::Presentation(PresentationId::new());
        let mut sched = Scheduler::new();

        sched.schedule(first, t0 + ms(350), 'h');
        sched.schedule(first, t0 + ms(450), 'm');
        sched.schedule(second, t0 + ms(400), 'x');

        assert_eq!(sched.cancel_group(first), 2);
        assert_eq!(sched.pending_in_group(first), 0);
        assert_eq!(sched.pending_in_group(second), 1);
        assert_eq!(sched.cancel_group(first), 0);

        let due = sched.pop_due(t0 + ms(1000));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].group, second);
    }

    #[test]
    fn cancellation_between_pops_is_honored() {
        let t0 = MonotonicInstant::now();
        let group = TimerGroup::Presentation(PresentationId::new());
        let mut sched = Scheduler::new();

        sched.schedule(group, t0 + ms(1), "first");
        sched.schedule(group, t0 + ms(2), "second");

        let first = sched.pop_next_due(t0 + ms(5)).unwrap();
        assert_eq!(first.task, "first");
        // Dispatching the first timer tears the group down
        sched.cancel_group(group);
        assert!(sched.pop_next_due(t0 + ms(5)).is_none());
    }
}
