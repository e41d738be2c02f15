use std::{
    cmp::Ordering,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering as AtomicOrdering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::{Duration, Instant},
};

use crate::Action;

/// Shared, independently lockable action list of a [`Batch`].
///
/// The execution loop clones this handle out of the registry and runs it
/// without holding the registry lock. Cancelling a batch invalidates the
/// handle so a pass that already picked it up skips it.
#[derive(Clone, Default)]
pub struct BatchHandle {
    shared: Arc<BatchShared>,
}

#[derive(Default)]
struct BatchShared {
    actions: Mutex<Vec<Action>>,
    // Appends land here so registration never waits on a running pass.
    pending: Mutex<Vec<Action>>,
    cancelled: AtomicBool,
}

impl BatchHandle {
    fn with_action(action: Action) -> Self {
        let handle = Self::default();
        handle.lock_actions().push(action);
        handle
    }

    /// Appends an action. An append made while the batch is executing becomes
    /// visible on the next pass.
    pub fn add_action(&self, action: Action) {
        self.lock_pending().push(action);
    }

    /// Number of actions, including appends not yet picked up by a pass.
    /// Must not be called from inside one of this batch's own actions.
    pub fn len(&self) -> usize {
        self.lock_actions().len() + self.lock_pending().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs every action in append order. Returns how many completed without
    /// panicking; an invalidated batch runs nothing.
    pub fn execute_all(&self) -> usize {
        let mut actions = self.lock_for_pass();
        if self.is_cancelled() {
            return 0;
        }
        actions
            .iter_mut()
            .map(|action| action.execute())
            .filter(|completed| *completed)
            .count()
    }

    /// Same as [`execute_all`](Self::execute_all) but stamps every action with
    /// `correction` first and clears the stamp afterwards.
    pub fn execute_all_with_correction(&self, correction: Duration) -> usize {
        let mut actions = self.lock_for_pass();
        if self.is_cancelled() {
            return 0;
        }
        let mut completed = 0;
        for action in actions.iter_mut() {
            action.set_correction(correction);
            if action.execute() {
                completed += 1;
            }
            action.clear_correction();
        }
        completed
    }

    pub fn invalidate(&self) {
        self.shared.cancelled.store(true, AtomicOrdering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(AtomicOrdering::Acquire)
    }

    /// Locks the action list for a pass after folding in pending appends.
    fn lock_for_pass(&self) -> MutexGuard<'_, Vec<Action>> {
        let mut actions = self.lock_actions();
        let mut pending = self.lock_pending();
        actions.append(&mut pending);
        drop(pending);
        actions
    }

    // Actions catch their own panics, so a poisoned list is still consistent.
    fn lock_actions(&self) -> MutexGuard<'_, Vec<Action>> {
        self.shared
            .actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pending(&self) -> MutexGuard<'_, Vec<Action>> {
        self.shared
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for BatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A named group of actions sharing one schedule.
///
/// Batches order by execution time only.
#[derive(Debug)]
pub struct Batch {
    tag: String,
    interval: Duration,
    looping: bool,
    execution_time: Instant,
    actions: BatchHandle,
}

impl Batch {
    pub fn new(
        tag: impl Into<String>,
        interval: Duration,
        looping: bool,
        execution_time: Instant,
        first: Action,
    ) -> Self {
        Self {
            tag: tag.into(),
            interval,
            looping,
            execution_time,
            actions: BatchHandle::with_action(first),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn execution_time(&self) -> Instant {
        self.execution_time
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.execution_time <= now
    }

    pub fn handle(&self) -> BatchHandle {
        self.actions.clone()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn add_action(&self, action: Action) {
        self.actions.add_action(action);
    }

    pub fn execute_all(&self) -> usize {
        self.actions.execute_all()
    }

    pub fn execute_all_with_correction(&self, correction: Duration) -> usize {
        self.actions.execute_all_with_correction(correction)
    }

    /// Moves a looping batch to `now + interval`. No-op for one-shot batches.
    pub fn advance(&mut self, now: Instant) {
        if self.looping {
            self.execution_time = now + self.interval;
        }
    }
}

impl PartialEq for Batch {
    fn eq(&self, other: &Self) -> bool {
        self.execution_time == other.execution_time
    }
}

impl Eq for Batch {}

impl PartialOrd for Batch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Batch {
    fn cmp(&self, other: &Self) -> Ordering {
        self.execution_time.cmp(&other.execution_time)
    }
}
