//! Trailing debounce for render triggers.
//!
//! Rapid edits are coalesced into one trigger that fires once the edits stop
//! for the configured delay. Deliberate actions (type or format changes) use
//! [`Scheduler::fire_now`] to bypass the delay. A newer trigger always cancels
//! the pending one. All triggers run on the scheduler's worker thread, one at
//! a time.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

type Trigger = Box<dyn FnOnce() + Send + 'static>;

/// Pending trigger waiting for its deadline.
struct PendingTrigger {
    trigger: Trigger,
    deadline: Instant,
}

#[derive(Default)]
struct SchedulerState {
    pending: Option<PendingTrigger>,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<SchedulerState>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the pending trigger. Returns whether one was superseded.
    fn replace(&self, trigger: Trigger, deadline: Instant) -> bool {
        let superseded = self
            .lock()
            .pending
            .replace(PendingTrigger { trigger, deadline })
            .is_some();
        self.wake.notify_one();
        superseded
    }

    /// Take the pending trigger if its deadline has passed.
    fn take_ready(state: &mut SchedulerState, now: Instant) -> Option<Trigger> {
        if state.pending.as_ref()?.deadline <= now {
            state.pending.take().map(|pending| pending.trigger)
        } else {
            None
        }
    }
}

/// Debouncing trigger scheduler.
///
/// Dropping the scheduler cancels any pending trigger and joins the worker.
pub struct Scheduler {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Start a scheduler with its worker thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn new() -> std::io::Result<Self> {
        let shared = Arc::new(Shared::default());
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("ked-scheduler".to_owned())
            .spawn(move || run(&worker_shared))?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Schedule `trigger` to fire after `delay` with no newer schedule.
    ///
    /// Supersedes any pending trigger and restarts the delay.
    pub fn schedule(&self, delay: Duration, trigger: impl FnOnce() + Send + 'static) {
        let superseded = self.shared.replace(Box::new(trigger), Instant::now() + delay);
        tracing::trace!(delay_ms = delay.as_millis(), superseded, "Scheduled trigger");
    }

    /// Fire `trigger` immediately, cancelling any pending trigger.
    pub fn fire_now(&self, trigger: impl FnOnce() + Send + 'static) {
        let superseded = self.shared.replace(Box::new(trigger), Instant::now());
        tracing::trace!(superseded, "Firing trigger now");
    }

    /// Cancel the pending trigger. Returns whether one was pending.
    pub fn cancel(&self) -> bool {
        let cancelled = self.shared.lock().pending.take().is_some();
        if cancelled {
            tracing::trace!("Cancelled pending trigger");
        }
        cancelled
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.shared.lock().pending.is_some()
    }

    /// Deadline of the pending trigger, if any.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.shared.lock().pending.as_ref().map(|p| p.deadline)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        {
            let mut state = self.shared.lock();
            state.shutdown = true;
            state.pending = None;
        }
        self.shared.wake.notify_one();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::warn!("Scheduler worker panicked");
        }
    }
}

fn run(shared: &Shared) {
    let mut state = shared.lock();
    loop {
        if state.shutdown {
            return;
        }

        let now = Instant::now();
        if let Some(trigger) = Shared::take_ready(&mut state, now) {
            drop(state);
            trigger();
            state = shared.lock();
            continue;
        }

        state = match state.pending.as_ref().map(|p| p.deadline) {
            Some(deadline) => {
                shared
                    .wake
                    .wait_timeout(state, deadline.saturating_duration_since(now))
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => shared
                .wake
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner),
        };
    }
}
