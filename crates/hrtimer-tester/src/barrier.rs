//! Completion barrier between the timer callback and the blocked caller.
//!
//! The barrier is a single-producer/single-consumer signal: the callback
//! marks the chain complete exactly once, the chain driver blocks until that
//! happens or until an external party interrupts the wait. Waiting parks the
//! caller on a condition variable; there is no polling.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of blocking on the barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The callback signalled completion.
    Completed,
    /// An [`InterruptHandle`] released the wait early.
    Interrupted,
    /// The wait deadline passed before either of the above.
    TimedOut,
}

#[derive(Debug, Default)]
struct BarrierState {
    completed: bool,
    interrupted: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<BarrierState>,
    cond: Condvar,
}

/// Blocking side of the barrier, owned by the chain driver.
#[derive(Debug, Default)]
pub struct CompletionBarrier {
    shared: Arc<Shared>,
}

impl CompletionBarrier {
    /// Create a barrier in the pending state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle the timer callback uses to signal completion.
    pub fn signal(&self) -> CompletionSignal {
        CompletionSignal {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Handle that any thread can use to abandon the current run.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Clear completion and interruption for a fresh run.
    pub fn reset(&self) {
        let mut state = self.shared.state.lock();
        state.completed = false;
        state.interrupted = false;
    }

    /// Clear completion before arming the next sub-chain.
    ///
    /// Interruption is left untouched; it stays set until [`reset`](Self::reset).
    pub fn rearm(&self) {
        self.shared.state.lock().completed = false;
    }

    /// Whether the run has been interrupted.
    pub fn is_interrupted(&self) -> bool {
        self.shared.state.lock().interrupted
    }

    /// Block until completion or interruption.
    pub fn wait(&self) -> WaitOutcome {
        let mut state = self.shared.state.lock();
        loop {
            if let Some(outcome) = settled(&state) {
                return outcome;
            }
            self.shared.cond.wait(&mut state);
        }
    }

    /// Block until completion, interruption, or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> WaitOutcome {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.wait();
        };

        let mut state = self.shared.state.lock();
        loop {
            if let Some(outcome) = settled(&state) {
                return outcome;
            }
            if self
                .shared
                .cond
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return settled(&state).unwrap_or(WaitOutcome::TimedOut);
            }
        }
    }
}

fn settled(state: &BarrierState) -> Option<WaitOutcome> {
    if state.completed {
        Some(WaitOutcome::Completed)
    } else if state.interrupted {
        Some(WaitOutcome::Interrupted)
    } else {
        None
    }
}

/// Callback-side handle. Signalling takes a short uncontended lock and
/// never waits on the caller.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    shared: Arc<Shared>,
}

impl CompletionSignal {
    /// Mark the current sub-chain complete and wake the caller.
    pub fn signal_complete(&self) {
        self.shared.state.lock().completed = true;
        self.shared.cond.notify_all();
    }
}

/// External handle used to abandon a run mid-chain.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    shared: Arc<Shared>,
}

impl InterruptHandle {
    /// Release the caller's wait early. Safe to call at any time and more
    /// than once.
    pub fn interrupt(&self) {
        self.shared.state.lock().interrupted = true;
        self.shared.cond.notify_all();
    }
}
