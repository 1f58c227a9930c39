//! Deterministic collaborators for exercising the chain driver.
//!
//! [`SimulatedTimer`] fires on its own thread like a real timer, but instead
//! of sleeping it advances a [`ManualClock`] by exactly the requested delay
//! plus a fixed latency. Every measured duration is therefore known in
//! advance, which makes sample counts, markers and totals exactly testable.

use crate::clock::{ClockSource, Timestamp, duration_to_nanos};
use crate::error::{HarnessError, HarnessResult};
use crate::timer::{ExpiryHandler, TimerPrimitive, TimerRestart};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Clock that only moves when told to.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    /// Clock at its origin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        self.nanos
            .fetch_add(duration_to_nanos(duration), Ordering::AcqRel);
    }

    /// Move backward by `duration`, stopping at the origin.
    pub fn rewind(&self, duration: Duration) {
        let step = duration_to_nanos(duration);
        let mut current = self.nanos.load(Ordering::Acquire);
        loop {
            let next = current.saturating_sub(step);
            match self
                .nanos
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Jump to `timestamp`.
    pub fn set(&self, timestamp: Timestamp) {
        self.nanos.store(timestamp.as_nanos(), Ordering::Release);
    }
}

impl ClockSource for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_nanos(self.nanos.load(Ordering::Acquire))
    }
}

#[derive(Debug, Default)]
struct SimShared {
    cancelled: AtomicBool,
    expirations: AtomicU64,
    requested: Mutex<Vec<Duration>>,
    lock: Mutex<()>,
    cond: Condvar,
}

impl SimShared {
    fn park_until_cancelled(&self) {
        let mut guard = self.lock.lock();
        while !self.cancelled.load(Ordering::Acquire) {
            self.cond.wait(&mut guard);
        }
    }
}

/// Timer that advances a [`ManualClock`] instead of waiting.
#[derive(Debug)]
pub struct SimulatedTimer {
    clock: ManualClock,
    latency: Duration,
    pause_after: Option<u64>,
    rewind_at: Option<(u64, Duration)>,
    shared: Arc<SimShared>,
    worker: Option<JoinHandle<()>>,
}

impl SimulatedTimer {
    /// Timer whose every expiration lands `latency` after its deadline.
    pub fn new(clock: ManualClock, latency: Duration) -> Self {
        Self {
            clock,
            latency,
            pause_after: None,
            rewind_at: None,
            shared: Arc::new(SimShared::default()),
            worker: None,
        }
    }

    /// Stop delivering expirations once `count` have fired, until cancelled.
    #[must_use]
    pub fn pause_after(mut self, count: u64) -> Self {
        self.pause_after = Some(count);
        self
    }

    /// On the `expiration`-th firing (1-based), step the clock back by `by`
    /// instead of forward.
    #[must_use]
    pub fn rewind_clock_at(mut self, expiration: u64, by: Duration) -> Self {
        self.rewind_at = Some((expiration, by));
        self
    }

    /// Total expirations delivered since creation.
    pub fn expirations(&self) -> u64 {
        self.shared.expirations.load(Ordering::Acquire)
    }

    /// Every delay the timer was asked to wait, in order.
    pub fn requested_delays(&self) -> Vec<Duration> {
        self.shared.requested.lock().clone()
    }

    /// Read-only view of the expiration count that outlives moves of the
    /// timer into a driver on another thread.
    pub fn observer(&self) -> TimerObserver {
        TimerObserver {
            shared: Arc::clone(&self.shared),
        }
    }

    fn reap(&mut self) {
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::warn!("simulated timer thread panicked");
        }
    }
}

/// Cloneable view of a [`SimulatedTimer`]'s progress.
#[derive(Debug, Clone)]
pub struct TimerObserver {
    shared: Arc<SimShared>,
}

impl TimerObserver {
    /// Total expirations delivered so far.
    pub fn expirations(&self) -> u64 {
        self.shared.expirations.load(Ordering::Acquire)
    }
}

impl TimerPrimitive for SimulatedTimer {
    fn arm(&mut self, delay: Duration, mut handler: Box<dyn ExpiryHandler>) -> HarnessResult {
        if self.is_armed() {
            return Err(HarnessError::TimerBusy);
        }
        self.reap();
        self.shared.cancelled.store(false, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let clock = self.clock.clone();
        let latency = self.latency;
        let pause_after = self.pause_after;
        let rewind_at = self.rewind_at;

        let worker = thread::Builder::new()
            .name("simulated-expiry".into())
            .spawn(move || {
                let mut delay = delay;
                while !shared.cancelled.load(Ordering::Acquire) {
                    shared.requested.lock().push(delay);

                    let fired = shared.expirations.load(Ordering::Acquire);
                    if pause_after.is_some_and(|limit| fired >= limit) {
                        shared.park_until_cancelled();
                        break;
                    }

                    let this = fired.saturating_add(1);
                    match rewind_at {
                        Some((at, by)) if at == this => clock.rewind(by),
                        _ => clock.advance(delay.saturating_add(latency)),
                    }
                    shared.expirations.store(this, Ordering::Release);

                    match handler.on_expire() {
                        TimerRestart::Restart(next) => delay = next,
                        TimerRestart::Stop => break,
                    }
                }
            })
            .map_err(|e| HarnessError::timer_spawn(e.to_string()))?;

        self.worker = Some(worker);
        Ok(())
    }

    fn cancel(&mut self) {
        self.shared.cancelled.store(true, Ordering::Release);
        drop(self.shared.lock.lock());
        self.shared.cond.notify_all();

        let called_from_callback = self
            .worker
            .as_ref()
            .is_some_and(|worker| worker.thread().id() == thread::current().id());
        if !called_from_callback {
            self.reap();
        }
    }

    fn is_armed(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }
}

impl Drop for SimulatedTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_moves_only_when_told() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), Timestamp::ZERO);
        clock.advance(Duration::from_nanos(1_500));
        assert_eq!(clock.now().as_nanos(), 1_500);
        clock.rewind(Duration::from_nanos(500));
        assert_eq!(clock.now().as_nanos(), 1_000);
        clock.rewind(Duration::from_secs(1));
        assert_eq!(clock.now(), Timestamp::ZERO);
        clock.set(Timestamp::from_nanos(42));
        assert_eq!(clock.now().as_nanos(), 42);
    }

    #[test]
    fn test_simulated_timer_advances_clock_by_delay_plus_latency() {
        let clock = ManualClock::new();
        let mut timer = SimulatedTimer::new(clock.clone(), Duration::from_nanos(10));
        let mut remaining = 3;
        let armed = timer.arm(
            Duration::from_nanos(100),
            Box::new(move || {
                remaining -= 1;
                if remaining == 0 {
                    TimerRestart::Stop
                } else {
                    TimerRestart::Restart(Duration::from_nanos(200))
                }
            }),
        );
        assert!(armed.is_ok());
        while timer.is_armed() {
            thread::yield_now();
        }
        timer.cancel();

        assert_eq!(timer.expirations(), 3);
        assert_eq!(clock.now().as_nanos(), 110 + 210 + 210);
        assert_eq!(
            timer.requested_delays(),
            vec![
                Duration::from_nanos(100),
                Duration::from_nanos(200),
                Duration::from_nanos(200)
            ]
        );
    }

    #[test]
    fn test_pause_holds_until_cancel() {
        let clock = ManualClock::new();
        let mut timer = SimulatedTimer::new(clock, Duration::ZERO).pause_after(2);
        let armed = timer.arm(
            Duration::from_nanos(100),
            Box::new(|| TimerRestart::Restart(Duration::from_nanos(100))),
        );
        assert!(armed.is_ok());
        while timer.expirations() < 2 {
            thread::yield_now();
        }
        assert!(timer.is_armed());

        timer.cancel();
        timer.cancel();
        assert!(!timer.is_armed());
        assert_eq!(timer.expirations(), 2);
    }
}
