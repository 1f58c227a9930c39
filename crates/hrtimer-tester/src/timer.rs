//! Single-shot relative timer primitive.
//!
//! A [`TimerPrimitive`] invokes an [`ExpiryHandler`] once its delay has
//! elapsed. The handler runs in the timer's own execution context and must
//! not block. It either asks to be re-armed forward from its own invocation
//! instant or stops the timer.
//!
//! [`ThreadTimer`] is the production backend: one dedicated expiry thread
//! per armed chain, a coarse condition-variable sleep, then a busy-spin
//! tail for the final stretch before each deadline.

use crate::config::TimerConfig;
use crate::error::{HarnessError, HarnessResult};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// What the timer should do after an expiration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerRestart {
    /// Fire again `delay` after this invocation.
    Restart(Duration),
    /// Disarm.
    Stop,
}

/// Callback run on every expiration.
///
/// Implementations run in the timer context: no blocking, no unbounded work.
pub trait ExpiryHandler: Send + 'static {
    /// Handle one expiration.
    fn on_expire(&mut self) -> TimerRestart;
}

impl<F> ExpiryHandler for F
where
    F: FnMut() -> TimerRestart + Send + 'static,
{
    #[inline]
    fn on_expire(&mut self) -> TimerRestart {
        self()
    }
}

/// A relative, one-shot, re-armable timer.
pub trait TimerPrimitive: Send {
    /// Arm the timer to fire `delay` from now.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::TimerBusy`] if the timer is still armed, or
    /// [`HarnessError::TimerSpawn`] if the backend cannot start.
    fn arm(&mut self, delay: Duration, handler: Box<dyn ExpiryHandler>) -> HarnessResult;

    /// Disarm the timer and wait for any in-flight callback to finish.
    ///
    /// Idempotent. Once this returns the handler is never invoked again.
    fn cancel(&mut self);

    /// Whether a chain is currently armed.
    fn is_armed(&self) -> bool;
}

#[derive(Debug, Default)]
struct TimerShared {
    cancelled: AtomicBool,
    expirations: AtomicU64,
    lock: Mutex<()>,
    cond: Condvar,
}

impl TimerShared {
    /// Sleep until `deadline`. Returns `false` if cancelled first.
    fn sleep_until(&self, deadline: Instant, spin_threshold: Duration) -> bool {
        let coarse = deadline
            .checked_sub(spin_threshold)
            .unwrap_or_else(Instant::now);

        {
            let mut guard = self.lock.lock();
            loop {
                if self.cancelled.load(Ordering::Acquire) {
                    return false;
                }
                if Instant::now() >= coarse {
                    break;
                }
                if self.cond.wait_until(&mut guard, coarse).timed_out() {
                    break;
                }
            }
        }

        while Instant::now() < deadline {
            if self.cancelled.load(Ordering::Acquire) {
                return false;
            }
            std::hint::spin_loop();
        }

        !self.cancelled.load(Ordering::Acquire)
    }
}

/// Thread-backed high-resolution timer.
#[derive(Debug)]
pub struct ThreadTimer {
    config: TimerConfig,
    shared: Arc<TimerShared>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadTimer {
    /// Create an unarmed timer.
    pub fn new(config: TimerConfig) -> Self {
        Self {
            config,
            shared: Arc::new(TimerShared::default()),
            worker: None,
        }
    }

    /// Total expirations delivered since creation.
    pub fn expirations(&self) -> u64 {
        self.shared.expirations.load(Ordering::Relaxed)
    }

    fn reap(&mut self) {
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::warn!("timer expiry thread panicked");
        }
    }
}

impl Default for ThreadTimer {
    fn default() -> Self {
        Self::new(TimerConfig::default())
    }
}

impl TimerPrimitive for ThreadTimer {
    fn arm(&mut self, delay: Duration, mut handler: Box<dyn ExpiryHandler>) -> HarnessResult {
        if self.is_armed() {
            return Err(HarnessError::TimerBusy);
        }
        self.reap();

        self.shared.cancelled.store(false, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        let spin_threshold = self.config.spin_threshold;
        let first_deadline = far_deadline(Instant::now(), delay);

        let worker = thread::Builder::new()
            .name("hrtimer-expiry".into())
            .spawn(move || {
                let mut deadline = first_deadline;
                while shared.sleep_until(deadline, spin_threshold) {
                    let invoked = Instant::now();
                    shared.expirations.fetch_add(1, Ordering::Relaxed);
                    match handler.on_expire() {
                        TimerRestart::Restart(next) => deadline = far_deadline(invoked, next),
                        TimerRestart::Stop => break,
                    }
                }
            })
            .map_err(|e| HarnessError::timer_spawn(e.to_string()))?;

        tracing::trace!(
            delay_ns = crate::clock::duration_to_nanos(delay),
            "timer armed"
        );
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

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// `from + delay`, clamped to roughly a year out for absurd delays.
fn far_deadline(from: Instant, delay: Duration) -> Instant {
    const FAR: Duration = Duration::from_secs(365 * 24 * 3600);
    from.checked_add(delay)
        .or_else(|| from.checked_add(FAR))
        .unwrap_or(from)
}
