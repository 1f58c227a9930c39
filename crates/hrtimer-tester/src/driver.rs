//! Chain driver: arms the timer, blocks on the completion barrier, and
//! assembles the run report.
//!
//! All per-run state lives in a [`ChainContext`] created by [`ChainDriver::run`]
//! and shared with the expiry callback. The driver only touches the context
//! while no chain is armed, and the callback only while one is, so the lock
//! around it is never contended. The callback takes it with `try_lock` and
//! abandons the chain rather than wait if that ever fails.

use crate::barrier::{CompletionBarrier, CompletionSignal, InterruptHandle, WaitOutcome};
use crate::clock::{ClockSource, MonotonicClock, Timestamp};
use crate::config::{HarnessConfig, PolicyConfig, TimerConfig};
use crate::error::{HarnessError, HarnessResult, RecorderError};
use crate::recorder::{Marker, Sample, SampleRecorder};
use crate::report::{Completion, RunReport};
use crate::sequencer::{DelaySequencer, Expiry};
use crate::timer::{ExpiryHandler, ThreadTimer, TimerPrimitive, TimerRestart};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

/// Run-scoped state mutated from the expiry callback.
#[derive(Debug)]
struct ChainContext {
    sequencer: DelaySequencer,
    recorder: SampleRecorder,
    last_mark: Timestamp,
    fault: Option<RecorderError>,
}

impl ChainContext {
    #[inline]
    fn record(&mut self, expected: Marker, now: Timestamp) -> Result<(), RecorderError> {
        let elapsed = now.elapsed_since(self.last_mark);
        self.last_mark = now;
        self.recorder.record(Sample {
            expected,
            measured: elapsed.duration,
            suspect: elapsed.suspect,
        })
    }
}

#[derive(Debug)]
struct ChainShared {
    context: Mutex<ChainContext>,
    ordering_violation: AtomicBool,
}

impl ChainShared {
    fn new(policy: &PolicyConfig, capacity: usize) -> Self {
        Self {
            context: Mutex::new(ChainContext {
                sequencer: DelaySequencer::new(policy),
                recorder: SampleRecorder::with_capacity(capacity),
                last_mark: Timestamp::ZERO,
                fault: None,
            }),
            ordering_violation: AtomicBool::new(false),
        }
    }
}

/// Drives complete timer-chain runs.
///
/// One driver runs one chain at a time; `run` takes `&mut self`, so runs
/// on the same driver are serialized by construction.
pub struct ChainDriver<T: TimerPrimitive> {
    timer: T,
    clock: Arc<dyn ClockSource>,
    barrier: CompletionBarrier,
}

impl ChainDriver<ThreadTimer> {
    /// Driver backed by a [`ThreadTimer`] and the monotonic system clock.
    pub fn with_thread_timer(config: TimerConfig) -> Self {
        Self::new(ThreadTimer::new(config), Arc::new(MonotonicClock::new()))
    }
}

impl<T: TimerPrimitive> ChainDriver<T> {
    /// Create a driver over `timer`, measuring with `clock`.
    pub fn new(timer: T, clock: Arc<dyn ClockSource>) -> Self {
        Self {
            timer,
            clock,
            barrier: CompletionBarrier::new(),
        }
    }

    /// Handle for abandoning an in-progress run from another thread.
    ///
    /// Interrupts apply to the run in progress; a run started afterwards
    /// begins with a cleared interrupt.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.barrier.interrupt_handle()
    }

    /// The underlying timer.
    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Execute one full chain run.
    ///
    /// Interrupted and timed-out runs are not errors: they return a report
    /// whose [`completion`](RunReport::completion) says so, carrying the
    /// samples captured up to that point.
    ///
    /// # Errors
    ///
    /// - [`HarnessError::InvalidConfiguration`] if `config` fails validation
    /// - [`HarnessError::RecorderOverflow`] if the sequencer produced more
    ///   samples than it planned
    /// - [`HarnessError::OrderingViolation`] if the callback found the run
    ///   context busy
    /// - any error from arming the timer
    pub fn run(&mut self, config: &HarnessConfig) -> HarnessResult<RunReport> {
        config.validate()?;

        let shared = Arc::new(ChainShared::new(
            &config.policy,
            config.policy.planned_samples(),
        ));
        self.execute(config, &shared)
    }

    /// Drive the sub-chains of a validated `config` over `shared`.
    fn execute(
        &mut self,
        config: &HarnessConfig,
        shared: &Arc<ChainShared>,
    ) -> HarnessResult<RunReport> {
        let policy = shared.context.lock().sequencer.kind();
        let planned_samples = config.policy.planned_samples();
        self.barrier.reset();

        info!(%policy, planned_samples, "starting timer chain");
        let started = self.clock.now();
        let mut completion = Completion::Completed;

        loop {
            let (initial_delay, scale) = {
                let mut context = shared.context.lock();
                let Some(delay) = context.sequencer.begin_chain() else {
                    break;
                };
                context.last_mark = self.clock.now();
                (delay, context.sequencer.current_scale())
            };

            // Only a sub-chain that would still be armed can be abandoned.
            if self.barrier.is_interrupted() {
                completion = Completion::Interrupted;
                break;
            }

            debug!(
                scale,
                initial_delay_ns = crate::clock::duration_to_nanos(initial_delay),
                "arming sub-chain"
            );
            self.barrier.rearm();
            let handler = expiry_handler(
                Arc::clone(shared),
                Arc::clone(&self.clock),
                self.barrier.signal(),
            );
            if let Err(err) = self.timer.arm(initial_delay, handler) {
                self.timer.cancel();
                error!(error = %err, "failed to arm timer");
                return Err(err);
            }

            let outcome = match config.wait_timeout {
                Some(timeout) => self.barrier.wait_timeout(timeout),
                None => self.barrier.wait(),
            };
            self.timer.cancel();

            match outcome {
                WaitOutcome::Completed => {}
                WaitOutcome::Interrupted => {
                    completion = Completion::Interrupted;
                    break;
                }
                WaitOutcome::TimedOut => {
                    completion = Completion::TimedOut;
                    break;
                }
            }

            if shared.context.lock().fault.is_some()
                || shared.ordering_violation.load(Ordering::Acquire)
            {
                break;
            }
        }

        self.timer.cancel();
        let total_elapsed = self.clock.now().elapsed_since(started).duration;

        let (fault, recorder) = {
            let mut context = shared.context.lock();
            let recorder = std::mem::replace(&mut context.recorder, SampleRecorder::with_capacity(0));
            (context.fault.take(), recorder)
        };

        if let Some(fault) = fault {
            error!(error = %fault, "timer chain aborted");
            return Err(fault.into());
        }
        if shared.ordering_violation.load(Ordering::Acquire) {
            error!("timer callback observed a concurrent holder of the run context");
            return Err(HarnessError::OrderingViolation);
        }

        let report = RunReport {
            policy,
            completion,
            total_elapsed,
            planned_samples,
            samples: recorder.into_samples(),
        };

        if report.is_complete() {
            info!(
                samples = report.samples.len(),
                total_elapsed_ns = crate::clock::duration_to_nanos(total_elapsed),
                "timer chain completed"
            );
        } else {
            warn!(
                %completion,
                samples = report.samples.len(),
                planned_samples,
                "timer chain abandoned"
            );
        }
        let suspect = report.suspect_count();
        if suspect > 0 {
            warn!(suspect, "clock stepped backwards; samples clamped to zero");
        }

        Ok(report)
    }
}

impl<T: TimerPrimitive> Drop for ChainDriver<T> {
    fn drop(&mut self) {
        self.timer.cancel();
    }
}

/// Build the callback for one sub-chain.
///
/// Per expiration it does one clock read, one sequencer transition, at most
/// one append, and then either re-arms or signals completion.
fn expiry_handler(
    shared: Arc<ChainShared>,
    clock: Arc<dyn ClockSource>,
    signal: CompletionSignal,
) -> Box<dyn ExpiryHandler> {
    Box::new(move || {
        let now = clock.now();

        let Some(mut context) = shared.context.try_lock() else {
            shared.ordering_violation.store(true, Ordering::Release);
            signal.signal_complete();
            return TimerRestart::Stop;
        };

        let restart = match context.sequencer.on_expire() {
            Expiry::Continue { marker, next_delay } => match context.record(marker, now) {
                Ok(()) => TimerRestart::Restart(next_delay),
                Err(err) => {
                    context.fault = Some(err);
                    TimerRestart::Stop
                }
            },
            Expiry::Finish { marker } => {
                if let Err(err) = context.record(marker, now) {
                    context.fault = Some(err);
                }
                TimerRestart::Stop
            }
            Expiry::Terminate => TimerRestart::Stop,
        };
        drop(context);

        if restart == TimerRestart::Stop {
            signal.signal_complete();
        }
        restart
    })
}
