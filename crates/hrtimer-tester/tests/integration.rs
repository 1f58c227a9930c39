//! Integration tests for the timer-chain harness.

use hrtimer_tester::testing::{ManualClock, SimulatedTimer};
use hrtimer_tester::{
    ChainDriver, Completion, HarnessConfig, HarnessError, HarnessResult, Marker, PolicyKind,
    RunReport, ThreadTimer, TimerConfig, TimerPrimitive, TimerRestart, format_nanos,
    format_sample_line, parse_nanos,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

fn simulated(timer: impl FnOnce(ManualClock) -> SimulatedTimer) -> ChainDriver<SimulatedTimer> {
    let clock = ManualClock::new();
    ChainDriver::new(timer(clock.clone()), Arc::new(clock))
}

fn markers(report: &RunReport) -> Vec<u64> {
    report.samples.iter().map(|s| s.expected.value()).collect()
}

#[test]
fn test_nested_sweep_samples_per_scale() -> HarnessResult {
    let mut driver = simulated(|clock| SimulatedTimer::new(clock, Duration::ZERO));
    let report = driver.run(&HarnessConfig::default())?;

    assert!(report.is_complete());
    assert_eq!(report.policy, PolicyKind::NestedSweep);

    let expected: Vec<u64> = [10u64, 100, 1_000, 10_000]
        .iter()
        .flat_map(|&scale| (1..=9).map(move |i| i * scale))
        .chain((1..=10).map(|i| i * 100_000))
        .collect();
    assert_eq!(markers(&report), expected);
    Ok(())
}

#[test]
fn test_nested_sweep_markers_step_by_scale() -> HarnessResult {
    let mut driver = simulated(|clock| SimulatedTimer::new(clock, Duration::from_nanos(300)));
    let report = driver.run(&HarnessConfig::default())?;
    let markers = markers(&report);

    let mut offset = 0;
    for (scale, len) in [(10, 9), (100, 9), (1_000, 9), (10_000, 9), (100_000, 10)] {
        let chunk = &markers[offset..offset + len];
        assert_eq!(chunk.first(), Some(&scale));
        assert!(chunk.windows(2).all(|w| w[1] == w[0] + scale));
        offset += len;
    }
    assert_eq!(offset, markers.len());
    Ok(())
}

#[test]
fn test_total_elapsed_covers_every_expiration() -> HarnessResult {
    let latency = Duration::from_nanos(100);
    let mut driver = simulated(|clock| SimulatedTimer::new(clock, latency));
    let config = HarnessConfig::builder()
        .nested_sweep(10, 100, Duration::from_micros(1))
        .build()?;
    let report = driver.run(&config)?;

    // Scale 10 waits 10..=100 µs, scale 100 waits 100..=1100 µs.
    let waited_us: u64 =
        (1..=10).map(|i| i * 10).sum::<u64>() + (1..=11).map(|i| i * 100).sum::<u64>();
    let expirations = 10 + 11;
    assert_eq!(
        report.total_elapsed,
        Duration::from_micros(waited_us) + latency * expirations
    );
    assert_eq!(driver.timer().expirations(), u64::from(expirations));
    Ok(())
}

#[test]
fn test_geometric_delay_sequence() -> HarnessResult {
    let mut driver = simulated(|clock| SimulatedTimer::new(clock, Duration::ZERO));
    let config = HarnessConfig::builder()
        .geometric(Duration::from_nanos(100), Duration::from_secs(1), 5, 2)
        .build()?;
    let report = driver.run(&config)?;

    assert!(report.is_complete());
    assert_eq!(report.policy, PolicyKind::Geometric);

    let requested: Vec<u64> = driver
        .timer()
        .requested_delays()
        .iter()
        .map(|d| d.as_nanos() as u64)
        .collect();
    let expected: Vec<u64> = (0..25u32)
        .flat_map(|level| std::iter::repeat_n(100u64 << level, 5))
        .collect();
    assert_eq!(requested, expected);

    // Every expiration is recorded, the terminating one included.
    assert_eq!(report.samples.len(), 125);
    assert_eq!(
        report.samples.last().map(|s| s.expected),
        Some(Marker::Delay(Duration::from_nanos(100 << 24)))
    );
    assert!(report.samples.windows(2).all(|w| w[0].measured <= w[1].measured));
    Ok(())
}

#[test]
fn test_geometric_start_equals_end_fires_once() -> HarnessResult {
    let mut driver = simulated(|clock| SimulatedTimer::new(clock, Duration::ZERO));
    let config = HarnessConfig::builder()
        .geometric(Duration::from_micros(50), Duration::from_micros(50), 1, 2)
        .build()?;
    let report = driver.run(&config)?;

    assert_eq!(driver.timer().expirations(), 1);
    assert_eq!(report.samples.len(), 1);
    assert_eq!(report.samples[0].measured, Duration::from_micros(50));
    Ok(())
}

#[test]
fn test_nested_sweep_start_equals_end_is_one_inclusive_scale() -> HarnessResult {
    let mut driver = simulated(|clock| SimulatedTimer::new(clock, Duration::ZERO));
    let config = HarnessConfig::builder()
        .nested_sweep(100, 100, Duration::from_micros(1))
        .build()?;
    let report = driver.run(&config)?;

    assert_eq!(driver.timer().expirations(), 11);
    assert_eq!(markers(&report), (1..=10).map(|i| i * 100).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn test_interrupt_mid_chain() -> HarnessResult {
    let clock = ManualClock::new();
    let timer = SimulatedTimer::new(clock.clone(), Duration::ZERO).pause_after(7);
    let observer = timer.observer();
    let mut driver = ChainDriver::new(timer, Arc::new(clock));
    let interrupt = driver.interrupt_handle();

    let runner = thread::spawn(move || {
        let report = driver.run(&HarnessConfig::default());
        (report, driver)
    });

    let deadline = Instant::now() + Duration::from_secs(5);
    while observer.expirations() < 7 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    interrupt.interrupt();

    let Ok((report, driver)) = runner.join() else {
        panic!("driver thread panicked");
    };
    let report = report?;

    assert_eq!(report.completion, Completion::Interrupted);
    assert!(!report.is_complete());
    assert_eq!(report.samples.len(), 7);
    assert!(!driver.timer().is_armed());

    thread::sleep(Duration::from_millis(10));
    assert_eq!(observer.expirations(), 7);
    Ok(())
}

#[test]
fn test_wait_timeout_marks_report() -> HarnessResult {
    let mut driver =
        simulated(|clock| SimulatedTimer::new(clock, Duration::ZERO).pause_after(3));
    let config = HarnessConfig::builder()
        .wait_timeout(Duration::from_millis(20))
        .build()?;
    let report = driver.run(&config)?;

    assert_eq!(report.completion, Completion::TimedOut);
    assert_eq!(report.samples.len(), 3);
    assert!(report.to_string().starts_with("Run timed out after"));
    Ok(())
}

#[test]
fn test_backwards_clock_flags_sample() -> HarnessResult {
    let mut driver = simulated(|clock| {
        SimulatedTimer::new(clock, Duration::ZERO).rewind_clock_at(3, Duration::from_nanos(1))
    });
    let report = driver.run(&HarnessConfig::default())?;

    assert!(report.is_complete());
    assert_eq!(report.suspect_count(), 1);
    let suspect = &report.samples[2];
    assert!(suspect.suspect);
    assert_eq!(suspect.measured, Duration::ZERO);
    Ok(())
}

#[test]
fn test_driver_can_be_reused() -> HarnessResult {
    let mut driver = simulated(|clock| SimulatedTimer::new(clock, Duration::ZERO));
    let config = HarnessConfig::builder()
        .nested_sweep(10, 100, Duration::from_micros(1))
        .build()?;

    driver.interrupt_handle().interrupt();
    let first = driver.run(&config)?;
    assert_eq!(first.completion, Completion::Completed);

    let second = driver.run(&config)?;
    assert!(second.is_complete());
    assert_eq!(second.samples.len(), 19);
    Ok(())
}

#[test]
fn test_listing_round_trips_nanoseconds() -> HarnessResult {
    let mut driver = simulated(|clock| SimulatedTimer::new(clock, Duration::from_nanos(7)));
    let report = driver.run(&HarnessConfig::default())?;

    for (index, sample) in report.samples.iter().enumerate() {
        let line = format_sample_line(index, sample);
        let Some((_, rendered)) = line.split_once('=') else {
            panic!("malformed line: {line}");
        };
        let rendered = rendered.trim().trim_end_matches("uS");
        assert_eq!(parse_nanos(rendered), Some(sample.measured.as_nanos() as u64));
        assert_eq!(
            parse_nanos(&format_nanos(sample.measured.as_nanos() as u64)),
            Some(sample.measured.as_nanos() as u64)
        );
    }
    Ok(())
}

#[test]
fn test_report_json_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let mut driver = simulated(|clock| SimulatedTimer::new(clock, Duration::from_nanos(42)));
    let config = HarnessConfig::builder()
        .geometric(Duration::from_micros(1), Duration::from_micros(8), 2, 2)
        .build()?;
    let report = driver.run(&config)?;

    let json = serde_json::to_string(&report)?;
    let parsed: RunReport = serde_json::from_str(&json)?;
    assert_eq!(parsed, report);
    Ok(())
}

#[test]
fn test_thread_timer_short_sweep() -> HarnessResult {
    let mut driver = ChainDriver::with_thread_timer(TimerConfig::default());
    let config = HarnessConfig::builder()
        .nested_sweep(10, 100, Duration::from_micros(1))
        .wait_timeout(Duration::from_secs(10))
        .build()?;
    let report = driver.run(&config)?;

    assert!(report.is_complete());
    assert_eq!(report.samples.len(), 19);
    assert_eq!(report.suspect_count(), 0);
    assert!(report.total_elapsed >= Duration::from_micros(550 + 6_600) / 2);
    assert_eq!(driver.timer().expirations(), 21);
    Ok(())
}

#[test]
fn test_thread_timer_cancel_is_idempotent_after_completion() {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    let mut timer = ThreadTimer::default();
    let armed = timer.arm(
        Duration::from_micros(50),
        Box::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
            TimerRestart::Stop
        }),
    );
    assert!(armed.is_ok());

    let deadline = Instant::now() + Duration::from_secs(5);
    while timer.is_armed() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    for _ in 0..3 {
        timer.cancel();
    }
    thread::sleep(Duration::from_millis(5));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_invalid_configuration_surfaces() {
    let mut driver = simulated(|clock| SimulatedTimer::new(clock, Duration::ZERO));
    let config = HarnessConfig {
        policy: hrtimer_tester::PolicyConfig::NestedSweep(hrtimer_tester::NestedSweepConfig {
            start: 0,
            outer_end: 10,
            unit: Duration::from_micros(1),
        }),
        ..HarnessConfig::default()
    };
    assert!(matches!(
        driver.run(&config),
        Err(HarnessError::InvalidConfiguration(_))
    ));
}
