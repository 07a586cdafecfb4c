use std::fs;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use resource_sampler::collectors::mock::{FixedHost, SimulatedAccelerator};
use resource_sampler::collectors::Unavailable;
use resource_sampler::publishers::read_samples;
use resource_sampler::{ResourceSampler, SamplerError, SinkFormat};

fn sampler_with(
    interval: Duration,
    accelerator: SimulatedAccelerator,
    destination: &std::path::Path,
) -> ResourceSampler {
    ResourceSampler::builder()
        .interval(interval)
        .destination(destination)
        .host(Box::new(FixedHost::default()))
        .accelerator(Box::new(accelerator))
        .build()
        .unwrap()
}

#[test]
fn samples_are_in_timestamp_order() {
    let dir = tempfile::tempdir().unwrap();
    let sampler = sampler_with(
        Duration::from_millis(5),
        SimulatedAccelerator::new(1),
        &dir.path().join("samples.json"),
    );

    sampler.start().unwrap();
    thread::sleep(Duration::from_millis(100));
    sampler.stop().unwrap();

    let samples = sampler.snapshot();
    assert!(samples.len() > 1);
    assert!(samples.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[test]
fn clean_stop_persists_the_whole_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run/resources.json");
    let interval = Duration::from_millis(50);
    let sampler = sampler_with(interval, SimulatedAccelerator::new(2), &path);

    sampler.start().unwrap();
    thread::sleep(Duration::from_millis(500));
    sampler.stop().unwrap();

    // First sample is taken immediately, then one per interval: 10, give or take one.
    let count = sampler.len();
    assert!((9..=12).contains(&count), "unexpected sample count {count}");
    assert_eq!(read_samples(&path).unwrap(), sampler.snapshot());
}

#[test]
fn failing_accelerator_init_degrades_to_empty_readings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resources.json");
    let gpu = SimulatedAccelerator::new(2).failing_init();
    let shutdowns = gpu.shutdown_counter();
    let sampler = sampler_with(Duration::from_millis(10), gpu, &path);

    sampler.start().unwrap();
    thread::sleep(Duration::from_millis(60));
    sampler.stop().unwrap();

    let samples = read_samples(&path).unwrap();
    assert!(!samples.is_empty());
    assert!(samples.iter().all(|s| s.accelerators.is_empty()));
    // No session was acquired, so none is released.
    assert_eq!(shutdowns.load(Ordering::SeqCst), 0);
}

#[test]
fn failing_device_is_omitted_without_ending_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    let gpu = SimulatedAccelerator::new(2).failing_device(1);
    let shutdowns = gpu.shutdown_counter();
    let sampler = sampler_with(
        Duration::from_millis(10),
        gpu,
        &dir.path().join("resources.json"),
    );

    sampler.start().unwrap();
    thread::sleep(Duration::from_millis(100));
    assert!(sampler.is_active());
    sampler.stop().unwrap();

    let samples = sampler.snapshot();
    assert!(samples.len() > 3);
    for sample in &samples {
        assert!(sample.accelerators.contains_key(&0));
        assert!(!sample.accelerators.contains_key(&1));
        assert_eq!(
            sample.accelerators[&0].utilization_percent,
            SimulatedAccelerator::reading(0).utilization_percent
        );
    }
    assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
}

#[test]
fn second_stop_leaves_destination_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resources.json");
    let sampler = sampler_with(Duration::from_millis(10), SimulatedAccelerator::new(1), &path);

    sampler.start().unwrap();
    thread::sleep(Duration::from_millis(50));
    sampler.stop().unwrap();
    let first = fs::read(&path).unwrap();

    sampler.stop().unwrap();
    assert_eq!(fs::read(&path).unwrap(), first);
}

#[test]
fn stop_returns_within_two_intervals() {
    let sampler = ResourceSampler::builder()
        .interval(Duration::from_secs(1))
        .host(Box::new(FixedHost::default()))
        .accelerator(Box::new(Unavailable))
        .build()
        .unwrap();

    sampler.start().unwrap();
    thread::sleep(Duration::from_millis(150));
    let started = Instant::now();
    sampler.stop().unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(sampler.len(), 1);
}

#[test]
fn scoped_use_flushes_after_an_early_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resources.json");
    let sampler = sampler_with(Duration::from_millis(10), SimulatedAccelerator::new(1), &path);

    let workload = || -> Result<(), String> {
        let _guard = sampler.scoped().map_err(|e| e.to_string())?;
        thread::sleep(Duration::from_millis(50));
        Err("training diverged".to_string())
    };

    assert_eq!(workload(), Err("training diverged".to_string()));
    assert!(!sampler.is_active());
    let stored = read_samples(&path).unwrap();
    assert!(!stored.is_empty());
    assert_eq!(stored, sampler.snapshot());
}

#[test]
fn scoped_use_flushes_during_panic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resources.json");
    let sampler = sampler_with(Duration::from_millis(10), SimulatedAccelerator::new(1), &path);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _guard = sampler.scoped().unwrap();
        thread::sleep(Duration::from_millis(40));
        panic!("out of memory");
    }));

    assert!(result.is_err());
    assert!(!sampler.is_active());
    assert!(!read_samples(&path).unwrap().is_empty());
}

#[test]
fn stop_from_another_thread() {
    let sampler = Arc::new(
        ResourceSampler::builder()
            .interval(Duration::from_millis(10))
            .host(Box::new(FixedHost::default()))
            .accelerator(Box::new(Unavailable))
            .build()
            .unwrap(),
    );
    sampler.start().unwrap();

    let remote = Arc::clone(&sampler);
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(40));
        remote.stop()
    });
    handle.join().unwrap().unwrap();

    assert!(!sampler.is_active());
    sampler.stop().unwrap();
}

#[test]
fn readers_see_progress_while_sampling() {
    let sampler = ResourceSampler::builder()
        .interval(Duration::from_millis(5))
        .host(Box::new(FixedHost::default()))
        .accelerator(Box::new(Unavailable))
        .build()
        .unwrap();

    sampler.start().unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while sampler.len() < 3 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    let mid_run = sampler.snapshot();
    let latest = sampler.latest().unwrap();
    sampler.stop().unwrap();

    assert!(mid_run.len() >= 3);
    assert!(latest.timestamp >= mid_run[mid_run.len() - 1].timestamp);
}

#[test]
fn jsonl_destination_streams_each_sample() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resources.jsonl");
    let sampler = ResourceSampler::builder()
        .interval(Duration::from_millis(10))
        .destination(&path)
        .format(SinkFormat::Jsonl)
        .host(Box::new(FixedHost::default()))
        .accelerator(Box::new(SimulatedAccelerator::new(1)))
        .build()
        .unwrap();

    sampler.start().unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while sampler.len() < 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(!read_samples(&path).unwrap().is_empty());
    sampler.stop().unwrap();

    let raw = fs::read_to_string(&path).unwrap();
    assert_eq!(raw.lines().count(), sampler.len());
    assert_eq!(read_samples(&path).unwrap(), sampler.snapshot());
}

#[test]
fn host_failure_is_reported_at_stop_and_samples_still_flushed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resources.json");
    let sampler = ResourceSampler::builder()
        .interval(Duration::from_millis(5))
        .destination(&path)
        .host(Box::new(FixedHost::default().fail_after(2)))
        .accelerator(Box::new(Unavailable))
        .build()
        .unwrap();

    sampler.start().unwrap();
    thread::sleep(Duration::from_millis(60));
    let err = sampler.stop().unwrap_err();

    assert!(matches!(err, SamplerError::HostQuery(_)));
    assert_eq!(read_samples(&path).unwrap().len(), 2);
}

#[test]
fn unwritable_destination_is_reported_at_stop() {
    let dir = tempfile::tempdir().unwrap();
    // A regular file where a directory is expected.
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"").unwrap();
    let path = blocker.join("resources.json");
    let sampler = sampler_with(Duration::from_millis(10), SimulatedAccelerator::new(1), &path);

    sampler.start().unwrap();
    thread::sleep(Duration::from_millis(30));
    let err = sampler.stop().unwrap_err();

    assert!(matches!(err, SamplerError::Io { .. }));
    assert!(!sampler.is_empty());
}
