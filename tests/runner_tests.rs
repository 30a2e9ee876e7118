//! Background runner tests

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use intersection_sim::simulation::{
    Direction, LatestFrame, RunnerConfig, SimConfig, SimWorld, SimulationHandle, StartOutcome,
    StopOutcome, TopologyConfig,
};

fn fast_runner(time_limit: Option<u32>) -> SimulationHandle {
    let mut config = SimConfig::default();
    if let Some(secs) = time_limit {
        config.simulation_time_secs = secs;
    }
    let world = SimWorld::from_config(config, &TopologyConfig::two_intersections(), Some(17))
        .expect("default config is valid");
    SimulationHandle::new(
        world,
        RunnerConfig {
            ticks_per_frame: 1,
            realtime: false,
            stop_at_time_limit: time_limit.is_some(),
        },
    )
}

#[test]
fn test_latest_frame_keeps_only_newest() {
    let frames = LatestFrame::new();
    frames.publish(1);
    frames.publish(2);
    frames.publish(3);
    assert_eq!(frames.take(), Some(3));
    assert_eq!(frames.take(), None);
    assert_eq!(frames.wait_take(Duration::from_millis(10)), None);
}

#[test]
fn test_latest_frame_wakes_waiting_reader() {
    let frames = Arc::new(LatestFrame::new());
    let publisher = {
        let frames = Arc::clone(&frames);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            frames.publish("frame");
        })
    };

    assert_eq!(frames.wait_take(Duration::from_secs(5)), Some("frame"));
    publisher.join().unwrap();
}

#[test]
fn test_start_and_stop_are_idempotent() {
    let mut handle = fast_runner(None);
    let frames = handle.frames();

    assert_eq!(handle.start().unwrap(), StartOutcome::Started);
    assert!(handle.is_running());
    assert_eq!(handle.start().unwrap(), StartOutcome::AlreadyRunning);

    let frame = frames
        .wait_take(Duration::from_secs(5))
        .expect("worker publishes frames");
    assert!(frame.tick > 0);
    assert_eq!(frame.intersections.len(), 2);

    assert_eq!(handle.stop().unwrap(), StopOutcome::Stopped);
    assert!(!handle.is_running());
    assert_eq!(handle.stop().unwrap(), StopOutcome::AlreadyStopped);
    frames.take();

    let stopped_at = handle.with_world(|world| world.clock.tick()).unwrap();
    thread::sleep(Duration::from_millis(20));
    assert_eq!(
        handle.with_world(|world| world.clock.tick()).unwrap(),
        stopped_at,
        "world advanced after stop"
    );

    // a stopped runner can be started again and continues from where it was
    assert_eq!(handle.start().unwrap(), StartOutcome::Started);
    let frame = frames.wait_take(Duration::from_secs(5)).unwrap();
    assert!(frame.tick > stopped_at);
    assert_eq!(handle.stop().unwrap(), StopOutcome::Stopped);
}

#[test]
fn test_overrides_are_validated_while_running() {
    let mut handle = fast_runner(None);
    handle.start().unwrap();
    let a = handle
        .with_world(|world| world.intersection_id("A"))
        .unwrap()
        .unwrap();

    assert!(handle.request_green(a, "bogus").is_err());
    assert_eq!(handle.request_green(a, "up").unwrap(), Direction::Up);

    handle.stop().unwrap();
}

#[test]
fn test_runner_stops_at_time_limit() {
    let mut handle = fast_runner(Some(2));
    let frames = handle.frames();
    handle.start().unwrap();
    handle.wait().unwrap();

    assert!(!handle.is_running());
    assert_eq!(handle.with_world(|world| world.clock.tick()).unwrap(), 120);
    let last = frames.take().expect("final frame is published");
    assert_eq!(last.tick, 120);
    assert_eq!(handle.stop().unwrap(), StopOutcome::AlreadyStopped);
}

#[test]
fn test_snapshot_is_available_without_worker() {
    let handle = fast_runner(None);
    let snapshot = handle.snapshot().unwrap();
    assert_eq!(snapshot.tick, 0);
    assert!(snapshot.vehicles.is_empty());
    assert!(handle.latest_frame().is_none());
}
