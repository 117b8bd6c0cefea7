//! 监听器测试
//!
//! 验证：
//! 1. 每个注册的监听器对每个事件只收到一次
//! 2. 注销后不再收到事件
//! 3. panic 的监听器不影响其他监听器，也不影响扫描

#[path = "common/mod.rs"]
mod common;

use common::{Counter, Panicker, Recorder, wait_until};
use malcolm_sdk::prelude::*;
use malcolm_sdk::transport::SimulatedEndpoint;
use std::sync::Arc;

fn device(url: &str, steps: u64) -> (Arc<SimulatedEndpoint>, MalcolmDevice) {
    let endpoint = Arc::new(SimulatedEndpoint::new(url).with_total_steps(steps));
    let device = MalcolmDeviceBuilder::new("ML-SCAN-01")
        .connection(endpoint.clone())
        .build()
        .unwrap();
    (endpoint, device)
}

#[test]
fn test_listener_added_before_initialize() {
    let (_endpoint, device) = device("sim://listeners-early", 4);
    let recorder = Arc::new(Recorder::default());
    device.add_listener(recorder.clone()).unwrap();

    device.initialize().unwrap();
    device.set_file_dir("/data/scan").unwrap();
    device.configure(&MalcolmModel::new("scan")).unwrap();
    assert!(wait_until(|| recorder.states().contains(&DeviceState::Ready)));
}

#[test]
fn test_each_listener_sees_each_event_once() {
    let (_endpoint, device) = device("sim://listeners-once", 5);
    device.initialize().unwrap();
    device.set_file_dir("/data/scan").unwrap();

    let first = Arc::new(Recorder::default());
    let second = Arc::new(Recorder::default());
    device.add_listener(first.clone()).unwrap();
    device.add_listener(second.clone()).unwrap();

    device.configure(&MalcolmModel::new("scan")).unwrap();
    assert_eq!(device.run().unwrap(), RunOutcome::Completed);
    assert!(wait_until(|| first.steps().last() == Some(&(5, 5))));
    assert!(wait_until(|| second.events() == first.events()));
}

#[test]
fn test_removed_listener_stops_receiving() {
    let (_endpoint, device) = device("sim://listeners-remove", 3);
    device.initialize().unwrap();
    device.set_file_dir("/data/scan").unwrap();

    let counter = Arc::new(Counter::default());
    let handle = device.add_listener(counter.clone()).unwrap();
    assert!(device.remove_listener(handle).unwrap());
    assert!(!device.remove_listener(handle).unwrap());

    let recorder = Arc::new(Recorder::default());
    device.add_listener(recorder.clone()).unwrap();
    device.configure(&MalcolmModel::new("scan")).unwrap();
    assert!(wait_until(|| recorder.states().contains(&DeviceState::Ready)));
    assert_eq!(counter.get(), 0);
}

#[test]
fn test_dropped_listener_is_skipped() {
    let (_endpoint, device) = device("sim://listeners-drop", 3);
    device.initialize().unwrap();
    device.set_file_dir("/data/scan").unwrap();

    let counter = Arc::new(Counter::default());
    device.add_listener(counter.clone()).unwrap();
    let weak = Arc::downgrade(&counter);
    drop(counter);
    assert!(weak.upgrade().is_none());

    device.configure(&MalcolmModel::new("scan")).unwrap();
    assert_eq!(device.run().unwrap(), RunOutcome::Completed);
}

#[test]
fn test_panicking_listener_is_isolated() {
    let (_endpoint, device) = device("sim://listeners-panic", 4);
    device.initialize().unwrap();
    device.set_file_dir("/data/scan").unwrap();

    let panicker = Arc::new(Panicker);
    let recorder = Arc::new(Recorder::default());
    device.add_listener(panicker.clone()).unwrap();
    device.add_listener(recorder.clone()).unwrap();

    device.configure(&MalcolmModel::new("scan")).unwrap();
    assert_eq!(device.run().unwrap(), RunOutcome::Completed);
    assert!(wait_until(|| recorder.steps().last() == Some(&(4, 4))));
    assert!(device.metrics().unwrap().listener_panics > 0);
}

#[test]
fn test_listener_calls_after_dispose_fail() {
    let (_endpoint, device) = device("sim://listeners-disposed", 3);
    device.dispose();
    let counter: Arc<dyn MalcolmListener> = Arc::new(Counter::default());
    assert!(matches!(
        device.add_listener(counter),
        Err(ClientError::Disposed(_))
    ));
}
