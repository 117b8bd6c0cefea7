//! 设备生命周期端到端测试
//!
//! 通过模拟端点验证：
//! 1. 协议版本决定轴命名（4.0 → axesToMove，4.2 → simultaneousAxes）
//! 2. configure / run 的完整流程与暂停边界
//! 3. 配置故障时 health 消息透传
//! 4. 连接丢失时阻塞调用返回，会话进入终态

#[path = "common/mod.rs"]
mod common;

use common::{Recorder, TIMEOUT, wait_until};
use malcolm_sdk::prelude::*;
use malcolm_sdk::transport::SimulatedEndpoint;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn device_for(endpoint: &Arc<SimulatedEndpoint>) -> MalcolmDevice {
    MalcolmDeviceBuilder::new("BL45P-ML-SCAN-01")
        .connection(endpoint.clone())
        .build()
        .unwrap()
}

fn prepare(device: &MalcolmDevice) {
    device.initialize().unwrap();
    device
        .set_point_generator(Arc::new(StaticGenerator::line("x", 0.0, 1.0, 10)))
        .unwrap();
    device.set_file_dir("/dls/i45/data/2026/cm1-1/i45-1234").unwrap();
}

#[test]
fn test_legacy_protocol_sends_axes_to_move() {
    let endpoint = Arc::new(SimulatedEndpoint::new("sim://legacy").with_protocol_version("4.0"));
    let device = device_for(&endpoint);
    prepare(&device);

    assert!(!device.is_new_malcolm_version().unwrap());
    assert_eq!(device.get_version().unwrap(), MalcolmVersion::VERSION_4_0);
    assert_eq!(device.get_available_axes().unwrap(), ["x", "y"]);

    assert_eq!(device.get_configured_axes(), None);

    // 与默认值相同：不发送
    device.configure(&MalcolmModel::new("scan")).unwrap();
    let params = endpoint.last_configure_parameters().unwrap();
    assert!(!params.contains_key("axesToMove"));
    assert_eq!(device.get_configured_axes().unwrap(), ["x", "y"]);

    // 与默认值不同：发送
    device
        .configure(&MalcolmModel::new("scan").with_axes_to_move(["x"]))
        .unwrap();
    let params = endpoint.last_configure_parameters().unwrap();
    assert_eq!(params["axesToMove"], serde_json::json!(["x"]));
    assert_eq!(endpoint.attribute("axesToMove"), Some(serde_json::json!(["x"])));
    assert_eq!(device.get_configured_axes().unwrap(), ["x"]);
    assert_eq!(endpoint.attribute("simultaneousAxes"), None);
}

#[test]
fn test_new_protocol_always_sends_axes() {
    let endpoint = Arc::new(SimulatedEndpoint::new("sim://new").with_protocol_version("4.2"));
    let device = device_for(&endpoint);
    prepare(&device);

    assert!(device.is_new_malcolm_version().unwrap());
    device.configure(&MalcolmModel::new("scan")).unwrap();
    let params = endpoint.last_configure_parameters().unwrap();
    assert_eq!(params["axesToMove"], serde_json::json!(["x", "y"]));
    assert_eq!(params["fileTemplate"], "i45-1234-%s.h5");
    assert_eq!(
        endpoint.attribute("simultaneousAxes"),
        Some(serde_json::json!(["x", "y"]))
    );
    assert_eq!(device.get_configured_axes().unwrap(), ["x", "y"]);

    device
        .configure(&MalcolmModel::new("scan").with_axes_to_move(["y"]))
        .unwrap();
    assert_eq!(device.get_configured_axes().unwrap(), ["y"]);
}

#[test]
fn test_full_scan_delivers_events() {
    let endpoint = Arc::new(SimulatedEndpoint::new("sim://scan").with_total_steps(8));
    let device = device_for(&endpoint);
    let recorder = Arc::new(Recorder::default());
    device.add_listener(recorder.clone()).unwrap();
    prepare(&device);

    device.configure(&MalcolmModel::new("scan")).unwrap();
    assert_eq!(device.get_device_state().unwrap(), DeviceState::Ready);
    assert_eq!(device.run().unwrap(), RunOutcome::Completed);
    assert_eq!(device.get_device_state().unwrap(), DeviceState::Idle);

    // 最后一步总会送达
    assert!(wait_until(|| recorder.steps().last() == Some(&(8, 8))));
    let states = recorder.states();
    let running = states.iter().position(|s| *s == DeviceState::Running).unwrap();
    assert!(states[..running].contains(&DeviceState::Ready));
    assert_eq!(states.last(), Some(&DeviceState::Idle));

    let metrics = device.metrics().unwrap();
    assert!(metrics.events_received > 0);
    assert_eq!(metrics.listener_panics, 0);

    let datasets = device.get_datasets().unwrap();
    assert!(datasets.num_rows() > 0);
}

#[test]
fn test_segmented_scan() {
    let endpoint = Arc::new(SimulatedEndpoint::new("sim://segments").with_total_steps(9));
    let device = device_for(&endpoint);
    prepare(&device);

    device
        .configure(&MalcolmModel::new("scan").with_breakpoints([3, 6]))
        .unwrap();
    assert_eq!(device.run().unwrap(), RunOutcome::SegmentComplete);
    assert_eq!(endpoint.completed_steps(), 3);
    assert_eq!(device.run().unwrap(), RunOutcome::SegmentComplete);
    assert_eq!(endpoint.completed_steps(), 6);
    assert_eq!(device.run().unwrap(), RunOutcome::Completed);
    assert_eq!(endpoint.completed_steps(), 9);
}

#[test]
fn test_configure_fault_then_reset() {
    let endpoint = Arc::new(SimulatedEndpoint::new("sim://fault"));
    let device = device_for(&endpoint);
    prepare(&device);

    endpoint.fail_next_configure("Timeout waiting for PandA");
    let err = device.configure(&MalcolmModel::new("scan")).unwrap_err();
    assert!(err.is_device_fault());
    assert_eq!(
        err.to_string(),
        "Error from Malcolm Device Connection: Timeout waiting for PandA"
    );

    device.latch(TIMEOUT, &[DeviceState::Fault]).unwrap();
    device.reset().unwrap();
    assert_eq!(device.get_device_state().unwrap(), DeviceState::Idle);
    assert_eq!(device.get_device_health().unwrap(), "OK");
}

#[test]
fn test_fault_during_run() {
    let endpoint = Arc::new(
        SimulatedEndpoint::new("sim://runfault")
            .with_total_steps(100_000)
            .with_step_interval(Duration::from_millis(5)),
    );
    let device = Arc::new(device_for(&endpoint));
    prepare(&device);
    device.configure(&MalcolmModel::new("scan")).unwrap();

    let injector = {
        let device = device.clone();
        let endpoint = endpoint.clone();
        thread::spawn(move || {
            device.latch(TIMEOUT, &[DeviceState::Running]).unwrap();
            endpoint.inject_fault("Motor following error");
        })
    };
    let err = device.run().unwrap_err();
    injector.join().unwrap();
    assert_eq!(err, ClientError::Device {
        message: "Motor following error".to_string()
    });
}

#[test]
fn test_connection_lost_during_run() {
    let endpoint = Arc::new(
        SimulatedEndpoint::new("sim://lost")
            .with_total_steps(100_000)
            .with_step_interval(Duration::from_millis(5)),
    );
    let device = Arc::new(device_for(&endpoint));
    let recorder = Arc::new(Recorder::default());
    device.add_listener(recorder.clone()).unwrap();
    prepare(&device);
    device.configure(&MalcolmModel::new("scan")).unwrap();

    let dropper = {
        let device = device.clone();
        let endpoint = endpoint.clone();
        thread::spawn(move || {
            device.latch(TIMEOUT, &[DeviceState::Running]).unwrap();
            endpoint.drop_connection();
        })
    };
    let start = Instant::now();
    let err = device.run().unwrap_err();
    dropper.join().unwrap();
    assert!(err.is_session_lost(), "unexpected error: {err}");
    assert!(start.elapsed() < TIMEOUT);

    assert!(wait_until(|| {
        recorder
            .events()
            .contains(&MalcolmEvent::ConnectionChanged { connected: false })
    }));
    assert_eq!(device.get_device_state().unwrap(), DeviceState::Offline);

    // 恢复连接后会话仍然终止
    endpoint.restore_connection();
    assert!(matches!(device.run(), Err(ClientError::Connection(_))));

    // dispose 后用新实例重新初始化
    device.dispose();
    let fresh = device_for(&endpoint);
    fresh.initialize().unwrap();
    assert!(fresh.is_initialized());
}

#[test]
fn test_remote_push_after_reconnect_does_not_revive_session() {
    let endpoint = Arc::new(SimulatedEndpoint::new("sim://revive"));
    let device = device_for(&endpoint);
    let recorder = Arc::new(Recorder::default());
    device.add_listener(recorder.clone()).unwrap();
    prepare(&device);

    endpoint.drop_connection();
    assert!(wait_until(|| device.get_device_state().unwrap() == DeviceState::Offline));
    endpoint.restore_connection();
    assert!(wait_until(|| {
        recorder
            .events()
            .contains(&MalcolmEvent::ConnectionChanged { connected: true })
    }));

    let received = device.metrics().unwrap().events_received;
    endpoint.inject_fault("Pushed after reconnect");
    assert!(wait_until(|| device.metrics().unwrap().events_received > received));

    assert_eq!(device.get_device_state().unwrap(), DeviceState::Offline);
    assert!(matches!(
        device.configure(&MalcolmModel::new("scan")),
        Err(ClientError::Connection(_))
    ));
    assert!(matches!(device.reset(), Err(ClientError::Connection(_))));
}

#[test]
fn test_disable_is_terminal_state() {
    let endpoint = Arc::new(SimulatedEndpoint::new("sim://disable"));
    let device = device_for(&endpoint);
    prepare(&device);

    device.disable().unwrap();
    assert_eq!(device.get_device_state().unwrap(), DeviceState::Disabled);
    assert!(matches!(
        device.configure(&MalcolmModel::new("scan")),
        Err(ClientError::IllegalState { operation: "configure", .. })
    ));
}

#[test]
fn test_seek_while_paused() {
    let endpoint = Arc::new(
        SimulatedEndpoint::new("sim://seek")
            .with_total_steps(100_000)
            .with_step_interval(Duration::from_millis(2)),
    );
    let device = Arc::new(device_for(&endpoint));
    prepare(&device);
    device.configure(&MalcolmModel::new("scan")).unwrap();

    let runner = {
        let device = device.clone();
        thread::spawn(move || device.run())
    };
    device.latch(TIMEOUT, &[DeviceState::Running]).unwrap();
    device.pause().unwrap();
    device.latch(TIMEOUT, &[DeviceState::Paused]).unwrap();
    assert!(device.is_locked().unwrap());

    device.seek(1).unwrap();
    assert!(wait_until(|| endpoint.completed_steps() == 1));
    device.latch(TIMEOUT, &[DeviceState::Paused]).unwrap();

    device.resume().unwrap();
    device.latch(TIMEOUT, &[DeviceState::Running]).unwrap();
    device.abort().unwrap();
    assert_eq!(runner.join().unwrap().unwrap(), RunOutcome::Aborted);
}
