//! 集成测试共用的监听器与等待工具

#![allow(dead_code)]

use malcolm_sdk::{DeviceState, MalcolmEvent, MalcolmListener};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// 轮询直到条件成立或超时
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// 记录全部事件的监听器
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<MalcolmEvent>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<MalcolmEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<DeviceState> {
        self.events().iter().filter_map(MalcolmEvent::state).collect()
    }

    pub fn steps(&self) -> Vec<(u64, u64)> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                MalcolmEvent::StepsCompleted { steps, total, .. } => Some((*steps, *total)),
                _ => None,
            })
            .collect()
    }
}

impl MalcolmListener for Recorder {
    fn event_performed(&self, event: &MalcolmEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// 只计数的监听器
#[derive(Default)]
pub struct Counter {
    pub count: AtomicUsize,
}

impl Counter {
    pub fn get(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl MalcolmListener for Counter {
    fn event_performed(&self, _event: &MalcolmEvent) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// 每次回调都 panic 的监听器
pub struct Panicker;

impl MalcolmListener for Panicker {
    fn event_performed(&self, _event: &MalcolmEvent) {
        panic!("listener failure");
    }
}
