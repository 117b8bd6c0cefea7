//! 会话性能指标
//!
//! 原子计数器，可以在任何线程读取，不引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct SessionMetrics {
    /// 发出的请求总数
    pub requests_sent: AtomicU64,
    /// 传输失败或远端返回错误的请求数
    pub request_errors: AtomicU64,
    /// 事件线程收到的传输事件数
    pub events_received: AtomicU64,
    /// 镜像状态变化次数
    pub state_changes: AtomicU64,
    /// 因节流被合并的进度事件数
    pub steps_events_throttled: AtomicU64,
    /// 无法解析的推送（未知状态名、未知订阅等）
    pub malformed_updates: AtomicU64,
}

impl SessionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用 `Ordering::Relaxed`，各计数器之间可能有微小的时间差
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            request_errors: self.request_errors.load(Ordering::Relaxed),
            events_received: self.events_received.load(Ordering::Relaxed),
            state_changes: self.state_changes.load(Ordering::Relaxed),
            steps_events_throttled: self.steps_events_throttled.load(Ordering::Relaxed),
            malformed_updates: self.malformed_updates.load(Ordering::Relaxed),
            listener_panics: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub requests_sent: u64,
    pub request_errors: u64,
    pub events_received: u64,
    pub state_changes: u64,
    pub steps_events_throttled: u64,
    pub malformed_updates: u64,
    /// 监听器 panic 次数（由注册表统计，会话快照时填入）
    pub listener_panics: u64,
}

impl MetricsSnapshot {
    /// 请求错误率（0.0 ~ 1.0）
    pub fn request_error_rate(&self) -> f64 {
        if self.requests_sent == 0 {
            0.0
        } else {
            self.request_errors as f64 / self.requests_sent as f64
        }
    }
}
