//! 设备状态镜像
//!
//! 只由会话事件线程写入，任意线程无锁读取。
//!
//! # 同步策略
//!
//! - **状态 / 进度**: `ArcSwap`，整体替换快照，读者永远看不到半更新的值
//! - **其他属性**: `RwLock`，读取频率低

use crate::listeners::ListenerRegistry;
use arc_swap::ArcSwap;
use malcolm_protocol::DeviceState;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 设备状态快照
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceSnapshot {
    pub state: DeviceState,
    /// 最近一次 health 消息
    pub health: String,
    /// 每次状态变化递增，用于判断"调用开始后是否发生过迁移"
    pub sequence: u64,
}

impl DeviceSnapshot {
    pub fn with_state(&self, state: DeviceState) -> Self {
        Self {
            state,
            health: self.health.clone(),
            sequence: self.sequence + 1,
        }
    }
}

/// 扫描进度快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    pub completed_steps: u64,
    pub configured_steps: u64,
    pub total_steps: u64,
}

/// 会话共享上下文
pub struct MalcolmContext {
    pub device: ArcSwap<DeviceSnapshot>,
    pub progress: ArcSwap<ProgressSnapshot>,
    /// 订阅到的其余属性的最新值
    pub attributes: RwLock<Map<String, Value>>,
    pub connected: AtomicBool,
    /// 连接丢失过一次即置位，之后不再清除
    session_lost: AtomicBool,
    pub listeners: Arc<ListenerRegistry>,
}

impl MalcolmContext {
    pub fn new(listeners: Arc<ListenerRegistry>) -> Self {
        Self {
            device: ArcSwap::from_pointee(DeviceSnapshot::default()),
            progress: ArcSwap::from_pointee(ProgressSnapshot::default()),
            attributes: RwLock::new(Map::new()),
            connected: AtomicBool::new(false),
            session_lost: AtomicBool::new(false),
            listeners,
        }
    }

    pub fn device_snapshot(&self) -> DeviceSnapshot {
        self.device.load().as_ref().clone()
    }

    pub fn state(&self) -> DeviceState {
        self.device.load().state
    }

    pub fn progress(&self) -> ProgressSnapshot {
        **self.progress.load()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// 会话是否已经终止（断线后即使传输层重连也保持 true）
    pub fn is_session_lost(&self) -> bool {
        self.session_lost.load(Ordering::Acquire)
    }

    pub fn mark_session_lost(&self) {
        self.session_lost.store(true, Ordering::Release);
    }

    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.attributes.read().get(name).cloned()
    }
}
