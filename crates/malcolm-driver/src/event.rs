//! 设备事件
//!
//! 由会话事件线程产生，通过 [`ListenerRegistry`](crate::listeners::ListenerRegistry) 分发。

use malcolm_protocol::DeviceState;

#[derive(Debug, Clone, PartialEq)]
pub enum MalcolmEvent {
    /// 镜像状态变化
    StateChanged {
        previous: DeviceState,
        current: DeviceState,
        /// 变化时的 health 消息
        message: String,
    },
    /// 扫描进度（按时间间隔节流，最后一步总会送达）
    StepsCompleted {
        steps: u64,
        total: u64,
        message: String,
    },
    /// 连接状态变化
    ConnectionChanged { connected: bool },
}

impl MalcolmEvent {
    /// 状态事件的当前状态
    pub fn state(&self) -> Option<DeviceState> {
        match self {
            MalcolmEvent::StateChanged { current, .. } => Some(*current),
            _ => None,
        }
    }

    pub fn is_state_change(&self) -> bool {
        matches!(self, MalcolmEvent::StateChanged { .. })
    }
}
