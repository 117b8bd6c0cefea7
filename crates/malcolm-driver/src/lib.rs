//! 驱动层模块
//!
//! 本模块提供与 Malcolm 设备的会话管理，包括：
//! - 会话建立（握手、协议版本、订阅）
//! - 事件线程：订阅更新 → 状态镜像（ArcSwap 无锁读取）→ 监听器分发
//! - 可中断的长调用（configure / run）与状态闩锁
//! - 会话指标
//!
//! # 使用场景
//!
//! 适用于需要直接发送 Malcolm 请求、自行管理状态机的场景。
//! 大多数用户应该使用 `malcolm-client` 提供的 `MalcolmDevice`。

mod error;
pub mod event;
pub mod listeners;
pub mod metrics;
pub mod pipeline;
mod session;
pub mod state;

pub use error::DriverError;
pub use event::MalcolmEvent;
pub use listeners::{ListenerHandle, ListenerRegistry, MalcolmListener};
pub use metrics::{MetricsSnapshot, SessionMetrics};
pub use pipeline::{PipelineConfig, event_loop};
pub use session::{CallOutcome, MalcolmSession};
pub use state::*;
