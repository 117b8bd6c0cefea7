//! # Malcolm Transport
//!
//! Malcolm 传输层抽象：到 URL 寻址的远端设备的请求/响应 + 订阅通道。
//!
//! 字节级编码（pvAccess、WebSocket JSON 等）由具体实现负责，上层只看到
//! [`malcolm_protocol::message`] 中定义的消息形状。
//!
//! - [`MalcolmConnection`]: 传输实现必须满足的 trait
//! - [`TransportEvent`]: 推送给会话事件线程的通知（订阅更新、连接变化）
//! - `simulated`（`mock` feature）: 进程内模拟的 Malcolm 设备，用于无硬件测试

use crossbeam_channel::Sender;
use malcolm_protocol::{Request, Response};
use std::time::Duration;
use thiserror::Error;

#[cfg(any(test, feature = "mock"))]
pub mod simulated;

#[cfg(any(test, feature = "mock"))]
pub use simulated::SimulatedEndpoint;

/// 传输层错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// 端点不可达
    #[error("Endpoint unreachable: {0}")]
    Unreachable(String),

    /// 握手失败（例如远端拒绝协议版本）
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// 连接已断开（请求进行中断开也返回此错误）
    #[error("Connection closed")]
    Disconnected,

    /// 在超时时间内没有收到响应
    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    /// 响应 ID 与请求不匹配等协议层面的错误
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// 连接建立后的握手信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeInfo {
    /// 远端报告的协议版本（原始字符串，由上层解析）
    pub protocol_version: String,
}

/// 推送到会话事件线程的通知
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// 订阅更新或延迟到达的响应
    Message(Response),
    /// 连接状态变化（`false` = 连接丢失）
    ConnectionChanged(bool),
}

/// Malcolm 传输连接
///
/// 所有方法都接受 `&self`：`run` 请求会阻塞整个扫描时长，
/// 同时其他线程必须能够发出 `abort`，因此实现需要内部同步。
///
/// # 订阅
///
/// `Subscribe` 请求返回后，更新以 [`TransportEvent::Message`] 推送到
/// `connect` 时给出的通道，`Response::id` 等于订阅请求的 ID。
/// 实现应在订阅成功后立即推送一次当前值。
pub trait MalcolmConnection: Send + Sync {
    /// 端点地址（例如 `tcp://host:port`）
    fn url(&self) -> &str;

    /// 建立连接并完成握手
    ///
    /// # 错误
    ///
    /// - `TransportError::Unreachable`: 端点不可达
    /// - `TransportError::Handshake`: 握手失败
    fn connect(&self, events: Sender<TransportEvent>) -> Result<HandshakeInfo, TransportError>;

    /// 发送请求并阻塞等待对应的响应
    ///
    /// 远端返回的错误以 `ResponseBody::Error` 形式放在 `Ok` 中；
    /// 只有传输本身失败才返回 `Err`。
    fn send(&self, request: Request, timeout: Duration) -> Result<Response, TransportError>;

    /// 主动断开（不推送 `ConnectionChanged`）
    ///
    /// 正在进行的 `send` 必须尽快返回 `TransportError::Disconnected`。
    fn disconnect(&self);

    fn is_connected(&self) -> bool;
}
