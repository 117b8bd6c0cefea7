//! 驱动层错误类型定义

use malcolm_protocol::ProtocolError;
use malcolm_transport::TransportError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    /// 传输层错误
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// 协议解析错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 远端设备返回的错误响应
    #[error("Remote error: {0}")]
    Remote(String),

    /// 阻塞调用期间镜像状态进入 Fault（携带 health 消息）
    #[error("Device fault: {0}")]
    DeviceFault(String),

    /// 阻塞调用期间连接丢失
    #[error("Connection lost")]
    ConnectionLost,

    /// 事件线程已退出
    #[error("Event channel closed")]
    ChannelClosed,

    /// 操作超时
    #[error("Operation timeout")]
    Timeout,

    /// 后台线程错误
    #[error("IO thread error: {0}")]
    IoThread(String),

    /// 响应与请求不匹配
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}
