//! 错误类型体系
//!
//! 客户端层把驱动层、协议层错误归并为调用方能直接处理的几类。
//!
//! # 示例
//!
//! ```rust
//! use malcolm_client::ClientError;
//!
//! fn handle_error(err: ClientError) {
//!     if err.is_session_lost() {
//!         eprintln!("会话已失效，需要 dispose 后重新 initialize: {}", err);
//!     } else if err.is_device_fault() {
//!         eprintln!("设备报告故障: {}", err);
//!     } else {
//!         eprintln!("错误: {}", err);
//!     }
//! }
//! ```

use malcolm_driver::DriverError;
use malcolm_protocol::constants::DEVICE_ERROR_PREFIX;
use malcolm_protocol::{DeviceState, ProtocolError};
use thiserror::Error;

/// 客户端错误类型
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClientError {
    // ==================== Session Errors ====================
    /// 端点不可达、握手失败或连接丢失（可 dispose 后重新 initialize）
    #[error("Malcolm connection error: {0}")]
    Connection(String),

    /// 在 `initialize()` 成功前调用了其他操作
    #[error("Device {0} is not initialized")]
    NotInitialized(String),

    /// `dispose()` 之后的任何操作
    #[error("Device {0} has been disposed")]
    Disposed(String),

    // ==================== State Errors ====================
    /// 当前状态不接受该操作
    #[error("Cannot {operation} while device is {state}")]
    IllegalState {
        /// 被拒绝的操作
        operation: &'static str,
        /// 拒绝时的镜像状态
        state: DeviceState,
    },

    /// 远端设备报告的故障（携带 health 消息）
    #[error("{}{}", DEVICE_ERROR_PREFIX, .message)]
    Device {
        /// 远端消息
        message: String,
    },

    /// 初始化前查询可用轴
    #[error("Scanning error: {0}")]
    Scanning(String),

    // ==================== Local Contract Errors ====================
    /// 属性表、版本号等本地契约错误
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// 模型校验失败
    #[error("Validation failed: {0}")]
    Validation(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    // ==================== Other ====================
    /// 等待超时
    #[error("Timeout after {timeout_ms}ms")]
    Timeout {
        /// 超时时间（毫秒）
        timeout_ms: u64,
    },

    /// 其余驱动层错误
    #[error("Driver error: {0}")]
    Driver(DriverError),
}

impl ClientError {
    pub(crate) fn device(message: impl Into<String>) -> Self {
        Self::Device {
            message: message.into(),
        }
    }

    pub(crate) fn timeout(timeout: std::time::Duration) -> Self {
        Self::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// 会话是否已不可用（需要 dispose + initialize）
    pub fn is_session_lost(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Disposed(_))
    }

    /// 是否为远端设备故障
    pub fn is_device_fault(&self) -> bool {
        matches!(self, Self::Device { .. })
    }

    /// 是否为调用方错误（重试不会成功）
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized(_)
                | Self::IllegalState { .. }
                | Self::Scanning(_)
                | Self::Protocol(_)
                | Self::Validation(_)
                | Self::Config(_)
        )
    }
}

impl From<DriverError> for ClientError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Transport(e) => Self::Connection(e.to_string()),
            DriverError::ConnectionLost | DriverError::ChannelClosed => {
                Self::Connection(err.to_string())
            },
            DriverError::Remote(message) | DriverError::DeviceFault(message) => {
                Self::Device { message }
            },
            DriverError::Protocol(e) => Self::Protocol(e),
            DriverError::Timeout => Self::Timeout { timeout_ms: 0 },
            other => Self::Driver(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use malcolm_transport::TransportError;

    #[test]
    fn test_device_error_prefix() {
        let e = ClientError::device("Detector timed out");
        assert_eq!(
            e.to_string(),
            "Error from Malcolm Device Connection: Detector timed out"
        );
        assert!(e.is_device_fault());
    }

    #[test]
    fn test_illegal_state_display() {
        let e = ClientError::IllegalState {
            operation: "pause",
            state: DeviceState::Idle,
        };
        assert_eq!(e.to_string(), "Cannot pause while device is Idle");
        assert!(e.is_caller_error());
    }

    #[test]
    fn test_from_driver_error() {
        let e: ClientError = DriverError::Transport(TransportError::Unreachable("tcp://a:1".into())).into();
        assert!(matches!(e, ClientError::Connection(ref m) if m.contains("tcp://a:1")));
        assert!(e.is_session_lost());

        let e: ClientError = DriverError::ConnectionLost.into();
        assert!(matches!(e, ClientError::Connection(_)));

        let e: ClientError = DriverError::DeviceFault("boom".into()).into();
        assert_eq!(e, ClientError::device("boom"));

        let e: ClientError = DriverError::Protocol(ProtocolError::InvalidVersion("x".into())).into();
        assert!(matches!(e, ClientError::Protocol(ProtocolError::InvalidVersion(_))));

        let e: ClientError = DriverError::IoThread("spawn".into()).into();
        assert!(matches!(e, ClientError::Driver(_)));
    }
}
