//! Prelude - 常用类型的便捷导入
//!
//! 大多数用户应该使用这个模块来导入常用类型：
//!
//! ```rust
//! use malcolm_sdk::prelude::*;
//! ```

// 客户端层（推荐使用）
pub use crate::client::{
    Attributable, ClientConfig, Configurable, MalcolmDetectorModel, MalcolmDevice,
    MalcolmDeviceBuilder, MalcolmModel, PointGenerator, RunOutcome, StaticGenerator, Validatable,
};

// 协议层
pub use crate::protocol::{DeviceState, MalcolmTable, MalcolmVersion};

// 传输层（常用 Trait）
pub use crate::transport::MalcolmConnection;

// 事件与监听器
pub use crate::driver::{ListenerHandle, MalcolmEvent, MalcolmListener};

// 错误类型
pub use crate::client::ClientError;
pub use crate::driver::DriverError;
pub use crate::protocol::ProtocolError;
pub use crate::transport::TransportError;
