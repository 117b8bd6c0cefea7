//! Malcolm SDK - Malcolm 飞扫（fly scan）设备 Rust 客户端
//!
//! 通过 Malcolm 协议控制扫描设备：配置、运行、暂停/恢复、中止，并订阅状态与进度事件。
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **协议层** (`protocol`): 表格、版本、设备状态与消息模型
//! - **传输层** (`transport`): 端点连接抽象（以及 `mock` feature 下的模拟端点）
//! - **驱动层** (`driver`): 事件线程、状态镜像、监听器分发、可中断调用
//! - **客户端层** (`client`): 带状态检查的命令接口
//!
//! # 快速开始
//!
//! 大多数用户应该使用客户端接口：
//!
//! ```rust
//! use malcolm_sdk::prelude::*;
//! // 或
//! use malcolm_sdk::{MalcolmDevice, MalcolmDeviceBuilder, MalcolmModel};
//! ```
//!
//! 需要直接发送 Malcolm 请求的用户可以使用驱动层：
//!
//! ```rust
//! use malcolm_sdk::driver::{MalcolmSession, PipelineConfig};
//! ```

pub use malcolm_client as client;
pub use malcolm_driver as driver;
pub use malcolm_protocol as protocol;
pub use malcolm_transport as transport;

// Prelude 模块
pub mod prelude;

// --- 用户以此为界 ---
// 以下是通过 Facade Pattern 提供的公共 API

// 协议层常用类型
pub use protocol::{
    DeviceState, MalcolmDetectorInfo, MalcolmMethod, MalcolmTable, MalcolmVersion, ProtocolError,
};

// 传输层
pub use transport::{MalcolmConnection, TransportError, TransportEvent};

// 驱动层（监听器与指标）
pub use driver::{
    DriverError, ListenerHandle, MalcolmEvent, MalcolmListener, MetricsSnapshot,
};

// 客户端层（推荐入口）
pub use client::{
    Attributable, ClientConfig, ClientError, Configurable, MalcolmDetectorModel, MalcolmDevice,
    MalcolmDeviceBuilder, MalcolmModel, ModelValidator, PointGenerator, RunOutcome,
    StaticGenerator, Validatable,
};

use std::sync::Once;

static LOGGER_INIT: Once = Once::new();

/// 初始化日志
///
/// 安装 `tracing_subscriber::fmt()`，过滤规则从 `RUST_LOG` 读取（缺省 `info`），
/// 并把 `log` crate 的记录桥接到 `tracing`。多次调用只有第一次生效；
/// 如果进程里已经安装了其他全局 subscriber，本函数不会覆盖它。
///
/// # 示例
///
/// ```rust
/// malcolm_sdk::init_logger();
/// tracing::info!("logger ready");
/// ```
pub fn init_logger() {
    LOGGER_INIT.call_once(|| {
        let _ = tracing_log::LogTracer::init();
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    });
}

/// `init_logger()` 是否已经执行过
pub fn logger_initialized() -> bool {
    LOGGER_INIT.is_completed()
}
