//! 客户端接口模块
//!
//! 本模块提供 Malcolm 设备的用户友好接口，包括：
//! - 状态检查的命令接口（configure / run / abort / pause / resume / seek）
//! - 配置模型与本地校验
//! - 按协议版本选择的轴命名策略
//! - 窄能力接口（[`Configurable`]、[`Attributable`]、[`Validatable`]）
//!
//! # 使用场景
//!
//! 这是大多数用户应该使用的模块。如果需要直接发送 Malcolm 请求或自行管理会话，
//! 可以使用 `malcolm-driver` 提供的 `MalcolmSession`。

pub mod builder;
pub mod capabilities;
pub mod config;
pub mod device;
mod error;
pub mod model;
pub mod naming;

// 重新导出常用类型
pub use builder::MalcolmDeviceBuilder;
pub use capabilities::{
    Attributable, Configurable, DefaultValidator, ModelValidator, Validatable, ValidationContext,
};
pub use config::ClientConfig;
pub use device::{MalcolmDevice, RunOutcome};
pub use error::{ClientError, Result};
pub use model::{
    ConfigureParameters, MalcolmDetectorModel, MalcolmModel, PointGenerator, StaticGenerator,
};
pub use naming::AxisNaming;
