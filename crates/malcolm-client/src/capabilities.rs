//! 设备能力接口
//!
//! 编排器按需依赖其中一个窄接口，而不是整个 [`MalcolmDevice`](crate::MalcolmDevice)：
//!
//! - [`Configurable`]: 下发配置
//! - [`Attributable`]: 读取设备属性
//! - [`Validatable`]: 远端校验配置
//!
//! [`ModelValidator`] 是本地校验的接入点，在任何远端调用之前执行。

use crate::error::{ClientError, Result};
use crate::model::MalcolmModel;
use malcolm_protocol::ProtocolError;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// 可配置的设备
pub trait Configurable {
    type Model;

    /// 下发配置，阻塞直到设备进入 Ready（或报告故障）
    fn configure(&self, model: &Self::Model) -> Result<()>;
}

/// 可读取属性的设备
pub trait Attributable {
    fn get_attribute(&self, name: &str) -> Result<Value>;

    /// 全部属性，按设备报告的顺序
    fn get_all_attributes(&self) -> Result<Vec<(String, Value)>>;

    /// 读取属性并反序列化
    ///
    /// # 错误
    ///
    /// - `ClientError::Protocol(ProtocolError::Malformed)`: 属性值与 `T` 不匹配
    fn get_attribute_value<T: DeserializeOwned>(&self, name: &str) -> Result<T>
    where
        Self: Sized,
    {
        let value = self.get_attribute(name)?;
        serde_json::from_value(value).map_err(|e| ClientError::Protocol(ProtocolError::from(e)))
    }
}

/// 可远端校验配置的设备
pub trait Validatable {
    type Model;

    /// 只报告成功或失败
    fn validate(&self, model: &Self::Model) -> Result<()> {
        self.validate_with_return(model).map(|_| ())
    }

    /// 返回设备修正后的模型（例如曝光时间被对齐到时钟周期）
    fn validate_with_return(&self, model: &Self::Model) -> Result<Self::Model>;
}

/// 本地校验所需的设备上下文
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub available_axes: &'a [String],
    pub file_dir: Option<&'a str>,
}

/// 本地模型校验
pub trait ModelValidator: Send + Sync {
    fn validate(&self, model: &MalcolmModel, ctx: &ValidationContext<'_>) -> Result<()>;
}

/// 默认校验规则
///
/// - 扫描轴必须是可用轴的子集
/// - 探测器曝光时间有限且 ≥ 0
/// - 探测器 `frames_per_step` ≥ 1
/// - 文件目录非空
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValidator;

impl ModelValidator for DefaultValidator {
    fn validate(&self, model: &MalcolmModel, ctx: &ValidationContext<'_>) -> Result<()> {
        if let Some(axes) = &model.axes_to_move
            && let Some(axis) = axes.iter().find(|a| !ctx.available_axes.contains(*a))
        {
            return Err(ClientError::Validation(format!("Invalid axis name: {axis}")));
        }

        for detector in &model.detectors {
            if !detector.exposure_time.is_finite() || detector.exposure_time < 0.0 {
                return Err(ClientError::Validation(format!(
                    "Detector {} has invalid exposure time {}",
                    detector.name, detector.exposure_time
                )));
            }
            if detector.frames_per_step == 0 {
                return Err(ClientError::Validation(format!(
                    "Detector {} must take at least one frame per step",
                    detector.name
                )));
            }
        }

        match ctx.file_dir {
            Some(dir) if !dir.trim().is_empty() => Ok(()),
            _ => Err(ClientError::Validation("File directory is not set".to_string())),
        }
    }
}
