//! 按协议版本选择的轴属性命名策略
//!
//! 4.2 之前设备在 `axesToMove` 属性上报告扫描轴，配置时只在与默认值不同时
//! 才发送 `axesToMove`；4.2 起改为 `simultaneousAxes`，并且配置时总是发送。
//!
//! 策略在 `initialize()` 时根据握手得到的版本选定一次，之后不再重新判断。

use malcolm_protocol::MalcolmVersion;
use malcolm_protocol::constants::{ATTRIBUTE_NAME_AXES_TO_MOVE, ATTRIBUTE_NAME_SIMULTANEOUS_AXES};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisNaming {
    /// 4.2 之前
    Legacy,
    /// 4.2 及之后
    Simultaneous,
}

impl AxisNaming {
    pub fn for_version(version: &MalcolmVersion) -> Self {
        if version.is_version_or_above(&MalcolmVersion::VERSION_4_2) {
            AxisNaming::Simultaneous
        } else {
            AxisNaming::Legacy
        }
    }

    /// 设备报告扫描轴所用的属性名
    pub const fn axes_attribute(&self) -> &'static str {
        match self {
            AxisNaming::Legacy => ATTRIBUTE_NAME_AXES_TO_MOVE,
            AxisNaming::Simultaneous => ATTRIBUTE_NAME_SIMULTANEOUS_AXES,
        }
    }

    pub const fn is_new(&self) -> bool {
        matches!(self, AxisNaming::Simultaneous)
    }

    /// 配置时要发送的 `axesToMove`
    ///
    /// - `Simultaneous`: 总是发送，未指定时发送全部可用轴
    /// - `Legacy`: 只有指定了且与全部可用轴不同时才发送
    pub fn axes_to_send(&self, requested: Option<&[String]>, available: &[String]) -> Option<Vec<String>> {
        match (self, requested) {
            (AxisNaming::Simultaneous, Some(axes)) => Some(axes.to_vec()),
            (AxisNaming::Simultaneous, None) => Some(available.to_vec()),
            (AxisNaming::Legacy, Some(axes)) if axes != available => Some(axes.to_vec()),
            (AxisNaming::Legacy, _) => None,
        }
    }
}
