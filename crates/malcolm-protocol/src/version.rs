//! Malcolm 协议版本
//!
//! 连接建立时由远端报告一次，之后不可变。`simultaneousAxes` 属性名
//! 以及 configure 时是否必须携带 `axesToMove`，都由 4.2 这个边界决定。

use crate::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 协议版本（major, minor）
///
/// 字段顺序即比较顺序：先比较 major，再比较 minor。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MalcolmVersion {
    major: u32,
    minor: u32,
}

impl MalcolmVersion {
    /// 4.0 协议族
    pub const VERSION_4_0: MalcolmVersion = MalcolmVersion::from_parts(4, 0);
    /// 4.2 协议族（引入 `simultaneousAxes`）
    pub const VERSION_4_2: MalcolmVersion = MalcolmVersion::from_parts(4, 2);

    /// 从远端报告的原始整数构造
    ///
    /// # 错误
    ///
    /// 任一分量为负或超出 `u32` 时返回 [`ProtocolError::InvalidVersion`]，
    /// 不做截断。
    pub fn new(major: i64, minor: i64) -> Result<Self, ProtocolError> {
        let to_part = |v: i64| {
            u32::try_from(v)
                .map_err(|_| ProtocolError::InvalidVersion(format!("{major}.{minor}")))
        };
        Ok(Self::from_parts(to_part(major)?, to_part(minor)?))
    }

    pub const fn from_parts(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    pub const fn major(&self) -> u32 {
        self.major
    }

    pub const fn minor(&self) -> u32 {
        self.minor
    }

    /// `self >= other`
    pub fn is_version_or_above(&self, other: &MalcolmVersion) -> bool {
        self >= other
    }
}

impl fmt::Display for MalcolmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// 解析远端报告的版本字符串
///
/// 接受 `"4"`、`"4.2"`、`"4.2.1"`、`"v4.2"` 等形式，补丁号被忽略。
/// 解析交给 `semver`，因此负数与非数字分量都会被拒绝。
impl FromStr for MalcolmVersion {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let raw = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
        let normalized = match raw.split('.').count() {
            1 => format!("{raw}.0.0"),
            2 => format!("{raw}.0"),
            _ => raw.to_string(),
        };
        let parsed = semver::Version::parse(&normalized)
            .map_err(|e| ProtocolError::InvalidVersion(format!("{s:?}: {e}")))?;
        let to_part = |v: u64| {
            u32::try_from(v).map_err(|_| ProtocolError::InvalidVersion(s.to_string()))
        };
        Ok(Self::from_parts(to_part(parsed.major)?, to_part(parsed.minor)?))
    }
}
