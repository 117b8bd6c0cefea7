//! 探测器状态快照
//!
//! 远端报告的单个探测器的只读镜像。要修改探测器配置，必须通过
//! configure 时传入的配置模型，而不是这个对象。

use crate::ProtocolError;
use crate::constants::{
    DETECTORS_TABLE_COLUMN_ENABLE, DETECTORS_TABLE_COLUMN_EXPOSURE,
    DETECTORS_TABLE_COLUMN_FRAMES_PER_STEP, DETECTORS_TABLE_COLUMN_MRI,
    DETECTORS_TABLE_COLUMN_NAME,
};
use crate::table::{MalcolmTable, TableRow};
use serde::{Deserialize, Serialize};

/// 单个探测器的不可变快照
///
/// 相等性是结构相等。反序列化经过 [`MalcolmDetectorInfo::new`] 的校验。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawDetectorInfo")]
pub struct MalcolmDetectorInfo {
    id: String,
    name: String,
    enabled: bool,
    exposure_time: f64,
    frames_per_step: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDetectorInfo {
    id: String,
    name: String,
    enabled: bool,
    exposure_time: f64,
    frames_per_step: u32,
}

impl TryFrom<RawDetectorInfo> for MalcolmDetectorInfo {
    type Error = ProtocolError;

    fn try_from(raw: RawDetectorInfo) -> Result<Self, Self::Error> {
        Self::new(raw.id, raw.name, raw.enabled, raw.exposure_time, raw.frames_per_step)
    }
}

impl MalcolmDetectorInfo {
    /// # 错误
    ///
    /// 曝光时间为负或非有限值时返回 [`ProtocolError::InvalidDetector`]。
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        enabled: bool,
        exposure_time: f64,
        frames_per_step: u32,
    ) -> Result<Self, ProtocolError> {
        let name = name.into();
        if !exposure_time.is_finite() || exposure_time < 0.0 {
            return Err(ProtocolError::InvalidDetector(format!(
                "{name}: exposure time must be a non-negative number of seconds, got {exposure_time}"
            )));
        }
        Ok(Self {
            id: id.into(),
            name,
            enabled,
            exposure_time,
            frames_per_step,
        })
    }

    /// 从 detectors 表的一行构造，id 取自 `mri` 列
    pub fn from_row(row: &TableRow) -> Result<Self, ProtocolError> {
        let missing =
            |column: &str| ProtocolError::InvalidDetector(format!("missing or mistyped {column}"));

        let name: String = row
            .get_as(DETECTORS_TABLE_COLUMN_NAME)
            .ok_or_else(|| missing(DETECTORS_TABLE_COLUMN_NAME))?;
        let mri: String = row
            .get_as(DETECTORS_TABLE_COLUMN_MRI)
            .ok_or_else(|| missing(DETECTORS_TABLE_COLUMN_MRI))?;
        let enabled: bool = row
            .get_as(DETECTORS_TABLE_COLUMN_ENABLE)
            .ok_or_else(|| missing(DETECTORS_TABLE_COLUMN_ENABLE))?;
        let exposure: f64 = row
            .get_as(DETECTORS_TABLE_COLUMN_EXPOSURE)
            .ok_or_else(|| missing(DETECTORS_TABLE_COLUMN_EXPOSURE))?;
        let frames: i64 = row
            .get_as(DETECTORS_TABLE_COLUMN_FRAMES_PER_STEP)
            .ok_or_else(|| missing(DETECTORS_TABLE_COLUMN_FRAMES_PER_STEP))?;
        let frames = u32::try_from(frames).map_err(|_| {
            ProtocolError::InvalidDetector(format!("{name}: invalid framesPerStep {frames}"))
        })?;

        Self::new(mri, name, enabled, exposure, frames)
    }

    /// 读取整张 detectors 表
    pub fn from_table(table: &MalcolmTable) -> Result<Vec<Self>, ProtocolError> {
        table.rows().map(|row| Self::from_row(&row)).collect()
    }

    /// 远端资源标识（MRI）
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 曝光时间（秒）
    pub fn exposure_time(&self) -> f64 {
        self.exposure_time
    }

    pub fn frames_per_step(&self) -> u32 {
        self.frames_per_step
    }
}
