//! 配置模型
//!
//! [`MalcolmModel`] 是调用方交给 `configure()` / `validate()` 的模型；
//! 发送前它会和本地状态（点生成器、文件目录）合并成线上参数。

use malcolm_protocol::constants::*;
use malcolm_protocol::table::CellValue;
use malcolm_protocol::{MalcolmDetectorInfo, MalcolmTable, ProtocolError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 扫描点生成器
///
/// 对本层是不透明的：只需要能序列化为 JSON，并报告它会移动哪些轴。
pub trait PointGenerator: Send + Sync {
    /// 线上表示
    fn to_json(&self) -> Value;

    /// 生成器移动的轴（按扫描维度顺序）
    fn axes(&self) -> Vec<String>;
}

/// 由现成 JSON 描述构成的生成器
#[derive(Debug, Clone, PartialEq)]
pub struct StaticGenerator {
    description: Value,
    axes: Vec<String>,
}

impl StaticGenerator {
    pub fn new<I, S>(description: Value, axes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            description,
            axes: axes.into_iter().map(Into::into).collect(),
        }
    }

    /// 行扫描：`axis` 从 `start` 到 `stop` 共 `size` 点
    pub fn line(axis: &str, start: f64, stop: f64, size: u64) -> Self {
        Self::new(
            serde_json::json!({
                "typeid": "scanpointgenerator:generator/CompoundGenerator:1.0",
                "generators": [{
                    "typeid": "scanpointgenerator:generator/LineGenerator:1.0",
                    "axes": [axis],
                    "start": [start],
                    "stop": [stop],
                    "size": size,
                }],
            }),
            [axis],
        )
    }
}

impl PointGenerator for StaticGenerator {
    fn to_json(&self) -> Value {
        self.description.clone()
    }

    fn axes(&self) -> Vec<String> {
        self.axes.clone()
    }
}

/// 单个探测器的配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MalcolmDetectorModel {
    pub name: String,
    pub mri: String,
    /// 曝光时间（秒）
    pub exposure_time: f64,
    pub frames_per_step: u32,
    pub enabled: bool,
}

impl MalcolmDetectorModel {
    pub fn new(name: impl Into<String>, mri: impl Into<String>, exposure_time: f64, frames_per_step: u32) -> Self {
        Self {
            name: name.into(),
            mri: mri.into(),
            exposure_time,
            frames_per_step,
            enabled: true,
        }
    }
}

impl From<&MalcolmDetectorInfo> for MalcolmDetectorModel {
    fn from(info: &MalcolmDetectorInfo) -> Self {
        Self {
            name: info.name().to_string(),
            mri: info.id().to_string(),
            exposure_time: info.exposure_time(),
            frames_per_step: info.frames_per_step(),
            enabled: info.is_enabled(),
        }
    }
}

/// 设备配置模型
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MalcolmModel {
    pub name: String,
    /// 曝光时间（秒），大于 0 时写入生成器的 `duration`
    pub exposure_time: f64,
    /// 参与扫描的轴；`None` 表示设备的全部可用轴
    pub axes_to_move: Option<Vec<String>>,
    pub detectors: Vec<MalcolmDetectorModel>,
    /// 暂停边界（步数）
    pub breakpoints: Vec<u64>,
}

impl MalcolmModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_axes_to_move<I, S>(mut self, axes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.axes_to_move = Some(axes.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_detector(mut self, detector: MalcolmDetectorModel) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn with_exposure_time(mut self, exposure_time: f64) -> Self {
        self.exposure_time = exposure_time;
        self
    }

    pub fn with_breakpoints(mut self, breakpoints: impl Into<Vec<u64>>) -> Self {
        self.breakpoints = breakpoints.into();
        self
    }

    /// 探测器列表的线上表（列顺序固定为 enable, name, mri, exposure, framesPerStep）
    pub fn detectors_table(&self) -> Result<MalcolmTable, ProtocolError> {
        let mut table = MalcolmTable::new(DETECTORS_TABLE_SCHEMA)?;
        for detector in &self.detectors {
            table.add_row([
                (DETECTORS_TABLE_COLUMN_ENABLE, CellValue::from(detector.enabled)),
                (DETECTORS_TABLE_COLUMN_NAME, CellValue::from(detector.name.as_str())),
                (DETECTORS_TABLE_COLUMN_MRI, CellValue::from(detector.mri.as_str())),
                (DETECTORS_TABLE_COLUMN_EXPOSURE, CellValue::from(detector.exposure_time)),
                (
                    DETECTORS_TABLE_COLUMN_FRAMES_PER_STEP,
                    CellValue::from(detector.frames_per_step),
                ),
            ])?;
        }
        Ok(table)
    }

    /// 用设备返回的（可能被修正过的）参数更新模型
    ///
    /// 只接受探测器表和轴；其余字段保持不变。
    pub fn apply_returned(&mut self, returned: &Map<String, Value>) -> Result<(), ProtocolError> {
        if let Some(raw) = returned.get(FIELD_NAME_DETECTORS) {
            let table = MalcolmTable::from_wire(raw, &DETECTORS_TABLE_SCHEMA)?;
            self.detectors = MalcolmDetectorInfo::from_table(&table)?
                .iter()
                .map(MalcolmDetectorModel::from)
                .collect();
        }
        if let Some(raw) = returned.get(FIELD_NAME_AXES_TO_MOVE) {
            let axes: Vec<String> = serde_json::from_value(raw.clone())?;
            self.axes_to_move = Some(axes);
        }
        Ok(())
    }
}

/// `configure` / `validate` 的线上参数
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigureParameters(pub Map<String, Value>);

impl ConfigureParameters {
    /// 合并模型与本地状态
    ///
    /// `axes` 为 `None` 时不发送 `axesToMove`（由命名策略决定）。
    pub fn build(
        model: &MalcolmModel,
        generator: Option<&dyn PointGenerator>,
        file_dir: Option<&str>,
        axes: Option<Vec<String>>,
    ) -> Result<Self, ProtocolError> {
        let mut params = Map::new();
        if let Some(generator) = generator {
            let mut description = generator.to_json();
            if model.exposure_time > 0.0
                && let Some(object) = description.as_object_mut()
            {
                object.insert("duration".to_string(), Value::from(model.exposure_time));
            }
            params.insert(FIELD_NAME_GENERATOR.to_string(), description);
        }
        if let Some(axes) = axes {
            params.insert(FIELD_NAME_AXES_TO_MOVE.to_string(), Value::from(axes));
        }
        if let Some(file_dir) = file_dir {
            params.insert(FIELD_NAME_FILE_DIR.to_string(), Value::from(file_dir));
            params.insert(
                FIELD_NAME_FILE_TEMPLATE.to_string(),
                Value::from(file_template_for(file_dir)),
            );
        }
        if !model.detectors.is_empty() {
            params.insert(FIELD_NAME_DETECTORS.to_string(), model.detectors_table()?.to_wire());
        }
        if !model.breakpoints.is_empty() {
            params.insert(FIELD_NAME_BREAKPOINTS.to_string(), Value::from(model.breakpoints.clone()));
        }
        Ok(Self(params))
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> MalcolmModel {
        MalcolmModel::new("scan")
            .with_exposure_time(0.1)
            .with_axes_to_move(["x"])
            .with_detector(MalcolmDetectorModel::new("det", "ML-DET-01", 0.1, 1))
    }

    #[test]
    fn test_detectors_table_schema() {
        let table = model().detectors_table().unwrap();
        assert_eq!(table.num_rows(), 1);
        assert_eq!(
            table.column_names().collect::<Vec<_>>(),
            ["enable", "name", "mri", "exposure", "framesPerStep"]
        );
    }

    #[test]
    fn test_build_parameters() {
        let generator = StaticGenerator::line("x", 0.0, 1.0, 5);
        let params = ConfigureParameters::build(
            &model(),
            Some(&generator),
            Some("/data/2026/cm1-1/ixx-1234"),
            Some(vec!["x".to_string()]),
        )
        .unwrap()
        .into_inner();

        assert_eq!(params["fileTemplate"], "ixx-1234-%s.h5");
        assert_eq!(params["axesToMove"], serde_json::json!(["x"]));
        assert_eq!(params["generator"]["duration"], 0.1);
        assert!(params.contains_key("detectors"));
        assert!(!params.contains_key("breakpoints"));
    }

    #[test]
    fn test_build_without_axes() {
        let params = ConfigureParameters::build(&MalcolmModel::new("scan"), None, None, None)
            .unwrap()
            .into_inner();
        assert!(params.is_empty());
    }

    #[test]
    fn test_apply_returned() {
        let mut model = model();
        let mut adjusted = model.clone();
        adjusted.detectors[0].exposure_time = 0.12;
        adjusted.detectors[0].frames_per_step = 10;
        let mut returned = Map::new();
        returned.insert(
            FIELD_NAME_DETECTORS.to_string(),
            adjusted.detectors_table().unwrap().to_wire(),
        );
        model.apply_returned(&returned).unwrap();
        assert_eq!(model.detectors, adjusted.detectors);
        assert_eq!(model.axes_to_move, Some(vec!["x".to_string()]));
    }

    #[test]
    fn test_model_serde_camel_case() {
        let model = model();
        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(json["axesToMove"], serde_json::json!(["x"]));
        let back: MalcolmModel = serde_json::from_value(json).unwrap();
        assert_eq!(back, model);
    }
}
