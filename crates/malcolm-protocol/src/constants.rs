//! Malcolm 属性词汇表
//!
//! 这些字符串跨越序列化边界，必须与远端中间件的 schema 逐字一致。
//! 拼写错误不会产生编译错误，只会表现为静默的协议断裂。

use crate::table::ColumnType;

// ============================================================================
// 设备属性名
// ============================================================================

pub const ATTRIBUTE_NAME_STATE: &str = "state";
pub const ATTRIBUTE_NAME_HEALTH: &str = "health";
pub const ATTRIBUTE_NAME_TOTAL_STEPS: &str = "totalSteps";
pub const ATTRIBUTE_NAME_CONFIGURED_STEPS: &str = "configuredSteps";
pub const ATTRIBUTE_NAME_COMPLETED_STEPS: &str = "completedSteps";
/// 4.2 及以上协议中"可同时移动的轴"属性名
pub const ATTRIBUTE_NAME_SIMULTANEOUS_AXES: &str = "simultaneousAxes";
/// 4.2 之前协议中同一含义的属性名
pub const ATTRIBUTE_NAME_AXES_TO_MOVE: &str = "axesToMove";
pub const ATTRIBUTE_NAME_LAYOUT: &str = "layout";
pub const ATTRIBUTE_NAME_DATASETS: &str = "datasets";

// ============================================================================
// datasets 表的列名
// ============================================================================

pub const DATASETS_TABLE_COLUMN_NAME: &str = "name";
pub const DATASETS_TABLE_COLUMN_FILENAME: &str = "filename";
pub const DATASETS_TABLE_COLUMN_PATH: &str = "path";
pub const DATASETS_TABLE_COLUMN_TYPE: &str = "type";
pub const DATASETS_TABLE_COLUMN_RANK: &str = "rank";
pub const DATASETS_TABLE_COLUMN_UNIQUEID: &str = "uniqueid";

/// datasets 表的完整 schema（顺序即线格式顺序）
pub const DATASETS_TABLE_SCHEMA: [(&str, ColumnType); 6] = [
    (DATASETS_TABLE_COLUMN_NAME, ColumnType::String),
    (DATASETS_TABLE_COLUMN_FILENAME, ColumnType::String),
    (DATASETS_TABLE_COLUMN_TYPE, ColumnType::String),
    (DATASETS_TABLE_COLUMN_PATH, ColumnType::String),
    (DATASETS_TABLE_COLUMN_RANK, ColumnType::Integer),
    (DATASETS_TABLE_COLUMN_UNIQUEID, ColumnType::String),
];

// ============================================================================
// 配置模型字段名（configure / validate 的参数）
// ============================================================================

pub const FIELD_NAME_DETECTORS: &str = "detectors";
pub const FIELD_NAME_GENERATOR: &str = "generator";
pub const FIELD_NAME_AXES_TO_MOVE: &str = "axesToMove";
pub const FIELD_NAME_FILE_DIR: &str = "fileDir";
pub const FIELD_NAME_FILE_TEMPLATE: &str = "fileTemplate";
pub const FIELD_NAME_BREAKPOINTS: &str = "breakpoints";
/// configure 方法元数据中默认参数所在的字段
pub const FIELD_NAME_DEFAULTS: &str = "defaults";

// ============================================================================
// detectors 表的列名
// ============================================================================

pub const DETECTORS_TABLE_COLUMN_NAME: &str = "name";
pub const DETECTORS_TABLE_COLUMN_MRI: &str = "mri";
pub const DETECTORS_TABLE_COLUMN_EXPOSURE: &str = "exposure";
pub const DETECTORS_TABLE_COLUMN_FRAMES_PER_STEP: &str = "framesPerStep";
pub const DETECTORS_TABLE_COLUMN_ENABLE: &str = "enable";

/// detectors 表的完整 schema（顺序即线格式顺序）
pub const DETECTORS_TABLE_SCHEMA: [(&str, ColumnType); 5] = [
    (DETECTORS_TABLE_COLUMN_ENABLE, ColumnType::Boolean),
    (DETECTORS_TABLE_COLUMN_NAME, ColumnType::String),
    (DETECTORS_TABLE_COLUMN_MRI, ColumnType::String),
    (DETECTORS_TABLE_COLUMN_EXPOSURE, ColumnType::Float),
    (DETECTORS_TABLE_COLUMN_FRAMES_PER_STEP, ColumnType::Integer),
];

// ============================================================================
// 其他
// ============================================================================

/// 表在线格式中的类型标识
pub const TABLE_TYPE_ID: &str = "malcolm:core/Table:1.0";
/// 线格式中类型标识字段名
pub const TYPE_ID_FIELD: &str = "typeid";

pub const FILE_EXTENSION_H5: &str = "h5";

/// 远端设备错误消息的统一前缀
pub const DEVICE_ERROR_PREFIX: &str = "Error from Malcolm Device Connection: ";

/// 会话建立后自动订阅的属性
pub const SUBSCRIBED_ATTRIBUTES: [&str; 5] = [
    ATTRIBUTE_NAME_STATE,
    ATTRIBUTE_NAME_HEALTH,
    ATTRIBUTE_NAME_COMPLETED_STEPS,
    ATTRIBUTE_NAME_CONFIGURED_STEPS,
    ATTRIBUTE_NAME_TOTAL_STEPS,
];

/// 根据文件目录生成 Malcolm 文件名模板：`<目录名>-%s.h5`
///
/// Malcolm 会把 `%s` 替换成各个子设备的名字。
pub fn file_template_for(file_dir: &str) -> String {
    let trimmed = file_dir.trim_end_matches(['/', '\\']);
    let base = trimmed.rsplit(['/', '\\']).next().unwrap_or(trimmed);
    format!("{base}-%s.{FILE_EXTENSION_H5}")
}
