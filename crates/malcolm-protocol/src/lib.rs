//! # Malcolm Protocol
//!
//! Malcolm 设备协议层：与远端中间件交换的所有值类型。
//!
//! 本 crate 不涉及任何 IO，只定义：
//!
//! - **属性表** ([`MalcolmTable`]): 有序、带类型的列式容器（datasets 表、detectors 表）
//! - **协议版本** ([`MalcolmVersion`]): 决定属性命名与配置契约的版本门
//! - **探测器状态** ([`MalcolmDetectorInfo`]): 单个探测器的只读快照
//! - **设备状态** ([`DeviceState`]): 远端状态机在本地的镜像
//! - **属性词汇表** ([`constants`]): 与远端 schema 必须逐字一致的字符串常量
//! - **消息模型** ([`message`]): 请求/响应的 JSON 形状

pub mod constants;
pub mod detector;
pub mod message;
pub mod state;
pub mod table;
pub mod version;

pub use detector::MalcolmDetectorInfo;
pub use message::{MalcolmMethod, Request, RequestBody, RequestId, Response, ResponseBody};
pub use state::DeviceState;
pub use table::{CellValue, ColumnType, FromCell, MalcolmTable, TableRow};
pub use version::MalcolmVersion;

use thiserror::Error;

/// 协议层错误类型
///
/// 全部是本地契约违规（调用方错误或远端数据畸形），永远同步返回，不做重试。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// 列定义与数据不一致（键集合不同、列长度不同、行缺列/多列）
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Row index {index} out of bounds (rows: {rows})")]
    IndexOutOfBounds { index: usize, rows: usize },

    /// 远端报告的版本号畸形（负数、无法解析）
    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Cell type mismatch in column {column}: expected {expected}, got {actual}")]
    CellType {
        column: String,
        expected: ColumnType,
        actual: &'static str,
    },

    #[error("Invalid detector info: {0}")]
    InvalidDetector(String),

    #[error("Unknown device state: {0}")]
    UnknownState(String),

    /// 线格式负载无法解析
    #[error("Malformed payload: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        ProtocolError::Malformed(e.to_string())
    }
}
