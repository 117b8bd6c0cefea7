//! 客户端配置
//!
//! 超时与事件节流参数，可以从 TOML 加载：
//!
//! ```toml
//! standard_timeout_ms = 5000
//! configure_timeout_ms = 600000
//! run_timeout_ms = 172800000
//! steps_event_interval_ms = 250
//! ```
//!
//! 缺省字段使用默认值。

use crate::error::{ClientError, Result};
use malcolm_driver::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// 客户端配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// 普通请求（属性读写、abort、pause 等）超时（ms）
    pub standard_timeout_ms: u64,
    /// configure 超时（ms），默认 10 分钟
    pub configure_timeout_ms: u64,
    /// run 超时（ms），默认 2 天
    pub run_timeout_ms: u64,
    /// 进度事件最小间隔（ms）
    pub steps_event_interval_ms: u64,
    /// 事件线程轮询间隔（ms）
    pub event_poll_interval_ms: u64,
    /// 阻塞调用检查镜像状态的间隔（ms）
    pub abort_poll_interval_ms: u64,
    /// 关闭时等待后台线程的时间（ms）
    pub join_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            standard_timeout_ms: 5_000,
            configure_timeout_ms: 600_000,
            run_timeout_ms: 172_800_000,
            steps_event_interval_ms: 250,
            event_poll_interval_ms: 50,
            abort_poll_interval_ms: 20,
            join_timeout_ms: 2_000,
        }
    }
}

impl ClientConfig {
    /// 从 TOML 字符串解析
    ///
    /// # 错误
    ///
    /// - `ClientError::Config`: TOML 语法错误、字段类型错误或取值非法
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ClientError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// 序列化为 TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| ClientError::Config(e.to_string()))
    }

    /// 检查取值：所有超时与间隔都必须为正
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("standard_timeout_ms", self.standard_timeout_ms),
            ("configure_timeout_ms", self.configure_timeout_ms),
            ("run_timeout_ms", self.run_timeout_ms),
            ("event_poll_interval_ms", self.event_poll_interval_ms),
            ("abort_poll_interval_ms", self.abort_poll_interval_ms),
            ("join_timeout_ms", self.join_timeout_ms),
        ];
        match fields.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(ClientError::Config(format!("{name} must be positive"))),
            None => Ok(()),
        }
    }

    pub fn standard_timeout(&self) -> Duration {
        Duration::from_millis(self.standard_timeout_ms)
    }

    pub fn configure_timeout(&self) -> Duration {
        Duration::from_millis(self.configure_timeout_ms)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    /// 会话管道配置
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            request_timeout_ms: self.standard_timeout_ms,
            event_poll_interval_ms: self.event_poll_interval_ms,
            steps_event_interval_ms: self.steps_event_interval_ms,
            abort_poll_interval_ms: self.abort_poll_interval_ms,
            join_timeout_ms: self.join_timeout_ms,
            ..PipelineConfig::default()
        }
    }
}
