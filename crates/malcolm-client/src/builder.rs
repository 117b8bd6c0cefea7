//! Builder 模式实现
//!
//! 提供链式构造 `MalcolmDevice` 实例的便捷方式。

use crate::capabilities::{DefaultValidator, ModelValidator};
use crate::config::ClientConfig;
use crate::device::MalcolmDevice;
use crate::error::{ClientError, Result};
use malcolm_transport::MalcolmConnection;
use std::path::Path;
use std::sync::Arc;

/// MalcolmDevice Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use malcolm_client::{ClientConfig, MalcolmDeviceBuilder};
/// # fn connection() -> std::sync::Arc<dyn malcolm_transport::MalcolmConnection> { unimplemented!() }
///
/// let config = ClientConfig {
///     run_timeout_ms: 3_600_000,
///     ..Default::default()
/// };
/// let device = MalcolmDeviceBuilder::new("BL45P-ML-SCAN-01")
///     .connection(connection())
///     .config(config)
///     .build()
///     .unwrap();
/// ```
pub struct MalcolmDeviceBuilder {
    /// 设备名（日志和错误消息中使用）
    name: String,
    /// 端点连接
    connection: Option<Arc<dyn MalcolmConnection>>,
    /// 客户端配置
    config: Option<ClientConfig>,
    /// 本地校验（默认 [`DefaultValidator`]）
    validator: Option<Arc<dyn ModelValidator>>,
}

impl MalcolmDeviceBuilder {
    /// 创建新的 Builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connection: None,
            config: None,
            validator: None,
        }
    }

    /// 设置端点连接（必需）
    pub fn connection(mut self, connection: Arc<dyn MalcolmConnection>) -> Self {
        self.connection = Some(connection);
        self
    }

    /// 设置客户端配置
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 从 TOML 文件加载客户端配置
    ///
    /// # 错误
    ///
    /// - `ClientError::Config`: 文件不可读或内容非法
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        self.config = Some(ClientConfig::load_from_file(path)?);
        Ok(self)
    }

    /// 替换本地校验规则
    pub fn validator(mut self, validator: Arc<dyn ModelValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// 构建设备（不建立连接，连接在 `initialize()` 时建立）
    ///
    /// # 错误
    ///
    /// - `ClientError::Config`: 未设置连接，或配置取值非法
    pub fn build(self) -> Result<MalcolmDevice> {
        let connection = self.connection.ok_or_else(|| {
            ClientError::Config(format!("No connection configured for device {}", self.name))
        })?;
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let validator = self
            .validator
            .unwrap_or_else(|| Arc::new(DefaultValidator) as Arc<dyn ModelValidator>);
        Ok(MalcolmDevice::with_validator(self.name, connection, config, validator))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::ValidationContext;
    use crate::model::MalcolmModel;
    use malcolm_transport::SimulatedEndpoint;

    struct RejectAll;

    impl ModelValidator for RejectAll {
        fn validate(&self, _model: &MalcolmModel, _ctx: &ValidationContext<'_>) -> Result<()> {
            Err(ClientError::Validation("rejected".to_string()))
        }
    }

    #[test]
    fn test_builder_requires_connection() {
        let result = MalcolmDeviceBuilder::new("ML-SCAN-01").build();
        assert!(matches!(result, Err(ClientError::Config(_))));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let config = ClientConfig {
            run_timeout_ms: 0,
            ..Default::default()
        };
        let result = MalcolmDeviceBuilder::new("ML-SCAN-01")
            .connection(Arc::new(SimulatedEndpoint::new("sim://builder")))
            .config(config)
            .build();
        assert_eq!(
            result.err(),
            Some(ClientError::Config("run_timeout_ms must be positive".to_string()))
        );
    }

    #[test]
    fn test_builder_defaults() {
        let device = MalcolmDeviceBuilder::new("ML-SCAN-01")
            .connection(Arc::new(SimulatedEndpoint::new("sim://builder")))
            .build()
            .unwrap();
        assert_eq!(device.name(), "ML-SCAN-01");
        assert_eq!(device.url(), "sim://builder");
        assert_eq!(device.config(), &ClientConfig::default());
        assert!(!device.is_initialized());
    }

    #[test]
    fn test_builder_custom_validator() {
        let device = MalcolmDeviceBuilder::new("ML-SCAN-01")
            .connection(Arc::new(SimulatedEndpoint::new("sim://builder")))
            .validator(Arc::new(RejectAll))
            .build()
            .unwrap();
        device.initialize().unwrap();
        device.set_file_dir("/data/scan").unwrap();
        assert_eq!(
            device.configure(&MalcolmModel::new("scan")),
            Err(ClientError::Validation("rejected".to_string()))
        );
    }

    #[test]
    fn test_builder_config_file_missing() {
        let result = MalcolmDeviceBuilder::new("ML-SCAN-01").config_file("/nonexistent/malcolm.toml");
        assert!(matches!(result, Err(ClientError::Config(_))));
    }
}
