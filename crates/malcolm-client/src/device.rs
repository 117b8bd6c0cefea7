//! Malcolm 设备（对外 API）
//!
//! [`MalcolmDevice`] 是单个远端 Malcolm 端点的阻塞式命令接口和本地状态机守卫。
//!
//! # 生命周期
//!
//! ```text
//! new ──initialize()──► 已连接 ──dispose()──► 已释放
//!        (失败可重试)       │
//!                         └─ 连接丢失 / Disabled：会话终止，需要 dispose + 新实例 initialize
//! ```
//!
//! # 线程
//!
//! 编排线程依次调用 `configure → run → (pause/resume)* → 完成或中止`；
//! 任意其他线程可以并发调用 `abort()`、`is_locked()`、监听器增删和只读访问。
//! `run()` 阻塞期间，另一个线程调用 `abort()` 会让它在 `abort_poll_interval_ms`
//! 量级的时间内返回 [`RunOutcome::Aborted`]。
//!
//! # 故障恢复
//!
//! `Fault` 不会自动复位：调用方显式 `reset()`，或者 dispose 后重新 initialize。
//! 唯一的例外是 `configure()`，它在下发配置前总会先尝试一次 reset。

use crate::capabilities::{
    Attributable, Configurable, DefaultValidator, ModelValidator, Validatable, ValidationContext,
};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::model::{ConfigureParameters, MalcolmModel, PointGenerator};
use crate::naming::AxisNaming;
use arc_swap::ArcSwapOption;
use crossbeam_channel::{Receiver, Sender, bounded};
use malcolm_driver::{
    CallOutcome, DriverError, ListenerHandle, ListenerRegistry, MalcolmListener, MalcolmSession,
    MetricsSnapshot,
};
use malcolm_protocol::constants::*;
use malcolm_protocol::{
    DeviceState, MalcolmDetectorInfo, MalcolmMethod, MalcolmTable, MalcolmVersion, ProtocolError,
};
use malcolm_transport::MalcolmConnection;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// `run()` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// 扫描完成，设备回到 Idle
    Completed,
    /// 停在暂停边界（设备回到 Ready），可以再次 `run()`
    SegmentComplete,
    /// 被 `abort()` 中止
    Aborted,
}

/// 初始化后才存在的会话状态
struct ActiveSession {
    session: MalcolmSession,
    /// 按协议版本选定一次
    naming: AxisNaming,
    available_axes: Vec<String>,
}

/// Malcolm 设备
///
/// # Example
///
/// ```rust,ignore
/// use malcolm_client::{MalcolmDeviceBuilder, MalcolmModel, RunOutcome, StaticGenerator};
/// use std::sync::Arc;
///
/// let device = MalcolmDeviceBuilder::new("BL45P-ML-SCAN-01")
///     .connection(connection)
///     .build()?;
/// device.initialize()?;
/// device.set_point_generator(Arc::new(StaticGenerator::line("x", 0.0, 1.0, 10)))?;
/// device.set_file_dir("/dls/i45/data/2026/cm1-1/i45-1234")?;
/// device.configure(&MalcolmModel::new("scan").with_axes_to_move(["x"]))?;
/// assert_eq!(device.run()?, RunOutcome::Completed);
/// ```
pub struct MalcolmDevice {
    name: String,
    connection: Arc<dyn MalcolmConnection>,
    config: ClientConfig,
    validator: Arc<dyn ModelValidator>,
    listeners: Arc<ListenerRegistry>,
    active: ArcSwapOption<ActiveSession>,
    disposed: AtomicBool,
    /// 串行化 initialize
    init_lock: Mutex<()>,
    generator: RwLock<Option<Arc<dyn PointGenerator>>>,
    file_dir: RwLock<Option<String>>,
    /// 最近一次成功下发的模型
    model: RwLock<Option<MalcolmModel>>,
    /// configure 之后从设备读回的扫描轴
    configured_axes: ArcSwapOption<Vec<String>>,
    /// 正在进行的 configure / run 的中止信号
    run_abort: Mutex<Option<Sender<()>>>,
    abort_requested: AtomicBool,
}

impl MalcolmDevice {
    /// 创建设备（不建立连接）
    pub fn new(
        name: impl Into<String>,
        connection: Arc<dyn MalcolmConnection>,
        config: ClientConfig,
    ) -> Self {
        Self::with_validator(name, connection, config, Arc::new(DefaultValidator))
    }

    pub fn with_validator(
        name: impl Into<String>,
        connection: Arc<dyn MalcolmConnection>,
        config: ClientConfig,
        validator: Arc<dyn ModelValidator>,
    ) -> Self {
        Self {
            name: name.into(),
            connection,
            config,
            validator,
            listeners: Arc::new(ListenerRegistry::new()),
            active: ArcSwapOption::empty(),
            configured_axes: ArcSwapOption::empty(),
            disposed: AtomicBool::new(false),
            init_lock: Mutex::new(()),
            generator: RwLock::new(None),
            file_dir: RwLock::new(None),
            model: RwLock::new(None),
            run_abort: Mutex::new(None),
            abort_requested: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        self.connection.url()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // 会话
    // ------------------------------------------------------------------------

    /// 建立会话，读取协议版本与可用轴
    ///
    /// # 错误
    ///
    /// - `ClientError::Connection`: 端点不可达或握手失败；可以再次调用 `initialize()`
    /// - `ClientError::Protocol(InvalidVersion)`: 远端报告的版本号畸形
    /// - `ClientError::IllegalState`: 已经初始化过
    /// - `ClientError::Disposed`: 已经释放
    pub fn initialize(&self) -> Result<()> {
        self.ensure_not_disposed()?;
        let _guard = self.init_lock.lock();
        if let Some(active) = self.active.load_full() {
            return Err(ClientError::IllegalState {
                operation: "initialize",
                state: active.session.state(),
            });
        }

        debug!("Initializing Malcolm device {} at {}", self.name, self.connection.url());
        let session = MalcolmSession::open(
            self.connection.clone(),
            self.listeners.clone(),
            self.config.pipeline(),
        )?;
        let naming = AxisNaming::for_version(&session.version());
        let available_axes = Self::read_axes(&session, naming, self.config.standard_timeout())?;

        // 初始化期间被 dispose：丢弃刚建立的会话
        if self.disposed.load(Ordering::Acquire) {
            session.disconnect();
            return Err(ClientError::Disposed(self.name.clone()));
        }

        info!(
            "Malcolm device {} initialized (protocol {}, axes {:?}, state {})",
            self.name,
            session.version(),
            available_axes,
            session.state()
        );
        self.active.store(Some(Arc::new(ActiveSession {
            session,
            naming,
            available_axes,
        })));
        Ok(())
    }

    /// 释放会话（幂等）
    ///
    /// 正在阻塞的 `configure()` / `run()` 会立即返回 `ClientError::Disposed`。
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("Disposing Malcolm device {}", self.name);
        self.abort_requested.store(true, Ordering::Release);
        // 丢弃发送端即可唤醒等待中的调用
        self.run_abort.lock().take();
        if let Some(active) = self.active.swap(None) {
            active.session.disconnect();
        }
        info!("Malcolm device {} disposed", self.name);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn is_initialized(&self) -> bool {
        !self.is_disposed() && self.active.load().is_some()
    }

    fn ensure_not_disposed(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            Err(ClientError::Disposed(self.name.clone()))
        } else {
            Ok(())
        }
    }

    fn session(&self) -> Result<Arc<ActiveSession>> {
        self.ensure_not_disposed()?;
        self.active
            .load_full()
            .ok_or_else(|| ClientError::NotInitialized(self.name.clone()))
    }

    /// 发命令前使用：连接丢失后会话终止
    fn connected_session(&self) -> Result<Arc<ActiveSession>> {
        let active = self.session()?;
        // 断线后即使连接恢复，会话也保持 Offline
        if !active.session.is_connected() || active.session.state() == DeviceState::Offline {
            return Err(ClientError::Connection(format!(
                "Connection to {} lost; dispose and initialize again",
                self.connection.url()
            )));
        }
        Ok(active)
    }

    fn require_state(
        &self,
        active: &ActiveSession,
        operation: &'static str,
        allowed: &[DeviceState],
    ) -> Result<DeviceState> {
        let state = active.session.state();
        if allowed.contains(&state) {
            Ok(state)
        } else {
            debug!("Rejecting {} on {}: device is {}", operation, self.name, state);
            Err(ClientError::IllegalState { operation, state })
        }
    }

    fn map_call_error(err: DriverError, timeout: Duration) -> ClientError {
        match err {
            DriverError::Timeout => ClientError::timeout(timeout),
            other => other.into(),
        }
    }

    /// 读取设备报告扫描轴的属性（属性名由协议版本决定）
    fn read_axes(
        session: &MalcolmSession,
        naming: AxisNaming,
        timeout: Duration,
    ) -> Result<Vec<String>> {
        let raw = session
            .get(naming.axes_attribute())
            .map_err(|e| Self::map_call_error(e, timeout))?;
        Ok(serde_json::from_value::<Vec<String>>(raw).map_err(ProtocolError::from)?)
    }

    fn arm_abort(&self) -> Receiver<()> {
        let (tx, rx) = bounded(1);
        self.abort_requested.store(false, Ordering::Release);
        *self.run_abort.lock() = Some(tx);
        rx
    }

    fn disarm_abort(&self) {
        self.run_abort.lock().take();
    }

    fn simple_call(
        &self,
        active: &ActiveSession,
        method: MalcolmMethod,
        parameters: Map<String, Value>,
        timeout: Duration,
    ) -> Result<Value> {
        trace!("{}: calling {}", self.name, method);
        active
            .session
            .call(method, parameters, timeout)
            .map_err(|e| Self::map_call_error(e, timeout))
    }

    // ------------------------------------------------------------------------
    // 查询
    // ------------------------------------------------------------------------

    /// 镜像状态（无锁）
    pub fn get_device_state(&self) -> Result<DeviceState> {
        Ok(self.session()?.session.state())
    }

    /// 设备正在配置或运行（非 Idle / Ready / Fault / Aborted）
    pub fn is_locked(&self) -> Result<bool> {
        Ok(self.get_device_state()?.is_busy())
    }

    /// 可用轴（initialize 时读取并缓存）
    ///
    /// # 错误
    ///
    /// - `ClientError::Scanning`: 尚未初始化（空集合是合法答案，不会用来表示未初始化）
    pub fn get_available_axes(&self) -> Result<Vec<String>> {
        self.ensure_not_disposed()?;
        match self.active.load_full() {
            Some(active) => Ok(active.available_axes.clone()),
            None => Err(ClientError::Scanning(format!(
                "Cannot get available axes of {} before it is initialized",
                self.name
            ))),
        }
    }

    /// 协议版本是否 ≥ 4.2（会话期间不变）
    pub fn is_new_malcolm_version(&self) -> Result<bool> {
        Ok(self.session()?.naming.is_new())
    }

    pub fn get_version(&self) -> Result<MalcolmVersion> {
        Ok(self.session()?.session.version())
    }

    /// 读取远端当前 health
    pub fn get_device_health(&self) -> Result<String> {
        let value = self.get_attribute(ATTRIBUTE_NAME_HEALTH)?;
        Ok(value
            .as_str()
            .map_or_else(|| value.to_string(), str::to_string))
    }

    pub fn get_attribute(&self, name: &str) -> Result<Value> {
        trace!("{}: get attribute {}", self.name, name);
        let timeout = self.config.standard_timeout();
        self.connected_session()?
            .session
            .get(name)
            .map_err(|e| Self::map_call_error(e, timeout))
    }

    pub fn get_all_attributes(&self) -> Result<Vec<(String, Value)>> {
        let timeout = self.config.standard_timeout();
        let all = self
            .connected_session()?
            .session
            .get("")
            .map_err(|e| Self::map_call_error(e, timeout))?;
        match all {
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(ProtocolError::Malformed(format!(
                "expected attribute object, got {other}"
            ))
            .into()),
        }
    }

    /// datasets 表（校验列定义）
    pub fn get_datasets(&self) -> Result<MalcolmTable> {
        let value = self.get_attribute(ATTRIBUTE_NAME_DATASETS)?;
        Ok(MalcolmTable::from_wire(&value, &DATASETS_TABLE_SCHEMA)?)
    }

    /// 设备默认的探测器配置（configure 方法的 defaults.detectors）
    pub fn get_detector_infos(&self) -> Result<Vec<MalcolmDetectorInfo>> {
        let meta = self.get_attribute(MalcolmMethod::Configure.as_str())?;
        let table = meta
            .get(FIELD_NAME_DEFAULTS)
            .and_then(|defaults| defaults.get(FIELD_NAME_DETECTORS))
            .ok_or_else(|| {
                ProtocolError::Malformed("configure defaults carry no detectors table".to_string())
            })?;
        let table = MalcolmTable::from_wire(table, &DETECTORS_TABLE_SCHEMA)?;
        Ok(MalcolmDetectorInfo::from_table(&table)?)
    }

    pub fn completed_steps(&self) -> Result<u64> {
        Ok(self.session()?.session.context().progress().completed_steps)
    }

    pub fn configured_steps(&self) -> Result<u64> {
        Ok(self.session()?.session.context().progress().configured_steps)
    }

    pub fn total_steps(&self) -> Result<u64> {
        Ok(self.session()?.session.context().progress().total_steps)
    }

    pub fn metrics(&self) -> Result<MetricsSnapshot> {
        Ok(self.session()?.session.metrics())
    }

    /// 最近一次成功 configure 的模型
    pub fn get_model(&self) -> Option<MalcolmModel> {
        self.model.read().clone()
    }

    /// 最近一次成功 configure 后设备报告的扫描轴
    ///
    /// 4.2 之前读自 `axesToMove`，之后读自 `simultaneousAxes`；尚未 configure 时为 `None`。
    pub fn get_configured_axes(&self) -> Option<Vec<String>> {
        self.configured_axes.load_full().map(|axes| axes.as_ref().clone())
    }

    /// 闩锁：阻塞直到镜像状态进入 `targets` 之一
    ///
    /// # 错误
    ///
    /// - `ClientError::Timeout`: 超时
    /// - `ClientError::Connection`: 等待期间连接丢失
    pub fn latch(&self, timeout: Duration, targets: &[DeviceState]) -> Result<DeviceState> {
        self.session()?
            .session
            .wait_for_state(targets, timeout)
            .map_err(|e| Self::map_call_error(e, timeout))
    }

    // ------------------------------------------------------------------------
    // 本地配置
    // ------------------------------------------------------------------------

    pub fn set_point_generator(&self, generator: Arc<dyn PointGenerator>) -> Result<()> {
        self.ensure_not_disposed()?;
        *self.generator.write() = Some(generator);
        Ok(())
    }

    /// 设置文件目录（必须已经存在于设备写文件的文件系统上，本层不创建也不检查）
    pub fn set_file_dir(&self, file_dir: impl Into<String>) -> Result<()> {
        self.ensure_not_disposed()?;
        *self.file_dir.write() = Some(file_dir.into());
        Ok(())
    }

    pub fn get_file_dir(&self) -> Option<String> {
        self.file_dir.read().clone()
    }

    // ------------------------------------------------------------------------
    // 监听器
    // ------------------------------------------------------------------------

    /// 注册监听器（可在任何时候调用，包括 `run()` 阻塞期间）
    ///
    /// 注册表只保留弱引用，调用方持有 `Arc` 期间监听器有效。
    pub fn add_listener(&self, listener: Arc<dyn MalcolmListener>) -> Result<ListenerHandle> {
        self.ensure_not_disposed()?;
        Ok(self.listeners.add(listener))
    }

    pub fn remove_listener(&self, handle: ListenerHandle) -> Result<bool> {
        self.ensure_not_disposed()?;
        Ok(self.listeners.remove(handle))
    }

    // ------------------------------------------------------------------------
    // 命令
    // ------------------------------------------------------------------------

    fn build_parameters(&self, active: &ActiveSession, model: &MalcolmModel) -> Result<Map<String, Value>> {
        let file_dir = self.file_dir.read().clone();
        self.validator.validate(
            model,
            &ValidationContext {
                available_axes: &active.available_axes,
                file_dir: file_dir.as_deref(),
            },
        )?;
        let axes = active
            .naming
            .axes_to_send(model.axes_to_move.as_deref(), &active.available_axes);
        let generator = self.generator.read().clone();
        Ok(ConfigureParameters::build(model, generator.as_deref(), file_dir.as_deref(), axes)?
            .into_inner())
    }

    /// 下发配置，阻塞直到设备报告 Ready 或 Fault
    ///
    /// 下发前先尝试一次 reset（失败会被忽略），使 Fault / Aborted 的设备也能重新配置。
    ///
    /// # 错误
    ///
    /// - `ClientError::Validation`: 本地校验失败（未发出任何远端请求）
    /// - `ClientError::IllegalState`: 设备正在运行等不接受配置的状态
    /// - `ClientError::Device`: 远端拒绝配置或进入 Fault（携带 health 消息）
    /// - `ClientError::Timeout`: 超过 `configure_timeout_ms`
    pub fn configure(&self, model: &MalcolmModel) -> Result<()> {
        let active = self.connected_session()?;
        self.require_state(
            &active,
            "configure",
            &[
                DeviceState::Idle,
                DeviceState::Ready,
                DeviceState::Aborted,
                DeviceState::Fault,
            ],
        )?;
        let params = self.build_parameters(&active, model)?;
        debug!("{}: configure {:?}", self.name, params);

        let standard = self.config.standard_timeout();
        if let Err(e) = active.session.call(MalcolmMethod::Reset, Map::new(), standard) {
            debug!("{}: reset before configure failed: {}", self.name, e);
        }
        active
            .session
            .sync_state(standard)
            .map_err(|e| Self::map_call_error(e, standard))?;

        let timeout = self.config.configure_timeout();
        let abort = self.arm_abort();
        let outcome = active
            .session
            .call_interruptible(MalcolmMethod::Configure, params, timeout, &abort);
        self.disarm_abort();
        self.ensure_not_disposed()?;

        match outcome {
            Ok(CallOutcome::Returned(_)) => {},
            Ok(CallOutcome::Interrupted) => {
                info!("{}: configure aborted", self.name);
                return Err(ClientError::device("Configure aborted"));
            },
            Err(e) => {
                warn!("{}: configure failed: {}", self.name, e);
                return Err(Self::map_call_error(e, timeout));
            },
        }

        let state = active
            .session
            .sync_state(standard)
            .map_err(|e| Self::map_call_error(e, standard))?;
        if state == DeviceState::Fault {
            let health = self.get_device_health()?;
            warn!("{}: device faulted during configure: {}", self.name, health);
            return Err(ClientError::device(health));
        }

        let axes = Self::read_axes(&active.session, active.naming, standard)?;
        debug!("{}: device reports {} = {:?}", self.name, active.naming.axes_attribute(), axes);
        self.configured_axes.store(Some(Arc::new(axes)));
        *self.model.write() = Some(model.clone());
        info!("{}: configured ({})", self.name, state);
        Ok(())
    }

    /// 远端校验，返回设备修正后的模型
    ///
    /// # 错误
    ///
    /// - `ClientError::Validation`: 本地或远端校验失败
    pub fn validate_with_return(&self, model: &MalcolmModel) -> Result<MalcolmModel> {
        let active = self.connected_session()?;
        let params = self.build_parameters(&active, model)?;
        let returned = match self.simple_call(
            &active,
            MalcolmMethod::Validate,
            params,
            self.config.standard_timeout(),
        ) {
            Ok(value) => value,
            Err(ClientError::Device { message }) => {
                return Err(ClientError::Validation(format!("{DEVICE_ERROR_PREFIX}{message}")));
            },
            Err(e) => return Err(e),
        };

        let mut adjusted = model.clone();
        if let Value::Object(map) = &returned {
            adjusted.apply_returned(map)?;
        }
        debug!("{}: validated", self.name);
        Ok(adjusted)
    }

    pub fn validate(&self, model: &MalcolmModel) -> Result<()> {
        self.validate_with_return(model).map(|_| ())
    }

    /// 运行扫描，阻塞直到完成、到达暂停边界、故障或被中止
    ///
    /// # 错误
    ///
    /// - `ClientError::IllegalState`: 设备不在 Ready
    /// - `ClientError::Device`: 扫描期间设备进入 Fault（携带 health 消息）
    /// - `ClientError::Connection`: 扫描期间连接丢失
    /// - `ClientError::Disposed`: 扫描期间设备被释放
    /// - `ClientError::Timeout`: 超过 `run_timeout_ms`
    pub fn run(&self) -> Result<RunOutcome> {
        let active = self.connected_session()?;
        self.require_state(&active, "run", &[DeviceState::Ready])?;

        let timeout = self.config.run_timeout();
        let abort = self.arm_abort();
        debug!("{}: run", self.name);
        let outcome = active
            .session
            .call_interruptible(MalcolmMethod::Run, Map::new(), timeout, &abort);
        self.disarm_abort();
        self.ensure_not_disposed()?;

        let aborted = |reason: &dyn std::fmt::Display| {
            info!("{}: run aborted ({})", self.name, reason);
            Ok(RunOutcome::Aborted)
        };

        match outcome {
            Ok(CallOutcome::Interrupted) => aborted(&"abort requested"),
            Ok(CallOutcome::Returned(_)) => {
                let standard = self.config.standard_timeout();
                let state = active
                    .session
                    .sync_state(standard)
                    .map_err(|e| Self::map_call_error(e, standard))?;
                match state {
                    DeviceState::Ready => {
                        info!("{}: run reached a pause boundary", self.name);
                        Ok(RunOutcome::SegmentComplete)
                    },
                    DeviceState::Aborting | DeviceState::Aborted => aborted(&state),
                    DeviceState::Fault => Err(ClientError::device(active.session.health())),
                    _ => {
                        info!("{}: run completed", self.name);
                        Ok(RunOutcome::Completed)
                    },
                }
            },
            Err(e) if self.abort_requested.load(Ordering::Acquire) => aborted(&e),
            Err(DriverError::Remote(message))
                if matches!(
                    active.session.state(),
                    DeviceState::Aborting | DeviceState::Aborted
                ) =>
            {
                aborted(&message)
            },
            Err(e) => {
                warn!("{}: run failed: {}", self.name, e);
                Err(Self::map_call_error(e, timeout))
            },
        }
    }

    /// 中止正在进行的配置或扫描
    ///
    /// 幂等：设备已经 Idle、Aborting 或 Aborted 时什么也不做。
    /// 可以从 `run()` 所在线程以外的任何线程调用。
    pub fn abort(&self) -> Result<()> {
        let active = self.connected_session()?;
        let state = active.session.state();
        let local_call = self.run_abort.lock().is_some();
        if !local_call && !state.is_abortable() && state != DeviceState::Ready {
            debug!("{}: abort ignored, device is {}", self.name, state);
            return Ok(());
        }

        info!("{}: abort requested (device is {})", self.name, state);
        self.abort_requested.store(true, Ordering::Release);
        if let Some(tx) = self.run_abort.lock().as_ref() {
            let _ = tx.try_send(());
        }
        self.simple_call(
            &active,
            MalcolmMethod::Abort,
            Map::new(),
            self.config.standard_timeout(),
        )?;
        Ok(())
    }

    /// 暂停（仅 Running）
    pub fn pause(&self) -> Result<()> {
        let active = self.connected_session()?;
        self.require_state(&active, "pause", &[DeviceState::Running])?;
        self.simple_call(
            &active,
            MalcolmMethod::Pause,
            Map::new(),
            self.config.configure_timeout(),
        )?;
        debug!("{}: paused", self.name);
        Ok(())
    }

    /// 恢复（仅 Paused）
    pub fn resume(&self) -> Result<()> {
        let active = self.connected_session()?;
        self.require_state(&active, "resume", &[DeviceState::Paused])?;
        self.simple_call(
            &active,
            MalcolmMethod::Resume,
            Map::new(),
            self.config.standard_timeout(),
        )?;
        debug!("{}: resumed", self.name);
        Ok(())
    }

    /// 回退/前进到指定步（Running、Paused 或 Ready）
    pub fn seek(&self, step: u64) -> Result<()> {
        let active = self.connected_session()?;
        self.require_state(
            &active,
            "seek",
            &[DeviceState::Running, DeviceState::Paused, DeviceState::Ready],
        )?;
        let mut params = Map::new();
        params.insert(ATTRIBUTE_NAME_COMPLETED_STEPS.to_string(), Value::from(step));
        self.simple_call(
            &active,
            MalcolmMethod::Pause,
            params,
            self.config.configure_timeout(),
        )?;
        debug!("{}: seek to step {}", self.name, step);
        Ok(())
    }

    /// 复位到 Idle（Fault、Aborted、Ready 或 Idle）
    pub fn reset(&self) -> Result<()> {
        let active = self.connected_session()?;
        self.require_state(
            &active,
            "reset",
            &[
                DeviceState::Fault,
                DeviceState::Aborted,
                DeviceState::Ready,
                DeviceState::Idle,
            ],
        )?;
        let standard = self.config.standard_timeout();
        self.simple_call(&active, MalcolmMethod::Reset, Map::new(), standard)?;
        active
            .session
            .sync_state(standard)
            .map_err(|e| Self::map_call_error(e, standard))?;
        debug!("{}: reset", self.name);
        Ok(())
    }

    /// 禁用设备；Disabled 对会话是终态
    pub fn disable(&self) -> Result<()> {
        let active = self.connected_session()?;
        let standard = self.config.standard_timeout();
        self.simple_call(&active, MalcolmMethod::Disable, Map::new(), standard)?;
        active
            .session
            .sync_state(standard)
            .map_err(|e| Self::map_call_error(e, standard))?;
        info!("{}: disabled", self.name);
        Ok(())
    }
}

impl Drop for MalcolmDevice {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl Configurable for MalcolmDevice {
    type Model = MalcolmModel;

    fn configure(&self, model: &MalcolmModel) -> Result<()> {
        MalcolmDevice::configure(self, model)
    }
}

impl Attributable for MalcolmDevice {
    fn get_attribute(&self, name: &str) -> Result<Value> {
        MalcolmDevice::get_attribute(self, name)
    }

    fn get_all_attributes(&self) -> Result<Vec<(String, Value)>> {
        MalcolmDevice::get_all_attributes(self)
    }
}

impl Validatable for MalcolmDevice {
    type Model = MalcolmModel;

    fn validate(&self, model: &MalcolmModel) -> Result<()> {
        MalcolmDevice::validate(self, model)
    }

    fn validate_with_return(&self, model: &MalcolmModel) -> Result<MalcolmModel> {
        MalcolmDevice::validate_with_return(self, model)
    }
}
