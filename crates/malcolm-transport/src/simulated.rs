//! 进程内模拟的 Malcolm 设备
//!
//! 实现 [`MalcolmConnection`]，不需要网络或硬件：
//!
//! - 可配置协议版本、轴、扫描步数和步进间隔
//! - configure 后按协议版本把轴写到 `axesToMove`（4.2 之前）或 `simultaneousAxes`（4.2+）
//! - run 在调用线程中逐步推进 `completedSteps`，直到完成、中止、暂停边界或故障
//! - 支持故障注入、连接丢失/恢复、端点不可达
//!
//! # 示例
//!
//! ```rust
//! use malcolm_transport::SimulatedEndpoint;
//! use std::sync::Arc;
//!
//! let endpoint = Arc::new(
//!     SimulatedEndpoint::new("tcp://localhost:8008")
//!         .with_protocol_version("4.2")
//!         .with_axes(["x", "y"])
//!         .with_total_steps(20),
//! );
//! assert_eq!(endpoint.calls().len(), 0);
//! ```

use crate::{HandshakeInfo, MalcolmConnection, TransportError, TransportEvent};
use crossbeam_channel::Sender;
use malcolm_protocol::constants::*;
use malcolm_protocol::table::{CellValue, ColumnType};
use malcolm_protocol::{
    DeviceState, MalcolmMethod, MalcolmTable, MalcolmVersion, Request, RequestBody, RequestId,
    Response,
};
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// 远端设备内部状态（受 `device` 锁保护）
struct SimDevice {
    state: DeviceState,
    attributes: Map<String, Value>,
    subscriptions: Vec<(RequestId, String)>,
    completed_steps: u64,
    total_steps: u64,
    breakpoints: Vec<u64>,
}

/// 模拟的 Malcolm 端点
pub struct SimulatedEndpoint {
    url: String,
    protocol_version: String,
    axes: Vec<String>,
    total_steps: u64,
    step_interval: Duration,
    latency: Duration,
    detectors: Vec<(String, String, f64, i64)>,
    device: Mutex<SimDevice>,
    changed: Condvar,
    events: Mutex<Option<Sender<TransportEvent>>>,
    reachable: AtomicBool,
    connected: AtomicBool,
    fail_next_configure: Mutex<Option<String>>,
    calls: Mutex<Vec<MalcolmMethod>>,
    last_configure: Mutex<Option<Map<String, Value>>>,
}

impl SimulatedEndpoint {
    /// 默认：协议 4.2，轴 `x`/`y`，10 步，每步 10ms，一个探测器 `det`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            protocol_version: "4.2".to_string(),
            axes: vec!["x".to_string(), "y".to_string()],
            total_steps: 10,
            step_interval: Duration::from_millis(10),
            latency: Duration::ZERO,
            detectors: vec![("det".to_string(), "ML-DET-01".to_string(), 0.1, 1)],
            device: Mutex::new(SimDevice {
                state: DeviceState::Uninitialized,
                attributes: Map::new(),
                subscriptions: Vec::new(),
                completed_steps: 0,
                total_steps: 0,
                breakpoints: Vec::new(),
            }),
            changed: Condvar::new(),
            events: Mutex::new(None),
            reachable: AtomicBool::new(true),
            connected: AtomicBool::new(false),
            fail_next_configure: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            last_configure: Mutex::new(None),
        }
    }

    /// 握手时报告的协议版本（原样报告，不做校验）
    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }

    pub fn with_axes<I, S>(mut self, axes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.axes = axes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_total_steps(mut self, steps: u64) -> Self {
        self.total_steps = steps;
        self
    }

    pub fn with_step_interval(mut self, interval: Duration) -> Self {
        self.step_interval = interval;
        self
    }

    /// 每个请求附加的网络延迟
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// 替换默认的探测器列表
    pub fn with_detectors<I>(mut self, detectors: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, &'static str, f64, i64)>,
    {
        self.detectors = detectors
            .into_iter()
            .map(|(name, mri, exposure, frames)| (name.to_string(), mri.to_string(), exposure, frames))
            .collect();
        self
    }

    // ------------------------------------------------------------------------
    // 故障注入
    // ------------------------------------------------------------------------

    /// 下一次 configure 以故障结束，health 为 `message`
    pub fn fail_next_configure(&self, message: impl Into<String>) {
        *self.fail_next_configure.lock() = Some(message.into());
    }

    /// 立即进入 Fault
    pub fn inject_fault(&self, message: impl Into<String>) {
        let mut dev = self.device.lock();
        let mut updates = Self::set_attribute(&mut dev, ATTRIBUTE_NAME_HEALTH, Value::from(message.into()));
        updates.extend(self.transition(&mut dev, DeviceState::Fault));
        drop(dev);
        self.publish(updates);
    }

    /// 设置端点是否可达（影响后续 `connect`）
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::Release);
    }

    /// 模拟网络断开：进行中的请求返回 `Disconnected`，并推送 `ConnectionChanged(false)`
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::Release);
        self.changed.notify_all();
        if let Some(tx) = self.events.lock().as_ref() {
            let _ = tx.send(TransportEvent::ConnectionChanged(false));
        }
    }

    /// 模拟网络恢复
    pub fn restore_connection(&self) {
        self.connected.store(true, Ordering::Release);
        if let Some(tx) = self.events.lock().as_ref() {
            let _ = tx.send(TransportEvent::ConnectionChanged(true));
        }
    }

    // ------------------------------------------------------------------------
    // 检查
    // ------------------------------------------------------------------------

    pub fn state(&self) -> DeviceState {
        self.device.lock().state
    }

    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.device.lock().attributes.get(name).cloned()
    }

    pub fn completed_steps(&self) -> u64 {
        self.device.lock().completed_steps
    }

    /// 最近一次成功 configure 收到的参数
    pub fn last_configure_parameters(&self) -> Option<Map<String, Value>> {
        self.last_configure.lock().clone()
    }

    /// 按顺序记录的方法调用
    pub fn calls(&self) -> Vec<MalcolmMethod> {
        self.calls.lock().clone()
    }

    pub fn subscription_count(&self) -> usize {
        self.device.lock().subscriptions.len()
    }

    // ------------------------------------------------------------------------
    // 内部
    // ------------------------------------------------------------------------

    fn uses_simultaneous_axes(&self) -> bool {
        self.protocol_version
            .parse::<MalcolmVersion>()
            .map(|v| v.is_version_or_above(&MalcolmVersion::VERSION_4_2))
            .unwrap_or(false)
    }

    fn axes_attribute(&self) -> &'static str {
        if self.uses_simultaneous_axes() {
            ATTRIBUTE_NAME_SIMULTANEOUS_AXES
        } else {
            ATTRIBUTE_NAME_AXES_TO_MOVE
        }
    }

    fn default_detectors(&self) -> MalcolmTable {
        let mut table = MalcolmTable::new(DETECTORS_TABLE_SCHEMA).unwrap_or_default();
        for (name, mri, exposure, frames) in &self.detectors {
            let _ = table.add_row([
                (DETECTORS_TABLE_COLUMN_ENABLE, CellValue::from(true)),
                (DETECTORS_TABLE_COLUMN_NAME, CellValue::from(name.as_str())),
                (DETECTORS_TABLE_COLUMN_MRI, CellValue::from(mri.as_str())),
                (DETECTORS_TABLE_COLUMN_EXPOSURE, CellValue::from(*exposure)),
                (DETECTORS_TABLE_COLUMN_FRAMES_PER_STEP, CellValue::from(*frames)),
            ]);
        }
        table
    }

    fn layout(&self) -> MalcolmTable {
        let mut table = MalcolmTable::new([
            ("name", ColumnType::String),
            ("mri", ColumnType::String),
            ("x", ColumnType::Float),
            ("y", ColumnType::Float),
            ("visible", ColumnType::Boolean),
        ])
        .unwrap_or_default();
        for (i, (name, mri, _, _)) in self.detectors.iter().enumerate() {
            let _ = table.add_row([
                ("name", CellValue::from(name.as_str())),
                ("mri", CellValue::from(mri.as_str())),
                ("x", CellValue::from(0.0)),
                ("y", CellValue::from(i as f64 * 100.0)),
                ("visible", CellValue::from(true)),
            ]);
        }
        table
    }

    fn datasets(&self, detectors: &MalcolmTable, axes: &[String], file_template: &str) -> MalcolmTable {
        let mut table = MalcolmTable::new(DATASETS_TABLE_SCHEMA).unwrap_or_default();
        let file_name = |name: &str| {
            if file_template.contains("%s") {
                file_template.replace("%s", name)
            } else {
                format!("{name}.{FILE_EXTENSION_H5}")
            }
        };
        let names = detectors.get_column_as::<String>(DETECTORS_TABLE_COLUMN_NAME).unwrap_or_default();
        let enabled = detectors.get_column_as::<bool>(DETECTORS_TABLE_COLUMN_ENABLE).unwrap_or_default();
        let rank = 2 + axes.len() as i64;
        for (name, _) in names.iter().zip(enabled).filter(|(_, on)| *on) {
            for (suffix, kind, path, rank) in [
                ("data", "primary", "/entry/detector/detector", rank),
                ("sum", "secondary", "/entry/sum/sum", axes.len() as i64),
            ] {
                let _ = table.add_row([
                    (DATASETS_TABLE_COLUMN_NAME, CellValue::from(format!("{name}.{suffix}"))),
                    (DATASETS_TABLE_COLUMN_FILENAME, CellValue::from(file_name(name))),
                    (DATASETS_TABLE_COLUMN_TYPE, CellValue::from(kind)),
                    (DATASETS_TABLE_COLUMN_PATH, CellValue::from(path)),
                    (DATASETS_TABLE_COLUMN_RANK, CellValue::from(rank)),
                    (DATASETS_TABLE_COLUMN_UNIQUEID, CellValue::from("/entry/NDAttributes/NDArrayUniqueId")),
                ]);
            }
        }
        for axis in axes {
            let _ = table.add_row([
                (DATASETS_TABLE_COLUMN_NAME, CellValue::from(format!("{axis}.value_set"))),
                (DATASETS_TABLE_COLUMN_FILENAME, CellValue::from(file_name("PANDA"))),
                (DATASETS_TABLE_COLUMN_TYPE, CellValue::from("position_set")),
                (DATASETS_TABLE_COLUMN_PATH, CellValue::from(format!("/entry/{axis}.value_set"))),
                (DATASETS_TABLE_COLUMN_RANK, CellValue::from(1i64)),
                (DATASETS_TABLE_COLUMN_UNIQUEID, CellValue::from("")),
            ]);
        }
        table
    }

    /// 修改属性，返回需要推送的订阅更新
    fn set_attribute(dev: &mut SimDevice, name: &str, value: Value) -> Vec<Response> {
        let updates = dev
            .subscriptions
            .iter()
            .filter(|(_, endpoint)| endpoint == name)
            .map(|(id, _)| Response::update(*id, value.clone()))
            .collect();
        dev.attributes.insert(name.to_string(), value);
        updates
    }

    fn transition(&self, dev: &mut SimDevice, next: DeviceState) -> Vec<Response> {
        trace!("Simulated device {}: {} -> {}", self.url, dev.state, next);
        dev.state = next;
        self.changed.notify_all();
        Self::set_attribute(dev, ATTRIBUTE_NAME_STATE, Value::from(next.as_str()))
    }

    fn publish(&self, updates: Vec<Response>) {
        if updates.is_empty() || !self.connected.load(Ordering::Acquire) {
            return;
        }
        if let Some(tx) = self.events.lock().as_ref() {
            for update in updates {
                let _ = tx.send(TransportEvent::Message(update));
            }
        }
    }

    /// 在不持有设备锁的情况下推送
    fn publish_unlocked(&self, dev: &mut MutexGuard<'_, SimDevice>, updates: Vec<Response>) {
        MutexGuard::unlocked(dev, || self.publish(updates));
    }

    fn check_axes(&self, parameters: &Map<String, Value>) -> Result<Vec<String>, String> {
        let Some(requested) = parameters.get(FIELD_NAME_AXES_TO_MOVE) else {
            return Ok(self.axes.clone());
        };
        let requested: Vec<String> = serde_json::from_value(requested.clone())
            .map_err(|e| format!("Invalid axesToMove: {e}"))?;
        match requested.iter().find(|axis| !self.axes.contains(axis)) {
            Some(axis) => Err(format!("Invalid axis name: {axis}")),
            None => Ok(requested),
        }
    }

    fn handle_get(&self, id: RequestId, endpoint: &str) -> Response {
        let dev = self.device.lock();
        if endpoint.is_empty() {
            return Response::ok(id, Value::Object(dev.attributes.clone()));
        }
        if endpoint == MalcolmMethod::Configure.as_str() {
            let mut defaults = Map::new();
            defaults.insert(FIELD_NAME_DETECTORS.to_string(), self.default_detectors().to_wire());
            defaults.insert(FIELD_NAME_AXES_TO_MOVE.to_string(), Value::from(self.axes.clone()));
            let mut meta = Map::new();
            meta.insert(FIELD_NAME_DEFAULTS.to_string(), Value::Object(defaults));
            return Response::ok(id, Value::Object(meta));
        }
        match dev.attributes.get(endpoint) {
            Some(value) => Response::ok(id, value.clone()),
            None => Response::error(id, format!("No attribute {endpoint}")),
        }
    }

    fn handle_call(
        &self,
        id: RequestId,
        method: MalcolmMethod,
        parameters: Map<String, Value>,
        timeout: Duration,
    ) -> Result<Response, TransportError> {
        self.calls.lock().push(method);
        debug!("Simulated device {} received {}", self.url, method);
        match method {
            MalcolmMethod::Configure => Ok(self.configure(id, parameters)),
            MalcolmMethod::Validate => Ok(self.validate(id, parameters)),
            MalcolmMethod::Run => self.run(id, timeout),
            MalcolmMethod::Abort => Ok(self.abort(id)),
            MalcolmMethod::Pause => Ok(self.pause(id, &parameters)),
            MalcolmMethod::Resume => Ok(self.simple_transition(
                id,
                method,
                &[DeviceState::Paused],
                &[DeviceState::Running],
            )),
            MalcolmMethod::Reset => Ok(self.reset(id)),
            MalcolmMethod::Disable => Ok(self.simple_transition(
                id,
                method,
                &DeviceState::ALL,
                &[DeviceState::Disabling, DeviceState::Disabled],
            )),
        }
    }

    fn simple_transition(
        &self,
        id: RequestId,
        method: MalcolmMethod,
        from: &[DeviceState],
        path: &[DeviceState],
    ) -> Response {
        let mut dev = self.device.lock();
        if !from.contains(&dev.state) {
            return Response::error(id, format!("Cannot {method} from state {}", dev.state));
        }
        let updates: Vec<_> = path.iter().flat_map(|s| self.transition(&mut dev, *s)).collect();
        drop(dev);
        self.publish(updates);
        Response::ok(id, Value::Null)
    }

    fn configure(&self, id: RequestId, parameters: Map<String, Value>) -> Response {
        let mut dev = self.device.lock();
        if !matches!(dev.state, DeviceState::Idle | DeviceState::Ready | DeviceState::Aborted) {
            return Response::error(id, format!("Cannot configure from state {}", dev.state));
        }
        let axes = match self.check_axes(&parameters) {
            Ok(axes) => axes,
            Err(message) => return Response::error(id, message),
        };

        let mut updates = self.transition(&mut dev, DeviceState::Configuring);

        if let Some(message) = self.fail_next_configure.lock().take() {
            updates.extend(Self::set_attribute(&mut dev, ATTRIBUTE_NAME_HEALTH, Value::from(message.clone())));
            updates.extend(self.transition(&mut dev, DeviceState::Fault));
            drop(dev);
            self.publish(updates);
            return Response::error(id, message);
        }

        let detectors = parameters
            .get(FIELD_NAME_DETECTORS)
            .and_then(|v| MalcolmTable::from_wire(v, &DETECTORS_TABLE_SCHEMA).ok())
            .unwrap_or_else(|| self.default_detectors());
        let file_template = parameters
            .get(FIELD_NAME_FILE_TEMPLATE)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        dev.breakpoints = parameters
            .get(FIELD_NAME_BREAKPOINTS)
            .and_then(|v| serde_json::from_value::<Vec<u64>>(v.clone()).ok())
            .unwrap_or_default();
        dev.completed_steps = 0;
        dev.total_steps = self.total_steps;

        let datasets = self.datasets(&detectors, &axes, &file_template);
        updates.extend(Self::set_attribute(&mut dev, self.axes_attribute(), Value::from(axes)));
        updates.extend(Self::set_attribute(&mut dev, ATTRIBUTE_NAME_DATASETS, datasets.to_wire()));
        updates.extend(Self::set_attribute(&mut dev, ATTRIBUTE_NAME_COMPLETED_STEPS, Value::from(0u64)));
        updates.extend(Self::set_attribute(&mut dev, ATTRIBUTE_NAME_CONFIGURED_STEPS, Value::from(self.total_steps)));
        updates.extend(Self::set_attribute(&mut dev, ATTRIBUTE_NAME_TOTAL_STEPS, Value::from(self.total_steps)));
        updates.extend(self.transition(&mut dev, DeviceState::Ready));
        drop(dev);

        *self.last_configure.lock() = Some(parameters.clone());
        self.publish(updates);
        Response::ok(id, Value::Object(parameters))
    }

    /// 校验并返回修正后的参数：framesPerStep 限制在 1..=10，曝光时间保留两位小数
    fn validate(&self, id: RequestId, mut parameters: Map<String, Value>) -> Response {
        if let Err(message) = self.check_axes(&parameters) {
            return Response::error(id, message);
        }
        let Some(raw) = parameters.get(FIELD_NAME_DETECTORS) else {
            return Response::ok(id, Value::Object(parameters));
        };
        let detectors = match MalcolmTable::from_wire(raw, &DETECTORS_TABLE_SCHEMA) {
            Ok(table) => table,
            Err(e) => return Response::error(id, format!("Invalid detectors table: {e}")),
        };

        let mut adjusted = detectors.clone();
        let columns: Vec<(String, Vec<CellValue>)> = detectors
            .column_names()
            .map(|name| {
                let values = detectors.get_column(name).map(<[CellValue]>::to_vec).unwrap_or_default();
                let values = match name {
                    DETECTORS_TABLE_COLUMN_FRAMES_PER_STEP => values
                        .into_iter()
                        .map(|v| CellValue::Int(v.as_i64().unwrap_or(1).clamp(1, 10)))
                        .collect(),
                    DETECTORS_TABLE_COLUMN_EXPOSURE => values
                        .into_iter()
                        .map(|v| CellValue::Float((v.as_f64().unwrap_or(0.0) * 100.0).round() / 100.0))
                        .collect(),
                    _ => values,
                };
                (name.to_string(), values)
            })
            .collect();
        if let Err(e) = adjusted.set_table_data(columns) {
            return Response::error(id, format!("Invalid detectors table: {e}"));
        }
        parameters.insert(FIELD_NAME_DETECTORS.to_string(), adjusted.to_wire());
        Response::ok(id, Value::Object(parameters))
    }

    fn run(&self, id: RequestId, timeout: Duration) -> Result<Response, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut dev = self.device.lock();
        if dev.state != DeviceState::Ready {
            return Ok(Response::error(id, format!("Cannot run from state {}", dev.state)));
        }
        let updates = self.transition(&mut dev, DeviceState::Running);
        self.publish_unlocked(&mut dev, updates);

        loop {
            if !self.connected.load(Ordering::Acquire) {
                return Err(TransportError::Disconnected);
            }
            match dev.state {
                DeviceState::Running => {},
                DeviceState::Paused | DeviceState::Rewinding => {
                    if Instant::now() >= deadline {
                        return Err(TransportError::Timeout(timeout));
                    }
                    self.changed.wait_for(&mut dev, self.step_interval);
                    continue;
                },
                DeviceState::Aborting | DeviceState::Aborted => {
                    return Ok(Response::error(id, "Run aborted"));
                },
                DeviceState::Fault => {
                    let health = dev
                        .attributes
                        .get(ATTRIBUTE_NAME_HEALTH)
                        .and_then(Value::as_str)
                        .unwrap_or("Fault")
                        .to_string();
                    return Ok(Response::error(id, health));
                },
                other => {
                    return Ok(Response::error(id, format!("Run interrupted in state {other}")));
                },
            }
            if Instant::now() >= deadline {
                return Err(TransportError::Timeout(timeout));
            }

            // 被状态变化唤醒时重新检查，不推进步数
            if !self.changed.wait_for(&mut dev, self.step_interval).timed_out()
                || dev.state != DeviceState::Running
            {
                continue;
            }

            dev.completed_steps += 1;
            let steps = dev.completed_steps;
            let mut updates = Self::set_attribute(&mut dev, ATTRIBUTE_NAME_COMPLETED_STEPS, Value::from(steps));
            if steps >= dev.total_steps {
                updates.extend(self.transition(&mut dev, DeviceState::Idle));
                drop(dev);
                self.publish(updates);
                return Ok(Response::ok(id, Value::Null));
            }
            if dev.breakpoints.contains(&steps) {
                updates.extend(self.transition(&mut dev, DeviceState::Ready));
                drop(dev);
                self.publish(updates);
                return Ok(Response::ok(id, Value::Null));
            }
            self.publish_unlocked(&mut dev, updates);
        }
    }

    fn abort(&self, id: RequestId) -> Response {
        let mut dev = self.device.lock();
        if !dev.state.is_abortable() && dev.state != DeviceState::Ready {
            return Response::ok(id, Value::Null);
        }
        let updates = self.transition(&mut dev, DeviceState::Aborting);
        self.publish_unlocked(&mut dev, updates);
        let updates = self.transition(&mut dev, DeviceState::Aborted);
        drop(dev);
        self.publish(updates);
        Response::ok(id, Value::Null)
    }

    /// pause，带 `completedSteps` 参数时先回退到该步（seek）
    fn pause(&self, id: RequestId, parameters: &Map<String, Value>) -> Response {
        let step = parameters.get(ATTRIBUTE_NAME_COMPLETED_STEPS).and_then(Value::as_u64);
        let mut dev = self.device.lock();
        let settle = match (dev.state, step) {
            (DeviceState::Running | DeviceState::Paused, _) => DeviceState::Paused,
            (DeviceState::Ready, Some(_)) => DeviceState::Ready,
            (state, _) => return Response::error(id, format!("Cannot pause from state {state}")),
        };
        let mut updates = Vec::new();
        if let Some(step) = step {
            if step > dev.total_steps {
                return Response::error(id, format!("Cannot seek to step {step} of {}", dev.total_steps));
            }
            updates.extend(self.transition(&mut dev, DeviceState::Rewinding));
            dev.completed_steps = step;
            updates.extend(Self::set_attribute(&mut dev, ATTRIBUTE_NAME_COMPLETED_STEPS, Value::from(step)));
        }
        updates.extend(self.transition(&mut dev, settle));
        drop(dev);
        self.publish(updates);
        Response::ok(id, Value::Null)
    }

    fn reset(&self, id: RequestId) -> Response {
        let mut dev = self.device.lock();
        if !matches!(
            dev.state,
            DeviceState::Idle
                | DeviceState::Ready
                | DeviceState::Aborted
                | DeviceState::Fault
                | DeviceState::Disabled
        ) {
            return Response::error(id, format!("Cannot reset from state {}", dev.state));
        }
        let mut updates = self.transition(&mut dev, DeviceState::Resetting);
        dev.completed_steps = 0;
        updates.extend(Self::set_attribute(&mut dev, ATTRIBUTE_NAME_HEALTH, Value::from("OK")));
        updates.extend(Self::set_attribute(&mut dev, ATTRIBUTE_NAME_COMPLETED_STEPS, Value::from(0u64)));
        updates.extend(self.transition(&mut dev, DeviceState::Idle));
        drop(dev);
        self.publish(updates);
        Response::ok(id, Value::Null)
    }
}

impl MalcolmConnection for SimulatedEndpoint {
    fn url(&self) -> &str {
        &self.url
    }

    fn connect(&self, events: Sender<TransportEvent>) -> Result<HandshakeInfo, TransportError> {
        if !self.reachable.load(Ordering::Acquire) {
            return Err(TransportError::Unreachable(self.url.clone()));
        }
        *self.events.lock() = Some(events);
        self.connected.store(true, Ordering::Release);

        let mut dev = self.device.lock();
        dev.subscriptions.clear();
        if dev.state == DeviceState::Uninitialized {
            let axes_attribute = self.axes_attribute();
            dev.state = DeviceState::Idle;
            let attributes = &mut dev.attributes;
            attributes.insert(ATTRIBUTE_NAME_STATE.to_string(), Value::from(DeviceState::Idle.as_str()));
            attributes.insert(ATTRIBUTE_NAME_HEALTH.to_string(), Value::from("OK"));
            attributes.insert(ATTRIBUTE_NAME_COMPLETED_STEPS.to_string(), Value::from(0u64));
            attributes.insert(ATTRIBUTE_NAME_CONFIGURED_STEPS.to_string(), Value::from(0u64));
            attributes.insert(ATTRIBUTE_NAME_TOTAL_STEPS.to_string(), Value::from(0u64));
            attributes.insert(axes_attribute.to_string(), Value::from(self.axes.clone()));
            attributes.insert(
                ATTRIBUTE_NAME_DATASETS.to_string(),
                MalcolmTable::new(DATASETS_TABLE_SCHEMA).unwrap_or_default().to_wire(),
            );
            attributes.insert(ATTRIBUTE_NAME_LAYOUT.to_string(), self.layout().to_wire());
        }
        debug!("Simulated device {} connected (protocol {})", self.url, self.protocol_version);
        Ok(HandshakeInfo {
            protocol_version: self.protocol_version.clone(),
        })
    }

    fn send(&self, request: Request, timeout: Duration) -> Result<Response, TransportError> {
        if !self.latency.is_zero() {
            spin_sleep::sleep(self.latency);
        }
        if !self.connected.load(Ordering::Acquire) {
            return Err(TransportError::Disconnected);
        }
        let id = request.id;
        match request.body {
            RequestBody::Get { endpoint } => Ok(self.handle_get(id, &endpoint)),
            RequestBody::Put { endpoint, value } => {
                let updates = Self::set_attribute(&mut self.device.lock(), &endpoint, value);
                self.publish(updates);
                Ok(Response::ok(id, Value::Null))
            },
            RequestBody::Call { method, parameters } => self.handle_call(id, method, parameters, timeout),
            RequestBody::Subscribe { endpoint } => {
                let initial = {
                    let mut dev = self.device.lock();
                    dev.subscriptions.push((id, endpoint.clone()));
                    dev.attributes.get(&endpoint).cloned()
                };
                if let Some(value) = initial {
                    self.publish(vec![Response::update(id, value)]);
                }
                Ok(Response::ok(id, Value::from(id)))
            },
            RequestBody::Unsubscribe => {
                self.device.lock().subscriptions.retain(|(sub, _)| *sub != id);
                Ok(Response::ok(id, Value::Null))
            },
        }
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        *self.events.lock() = None;
        self.changed.notify_all();
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}
