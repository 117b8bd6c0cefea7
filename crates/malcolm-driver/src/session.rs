//! Malcolm 会话
//!
//! [`MalcolmSession`] 持有一条已握手的连接、事件线程和状态镜像，
//! 对上层提供请求/响应、可中断的长调用和状态闩锁（latch）。
//!
//! # 线程模型
//!
//! - `malcolm-events`: 消费传输事件，更新镜像并分发监听器事件
//! - `malcolm-call`: 每个可中断调用一个，阻塞在 `send` 上，调用方线程只负责等待
//!
//! 调用方线程在等待时同时监视中止信号、镜像状态（Fault / 断线）与超时，
//! 因此一个卡住的远端调用不会阻止 `abort` 生效。

use crate::error::DriverError;
use crate::event::MalcolmEvent;
use crate::listeners::{ListenerRegistry, MalcolmListener};
use crate::metrics::{MetricsSnapshot, SessionMetrics};
use crate::pipeline::{PipelineConfig, Subscriptions, event_loop};
use crate::state::{DeviceSnapshot, MalcolmContext};
use crossbeam_channel::{Receiver, Sender, after, bounded, select, tick};
use malcolm_protocol::constants::{ATTRIBUTE_NAME_HEALTH, ATTRIBUTE_NAME_STATE, SUBSCRIBED_ATTRIBUTES};
use malcolm_protocol::{
    DeviceState, MalcolmMethod, MalcolmVersion, Request, RequestId, ResponseBody,
};
use malcolm_transport::{MalcolmConnection, TransportError};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// 带超时的 join
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // 看门狗线程负责真正的 join，超时后它会继续留在后台
        spawn(move || {
            let _ = tx.send(self.join());
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 可中断调用的结果
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// 远端正常返回
    Returned(Value),
    /// 收到中止信号，或镜像在调用期间进入 Aborting / Aborted
    Interrupted,
}

/// 闩锁用的临时监听器
struct StateLatch {
    tx: Sender<DeviceState>,
}

impl MalcolmListener for StateLatch {
    fn event_performed(&self, event: &MalcolmEvent) {
        if let Some(state) = event.state() {
            // 不能阻塞事件线程；满了说明等待方已经落后，镜像里有最终值
            let _ = self.tx.try_send(state);
        }
    }
}

/// 与单个 Malcolm 设备的会话
pub struct MalcolmSession {
    connection: Arc<dyn MalcolmConnection>,
    ctx: Arc<MalcolmContext>,
    version: MalcolmVersion,
    next_id: AtomicU64,
    subscriptions: Subscriptions,
    event_thread: Option<JoinHandle<()>>,
    call_threads: Mutex<Vec<JoinHandle<()>>>,
    is_running: Arc<AtomicBool>,
    metrics: Arc<SessionMetrics>,
    config: PipelineConfig,
}

impl MalcolmSession {
    /// 建立会话
    ///
    /// 依次完成：握手、解析协议版本、启动事件线程、同步读取当前 state/health、
    /// 订阅进度与状态属性。
    ///
    /// # 错误
    ///
    /// - `DriverError::Transport`: 端点不可达或握手失败
    /// - `DriverError::Protocol`: 远端报告的协议版本畸形
    /// - `DriverError::IoThread`: 无法启动事件线程
    pub fn open(
        connection: Arc<dyn MalcolmConnection>,
        listeners: Arc<ListenerRegistry>,
        config: PipelineConfig,
    ) -> Result<Self, DriverError> {
        let (tx, rx) = bounded(config.event_channel_capacity);
        let handshake = connection.connect(tx)?;
        let version = match handshake.protocol_version.parse::<MalcolmVersion>() {
            Ok(version) => version,
            Err(e) => {
                connection.disconnect();
                return Err(e.into());
            },
        };
        info!("Connected to Malcolm at {} (protocol {})", connection.url(), version);

        let ctx = Arc::new(MalcolmContext::new(listeners));
        ctx.connected.store(true, Ordering::Release);

        let subscriptions: Subscriptions = Arc::default();
        let is_running = Arc::new(AtomicBool::new(true));
        let metrics = Arc::new(SessionMetrics::new());

        let event_thread = {
            let ctx = ctx.clone();
            let subscriptions = subscriptions.clone();
            let config = config.clone();
            let is_running = is_running.clone();
            let metrics = metrics.clone();
            std::thread::Builder::new()
                .name("malcolm-events".into())
                .spawn(move || event_loop(rx, ctx, subscriptions, config, is_running, metrics))
        };
        let event_thread = match event_thread {
            Ok(handle) => handle,
            Err(e) => {
                connection.disconnect();
                return Err(DriverError::IoThread(e.to_string()));
            },
        };

        let session = Self {
            connection,
            ctx,
            version,
            next_id: AtomicU64::new(1),
            subscriptions,
            event_thread: Some(event_thread),
            call_threads: Mutex::new(Vec::new()),
            is_running,
            metrics,
            config,
        };

        session.seed_state()?;
        for attribute in SUBSCRIBED_ATTRIBUTES {
            session.subscribe(attribute)?;
        }
        Ok(session)
    }

    /// 订阅前先同步一次 state/health，订阅推送的初值不会再触发一次迁移事件
    fn seed_state(&self) -> Result<(), DriverError> {
        let state = self.get(ATTRIBUTE_NAME_STATE)?;
        let state = parse_state(&state)?;
        let health = self
            .get(ATTRIBUTE_NAME_HEALTH)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        self.ctx.device.store(Arc::new(DeviceSnapshot {
            state,
            health,
            sequence: 0,
        }));
        debug!("Seeded device state: {}", state);
        Ok(())
    }

    fn subscribe(&self, endpoint: &str) -> Result<(), DriverError> {
        let id = self.next_request_id();
        // 先登记再发送：初值推送可能先于响应到达事件线程
        self.subscriptions.write().insert(id, endpoint.to_string());
        if let Err(e) = self.send(Request::subscribe(id, endpoint), self.request_timeout()) {
            self.subscriptions.write().remove(&id);
            return Err(e);
        }
        trace!("Subscribed to {} (id {})", endpoint, id);
        Ok(())
    }

    fn next_request_id(&self) -> RequestId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.config.request_timeout_ms)
    }

    /// 发送请求，远端错误转为 `DriverError::Remote`
    fn send(&self, request: Request, timeout: Duration) -> Result<Value, DriverError> {
        send_request(self.connection.as_ref(), &self.metrics, request, timeout)
    }

    /// 读取属性（空字符串返回整个属性对象）
    pub fn get(&self, endpoint: &str) -> Result<Value, DriverError> {
        let id = self.next_request_id();
        self.send(Request::get(id, endpoint), self.request_timeout())
    }

    /// 写入属性
    pub fn put(&self, endpoint: &str, value: Value) -> Result<(), DriverError> {
        let id = self.next_request_id();
        self.send(Request::put(id, endpoint, value), self.request_timeout())
            .map(|_| ())
    }

    /// 在当前线程上阻塞调用方法
    pub fn call(
        &self,
        method: MalcolmMethod,
        parameters: Map<String, Value>,
        timeout: Duration,
    ) -> Result<Value, DriverError> {
        let id = self.next_request_id();
        debug!("Calling {} (id {}, timeout {:?})", method, id, timeout);
        self.send(Request::call(id, method, parameters), timeout)
    }

    /// 可中断的长调用（configure / run）
    ///
    /// 调用在独立线程上发出，当前线程等待以下任一事件：
    ///
    /// - 远端返回：`Ok(CallOutcome::Returned)` 或远端错误
    /// - `abort` 收到消息或发送端被丢弃：`Ok(CallOutcome::Interrupted)`
    /// - 调用开始后镜像进入 Aborting / Aborted：`Ok(CallOutcome::Interrupted)`
    /// - 调用开始后镜像进入 Fault：`Err(DriverError::DeviceFault(health))`
    /// - 连接丢失：`Err(DriverError::ConnectionLost)`
    /// - 超时：`Err(DriverError::Timeout)`
    ///
    /// 被中断时后台线程不会被强制结束，它在远端返回（或连接断开）后自行退出。
    pub fn call_interruptible(
        &self,
        method: MalcolmMethod,
        parameters: Map<String, Value>,
        timeout: Duration,
        abort: &Receiver<()>,
    ) -> Result<CallOutcome, DriverError> {
        let id = self.next_request_id();
        let start_sequence = self.ctx.device_snapshot().sequence;
        let (done_tx, done_rx) = bounded(1);

        let handle = {
            let connection = self.connection.clone();
            let metrics = self.metrics.clone();
            let request = Request::call(id, method, parameters);
            std::thread::Builder::new()
                .name("malcolm-call".into())
                .spawn(move || {
                    let result = send_request(connection.as_ref(), &metrics, request, timeout);
                    let _ = done_tx.send(result);
                })
                .map_err(|e| DriverError::IoThread(e.to_string()))?
        };
        {
            let mut threads = self.call_threads.lock();
            threads.retain(|h| !h.is_finished());
            threads.push(handle);
        }
        debug!("Calling {} (id {}) interruptibly, timeout {:?}", method, id, timeout);

        let poll = tick(Duration::from_millis(self.config.abort_poll_interval_ms));
        let deadline = after(timeout);
        loop {
            select! {
                recv(done_rx) -> msg => {
                    return match msg {
                        Ok(result) => result.map(CallOutcome::Returned),
                        Err(_) => Err(DriverError::ChannelClosed),
                    };
                },
                recv(abort) -> _ => {
                    debug!("{} (id {}) interrupted by abort request", method, id);
                    return Ok(CallOutcome::Interrupted);
                },
                recv(poll) -> _ => {
                    if !self.ctx.is_connected() || self.ctx.is_session_lost() {
                        warn!("{} (id {}) lost its connection", method, id);
                        return Err(DriverError::ConnectionLost);
                    }
                    let snapshot = self.ctx.device_snapshot();
                    if snapshot.sequence == start_sequence {
                        continue;
                    }
                    match snapshot.state {
                        DeviceState::Fault => {
                            warn!("{} (id {}) ended by device fault: {}", method, id, snapshot.health);
                            return Err(DriverError::DeviceFault(snapshot.health));
                        },
                        DeviceState::Aborting | DeviceState::Aborted => {
                            debug!("{} (id {}) interrupted, device is {}", method, id, snapshot.state);
                            return Ok(CallOutcome::Interrupted);
                        },
                        _ => {},
                    }
                },
                recv(deadline) -> _ => {
                    warn!("{} (id {}) timed out after {:?}", method, id, timeout);
                    return Err(DriverError::Timeout);
                },
            }
        }
    }

    /// 状态闩锁：阻塞直到镜像进入 `targets` 之一
    ///
    /// 当前状态已经满足时立即返回。
    ///
    /// # 错误
    ///
    /// - `DriverError::Timeout`: 超时
    /// - `DriverError::ConnectionLost`: 等待期间进入 Offline（且 Offline 不在目标中）
    pub fn wait_for_state(
        &self,
        targets: &[DeviceState],
        timeout: Duration,
    ) -> Result<DeviceState, DriverError> {
        let (tx, rx) = bounded(64);
        let latch: Arc<dyn MalcolmListener> = Arc::new(StateLatch { tx });
        let handle = self.ctx.listeners.add(latch.clone());

        let result = self.await_state(targets, timeout, &rx);
        self.ctx.listeners.remove(handle);
        result
    }

    fn await_state(
        &self,
        targets: &[DeviceState],
        timeout: Duration,
        rx: &Receiver<DeviceState>,
    ) -> Result<DeviceState, DriverError> {
        let deadline = Instant::now() + timeout;
        // 注册之后再读镜像，不会漏掉两者之间的迁移
        let mut current = self.ctx.state();
        loop {
            if targets.contains(&current) {
                return Ok(current);
            }
            if current == DeviceState::Offline {
                return Err(DriverError::ConnectionLost);
            }
            match rx.recv_deadline(deadline) {
                Ok(_) => current = self.ctx.state(),
                Err(_) => {
                    let last = self.ctx.state();
                    if targets.contains(&last) {
                        return Ok(last);
                    }
                    trace!("Timed out waiting for {:?}, device is {}", targets, last);
                    return Err(DriverError::Timeout);
                },
            }
        }
    }

    /// 读取远端当前状态，并等待镜像追上
    ///
    /// 用于在一次调用返回后确认镜像已反映远端，结果为远端状态。
    pub fn sync_state(&self, timeout: Duration) -> Result<DeviceState, DriverError> {
        let remote = parse_state(&self.get(ATTRIBUTE_NAME_STATE)?)?;
        match self.wait_for_state(&[remote], timeout) {
            Ok(state) => Ok(state),
            Err(DriverError::Timeout) => {
                debug!("Mirror did not catch up with remote state {} in {:?}", remote, timeout);
                Ok(remote)
            },
            Err(e) => Err(e),
        }
    }

    pub fn version(&self) -> MalcolmVersion {
        self.version
    }

    pub fn url(&self) -> &str {
        self.connection.url()
    }

    pub fn context(&self) -> &Arc<MalcolmContext> {
        &self.ctx
    }

    pub fn state(&self) -> DeviceState {
        self.ctx.state()
    }

    pub fn health(&self) -> String {
        self.ctx.device.load().health.clone()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            listener_panics: self.ctx.listeners.panic_count(),
            ..self.metrics.snapshot()
        }
    }

    pub fn is_connected(&self) -> bool {
        self.ctx.is_connected() && !self.ctx.is_session_lost() && self.connection.is_connected()
    }

    /// 取消订阅并断开连接（幂等）
    ///
    /// 镜像停在 Offline，之后不再有任何监听器事件。
    pub fn disconnect(&self) {
        if !self.is_running.swap(false, Ordering::AcqRel) {
            return;
        }
        if self.connection.is_connected() {
            let ids: Vec<RequestId> = self.subscriptions.read().keys().copied().collect();
            let timeout = self.request_timeout();
            for id in ids {
                if let Err(e) = self.connection.send(Request::unsubscribe(id), timeout) {
                    trace!("Unsubscribe {} failed: {}", id, e);
                    break;
                }
            }
        }
        self.subscriptions.write().clear();
        self.connection.disconnect();
        self.ctx.connected.store(false, Ordering::Release);
        self.ctx.mark_session_lost();
        let snapshot = self.ctx.device_snapshot();
        self.ctx
            .device
            .store(Arc::new(snapshot.with_state(DeviceState::Offline)));
        info!("Disconnected from Malcolm at {}", self.connection.url());
    }
}

fn send_request(
    connection: &dyn MalcolmConnection,
    metrics: &SessionMetrics,
    request: Request,
    timeout: Duration,
) -> Result<Value, DriverError> {
    let id = request.id;
    let description = request.describe();
    metrics.requests_sent.fetch_add(1, Ordering::Relaxed);
    let response = match connection.send(request, timeout) {
        Ok(response) => response,
        Err(e) => {
            metrics.request_errors.fetch_add(1, Ordering::Relaxed);
            debug!("{} failed: {}", description, e);
            return Err(match e {
                TransportError::Disconnected => DriverError::ConnectionLost,
                TransportError::Timeout(_) => DriverError::Timeout,
                other => DriverError::Transport(other),
            });
        },
    };
    if response.id != id {
        metrics.request_errors.fetch_add(1, Ordering::Relaxed);
        return Err(DriverError::UnexpectedResponse(format!(
            "expected id {id}, got {}",
            response.id
        )));
    }
    match response.body {
        ResponseBody::Return { value } => Ok(value),
        ResponseBody::Error { message } => {
            metrics.request_errors.fetch_add(1, Ordering::Relaxed);
            debug!("{} returned error: {}", description, message);
            Err(DriverError::Remote(message))
        },
        ResponseBody::Update { .. } => {
            metrics.request_errors.fetch_add(1, Ordering::Relaxed);
            Err(DriverError::UnexpectedResponse(format!(
                "{description} answered with an update"
            )))
        },
    }
}

fn parse_state(value: &Value) -> Result<DeviceState, DriverError> {
    let name = value.as_str().ok_or_else(|| {
        DriverError::UnexpectedResponse(format!("state is not a string: {value}"))
    })?;
    Ok(name.parse::<DeviceState>()?)
}

impl Drop for MalcolmSession {
    fn drop(&mut self) {
        self.disconnect();

        let join_timeout = Duration::from_millis(self.config.join_timeout_ms);

        if let Some(handle) = self.event_thread.take()
            && let Err(_e) = handle.join_timeout(join_timeout)
        {
            error!(
                "Event thread panicked or failed to shut down within {:?}",
                join_timeout
            );
        }

        for handle in self.call_threads.get_mut().drain(..) {
            if let Err(_e) = handle.join_timeout(join_timeout) {
                error!(
                    "Call thread panicked or failed to shut down within {:?}",
                    join_timeout
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use malcolm_protocol::ProtocolError;
    use malcolm_transport::SimulatedEndpoint;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn open(endpoint: SimulatedEndpoint) -> (Arc<SimulatedEndpoint>, MalcolmSession) {
        let endpoint = Arc::new(endpoint);
        let session = MalcolmSession::open(
            endpoint.clone(),
            Arc::new(ListenerRegistry::new()),
            PipelineConfig::default(),
        )
        .unwrap();
        (endpoint, session)
    }

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_open_seeds_state_and_subscribes() {
        let (endpoint, session) = open(SimulatedEndpoint::new("sim://open"));
        assert_eq!(session.state(), DeviceState::Idle);
        assert_eq!(session.health(), "OK");
        assert_eq!(session.version(), MalcolmVersion::VERSION_4_2);
        assert_eq!(endpoint.subscription_count(), SUBSCRIBED_ATTRIBUTES.len());
        assert!(session.is_connected());
    }

    #[test]
    fn test_open_unreachable() {
        let endpoint = Arc::new(SimulatedEndpoint::new("sim://nowhere"));
        endpoint.set_reachable(false);
        let result =
            MalcolmSession::open(endpoint, Arc::new(ListenerRegistry::new()), PipelineConfig::default());
        assert!(matches!(
            result,
            Err(DriverError::Transport(TransportError::Unreachable(_)))
        ));
    }

    #[test]
    fn test_open_rejects_malformed_version() {
        let endpoint = Arc::new(SimulatedEndpoint::new("sim://bad").with_protocol_version("-1.0"));
        let result = MalcolmSession::open(
            endpoint.clone(),
            Arc::new(ListenerRegistry::new()),
            PipelineConfig::default(),
        );
        assert!(matches!(
            result,
            Err(DriverError::Protocol(ProtocolError::InvalidVersion(_)))
        ));
        assert!(!endpoint.is_connected());
    }

    #[test]
    fn test_remote_error_mapped() {
        let (_endpoint, session) = open(SimulatedEndpoint::new("sim://err"));
        let result = session.call(MalcolmMethod::Run, Map::new(), TIMEOUT);
        assert!(matches!(result, Err(DriverError::Remote(m)) if m.contains("Cannot run")));
        assert_eq!(session.metrics().request_errors, 1);
    }

    #[test]
    fn test_wait_for_state_after_configure() {
        let (_endpoint, session) = open(SimulatedEndpoint::new("sim://latch"));
        session
            .call(MalcolmMethod::Configure, Map::new(), TIMEOUT)
            .unwrap();
        let state = session
            .wait_for_state(&[DeviceState::Ready], TIMEOUT)
            .unwrap();
        assert_eq!(state, DeviceState::Ready);
        assert_eq!(session.context().progress().total_steps, 10);
    }

    #[test]
    fn test_wait_for_state_times_out() {
        let (_endpoint, session) = open(SimulatedEndpoint::new("sim://stuck"));
        let result = session.wait_for_state(&[DeviceState::Running], Duration::from_millis(50));
        assert_eq!(result, Err(DriverError::Timeout));
        // 临时监听器已移除
        assert!(session.context().listeners.is_empty());
    }

    #[test]
    fn test_call_interruptible_returns() {
        let (_endpoint, session) = open(SimulatedEndpoint::new("sim://run"));
        session
            .call(MalcolmMethod::Configure, Map::new(), TIMEOUT)
            .unwrap();
        session.wait_for_state(&[DeviceState::Ready], TIMEOUT).unwrap();

        let (_abort_tx, abort_rx) = bounded::<()>(1);
        let outcome = session
            .call_interruptible(MalcolmMethod::Run, Map::new(), TIMEOUT, &abort_rx)
            .unwrap();
        assert_eq!(outcome, CallOutcome::Returned(Value::Null));
        assert_eq!(session.sync_state(TIMEOUT).unwrap(), DeviceState::Idle);
    }

    #[test]
    fn test_call_interruptible_abort_signal() {
        let (endpoint, session) = open(
            SimulatedEndpoint::new("sim://abort")
                .with_total_steps(1_000)
                .with_step_interval(Duration::from_millis(5)),
        );
        session
            .call(MalcolmMethod::Configure, Map::new(), TIMEOUT)
            .unwrap();
        session.wait_for_state(&[DeviceState::Ready], TIMEOUT).unwrap();

        let (abort_tx, abort_rx) = bounded::<()>(1);
        let signaller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            abort_tx.send(()).unwrap();
        });
        let outcome = session
            .call_interruptible(MalcolmMethod::Run, Map::new(), TIMEOUT, &abort_rx)
            .unwrap();
        signaller.join().unwrap();
        assert_eq!(outcome, CallOutcome::Interrupted);

        session.call(MalcolmMethod::Abort, Map::new(), TIMEOUT).unwrap();
        assert_eq!(endpoint.state(), DeviceState::Aborted);
    }

    #[test]
    fn test_call_interruptible_fault() {
        let (endpoint, session) = open(
            SimulatedEndpoint::new("sim://fault")
                .with_total_steps(1_000)
                .with_step_interval(Duration::from_millis(5)),
        );
        session
            .call(MalcolmMethod::Configure, params(serde_json::json!({})), TIMEOUT)
            .unwrap();
        session.wait_for_state(&[DeviceState::Ready], TIMEOUT).unwrap();

        let injector = {
            let endpoint = endpoint.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                endpoint.inject_fault("Detector timed out");
            })
        };
        let (_abort_tx, abort_rx) = bounded::<()>(1);
        let result = session.call_interruptible(MalcolmMethod::Run, Map::new(), TIMEOUT, &abort_rx);
        injector.join().unwrap();
        match result {
            Err(DriverError::DeviceFault(health)) | Err(DriverError::Remote(health)) => {
                assert_eq!(health, "Detector timed out")
            },
            other => panic!("Expected fault, got {other:?}"),
        }
    }

    #[test]
    fn test_connection_lost_during_call() {
        let (endpoint, session) = open(
            SimulatedEndpoint::new("sim://drop")
                .with_total_steps(1_000)
                .with_step_interval(Duration::from_millis(5)),
        );
        session
            .call(MalcolmMethod::Configure, Map::new(), TIMEOUT)
            .unwrap();
        session.wait_for_state(&[DeviceState::Ready], TIMEOUT).unwrap();

        let dropper = {
            let endpoint = endpoint.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                endpoint.drop_connection();
            })
        };
        let (_abort_tx, abort_rx) = bounded::<()>(1);
        let result = session.call_interruptible(MalcolmMethod::Run, Map::new(), TIMEOUT, &abort_rx);
        dropper.join().unwrap();
        assert_eq!(result, Err(DriverError::ConnectionLost));
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let (endpoint, session) = open(SimulatedEndpoint::new("sim://bye"));
        session.disconnect();
        session.disconnect();
        assert!(!session.is_connected());
        assert_eq!(session.state(), DeviceState::Offline);
        assert_eq!(endpoint.subscription_count(), 0);
        assert!(matches!(session.get("state"), Err(DriverError::ConnectionLost)));
    }
}
