//! 事件处理管道
//!
//! 会话事件线程的主循环：接收传输层推送，更新状态镜像，并向监听器分发事件。
//!
//! 会话打开之后，这是镜像状态唯一的写入路径。

use crate::event::MalcolmEvent;
use crate::metrics::SessionMetrics;
use crate::state::{DeviceSnapshot, MalcolmContext, ProgressSnapshot};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use malcolm_protocol::constants::{
    ATTRIBUTE_NAME_COMPLETED_STEPS, ATTRIBUTE_NAME_CONFIGURED_STEPS, ATTRIBUTE_NAME_HEALTH,
    ATTRIBUTE_NAME_STATE, ATTRIBUTE_NAME_TOTAL_STEPS,
};
use malcolm_protocol::{DeviceState, RequestId, Response, ResponseBody};
use malcolm_transport::TransportEvent;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// 订阅表：请求 ID → 属性名
pub type Subscriptions = Arc<RwLock<HashMap<RequestId, String>>>;

/// 事件管道配置
///
/// # Example
///
/// ```
/// use malcolm_driver::PipelineConfig;
///
/// let config = PipelineConfig {
///     event_poll_interval_ms: 20,
///     steps_event_interval_ms: 100,
///     ..Default::default()
/// };
/// assert_eq!(config.event_channel_capacity, 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// 普通请求（get / put / 订阅）的超时（毫秒）
    pub request_timeout_ms: u64,
    /// 事件线程 `recv_timeout` 间隔（毫秒），决定退出响应速度
    pub event_poll_interval_ms: u64,
    /// 进度事件最小间隔（毫秒），最后一步不受限制
    pub steps_event_interval_ms: u64,
    /// 阻塞调用轮询镜像状态（Fault / 断线 / 中止）的间隔（毫秒）
    pub abort_poll_interval_ms: u64,
    /// 传输事件通道容量
    pub event_channel_capacity: usize,
    /// Drop 时等待后台线程退出的时间（毫秒）
    pub join_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5_000,
            event_poll_interval_ms: 50,
            steps_event_interval_ms: 250,
            abort_poll_interval_ms: 20,
            event_channel_capacity: 1024,
            join_timeout_ms: 2_000,
        }
    }
}

/// 事件线程的局部状态
#[derive(Debug, Default)]
pub struct EventState {
    /// 上次发出进度事件的时间
    last_steps_event: Option<Instant>,
}

impl EventState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// 事件线程主循环
///
/// `is_running` 变为 false 或通道断开时退出。
pub fn event_loop(
    rx: Receiver<TransportEvent>,
    ctx: Arc<MalcolmContext>,
    subscriptions: Subscriptions,
    config: PipelineConfig,
    is_running: Arc<AtomicBool>,
    metrics: Arc<SessionMetrics>,
) {
    let poll = Duration::from_millis(config.event_poll_interval_ms);
    let mut state = EventState::new();

    loop {
        // Acquire: If we see false, we must see all cleanup writes from other threads
        if !is_running.load(Ordering::Acquire) {
            trace!("Event thread: is_running flag is false, exiting");
            break;
        }

        match rx.recv_timeout(poll) {
            Ok(event) => {
                metrics.events_received.fetch_add(1, Ordering::Relaxed);
                apply_event(&event, &ctx, &subscriptions, &config, &metrics, &mut state);
            },
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Event thread: transport channel disconnected, exiting");
                break;
            },
        }
    }
}

/// 处理单个传输事件
pub fn apply_event(
    event: &TransportEvent,
    ctx: &MalcolmContext,
    subscriptions: &Subscriptions,
    config: &PipelineConfig,
    metrics: &SessionMetrics,
    state: &mut EventState,
) {
    match event {
        TransportEvent::ConnectionChanged(connected) => {
            apply_connection_change(*connected, ctx, metrics)
        },
        TransportEvent::Message(Response {
            id,
            body: ResponseBody::Update { value },
        }) => {
            let endpoint = subscriptions.read().get(id).cloned();
            match endpoint {
                Some(endpoint) => apply_update(&endpoint, value, ctx, config, metrics, state),
                None => {
                    metrics.malformed_updates.fetch_add(1, Ordering::Relaxed);
                    trace!("Update for unknown subscription {}", id);
                },
            }
        },
        TransportEvent::Message(other) => {
            trace!("Ignoring unsolicited response {:?}", other);
        },
    }
}

fn apply_connection_change(connected: bool, ctx: &MalcolmContext, metrics: &SessionMetrics) {
    ctx.connected.store(connected, Ordering::Release);
    if connected {
        info!("Malcolm connection restored; session remains offline until re-initialized");
    } else {
        warn!("Malcolm connection lost");
        ctx.mark_session_lost();
        let previous = ctx.device_snapshot();
        if previous.state != DeviceState::Offline {
            let next = DeviceSnapshot {
                health: "Connection lost".to_string(),
                ..previous.with_state(DeviceState::Offline)
            };
            ctx.device.store(Arc::new(next.clone()));
            metrics.state_changes.fetch_add(1, Ordering::Relaxed);
            ctx.listeners.fan_out(&MalcolmEvent::StateChanged {
                previous: previous.state,
                current: DeviceState::Offline,
                message: next.health,
            });
        }
    }
    ctx.listeners.fan_out(&MalcolmEvent::ConnectionChanged { connected });
}

fn apply_update(
    endpoint: &str,
    value: &Value,
    ctx: &MalcolmContext,
    config: &PipelineConfig,
    metrics: &SessionMetrics,
    state: &mut EventState,
) {
    match endpoint {
        ATTRIBUTE_NAME_STATE => {
            let parsed = value.as_str().map(str::parse::<DeviceState>);
            match parsed {
                Some(Ok(next)) => apply_state(next, ctx, metrics),
                _ => {
                    metrics.malformed_updates.fetch_add(1, Ordering::Relaxed);
                    warn!("Ignoring malformed state update: {}", value);
                },
            }
        },
        ATTRIBUTE_NAME_HEALTH => {
            let health = value.as_str().map_or_else(|| value.to_string(), str::to_string);
            let current = ctx.device_snapshot();
            ctx.device.store(Arc::new(DeviceSnapshot { health, ..current }));
        },
        ATTRIBUTE_NAME_COMPLETED_STEPS => {
            let Some(steps) = value.as_u64() else {
                metrics.malformed_updates.fetch_add(1, Ordering::Relaxed);
                return;
            };
            let progress = ProgressSnapshot {
                completed_steps: steps,
                ..ctx.progress()
            };
            ctx.progress.store(Arc::new(progress));

            let interval = Duration::from_millis(config.steps_event_interval_ms);
            let due = state.last_steps_event.is_none_or(|t| t.elapsed() >= interval);
            let last_step = progress.total_steps > 0 && steps >= progress.total_steps;
            if due || last_step {
                state.last_steps_event = Some(Instant::now());
                ctx.listeners.fan_out(&MalcolmEvent::StepsCompleted {
                    steps,
                    total: progress.total_steps,
                    message: format!("Completed {steps} of {} steps", progress.total_steps),
                });
            } else {
                metrics.steps_events_throttled.fetch_add(1, Ordering::Relaxed);
            }
        },
        ATTRIBUTE_NAME_CONFIGURED_STEPS | ATTRIBUTE_NAME_TOTAL_STEPS => {
            let Some(steps) = value.as_u64() else {
                metrics.malformed_updates.fetch_add(1, Ordering::Relaxed);
                return;
            };
            let mut progress = ctx.progress();
            if endpoint == ATTRIBUTE_NAME_TOTAL_STEPS {
                progress.total_steps = steps;
            } else {
                progress.configured_steps = steps;
            }
            ctx.progress.store(Arc::new(progress));
        },
        other => {
            ctx.attributes.write().insert(other.to_string(), value.clone());
        },
    }
}

fn apply_state(next: DeviceState, ctx: &MalcolmContext, metrics: &SessionMetrics) {
    let previous = ctx.device_snapshot();
    if previous.state == next {
        return;
    }
    // Offline 是终态：重连后的远端推送不能让会话复活
    if previous.state == DeviceState::Offline {
        trace!("Dropping state push {} for an offline session", next);
        return;
    }
    if !previous.state.can_transition_to(next) {
        warn!("Unexpected device transition {} -> {}, following remote", previous.state, next);
    }
    debug!("Device state {} -> {}", previous.state, next);

    let snapshot = previous.with_state(next);
    ctx.device.store(Arc::new(snapshot.clone()));
    metrics.state_changes.fetch_add(1, Ordering::Relaxed);
    ctx.listeners.fan_out(&MalcolmEvent::StateChanged {
        previous: previous.state,
        current: next,
        message: snapshot.health,
    });
}
