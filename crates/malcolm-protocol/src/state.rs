//! 设备状态
//!
//! 远端 Malcolm 状态机在本地的镜像。状态迁移由远端推送驱动，
//! 本地命令完成并不意味着远端已经完成迁移。
//!
//! ```text
//! Uninitialized → Idle → Configuring → Ready → Running ⇄ Paused → (Idle | Fault)
//!                                 │              │          │
//!                                 └──────────────┴──────────┴──→ Aborting → Aborted
//! Fault / Disabled 可从任何活动状态到达；Disabled 与 Offline 终结整个会话。
//! ```

use crate::ProtocolError;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceState {
    /// 本地状态：尚未建立会话
    #[default]
    Uninitialized,
    Resetting,
    Idle,
    Configuring,
    /// 已配置，等待 run（旧协议中称为 Armed）
    Ready,
    Running,
    Paused,
    /// 正在回退到指定步（旧协议中称为 Seeking）
    Rewinding,
    Aborting,
    Aborted,
    Fault,
    Disabling,
    Disabled,
    /// 本地状态：连接丢失
    Offline,
}

impl DeviceState {
    pub const ALL: [DeviceState; 14] = [
        DeviceState::Uninitialized,
        DeviceState::Resetting,
        DeviceState::Idle,
        DeviceState::Configuring,
        DeviceState::Ready,
        DeviceState::Running,
        DeviceState::Paused,
        DeviceState::Rewinding,
        DeviceState::Aborting,
        DeviceState::Aborted,
        DeviceState::Fault,
        DeviceState::Disabling,
        DeviceState::Disabled,
        DeviceState::Offline,
    ];

    /// 线格式名称
    pub const fn as_str(&self) -> &'static str {
        match self {
            DeviceState::Uninitialized => "Uninitialized",
            DeviceState::Resetting => "Resetting",
            DeviceState::Idle => "Idle",
            DeviceState::Configuring => "Configuring",
            DeviceState::Ready => "Ready",
            DeviceState::Running => "Running",
            DeviceState::Paused => "Paused",
            DeviceState::Rewinding => "Rewinding",
            DeviceState::Aborting => "Aborting",
            DeviceState::Aborted => "Aborted",
            DeviceState::Fault => "Fault",
            DeviceState::Disabling => "Disabling",
            DeviceState::Disabled => "Disabled",
            DeviceState::Offline => "Offline",
        }
    }

    /// 静止状态：设备既不在配置也不在运行
    pub const fn is_quiescent(&self) -> bool {
        matches!(
            self,
            DeviceState::Idle | DeviceState::Ready | DeviceState::Fault | DeviceState::Aborted
        )
    }

    /// 设备忙（配置中、运行中或正在迁移）
    pub const fn is_busy(&self) -> bool {
        !self.is_quiescent()
    }

    /// 终结整个会话，需要 dispose + 重新 initialize
    pub const fn is_session_terminal(&self) -> bool {
        matches!(self, DeviceState::Disabled | DeviceState::Offline)
    }

    /// abort 在此状态下有实际作用
    pub const fn is_abortable(&self) -> bool {
        matches!(
            self,
            DeviceState::Configuring
                | DeviceState::Running
                | DeviceState::Paused
                | DeviceState::Rewinding
        )
    }

    /// 状态图中是否存在 `self → next` 这条边
    ///
    /// 远端是权威来源，镜像层遇到不在图中的迁移只记录告警，照样跟随。
    pub fn can_transition_to(&self, next: DeviceState) -> bool {
        use DeviceState::*;

        if *self == next {
            return true;
        }
        if next == Offline {
            return *self != Uninitialized;
        }
        if matches!(next, Fault | Disabling | Disabled) && !self.is_session_terminal() {
            return true;
        }
        match self {
            // 会话建立时远端可以处于任意状态
            Uninitialized => true,
            Resetting => matches!(next, Idle),
            Idle => matches!(next, Configuring | Resetting),
            Configuring => matches!(next, Ready | Aborting),
            Ready => matches!(next, Running | Configuring | Resetting | Rewinding | Aborting),
            Running => matches!(next, Paused | Idle | Ready | Aborting | Rewinding),
            Paused => matches!(next, Running | Rewinding | Aborting),
            Rewinding => matches!(next, Paused | Ready | Aborting),
            Aborting => matches!(next, Aborted),
            Aborted => matches!(next, Resetting | Idle | Configuring),
            Fault => matches!(next, Resetting | Idle),
            Disabling => matches!(next, Disabled),
            Disabled => matches!(next, Resetting),
            Offline => false,
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 解析远端推送的状态名（大小写不敏感）
///
/// 兼容别名：`Armed` → Ready，`Seeking` → Rewinding，
/// `PostRun` → Running，`Finished` → Idle。
impl FromStr for DeviceState {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        if let Some(state) = DeviceState::ALL
            .iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(raw))
        {
            return Ok(*state);
        }
        match raw.to_ascii_lowercase().as_str() {
            "armed" => Ok(DeviceState::Ready),
            "seeking" => Ok(DeviceState::Rewinding),
            "postrun" => Ok(DeviceState::Running),
            "finished" => Ok(DeviceState::Idle),
            _ => Err(ProtocolError::UnknownState(s.to_string())),
        }
    }
}
