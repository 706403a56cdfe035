// 会话状态

use serde::Serialize;

/// 会话桥状态
///
/// Idle -> Connecting -> Ready -> Closing -> Idle
/// Connecting | Ready -> Failed -> (重连) Connecting
/// 任意非 Idle 状态 -> Disconnecting -> Idle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    #[default]
    Idle,
    Connecting,
    Ready,
    /// 远端关闭后正在回收连接
    Closing,
    /// 连接失败，等待自动重连
    Failed,
    Disconnecting,
}

impl BridgeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeState::Idle => "idle",
            BridgeState::Connecting => "connecting",
            BridgeState::Ready => "ready",
            BridgeState::Closing => "closing",
            BridgeState::Failed => "failed",
            BridgeState::Disconnecting => "disconnecting",
        }
    }
}

impl std::fmt::Display for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
