// 会话表
// link id -> 会话，随浏览器连接建立 / 断开增删

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use super::protocol::BridgeCommand;
use super::session::BridgeHandle;
use super::state::BridgeState;

/// 会话表条目
#[derive(Clone)]
pub struct SessionEntry {
    pub handle: BridgeHandle,
    /// 浏览器地址（日志用）
    pub peer: Option<String>,
    pub connected_at: DateTime<Utc>,
}

impl SessionEntry {
    pub fn new(handle: BridgeHandle, peer: Option<String>) -> Self {
        Self {
            handle,
            peer,
            connected_at: Utc::now(),
        }
    }
}

/// 会话表
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<Uuid, SessionEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, entry: SessionEntry) {
        let id = entry.handle.id();
        self.sessions.lock().await.insert(id, entry);
    }

    pub async fn remove(&self, id: &Uuid) -> Option<SessionEntry> {
        self.sessions.lock().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// 处于 Ready 状态的会话数
    pub async fn ready_count(&self) -> usize {
        self.sessions
            .lock()
            .await
            .values()
            .filter(|entry| entry.handle.state() == BridgeState::Ready)
            .count()
    }

    /// 进程退出前断开所有会话
    pub async fn disconnect_all(&self) {
        let sessions = self.sessions.lock().await;
        if !sessions.is_empty() {
            info!("[Bridge] Disconnecting {} session(s)", sessions.len());
        }
        for entry in sessions.values() {
            entry.handle.send(BridgeCommand::Disconnect);
        }
    }
}
