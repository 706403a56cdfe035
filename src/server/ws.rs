// 浏览器终端 WebSocket（Client Link）
//
// 读循环把浏览器消息翻译成 BridgeCommand；写任务把会话事件按顺序发回浏览器。
// 链路断开时从会话表移除并丢弃句柄，会话桥随之拆除 SSH 连接。

use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::AppState;
use crate::bridge::{BridgeCommand, ClientMessage, ServerEvent, SessionBridge, SessionEntry};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, peer))
}

async fn handle_socket(socket: WebSocket, state: AppState, peer: SocketAddr) {
    let id = Uuid::new_v4();
    info!("[HTTP] Client link {} opened from {}", id, peer);

    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let (handle, bridge_task) = SessionBridge::spawn(id, state.bridge.clone(), outbound_tx);
    state
        .registry
        .insert(SessionEntry::new(handle.clone(), Some(peer.to_string())))
        .await;

    let writer = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let Some(message) = encode_event(event) else {
                continue;
            };
            if sender.send(message).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match decode_message(&text) {
                Some(command) => handle.send(command),
                None => continue,
            },
            Ok(Message::Binary(data)) => handle.send(BridgeCommand::Input(data)),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("[HTTP] Client link {} read error: {}", id, e);
                break;
            }
        }
    }

    if let Some(entry) = state.registry.remove(&id).await {
        let lifetime = chrono::Utc::now() - entry.connected_at;
        info!(
            "[HTTP] Client link {} closed after {}s",
            id,
            lifetime.num_seconds()
        );
    }
    drop(handle);
    let _ = bridge_task.await;
    let _ = writer.await;
}

/// 解析浏览器文本帧；格式错误的帧记录后丢弃
fn decode_message(text: &str) -> Option<BridgeCommand> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => Some(message.into()),
        Err(e) => {
            warn!("[HTTP] Dropped malformed client frame: {}", e);
            None
        }
    }
}

/// 终端输出走二进制帧，其余事件为 JSON 文本帧
fn encode_event(event: ServerEvent) -> Option<Message> {
    match event {
        ServerEvent::Output(data) => Some(Message::Binary(data)),
        other => match serde_json::to_string(&other) {
            Ok(json) => Some(Message::Text(json)),
            Err(e) => {
                warn!("[HTTP] Failed to encode event: {}", e);
                None
            }
        },
    }
}
