// 浏览器 <-> 中继 事件协议
//
// 文本帧为带 type 字段的 JSON；终端输出走二进制帧。
// 协议不做送达确认，链路中断时未送达的输入/输出直接丢弃。

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_SSH_PORT;
use crate::models::{ConnectionProfile, TerminalGeometry};

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// 浏览器发来的消息
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Connect {
        host: String,
        #[serde(default = "default_port")]
        port: u16,
        username: String,
        #[serde(default)]
        password: String,
    },
    Input {
        data: String,
    },
    Resize {
        cols: u32,
        rows: u32,
        #[serde(default)]
        width: u32,
        #[serde(default)]
        height: u32,
    },
    Transfer {
        handle: String,
        remote_path: String,
    },
    Disconnect,
}

/// 会话桥可处理的命令
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BridgeCommand {
    Connect(ConnectionProfile),
    Input(Vec<u8>),
    Resize(TerminalGeometry),
    Transfer { handle: String, remote_path: String },
    Disconnect,
}

impl From<ClientMessage> for BridgeCommand {
    fn from(message: ClientMessage) -> Self {
        match message {
            ClientMessage::Connect {
                host,
                port,
                username,
                password,
            } => BridgeCommand::Connect(ConnectionProfile::new(host, port, username, password)),
            ClientMessage::Input { data } => BridgeCommand::Input(data.into_bytes()),
            ClientMessage::Resize {
                cols,
                rows,
                width,
                height,
            } => BridgeCommand::Resize(TerminalGeometry::new(cols, rows).with_pixels(width, height)),
            ClientMessage::Transfer {
                handle,
                remote_path,
            } => BridgeCommand::Transfer {
                handle,
                remote_path,
            },
            ClientMessage::Disconnect => BridgeCommand::Disconnect,
        }
    }
}

/// 发往浏览器的事件
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Ready,
    /// 原始终端输出，以二进制帧发送
    #[serde(skip)]
    Output(Vec<u8>),
    Error {
        message: String,
    },
    Closed,
    TransferSucceeded {
        remote_path: String,
        message: String,
    },
    TransferFailed {
        message: String,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    pub fn transfer_failed(message: impl Into<String>) -> Self {
        ServerEvent::TransferFailed {
            message: message.into(),
        }
    }

    pub fn transfer_succeeded(remote_path: impl Into<String>) -> Self {
        let remote_path = remote_path.into();
        ServerEvent::TransferSucceeded {
            message: format!("File uploaded to {}", remote_path),
            remote_path,
        }
    }
}
