// 会话桥模块
//
// 每个浏览器连接（Client Link）对应一个 SessionBridge：
// - protocol: 浏览器与中继之间的事件格式
// - state: 会话状态机的状态
// - session: 会话桥本体（单任务串行处理所有事件）
// - registry: link id -> 会话 的显式表

pub mod protocol;
pub mod registry;
pub mod session;
pub mod state;

pub use protocol::{BridgeCommand, ClientMessage, ServerEvent};
pub use registry::{SessionEntry, SessionRegistry};
pub use session::{BridgeContext, BridgeHandle, SessionBridge};
pub use state::BridgeState;
