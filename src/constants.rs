// 连接策略常量

/// 握手超时（秒）
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 120;
/// 心跳间隔（秒）
pub const DEFAULT_KEEPALIVE_INTERVAL_SECS: u64 = 15;
/// 连续丢失心跳次数上限
pub const DEFAULT_KEEPALIVE_MAX: usize = 10;
/// 自动重连间隔（秒）
pub const DEFAULT_RECONNECT_INTERVAL_SECS: u64 = 3;

pub const DEFAULT_TERM: &str = "xterm-256color";
pub const DEFAULT_COLS: u32 = 80;
pub const DEFAULT_ROWS: u32 = 24;
pub const DEFAULT_SSH_PORT: u16 = 22;

/// 重复传输请求被拒绝时的提示
pub const TRANSFER_IN_PROGRESS: &str = "Transfer already in progress";
/// 未连接时请求传输的提示
pub const NO_SSH_CONNECTION: &str = "No SSH connection";
pub const LOCAL_FILE_NOT_FOUND: &str = "Local file not found";
