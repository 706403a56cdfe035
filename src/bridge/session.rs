// 会话桥
//
// 一个浏览器连接对应一个 SessionBridge 任务。浏览器命令和所有异步回调（连接完成、
// Shell 输出 / 关闭、传输完成、重连定时器）都进入同一个事件循环串行处理，
// 迟到的回调通过 generation 识别并丢弃。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::protocol::{BridgeCommand, ServerEvent};
use super::state::BridgeState;
use crate::constants::{NO_SSH_CONNECTION, TRANSFER_IN_PROGRESS};
use crate::models::{ConnectionProfile, TerminalGeometry};
use crate::services::staging::StagingArea;
use crate::ssh::{
    Connector, InteractiveShell, ShellCloseReason, ShellEvent, ShellHandle, SshError, Transport,
};

/// 会话桥依赖的共享资源
#[derive(Clone)]
pub struct BridgeContext {
    pub connector: Arc<dyn Connector>,
    pub staging: Arc<StagingArea>,
    /// 连接失败后的固定重连间隔
    pub reconnect_interval: Duration,
}

/// 会话桥的外部句柄（由 Client Link 持有）
/// 全部句柄被丢弃即视为链路断开
#[derive(Clone)]
pub struct BridgeHandle {
    id: Uuid,
    commands: mpsc::UnboundedSender<BridgeCommand>,
    state: watch::Receiver<BridgeState>,
}

impl BridgeHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// 投递命令；会话已结束时静默丢弃
    pub fn send(&self, command: BridgeCommand) {
        if self.commands.send(command).is_err() {
            trace!("[Bridge] [{}] Command dropped: session finished", self.id);
        }
    }

    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    /// 订阅状态变化
    #[cfg(test)]
    pub fn watch_state(&self) -> watch::Receiver<BridgeState> {
        self.state.clone()
    }
}

type Established = (Arc<dyn Transport>, InteractiveShell);

/// 事件循环内部事件
enum BridgeEvent {
    Connected {
        generation: u64,
        result: Result<Established, SshError>,
    },
    Shell {
        generation: u64,
        event: ShellEvent,
    },
    RetryDue {
        generation: u64,
    },
    TransferDone {
        remote_path: String,
        result: Result<u64, SshError>,
    },
}

/// 会话桥
pub struct SessionBridge {
    id: Uuid,
    ctx: BridgeContext,
    outbound: mpsc::UnboundedSender<ServerEvent>,
    internal_tx: mpsc::UnboundedSender<BridgeEvent>,
    state_tx: watch::Sender<BridgeState>,

    state: BridgeState,
    /// 每次发起连接或拆除连接时递增
    generation: u64,
    profile: Option<ConnectionProfile>,
    transport: Option<Arc<dyn Transport>>,
    shell: Option<ShellHandle>,
    /// 进行中的连接尝试 / 重连定时器
    pending: Option<CancellationToken>,
    transfer_pending: bool,
}

impl SessionBridge {
    /// 启动会话桥任务
    /// outbound 为发往浏览器的事件队列
    pub fn spawn(
        id: Uuid,
        ctx: BridgeContext,
        outbound: mpsc::UnboundedSender<ServerEvent>,
    ) -> (BridgeHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(BridgeState::Idle);

        let bridge = SessionBridge {
            id,
            ctx,
            outbound,
            internal_tx,
            state_tx,
            state: BridgeState::Idle,
            generation: 0,
            profile: None,
            transport: None,
            shell: None,
            pending: None,
            transfer_pending: false,
        };
        let task = tokio::spawn(bridge.run(command_rx, internal_rx));

        (
            BridgeHandle {
                id,
                commands: command_tx,
                state: state_rx,
            },
            task,
        )
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<BridgeCommand>,
        mut internal: mpsc::UnboundedReceiver<BridgeEvent>,
    ) {
        debug!("[Bridge] [{}] Session started", self.id);

        loop {
            tokio::select! {
                biased;
                event = internal.recv() => {
                    // internal_tx 由自身持有，不会关闭
                    if let Some(event) = event {
                        self.on_event(event).await;
                    }
                }
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command).await,
                    None => break,
                },
            }
        }

        info!("[Bridge] [{}] Client link lost, tearing down", self.id);
        self.teardown().await;
        self.set_state(BridgeState::Idle);
    }

    fn emit(&self, event: ServerEvent) {
        // 链路已断开时输出直接丢弃
        let _ = self.outbound.send(event);
    }

    fn set_state(&mut self, state: BridgeState) {
        if self.state != state {
            debug!("[Bridge] [{}] {} -> {}", self.id, self.state, state);
            self.state = state;
            self.state_tx.send_replace(state);
        }
    }

    // ======================== 浏览器命令 ========================

    async fn on_command(&mut self, command: BridgeCommand) {
        match command {
            BridgeCommand::Connect(profile) => self.connect(profile).await,
            BridgeCommand::Input(data) => match (&self.state, &self.shell) {
                (BridgeState::Ready, Some(shell)) => shell.write(data),
                _ => debug!(
                    "[Bridge] [{}] Dropped {} input bytes while {}",
                    self.id,
                    data.len(),
                    self.state
                ),
            },
            BridgeCommand::Resize(geometry) => match (&self.state, &self.shell) {
                (BridgeState::Ready, Some(shell)) => shell.resize(geometry),
                _ => debug!("[Bridge] [{}] Ignored resize while {}", self.id, self.state),
            },
            BridgeCommand::Transfer {
                handle,
                remote_path,
            } => self.request_transfer(handle, remote_path).await,
            BridgeCommand::Disconnect => self.disconnect().await,
        }
    }

    async fn connect(&mut self, profile: ConnectionProfile) {
        if self.state != BridgeState::Idle {
            info!("[Bridge] [{}] Reconnect requested, closing current session", self.id);
            self.teardown().await;
            self.set_state(BridgeState::Idle);
        }

        if let Err(e) = profile.validate() {
            warn!("[Bridge] [{}] Rejected connection profile: {}", self.id, e);
            self.profile = None;
            self.emit(ServerEvent::error(e.to_string()));
            return;
        }

        self.profile = Some(profile);
        self.start_attempt();
    }

    /// 发起一次连接尝试：握手认证后立即以默认尺寸打开 Shell
    fn start_attempt(&mut self) {
        let Some(profile) = self.profile.clone() else {
            return;
        };

        self.generation += 1;
        let generation = self.generation;
        let token = CancellationToken::new();
        self.pending = Some(token.clone());
        self.set_state(BridgeState::Connecting);

        info!("[Bridge] [{}] Connecting to {}", self.id, profile.label());

        let connector = self.ctx.connector.clone();
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                result = establish(connector, profile) => {
                    let _ = internal.send(BridgeEvent::Connected { generation, result });
                }
            }
        });
    }

    async fn disconnect(&mut self) {
        if self.state == BridgeState::Idle {
            debug!("[Bridge] [{}] Disconnect while idle, nothing to do", self.id);
            return;
        }
        info!("[Bridge] [{}] Disconnect requested", self.id);
        self.set_state(BridgeState::Disconnecting);
        self.teardown().await;
        self.profile = None;
        self.set_state(BridgeState::Idle);
        self.emit(ServerEvent::Closed);
    }

    /// 先关 Shell，再关连接；忽略两者的关闭错误
    async fn teardown(&mut self) {
        self.generation += 1;
        if let Some(token) = self.pending.take() {
            token.cancel();
        }
        if let Some(shell) = self.shell.take() {
            shell.close();
        }
        if let Some(transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                debug!("[Bridge] [{}] Ignored close error: {}", self.id, e);
            }
        }
    }

    // ======================== 文件传输 ========================

    async fn request_transfer(&mut self, handle: String, remote_path: String) {
        let transport = match (&self.state, &self.transport) {
            (BridgeState::Ready, Some(transport)) => transport.clone(),
            _ => {
                self.emit(ServerEvent::transfer_failed(NO_SSH_CONNECTION));
                return;
            }
        };
        if self.transfer_pending {
            info!("[Bridge] [{}] Rejected transfer: another one is pending", self.id);
            self.emit(ServerEvent::transfer_failed(TRANSFER_IN_PROGRESS));
            return;
        }

        let staged = match self.ctx.staging.claim(&handle).await {
            Ok(staged) => staged,
            Err(e) => {
                warn!("[Bridge] [{}] Transfer of {} rejected: {}", self.id, handle, e);
                self.emit(ServerEvent::transfer_failed(e.to_string()));
                return;
            }
        };

        info!(
            "[Bridge] [{}] Transferring {} ({} bytes) -> {}",
            self.id, staged.handle, staged.byte_size, remote_path
        );
        self.transfer_pending = true;

        // 传输在独立任务中执行，不阻塞事件循环；不随断开取消。
        // 暂存文件的消费或释放由任务自己完成，事件循环退出后结果仍然生效
        let internal = self.internal_tx.clone();
        let staging = self.ctx.staging.clone();
        let id = self.id;
        let local_path: PathBuf = staged.local_path;
        tokio::spawn(async move {
            let result = transport.send_file(&local_path, &remote_path).await;
            match &result {
                Ok(bytes) => {
                    info!(
                        "[Bridge] [{}] Transfer complete: {} bytes -> {}",
                        id, bytes, remote_path
                    );
                    staging.consume(&handle).await;
                }
                Err(e) => {
                    warn!("[Bridge] [{}] Transfer failed: {}", id, e);
                    staging.release(&handle).await;
                }
            }
            let _ = internal.send(BridgeEvent::TransferDone {
                remote_path,
                result,
            });
        });
    }

    // ======================== 异步回调 ========================

    async fn on_event(&mut self, event: BridgeEvent) {
        match event {
            BridgeEvent::Connected { generation, result } => {
                self.on_connected(generation, result).await
            }
            BridgeEvent::Shell { generation, event } => {
                if generation != self.generation {
                    trace!("[Bridge] [{}] Dropped stale shell event", self.id);
                    return;
                }
                match event {
                    ShellEvent::Output(data) => self.emit(ServerEvent::Output(data)),
                    ShellEvent::Closed(reason) => self.on_shell_closed(reason).await,
                }
            }
            BridgeEvent::RetryDue { generation } => {
                if generation == self.generation && self.state == BridgeState::Failed {
                    info!("[Bridge] [{}] Retrying connection", self.id);
                    self.start_attempt();
                }
            }
            BridgeEvent::TransferDone {
                remote_path,
                result,
            } => {
                self.transfer_pending = false;
                match result {
                    Ok(_) => self.emit(ServerEvent::transfer_succeeded(remote_path)),
                    Err(e) => self.emit(ServerEvent::transfer_failed(e.to_string())),
                }
            }
        }
    }

    async fn on_connected(&mut self, generation: u64, result: Result<Established, SshError>) {
        if generation != self.generation || self.state != BridgeState::Connecting {
            // 已被断开或新的连接取代
            if let Ok((transport, shell)) = result {
                shell.handle.close();
                let _ = transport.close().await;
            }
            return;
        }
        self.pending = None;

        match result {
            Ok((transport, shell)) => {
                let InteractiveShell { handle, events } = shell;
                self.forward_shell_events(generation, events);
                self.transport = Some(transport);
                self.shell = Some(handle);
                self.set_state(BridgeState::Ready);
                info!("[Bridge] [{}] Session ready", self.id);
                self.emit(ServerEvent::Ready);
            }
            Err(e) => {
                warn!(
                    "[Bridge] [{}] Connection failed ({:?}): {}",
                    self.id,
                    e.kind(),
                    e
                );
                self.fail(e.to_string());
            }
        }
    }

    async fn on_shell_closed(&mut self, reason: ShellCloseReason) {
        match reason {
            ShellCloseReason::Local => {
                debug!("[Bridge] [{}] Shell closed locally", self.id);
            }
            ShellCloseReason::Remote { exit_status } => {
                info!(
                    "[Bridge] [{}] Remote closed the session (status: {:?})",
                    self.id, exit_status
                );
                self.set_state(BridgeState::Closing);
                self.teardown().await;
                self.set_state(BridgeState::Idle);
                self.emit(ServerEvent::Closed);
            }
            ShellCloseReason::Lost(message) => {
                warn!("[Bridge] [{}] Connection lost: {}", self.id, message);
                self.teardown().await;
                self.fail(message);
            }
        }
    }

    /// 上报错误并在固定间隔后用同一配置重连
    fn fail(&mut self, message: String) {
        self.emit(ServerEvent::error(message));
        self.set_state(BridgeState::Failed);

        let generation = self.generation;
        let token = CancellationToken::new();
        self.pending = Some(token.clone());
        let delay = self.ctx.reconnect_interval;
        let internal = self.internal_tx.clone();
        debug!("[Bridge] [{}] Reconnecting in {:?}", self.id, delay);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = internal.send(BridgeEvent::RetryDue { generation });
                }
            }
        });
    }

    /// Shell 事件按到达顺序转入事件循环
    fn forward_shell_events(&self, generation: u64, mut events: mpsc::UnboundedReceiver<ShellEvent>) {
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if internal
                    .send(BridgeEvent::Shell { generation, event })
                    .is_err()
                {
                    break;
                }
            }
        });
    }
}

/// 握手认证并以默认尺寸打开 Shell；Shell 打不开时关闭连接
async fn establish(
    connector: Arc<dyn Connector>,
    profile: ConnectionProfile,
) -> Result<Established, SshError> {
    let transport = connector.open(&profile).await?;
    match transport.open_shell(TerminalGeometry::default()).await {
        Ok(shell) => Ok((transport, shell)),
        Err(e) => {
            let _ = transport.close().await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;
    use tokio::time::{timeout, Instant};

    use crate::ssh::ShellCommand;

    /// 回显 Shell 的假连接
    #[derive(Default)]
    struct FakeTransport {
        opened_with: Mutex<Vec<TerminalGeometry>>,
        received: Arc<Mutex<Vec<u8>>>,
        resizes: Arc<Mutex<Vec<TerminalGeometry>>>,
        shell_events: Mutex<Option<mpsc::UnboundedSender<ShellEvent>>>,
        uploads: Mutex<Vec<(PathBuf, String)>>,
        closed: AtomicBool,
        transfer_error: Mutex<Option<String>>,
        transfer_gate: Mutex<Option<Arc<Notify>>>,
    }

    impl FakeTransport {
        fn received(&self) -> Vec<u8> {
            self.received.lock().unwrap().clone()
        }

        fn resizes(&self) -> Vec<TerminalGeometry> {
            self.resizes.lock().unwrap().clone()
        }

        fn push_event(&self, event: ShellEvent) {
            if let Some(tx) = self.shell_events.lock().unwrap().as_ref() {
                tx.send(event).unwrap();
            }
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn open_shell(&self, geometry: TerminalGeometry) -> Result<InteractiveShell, SshError> {
            self.opened_with.lock().unwrap().push(geometry);
            let (shell, mut commands, events) = InteractiveShell::channel_pair();
            *self.shell_events.lock().unwrap() = Some(events.clone());

            // 驱动任务：记录输入并回显
            let received = self.received.clone();
            let resizes = self.resizes.clone();
            tokio::spawn(async move {
                while let Some(command) = commands.recv().await {
                    match command {
                        ShellCommand::Write(data) => {
                            received.lock().unwrap().extend_from_slice(&data);
                            let _ = events.send(ShellEvent::Output(data));
                        }
                        ShellCommand::Resize(geometry) => resizes.lock().unwrap().push(geometry),
                        ShellCommand::Close => break,
                    }
                }
                let _ = events.send(ShellEvent::Closed(ShellCloseReason::Local));
            });
            Ok(shell)
        }

        async fn send_file(&self, local_path: &Path, remote_path: &str) -> Result<u64, SshError> {
            let gate = self.transfer_gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            if let Some(message) = self.transfer_error.lock().unwrap().clone() {
                return Err(SshError::Sftp(message));
            }
            let size = tokio::fs::metadata(local_path).await?.len();
            self.uploads
                .lock()
                .unwrap()
                .push((local_path.to_path_buf(), remote_path.to_string()));
            Ok(size)
        }

        async fn close(&self) -> Result<(), SshError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeConnector {
        attempts: AtomicUsize,
        /// 前 N 次连接失败
        fail_first: usize,
        transports: Mutex<Vec<Arc<FakeTransport>>>,
    }

    impl FakeConnector {
        fn failing(fail_first: usize) -> Self {
            Self {
                fail_first,
                ..Default::default()
            }
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        fn transport(&self, index: usize) -> Arc<FakeTransport> {
            self.transports.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn open(&self, profile: &ConnectionProfile) -> Result<Arc<dyn Transport>, SshError> {
            profile.validate()?;
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_first {
                return Err(SshError::Protocol("connect ECONNREFUSED 10.0.0.5:22".into()));
            }
            let transport = Arc::new(FakeTransport::default());
            self.transports.lock().unwrap().push(transport.clone());
            Ok(transport)
        }
    }

    struct Harness {
        handle: BridgeHandle,
        events: mpsc::UnboundedReceiver<ServerEvent>,
        connector: Arc<FakeConnector>,
        staging: Arc<StagingArea>,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        async fn new(connector: FakeConnector) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let staging = Arc::new(StagingArea::open(dir.path()).await.unwrap());
            let connector = Arc::new(connector);
            let ctx = BridgeContext {
                connector: connector.clone(),
                staging: staging.clone(),
                reconnect_interval: Duration::from_secs(3),
            };
            let (tx, events) = mpsc::unbounded_channel();
            let (handle, _task) = SessionBridge::spawn(Uuid::new_v4(), ctx, tx);
            Self {
                handle,
                events,
                connector,
                staging,
                _dir: dir,
            }
        }

        async fn next(&mut self) -> ServerEvent {
            timeout(Duration::from_secs(10), self.events.recv())
                .await
                .expect("timed out waiting for event")
                .expect("bridge dropped outbound queue")
        }

        async fn connect(&mut self) {
            self.handle.send(BridgeCommand::Connect(profile()));
            assert_eq!(self.next().await, ServerEvent::Ready);
        }

        /// 读取输出直到累计 expected 字节
        async fn read_output(&mut self, expected: usize) -> Vec<u8> {
            let mut out = Vec::new();
            while out.len() < expected {
                match self.next().await {
                    ServerEvent::Output(data) => out.extend(data),
                    other => panic!("unexpected event: {other:?}"),
                }
            }
            out
        }
    }

    fn profile() -> ConnectionProfile {
        ConnectionProfile::new("10.0.0.5", 22, "ops", "x")
    }

    #[tokio::test]
    async fn test_connect_input_resize_disconnect() {
        let mut h = Harness::new(FakeConnector::default()).await;
        h.connect().await;
        assert_eq!(h.handle.state(), BridgeState::Ready);

        h.handle.send(BridgeCommand::Input(b"ls\n".to_vec()));
        assert_eq!(h.read_output(3).await, b"ls\n");

        h.handle
            .send(BridgeCommand::Resize(TerminalGeometry::new(100, 30)));
        h.handle.send(BridgeCommand::Input(b"pwd\n".to_vec()));
        assert_eq!(h.read_output(4).await, b"pwd\n");
        assert_eq!(
            h.connector.transport(0).resizes(),
            vec![TerminalGeometry::new(100, 30)]
        );

        h.handle.send(BridgeCommand::Disconnect);
        assert_eq!(h.next().await, ServerEvent::Closed);
        assert_eq!(h.handle.state(), BridgeState::Idle);
        assert!(h.connector.transport(0).closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_shell_opens_with_default_geometry() {
        let mut h = Harness::new(FakeConnector::default()).await;
        h.connect().await;
        let transport = h.connector.transport(0);
        assert_eq!(
            transport.opened_with.lock().unwrap().as_slice(),
            &[TerminalGeometry::new(80, 24)]
        );
    }

    #[tokio::test]
    async fn test_input_order_is_preserved() {
        let mut h = Harness::new(FakeConnector::default()).await;
        h.connect().await;

        let mut expected = Vec::new();
        for i in 0..200u32 {
            let chunk = format!("{i};").into_bytes();
            expected.extend_from_slice(&chunk);
            h.handle.send(BridgeCommand::Input(chunk));
        }
        assert_eq!(h.read_output(expected.len()).await, expected);
        assert_eq!(h.connector.transport(0).received(), expected);
    }

    #[tokio::test]
    async fn test_input_outside_ready_is_dropped() {
        let mut h = Harness::new(FakeConnector::default()).await;
        h.handle.send(BridgeCommand::Input(b"early".to_vec()));
        h.handle
            .send(BridgeCommand::Resize(TerminalGeometry::new(120, 40)));
        h.connect().await;

        h.handle.send(BridgeCommand::Input(b"x".to_vec()));
        assert_eq!(h.read_output(1).await, b"x");
        assert_eq!(h.connector.transport(0).received(), b"x");
        assert!(h.connector.transport(0).resizes().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let mut h = Harness::new(FakeConnector::default()).await;
        h.connect().await;

        h.handle.send(BridgeCommand::Disconnect);
        h.handle.send(BridgeCommand::Disconnect);
        assert_eq!(h.next().await, ServerEvent::Closed);

        // 第二次断开不再产生事件；随后的连接仍正常
        h.connect().await;
        assert_eq!(h.connector.attempts(), 2);
    }

    #[tokio::test]
    async fn test_reconnect_tears_down_previous_connection() {
        let mut h = Harness::new(FakeConnector::default()).await;
        h.connect().await;
        h.connect().await;

        assert!(h.connector.transport(0).closed.load(Ordering::SeqCst));
        assert!(!h.connector.transport(1).closed.load(Ordering::SeqCst));

        h.handle.send(BridgeCommand::Input(b"a".to_vec()));
        assert_eq!(h.read_output(1).await, b"a");
        assert!(h.connector.transport(0).received().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connect_retries_after_fixed_delay() {
        let mut h = Harness::new(FakeConnector::failing(2)).await;
        let started = Instant::now();
        h.handle.send(BridgeCommand::Connect(profile()));

        assert_eq!(
            h.next().await,
            ServerEvent::error("connect ECONNREFUSED 10.0.0.5:22")
        );
        assert_eq!(h.handle.state(), BridgeState::Failed);
        assert!(matches!(h.next().await, ServerEvent::Error { .. }));
        assert_eq!(h.next().await, ServerEvent::Ready);

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(6), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(8), "elapsed {elapsed:?}");
        assert_eq!(h.connector.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_stops_retry_loop() {
        let mut h = Harness::new(FakeConnector::failing(usize::MAX)).await;
        h.handle.send(BridgeCommand::Connect(profile()));
        assert!(matches!(h.next().await, ServerEvent::Error { .. }));

        h.handle.send(BridgeCommand::Disconnect);
        assert_eq!(h.next().await, ServerEvent::Closed);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.connector.attempts(), 1);
        assert_eq!(h.handle.state(), BridgeState::Idle);
    }

    #[tokio::test]
    async fn test_invalid_profile_is_not_retried() {
        let mut h = Harness::new(FakeConnector::default()).await;
        h.handle.send(BridgeCommand::Connect(ConnectionProfile::new(
            "", 22, "ops", "x",
        )));
        assert_eq!(h.next().await, ServerEvent::error("Host is required"));
        assert_eq!(h.handle.state(), BridgeState::Idle);
        assert_eq!(h.connector.attempts(), 0);
    }

    #[tokio::test]
    async fn test_remote_exit_emits_closed_without_retry() {
        let mut h = Harness::new(FakeConnector::default()).await;
        h.connect().await;

        h.connector
            .transport(0)
            .push_event(ShellEvent::Closed(ShellCloseReason::Remote {
                exit_status: Some(0),
            }));
        assert_eq!(h.next().await, ServerEvent::Closed);
        assert_eq!(h.handle.state(), BridgeState::Idle);
        assert!(h.connector.transport(0).closed.load(Ordering::SeqCst));
        assert_eq!(h.connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_loss_reports_error_and_retries() {
        let mut h = Harness::new(FakeConnector::default()).await;
        h.connect().await;

        h.connector
            .transport(0)
            .push_event(ShellEvent::Closed(ShellCloseReason::Lost(
                "Connection lost".into(),
            )));
        assert_eq!(h.next().await, ServerEvent::error("Connection lost"));
        assert_eq!(h.next().await, ServerEvent::Ready);
        assert_eq!(h.connector.attempts(), 2);
    }

    #[tokio::test]
    async fn test_transfer_requires_connection() {
        let mut h = Harness::new(FakeConnector::default()).await;
        let staged = h.staging.stage(b"data").await.unwrap();
        h.handle.send(BridgeCommand::Transfer {
            handle: staged.handle,
            remote_path: "/tmp/data".into(),
        });
        assert_eq!(h.next().await, ServerEvent::transfer_failed("No SSH connection"));
        assert!(staged.local_path.exists());
    }

    #[tokio::test]
    async fn test_successful_transfer_consumes_staged_file() {
        let mut h = Harness::new(FakeConnector::default()).await;
        h.connect().await;
        let staged = h.staging.stage(b"hello world").await.unwrap();

        h.handle.send(BridgeCommand::Transfer {
            handle: staged.handle.clone(),
            remote_path: "/root/hello.txt".into(),
        });
        assert_eq!(
            h.next().await,
            ServerEvent::transfer_succeeded("/root/hello.txt")
        );
        assert!(!staged.local_path.exists());

        // 同一 handle 不能再次使用
        h.handle.send(BridgeCommand::Transfer {
            handle: staged.handle,
            remote_path: "/root/again.txt".into(),
        });
        assert_eq!(
            h.next().await,
            ServerEvent::transfer_failed("Local file not found")
        );
        assert_eq!(h.connector.transport(0).uploads.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_transfer_preserves_staged_file() {
        let mut h = Harness::new(FakeConnector::default()).await;
        h.connect().await;
        *h.connector.transport(0).transfer_error.lock().unwrap() =
            Some("Permission denied".into());
        let staged = h.staging.stage(b"payload").await.unwrap();

        h.handle.send(BridgeCommand::Transfer {
            handle: staged.handle.clone(),
            remote_path: "/etc/payload".into(),
        });
        assert_eq!(h.next().await, ServerEvent::transfer_failed("Permission denied"));
        assert!(staged.local_path.exists());

        // 失败后可重试
        *h.connector.transport(0).transfer_error.lock().unwrap() = None;
        h.handle.send(BridgeCommand::Transfer {
            handle: staged.handle,
            remote_path: "/tmp/payload".into(),
        });
        assert_eq!(h.next().await, ServerEvent::transfer_succeeded("/tmp/payload"));
    }

    #[tokio::test]
    async fn test_second_transfer_rejected_while_pending() {
        let mut h = Harness::new(FakeConnector::default()).await;
        h.connect().await;
        let gate = Arc::new(Notify::new());
        *h.connector.transport(0).transfer_gate.lock().unwrap() = Some(gate.clone());

        let first = h.staging.stage(b"first").await.unwrap();
        let second = h.staging.stage(b"second").await.unwrap();
        h.handle.send(BridgeCommand::Transfer {
            handle: first.handle.clone(),
            remote_path: "/tmp/first".into(),
        });
        h.handle.send(BridgeCommand::Transfer {
            handle: second.handle.clone(),
            remote_path: "/tmp/second".into(),
        });
        assert_eq!(
            h.next().await,
            ServerEvent::transfer_failed("Transfer already in progress")
        );

        // 传输进行中，交互输入不受影响
        h.handle.send(BridgeCommand::Input(b"ok".to_vec()));
        assert_eq!(h.read_output(2).await, b"ok");

        gate.notify_one();
        assert_eq!(h.next().await, ServerEvent::transfer_succeeded("/tmp/first"));
        assert!(!first.local_path.exists());
        assert!(second.local_path.exists());
    }

    #[tokio::test]
    async fn test_link_loss_tears_down_session() {
        let mut h = Harness::new(FakeConnector::default()).await;
        h.connect().await;
        let mut state = h.handle.watch_state();
        let transport = h.connector.transport(0);

        drop(h.handle);
        timeout(Duration::from_secs(5), async {
            while *state.borrow_and_update() != BridgeState::Idle {
                if state.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .unwrap();
        assert!(transport.closed.load(Ordering::SeqCst));
        assert!(h.events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_transfer_outcome_survives_link_loss() {
        let mut h = Harness::new(FakeConnector::default()).await;
        h.connect().await;
        let transport = h.connector.transport(0);
        let gate = Arc::new(Notify::new());
        *transport.transfer_gate.lock().unwrap() = Some(gate.clone());

        let staged = h.staging.stage(b"in flight").await.unwrap();
        h.handle.send(BridgeCommand::Transfer {
            handle: staged.handle.clone(),
            remote_path: "/tmp/in-flight".into(),
        });
        // 传输指令先于链路关闭被处理，传输任务此时已在等待
        drop(h.handle);
        assert!(h.events.recv().await.is_none());

        gate.notify_one();
        timeout(Duration::from_secs(5), async {
            while staged.local_path.exists() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("staged file was not consumed");

        assert_eq!(transport.uploads.lock().unwrap().len(), 1);
        match h.staging.claim(&staged.handle).await {
            Err(e) => assert_eq!(e.to_string(), "Local file not found"),
            Ok(_) => panic!("consumed handle was claimable"),
        }
    }
}
