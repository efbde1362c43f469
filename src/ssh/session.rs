// SSH 会话状态机
//
// 每个会话一个任务：处理 UI 命令、连接器事件和 shell 输出。
// 会话字段只在本任务内修改，对外只暴露 watch 通道里的连接状态。
// 握手和打开 shell 在可取消的尝试任务里完成，写入和 resize 交给独立的写任务，
// 会话任务本身从不等待远端。

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::config::{ConnectConfig, SessionTarget};
use super::error::SshError;
use super::event::{AttemptLog, ConnectionEvent, DebugLog, LogEntry};
use super::registry::Reaper;
use super::transport::{
    Connector, PtyRequest, Shell, ShellEvent, ShellReader, ShellWriter, Transport,
};
use crate::bridge::{EventBridge, SessionStatus};
use crate::models::AppSettings;
use crate::terminal::{Scrollback, Utf8Decoder};

/// 会话对外可见的连接状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// 会话命令（来自注册表）
#[derive(Debug)]
pub enum SessionCommand {
    Connect(ConnectConfig),
    Write(String),
    Resize { cols: u32, rows: u32 },
    Disconnect,
}

/// 会话选项
#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub scrollback_limit: usize,
    pub debug_log_limit: usize,
    pub pty: PtyRequest,
    /// 认证完成后等待 shell 打开的上限
    pub open_timeout: Duration,
    /// 主动断开时等待关闭握手的上限
    pub close_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_settings(&AppSettings::default())
    }
}

impl SessionOptions {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            scrollback_limit: settings.terminal.scrollback_limit,
            debug_log_limit: settings.terminal.debug_log_limit,
            pty: PtyRequest {
                term: settings.terminal.term.clone(),
                col_width: settings.terminal.default_cols,
                row_height: settings.terminal.default_rows,
                ..Default::default()
            },
            open_timeout: Duration::from_secs(settings.connection.connection_timeout_secs as u64),
            close_timeout: Duration::from_secs(settings.connection.close_timeout_secs as u64),
        }
    }
}

/// 内部状态：非法组合（已连接却没有通道）无法表示
enum SessionState {
    Disconnected,
    Connecting {
        target: SessionTarget,
        attempt: u64,
        cancel: CancellationToken,
    },
    Connected {
        target: SessionTarget,
        transport: Box<dyn Transport>,
        reader: Box<dyn ShellReader>,
        writer: WriterTask,
    },
}

impl SessionState {
    fn public(&self) -> ConnectionState {
        match self {
            SessionState::Disconnected => ConnectionState::Disconnected,
            SessionState::Connecting { .. } => ConnectionState::Connecting,
            SessionState::Connected { .. } => ConnectionState::Connected,
        }
    }
}

/// connect 命令在当前状态下的处理方式
enum ConnectAction {
    Fresh,
    AlreadyConnecting,
    Reattach,
    Replace,
}

/// 一个逻辑终端
pub struct Session {
    id: String,
    state: SessionState,
    options: SessionOptions,
    connector: Arc<dyn Connector>,
    bridge: Arc<EventBridge>,
    scrollback: Scrollback,
    debug_log: DebugLog,
    decoder: Utf8Decoder,
    /// 连接尝试编号，用于识别过期事件
    attempt: u64,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    /// 已回到 disconnected，等待从注册表移除
    retired: bool,
}

impl Session {
    pub fn new(
        id: String,
        options: SessionOptions,
        connector: Arc<dyn Connector>,
        bridge: Arc<EventBridge>,
        state_tx: watch::Sender<ConnectionState>,
        events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Self {
        Self {
            id,
            state: SessionState::Disconnected,
            scrollback: Scrollback::new(options.scrollback_limit),
            debug_log: DebugLog::new(options.debug_log_limit),
            decoder: Utf8Decoder::new(),
            options,
            connector,
            bridge,
            attempt: 0,
            state_tx,
            events_tx,
            retired: false,
        }
    }

    /// 会话主循环
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
        mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
        reaper: Reaper,
    ) {
        debug!("[Session] {} task started", self.id);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                Some(event) = events.recv() => self.handle_connection_event(event).await,
                event = next_shell_event(self.reader_mut()) => self.handle_shell_event(event).await,
            }

            // 回到 disconnected 后从注册表移除；期间到达的命令优先处理
            while self.retired {
                match reaper.try_reap(&mut commands) {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("[Session] {} removed from registry", self.id);
                        return;
                    }
                }
            }
        }

        debug!("[Session] {} task stopped", self.id);
    }

    fn reader_mut(&mut self) -> Option<&mut Box<dyn ShellReader>> {
        match &mut self.state {
            SessionState::Connected { reader, .. } => Some(reader),
            _ => None,
        }
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.state_tx.send_replace(self.state.public());
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect(config) => self.connect(config).await,
            SessionCommand::Write(data) => self.write(data.into_bytes()),
            SessionCommand::Resize { cols, rows } => self.resize(cols, rows),
            SessionCommand::Disconnect => self.disconnect().await,
        }
    }

    async fn connect(&mut self, config: ConnectConfig) {
        let target = SessionTarget::from(&config);

        let action = match &self.state {
            SessionState::Disconnected => ConnectAction::Fresh,
            SessionState::Connecting { target: current, .. } if current.same_endpoint(&target) => {
                ConnectAction::AlreadyConnecting
            }
            SessionState::Connected { target: current, .. } if current.same_endpoint(&target) => {
                ConnectAction::Reattach
            }
            _ => ConnectAction::Replace,
        };

        match action {
            ConnectAction::AlreadyConnecting => {
                debug!(
                    "[Session] {} already connecting to {}@{}, ignoring",
                    self.id, target.username, target.host
                );
                return;
            }
            ConnectAction::Reattach => {
                self.reattach();
                return;
            }
            ConnectAction::Replace => {
                info!(
                    "[Session] {} switching to {}@{}",
                    self.id, target.username, target.host
                );
                self.teardown().await;
            }
            ConnectAction::Fresh => {}
        }

        self.start_attempt(config, target);
    }

    /// 已连接时重新挂载：回放缓冲并重新宣告 connected
    fn reattach(&mut self) {
        info!(
            "[Session] {} reattached, replaying {} chars",
            self.id,
            self.scrollback.len()
        );
        if !self.scrollback.is_empty() {
            self.bridge.data(&self.id, self.scrollback.as_str());
        }
        self.bridge.status(&self.id, SessionStatus::Connected);
    }

    fn start_attempt(&mut self, config: ConnectConfig, target: SessionTarget) {
        self.attempt += 1;
        let attempt = self.attempt;
        self.scrollback.clear();
        self.debug_log.clear();
        self.decoder.reset();
        self.retired = false;

        info!(
            "[Session] {} connecting to {}@{}:{} (attempt {})",
            self.id, target.username, target.host, target.port, attempt
        );

        let cancel = CancellationToken::new();
        let task = AttemptTask {
            attempt,
            connector: Arc::clone(&self.connector),
            pty: self.options.pty.clone(),
            open_timeout: self.options.open_timeout,
            close_timeout: self.options.close_timeout,
            events: self.events_tx.clone(),
        };
        tokio::spawn(task.run(config, cancel.clone()));

        self.set_state(SessionState::Connecting {
            target,
            attempt,
            cancel,
        });
    }

    fn is_current_attempt(&self, attempt: u64) -> bool {
        matches!(&self.state, SessionState::Connecting { attempt: current, .. } if *current == attempt)
    }

    async fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Log { attempt, entry } => {
                if attempt == self.attempt {
                    debug!("[SSH] [{}] {}", self.id, entry.message);
                    self.debug_log.push(entry);
                }
            }
            ConnectionEvent::Ready {
                attempt,
                transport,
                shell,
            } => {
                if self.is_current_attempt(attempt) {
                    self.attach(transport, shell);
                } else {
                    debug!(
                        "[Session] {} closing connection of stale attempt {}",
                        self.id, attempt
                    );
                    let close_timeout = self.options.close_timeout;
                    tokio::spawn(close_connection(transport, shell, close_timeout));
                }
            }
            ConnectionEvent::Failed { attempt, error } => {
                if !self.is_current_attempt(attempt) {
                    return;
                }
                self.debug_log.push(LogEntry::error(error.to_string()));
                if let SshError::ChannelOpen(_) = error {
                    // 打开 shell 失败时附带本次尝试的诊断日志
                    error!("[Session] {} {}", self.id, error);
                    self.bridge.error(
                        &self.id,
                        format!("{}\n\nDebug log:\n{}", error, self.debug_log.render()),
                    );
                } else if error.is_transient_reset() {
                    debug!("[Session] {} suppressed reset error: {}", self.id, error);
                } else {
                    warn!("[Session] {} connection failed: {}", self.id, error);
                    self.bridge.error(&self.id, error.to_string());
                }
                self.set_state(SessionState::Disconnected);
                self.bridge.status(&self.id, SessionStatus::Disconnected);
                self.retired = true;
            }
        }
    }

    /// shell 已打开：启动写任务并进入 connected
    fn attach(&mut self, transport: Box<dyn Transport>, shell: Shell) {
        let target = match &self.state {
            SessionState::Connecting { target, .. } => target.clone(),
            _ => return,
        };
        info!(
            "[Session] {} connected to {}@{}",
            self.id, target.username, target.host
        );

        let Shell { reader, writer } = shell;
        let writer = WriterTask::spawn(self.id.clone(), writer, self.options.close_timeout);
        self.set_state(SessionState::Connected {
            target,
            transport,
            reader,
            writer,
        });
        self.bridge.status(&self.id, SessionStatus::Connected);
    }

    async fn handle_shell_event(&mut self, event: ShellEvent) {
        match event {
            ShellEvent::Data(bytes) => {
                let text = self.decoder.decode(&bytes);
                if text.is_empty() {
                    return;
                }
                trace!("[Session] {} received {} bytes", self.id, bytes.len());
                self.scrollback.push(&text);
                self.bridge.data(&self.id, text);
            }
            ShellEvent::Closed => {
                info!("[Session] {} shell closed by remote", self.id);
                self.teardown().await;
                self.retired = true;
            }
            ShellEvent::Failed(error) => {
                self.debug_log.push(LogEntry::error(error.to_string()));
                if error.is_transient_reset() {
                    debug!("[Session] {} suppressed reset error: {}", self.id, error);
                } else {
                    warn!("[Session] {} shell error: {}", self.id, error);
                    self.bridge.error(&self.id, error.to_string());
                }
                self.teardown().await;
                self.retired = true;
            }
        }
    }

    fn write(&mut self, data: Vec<u8>) {
        match &self.state {
            SessionState::Connected { writer, .. } => writer.send(ShellInput::Data(data)),
            // 连接前的按键直接丢弃
            _ => trace!("[Session] {} dropped {} bytes (no shell)", self.id, data.len()),
        }
    }

    fn resize(&mut self, cols: u32, rows: u32) {
        match &self.state {
            SessionState::Connected { writer, .. } => {
                debug!("[Session] {} resize to {}x{}", self.id, cols, rows);
                writer.send(ShellInput::Resize { cols, rows });
            }
            _ => trace!("[Session] {} dropped resize (no shell)", self.id),
        }
    }

    async fn disconnect(&mut self) {
        if matches!(self.state, SessionState::Disconnected) {
            debug!("[Session] {} already disconnected", self.id);
        } else {
            info!("[Session] {} disconnecting", self.id);
            self.teardown().await;
        }
        self.retired = true;
    }

    /// 关闭当前连接（或取消进行中的连接），完成后才发布 disconnected
    async fn teardown(&mut self) {
        match std::mem::replace(&mut self.state, SessionState::Disconnected) {
            SessionState::Disconnected => return,
            SessionState::Connecting { cancel, attempt, .. } => {
                debug!("[Session] {} cancelling attempt {}", self.id, attempt);
                cancel.cancel();
            }
            SessionState::Connected {
                mut transport,
                writer,
                ..
            } => {
                let close = async {
                    writer.shutdown().await;
                    transport.close().await;
                };
                if timeout(self.options.close_timeout, close).await.is_err() {
                    warn!("[Session] {} close handshake timed out", self.id);
                }
            }
        }
        self.state_tx.send_replace(ConnectionState::Disconnected);
        self.bridge.status(&self.id, SessionStatus::Disconnected);
    }

    /// 注册表被销毁
    async fn shutdown(&mut self) {
        debug!("[Session] {} shutting down", self.id);
        self.teardown().await;
    }
}

/// 一次连接尝试：握手认证后打开 shell，全程可被取消
struct AttemptTask {
    attempt: u64,
    connector: Arc<dyn Connector>,
    pty: PtyRequest,
    open_timeout: Duration,
    close_timeout: Duration,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl AttemptTask {
    async fn run(self, config: ConnectConfig, cancel: CancellationToken) {
        let attempt = self.attempt;
        let log = AttemptLog::new(attempt, self.events.clone());

        let connected = tokio::select! {
            _ = cancel.cancelled() => None,
            result = self.connector.connect(config, &log) => Some(result),
        };
        let mut transport = match connected {
            None => {
                debug!("[Session] Connection attempt {} cancelled", attempt);
                return;
            }
            Some(Ok(transport)) => transport,
            Some(Err(error)) => {
                let _ = self.events.send(ConnectionEvent::Failed { attempt, error });
                return;
            }
        };

        log.debug("Opening shell channel");
        let open = timeout(self.open_timeout, transport.open_shell(self.pty.clone()));
        let opened = tokio::select! {
            _ = cancel.cancelled() => None,
            result = open => Some(result),
        };
        let shell = match opened {
            None => {
                debug!(
                    "[Session] Connection attempt {} cancelled while opening shell",
                    attempt
                );
                close_transport(transport, self.close_timeout).await;
                return;
            }
            Some(Ok(Ok(shell))) => shell,
            Some(Ok(Err(error))) => {
                let error = match error {
                    SshError::ChannelOpen(_) => error,
                    other => SshError::ChannelOpen(other.to_string()),
                };
                self.fail(transport, error).await;
                return;
            }
            Some(Err(_)) => {
                log.warn(format!(
                    "Shell channel did not open within {:?}",
                    self.open_timeout
                ));
                let error = SshError::ChannelOpen(format!(
                    "no response within {:?}",
                    self.open_timeout
                ));
                self.fail(transport, error).await;
                return;
            }
        };

        // 会话任务已退出时，就地关闭刚建立的连接
        if let Err(mpsc::error::SendError(ConnectionEvent::Ready {
            transport, shell, ..
        })) = self.events.send(ConnectionEvent::Ready {
            attempt,
            transport,
            shell,
        }) {
            close_connection(transport, shell, self.close_timeout).await;
        }
    }

    /// 先关闭连接再上报，会话回到 disconnected 时连接已释放
    async fn fail(&self, transport: Box<dyn Transport>, error: SshError) {
        close_transport(transport, self.close_timeout).await;
        let _ = self.events.send(ConnectionEvent::Failed {
            attempt: self.attempt,
            error,
        });
    }
}

/// 发往写任务的输入
#[derive(Debug)]
enum ShellInput {
    Data(Vec<u8>),
    Resize { cols: u32, rows: u32 },
}

/// 会话的写任务
///
/// 独占 shell 写半。远端窗口耗尽时只有这个任务挂起，
/// 会话任务照常读取输出、处理 disconnect。
struct WriterTask {
    inputs: mpsc::UnboundedSender<ShellInput>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl WriterTask {
    fn spawn(session_id: String, writer: Box<dyn ShellWriter>, close_timeout: Duration) -> Self {
        let (inputs, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_writer(
            session_id,
            writer,
            rx,
            cancel.clone(),
            close_timeout,
        ));
        Self {
            inputs,
            cancel,
            handle,
        }
    }

    fn send(&self, input: ShellInput) {
        if self.inputs.send(input).is_err() {
            trace!("[Session] Writer already stopped, input dropped");
        }
    }

    /// 放弃未完成的写入，关闭写半
    async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!("[Session] Writer task failed: {}", e);
        }
    }
}

async fn run_writer(
    session_id: String,
    mut writer: Box<dyn ShellWriter>,
    mut inputs: mpsc::UnboundedReceiver<ShellInput>,
    cancel: CancellationToken,
    close_timeout: Duration,
) {
    let pump = async {
        while let Some(input) = inputs.recv().await {
            let result = match input {
                ShellInput::Data(data) => writer.write(&data).await,
                ShellInput::Resize { cols, rows } => writer.resize(cols, rows).await,
            };
            if let Err(e) = result {
                warn!("[Session] {} write error: {}", session_id, e);
            }
        }
    };
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = pump => {}
    }

    if timeout(close_timeout, writer.close()).await.is_err() {
        warn!("[Session] {} channel close timed out", session_id);
    }
    trace!("[Session] {} writer stopped", session_id);
}

async fn next_shell_event(reader: Option<&mut Box<dyn ShellReader>>) -> ShellEvent {
    match reader {
        Some(reader) => reader.recv().await,
        None => std::future::pending().await,
    }
}

async fn close_transport(mut transport: Box<dyn Transport>, close_timeout: Duration) {
    if timeout(close_timeout, transport.close()).await.is_err() {
        warn!("[Session] Transport close timed out");
    }
}

async fn close_connection(transport: Box<dyn Transport>, shell: Shell, close_timeout: Duration) {
    let Shell { mut writer, .. } = shell;
    if timeout(close_timeout, writer.close()).await.is_err() {
        warn!("[Session] Channel close timed out");
    }
    close_transport(transport, close_timeout).await;
}
