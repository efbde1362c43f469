// 会话注册表
//
// 会话 ID -> 会话任务句柄。条目只由会话任务自己在回到 disconnected 后移除，
// 移除时若还有排队的命令则继续处理，注册表本身从不删除条目。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use super::config::ConnectConfig;
use super::session::{ConnectionState, Session, SessionCommand, SessionOptions};
use super::transport::Connector;
use crate::bridge::{BridgeCommand, CommandSink, EventBridge};

type SessionMap = HashMap<String, SessionHandle>;

/// 会话任务句柄
struct SessionHandle {
    /// 区分同一 ID 的先后两个会话
    generation: u64,
    commands: mpsc::UnboundedSender<SessionCommand>,
    state: watch::Receiver<ConnectionState>,
}

/// 会话注册表
/// 负责按会话 ID 创建、查找和移除会话任务
pub struct SessionRegistry {
    /// 活跃会话映射表 (Session ID -> Handle)
    sessions: Arc<RwLock<SessionMap>>,
    connector: Arc<dyn Connector>,
    bridge: Arc<EventBridge>,
    options: SessionOptions,
    /// 会话任务运行在这个运行时上
    runtime: Handle,
    next_generation: AtomicU64,
}

impl SessionRegistry {
    pub fn new(
        connector: Arc<dyn Connector>,
        bridge: Arc<EventBridge>,
        options: SessionOptions,
        runtime: Handle,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            connector,
            bridge,
            options,
            runtime,
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn bridge(&self) -> &Arc<EventBridge> {
        &self.bridge
    }

    /// 连接（或重新挂载）会话；会话不存在时创建
    pub fn connect(&self, session_id: &str, config: ConnectConfig) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let handle = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| self.spawn_session(session_id));

        if let Err(mpsc::error::SendError(command)) =
            handle.commands.send(SessionCommand::Connect(config))
        {
            // 会话任务意外退出，换一个新任务
            warn!("[Registry] Session {} task is gone, respawning", session_id);
            let handle = self.spawn_session(session_id);
            let _ = handle.commands.send(command);
            sessions.insert(session_id.to_string(), handle);
        }
    }

    /// 写入按键数据；会话不存在或未连接时静默丢弃
    pub fn write(&self, session_id: &str, data: String) {
        self.send(session_id, SessionCommand::Write(data));
    }

    pub fn resize(&self, session_id: &str, cols: u32, rows: u32) {
        self.send(session_id, SessionCommand::Resize { cols, rows });
    }

    /// 断开会话；会话不存在时无操作
    ///
    /// 只投递命令，不等待会话关闭。条目由会话任务在发布 disconnected
    /// 之后自行移除，因此返回后的短时间内 `session_count()` 仍会计入该会话，
    /// `state()` 也可能仍是 connected。需要确认时等待 `session_count()` 下降
    /// 或订阅 status 事件。
    pub fn disconnect(&self, session_id: &str) {
        if !self.send(session_id, SessionCommand::Disconnect) {
            debug!("[Registry] Disconnect for unknown session {}", session_id);
        }
    }

    pub fn is_connected(&self, session_id: &str) -> bool {
        self.state(session_id) == Some(ConnectionState::Connected)
    }

    pub fn state(&self, session_id: &str) -> Option<ConnectionState> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .map(|handle| *handle.state.borrow())
    }

    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    fn send(&self, session_id: &str, command: SessionCommand) -> bool {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        match sessions.get(session_id) {
            Some(handle) => handle.commands.send(command).is_ok(),
            None => false,
        }
    }

    fn spawn_session(&self, session_id: &str) -> SessionHandle {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);

        let session = Session::new(
            session_id.to_string(),
            self.options.clone(),
            Arc::clone(&self.connector),
            Arc::clone(&self.bridge),
            state_tx,
            events_tx,
        );
        let reaper = Reaper {
            sessions: Arc::downgrade(&self.sessions),
            session_id: session_id.to_string(),
            generation,
        };

        debug!(
            "[Registry] Spawning session {} (generation {})",
            session_id, generation
        );
        self.runtime.spawn(session.run(command_rx, events_rx, reaper));

        SessionHandle {
            generation,
            commands,
            state,
        }
    }
}

impl CommandSink for SessionRegistry {
    fn dispatch(&self, command: BridgeCommand) {
        match command {
            BridgeCommand::Connect { session_id, config } => self.connect(&session_id, config),
            BridgeCommand::Write { session_id, data } => self.write(&session_id, data),
            BridgeCommand::Resize {
                session_id,
                cols,
                rows,
            } => self.resize(&session_id, cols, rows),
            BridgeCommand::Disconnect { session_id } => self.disconnect(&session_id),
        }
    }
}

/// 会话任务从注册表移除自身
pub struct Reaper {
    sessions: Weak<RwLock<SessionMap>>,
    session_id: String,
    generation: u64,
}

impl Reaper {
    /// 持有写锁检查命令队列：队列为空则移除会话并返回 None，
    /// 否则返回排队中的命令交给会话继续处理
    pub(crate) fn try_reap(
        &self,
        commands: &mut mpsc::UnboundedReceiver<SessionCommand>,
    ) -> Option<SessionCommand> {
        let Some(sessions) = self.sessions.upgrade() else {
            return commands.try_recv().ok();
        };
        let mut sessions = sessions.write().unwrap_or_else(PoisonError::into_inner);

        if let Ok(command) = commands.try_recv() {
            return Some(command);
        }
        if sessions
            .get(&self.session_id)
            .is_some_and(|handle| handle.generation == self.generation)
        {
            sessions.remove(&self.session_id);
        }
        None
    }
}
