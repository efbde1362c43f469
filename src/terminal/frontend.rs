// 终端前端适配器
//
// 一个实例绑定一个会话 ID：持有终端模拟器，转发按键和尺寸变化，
// 按会话 ID 订阅事件桥。卸载时只取消订阅，不断开会话。

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::scrollback::Scrollback;
use super::state::{TerminalSize, TerminalState};
use crate::bridge::{
    BridgeCommand, BridgeEvent, CommandSink, EventBridge, SessionStatus, Subscription,
    SubscriptionFilter,
};
use crate::models::TerminalSettings;
use crate::ssh::ConnectConfig;

/// 通知类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Warning,
    Error,
}

/// 交给宿主 UI 显示的通知
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

pub struct TerminalFrontend {
    session_id: String,
    /// 横幅里显示的主机名
    host: String,
    commands: Arc<dyn CommandSink>,
    bridge: Arc<EventBridge>,
    subscription: Option<Subscription>,
    settings: TerminalSettings,
    /// 容器尺寸为零时不创建终端
    terminal: Option<TerminalState>,
    /// 终端打开前收到的输出
    pending: Scrollback,
    /// 最近一次发给会话的尺寸
    last_sent: Option<(u32, u32)>,
    connected: bool,
    notifications: VecDeque<Notification>,
}

impl TerminalFrontend {
    pub fn new(
        session_id: impl Into<String>,
        commands: Arc<dyn CommandSink>,
        bridge: Arc<EventBridge>,
        settings: TerminalSettings,
    ) -> Self {
        let pending = Scrollback::new(settings.scrollback_limit);
        Self {
            session_id: session_id.into(),
            host: String::new(),
            commands,
            bridge,
            subscription: None,
            settings,
            terminal: None,
            pending,
            last_sent: None,
            connected: false,
            notifications: VecDeque::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// 订阅本会话的事件（重复调用无副作用）
    pub fn mount(&mut self) {
        if self.subscription.is_none() {
            debug!("[Terminal] {} mounted", self.session_id);
            self.subscription = Some(
                self.bridge
                    .subscribe(SubscriptionFilter::Session(self.session_id.clone())),
            );
        }
    }

    /// 取消订阅；会话继续在后台运行
    pub fn unmount(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            self.bridge.unsubscribe(subscription.id);
            debug!("[Terminal] {} unmounted", self.session_id);
        }
        self.terminal = None;
        self.pending.clear();
        self.last_sent = None;
        self.connected = false;
    }

    /// 连接（或重新挂载到）会话
    pub fn connect(&mut self, config: ConnectConfig) {
        self.mount();
        self.host = config.host.trim().to_string();
        self.commands.dispatch(BridgeCommand::Connect {
            session_id: self.session_id.clone(),
            config,
        });
    }

    /// 用户输入
    pub fn on_input(&self, data: impl Into<String>) {
        self.commands.dispatch(BridgeCommand::Write {
            session_id: self.session_id.clone(),
            data: data.into(),
        });
    }

    /// 容器尺寸变化
    pub fn on_container_resize(&mut self, width: f32, height: f32) {
        if width <= 0.0 || height <= 0.0 {
            debug!(
                "[Terminal] {} ignoring zero-size container {}x{}",
                self.session_id, width, height
            );
            return;
        }

        let size = TerminalSize::from_pixels(width, height, &self.settings);
        match self.terminal.as_mut() {
            Some(terminal) => {
                terminal.resize(size);
            }
            None => {
                debug!(
                    "[Terminal] {} opening emulator at {}x{}",
                    self.session_id, size.columns, size.lines
                );
                let mut terminal = TerminalState::new(size);
                if !self.pending.is_empty() {
                    terminal.input_str(self.pending.as_str());
                    self.pending.clear();
                }
                self.terminal = Some(terminal);
                self.forward_replies();
            }
        }
        self.sync_geometry(false);
    }

    /// 当前终端尺寸 (cols, rows)
    pub fn grid_size(&self) -> Option<(u32, u32)> {
        self.terminal
            .as_ref()
            .map(|terminal| (terminal.size().columns as u32, terminal.size().lines as u32))
    }

    /// 终端可见文本（终端尚未打开时为 None）
    pub fn screen_text(&self) -> Option<String> {
        self.terminal.as_ref().map(TerminalState::screen_text)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// 取出待显示的通知
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        self.notifications.drain(..).collect()
    }

    /// 处理所有已到达的事件，返回处理的数量
    pub fn pump(&mut self) -> usize {
        let mut events = Vec::new();
        if let Some(subscription) = self.subscription.as_mut() {
            while let Ok(event) = subscription.events.try_recv() {
                events.push(event);
            }
        }
        let count = events.len();
        for event in &events {
            self.handle_event(event);
        }
        count
    }

    /// 等待并处理下一条事件；未挂载或事件桥关闭时返回 None
    pub async fn next_event(&mut self) -> Option<BridgeEvent> {
        let event = self.subscription.as_mut()?.events.recv().await?;
        self.handle_event(&event);
        Some(event)
    }

    pub fn handle_event(&mut self, event: &BridgeEvent) {
        if event.session_id() != self.session_id {
            return;
        }
        match event {
            BridgeEvent::Data { data, .. } => self.output(data),
            BridgeEvent::Status {
                status: SessionStatus::Connected,
                ..
            } => {
                info!("[Terminal] {} connected to {}", self.session_id, self.host);
                self.connected = true;
                self.output(&format!("\r\nConnected to {}\r\n", self.host));
                self.notify(
                    NotificationKind::Success,
                    format!("Connected to {}", self.host),
                );
                self.sync_geometry(true);
            }
            BridgeEvent::Status {
                status: SessionStatus::Disconnected,
                ..
            } => {
                self.connected = false;
                self.last_sent = None;
                self.output("\r\nDisconnected.\r\n");
                self.notify(
                    NotificationKind::Warning,
                    format!("Disconnected from {}", self.host),
                );
            }
            BridgeEvent::Error { message, .. } => {
                warn!("[Terminal] {} error: {}", self.session_id, message);
                self.output(&format!("\r\nError: {}\r\n", message));
                self.notify(NotificationKind::Error, format!("SSH Error: {}", message));
            }
        }
    }

    fn output(&mut self, data: &str) {
        match self.terminal.as_mut() {
            Some(terminal) => {
                terminal.input_str(data);
                self.forward_replies();
            }
            None => self.pending.push(data),
        }
    }

    /// 终端对查询序列的应答回写给远端
    fn forward_replies(&mut self) {
        let Some(terminal) = self.terminal.as_mut() else {
            return;
        };
        for reply in terminal.take_replies() {
            self.on_input(reply);
        }
    }

    /// 把终端尺寸同步给会话；未连接时不发送
    fn sync_geometry(&mut self, force: bool) {
        if !self.connected {
            return;
        }
        let Some(size) = self.grid_size() else {
            return;
        };
        if force || self.last_sent != Some(size) {
            debug!(
                "[Terminal] {} resize to {}x{}",
                self.session_id, size.0, size.1
            );
            self.last_sent = Some(size);
            self.commands.dispatch(BridgeCommand::Resize {
                session_id: self.session_id.clone(),
                cols: size.0,
                rows: size.1,
            });
        }
    }

    fn notify(&mut self, kind: NotificationKind, message: String) {
        self.notifications.push_back(Notification { kind, message });
    }
}

impl Drop for TerminalFrontend {
    fn drop(&mut self) {
        self.unmount();
    }
}
