// 事件桥
//
// 会话 -> UI：data / status / error 事件，按会话 ID 路由到订阅者
// UI -> 会话：connect / write / resize / disconnect 命令

pub mod stdio;

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::ssh::ConnectConfig;

/// 连接状态（对 UI 公开的部分）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Connected,
    Disconnected,
}

/// 发往 UI 的事件，每条都带会话 ID
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    Data { session_id: String, data: String },
    Status {
        session_id: String,
        status: SessionStatus,
    },
    Error { session_id: String, message: String },
}

impl BridgeEvent {
    pub fn session_id(&self) -> &str {
        match self {
            BridgeEvent::Data { session_id, .. }
            | BridgeEvent::Status { session_id, .. }
            | BridgeEvent::Error { session_id, .. } => session_id,
        }
    }
}

/// UI 发来的命令
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeCommand {
    Connect {
        session_id: String,
        config: ConnectConfig,
    },
    Write { session_id: String, data: String },
    Resize {
        session_id: String,
        cols: u32,
        rows: u32,
    },
    Disconnect { session_id: String },
}

/// 命令接收方（会话注册表实现它，测试中可替换）
pub trait CommandSink: Send + Sync {
    fn dispatch(&self, command: BridgeCommand);
}

/// 订阅过滤条件
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscriptionFilter {
    All,
    Session(String),
}

impl SubscriptionFilter {
    fn accepts(&self, event: &BridgeEvent) -> bool {
        match self {
            SubscriptionFilter::All => true,
            SubscriptionFilter::Session(id) => id == event.session_id(),
        }
    }
}

/// 一个订阅：取消订阅只影响事件投递，不会断开会话
pub struct Subscription {
    pub id: Uuid,
    pub events: mpsc::UnboundedReceiver<BridgeEvent>,
}

struct Subscriber {
    filter: SubscriptionFilter,
    sender: mpsc::UnboundedSender<BridgeEvent>,
}

/// 事件扇出
///
/// 每个订阅者一个无界队列，同一会话的事件按产生顺序入队。
#[derive(Default)]
pub struct EventBridge {
    subscribers: RwLock<HashMap<Uuid, Subscriber>>,
}

impl EventBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        let (sender, events) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        debug!("[Bridge] Subscriber {} added ({:?})", id, filter);
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Subscriber { filter, sender });
        Subscription { id, events }
    }

    pub fn unsubscribe(&self, id: Uuid) {
        let removed = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if removed.is_some() {
            debug!("[Bridge] Subscriber {} removed", id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// 投递事件；接收端已关闭的订阅者顺带清理
    pub fn emit(&self, event: BridgeEvent) {
        trace!("[Bridge] {:?}", event);
        let mut closed = Vec::new();
        {
            let subscribers = self
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            for (id, subscriber) in subscribers.iter() {
                if subscriber.filter.accepts(&event)
                    && subscriber.sender.send(event.clone()).is_err()
                {
                    closed.push(*id);
                }
            }
        }
        if !closed.is_empty() {
            let mut subscribers = self
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for id in closed {
                subscribers.remove(&id);
            }
        }
    }

    pub fn data(&self, session_id: &str, data: impl Into<String>) {
        self.emit(BridgeEvent::Data {
            session_id: session_id.to_string(),
            data: data.into(),
        });
    }

    pub fn status(&self, session_id: &str, status: SessionStatus) {
        self.emit(BridgeEvent::Status {
            session_id: session_id.to_string(),
            status,
        });
    }

    pub fn error(&self, session_id: &str, message: impl Into<String>) {
        self.emit(BridgeEvent::Error {
            session_id: session_id.to_string(),
            message: message.into(),
        });
    }
}
