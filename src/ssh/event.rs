// SSH 连接事件与调试日志定义

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Local};
use tokio::sync::mpsc;

use super::error::SshError;
use super::transport::{Shell, Transport};

/// 连接器 -> 会话 的内部事件
///
/// 每个事件都带有发起它的连接尝试编号，会话据此丢弃过期尝试的事件。
pub enum ConnectionEvent {
    /// 诊断日志
    Log { attempt: u64, entry: LogEntry },
    /// 已认证并打开了 PTY shell
    Ready {
        attempt: u64,
        transport: Box<dyn Transport>,
        shell: Shell,
    },
    /// 连接失败
    Failed { attempt: u64, error: SshError },
}

impl fmt::Debug for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Log { attempt, entry } => write!(f, "Log#{}({})", attempt, entry.message),
            Self::Ready { attempt, .. } => write!(f, "Ready#{}", attempt),
            Self::Failed { attempt, error } => write!(f, "Failed#{}({})", attempt, error),
        }
    }
}

/// 单次连接尝试的日志发送端
#[derive(Clone)]
pub struct AttemptLog {
    attempt: u64,
    sender: mpsc::UnboundedSender<ConnectionEvent>,
}

impl AttemptLog {
    pub fn new(attempt: u64, sender: mpsc::UnboundedSender<ConnectionEvent>) -> Self {
        Self { attempt, sender }
    }

    /// 发送日志事件
    pub fn log(&self, entry: LogEntry) {
        let _ = self.sender.send(ConnectionEvent::Log {
            attempt: self.attempt,
            entry,
        });
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogEntry::debug(message));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogEntry::info(message));
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogEntry::warn(message));
    }
}

/// 日志级别
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// 日志条目
#[derive(Clone, Debug)]
pub struct LogEntry {
    /// 时间戳
    pub timestamp: DateTime<Local>,
    /// 日志级别
    pub level: LogLevel,
    /// 消息内容
    pub message: String,
}

impl LogEntry {
    /// 创建新的日志条目
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            message: message.into(),
        }
    }

    pub fn debug(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Debug, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.level.as_str(),
            self.message
        )
    }
}

/// 最近 N 条诊断日志，附加在错误报告后面
#[derive(Debug)]
pub struct DebugLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl DebugLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(256)),
            capacity,
        }
    }

    /// 追加一条日志，解析器层面的噪声行直接丢弃
    pub fn push(&mut self, entry: LogEntry) {
        if self.capacity == 0 || is_parser_noise(&entry.message) {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// 渲染为多行文本
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn is_parser_noise(message: &str) -> bool {
    message.trim_start().starts_with("Parser")
}
