// SSH 连接模块
//
// 模块结构:
// - config: 连接配置 (ConnectConfig, SshConfig, AuthMethod)
// - error: 错误类型 (SshError)
// - event: 连接事件与调试日志 (ConnectionEvent, LogEntry, DebugLog)
// - transport: 传输层 trait (Connector, Transport, ShellReader, ShellWriter)
// - handler: russh Handler 实现
// - client: 基于 russh 的连接器
// - channel: 终端通道读写两半 (TerminalReader, TerminalWriter)
// - session: 会话状态机
// - registry: 会话注册表 (SessionRegistry)

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod registry;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod fake;

// 公开导出
pub use client::SshClient;
pub use config::{AuthMethod, ConnectConfig, KeepaliveConfig, SessionTarget, SshConfig};
pub use error::SshError;
pub use event::{DebugLog, LogEntry, LogLevel};
pub use registry::SessionRegistry;
pub use session::{ConnectionState, SessionOptions};
pub use transport::{Connector, PtyRequest, Shell, ShellEvent, ShellReader, ShellWriter, Transport};
