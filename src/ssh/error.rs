// SSH 错误类型定义

use std::io::ErrorKind;

use thiserror::Error;

/// SSH 错误类型
#[derive(Debug, Error)]
pub enum SshError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO 错误（网络连接等）
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 认证失败
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// SSH 协议错误
    #[error("SSH protocol error: {0}")]
    Protocol(String),

    /// 密钥错误
    #[error("Key error: {0}")]
    Key(String),

    /// 连接超时
    #[error("Connection timeout after {0}s")]
    Timeout(u64),

    /// Shell 通道打开失败（握手已成功）
    #[error("Failed to start shell: {0}")]
    ChannelOpen(String),

    /// 通道错误
    #[error("Channel error: {0}")]
    Channel(String),
}

impl SshError {
    /// 是否为连接重置类错误
    ///
    /// 快速重连时对端经常直接 RST，这类错误只进调试日志，不提示用户。
    pub fn is_transient_reset(&self) -> bool {
        match self {
            SshError::Io(e) => {
                matches!(
                    e.kind(),
                    ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
                ) || mentions_reset(&e.to_string())
            }
            SshError::Protocol(msg) | SshError::Channel(msg) => mentions_reset(msg),
            _ => false,
        }
    }
}

fn mentions_reset(message: &str) -> bool {
    message.contains("ECONNRESET") || message.contains("Connection reset")
}

impl From<russh::Error> for SshError {
    fn from(e: russh::Error) -> Self {
        match e {
            russh::Error::IO(io) => SshError::Io(io),
            other => SshError::Protocol(other.to_string()),
        }
    }
}

impl From<russh::keys::Error> for SshError {
    fn from(e: russh::keys::Error) -> Self {
        SshError::Key(e.to_string())
    }
}
