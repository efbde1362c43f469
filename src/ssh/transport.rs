// 传输层抽象
//
// Connector 建立已认证的连接，Transport 在其上打开 PTY shell。
// Shell 分为读写两半：读半由会话任务等待，写半交给独立的写任务，
// 远端流控阻塞写入时读取和命令处理不受影响。测试中可替换为假实现。

use async_trait::async_trait;

use super::config::ConnectConfig;
use super::error::SshError;
use super::event::AttemptLog;

/// PTY 请求参数
#[derive(Clone, Debug)]
pub struct PtyRequest {
    /// 终端类型
    pub term: String,
    /// 列数
    pub col_width: u32,
    /// 行数
    pub row_height: u32,
    /// 像素宽度
    pub pix_width: u32,
    /// 像素高度
    pub pix_height: u32,
}

impl Default for PtyRequest {
    fn default() -> Self {
        Self {
            term: "xterm-256color".to_string(),
            col_width: 80,
            row_height: 24,
            pix_width: 0,
            pix_height: 0,
        }
    }
}

/// Shell 通道上的一次读取结果
#[derive(Debug)]
pub enum ShellEvent {
    /// 终端输出（stdout 与 stderr 合并）
    Data(Vec<u8>),
    /// 通道正常关闭（EOF / Close）
    Closed,
    /// 通道出错
    Failed(SshError),
}

/// 连接器：打开一条已认证的传输连接
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(
        &self,
        config: ConnectConfig,
        log: &AttemptLog,
    ) -> Result<Box<dyn Transport>, SshError>;
}

/// 已认证的传输连接
#[async_trait]
pub trait Transport: Send {
    /// 打开交互式 shell 通道
    async fn open_shell(&mut self, pty: PtyRequest) -> Result<Shell, SshError>;

    /// 优雅关闭连接，完成后返回
    async fn close(&mut self);
}

/// 已打开的 shell，读写分离
pub struct Shell {
    pub reader: Box<dyn ShellReader>,
    pub writer: Box<dyn ShellWriter>,
}

impl std::fmt::Debug for Shell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Shell")
    }
}

/// Shell 读半
#[async_trait]
pub trait ShellReader: Send {
    /// 等待下一段输出
    async fn recv(&mut self) -> ShellEvent;
}

/// Shell 写半，可能因远端窗口耗尽而长时间挂起
#[async_trait]
pub trait ShellWriter: Send {
    async fn write(&mut self, data: &[u8]) -> Result<(), SshError>;

    async fn resize(&mut self, cols: u32, rows: u32) -> Result<(), SshError>;

    /// 发送 EOF 并关闭通道
    async fn close(&mut self);
}
