// 测试用的假传输层：不走网络，由测试直接驱动远端输出

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::config::ConnectConfig;
use super::error::SshError;
use super::event::AttemptLog;
use super::transport::{
    Connector, PtyRequest, Shell, ShellEvent, ShellReader, ShellWriter, Transport,
};

/// 每个 shell 打开后远端立即输出的提示符
pub const GREETING: &str = "root@fake:~# ";

/// 被拒绝的密码
pub const WRONG_PASSWORD: &str = "wrong";

#[derive(Clone, Default)]
pub struct FakeBehavior {
    /// 握手耗时
    pub delay: Duration,
    /// 握手直接失败
    pub fail_with: Option<fn() -> SshError>,
    /// 握手成功但拒绝打开 shell
    pub refuse_shell: bool,
    /// 打开 shell 的请求永远得不到应答
    pub hang_shell: bool,
    /// 写入永远等不到远端窗口
    pub stall_writes: bool,
}

#[derive(Default)]
struct FakeInner {
    behavior: FakeBehavior,
    attempts: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
    remotes: Mutex<Vec<FakeRemote>>,
}

#[derive(Clone, Default)]
pub struct FakeConnector {
    inner: Arc<FakeInner>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: FakeBehavior) -> Self {
        Self {
            inner: Arc::new(FakeInner {
                behavior,
                ..Default::default()
            }),
        }
    }

    /// 发起过的连接次数
    pub fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// 成功建立的传输连接数
    pub fn opened(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// 第 n 个打开的 shell 的远端
    pub fn remote(&self, index: usize) -> FakeRemote {
        self.inner.remotes.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        config: ConnectConfig,
        log: &AttemptLog,
    ) -> Result<Box<dyn Transport>, SshError> {
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);
        log.debug(format!("Connecting to {}:{}", config.host, config.port()));

        let behavior = &self.inner.behavior;
        if !behavior.delay.is_zero() {
            tokio::time::sleep(behavior.delay).await;
        }
        if let Some(fail) = behavior.fail_with {
            return Err(fail());
        }
        if config.password.as_deref() == Some(WRONG_PASSWORD) {
            return Err(SshError::Auth("All authentication methods failed".to_string()));
        }

        log.info("Handshake completed");
        self.inner.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeTransport {
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct FakeTransport {
    inner: Arc<FakeInner>,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open_shell(&mut self, pty: PtyRequest) -> Result<Shell, SshError> {
        if self.inner.behavior.hang_shell {
            std::future::pending::<()>().await;
        }
        if self.inner.behavior.refuse_shell {
            return Err(SshError::ChannelOpen("administratively prohibited".to_string()));
        }

        let (incoming, events) = mpsc::unbounded_channel();
        let remote = FakeRemote {
            incoming,
            written: Arc::default(),
            resizes: Arc::default(),
            pty: Arc::new(pty),
        };
        remote.send(GREETING);

        let writer = FakeWriter {
            written: Arc::clone(&remote.written),
            resizes: Arc::clone(&remote.resizes),
            stall: self.inner.behavior.stall_writes,
        };
        self.inner.remotes.lock().unwrap().push(remote);
        Ok(Shell {
            reader: Box::new(FakeReader { events }),
            writer: Box::new(writer),
        })
    }

    async fn close(&mut self) {
        self.inner.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// 测试侧持有的远端
#[derive(Clone)]
pub struct FakeRemote {
    incoming: mpsc::UnboundedSender<ShellEvent>,
    written: Arc<Mutex<Vec<u8>>>,
    resizes: Arc<Mutex<Vec<(u32, u32)>>>,
    pty: Arc<PtyRequest>,
}

impl FakeRemote {
    pub fn send(&self, data: &str) {
        let _ = self.incoming.send(ShellEvent::Data(data.as_bytes().to_vec()));
    }

    pub fn send_bytes(&self, data: &[u8]) {
        let _ = self.incoming.send(ShellEvent::Data(data.to_vec()));
    }

    pub fn close(&self) {
        let _ = self.incoming.send(ShellEvent::Closed);
    }

    pub fn fail(&self, error: SshError) {
        let _ = self.incoming.send(ShellEvent::Failed(error));
    }

    /// 会话写入的全部字节
    pub fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }

    pub fn resizes(&self) -> Vec<(u32, u32)> {
        self.resizes.lock().unwrap().clone()
    }

    pub fn pty(&self) -> &PtyRequest {
        &self.pty
    }
}

struct FakeReader {
    events: mpsc::UnboundedReceiver<ShellEvent>,
}

#[async_trait]
impl ShellReader for FakeReader {
    async fn recv(&mut self) -> ShellEvent {
        self.events.recv().await.unwrap_or(ShellEvent::Closed)
    }
}

struct FakeWriter {
    written: Arc<Mutex<Vec<u8>>>,
    resizes: Arc<Mutex<Vec<(u32, u32)>>>,
    stall: bool,
}

#[async_trait]
impl ShellWriter for FakeWriter {
    async fn write(&mut self, data: &[u8]) -> Result<(), SshError> {
        if self.stall {
            std::future::pending::<()>().await;
        }
        self.written.lock().unwrap().extend_from_slice(data);
        Ok(())
    }

    async fn resize(&mut self, cols: u32, rows: u32) -> Result<(), SshError> {
        self.resizes.lock().unwrap().push((cols, rows));
        Ok(())
    }

    async fn close(&mut self) {}
}
