// SSH 客户端 Handler 实现
// 实现 russh::client::Handler trait

use russh::keys::PublicKey;
use std::future::Future;
use tracing::debug;

use super::event::AttemptLog;

/// SSH 客户端 Handler
/// 处理 SSH 连接过程中的各种回调
pub struct SshClientHandler {
    /// 当前连接尝试的日志
    log: AttemptLog,
    /// 服务器主机名（用于日志）
    host: String,
}

impl SshClientHandler {
    /// 创建新的 Handler
    pub fn new(log: AttemptLog, host: String) -> Self {
        Self { log, host }
    }
}

impl russh::client::Handler for SshClientHandler {
    type Error = russh::Error;

    /// 检查服务器公钥
    /// 主机密钥确认不在本模块范围内，这里接受所有公钥并记录指纹
    fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        let fingerprint = server_public_key.fingerprint(russh::keys::ssh_key::HashAlg::Sha256);

        debug!("[SSH] {} host key {}", self.host, fingerprint);
        self.log.info(format!("Server key fingerprint: {}", fingerprint));
        self.log.debug(format!(
            "Server key type: {}",
            server_public_key.algorithm()
        ));

        async { Ok(true) }
    }
}
