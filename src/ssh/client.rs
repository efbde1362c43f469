// SSH 客户端核心实现

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{AuthResult, Handle, KeyboardInteractiveAuthResponse};
use russh::Disconnect;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use super::channel::split_shell;
use super::config::{AuthMethod, ConnectConfig, SshConfig};
use super::error::SshError;
use super::event::AttemptLog;
use super::handler::SshClientHandler;
use super::transport::{Connector, PtyRequest, Shell, Transport};
use crate::models::ConnectionSettings;

/// 交互式认证最多应答的轮数
const MAX_INTERACTIVE_ROUNDS: usize = 5;

/// SSH 客户端
/// 负责建立 SSH 连接并返回已认证的传输连接
pub struct SshClient {
    /// 全局连接设置
    settings: ConnectionSettings,
}

impl SshClient {
    /// 创建新的 SSH 客户端
    pub fn new(settings: ConnectionSettings) -> Self {
        Self { settings }
    }

    /// TCP 连接 + SSH 握手 + 认证
    async fn establish(
        &self,
        config: &SshConfig,
        log: &AttemptLog,
    ) -> Result<RusshTransport, SshError> {
        log.info("Starting SSH connection...");
        log.debug(format!(
            "Target: {}@{}:{}",
            config.username, config.host, config.port
        ));

        let tcp_stream = TcpStream::connect((config.host.as_str(), config.port)).await?;
        let _ = tcp_stream.set_nodelay(true);
        log.info("TCP connection established");

        log.info("Starting SSH handshake...");
        let russh_config = Arc::new(config.to_russh_config());
        let handler = SshClientHandler::new(log.clone(), config.host.clone());
        let mut handle = russh::client::connect_stream(russh_config, tcp_stream, handler)
            .await
            .map_err(SshError::from)?;
        log.info("SSH handshake completed");

        log.info(format!("Authenticating as '{}'...", config.username));
        self.authenticate(&mut handle, config, log).await?;
        log.info("Authentication successful");

        Ok(RusshTransport {
            handle,
            host: config.host.clone(),
        })
    }

    /// 依次尝试认证方式，任意一种成功即返回
    async fn authenticate(
        &self,
        handle: &mut Handle<SshClientHandler>,
        config: &SshConfig,
        log: &AttemptLog,
    ) -> Result<(), SshError> {
        let mut last_failure = String::from("No authentication method available");

        for method in &config.auth {
            log.debug(format!("Trying {} authentication", method.name()));

            let accepted = match method {
                AuthMethod::Password(password) => {
                    let result = handle
                        .authenticate_password(&config.username, password)
                        .await
                        .map_err(SshError::from)?;
                    auth_result_accepted(result, method, &mut last_failure)
                }
                AuthMethod::PublicKey {
                    key_material,
                    passphrase,
                } => {
                    let key = russh::keys::decode_secret_key(key_material, passphrase.as_deref())
                        .map_err(|e| SshError::Key(format!("Failed to decode key: {}", e)))?;
                    let key_with_alg =
                        russh::keys::PrivateKeyWithHashAlg::new(Arc::new(key), None);
                    let result = handle
                        .authenticate_publickey(&config.username, key_with_alg)
                        .await
                        .map_err(SshError::from)?;
                    auth_result_accepted(result, method, &mut last_failure)
                }
                AuthMethod::KeyboardInteractive { response } => {
                    let accepted = keyboard_interactive(
                        handle,
                        &config.username,
                        response.as_deref(),
                        log,
                    )
                    .await?;
                    if !accepted {
                        last_failure = "Keyboard-interactive authentication failed".to_string();
                    }
                    accepted
                }
            };

            if accepted {
                debug!("[SSH] {} accepted {} auth", config.host, method.name());
                return Ok(());
            }
            log.debug(last_failure.clone());
        }

        Err(SshError::Auth(last_failure))
    }
}

fn auth_result_accepted(result: AuthResult, method: &AuthMethod, last_failure: &mut String) -> bool {
    match result {
        AuthResult::Success => true,
        AuthResult::Failure {
            remaining_methods,
            partial_success,
        } => {
            *last_failure = if partial_success {
                "Partial authentication - additional auth required".to_string()
            } else {
                format!(
                    "{} authentication failed. Server suggests: {:?}",
                    method.name(),
                    remaining_methods
                )
            };
            false
        }
    }
}

/// keyboard-interactive：有密码时每个提示都回答密码，否则回答空串
async fn keyboard_interactive(
    handle: &mut Handle<SshClientHandler>,
    username: &str,
    response: Option<&str>,
    log: &AttemptLog,
) -> Result<bool, SshError> {
    let mut reply = handle
        .authenticate_keyboard_interactive_start(username, None::<String>)
        .await
        .map_err(SshError::from)?;

    for _ in 0..MAX_INTERACTIVE_ROUNDS {
        match reply {
            KeyboardInteractiveAuthResponse::Success => return Ok(true),
            KeyboardInteractiveAuthResponse::Failure { .. } => return Ok(false),
            KeyboardInteractiveAuthResponse::InfoRequest { prompts, .. } => {
                log.debug(format!(
                    "Keyboard-interactive request with {} prompt(s)",
                    prompts.len()
                ));
                let answer = response.unwrap_or_default();
                let answers = vec![answer.to_string(); prompts.len()];
                reply = handle
                    .authenticate_keyboard_interactive_respond(answers)
                    .await
                    .map_err(SshError::from)?;
            }
        }
    }

    Ok(false)
}

#[async_trait]
impl Connector for SshClient {
    async fn connect(
        &self,
        config: ConnectConfig,
        log: &AttemptLog,
    ) -> Result<Box<dyn Transport>, SshError> {
        let config = SshConfig::resolve(config, &self.settings).await?;
        let secs = config.connect_timeout;

        let transport = timeout(Duration::from_secs(secs), self.establish(&config, log))
            .await
            .map_err(|_| SshError::Timeout(secs))??;

        info!(
            "[SSH] Connected to {}@{}:{}",
            config.username, config.host, config.port
        );
        Ok(Box::new(transport))
    }
}

/// 基于 russh Handle 的传输连接
pub struct RusshTransport {
    handle: Handle<SshClientHandler>,
    host: String,
}

#[async_trait]
impl Transport for RusshTransport {
    async fn open_shell(&mut self, pty: PtyRequest) -> Result<Shell, SshError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::ChannelOpen(e.to_string()))?;

        channel
            .request_pty(
                false,
                &pty.term,
                pty.col_width,
                pty.row_height,
                pty.pix_width,
                pty.pix_height,
                &[],
            )
            .await
            .map_err(|e| SshError::ChannelOpen(e.to_string()))?;

        channel
            .request_shell(false)
            .await
            .map_err(|e| SshError::ChannelOpen(e.to_string()))?;

        debug!("[SSH] Shell channel opened on {}", self.host);
        Ok(split_shell(channel))
    }

    async fn close(&mut self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            debug!("[SSH] Disconnect from {} reported: {}", self.host, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test]
    async fn test_silent_server_times_out() {
        // 接受 TCP 连接但从不发送 SSH 版本行
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
            drop(socket);
        });

        let client = SshClient::new(ConnectionSettings {
            connection_timeout_secs: 1,
            ..Default::default()
        });
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let log = AttemptLog::new(1, events_tx);
        let config = ConnectConfig {
            host: "127.0.0.1".to_string(),
            port: Some(port),
            username: "root".to_string(),
            password: Some("secret".to_string()),
            private_key: None,
        };

        let result = timeout(Duration::from_secs(10), client.connect(config, &log))
            .await
            .expect("connector ignored its own timeout");
        match result {
            Err(SshError::Timeout(secs)) => assert_eq!(secs, 1),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("silent server must not produce a transport"),
        }
        server.abort();
    }
}
