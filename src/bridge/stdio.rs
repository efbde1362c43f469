// JSON Lines 协议：stdin 读命令，stdout 写事件

use std::sync::Arc;

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{BridgeCommand, BridgeEvent, CommandSink, EventBridge, SubscriptionFilter};
use crate::models::ProfilesConfig;

/// 单条命令的最大长度
const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// 按已保存的连接配置连接
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ProfileCommand {
    ConnectProfile {
        session_id: String,
        profile_id: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StdioCommand {
    Bridge(BridgeCommand),
    Profile(ProfileCommand),
}

/// 解析一行命令
pub fn parse_command(line: &str, profiles: &ProfilesConfig) -> Result<BridgeCommand> {
    let command: StdioCommand = serde_json::from_str(line).context("无法解析命令")?;
    match command {
        StdioCommand::Bridge(command) => Ok(command),
        StdioCommand::Profile(ProfileCommand::ConnectProfile {
            session_id,
            profile_id,
        }) => {
            let profile = profiles
                .find(&profile_id)
                .with_context(|| format!("未找到连接配置: {}", profile_id))?;
            Ok(BridgeCommand::Connect {
                session_id,
                config: profile.clone().into(),
            })
        }
    }
}

/// 读取进程 stdin 上的命令直到输入结束
pub async fn serve_stdio(commands: Arc<dyn CommandSink>, profiles: ProfilesConfig) -> Result<()> {
    serve(commands, profiles, tokio::io::stdin()).await
}

/// 读取命令直到输入结束；事件输出由 [`EventOutput`] 负责
pub async fn serve<R>(commands: Arc<dyn CommandSink>, profiles: ProfilesConfig, input: R) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = FramedRead::new(input, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                warn!("[Bridge] Command longer than {} bytes dropped", MAX_LINE_LENGTH);
                continue;
            }
            Err(LinesCodecError::Io(e)) => return Err(e).context("读取命令失败"),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_command(line, &profiles) {
            Ok(command) => commands.dispatch(command),
            Err(e) => warn!("[Bridge] Ignoring invalid command: {:#}", e),
        }
    }

    debug!("[Bridge] Input closed");
    Ok(())
}

/// 所有会话事件的输出端
///
/// 生命周期独立于命令输入：输入结束后，会话关闭产生的 disconnected
/// 事件仍要写出，直到调用 [`EventOutput::finish`]。
pub struct EventOutput {
    bridge: Arc<EventBridge>,
    subscription_id: Uuid,
    writer: JoinHandle<Result<()>>,
}

impl EventOutput {
    /// 订阅全部事件并开始写出，需在 tokio 运行时内调用
    pub fn start<W>(bridge: Arc<EventBridge>, output: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let subscription = bridge.subscribe(SubscriptionFilter::All);
        let subscription_id = subscription.id;
        let writer = tokio::spawn(write_events(subscription.events, output));
        Self {
            bridge,
            subscription_id,
            writer,
        }
    }

    pub fn stdout(bridge: Arc<EventBridge>) -> Self {
        Self::start(bridge, tokio::io::stdout())
    }

    /// 退订并等待已排队的事件全部写出
    pub async fn finish(self) -> Result<()> {
        self.bridge.unsubscribe(self.subscription_id);
        self.writer.await.context("事件输出任务异常退出")?
    }
}

async fn write_events<W>(mut events: mpsc::UnboundedReceiver<BridgeEvent>, output: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(output, LinesCodec::new());
    while let Some(event) = events.recv().await {
        let line = serde_json::to_string(&event).context("序列化事件失败")?;
        sink.send(line).await.context("写出事件失败")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::bridge::SessionStatus;
    use crate::models::ConnectionProfile;

    /// 收到 connect 时立即回报 connected
    struct EchoSink {
        bridge: Arc<EventBridge>,
        received: Mutex<Vec<BridgeCommand>>,
    }

    impl CommandSink for EchoSink {
        fn dispatch(&self, command: BridgeCommand) {
            if let BridgeCommand::Connect { session_id, .. } = &command {
                self.bridge.status(session_id, SessionStatus::Connected);
            }
            self.received.lock().unwrap().push(command);
        }
    }

    fn profiles() -> ProfilesConfig {
        ProfilesConfig {
            profiles: vec![ConnectionProfile {
                id: "nas".to_string(),
                name: "NAS".to_string(),
                host: "192.168.1.10".to_string(),
                port: 2222,
                username: "admin".to_string(),
                password: None,
                private_key_path: Some("/home/me/.ssh/id_ed25519".to_string()),
            }],
        }
    }

    #[test]
    fn test_parse_bridge_commands() {
        let command = parse_command(
            r#"{"type":"resize","session_id":"s1","cols":120,"rows":40}"#,
            &ProfilesConfig::default(),
        )
        .unwrap();
        assert!(matches!(
            command,
            BridgeCommand::Resize { cols: 120, rows: 40, .. }
        ));

        assert!(parse_command(r#"{"type":"reboot"}"#, &ProfilesConfig::default()).is_err());
        assert!(parse_command("not json", &ProfilesConfig::default()).is_err());
    }

    #[test]
    fn test_parse_connect_profile() {
        let command = parse_command(
            r#"{"type":"connect_profile","session_id":"s9","profile_id":"nas"}"#,
            &profiles(),
        )
        .unwrap();
        match command {
            BridgeCommand::Connect { session_id, config } => {
                assert_eq!(session_id, "s9");
                assert_eq!(config.host, "192.168.1.10");
                assert_eq!(config.port(), 2222);
                assert_eq!(
                    config.private_key.as_deref(),
                    Some("/home/me/.ssh/id_ed25519")
                );
            }
            other => panic!("unexpected {:?}", other),
        }

        let missing = parse_command(
            r#"{"type":"connect_profile","session_id":"s9","profile_id":"nope"}"#,
            &profiles(),
        );
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn test_events_after_input_closed_are_still_written() {
        let bridge = Arc::new(EventBridge::new());
        let sink = Arc::new(EchoSink {
            bridge: bridge.clone(),
            received: Mutex::new(Vec::new()),
        });

        let (mut client, input) = tokio::io::duplex(64 * 1024);
        let (output, mut reader) = tokio::io::duplex(64 * 1024);

        client
            .write_all(
                concat!(
                    r#"{"type":"connect","session_id":"s1","config":{"host":"h","username":"u"}}"#,
                    "\n",
                    "garbage\n",
                    "\n",
                    r#"{"type":"write","session_id":"s1","data":"ls\n"}"#,
                    "\n",
                )
                .as_bytes(),
            )
            .await
            .unwrap();
        drop(client);

        let events = EventOutput::start(bridge.clone(), output);
        serve(sink.clone(), ProfilesConfig::default(), input)
            .await
            .unwrap();

        // 输入结束后仍在关闭的会话
        bridge.status("s1", SessionStatus::Disconnected);
        events.finish().await.unwrap();

        let received = sink.received.lock().unwrap();
        assert_eq!(received.len(), 2);
        assert!(matches!(&received[1], BridgeCommand::Write { data, .. } if data == "ls\n"));

        let mut written = String::new();
        reader.read_to_string(&mut written).await.unwrap();
        assert_eq!(
            written,
            concat!(
                "{\"type\":\"status\",\"session_id\":\"s1\",\"status\":\"connected\"}\n",
                "{\"type\":\"status\",\"session_id\":\"s1\",\"status\":\"disconnected\"}\n",
            )
        );
        assert_eq!(bridge.subscriber_count(), 0);
    }
}
