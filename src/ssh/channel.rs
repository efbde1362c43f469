// 终端通道
//
// russh 通道拆成读写两半，分离读写路径以避免死锁：
// 写入等待远端窗口时，读半仍能持续收到输出。

use async_trait::async_trait;
use russh::client::Msg;
use russh::{Channel, ChannelMsg, ChannelReadHalf, ChannelWriteHalf};
use tracing::{debug, trace};

use super::error::SshError;
use super::transport::{Shell, ShellEvent, ShellReader, ShellWriter};

/// 拆分已打开 PTY shell 的通道
pub fn split_shell(channel: Channel<Msg>) -> Shell {
    let (read_half, write_half) = channel.split();
    Shell {
        reader: Box::new(TerminalReader { read_half }),
        writer: Box::new(TerminalWriter { write_half }),
    }
}

/// 终端读半，由会话任务独占
pub struct TerminalReader {
    read_half: ChannelReadHalf,
}

#[async_trait]
impl ShellReader for TerminalReader {
    async fn recv(&mut self) -> ShellEvent {
        loop {
            match self.read_half.wait().await {
                Some(ChannelMsg::Data { data }) => return ShellEvent::Data(data.to_vec()),
                Some(ChannelMsg::ExtendedData { data, .. }) => {
                    return ShellEvent::Data(data.to_vec())
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    debug!("[SSH] Remote shell exited with status {}", exit_status);
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    return ShellEvent::Closed
                }
                Some(other) => trace!("[SSH] Ignoring channel message {:?}", other),
            }
        }
    }
}

/// 终端写半，由会话的写任务独占
pub struct TerminalWriter {
    write_half: ChannelWriteHalf<Msg>,
}

#[async_trait]
impl ShellWriter for TerminalWriter {
    async fn write(&mut self, data: &[u8]) -> Result<(), SshError> {
        self.write_half
            .data(data)
            .await
            .map_err(|e| SshError::Channel(e.to_string()))
    }

    async fn resize(&mut self, cols: u32, rows: u32) -> Result<(), SshError> {
        self.write_half
            .window_change(cols, rows, 0, 0)
            .await
            .map_err(|e| SshError::Channel(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.write_half.eof().await;
        let _ = self.write_half.close().await;
    }
}
