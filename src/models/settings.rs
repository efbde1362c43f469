// Settings 配置数据结构

use serde::{Deserialize, Serialize};

// ======================== 主配置结构 ========================

/// 应用设置（持久化用）
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub connection: ConnectionSettings,
    pub terminal: TerminalSettings,
}

// ======================== 连接设置 ========================

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// 握手 + 认证的总超时
    pub connection_timeout_secs: u32,
    /// 心跳间隔，0 表示关闭
    pub keepalive_interval_secs: u32,
    /// 连续多少次心跳无响应后判定断开
    pub keepalive_max: u32,
    /// 主动断开时等待对端关闭的上限
    pub close_timeout_secs: u32,
    pub algorithms: AlgorithmSettings,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connection_timeout_secs: 30,
            keepalive_interval_secs: 10,
            keepalive_max: 3,
            close_timeout_secs: 5,
            algorithms: AlgorithmSettings::default(),
        }
    }
}

/// 协商算法列表
///
/// 默认值刻意包含旧算法（group1/group14-sha1、CBC、ssh-rsa），
/// 否则很多 NAS 固件上的老 sshd 无法完成协商。
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AlgorithmSettings {
    pub kex: Vec<String>,
    pub cipher: Vec<String>,
    pub host_key: Vec<String>,
    pub mac: Vec<String>,
}

impl Default for AlgorithmSettings {
    fn default() -> Self {
        Self {
            kex: to_strings(&[
                "curve25519-sha256",
                "curve25519-sha256@libssh.org",
                "ecdh-sha2-nistp256",
                "ecdh-sha2-nistp384",
                "ecdh-sha2-nistp521",
                "diffie-hellman-group-exchange-sha256",
                "diffie-hellman-group16-sha512",
                "diffie-hellman-group14-sha256",
                "diffie-hellman-group14-sha1",
                "diffie-hellman-group-exchange-sha1",
                "diffie-hellman-group1-sha1",
            ]),
            cipher: to_strings(&[
                "chacha20-poly1305@openssh.com",
                "aes128-ctr",
                "aes192-ctr",
                "aes256-ctr",
                "aes128-gcm@openssh.com",
                "aes256-gcm@openssh.com",
                "aes128-cbc",
                "aes192-cbc",
                "aes256-cbc",
                "3des-cbc",
            ]),
            host_key: to_strings(&[
                "ssh-ed25519",
                "ecdsa-sha2-nistp256",
                "ecdsa-sha2-nistp384",
                "ecdsa-sha2-nistp521",
                "rsa-sha2-512",
                "rsa-sha2-256",
                "ssh-rsa",
                "ssh-dss",
            ]),
            mac: to_strings(&[
                "hmac-sha2-256-etm@openssh.com",
                "hmac-sha2-512-etm@openssh.com",
                "hmac-sha2-256",
                "hmac-sha2-512",
                "hmac-sha1-etm@openssh.com",
                "hmac-sha1",
            ]),
        }
    }
}

fn to_strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

// ======================== 终端设置 ========================

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalSettings {
    /// 每个会话保留的输出字符数
    pub scrollback_limit: usize,
    /// 调试日志环保留的行数
    pub debug_log_limit: usize,
    pub term: String,
    pub default_cols: u32,
    pub default_rows: u32,
    // 前端几何计算
    pub cell_width: f32,
    pub line_height: f32,
    pub padding_left: f32,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            scrollback_limit: 100_000,
            debug_log_limit: 50,
            term: "xterm-256color".to_string(),
            default_cols: 80,
            default_rows: 24,
            cell_width: 8.4,
            line_height: 17.0,
            padding_left: 8.0,
        }
    }
}
