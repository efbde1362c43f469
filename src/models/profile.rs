// 连接档案（持久化用）

use serde::{Deserialize, Serialize};

use crate::ssh::ConnectConfig;

/// 已保存的 SSH 连接档案
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionProfile {
    pub id: String,
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<String>,
}

fn default_port() -> u16 {
    22
}

impl From<ConnectionProfile> for ConnectConfig {
    fn from(profile: ConnectionProfile) -> Self {
        ConnectConfig {
            host: profile.host,
            port: Some(profile.port),
            username: profile.username,
            password: profile.password,
            private_key: profile.private_key_path,
        }
    }
}

/// 档案文件结构
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProfilesConfig {
    pub profiles: Vec<ConnectionProfile>,
}

impl ProfilesConfig {
    pub fn find(&self, id: &str) -> Option<&ConnectionProfile> {
        self.profiles.iter().find(|p| p.id == id)
    }
}
