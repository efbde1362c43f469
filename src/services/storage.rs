// 本地数据持久化服务

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::{AppSettings, ProfilesConfig};

/// 获取配置目录路径
/// macOS: ~/Library/Application Support/sshdeck
/// Linux: ~/.config/sshdeck
/// Windows: C:\Users\<用户名>\AppData\Roaming\sshdeck
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("无法获取系统配置目录")?
        .join("sshdeck");
    if !config_dir.exists() {
        fs::create_dir_all(&config_dir).context("无法创建配置目录")?;
    }
    Ok(config_dir)
}

// ======================== Settings 配置持久化 ========================

/// 获取设置配置文件路径
pub fn get_settings_file() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("settings.json"))
}

/// 加载应用设置
pub fn load_settings() -> Result<AppSettings> {
    load_settings_from(&get_settings_file()?)
}

/// 从指定文件加载设置，文件不存在时返回默认值
pub fn load_settings_from(path: &Path) -> Result<AppSettings> {
    if !path.exists() {
        return Ok(AppSettings::default());
    }
    let content = fs::read_to_string(path).context("无法读取设置配置文件")?;
    let settings: AppSettings = serde_json::from_str(&content).context("无法解析设置配置文件")?;
    Ok(settings)
}

// ======================== 连接档案 ========================
// 档案由外部安全存储解密后写入此文件，核心会话逻辑从不读取它。

/// 获取连接档案文件路径
pub fn get_profiles_file() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("profiles.json"))
}

/// 加载连接档案
pub fn load_profiles() -> Result<ProfilesConfig> {
    load_profiles_from(&get_profiles_file()?)
}

pub fn load_profiles_from(path: &Path) -> Result<ProfilesConfig> {
    if !path.exists() {
        return Ok(ProfilesConfig::default());
    }
    let content = fs::read_to_string(path).context("无法读取连接档案文件")?;
    let config: ProfilesConfig =
        serde_json::from_str(&content).context("无法解析连接档案文件")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_settings_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from(&dir.path().join("settings.json")).unwrap();
        assert_eq!(settings.terminal.scrollback_limit, 100_000);
        assert_eq!(settings.connection.keepalive_interval_secs, 10);
    }

    #[test]
    fn test_settings_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = AppSettings::default();
        settings.connection.keepalive_interval_secs = 0;
        settings.terminal.scrollback_limit = 2048;
        fs::write(&path, serde_json::to_string_pretty(&settings).unwrap()).unwrap();

        let loaded = load_settings_from(&path).unwrap();
        assert_eq!(loaded.connection.keepalive_interval_secs, 0);
        assert_eq!(loaded.terminal.scrollback_limit, 2048);
    }

    #[test]
    fn test_corrupt_settings_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(load_settings_from(&path).is_err());
    }

    #[test]
    fn test_load_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        fs::write(
            &path,
            r#"{ "profiles": [
                { "id": "a", "name": "A", "host": "h1", "port": 2222, "username": "root" }
            ] }"#,
        )
        .unwrap();

        let profiles = load_profiles_from(&path).unwrap();
        let profile = profiles.find("a").unwrap();
        assert_eq!(profile.port, 2222);
        assert!(profiles.find("missing").is_none());
    }
}
