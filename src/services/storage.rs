// 配置加载服务
//
// 读取顺序：内置默认值 -> settings.json -> 环境变量

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::AppSettings;

/// 显式指定配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "SHELLRELAY_CONFIG";

/// 获取配置目录路径
/// macOS: ~/Library/Application Support/shellrelay
/// Linux: ~/.config/shellrelay
/// Windows: C:\Users\<用户名>\AppData\Roaming\shellrelay
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("无法获取系统配置目录")?
        .join("shellrelay");
    Ok(config_dir)
}

/// 获取设置配置文件路径
pub fn get_settings_file() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    Ok(get_config_dir()?.join("settings.json"))
}

/// 加载应用设置（含环境变量覆盖）
pub fn load_settings() -> Result<AppSettings> {
    let path = get_settings_file()?;
    let mut settings = load_settings_from(&path)?;
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

/// 从指定文件加载设置；文件不存在时返回默认值
pub fn load_settings_from(path: &Path) -> Result<AppSettings> {
    if !path.exists() {
        tracing::debug!("[Config] {:?} not found, using defaults", path);
        return Ok(AppSettings::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("无法读取设置配置文件 {:?}", path))?;
    let settings: AppSettings = serde_json::from_str(&content)
        .with_context(|| format!("无法解析设置配置文件 {:?}", path))?;
    tracing::info!("[Config] Loaded settings from {:?}", path);
    Ok(settings)
}

/// 用环境变量覆盖设置
/// PORT / VPS_HOST / VPS_PORT / VPS_USER / VPS_PASSWORD
pub fn apply_env_overrides<F>(settings: &mut AppSettings, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup("PORT") {
        settings.server.port = parse_port("PORT", &port)?;
    }
    if let Some(host) = lookup("VPS_HOST") {
        settings.defaults.host = host;
    }
    if let Some(port) = lookup("VPS_PORT") {
        settings.defaults.port = parse_port("VPS_PORT", &port)?;
    }
    if let Some(user) = lookup("VPS_USER") {
        settings.defaults.username = user;
    }
    if let Some(password) = lookup("VPS_PASSWORD") {
        settings.defaults.password = password;
    }
    Ok(())
}

fn parse_port(key: &str, value: &str) -> Result<u16> {
    value
        .trim()
        .parse::<u16>()
        .with_context(|| format!("{} 不是有效端口: {:?}", key, value))
}
