// SSH 连接配置

use std::borrow::Cow;
use std::time::Duration;

use russh::keys::ssh_key::{Algorithm, EcdsaCurve, HashAlg};
use russh::{cipher, kex, mac, Preferred};

use crate::models::settings::ConnectionSettings;
use crate::models::ConnectionProfile;

/// SSH 连接配置
#[derive(Clone, Debug)]
pub struct SshConfig {
    /// 目标主机
    pub host: String,
    /// 端口
    pub port: u16,
    /// 用户名
    pub username: String,
    /// 密码（同时用于 keyboard-interactive 应答）
    pub password: String,
    /// 终端类型
    pub term: String,
    /// 握手 + 认证超时（秒）
    pub handshake_timeout: u64,
    /// 心跳配置
    pub keepalive: KeepaliveConfig,
}

/// 心跳配置
#[derive(Clone, Debug)]
pub struct KeepaliveConfig {
    /// 是否启用心跳
    pub enabled: bool,
    /// 心跳间隔（秒）
    pub interval: u64,
    /// 连续无响应次数上限
    pub max_retries: usize,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: crate::constants::DEFAULT_KEEPALIVE_INTERVAL_SECS,
            max_retries: crate::constants::DEFAULT_KEEPALIVE_MAX,
        }
    }
}

impl SshConfig {
    /// 由浏览器提交的连接参数和服务端连接设置构建
    pub fn from_profile(profile: &ConnectionProfile, settings: &ConnectionSettings) -> Self {
        Self {
            host: profile.host.trim().to_string(),
            port: profile.port,
            username: profile.username.clone(),
            password: profile.password.clone(),
            term: settings.term.clone(),
            handshake_timeout: settings.handshake_timeout_secs,
            keepalive: KeepaliveConfig {
                enabled: settings.keepalive_interval_secs > 0,
                interval: settings.keepalive_interval_secs,
                max_retries: settings.keepalive_max,
            },
        }
    }

    /// 构建 russh 配置
    pub fn to_russh_config(&self) -> russh::client::Config {
        let mut config = russh::client::Config {
            preferred: preferred_algorithms(),
            nodelay: true,
            ..Default::default()
        };
        // 交互式 Shell 可能长时间空闲，靠心跳而不是不活动超时判断断线
        config.inactivity_timeout = None;
        if self.keepalive.enabled {
            config.keepalive_interval = Some(Duration::from_secs(self.keepalive.interval));
            config.keepalive_max = self.keepalive.max_retries;
        }
        config
    }
}

/// 算法协商列表：现代算法优先，旧服务器兼容算法兜底
pub fn preferred_algorithms() -> Preferred {
    Preferred {
        kex: Cow::Owned(vec![
            kex::CURVE25519,
            kex::CURVE25519_PRE_RFC_8731,
            kex::ECDH_SHA2_NISTP256,
            kex::ECDH_SHA2_NISTP384,
            kex::ECDH_SHA2_NISTP521,
            kex::DH_GEX_SHA256,
            kex::DH_G14_SHA256,
            kex::DH_G14_SHA1,
            kex::DH_G1_SHA1,
            kex::EXTENSION_SUPPORT_AS_CLIENT,
            kex::EXTENSION_OPENSSH_STRICT_KEX_AS_CLIENT,
        ]),
        key: Cow::Owned(vec![
            Algorithm::Ed25519,
            Algorithm::Ecdsa {
                curve: EcdsaCurve::NistP256,
            },
            Algorithm::Ecdsa {
                curve: EcdsaCurve::NistP384,
            },
            Algorithm::Ecdsa {
                curve: EcdsaCurve::NistP521,
            },
            Algorithm::Rsa {
                hash: Some(HashAlg::Sha512),
            },
            Algorithm::Rsa {
                hash: Some(HashAlg::Sha256),
            },
            Algorithm::Rsa { hash: None },
        ]),
        cipher: Cow::Owned(vec![
            cipher::CHACHA20_POLY1305,
            cipher::AES_256_GCM,
            cipher::AES_128_CTR,
            cipher::AES_192_CTR,
            cipher::AES_256_CTR,
            cipher::AES_256_CBC,
            cipher::AES_192_CBC,
            cipher::AES_128_CBC,
        ]),
        mac: Cow::Owned(vec![
            mac::HMAC_SHA256_ETM,
            mac::HMAC_SHA512_ETM,
            mac::HMAC_SHA256,
            mac::HMAC_SHA512,
            mac::HMAC_SHA1_ETM,
            mac::HMAC_SHA1,
        ]),
        ..Default::default()
    }
}
