// SSH 客户端核心实现

use std::borrow::Borrow;
use std::sync::Arc;
use std::time::Duration;

use russh::client::{AuthResult, Handle, KeyboardInteractiveAuthResponse};
use russh::MethodKind;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::config::SshConfig;
use super::error::SshError;
use super::handler::SshClientHandler;
use super::session::SshSession;

/// keyboard-interactive 最多应答轮数
const MAX_INTERACTIVE_ROUNDS: usize = 5;

/// 与 OpenSSH 客户端一致的认证失败提示
const AUTH_FAILED: &str = "All configured authentication methods failed";

/// SSH 客户端
/// 负责建立 SSH 连接并返回 SshSession；单次尝试，重试由会话桥负责
pub struct SshClient {
    /// 连接配置
    config: SshConfig,
}

impl SshClient {
    /// 创建新的 SSH 客户端
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    fn label(&self) -> String {
        format!(
            "{}@{}:{}",
            self.config.username, self.config.host, self.config.port
        )
    }

    /// 执行连接（异步）
    /// TCP 连接、握手、认证共用一个超时
    pub async fn connect(&self) -> Result<SshSession, SshError> {
        let limit = self.config.handshake_timeout;
        timeout(Duration::from_secs(limit), self.connect_inner())
            .await
            .map_err(|_| SshError::Timeout(limit))?
    }

    async fn connect_inner(&self) -> Result<SshSession, SshError> {
        let label = self.label();
        info!("[SSH] [{}] Connecting...", label);

        let tcp_stream =
            TcpStream::connect((self.config.host.as_str(), self.config.port)).await?;
        debug!("[SSH] [{}] TCP connection established", label);

        let russh_config = Arc::new(self.config.to_russh_config());
        let handler = SshClientHandler::new(label.clone());

        let mut handle = russh::client::connect_stream(russh_config, tcp_stream, handler)
            .await
            .map_err(SshError::from)?;
        debug!("[SSH] [{}] SSH handshake completed", label);

        self.authenticate(&mut handle).await?;
        info!("[SSH] [{}] Authentication successful", label);

        Ok(SshSession::new(
            Arc::new(handle),
            label,
            self.config.term.clone(),
        ))
    }

    /// 执行认证
    /// 先尝试密码；服务器要求 keyboard-interactive 时用同一密码应答所有提示
    async fn authenticate(&self, handle: &mut Handle<SshClientHandler>) -> Result<(), SshError> {
        let username = &self.config.username;
        let password = &self.config.password;

        debug!("[SSH] Using password authentication");
        let remaining = match handle
            .authenticate_password(username, password)
            .await
            .map_err(SshError::from)?
        {
            AuthResult::Success => return Ok(()),
            AuthResult::Failure {
                remaining_methods, ..
            } => remaining_methods,
        };

        if !offers_method(remaining.iter(), &MethodKind::KeyboardInteractive) {
            return Err(SshError::Auth(AUTH_FAILED.to_string()));
        }

        debug!("[SSH] Falling back to keyboard-interactive authentication");
        let mut challenge: Challenge = handle
            .authenticate_keyboard_interactive_start(username, None::<String>)
            .await
            .map_err(SshError::from)?
            .into();

        let mut round = 0;
        loop {
            match next_interactive_step(round, challenge, password)? {
                InteractiveStep::Done => return Ok(()),
                InteractiveStep::Respond(responses) => {
                    challenge = handle
                        .authenticate_keyboard_interactive_respond(responses)
                        .await
                        .map_err(SshError::from)?
                        .into();
                    round += 1;
                }
            }
        }
    }
}

/// keyboard-interactive 服务器的一轮答复
#[derive(Debug, PartialEq, Eq)]
enum Challenge {
    Accepted,
    Rejected,
    /// 服务器发来 N 个提示
    Prompts(usize),
}

impl From<KeyboardInteractiveAuthResponse> for Challenge {
    fn from(reply: KeyboardInteractiveAuthResponse) -> Self {
        match reply {
            KeyboardInteractiveAuthResponse::Success => Challenge::Accepted,
            KeyboardInteractiveAuthResponse::Failure { .. } => Challenge::Rejected,
            KeyboardInteractiveAuthResponse::InfoRequest { prompts, .. } => {
                Challenge::Prompts(prompts.len())
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum InteractiveStep {
    Done,
    Respond(Vec<String>),
}

/// round 为已应答的轮数
fn next_interactive_step(
    round: usize,
    challenge: Challenge,
    password: &str,
) -> Result<InteractiveStep, SshError> {
    match challenge {
        Challenge::Accepted => Ok(InteractiveStep::Done),
        Challenge::Rejected => Err(SshError::Auth(AUTH_FAILED.to_string())),
        Challenge::Prompts(_) if round >= MAX_INTERACTIVE_ROUNDS => {
            warn!("[SSH] Keyboard-interactive exceeded {} rounds", MAX_INTERACTIVE_ROUNDS);
            Err(SshError::Auth(AUTH_FAILED.to_string()))
        }
        Challenge::Prompts(count) => {
            debug!("[SSH] Keyboard-interactive challenge with {} prompt(s)", count);
            Ok(InteractiveStep::Respond(interactive_responses(count, password)))
        }
    }
}

/// 每个提示都用同一密码应答；零个提示时回复空列表
fn interactive_responses(prompt_count: usize, password: &str) -> Vec<String> {
    vec![password.to_string(); prompt_count]
}

fn offers_method<I>(methods: I, target: &MethodKind) -> bool
where
    I: IntoIterator,
    I::Item: Borrow<MethodKind>,
{
    methods.into_iter().any(|m| m.borrow() == target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_prompt_gets_the_password() {
        assert_eq!(interactive_responses(2, "s3cret"), vec!["s3cret", "s3cret"]);
        assert!(interactive_responses(0, "s3cret").is_empty());
    }

    #[test]
    fn test_offers_method() {
        let methods = [MethodKind::PublicKey, MethodKind::KeyboardInteractive];
        assert!(offers_method(methods.iter(), &MethodKind::KeyboardInteractive));
        assert!(!offers_method(
            [MethodKind::PublicKey].iter(),
            &MethodKind::KeyboardInteractive
        ));
        assert!(!offers_method(
            Vec::<MethodKind>::new(),
            &MethodKind::KeyboardInteractive
        ));
    }

    #[test]
    fn test_interactive_prompts_are_answered() {
        assert_eq!(
            next_interactive_step(0, Challenge::Prompts(1), "pw").unwrap(),
            InteractiveStep::Respond(vec!["pw".to_string()])
        );
        // 零提示的 InfoRequest 也要回复，服务器据此推进
        assert_eq!(
            next_interactive_step(1, Challenge::Prompts(0), "pw").unwrap(),
            InteractiveStep::Respond(vec![])
        );
        assert_eq!(
            next_interactive_step(2, Challenge::Accepted, "pw").unwrap(),
            InteractiveStep::Done
        );
    }

    #[test]
    fn test_interactive_rejection_fails_auth() {
        let err = next_interactive_step(0, Challenge::Rejected, "pw").unwrap_err();
        assert_eq!(err.to_string(), "All configured authentication methods failed");
    }

    #[test]
    fn test_interactive_round_cap() {
        assert!(next_interactive_step(MAX_INTERACTIVE_ROUNDS - 1, Challenge::Prompts(1), "pw").is_ok());
        let err =
            next_interactive_step(MAX_INTERACTIVE_ROUNDS, Challenge::Prompts(1), "pw").unwrap_err();
        assert!(matches!(err, SshError::Auth(_)));
        // 最后一轮应答后的成功仍然有效
        assert_eq!(
            next_interactive_step(MAX_INTERACTIVE_ROUNDS, Challenge::Accepted, "pw").unwrap(),
            InteractiveStep::Done
        );
    }
}
