//! Remote shell execution over SSH.
//!
//! Every call opens a fresh password-authenticated session, runs exactly one
//! command, and returns stdout followed by stderr as a single string. Both the
//! connection and the whole command are bounded by timeouts so a stuck host
//! cannot stall a polling cycle.

use async_trait::async_trait;
use russh::client;
use russh::{ChannelMsg, Disconnect};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ShellError {
    #[error("connection to {host} failed: {reason}")]
    Connect { host: String, reason: String },

    #[error("authentication failed for {user}@{host}")]
    Auth { user: String, host: String },

    #[error("could not run command on {host}: {reason}")]
    Channel { host: String, reason: String },

    #[error("{host} timed out after {timeout:?}")]
    Timeout { host: String, timeout: Duration },

    #[error("ssh protocol error: {0}")]
    Russh(#[from] russh::Error),
}

/// Executes one command on a remote host.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    async fn run(
        &self,
        command: &str,
        host: &str,
        username: &str,
        password: &str,
    ) -> Result<String, ShellError>;
}

#[derive(Debug, Clone)]
pub struct ShellSettings {
    pub port: u16,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for ShellSettings {
    fn default() -> Self {
        ShellSettings {
            port: 22,
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
        }
    }
}

struct AcceptAnyHostKey;

#[async_trait]
impl client::Handler for AcceptAnyHostKey {
    type Error = ShellError;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh_keys::key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// [`RemoteShell`] backed by `russh`.
pub struct SshShell {
    settings: ShellSettings,
}

impl SshShell {
    pub fn new(settings: ShellSettings) -> Self {
        SshShell { settings }
    }

    async fn connect(
        &self,
        host: &str,
        username: &str,
        password: &str,
    ) -> Result<client::Handle<AcceptAnyHostKey>, ShellError> {
        let config = Arc::new(client::Config::default());
        let addr = (host, self.settings.port);

        let mut handle = match tokio::time::timeout(
            self.settings.connect_timeout,
            client::connect(config, addr, AcceptAnyHostKey),
        )
        .await
        {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                return Err(ShellError::Connect {
                    host: host.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(ShellError::Timeout {
                    host: host.to_string(),
                    timeout: self.settings.connect_timeout,
                })
            }
        };

        let authenticated = handle
            .authenticate_password(username, password)
            .await
            .map_err(|e| ShellError::Connect {
                host: host.to_string(),
                reason: e.to_string(),
            })?;
        if !authenticated {
            return Err(ShellError::Auth {
                user: username.to_string(),
                host: host.to_string(),
            });
        }
        Ok(handle)
    }

    async fn exec(
        handle: &client::Handle<AcceptAnyHostKey>,
        host: &str,
        command: &str,
    ) -> Result<String, ShellError> {
        let channel_err = |e: russh::Error| ShellError::Channel {
            host: host.to_string(),
            reason: e.to_string(),
        };
        let mut channel = handle.channel_open_session().await.map_err(channel_err)?;
        channel.exec(true, command).await.map_err(channel_err)?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, .. } => stderr.extend_from_slice(&data),
                ChannelMsg::Eof | ChannelMsg::Close => break,
                _ => {}
            }
        }
        stdout.extend_from_slice(&stderr);
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn run(
        &self,
        command: &str,
        host: &str,
        username: &str,
        password: &str,
    ) -> Result<String, ShellError> {
        debug!(host, command, "running remote command");
        let handle = self.connect(host, username, password).await?;

        let result = tokio::time::timeout(
            self.settings.command_timeout,
            Self::exec(&handle, host, command),
        )
        .await;

        // Best effort; the session is discarded either way.
        let _ = handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;

        match result {
            Ok(output) => output,
            Err(_) => Err(ShellError::Timeout {
                host: host.to_string(),
                timeout: self.settings.command_timeout,
            }),
        }
    }
}
