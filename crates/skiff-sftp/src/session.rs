// ── SftpSession – transport lifecycle ────────────────────────────────────────

use crate::error::{SftpError, SftpResult};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use ssh2::Session;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

// ── Serde default helpers ────────────────────────────────────────────────────

fn default_port() -> u16 {
    22
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_keepalive_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SftpConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<String>,
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub use_agent: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
}

/// An authenticated SSH transport with one long-lived SFTP channel for
/// metadata work. Bulk transfers open their own channels (see `transfer.rs`).
pub struct SftpSession {
    pub(crate) session: Session,
    pub(crate) meta: ssh2::Sftp,
    #[allow(dead_code)] // held to keep the TCP connection alive
    tcp: TcpStream,
    /// Remote home directory, probed at connect.
    pub home: Option<String>,
    /// How the session authenticated, for diagnostics.
    pub auth_method: String,
}

impl SftpSession {
    pub fn connect(config: &SftpConfig) -> SftpResult<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        info!("sftp: connecting to {}", addr);

        let socket = addr
            .to_socket_addrs()
            .map_err(|e| SftpError::connect(format!("Cannot resolve '{}': {}", addr, e)))?
            .next()
            .ok_or_else(|| SftpError::connect(format!("No address for '{}'", addr)))?;

        let tcp = TcpStream::connect_timeout(&socket, Duration::from_secs(config.timeout_secs))
            .map_err(|e| SftpError::connect(format!("TCP connect to {} failed: {}", addr, e)))?;
        tcp.set_nonblocking(false)
            .map_err(|e| SftpError::connect(format!("Failed to set blocking mode: {}", e)))?;

        let mut session = Session::new()
            .map_err(|e| SftpError::connect(format!("Failed to create SSH session: {}", e)))?;
        session.set_tcp_stream(
            tcp.try_clone()
                .map_err(|e| SftpError::connect(e.to_string()))?,
        );
        session
            .handshake()
            .map_err(|e| SftpError::connect(format!("SSH handshake failed: {}", e)))?;

        let auth_method = authenticate(&mut session, config)?;
        if !session.authenticated() {
            return Err(SftpError::auth(
                "Not authenticated after auth attempt".to_string(),
            ));
        }
        info!("sftp: authenticated to {} via {}", addr, auth_method);

        if config.keepalive_secs > 0 {
            session.set_keepalive(true, config.keepalive_secs as u32);
        }

        let meta = session.sftp().map_err(SftpError::from)?;
        let home = meta
            .realpath(Path::new("."))
            .ok()
            .map(|p| p.to_string_lossy().to_string());

        Ok(Self { session, meta, tcp, home, auth_method })
    }

    /// Open a fresh SFTP channel for a bulk transfer.
    pub(crate) fn transfer_channel(&self) -> SftpResult<ssh2::Sftp> {
        self.session.sftp().map_err(SftpError::from)
    }

    /// Send a transport-level keepalive; reports whether the peer answered.
    pub fn ping(&self) -> bool {
        match self.session.keepalive_send() {
            Ok(_) => true,
            Err(e) => {
                warn!("sftp: keepalive failed: {}", e);
                false
            }
        }
    }

    pub fn disconnect(&self) {
        let _ = self
            .session
            .disconnect(None, "Client disconnecting", None);
        info!("sftp: session disconnected");
    }
}

// ── Authentication ───────────────────────────────────────────────────────────
//
// Priority: agent → private key (optionally with passphrase) → password,
// with a keyboard-interactive fallback for servers that reject plain
// password auth.

fn authenticate(session: &mut Session, config: &SftpConfig) -> SftpResult<String> {
    // 1. Agent
    if config.use_agent {
        if let Ok(mut agent) = session.agent() {
            if agent.connect().is_ok() {
                let _ = agent.list_identities();
                for identity in agent.identities().unwrap_or_default() {
                    if agent.userauth(&config.username, &identity).is_ok()
                        && session.authenticated()
                    {
                        return Ok("agent".to_string());
                    }
                }
            }
        }
        if config.password.is_none() && config.private_key_path.is_none() {
            return Err(SftpError::auth("SSH agent authentication failed"));
        }
    }

    // 2. Private-key file
    if let Some(ref key_path) = config.private_key_path {
        let path = Path::new(key_path);
        if !path.exists() {
            return Err(SftpError::auth(format!(
                "Private key '{}' is not readable",
                key_path
            )));
        }
        session
            .userauth_pubkey_file(&config.username, None, path, config.passphrase.as_deref())
            .map_err(|e| SftpError::auth(format!("Public-key auth failed: {}", e)))?;
        if session.authenticated() {
            return Ok("publickey".to_string());
        }
    }

    // 3. Password / keyboard-interactive
    if let Some(ref password) = config.password {
        if session
            .userauth_password(&config.username, password)
            .is_ok()
            && session.authenticated()
        {
            return Ok("password".to_string());
        }

        struct KbdHandler {
            password: String,
        }
        impl ssh2::KeyboardInteractivePrompt for KbdHandler {
            fn prompt(
                &mut self,
                _username: &str,
                _instructions: &str,
                prompts: &[ssh2::Prompt],
            ) -> Vec<String> {
                prompts.iter().map(|_| self.password.clone()).collect()
            }
        }
        let mut handler = KbdHandler { password: password.clone() };
        if session
            .userauth_keyboard_interactive(&config.username, &mut handler)
            .is_ok()
            && session.authenticated()
        {
            return Ok("keyboard-interactive".to_string());
        }
    }

    Err(SftpError::auth("No authentication method succeeded"))
}
