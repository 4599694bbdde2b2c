//! SSH server for the gateway
//!
//! Accepts password-authenticated SSH connections and runs the file
//! protocol subsystem over their session channels.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use hinnat_vfs::{Backends, Identity};
use russh::keys::ssh_key::LineEnding;
use russh::keys::{Algorithm, PrivateKey};
use russh::server::{self, Auth, Msg, Server as _, Session};
use russh::{Channel, ChannelId};
use tokio::net::TcpListener;

use crate::auth::Authenticator;
use crate::constants::{SFTP_SUBSYSTEM, SSH_AUTH_REJECTION_DELAY, SSH_INACTIVITY_TIMEOUT};
use crate::sftp::SftpSession;

/// Load the host key at `path`, generating an Ed25519 key there if the file
/// doesn't exist yet.
pub fn load_or_generate_host_key(path: &Path) -> anyhow::Result<PrivateKey> {
    if path.exists() {
        let key = russh::keys::load_secret_key(path, None)
            .map_err(|e| anyhow::anyhow!("failed to load host key {}: {}", path.display(), e))?;
        tracing::info!(path = %path.display(), "loaded host key");
        return Ok(key);
    }

    let key = PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519)
        .map_err(|e| anyhow::anyhow!("failed to generate host key: {}", e))?;
    let pem = key
        .to_openssh(LineEnding::LF)
        .map_err(|e| anyhow::anyhow!("failed to encode host key: {}", e))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    write_private(path, pem.as_bytes())?;
    tracing::info!(path = %path.display(), "generated new host key");
    Ok(key)
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

/// SSH server configuration
#[derive(Clone)]
pub struct SshServerConfig {
    pub bind_addr: SocketAddr,
    pub host_key: PrivateKey,
}

impl SshServerConfig {
    /// Create config with an ephemeral key (for testing)
    pub fn ephemeral(port: u16) -> anyhow::Result<Self> {
        let host_key = PrivateKey::random(&mut rand::thread_rng(), Algorithm::Ed25519)
            .map_err(|e| anyhow::anyhow!("failed to generate host key: {}", e))?;
        Ok(Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], port)),
            host_key,
        })
    }
}

/// SSH server
pub struct SshServer {
    config: SshServerConfig,
    backends: Backends,
    authenticator: Arc<dyn Authenticator>,
}

impl SshServer {
    pub fn new(
        config: SshServerConfig,
        backends: Backends,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            config,
            backends,
            authenticator,
        }
    }

    /// Bind the configured address and serve until the listener fails.
    pub async fn run(&self) -> Result<(), std::io::Error> {
        let socket = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(socket).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(&self, socket: TcpListener) -> Result<(), std::io::Error> {
        let config = russh::server::Config {
            auth_rejection_time: SSH_AUTH_REJECTION_DELAY,
            auth_rejection_time_initial: Some(std::time::Duration::from_secs(0)),
            inactivity_timeout: Some(SSH_INACTIVITY_TIMEOUT),
            keys: vec![self.config.host_key.clone()],
            ..Default::default()
        };

        tracing::info!(
            addr = %socket.local_addr()?,
            auth = self.authenticator.name(),
            "SSH server listening"
        );

        let mut server = Server {
            backends: self.backends.clone(),
            authenticator: self.authenticator.clone(),
        };
        server
            .run_on_socket(Arc::new(config), &socket)
            .await
            .map_err(std::io::Error::other)
    }
}

/// Server factory - creates handlers for each connection
struct Server {
    backends: Backends,
    authenticator: Arc<dyn Authenticator>,
}

impl server::Server for Server {
    type Handler = ConnectionHandler;

    fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> Self::Handler {
        tracing::debug!(peer = ?peer_addr, "new connection");
        ConnectionHandler {
            peer: peer_addr,
            backends: self.backends.clone(),
            authenticator: self.authenticator.clone(),
            identity: None,
            channels: HashMap::new(),
        }
    }

    fn handle_session_error(&mut self, error: <Self::Handler as server::Handler>::Error) {
        tracing::error!("session error: {:?}", error);
    }
}

/// Handler for a single SSH connection
struct ConnectionHandler {
    peer: Option<SocketAddr>,
    backends: Backends,
    authenticator: Arc<dyn Authenticator>,
    identity: Option<Identity>,
    /// Session channels not yet handed to a subsystem.
    channels: HashMap<ChannelId, Channel<Msg>>,
}

fn reject() -> Auth {
    Auth::Reject {
        proceed_with_methods: None,
        partial_success: false,
    }
}

impl server::Handler for ConnectionHandler {
    type Error = russh::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        match self.authenticator.authenticate(user, password).await {
            Ok(identity) => {
                tracing::info!(user = %identity, peer = ?self.peer, "authenticated");
                self.identity = Some(identity);
                Ok(Auth::Accept)
            }
            Err(e) => {
                tracing::warn!(user = %user, peer = ?self.peer, "authentication failed: {}", e);
                Ok(reject())
            }
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        if self.identity.is_none() {
            tracing::warn!(peer = ?self.peer, "session channel refused before authentication");
            return Ok(false);
        }
        tracing::debug!(channel = %channel.id(), "session channel opened");
        self.channels.insert(channel.id(), channel);
        Ok(true)
    }

    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let identity = match &self.identity {
            Some(identity) if name == SFTP_SUBSYSTEM => identity.clone(),
            _ => {
                tracing::warn!(subsystem = %name, peer = ?self.peer, "subsystem refused");
                session.channel_failure(channel_id)?;
                return Ok(());
            }
        };
        let Some(channel) = self.channels.remove(&channel_id) else {
            tracing::warn!(channel = %channel_id, "subsystem request on unknown channel");
            session.channel_failure(channel_id)?;
            return Ok(());
        };

        session.channel_success(channel_id)?;
        tracing::info!(user = %identity, "file session started");
        let handler = SftpSession::new(self.backends.session(identity));
        russh_sftp::server::run(channel.into_stream(), handler).await;
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::debug!(channel = %channel, "channel closed");
        self.channels.remove(&channel);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_key_generated_then_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys").join("host_key");

        let first = load_or_generate_host_key(&path).unwrap();
        assert!(path.exists());
        let second = load_or_generate_host_key(&path).unwrap();
        assert_eq!(first.public_key(), second.public_key());
    }

    #[cfg(unix)]
    #[test]
    fn test_host_key_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host_key");
        load_or_generate_host_key(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_corrupt_host_key_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host_key");
        std::fs::write(&path, "not a key").unwrap();
        assert!(load_or_generate_host_key(&path).is_err());
    }

    #[test]
    fn test_ephemeral_config() {
        let config = SshServerConfig::ephemeral(0).unwrap();
        assert!(config.bind_addr.ip().is_loopback());
    }
}
