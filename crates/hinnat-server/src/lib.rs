//! Hinnat server library
//!
//! SSH + SFTP gateway serving the hinnat virtual filesystem.

pub mod auth;
pub mod backends;
pub mod config;
pub mod constants;
pub mod sftp;
pub mod ssh;

pub use auth::{AuthError, Authenticator, User, UserDb, WebAuthenticator};
pub use backends::{build_authenticator, build_backends};
pub use config::{Config, ConfigError};
pub use sftp::SftpSession;
pub use ssh::{SshServer, SshServerConfig, load_or_generate_host_key};
