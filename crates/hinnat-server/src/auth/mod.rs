//! Password authentication.
//!
//! An [`Authenticator`] turns a username/password pair into an [`Identity`].
//! Sessions never see a dispatcher until this succeeds.

mod db;
mod web;

use async_trait::async_trait;
use hinnat_vfs::Identity;
use thiserror::Error;

pub use db::{User, UserDb};
pub use web::WebAuthenticator;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown user, wrong password or inactive account.
    #[error("invalid credentials for {0}")]
    InvalidCredentials(String),

    /// The login API answered but refused.
    #[error("login rejected: {0}")]
    Rejected(String),

    #[error("authentication backend unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("password hashing error: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("login request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Verifies passwords and issues session identities.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    async fn authenticate(&self, username: &str, password: &str) -> Result<Identity, AuthError>;
}
