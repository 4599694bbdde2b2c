//! Authenticated session principal.

use std::fmt;

/// The authenticated principal for one session.
///
/// Created by the authenticator and owned by the session for its whole
/// lifetime. The credential is an opaque token that remote adapters forward
/// to their backend; it is never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    username: String,
    credential: String,
}

impl Identity {
    pub fn new(username: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            credential: credential.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("username", &self.username)
            .field("credential", &"<redacted>")
            .finish()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.username)
    }
}
