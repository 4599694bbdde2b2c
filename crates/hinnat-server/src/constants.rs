//! Server configuration constants.
//!
//! Centralizes hardcoded values for easier configuration and documentation.

use std::time::Duration;

/// Default SSH port for the gateway.
pub const DEFAULT_SSH_PORT: u16 = 2222;

/// Default bind address (all interfaces; the gateway serves remote clients).
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";

/// Default host key location.
pub const DEFAULT_HOST_KEY_PATH: &str = "./host_key";

/// Default SQLite database holding users and incoming files.
pub const DEFAULT_DATABASE_PATH: &str = "./hinnat.db";

/// Default root directory of the local object store.
pub const DEFAULT_OBJECT_ROOT: &str = "./pricelists";

/// SSH authentication rejection delay (prevents timing attacks).
pub const SSH_AUTH_REJECTION_DELAY: Duration = Duration::from_secs(1);

/// Idle SSH connections are closed after this long.
pub const SSH_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(3600);

/// Name of the SSH subsystem carrying the file protocol.
pub const SFTP_SUBSYSTEM: &str = "sftp";
