//! Fixed names and limits of the exposed namespace.

use std::time::Duration;

/// Top-level segment of the incoming (write-only) directory.
pub const INCOMING_DIR: &str = "in";

/// Top-level segment of the pricelist directory.
pub const PRICELIST_DIR: &str = "Hinnat";

/// The only pricelist object ever exposed to readers.
pub const PRICELIST_FILE: &str = "salhydro_kaikki.zip";

/// Hard ceiling for a single upload into the incoming directory (100 KB).
pub const INCOMING_SIZE_LIMIT: usize = 100 * 1024;

/// Default ceiling for a single upload into the pricelist directory.
pub const PRICELIST_SIZE_LIMIT: usize = 64 * 1024 * 1024;

/// Per-call ceiling for backend requests.
pub const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(30);

/// User agent sent with every remote API request.
pub const USER_AGENT: &str = "SFTP-Service/1.0";
