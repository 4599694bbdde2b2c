//! Gateway configuration.
//!
//! Loaded from an optional TOML file, then overridden by the environment
//! variables the deployment has always used (`SFTP_PORT`,
//! `SFTP_HOST_KEY_PATH`, `FUTUR_API_URL`, `DATABASE_PATH`).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hinnat_vfs::constants::{DEFAULT_BACKEND_TIMEOUT, INCOMING_SIZE_LIMIT, PRICELIST_SIZE_LIMIT};
use hinnat_vfs::vfs::UploadLimits;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEFAULT_BIND_ADDRESS, DEFAULT_DATABASE_PATH, DEFAULT_HOST_KEY_PATH, DEFAULT_OBJECT_ROOT,
    DEFAULT_SSH_PORT,
};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "HINNAT_CONFIG";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {var}: {value}")]
    Env { var: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub pricelist: PricelistConfig,
    pub incoming: IncomingConfig,
    pub limits: LimitsConfig,
    pub http: HttpConfig,
    /// Serve placeholder data when a backend is unreachable. Off by default.
    pub fallback_on_error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub host_key_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            port: DEFAULT_SSH_PORT,
            host_key_path: PathBuf::from(DEFAULT_HOST_KEY_PATH),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthBackend {
    #[default]
    Database,
    WebApi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub backend: AuthBackend,
    pub database_path: PathBuf,
    pub api_url: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            backend: AuthBackend::default(),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            api_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricelistBackend {
    #[default]
    ObjectStore,
    WebApi,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectStoreKind {
    #[default]
    Local,
    Memory,
    S3,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub bucket: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub allow_http: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricelistConfig {
    pub backend: PricelistBackend,
    pub store: ObjectStoreKind,
    /// Root directory for `store = "local"`.
    pub local_root: PathBuf,
    pub s3: S3Config,
    pub api_url: Option<String>,
}

impl Default for PricelistConfig {
    fn default() -> Self {
        Self {
            backend: PricelistBackend::default(),
            store: ObjectStoreKind::default(),
            local_root: PathBuf::from(DEFAULT_OBJECT_ROOT),
            s3: S3Config::default(),
            api_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomingBackend {
    #[default]
    Database,
    WebApi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncomingConfig {
    pub backend: IncomingBackend,
    pub database_path: PathBuf,
    pub api_url: Option<String>,
}

impl Default for IncomingConfig {
    fn default() -> Self {
        Self {
            backend: IncomingBackend::default(),
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            api_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub incoming_bytes: usize,
    pub pricelist_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            incoming_bytes: INCOMING_SIZE_LIMIT,
            pricelist_bytes: PRICELIST_SIZE_LIMIT,
        }
    }
}

impl From<&LimitsConfig> for UploadLimits {
    fn from(limits: &LimitsConfig) -> Self {
        UploadLimits {
            incoming: limits.incoming_bytes,
            pricelist: limits.pricelist_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_BACKEND_TIMEOUT.as_secs(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read a TOML file. `~` is expanded.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = expand(path.as_ref());
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Full load: file (explicit, then `HINNAT_CONFIG`, else defaults),
    /// environment overrides, validation.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut config = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => {
                tracing::info!(path = %path.display(), "loading configuration");
                Self::from_file(path)?
            }
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(port) = lookup("SFTP_PORT") {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::Env {
                var: "SFTP_PORT",
                value: port.clone(),
            })?;
        }
        if let Some(path) = lookup("SFTP_HOST_KEY_PATH") {
            self.server.host_key_path = PathBuf::from(path);
        }
        if let Some(url) = lookup("FUTUR_API_URL") {
            self.auth.api_url = Some(url.clone());
            self.pricelist.api_url = Some(url.clone());
            self.incoming.api_url = Some(url);
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            self.auth.database_path = PathBuf::from(&path);
            self.incoming.database_path = PathBuf::from(path);
        }
        Ok(())
    }

    /// Reject configurations that cannot start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let needs_url = |backend: &str, url: &Option<String>| match url {
            Some(u) if !u.trim().is_empty() => Ok(()),
            _ => Err(ConfigError::Invalid(format!(
                "{} backend \"web_api\" requires api_url (or FUTUR_API_URL)",
                backend
            ))),
        };

        if self.auth.backend == AuthBackend::WebApi {
            needs_url("auth", &self.auth.api_url)?;
        }
        match self.pricelist.backend {
            PricelistBackend::WebApi => needs_url("pricelist", &self.pricelist.api_url)?,
            PricelistBackend::ObjectStore => {
                if self.pricelist.store == ObjectStoreKind::S3 && self.pricelist.s3.bucket.trim().is_empty() {
                    return Err(ConfigError::Invalid("s3 store requires a bucket".into()));
                }
            }
        }
        if self.incoming.backend == IncomingBackend::WebApi {
            needs_url("incoming", &self.incoming.api_url)?;
        }
        // Remote storage calls carry the token only the web_api authenticator issues.
        if self.auth.backend != AuthBackend::WebApi {
            for (section, remote) in [
                ("pricelist", self.pricelist.backend == PricelistBackend::WebApi),
                ("incoming", self.incoming.backend == IncomingBackend::WebApi),
            ] {
                if remote {
                    return Err(ConfigError::Invalid(format!(
                        "{} backend \"web_api\" requires auth backend \"web_api\"",
                        section
                    )));
                }
            }
        }
        if self.limits.incoming_bytes == 0 || self.limits.pricelist_bytes == 0 {
            return Err(ConfigError::Invalid("upload limits must be non-zero".into()));
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid("http timeout must be non-zero".into()));
        }
        self.bind_addr()?;
        Ok(())
    }

    /// Socket address to listen on.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.server.bind_address, self.server.port);
        addr.parse()
            .map_err(|_| ConfigError::Invalid(format!("bad bind address: {}", addr)))
    }

    pub fn host_key_path(&self) -> PathBuf {
        expand(&self.server.host_key_path)
    }
}

/// Expand a leading `~`.
pub fn expand(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(shellexpand::tilde(s).as_ref()),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let map: HashMap<&'static str, String> =
            pairs.iter().map(|(k, v)| (*k, v.to_string())).collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.server.port, 2222);
        assert_eq!(config.limits.incoming_bytes, 102400);
        assert!(!config.fallback_on_error);
        assert_eq!(config.http.timeout(), Duration::from_secs(30));
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_full_document() {
        let config = Config::from_toml(
            r#"
            fallback_on_error = true

            [server]
            port = 2022
            host_key_path = "/etc/hinnat/host_key"

            [auth]
            backend = "web_api"
            api_url = "https://erp.example.com"

            [pricelist]
            backend = "object_store"
            store = "s3"
            [pricelist.s3]
            bucket = "pricelists"
            region = "eu-north-1"

            [incoming]
            backend = "web_api"
            api_url = "https://erp.example.com"

            [limits]
            incoming_bytes = 51200
            "#,
        )
        .unwrap();

        assert!(config.fallback_on_error);
        assert_eq!(config.server.port, 2022);
        assert_eq!(config.auth.backend, AuthBackend::WebApi);
        assert_eq!(config.pricelist.store, ObjectStoreKind::S3);
        assert_eq!(config.pricelist.s3.bucket, "pricelists");
        assert_eq!(config.incoming.backend, IncomingBackend::WebApi);
        assert_eq!(config.limits.incoming_bytes, 51200);
        assert_eq!(config.limits.pricelist_bytes, PRICELIST_SIZE_LIMIT);
        config.validate().unwrap();
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("SFTP_PORT", "2200"),
                ("SFTP_HOST_KEY_PATH", "/tmp/key"),
                ("FUTUR_API_URL", "http://api.local"),
                ("DATABASE_PATH", "/var/lib/hinnat.db"),
            ]))
            .unwrap();

        assert_eq!(config.server.port, 2200);
        assert_eq!(config.server.host_key_path, PathBuf::from("/tmp/key"));
        assert_eq!(config.auth.api_url.as_deref(), Some("http://api.local"));
        assert_eq!(config.pricelist.api_url.as_deref(), Some("http://api.local"));
        assert_eq!(config.incoming.api_url.as_deref(), Some("http://api.local"));
        assert_eq!(config.incoming.database_path, PathBuf::from("/var/lib/hinnat.db"));
    }

    #[test]
    fn test_bad_port_env_is_rejected() {
        let mut config = Config::default();
        let err = config.apply_env(env(&[("SFTP_PORT", "ssh")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "SFTP_PORT", .. }));
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.auth.backend = AuthBackend::WebApi;
        config.auth.api_url = Some("http://api.local".into());
        config.pricelist.backend = PricelistBackend::WebApi;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        config.pricelist.api_url = Some("http://api.local".into());
        config.validate().unwrap();

        config.pricelist.backend = PricelistBackend::ObjectStore;
        config.pricelist.store = ObjectStoreKind::S3;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.limits.incoming_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.bind_address = "not an address".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_web_api_storage_requires_web_api_auth() {
        let mut config = Config::default();
        config.pricelist.backend = PricelistBackend::WebApi;
        config.pricelist.api_url = Some("http://api.local".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pricelist"), "{}", err);

        let mut config = Config::default();
        config.incoming.backend = IncomingBackend::WebApi;
        config.incoming.api_url = Some("http://api.local".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("incoming"), "{}", err);

        config.auth.backend = AuthBackend::WebApi;
        config.auth.api_url = Some("http://api.local".into());
        config.validate().unwrap();

        let parsed = Config::from_toml("[incoming]\nbackend = \"web_api\"\napi_url = \"http://api.local\"\n")
            .unwrap();
        assert!(matches!(parsed.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_backend_fails_to_parse() {
        let err = Config::from_toml("[auth]\nbackend = \"ldap\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hinnat.toml");
        std::fs::write(&path, "[server]\nport = 2300\n").unwrap();
        assert_eq!(Config::from_file(&path).unwrap().server.port, 2300);

        let err = Config::from_file(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
