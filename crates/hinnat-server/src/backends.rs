//! Startup wiring: configuration to storage adapters and authenticator.

use std::sync::Arc;

use anyhow::{Context, Result};
use hinnat_vfs::storage::object::S3Settings;
use hinnat_vfs::storage::{
    FallbackIncomingStore, FallbackPricelistStore, IncomingStore, ObjectPricelistStore,
    PricelistStore, RemoteApi, RemoteOrderStore, RemotePricelistStore, SqliteIncomingStore,
};
use hinnat_vfs::vfs::{Backends, UploadLimits};

use crate::auth::{Authenticator, UserDb, WebAuthenticator};
use crate::config::{
    AuthBackend, Config, IncomingBackend, ObjectStoreKind, PricelistBackend, expand,
};

fn api_url<'a>(section: &str, url: &'a Option<String>) -> Result<&'a str> {
    url.as_deref()
        .filter(|u| !u.trim().is_empty())
        .with_context(|| format!("{} backend requires api_url", section))
}

/// Build the pricelist adapter named by the configuration.
pub fn build_pricelist_store(config: &Config) -> Result<Arc<dyn PricelistStore>> {
    let section = &config.pricelist;
    let store: Arc<dyn PricelistStore> = match section.backend {
        PricelistBackend::WebApi => {
            let url = api_url("pricelist", &section.api_url)?;
            let api = RemoteApi::new(url, config.http.timeout())?;
            Arc::new(RemotePricelistStore::new(api))
        }
        PricelistBackend::ObjectStore => match section.store {
            ObjectStoreKind::Memory => Arc::new(ObjectPricelistStore::in_memory()),
            ObjectStoreKind::Local => {
                let root = expand(&section.local_root);
                Arc::new(
                    ObjectPricelistStore::local(&root)
                        .with_context(|| format!("opening object store at {}", root.display()))?,
                )
            }
            ObjectStoreKind::S3 => {
                let s3 = &section.s3;
                let settings = S3Settings {
                    bucket: s3.bucket.clone(),
                    region: s3.region.clone(),
                    access_key_id: s3.access_key_id.clone(),
                    secret_access_key: s3.secret_access_key.clone(),
                    endpoint: s3.endpoint.clone(),
                    allow_http: s3.allow_http,
                };
                Arc::new(
                    ObjectPricelistStore::s3(&settings, config.http.timeout())
                        .with_context(|| format!("configuring s3 bucket {}", s3.bucket))?,
                )
            }
        },
    };

    if config.fallback_on_error {
        Ok(Arc::new(FallbackPricelistStore::new(store)))
    } else {
        Ok(store)
    }
}

/// Build the incoming adapter named by the configuration.
pub fn build_incoming_store(config: &Config) -> Result<Arc<dyn IncomingStore>> {
    let section = &config.incoming;
    let store: Arc<dyn IncomingStore> = match section.backend {
        IncomingBackend::WebApi => {
            let url = api_url("incoming", &section.api_url)?;
            let api = RemoteApi::new(url, config.http.timeout())?;
            Arc::new(RemoteOrderStore::new(api))
        }
        IncomingBackend::Database => {
            let path = expand(&section.database_path);
            Arc::new(
                SqliteIncomingStore::open(&path)
                    .with_context(|| format!("opening database {}", path.display()))?,
            )
        }
    };

    if config.fallback_on_error {
        Ok(Arc::new(FallbackIncomingStore::new(store)))
    } else {
        Ok(store)
    }
}

/// Both adapters plus upload limits, ready to hand out sessions.
pub fn build_backends(config: &Config) -> Result<Backends> {
    let pricelist = build_pricelist_store(config)?;
    let incoming = build_incoming_store(config)?;
    tracing::info!(
        pricelist = pricelist.name(),
        incoming = incoming.name(),
        fallback = config.fallback_on_error,
        "storage backends ready"
    );
    Ok(Backends::new(pricelist, incoming).with_limits(UploadLimits::from(&config.limits)))
}

pub fn build_authenticator(config: &Config) -> Result<Arc<dyn Authenticator>> {
    let auth = &config.auth;
    let authenticator: Arc<dyn Authenticator> = match auth.backend {
        AuthBackend::Database => {
            let path = expand(&auth.database_path);
            Arc::new(
                UserDb::open(&path)
                    .with_context(|| format!("opening user database {}", path.display()))?,
            )
        }
        AuthBackend::WebApi => {
            let url = api_url("auth", &auth.api_url)?;
            Arc::new(WebAuthenticator::new(url, config.http.timeout())?)
        }
    };
    tracing::info!(backend = authenticator.name(), "authenticator ready");
    Ok(authenticator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hinnat_vfs::Identity;
    use hinnat_vfs::vfs::Area;

    fn memory_config() -> Config {
        let mut config = Config::default();
        config.pricelist.store = ObjectStoreKind::Memory;
        config
    }

    #[test]
    fn test_default_local_and_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.pricelist.local_root = dir.path().join("objects");
        config.incoming.database_path = dir.path().join("hinnat.db");
        config.auth.database_path = dir.path().join("hinnat.db");

        let backends = build_backends(&config).unwrap();
        assert!(backends.policy().permissions(Area::Pricelist).write);
        assert!(dir.path().join("objects").is_dir());
        assert!(dir.path().join("hinnat.db").exists());
        assert_eq!(build_authenticator(&config).unwrap().name(), "database");
    }

    #[test]
    fn test_web_api_backends() {
        let mut config = memory_config();
        config.pricelist.backend = PricelistBackend::WebApi;
        config.pricelist.api_url = Some("http://api.local/".into());
        config.incoming.backend = IncomingBackend::WebApi;
        config.incoming.api_url = Some("http://api.local".into());
        config.auth.backend = AuthBackend::WebApi;
        config.auth.api_url = Some("http://api.local".into());

        assert_eq!(build_pricelist_store(&config).unwrap().name(), "web_api");
        let incoming = build_incoming_store(&config).unwrap();
        assert_eq!(incoming.name(), "web_api");
        assert!(!incoming.retains_files());
        assert_eq!(build_authenticator(&config).unwrap().name(), "web_api");

        let backends = build_backends(&config).unwrap();
        assert!(!backends.policy().permissions(Area::Pricelist).write);
    }

    #[test]
    fn test_missing_api_url_fails() {
        let mut config = memory_config();
        config.incoming.backend = IncomingBackend::WebApi;
        assert!(build_incoming_store(&config).is_err());
    }

    #[tokio::test]
    async fn test_fallback_wraps_adapters() {
        let mut config = memory_config();
        config.fallback_on_error = true;
        config.http.timeout_secs = 2;
        config.pricelist.backend = PricelistBackend::WebApi;
        config.pricelist.api_url = Some("http://127.0.0.1:1".into());
        config.incoming.backend = IncomingBackend::WebApi;
        config.incoming.api_url = Some("http://127.0.0.1:1".into());

        let alice = Identity::new("alice", "key");
        let pricelist = build_pricelist_store(&config).unwrap();
        assert_eq!(pricelist.list(&alice, "").await.unwrap().len(), 1);
        let incoming = build_incoming_store(&config).unwrap();
        incoming.store(&alice, "order.csv", b"1;2".to_vec()).await.unwrap();
    }

    #[test]
    fn test_limits_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = memory_config();
        config.incoming.database_path = dir.path().join("hinnat.db");
        config.limits.incoming_bytes = 10;

        let backends = build_backends(&config).unwrap();
        assert_eq!(backends.limits().incoming, 10);
    }

    #[tokio::test]
    async fn test_memory_store_is_usable() {
        let config = memory_config();
        let store = build_pricelist_store(&config).unwrap();
        let alice = Identity::new("alice", "token");
        assert!(store.list(&alice, "").await.unwrap().is_empty());
    }
}
