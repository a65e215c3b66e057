//! Metadata store for the Git LFS proxy.
//!
//! PostgreSQL holds the authoritative records:
//! - LFS objects (OID, size, storage key, uploaded flag)
//! - Access policies binding each OID to the repository that uploaded it
//! - The repository allowlist
//!
//! [`ObjectMetadataStore`] and [`RepositoryAllowlist`] front the store with
//! the key-value cache.

pub mod cached;
pub mod error;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod store;

pub use cached::{ObjectMetadataStore, RepositoryAllowlist};
pub use error::{MetadataError, MetadataResult};
pub use postgres::PostgresStore;
pub use repos::{AccessPolicyRepo, AllowlistRepo, ObjectRepo};
pub use store::{IsolationLevel, MetadataStore};

use lfs_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    config.validate().map_err(MetadataError::Config)?;

    let store = match (&config.url, &config.host, &config.database) {
        (Some(url), _, _) => {
            PostgresStore::from_url(
                url.expose(),
                config.max_connections,
                config.statement_timeout_ms,
            )
            .await?
        }
        (None, Some(host), Some(database)) => {
            PostgresStore::from_params(
                host,
                config.port,
                config.username.as_deref(),
                config.password.as_ref().map(|p| p.expose()),
                database,
                config.ssl_mode,
                config.ssl_root_cert.as_deref(),
                config.max_connections,
                config.statement_timeout_ms,
            )
            .await?
        }
        _ => {
            return Err(MetadataError::Config(
                "metadata config requires either 'url' or 'host' + 'database'".to_string(),
            ));
        }
    };
    Ok(Arc::new(store))
}
