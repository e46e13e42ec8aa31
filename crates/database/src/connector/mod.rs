//! Backend connectors, one per provider.
//!
//! Connectors differ only in connection policy. Every session they produce
//! satisfies the same [`Session`] contract.

mod edge;
mod pooled;

pub use edge::EdgeHttpConnector;
pub use pooled::{PooledCloudConnector, PooledLocalConnector};

use crate::config::ConnectionConfig;
use crate::provider::Provider;
use crate::session::Session;
use crate::{DbError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Opens sessions to one specific provider.
#[async_trait]
pub trait Connector: Send + Sync {
    fn provider(&self) -> Provider;

    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Session>>;
}

/// Connector responsible for `provider`.
pub fn connector_for(provider: Provider) -> Box<dyn Connector> {
    match provider {
        Provider::EdgeHttp => Box::new(EdgeHttpConnector::default()),
        Provider::PooledCloud => Box::new(PooledCloudConnector),
        Provider::PooledLocal => Box::new(PooledLocalConnector),
    }
}

fn ensure_matches(expected: Provider, config: &ConnectionConfig) -> Result<()> {
    if config.provider != expected {
        return Err(DbError::Configuration(format!(
            "{} connector cannot open a session for provider {}",
            expected, config.provider
        )));
    }
    if config.connection_string.trim().is_empty() {
        return Err(DbError::Configuration(format!(
            "{} is not set, required for provider {}",
            expected.url_key(),
            expected
        )));
    }
    Ok(())
}
