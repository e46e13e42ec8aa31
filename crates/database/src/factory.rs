//! Client factory: routes a provider request to the matching connector.

use crate::config::{ConnectionConfig, DatabaseSettings};
use crate::connector::connector_for;
use crate::health::close_connection;
use crate::ledger::{ApplyReport, MigrationFile, MigrationLedger, MigrationStatus};
use crate::provider::{resolve_provider, EnvSource, ProcessEnv, Provider};
use crate::session::Session;
use crate::Result;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// Builds sessions for the current or a named provider.
///
/// Settings are captured once at construction; a fresh [`ConnectionConfig`]
/// is derived on every call. The factory itself holds no sessions.
#[derive(Debug, Clone)]
pub struct ClientFactory {
    settings: DatabaseSettings,
}

impl ClientFactory {
    pub fn new(settings: DatabaseSettings) -> Self {
        Self { settings }
    }

    /// Snapshot settings from an environment source.
    pub fn from_source(env: &dyn EnvSource) -> Result<Self> {
        Ok(Self::new(DatabaseSettings::from_env(env)?))
    }

    /// Snapshot settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_source(&ProcessEnv)
    }

    pub fn settings(&self) -> &DatabaseSettings {
        &self.settings
    }

    /// The provider used when none is named.
    pub fn current_provider(&self) -> Provider {
        resolve_provider(&self.settings)
    }

    /// Create a session for a provider given by name, or for the current
    /// provider when `provider` is `None`.
    pub async fn create_client(&self, provider: Option<&str>) -> Result<Arc<dyn Session>> {
        let provider = match provider {
            Some(name) => name.parse::<Provider>()?,
            None => self.current_provider(),
        };
        self.connect(provider).await
    }

    /// Create a session for a known provider.
    pub async fn connect(&self, provider: Provider) -> Result<Arc<dyn Session>> {
        let config = ConnectionConfig::for_provider(provider, &self.settings)?;
        let session = connector_for(provider).connect(&config).await?;
        info!(provider = %provider, "Database client created");
        Ok(session)
    }

    /// Run `op` against a fresh session and release it on every exit path.
    async fn with_session<T, F, Fut>(&self, provider: Option<Provider>, op: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn Session>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let provider = provider.unwrap_or_else(|| self.current_provider());
        let session = self.connect(provider).await?;
        let outcome = op(Arc::clone(&session)).await;
        close_connection(session).await;
        outcome
    }
}

/// Applied and pending migrations for a provider.
pub async fn migration_status(
    factory: &ClientFactory,
    provider: Option<Provider>,
    migrations: &[MigrationFile],
) -> Result<MigrationStatus> {
    factory
        .with_session(provider, |session| async move {
            MigrationLedger::new(session).status(migrations).await
        })
        .await
}

/// Apply pending migrations in order and record them in the provider's ledger.
pub async fn apply_migrations(
    factory: &ClientFactory,
    provider: Option<Provider>,
    migrations: &[MigrationFile],
) -> Result<ApplyReport> {
    factory
        .with_session(provider, |session| async move {
            MigrationLedger::new(session).apply(migrations).await
        })
        .await
}

/// Drop a provider's ledger table. Refused unless `confirm` is set.
pub async fn reset_migrations(factory: &ClientFactory, provider: Provider, confirm: bool) -> Result<()> {
    if !confirm {
        return Err(MigrationLedger::confirmation_required(provider));
    }
    factory
        .with_session(Some(provider), |session| async move {
            MigrationLedger::new(session).reset(true).await
        })
        .await
}
