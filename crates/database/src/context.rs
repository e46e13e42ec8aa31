//! Caller-owned database handles.
//!
//! There is no process-wide default connection. Callers build a
//! [`DatabaseContext`] at startup, pass it (or the [`Database`] it yields)
//! down to whatever needs storage, and shut it down explicitly.

use crate::factory::ClientFactory;
use crate::health::{close_connection, health_check, CleanupResult};
use crate::ledger::{ApplyReport, MigrationLedger};
use crate::provider::Provider;
use crate::repository::{AuthorRepository, BookRepository, UserBookRepository};
use crate::schema::bundled_migrations;
use crate::session::Session;
use crate::{DbError, Result};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

/// One open session and the repositories bound to it
#[derive(Clone)]
pub struct Database {
    session: Arc<dyn Session>,
}

impl Database {
    /// Open a session for `provider`, or for the factory's current provider
    pub async fn connect(factory: &ClientFactory, provider: Option<Provider>) -> Result<Self> {
        let provider = provider.unwrap_or_else(|| factory.current_provider());
        let session = factory.connect(provider).await?;
        Ok(Self::from_session(session))
    }

    /// Wrap an existing session
    pub fn from_session(session: Arc<dyn Session>) -> Self {
        Self { session }
    }

    pub fn provider(&self) -> Provider {
        self.session.provider()
    }

    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    pub fn books(&self) -> BookRepository {
        BookRepository::new(Arc::clone(&self.session))
    }

    pub fn authors(&self) -> AuthorRepository {
        AuthorRepository::new(Arc::clone(&self.session))
    }

    pub fn user_books(&self) -> UserBookRepository {
        UserBookRepository::new(Arc::clone(&self.session))
    }

    pub fn ledger(&self) -> MigrationLedger {
        MigrationLedger::new(Arc::clone(&self.session))
    }

    pub async fn health_check(&self) -> bool {
        health_check(self.session.as_ref()).await
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> Result<ApplyReport> {
        self.ledger().apply(&bundled_migrations()).await
    }

    /// Release the session
    pub async fn close(self) -> CleanupResult {
        close_connection(self.session).await
    }
}

/// Lazily connected context with an explicit shutdown.
///
/// The first call to [`DatabaseContext::database`] opens the session; later
/// calls reuse it.
pub struct DatabaseContext {
    factory: ClientFactory,
    provider: Option<Provider>,
    database: OnceCell<Database>,
}

impl DatabaseContext {
    pub fn new(factory: ClientFactory) -> Self {
        Self {
            factory,
            provider: None,
            database: OnceCell::new(),
        }
    }

    /// Pin the context to a provider instead of the resolved one
    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn factory(&self) -> &ClientFactory {
        &self.factory
    }

    /// Provider the context connects (or will connect) to
    pub fn provider(&self) -> Provider {
        self.provider.unwrap_or_else(|| self.factory.current_provider())
    }

    pub fn is_connected(&self) -> bool {
        self.database.initialized()
    }

    /// The shared database, connecting on first use
    pub async fn database(&self) -> Result<&Database> {
        self.database
            .get_or_try_init(|| async {
                let database = Database::connect(&self.factory, self.provider).await?;
                info!(provider = %database.provider(), "Database context initialized");
                Ok::<_, DbError>(database)
            })
            .await
    }

    /// Release the session if one was opened. The context can connect
    /// again afterwards.
    pub async fn shutdown(&mut self) -> Option<CleanupResult> {
        let database = self.database.take()?;
        let result = database.close().await;
        info!(provider = %self.provider(), released = result.is_released(), "Database context shut down");
        Some(result)
    }
}
