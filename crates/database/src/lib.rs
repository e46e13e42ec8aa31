//! Bookbase Database Layer
//!
//! PostgreSQL-compatible storage that runs unchanged against an edge HTTP
//! provider, a pooled cloud provider or a local development instance, with a
//! migration ledger kept per provider.

mod config;
mod connector;
mod context;
mod factory;
mod health;
mod ledger;
mod models;
mod projection;
mod provider;
mod query;
mod repository;
mod schema;
mod session;

#[cfg(test)]
mod testing;

pub use config::{ConnectionConfig, DatabaseSettings, DEFAULT_LOCAL_URL};
pub use connector::{Connector, EdgeHttpConnector, PooledCloudConnector, PooledLocalConnector};
pub use context::{Database, DatabaseContext};
pub use factory::{apply_migrations, migration_status, reset_migrations, ClientFactory};
pub use health::{close_connection, health_check, validate_provider_config, CleanupResult};
pub use ledger::{AppliedMigration, ApplyReport, MigrationFile, MigrationLedger, MigrationStatus};
pub use models::*;
pub use provider::{resolve_provider, EnvSource, ProcessEnv, Provider};
pub use query::{Page, Pagination, SortDirection};
pub use repository::{AuthorRepository, BookRepository, UserBookRepository};
pub use schema::bundled_migrations;
pub use session::{Row, Session, SqlValue, Statement};

use serde::Serialize;
use std::borrow::Cow;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Confirmation required: {operation} on {provider} is destructive, pass confirm=true")]
    ConfirmationRequired {
        operation: &'static str,
        provider: Provider,
    },

    #[error("{0}")]
    IntegrityRefusal(IntegrityRefusal),

    #[error("Database error ({provider}): {source}")]
    Backend {
        provider: Provider,
        #[source]
        source: BackendError,
    },

    #[error("Row decode failed: {0}")]
    Decode(String),
}

/// Failure reported by the query-execution capability of a session.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("{message}")]
    Remote {
        code: Option<String>,
        message: String,
    },
}

/// Structured explanation of a refused write.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("Cannot delete {entity} {id}: {dependents} {dependent_entity} row(s) still reference it")]
pub struct IntegrityRefusal {
    pub entity: &'static str,
    pub id: i64,
    pub dependent_entity: &'static str,
    pub dependents: i64,
}

impl DbError {
    pub(crate) fn backend(provider: Provider, source: impl Into<BackendError>) -> Self {
        DbError::Backend {
            provider,
            source: source.into(),
        }
    }

    /// Whether this error came from the backend rather than from the caller.
    pub fn is_backend(&self) -> bool {
        matches!(self, DbError::Backend { .. })
    }

    /// SQLSTATE reported by the backend, when there is one.
    pub fn sqlstate(&self) -> Option<Cow<'_, str>> {
        match self {
            DbError::Backend {
                source: BackendError::Sqlx(sqlx::Error::Database(db)),
                ..
            } => db.code(),
            DbError::Backend {
                source: BackendError::Remote { code, .. },
                ..
            } => code.as_deref().map(Cow::Borrowed),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
