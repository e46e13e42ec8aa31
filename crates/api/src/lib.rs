//! Bookbase Web API
//!
//! Axum-based REST API over the provider-agnostic repositories.

mod error;
mod handlers;
mod routes;

#[cfg(test)]
mod testing;

pub use error::ApiError;
pub use handlers::ApiResponse;
pub use routes::create_router;

use bookbase_database::Database;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    /// Bearer token for the migration routes; they are disabled when unset
    pub admin_token: Option<String>,
}

impl AppState {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            admin_token: None,
        }
    }

    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token.filter(|t| !t.trim().is_empty());
        self
    }
}

pub type SharedState = Arc<AppState>;
