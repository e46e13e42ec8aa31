//! Provider identifiers and resolution of the current provider.

use crate::config::DatabaseSettings;
use crate::{DbError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// One independently managed PostgreSQL-compatible backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    /// Serverless provider reached over HTTPS, one round trip per statement.
    EdgeHttp,
    /// Managed provider reached through a small TCP connection pool.
    PooledCloud,
    /// Local development instance.
    PooledLocal,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::EdgeHttp, Provider::PooledCloud, Provider::PooledLocal];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::EdgeHttp => "edge-http",
            Provider::PooledCloud => "pooled-cloud",
            Provider::PooledLocal => "pooled-local",
        }
    }

    /// Name of this provider's migration ledger table.
    pub fn ledger_table(&self) -> &'static str {
        match self {
            Provider::EdgeHttp => "edge_http_migrations",
            Provider::PooledCloud => "pooled_cloud_migrations",
            Provider::PooledLocal => "pooled_local_migrations",
        }
    }

    /// Environment key holding this provider's connection string.
    pub fn url_key(&self) -> &'static str {
        match self {
            Provider::EdgeHttp => "EDGE_DATABASE_URL",
            Provider::PooledCloud => "CLOUD_DATABASE_URL",
            Provider::PooledLocal => "LOCAL_DATABASE_URL",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "edge-http" => Ok(Provider::EdgeHttp),
            "pooled-cloud" => Ok(Provider::PooledCloud),
            "pooled-local" => Ok(Provider::PooledLocal),
            _ => Err(DbError::Configuration(format!(
                "unknown provider '{}', expected one of: edge-http, pooled-cloud, pooled-local",
                s
            ))),
        }
    }
}

/// Read-only source of named configuration strings.
pub trait EnvSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

/// Decide which provider is current for the given settings.
///
/// First match wins: explicit override, dev/test with a local URL, edge URL,
/// cloud URL, then the local default.
pub fn resolve_provider(settings: &DatabaseSettings) -> Provider {
    if let Some(provider) = settings.provider_override {
        return provider;
    }

    if settings.is_dev_or_test() && settings.local_url.is_some() {
        return Provider::PooledLocal;
    }

    if settings.edge_url.is_some() {
        return Provider::EdgeHttp;
    }

    if settings.cloud_url.is_some() {
        return Provider::PooledCloud;
    }

    Provider::PooledLocal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> DatabaseSettings {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DatabaseSettings::from_env(&env).unwrap()
    }

    #[test]
    fn test_parse_known_providers() {
        for provider in Provider::ALL {
            assert_eq!(provider.as_str().parse::<Provider>().unwrap(), provider);
        }
    }

    #[test]
    fn test_parse_requires_exact_name() {
        for value in [" pooled-local", "Pooled-Local", "POOLED-CLOUD", "edge_http", ""] {
            assert!(value.parse::<Provider>().is_err(), "{value:?} should be rejected");
        }
    }

    #[test]
    fn test_parse_unknown_provider_names_value() {
        let err = "not-a-real-provider".parse::<Provider>().unwrap_err();
        assert!(matches!(err, DbError::Configuration(_)));
        assert!(err.to_string().contains("not-a-real-provider"));
    }

    #[test]
    fn test_ledger_tables_are_distinct() {
        let tables: Vec<_> = Provider::ALL.iter().map(|p| p.ledger_table()).collect();
        assert_eq!(
            tables,
            vec!["edge_http_migrations", "pooled_cloud_migrations", "pooled_local_migrations"]
        );
    }

    #[test]
    fn test_override_wins() {
        let s = settings(&[
            ("DATABASE_PROVIDER", "pooled-cloud"),
            ("APP_ENV", "development"),
            ("LOCAL_DATABASE_URL", "postgres://localhost/dev"),
            ("EDGE_DATABASE_URL", "postgres://u:p@edge.example.com/db"),
        ]);
        assert_eq!(resolve_provider(&s), Provider::PooledCloud);
    }

    #[test]
    fn test_dev_with_local_url_beats_cloud() {
        let s = settings(&[
            ("APP_ENV", "test"),
            ("LOCAL_DATABASE_URL", "postgres://localhost/dev"),
            ("EDGE_DATABASE_URL", "postgres://u:p@edge.example.com/db"),
            ("CLOUD_DATABASE_URL", "postgres://u:p@cloud.example.com/db"),
        ]);
        assert_eq!(resolve_provider(&s), Provider::PooledLocal);
    }

    #[test]
    fn test_production_prefers_edge_over_local() {
        let s = settings(&[
            ("APP_ENV", "production"),
            ("LOCAL_DATABASE_URL", "postgres://localhost/dev"),
            ("EDGE_DATABASE_URL", "postgres://u:p@edge.example.com/db"),
            ("CLOUD_DATABASE_URL", "postgres://u:p@cloud.example.com/db"),
        ]);
        assert_eq!(resolve_provider(&s), Provider::EdgeHttp);
    }

    #[test]
    fn test_cloud_when_no_edge() {
        let s = settings(&[("CLOUD_DATABASE_URL", "postgres://u:p@cloud.example.com/db")]);
        assert_eq!(resolve_provider(&s), Provider::PooledCloud);
    }

    #[test]
    fn test_dev_without_local_url_falls_through() {
        let s = settings(&[
            ("APP_ENV", "development"),
            ("CLOUD_DATABASE_URL", "postgres://u:p@cloud.example.com/db"),
        ]);
        assert_eq!(resolve_provider(&s), Provider::PooledCloud);
    }

    #[test]
    fn test_nothing_configured_is_local() {
        let s = settings(&[]);
        assert_eq!(resolve_provider(&s), Provider::PooledLocal);
        assert_eq!(resolve_provider(&s), resolve_provider(&s));
    }
}
