//! Postgres connection pool

use cadence_common::config::DatabaseConfig;
use cadence_common::{Error, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

/// Shared Postgres pool
#[derive(Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// Connect using the database section of the config
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = connection_url(config)?;

        info!(
            backend = %config.backend,
            max_connections = config.max_connections,
            "Connecting to database"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&url)
            .await
            .map_err(|e| Error::Database(format!("Failed to connect: {}", e)))?;

        info!("Database connection established");

        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending migrations
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Migration failed: {}", e)))?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Round-trip a trivial query
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Health check failed: {}", e)))?;
        Ok(())
    }
}

fn connection_url(config: &DatabaseConfig) -> Result<String> {
    match config.backend.as_str() {
        "postgres" | "postgresql" => config
            .url
            .clone()
            .ok_or_else(|| Error::Config("database.url is required".to_string())),
        other => Err(Error::Config(format!(
            "Unsupported database backend: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(backend: &str, url: Option<&str>) -> DatabaseConfig {
        DatabaseConfig {
            backend: backend.to_string(),
            url: url.map(String::from),
            max_connections: 5,
            min_connections: 1,
        }
    }

    #[test]
    fn test_connection_url() {
        assert_eq!(
            connection_url(&config("postgres", Some("postgres://db/cadence"))).unwrap(),
            "postgres://db/cadence"
        );
        assert!(connection_url(&config("postgres", None)).is_err());
        assert!(connection_url(&config("sqlite", Some("sqlite::memory:"))).is_err());
    }
}
