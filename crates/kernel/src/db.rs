//! Database connection pool management.

use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use crate::config::DbSettings;

/// Create a PostgreSQL connection pool.
///
/// The pool connects lazily, so a site whose modules never touch the
/// database starts without one being reachable.
pub fn create_pool(settings: &DbSettings) -> Result<PgPool> {
    let options = match &settings.url {
        Some(url) => url
            .parse::<PgConnectOptions>()
            .context("failed to parse database URL")?,
        None => {
            let mut options = PgConnectOptions::new()
                .host(&settings.host)
                .port(settings.port)
                .database(&settings.name);
            if let Some(user) = &settings.user {
                options = options.username(user);
            }
            if let Some(password) = &settings.password {
                options = options.password(password);
            }
            options
        }
    };

    Ok(PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect_lazy_with(options))
}

/// Check if the database connection is healthy.
pub async fn check_health(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}
