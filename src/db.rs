use std::time::Duration;

use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};

use crate::config::DatabaseConfig;

const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Opens the pool and pings it, retrying up to `connect_attempts` times.
pub async fn connect(cfg: &DatabaseConfig) -> anyhow::Result<PgPool> {
    info!(db = %cfg.display, "connecting to PostgreSQL");

    let attempt = || async move {
        let pool = PgPoolOptions::new()
            .max_connections(cfg.max_connections)
            .max_lifetime(Duration::from_secs(5 * 60))
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(cfg.options.clone())
            .await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok::<_, sqlx::Error>(pool)
    };

    let pool = attempt
        .retry(
            ConstantBuilder::default()
                .with_delay(RETRY_DELAY)
                .with_max_times(cfg.connect_attempts.saturating_sub(1)),
        )
        .notify(|e: &sqlx::Error, after: Duration| {
            warn!(error = %e, retry_in = ?after, "database connection failed; retrying");
        })
        .await
        .with_context(|| format!("connect to database after {} attempts", cfg.connect_attempts))?;

    info!("connected to the PostgreSQL database");
    Ok(pool)
}

pub async fn ping(db: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(db).await.map(|_| ())
}
