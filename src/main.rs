use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

mod app;
mod auth;
mod config;
mod db;
mod error;
mod migrate;
mod profile;
mod state;

use crate::{
    config::AppConfig,
    migrate::{Migrator, PgMigrationStore},
    state::AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Apply pending migrations, then serve HTTP.
    Serve,
    /// Apply pending migrations and exit.
    Migrate,
    /// Roll back the latest migration and exit.
    Rollback,
}

impl Command {
    fn parse(arg: Option<&str>) -> anyhow::Result<Self> {
        match arg {
            None | Some("serve") => Ok(Command::Serve),
            Some("migrate") => Ok(Command::Migrate),
            Some("rollback") => Ok(Command::Rollback),
            Some(other) => anyhow::bail!("unknown command {other:?}; expected serve, migrate or rollback"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "zero_balance=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let command = Command::parse(std::env::args().nth(1).as_deref())?;
    let config = Arc::new(AppConfig::from_env().context("load configuration")?);

    info!(environment = ?config.environment, ?command, "starting ZeroBalance API");
    if config.debug {
        info!(database = ?config.database, jwt = ?config.jwt, port = config.port, "configuration");
    }
    if config.jwt.uses_default_secret {
        warn!("JWT_SECRET is not set; using the development signing secret");
    }

    let pool = db::connect(&config.database).await?;
    let migrator = Migrator::new(PgMigrationStore::new(pool.clone()), &config.migrations_dir);

    if command == Command::Rollback {
        let name = migrator.rollback().await.context("roll back migration")?;
        info!(migration = %name, "rollback complete");
        return Ok(());
    }

    info!(dir = %migrator.dir().display(), "applying database migrations");
    let report = match migrator.apply().await {
        Ok(r) => r,
        Err(e) => {
            error!(migration = e.unit().unwrap_or("-"), error = %e, "migration batch aborted");
            return Err(e).context("apply migrations");
        }
    };
    info!(
        applied = report.applied.len(),
        skipped = report.skipped.len(),
        "database migrations applied successfully"
    );
    if command == Command::Migrate {
        return Ok(());
    }

    let app_state = AppState::from_parts(pool, config.clone());
    let app = app::build_app(app_state);
    app::serve(app, &config.host, config.port).await
}
