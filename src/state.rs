use crate::config::AppConfig;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn from_parts(db: PgPool, config: Arc<AppConfig>) -> Self {
        Self { db, config }
    }

    /// State over a pool that never connects until a query runs.
    #[cfg(test)]
    pub fn fake() -> Self {
        let config = Arc::new(
            AppConfig::from_lookup(|key| match key {
                "JWT_SECRET" => Some("test-secret".to_string()),
                _ => None,
            })
            .expect("test config"),
        );
        let db = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy_with(config.database.options.clone());
        Self { db, config }
    }
}
