use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{Executor, FromRow, PgPool};
use time::PrimitiveDateTime;

use super::MigrationError;

/// Postgres SQLSTATE for `undefined_table`.
const UNDEFINED_TABLE: &str = "42P01";

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct MigrationRecord {
    pub id: i32,
    pub migration_name: String,
    pub applied_at: Option<PrimitiveDateTime>,
}

/// Database side of the migration runner.
///
/// `apply` and `revert` must be atomic: the script and the tracking-table
/// change commit together or not at all.
#[async_trait]
pub trait MigrationStore: Send + Sync {
    /// Creates the tracking table if it does not exist.
    async fn ensure_table(&self) -> Result<(), MigrationError>;

    async fn applied(&self) -> Result<HashSet<String>, MigrationError>;

    /// Most recently applied record, `None` when nothing is applied.
    async fn latest(&self) -> Result<Option<MigrationRecord>, MigrationError>;

    /// Runs `script` and inserts the record for `unit` in one transaction.
    async fn apply(&self, unit: &str, script: &str) -> Result<(), MigrationError>;

    /// Runs `rollback_script` and deletes the record for `unit` in one transaction.
    async fn revert(&self, unit: &str, rollback_script: &str) -> Result<(), MigrationError>;
}

#[derive(Clone)]
pub struct PgMigrationStore {
    pool: PgPool,
}

impl PgMigrationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn connection(step: &'static str) -> impl FnOnce(sqlx::Error) -> MigrationError {
    move |source| MigrationError::Connection { step, source }
}

fn is_undefined_table(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(UNDEFINED_TABLE),
        _ => false,
    }
}

#[async_trait]
impl MigrationStore for PgMigrationStore {
    async fn ensure_table(&self) -> Result<(), MigrationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS migrations (
                id SERIAL PRIMARY KEY,
                migration_name VARCHAR(255) UNIQUE NOT NULL,
                applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(connection("create migrations table"))?;
        Ok(())
    }

    async fn applied(&self) -> Result<HashSet<String>, MigrationError> {
        let names: Vec<String> = sqlx::query_scalar("SELECT migration_name FROM migrations")
            .fetch_all(&self.pool)
            .await
            .map_err(connection("query applied migrations"))?;
        Ok(names.into_iter().collect())
    }

    async fn latest(&self) -> Result<Option<MigrationRecord>, MigrationError> {
        let res = sqlx::query_as::<_, MigrationRecord>(
            r#"
            SELECT id, migration_name, applied_at
            FROM migrations
            ORDER BY applied_at DESC NULLS LAST, id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await;
        match res {
            Ok(rec) => Ok(rec),
            // no tracking table yet means nothing was ever applied
            Err(e) if is_undefined_table(&e) => Ok(None),
            Err(e) => Err(connection("query latest migration")(e)),
        }
    }

    async fn apply(&self, unit: &str, script: &str) -> Result<(), MigrationError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(connection("begin transaction"))?;

        // Unprepared execution so multi-statement scripts run verbatim.
        (&mut *tx)
            .execute(script)
            .await
            .map_err(|source| MigrationError::Execution {
                unit: unit.to_string(),
                source,
            })?;

        sqlx::query("INSERT INTO migrations (migration_name) VALUES ($1)")
            .bind(unit)
            .execute(&mut *tx)
            .await
            .map_err(|source| MigrationError::Record {
                unit: unit.to_string(),
                source,
            })?;

        tx.commit().await.map_err(|source| MigrationError::Record {
            unit: unit.to_string(),
            source,
        })
    }

    async fn revert(&self, unit: &str, rollback_script: &str) -> Result<(), MigrationError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(connection("begin transaction"))?;

        (&mut *tx)
            .execute(rollback_script)
            .await
            .map_err(|source| MigrationError::Execution {
                unit: unit.to_string(),
                source,
            })?;

        sqlx::query("DELETE FROM migrations WHERE migration_name = $1")
            .bind(unit)
            .execute(&mut *tx)
            .await
            .map_err(|source| MigrationError::Record {
                unit: unit.to_string(),
                source,
            })?;

        tx.commit().await.map_err(|source| MigrationError::Record {
            unit: unit.to_string(),
            source,
        })
    }
}

/// Run with `cargo test -- --ignored` against a scratch database in `DATABASE_URL`.
/// Each test works in its own schema and drops it afterwards.
#[cfg(test)]
mod pg_tests {
    use sqlx::postgres::PgPoolOptions;

    use super::*;
    use crate::migrate::{units::testing::scratch_dir, Migrator};

    struct Scratch {
        admin: PgPool,
        pool: PgPool,
        schema: String,
    }

    impl Scratch {
        async fn new() -> Self {
            let url = std::env::var("DATABASE_URL").expect("DATABASE_URL for postgres tests");
            let admin = PgPool::connect(&url).await.expect("connect");
            let schema = format!("zb_test_{}", uuid::Uuid::new_v4().simple());
            admin
                .execute(format!("CREATE SCHEMA {schema}").as_str())
                .await
                .expect("create schema");

            let set_path = format!("SET search_path TO {schema}");
            let pool = PgPoolOptions::new()
                .max_connections(2)
                .after_connect(move |conn, _meta| {
                    let sql = set_path.clone();
                    Box::pin(async move {
                        conn.execute(sql.as_str()).await?;
                        Ok(())
                    })
                })
                .connect(&url)
                .await
                .expect("connect scoped");
            Self { admin, pool, schema }
        }

        fn store(&self) -> PgMigrationStore {
            PgMigrationStore::new(self.pool.clone())
        }

        async fn relation_exists(&self, name: &str) -> bool {
            let found: Option<String> = sqlx::query_scalar("SELECT to_regclass($1)::text")
                .bind(name)
                .fetch_one(&self.pool)
                .await
                .expect("to_regclass");
            found.is_some()
        }

        async fn cleanup(self) {
            self.pool.close().await;
            self.admin
                .execute(format!("DROP SCHEMA {} CASCADE", self.schema).as_str())
                .await
                .expect("drop schema");
        }
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn latest_is_none_without_tracking_table() {
        let db = Scratch::new().await;
        assert!(db.store().latest().await.expect("latest").is_none());
        db.cleanup().await;
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn failing_statement_undoes_earlier_ddl_and_record() {
        let db = Scratch::new().await;
        let store = db.store();
        store.ensure_table().await.expect("ensure");

        let err = store
            .apply(
                "001_init.sql",
                "CREATE TABLE half_done (id INT); SELECT * FROM no_such_table;",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::Execution { ref unit, .. } if unit == "001_init.sql"));
        assert!(!db.relation_exists("half_done").await);
        assert!(store.applied().await.expect("applied").is_empty());
        db.cleanup().await;
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn batch_stops_at_failing_unit_and_keeps_earlier_commits() {
        let db = Scratch::new().await;
        let dir = scratch_dir(&[
            ("001_init.sql", "CREATE TABLE accounts (id SERIAL PRIMARY KEY);"),
            (
                "002_add_col.sql",
                "ALTER TABLE accounts ADD COLUMN note TEXT; SELECT 1 / 0;",
            ),
            ("003_more.sql", "CREATE TABLE later (id INT);"),
        ]);
        let migrator = Migrator::new(db.store(), &dir);

        let err = migrator.apply().await.unwrap_err();
        assert_eq!(err.unit(), Some("002_add_col.sql"));

        let applied = db.store().applied().await.expect("applied");
        assert_eq!(applied, HashSet::from(["001_init.sql".to_string()]));
        let note_cols: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = 'accounts' AND column_name = 'note'",
        )
        .bind(&db.schema)
        .fetch_one(&db.pool)
        .await
        .expect("columns");
        assert_eq!(note_cols, 0);
        assert!(!db.relation_exists("later").await);

        std::fs::remove_dir_all(dir).ok();
        db.cleanup().await;
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn revert_removes_only_its_own_record() {
        let db = Scratch::new().await;
        let store = db.store();
        store.ensure_table().await.expect("ensure");
        for (unit, script) in [
            ("001_a.sql", "CREATE TABLE t_a (id INT);"),
            ("002_b.sql", "CREATE TABLE t_b (id INT);"),
            ("003_x.sql", "CREATE TABLE t_x (id INT);"),
        ] {
            store.apply(unit, script).await.expect("apply");
        }

        let latest = store.latest().await.expect("latest").expect("some");
        assert_eq!(latest.migration_name, "003_x.sql");

        store
            .revert("003_x.sql", "DROP TABLE t_x;")
            .await
            .expect("revert");
        let applied = store.applied().await.expect("applied");
        assert_eq!(
            applied,
            HashSet::from(["001_a.sql".to_string(), "002_b.sql".to_string()])
        );
        assert!(!db.relation_exists("t_x").await);
        assert!(db.relation_exists("t_b").await);
        let latest = store.latest().await.expect("latest").expect("some");
        assert_eq!(latest.migration_name, "002_b.sql");
        db.cleanup().await;
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn failed_revert_keeps_record_and_table() {
        let db = Scratch::new().await;
        let store = db.store();
        store.ensure_table().await.expect("ensure");
        store
            .apply("001_a.sql", "CREATE TABLE t_a (id INT);")
            .await
            .expect("apply");

        let err = store
            .revert("001_a.sql", "DROP TABLE t_a; DROP TABLE missing;")
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::Execution { .. }));
        assert!(db.relation_exists("t_a").await);
        assert!(store.applied().await.expect("applied").contains("001_a.sql"));
        db.cleanup().await;
    }
}
