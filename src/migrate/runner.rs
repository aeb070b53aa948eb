use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use super::{
    units::{self, discover, rollback_name},
    MigrationError, MigrationStore,
};

/// Outcome of a successful [`Migrator::apply`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
}

pub struct Migrator<S> {
    store: S,
    dir: PathBuf,
}

impl<S: MigrationStore> Migrator<S> {
    pub fn new(store: S, dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            dir: dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Applies every pending unit in name order, stopping at the first failure.
    ///
    /// Units committed before the failure stay applied. Running this again on
    /// an unchanged directory applies nothing.
    pub async fn apply(&self) -> Result<MigrationReport, MigrationError> {
        self.store.ensure_table().await?;
        let applied = self.store.applied().await?;
        let units = discover(&self.dir).await?;

        for stale in applied.iter().filter(|n| !units.iter().any(|u| &u.name == *n)) {
            warn!(migration = %stale, "applied migration has no script in {}", self.dir.display());
        }

        let mut report = MigrationReport::default();
        for unit in units {
            if applied.contains(&unit.name) {
                debug!(migration = %unit.name, "migration already applied");
                report.skipped.push(unit.name);
                continue;
            }

            info!(migration = %unit.name, "applying migration");
            let script = unit.read_script().await?;
            if let Err(e) = self.store.apply(&unit.name, &script).await {
                error!(migration = %unit.name, error = %e, "migration failed; aborting batch");
                return Err(e);
            }
            info!(migration = %unit.name, "applied migration");
            report.applied.push(unit.name);
        }

        Ok(report)
    }

    /// Rolls back the most recently applied unit and returns its name.
    pub async fn rollback(&self) -> Result<String, MigrationError> {
        let latest = self
            .store
            .latest()
            .await?
            .ok_or(MigrationError::NoMigrationsApplied)?;
        let unit = latest.migration_name;

        let script_name = rollback_name(&unit);
        let path = self.dir.join(&script_name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(MigrationError::MissingRollbackScript(script_name)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MigrationError::MissingRollbackScript(script_name))
            }
            Err(source) => return Err(MigrationError::Discovery { path, source }),
        }
        let script = units::read_script(&path).await?;

        info!(migration = %unit, rollback = %script_name, "rolling back migration");
        self.store.revert(&unit, &script).await?;
        info!(migration = %unit, "rolled back migration");
        Ok(unit)
    }
}
