use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    /// Failure talking to the database outside of a unit's own statements.
    #[error("database error during {step}: {source}")]
    Connection {
        step: &'static str,
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to read {}: {source}", path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to execute migration {unit}: {source}")]
    Execution {
        unit: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("failed to record migration {unit}: {source}")]
    Record {
        unit: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("no migrations have been applied")]
    NoMigrationsApplied,
    #[error("rollback file {0} does not exist")]
    MissingRollbackScript(String),
}

impl MigrationError {
    /// Unit the failure belongs to, if any.
    pub fn unit(&self) -> Option<&str> {
        match self {
            MigrationError::Execution { unit, .. } | MigrationError::Record { unit, .. } => {
                Some(unit)
            }
            _ => None,
        }
    }
}
