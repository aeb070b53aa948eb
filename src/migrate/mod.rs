//! Forward-only SQL migrations tracked in the `migrations` table.
//!
//! Each `<name>.sql` file in the migrations directory is a unit; an optional
//! `<stem>_rollback.sql` undoes it. Units are applied in file-name order,
//! each inside its own transaction together with its tracking record.

pub mod error;
pub mod runner;
pub mod store;
pub mod units;

pub use error::MigrationError;
pub use runner::Migrator;
pub use store::{MigrationStore, PgMigrationStore};
