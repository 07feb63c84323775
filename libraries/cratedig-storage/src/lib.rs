//! Crate Digger Storage
//!
//! `SQLite` catalog for Crate Digger.
//!
//! Stores imported albums and items and answers the duplicate lookups the
//! import pipeline needs. All writes go through a single-writer transaction.
//!
//! # Architecture
//!
//! - **Vertical Slicing**: `albums` and `items` own their queries
//! - **Single Writer**: [`SqliteCatalog`] hands out one write transaction at a time
//!
//! # Example
//!
//! ```rust,no_run
//! use cratedig_core::{CatalogStore, Identity};
//! use cratedig_storage::{create_pool, run_migrations, SqliteCatalog};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = create_pool("sqlite://library.db").await?;
//! run_migrations(&pool).await?;
//!
//! let catalog = SqliteCatalog::new(pool);
//! let existing = catalog
//!     .find_duplicates(&Identity::Album {
//!         artist: "Portishead".to_string(),
//!         album: "Dummy".to_string(),
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod catalog;
mod error;

// Vertical slices
pub mod albums;
pub mod items;

pub use catalog::{CatalogStats, SqliteCatalog, SqliteCatalogTransaction};
pub use error::StorageError;

use sqlx::migrate::Migrator;
use sqlx::sqlite::SqlitePool;
use tracing::debug;

// Embed migrations into binary
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Run database migrations
///
/// This should be called once when the application starts to ensure
/// the database schema is up to date.
///
/// # Errors
///
/// Returns an error if migrations fail to run
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), StorageError> {
    MIGRATOR.run(pool).await?;
    Ok(())
}

/// Create a new `SQLite` pool
///
/// # Arguments
///
/// * `database_url` - `SQLite` connection string (e.g., `<sqlite://library.db>`)
///
/// # Errors
///
/// Returns an error if the connection fails
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, StorageError> {
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
    use std::str::FromStr;

    debug!(url = database_url, "Creating catalog pool");

    // Parse the URL into options so we can configure SQLite behavior
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(30)); // Wait up to 30s for locks

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
