//! Backend-specific pool construction.

#[cfg(feature = "mysql")]
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
#[cfg(feature = "postgres")]
use sqlx::postgres::{PgPool, PgPoolOptions};
#[cfg(feature = "sqlite")]
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::config::DbConnectionConfig;
use crate::error::StoreError;

#[cfg(not(any(feature = "postgres", feature = "mysql", feature = "sqlite")))]
compile_error!(
    "Enable exactly one of the `postgres`, `mysql`, or `sqlite` features for hazrep-store."
);

#[cfg(any(
    all(feature = "postgres", feature = "mysql"),
    all(feature = "postgres", feature = "sqlite"),
    all(feature = "mysql", feature = "sqlite"),
))]
compile_error!(
    "Activate only one backend feature (`postgres`, `mysql`, or `sqlite`) for hazrep-store."
);

#[cfg(feature = "postgres")]
pub type DbPool = PgPool;
#[cfg(feature = "mysql")]
pub type DbPool = MySqlPool;
#[cfg(feature = "sqlite")]
pub type DbPool = SqlitePool;

#[cfg(feature = "postgres")]
pub type DbBackend = sqlx::Postgres;
#[cfg(feature = "mysql")]
pub type DbBackend = sqlx::MySql;
#[cfg(feature = "sqlite")]
pub type DbBackend = sqlx::Sqlite;

#[cfg(feature = "postgres")]
type DbPoolOptions = PgPoolOptions;
#[cfg(feature = "mysql")]
type DbPoolOptions = MySqlPoolOptions;
#[cfg(feature = "sqlite")]
type DbPoolOptions = SqlitePoolOptions;

/// Creates a new backend-specific connection pool.
pub async fn create_pool(config: &DbConnectionConfig) -> Result<DbPool, StoreError> {
    let url = config.url.trim();
    if url.is_empty() {
        return Err(StoreError::EmptyDatabaseUrl);
    }

    // For sqlite, make sure a file-backed database and its parent directory
    // exist before opening the pool; sqlx reports a missing file as an
    // unhelpful "unable to open database file".
    #[cfg(feature = "sqlite")]
    ensure_sqlite_db_file_exists(url)?;

    let mut opts = DbPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout());
    if let Some(idle) = config.idle_timeout() {
        opts = opts.idle_timeout(idle);
    }

    tracing::debug!(db_url = %url, "connecting database pool");
    let pool = opts.connect(url).await?;
    Ok(pool)
}

#[cfg(feature = "sqlite")]
fn ensure_sqlite_db_file_exists(url: &str) -> Result<(), StoreError> {
    let path = match url.strip_prefix("sqlite://") {
        Some(rest) => rest,
        None => return Ok(()),
    };
    // In-memory databases have nothing on disk.
    if path.is_empty() || path.starts_with(':') || path.contains(":memory:") {
        return Ok(());
    }
    let path = std::path::Path::new(path.split('?').next().unwrap_or(path));
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::FileCreation(e.to_string()))?;
        }
    }
    if !path.exists() {
        std::fs::File::create(path).map_err(|e| StoreError::FileCreation(e.to_string()))?;
    }
    Ok(())
}
