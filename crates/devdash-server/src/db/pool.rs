// db/pool.rs
// Async connection pool using deadpool-sqlite
//
// ## pool.run()
// Returns `DevdashError`; use from the service layer and the pipeline:
// ```ignore
// let view = pool.run(move |conn| get_project_sync(conn, &id)).await?;
// ```
//
// ## pool.interact()
// Returns `anyhow::Result`; use in migrations and internal helpers.
//
// ## In-memory testing
// In-memory pools use a shared-cache URI (`file:memdb_xxx?mode=memory&cache=shared`)
// so every pooled connection sees the same database.

use crate::error::DevdashError;
use crate::utils::path_to_string;
use anyhow::{Context, Result};
use deadpool_sqlite::{Config, Hook, Pool, Runtime};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// SQLITE_BUSY (file databases under write contention) or SQLITE_LOCKED
/// (shared-cache in-memory databases).
fn is_rusqlite_contention(err: &rusqlite::Error) -> bool {
    use rusqlite::ffi;
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            ffi::Error {
                code: ffi::ErrorCode::DatabaseBusy | ffi::ErrorCode::DatabaseLocked,
                ..
            },
            _,
        )
    )
}

fn is_devdash_contention(err: &DevdashError) -> bool {
    match err {
        DevdashError::Db(rusqlite_err) => is_rusqlite_contention(rusqlite_err),
        DevdashError::Anyhow(e) => is_sqlite_contention(e),
        _ => false,
    }
}

/// Walk an anyhow chain for a contention error
fn is_sqlite_contention(err: &anyhow::Error) -> bool {
    if let Some(rusqlite_err) = err.downcast_ref::<rusqlite::Error>() {
        return is_rusqlite_contention(rusqlite_err);
    }
    if let Some(devdash_err) = err.downcast_ref::<DevdashError>() {
        return is_devdash_contention(devdash_err);
    }
    false
}

/// Backoff between contention retries
const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_millis(100),
    Duration::from_millis(500),
    Duration::from_millis(2000),
];

async fn retry_with_backoff<F, Fut, R, E>(
    mut op: F,
    is_retryable: impl Fn(&E) -> bool,
) -> std::result::Result<R, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<R, E>>,
    E: std::fmt::Display,
{
    for (attempt, delay) in RETRY_DELAYS.iter().enumerate() {
        match op().await {
            Ok(result) => return Ok(result),
            Err(e) if is_retryable(&e) => {
                tracing::warn!(
                    "SQLite contention on attempt {}/{}, retrying in {:?}",
                    attempt + 1,
                    RETRY_DELAYS.len(),
                    delay
                );
                tokio::time::sleep(*delay).await;
            }
            Err(e) => return Err(e),
        }
    }

    op().await
}

/// Pooled SQLite database with per-connection setup and migrations applied.
pub struct DatabasePool {
    pool: Pool,
    path: Option<PathBuf>,
}

enum DbStorage {
    File(PathBuf),
    InMemory,
}

impl DatabasePool {
    /// Open a pooled database at the given path, creating it if needed.
    pub async fn open(path: &Path) -> Result<Self> {
        Self::open_internal(DbStorage::File(path.to_path_buf())).await
    }

    /// Open a pooled in-memory database.
    ///
    /// Every call gets its own uniquely named database.
    pub async fn open_in_memory() -> Result<Self> {
        Self::open_internal(DbStorage::InMemory).await
    }

    async fn open_internal(storage: DbStorage) -> Result<Self> {
        let (conn_str, path, hook) = match storage {
            DbStorage::File(p) => {
                ensure_parent_directory(&p)?;
                let s = path_to_string(&p);
                let hook = make_file_post_create_hook(p.clone());
                (s, Some(p), hook)
            }
            DbStorage::InMemory => {
                let uri = format!(
                    "file:memdb_{}?mode=memory&cache=shared",
                    uuid::Uuid::new_v4().simple()
                );
                (uri, None, make_memory_post_create_hook())
            }
        };

        let pool = Config::new(&conn_str)
            .builder(Runtime::Tokio1)
            .context("Failed to create pool builder")?
            .max_size(8)
            .post_create(hook)
            .build()
            .context("Failed to build connection pool")?;

        let db_pool = Self { pool, path };

        if let Some(ref db_path) = db_pool.path
            && let Err(e) = Self::backup_before_migration(db_path)
        {
            tracing::warn!("Pre-migration backup failed (continuing anyway): {}", e);
        }

        db_pool.run_migrations().await?;
        Ok(db_pool)
    }

    /// Run a closure with a pooled connection on the blocking thread pool.
    pub async fn interact<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get connection from pool")?;

        conn.interact(move |conn| f(conn))
            .await
            .map_err(|e| anyhow::anyhow!("interact failed: {e}"))?
    }

    /// Best-effort variant of `interact`: failures are logged at debug and dropped.
    pub async fn try_interact<F, R>(&self, label: &str, f: F) -> Option<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        match self.interact(f).await {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!("{}: {}", label, e);
                None
            }
        }
    }

    /// Like `try_interact` but logs failures at warn level.
    pub async fn try_interact_warn<F, R>(&self, label: &str, f: F) -> Option<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        match self.interact(f).await {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("{}: {}", label, e);
                None
            }
        }
    }

    /// Run a closure whose error converts into `DevdashError`.
    pub async fn run<F, R, E>(&self, f: F) -> std::result::Result<R, DevdashError>
    where
        F: FnOnce(&Connection) -> std::result::Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: Into<DevdashError> + Send + 'static,
    {
        self.pool
            .get()
            .await
            .map_err(|e| DevdashError::Other(format!("Failed to get connection: {}", e)))?
            .interact(move |conn| f(conn).map_err(Into::into))
            .await
            .map_err(|e| DevdashError::Other(format!("Database error: {}", e)))?
    }

    /// Like [`run`](Self::run) but retries on SQLite contention.
    ///
    /// The closure must be `Clone` so it can be re-run.
    pub async fn run_with_retry<F, R, E>(&self, f: F) -> std::result::Result<R, DevdashError>
    where
        F: FnOnce(&Connection) -> std::result::Result<R, E> + Send + Clone + 'static,
        R: Send + 'static,
        E: Into<DevdashError> + Send + 'static,
    {
        retry_with_backoff(|| self.run(f.clone()), is_devdash_contention).await
    }

    /// Database file path (None for in-memory).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Snapshot the database with `VACUUM INTO` before migrating.
    /// Keeps at most one backup per database.
    fn backup_before_migration(path: &Path) -> Result<()> {
        let backup_path = path.with_extension("db.pre-migration");

        if !path.exists() {
            return Ok(());
        }

        let conn = Connection::open(path).context("Failed to open DB for backup")?;

        // VACUUM INTO refuses an existing target
        let _ = std::fs::remove_file(&backup_path);

        conn.execute("VACUUM INTO ?1", [backup_path.to_string_lossy().as_ref()])
            .context("Failed to create pre-migration backup")?;

        tracing::info!("Created pre-migration backup: {}", backup_path.display());
        Ok(())
    }

    async fn run_migrations(&self) -> Result<()> {
        self.interact(|conn| {
            super::schema::run_all_migrations(conn)?;
            if let Err(e) = conn.execute_batch("PRAGMA optimize") {
                tracing::debug!("PRAGMA optimize skipped: {}", e);
            }
            Ok(())
        })
        .await
    }

    /// Get pool status for monitoring.
    pub fn status(&self) -> PoolStatus {
        let status = self.pool.status();
        PoolStatus {
            size: status.size,
            available: status.available,
            waiting: status.waiting,
        }
    }
}

/// Pool status for monitoring.
#[derive(Debug, Clone)]
pub struct PoolStatus {
    pub size: usize,
    pub available: usize,
    pub waiting: usize,
}

/// Ensure parent directory exists (0o700 on Unix).
fn ensure_parent_directory(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
        #[cfg(unix)]
        {
            let mut perms = std::fs::metadata(parent)?.permissions();
            perms.set_mode(0o700);
            std::fs::set_permissions(parent, perms)?;
        }
    }
    Ok(())
}

fn hook_error(stage: &str, e: impl std::fmt::Display) -> deadpool_sqlite::HookError {
    deadpool_sqlite::HookError::Message(format!("{stage}: {e}").into())
}

/// Post-create hook for file databases: PRAGMAs plus 0o600 file mode.
fn make_file_post_create_hook(path: PathBuf) -> Hook {
    Hook::async_fn(move |conn, _metrics| {
        let path_for_perms = path.clone();
        Box::pin(async move {
            conn.interact(move |conn| {
                setup_connection(conn)?;

                #[cfg(unix)]
                if let Ok(metadata) = std::fs::metadata(&path_for_perms) {
                    let mut perms = metadata.permissions();
                    perms.set_mode(0o600);
                    if let Err(e) = std::fs::set_permissions(&path_for_perms, perms) {
                        tracing::warn!("Failed to set database file permissions to 0600: {}", e);
                    }
                }

                Ok::<_, rusqlite::Error>(())
            })
            .await
            .map_err(|e| hook_error("interact failed", e))?
            .map_err(|e| hook_error("connection setup failed", e))
        })
    })
}

/// Post-create hook for in-memory databases (no WAL).
fn make_memory_post_create_hook() -> Hook {
    Hook::async_fn(|conn, _metrics| {
        Box::pin(async move {
            conn.interact(|conn| {
                conn.execute_batch(
                    "PRAGMA foreign_keys=ON; \
                     PRAGMA busy_timeout=5000;",
                )
            })
            .await
            .map_err(|e| hook_error("interact failed", e))?
            .map_err(|e| hook_error("connection setup failed", e))
        })
    })
}

fn setup_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL; \
         PRAGMA foreign_keys=ON; \
         PRAGMA busy_timeout=5000; \
         PRAGMA synchronous=NORMAL;",
    )
}
