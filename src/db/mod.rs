pub mod comments;
pub mod models;
pub mod posts;
pub mod terms;
pub mod users;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::functions::FunctionFlags;
use rusqlite::params;
use std::path::Path;

use crate::config::AdminConfig;
use crate::db::models::Role;
use crate::state::DbPool;

pub const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial",
    include_str!("../../migrations/001_initial.sql"),
)];

/// Per-connection pragmas and functions. Foreign keys and the busy timeout
/// are connection scoped in SQLite, so every pooled connection needs them.
fn init_connection(conn: &mut rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;
    register_functions(conn)
}

/// `unicode_lower(text)`: full Unicode lower-casing. The built-in `LOWER()`
/// only folds ASCII.
fn register_functions(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "unicode_lower",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )
}

pub fn create_pool(db_path: &Path, max_size: u32) -> anyhow::Result<DbPool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(db_path).with_init(init_connection);
    let pool = Pool::builder().max_size(max_size.max(1)).build(manager)?;

    let conn = pool.get()?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        ",
    )?;

    Ok(pool)
}

/// Single-connection in-memory pool. Each in-memory connection is its own
/// database, hence the size of one.
pub fn create_memory_pool() -> anyhow::Result<DbPool> {
    let manager = SqliteConnectionManager::memory().with_init(init_connection);
    Ok(Pool::builder().max_size(1).build(manager)?)
}

pub fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    let conn = pool.get()?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM schema_version WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;

        if !already_applied {
            tracing::info!("Applying migration: {}", name);
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT INTO schema_version (name) VALUES (?1)",
                params![name],
            )?;
        }
    }

    tracing::info!("Database migrations complete");
    Ok(())
}

/// Create the configured admin account if it doesn't exist yet. An existing
/// account with that username is left untouched.
pub fn bootstrap_admin(pool: &DbPool, admin: &AdminConfig, bcrypt_cost: u32) -> anyhow::Result<()> {
    let Some((username, email, password)) = admin.credentials() else {
        return Ok(());
    };

    let conn = pool.get()?;
    if users::username_taken(&conn, username)? {
        tracing::debug!("Admin account {} already exists", username);
        return Ok(());
    }

    let password_hash = bcrypt::hash(password, bcrypt_cost)?;
    let user = users::insert(
        &conn,
        &users::NewUser {
            username,
            email: &email,
            password_hash: &password_hash,
            nickname: username,
            role: Role::Admin,
        },
    )?;
    tracing::info!("Created admin account {} (id {})", user.username, user.id);
    Ok(())
}

/// Maps `QueryReturnedNoRows` to `None`.
pub(crate) fn optional<T>(result: rusqlite::Result<T>) -> rusqlite::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}
