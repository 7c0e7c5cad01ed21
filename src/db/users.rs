use rusqlite::{params, Connection, Row};

use crate::db::models::{Author, Role, User};
use crate::db::optional;
use crate::pagination::Page;

const USER_COLUMNS: &str =
    "id, username, email, password_hash, nickname, avatar, role, created_at, updated_at";

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub nickname: &'a str,
    pub role: Role,
}

/// Fields to overwrite; `None` leaves the column alone.
#[derive(Debug, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub password_hash: Option<String>,
    pub role: Option<Role>,
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        nickname: row.get(4)?,
        avatar: row.get(5)?,
        role: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub fn insert(conn: &Connection, user: &NewUser<'_>) -> rusqlite::Result<User> {
    conn.execute(
        "INSERT INTO users (username, email, password_hash, nickname, role)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user.username,
            user.email,
            user.password_hash,
            user.nickname,
            user.role
        ],
    )?;
    let id = conn.last_insert_rowid();
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![id],
        map_user,
    )
}

/// Live (not soft-deleted) user by id.
pub fn find_active(conn: &Connection, id: i64) -> rusqlite::Result<Option<User>> {
    optional(conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1 AND deleted_at IS NULL"),
        params![id],
        map_user,
    ))
}

pub fn find_by_username(conn: &Connection, username: &str) -> rusqlite::Result<Option<User>> {
    optional(conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1 AND deleted_at IS NULL"),
        params![username],
        map_user,
    ))
}

/// Usernames stay reserved after a soft delete, so this checks every row.
pub fn username_taken(conn: &Connection, username: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE username = ?1",
        params![username],
        |row| row.get(0),
    )
}

pub fn email_taken(conn: &Connection, email: &str, exclude_id: Option<i64>) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE email = ?1 AND id != ?2",
        params![email, exclude_id.unwrap_or(0)],
        |row| row.get(0),
    )
}

pub fn list(conn: &Connection, page: Page) -> rusqlite::Result<(Vec<User>, i64)> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE deleted_at IS NULL",
        [],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL
         ORDER BY id LIMIT ?1 OFFSET ?2"
    ))?;
    let users = stmt
        .query_map(params![page.limit(), page.offset()], map_user)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok((users, total))
}

pub fn update(conn: &Connection, id: i64, changes: &UserChanges) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET
            email = COALESCE(?2, email),
            nickname = COALESCE(?3, nickname),
            avatar = COALESCE(?4, avatar),
            password_hash = COALESCE(?5, password_hash),
            role = COALESCE(?6, role),
            updated_at = datetime('now')
         WHERE id = ?1 AND deleted_at IS NULL",
        params![
            id,
            changes.email,
            changes.nickname,
            changes.avatar,
            changes.password_hash,
            changes.role
        ],
    )?;
    Ok(())
}

pub fn soft_delete(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    let rows = conn.execute(
        "UPDATE users SET deleted_at = datetime('now') WHERE id = ?1 AND deleted_at IS NULL",
        params![id],
    )?;
    Ok(rows > 0)
}

/// Public author view. Deleted authors still resolve so their old posts and
/// comments keep rendering.
pub fn author(conn: &Connection, id: i64) -> rusqlite::Result<Author> {
    conn.query_row(
        "SELECT id, username, nickname, avatar FROM users WHERE id = ?1",
        params![id],
        |row| {
            Ok(Author {
                id: row.get(0)?,
                username: row.get(1)?,
                nickname: row.get(2)?,
                avatar: row.get(3)?,
            })
        },
    )
}
