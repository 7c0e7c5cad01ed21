//! Categories and tags. The two tables are identical apart from their names
//! and join tables, so every query is parameterised by [`TermKind`].

use rusqlite::{params, params_from_iter, Connection, Row};

use crate::db::models::{Term, TermWithCount};
use crate::db::optional;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermKind {
    Category,
    Tag,
}

impl TermKind {
    pub fn table(self) -> &'static str {
        match self {
            TermKind::Category => "categories",
            TermKind::Tag => "tags",
        }
    }

    pub fn join_table(self) -> &'static str {
        match self {
            TermKind::Category => "post_categories",
            TermKind::Tag => "post_tags",
        }
    }

    pub fn join_column(self) -> &'static str {
        match self {
            TermKind::Category => "category_id",
            TermKind::Tag => "tag_id",
        }
    }

    /// Capitalised singular, used in messages.
    pub fn label(self) -> &'static str {
        match self {
            TermKind::Category => "Category",
            TermKind::Tag => "Tag",
        }
    }

    /// How many entries the "hot" listing returns.
    pub fn hot_limit(self) -> i64 {
        match self {
            TermKind::Category => 5,
            TermKind::Tag => 10,
        }
    }
}

#[derive(Debug)]
pub struct NewTerm<'a> {
    pub name: &'a str,
    pub slug: &'a str,
    pub description: Option<&'a str>,
}

const TERM_COLUMNS: &str = "t.id, t.name, t.slug, t.description, t.created_at, t.updated_at";

fn map_term(row: &Row<'_>) -> rusqlite::Result<Term> {
    Ok(Term {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        description: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub fn list(conn: &Connection, kind: TermKind) -> rusqlite::Result<Vec<Term>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TERM_COLUMNS} FROM {} t WHERE t.deleted_at IS NULL ORDER BY t.name",
        kind.table()
    ))?;
    let terms = stmt
        .query_map([], map_term)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(terms)
}

/// Terms ordered by how many live posts use them.
pub fn hot(conn: &Connection, kind: TermKind, limit: i64) -> rusqlite::Result<Vec<TermWithCount>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TERM_COLUMNS}, COUNT(p.id) AS post_count
         FROM {table} t
         LEFT JOIN {join} j ON j.{col} = t.id
         LEFT JOIN posts p ON p.id = j.post_id AND p.deleted_at IS NULL
         WHERE t.deleted_at IS NULL
         GROUP BY t.id
         ORDER BY post_count DESC, t.name
         LIMIT ?1",
        table = kind.table(),
        join = kind.join_table(),
        col = kind.join_column(),
    ))?;
    let terms = stmt
        .query_map(params![limit], |row| {
            Ok(TermWithCount {
                term: map_term(row)?,
                post_count: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(terms)
}

pub fn find(conn: &Connection, kind: TermKind, id: i64) -> rusqlite::Result<Option<Term>> {
    optional(conn.query_row(
        &format!(
            "SELECT {TERM_COLUMNS} FROM {} t WHERE t.id = ?1 AND t.deleted_at IS NULL",
            kind.table()
        ),
        params![id],
        map_term,
    ))
}

/// Names and slugs stay reserved after a soft delete, matching the UNIQUE
/// constraints, so this checks every row except `exclude_id`.
pub fn name_taken(
    conn: &Connection,
    kind: TermKind,
    name: &str,
    exclude_id: Option<i64>,
) -> rusqlite::Result<bool> {
    conn.query_row(
        &format!(
            "SELECT COUNT(*) > 0 FROM {} WHERE name = ?1 AND id != ?2",
            kind.table()
        ),
        params![name, exclude_id.unwrap_or(0)],
        |row| row.get(0),
    )
}

pub fn slug_taken(
    conn: &Connection,
    kind: TermKind,
    slug: &str,
    exclude_id: Option<i64>,
) -> rusqlite::Result<bool> {
    conn.query_row(
        &format!(
            "SELECT COUNT(*) > 0 FROM {} WHERE slug = ?1 AND id != ?2",
            kind.table()
        ),
        params![slug, exclude_id.unwrap_or(0)],
        |row| row.get(0),
    )
}

pub fn insert(conn: &Connection, kind: TermKind, term: &NewTerm<'_>) -> rusqlite::Result<Term> {
    conn.execute(
        &format!(
            "INSERT INTO {} (name, slug, description) VALUES (?1, ?2, ?3)",
            kind.table()
        ),
        params![term.name, term.slug, term.description],
    )?;
    let id = conn.last_insert_rowid();
    find(conn, kind, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

pub fn update(conn: &Connection, kind: TermKind, term: &Term) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "UPDATE {} SET name = ?2, slug = ?3, description = ?4, updated_at = datetime('now')
             WHERE id = ?1 AND deleted_at IS NULL",
            kind.table()
        ),
        params![term.id, term.name, term.slug, term.description],
    )?;
    Ok(())
}

/// Detach the term from every post and soft-delete it. Callers run this
/// inside a transaction.
pub fn soft_delete(conn: &Connection, kind: TermKind, id: i64) -> rusqlite::Result<()> {
    conn.execute(
        &format!("DELETE FROM {} WHERE {} = ?1", kind.join_table(), kind.join_column()),
        params![id],
    )?;
    conn.execute(
        &format!(
            "UPDATE {} SET deleted_at = datetime('now') WHERE id = ?1",
            kind.table()
        ),
        params![id],
    )?;
    Ok(())
}

/// Live terms attached to a post.
pub fn for_post(conn: &Connection, kind: TermKind, post_id: i64) -> rusqlite::Result<Vec<Term>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TERM_COLUMNS} FROM {table} t
         JOIN {join} j ON j.{col} = t.id
         WHERE j.post_id = ?1 AND t.deleted_at IS NULL
         ORDER BY t.name",
        table = kind.table(),
        join = kind.join_table(),
        col = kind.join_column(),
    ))?;
    let terms = stmt
        .query_map(params![post_id], map_term)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(terms)
}

/// Ids from `ids` that don't name a live term.
pub fn missing_ids(conn: &Connection, kind: TermKind, ids: &[i64]) -> rusqlite::Result<Vec<i64>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; ids.len()].join(", ");
    let mut stmt = conn.prepare(&format!(
        "SELECT id FROM {} WHERE deleted_at IS NULL AND id IN ({placeholders})",
        kind.table()
    ))?;
    let found = stmt
        .query_map(params_from_iter(ids.iter()), |row| row.get::<_, i64>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut missing: Vec<i64> = ids.iter().copied().filter(|id| !found.contains(id)).collect();
    missing.dedup();
    Ok(missing)
}

/// Replace the full set of `kind` associations of a post. Callers run this
/// inside a transaction and validate the ids first.
pub fn replace_for_post(
    conn: &Connection,
    kind: TermKind,
    post_id: i64,
    ids: &[i64],
) -> rusqlite::Result<()> {
    conn.execute(
        &format!("DELETE FROM {} WHERE post_id = ?1", kind.join_table()),
        params![post_id],
    )?;
    let mut stmt = conn.prepare(&format!(
        "INSERT OR IGNORE INTO {} (post_id, {}) VALUES (?1, ?2)",
        kind.join_table(),
        kind.join_column()
    ))?;
    for id in ids {
        stmt.execute(params![post_id, id])?;
    }
    Ok(())
}
