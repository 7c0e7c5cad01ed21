use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

use crate::db::models::{ArchiveMonth, ArchivedPost, Post, PostStatus};
use crate::db::terms::{self, TermKind};
use crate::db::{comments, optional, users};
use crate::pagination::Page;

/// A post row without its embedded relations.
#[derive(Debug, Clone)]
pub struct PostRow {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: String,
    pub cover_image: String,
    pub status: PostStatus,
    pub view_count: i64,
    pub like_count: i64,
    pub author_id: i64,
    pub created_at: String,
    pub updated_at: String,
}

pub struct NewPost<'a> {
    pub title: &'a str,
    pub slug: &'a str,
    pub content: &'a str,
    pub excerpt: &'a str,
    pub cover_image: &'a str,
    pub status: PostStatus,
    pub author_id: i64,
}

/// List filters. Every field narrows the result; `None` means "any".
#[derive(Debug, Default, Clone)]
pub struct PostFilter {
    pub status: Option<PostStatus>,
    pub category_id: Option<i64>,
    pub tag_id: Option<i64>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub enum PostOrder {
    Newest,
    MostViewed,
}

const POST_COLUMNS: &str = "p.id, p.title, p.slug, p.content, p.excerpt, p.cover_image, \
     p.status, p.view_count, p.like_count, p.author_id, p.created_at, p.updated_at";

fn map_post_row(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
        content: row.get(3)?,
        excerpt: row.get(4)?,
        cover_image: row.get(5)?,
        status: row.get(6)?,
        view_count: row.get(7)?,
        like_count: row.get(8)?,
        author_id: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

/// Attach author, categories and tags. Comments are left for the detail view.
pub fn hydrate(conn: &Connection, row: PostRow) -> rusqlite::Result<Post> {
    Ok(Post {
        author: users::author(conn, row.author_id)?,
        categories: terms::for_post(conn, TermKind::Category, row.id)?,
        tags: terms::for_post(conn, TermKind::Tag, row.id)?,
        comments: None,
        id: row.id,
        title: row.title,
        slug: row.slug,
        content: row.content,
        excerpt: row.excerpt,
        cover_image: row.cover_image,
        status: row.status,
        view_count: row.view_count,
        like_count: row.like_count,
        author_id: row.author_id,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

/// Post with relations plus its approved, threaded comments.
pub fn detail(conn: &Connection, row: PostRow) -> rusqlite::Result<Post> {
    let comments = comments::approved_thread(conn, row.id)?;
    let mut post = hydrate(conn, row)?;
    post.comments = Some(comments);
    Ok(post)
}

pub fn find(conn: &Connection, id: i64) -> rusqlite::Result<Option<PostRow>> {
    optional(conn.query_row(
        &format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.id = ?1 AND p.deleted_at IS NULL"),
        params![id],
        map_post_row,
    ))
}

/// Lower-cased `%keyword%` with `\`, `%` and `_` escaped so they match
/// literally under `ESCAPE '\'`.
fn contains_pattern(keyword: &str) -> String {
    let mut pattern = String::with_capacity(keyword.len() + 2);
    pattern.push('%');
    for c in keyword.to_lowercase().chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn where_clause(filter: &PostFilter) -> (String, Vec<Value>) {
    let mut clauses = vec!["p.deleted_at IS NULL".to_string()];
    let mut args: Vec<Value> = Vec::new();

    if let Some(status) = filter.status {
        args.push(Value::Text(status.as_str().to_string()));
        clauses.push(format!("p.status = ?{}", args.len()));
    }
    if let Some(category_id) = filter.category_id {
        args.push(Value::Integer(category_id));
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM post_categories pc WHERE pc.post_id = p.id AND pc.category_id = ?{})",
            args.len()
        ));
    }
    if let Some(tag_id) = filter.tag_id {
        args.push(Value::Integer(tag_id));
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM post_tags pt WHERE pt.post_id = p.id AND pt.tag_id = ?{})",
            args.len()
        ));
    }
    if let Some(ref search) = filter.search {
        args.push(Value::Text(contains_pattern(search)));
        let n = args.len();
        clauses.push(format!(
            "(unicode_lower(p.title) LIKE ?{n} ESCAPE '\\' \
             OR unicode_lower(p.content) LIKE ?{n} ESCAPE '\\' \
             OR unicode_lower(p.excerpt) LIKE ?{n} ESCAPE '\\')"
        ));
    }

    (clauses.join(" AND "), args)
}

pub fn count(conn: &Connection, filter: &PostFilter) -> rusqlite::Result<i64> {
    let (clause, args) = where_clause(filter);
    conn.query_row(
        &format!("SELECT COUNT(*) FROM posts p WHERE {clause}"),
        params_from_iter(args),
        |row| row.get(0),
    )
}

pub fn list(
    conn: &Connection,
    filter: &PostFilter,
    order: PostOrder,
    limit: i64,
    offset: i64,
) -> rusqlite::Result<Vec<Post>> {
    let (clause, mut args) = where_clause(filter);
    let order_by = match order {
        PostOrder::Newest => "p.created_at DESC, p.id DESC",
        PostOrder::MostViewed => "p.view_count DESC, p.id DESC",
    };
    args.push(Value::Integer(limit));
    args.push(Value::Integer(offset));
    let sql = format!(
        "SELECT {POST_COLUMNS} FROM posts p WHERE {clause} ORDER BY {order_by} LIMIT ?{} OFFSET ?{}",
        args.len() - 1,
        args.len()
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(args), map_post_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(|row| hydrate(conn, row)).collect()
}

/// One page of posts plus the total matching `filter`.
pub fn page(conn: &Connection, filter: &PostFilter, page: Page) -> rusqlite::Result<(Vec<Post>, i64)> {
    let total = count(conn, filter)?;
    let posts = list(conn, filter, PostOrder::Newest, page.limit(), page.offset())?;
    Ok((posts, total))
}

/// Slugs stay reserved after a soft delete, matching the UNIQUE constraint.
pub fn slug_taken(conn: &Connection, slug: &str, exclude_id: Option<i64>) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE slug = ?1 AND id != ?2",
        params![slug, exclude_id.unwrap_or(0)],
        |row| row.get(0),
    )
}

pub fn insert(conn: &Connection, post: &NewPost<'_>) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO posts (title, slug, content, excerpt, cover_image, status, author_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            post.title,
            post.slug,
            post.content,
            post.excerpt,
            post.cover_image,
            post.status,
            post.author_id
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Write back every editable column of `post`.
pub fn update(conn: &Connection, post: &PostRow) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE posts SET title = ?2, slug = ?3, content = ?4, excerpt = ?5, cover_image = ?6,
            status = ?7, updated_at = datetime('now')
         WHERE id = ?1 AND deleted_at IS NULL",
        params![
            post.id,
            post.title,
            post.slug,
            post.content,
            post.excerpt,
            post.cover_image,
            post.status
        ],
    )?;
    Ok(())
}

/// Remove the post's associations, soft-delete its comments and then the
/// post itself. Callers run this inside a transaction.
pub fn soft_delete(conn: &Connection, id: i64) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM post_categories WHERE post_id = ?1", params![id])?;
    conn.execute("DELETE FROM post_tags WHERE post_id = ?1", params![id])?;
    comments::soft_delete_for_post(conn, id)?;
    conn.execute(
        "UPDATE posts SET deleted_at = datetime('now') WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

pub fn increment_views(conn: &Connection, id: i64) -> rusqlite::Result<i64> {
    conn.query_row(
        "UPDATE posts SET view_count = view_count + 1
         WHERE id = ?1 AND deleted_at IS NULL RETURNING view_count",
        params![id],
        |row| row.get(0),
    )
}

pub fn increment_likes(conn: &Connection, id: i64) -> rusqlite::Result<i64> {
    conn.query_row(
        "UPDATE posts SET like_count = like_count + 1
         WHERE id = ?1 AND deleted_at IS NULL RETURNING like_count",
        params![id],
        |row| row.get(0),
    )
}

/// Published posts grouped by month of creation, newest month first.
pub fn archive(conn: &Connection) -> rusqlite::Result<Vec<ArchiveMonth>> {
    let mut stmt = conn.prepare(
        "SELECT strftime('%Y-%m', created_at), id, title, slug, created_at
         FROM posts
         WHERE status = 'published' AND deleted_at IS NULL
         ORDER BY created_at DESC, id DESC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                ArchivedPost {
                    id: row.get(1)?,
                    title: row.get(2)?,
                    slug: row.get(3)?,
                    created_at: row.get(4)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut months: Vec<ArchiveMonth> = Vec::new();
    for (year_month, post) in rows {
        match months.last_mut() {
            Some(month) if month.year_month == year_month => month.posts.push(post),
            _ => months.push(ArchiveMonth {
                year_month,
                posts: vec![post],
            }),
        }
    }
    Ok(months)
}
