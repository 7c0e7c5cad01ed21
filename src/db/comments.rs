use std::collections::HashMap;

use rusqlite::{params, Connection, Row};

use crate::db::models::{Author, Comment, CommentStatus};
use crate::db::optional;

pub struct NewComment<'a> {
    pub content: &'a str,
    pub post_id: i64,
    pub user_id: i64,
    pub parent_id: Option<i64>,
    pub status: CommentStatus,
}

const COMMENT_SELECT: &str = "SELECT c.id, c.content, c.post_id, c.user_id, c.parent_id, c.status,
            c.created_at, c.updated_at, u.id, u.username, u.nickname, u.avatar
     FROM comments c JOIN users u ON u.id = c.user_id";

fn map_comment(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        content: row.get(1)?,
        post_id: row.get(2)?,
        user_id: row.get(3)?,
        parent_id: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        user: Author {
            id: row.get(8)?,
            username: row.get(9)?,
            nickname: row.get(10)?,
            avatar: row.get(11)?,
        },
        replies: Vec::new(),
    })
}

pub fn insert(conn: &Connection, comment: &NewComment<'_>) -> rusqlite::Result<Comment> {
    conn.execute(
        "INSERT INTO comments (content, post_id, user_id, parent_id, status)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            comment.content,
            comment.post_id,
            comment.user_id,
            comment.parent_id,
            comment.status
        ],
    )?;
    let id = conn.last_insert_rowid();
    find(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

/// Live comment by id, whatever its moderation status.
pub fn find(conn: &Connection, id: i64) -> rusqlite::Result<Option<Comment>> {
    optional(conn.query_row(
        &format!("{COMMENT_SELECT} WHERE c.id = ?1 AND c.deleted_at IS NULL"),
        params![id],
        map_comment,
    ))
}

/// Approved comments of a post, nested under their parents. Top-level
/// comments come newest first, replies oldest first. A reply whose parent is
/// not itself visible is hidden along with it.
pub fn approved_thread(conn: &Connection, post_id: i64) -> rusqlite::Result<Vec<Comment>> {
    let mut stmt = conn.prepare(&format!(
        "{COMMENT_SELECT}
         WHERE c.post_id = ?1 AND c.status = 'approved' AND c.deleted_at IS NULL
         ORDER BY c.created_at, c.id"
    ))?;
    let comments = stmt
        .query_map(params![post_id], map_comment)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut roots = thread(comments);
    roots.reverse();
    Ok(roots)
}

/// Build the reply tree from a flat list ordered oldest first.
fn thread(comments: Vec<Comment>) -> Vec<Comment> {
    let mut children: HashMap<Option<i64>, Vec<Comment>> = HashMap::new();
    for comment in comments {
        children.entry(comment.parent_id).or_default().push(comment);
    }

    fn attach(comment: &mut Comment, children: &mut HashMap<Option<i64>, Vec<Comment>>) {
        if let Some(mut replies) = children.remove(&Some(comment.id)) {
            for reply in &mut replies {
                attach(reply, children);
            }
            comment.replies = replies;
        }
    }

    let mut roots = children.remove(&None).unwrap_or_default();
    for root in &mut roots {
        attach(root, &mut children);
    }
    roots
}

/// Moderation queue, oldest first.
pub fn pending(conn: &Connection) -> rusqlite::Result<Vec<Comment>> {
    let mut stmt = conn.prepare(&format!(
        "{COMMENT_SELECT}
         JOIN posts p ON p.id = c.post_id
         WHERE c.status = 'pending' AND c.deleted_at IS NULL AND p.deleted_at IS NULL
         ORDER BY c.created_at, c.id"
    ))?;
    let comments = stmt
        .query_map([], map_comment)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(comments)
}

pub fn set_status(conn: &Connection, id: i64, status: CommentStatus) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE comments SET status = ?2, updated_at = datetime('now')
         WHERE id = ?1 AND deleted_at IS NULL",
        params![id, status],
    )?;
    Ok(())
}

/// Soft-delete a comment together with every reply beneath it. Returns the
/// number of rows affected.
pub fn soft_delete(conn: &Connection, id: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "WITH RECURSIVE subtree(id) AS (
             SELECT ?1
             UNION ALL
             SELECT c.id FROM comments c JOIN subtree s ON c.parent_id = s.id
         )
         UPDATE comments SET deleted_at = datetime('now')
         WHERE id IN (SELECT id FROM subtree) AND deleted_at IS NULL",
        params![id],
    )
}

pub fn soft_delete_for_post(conn: &Connection, post_id: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE comments SET deleted_at = datetime('now')
         WHERE post_id = ?1 AND deleted_at IS NULL",
        params![post_id],
    )
}
