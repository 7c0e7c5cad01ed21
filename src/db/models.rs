use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Implements string round-tripping, serde and SQLite conversions for a
/// lower-case text enum.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!(
                        "invalid {}: {:?} (expected one of: {})",
                        stringify!($name).to_lowercase(),
                        other,
                        [$($text),+].join(", ")
                    )),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

text_enum!(Role { User => "user", Admin => "admin" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Published,
}

text_enum!(PostStatus { Draft => "draft", Published => "published" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentStatus {
    Pending,
    Approved,
    Rejected,
}

text_enum!(CommentStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

impl CommentStatus {
    /// Status a new comment starts in, given its author's role.
    pub fn initial_for(role: Role) -> Self {
        match role {
            Role::Admin => CommentStatus::Approved,
            Role::User => CommentStatus::Pending,
        }
    }

    /// Moderation can move a comment to approved or rejected from any other
    /// status. Nothing moves back to pending.
    pub fn can_moderate_to(self, target: CommentStatus) -> bool {
        target != CommentStatus::Pending && self != target
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub nickname: String,
    pub avatar: String,
    pub role: Role,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Public view of a user embedded in posts and comments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Author {
    pub id: i64,
    pub username: String,
    pub nickname: String,
    pub avatar: String,
}

/// A category or a tag. Both share one shape and one set of queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Term {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TermWithCount {
    #[serde(flatten)]
    pub term: Term,
    pub post_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Post {
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
    pub author: Author,
    pub categories: Vec<Term>,
    pub tags: Vec<Term>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<Comment>>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub id: i64,
    pub content: String,
    pub post_id: i64,
    pub user_id: i64,
    pub user: Author,
    pub parent_id: Option<i64>,
    pub status: CommentStatus,
    pub replies: Vec<Comment>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchivedPost {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchiveMonth {
    pub year_month: String,
    pub posts: Vec<ArchivedPost>,
}
