use anyhow::Result;
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use tracing::debug;

use super::OptionalExt;
use super::posts::map_comment;
use crate::models::{CommentRow, CommunityPostRow};
use crate::{Database, Page, timestamp};

const COMMUNITY_POST_SELECT: &str = "SELECT p.id, p.owner_id, u.nickname, u.profile_image_url, p.title, p.content,
        p.image_urls, p.like_count, p.comment_count, p.created_at, p.updated_at
 FROM community_posts p
 LEFT JOIN users u ON p.owner_id = u.id";

const COMMUNITY_COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.author_id, u.nickname, c.content, c.created_at
 FROM community_comments c
 LEFT JOIN users u ON c.author_id = u.id";

/// Total orders available on the community board listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommunitySort {
    /// Creation time, newest first.
    #[default]
    Latest,
    /// Like count descending, ties broken by creation time descending.
    Popular,
}

impl CommunitySort {
    /// Parse a `sort` query value. Anything but "popular" means latest.
    pub fn from_param(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("popular") {
            Self::Popular
        } else {
            Self::Latest
        }
    }

    fn order_by(self) -> &'static str {
        match self {
            Self::Latest => "p.created_at DESC, p.rowid DESC",
            Self::Popular => "p.like_count DESC, p.created_at DESC, p.rowid DESC",
        }
    }
}

impl Database {
    // -- Community posts --

    pub fn create_community_post(
        &self,
        id: &str,
        owner_id: &str,
        title: &str,
        content: &str,
        image_urls: &[String],
    ) -> Result<CommunityPostRow> {
        let urls = serde_json::to_string(image_urls)?;
        self.with_conn_mut(|conn| {
            let now = timestamp();
            conn.execute(
                "INSERT INTO community_posts (id, owner_id, title, content, image_urls, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![id, owner_id, title, content, urls, now],
            )?;
            query_community_post(conn, id)?
                .ok_or_else(|| anyhow::anyhow!("Community post {} vanished after insert", id))
        })
    }

    pub fn get_community_post(&self, id: &str) -> Result<Option<CommunityPostRow>> {
        self.with_conn(|conn| query_community_post(conn, id))
    }

    pub fn list_community_posts(
        &self,
        sort: CommunitySort,
        page: Page,
    ) -> Result<Vec<CommunityPostRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} ORDER BY {} LIMIT ?1 OFFSET ?2",
                COMMUNITY_POST_SELECT,
                sort.order_by()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([page.limit as i64, page.offset as i64], map_community_post)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_community_post(
        &self,
        id: &str,
        title: Option<&str>,
        content: Option<&str>,
        image_urls: Option<&[String]>,
    ) -> Result<Option<CommunityPostRow>> {
        let urls = image_urls.map(serde_json::to_string).transpose()?;
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE community_posts SET
                    title = COALESCE(?2, title),
                    content = COALESCE(?3, content),
                    image_urls = COALESCE(?4, image_urls),
                    updated_at = ?5
                 WHERE id = ?1",
                rusqlite::params![id, title, content, urls, timestamp()],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_community_post(conn, id)
        })
    }

    /// Delete a community post and its comments in one transaction.
    pub fn delete_community_post(&self, id: &str) -> Result<bool> {
        self.with_tx(|tx| {
            let comments = tx.execute("DELETE FROM community_comments WHERE post_id = ?1", [id])?;
            let posts = tx.execute("DELETE FROM community_posts WHERE id = ?1", [id])?;
            debug!("Deleted community post {} ({} comments)", id, comments);
            Ok(posts > 0)
        })
    }

    /// Unconditionally add one like. Returns the new count, or `None` when
    /// the post does not exist.
    pub fn like_community_post(&self, id: &str) -> Result<Option<i64>> {
        self.with_conn_mut(|conn| {
            conn.query_row(
                "UPDATE community_posts SET like_count = like_count + 1
                 WHERE id = ?1
                 RETURNING like_count",
                [id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    // -- Community comments --

    /// Insert a comment and bump the post's comment counter together.
    /// Returns `None` (and writes nothing) when the post does not exist.
    pub fn create_community_comment(
        &self,
        id: &str,
        post_id: &str,
        author_id: &str,
        content: &str,
    ) -> Result<Option<CommentRow>> {
        self.with_tx(|tx| {
            let bumped = tx.execute(
                "UPDATE community_posts SET comment_count = comment_count + 1 WHERE id = ?1",
                [post_id],
            )?;
            if bumped == 0 {
                return Ok(None);
            }
            tx.execute(
                "INSERT INTO community_comments (id, post_id, author_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, post_id, author_id, content, timestamp()],
            )?;
            query_community_comment(tx, id)
        })
    }

    pub fn get_community_comment(&self, id: &str) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| query_community_comment(conn, id))
    }

    /// Oldest first.
    pub fn list_community_comments(&self, post_id: &str) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE c.post_id = ?1 ORDER BY c.created_at ASC, c.rowid ASC",
                COMMUNITY_COMMENT_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([post_id], map_comment)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Delete a comment and decrement its post's counter (floored at zero)
    /// together.
    pub fn delete_community_comment(&self, id: &str) -> Result<bool> {
        self.with_tx(|tx| {
            let post_id: Option<String> = tx
                .query_row(
                    "SELECT post_id FROM community_comments WHERE id = ?1",
                    [id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(post_id) = post_id else {
                return Ok(false);
            };

            tx.execute("DELETE FROM community_comments WHERE id = ?1", [id])?;
            tx.execute(
                "UPDATE community_posts SET comment_count = MAX(comment_count - 1, 0) WHERE id = ?1",
                [&post_id],
            )?;
            Ok(true)
        })
    }
}

fn map_community_post(row: &Row<'_>) -> rusqlite::Result<CommunityPostRow> {
    let raw_urls: String = row.get(6)?;
    let image_urls: Vec<String> = serde_json::from_str(&raw_urls)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

    Ok(CommunityPostRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        owner_nickname: row
            .get::<_, Option<String>>(2)?
            .unwrap_or_else(|| "unknown".to_string()),
        owner_profile_image_url: row.get(3)?,
        title: row.get(4)?,
        content: row.get(5)?,
        image_urls,
        like_count: row.get(7)?,
        comment_count: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn query_community_post(conn: &Connection, id: &str) -> Result<Option<CommunityPostRow>> {
    let sql = format!("{} WHERE p.id = ?1", COMMUNITY_POST_SELECT);
    conn.query_row(&sql, [id], map_community_post).optional()
}

fn query_community_comment(conn: &Connection, id: &str) -> Result<Option<CommentRow>> {
    let sql = format!("{} WHERE c.id = ?1", COMMUNITY_COMMENT_SELECT);
    conn.query_row(&sql, [id], map_comment).optional()
}
