use anyhow::Result;
use rusqlite::{Connection, Row};
use tracing::debug;

use super::{OptionalExt, placeholders};
use crate::models::{CommentRow, PostRow};
use crate::{Database, Page, timestamp};

const POST_COLUMNS: &str = "id, owner_id, title, content, image_url, created_at, updated_at";

impl Database {
    // -- Posts --

    pub fn create_post(
        &self,
        id: &str,
        owner_id: &str,
        title: &str,
        content: &str,
        image_url: Option<&str>,
    ) -> Result<PostRow> {
        self.with_conn_mut(|conn| {
            let now = timestamp();
            conn.execute(
                "INSERT INTO posts (id, owner_id, title, content, image_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![id, owner_id, title, content, image_url, now],
            )?;
            query_post(conn, id)?.ok_or_else(|| anyhow::anyhow!("Post {} vanished after insert", id))
        })
    }

    pub fn get_post(&self, id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| query_post(conn, id))
    }

    /// Newest first.
    pub fn list_posts(&self, page: Option<Page>) -> Result<Vec<PostRow>> {
        let (limit, offset) = Page::sql_bounds(page);
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM posts ORDER BY created_at DESC, rowid DESC LIMIT ?1 OFFSET ?2",
                POST_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([limit, offset], map_post)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch posts by id, in no particular order. Unknown ids are
    /// skipped.
    pub fn get_posts_by_ids(&self, ids: &[String]) -> Result<Vec<PostRow>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM posts WHERE id IN ({})",
                POST_COLUMNS,
                placeholders(ids.len())
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), map_post)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Replace the fields that are `Some` and bump `updated_at`.
    pub fn update_post(
        &self,
        id: &str,
        title: Option<&str>,
        content: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<Option<PostRow>> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE posts SET
                    title = COALESCE(?2, title),
                    content = COALESCE(?3, content),
                    image_url = COALESCE(?4, image_url),
                    updated_at = ?5
                 WHERE id = ?1",
                rusqlite::params![id, title, content, image_url, timestamp()],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_post(conn, id)
        })
    }

    /// Delete a post and all of its comments in one transaction.
    /// Returns false when the post did not exist.
    pub fn delete_post(&self, id: &str) -> Result<bool> {
        self.with_tx(|tx| {
            let comments = tx.execute("DELETE FROM comments WHERE post_id = ?1", [id])?;
            let posts = tx.execute("DELETE FROM posts WHERE id = ?1", [id])?;
            debug!("Deleted post {} ({} comments)", id, comments);
            Ok(posts > 0)
        })
    }

    // -- Comments --

    pub fn create_comment(
        &self,
        id: &str,
        post_id: &str,
        author_id: &str,
        content: &str,
    ) -> Result<CommentRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO comments (id, post_id, author_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, post_id, author_id, content, timestamp()],
            )?;
            query_comment(conn, id)?
                .ok_or_else(|| anyhow::anyhow!("Comment {} vanished after insert", id))
        })
    }

    pub fn get_comment(&self, id: &str) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| query_comment(conn, id))
    }

    /// Oldest first.
    pub fn list_comments(&self, post_id: &str) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| {
            // JOIN users to fetch author nickname in a single query (eliminates N+1)
            let mut stmt = conn.prepare(
                "SELECT c.id, c.post_id, c.author_id, u.nickname, c.content, c.created_at
                 FROM comments c
                 LEFT JOIN users u ON c.author_id = u.id
                 WHERE c.post_id = ?1
                 ORDER BY c.created_at ASC, c.rowid ASC",
            )?;
            let rows = stmt
                .query_map([post_id], map_comment)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_comment(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM comments WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }
}

fn map_post(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        image_url: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Shared with community comments, which select the same column shape.
pub(crate) fn map_comment(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        post_id: row.get(1)?,
        author_id: row.get(2)?,
        author_nickname: row
            .get::<_, Option<String>>(3)?
            .unwrap_or_else(|| "unknown".to_string()),
        content: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn query_post(conn: &Connection, id: &str) -> Result<Option<PostRow>> {
    let sql = format!("SELECT {} FROM posts WHERE id = ?1", POST_COLUMNS);
    conn.query_row(&sql, [id], map_post).optional()
}

fn query_comment(conn: &Connection, id: &str) -> Result<Option<CommentRow>> {
    conn.query_row(
        "SELECT c.id, c.post_id, c.author_id, u.nickname, c.content, c.created_at
         FROM comments c
         LEFT JOIN users u ON c.author_id = u.id
         WHERE c.id = ?1",
        [id],
        map_comment,
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use crate::Page;
    use crate::test_support::{new_id, seed_user, test_db};

    #[test]
    fn delete_post_cascades_comments() {
        let (db, _dir) = test_db();
        let owner = seed_user(&db, "owner");
        let other = seed_user(&db, "other");

        let post = db
            .create_post(&new_id(), &owner.id, "Coat", "Warm winter coat", None)
            .unwrap();
        for body in ["nice", "still available?", "dm me"] {
            db.create_comment(&new_id(), &post.id, &other.id, body).unwrap();
        }
        assert_eq!(db.list_comments(&post.id).unwrap().len(), 3);

        assert!(db.delete_post(&post.id).unwrap());
        assert!(db.list_comments(&post.id).unwrap().is_empty());
        assert!(db.get_post(&post.id).unwrap().is_none());

        // Second delete finds nothing
        assert!(!db.delete_post(&post.id).unwrap());
    }

    #[test]
    fn comments_are_oldest_first_with_nickname() {
        let (db, _dir) = test_db();
        let owner = seed_user(&db, "park");
        let post = db
            .create_post(&new_id(), &owner.id, "Bag", "Leather bag", Some("http://x/1.png"))
            .unwrap();

        let first = db.create_comment(&new_id(), &post.id, &owner.id, "first").unwrap();
        let second = db.create_comment(&new_id(), &post.id, &owner.id, "second").unwrap();

        let comments = db.list_comments(&post.id).unwrap();
        let ids: Vec<_> = comments.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);
        assert_eq!(comments[0].author_nickname, "park");
    }

    #[test]
    fn update_keeps_unspecified_fields() {
        let (db, _dir) = test_db();
        let owner = seed_user(&db, "choi");
        let post = db
            .create_post(&new_id(), &owner.id, "Old", "Body", Some("http://x/a.png"))
            .unwrap();

        let updated = db.update_post(&post.id, Some("New"), None, None).unwrap().unwrap();
        assert_eq!(updated.title, "New");
        assert_eq!(updated.content, "Body");
        assert_eq!(updated.image_url.as_deref(), Some("http://x/a.png"));
        assert_eq!(updated.owner_id, owner.id);
        assert!(updated.updated_at >= post.updated_at);

        assert!(db.update_post(&new_id(), Some("x"), None, None).unwrap().is_none());
    }

    #[test]
    fn list_and_batch_fetch() {
        let (db, _dir) = test_db();
        let owner = seed_user(&db, "jung");
        let a = db.create_post(&new_id(), &owner.id, "A", "a", None).unwrap();
        let b = db.create_post(&new_id(), &owner.id, "B", "b", None).unwrap();
        let c = db.create_post(&new_id(), &owner.id, "C", "c", None).unwrap();

        let all = db.list_posts(None).unwrap();
        let titles: Vec<_> = all.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["C", "B", "A"]);

        let second_page = db.list_posts(Some(Page::new(1, 2))).unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].id, a.id);

        let found = db
            .get_posts_by_ids(&[b.id.clone(), new_id(), c.id.clone()])
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(db.get_posts_by_ids(&[]).unwrap().is_empty());
    }
}
