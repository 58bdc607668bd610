use anyhow::Result;
use rusqlite::{Connection, Row};

use super::OptionalExt;
use crate::models::MessageRow;
use crate::{Database, Page, timestamp};

const MESSAGE_COLUMNS: &str =
    "id, sender_id, receiver_id, post_id, content, is_read, created_at, read_at";

impl Database {
    pub fn insert_message(
        &self,
        id: &str,
        sender_id: &str,
        receiver_id: &str,
        post_id: Option<&str>,
        content: &str,
    ) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, post_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, sender_id, receiver_id, post_id, content, timestamp()],
            )?;
            query_message(conn, id)?
                .ok_or_else(|| anyhow::anyhow!("Message {} vanished after insert", id))
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// Messages received by `user_id`, newest first.
    pub fn list_inbox(&self, user_id: &str, page: Option<Page>) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_box(conn, "receiver_id", user_id, page))
    }

    /// Messages sent by `user_id`, newest first.
    pub fn list_sent(&self, user_id: &str, page: Option<Page>) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_box(conn, "sender_id", user_id, page))
    }

    /// Messages exchanged between two users about one post, oldest first.
    pub fn get_conversation(
        &self,
        post_id: &str,
        user_a: &str,
        user_b: &str,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages
                 WHERE post_id = ?1
                   AND ((sender_id = ?2 AND receiver_id = ?3)
                     OR (sender_id = ?3 AND receiver_id = ?2))
                 ORDER BY created_at ASC, rowid ASC",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([post_id, user_a, user_b], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Flip a message to read and stamp `read_at`, only if it is still
    /// unread. Returns whether this call performed the transition.
    pub fn mark_message_read(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE messages SET is_read = 1, read_at = ?2 WHERE id = ?1 AND is_read = 0",
                [id, timestamp().as_str()],
            )?;
            Ok(n > 0)
        })
    }

    pub fn count_unread(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE receiver_id = ?1 AND is_read = 0",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(n)
        })
    }

    pub fn delete_message(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        post_id: row.get(3)?,
        content: row.get(4)?,
        is_read: row.get(5)?,
        created_at: row.get(6)?,
        read_at: row.get(7)?,
    })
}

fn query_message(conn: &Connection, id: &str) -> Result<Option<MessageRow>> {
    let sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);
    conn.query_row(&sql, [id], map_message).optional()
}

/// `column` is one of two fixed names, never caller input.
fn query_box(
    conn: &Connection,
    column: &str,
    user_id: &str,
    page: Option<Page>,
) -> Result<Vec<MessageRow>> {
    let (limit, offset) = Page::sql_bounds(page);
    let sql = format!(
        "SELECT {} FROM messages WHERE {} = ?1
         ORDER BY created_at DESC, rowid DESC
         LIMIT ?2 OFFSET ?3",
        MESSAGE_COLUMNS, column
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params![user_id, limit, offset], map_message)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
