use anyhow::Result;
use rusqlite::{Connection, Row};

use super::OptionalExt;
use crate::models::UserRow;
use crate::{Database, timestamp};

const USER_COLUMNS: &str = "id, email, password, nickname, bio, profile_image_url, personal_email, created_at, updated_at";

impl Database {
    /// Insert a new account. Returns `None` when the email is already taken,
    /// including when a concurrent signup wins the race.
    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        password_hash: &str,
        nickname: &str,
    ) -> Result<Option<UserRow>> {
        self.with_conn_mut(|conn| {
            let now = timestamp();
            let inserted = conn.execute(
                "INSERT INTO users (id, email, password, nickname, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(email) DO NOTHING",
                (id, email, password_hash, nickname, &now),
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            query_user_by_id(conn, id)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_email(conn, email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// Replace the profile fields that are `Some`. Returns the updated row,
    /// or `None` when the user does not exist.
    pub fn update_user_profile(
        &self,
        id: &str,
        nickname: Option<&str>,
        bio: Option<&str>,
        profile_image_url: Option<&str>,
        personal_email: Option<&str>,
    ) -> Result<Option<UserRow>> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET
                    nickname = COALESCE(?2, nickname),
                    bio = COALESCE(?3, bio),
                    profile_image_url = COALESCE(?4, profile_image_url),
                    personal_email = COALESCE(?5, personal_email),
                    updated_at = ?6
                 WHERE id = ?1",
                rusqlite::params![id, nickname, bio, profile_image_url, personal_email, timestamp()],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_user_by_id(conn, id)
        })
    }
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        password: row.get(2)?,
        nickname: row.get(3)?,
        bio: row.get(4)?,
        profile_image_url: row.get(5)?,
        personal_email: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn query_user_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS);
    conn.query_row(&sql, [email], map_user).optional()
}

pub(crate) fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
    conn.query_row(&sql, [id], map_user).optional()
}

#[cfg(test)]
mod tests {
    use crate::test_support::{new_id, seed_user, test_db};

    #[test]
    fn duplicate_email_is_rejected() {
        let (db, _dir) = test_db();
        let first = db
            .create_user(&new_id(), "kim@kyonggi.ac.kr", "hash", "kim")
            .unwrap();
        assert!(first.is_some());

        let second = db
            .create_user(&new_id(), "kim@kyonggi.ac.kr", "hash2", "kim2")
            .unwrap();
        assert!(second.is_none());

        let stored = db.get_user_by_email("kim@kyonggi.ac.kr").unwrap().unwrap();
        assert_eq!(stored.nickname, "kim");
        assert_eq!(stored.bio, "");
    }

    #[test]
    fn profile_update_is_partial() {
        let (db, _dir) = test_db();
        let user = seed_user(&db, "lee");

        let updated = db
            .update_user_profile(&user.id, None, Some("hello"), Some("http://img/1.png"), None)
            .unwrap()
            .unwrap();
        assert_eq!(updated.nickname, "lee");
        assert_eq!(updated.bio, "hello");
        assert_eq!(updated.profile_image_url.as_deref(), Some("http://img/1.png"));
        assert!(updated.personal_email.is_none());
        assert!(updated.updated_at >= updated.created_at);
    }

    #[test]
    fn profile_update_of_missing_user() {
        let (db, _dir) = test_db();
        let res = db
            .update_user_profile(&new_id(), Some("ghost"), None, None, None)
            .unwrap();
        assert!(res.is_none());
    }
}
