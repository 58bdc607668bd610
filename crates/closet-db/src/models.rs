//! Database row types: these map directly to SQLite rows.
//! Distinct from closet-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub nickname: String,
    pub bio: String,
    pub profile_image_url: Option<String>,
    pub personal_email: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct PostRow {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A comment joined with its author's nickname. Shared by marketplace and
/// community comments.
pub struct CommentRow {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub author_nickname: String,
    pub content: String,
    pub created_at: String,
}

pub struct CommunityPostRow {
    pub id: String,
    pub owner_id: String,
    pub owner_nickname: String,
    pub owner_profile_image_url: Option<String>,
    pub title: String,
    pub content: String,
    pub image_urls: Vec<String>,
    pub like_count: i64,
    pub comment_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub post_id: Option<String>,
    pub content: String,
    pub is_read: bool,
    pub created_at: String,
    pub read_at: Option<String>,
}
