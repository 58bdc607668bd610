use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use closet_db::Page;
use closet_db::models::CommentRow;
use closet_types::api::{CommentResponse, PageQuery};

use crate::error::ApiError;

pub(crate) const MAX_PAGE_SIZE: u32 = 100;

/// Without `size` the whole listing is returned.
pub(crate) fn to_page(query: &PageQuery) -> Option<Page> {
    query
        .size
        .map(|size| Page::new(query.page.unwrap_or(0), size.clamp(1, MAX_PAGE_SIZE)))
}

/// A required text field: present and not blank. Returned untrimmed.
pub(crate) fn require(value: Option<String>, field: &str) -> Result<String, ApiError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ApiError::validation(format!("{} is required", field))),
    }
}

/// An optional text field where blank means "leave unchanged".
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub(crate) fn parse_uuid(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::default()
    })
}

pub(crate) fn parse_time(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Rows written by hand through the sqlite shell use
            // "YYYY-MM-DD HH:MM:SS" without timezone.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

pub(crate) fn comment_response(row: CommentRow) -> CommentResponse {
    CommentResponse {
        id: parse_uuid(&row.id, "comment id"),
        post_id: parse_uuid(&row.post_id, "comment post_id"),
        author_id: parse_uuid(&row.author_id, "comment author_id"),
        author_nickname: row.author_nickname,
        content: row.content,
        created_at: parse_time(&row.created_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_query_is_optional_and_clamped() {
        assert_eq!(to_page(&PageQuery::default()), None);

        let q = PageQuery { page: Some(2), size: Some(500) };
        assert_eq!(to_page(&q), Some(Page::new(2, MAX_PAGE_SIZE)));

        let q = PageQuery { page: None, size: Some(0) };
        assert_eq!(to_page(&q), Some(Page::new(0, 1)));
    }

    #[test]
    fn require_rejects_blank() {
        assert!(require(None, "title").is_err());
        assert!(require(Some("   ".into()), "title").is_err());
        assert_eq!(require(Some(" x ".into()), "title").unwrap(), " x ");
    }

    #[test]
    fn parse_time_accepts_both_formats() {
        let a = parse_time("2024-03-01T10:00:00.000000Z");
        let b = parse_time("2024-03-01 10:00:00");
        assert_eq!(a, b);
        assert_eq!(parse_time("garbage"), DateTime::<Utc>::default());
    }
}
