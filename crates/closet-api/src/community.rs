use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use closet_db::models::CommunityPostRow;
use closet_db::{CommunitySort, Page};
use closet_types::api::{
    CommentResponse, CommunityPostDetail, CommunityPostSummary, CreateCommentRequest,
    CreateCommunityPostRequest, LikeResponse, UpdateCommunityPostRequest,
};

use crate::common::{MAX_PAGE_SIZE, comment_response, non_blank, parse_time, parse_uuid, require};
use crate::error::ApiError;
use crate::middleware::Identity;
use crate::{AppState, AppStateInner, run_blocking};

const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Default, Deserialize)]
pub struct CommunityListQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub sort: Option<String>,
}

impl CommunityListQuery {
    fn page(&self) -> Page {
        let size = self.size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        Page::new(self.page.unwrap_or(0), size)
    }

    fn sort(&self) -> CommunitySort {
        self.sort
            .as_deref()
            .map(CommunitySort::from_param)
            .unwrap_or_default()
    }
}

pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<CommunityListQuery>,
) -> Result<Json<Vec<CommunityPostSummary>>, ApiError> {
    let (sort, page) = (query.sort(), query.page());
    debug!("Community listing sort={:?} page={:?}", sort, page);

    let rows = run_blocking(&state, move |s| Ok(s.db.list_community_posts(sort, page)?)).await?;

    Ok(Json(rows.into_iter().map(summary).collect()))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<CommunityPostDetail>, ApiError> {
    let detail = run_blocking(&state, move |s| {
        let post = find_post(s, post_id)?;
        load_detail(s, post)
    })
    .await?;

    Ok(Json(detail))
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateCommunityPostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = require(req.title, "title")?;
    let content = require(req.content, "content")?;
    let image_urls = clean_urls(req.image_urls.unwrap_or_default());

    let detail = run_blocking(&state, move |s| {
        let owner_id = identity.user_id.to_string();
        if s.db.get_user_by_id(&owner_id)?.is_none() {
            return Err(ApiError::not_found("User not found"));
        }

        let post_id = Uuid::new_v4().to_string();
        let post = s
            .db
            .create_community_post(&post_id, &owner_id, &title, &content, &image_urls)?;
        load_detail(s, post)
    })
    .await?;

    info!("Community post {} created by {}", detail.id, identity.user_id);

    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn update_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<UpdateCommunityPostRequest>,
) -> Result<Json<CommunityPostDetail>, ApiError> {
    let title = non_blank(req.title);
    let content = non_blank(req.content);
    let image_urls = req.image_urls.map(clean_urls);

    let detail = run_blocking(&state, move |s| {
        let post = find_post(s, post_id)?;
        if post.owner_id != identity.user_id.to_string() {
            return Err(ApiError::forbidden("You can edit only your own post"));
        }

        let updated = s
            .db
            .update_community_post(
                &post.id,
                title.as_deref(),
                content.as_deref(),
                image_urls.as_deref(),
            )?
            .ok_or_else(|| ApiError::not_found("Post not found"))?;
        load_detail(s, updated)
    })
    .await?;

    Ok(Json(detail))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<StatusCode, ApiError> {
    run_blocking(&state, move |s| {
        let post = find_post(s, post_id)?;
        if post.owner_id != identity.user_id.to_string() {
            return Err(ApiError::forbidden("You can delete only your own post"));
        }
        if !s.db.delete_community_post(&post.id)? {
            return Err(ApiError::not_found("Post not found"));
        }
        Ok(())
    })
    .await?;

    info!("Community post {} deleted by {}", post_id, identity.user_id);

    Ok(StatusCode::NO_CONTENT)
}

/// One more like, every call. There is no per-user record yet, so the
/// same user can like repeatedly.
pub async fn like_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<LikeResponse>, ApiError> {
    let like_count = run_blocking(&state, move |s| {
        s.db.like_community_post(&post_id.to_string())?
            .ok_or_else(|| ApiError::not_found("Post not found"))
    })
    .await?;

    debug!("Post {} liked by {} ({})", post_id, identity.user_id, like_count);

    Ok(Json(LikeResponse {
        post_id,
        like_count,
        liked: true,
    }))
}

// -- Comments --

pub async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Vec<CommentResponse>>, ApiError> {
    let rows = run_blocking(&state, move |s| {
        let post = find_post(s, post_id)?;
        Ok(s.db.list_community_comments(&post.id)?)
    })
    .await?;

    Ok(Json(rows.into_iter().map(comment_response).collect()))
}

pub async fn create_comment(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = require(req.content, "content")?;

    let comment = run_blocking(&state, move |s| {
        let author_id = identity.user_id.to_string();
        if s.db.get_user_by_id(&author_id)?.is_none() {
            return Err(ApiError::not_found("User not found"));
        }

        let comment_id = Uuid::new_v4().to_string();
        s.db.create_community_comment(&comment_id, &post_id.to_string(), &author_id, &content)?
            .ok_or_else(|| ApiError::not_found("Post not found"))
    })
    .await?;

    Ok((StatusCode::CREATED, Json(comment_response(comment))))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<StatusCode, ApiError> {
    run_blocking(&state, move |s| {
        let comment = s
            .db
            .get_community_comment(&comment_id.to_string())?
            .ok_or_else(|| ApiError::not_found("Comment not found"))?;
        if comment.author_id != identity.user_id.to_string() {
            return Err(ApiError::forbidden("You can delete only your own comment"));
        }
        if !s.db.delete_community_comment(&comment.id)? {
            return Err(ApiError::not_found("Comment not found"));
        }
        Ok(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

fn find_post(s: &AppStateInner, post_id: Uuid) -> Result<CommunityPostRow, ApiError> {
    s.db.get_community_post(&post_id.to_string())?
        .ok_or_else(|| ApiError::not_found("Post not found"))
}

fn clean_urls(urls: Vec<String>) -> Vec<String> {
    urls.into_iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect()
}

fn load_detail(s: &AppStateInner, post: CommunityPostRow) -> Result<CommunityPostDetail, ApiError> {
    let comments = s
        .db
        .list_community_comments(&post.id)?
        .into_iter()
        .map(comment_response)
        .collect();

    Ok(CommunityPostDetail {
        id: parse_uuid(&post.id, "community post id"),
        title: post.title,
        content: post.content,
        created_at: parse_time(&post.created_at),
        updated_at: parse_time(&post.updated_at),
        author_id: parse_uuid(&post.owner_id, "community post owner_id"),
        author_nickname: post.owner_nickname,
        profile_pic: post.owner_profile_image_url,
        image_urls: post.image_urls,
        like_count: post.like_count,
        comment_count: post.comment_count,
        comments,
    })
}

fn summary(post: CommunityPostRow) -> CommunityPostSummary {
    CommunityPostSummary {
        id: parse_uuid(&post.id, "community post id"),
        thumbnail_url: post.image_urls.first().cloned(),
        title: post.title,
        content: post.content,
        created_at: parse_time(&post.created_at),
        author_id: parse_uuid(&post.owner_id, "community post owner_id"),
        author_nickname: post.owner_nickname,
        profile_pic: post.owner_profile_image_url,
        like_count: post.like_count,
        comment_count: post.comment_count,
    }
}
