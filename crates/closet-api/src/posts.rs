use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use closet_db::models::{PostRow, UserRow};
use closet_types::api::{
    CommentResponse, CreateCommentRequest, CreatePostRequest, PageQuery, PostDetail,
    PostSummary, UpdatePostRequest, UserSummary,
};

use crate::common::{comment_response, non_blank, parse_time, parse_uuid, require, to_page};
use crate::error::ApiError;
use crate::middleware::Identity;
use crate::{AppState, AppStateInner, run_blocking};

pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<PostSummary>>, ApiError> {
    let page = to_page(&query);
    let rows = run_blocking(&state, move |s| Ok(s.db.list_posts(page)?)).await?;

    Ok(Json(rows.into_iter().map(post_summary).collect()))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<PostDetail>, ApiError> {
    let detail = run_blocking(&state, move |s| {
        let post = s
            .db
            .get_post(&post_id.to_string())?
            .ok_or_else(|| ApiError::not_found("Post not found"))?;
        load_detail(s, post)
    })
    .await?;

    Ok(Json(detail))
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = require(req.title, "title")?;
    let content = require(req.content, "content")?;
    let image_url = non_blank(req.image_url);

    let detail = run_blocking(&state, move |s| {
        let owner_id = identity.user_id.to_string();
        if s.db.get_user_by_id(&owner_id)?.is_none() {
            return Err(ApiError::not_found("User not found"));
        }

        let post_id = Uuid::new_v4().to_string();
        let post = s
            .db
            .create_post(&post_id, &owner_id, &title, &content, image_url.as_deref())?;
        load_detail(s, post)
    })
    .await?;

    info!("Post {} created by {}", detail.id, identity.user_id);

    Ok((StatusCode::CREATED, Json(detail)))
}

/// PUT and PATCH share these partial-update semantics.
pub async fn update_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<UpdatePostRequest>,
) -> Result<Json<PostDetail>, ApiError> {
    let title = non_blank(req.title);
    let content = non_blank(req.content);

    let detail = run_blocking(&state, move |s| {
        let post = owned_post(s, post_id, identity, "You can edit only your own post")?;
        let updated = s
            .db
            .update_post(
                &post.id,
                title.as_deref(),
                content.as_deref(),
                req.image_url.as_deref(),
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
        let post = owned_post(s, post_id, identity, "You can delete only your own post")?;
        if !s.db.delete_post(&post.id)? {
            return Err(ApiError::not_found("Post not found"));
        }
        Ok(())
    })
    .await?;

    info!("Post {} deleted by {}", post_id, identity.user_id);

    Ok(StatusCode::NO_CONTENT)
}

// -- Comments --

pub async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Vec<CommentResponse>>, ApiError> {
    let rows = run_blocking(&state, move |s| {
        let post_id = post_id.to_string();
        if s.db.get_post(&post_id)?.is_none() {
            return Err(ApiError::not_found("Post not found"));
        }
        Ok(s.db.list_comments(&post_id)?)
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
        let post_id = post_id.to_string();
        let author_id = identity.user_id.to_string();
        if s.db.get_post(&post_id)?.is_none() {
            return Err(ApiError::not_found("Post not found"));
        }
        if s.db.get_user_by_id(&author_id)?.is_none() {
            return Err(ApiError::not_found("User not found"));
        }

        let comment_id = Uuid::new_v4().to_string();
        Ok(s.db.create_comment(&comment_id, &post_id, &author_id, &content)?)
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
            .get_comment(&comment_id.to_string())?
            .ok_or_else(|| ApiError::not_found("Comment not found"))?;
        if comment.author_id != identity.user_id.to_string() {
            return Err(ApiError::forbidden("You can delete only your own comment"));
        }
        if !s.db.delete_comment(&comment.id)? {
            return Err(ApiError::not_found("Comment not found"));
        }
        Ok(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Load a post and check the caller owns it.
fn owned_post(
    s: &AppStateInner,
    post_id: Uuid,
    identity: Identity,
    denied: &str,
) -> Result<PostRow, ApiError> {
    let post = s
        .db
        .get_post(&post_id.to_string())?
        .ok_or_else(|| ApiError::not_found("Post not found"))?;
    if post.owner_id != identity.user_id.to_string() {
        return Err(ApiError::forbidden(denied));
    }
    Ok(post)
}

fn load_detail(s: &AppStateInner, post: PostRow) -> Result<PostDetail, ApiError> {
    let author = s.db.get_user_by_id(&post.owner_id)?.map(user_summary);
    let comments = s
        .db
        .list_comments(&post.id)?
        .into_iter()
        .map(comment_response)
        .collect();

    Ok(PostDetail {
        id: parse_uuid(&post.id, "post id"),
        title: post.title,
        content: post.content,
        image_url: post.image_url,
        created_at: parse_time(&post.created_at),
        updated_at: parse_time(&post.updated_at),
        author,
        comments,
    })
}

pub(crate) fn post_summary(post: PostRow) -> PostSummary {
    PostSummary {
        id: parse_uuid(&post.id, "post id"),
        author_id: parse_uuid(&post.owner_id, "post owner_id"),
        title: post.title,
        content: post.content,
        image_url: post.image_url,
        created_at: parse_time(&post.created_at),
    }
}

fn user_summary(user: UserRow) -> UserSummary {
    UserSummary {
        id: parse_uuid(&user.id, "user id"),
        nickname: user.nickname,
        profile_image_url: user.profile_image_url,
    }
}
