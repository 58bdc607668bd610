use axum::{
    Extension, Json,
    extract::{Path, State},
};
use uuid::Uuid;

use closet_db::models::UserRow;
use closet_types::api::{ProfileResponse, ProfileUpdateRequest};

use crate::common::{non_blank, parse_time, parse_uuid};
use crate::error::ApiError;
use crate::middleware::Identity;
use crate::{AppState, run_blocking};

/// Public profile of any user.
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = run_blocking(&state, move |s| {
        s.db.get_user_by_id(&user_id.to_string())?
            .ok_or_else(|| ApiError::not_found("User not found"))
    })
    .await?;

    Ok(Json(profile_response(user)))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<ProfileResponse>, ApiError> {
    get_user(State(state), Path(identity.user_id)).await
}

/// Partial profile update for the acting user. Blank nickname is ignored;
/// the other fields are replaced when present.
pub async fn update_me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<ProfileUpdateRequest>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let nickname = non_blank(req.nickname).map(|n| n.trim().to_string());

    let user = run_blocking(&state, move |s| {
        s.db.update_user_profile(
            &identity.user_id.to_string(),
            nickname.as_deref(),
            req.bio.as_deref(),
            req.profile_image_url.as_deref(),
            req.personal_email.as_deref(),
        )?
        .ok_or_else(|| ApiError::not_found("User not found"))
    })
    .await?;

    Ok(Json(profile_response(user)))
}

fn profile_response(user: UserRow) -> ProfileResponse {
    ProfileResponse {
        id: parse_uuid(&user.id, "user id"),
        email: user.email,
        nickname: user.nickname,
        bio: user.bio,
        profile_image_url: user.profile_image_url,
        personal_email: user.personal_email,
        created_at: parse_time(&user.created_at),
    }
}
