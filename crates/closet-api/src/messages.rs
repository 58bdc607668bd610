use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use closet_db::models::MessageRow;
use closet_types::api::{MessageResponse, PageQuery, SendMessageRequest, UnreadResponse};

use crate::common::{parse_time, parse_uuid, require, to_page};
use crate::error::ApiError;
use crate::middleware::Identity;
use crate::{AppState, AppStateInner, run_blocking};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationQuery {
    pub post_id: Uuid,
    pub other_user_id: Uuid,
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let receiver_id = req
        .receiver_id
        .ok_or_else(|| ApiError::validation("receiverId is required"))?;
    let content = require(req.content, "content")?;

    let message = run_blocking(&state, move |s| {
        let sender_id = identity.user_id.to_string();
        if s.db.get_user_by_id(&sender_id)?.is_none() {
            return Err(ApiError::not_found("User not found"));
        }
        let receiver_id = receiver_id.to_string();
        if s.db.get_user_by_id(&receiver_id)?.is_none() {
            return Err(ApiError::not_found("Receiver not found"));
        }

        // The post link is best-effort: an unknown post is dropped rather
        // than failing the send.
        let post_id = match req.post_id.map(|id| id.to_string()) {
            Some(id) if s.db.get_post(&id)?.is_some() => Some(id),
            Some(id) => {
                debug!("Dropping unknown post {} from message", id);
                None
            }
            None => None,
        };

        let message_id = Uuid::new_v4().to_string();
        Ok(s.db.insert_message(
            &message_id,
            &sender_id,
            &receiver_id,
            post_id.as_deref(),
            &content,
        )?)
    })
    .await?;

    info!(
        "Message {} sent {} -> {}",
        message.id, message.sender_id, message.receiver_id
    );

    Ok((StatusCode::CREATED, Json(message_response(message))))
}

pub async fn inbox(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let page = to_page(&query);
    let rows = run_blocking(&state, move |s| {
        Ok(s.db.list_inbox(&identity.user_id.to_string(), page)?)
    })
    .await?;

    Ok(Json(rows.into_iter().map(message_response).collect()))
}

pub async fn sent(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let page = to_page(&query);
    let rows = run_blocking(&state, move |s| {
        Ok(s.db.list_sent(&identity.user_id.to_string(), page)?)
    })
    .await?;

    Ok(Json(rows.into_iter().map(message_response).collect()))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<UnreadResponse>, ApiError> {
    let unread = run_blocking(&state, move |s| {
        Ok(s.db.count_unread(&identity.user_id.to_string())?)
    })
    .await?;

    Ok(Json(UnreadResponse { unread }))
}

/// Both directions between the caller and `otherUserId` about one post,
/// oldest first.
pub async fn conversation(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ConversationQuery>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let rows = run_blocking(&state, move |s| {
        Ok(s.db.get_conversation(
            &query.post_id.to_string(),
            &identity.user_id.to_string(),
            &query.other_user_id.to_string(),
        )?)
    })
    .await?;

    Ok(Json(rows.into_iter().map(message_response).collect()))
}

/// Participants only. A read by the receiver marks the message read; the
/// first read's timestamp sticks.
pub async fn read_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<MessageResponse>, ApiError> {
    let message = run_blocking(&state, move |s| {
        let message = participant_message(s, message_id, identity)?;
        if message.is_read || message.receiver_id != identity.user_id.to_string() {
            return Ok(message);
        }

        if s.db.mark_message_read(&message.id)? {
            debug!("Message {} read by {}", message.id, identity.user_id);
        }
        s.db.get_message(&message.id)?
            .ok_or_else(|| ApiError::not_found("Message not found"))
    })
    .await?;

    Ok(Json(message_response(message)))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<StatusCode, ApiError> {
    run_blocking(&state, move |s| {
        let message = participant_message(s, message_id, identity)?;
        if !s.db.delete_message(&message.id)? {
            return Err(ApiError::not_found("Message not found"));
        }
        Ok(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

fn participant_message(
    s: &AppStateInner,
    message_id: Uuid,
    identity: Identity,
) -> Result<MessageRow, ApiError> {
    let message = s
        .db
        .get_message(&message_id.to_string())?
        .ok_or_else(|| ApiError::not_found("Message not found"))?;

    let me = identity.user_id.to_string();
    if message.sender_id != me && message.receiver_id != me {
        return Err(ApiError::forbidden("You are not a participant of this message"));
    }
    Ok(message)
}

fn message_response(row: MessageRow) -> MessageResponse {
    MessageResponse {
        id: parse_uuid(&row.id, "message id"),
        sender_id: parse_uuid(&row.sender_id, "message sender_id"),
        receiver_id: parse_uuid(&row.receiver_id, "message receiver_id"),
        post_id: row.post_id.as_deref().map(|p| parse_uuid(p, "message post_id")),
        content: row.content,
        is_read: row.is_read,
        created_at: parse_time(&row.created_at),
        read_at: row.read_at.as_deref().map(parse_time),
    }
}
