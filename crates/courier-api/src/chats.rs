use anyhow::anyhow;
use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};

use courier_db::models::MessageRow;
use courier_types::api::{ChatSummary, Claims, MarkReadRequest, MessageResponse, OkResponse};

use crate::auth::AppState;
use crate::error::ApiError;

pub async fn list_chats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let user_id = claims.sub;

    // Run blocking DB work off the async runtime
    let rows = tokio::task::spawn_blocking(move || db.chats_for_user(user_id))
        .await
        .map_err(|e| anyhow!("spawn_blocking join error: {}", e))??;

    let chats: Vec<ChatSummary> = rows
        .into_iter()
        .map(|row| ChatSummary {
            id: row.id,
            name: row.name,
            avatar: row.icon,
            last_message: row.last_message,
            unread_count: row.unread_count,
        })
        .collect();

    Ok(Json(chats))
}

enum HistoryOutcome {
    NotFound,
    NotMember,
    Rows(Vec<MessageRow>),
}

/// Membership gates the read: only current members may fetch a chat's
/// history.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let user_id = claims.sub;

    let outcome = tokio::task::spawn_blocking(move || -> anyhow::Result<HistoryOutcome> {
        if !db.group_exists(chat_id)? {
            return Ok(HistoryOutcome::NotFound);
        }
        if !db.is_member(chat_id, user_id)? {
            return Ok(HistoryOutcome::NotMember);
        }
        Ok(HistoryOutcome::Rows(db.messages_for_chat(chat_id)?))
    })
    .await
    .map_err(|e| anyhow!("spawn_blocking join error: {}", e))??;

    match outcome {
        HistoryOutcome::NotFound => Err(ApiError::NotFound),
        HistoryOutcome::NotMember => Err(ApiError::Forbidden),
        HistoryOutcome::Rows(rows) => {
            let messages: Vec<MessageResponse> =
                rows.into_iter().map(|r| r.into_response()).collect();
            Ok(Json(messages))
        }
    }
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MarkReadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let user_id = claims.sub;

    let is_member = tokio::task::spawn_blocking(move || -> anyhow::Result<bool> {
        if !db.is_member(chat_id, user_id)? {
            return Ok(false);
        }
        db.mark_read(chat_id, user_id, req.last_read_message_id)?;
        Ok(true)
    })
    .await
    .map_err(|e| anyhow!("spawn_blocking join error: {}", e))??;

    if !is_member {
        return Err(ApiError::Forbidden);
    }

    Ok(Json(OkResponse::ok()))
}
