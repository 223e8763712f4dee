use anyhow::anyhow;
use axum::{
    Extension, Json,
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use courier_types::api::{Claims, CreateGroupResponse};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::uploads;

/// POST /api/groups — multipart form: `name` (text), `members` (JSON array
/// of user ids), optional `icon` (file). The group row and all membership
/// rows (creator included) are committed in one transaction; any failure
/// rolls the whole creation back.
pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut name: Option<String> = None;
    let mut member_ids: Option<Vec<i64>> = None;
    let mut icon: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {}", e)))?
    {
        match field.name() {
            Some("name") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("bad name field: {}", e)))?;
                name = Some(text);
            }
            Some("members") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("bad members field: {}", e)))?;
                let ids: Vec<i64> = serde_json::from_str(&text).map_err(|e| {
                    ApiError::BadRequest(format!("members must be a JSON array of ids: {}", e))
                })?;
                member_ids = Some(ids);
            }
            Some("icon") => {
                let original_name = field.file_name().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read icon: {}", e)))?;
                let stored =
                    uploads::save_upload(&state.upload_dir, original_name.as_deref(), &data)
                        .await?;
                icon = Some(format!("/uploads/{}", stored));
            }
            _ => {}
        }
    }

    let name = name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("group name is required".into()))?;
    let member_ids = member_ids.unwrap_or_default();

    let db = state.db.clone();
    let creator = claims.sub;
    let group_name = name.clone();
    let group_id = tokio::task::spawn_blocking(move || {
        db.create_group_with_members(&group_name, icon.as_deref(), creator, &member_ids)
    })
    .await
    .map_err(|e| anyhow!("spawn_blocking join error: {}", e))?
    .map_err(|e| {
        // An unknown member id trips the FK check inside the transaction
        tracing::warn!("group creation by user {} failed: {}", creator, e);
        ApiError::BadRequest("group creation failed: check member ids".into())
    })?;

    info!("group '{}' ({}) created by user {}", name, group_id, creator);

    Ok((
        StatusCode::CREATED,
        Json(CreateGroupResponse {
            success: true,
            group_id,
        }),
    ))
}
