//! Admin-only endpoints. All routes here sit behind both require_auth and
//! require_admin; handlers can assume an admin token.

use anyhow::anyhow;
use axum::{
    Json,
    extract::{Multipart, Path, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use tracing::info;

use courier_types::api::{AdminGroupResponse, AdminUserResponse, OkResponse};
use courier_types::models::parse_sqlite_datetime;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::settings::settings_object;
use crate::uploads;

pub async fn list_users(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || db.list_users())
        .await
        .map_err(|e| anyhow!("spawn_blocking join error: {}", e))??;

    // Password hashes stay server-side
    let users: Vec<AdminUserResponse> = rows
        .into_iter()
        .map(|row| AdminUserResponse {
            id: row.id,
            phone: row.phone,
            name: row.name,
            is_admin: row.is_admin,
            created_at: parse_sqlite_datetime(&row.created_at)
                .unwrap_or_else(|| DateTime::<Utc>::default()),
        })
        .collect();

    Ok(Json(users))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let deleted = tokio::task::spawn_blocking(move || db.delete_user(user_id))
        .await
        .map_err(|e| anyhow!("spawn_blocking join error: {}", e))??;

    if !deleted {
        return Err(ApiError::NotFound);
    }

    info!("user {} deleted by admin", user_id);
    Ok(Json(OkResponse::ok()))
}

pub async fn make_admin(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let updated = tokio::task::spawn_blocking(move || db.set_admin(user_id))
        .await
        .map_err(|e| anyhow!("spawn_blocking join error: {}", e))??;

    if !updated {
        return Err(ApiError::NotFound);
    }

    info!("user {} promoted to admin", user_id);
    Ok(Json(OkResponse::ok()))
}

pub async fn list_groups(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || db.list_groups_with_counts())
        .await
        .map_err(|e| anyhow!("spawn_blocking join error: {}", e))??;

    let groups: Vec<AdminGroupResponse> = rows
        .into_iter()
        .map(|row| AdminGroupResponse {
            id: row.id,
            name: row.name,
            icon: row.icon,
            created_by: row.created_by,
            created_at: parse_sqlite_datetime(&row.created_at)
                .unwrap_or_else(|| DateTime::<Utc>::default()),
            member_count: row.member_count,
        })
        .collect();

    Ok(Json(groups))
}

pub async fn delete_group(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let deleted = tokio::task::spawn_blocking(move || db.delete_group(group_id))
        .await
        .map_err(|e| anyhow!("spawn_blocking join error: {}", e))??;

    if !deleted {
        return Err(ApiError::NotFound);
    }

    info!("group {} deleted by admin", group_id);
    Ok(Json(OkResponse::ok()))
}

pub async fn get_settings(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let pairs = tokio::task::spawn_blocking(move || db.all_settings())
        .await
        .map_err(|e| anyhow!("spawn_blocking join error: {}", e))??;

    Ok(Json(settings_object(pairs)))
}

/// POST /api/admin/settings — flat JSON object; every key is upserted,
/// last write wins.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Map<String, serde_json::Value>>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();

    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        for (key, value) in body {
            let value = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            db.put_setting(&key, &value)?;
        }
        Ok(())
    })
    .await
    .map_err(|e| anyhow!("spawn_blocking join error: {}", e))??;

    Ok(Json(OkResponse::ok()))
}

/// POST /api/admin/upload-logo — multipart `logo` part; stores the file and
/// points the `logo` setting at its URL.
pub async fn upload_logo(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {}", e)))?
    {
        if field.name() != Some("logo") {
            continue;
        }

        let original_name = field.file_name().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read logo: {}", e)))?;

        let stored = uploads::save_upload(&state.upload_dir, original_name.as_deref(), &data).await?;
        let url = format!("/uploads/{}", stored);

        let db = state.db.clone();
        let setting_url = url.clone();
        tokio::task::spawn_blocking(move || db.put_setting("logo", &setting_url))
            .await
            .map_err(|e| anyhow!("spawn_blocking join error: {}", e))??;

        info!("company logo updated: {}", url);
        return Ok(Json(OkResponse::ok()));
    }

    Err(ApiError::BadRequest("no file uploaded".into()))
}
