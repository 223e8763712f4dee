use anyhow::anyhow;
use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use courier_db::models::UserRow;
use courier_types::api::{Claims, ContactResponse};

use crate::auth::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

pub async fn list_contacts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let user_id = claims.sub;

    let rows = tokio::task::spawn_blocking(move || db.list_contacts(user_id))
        .await
        .map_err(|e| anyhow!("spawn_blocking join error: {}", e))??;

    Ok(Json(to_contacts(rows)))
}

pub async fn search_contacts(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();

    let rows = tokio::task::spawn_blocking(move || db.search_contacts(&query.q))
        .await
        .map_err(|e| anyhow!("spawn_blocking join error: {}", e))??;

    Ok(Json(to_contacts(rows)))
}

fn to_contacts(rows: Vec<UserRow>) -> Vec<ContactResponse> {
    rows.into_iter()
        .map(|row| ContactResponse {
            id: row.id,
            name: row.name,
            phone: row.phone,
        })
        .collect()
}
