use anyhow::anyhow;
use axum::{Json, extract::State, response::IntoResponse};

use crate::auth::AppState;
use crate::error::ApiError;

/// GET /api/settings — public read of the flat key-value settings map
/// (companyName, disabled, logo). Unauthenticated by design: the login
/// screen needs the branding before any token exists.
pub async fn get_settings(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let pairs = tokio::task::spawn_blocking(move || db.all_settings())
        .await
        .map_err(|e| anyhow!("spawn_blocking join error: {}", e))??;

    Ok(Json(settings_object(pairs)))
}

pub fn settings_object(pairs: Vec<(String, String)>) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = pairs
        .into_iter()
        .map(|(k, v)| (k, serde_json::Value::String(v)))
        .collect();
    serde_json::Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_object_shape() {
        let v = settings_object(vec![
            ("companyName".into(), "Acme".into()),
            ("disabled".into(), "false".into()),
        ]);
        assert_eq!(v["companyName"], "Acme");
        assert_eq!(v["disabled"], "false");
        assert!(v.get("logo").is_none());
    }
}
