use std::path::Path;

use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use courier_types::api::{Claims, UploadResponse};

use crate::auth::AppState;
use crate::error::ApiError;

/// 50 MB upload limit, shared by message attachments, group icons and the
/// company logo.
pub const MAX_UPLOAD_SIZE: usize = 50 * 1024 * 1024;

/// POST /api/upload — multipart `file` part, written to the upload
/// directory under a generated name and served back by relative URL.
pub async fn upload(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let original_name = field.file_name().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {}", e)))?;

        let stored = save_upload(&state.upload_dir, original_name.as_deref(), &data).await?;
        return Ok((
            StatusCode::CREATED,
            Json(UploadResponse {
                url: format!("/uploads/{}", stored),
            }),
        ));
    }

    Err(ApiError::BadRequest("no file uploaded".into()))
}

/// Write one uploaded blob to `dir` and return the stored file name.
/// The name is prefixed with a fresh UUID; the client-supplied name is
/// reduced to a safe suffix so it can never escape the directory.
pub async fn save_upload(
    dir: &Path,
    original_name: Option<&str>,
    data: &[u8],
) -> Result<String, ApiError> {
    if data.is_empty() {
        return Err(ApiError::BadRequest("empty upload".into()));
    }
    if data.len() > MAX_UPLOAD_SIZE {
        return Err(ApiError::PayloadTooLarge);
    }

    let stored_name = match sanitize_file_name(original_name) {
        Some(suffix) => format!("{}-{}", Uuid::new_v4(), suffix),
        None => Uuid::new_v4().to_string(),
    };

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating upload dir {}", dir.display()))
        .map_err(ApiError::from)?;

    let path = dir.join(&stored_name);
    tokio::fs::write(&path, data)
        .await
        .with_context(|| format!("writing upload {}", path.display()))
        .map_err(ApiError::from)?;

    Ok(stored_name)
}

/// Keep only the final path component, restricted to a conservative
/// character set. Returns None when nothing safe is left.
fn sanitize_file_name(original: Option<&str>) -> Option<String> {
    let name = original?;
    let last = name.rsplit(['/', '\\']).next()?;

    let safe: String = last
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();

    let trimmed = safe.trim_matches('.');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(
            sanitize_file_name(Some("photo.png")).as_deref(),
            Some("photo.png")
        );
        assert_eq!(
            sanitize_file_name(Some("../../etc/passwd")).as_deref(),
            Some("passwd")
        );
        assert_eq!(
            sanitize_file_name(Some("C:\\temp\\logo.svg")).as_deref(),
            Some("logo.svg")
        );
        assert_eq!(sanitize_file_name(Some("...")), None);
        assert_eq!(sanitize_file_name(Some("")), None);
        assert_eq!(sanitize_file_name(None), None);
    }

    #[tokio::test]
    async fn test_save_upload_rejects_empty_and_oversized() {
        let dir = std::env::temp_dir().join("courier-upload-test");

        let empty = save_upload(&dir, Some("a.txt"), &[]).await;
        assert!(matches!(empty, Err(ApiError::BadRequest(_))));

        let oversized = vec![0u8; MAX_UPLOAD_SIZE + 1];
        let too_big = save_upload(&dir, Some("a.bin"), &oversized).await;
        assert!(matches!(too_big, Err(ApiError::PayloadTooLarge)));
    }

    #[tokio::test]
    async fn test_save_upload_writes_file() {
        let dir = std::env::temp_dir().join("courier-upload-test");

        let stored = save_upload(&dir, Some("note.txt"), b"hello").await.unwrap();
        assert!(stored.ends_with("-note.txt"));

        let written = tokio::fs::read(dir.join(&stored)).await.unwrap();
        assert_eq!(written, b"hello");
    }
}
