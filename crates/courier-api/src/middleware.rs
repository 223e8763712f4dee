use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use courier_types::api::Claims;

use crate::auth::AppState;
use crate::error::ApiError;

/// Extract and validate the JWT from the Authorization header.
/// A missing token is 401; a bad signature or expired token is 403.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthenticated)?;

    let token = auth_header.strip_prefix("Bearer ").unwrap_or(auth_header);

    let claims =
        crate::auth::decode_token(&state.jwt_secret, token).map_err(|_| ApiError::Forbidden)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Admin gate — runs after require_auth, so the claims extension is present.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, ApiError> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .ok_or(ApiError::Unauthenticated)?;

    if !claims.is_admin {
        return Err(ApiError::Forbidden);
    }

    Ok(next.run(req).await)
}
