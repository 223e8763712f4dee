use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Query, State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use courier_api::auth::{self, AppState, AppStateInner};
use courier_api::error::ApiError;
use courier_api::middleware::{require_admin, require_auth};
use courier_api::{admin, chats, contacts, groups, settings, uploads};
use courier_gateway::connection::{self, ConnectedUser};
use courier_gateway::dispatcher::Dispatcher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("COURIER_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("COURIER_DB_PATH").unwrap_or_else(|_| "courier.db".into());
    let host = std::env::var("COURIER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("COURIER_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let upload_dir = PathBuf::from(
        std::env::var("COURIER_UPLOAD_DIR").unwrap_or_else(|_| "uploads".into()),
    );
    let intranet_ranges = match std::env::var("COURIER_INTRANET_RANGES") {
        Ok(spec) => auth::parse_intranet_ranges(&spec)?,
        Err(_) => auth::default_intranet_ranges(),
    };

    // Init database and seed the default admin account
    let db = Arc::new(courier_db::Database::open(&PathBuf::from(&db_path))?);
    if db.get_user_by_phone("admin")?.is_none() {
        let hash = auth::hash_password("admin123")?;
        if db.seed_admin(&hash)? {
            info!("seeded default admin account");
        }
    }

    std::fs::create_dir_all(&upload_dir)?;

    // Shared state
    let dispatcher = Dispatcher::new();
    let state: AppState = Arc::new(AppStateInner {
        db: db.clone(),
        jwt_secret,
        intranet_ranges,
        upload_dir: upload_dir.clone(),
        dispatcher: dispatcher.clone(),
    });

    // Routes
    let public_routes = Router::new()
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/check-intranet", get(auth::check_intranet))
        .route("/api/settings", get(settings::get_settings))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users))
        .route("/users/{id}", delete(admin::delete_user))
        .route("/users/{id}/make-admin", post(admin::make_admin))
        .route("/groups", get(admin::list_groups))
        .route("/groups/{id}", delete(admin::delete_group))
        .route("/settings", get(admin::get_settings).post(admin::update_settings))
        .route("/upload-logo", post(admin::upload_logo))
        .layer(middleware::from_fn(require_admin));

    let protected_routes = Router::new()
        .route("/api/chats", get(chats::list_chats))
        .route("/api/chats/{chat_id}/messages", get(chats::get_messages))
        .route("/api/chats/{chat_id}/read", post(chats::mark_read))
        .route("/api/contacts", get(contacts::list_contacts))
        .route("/api/contacts/search", get(contacts::search_contacts))
        .route("/api/groups", post(groups::create_group))
        .route("/api/upload", post(uploads::upload))
        .nest("/api/admin", admin_routes)
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(state.clone());

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .nest_service("/uploads", ServeDir::new(&upload_dir))
        .layer(DefaultBodyLimit::max(uploads::MAX_UPLOAD_SIZE + 64 * 1024))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Courier server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: String,
}

/// Authenticate the WebSocket upgrade from the `token` query parameter.
/// The token must decode and the user must still exist; deleted users'
/// tokens are rejected here.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let claims =
        auth::decode_token(&state.jwt_secret, &query.token).map_err(|_| ApiError::Forbidden)?;

    let db = state.db.clone();
    let user_id = claims.sub;
    let user = tokio::task::spawn_blocking(move || db.get_user_by_id(user_id))
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??
        .ok_or(ApiError::Forbidden)?;

    let dispatcher = state.dispatcher.clone();
    let db = state.db.clone();
    Ok(ws.on_upgrade(move |socket| {
        connection::handle_connection(
            socket,
            dispatcher,
            db,
            ConnectedUser {
                id: user.id,
                name: user.name,
            },
        )
    }))
}
