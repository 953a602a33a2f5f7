//! Application state, router wiring, and the serve loop.

use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use palaver_store::Database;

use crate::admin;
use crate::assistant::AssistantClient;
use crate::auth;
use crate::channels;
use crate::config::ServerConfig;
use crate::filter::ModerationCache;
use crate::mute::MuteResolver;
use crate::presence::PresenceRegistry;
use crate::rooms::Rooms;
use crate::session;

/// The document store, shared by every handler. Locking it is a suspension
/// point, so store access never blocks the runtime.
pub type SharedStore = Arc<Mutex<Database>>;

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub config: Arc<ServerConfig>,
    pub filter: ModerationCache,
    pub mutes: MuteResolver,
    pub presence: PresenceRegistry,
    pub rooms: Rooms,
    pub assistant: AssistantClient,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(session::ws_handler))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/verify", get(auth::verify))
        .route(
            "/api/channels",
            get(channels::list_channels).post(channels::create_channel),
        )
        .route("/api/channels/available", get(channels::available_channels))
        .route("/api/channels/:channel_id/join", post(channels::join_channel))
        .route("/api/channels/:channel_id/leave", post(channels::leave_channel))
        .route(
            "/api/channels/:channel_id/messages",
            get(channels::channel_messages).post(channels::post_message),
        )
        .route(
            "/api/admin/word-filters",
            get(admin::list_filters).post(admin::add_filter),
        )
        .route(
            "/api/admin/word-filters/:filter_id",
            delete(admin::remove_filter),
        )
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/admin/mute-user", post(admin::mute_user))
        .route("/api/admin/unmute-user", post(admin::unmute_user))
        .route(
            "/api/admin/global-mute",
            get(admin::global_mute_status).post(admin::set_global_mute),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP/WebSocket server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
