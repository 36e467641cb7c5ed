use anyhow::Result;
use axum::{
    extract::Extension,
    middleware,
    routing::{get, post, put},
    Router,
};
use chat_core::config::ServerConfig;
use chat_messaging::ChatService;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing;

use crate::auth;
use crate::handlers;
use crate::websocket;

/// Shared by every request through an `Extension` layer.
#[derive(Clone)]
pub struct ApiState {
    pub chat: ChatService,
    pub jwt_secret: Arc<str>,
}

impl ApiState {
    pub fn new(chat: ChatService, jwt_secret: impl Into<Arc<str>>) -> Self {
        Self { chat, jwt_secret: jwt_secret.into() }
    }
}

fn cors_layer(origins: Option<&str>) -> CorsLayer {
    match origins {
        Some(origins) => {
            let mut cors = CorsLayer::new();
            for origin in origins.split(',').map(str::trim).filter(|o| !o.is_empty()) {
                if let Ok(parsed) = origin.parse::<axum::http::HeaderValue>() {
                    cors = cors.allow_origin(parsed);
                } else {
                    tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                }
            }
            cors.allow_methods(Any).allow_headers(Any)
        }
        None => {
            tracing::warn!("CORS_ORIGINS not set, using permissive CORS. Set CORS_ORIGINS for production!");
            CorsLayer::permissive()
        }
    }
}

pub fn router(state: ApiState, cors_origins: Option<&str>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/ws", get(websocket::websocket_handler))
        .route("/api/v1/dm-threads", post(handlers::get_or_create_dm_thread))
        .route("/api/v1/direct-messages", post(handlers::send_direct_message))
        .route(
            "/api/v1/contexts/:id/messages",
            get(handlers::list_messages).post(handlers::send_message),
        )
        .route("/api/v1/contexts/:id/read", post(handlers::mark_read))
        .route("/api/v1/contexts/:id/unread", get(handlers::unread_count))
        .route("/api/v1/contexts/:id/typing", post(handlers::set_typing))
        .route("/api/v1/contexts/:id/mute", put(handlers::set_mute))
        .route(
            "/api/v1/messages/:id",
            axum::routing::patch(handlers::edit_message).delete(handlers::delete_message),
        )
        .route(
            "/api/v1/messages/:id/reactions",
            post(handlers::add_reaction).delete(handlers::remove_reaction),
        )
        .route("/api/v1/notifications", get(handlers::list_notifications))
        .route("/api/v1/notifications/:id/read", post(handlers::mark_notification_read))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                // Outside auth so rejections still carry CORS headers.
                .layer(cors_layer(cors_origins))
                .layer(Extension(state))
                .layer(middleware::from_fn(auth::auth_middleware)),
        )
}

pub async fn run(state: ApiState, config: &ServerConfig) -> Result<()> {
    let app = router(state, config.cors_origins.as_deref());

    let addr: SocketAddr = format!("{}:{}", config.host, config.api_port).parse()?;
    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
