//! Live subscriptions over a WebSocket.
//!
//! `GET /ws?token=<jwt>&stream=<messages|typing|reactions|notifications>&context_id=<uuid>`
//!
//! Browsers cannot set headers on the upgrade request, so the token may come
//! from the query string. Each event is sent as one JSON text frame; the socket
//! is closed when the subscription ends, including when access is revoked.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Extension, Query,
    },
    response::{IntoResponse, Response},
};
use chat_core::types::Actor;
use chat_core::{ChatError, ChatResult};
use chat_messaging::{ChatService, Subscription};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing;
use uuid::Uuid;

use crate::auth::verify_token;
use crate::error::ApiError;
use crate::handlers::Caller;
use crate::server::ApiState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Messages,
    Typing,
    Reactions,
    Notifications,
}

#[derive(Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub token: Option<String>,
    pub stream: StreamKind,
    #[serde(default)]
    pub context_id: Option<Uuid>,
}

async fn open_subscription(
    chat: &ChatService,
    actor: Option<&Actor>,
    stream: StreamKind,
    context_id: Option<Uuid>,
) -> ChatResult<Subscription> {
    let context = || context_id.ok_or_else(|| ChatError::bad_input("context_id is required for this stream"));

    match stream {
        StreamKind::Messages => chat.subscribe_messages(actor, context()?).await,
        StreamKind::Typing => chat.subscribe_typing(actor, context()?).await,
        StreamKind::Reactions => chat.subscribe_reactions(actor, context()?).await,
        StreamKind::Notifications => chat.subscribe_notifications(actor).await,
    }
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Extension(state): Extension<ApiState>,
    caller: Caller,
    Query(params): Query<WsQuery>,
) -> Response {
    let actor = match (caller, params.token.as_deref()) {
        (Some(Extension(actor)), _) => Some(actor),
        (None, Some(token)) => match verify_token(token, &state.jwt_secret) {
            Ok(actor) => Some(actor),
            Err(e) => return ApiError(e).into_response(),
        },
        (None, None) => None,
    };

    // Authorize before upgrading so a denial is an ordinary HTTP error
    let subscription = match open_subscription(&state.chat, actor.as_ref(), params.stream, params.context_id).await {
        Ok(s) => s,
        Err(e) => return ApiError(e).into_response(),
    };

    let user_id = actor.map(|a| a.user_id).unwrap_or_default();
    ws.on_upgrade(move |socket| handle_socket(socket, subscription, user_id))
}

async fn handle_socket(socket: WebSocket, mut subscription: Subscription, user_id: String) {
    tracing::info!("WebSocket subscription opened for user: {}", user_id);

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = subscription.next().await {
            let payload = match serde_json::to_string(&event) {
                Ok(p) => p,
                Err(e) => {
                    tracing::error!("Failed to serialize event: {}", e);
                    continue;
                }
            };
            if let Err(e) = sender.send(WsMessage::Text(payload)).await {
                tracing::debug!("WebSocket send failed: {}", e);
                return;
            }
        }
        let _ = sender.send(WsMessage::Close(None)).await;
    });

    // Client frames are ignored apart from close; axum answers pings itself
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(WsMessage::Close(_)) | Err(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::info!("WebSocket subscription closed for user: {}", user_id);
}
