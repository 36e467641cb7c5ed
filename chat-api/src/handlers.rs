use axum::{
    extract::{Extension, Path, Query},
    response::Json,
};
use chat_core::types::{Actor, ChatContext, Message, MessagePage, Notification};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::server::ApiState;

/// The caller resolved by the auth middleware, if any.
pub type Caller = Option<Extension<Actor>>;

fn actor(caller: &Caller) -> Option<&Actor> {
    caller.as_ref().map(|Extension(actor)| actor)
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "chat-api"
    }))
}

#[derive(Deserialize)]
pub struct DmThreadRequest {
    pub recipient_id: String,
}

pub async fn get_or_create_dm_thread(
    Extension(state): Extension<ApiState>,
    caller: Caller,
    Json(body): Json<DmThreadRequest>,
) -> ApiResult<Json<ChatContext>> {
    let thread = state.chat.get_or_create_dm_thread(actor(&caller), &body.recipient_id).await?;
    Ok(Json(thread))
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub reply_to_id: Option<Uuid>,
}

pub async fn send_message(
    Extension(state): Extension<ApiState>,
    caller: Caller,
    Path(context_id): Path<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> ApiResult<Json<Message>> {
    let message = state
        .chat
        .send_message(actor(&caller), context_id, &body.content, body.reply_to_id)
        .await?;
    Ok(Json(message))
}

#[derive(Deserialize)]
pub struct DirectMessageRequest {
    pub recipient_id: String,
    pub content: String,
    #[serde(default)]
    pub reply_to_id: Option<Uuid>,
}

pub async fn send_direct_message(
    Extension(state): Extension<ApiState>,
    caller: Caller,
    Json(body): Json<DirectMessageRequest>,
) -> ApiResult<Json<Message>> {
    let message = state
        .chat
        .send_direct_message(actor(&caller), &body.recipient_id, &body.content, body.reply_to_id)
        .await?;
    Ok(Json(message))
}

#[derive(Deserialize)]
pub struct ListMessagesQuery {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

pub async fn list_messages(
    Extension(state): Extension<ApiState>,
    caller: Caller,
    Path(context_id): Path<Uuid>,
    Query(params): Query<ListMessagesQuery>,
) -> ApiResult<Json<MessagePage>> {
    let page = state
        .chat
        .list_messages(actor(&caller), context_id, params.cursor.as_deref(), params.limit)
        .await?;
    Ok(Json(page))
}

#[derive(Deserialize)]
pub struct EditMessageRequest {
    pub content: String,
}

pub async fn edit_message(
    Extension(state): Extension<ApiState>,
    caller: Caller,
    Path(message_id): Path<Uuid>,
    Json(body): Json<EditMessageRequest>,
) -> ApiResult<Json<Message>> {
    let message = state.chat.edit_message(actor(&caller), message_id, &body.content).await?;
    Ok(Json(message))
}

#[derive(Deserialize)]
pub struct DeleteMessageQuery {
    #[serde(default)]
    pub hard: bool,
}

pub async fn delete_message(
    Extension(state): Extension<ApiState>,
    caller: Caller,
    Path(message_id): Path<Uuid>,
    Query(params): Query<DeleteMessageQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let deleted = state.chat.delete_message(actor(&caller), message_id, !params.hard).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

#[derive(Deserialize, Default)]
pub struct MarkReadRequest {
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

pub async fn mark_read(
    Extension(state): Extension<ApiState>,
    caller: Caller,
    Path(context_id): Path<Uuid>,
    body: Option<Json<MarkReadRequest>>,
) -> ApiResult<Json<serde_json::Value>> {
    let at = body.and_then(|Json(b)| b.at);
    let ok = state.chat.mark_read(actor(&caller), context_id, at).await?;
    Ok(Json(json!({ "ok": ok })))
}

pub async fn unread_count(
    Extension(state): Extension<ApiState>,
    caller: Caller,
    Path(context_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let count = state.chat.unread_count(actor(&caller), context_id).await?;
    Ok(Json(json!({ "context_id": context_id, "count": count })))
}

#[derive(Deserialize)]
pub struct ReactionRequest {
    pub emoji: String,
}

pub async fn add_reaction(
    Extension(state): Extension<ApiState>,
    caller: Caller,
    Path(message_id): Path<Uuid>,
    Json(body): Json<ReactionRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let ok = state.chat.add_reaction(actor(&caller), message_id, &body.emoji).await?;
    Ok(Json(json!({ "ok": ok })))
}

pub async fn remove_reaction(
    Extension(state): Extension<ApiState>,
    caller: Caller,
    Path(message_id): Path<Uuid>,
    Json(body): Json<ReactionRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let ok = state.chat.remove_reaction(actor(&caller), message_id, &body.emoji).await?;
    Ok(Json(json!({ "ok": ok })))
}

#[derive(Deserialize)]
pub struct TypingRequest {
    pub is_typing: bool,
}

pub async fn set_typing(
    Extension(state): Extension<ApiState>,
    caller: Caller,
    Path(context_id): Path<Uuid>,
    Json(body): Json<TypingRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let ok = state.chat.set_typing(actor(&caller), context_id, body.is_typing).await?;
    Ok(Json(json!({ "ok": ok })))
}

#[derive(Deserialize)]
pub struct MuteRequest {
    pub muted: bool,
}

pub async fn set_mute(
    Extension(state): Extension<ApiState>,
    caller: Caller,
    Path(context_id): Path<Uuid>,
    Json(body): Json<MuteRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let ok = state.chat.set_mute(actor(&caller), context_id, body.muted).await?;
    Ok(Json(json!({ "ok": ok })))
}

#[derive(Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

pub async fn list_notifications(
    Extension(state): Extension<ApiState>,
    caller: Caller,
    Query(params): Query<NotificationQuery>,
) -> ApiResult<Json<Vec<Notification>>> {
    let notifications = state.chat.list_notifications(actor(&caller), params.limit).await?;
    Ok(Json(notifications))
}

pub async fn mark_notification_read(
    Extension(state): Extension<ApiState>,
    caller: Caller,
    Path(notification_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let ok = state.chat.mark_notification_read(actor(&caller), notification_id).await?;
    Ok(Json(json!({ "ok": ok })))
}
