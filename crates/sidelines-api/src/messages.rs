use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;

use sidelines_types::api::SendMessageRequest;
use sidelines_types::events::{ChangeEvent, ChangeRow};
use sidelines_types::models::MessageRow;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::Claims;

const MAX_MESSAGE_LEN: usize = 2000;

/// Channel history, oldest first, with authors joined.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    // Run blocking DB query off the async runtime
    let db = state.clone();
    let messages = tokio::task::spawn_blocking(move || db.db.get_messages(channel_id)).await??;
    Ok(Json(messages))
}

/// Insert a chat message and publish it on the change feed. The sender sees
/// its own message through its subscription like everyone else.
pub async fn send_message(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.message.trim().is_empty() {
        return Err(ApiError::Validation("message is empty".into()));
    }
    if req.message.chars().count() > MAX_MESSAGE_LEN {
        return Err(ApiError::Validation(format!("message exceeds {} characters", MAX_MESSAGE_LEN)));
    }

    let db = state.clone();
    let user_id = claims.sub;
    let row = tokio::task::spawn_blocking(move || -> anyhow::Result<Option<MessageRow>> {
        if db.db.get_channel(channel_id)?.is_none() {
            return Ok(None);
        }
        db.db.insert_message(channel_id, user_id, &req.message).map(Some)
    })
    .await??
    .ok_or(ApiError::NotFound("channel"))?;

    let delivered = state.feed.publish(ChangeEvent::insert(ChangeRow::Messages(row.clone())));
    debug!("Message {} in channel {} fanned out to {} subscriptions", row.id, channel_id, delivered);

    Ok((StatusCode::CREATED, Json(row)))
}
