use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use sidelines_db::models::NewHighlight;
use sidelines_types::api::PostHighlightRequest;
use sidelines_types::events::{ChangeEvent, ChangeRow};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

/// Play-by-play, newest first, with teams joined.
pub async fn get_highlights(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let db = state.clone();
    let highlights = tokio::task::spawn_blocking(move || db.db.get_highlights(channel_id)).await??;
    Ok(Json(highlights))
}

/// Ingest path for the play-by-play producer.
pub async fn post_highlight(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
    Json(req): Json<PostHighlightRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.title.trim().is_empty() {
        return Err(ApiError::Validation("title is required".into()));
    }
    if state.db.get_channel(channel_id)?.is_none() {
        return Err(ApiError::NotFound("channel"));
    }
    if let Some(team_id) = req.team_id {
        if state.db.get_team_badge(team_id)?.is_none() {
            return Err(ApiError::Validation(format!("unknown team {}", team_id)));
        }
    }

    let row = state.db.insert_highlight(
        channel_id,
        &NewHighlight {
            title: req.title.trim(),
            description: &req.description,
            game_time: req.game_time.as_deref(),
            highlight_type: &req.highlight_type,
            team_id: req.team_id,
            media_url: req.media_url.as_deref(),
        },
    )?;

    state.feed.publish(ChangeEvent::insert(ChangeRow::Highlights(row.clone())));
    Ok((StatusCode::CREATED, Json(row)))
}
