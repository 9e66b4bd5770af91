use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::info;

use sidelines_db::models::{NewChannel, NewTeam};
use sidelines_types::api::{ChannelStateUpdate, CreateChannelRequest, CreateTeamRequest, CreatedResponse};
use sidelines_types::events::{ChangeEvent, ChangeRow};
use sidelines_types::models::ChannelStatus;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    /// `all` (default), `live`, `upcoming` or `completed`.
    #[serde(default)]
    pub status: Option<String>,
}

/// Channel list for the feed page, ordered by game date.
pub async fn list_feed(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> ApiResult<impl IntoResponse> {
    let status = match query.status.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("") | Some("all") => None,
        Some("live") => Some(ChannelStatus::Live),
        Some("upcoming") => Some(ChannelStatus::Upcoming),
        Some("completed") => Some(ChannelStatus::Completed),
        Some(other) => return Err(ApiError::Validation(format!("unknown status filter '{}'", other))),
    };

    let db = state.clone();
    let channels = tokio::task::spawn_blocking(move || db.db.list_channel_details(status)).await??;
    Ok(Json(channels))
}

pub async fn get_channel_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let channel = state
        .db
        .get_channel_detail_by_slug(&slug)?
        .ok_or(ApiError::NotFound("channel"))?;
    Ok(Json(channel))
}

pub async fn get_team(
    State(state): State<AppState>,
    Path(team_id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let team = state.db.get_team_badge(team_id)?.ok_or(ApiError::NotFound("team"))?;
    Ok(Json(team))
}

// -- Service endpoints (schedule / feed producers) --

pub async fn create_team(
    State(state): State<AppState>,
    Json(req): Json<CreateTeamRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.name.trim().is_empty() || req.slug.trim().is_empty() {
        return Err(ApiError::Validation("team name and slug are required".into()));
    }
    let id = state.db.create_team(&NewTeam {
        name: req.name.trim(),
        slug: req.slug.trim(),
        logo_url: req.logo_url.as_deref(),
        primary_color: &req.primary_color,
        secondary_color: &req.secondary_color,
    })?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

pub async fn create_channel(
    State(state): State<AppState>,
    Json(req): Json<CreateChannelRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.slug.trim().is_empty() {
        return Err(ApiError::Validation("slug is required".into()));
    }
    if req.home_team_id == req.away_team_id {
        return Err(ApiError::Validation("a team cannot play itself".into()));
    }
    if state.db.get_channel_detail_by_slug(req.slug.trim())?.is_some() {
        return Err(ApiError::Conflict(format!("channel '{}' exists", req.slug.trim())));
    }
    for team_id in [req.home_team_id, req.away_team_id] {
        if state.db.get_team_badge(team_id)?.is_none() {
            return Err(ApiError::Validation(format!("unknown team {}", team_id)));
        }
    }
    let league_id = state
        .db
        .league_id_by_slug(&req.league)?
        .ok_or_else(|| ApiError::Validation(format!("unknown league '{}'", req.league)))?;

    let channel = state.db.create_channel(&NewChannel {
        slug: req.slug.trim(),
        home_team_id: req.home_team_id,
        away_team_id: req.away_team_id,
        league_id,
        game_date: req.game_date,
        game_status: ChannelStatus::Upcoming,
        venue: req.venue.as_deref(),
    })?;

    info!("Channel {} ({}) created", channel.id, channel.slug);
    let id = channel.id;
    state.feed.publish(ChangeEvent::insert(ChangeRow::Channels(channel)));

    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// Score/clock update pushed by the game feed.
pub async fn update_channel_state(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
    Json(req): Json<ChannelStateUpdate>,
) -> ApiResult<impl IntoResponse> {
    let channel = state
        .db
        .update_channel_state(channel_id, &req)?
        .ok_or(ApiError::NotFound("channel"))?;

    state.feed.publish(ChangeEvent::update(ChangeRow::Channels(channel.clone())));
    Ok(Json(channel))
}
