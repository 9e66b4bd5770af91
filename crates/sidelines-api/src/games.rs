use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use tracing::error;

use sidelines_types::api::{
    Game, GameStatus, GameTeam, GamesErrorResponse, GamesResponse, PlayoffInfo, Venue,
};
use sidelines_types::display::classify_status;
use sidelines_types::models::UpcomingGameRow;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

const DEFAULT_DAYS: i64 = 7;
const MAX_DAYS: i64 = 366;

/// Query string for `GET /api/games`. Kept as raw strings so malformed
/// values produce the endpoint's own error envelope.
#[derive(Debug, Default, Deserialize)]
pub struct GamesQuery {
    pub days: Option<String>,
    pub team_id: Option<String>,
    pub is_playoff: Option<String>,
}

#[derive(Debug, PartialEq)]
struct GamesFilter {
    days: i64,
    team_id: Option<i64>,
    is_playoff: Option<bool>,
}

impl GamesQuery {
    fn parse(&self) -> Result<GamesFilter, String> {
        let days = match self.days.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => DEFAULT_DAYS,
            Some(raw) => match raw.parse::<i64>() {
                Ok(d) if (0..=MAX_DAYS).contains(&d) => d,
                _ => return Err(format!("days must be an integer between 0 and {}", MAX_DAYS)),
            },
        };

        let team_id = match self.team_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => None,
            Some(raw) => Some(raw.parse::<i64>().map_err(|_| "team_id must be an integer".to_string())?),
        };

        let is_playoff = self
            .is_playoff
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| s == "true");

        Ok(GamesFilter { days, team_id, is_playoff })
    }
}

/// Schedule window starting today, reshaped for game cards.
pub async fn get_games(State(state): State<AppState>, Query(query): Query<GamesQuery>) -> Response {
    let filter = match query.parse() {
        Ok(f) => f,
        Err(message) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(GamesErrorResponse { success: false, error: message }),
            )
                .into_response();
        }
    };

    let today = Utc::now().date_naive();
    match fetch_games(&state, today, &filter).await {
        Ok(data) => Json(GamesResponse {
            success: true,
            count: data.len(),
            data,
        })
        .into_response(),
        Err(e) => {
            error!("Games query failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(GamesErrorResponse {
                    success: false,
                    error: "Failed to fetch NBA games".into(),
                }),
            )
                .into_response()
        }
    }
}

async fn fetch_games(state: &AppState, today: NaiveDate, filter: &GamesFilter) -> anyhow::Result<Vec<Game>> {
    let db = state.clone();
    let end = today + Duration::days(filter.days);
    let (team_id, is_playoff) = (filter.team_id, filter.is_playoff);

    let rows = tokio::task::spawn_blocking(move || db.db.upcoming_games(today, end, team_id, is_playoff)).await??;
    Ok(rows.into_iter().map(to_game).collect())
}

fn to_game(row: UpcomingGameRow) -> Game {
    let (status, time) = classify_status(&row.game_status);
    let score = if status == GameStatus::Upcoming { "-" } else { "0" };

    Game {
        id: row.id,
        game_id: row.game_id,
        status,
        time,
        team_one: GameTeam {
            id: row.home_team_id,
            name: row.home_team,
            abbr: row.home_team_abbreviation,
        },
        team_two: GameTeam {
            id: row.away_team_id,
            name: row.away_team,
            abbr: row.away_team_abbreviation,
        },
        score_one: score.to_string(),
        score_two: score.to_string(),
        venue: Venue {
            arena: row.arena,
            city: row.city,
            state: row.state,
            country: row.country,
        },
        date: row.game_date.format("%Y-%m-%d").to_string(),
        broadcast_on: row.broadcast_networks,
        is_playoff: row.is_playoff,
        playoff_info: PlayoffInfo {
            round: row.playoff_round,
            game_number: row.series_game_number,
            summary: row.series_summary,
        },
    }
}

/// Schedule producer ingest; upserts by external game id.
pub async fn upsert_game(
    State(state): State<AppState>,
    Json(row): Json<UpcomingGameRow>,
) -> ApiResult<impl IntoResponse> {
    if row.game_id.trim().is_empty() {
        return Err(ApiError::Validation("game_id is required".into()));
    }
    let id = state.db.upsert_upcoming_game(&row)?;
    Ok(Json(sidelines_types::api::CreatedResponse { id }))
}
