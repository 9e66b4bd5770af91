use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- JWT Claims --

/// Session claims shared by sidelines-api (REST + cookie auth) and
/// sidelines-gateway (WebSocket authentication).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    /// One-time code to be exchanged at `/auth/callback`.
    pub code: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub token: String,
    pub code: String,
}

// -- Messages / highlights --

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub message: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PostHighlightRequest {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub game_time: Option<String>,
    pub highlight_type: String,
    #[serde(default)]
    pub team_id: Option<i64>,
    #[serde(default)]
    pub media_url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelStateUpdate {
    pub game_status: crate::models::ChannelStatus,
    pub score_home: i32,
    pub score_away: i32,
    #[serde(default)]
    pub game_period: Option<String>,
    #[serde(default)]
    pub time_remaining: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTeamRequest {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub logo_url: Option<String>,
    pub primary_color: String,
    pub secondary_color: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: i64,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChannelRequest {
    pub slug: String,
    pub home_team_id: i64,
    pub away_team_id: i64,
    #[serde(default = "default_league")]
    pub league: String,
    pub game_date: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub venue: Option<String>,
}

fn default_league() -> String {
    "nba".to_string()
}

// -- Profiles --

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub email: String,
}

// -- Upcoming games endpoint --

/// Display status of a scheduled game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatus {
    Live,
    Upcoming,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameTeam {
    pub id: i64,
    pub name: String,
    pub abbr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub arena: String,
    pub city: String,
    pub state: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayoffInfo {
    pub round: Option<String>,
    pub game_number: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: i64,
    pub game_id: String,
    pub status: GameStatus,
    pub time: String,
    pub team_one: GameTeam,
    pub team_two: GameTeam,
    pub score_one: String,
    pub score_two: String,
    pub venue: Venue,
    pub date: String,
    pub broadcast_on: String,
    pub is_playoff: bool,
    pub playoff_info: PlayoffInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GamesResponse {
    pub success: bool,
    pub count: usize,
    pub data: Vec<Game>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GamesErrorResponse {
    pub success: bool,
    pub error: String,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
