use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name shown for a message whose author could not be resolved.
pub const ANONYMOUS: &str = "Anonymous";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub logo_url: Option<String>,
    pub primary_color: String,
    pub secondary_color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct League {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub logo_url: Option<String>,
}

/// Lifecycle of the game a channel is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelStatus {
    Upcoming,
    Live,
    Completed,
}

impl ChannelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upcoming => "UPCOMING",
            Self::Live => "LIVE",
            Self::Completed => "COMPLETED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "UPCOMING" => Some(Self::Upcoming),
            "LIVE" => Some(Self::Live),
            "COMPLETED" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// One game's chat room, as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub slug: String,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub league_id: i64,
    pub game_date: DateTime<Utc>,
    pub game_status: ChannelStatus,
    pub score_home: i32,
    pub score_away: i32,
    pub game_period: Option<String>,
    pub time_remaining: Option<String>,
    pub venue: Option<String>,
    pub inserted_at: DateTime<Utc>,
}

/// Channel joined with its teams and league.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDetail {
    #[serde(flatten)]
    pub channel: Channel,
    pub home_team: Team,
    pub away_team: Team,
    pub league: League,
}

impl ChannelDetail {
    pub fn id(&self) -> i64 {
        self.channel.id
    }

    /// "Home vs Away", used as the page title.
    pub fn matchup(&self) -> String {
        format!("{} vs {}", self.home_team.name, self.away_team.name)
    }

    /// Scoreline, hidden until the game has started.
    pub fn scoreline(&self) -> Option<String> {
        match self.channel.game_status {
            ChannelStatus::Upcoming => None,
            _ => Some(format!("{}-{}", self.channel.score_home, self.channel.score_away)),
        }
    }
}

/// Public profile fields joined onto a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorProfile {
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl AuthorProfile {
    pub fn anonymous() -> Self {
        Self {
            username: ANONYMOUS.to_string(),
            display_name: None,
            avatar_url: None,
        }
    }

    /// Display name, falling back to the username and then to "Anonymous".
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(Some(self.username.as_str()).filter(|s| !s.is_empty()))
            .unwrap_or(ANONYMOUS)
    }

    /// Avatar fallback letter.
    pub fn initial(&self) -> char {
        self.label().chars().next().unwrap_or('A')
    }
}

/// A message row exactly as the change feed delivers it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: i64,
    pub message: String,
    pub inserted_at: DateTime<Utc>,
    pub user_id: Uuid,
    pub channel_id: i64,
    pub is_pinned: bool,
}

/// A message with its author resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(flatten)]
    pub row: MessageRow,
    pub user: AuthorProfile,
}

impl ChatMessage {
    pub fn id(&self) -> i64 {
        self.row.id
    }
}

/// Team fields joined onto a highlight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamBadge {
    pub name: String,
    pub logo_url: Option<String>,
    pub primary_color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightRow {
    pub id: i64,
    pub channel_id: i64,
    pub title: String,
    pub description: String,
    pub game_time: Option<String>,
    pub highlight_type: String,
    pub inserted_at: DateTime<Utc>,
    pub team_id: Option<i64>,
    pub media_url: Option<String>,
}

/// A play-by-play entry with its team resolved, if it has one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightEntry {
    #[serde(flatten)]
    pub row: HighlightRow,
    pub team: Option<TeamBadge>,
}

impl HighlightEntry {
    pub fn id(&self) -> i64 {
        self.row.id
    }
}

/// Profile row owned by an authenticated account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<UserProfile> for AuthorProfile {
    fn from(p: UserProfile) -> Self {
        Self {
            username: p.username,
            display_name: p.display_name,
            avatar_url: p.avatar_url,
        }
    }
}

/// Scheduled game as published by the schedule importer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpcomingGameRow {
    #[serde(default)]
    pub id: i64,
    pub game_id: String,
    pub game_date: NaiveDate,
    pub game_time: String,
    pub arena: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub home_team_id: i64,
    pub home_team: String,
    pub home_team_abbreviation: String,
    pub away_team_id: i64,
    pub away_team: String,
    pub away_team_abbreviation: String,
    pub broadcast_networks: String,
    pub game_status: String,
    pub season_year: String,
    pub season_stage: String,
    pub is_playoff: bool,
    pub playoff_round: Option<String>,
    pub series_game_number: Option<String>,
    pub series_summary: Option<String>,
}
