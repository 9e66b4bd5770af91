/// Database-side row and insert types. Read paths map straight into
/// sidelines-types models; these cover what only the store needs.
use chrono::{DateTime, Utc};
use sidelines_types::models::ChannelStatus;

pub struct AccountRow {
    pub id: String,
    pub email: String,
    /// Requested at sign-up; becomes the profile username on first callback.
    pub username: String,
    pub password: String,
    pub created_at: String,
}

pub struct NewTeam<'a> {
    pub name: &'a str,
    pub slug: &'a str,
    pub logo_url: Option<&'a str>,
    pub primary_color: &'a str,
    pub secondary_color: &'a str,
}

pub struct NewChannel<'a> {
    pub slug: &'a str,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub league_id: i64,
    pub game_date: DateTime<Utc>,
    pub game_status: ChannelStatus,
    pub venue: Option<&'a str>,
}

pub struct NewHighlight<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub game_time: Option<&'a str>,
    pub highlight_type: &'a str,
    pub team_id: Option<i64>,
    pub media_url: Option<&'a str>,
}
