use crate::Database;
use crate::models::{AccountRow, NewChannel, NewHighlight, NewTeam};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, Row, types::Type};
use sidelines_types::api::ChannelStateUpdate;
use sidelines_types::models::{
    AuthorProfile, Channel, ChannelDetail, ChannelStatus, ChatMessage, HighlightEntry,
    HighlightRow, League, MessageRow, Team, TeamBadge, UpcomingGameRow, UserProfile,
};
use uuid::Uuid;

const CHANNEL_DETAIL_SELECT: &str = "
    SELECT c.id, c.slug, c.home_team_id, c.away_team_id, c.league_id, c.game_date,
           c.game_status, c.score_home, c.score_away, c.game_period, c.time_remaining,
           c.venue, c.inserted_at,
           h.id, h.name, h.slug, h.logo_url, h.primary_color, h.secondary_color,
           a.id, a.name, a.slug, a.logo_url, a.primary_color, a.secondary_color,
           l.id, l.name, l.slug, l.logo_url
    FROM channels c
    JOIN teams h ON h.id = c.home_team_id
    JOIN teams a ON a.id = c.away_team_id
    JOIN leagues l ON l.id = c.league_id";

const CHANNEL_SELECT: &str = "
    SELECT id, slug, home_team_id, away_team_id, league_id, game_date,
           game_status, score_home, score_away, game_period, time_remaining,
           venue, inserted_at
    FROM channels";

const UPCOMING_GAME_COLUMNS: &str = "
    id, game_id, game_date, game_time, arena, city, state, country,
    home_team_id, home_team, home_team_abbreviation,
    away_team_id, away_team, away_team_abbreviation,
    broadcast_networks, game_status, season_year, season_stage,
    is_playoff, playoff_round, series_game_number, series_summary";

impl Database {
    // -- Accounts --

    pub fn create_account(&self, id: &str, email: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO accounts (id, email, username, password) VALUES (?1, ?2, ?3, ?4)",
                (id, email, username, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn username_taken(&self, username: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT (SELECT COUNT(*) FROM users WHERE username = ?1)
                      + (SELECT COUNT(*) FROM accounts WHERE username = ?1)",
                [username],
                |row| row.get(0),
            )?;
            Ok(n > 0)
        })
    }

    pub fn get_account_by_email(&self, email: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, email, username, password, created_at FROM accounts WHERE email = ?1",
                [email],
                map_account,
            )
            .optional()
        })
    }

    pub fn get_account_by_id(&self, id: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, email, username, password, created_at FROM accounts WHERE id = ?1",
                [id],
                map_account,
            )
            .optional()
        })
    }

    // -- Authorization codes --

    pub fn store_auth_code(&self, digest: &str, account_id: &str, expires_at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO auth_codes (digest, account_id, expires_at) VALUES (?1, ?2, ?3)",
                (digest, account_id, ts_string(expires_at)),
            )?;
            Ok(())
        })
    }

    /// Mark a code used and return its account. A code works once, before expiry.
    pub fn consume_auth_code(&self, digest: &str, now: DateTime<Utc>) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "UPDATE auth_codes SET consumed = 1
                 WHERE digest = ?1 AND consumed = 0 AND expires_at > ?2
                 RETURNING account_id",
                (digest, ts_string(now)),
                |row| row.get(0),
            )
            .optional()
        })
    }

    // -- Profiles --

    pub fn get_profile(&self, id: Uuid) -> Result<Option<UserProfile>> {
        self.with_conn(|conn| query_profile(conn, id))
    }

    /// Create the profile row for `id` unless it already exists.
    /// Returns true when a row was created.
    pub fn create_profile_if_missing(&self, id: Uuid, username: &str) -> Result<bool> {
        self.with_conn(|conn| {
            if query_profile(conn, id)?.is_some() {
                return Ok(false);
            }
            conn.execute(
                "INSERT INTO users (id, username, created_at) VALUES (?1, ?2, ?3)",
                (id.to_string(), username, ts_string(Utc::now())),
            )?;
            Ok(true)
        })
    }

    pub fn update_profile(
        &self,
        id: Uuid,
        display_name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<Option<UserProfile>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET display_name = ?2, avatar_url = ?3 WHERE id = ?1",
                (id.to_string(), display_name, avatar_url),
            )?;
            query_profile(conn, id)
        })
    }

    // -- Leagues / teams --

    pub fn league_id_by_slug(&self, slug: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT id FROM leagues WHERE slug = ?1", [slug], |row| row.get(0))
                .optional()
        })
    }

    pub fn create_team(&self, team: &NewTeam<'_>) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO teams (name, slug, logo_url, primary_color, secondary_color)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (team.name, team.slug, team.logo_url, team.primary_color, team.secondary_color),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_team_badge(&self, id: i64) -> Result<Option<TeamBadge>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT name, logo_url, primary_color FROM teams WHERE id = ?1",
                [id],
                |row| {
                    Ok(TeamBadge {
                        name: row.get(0)?,
                        logo_url: row.get(1)?,
                        primary_color: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    // -- Channels --

    pub fn create_channel(&self, channel: &NewChannel<'_>) -> Result<Channel> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO channels (slug, home_team_id, away_team_id, league_id, game_date, game_status, venue, inserted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    channel.slug,
                    channel.home_team_id,
                    channel.away_team_id,
                    channel.league_id,
                    ts_string(channel.game_date),
                    channel.game_status.as_str(),
                    channel.venue,
                    ts_string(Utc::now()),
                ],
            )?;
            let id = conn.last_insert_rowid();
            query_channel(conn, id)?.ok_or_else(|| anyhow::anyhow!("Channel {} vanished after insert", id))
        })
    }

    pub fn get_channel(&self, id: i64) -> Result<Option<Channel>> {
        self.with_conn(|conn| query_channel(conn, id))
    }

    pub fn get_channel_detail_by_slug(&self, slug: &str) -> Result<Option<ChannelDetail>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE c.slug = ?1", CHANNEL_DETAIL_SELECT);
            conn.query_row(&sql, [slug], map_channel_detail).optional()
        })
    }

    /// All channels ordered by game date, optionally narrowed to one status.
    pub fn list_channel_details(&self, status: Option<ChannelStatus>) -> Result<Vec<ChannelDetail>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE (?1 IS NULL OR c.game_status = ?1) ORDER BY c.game_date ASC, c.id ASC",
                CHANNEL_DETAIL_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([status.map(|s| s.as_str())], map_channel_detail)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_channel_state(&self, id: i64, update: &ChannelStateUpdate) -> Result<Option<Channel>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE channels
                 SET game_status = ?2, score_home = ?3, score_away = ?4, game_period = ?5, time_remaining = ?6
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    update.game_status.as_str(),
                    update.score_home,
                    update.score_away,
                    update.game_period,
                    update.time_remaining,
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_channel(conn, id)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, channel_id: i64, user_id: Uuid, text: &str) -> Result<MessageRow> {
        let inserted_at = Utc::now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (channel_id, user_id, message, inserted_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![channel_id, user_id.to_string(), text, ts_string(inserted_at)],
            )?;
            Ok(MessageRow {
                id: conn.last_insert_rowid(),
                message: text.to_string(),
                inserted_at,
                user_id,
                channel_id,
                is_pinned: false,
            })
        })
    }

    /// Channel history, oldest first, authors joined.
    pub fn get_messages(&self, channel_id: i64) -> Result<Vec<ChatMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.message, m.inserted_at, m.user_id, m.channel_id, m.is_pinned,
                        u.username, u.display_name, u.avatar_url
                 FROM messages m
                 LEFT JOIN users u ON u.id = m.user_id
                 WHERE m.channel_id = ?1
                 ORDER BY m.inserted_at ASC, m.id ASC",
            )?;

            let rows = stmt
                .query_map([channel_id], |row| {
                    let user = match row.get::<_, Option<String>>(6)? {
                        Some(username) => AuthorProfile {
                            username,
                            display_name: row.get(7)?,
                            avatar_url: row.get(8)?,
                        },
                        None => AuthorProfile::anonymous(),
                    };
                    Ok(ChatMessage {
                        row: MessageRow {
                            id: row.get(0)?,
                            message: row.get(1)?,
                            inserted_at: ts_at(row, 2)?,
                            user_id: uuid_at(row, 3)?,
                            channel_id: row.get(4)?,
                            is_pinned: row.get(5)?,
                        },
                        user,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Highlights --

    pub fn insert_highlight(&self, channel_id: i64, h: &NewHighlight<'_>) -> Result<HighlightRow> {
        let inserted_at = Utc::now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO highlights (channel_id, title, description, game_time, highlight_type, team_id, media_url, inserted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    channel_id,
                    h.title,
                    h.description,
                    h.game_time,
                    h.highlight_type,
                    h.team_id,
                    h.media_url,
                    ts_string(inserted_at),
                ],
            )?;
            Ok(HighlightRow {
                id: conn.last_insert_rowid(),
                channel_id,
                title: h.title.to_string(),
                description: h.description.to_string(),
                game_time: h.game_time.map(str::to_string),
                highlight_type: h.highlight_type.to_string(),
                inserted_at,
                team_id: h.team_id,
                media_url: h.media_url.map(str::to_string),
            })
        })
    }

    /// Play-by-play, newest first, teams joined.
    pub fn get_highlights(&self, channel_id: i64) -> Result<Vec<HighlightEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT hl.id, hl.channel_id, hl.title, hl.description, hl.game_time, hl.highlight_type,
                        hl.inserted_at, hl.team_id, hl.media_url,
                        t.name, t.logo_url, t.primary_color
                 FROM highlights hl
                 LEFT JOIN teams t ON t.id = hl.team_id
                 WHERE hl.channel_id = ?1
                 ORDER BY hl.inserted_at DESC, hl.id DESC",
            )?;

            let rows = stmt
                .query_map([channel_id], |row| {
                    let team = match row.get::<_, Option<String>>(9)? {
                        Some(name) => Some(TeamBadge {
                            name,
                            logo_url: row.get(10)?,
                            primary_color: row.get(11)?,
                        }),
                        None => None,
                    };
                    Ok(HighlightEntry {
                        row: HighlightRow {
                            id: row.get(0)?,
                            channel_id: row.get(1)?,
                            title: row.get(2)?,
                            description: row.get(3)?,
                            game_time: row.get(4)?,
                            highlight_type: row.get(5)?,
                            inserted_at: ts_at(row, 6)?,
                            team_id: row.get(7)?,
                            media_url: row.get(8)?,
                        },
                        team,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Schedule --

    /// Insert or replace a scheduled game, keyed by its external game id.
    pub fn upsert_upcoming_game(&self, g: &UpcomingGameRow) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO nba_upcoming_games (
                    game_id, game_date, game_time, arena, city, state, country,
                    home_team_id, home_team, home_team_abbreviation,
                    away_team_id, away_team, away_team_abbreviation,
                    broadcast_networks, game_status, season_year, season_stage,
                    is_playoff, playoff_round, series_game_number, series_summary)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)
                 ON CONFLICT(game_id) DO UPDATE SET
                    game_date = excluded.game_date,
                    game_time = excluded.game_time,
                    game_status = excluded.game_status,
                    broadcast_networks = excluded.broadcast_networks,
                    is_playoff = excluded.is_playoff,
                    playoff_round = excluded.playoff_round,
                    series_game_number = excluded.series_game_number,
                    series_summary = excluded.series_summary",
                rusqlite::params![
                    g.game_id,
                    g.game_date.format("%Y-%m-%d").to_string(),
                    g.game_time,
                    g.arena,
                    g.city,
                    g.state,
                    g.country,
                    g.home_team_id,
                    g.home_team,
                    g.home_team_abbreviation,
                    g.away_team_id,
                    g.away_team,
                    g.away_team_abbreviation,
                    g.broadcast_networks,
                    g.game_status,
                    g.season_year,
                    g.season_stage,
                    g.is_playoff,
                    g.playoff_round,
                    g.series_game_number,
                    g.series_summary,
                ],
            )?;
            let id = conn.query_row(
                "SELECT id FROM nba_upcoming_games WHERE game_id = ?1",
                [&g.game_id],
                |row| row.get(0),
            )?;
            Ok(id)
        })
    }

    /// Games dated within `[from, to]`, ordered by date then time.
    pub fn upcoming_games(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        team_id: Option<i64>,
        is_playoff: Option<bool>,
    ) -> Result<Vec<UpcomingGameRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM nba_upcoming_games
                 WHERE game_date >= ?1 AND game_date <= ?2
                   AND (?3 IS NULL OR home_team_id = ?3 OR away_team_id = ?3)
                   AND (?4 IS NULL OR is_playoff = ?4)
                 ORDER BY game_date ASC, game_time ASC",
                UPCOMING_GAME_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![
                        from.format("%Y-%m-%d").to_string(),
                        to.format("%Y-%m-%d").to_string(),
                        team_id,
                        is_playoff,
                    ],
                    map_upcoming_game,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn map_account(row: &Row<'_>) -> rusqlite::Result<AccountRow> {
    Ok(AccountRow {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        password: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn query_profile(conn: &Connection, id: Uuid) -> Result<Option<UserProfile>> {
    conn.query_row(
        "SELECT id, username, display_name, avatar_url, created_at FROM users WHERE id = ?1",
        [id.to_string()],
        |row| {
            Ok(UserProfile {
                id: uuid_at(row, 0)?,
                username: row.get(1)?,
                display_name: row.get(2)?,
                avatar_url: row.get(3)?,
                created_at: ts_at(row, 4)?,
            })
        },
    )
    .optional()
}

fn query_channel(conn: &Connection, id: i64) -> Result<Option<Channel>> {
    let sql = format!("{} WHERE id = ?1", CHANNEL_SELECT);
    conn.query_row(&sql, [id], |row| map_channel(row, 0)).optional()
}

fn map_channel(row: &Row<'_>, at: usize) -> rusqlite::Result<Channel> {
    let status: String = row.get(at + 6)?;
    Ok(Channel {
        id: row.get(at)?,
        slug: row.get(at + 1)?,
        home_team_id: row.get(at + 2)?,
        away_team_id: row.get(at + 3)?,
        league_id: row.get(at + 4)?,
        game_date: ts_at(row, at + 5)?,
        game_status: ChannelStatus::parse(&status)
            .ok_or_else(|| conversion_error(at + 6, format!("unknown game status '{}'", status)))?,
        score_home: row.get(at + 7)?,
        score_away: row.get(at + 8)?,
        game_period: row.get(at + 9)?,
        time_remaining: row.get(at + 10)?,
        venue: row.get(at + 11)?,
        inserted_at: ts_at(row, at + 12)?,
    })
}

fn map_team(row: &Row<'_>, at: usize) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(at)?,
        name: row.get(at + 1)?,
        slug: row.get(at + 2)?,
        logo_url: row.get(at + 3)?,
        primary_color: row.get(at + 4)?,
        secondary_color: row.get(at + 5)?,
    })
}

fn map_channel_detail(row: &Row<'_>) -> rusqlite::Result<ChannelDetail> {
    Ok(ChannelDetail {
        channel: map_channel(row, 0)?,
        home_team: map_team(row, 13)?,
        away_team: map_team(row, 19)?,
        league: League {
            id: row.get(25)?,
            name: row.get(26)?,
            slug: row.get(27)?,
            logo_url: row.get(28)?,
        },
    })
}

fn map_upcoming_game(row: &Row<'_>) -> rusqlite::Result<UpcomingGameRow> {
    let raw_date: String = row.get(2)?;
    Ok(UpcomingGameRow {
        id: row.get(0)?,
        game_id: row.get(1)?,
        game_date: NaiveDate::parse_from_str(&raw_date, "%Y-%m-%d")
            .map_err(|e| conversion_error(2, e.to_string()))?,
        game_time: row.get(3)?,
        arena: row.get(4)?,
        city: row.get(5)?,
        state: row.get(6)?,
        country: row.get(7)?,
        home_team_id: row.get(8)?,
        home_team: row.get(9)?,
        home_team_abbreviation: row.get(10)?,
        away_team_id: row.get(11)?,
        away_team: row.get(12)?,
        away_team_abbreviation: row.get(13)?,
        broadcast_networks: row.get(14)?,
        game_status: row.get(15)?,
        season_year: row.get(16)?,
        season_stage: row.get(17)?,
        is_playoff: row.get(18)?,
        playoff_round: row.get(19)?,
        series_game_number: row.get(20)?,
        series_summary: row.get(21)?,
    })
}

/// Timestamps are stored as fixed-width RFC 3339 so text order is time order.
fn ts_string(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn ts_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') has no zone designator.
            chrono::NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|e| conversion_error(idx, format!("bad timestamp '{}': {}", raw, e)))
}

fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse::<Uuid>()
        .map_err(|e| conversion_error(idx, format!("bad uuid '{}': {}", raw, e)))
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
