use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS accounts (
            id          TEXT PRIMARY KEY,
            email       TEXT NOT NULL UNIQUE,
            username    TEXT NOT NULL,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS auth_codes (
            digest      TEXT PRIMARY KEY,
            account_id  TEXT NOT NULL REFERENCES accounts(id),
            expires_at  TEXT NOT NULL,
            consumed    INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS users (
            id            TEXT PRIMARY KEY,
            username      TEXT NOT NULL UNIQUE,
            display_name  TEXT,
            avatar_url    TEXT,
            created_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS leagues (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            name      TEXT NOT NULL,
            slug      TEXT NOT NULL UNIQUE,
            logo_url  TEXT
        );

        CREATE TABLE IF NOT EXISTS teams (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            name             TEXT NOT NULL,
            slug             TEXT NOT NULL UNIQUE,
            logo_url         TEXT,
            primary_color    TEXT NOT NULL,
            secondary_color  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS channels (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            slug            TEXT NOT NULL UNIQUE,
            home_team_id    INTEGER NOT NULL REFERENCES teams(id),
            away_team_id    INTEGER NOT NULL REFERENCES teams(id),
            league_id       INTEGER NOT NULL REFERENCES leagues(id),
            game_date       TEXT NOT NULL,
            game_status     TEXT NOT NULL DEFAULT 'UPCOMING',
            score_home      INTEGER NOT NULL DEFAULT 0,
            score_away      INTEGER NOT NULL DEFAULT 0,
            game_period     TEXT,
            time_remaining  TEXT,
            venue           TEXT,
            inserted_at     TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            channel_id  INTEGER NOT NULL REFERENCES channels(id),
            user_id     TEXT NOT NULL,
            message     TEXT NOT NULL,
            is_pinned   INTEGER NOT NULL DEFAULT 0,
            inserted_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_channel
            ON messages(channel_id, inserted_at);

        CREATE TABLE IF NOT EXISTS highlights (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            channel_id      INTEGER NOT NULL REFERENCES channels(id),
            title           TEXT NOT NULL,
            description     TEXT NOT NULL,
            game_time       TEXT,
            highlight_type  TEXT NOT NULL,
            team_id         INTEGER REFERENCES teams(id),
            media_url       TEXT,
            inserted_at     TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_highlights_channel
            ON highlights(channel_id, inserted_at);

        CREATE TABLE IF NOT EXISTS nba_upcoming_games (
            id                      INTEGER PRIMARY KEY AUTOINCREMENT,
            game_id                 TEXT NOT NULL UNIQUE,
            game_date               TEXT NOT NULL,
            game_time               TEXT NOT NULL,
            arena                   TEXT NOT NULL,
            city                    TEXT NOT NULL,
            state                   TEXT NOT NULL,
            country                 TEXT NOT NULL,
            home_team_id            INTEGER NOT NULL,
            home_team               TEXT NOT NULL,
            home_team_abbreviation  TEXT NOT NULL,
            away_team_id            INTEGER NOT NULL,
            away_team               TEXT NOT NULL,
            away_team_abbreviation  TEXT NOT NULL,
            broadcast_networks      TEXT NOT NULL DEFAULT '',
            game_status             TEXT NOT NULL,
            season_year             TEXT NOT NULL,
            season_stage            TEXT NOT NULL,
            is_playoff              INTEGER NOT NULL DEFAULT 0,
            playoff_round           TEXT,
            series_game_number      TEXT,
            series_summary          TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_upcoming_games_date
            ON nba_upcoming_games(game_date, game_time);

        -- Seed the default league
        INSERT OR IGNORE INTO leagues (name, slug)
            VALUES ('NBA', 'nba');
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
