//! Text shaping for schedule data: raw status strings from the schedule feed
//! and the "Today, 6:30 PM" labels shown on game cards.

use chrono::{Duration, NaiveDate};

use crate::api::GameStatus;

/// Map a raw schedule status ("7:30 pm ET", "3rd Qtr", "Final", ...) to a
/// display status and the time label shown next to it.
pub fn classify_status(raw: &str) -> (GameStatus, String) {
    let s = raw.trim();

    // Exact labels first: "F/OT" would otherwise read as a live overtime.
    if s == "Final" || s == "F/OT" {
        (GameStatus::Finished, "FT".to_string())
    } else if s == "TBD" {
        (GameStatus::Upcoming, "TBD".to_string())
    } else if s == "Halftime" {
        (GameStatus::Live, "Halftime".to_string())
    } else if s.contains("pm ET") || s.contains("am ET") {
        (GameStatus::Upcoming, s.to_string())
    } else if s.contains("Qtr") || s.contains("OT") {
        (GameStatus::Live, s.to_string())
    } else {
        (GameStatus::Upcoming, s.to_string())
    }
}

/// Render the schedule label for a game card.
///
/// Upcoming games with an Eastern clock time are shown in US Central time.
/// Both zones follow the same daylight-saving calendar, so the conversion is
/// a fixed one hour shift.
pub fn format_game_time_display(
    status: GameStatus,
    date: &str,
    time: &str,
    today: NaiveDate,
) -> String {
    let clean = time.trim();

    let time_part = match status {
        GameStatus::Upcoming => match parse_eastern_clock(clean) {
            Some((hour, minute)) => central_clock(hour, minute),
            None if clean.eq_ignore_ascii_case("TBD") => "Time TBD".to_string(),
            None => clean.to_string(),
        },
        GameStatus::Live | GameStatus::Finished => clean.to_string(),
    };

    let Ok(game_date) = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d") else {
        tracing::warn!("Unparseable game date '{}'", date);
        return time_part;
    };

    let prefix = if game_date == today {
        "Today".to_string()
    } else if game_date == today + Duration::days(1) {
        "Tomorrow".to_string()
    } else {
        game_date.format("%b %-d").to_string()
    };

    format!("{}, {}", prefix, time_part)
}

/// Find an `h:mm am|pm ET` clock in `s` and return it as 24-hour time.
fn parse_eastern_clock(s: &str) -> Option<(u32, u32)> {
    let bytes = s.as_bytes();

    for (colon, _) in s.match_indices(':') {
        let mut start = colon;
        while start > 0 && colon - start < 2 && bytes[start - 1].is_ascii_digit() {
            start -= 1;
        }
        if start == colon {
            continue;
        }
        // Reject a third leading digit ("123:45").
        if start > 0 && bytes[start - 1].is_ascii_digit() {
            continue;
        }

        let minutes = s.get(colon + 1..colon + 3)?;
        if !minutes.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }

        let rest = s[colon + 3..].trim_start();
        let period = rest.get(..2)?.to_ascii_lowercase();
        if period != "am" && period != "pm" {
            continue;
        }
        if !rest[2..].trim_start().to_ascii_lowercase().starts_with("et") {
            continue;
        }

        let mut hour: u32 = s[start..colon].parse().ok()?;
        let minute: u32 = minutes.parse().ok()?;
        if hour == 0 || hour > 12 || minute > 59 {
            return None;
        }
        if period == "pm" && hour != 12 {
            hour += 12;
        }
        if period == "am" && hour == 12 {
            hour = 0;
        }
        return Some((hour, minute));
    }

    None
}

fn central_clock(hour: u32, minute: u32) -> String {
    let hour = (hour + 23) % 24;
    let (h12, suffix) = match hour {
        0 => (12, "AM"),
        1..=11 => (hour, "AM"),
        12 => (12, "PM"),
        _ => (hour - 12, "PM"),
    };
    format!("{}:{:02} {}", h12, minute, suffix)
}
