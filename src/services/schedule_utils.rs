use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveTime, Weekday};
use serde_json::json;

use crate::error::{AppError, AppResult};

pub fn parse_datetime(value: &str) -> AppResult<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).map_err(|err| {
        AppError::validation_with_details(
            "invalid datetime format",
            json!({"value": value, "error": err.to_string()}),
        )
    })
}

pub fn format_datetime(dt: DateTime<FixedOffset>) -> String {
    dt.to_rfc3339()
}

pub fn shift_days(dt: DateTime<FixedOffset>, days: i64) -> AppResult<DateTime<FixedOffset>> {
    dt.checked_add_signed(Duration::days(days))
        .ok_or_else(|| AppError::validation("datetime shift out of range"))
}

/// Local midnight of the day `now` falls on.
pub fn start_of_day(now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    now.with_time(NaiveTime::MIN).single().unwrap_or(now)
}

/// The plan anchor: next Monday at 09:00 local, or today at 09:00 when today
/// is already Monday. Uses the Sunday=0..Saturday=6 numbering, so the gap to
/// the coming Monday is `8 - weekdayNumber` on non-Mondays.
pub fn next_monday_start(now: DateTime<FixedOffset>) -> AppResult<DateTime<FixedOffset>> {
    let days_until_monday = if now.weekday() == Weekday::Mon {
        0
    } else {
        8 - i64::from(now.weekday().num_days_from_sunday())
    };

    let anchored = shift_days(now, days_until_monday)?;
    let nine = NaiveTime::from_hms_opt(9, 0, 0)
        .ok_or_else(|| AppError::other("09:00 must be a valid time"))?;
    anchored
        .with_time(nine)
        .single()
        .ok_or_else(|| AppError::other("failed to anchor plan start at 09:00"))
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

pub fn parse_weekday_name(value: &str) -> Option<Weekday> {
    match value.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Canonical Monday-first ordering used everywhere a day set is rendered.
pub const CANONICAL_DAY_ORDER: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

pub fn day_set_names(days: &[Weekday]) -> Vec<String> {
    days.iter().map(|day| weekday_name(*day).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(value: &str) -> DateTime<FixedOffset> {
        parse_datetime(value).expect("test datetime must parse")
    }

    #[test]
    fn next_monday_from_midweek() {
        // Wednesday 2026-01-07 -> Monday 2026-01-12 09:00
        let start = next_monday_start(at("2026-01-07T15:30:00+00:00")).unwrap();
        assert_eq!(start.weekday(), Weekday::Mon);
        assert_eq!(start.to_rfc3339(), "2026-01-12T09:00:00+00:00");
    }

    #[test]
    fn monday_anchors_to_same_day() {
        let start = next_monday_start(at("2026-01-05T22:10:00+00:00")).unwrap();
        assert_eq!(start.to_rfc3339(), "2026-01-05T09:00:00+00:00");
    }

    #[test]
    fn sunday_moves_to_next_day() {
        // Sunday=0, so 8 - 0 = 8 days ahead per the anchor rule.
        let start = next_monday_start(at("2026-01-04T10:00:00+00:00")).unwrap();
        assert_eq!(start.weekday(), Weekday::Mon);
        assert_eq!(start.to_rfc3339(), "2026-01-12T09:00:00+00:00");
    }

    #[test]
    fn start_of_day_is_local_midnight() {
        let midnight = start_of_day(at("2026-01-07T15:30:00+02:00"));
        assert_eq!(midnight.to_rfc3339(), "2026-01-07T00:00:00+02:00");
    }

    #[test]
    fn weekday_names_round_trip() {
        for day in CANONICAL_DAY_ORDER {
            assert_eq!(parse_weekday_name(weekday_name(day)), Some(day));
        }
        assert_eq!(parse_weekday_name("SATURDAY"), Some(Weekday::Sat));
        assert_eq!(parse_weekday_name("someday"), None);
    }
}
