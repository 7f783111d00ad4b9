use chrono::{DateTime, Datelike, FixedOffset, Weekday};
use tracing::{debug, info};

use crate::error::AppResult;
use crate::models::plan::StudyPlan;
use crate::models::request::SchedulingRequest;
use crate::services::schedule_utils::{format_datetime, parse_datetime, shift_days, start_of_day};

/// Shift wrongly-placed sessions to the previous calendar day when that day
/// is inside the preferred set (Tuesday→Monday, …, Monday→Sunday). Time of
/// day and duration are preserved; both timestamps move by the same delta.
///
/// Returns how many sessions were corrected. A session is left untouched
/// when its shifted weekday is still outside the preferred set, or when the
/// shift would land it before local midnight of `now`; the caller decides
/// whether the remaining violations block the plan.
pub fn repair_wrong_days(
    plan: &mut StudyPlan,
    request: &SchedulingRequest,
    now: DateTime<FixedOffset>,
) -> AppResult<usize> {
    let today_start = start_of_day(now);
    let mut repaired = 0;

    for week in &mut plan.weeks {
        for session in &mut week.sessions {
            let start = parse_datetime(&session.start_time)?;
            let day = start.weekday();
            if request.preferred_days.contains(&day) {
                continue;
            }

            let shifted_day = previous_day(day);
            if !request.preferred_days.contains(&shifted_day) {
                debug!(
                    target: "app::plan",
                    subject = %session.subject,
                    day = %day,
                    "wrong-day session not correctable by day shift"
                );
                continue;
            }

            let shifted_start = shift_days(start, -1)?;
            if shifted_start < today_start {
                debug!(
                    target: "app::plan",
                    subject = %session.subject,
                    day = %day,
                    "day shift would land before today, leaving session in place"
                );
                continue;
            }

            let end = parse_datetime(&session.end_time)?;
            session.start_time = format_datetime(shifted_start);
            session.end_time = format_datetime(shift_days(end, -1)?);
            repaired += 1;
        }
    }

    if repaired > 0 {
        info!(target: "app::plan", repaired, "shifted wrong-day sessions onto preferred days");
    }

    Ok(repaired)
}

fn previous_day(day: Weekday) -> Weekday {
    match day {
        Weekday::Mon => Weekday::Sun,
        Weekday::Tue => Weekday::Mon,
        Weekday::Wed => Weekday::Tue,
        Weekday::Thu => Weekday::Wed,
        Weekday::Fri => Weekday::Thu,
        Weekday::Sat => Weekday::Fri,
        Weekday::Sun => Weekday::Sat,
    }
}
