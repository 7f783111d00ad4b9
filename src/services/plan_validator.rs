use std::collections::HashMap;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate};
use serde_json::json;
use tracing::debug;

use crate::error::{AppError, AppResult, PlanErrorCode};
use crate::models::plan::{StudyPlan, ValidationReport, WrongDaySession};
use crate::models::request::SchedulingRequest;
use crate::services::schedule_utils::{parse_datetime, start_of_day, weekday_name};

/// Clustering only matters when the user offered a wide day set.
const CLUSTERING_MIN_PREFERRED_DAYS: usize = 5;
/// Fraction of preferred days that must carry sessions before a week is
/// considered concentrated.
const CLUSTERING_DAY_FRACTION: f64 = 0.6;
/// A concentrated week is only flagged when some day also exceeds this many
/// sessions.
const CLUSTERING_MAX_PER_DAY: usize = 3;

const SKIP_CHECK_MIN_PREFERRED_DAYS: usize = 6;
const LIGHT_WEEK_SESSIONS: usize = 4;
const MODERATE_WEEK_SESSIONS: usize = 8;
const LIGHT_FRACTION: f64 = 0.5;
const MODERATE_FRACTION: f64 = 0.6;
const HEAVY_FRACTION: f64 = 0.7;

/// Inspect every session in every week against the request's hard
/// constraints. Pure: the plan is never mutated, all findings accumulate
/// into the report.
pub fn validate(
    plan: &StudyPlan,
    request: &SchedulingRequest,
    now: DateTime<FixedOffset>,
) -> AppResult<ValidationReport> {
    let mut report = ValidationReport::default();
    let today_start = start_of_day(now);

    report.wrong_week_count = plan.weeks.len() as u32 != request.weeks;

    for week in &plan.weeks {
        let mut sessions_per_date: HashMap<NaiveDate, usize> = HashMap::new();

        for session in &week.sessions {
            if !request
                .subjects
                .iter()
                .any(|subject| subject.eq_ignore_ascii_case(&session.subject))
            {
                report.invalid_subjects.push(session.subject.clone());
            }

            // A timestamp serde accepted as a string but chrono cannot parse
            // is provider garbage, not a bad request.
            let start = parse_datetime(&session.start_time).map_err(|_| {
                AppError::plan_with_details(
                    PlanErrorCode::ParseError,
                    "generated session carries an unparseable start time",
                    None,
                    Some(json!({
                        "weekNumber": week.week_number,
                        "subject": session.subject.clone(),
                        "startTime": session.start_time.clone(),
                    })),
                )
            })?;

            if start < today_start {
                report.past_sessions.push(session.start_time.clone());
            }

            let day = start.weekday();
            if !request.preferred_days.contains(&day) {
                report.wrong_day_sessions.push(WrongDaySession {
                    week_number: week.week_number,
                    subject: session.subject.clone(),
                    start_time: session.start_time.clone(),
                    observed_day: weekday_name(day).to_string(),
                });
            }

            *sessions_per_date.entry(start.date_naive()).or_insert(0) += 1;
        }

        let days_with_sessions = sessions_per_date.len();
        let max_sessions_one_day = sessions_per_date.values().copied().max().unwrap_or(0);
        let week_session_count = week.sessions.len();
        let preferred = request.preferred_days.len();

        if preferred >= CLUSTERING_MIN_PREFERRED_DAYS
            && (days_with_sessions as f64) < (preferred as f64) * CLUSTERING_DAY_FRACTION
            && max_sessions_one_day > CLUSTERING_MAX_PER_DAY
        {
            report.clustered_sessions = true;
        }

        if preferred >= SKIP_CHECK_MIN_PREFERRED_DAYS {
            let min_days = min_days_required(
                week_session_count,
                preferred,
                request.all_seven_days(),
            );
            if days_with_sessions < min_days {
                report.skipped_days = true;
            }
        }
    }

    debug!(
        target: "app::validation",
        invalid_subjects = report.invalid_subjects.len(),
        past_sessions = report.past_sessions.len(),
        wrong_day_sessions = report.wrong_day_sessions.len(),
        wrong_week_count = report.wrong_week_count,
        clustered = report.clustered_sessions,
        skipped_days = report.skipped_days,
        "plan validated"
    );

    Ok(report)
}

/// Minimum distinct calendar days a week must use. Very light loads over a
/// full seven-day set may legitimately concentrate on weekdays.
fn min_days_required(sessions: usize, preferred_days: usize, all_seven: bool) -> usize {
    if sessions <= LIGHT_WEEK_SESSIONS {
        if all_seven {
            4
        } else {
            ceil_fraction(preferred_days, LIGHT_FRACTION)
        }
    } else if sessions <= MODERATE_WEEK_SESSIONS {
        if all_seven {
            5
        } else {
            ceil_fraction(preferred_days, MODERATE_FRACTION)
        }
    } else {
        ceil_fraction(preferred_days, HEAVY_FRACTION)
    }
}

fn ceil_fraction(count: usize, fraction: f64) -> usize {
    ((count as f64) * fraction).ceil() as usize
}
