use std::collections::BTreeMap;

use serde_json::json;
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::request::{PlanRequestPayload, SchedulingRequest};
use crate::services::schedule_utils::{parse_weekday_name, CANONICAL_DAY_ORDER};

/// Provider-facing cap on distinct subjects per plan.
pub const MAX_SUBJECTS: usize = 6;

/// Cost-control ceiling on generated weeks. Requests above this are accepted
/// and silently clamped; the clamped value drives every downstream
/// calculation.
pub const MAX_PLAN_WEEKS: u32 = 4;

const MIN_WEEKLY_HOURS: f64 = 1.0;
const MAX_WEEKLY_HOURS: f64 = 40.0;
const MIN_WEEKS: i64 = 1;
const MAX_WEEKS: i64 = 52;

/// Normalize a raw payload into a canonical `SchedulingRequest`, rejecting
/// anything malformed or out of range before the pipeline spends a single
/// provider call on it.
pub fn normalize(payload: &PlanRequestPayload) -> AppResult<SchedulingRequest> {
    let subjects: Vec<String> = payload
        .subjects
        .iter()
        .map(|subject| subject.trim().to_string())
        .filter(|subject| !subject.is_empty())
        .collect();

    if subjects.is_empty() {
        return Err(AppError::validation("at least one subject is required"));
    }
    if subjects.len() > MAX_SUBJECTS {
        return Err(AppError::validation_with_details(
            format!("at most {MAX_SUBJECTS} subjects are supported per plan"),
            json!({ "subjects": subjects.len(), "max": MAX_SUBJECTS }),
        ));
    }
    for (idx, subject) in subjects.iter().enumerate() {
        if subjects[..idx].iter().any(|seen| seen == subject) {
            return Err(AppError::validation_with_details(
                "duplicate subject in request",
                json!({ "subject": subject }),
            ));
        }
    }

    if !(MIN_WEEKLY_HOURS..=MAX_WEEKLY_HOURS).contains(&payload.weekly_hours) {
        return Err(AppError::validation_with_details(
            "weeklyHours must be between 1 and 40",
            json!({ "weeklyHours": payload.weekly_hours }),
        ));
    }

    if !(MIN_WEEKS..=MAX_WEEKS).contains(&payload.weeks) {
        return Err(AppError::validation_with_details(
            "weeks must be between 1 and 52",
            json!({ "weeks": payload.weeks }),
        ));
    }

    if payload.session_length_minutes <= 0 {
        return Err(AppError::validation(
            "sessionLengthMinutes must be positive",
        ));
    }
    if payload.break_length_minutes < 0 {
        return Err(AppError::validation(
            "breakLengthMinutes must not be negative",
        ));
    }

    // Weekly count defaults to 1 per subject; unknown keys violate the
    // sessionsPerSubject ⊆ subjects invariant.
    let mut sessions_per_subject = BTreeMap::new();
    for (subject, count) in &payload.sessions_per_subject {
        if !subjects.iter().any(|known| known == subject) {
            return Err(AppError::validation_with_details(
                "sessionsPerSubject references an unknown subject",
                json!({ "subject": subject }),
            ));
        }
        if *count == 0 {
            return Err(AppError::validation_with_details(
                "sessionsPerSubject counts must be positive",
                json!({ "subject": subject }),
            ));
        }
        sessions_per_subject.insert(subject.clone(), *count);
    }
    for subject in &subjects {
        sessions_per_subject.entry(subject.clone()).or_insert(1);
    }

    let preferred_days = canonical_day_set(&payload.preferred_days)?;

    let requested_weeks = payload.weeks as u32;
    let weeks = requested_weeks.min(MAX_PLAN_WEEKS);
    if weeks < requested_weeks {
        debug!(
            target: "app::plan",
            requested_weeks,
            clamped_weeks = weeks,
            "clamping plan horizon to internal maximum"
        );
    }

    let optional_notes = payload
        .optional_notes
        .as_deref()
        .map(str::trim)
        .filter(|notes| !notes.is_empty())
        .map(str::to_string);

    Ok(SchedulingRequest {
        subjects,
        sessions_per_subject,
        weekly_hours: payload.weekly_hours,
        weeks,
        requested_weeks,
        session_length_minutes: payload.session_length_minutes,
        break_length_minutes: payload.break_length_minutes,
        time_preference: payload.time_preference,
        preferred_days,
        optional_notes,
    })
}

/// Canonicalize day names into Monday-first `Weekday` order, deduplicated.
/// An empty input means every day of the week is available.
fn canonical_day_set(raw: &[String]) -> AppResult<Vec<chrono::Weekday>> {
    if raw.is_empty() {
        return Ok(CANONICAL_DAY_ORDER.to_vec());
    }

    let mut requested = Vec::new();
    for name in raw {
        let day = parse_weekday_name(name).ok_or_else(|| {
            AppError::validation_with_details(
                "unrecognized weekday name in preferredDays",
                json!({ "day": name }),
            )
        })?;
        if !requested.contains(&day) {
            requested.push(day);
        }
    }

    Ok(CANONICAL_DAY_ORDER
        .into_iter()
        .filter(|day| requested.contains(day))
        .collect())
}
