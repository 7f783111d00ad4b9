use serde_json::json;
use tracing::debug;

use crate::error::{AppError, AppResult, PlanErrorCode};
use crate::models::request::{CapacityProfile, SchedulingRequest, TimePreference};

const DEFAULT_MAX_SESSIONS_PER_DAY: u32 = 3;

/// Minutes available when the evening slot is chosen. The window is fixed at
/// four hours regardless of session length.
const EVENING_WINDOW_MINUTES: i64 = 240;

const RECOMMENDED_PER_SUBJECT_CAP: u32 = 4;

/// Derive the per-day session cap and total slot budget for a request, and
/// reject over-subscribed requests before any provider call is made.
pub fn compute_capacity(request: &SchedulingRequest) -> AppResult<CapacityProfile> {
    let max_sessions_per_day = max_sessions_per_day(
        request.time_preference,
        request.session_length_minutes,
        request.break_length_minutes,
    );

    let total_available_slots =
        request.preferred_days.len() as u32 * max_sessions_per_day * request.weeks;
    let total_requested_sessions = request.total_requested_sessions();

    debug!(
        target: "app::plan",
        max_sessions_per_day,
        total_available_slots,
        total_requested_sessions,
        "capacity profile computed"
    );

    if total_requested_sessions > u64::from(total_available_slots) {
        let recommended = recommended_max_per_subject(
            total_available_slots,
            request.subjects.len() as u32,
            request.weeks,
        );
        return Err(AppError::plan_with_details(
            PlanErrorCode::CapacityExceeded,
            format!(
                "requested {total_requested_sessions} sessions but only \
                 {total_available_slots} slots are available"
            ),
            None,
            Some(json!({
                "totalRequestedSessions": total_requested_sessions,
                "totalAvailableSlots": total_available_slots,
                "recommendedMaxPerSubject": recommended,
            })),
        ));
    }

    Ok(CapacityProfile {
        max_sessions_per_day,
        total_available_slots,
        total_requested_sessions,
    })
}

/// Two independent rules can lower the default cap of 3; when both apply the
/// profile takes the minimum of their outputs.
fn max_sessions_per_day(
    preference: TimePreference,
    session_length_minutes: i64,
    break_length_minutes: i64,
) -> u32 {
    let evening_cap = if preference == TimePreference::Evening
        && session_length_minutes * 3 + break_length_minutes * 2 > EVENING_WINDOW_MINUTES
    {
        2
    } else {
        DEFAULT_MAX_SESSIONS_PER_DAY
    };

    let long_session_cap = if session_length_minutes == 90 && break_length_minutes > 5 {
        2
    } else {
        DEFAULT_MAX_SESSIONS_PER_DAY
    };

    evening_cap.min(long_session_cap)
}

fn recommended_max_per_subject(slots: u32, subjects: u32, weeks: u32) -> u32 {
    if subjects == 0 || weeks == 0 {
        return RECOMMENDED_PER_SUBJECT_CAP;
    }
    (slots / subjects / weeks).min(RECOMMENDED_PER_SUBJECT_CAP)
}
