use std::fmt::Write as _;

use chrono::{DateTime, Datelike, FixedOffset};

use crate::error::AppResult;
use crate::models::request::{CapacityProfile, SchedulingRequest};
use crate::services::schedule_utils::{shift_days, weekday_name, CANONICAL_DAY_ORDER};

/// System prompt for the primary provider. The schema and example session
/// are embedded literally to anchor the output format.
pub fn plan_system_prompt() -> &'static str {
    r#"You are a study-schedule planner. You receive hard scheduling
constraints and must return one week of study sessions as a single JSON
object. Respond with valid UTF-8 JSON only. Do not wrap the response in
markdown code blocks and do not add commentary. The schema is:
{
  "weeks": [{
    "weekNumber": number,
    "sessions": [{
      "subject": string,
      "startTime": string,
      "endTime": string,
      "learningStyle": string
    }]
  }]
}
Use ISO-8601 timestamps with a UTC offset. Example session object:
{
  "subject": "Mathematics",
  "startTime": "2026-01-12T09:00:00+00:00",
  "endTime": "2026-01-12T10:00:00+00:00",
  "learningStyle": "practice problems"
}
"#
}

/// System preamble for the fallback provider. Restates the exact subject
/// list because the secondary model is weaker at holding instructions from
/// the user prompt alone.
pub fn fallback_system_prompt(subjects: &[String]) -> String {
    format!(
        "You are a study-schedule planner. Use ONLY these exact subject \
         names, verbatim: {}. Respond with valid JSON only, no markdown \
         code fences, no commentary.",
        subjects.join(", ")
    )
}

/// Render the user prompt for one chunk (a single plan week). Deterministic:
/// the same request, capacity and anchor date always produce the same text.
pub fn build_week_chunk_prompt(
    request: &SchedulingRequest,
    capacity: &CapacityProfile,
    week_start: DateTime<FixedOffset>,
    week_number: u32,
    total_weeks: u32,
) -> AppResult<String> {
    let sessions_per_week = request.sessions_per_week();
    let day_count = request.preferred_days.len() as u64;

    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "Plan week {week_number} of {total_weeks} of a study schedule."
    );

    let _ = writeln!(
        prompt,
        "Subjects (use these exact names, no paraphrasing): {}.",
        request.subjects.join(", ")
    );

    let _ = writeln!(prompt, "Weekly sessions per subject:");
    for (subject, count) in &request.sessions_per_subject {
        let _ = writeln!(prompt, "- {subject}: {count} session(s)");
    }

    let _ = writeln!(
        prompt,
        "Total: {sessions_per_week} sessions this week, {} sessions across \
         all {total_weeks} weeks.",
        sessions_per_week * u64::from(request.weeks)
    );

    let _ = writeln!(
        prompt,
        "Allowed days with their dates for this week (schedule on these \
         days only):"
    );
    for day in CANONICAL_DAY_ORDER {
        if !request.preferred_days.contains(&day) {
            continue;
        }
        let offset = i64::from(day.num_days_from_monday());
        let date = shift_days(week_start, offset)?;
        let _ = writeln!(
            prompt,
            "- {} {}",
            weekday_name(day),
            date.format("%Y-%m-%d")
        );
    }

    let _ = writeln!(
        prompt,
        "Time window: {} ({} preference). Each session lasts {} minutes \
         with {} minute breaks between sessions.",
        request.time_preference.window_label(),
        request.time_preference.as_str(),
        request.session_length_minutes,
        request.break_length_minutes
    );

    let _ = writeln!(
        prompt,
        "Hard limit: at most {} sessions per day.",
        capacity.max_sessions_per_day
    );

    // Worked distribution example with the request's own numbers, so the
    // model spreads sessions instead of stacking them.
    let spread_days = sessions_per_week.min(day_count).max(1);
    let per_day = sessions_per_week.div_ceil(spread_days);
    let _ = writeln!(
        prompt,
        "Distribute sessions evenly: {sessions_per_week} sessions over \
         {day_count} available days means about {per_day} per day spread \
         across {spread_days} different days, NOT all sessions packed onto \
         one or two days."
    );

    if let Some(notes) = &request.optional_notes {
        let _ = writeln!(prompt, "Advisory notes from the student: {notes}");
    }

    let _ = writeln!(
        prompt,
        "Return a JSON object with a \"weeks\" array containing exactly one \
         week with \"weekNumber\": {week_number}."
    );

    Ok(prompt)
}
