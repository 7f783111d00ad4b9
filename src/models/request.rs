use std::collections::{BTreeMap, HashMap};

use chrono::Weekday;
use serde::{Deserialize, Serialize};

/// Time-of-day slot the user wants sessions scheduled in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimePreference {
    Morning,
    Afternoon,
    Evening,
    Night,
    Flexible,
}

impl Default for TimePreference {
    fn default() -> Self {
        TimePreference::Flexible
    }
}

impl TimePreference {
    pub fn as_str(self) -> &'static str {
        match self {
            TimePreference::Morning => "morning",
            TimePreference::Afternoon => "afternoon",
            TimePreference::Evening => "evening",
            TimePreference::Night => "night",
            TimePreference::Flexible => "flexible",
        }
    }

    /// Local wall-clock window rendered into the prompt. The evening window
    /// is fixed at four hours; capacity rules depend on that.
    pub fn window_label(self) -> &'static str {
        match self {
            TimePreference::Morning => "08:00-12:00",
            TimePreference::Afternoon => "12:00-17:00",
            TimePreference::Evening => "17:00-21:00",
            TimePreference::Night => "20:00-24:00",
            TimePreference::Flexible => "08:00-21:00",
        }
    }
}

/// Raw request body as it arrives from the (external) HTTP layer.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PlanRequestPayload {
    pub subjects: Vec<String>,
    pub sessions_per_subject: HashMap<String, u32>,
    pub weekly_hours: f64,
    pub weeks: i64,
    pub session_length_minutes: i64,
    pub break_length_minutes: i64,
    pub time_preference: TimePreference,
    pub preferred_days: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optional_notes: Option<String>,
}

/// Canonical scheduling request, immutable after `constraint_model::normalize`.
///
/// `weeks` holds the clamped value that drives every downstream calculation;
/// the value the user asked for is kept in `requested_weeks` for messaging.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulingRequest {
    pub subjects: Vec<String>,
    pub sessions_per_subject: BTreeMap<String, u32>,
    pub weekly_hours: f64,
    pub weeks: u32,
    pub requested_weeks: u32,
    pub session_length_minutes: i64,
    pub break_length_minutes: i64,
    pub time_preference: TimePreference,
    pub preferred_days: Vec<Weekday>,
    pub optional_notes: Option<String>,
}

impl SchedulingRequest {
    /// Weekly session count summed over all subjects. Per-subject counts are
    /// unbounded user input, so totals are carried in u64.
    pub fn sessions_per_week(&self) -> u64 {
        self.sessions_per_subject
            .values()
            .map(|count| u64::from(*count))
            .sum()
    }

    pub fn total_requested_sessions(&self) -> u64 {
        self.sessions_per_week() * u64::from(self.weeks)
    }

    pub fn all_seven_days(&self) -> bool {
        self.preferred_days.len() == 7
    }
}

/// Per-request scheduling bounds derived from the time window and durations.
/// Recomputed for every request, never persisted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CapacityProfile {
    pub max_sessions_per_day: u32,
    pub total_available_slots: u32,
    pub total_requested_sessions: u64,
}
