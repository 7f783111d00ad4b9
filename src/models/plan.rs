use serde::{Deserialize, Serialize};

/// One generated study session. Timestamps stay RFC3339 strings at the DTO
/// boundary and are parsed on demand via `schedule_utils`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledSession {
    pub subject: String,
    pub start_time: String,
    pub end_time: String,
    /// Advisory only, never validated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learning_style: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeekBlock {
    pub week_number: u32,
    #[serde(default)]
    pub sessions: Vec<ScheduledSession>,
}

/// Aggregate plan assembled from per-chunk parses. Constructed fresh per
/// request and never mutated after repair finishes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StudyPlan {
    pub weeks: Vec<WeekBlock>,
}

impl StudyPlan {
    pub fn session_count(&self) -> usize {
        self.weeks.iter().map(|week| week.sessions.len()).sum()
    }
}

/// A session scheduled on a day outside the preferred set. The only
/// violation class eligible for mechanical repair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WrongDaySession {
    pub week_number: u32,
    pub subject: String,
    pub start_time: String,
    pub observed_day: String,
}

/// Accumulated violations from a single validation pass. Each field gates a
/// distinct failure or repair branch in the planner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationReport {
    pub invalid_subjects: Vec<String>,
    pub past_sessions: Vec<String>,
    pub wrong_day_sessions: Vec<WrongDaySession>,
    pub wrong_week_count: bool,
    pub clustered_sessions: bool,
    pub skipped_days: bool,
}

impl ValidationReport {
    /// True when no violation of any class was recorded.
    pub fn is_clean(&self) -> bool {
        self.invalid_subjects.is_empty()
            && self.past_sessions.is_empty()
            && self.wrong_day_sessions.is_empty()
            && !self.wrong_week_count
            && !self.clustered_sessions
            && !self.skipped_days
    }

    /// True when the only violations present are repairable wrong-day
    /// placements.
    pub fn only_wrong_days(&self) -> bool {
        !self.wrong_day_sessions.is_empty()
            && self.invalid_subjects.is_empty()
            && self.past_sessions.is_empty()
            && !self.wrong_week_count
            && !self.clustered_sessions
            && !self.skipped_days
    }
}
