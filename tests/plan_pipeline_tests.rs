use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, FixedOffset};

use studyplan_engine::error::{AppError, AppResult, PlanErrorCode};
use studyplan_engine::models::plan::StudyPlan;
use studyplan_engine::models::provider::{
    GeneratedText, GenerationOptions, MetricsSink, NoopMetricsSink, PlanTask, ProviderMetadata,
    TextGenerator,
};
use studyplan_engine::models::request::{PlanRequestPayload, TimePreference};
use studyplan_engine::services::planner_service::{PlanStore, PlannerService};
use studyplan_engine::services::provider_gateway::ProviderGateway;

// Wednesday; the derived plan anchor is Monday 2026-03-02 09:00.
const NOW: &str = "2026-02-25T08:00:00+00:00";

const WEEK_ONE: &str = r#"{"weeks": [{"weekNumber": 1, "sessions": [
    {"subject": "Biology",
     "startTime": "2026-03-02T09:00:00+00:00",
     "endTime": "2026-03-02T10:00:00+00:00",
     "learningStyle": "reading"},
    {"subject": "Biology",
     "startTime": "2026-03-04T09:00:00+00:00",
     "endTime": "2026-03-04T10:00:00+00:00",
     "learningStyle": "practice problems"}
]}]}"#;

/// Pre-programmed generator: pops one scripted response per call and counts
/// invocations so tests can assert a provider was or was not consulted.
struct ScriptedGenerator {
    id: &'static str,
    responses: Mutex<VecDeque<Result<String, String>>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    fn new(id: &'static str, responses: Vec<Result<String, String>>) -> Arc<Self> {
        Arc::new(Self {
            id,
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TextGenerator for ScriptedGenerator {
    fn id(&self) -> &str {
        self.id
    }

    async fn generate(
        &self,
        _system_prompt: Option<&str>,
        _prompt: &str,
        _options: &GenerationOptions,
    ) -> AppResult<GeneratedText> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(GeneratedText {
                text,
                provider_used: self.id.to_string(),
                metadata: ProviderMetadata {
                    latency_ms: Some(1),
                    tokens_used: Some(HashMap::from([("total".to_string(), 42_u64)])),
                    ..ProviderMetadata::default()
                },
            }),
            Some(Err(message)) => Err(AppError::provider(self.id, message)),
            None => Err(AppError::provider(self.id, "no scripted response left")),
        }
    }

    async fn ping(&self) -> AppResult<ProviderMetadata> {
        Ok(ProviderMetadata::default())
    }
}

struct MemoryStore {
    plans: Mutex<HashMap<String, StudyPlan>>,
}

impl MemoryStore {
    fn new() -> Self {
        Self {
            plans: Mutex::new(HashMap::new()),
        }
    }
}

impl PlanStore for MemoryStore {
    fn upsert_plan(&self, user_id: &str, plan: &StudyPlan) -> AppResult<()> {
        self.plans
            .lock()
            .unwrap()
            .insert(user_id.to_string(), plan.clone());
        Ok(())
    }
}

struct RecordingSink {
    records: Mutex<Vec<(String, Option<u64>)>>,
}

impl MetricsSink for RecordingSink {
    fn record(&self, provider: &str, _task: PlanTask, tokens: Option<u64>, _duration_ms: u128) {
        self.records
            .lock()
            .unwrap()
            .push((provider.to_string(), tokens));
    }
}

fn service(primary: Arc<ScriptedGenerator>, fallback: Arc<ScriptedGenerator>) -> PlannerService {
    PlannerService::new(ProviderGateway::with_generators(
        primary,
        fallback,
        Arc::new(NoopMetricsSink),
        StdDuration::ZERO,
        1500,
    ))
}

fn biology_payload() -> PlanRequestPayload {
    PlanRequestPayload {
        subjects: vec!["Biology".to_string()],
        sessions_per_subject: HashMap::from([("Biology".to_string(), 2)]),
        weekly_hours: 4.0,
        weeks: 1,
        session_length_minutes: 60,
        break_length_minutes: 15,
        time_preference: TimePreference::Morning,
        preferred_days: vec!["Monday".to_string(), "Wednesday".to_string()],
        optional_notes: None,
    }
}

fn now() -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(NOW).unwrap()
}

#[tokio::test]
async fn clean_response_produces_a_validated_plan() {
    let primary = ScriptedGenerator::new("gemini", vec![Ok(WEEK_ONE.to_string())]);
    let fallback = ScriptedGenerator::new("groq", vec![]);
    let service = service(primary.clone(), fallback.clone());

    let outcome = service
        .generate_plan_at(&biology_payload(), now())
        .await
        .unwrap();

    assert_eq!(outcome.plan.weeks.len(), 1);
    assert_eq!(outcome.plan.session_count(), 2);
    assert_eq!(outcome.provider_used, "gemini");
    assert_eq!(outcome.services.primary, "gemini");
    assert_eq!(outcome.services.fallback, "groq");
    assert_eq!(
        outcome.message,
        "Generated a 1-week study plan with 2 sessions"
    );
    assert_eq!(primary.calls(), 1);
    assert_eq!(fallback.calls(), 0);
}

#[tokio::test]
async fn oversubscribed_request_never_reaches_a_provider() {
    let primary = ScriptedGenerator::new("gemini", vec![Ok(WEEK_ONE.to_string())]);
    let fallback = ScriptedGenerator::new("groq", vec![]);
    let service = service(primary.clone(), fallback.clone());

    // 2 preferred days * 3 per day * 1 week = 6 slots; 7 requested.
    let mut payload = biology_payload();
    payload.sessions_per_subject.insert("Biology".to_string(), 7);

    let err = service
        .generate_plan_at(&payload, now())
        .await
        .unwrap_err();

    assert_eq!(err.plan_code(), Some(PlanErrorCode::CapacityExceeded));
    assert!(err.plan_code().unwrap().is_user_correctable());
    let details = err.plan_details().unwrap();
    assert_eq!(details["totalRequestedSessions"], 7);
    assert_eq!(details["totalAvailableSlots"], 6);
    assert_eq!(primary.calls(), 0);
    assert_eq!(fallback.calls(), 0);
}

#[tokio::test]
async fn malformed_payload_is_rejected_before_capacity() {
    let primary = ScriptedGenerator::new("gemini", vec![]);
    let fallback = ScriptedGenerator::new("groq", vec![]);
    let service = service(primary.clone(), fallback);

    let mut payload = biology_payload();
    payload.weekly_hours = 60.0;

    let err = service
        .generate_plan_at(&payload, now())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation { .. }));
    assert_eq!(primary.calls(), 0);
}

#[tokio::test]
async fn fallback_provider_serves_the_chunk_when_primary_fails() {
    let primary = ScriptedGenerator::new("gemini", vec![Err("rate limited".to_string())]);
    let fallback = ScriptedGenerator::new("groq", vec![Ok(WEEK_ONE.to_string())]);
    let service = service(primary.clone(), fallback.clone());

    let outcome = service
        .generate_plan_at(&biology_payload(), now())
        .await
        .unwrap();

    assert_eq!(outcome.provider_used, "groq");
    assert_eq!(primary.calls(), 1);
    assert_eq!(fallback.calls(), 1);
}

#[tokio::test]
async fn both_providers_failing_surfaces_both_errors() {
    let primary = ScriptedGenerator::new("gemini", vec![Err("rate limited".to_string())]);
    let fallback = ScriptedGenerator::new("groq", vec![Err("connection failed".to_string())]);
    let service = service(primary, fallback);

    let err = service
        .generate_plan_at(&biology_payload(), now())
        .await
        .unwrap_err();

    assert_eq!(err.plan_code(), Some(PlanErrorCode::AllProvidersFailed));
    let details = err.plan_details().unwrap();
    assert_eq!(details["primaryProvider"], "gemini");
    assert_eq!(details["fallbackProvider"], "groq");
    assert!(details["primaryError"].as_str().unwrap().contains("rate limited"));
}

#[tokio::test]
async fn truncated_chunk_fails_as_malformed() {
    let truncated = r#"{"weeks": [{"weekNumber": 1, "sessions": ["#.to_string();
    let primary = ScriptedGenerator::new("gemini", vec![Ok(truncated)]);
    let fallback = ScriptedGenerator::new("groq", vec![]);
    let service = service(primary, fallback);

    let err = service
        .generate_plan_at(&biology_payload(), now())
        .await
        .unwrap_err();

    assert_eq!(err.plan_code(), Some(PlanErrorCode::MalformedResponse));
}

#[tokio::test]
async fn foreign_subject_in_the_response_is_terminal() {
    let foreign = WEEK_ONE.replace("Biology", "Chemistry");
    let primary = ScriptedGenerator::new("gemini", vec![Ok(foreign)]);
    let fallback = ScriptedGenerator::new("groq", vec![]);
    let service = service(primary, fallback);

    let err = service
        .generate_plan_at(&biology_payload(), now())
        .await
        .unwrap_err();

    assert_eq!(err.plan_code(), Some(PlanErrorCode::InvalidSubjects));
    let details = err.plan_details().unwrap();
    assert_eq!(details["invalidSubjects"][0], "Chemistry");
    assert_eq!(details["allowedSubjects"][0], "Biology");
}

#[tokio::test]
async fn sessions_dated_before_today_are_terminal() {
    let primary = ScriptedGenerator::new("gemini", vec![Ok(WEEK_ONE.to_string())]);
    let fallback = ScriptedGenerator::new("groq", vec![]);
    let service = service(primary, fallback);

    // Clock moved past the scripted week: everything is now in the past.
    let late_now = DateTime::parse_from_rfc3339("2026-04-01T08:00:00+00:00").unwrap();
    let err = service
        .generate_plan_at(&biology_payload(), late_now)
        .await
        .unwrap_err();

    assert_eq!(err.plan_code(), Some(PlanErrorCode::PastSessions));
}

#[tokio::test]
async fn tuesday_session_is_shifted_back_onto_monday() {
    let tuesday = WEEK_ONE.replace("2026-03-04", "2026-03-03");
    let primary = ScriptedGenerator::new("gemini", vec![Ok(tuesday)]);
    let fallback = ScriptedGenerator::new("groq", vec![]);
    let service = service(primary, fallback);

    let mut payload = biology_payload();
    payload.preferred_days = vec!["Monday".to_string()];

    let outcome = service.generate_plan_at(&payload, now()).await.unwrap();

    // Both sessions now sit on Monday 2026-03-02.
    for session in &outcome.plan.weeks[0].sessions {
        assert!(session.start_time.starts_with("2026-03-02"));
    }
}

#[tokio::test]
async fn unshiftable_wrong_day_session_is_terminal() {
    let thursday = WEEK_ONE.replace("2026-03-04", "2026-03-05");
    let primary = ScriptedGenerator::new("gemini", vec![Ok(thursday)]);
    let fallback = ScriptedGenerator::new("groq", vec![]);
    let service = service(primary, fallback);

    // Thursday shifts onto Wednesday, which is also outside the set.
    let mut payload = biology_payload();
    payload.preferred_days = vec!["Monday".to_string()];

    let err = service.generate_plan_at(&payload, now()).await.unwrap_err();

    assert_eq!(err.plan_code(), Some(PlanErrorCode::WrongDaySessions));
    let details = err.plan_details().unwrap();
    assert_eq!(details["expectedDays"][0], "Monday");
    assert_eq!(details["observedDays"][0], "Thursday");
}

#[tokio::test]
async fn garbled_session_timestamp_is_a_parse_failure_not_a_request_error() {
    let garbled = WEEK_ONE.replace("2026-03-04T09:00:00+00:00", "not-a-date");
    let primary = ScriptedGenerator::new("gemini", vec![Ok(garbled)]);
    let fallback = ScriptedGenerator::new("groq", vec![]);
    let service = service(primary, fallback);

    let err = service
        .generate_plan_at(&biology_payload(), now())
        .await
        .unwrap_err();

    assert!(!matches!(err, AppError::Validation { .. }));
    assert_eq!(err.plan_code(), Some(PlanErrorCode::ParseError));
    let details = err.plan_details().unwrap();
    assert_eq!(details["startTime"], "not-a-date");
    assert_eq!(details["subject"], "Biology");
}

#[tokio::test]
async fn repair_never_moves_a_session_before_today() {
    // Today is the plan's Monday; both sessions land on it. With only Sunday
    // allowed, the shift target is yesterday, so the repair must not apply.
    let monday_now = DateTime::parse_from_rfc3339("2026-03-02T08:00:00+00:00").unwrap();
    let monday_only = WEEK_ONE.replace("2026-03-04", "2026-03-02");
    let primary = ScriptedGenerator::new("gemini", vec![Ok(monday_only)]);
    let fallback = ScriptedGenerator::new("groq", vec![]);
    let service = service(primary, fallback);

    let mut payload = biology_payload();
    payload.preferred_days = vec!["Sunday".to_string()];

    let err = service
        .generate_plan_at(&payload, monday_now)
        .await
        .unwrap_err();

    assert_eq!(err.plan_code(), Some(PlanErrorCode::WrongDaySessions));
    let details = err.plan_details().unwrap();
    assert_eq!(details["expectedDays"][0], "Sunday");
    assert_eq!(details["observedDays"][0], "Monday");
}

#[tokio::test]
async fn multi_week_plans_renumber_chunks_sequentially() {
    // Both chunks claim week 1; the pipeline renumbers in call order.
    let primary = ScriptedGenerator::new(
        "gemini",
        vec![Ok(WEEK_ONE.to_string()), Ok(WEEK_ONE.to_string())],
    );
    let fallback = ScriptedGenerator::new("groq", vec![]);
    let service = service(primary.clone(), fallback);

    let mut payload = biology_payload();
    payload.weeks = 2;

    let outcome = service.generate_plan_at(&payload, now()).await.unwrap();

    assert_eq!(primary.calls(), 2);
    assert_eq!(outcome.plan.weeks.len(), 2);
    assert_eq!(outcome.plan.weeks[0].week_number, 1);
    assert_eq!(outcome.plan.weeks[1].week_number, 2);
    assert_eq!(outcome.plan.session_count(), 4);
}

#[tokio::test]
async fn surplus_week_in_a_chunk_breaks_the_week_count() {
    let double_week = r#"{"weeks": [
        {"weekNumber": 1, "sessions": [
            {"subject": "Biology",
             "startTime": "2026-03-02T09:00:00+00:00",
             "endTime": "2026-03-02T10:00:00+00:00"}
        ]},
        {"weekNumber": 2, "sessions": [
            {"subject": "Biology",
             "startTime": "2026-03-09T09:00:00+00:00",
             "endTime": "2026-03-09T10:00:00+00:00"}
        ]}
    ]}"#;
    let primary = ScriptedGenerator::new("gemini", vec![Ok(double_week.to_string())]);
    let fallback = ScriptedGenerator::new("groq", vec![]);
    let service = service(primary, fallback);

    let err = service
        .generate_plan_at(&biology_payload(), now())
        .await
        .unwrap_err();

    assert_eq!(err.plan_code(), Some(PlanErrorCode::WrongWeekCount));
    let details = err.plan_details().unwrap();
    assert_eq!(details["expectedWeeks"], 1);
    assert_eq!(details["actualWeeks"], 2);
}

#[tokio::test]
async fn generated_plan_is_persisted_through_the_store() {
    let primary = ScriptedGenerator::new("gemini", vec![Ok(WEEK_ONE.to_string())]);
    let fallback = ScriptedGenerator::new("groq", vec![]);
    let service = service(primary, fallback);
    let store = MemoryStore::new();

    let outcome = service
        .generate_and_store_at("user-7", &biology_payload(), &store, now())
        .await
        .unwrap();

    let stored = store.plans.lock().unwrap();
    assert_eq!(stored.get("user-7"), Some(&outcome.plan));
}

#[tokio::test]
async fn provider_usage_is_reported_to_the_metrics_sink() {
    let primary = ScriptedGenerator::new("gemini", vec![Ok(WEEK_ONE.to_string())]);
    let fallback = ScriptedGenerator::new("groq", vec![]);
    let sink = Arc::new(RecordingSink {
        records: Mutex::new(Vec::new()),
    });
    let service = PlannerService::new(ProviderGateway::with_generators(
        primary,
        fallback,
        sink.clone(),
        StdDuration::ZERO,
        1500,
    ));

    service
        .generate_plan_at(&biology_payload(), now())
        .await
        .unwrap();

    let records = sink.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0], ("gemini".to_string(), Some(42)));
}
