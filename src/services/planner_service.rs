use chrono::{DateTime, FixedOffset, Local};
use serde::Serialize;
use serde_json::json;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::error::{AppError, AppResult, PlanErrorCode};
use crate::models::plan::StudyPlan;
use crate::models::request::PlanRequestPayload;
use crate::services::provider_gateway::{ProviderGateway, ServiceNames};
use crate::services::{
    capacity, constraint_model, plan_repairer, plan_validator, prompt_templates, sanitizer,
    schedule_utils,
};
use crate::utils::redact::redact_sensitive_data;

/// Storage seam for the final plan. One logical plan per user; the store is
/// expected to upsert with last-writer-wins semantics.
pub trait PlanStore: Send + Sync {
    fn upsert_plan(&self, user_id: &str, plan: &StudyPlan) -> AppResult<()>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanGenerationOutcome {
    pub plan: StudyPlan,
    pub message: String,
    pub services: ServiceNames,
    pub provider_used: String,
}

/// Sequential pipeline turning a raw constraint payload into a validated
/// study plan: normalize, capacity-check, generate week chunks, sanitize and
/// parse each, validate the aggregate, repair what is mechanically fixable.
pub struct PlannerService {
    gateway: ProviderGateway,
}

impl PlannerService {
    pub fn new(gateway: ProviderGateway) -> Self {
        Self { gateway }
    }

    pub async fn generate_plan(
        &self,
        payload: &PlanRequestPayload,
    ) -> AppResult<PlanGenerationOutcome> {
        self.generate_plan_at(payload, Local::now().fixed_offset())
            .await
    }

    /// Pipeline entry with an explicit clock, so tests can pin the plan
    /// anchor and the past-session boundary.
    pub async fn generate_plan_at(
        &self,
        payload: &PlanRequestPayload,
        now: DateTime<FixedOffset>,
    ) -> AppResult<PlanGenerationOutcome> {
        let sanitized_payload = redact_sensitive_data(&serde_json::to_value(payload)?)?;
        debug!(target: "app::plan", payload = %sanitized_payload, "received plan request");

        let request = constraint_model::normalize(payload)?;
        let profile = capacity::compute_capacity(&request)?;
        let plan_start = schedule_utils::next_monday_start(now)?;

        info!(
            target: "app::plan",
            subjects = request.subjects.len(),
            weeks = request.weeks,
            sessions_per_week = request.sessions_per_week(),
            max_sessions_per_day = profile.max_sessions_per_day,
            plan_start = %plan_start,
            "starting plan generation"
        );

        let mut plan = StudyPlan::default();
        let mut provider_used = self.gateway.service_names().primary;

        // One provider call per plan week, throttled between calls.
        for week_number in 1..=request.weeks {
            if week_number > 1 {
                sleep(self.gateway.inter_chunk_delay()).await;
            }

            let week_start =
                schedule_utils::shift_days(plan_start, i64::from(week_number - 1) * 7)?;
            let prompt = prompt_templates::build_week_chunk_prompt(
                &request,
                &profile,
                week_start,
                week_number,
                request.weeks,
            )?;

            let generated = self
                .gateway
                .generate_chunk(&prompt, &request.subjects)
                .await?;
            provider_used = generated.provider_used.clone();

            let cleaned = sanitizer::sanitize(&generated.text)?;
            let blocks = sanitizer::parse_week_chunk(&cleaned)?;

            debug!(
                target: "app::plan",
                week_number,
                blocks = blocks.len(),
                provider = %generated.provider_used,
                "chunk parsed"
            );

            // Chunks are concatenated in call order; a chunk that returns a
            // surplus week surfaces later as a week-count violation.
            for mut block in blocks {
                block.week_number = plan.weeks.len() as u32 + 1;
                plan.weeks.push(block);
            }
        }

        let report = plan_validator::validate(&plan, &request, now)?;
        self.enforce_report(&mut plan, &report, &request, now)?;

        let message = format!(
            "Generated a {}-week study plan with {} sessions",
            plan.weeks.len(),
            plan.session_count()
        );
        info!(
            target: "app::plan",
            weeks = plan.weeks.len(),
            sessions = plan.session_count(),
            provider = %provider_used,
            "plan generation finished"
        );

        Ok(PlanGenerationOutcome {
            plan,
            message,
            services: self.gateway.service_names(),
            provider_used,
        })
    }

    pub async fn generate_and_store(
        &self,
        user_id: &str,
        payload: &PlanRequestPayload,
        store: &dyn PlanStore,
    ) -> AppResult<PlanGenerationOutcome> {
        self.generate_and_store_at(user_id, payload, store, Local::now().fixed_offset())
            .await
    }

    pub async fn generate_and_store_at(
        &self,
        user_id: &str,
        payload: &PlanRequestPayload,
        store: &dyn PlanStore,
        now: DateTime<FixedOffset>,
    ) -> AppResult<PlanGenerationOutcome> {
        let outcome = self.generate_plan_at(payload, now).await?;
        store.upsert_plan(user_id, &outcome.plan)?;
        info!(target: "app::plan", user_id, "plan persisted");
        Ok(outcome)
    }

    /// Map validation findings to terminal errors, applying the one
    /// mechanical repair the pipeline supports. Everything except wrong-day
    /// placement is an unconditional hard stop.
    fn enforce_report(
        &self,
        plan: &mut StudyPlan,
        report: &crate::models::plan::ValidationReport,
        request: &crate::models::request::SchedulingRequest,
        now: DateTime<FixedOffset>,
    ) -> AppResult<()> {
        if !report.invalid_subjects.is_empty() {
            let mut invalid = report.invalid_subjects.clone();
            invalid.sort();
            invalid.dedup();
            return Err(AppError::plan_with_details(
                PlanErrorCode::InvalidSubjects,
                "generated plan contains subjects outside the request",
                None,
                Some(json!({
                    "invalidSubjects": invalid,
                    "allowedSubjects": request.subjects,
                })),
            ));
        }

        if report.wrong_week_count {
            return Err(AppError::plan_with_details(
                PlanErrorCode::WrongWeekCount,
                "generated plan does not cover the requested number of weeks",
                None,
                Some(json!({
                    "expectedWeeks": request.weeks,
                    "actualWeeks": plan.weeks.len(),
                })),
            ));
        }

        if !report.past_sessions.is_empty() {
            return Err(AppError::plan_with_details(
                PlanErrorCode::PastSessions,
                "generated plan schedules sessions before today; regenerate from the current date",
                None,
                Some(json!({ "pastSessions": report.past_sessions })),
            ));
        }

        if report.clustered_sessions {
            return Err(AppError::plan(
                PlanErrorCode::ClusteredSessions,
                "sessions are clustered on too few days despite a wide day selection",
            ));
        }

        if report.skipped_days {
            return Err(AppError::plan(
                PlanErrorCode::SkippedDays,
                "plan leaves too many selected days without sessions",
            ));
        }

        if !report.wrong_day_sessions.is_empty() {
            let repaired = plan_repairer::repair_wrong_days(plan, request, now)?;
            if repaired == 0 {
                let mut observed: Vec<String> = report
                    .wrong_day_sessions
                    .iter()
                    .map(|entry| entry.observed_day.clone())
                    .collect();
                observed.sort();
                observed.dedup();
                return Err(AppError::plan_with_details(
                    PlanErrorCode::WrongDaySessions,
                    "sessions fall outside the preferred days and could not be shifted onto them",
                    None,
                    Some(json!({
                        "expectedDays": schedule_utils::day_set_names(&request.preferred_days),
                        "observedDays": observed,
                        "wrongDaySessions": report.wrong_day_sessions,
                    })),
                ));
            }
            // A partially repaired batch proceeds; only a fully unfixable
            // batch blocks the plan.
        }

        Ok(())
    }
}
