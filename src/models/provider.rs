use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::AppResult;

/// The external text-generation services this pipeline can speak to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    Groq,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::Groq => "groq",
        }
    }
}

/// Pipeline tasks that invoke a provider. Typed so that task-to-model
/// resolution happens once at construction instead of via string dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanTask {
    WeeklyPlan,
}

impl PlanTask {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanTask::WeeklyPlan => "weeklyPlan",
        }
    }
}

/// Resolved model configuration for one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderModelConfig {
    pub kind: ProviderKind,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl From<&ProviderModelConfig> for GenerationOptions {
    fn from(config: &ProviderModelConfig) -> Self {
        GenerationOptions {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

/// Metadata describing the provider call that produced a response.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<HashMap<String, u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<JsonValue>,
}

/// One successful generation: the raw text plus which provider served it.
#[derive(Debug, Clone)]
pub struct GeneratedText {
    pub text: String,
    pub provider_used: String,
    pub metadata: ProviderMetadata,
}

/// Opaque "text in, text or failure out" capability per provider.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    fn id(&self) -> &str;

    async fn generate(
        &self,
        system_prompt: Option<&str>,
        prompt: &str,
        options: &GenerationOptions,
    ) -> AppResult<GeneratedText>;

    /// Lightweight reachability probe; never invokes generation.
    async fn ping(&self) -> AppResult<ProviderMetadata>;
}

/// Injected usage-statistics capability, owned by the composition root.
pub trait MetricsSink: Send + Sync {
    fn record(&self, provider: &str, task: PlanTask, tokens: Option<u64>, duration_ms: u128);
}

/// Default sink for callers that do not collect usage statistics.
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record(&self, _provider: &str, _task: PlanTask, _tokens: Option<u64>, _duration_ms: u128) {}
}
