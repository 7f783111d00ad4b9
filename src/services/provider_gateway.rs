use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult, PlanErrorCode};
use crate::models::provider::{
    GeneratedText, GenerationOptions, MetricsSink, PlanTask, ProviderKind, ProviderMetadata,
    ProviderModelConfig, TextGenerator,
};
use crate::services::prompt_templates::{fallback_system_prompt, plan_system_prompt};

/// Hard ceiling on raw chunk text. Anything longer is rejected before the
/// sanitizer ever sees it.
pub const MAX_CHUNK_RESPONSE_CHARS: usize = 1500;

/// Fixed pause between chunk calls to stay under provider rate limits.
pub const INTER_CHUNK_DELAY: StdDuration = StdDuration::from_secs(1);

const HTTP_TIMEOUT: StdDuration = StdDuration::from_secs(30);

const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com";
const DEFAULT_GROQ_MODEL: &str = "llama-3.1-8b-instant";

const PLAN_TEMPERATURE: f32 = 0.1;
const PLAN_MAX_OUTPUT_TOKENS: u32 = 1024;

/// One provider endpoint: resolved model configuration plus credentials.
#[derive(Debug, Clone)]
pub struct ProviderEndpoint {
    pub config: ProviderModelConfig,
    pub api_key: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub primary: ProviderEndpoint,
    pub fallback: ProviderEndpoint,
    pub http_timeout: StdDuration,
    pub inter_chunk_delay: StdDuration,
    pub max_chunk_response_chars: usize,
}

impl GatewayConfig {
    /// Environment-driven configuration, resolved once at startup.
    pub fn from_env() -> AppResult<Self> {
        let gemini_key = required_env("STUDYPLAN_GEMINI_API_KEY", ProviderKind::Gemini)?;
        let groq_key = required_env("STUDYPLAN_GROQ_API_KEY", ProviderKind::Groq)?;

        Ok(Self {
            primary: ProviderEndpoint {
                config: ProviderModelConfig {
                    kind: ProviderKind::Gemini,
                    model: env_or("STUDYPLAN_GEMINI_MODEL", DEFAULT_GEMINI_MODEL),
                    temperature: PLAN_TEMPERATURE,
                    max_output_tokens: PLAN_MAX_OUTPUT_TOKENS,
                },
                api_key: gemini_key,
                base_url: env_or("STUDYPLAN_GEMINI_BASE_URL", DEFAULT_GEMINI_BASE_URL),
            },
            fallback: ProviderEndpoint {
                config: ProviderModelConfig {
                    kind: ProviderKind::Groq,
                    model: env_or("STUDYPLAN_GROQ_MODEL", DEFAULT_GROQ_MODEL),
                    temperature: PLAN_TEMPERATURE,
                    max_output_tokens: PLAN_MAX_OUTPUT_TOKENS,
                },
                api_key: groq_key,
                base_url: env_or("STUDYPLAN_GROQ_BASE_URL", DEFAULT_GROQ_BASE_URL),
            },
            http_timeout: HTTP_TIMEOUT,
            inter_chunk_delay: INTER_CHUNK_DELAY,
            max_chunk_response_chars: MAX_CHUNK_RESPONSE_CHARS,
        })
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn required_env(name: &str, kind: ProviderKind) -> AppResult<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::provider(kind.as_str(), format!("{name} is not configured")))
}

/// The configured service pair, reported back to the caller on success.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceNames {
    pub primary: String,
    pub fallback: String,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderHealth {
    pub provider: String,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    pub primary: ProviderHealth,
    pub fallback: ProviderHealth,
}

/// Primary-then-fallback text generation over two opaque providers.
///
/// The only internal recovery is the single primary→secondary handoff; there
/// is no backoff loop and no further retry once the secondary has answered
/// or failed.
pub struct ProviderGateway {
    primary: Arc<dyn TextGenerator>,
    fallback: Arc<dyn TextGenerator>,
    primary_options: GenerationOptions,
    fallback_options: GenerationOptions,
    metrics: Arc<dyn MetricsSink>,
    inter_chunk_delay: StdDuration,
    max_chunk_response_chars: usize,
}

impl ProviderGateway {
    pub fn from_env(metrics: Arc<dyn MetricsSink>) -> AppResult<Self> {
        Self::from_config(GatewayConfig::from_env()?, metrics)
    }

    pub fn from_config(config: GatewayConfig, metrics: Arc<dyn MetricsSink>) -> AppResult<Self> {
        let primary_options = GenerationOptions::from(&config.primary.config);
        let fallback_options = GenerationOptions::from(&config.fallback.config);
        let primary = build_http_provider(&config.primary, config.http_timeout)?;
        let fallback = build_http_provider(&config.fallback, config.http_timeout)?;

        Ok(Self {
            primary,
            fallback,
            primary_options,
            fallback_options,
            metrics,
            inter_chunk_delay: config.inter_chunk_delay,
            max_chunk_response_chars: config.max_chunk_response_chars,
        })
    }

    /// Assemble a gateway from arbitrary generators. Used by the pipeline
    /// tests to substitute scripted providers.
    pub fn with_generators(
        primary: Arc<dyn TextGenerator>,
        fallback: Arc<dyn TextGenerator>,
        metrics: Arc<dyn MetricsSink>,
        inter_chunk_delay: StdDuration,
        max_chunk_response_chars: usize,
    ) -> Self {
        let options = GenerationOptions {
            temperature: PLAN_TEMPERATURE,
            max_output_tokens: PLAN_MAX_OUTPUT_TOKENS,
        };
        Self {
            primary,
            fallback,
            primary_options: options,
            fallback_options: options,
            metrics,
            inter_chunk_delay,
            max_chunk_response_chars,
        }
    }

    pub fn service_names(&self) -> ServiceNames {
        ServiceNames {
            primary: self.primary.id().to_string(),
            fallback: self.fallback.id().to_string(),
        }
    }

    pub fn inter_chunk_delay(&self) -> StdDuration {
        self.inter_chunk_delay
    }

    /// Generate one chunk of the plan. The primary provider is tried first;
    /// any failure, including blank text, falls through to the secondary
    /// with a system preamble restating the exact subject list.
    pub async fn generate_chunk(
        &self,
        prompt: &str,
        subjects: &[String],
    ) -> AppResult<GeneratedText> {
        let primary_error = match self
            .invoke(
                self.primary.as_ref(),
                Some(plan_system_prompt()),
                prompt,
                &self.primary_options,
            )
            .await
        {
            Ok(generated) => return self.enforce_response_ceiling(generated),
            Err(error) => error,
        };

        warn!(
            target: "app::plan",
            provider = self.primary.id(),
            error = %primary_error,
            "primary provider failed, trying fallback"
        );

        let preamble = fallback_system_prompt(subjects);
        match self
            .invoke(
                self.fallback.as_ref(),
                Some(&preamble),
                prompt,
                &self.fallback_options,
            )
            .await
        {
            Ok(generated) => self.enforce_response_ceiling(generated),
            Err(fallback_error) => Err(AppError::plan_with_details(
                PlanErrorCode::AllProvidersFailed,
                "both text-generation providers failed",
                None,
                Some(json!({
                    "primaryProvider": self.primary.id(),
                    "primaryError": primary_error.to_string(),
                    "fallbackProvider": self.fallback.id(),
                    "fallbackError": fallback_error.to_string(),
                })),
            )),
        }
    }

    /// Reachability of both configured providers, without invoking
    /// generation.
    pub async fn status(&self) -> GatewayStatus {
        GatewayStatus {
            primary: provider_health(self.primary.as_ref()).await,
            fallback: provider_health(self.fallback.as_ref()).await,
        }
    }

    async fn invoke(
        &self,
        provider: &dyn TextGenerator,
        system_prompt: Option<&str>,
        prompt: &str,
        options: &GenerationOptions,
    ) -> AppResult<GeneratedText> {
        let generated = provider.generate(system_prompt, prompt, options).await?;

        let tokens = generated
            .metadata
            .tokens_used
            .as_ref()
            .and_then(|tokens| tokens.get("total").copied());
        self.metrics.record(
            provider.id(),
            PlanTask::WeeklyPlan,
            tokens,
            generated.metadata.latency_ms.unwrap_or_default(),
        );

        if generated.text.trim().is_empty() {
            return Err(AppError::provider(provider.id(), "returned empty text"));
        }

        Ok(generated)
    }

    fn enforce_response_ceiling(&self, generated: GeneratedText) -> AppResult<GeneratedText> {
        let chars = generated.text.chars().count();
        if chars > self.max_chunk_response_chars {
            return Err(AppError::plan_with_details(
                PlanErrorCode::ResponseTooLarge,
                format!(
                    "chunk response of {chars} characters exceeds the \
                     {} character ceiling",
                    self.max_chunk_response_chars
                ),
                None,
                Some(json!({
                    "chars": chars,
                    "limit": self.max_chunk_response_chars,
                    "providerUsed": generated.provider_used,
                })),
            ));
        }
        Ok(generated)
    }
}

async fn provider_health(provider: &dyn TextGenerator) -> ProviderHealth {
    match provider.ping().await {
        Ok(metadata) => ProviderHealth {
            provider: provider.id().to_string(),
            reachable: true,
            latency_ms: metadata.latency_ms,
            model: metadata.model,
            message: None,
        },
        Err(error) => ProviderHealth {
            provider: provider.id().to_string(),
            reachable: false,
            latency_ms: None,
            model: None,
            message: Some(error.to_string()),
        },
    }
}

fn build_http_provider(
    endpoint: &ProviderEndpoint,
    timeout: StdDuration,
) -> AppResult<Arc<dyn TextGenerator>> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(2)
        .pool_idle_timeout(Some(StdDuration::from_secs(90)))
        .build()
        .map_err(|err| {
            AppError::other(format!(
                "failed to build HTTP client for {}: {err}",
                endpoint.config.kind.as_str()
            ))
        })?;

    Ok(match endpoint.config.kind {
        ProviderKind::Gemini => Arc::new(GeminiProvider {
            client,
            api_key: endpoint.api_key.clone(),
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            model: endpoint.config.model.clone(),
        }),
        ProviderKind::Groq => Arc::new(GroqProvider {
            client,
            api_key: endpoint.api_key.clone(),
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
            model: endpoint.config.model.clone(),
        }),
    })
}

struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

struct GroqProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

fn map_http_error(provider: &str, status: StatusCode, correlation_id: &str) -> AppError {
    let description = match status {
        StatusCode::UNAUTHORIZED => "API key invalid or unauthorized".to_string(),
        StatusCode::FORBIDDEN => "API access forbidden".to_string(),
        StatusCode::TOO_MANY_REQUESTS => "rate limited".to_string(),
        StatusCode::BAD_REQUEST => "request rejected as invalid".to_string(),
        StatusCode::NOT_FOUND => "endpoint or model not found".to_string(),
        status if status.is_server_error() => {
            format!("service unavailable (status {})", status.as_u16())
        }
        status => format!("unexpected status {}", status.as_u16()),
    };
    warn!(
        target: "app::ai::error",
        provider,
        correlation_id,
        status = status.as_u16(),
        "provider returned non-success status"
    );
    AppError::provider(provider, description)
}

fn error_from_reqwest(provider: &str, err: reqwest::Error, correlation_id: &str) -> AppError {
    if err.is_timeout() {
        warn!(target: "app::ai::error", provider, correlation_id, "provider request timed out");
        AppError::provider(provider, "request timed out")
    } else if err.is_connect() {
        warn!(target: "app::ai::error", provider, correlation_id, "provider connection failed");
        AppError::provider(provider, "connection failed")
    } else if let Some(status) = err.status() {
        map_http_error(provider, status, correlation_id)
    } else {
        AppError::provider(provider, format!("request failed: {err}"))
    }
}

fn extract_tokens(usage: Option<&JsonValue>, keys: [&str; 3]) -> HashMap<String, u64> {
    let mut tokens = HashMap::new();
    if let Some(usage) = usage {
        for (label, key) in ["prompt", "completion", "total"].iter().zip(keys) {
            if let Some(value) = usage.get(key).and_then(|v| v.as_u64()) {
                tokens.insert((*label).to_string(), value);
            }
        }
    }
    tokens
}

fn build_metadata(
    provider_id: &str,
    model: &str,
    tokens: HashMap<String, u64>,
    latency_ms: u128,
    correlation_id: &str,
) -> ProviderMetadata {
    ProviderMetadata {
        provider_id: Some(provider_id.to_string()),
        model: Some(model.to_string()),
        latency_ms: Some(latency_ms),
        tokens_used: if tokens.is_empty() { None } else { Some(tokens) },
        extra: Some(json!({ "correlationId": correlation_id })),
    }
}

#[async_trait::async_trait]
impl TextGenerator for GeminiProvider {
    fn id(&self) -> &str {
        ProviderKind::Gemini.as_str()
    }

    async fn generate(
        &self,
        system_prompt: Option<&str>,
        prompt: &str,
        options: &GenerationOptions,
    ) -> AppResult<GeneratedText> {
        let correlation_id = Uuid::new_v4().to_string();
        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let mut body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": options.temperature,
                "maxOutputTokens": options.max_output_tokens,
                "responseMimeType": "application/json"
            }
        });
        if let Some(system) = system_prompt {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }

        debug!(
            target: "app::ai::gemini",
            correlation_id = %correlation_id,
            prompt_len = prompt.len(),
            "invoking Gemini"
        );

        let start = Instant::now();
        let response = self
            .client
            .post(&endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| error_from_reqwest(self.id(), err, &correlation_id))?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_http_error(self.id(), status, &correlation_id));
        }

        let latency_ms = start.elapsed().as_millis();
        let payload: JsonValue = response.json().await.map_err(|err| {
            AppError::provider(self.id(), format!("failed to decode response body: {err}"))
        })?;

        let text = payload
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(|value| value.as_str())
            .ok_or_else(|| {
                AppError::provider(self.id(), "response is missing candidate text")
            })?
            .to_string();

        debug!(
            target: "app::ai::gemini",
            correlation_id = %correlation_id,
            latency_ms,
            response_len = text.len(),
            "Gemini responded"
        );

        let tokens = extract_tokens(
            payload.get("usageMetadata"),
            ["promptTokenCount", "candidatesTokenCount", "totalTokenCount"],
        );

        Ok(GeneratedText {
            text,
            provider_used: self.id().to_string(),
            metadata: build_metadata(self.id(), &self.model, tokens, latency_ms, &correlation_id),
        })
    }

    async fn ping(&self) -> AppResult<ProviderMetadata> {
        let correlation_id = Uuid::new_v4().to_string();
        let url = format!("{}/v1beta/models/{}", self.base_url, self.model);
        let start = Instant::now();
        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|err| error_from_reqwest(self.id(), err, &correlation_id))?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_http_error(self.id(), status, &correlation_id));
        }

        Ok(build_metadata(
            self.id(),
            &self.model,
            HashMap::new(),
            start.elapsed().as_millis(),
            &correlation_id,
        ))
    }
}

#[async_trait::async_trait]
impl TextGenerator for GroqProvider {
    fn id(&self) -> &str {
        ProviderKind::Groq.as_str()
    }

    async fn generate(
        &self,
        system_prompt: Option<&str>,
        prompt: &str,
        options: &GenerationOptions,
    ) -> AppResult<GeneratedText> {
        let correlation_id = Uuid::new_v4().to_string();
        let endpoint = format!("{}/openai/v1/chat/completions", self.base_url);

        let mut messages = Vec::new();
        if let Some(system) = system_prompt {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));

        let body = json!({
            "model": self.model,
            "temperature": options.temperature,
            "max_tokens": options.max_output_tokens,
            "response_format": { "type": "json_object" },
            "messages": messages
        });

        debug!(
            target: "app::ai::groq",
            correlation_id = %correlation_id,
            prompt_len = prompt.len(),
            "invoking Groq"
        );

        let start = Instant::now();
        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| error_from_reqwest(self.id(), err, &correlation_id))?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_http_error(self.id(), status, &correlation_id));
        }

        let latency_ms = start.elapsed().as_millis();
        let payload: JsonValue = response.json().await.map_err(|err| {
            AppError::provider(self.id(), format!("failed to decode response body: {err}"))
        })?;

        let text = payload
            .pointer("/choices/0/message/content")
            .and_then(|value| value.as_str())
            .ok_or_else(|| {
                AppError::provider(self.id(), "response is missing message content")
            })?
            .to_string();

        debug!(
            target: "app::ai::groq",
            correlation_id = %correlation_id,
            latency_ms,
            response_len = text.len(),
            "Groq responded"
        );

        let tokens = extract_tokens(
            payload.get("usage"),
            ["prompt_tokens", "completion_tokens", "total_tokens"],
        );

        Ok(GeneratedText {
            text,
            provider_used: self.id().to_string(),
            metadata: build_metadata(self.id(), &self.model, tokens, latency_ms, &correlation_id),
        })
    }

    async fn ping(&self) -> AppResult<ProviderMetadata> {
        let correlation_id = Uuid::new_v4().to_string();
        let url = format!("{}/openai/v1/models", self.base_url);
        let start = Instant::now();
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|err| error_from_reqwest(self.id(), err, &correlation_id))?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_http_error(self.id(), status, &correlation_id));
        }

        Ok(build_metadata(
            self.id(),
            &self.model,
            HashMap::new(),
            start.elapsed().as_millis(),
            &correlation_id,
        ))
    }
}

pub mod testing {
    use super::*;

    /// Build a single HTTP provider against an arbitrary base URL, so
    /// integration tests can point it at a local mock server without
    /// widening the public API surface.
    pub fn http_provider(
        kind: ProviderKind,
        base_url: &str,
        model: &str,
        timeout: StdDuration,
    ) -> AppResult<Arc<dyn TextGenerator>> {
        build_http_provider(
            &ProviderEndpoint {
                config: ProviderModelConfig {
                    kind,
                    model: model.to_string(),
                    temperature: PLAN_TEMPERATURE,
                    max_output_tokens: PLAN_MAX_OUTPUT_TOKENS,
                },
                api_key: "test-key".to_string(),
                base_url: base_url.to_string(),
            },
            timeout,
        )
    }
}
