use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult, PlanErrorCode};
use crate::models::plan::WeekBlock;

/// How much of the response tail/head is surfaced in diagnostics.
const PREVIEW_CHARS: usize = 500;

static JSON_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[\s\S]*\}").expect("json object pattern must compile"));

#[derive(Debug, serde::Deserialize)]
struct ChunkEnvelope {
    weeks: Vec<WeekBlock>,
}

/// Strip markdown fencing and reject structurally implausible or truncated
/// text. Text failing these checks is never handed to the JSON parser.
pub fn sanitize(raw: &str) -> AppResult<String> {
    let trimmed = raw.trim();
    let cleaned = if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```JSON")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
            .to_string()
    } else {
        trimmed.to_string()
    };

    if !cleaned.ends_with('}') {
        return Err(AppError::plan_with_details(
            PlanErrorCode::MalformedResponse,
            "response appears cut off: text does not end with '}'",
            None,
            Some(json!({ "tail": text_tail(&cleaned, PREVIEW_CHARS) })),
        ));
    }

    let closing_braces = cleaned.matches('}').count();
    if !cleaned.contains("\"weeks\"") || closing_braces < 2 {
        return Err(AppError::plan_with_details(
            PlanErrorCode::MalformedResponse,
            "response is not a plausible plan object",
            None,
            Some(json!({
                "hasWeeksKey": cleaned.contains("\"weeks\""),
                "closingBraces": closing_braces,
                "tail": text_tail(&cleaned, PREVIEW_CHARS),
            })),
        ));
    }

    Ok(cleaned)
}

/// Parse sanitized text into week blocks. Direct parse first; on failure the
/// first balanced-looking `{...}` substring is extracted and re-parsed as an
/// explicitly lower-confidence path.
pub fn parse_week_chunk(cleaned: &str) -> AppResult<Vec<WeekBlock>> {
    match serde_json::from_str::<ChunkEnvelope>(cleaned) {
        Ok(envelope) => {
            debug!(target: "app::plan", weeks = envelope.weeks.len(), "chunk parsed directly");
            Ok(envelope.weeks)
        }
        Err(direct_err) => {
            let extracted = JSON_OBJECT
                .find(cleaned)
                .map(|found| found.as_str())
                .unwrap_or_default();

            match serde_json::from_str::<ChunkEnvelope>(extracted) {
                Ok(envelope) => {
                    warn!(
                        target: "app::plan",
                        weeks = envelope.weeks.len(),
                        "chunk extracted via pattern match, not parsed directly"
                    );
                    Ok(envelope.weeks)
                }
                _ => Err(AppError::plan_with_details(
                    PlanErrorCode::ParseError,
                    format!("failed to parse plan chunk: {direct_err}"),
                    None,
                    Some(json!({ "preview": text_head(cleaned, PREVIEW_CHARS) })),
                )),
            }
        }
    }
}

fn text_tail(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    text.chars().skip(total.saturating_sub(max_chars)).collect()
}

fn text_head(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
