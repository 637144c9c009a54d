//! Summary/Keyword Extractor (C5): one LLM call per document producing a
//! short summary and a keyword list consumed by the BM25 Scorer's boost
//! term. Failures degrade to an empty result rather than failing ingestion.

use crate::error::is_retriable_llm_error;
use crate::llm_client::{first_choice_content, LlmClient};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const MAX_TEXT_LENGTH: usize = 25_000;
const MIN_NON_SPACE_CHARS: usize = 100;
const MAX_KEYWORDS: usize = 20;
const MAX_ATTEMPTS: u32 = 5;
const TEMPERATURE: f32 = 0.1;
const MAX_OUTPUT_TOKENS: u32 = 512;

#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub summary: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    summary: serde_json::Value,
    #[serde(default)]
    keywords: serde_json::Value,
}

pub struct SummaryExtractor {
    client: Arc<LlmClient>,
    model: String,
}

impl SummaryExtractor {
    pub fn new(client: Arc<LlmClient>, model: String) -> Self {
        Self { client, model }
    }

    /// Extract a summary and keyword list from the full extracted document
    /// text (before chunking). Returns an empty result, never an error —
    /// ingestion must proceed even if extraction is unavailable.
    pub async fn extract(&self, text: &str) -> ExtractionResult {
        let non_space = text.chars().filter(|c| !c.is_whitespace()).count();
        if non_space < MIN_NON_SPACE_CHARS {
            return ExtractionResult::default();
        }

        let truncated: String = text.chars().take(MAX_TEXT_LENGTH).collect();
        let prompt = build_prompt(&truncated);

        let mut last_status: Option<u16> = None;
        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let backoff = Duration::from_secs(1u64 << (attempt - 1).min(4));
                tokio::time::sleep(backoff).await;
            }

            match self
                .client
                .chat_json(&self.model, &prompt, TEMPERATURE, MAX_OUTPUT_TOKENS)
                .await
            {
                Ok(response) => match parse_extraction(&response) {
                    Ok(result) => return result,
                    Err(_) => {
                        // malformed JSON body counts as a retriable failure
                        continue;
                    }
                },
                Err(e) => {
                    last_status = e.status();
                    if !is_retriable_llm_error(e.status()) {
                        break;
                    }
                }
            }
        }

        tracing::warn!(?last_status, attempts = MAX_ATTEMPTS, "summary extraction gave up, returning empty");
        ExtractionResult::default()
    }
}

fn build_prompt(text: &str) -> String {
    format!(
        "Analyze this document and provide:\n\n\
         1. Summary: 2-3 concise sentences capturing the main topics and purpose\n\
         2. Keywords: 10-15 key technical terms, concepts, or topics\n\n\
         Document text:\n{text}\n\n\
         Output format (valid JSON):\n\
         {{\"summary\": \"...\", \"keywords\": [\"...\"]}}\n\n\
         Requirements:\n\
         - Summary must be 2-3 sentences maximum\n\
         - Keywords should be lowercase, single words or short phrases\n\
         - Return valid JSON only, no additional text"
    )
}

fn parse_extraction(response: &serde_json::Value) -> Result<ExtractionResult, String> {
    let content = first_choice_content(response).ok_or("response missing choice content")?;
    let raw: RawExtraction = serde_json::from_str(content).map_err(|e| e.to_string())?;

    let summary = raw.summary.as_str().unwrap_or("").to_string();

    let mut keywords: Vec<String> = raw
        .keywords
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    if keywords.len() > MAX_KEYWORDS {
        keywords.truncate(MAX_KEYWORDS);
    }

    Ok(ExtractionResult { summary, keywords })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_response() {
        let response = serde_json::json!({
            "choices": [{"message": {"content": "{\"summary\": \"A guide.\", \"keywords\": [\"kubernetes\", \"pods\"]}"}}]
        });
        let result = parse_extraction(&response).unwrap();
        assert_eq!(result.summary, "A guide.");
        assert_eq!(result.keywords, vec!["kubernetes", "pods"]);
    }

    #[test]
    fn non_string_keywords_are_dropped() {
        let response = serde_json::json!({
            "choices": [{"message": {"content": "{\"summary\": \"ok\", \"keywords\": [\"a\", 5, true, \"b\"]}"}}]
        });
        let result = parse_extraction(&response).unwrap();
        assert_eq!(result.keywords, vec!["a", "b"]);
    }

    #[test]
    fn keywords_are_capped_at_twenty() {
        let many: Vec<String> = (0..30).map(|i| format!("kw{i}")).collect();
        let response = serde_json::json!({
            "choices": [{"message": {"content": serde_json::json!({"summary": "ok", "keywords": many}).to_string()}}]
        });
        let result = parse_extraction(&response).unwrap();
        assert_eq!(result.keywords.len(), 20);
    }

    #[test]
    fn malformed_json_content_is_rejected() {
        let response = serde_json::json!({
            "choices": [{"message": {"content": "not json"}}]
        });
        assert!(parse_extraction(&response).is_err());
    }
}
