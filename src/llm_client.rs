//! Thin OpenAI-compatible client used for the two structured LLM calls the
//! system makes (summary/keyword extraction, LLM-based reranking) and for
//! embedding generation. No chat/streaming surface: answer generation from
//! retrieved context is out of scope here, so only JSON-in/JSON-out calls
//! are exposed.

use reqwest::Client;
use serde_json::Value as JsonValue;
use std::time::Duration;

pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl LlmClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, String> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(120))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| e.to_string())?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    /// Issue a chat-completion call constrained to JSON output, returning
    /// the parsed response body (not the decoded message content — callers
    /// pull `choices[0].message.content` and parse it themselves since its
    /// schema varies per caller).
    pub async fn chat_json(
        &self,
        model: &str,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<JsonValue, ChatError> {
        let endpoint = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": temperature,
            "max_tokens": max_tokens,
            "response_format": {"type": "json_object"},
        });

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        let status = response.status();
        parse_json_response(response, &endpoint)
            .await
            .map_err(|e| ChatError::Response {
                status: status.as_u16(),
                message: e,
            })
    }

    /// Issue an embeddings call for a batch of texts, returning one vector
    /// per input in the same order.
    pub async fn embed(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, ChatError> {
        let endpoint = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({ "model": model, "input": inputs });

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        let status = response.status();
        let parsed = parse_json_response(response, &endpoint)
            .await
            .map_err(|e| ChatError::Response {
                status: status.as_u16(),
                message: e,
            })?;

        let data = parsed
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| ChatError::Response {
                status: status.as_u16(),
                message: "response missing 'data' array".to_string(),
            })?;

        data.iter()
            .map(|item| {
                item.get("embedding")
                    .and_then(|e| e.as_array())
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|v| v.as_f64().map(|f| f as f32))
                            .collect()
                    })
                    .ok_or_else(|| ChatError::Response {
                        status: status.as_u16(),
                        message: "embedding entry missing 'embedding' array".to_string(),
                    })
            })
            .collect()
    }
}

/// Extract the first choice's message content out of a chat-completion
/// response body, the shape every caller needs regardless of which prompt
/// it sent.
pub fn first_choice_content(response: &JsonValue) -> Option<&str> {
    response
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?
        .as_str()
}

#[derive(Debug, Clone)]
pub enum ChatError {
    Transport(String),
    Response { status: u16, message: String },
}

impl ChatError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ChatError::Response { status, .. } => Some(*status),
            ChatError::Transport(_) => None,
        }
    }
}

impl std::fmt::Display for ChatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatError::Transport(e) => write!(f, "transport error: {e}"),
            ChatError::Response { status, message } => {
                write!(f, "HTTP {status}: {message}")
            }
        }
    }
}

/// Parse a response body as JSON, raising a clear error if the server
/// returned HTML (a common failure mode when a gateway/proxy in front of
/// the LLM backend is down rather than the backend itself).
async fn parse_json_response(response: reqwest::Response, endpoint: &str) -> Result<JsonValue, String> {
    let body = response
        .text()
        .await
        .map_err(|e| format!("failed to read response body from {endpoint}: {e}"))?;

    let trimmed = body.trim_start();
    if trimmed.starts_with('<') {
        let preview: String = trimmed.chars().take(200).collect();
        return Err(format!(
            "endpoint {endpoint} returned HTML instead of JSON, service may be down: {preview}"
        ));
    }

    serde_json::from_str(&body).map_err(|e| {
        let preview: String = body.chars().take(300).collect();
        format!("failed to parse JSON from {endpoint}: {e}. body: {preview}")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_choice_content() {
        let response = serde_json::json!({
            "choices": [{"message": {"content": "{\"summary\": \"ok\"}"}}]
        });
        assert_eq!(first_choice_content(&response), Some("{\"summary\": \"ok\"}"));
    }

    #[test]
    fn missing_choices_returns_none() {
        let response = serde_json::json!({});
        assert_eq!(first_choice_content(&response), None);
    }
}
