use std::thread;
use std::time::Duration;

use crate::{build_http_agent, env_optional, MapError};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const MAX_RETRIES: usize = 2;
const RETRY_BASE_MS: u64 = 500;
const RETRY_MAX_MS: u64 = 4_000;

/// Seam to the generative model. The pipeline treats returned text as
/// untrusted and re-validates its JSON shape on every call.
pub(crate) trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str, system: &str, temperature: f64) -> Result<String, MapError>;
}

pub(crate) struct GeminiClient {
    agent: ureq::Agent,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub(crate) fn from_env(timeout_ms: u64) -> Result<Self, MapError> {
        let api_key = env_optional("GEMINI_API_KEY")
            .or_else(|| env_optional("GOOGLE_API_KEY"))
            .ok_or_else(|| {
                MapError::Config("GEMINI_API_KEY or GOOGLE_API_KEY is not set".to_string())
            })?;
        let model = env_optional("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Ok(GeminiClient {
            agent: build_http_agent(timeout_ms),
            api_key,
            model,
        })
    }
}

fn retryable(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 529)
}

fn retry_delay(attempt: usize) -> Duration {
    let ms = (RETRY_BASE_MS * 2u64.saturating_pow(attempt as u32)).min(RETRY_MAX_MS);
    Duration::from_millis(ms)
}

/// Pull the generated text out of a `generateContent` response:
/// `candidates[0].content.parts[*].text`, joined.
fn extract_text(payload: &serde_json::Value) -> Option<String> {
    let parts = payload
        .get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let mut chunks = Vec::new();
    for part in parts {
        if let Some(text) = part.get("text").and_then(|v| v.as_str()) {
            if !text.is_empty() {
                chunks.push(text.to_string());
            }
        }
    }
    if chunks.is_empty() {
        None
    } else {
        Some(chunks.join("\n"))
    }
}

impl TextGenerator for GeminiClient {
    fn generate(&self, prompt: &str, system: &str, temperature: f64) -> Result<String, MapError> {
        let url = format!(
            "{GEMINI_API_BASE}/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let payload = serde_json::json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "systemInstruction": {"parts": [{"text": system}]},
            "generationConfig": {
                "temperature": temperature,
                "responseMimeType": "application/json",
            },
        });

        let mut body = None;
        for attempt in 0..=MAX_RETRIES {
            let response = self
                .agent
                .post(&url)
                .set("content-type", "application/json")
                .send_json(payload.clone());
            match response {
                Ok(resp) => {
                    body = Some(resp.into_json::<serde_json::Value>().map_err(|e| {
                        MapError::Model(format!("generateContent decode error: {e}"))
                    })?);
                    break;
                }
                Err(ureq::Error::Status(code, resp)) => {
                    let text = resp.into_string().unwrap_or_default();
                    if attempt < MAX_RETRIES && retryable(code) {
                        thread::sleep(retry_delay(attempt));
                        continue;
                    }
                    return Err(MapError::Model(format!(
                        "generateContent failed: {code} {text}"
                    )));
                }
                Err(ureq::Error::Transport(err)) => {
                    if attempt < MAX_RETRIES {
                        thread::sleep(retry_delay(attempt));
                        continue;
                    }
                    return Err(MapError::Model(format!(
                        "generateContent transport error: {err}"
                    )));
                }
            }
        }

        let payload = body.ok_or_else(|| MapError::Model("no response body".to_string()))?;
        extract_text(&payload)
            .ok_or_else(|| MapError::Model("generateContent returned no text".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_text_joins_parts() {
        let payload = serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": "one"}, {"text": "two"}]}
            }]
        });
        assert_eq!(extract_text(&payload).as_deref(), Some("one\ntwo"));
    }

    #[test]
    fn extract_text_missing_candidates() {
        assert!(extract_text(&serde_json::json!({})).is_none());
        assert!(extract_text(&serde_json::json!({"candidates": []})).is_none());
    }

    #[test]
    fn retry_delay_caps() {
        assert_eq!(retry_delay(0), Duration::from_millis(500));
        assert_eq!(retry_delay(1), Duration::from_millis(1_000));
        assert_eq!(retry_delay(10), Duration::from_millis(4_000));
    }
}
