use crate::{strip_code_fence, truncate_chars, TextGenerator, EXTRACT_INPUT_CHARS, MAX_TERMS};

const EXTRACT_SYSTEM: &str = "You output only valid JSON arrays of search keywords.";
const EXTRACT_TEMPERATURE: f64 = 0.3;

/// Turn a message into 3-6 short search terms. Fail-open: an empty vec means
/// either an empty message or an extraction failure, and the caller presents
/// the same "couldn't extract keywords" reply for both.
pub(crate) fn extract_keywords(model: &dyn TextGenerator, message_text: &str) -> Vec<String> {
    let trimmed = message_text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let prompt = format!(
        "You are a search query expert for workplace chat (e.g. Slack).\n\
         Given the following message, output exactly 3 to 4 search keywords that would best find \
         related past conversations and experts in Slack's search.\n\
         Each keyword should be a SINGLE word or at most a two-word term. Do NOT use long phrases. \
         Keep them short and specific.\n\
         Output ONLY a JSON array of strings, no other text. \
         Example: [\"deployment\", \"CI pipeline\", \"testing\"].\n\n\
         Message:\n{}",
        truncate_chars(trimmed, EXTRACT_INPUT_CHARS)
    );

    match model.generate(&prompt, EXTRACT_SYSTEM, EXTRACT_TEMPERATURE) {
        Ok(text) => parse_keyword_response(&text),
        Err(err) => {
            eprintln!("[pipeline] keyword extraction failed: {err}");
            Vec::new()
        }
    }
}

/// The model must return a JSON array of strings; anything else counts as
/// extraction failure and yields an empty term set.
pub(crate) fn parse_keyword_response(text: &str) -> Vec<String> {
    let clean = strip_code_fence(text);
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&clean) else {
        return Vec::new();
    };
    let Some(items) = value.as_array() else {
        return Vec::new();
    };

    let mut terms = Vec::new();
    for item in items {
        let Some(term) = item.as_str() else {
            return Vec::new();
        };
        let term = term.trim();
        if !term.is_empty() {
            terms.push(term.to_string());
        }
    }
    terms.truncate(MAX_TERMS);
    terms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MapError;
    use std::sync::Mutex;

    struct ScriptedModel {
        responses: Mutex<Vec<Result<String, MapError>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<Result<String, MapError>>) -> Self {
            ScriptedModel {
                responses: Mutex::new(responses),
                calls: Mutex::new(0),
            }
        }

        fn call_count(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    impl TextGenerator for ScriptedModel {
        fn generate(&self, _: &str, _: &str, _: f64) -> Result<String, MapError> {
            *self.calls.lock().unwrap() += 1;
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(MapError::Model("script exhausted".to_string()));
            }
            responses.remove(0)
        }
    }

    #[test]
    fn empty_message_skips_model_call() {
        let model = ScriptedModel::new(vec![Ok("[\"x\"]".to_string())]);
        assert!(extract_keywords(&model, "").is_empty());
        assert!(extract_keywords(&model, "   \n\t ").is_empty());
        assert_eq!(model.call_count(), 0);
    }

    #[test]
    fn extraction_failure_fails_open() {
        let model = ScriptedModel::new(vec![Err(MapError::Model("boom".to_string()))]);
        assert!(extract_keywords(&model, "deploy question").is_empty());
        assert_eq!(model.call_count(), 1);
    }

    #[test]
    fn parse_valid_array() {
        let terms = parse_keyword_response("[\"deployment\", \"CI pipeline\"]");
        assert_eq!(terms, vec!["deployment", "CI pipeline"]);
    }

    #[test]
    fn parse_fenced_array() {
        let terms = parse_keyword_response("```json\n[\"deployment\"]\n```");
        assert_eq!(terms, vec!["deployment"]);
    }

    #[test]
    fn parse_rejects_non_array() {
        assert!(parse_keyword_response("{\"terms\": [\"a\"]}").is_empty());
        assert!(parse_keyword_response("\"deployment\"").is_empty());
        assert!(parse_keyword_response("not json at all").is_empty());
    }

    #[test]
    fn parse_rejects_mixed_types() {
        assert!(parse_keyword_response("[\"a\", 3, \"b\"]").is_empty());
    }

    #[test]
    fn parse_caps_at_six() {
        let terms =
            parse_keyword_response("[\"a\", \"b\", \"c\", \"d\", \"e\", \"f\", \"g\", \"h\"]");
        assert_eq!(terms.len(), MAX_TERMS);
        assert_eq!(terms[5], "f");
    }
}
