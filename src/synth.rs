use crate::{
    strip_code_fence, truncate_chars, ChannelMention, CollaborationMap, EvidenceRecord,
    ExpertMention, FileEvidenceRecord, FileMention, TextGenerator, CHANNEL_CAP, EXPERT_CAP,
    FILE_CAP, PROMPT_FILE_CAP, PROMPT_MESSAGE_CAP, PROMPT_QUERY_CHARS, PROMPT_SNIPPET_CHARS,
};

const SYNTH_SYSTEM: &str = "You output only valid JSON. No markdown code fences.";
const SYNTH_TEMPERATURE: f64 = 0.3;

/// Feed the evidence to the model and parse its JSON verdict into a
/// CollaborationMap. Fail-open: malformed output degrades to an empty map
/// and the renderer falls back to "no clear experts or channels".
pub(crate) fn synthesize(
    model: &dyn TextGenerator,
    query: &str,
    evidence: &[EvidenceRecord],
    files: &[FileEvidenceRecord],
) -> CollaborationMap {
    if evidence.is_empty() && files.is_empty() {
        return CollaborationMap::default();
    }

    let prompt = build_synthesis_prompt(query, evidence, files);
    match model.generate(&prompt, SYNTH_SYSTEM, SYNTH_TEMPERATURE) {
        Ok(text) => parse_map_response(&text),
        Err(err) => {
            eprintln!("[pipeline] synthesis failed: {err}");
            CollaborationMap::default()
        }
    }
}

pub(crate) fn build_synthesis_prompt(
    query: &str,
    evidence: &[EvidenceRecord],
    files: &[FileEvidenceRecord],
) -> String {
    let digest: Vec<serde_json::Value> = evidence
        .iter()
        .take(PROMPT_MESSAGE_CAP)
        .map(|r| {
            serde_json::json!({
                "user": if r.author_name.is_empty() { "unknown" } else { &r.author_name },
                "user_id": r.author_id,
                "channel": if r.channel_name.is_empty() { "unknown" } else { &r.channel_name },
                "channel_id": r.channel_id,
                "snippet": truncate_chars(&r.snippet, PROMPT_SNIPPET_CHARS),
            })
        })
        .collect();

    let mut prompt = format!(
        "You analyze Slack search results to build a \"Collaboration Map\" for someone who \
         asked or posted this:\n\n\
         Query / message context: {}\n\n\
         Search results (user, channel, snippet):\n{}\n",
        truncate_chars(query, PROMPT_QUERY_CHARS),
        serde_json::to_string_pretty(&digest).unwrap_or_default(),
    );

    if !files.is_empty() {
        let file_digest: Vec<serde_json::Value> = files
            .iter()
            .take(PROMPT_FILE_CAP)
            .map(|f| {
                serde_json::json!({
                    "file_name": f.file_name,
                    "permalink": f.permalink,
                    "uploader": f.uploader_name,
                })
            })
            .collect();
        prompt.push_str(&format!(
            "\nShared files matching the topic:\n{}\n",
            serde_json::to_string_pretty(&file_digest).unwrap_or_default()
        ));
    }

    prompt.push_str(
        "\nFrom these results:\n\
         1. Write a 1-2 sentence SUMMARY of the most relevant information, grounded in the \
         snippets above.\n\
         2. List up to 3 PEOPLE who appear to be subject matter experts or active collaborators \
         (name only, no @). Deduplicate. Prefer people who appear multiple times or in \
         substantive messages. Include their user_id when it is present in the results.\n\
         3. List up to 3 CHANNELS that are most relevant for this topic. Deduplicate. Prefer \
         channels with multiple relevant hits. Include the channel_id when present.\n",
    );
    if !files.is_empty() {
        prompt.push_str(
            "4. List up to 5 FILES that are most relevant, with their name and permalink.\n",
        );
    }
    prompt.push_str(
        "\nOutput ONLY a single JSON object with exactly this shape (no markdown, no extra \
         text):\n\
         {\"summary\": \"...\", \
         \"experts\": [{\"name\": \"Full Name\", \"user_id\": \"U...\", \"reason\": \"one short phrase why\"}], \
         \"channels\": [{\"name\": \"#channel-name\", \"channel_id\": \"C...\", \"reason\": \"one short phrase why\"}], \
         \"files\": [{\"file_name\": \"...\", \"permalink\": \"...\", \"reason\": \"one short phrase why\"}]}\n",
    );
    prompt
}

fn str_field(obj: &serde_json::Map<String, serde_json::Value>, key: &str) -> String {
    obj.get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string()
}

/// The textual form of a wrong-shaped list element, used as a display name
/// so a partially broken response stays partially useful.
fn value_as_text(value: &serde_json::Value) -> String {
    match value.as_str() {
        Some(s) => s.trim().to_string(),
        None => value.to_string(),
    }
}

fn coerce_list(value: Option<&serde_json::Value>) -> Vec<serde_json::Value> {
    value
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}

fn coerce_expert(item: &serde_json::Value) -> ExpertMention {
    match item.as_object() {
        Some(obj) => ExpertMention {
            user_id: str_field(obj, "user_id"),
            name: str_field(obj, "name"),
            reason: str_field(obj, "reason"),
        },
        None => ExpertMention {
            user_id: String::new(),
            name: value_as_text(item),
            reason: String::new(),
        },
    }
}

fn coerce_channel(item: &serde_json::Value) -> ChannelMention {
    match item.as_object() {
        Some(obj) => ChannelMention {
            channel_id: str_field(obj, "channel_id"),
            name: str_field(obj, "name"),
            reason: str_field(obj, "reason"),
        },
        None => ChannelMention {
            channel_id: String::new(),
            name: value_as_text(item),
            reason: String::new(),
        },
    }
}

fn coerce_file(item: &serde_json::Value) -> FileMention {
    match item.as_object() {
        Some(obj) => FileMention {
            file_name: str_field(obj, "file_name"),
            permalink: str_field(obj, "permalink"),
            reason: str_field(obj, "reason"),
        },
        None => FileMention {
            file_name: value_as_text(item),
            permalink: String::new(),
            reason: String::new(),
        },
    }
}

/// Map any JSON the model produced into the strict internal shape. Missing
/// or wrong-typed fields become empty; wrong-shaped elements are coerced
/// into minimal records; sequences are capped past the prompt's own limits
/// because the model is not trusted to obey instructions exactly.
pub(crate) fn parse_map_response(text: &str) -> CollaborationMap {
    let clean = strip_code_fence(text);
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&clean) else {
        return CollaborationMap::default();
    };
    if !value.is_object() {
        return CollaborationMap::default();
    }

    CollaborationMap {
        summary: value
            .get("summary")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string(),
        experts: coerce_list(value.get("experts"))
            .iter()
            .take(EXPERT_CAP)
            .map(coerce_expert)
            .collect(),
        channels: coerce_list(value.get("channels"))
            .iter()
            .take(CHANNEL_CAP)
            .map(coerce_channel)
            .collect(),
        files: coerce_list(value.get("files"))
            .iter()
            .take(FILE_CAP)
            .map(coerce_file)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MapError;
    use std::sync::Mutex;

    struct CountingModel {
        response: String,
        calls: Mutex<usize>,
    }

    impl CountingModel {
        fn new(response: &str) -> Self {
            CountingModel {
                response: response.to_string(),
                calls: Mutex::new(0),
            }
        }
    }

    impl TextGenerator for CountingModel {
        fn generate(&self, _: &str, _: &str, _: f64) -> Result<String, MapError> {
            *self.calls.lock().unwrap() += 1;
            Ok(self.response.clone())
        }
    }

    fn record(author: &str, channel: &str, ts: &str) -> EvidenceRecord {
        EvidenceRecord {
            author_id: format!("U-{author}"),
            author_name: author.to_string(),
            channel_id: format!("C-{channel}"),
            channel_name: format!("#{channel}"),
            snippet: "we deploy with the pipeline".to_string(),
            permalink: String::new(),
            ts: ts.to_string(),
        }
    }

    #[test]
    fn empty_evidence_short_circuits_without_model_call() {
        let model = CountingModel::new("{}");
        let map = synthesize(&model, "how do I deploy?", &[], &[]);
        assert!(map.is_empty());
        assert!(map.summary.is_empty());
        assert_eq!(*model.calls.lock().unwrap(), 0);
    }

    #[test]
    fn malformed_response_fails_open() {
        let model = CountingModel::new("sorry, I cannot help with that");
        let map = synthesize(&model, "q", &[record("ada", "platform", "1.0")], &[]);
        assert!(map.is_empty());
        assert_eq!(*model.calls.lock().unwrap(), 1);
    }

    #[test]
    fn parse_full_response() {
        let map = parse_map_response(
            r##"{"summary": "Deploys are discussed in #platform.",
                "experts": [{"name": "Ada", "user_id": "U1", "reason": "answered before"}],
                "channels": [{"name": "#platform", "channel_id": "C1", "reason": "many hits"}],
                "files": [{"file_name": "runbook.md", "permalink": "https://x", "reason": "the runbook"}]}"##,
        );
        assert_eq!(map.summary, "Deploys are discussed in #platform.");
        assert_eq!(map.experts[0].user_id, "U1");
        assert_eq!(map.channels[0].name, "#platform");
        assert_eq!(map.files[0].file_name, "runbook.md");
    }

    #[test]
    fn parse_strips_code_fence() {
        let map = parse_map_response("```json\n{\"summary\": \"s\", \"experts\": []}\n```");
        assert_eq!(map.summary, "s");
    }

    #[test]
    fn parse_enforces_defensive_caps() {
        let experts: Vec<serde_json::Value> = (0..10)
            .map(|i| serde_json::json!({"name": format!("person-{i}"), "reason": ""}))
            .collect();
        let channels: Vec<serde_json::Value> = (0..10)
            .map(|i| serde_json::json!({"name": format!("#chan-{i}"), "reason": ""}))
            .collect();
        let files: Vec<serde_json::Value> = (0..8)
            .map(|i| serde_json::json!({"file_name": format!("f-{i}"), "permalink": ""}))
            .collect();
        let response = serde_json::json!({
            "summary": "s",
            "experts": experts,
            "channels": channels,
            "files": files,
        });
        let map = parse_map_response(&response.to_string());
        assert_eq!(map.experts.len(), EXPERT_CAP);
        assert_eq!(map.channels.len(), CHANNEL_CAP);
        assert_eq!(map.files.len(), FILE_CAP);
    }

    #[test]
    fn parse_coerces_bare_strings_into_records() {
        let map = parse_map_response(
            r##"{"experts": ["Ada Lovelace", {"name": "Grace", "reason": "r"}],
                "channels": ["#platform"]}"##,
        );
        assert_eq!(map.experts[0].name, "Ada Lovelace");
        assert!(map.experts[0].user_id.is_empty());
        assert!(map.experts[0].reason.is_empty());
        assert_eq!(map.experts[1].name, "Grace");
        assert_eq!(map.channels[0].name, "#platform");
    }

    #[test]
    fn parse_tolerates_missing_and_wrong_typed_fields() {
        let map = parse_map_response(r#"{"summary": 42, "experts": "nope"}"#);
        assert!(map.summary.is_empty());
        assert!(map.experts.is_empty());
        assert!(map.channels.is_empty());
    }

    #[test]
    fn prompt_bounds_inputs() {
        let evidence: Vec<EvidenceRecord> = (0..80)
            .map(|i| record("ada", "platform", &format!("{i}.0")))
            .collect();
        let long_query = "q".repeat(2_000);
        let prompt = build_synthesis_prompt(&long_query, &evidence, &[]);
        // Query is cut to 500 chars and the digest to 50 records.
        assert!(!prompt.contains(&"q".repeat(501)));
        assert_eq!(prompt.matches("\"snippet\"").count(), PROMPT_MESSAGE_CAP);
    }

    #[test]
    fn prompt_mentions_files_only_when_present() {
        let evidence = vec![record("ada", "platform", "1.0")];
        let without = build_synthesis_prompt("q", &evidence, &[]);
        assert!(!without.contains("FILES"));

        let files = vec![FileEvidenceRecord {
            file_id: "F1".to_string(),
            file_name: "runbook.md".to_string(),
            file_type: "markdown".to_string(),
            uploader_id: "U1".to_string(),
            uploader_name: "Ada".to_string(),
            permalink: "https://x".to_string(),
            ts: "1.0".to_string(),
        }];
        let with = build_synthesis_prompt("q", &evidence, &files);
        assert!(with.contains("FILES"));
        assert!(with.contains("runbook.md"));
    }
}
