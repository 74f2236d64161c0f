use serde::Serialize;

// Pipeline bounds. The prompt asks for fewer; these are the hard caps the
// parser enforces regardless of what the model returns.
pub(crate) const MAX_TERMS: usize = 6;
pub(crate) const MAX_QUERY_TERMS: usize = 4;
pub(crate) const EXPERT_CAP: usize = 8;
pub(crate) const CHANNEL_CAP: usize = 8;
pub(crate) const FILE_CAP: usize = 5;

pub(crate) const SEARCH_PAGE_SIZE: usize = 100;
pub(crate) const SEARCH_PAGE_LIMIT: usize = 3;
pub(crate) const SNIPPET_CHARS: usize = 400;

pub(crate) const EXTRACT_INPUT_CHARS: usize = 2000;
pub(crate) const PROMPT_QUERY_CHARS: usize = 500;
pub(crate) const PROMPT_MESSAGE_CAP: usize = 50;
pub(crate) const PROMPT_FILE_CAP: usize = 15;
pub(crate) const PROMPT_SNIPPET_CHARS: usize = 300;

/// One incoming trigger: a reaction on a message or an @mention.
/// `prefilled_text` carries the mention text so the controller can skip the
/// history fetch; reaction triggers leave it unset.
#[derive(Debug, Clone)]
pub(crate) struct TriggerEvent {
    pub(crate) channel_id: String,
    pub(crate) message_ts: String,
    pub(crate) actor_user_id: String,
    pub(crate) prefilled_text: Option<String>,
}

/// A past message returned by search, normalized for synthesis.
/// Identity fields may be empty when Slack cannot resolve them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct EvidenceRecord {
    pub(crate) author_id: String,
    pub(crate) author_name: String,
    pub(crate) channel_id: String,
    pub(crate) channel_name: String,
    pub(crate) snippet: String,
    pub(crate) permalink: String,
    pub(crate) ts: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct FileEvidenceRecord {
    pub(crate) file_id: String,
    pub(crate) file_name: String,
    pub(crate) file_type: String,
    pub(crate) uploader_id: String,
    pub(crate) uploader_name: String,
    pub(crate) permalink: String,
    pub(crate) ts: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub(crate) struct ExpertMention {
    pub(crate) user_id: String,
    pub(crate) name: String,
    pub(crate) reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub(crate) struct ChannelMention {
    pub(crate) channel_id: String,
    pub(crate) name: String,
    pub(crate) reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub(crate) struct FileMention {
    pub(crate) file_name: String,
    pub(crate) permalink: String,
    pub(crate) reason: String,
}

/// Synthesis output. Built fresh per trigger, never mutated afterwards;
/// the controller only filters it before rendering.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub(crate) struct CollaborationMap {
    pub(crate) summary: String,
    pub(crate) experts: Vec<ExpertMention>,
    pub(crate) channels: Vec<ChannelMention>,
    pub(crate) files: Vec<FileMention>,
}

impl CollaborationMap {
    pub(crate) fn is_empty(&self) -> bool {
        self.experts.is_empty() && self.channels.is_empty() && self.files.is_empty()
    }
}

/// JSON summary printed by the one-shot `map` subcommand.
#[derive(Debug, Serialize)]
pub(crate) struct MapReport {
    pub(crate) query: String,
    pub(crate) terms: Vec<String>,
    pub(crate) message_results: usize,
    pub(crate) file_results: usize,
    pub(crate) map: CollaborationMap,
}
