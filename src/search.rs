use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::{
    slack_api_get_json, truncate_chars, EvidenceRecord, FileEvidenceRecord, MapError,
    MAX_QUERY_TERMS, SEARCH_PAGE_LIMIT, SEARCH_PAGE_SIZE, SNIPPET_CHARS,
};

/// One page of raw search matches plus Slack's paging metadata.
pub(crate) struct SearchPage {
    pub(crate) matches: Vec<serde_json::Value>,
    pub(crate) page: usize,
    pub(crate) pages: usize,
}

/// Seam to the search side of the Slack API (user token). `search.messages`
/// signals a missing scope as `MapError::Permission`; everything else
/// propagates unchanged.
pub(crate) trait SearchBackend: Send + Sync {
    fn search_page(&self, query: &str, count: usize, page: usize)
        -> Result<SearchPage, MapError>;

    fn search_files(&self, query: &str, count: usize)
        -> Result<Vec<serde_json::Value>, MapError>;

    /// Resolve a user id to a display name. None on any lookup failure.
    fn user_name(&self, user_id: &str) -> Option<String>;
}

/// Process-lifetime user_id -> display name cache. Display names are
/// effectively static, so a stale or concurrently re-resolved entry is
/// harmless: overwriting a key with the same value is idempotent.
pub(crate) struct NameCache {
    inner: Mutex<HashMap<String, String>>,
}

impl NameCache {
    pub(crate) fn new() -> Self {
        NameCache {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn resolve(&self, backend: &dyn SearchBackend, user_id: &str) -> String {
        if user_id.is_empty() {
            return "Unknown".to_string();
        }
        if let Some(name) = self.inner.lock().unwrap().get(user_id) {
            return name.clone();
        }
        // Lock released during the lookup; a racing trigger just repeats it.
        let name = backend
            .user_name(user_id)
            .unwrap_or_else(|| user_id.to_string());
        self.inner
            .lock()
            .unwrap()
            .insert(user_id.to_string(), name.clone());
        name
    }
}

/// OR-combine the first few terms, unquoted: Slack's own tokenization
/// governs matching.
pub(crate) fn build_query(terms: &[String]) -> String {
    terms
        .iter()
        .take(MAX_QUERY_TERMS)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn match_channel_id(m: &serde_json::Value) -> String {
    m.get("channel")
        .and_then(|c| c.get("id"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn match_ts(m: &serde_json::Value) -> String {
    m.get("ts")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

/// Collapse by (channel_id, ts): the natural identity of a message instance.
/// The search API can return the same message on consecutive pages.
pub(crate) fn dedup_matches(matches: Vec<serde_json::Value>) -> Vec<serde_json::Value> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for m in matches {
        let key = (match_channel_id(&m), match_ts(&m));
        if seen.insert(key) {
            out.push(m);
        }
    }
    out
}

fn to_evidence_record(
    m: &serde_json::Value,
    backend: &dyn SearchBackend,
    names: &NameCache,
) -> EvidenceRecord {
    let author_id = m
        .get("user")
        .and_then(|v| v.as_str())
        .or_else(|| m.get("username").and_then(|v| v.as_str()))
        .unwrap_or("")
        .to_string();
    let channel_id = match_channel_id(m);
    let mut channel_name = m
        .get("channel")
        .and_then(|c| c.get("name"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    if !channel_name.is_empty() && !channel_name.starts_with('#') {
        channel_name = format!("#{channel_name}");
    }
    if channel_name.is_empty() {
        channel_name = if channel_id.is_empty() {
            "unknown".to_string()
        } else {
            format!("#{channel_id}")
        };
    }

    EvidenceRecord {
        author_name: names.resolve(backend, &author_id),
        author_id,
        channel_id,
        channel_name,
        snippet: truncate_chars(m.get("text").and_then(|v| v.as_str()).unwrap_or(""), SNIPPET_CHARS),
        permalink: m
            .get("permalink")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        ts: match_ts(m),
    }
}

/// Paginated, deduplicating message search. Fetches up to three pages and
/// stops early when the raw buffer reaches `max_results`, the backend says
/// this was the last page, or the page came back short.
pub(crate) fn gather_messages(
    backend: &dyn SearchBackend,
    names: &NameCache,
    terms: &[String],
    max_results: usize,
) -> Result<Vec<EvidenceRecord>, MapError> {
    if terms.is_empty() || max_results == 0 {
        return Ok(Vec::new());
    }

    let query = build_query(terms);
    let per_page = max_results.min(SEARCH_PAGE_SIZE).max(1);
    let mut raw: Vec<serde_json::Value> = Vec::new();

    for page in 1..=SEARCH_PAGE_LIMIT {
        let fetched = backend.search_page(&query, per_page, page)?;
        let short_page = fetched.matches.len() < per_page;
        raw.extend(fetched.matches);
        if raw.len() >= max_results {
            break;
        }
        if fetched.page >= fetched.pages || short_page {
            break;
        }
    }

    Ok(dedup_matches(raw)
        .iter()
        .take(max_results)
        .map(|m| to_evidence_record(m, backend, names))
        .collect())
}

fn file_ts(f: &serde_json::Value) -> String {
    match f.get("timestamp") {
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

/// File search mirrors the message variant but fetches a single page and
/// skips deduplication (file search has no duplicate-page behavior).
pub(crate) fn gather_files(
    backend: &dyn SearchBackend,
    names: &NameCache,
    terms: &[String],
    max_results: usize,
) -> Result<Vec<FileEvidenceRecord>, MapError> {
    if terms.is_empty() || max_results == 0 {
        return Ok(Vec::new());
    }

    let query = build_query(terms);
    let matches = backend.search_files(&query, max_results.min(SEARCH_PAGE_SIZE))?;

    Ok(matches
        .iter()
        .take(max_results)
        .map(|f| {
            let uploader_id = f
                .get("user")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            FileEvidenceRecord {
                file_id: f.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                file_name: f
                    .get("name")
                    .and_then(|v| v.as_str())
                    .or_else(|| f.get("title").and_then(|v| v.as_str()))
                    .unwrap_or("Untitled")
                    .to_string(),
                file_type: f
                    .get("filetype")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                uploader_name: names.resolve(backend, &uploader_id),
                uploader_id,
                permalink: f
                    .get("permalink")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                ts: file_ts(f),
            }
        })
        .collect())
}

/// User-token client for search.messages / search.files / users.info.
pub(crate) struct SlackSearchClient {
    agent: ureq::Agent,
    user_token: String,
}

impl SlackSearchClient {
    pub(crate) fn new(agent: ureq::Agent, user_token: String) -> Self {
        SlackSearchClient { agent, user_token }
    }
}

impl SearchBackend for SlackSearchClient {
    fn search_page(
        &self,
        query: &str,
        count: usize,
        page: usize,
    ) -> Result<SearchPage, MapError> {
        let count = count.to_string();
        let page_param = page.to_string();
        let response = slack_api_get_json(
            &self.agent,
            &self.user_token,
            "search.messages",
            &[("query", query), ("count", &count), ("page", &page_param)],
        )?;
        let messages = response.get("messages").cloned().unwrap_or_default();
        let matches = messages
            .get("matches")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let paging = messages.get("paging").cloned().unwrap_or_default();
        Ok(SearchPage {
            matches,
            page: paging
                .get("page")
                .and_then(|v| v.as_u64())
                .unwrap_or(page as u64) as usize,
            pages: paging.get("pages").and_then(|v| v.as_u64()).unwrap_or(1) as usize,
        })
    }

    fn search_files(
        &self,
        query: &str,
        count: usize,
    ) -> Result<Vec<serde_json::Value>, MapError> {
        let count = count.to_string();
        let response = slack_api_get_json(
            &self.agent,
            &self.user_token,
            "search.files",
            &[("query", query), ("count", &count)],
        )?;
        Ok(response
            .get("files")
            .and_then(|f| f.get("matches"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }

    fn user_name(&self, user_id: &str) -> Option<String> {
        let response = slack_api_get_json(
            &self.agent,
            &self.user_token,
            "users.info",
            &[("user", user_id)],
        )
        .ok()?;
        let user = response.get("user")?;
        user.get("real_name")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .or_else(|| {
                user.get("name")
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
            })
            .map(ToString::to_string)
    }
}
