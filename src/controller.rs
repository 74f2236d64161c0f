use crate::{
    backfill, collaboration_map_blocks, extract_keywords, filter_self_mentions, gather_files,
    gather_messages, synthesize, MapError, NameCache, SearchBackend, TextGenerator, Transport,
    TriggerEvent,
};

const REPLY_NO_TEXT: &str =
    "I couldn't read the message content (e.g. file-only or no history access).";
const REPLY_NO_KEYWORDS: &str = "I couldn't extract search keywords from this message.";
const BLOCKS_FALLBACK_TEXT: &str = "Collaboration Map (see blocks)";

/// Per-trigger orchestration. One instance handles one trigger on one
/// thread; the only state shared across triggers is the name cache and the
/// bot identity resolved at startup.
pub(crate) struct Pipeline<'a> {
    pub(crate) transport: &'a dyn Transport,
    pub(crate) search: &'a dyn SearchBackend,
    pub(crate) model: &'a dyn TextGenerator,
    pub(crate) names: &'a NameCache,
    pub(crate) bot_user_id: Option<String>,
    pub(crate) max_results: usize,
    pub(crate) include_files: bool,
}

impl Pipeline<'_> {
    fn is_self(&self, user_id: &str) -> bool {
        !user_id.is_empty() && self.bot_user_id.as_deref() == Some(user_id)
    }

    /// Error/fallback reply: prefer the thread, fall back to the channel,
    /// then give up quietly.
    fn reply(&self, event: &TriggerEvent, text: &str) {
        if self
            .transport
            .post_text(&event.channel_id, Some(&event.message_ts), text)
            .is_ok()
        {
            return;
        }
        if let Err(err) = self.transport.post_text(&event.channel_id, None, text) {
            eprintln!(
                "[pipeline] failed to post fallback reply to {}: {err}",
                event.channel_id
            );
        }
    }

    /// Post the card in-thread; one retry as a plain channel post, then the
    /// failure is logged and swallowed.
    fn dispatch(&self, event: &TriggerEvent, blocks: &[serde_json::Value]) {
        match self.transport.post_blocks(
            &event.channel_id,
            Some(&event.message_ts),
            blocks,
            BLOCKS_FALLBACK_TEXT,
        ) {
            Ok(()) => {}
            Err(err) => {
                eprintln!("[pipeline] threaded post failed, retrying unthreaded: {err}");
                if let Err(err) = self.transport.post_blocks(
                    &event.channel_id,
                    None,
                    blocks,
                    BLOCKS_FALLBACK_TEXT,
                ) {
                    eprintln!(
                        "[pipeline] failed to post map to {}: {err}",
                        event.channel_id
                    );
                }
            }
        }
    }

    pub(crate) fn handle_trigger(&self, event: &TriggerEvent) {
        // Malformed events are ignored silently: replying to garbage risks
        // reply storms.
        if event.channel_id.is_empty() || event.message_ts.is_empty() {
            return;
        }
        if self.is_self(&event.actor_user_id) {
            return;
        }

        let (text, author) = match &event.prefilled_text {
            Some(text) => (text.clone(), event.actor_user_id.clone()),
            None => match self
                .transport
                .fetch_message(&event.channel_id, &event.message_ts)
            {
                Ok(pair) => pair,
                Err(err) => {
                    eprintln!("[pipeline] message fetch failed: {err}");
                    self.reply(event, &format!("Could not read the message: {err}"));
                    return;
                }
            },
        };

        // Never build a map for the bot's own messages.
        if self.is_self(&author) {
            return;
        }
        if text.trim().is_empty() {
            self.reply(event, REPLY_NO_TEXT);
            return;
        }

        eprintln!(
            "[pipeline] building collaboration map for: {}...",
            text.chars().take(80).collect::<String>()
        );

        let terms = extract_keywords(self.model, &text);
        if terms.is_empty() {
            self.reply(event, REPLY_NO_KEYWORDS);
            return;
        }
        eprintln!("[pipeline] keywords: {terms:?}");

        let evidence = match gather_messages(self.search, self.names, &terms, self.max_results) {
            Ok(records) => records,
            Err(MapError::Permission(msg)) => {
                self.reply(event, &msg);
                return;
            }
            Err(err) => {
                eprintln!("[pipeline] search failed: {err}");
                self.reply(event, &format!("Something went wrong building the map: {err}"));
                return;
            }
        };
        eprintln!("[pipeline] search returned {} results", evidence.len());

        // File evidence is optional enrichment; its failure never kills the map.
        let files = if self.include_files {
            gather_files(self.search, self.names, &terms, crate::FILE_CAP).unwrap_or_else(|err| {
                eprintln!("[pipeline] file search failed: {err}");
                Vec::new()
            })
        } else {
            Vec::new()
        };

        let map = synthesize(self.model, &text, &evidence, &files);
        let map = backfill(map, &evidence);
        let excluded = [
            self.bot_user_id.as_deref().unwrap_or(""),
            event.actor_user_id.as_str(),
        ];
        let map = filter_self_mentions(map, &excluded);

        let blocks = collaboration_map_blocks(&text, &map);
        self.dispatch(event, &blocks);
    }
}
