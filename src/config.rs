use crate::{env_bool, env_optional, env_required, env_u64, env_usize, MapError};

pub(crate) const DEFAULT_HTTP_TIMEOUT_MS: u64 = 30_000;
pub(crate) const DEFAULT_TRIGGER_EMOJI: &str = "handshake";
pub(crate) const DEFAULT_MAX_RESULTS: usize = 50;

/// Bridge configuration, resolved from the environment once at startup.
/// Missing credentials surface as `MapError::Config` before the socket
/// loop starts.
#[derive(Debug, Clone)]
pub(crate) struct BotConfig {
    pub(crate) bot_token: String,
    pub(crate) app_token: String,
    /// User token: `search.messages` only works with a user token, so search
    /// runs across everything the installing user can access.
    pub(crate) user_token: String,
    pub(crate) trigger_emoji: String,
    pub(crate) max_results: usize,
    pub(crate) include_files: bool,
    pub(crate) http_timeout_ms: u64,
}

impl BotConfig {
    pub(crate) fn from_env() -> Result<Self, MapError> {
        Ok(BotConfig {
            bot_token: env_required("SLACK_BOT_TOKEN")?,
            app_token: env_required("SLACK_APP_TOKEN")?,
            user_token: env_required("SLACK_USER_TOKEN")?,
            trigger_emoji: env_optional("COLLABMAP_TRIGGER_EMOJI")
                .unwrap_or_else(|| DEFAULT_TRIGGER_EMOJI.to_string()),
            max_results: env_usize("COLLABMAP_MAX_RESULTS", DEFAULT_MAX_RESULTS)?,
            include_files: env_bool("COLLABMAP_INCLUDE_FILES", true),
            http_timeout_ms: env_u64("COLLABMAP_HTTP_TIMEOUT_MS", DEFAULT_HTTP_TIMEOUT_MS)?,
        })
    }
}

pub(crate) fn build_http_agent(timeout_ms: u64) -> ureq::Agent {
    let timeout = std::time::Duration::from_millis(timeout_ms);
    ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .build()
}
