use crate::MapError;

pub(crate) const SLACK_API_BASE: &str = "https://slack.com/api";

/// Seam to the Slack message transport: fetching the triggering message and
/// posting replies. Search runs over a separate seam (`SearchBackend`)
/// because it needs the user token rather than the bot token.
pub(crate) trait Transport: Send + Sync {
    /// Returns `(text, author_user_id)`. A missing message is not an error:
    /// both fields come back empty.
    fn fetch_message(&self, channel_id: &str, ts: &str) -> Result<(String, String), MapError>;

    fn post_blocks(
        &self,
        channel_id: &str,
        thread_ts: Option<&str>,
        blocks: &[serde_json::Value],
        fallback_text: &str,
    ) -> Result<(), MapError>;

    fn post_text(
        &self,
        channel_id: &str,
        thread_ts: Option<&str>,
        text: &str,
    ) -> Result<(), MapError>;
}

/// Map a Slack `ok: false` error code. `missing_scope` becomes the one
/// user-actionable failure; everything else is a plain transport error.
fn slack_error(method: &str, code: &str) -> MapError {
    if code == "missing_scope" {
        MapError::Permission(format!(
            "The Slack token is missing a required scope for {method}. \
             Reinstall the app with the search:read user token scope."
        ))
    } else {
        MapError::Slack(format!("{method} error: {code}"))
    }
}

fn check_ok(method: &str, response: serde_json::Value) -> Result<serde_json::Value, MapError> {
    if response.get("ok").and_then(|v| v.as_bool()) != Some(true) {
        let code = response
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        return Err(slack_error(method, code));
    }
    Ok(response)
}

pub(crate) fn slack_api_post_json(
    agent: &ureq::Agent,
    token: &str,
    method: &str,
    payload: &serde_json::Value,
) -> Result<serde_json::Value, MapError> {
    let response = agent
        .post(&format!("{SLACK_API_BASE}/{method}"))
        .set("Authorization", &format!("Bearer {token}"))
        .set("Content-Type", "application/json")
        .send_json(payload)
        .map_err(|e| MapError::Slack(format!("{method} request error: {e}")))?
        .into_json::<serde_json::Value>()
        .map_err(|e| MapError::Slack(format!("{method} decode error: {e}")))?;
    check_ok(method, response)
}

pub(crate) fn slack_api_get_json(
    agent: &ureq::Agent,
    token: &str,
    method: &str,
    params: &[(&str, &str)],
) -> Result<serde_json::Value, MapError> {
    let mut request = agent
        .get(&format!("{SLACK_API_BASE}/{method}"))
        .set("Authorization", &format!("Bearer {token}"));
    for (key, value) in params {
        request = request.query(key, value);
    }
    let response = request
        .call()
        .map_err(|e| MapError::Slack(format!("{method} request error: {e}")))?
        .into_json::<serde_json::Value>()
        .map_err(|e| MapError::Slack(format!("{method} decode error: {e}")))?;
    check_ok(method, response)
}

/// Bot-token client for message fetch and reply dispatch.
pub(crate) struct SlackClient {
    agent: ureq::Agent,
    bot_token: String,
}

impl SlackClient {
    pub(crate) fn new(agent: ureq::Agent, bot_token: String) -> Self {
        SlackClient { agent, bot_token }
    }

    /// The bot's own user id via auth.test, fetched once per process before
    /// the socket loop starts.
    pub(crate) fn bot_user_id(&self) -> Option<String> {
        slack_api_post_json(
            &self.agent,
            &self.bot_token,
            "auth.test",
            &serde_json::json!({}),
        )
        .ok()
        .and_then(|payload| {
            payload
                .get("user_id")
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(ToString::to_string)
        })
    }

    fn post_message(&self, payload: &serde_json::Value) -> Result<(), MapError> {
        slack_api_post_json(&self.agent, &self.bot_token, "chat.postMessage", payload)?;
        Ok(())
    }
}

impl Transport for SlackClient {
    fn fetch_message(&self, channel_id: &str, ts: &str) -> Result<(String, String), MapError> {
        let response = slack_api_get_json(
            &self.agent,
            &self.bot_token,
            "conversations.history",
            &[
                ("channel", channel_id),
                ("latest", ts),
                ("inclusive", "true"),
                ("limit", "1"),
            ],
        )?;
        let Some(message) = response
            .get("messages")
            .and_then(|v| v.as_array())
            .and_then(|messages| messages.first())
        else {
            return Ok((String::new(), String::new()));
        };
        let text = message
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim()
            .to_string();
        let author = message
            .get("user")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        Ok((text, author))
    }

    fn post_blocks(
        &self,
        channel_id: &str,
        thread_ts: Option<&str>,
        blocks: &[serde_json::Value],
        fallback_text: &str,
    ) -> Result<(), MapError> {
        let mut payload = serde_json::json!({
            "channel": channel_id,
            "blocks": blocks,
            "text": fallback_text,
        });
        if let Some(ts) = thread_ts {
            payload["thread_ts"] = serde_json::json!(ts);
        }
        self.post_message(&payload)
    }

    fn post_text(
        &self,
        channel_id: &str,
        thread_ts: Option<&str>,
        text: &str,
    ) -> Result<(), MapError> {
        let mut payload = serde_json::json!({
            "channel": channel_id,
            "text": text,
        });
        if let Some(ts) = thread_ts {
            payload["thread_ts"] = serde_json::json!(ts);
        }
        self.post_message(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_scope_is_permission() {
        let err = slack_error("search.messages", "missing_scope");
        assert!(matches!(err, MapError::Permission(_)));
        assert!(err.to_string().contains("search:read"));
    }

    #[test]
    fn other_codes_are_transport() {
        let err = slack_error("chat.postMessage", "channel_not_found");
        assert!(matches!(err, MapError::Slack(_)));
    }

    #[test]
    fn check_ok_passes_success_through() {
        let response = serde_json::json!({"ok": true, "user_id": "U1"});
        assert!(check_ok("auth.test", response).is_ok());
    }

    #[test]
    fn check_ok_rejects_failure() {
        let response = serde_json::json!({"ok": false, "error": "invalid_auth"});
        assert!(check_ok("auth.test", response).is_err());
    }
}
