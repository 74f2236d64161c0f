use thiserror::Error;

/// Failure taxonomy for one trigger. Malformed model output is never an
/// error: extraction and synthesis degrade to empty results instead.
#[derive(Debug, Error)]
pub(crate) enum MapError {
    /// Required credential or setting is absent. Raised at first use of the
    /// dependent client, never retried.
    #[error("missing configuration: {0}")]
    Config(String),

    /// The Slack token lacks a required scope. User-actionable; the message
    /// is posted verbatim as the reply.
    #[error("{0}")]
    Permission(String),

    /// Slack Web API or transport failure.
    #[error("slack api error: {0}")]
    Slack(String),

    /// Gemini request failed after retries.
    #[error("model request failed: {0}")]
    Model(String),
}
