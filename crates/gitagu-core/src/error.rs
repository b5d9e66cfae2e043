use std::time::Duration;

use thiserror::Error;

use crate::session::RunState;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("remote agent service not configured: {0}")]
    NotConfigured(String),

    #[error("agent run {state}: {}", .detail.as_deref().unwrap_or("no error detail"))]
    RunFailed {
        state: RunState,
        detail: Option<String>,
    },

    #[error("agent run timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("no results: {0}")]
    NoResults(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to parse agent response: {0}")]
    Parse(String),

    #[error("repository provider error: {0}")]
    Provider(String),

    #[error("invalid repository id: {0}")]
    InvalidRepoId(String),

    #[error("agent error: {0}")]
    Agent(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("prompt error: {0}")]
    Prompt(#[from] gitagu_pm::PmError),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    /// Returns whether this error aborts a whole analysis request.
    ///
    /// Every other error is absorbed by a phase fallback.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NotConfigured(_))
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Parse(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}
