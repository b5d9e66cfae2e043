//! Per-run state machine for one remote agent run.
//!
//! The agent service never pushes state changes; the runner polls and feeds
//! each observed [`RunState`] into a [`RunSession`], which decides whether to
//! keep polling, stop with the answer, or fail.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CoreError;

/// Lifecycle state of a remote agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Queued,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    Expired,
}

impl RunState {
    /// Map a status string reported by the agent service.
    ///
    /// Intermediate states the service distinguishes (`requires_action`,
    /// `cancelling`) still need polling, so they collapse to `InProgress`.
    /// Unrecognized strings are treated the same way.
    pub fn from_api_status(status: &str) -> Self {
        match status {
            "queued" => Self::Queued,
            "in_progress" | "requires_action" | "cancelling" => Self::InProgress,
            "completed" => Self::Completed,
            "failed" | "incomplete" => Self::Failed,
            "cancelled" => Self::Cancelled,
            "expired" => Self::Expired,
            other => {
                warn!(status = other, "unrecognized run status, continuing to poll");
                Self::InProgress
            }
        }
    }

    /// Returns whether no further transitions can happen.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Expired
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the runner should do after an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Run is still pending; wait one poll interval and check again.
    Wait,
    /// Run completed; the answer can be fetched.
    Finished,
}

/// Tracks the state of one remote run across polls.
#[derive(Debug)]
pub(crate) struct RunSession {
    run_id: String,
    state: RunState,
    polls: u32,
}

impl RunSession {
    pub(crate) fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            state: RunState::Queued,
            polls: 0,
        }
    }

    pub(crate) fn run_id(&self) -> &str {
        &self.run_id
    }

    pub(crate) fn state(&self) -> RunState {
        self.state
    }

    pub(crate) fn polls(&self) -> u32 {
        self.polls
    }

    /// Record one observed status.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::RunFailed` when the run ended as failed, cancelled
    /// or expired, and `CoreError::Agent` when called again after the run
    /// already reached a terminal state.
    pub(crate) fn observe(
        &mut self,
        observed: RunState,
        detail: Option<String>,
    ) -> Result<Step, CoreError> {
        if self.state.is_terminal() {
            return Err(CoreError::Agent(format!(
                "run {} already ended as {}",
                self.run_id, self.state
            )));
        }

        self.polls = self.polls.saturating_add(1);
        self.state = observed;

        match observed {
            RunState::Queued | RunState::InProgress => Ok(Step::Wait),
            RunState::Completed => Ok(Step::Finished),
            RunState::Failed | RunState::Cancelled | RunState::Expired => {
                Err(CoreError::RunFailed {
                    state: observed,
                    detail,
                })
            }
        }
    }
}
