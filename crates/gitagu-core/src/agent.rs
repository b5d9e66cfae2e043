//! Agent session runner.
//!
//! Runs one prompt against the remote agent service: create an ephemeral
//! agent, open a thread, post the prompt, start a run, poll it to a terminal
//! state, read the last assistant message, and delete the agent again.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::agents_api::{AgentDefinition, AgentsApi, MessageRole};
use crate::config::AgentSettings;
use crate::error::CoreError;
use crate::session::{RunSession, Step};

/// Runs single-prompt conversations against the remote agent service.
///
/// One runner is built per engine from explicitly constructed settings and
/// an [`AgentsApi`] client; it holds no per-run state, so concurrent requests
/// share it freely.
pub struct AgentRunner {
    /// Client for the remote agent service.
    api: Arc<dyn AgentsApi>,
    /// Model deployment every ephemeral agent runs on.
    model: String,
    /// Delay between two run status checks.
    poll_interval: Duration,
    /// Deadline applied by [`run`](Self::run).
    run_timeout: Option<Duration>,
}

impl std::fmt::Debug for AgentRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRunner")
            .field("model", &self.model)
            .field("poll_interval", &self.poll_interval)
            .field("run_timeout", &self.run_timeout)
            .finish_non_exhaustive()
    }
}

impl AgentRunner {
    /// Create a runner from resolved settings and an agent service client.
    pub fn new(api: Arc<dyn AgentsApi>, settings: &AgentSettings) -> Self {
        Self {
            api,
            model: settings.model.clone(),
            poll_interval: settings.poll_interval,
            run_timeout: settings.run_timeout,
        }
    }

    /// Returns the model deployment name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one prompt with the runner's default deadline.
    ///
    /// # Errors
    ///
    /// See [`run_with_timeout`](Self::run_with_timeout).
    pub async fn run(
        &self,
        name: &str,
        instructions: &str,
        prompt: &str,
    ) -> Result<String, CoreError> {
        self.run_with_timeout(name, instructions, prompt, self.run_timeout)
            .await
    }

    /// Run one prompt and return the assistant's answer.
    ///
    /// The ephemeral agent is deleted after the run whatever the outcome;
    /// a failed deletion is logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::RunFailed` if the run ends failed, cancelled or
    /// expired, `CoreError::Timeout` if `timeout` elapses first,
    /// `CoreError::NoResults` if the thread holds no assistant answer, and
    /// `CoreError::Transport` for network failures.
    #[instrument(skip(self, instructions, prompt), fields(model = %self.model))]
    pub async fn run_with_timeout(
        &self,
        name: &str,
        instructions: &str,
        prompt: &str,
        timeout: Option<Duration>,
    ) -> Result<String, CoreError> {
        let definition = AgentDefinition::builder()
            .name(name)
            .instructions(instructions)
            .model(self.model.as_str())
            .build();
        let agent_id = self.api.create_agent(&definition).await?;

        let outcome = match timeout {
            Some(limit) => tokio::time::timeout(limit, self.converse(&agent_id, prompt))
                .await
                .unwrap_or_else(|_| {
                    warn!(agent = name, timeout_secs = limit.as_secs(), "agent run timed out");
                    Err(CoreError::Timeout(limit))
                }),
            None => self.converse(&agent_id, prompt).await,
        };

        if let Err(e) = self.api.delete_agent(&agent_id).await {
            warn!(agent_id = %agent_id, error = %e, "failed to delete agent");
        }

        outcome
    }

    /// Post the prompt, poll the run to completion, and read the answer.
    async fn converse(&self, agent_id: &str, prompt: &str) -> Result<String, CoreError> {
        let thread_id = self.api.create_thread().await?;
        self.api.create_message(&thread_id, prompt).await?;
        let run = self.api.create_run(&thread_id, agent_id).await?;

        let mut session = RunSession::new(run.id);
        loop {
            let status = self.api.get_run(&thread_id, session.run_id()).await?;
            debug!(run_id = %status.id, state = %status.state, "polled run");
            match session.observe(status.state, status.last_error)? {
                Step::Wait => tokio::time::sleep(self.poll_interval).await,
                Step::Finished => break,
            }
        }
        info!(
            run_id = session.run_id(),
            polls = session.polls(),
            "agent run completed"
        );

        let messages = self.api.list_messages(&thread_id).await?;
        messages
            .into_iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
            .map(|m| m.text)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| {
                CoreError::NoResults(format!("thread {thread_id} has no assistant message"))
            })
    }
}
