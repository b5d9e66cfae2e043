//! Remote agent service primitives.
//!
//! [`AgentsApi`] is the seam between the runner and the conversational agent
//! service: agents, threads, messages and runs. [`AzureAgentsClient`] is the
//! HTTP implementation; tests substitute scripted in-memory implementations.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};
use typed_builder::TypedBuilder;

use crate::config::AgentSettings;
use crate::error::CoreError;
use crate::session::RunState;

/// Timeout for a single HTTP request to the agent service.
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Definition of an ephemeral agent created for a single run.
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct AgentDefinition {
    /// Human-readable agent name (e.g. `config-file-identifier`).
    #[builder(setter(into))]
    pub name: String,

    /// System instructions the agent follows.
    #[builder(setter(into))]
    pub instructions: String,

    /// Model deployment the agent runs on.
    #[builder(setter(into))]
    pub model: String,
}

/// Status snapshot of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStatus {
    pub id: String,
    pub state: RunState,
    /// Error detail reported by the service for failed runs.
    pub last_error: Option<String>,
}

/// Author of a thread message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

/// A message in a conversation thread, text parts only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadMessage {
    pub role: MessageRole,
    pub text: String,
}

/// Primitives of the remote conversational agent service.
#[async_trait]
pub trait AgentsApi: Send + Sync {
    /// Create an agent and return its id.
    async fn create_agent(&self, definition: &AgentDefinition) -> Result<String, CoreError>;

    /// Create an empty conversation thread and return its id.
    async fn create_thread(&self) -> Result<String, CoreError>;

    /// Post a user message to a thread.
    async fn create_message(&self, thread_id: &str, content: &str) -> Result<(), CoreError>;

    /// Start a run of `agent_id` on a thread.
    async fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<RunStatus, CoreError>;

    /// Fetch the current status of a run.
    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RunStatus, CoreError>;

    /// List thread messages, oldest first.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, CoreError>;

    /// Delete an agent.
    async fn delete_agent(&self, agent_id: &str) -> Result<(), CoreError>;
}

// ── HTTP implementation ──────────────────────────────────────

/// HTTP client for the agents REST API of an AI project endpoint.
///
/// Constructed once per engine and owned by it; dropping the engine releases
/// the connection pool.
#[derive(Debug, Clone)]
pub struct AzureAgentsClient {
    endpoint: String,
    api_key: String,
    api_version: String,
    http: Client,
}

impl AzureAgentsClient {
    /// Build a client from resolved settings.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Transport` if the HTTP client cannot be built.
    pub fn new(settings: &AgentSettings) -> Result<Self, CoreError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| CoreError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint: settings.endpoint.trim_end_matches('/').to_owned(),
            api_key: settings.api_key.clone(),
            api_version: settings.api_version.clone(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("api-key", &self.api_key)
            .query(&[("api-version", self.api_version.as_str())])
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, CoreError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::Transport(format!(
                "agent service returned {status}: {}",
                body.trim()
            )));
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl AgentsApi for AzureAgentsClient {
    #[instrument(skip(self, definition), fields(name = %definition.name))]
    async fn create_agent(&self, definition: &AgentDefinition) -> Result<String, CoreError> {
        let body = json!({
            "model": definition.model,
            "name": definition.name,
            "instructions": definition.instructions,
        });
        let agent: IdObject = self
            .send(self.http.post(self.url("assistants")).json(&body))
            .await?;
        debug!(agent_id = %agent.id, "created agent");
        Ok(agent.id)
    }

    async fn create_thread(&self) -> Result<String, CoreError> {
        let thread: IdObject = self
            .send(self.http.post(self.url("threads")).json(&json!({})))
            .await?;
        Ok(thread.id)
    }

    async fn create_message(&self, thread_id: &str, content: &str) -> Result<(), CoreError> {
        let body = json!({ "role": "user", "content": content });
        let _: IdObject = self
            .send(
                self.http
                    .post(self.url(&format!("threads/{thread_id}/messages")))
                    .json(&body),
            )
            .await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, agent_id: &str) -> Result<RunStatus, CoreError> {
        let body = json!({ "assistant_id": agent_id });
        let run: RunObject = self
            .send(
                self.http
                    .post(self.url(&format!("threads/{thread_id}/runs")))
                    .json(&body),
            )
            .await?;
        Ok(run.into())
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RunStatus, CoreError> {
        let run: RunObject = self
            .send(
                self.http
                    .get(self.url(&format!("threads/{thread_id}/runs/{run_id}"))),
            )
            .await?;
        Ok(run.into())
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, CoreError> {
        let list: MessageList = self
            .send(
                self.http
                    .get(self.url(&format!("threads/{thread_id}/messages")))
                    .query(&[("order", "asc")]),
            )
            .await?;
        Ok(list.into_messages())
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<(), CoreError> {
        let _: serde_json::Value = self
            .send(self.http.delete(self.url(&format!("assistants/{agent_id}"))))
            .await?;
        Ok(())
    }
}

// ── Wire types ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct IdObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunObject {
    id: String,
    status: String,
    #[serde(default)]
    last_error: Option<RunError>,
}

#[derive(Debug, Deserialize)]
struct RunError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl From<RunObject> for RunStatus {
    fn from(run: RunObject) -> Self {
        let last_error = run.last_error.and_then(|e| match (e.code, e.message) {
            (Some(code), Some(message)) => Some(format!("{code}: {message}")),
            (code, message) => message.or(code),
        });
        Self {
            id: run.id,
            state: RunState::from_api_status(&run.status),
            last_error,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageList {
    data: Vec<MessageObject>,
}

#[derive(Debug, Deserialize)]
struct MessageObject {
    role: String,
    #[serde(default)]
    content: Vec<MessageContent>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessageContent {
    Text { text: TextContent },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct TextContent {
    value: String,
}

impl MessageList {
    fn into_messages(self) -> Vec<ThreadMessage> {
        self.data
            .into_iter()
            .map(|m| {
                let role = if m.role == "assistant" {
                    MessageRole::Assistant
                } else {
                    MessageRole::User
                };
                let text = m
                    .content
                    .into_iter()
                    .filter_map(|c| match c {
                        MessageContent::Text { text } => Some(text.value),
                        MessageContent::Other => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                ThreadMessage { role, text }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> AgentSettings {
        AgentSettings {
            endpoint: "https://agents.example.com/api/projects/demo/".to_owned(),
            api_key: "secret".to_owned(),
            model: "gpt-4o".to_owned(),
            api_version: "v1".to_owned(),
            poll_interval: Duration::from_secs(2),
            run_timeout: None,
        }
    }

    #[test]
    fn test_should_build_urls_without_double_slash() {
        let client = AzureAgentsClient::new(&settings()).expect("should build client");
        assert_eq!(
            client.url("threads/t1/runs"),
            "https://agents.example.com/api/projects/demo/threads/t1/runs"
        );
    }

    #[test]
    fn test_should_decode_run_with_error_detail() {
        let run: RunObject = serde_json::from_value(json!({
            "id": "run_1",
            "status": "failed",
            "last_error": {"code": "rate_limit_exceeded", "message": "Too many requests"}
        }))
        .expect("should decode");

        let status = RunStatus::from(run);
        assert_eq!(status.state, RunState::Failed);
        assert_eq!(
            status.last_error.as_deref(),
            Some("rate_limit_exceeded: Too many requests")
        );
    }

    #[test]
    fn test_should_decode_run_without_error() {
        let run: RunObject = serde_json::from_value(json!({
            "id": "run_1",
            "status": "in_progress",
            "last_error": null
        }))
        .expect("should decode");

        let status = RunStatus::from(run);
        assert_eq!(status.state, RunState::InProgress);
        assert!(status.last_error.is_none());
    }

    #[test]
    fn test_should_keep_only_text_parts_of_messages() {
        let list: MessageList = serde_json::from_value(json!({
            "data": [
                {"role": "user", "content": [{"type": "text", "text": {"value": "hi", "annotations": []}}]},
                {"role": "assistant", "content": [
                    {"type": "image_file", "image_file": {"file_id": "f1"}},
                    {"type": "text", "text": {"value": "first", "annotations": []}},
                    {"type": "text", "text": {"value": "second", "annotations": []}}
                ]}
            ]
        }))
        .expect("should decode");

        let messages = list.into_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert_eq!(messages[1].text, "first\nsecond");
    }
}
