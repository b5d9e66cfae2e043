//! Progress channel between the orchestrator task and a stream consumer.
//!
//! The orchestrator owns a [`ProgressReporter`] and pushes [`StreamMessage`]s
//! into a bounded channel. The consumer reads them through a
//! [`ProgressStream`], which polls with a liveness timeout so it notices a
//! producer that ended without saying goodbye.

use std::time::{Duration, Instant};

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::setup::SetupInstructionSet;

/// How long the consumer waits for a message before checking the producer.
pub const LIVENESS_TIMEOUT: Duration = Duration::from_secs(1);

// ── Progress updates ─────────────────────────────────────────

/// Sub-state of one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Starting,
    InProgress,
    Completed,
    Failed,
}

/// The three analysis phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Narrative analysis.
    Analysis,
    /// Configuration file identification.
    Discovery,
    /// Setup instruction extraction.
    Extraction,
}

impl Phase {
    pub fn step(self) -> u8 {
        match self {
            Self::Analysis => 1,
            Self::Discovery => 2,
            Self::Extraction => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Analysis => "Repository Analysis",
            Self::Discovery => "Configuration Discovery",
            Self::Extraction => "Setup Extraction",
        }
    }

    /// Fixed percentage reported for `status` in this phase.
    pub fn checkpoint(self, status: ProgressStatus) -> u8 {
        let (starting, in_progress, done) = match self {
            Self::Analysis => (0, 10, 33),
            Self::Discovery => (35, 45, 66),
            Self::Extraction => (70, 80, 100),
        };
        match status {
            ProgressStatus::Starting => starting,
            ProgressStatus::InProgress => in_progress,
            ProgressStatus::Completed | ProgressStatus::Failed => done,
        }
    }
}

/// One progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub step: u8,
    pub step_name: String,
    pub status: ProgressStatus,
    pub message: String,
    pub progress_percentage: u8,
    /// Seconds since the request started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

// ── Results and signals ──────────────────────────────────────

/// Terminal artifact of one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub assistant_id: String,
    pub repo_name: String,
    pub analysis: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_commands: Option<SetupInstructionSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Control messages, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Signal {
    /// The assembled result; sent once, just before `Complete`.
    FinalResult { data: AnalysisResult },
    /// The stream ended normally.
    Complete,
    /// The stream ended without a result.
    Error {
        error: String,
        assistant_id: String,
        repo_name: String,
    },
}

/// Everything that travels over the progress channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamMessage {
    Signal(Signal),
    Progress(ProgressUpdate),
}

impl StreamMessage {
    /// Returns whether nothing follows this message.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Signal(Signal::Complete | Signal::Error { .. })
        )
    }

    /// Newline-terminated JSON.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Json` if serialization fails.
    pub fn to_json_line(&self) -> Result<String, CoreError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Server-sent-event frame: `data: <json>` and a blank line.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Json` if serialization fails.
    pub fn to_sse_frame(&self) -> Result<String, CoreError> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }
}

// ── Producer side ────────────────────────────────────────────

/// Producer half of the progress channel.
///
/// Percentages never decrease: a checkpoint below the last reported value is
/// raised to it. A vanished consumer does not stop the producer.
#[derive(Debug)]
pub struct ProgressReporter {
    tx: Option<mpsc::Sender<StreamMessage>>,
    started: Instant,
    last_percentage: u8,
}

impl ProgressReporter {
    pub fn new(tx: mpsc::Sender<StreamMessage>) -> Self {
        Self {
            tx: Some(tx),
            started: Instant::now(),
            last_percentage: 0,
        }
    }

    /// A reporter that drops every message.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            started: Instant::now(),
            last_percentage: 0,
        }
    }

    /// Last percentage handed out.
    pub fn percentage(&self) -> u8 {
        self.last_percentage
    }

    /// Build and send the update for `phase` in `status`.
    pub async fn report(
        &mut self,
        phase: Phase,
        status: ProgressStatus,
        message: impl Into<String>,
        details: Option<Value>,
    ) {
        let percentage = phase.checkpoint(status).max(self.last_percentage);
        self.last_percentage = percentage;
        let elapsed = self.started.elapsed().as_secs_f64();

        let update = ProgressUpdate {
            step: phase.step(),
            step_name: phase.name().to_owned(),
            status,
            message: message.into(),
            progress_percentage: percentage,
            elapsed_time: Some((elapsed * 100.0).round() / 100.0),
            details,
        };
        self.send(StreamMessage::Progress(update)).await;
    }

    /// Send a control signal.
    pub async fn signal(&mut self, signal: Signal) {
        self.send(StreamMessage::Signal(signal)).await;
    }

    async fn send(&mut self, message: StreamMessage) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(message).await.is_err() {
            debug!("progress consumer went away, dropping further messages");
            self.tx = None;
        }
    }
}

// ── Consumer side ────────────────────────────────────────────

/// Consumer half of the progress channel.
///
/// Yields messages until a terminal one has been yielded. If the producer
/// task ends first, a terminal `error` message is synthesized.
#[derive(Debug)]
pub struct ProgressStream {
    rx: mpsc::Receiver<StreamMessage>,
    producer: Option<JoinHandle<()>>,
    assistant_id: String,
    repo_name: String,
    liveness: Duration,
    finished: bool,
}

impl ProgressStream {
    pub(crate) fn new(
        rx: mpsc::Receiver<StreamMessage>,
        producer: JoinHandle<()>,
        assistant_id: impl Into<String>,
        repo_name: impl Into<String>,
    ) -> Self {
        Self {
            rx,
            producer: Some(producer),
            assistant_id: assistant_id.into(),
            repo_name: repo_name.into(),
            liveness: LIVENESS_TIMEOUT,
            finished: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_liveness(mut self, liveness: Duration) -> Self {
        self.liveness = liveness;
        self
    }

    /// Next message, `None` once a terminal message has been yielded.
    pub async fn next(&mut self) -> Option<StreamMessage> {
        if self.finished {
            return None;
        }
        loop {
            match tokio::time::timeout(self.liveness, self.rx.recv()).await {
                Ok(Some(message)) => {
                    self.finished = message.is_terminal();
                    return Some(message);
                }
                Ok(None) => return Some(self.abandoned()),
                Err(_) => {
                    let exited = self
                        .producer
                        .as_ref()
                        .is_none_or(JoinHandle::is_finished);
                    if exited {
                        if let Ok(message) = self.rx.try_recv() {
                            self.finished = message.is_terminal();
                            return Some(message);
                        }
                        return Some(self.abandoned());
                    }
                    debug!("no progress within liveness window, producer still running");
                }
            }
        }
    }

    fn abandoned(&mut self) -> StreamMessage {
        warn!(repo = %self.repo_name, "analysis task ended without a terminal message");
        self.finished = true;
        self.producer = None;
        StreamMessage::Signal(Signal::Error {
            error: "analysis ended unexpectedly".to_owned(),
            assistant_id: self.assistant_id.clone(),
            repo_name: self.repo_name.clone(),
        })
    }

    /// Adapt into a [`futures::Stream`].
    pub fn into_stream(self) -> impl Stream<Item = StreamMessage> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            stream.next().await.map(|message| (message, stream))
        })
    }
}
