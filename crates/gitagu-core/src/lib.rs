//! Agent-driven repository analysis.
//!
//! [`Engine`] analyzes a repository for a chosen AI coding assistant in three
//! phases (narrative analysis, configuration discovery, setup extraction),
//! reporting progress over a [`ProgressStream`] and falling back to
//! deterministic output whenever the remote agent service fails.

mod agent;
mod agents_api;
mod analyze;
mod assistant;
mod config;
mod engine;
mod error;
mod events;
mod github;
mod identify;
mod mock;
mod repo;
mod response;
mod session;
mod setup;

#[cfg(test)]
mod test_support;

pub use agent::AgentRunner;
pub use agents_api::{
    AgentDefinition, AgentsApi, AzureAgentsClient, MessageRole, RunStatus, ThreadMessage,
};
pub use analyze::AnalysisRequest;
pub use assistant::{Assistant, canonical_id};
pub use config::{
    AgentProjectConfig, AgentSettings, EngineConfig, GithubConfig, ProjectConfig, PromptsConfig,
    load_project_config,
};
pub use engine::Engine;
pub use error::CoreError;
pub use events::{
    AnalysisResult, LIVENESS_TIMEOUT, Phase, ProgressReporter, ProgressStatus, ProgressStream,
    ProgressUpdate, Signal, StreamMessage,
};
pub use github::GitHubProvider;
pub use identify::{
    CONFIG_FILE_PRIORITY, ConfigFileIdentifier, ConfigFileSet, FileSetOrigin, Identification,
    MAX_CONFIG_FILES,
};
pub use mock::{detect_language, generate as generate_mock_analysis};
pub use repo::{
    DEPENDENCY_FILES, FileKind, RepoId, RepositoryFile, RepositoryInfo, RepositoryProvider,
    RepositorySnapshot, primary_language,
};
pub use response::parse_object;
pub use session::RunState;
pub use setup::{SETUP_KEYS, SetupInstructionExtractor, SetupInstructionSet};
