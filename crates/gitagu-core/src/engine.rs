//! Core engine.
//!
//! The [`Engine`] is the entry point for all gitagu-core operations. It owns
//! the explicitly constructed service clients and hands each analysis request
//! to its own background task.

use std::path::Path;
use std::sync::Arc;

use gitagu_pm::PromptManager;
use tracing::{info, instrument, warn};

use crate::agent::AgentRunner;
use crate::agents_api::{AgentsApi, AzureAgentsClient};
use crate::analyze::{self, AnalysisRequest, AnalyzeContext};
use crate::config::{AgentSettings, EngineConfig, ProjectConfig, load_project_config};
use crate::error::CoreError;
use crate::events::{AnalysisResult, ProgressReporter, ProgressStream};
use crate::github::GitHubProvider;
use crate::repo::{RepoId, RepositorySnapshot, RepositoryProvider};

/// Analysis engine shared by every request of one process.
///
/// Created via [`Engine::new()`], which loads the project config, the prompt
/// templates and the service clients. A missing agent endpoint or key does not
/// fail construction: repository lookups still work and
/// [`analyze()`](Engine::analyze) reports `CoreError::NotConfigured`.
///
/// # Examples
///
/// ```no_run
/// use gitagu_core::{AnalysisRequest, Engine, EngineConfig, RepoId};
///
/// # async fn example() -> Result<(), gitagu_core::CoreError> {
/// let config = EngineConfig::builder()
///     .endpoint("https://example.services.ai.azure.com/api/projects/demo")
///     .api_key("secret")
///     .build();
///
/// let engine = Engine::new(config)?;
/// let request = AnalysisRequest::new("octo/demo".parse::<RepoId>()?, "devin");
/// let result = engine.analyze(request).await?;
/// println!("{}", result.analysis);
/// # Ok(())
/// # }
/// ```
pub struct Engine {
    /// CLI-level configuration.
    config: EngineConfig,
    /// Project-level configuration from the config file.
    project_config: ProjectConfig,
    /// Prompt templates, built-in plus configured directories.
    prompts: Arc<PromptManager>,
    /// Source-control data provider.
    repos: Arc<dyn RepositoryProvider>,
    /// Agent runner, or why it could not be configured.
    runner: Result<Arc<AgentRunner>, String>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("project_config", &self.project_config)
            .field("prompts", &self.prompts)
            .field("runner", &self.runner)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine talking to the configured services.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Yaml` or `CoreError::Io` if the config file exists
    /// but is invalid, `CoreError::Prompt` if a template directory cannot be
    /// loaded, and `CoreError::Transport` if an HTTP client cannot be built.
    #[instrument(skip_all, fields(config = %config.config_path().display()))]
    pub fn new(config: EngineConfig) -> Result<Self, CoreError> {
        let project_config = load_project_config(config.config_path())?;
        let repos = GitHubProvider::new(&project_config.github, config.github_token())?;

        let api = match AgentSettings::resolve(&config, &project_config) {
            Ok(settings) => Some(Arc::new(AzureAgentsClient::new(&settings)?) as Arc<dyn AgentsApi>),
            Err(CoreError::NotConfigured(_)) => None,
            Err(e) => return Err(e),
        };

        Self::with_services(config, project_config, Arc::new(repos), api)
    }

    /// Create an engine from caller-provided service clients.
    ///
    /// When `api` is `None`, or the agent settings cannot be resolved,
    /// analysis requests fail with `CoreError::NotConfigured`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Prompt` if a template directory cannot be loaded.
    pub fn with_services(
        config: EngineConfig,
        project_config: ProjectConfig,
        repos: Arc<dyn RepositoryProvider>,
        api: Option<Arc<dyn AgentsApi>>,
    ) -> Result<Self, CoreError> {
        let prompts = load_prompts(config.config_path(), &project_config)?;

        let runner = match (AgentSettings::resolve(&config, &project_config), api) {
            (Ok(settings), Some(api)) => {
                info!(model = %settings.model, "agent service configured");
                Ok(Arc::new(AgentRunner::new(api, &settings)))
            }
            (Ok(_), None) => Err("no agent service client".to_owned()),
            (Err(CoreError::NotConfigured(reason)), _) => {
                warn!(reason = %reason, "agent service not configured, analysis disabled");
                Err(reason)
            }
            (Err(e), _) => return Err(e),
        };

        Ok(Self {
            config,
            project_config,
            prompts: Arc::new(prompts),
            repos,
            runner,
        })
    }

    /// Analyze a repository and wait for the result.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotConfigured` if the agent service is not
    /// configured; every other failure degrades inside the result.
    #[instrument(skip(self), fields(repo = %request.repo, assistant = %request.assistant_id))]
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult, CoreError> {
        let ctx = self.context()?;
        let mut reporter = ProgressReporter::disabled();
        Ok(analyze::execute(&ctx, &request, &mut reporter).await)
    }

    /// Analyze a repository in the background and stream its progress.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotConfigured` before spawning anything if the
    /// agent service is not configured.
    #[instrument(skip(self), fields(repo = %request.repo, assistant = %request.assistant_id))]
    pub fn analyze_stream(&self, request: AnalysisRequest) -> Result<ProgressStream, CoreError> {
        let ctx = self.context()?;
        Ok(analyze::start_analysis(ctx, request))
    }

    /// Metadata, README and primary language of a repository.
    ///
    /// # Errors
    ///
    /// Returns the provider's error when the lookup itself fails.
    #[instrument(skip(self), fields(repo = %repo))]
    pub async fn repository_snapshot(
        &self,
        repo: &RepoId,
    ) -> Result<Option<RepositorySnapshot>, CoreError> {
        self.repos.snapshot(repo).await
    }

    /// Returns a reference to the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns a reference to the project configuration.
    pub fn project_config(&self) -> &ProjectConfig {
        &self.project_config
    }

    /// Returns the prompt manager.
    pub fn prompts(&self) -> &PromptManager {
        &self.prompts
    }

    /// Returns whether analysis requests can reach the agent service.
    pub fn is_configured(&self) -> bool {
        self.runner.is_ok()
    }

    fn context(&self) -> Result<AnalyzeContext, CoreError> {
        let runner = self
            .runner
            .as_ref()
            .map_err(|reason| CoreError::NotConfigured(reason.clone()))?;
        Ok(AnalyzeContext {
            runner: Arc::clone(runner),
            prompts: Arc::clone(&self.prompts),
            repos: Arc::clone(&self.repos),
        })
    }
}

/// Built-in templates plus every configured include directory.
///
/// Relative directories resolve against the config file's directory.
fn load_prompts(config_path: &Path, project: &ProjectConfig) -> Result<PromptManager, CoreError> {
    let mut prompts = PromptManager::new()?;
    let base = config_path.parent().unwrap_or_else(|| Path::new("."));
    for dir in &project.prompts.include {
        let dir = if dir.is_relative() { base.join(dir) } else { dir.clone() };
        let loaded = prompts.load_dir(&dir)?;
        info!(dir = %dir.display(), loaded, "loaded prompt templates");
    }
    Ok(prompts)
}
