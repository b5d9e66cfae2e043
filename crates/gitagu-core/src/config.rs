//! Configuration types for gitagu-core.
//!
//! This module defines [`EngineConfig`] (CLI-level overrides, usually fed from
//! environment variables), [`ProjectConfig`] (from `gitagu.yaml`), and the
//! resolved [`AgentSettings`] the agent runner is built from. CLI values take
//! precedence over the config file, which takes precedence over defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::CoreError;

/// Values shipped in sample environment files that mean "not set".
const PLACEHOLDER_VALUES: &[&str] = &["your_endpoint", "your_api_key"];

// ── Engine Configuration (CLI-level) ─────────────────────────

/// Engine configuration provided by the CLI layer.
///
/// # Examples
///
/// ```
/// use gitagu_core::EngineConfig;
///
/// let config = EngineConfig::builder()
///     .endpoint("https://example.services.ai.azure.com/api/projects/demo")
///     .api_key("secret")
///     .build();
/// assert_eq!(config.model(), None);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
pub struct EngineConfig {
    /// Path to the project config file.
    #[builder(default = PathBuf::from("gitagu.yaml"), setter(into))]
    config_path: PathBuf,

    /// Agent service endpoint (takes precedence over the config file).
    #[builder(default, setter(into, strip_option(fallback = endpoint_opt)))]
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,

    /// Agent service API key.
    #[builder(default, setter(into, strip_option(fallback = api_key_opt)))]
    #[serde(skip_serializing)]
    api_key: Option<String>,

    /// Model deployment name override.
    #[builder(default, setter(into, strip_option(fallback = model_opt)))]
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,

    /// Token for the source-control API.
    #[builder(default, setter(into, strip_option(fallback = github_token_opt)))]
    #[serde(skip_serializing)]
    github_token: Option<String>,

    /// Override for the per-run timeout, in seconds.
    #[builder(default, setter(strip_option(fallback = run_timeout_secs_opt)))]
    #[serde(skip_serializing_if = "Option::is_none")]
    run_timeout_secs: Option<u64>,
}

impl EngineConfig {
    /// Returns the config file path.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Returns the endpoint override, if set and not a placeholder.
    pub fn endpoint(&self) -> Option<&str> {
        non_placeholder(self.endpoint.as_deref())
    }

    /// Returns the API key, if set and not a placeholder.
    pub fn api_key(&self) -> Option<&str> {
        non_placeholder(self.api_key.as_deref())
    }

    /// Returns the model override, if set.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Returns the source-control API token, if set.
    pub fn github_token(&self) -> Option<&str> {
        self.github_token.as_deref()
    }

    /// Returns the run timeout override, if set.
    pub fn run_timeout_secs(&self) -> Option<u64> {
        self.run_timeout_secs
    }
}

// ── Project Configuration (gitagu.yaml) ─────────────────────

/// Project-level configuration, deserialized from `gitagu.yaml`.
///
/// All fields have serde defaults so that missing keys in the YAML file
/// produce valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    /// Remote agent service settings.
    #[serde(default)]
    pub agent: AgentProjectConfig,

    /// Source-control API settings.
    #[serde(default)]
    pub github: GithubConfig,

    /// Prompt template search paths.
    #[serde(default)]
    pub prompts: PromptsConfig,
}

/// Remote agent service section of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProjectConfig {
    /// Project endpoint of the agent service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Model deployment name used for every ephemeral agent.
    #[serde(default = "default_model")]
    pub model: String,

    /// REST API version sent with every request.
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Interval between run status checks.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Deadline for a single agent run. `null` disables the deadline.
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: Option<u64>,
}

impl Default for AgentProjectConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: default_model(),
            api_version: default_api_version(),
            poll_interval_ms: default_poll_interval_ms(),
            run_timeout_secs: default_run_timeout_secs(),
        }
    }
}

/// Source-control API section of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubConfig {
    /// Base URL of the REST API.
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
        }
    }
}

/// Prompt template configuration.
///
/// Templates found in these directories replace built-in templates with the
/// same name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptsConfig {
    /// Additional template directories to search (in order).
    #[serde(default)]
    pub include: Vec<PathBuf>,
}

// ── Default value functions for serde ────────────────────────

fn default_model() -> String {
    "gpt-4o".to_owned()
}

fn default_api_version() -> String {
    "v1".to_owned()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_run_timeout_secs() -> Option<u64> {
    Some(300)
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_owned()
}

// ── Resolved settings ────────────────────────────────────────

/// Lower bound for the run poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Fully resolved settings for talking to the remote agent service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSettings {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub api_version: String,
    pub poll_interval: Duration,
    pub run_timeout: Option<Duration>,
}

impl AgentSettings {
    /// Merge CLI overrides with the project config.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotConfigured` naming every missing setting when the
    /// endpoint or the API key is absent.
    pub fn resolve(config: &EngineConfig, project: &ProjectConfig) -> Result<Self, CoreError> {
        let endpoint = config
            .endpoint()
            .or_else(|| non_placeholder(project.agent.endpoint.as_deref()));
        let api_key = config.api_key();

        let (endpoint, api_key) = match (endpoint, api_key) {
            (Some(endpoint), Some(api_key)) => (endpoint, api_key),
            (endpoint, api_key) => {
                let mut missing = Vec::new();
                if endpoint.is_none() {
                    missing.push("endpoint (PROJECT_ENDPOINT)");
                }
                if api_key.is_none() {
                    missing.push("api key (AZURE_AI_AGENTS_API_KEY)");
                }
                return Err(CoreError::NotConfigured(format!(
                    "missing {}",
                    missing.join(" and ")
                )));
            }
        };

        let run_timeout_secs = config
            .run_timeout_secs()
            .or(project.agent.run_timeout_secs)
            .filter(|secs| *secs > 0);

        Ok(Self {
            endpoint: endpoint.to_owned(),
            api_key: api_key.to_owned(),
            model: config
                .model()
                .map_or_else(|| project.agent.model.clone(), String::from),
            api_version: project.agent.api_version.clone(),
            poll_interval: Duration::from_millis(project.agent.poll_interval_ms)
                .max(MIN_POLL_INTERVAL),
            run_timeout: run_timeout_secs.map(Duration::from_secs),
        })
    }
}

fn non_placeholder(value: Option<&str>) -> Option<&str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !PLACEHOLDER_VALUES.contains(v))
}

// ── Config loading ───────────────────────────────────────────

/// Load [`ProjectConfig`] from a YAML file.
///
/// If the file does not exist, returns the default configuration.
///
/// # Errors
///
/// Returns `CoreError::Io` if the file exists but cannot be read.
/// Returns `CoreError::Yaml` if the file contains invalid YAML.
pub fn load_project_config(config_path: &Path) -> Result<ProjectConfig, CoreError> {
    if !config_path.exists() {
        return Ok(ProjectConfig::default());
    }
    let content = std::fs::read_to_string(config_path)?;
    if content.trim().is_empty() {
        return Ok(ProjectConfig::default());
    }
    let config: ProjectConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn configured() -> EngineConfig {
        EngineConfig::builder()
            .endpoint("https://agents.example.com/api/projects/demo")
            .api_key("secret")
            .build()
    }

    #[test]
    fn test_should_build_engine_config_with_defaults() {
        let config = EngineConfig::builder().build();

        assert_eq!(config.config_path(), Path::new("gitagu.yaml"));
        assert!(config.endpoint().is_none());
        assert!(config.api_key().is_none());
        assert!(config.model().is_none());
        assert!(config.run_timeout_secs().is_none());
    }

    #[test]
    fn test_should_treat_placeholders_as_unset() {
        let config = EngineConfig::builder()
            .endpoint("your_endpoint")
            .api_key("your_api_key")
            .build();

        assert!(config.endpoint().is_none());
        assert!(config.api_key().is_none());
    }

    #[test]
    fn test_should_deserialize_default_project_config() {
        let config: ProjectConfig = serde_yaml::from_str("{}").expect("should parse YAML");

        assert!(config.agent.endpoint.is_none());
        assert_eq!(config.agent.model, "gpt-4o");
        assert_eq!(config.agent.api_version, "v1");
        assert_eq!(config.agent.poll_interval_ms, 2000);
        assert_eq!(config.agent.run_timeout_secs, Some(300));
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert!(config.prompts.include.is_empty());
    }

    #[test]
    fn test_should_deserialize_full_project_config() {
        let yaml = r#"
agent:
  endpoint: https://agents.example.com/api/projects/demo
  model: gpt-4.1
  apiVersion: "2025-05-01"
  pollIntervalMs: 500
  runTimeoutSecs: null
github:
  apiUrl: https://github.example.com/api/v3
prompts:
  include:
    - ./prompts
"#;

        let config: ProjectConfig = serde_yaml::from_str(yaml).expect("should parse YAML");

        assert_eq!(
            config.agent.endpoint.as_deref(),
            Some("https://agents.example.com/api/projects/demo")
        );
        assert_eq!(config.agent.model, "gpt-4.1");
        assert_eq!(config.agent.api_version, "2025-05-01");
        assert_eq!(config.agent.poll_interval_ms, 500);
        assert_eq!(config.agent.run_timeout_secs, None);
        assert_eq!(config.github.api_url, "https://github.example.com/api/v3");
        assert_eq!(config.prompts.include, vec![PathBuf::from("./prompts")]);
    }

    #[test]
    fn test_should_resolve_settings_with_cli_precedence() {
        let config = EngineConfig::builder()
            .endpoint("https://cli.example.com")
            .api_key("secret")
            .model("cli-model")
            .run_timeout_secs(30)
            .build();
        let mut project = ProjectConfig::default();
        project.agent.endpoint = Some("https://file.example.com".to_owned());
        project.agent.model = "file-model".to_owned();

        let settings = AgentSettings::resolve(&config, &project).expect("should resolve");

        assert_eq!(settings.endpoint, "https://cli.example.com");
        assert_eq!(settings.model, "cli-model");
        assert_eq!(settings.poll_interval, Duration::from_secs(2));
        assert_eq!(settings.run_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_should_clamp_zero_poll_interval() {
        let config = EngineConfig::builder()
            .endpoint("https://cli.example.com")
            .api_key("secret")
            .build();
        let mut project = ProjectConfig::default();
        project.agent.poll_interval_ms = 0;

        let settings = AgentSettings::resolve(&config, &project).expect("should resolve");
        assert_eq!(settings.poll_interval, MIN_POLL_INTERVAL);
    }

    #[test]
    fn test_should_fall_back_to_file_endpoint_and_model() {
        let config = EngineConfig::builder().api_key("secret").build();
        let mut project = ProjectConfig::default();
        project.agent.endpoint = Some("https://file.example.com".to_owned());

        let settings = AgentSettings::resolve(&config, &project).expect("should resolve");

        assert_eq!(settings.endpoint, "https://file.example.com");
        assert_eq!(settings.model, "gpt-4o");
        assert_eq!(settings.run_timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_should_report_every_missing_setting() {
        let config = EngineConfig::builder().build();
        let err = AgentSettings::resolve(&config, &ProjectConfig::default())
            .expect_err("should not resolve");

        assert!(err.is_fatal());
        let message = err.to_string();
        assert!(message.contains("endpoint"));
        assert!(message.contains("api key"));
    }

    #[test]
    fn test_should_disable_timeout_when_zero() {
        let config = EngineConfig::builder()
            .endpoint("https://cli.example.com")
            .api_key("secret")
            .run_timeout_secs(0)
            .build();

        let settings =
            AgentSettings::resolve(&config, &ProjectConfig::default()).expect("should resolve");
        assert_eq!(settings.run_timeout, None);
    }

    #[test]
    fn test_should_not_serialize_secrets() {
        let value = serde_json::to_value(configured()).expect("should serialize");
        assert_eq!(
            value["endpoint"],
            json!("https://agents.example.com/api/projects/demo")
        );
        assert!(value.get("api_key").is_none());
        assert!(value.get("github_token").is_none());
    }

    #[test]
    fn test_should_load_default_when_config_file_missing() {
        let config = load_project_config(Path::new("/nonexistent/gitagu.yaml"))
            .expect("should return default");
        assert_eq!(config.agent.model, "gpt-4o");
    }

    #[test]
    fn test_should_load_config_from_tempfile() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let config_path = dir.path().join("gitagu.yaml");
        std::fs::write(&config_path, "agent:\n  model: test-model\n").expect("should write");

        let config = load_project_config(&config_path).expect("should load config");
        assert_eq!(config.agent.model, "test-model");
        assert_eq!(config.agent.poll_interval_ms, 2000);
    }

    #[test]
    fn test_should_reject_invalid_yaml() {
        let dir = tempfile::TempDir::new().expect("should create temp dir");
        let config_path = dir.path().join("gitagu.yaml");
        std::fs::write(&config_path, "agent: [unclosed").expect("should write");

        let result = load_project_config(&config_path);
        assert!(matches!(result, Err(CoreError::Yaml(_))));
    }
}
