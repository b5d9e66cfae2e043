//! Configuration file identification (phase 2).
//!
//! The agent is asked which files matter for setup; its answer is reduced to
//! quoted or backticked tokens that name real repository paths. When the agent
//! is unavailable or names nothing usable, a fixed priority list of well-known
//! filenames is matched against the listing instead.

use std::collections::HashSet;
use std::sync::LazyLock;

use gitagu_pm::PromptManager;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::agent::AgentRunner;
use crate::error::CoreError;
use crate::repo::{FileKind, RepoId, RepositoryFile};

/// Maximum number of identified configuration files.
pub const MAX_CONFIG_FILES: usize = 10;

/// Number of listing entries shown to the agent.
pub const MAX_LISTED_FILES: usize = 100;

/// Well-known configuration filenames, most important first.
pub const CONFIG_FILE_PRIORITY: &[&str] = &[
    "README.md",
    // Python
    "requirements.txt",
    "pyproject.toml",
    "setup.py",
    "Pipfile",
    // JavaScript / Node.js
    "package.json",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    // Ruby
    "Gemfile",
    // Java / Kotlin
    "pom.xml",
    "build.gradle",
    "build.gradle.kts",
    // Rust
    "Cargo.toml",
    // Go
    "go.mod",
    "go.sum",
    // PHP
    "composer.json",
    "composer.lock",
    // Containers
    "Dockerfile",
    "docker-compose.yml",
    "docker-compose.yaml",
    // Environment and build
    ".env.example",
    "Makefile",
    "azure-pipelines.yml",
    // Documentation
    "CONTRIBUTING.md",
    "INSTALL.md",
    "SETUP.md",
];

const AGENT_NAME: &str = "config-file-identifier";

static QUOTED_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"`([^`]+)`|"([^"]+)"|'([^']+)'"#).expect("invalid quoted token regex")
});

/// Ordered set of at most [`MAX_CONFIG_FILES`] repository paths.
///
/// Every path is a member of the listing it was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigFileSet(Vec<String>);

impl ConfigFileSet {
    /// Keep the candidates that name listed paths, in candidate order.
    ///
    /// Leading `./` is ignored and duplicates are dropped.
    pub fn from_candidates<'a>(
        candidates: impl IntoIterator<Item = &'a str>,
        files: &[RepositoryFile],
    ) -> Self {
        let known: HashSet<&str> = files.iter().map(|f| f.path.as_str()).collect();
        let mut seen = HashSet::new();
        let paths = candidates
            .into_iter()
            .map(|c| c.trim().trim_start_matches("./"))
            .filter(|c| known.contains(c) && seen.insert(*c))
            .take(MAX_CONFIG_FILES)
            .map(str::to_owned)
            .collect();
        Self(paths)
    }

    /// Match the listing against [`CONFIG_FILE_PRIORITY`].
    ///
    /// A file matches a name when its path equals the name or ends with
    /// `/<name>`. Results follow priority order, then listing order.
    pub fn fallback(files: &[RepositoryFile]) -> Self {
        let blobs: Vec<&str> = files
            .iter()
            .filter(|f| f.kind == FileKind::Blob)
            .map(|f| f.path.as_str())
            .collect();
        let mut seen = HashSet::new();
        let paths = CONFIG_FILE_PRIORITY
            .iter()
            .flat_map(|name| {
                blobs
                    .iter()
                    .copied()
                    .filter(move |path| matches_name(path, name))
            })
            .filter(|path| seen.insert(*path))
            .take(MAX_CONFIG_FILES)
            .map(str::to_owned)
            .collect();
        Self(paths)
    }

    pub fn paths(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

fn matches_name(path: &str, name: &str) -> bool {
    path == name
        || path
            .strip_suffix(name)
            .is_some_and(|prefix| prefix.ends_with('/'))
}

/// Where an identified file set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSetOrigin {
    Agent,
    Fallback,
}

/// Outcome of identification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    pub files: ConfigFileSet,
    pub origin: FileSetOrigin,
    /// Why the fallback was used, if it was.
    pub reason: Option<String>,
}

/// Quoted or backticked substrings of `text`, in order of appearance.
pub fn quoted_tokens(text: &str) -> Vec<&str> {
    QUOTED_TOKEN
        .captures_iter(text)
        .filter_map(|caps| caps.iter().skip(1).flatten().next().map(|m| m.as_str()))
        .collect()
}

/// `path (kind)` lines for the first [`MAX_LISTED_FILES`] entries.
pub fn file_listing(files: &[RepositoryFile]) -> String {
    files
        .iter()
        .take(MAX_LISTED_FILES)
        .map(|f| format!("{} ({})", f.path, f.kind.as_str()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Selects the files most relevant to setup, build and test.
#[derive(Debug)]
pub struct ConfigFileIdentifier<'a> {
    runner: &'a AgentRunner,
    prompts: &'a PromptManager,
}

impl<'a> ConfigFileIdentifier<'a> {
    pub fn new(runner: &'a AgentRunner, prompts: &'a PromptManager) -> Self {
        Self { runner, prompts }
    }

    /// Identify configuration files, falling back when the agent fails.
    #[instrument(skip(self, files), fields(repo = %repo, files = files.len()))]
    pub async fn identify(&self, repo: &RepoId, files: &[RepositoryFile]) -> Identification {
        let reason = match self.identify_with_agent(repo, files).await {
            Ok(set) if !set.is_empty() => {
                info!(count = set.len(), "agent identified configuration files");
                return Identification {
                    files: set,
                    origin: FileSetOrigin::Agent,
                    reason: None,
                };
            }
            Ok(_) => "agent named no files from the repository".to_owned(),
            Err(e) => e.to_string(),
        };

        warn!(reason = %reason, "using default configuration file list");
        Identification {
            files: ConfigFileSet::fallback(files),
            origin: FileSetOrigin::Fallback,
            reason: Some(reason),
        }
    }

    async fn identify_with_agent(
        &self,
        repo: &RepoId,
        files: &[RepositoryFile],
    ) -> Result<ConfigFileSet, CoreError> {
        let instructions = self
            .prompts
            .render("identify/system", &json!({ "max_files": MAX_CONFIG_FILES }))?;
        let prompt = self.prompts.render(
            "identify/task",
            &json!({
                "repo_name": repo.full_name(),
                "file_listing": file_listing(files),
            }),
        )?;

        let response = self.runner.run(AGENT_NAME, &instructions, &prompt).await?;
        Ok(ConfigFileSet::from_candidates(
            quoted_tokens(&response),
            files,
        ))
    }
}
