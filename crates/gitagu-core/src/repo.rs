//! Repository data provider seam.
//!
//! The source-control host is an external collaborator: [`RepositoryProvider`]
//! describes what the engine needs from it, with not-found reported as
//! `Ok(None)` (or empty) rather than as an error.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CoreError;

/// Dependency manifests fetched for every analysis, in lookup order.
pub const DEPENDENCY_FILES: &[&str] = &["requirements.txt", "package.json", "pom.xml", "build.gradle"];

/// Repository identifier in `owner/repo` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub repo: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// `owner/repo`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl FromStr for RepoId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches('/');
        let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
        match trimmed.split_once('/') {
            Some((owner, repo))
                if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') =>
            {
                Ok(Self::new(owner, repo))
            }
            _ => Err(CoreError::InvalidRepoId(format!(
                "expected owner/repo, got {s:?}"
            ))),
        }
    }
}

/// Kind of an entry in the repository file listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Blob,
    Tree,
}

impl FileKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
        }
    }
}

/// One entry of the flat repository file listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryFile {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl RepositoryFile {
    pub fn blob(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: FileKind::Blob,
            size: None,
        }
    }

    pub fn tree(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: FileKind::Tree,
            size: None,
        }
    }
}

/// Basic repository metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub name: String,
    pub full_name: String,
    pub description: String,
    pub default_branch: String,
    pub stars: u64,
}

/// Repository overview served by the repository-info use case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySnapshot {
    pub full_name: String,
    pub description: String,
    pub language: String,
    pub stars: u64,
    pub default_branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<String>,
}

/// Source-control data the engine consumes.
#[async_trait]
pub trait RepositoryProvider: Send + Sync {
    /// Repository metadata, `None` when the repository does not exist.
    async fn repository_info(&self, repo: &RepoId) -> Result<Option<RepositoryInfo>, CoreError>;

    /// Decoded README text, `None` when there is none.
    async fn readme(&self, repo: &RepoId) -> Result<Option<String>, CoreError>;

    /// Decoded content of one file, `None` when it does not exist.
    async fn file_content(&self, repo: &RepoId, path: &str) -> Result<Option<String>, CoreError>;

    /// Flat recursive listing of files and directories at `git_ref`.
    async fn list_files(
        &self,
        repo: &RepoId,
        git_ref: &str,
    ) -> Result<Vec<RepositoryFile>, CoreError>;

    /// Byte count per language.
    async fn languages(&self, repo: &RepoId) -> Result<BTreeMap<String, u64>, CoreError>;

    /// Contents of the [`DEPENDENCY_FILES`] that exist in the repository.
    ///
    /// A file that cannot be fetched is skipped rather than failing the whole
    /// lookup.
    async fn dependency_files(&self, repo: &RepoId) -> BTreeMap<String, String> {
        let mut found = BTreeMap::new();
        for name in DEPENDENCY_FILES {
            match self.file_content(repo, name).await {
                Ok(Some(content)) => {
                    found.insert((*name).to_owned(), content);
                }
                Ok(None) => {}
                Err(e) => debug!(file = name, error = %e, "skipping dependency file"),
            }
        }
        found
    }

    /// Metadata, README and primary language in one value.
    ///
    /// Returns `Ok(None)` when the repository does not exist. A missing README
    /// or language breakdown degrades to empty values.
    async fn snapshot(&self, repo: &RepoId) -> Result<Option<RepositorySnapshot>, CoreError> {
        let Some(info) = self.repository_info(repo).await? else {
            return Ok(None);
        };
        let readme = self.readme(repo).await.unwrap_or_default();
        let languages = self.languages(repo).await.unwrap_or_default();

        Ok(Some(RepositorySnapshot {
            full_name: info.full_name,
            description: info.description,
            language: primary_language(&languages),
            stars: info.stars,
            default_branch: info.default_branch,
            readme,
        }))
    }
}

/// Language with the largest byte count, `Unknown` when there is none.
///
/// Ties resolve to the alphabetically first language.
pub fn primary_language(languages: &BTreeMap<String, u64>) -> String {
    languages
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map_or_else(|| "Unknown".to_owned(), |(name, _)| name.clone())
}
