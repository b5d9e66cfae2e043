//! GitHub REST implementation of [`RepositoryProvider`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::config::GithubConfig;
use crate::error::CoreError;
use crate::repo::{FileKind, RepoId, RepositoryFile, RepositoryInfo, RepositoryProvider};

const USER_AGENT: &str = concat!("gitagu/", env!("CARGO_PKG_VERSION"));
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw+json";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Repository provider backed by the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHubProvider {
    api_url: String,
    token: Option<String>,
    http: Client,
}

impl GitHubProvider {
    /// Build a provider for the configured API base URL.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Transport` if the HTTP client cannot be built.
    pub fn new(config: &GithubConfig, token: Option<&str>) -> Result<Self, CoreError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| CoreError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            api_url: config.api_url.trim_end_matches('/').to_owned(),
            token: token.map(str::to_owned),
            http,
        })
    }

    fn url(&self, repo: &RepoId, path: &str) -> String {
        if path.is_empty() {
            format!("{}/repos/{}/{}", self.api_url, repo.owner, repo.repo)
        } else {
            format!(
                "{}/repos/{}/{}/{}",
                self.api_url, repo.owner, repo.repo, path
            )
        }
    }

    fn request(&self, url: &str, accept: &str) -> RequestBuilder {
        let request = self
            .http
            .get(url)
            .header("Accept", accept)
            .header("X-GitHub-Api-Version", API_VERSION);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a GET request, mapping 404 to `None`.
    async fn get(&self, url: &str, accept: &str) -> Result<Option<Response>, CoreError> {
        let response = self.request(url, accept).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(url, "not found");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::Provider(format!(
                "GitHub returned {status} for {url}: {}",
                body.trim()
            )));
        }
        Ok(Some(response))
    }

    async fn get_text(&self, url: &str) -> Result<Option<String>, CoreError> {
        match self.get(url, RAW_MEDIA_TYPE).await? {
            Some(response) => Ok(Some(response.text().await?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl RepositoryProvider for GitHubProvider {
    #[instrument(skip(self), fields(repo = %repo))]
    async fn repository_info(&self, repo: &RepoId) -> Result<Option<RepositoryInfo>, CoreError> {
        let Some(response) = self.get(&self.url(repo, ""), JSON_MEDIA_TYPE).await? else {
            return Ok(None);
        };
        let meta: RepoObject = response.json().await?;
        Ok(Some(RepositoryInfo {
            name: meta.name,
            full_name: meta.full_name,
            description: meta
                .description
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| "No description available".to_owned()),
            default_branch: meta.default_branch,
            stars: meta.stargazers_count,
        }))
    }

    #[instrument(skip(self), fields(repo = %repo))]
    async fn readme(&self, repo: &RepoId) -> Result<Option<String>, CoreError> {
        self.get_text(&self.url(repo, "readme")).await
    }

    #[instrument(skip(self), fields(repo = %repo))]
    async fn file_content(&self, repo: &RepoId, path: &str) -> Result<Option<String>, CoreError> {
        let path = path.trim_start_matches('/');
        self.get_text(&self.url(repo, &format!("contents/{path}")))
            .await
    }

    #[instrument(skip(self), fields(repo = %repo))]
    async fn list_files(
        &self,
        repo: &RepoId,
        git_ref: &str,
    ) -> Result<Vec<RepositoryFile>, CoreError> {
        let url = self.url(repo, &format!("git/trees/{git_ref}?recursive=1"));
        let Some(response) = self.get(&url, JSON_MEDIA_TYPE).await? else {
            return Ok(Vec::new());
        };
        let tree: TreeObject = response.json().await?;
        if tree.truncated {
            warn!(repo = %repo, entries = tree.tree.len(), "file listing truncated by GitHub");
        }
        Ok(tree.into_files())
    }

    #[instrument(skip(self), fields(repo = %repo))]
    async fn languages(&self, repo: &RepoId) -> Result<BTreeMap<String, u64>, CoreError> {
        match self.get(&self.url(repo, "languages"), JSON_MEDIA_TYPE).await? {
            Some(response) => Ok(response.json().await?),
            None => Ok(BTreeMap::new()),
        }
    }
}

// ── Wire types ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RepoObject {
    name: String,
    full_name: String,
    #[serde(default)]
    description: Option<String>,
    default_branch: String,
    #[serde(default)]
    stargazers_count: u64,
}

#[derive(Debug, Deserialize)]
struct TreeObject {
    #[serde(default)]
    tree: Vec<TreeEntry>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: Option<u64>,
}

impl TreeObject {
    /// Keep blobs and trees; submodule commits have no content to read.
    fn into_files(self) -> Vec<RepositoryFile> {
        self.tree
            .into_iter()
            .filter_map(|entry| {
                let kind = match entry.kind.as_str() {
                    "blob" => FileKind::Blob,
                    "tree" => FileKind::Tree,
                    _ => return None,
                };
                Some(RepositoryFile {
                    path: entry.path,
                    kind,
                    size: entry.size,
                })
            })
            .collect()
    }
}
