//! Analysis orchestration.
//!
//! One request runs as one background task through three sequential phases:
//! narrative analysis, configuration discovery and setup extraction. Each
//! phase reports progress and degrades to a deterministic fallback on
//! failure, so the task always ends with an [`AnalysisResult`].
//!
//! # Edge cases
//!
//! - **Repository not found**: metadata is synthesized from the request and
//!   the analysis runs on empty data.
//! - **Empty file listing**: discovery and extraction are skipped and the
//!   result carries no setup commands.
//! - **Unknown assistant with a failed phase 1**: the result carries the
//!   "no analysis available" text and an error.

use std::collections::BTreeMap;
use std::sync::Arc;

use gitagu_pm::PromptManager;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::agent::AgentRunner;
use crate::assistant::{Assistant, canonical_id};
use crate::error::CoreError;
use crate::events::{
    AnalysisResult, Phase, ProgressReporter, ProgressStatus, ProgressStream, Signal,
};
use crate::identify::{ConfigFileIdentifier, ConfigFileSet, FileSetOrigin};
use crate::mock;
use crate::repo::{RepoId, RepositoryFile, RepositoryInfo, RepositoryProvider};
use crate::setup::{SetupInstructionExtractor, SetupInstructionSet};

/// Channel buffer size for progress messages.
const EVENT_CHANNEL_SIZE: usize = 64;

/// README text sent to the agent when the repository has none.
const NO_README: &str = "No README found";

/// One analysis request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    #[serde(flatten)]
    pub repo: RepoId,
    pub assistant_id: String,
}

impl AnalysisRequest {
    pub fn new(repo: RepoId, assistant_id: impl Into<String>) -> Self {
        Self {
            repo,
            assistant_id: assistant_id.into(),
        }
    }
}

/// Everything the background task needs, owned so it can be spawned.
#[derive(Clone)]
pub(crate) struct AnalyzeContext {
    pub(crate) runner: Arc<AgentRunner>,
    pub(crate) prompts: Arc<PromptManager>,
    pub(crate) repos: Arc<dyn RepositoryProvider>,
}

/// Repository data collected before phase 1.
#[derive(Debug, Clone)]
pub(crate) struct RepositoryData {
    pub(crate) info: RepositoryInfo,
    pub(crate) readme: Option<String>,
    pub(crate) dependencies: BTreeMap<String, String>,
    pub(crate) files: Vec<RepositoryFile>,
}

/// Spawn the analysis task and return the consumer end of its progress.
pub(crate) fn start_analysis(ctx: AnalyzeContext, request: AnalysisRequest) -> ProgressStream {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
    let assistant_id = request.assistant_id.clone();
    let repo_name = request.repo.full_name();

    let producer = tokio::spawn(async move {
        let mut reporter = ProgressReporter::new(tx);
        let result = execute(&ctx, &request, &mut reporter).await;
        reporter.signal(Signal::FinalResult { data: result }).await;
        reporter.signal(Signal::Complete).await;
    });

    ProgressStream::new(rx, producer, assistant_id, repo_name)
}

/// Run every phase and assemble the result.
#[instrument(skip_all, fields(repo = %request.repo, assistant = %request.assistant_id))]
pub(crate) async fn execute(
    ctx: &AnalyzeContext,
    request: &AnalysisRequest,
    reporter: &mut ProgressReporter,
) -> AnalysisResult {
    let repo = &request.repo;
    let assistant_id = request.assistant_id.as_str();

    reporter
        .report(
            Phase::Analysis,
            ProgressStatus::Starting,
            format!("Fetching repository data for {repo}"),
            None,
        )
        .await;
    let data = gather(ctx.repos.as_ref(), repo).await;

    // ── Phase 1: narrative ──
    reporter
        .report(
            Phase::Analysis,
            ProgressStatus::InProgress,
            format!("Analyzing repository for {assistant_id}"),
            Some(json!({
                "dependency_files": data.dependencies.keys().collect::<Vec<_>>(),
                "has_readme": data.readme.is_some(),
            })),
        )
        .await;

    let mut error = None;
    let analysis = match analyze_narrative(ctx, assistant_id, repo, &data).await {
        Ok(text) => {
            info!(chars = text.len(), "repository analysis completed");
            reporter
                .report(
                    Phase::Analysis,
                    ProgressStatus::Completed,
                    "Repository analysis completed",
                    None,
                )
                .await;
            text
        }
        Err(e) => {
            warn!(error = %e, "remote analysis failed, using template analysis");
            let fallback = mock::generate(
                &ctx.prompts,
                assistant_id,
                repo,
                data.readme.as_deref(),
                &data.dependencies,
            )
            .unwrap_or_else(|render_err| {
                warn!(error = %render_err, "template analysis failed to render");
                mock::no_analysis_message(assistant_id, repo)
            });
            if Assistant::from_id(assistant_id).is_none() {
                error = Some(format!("analysis unavailable: {e}"));
            }
            reporter
                .report(
                    Phase::Analysis,
                    ProgressStatus::Failed,
                    "Remote analysis unavailable, using template analysis",
                    Some(json!({ "error": e.to_string() })),
                )
                .await;
            fallback
        }
    };

    // ── Phase 2: configuration discovery ──
    if data.files.is_empty() {
        debug!("no file listing, skipping configuration discovery and setup extraction");
        return AnalysisResult {
            assistant_id: assistant_id.to_owned(),
            repo_name: repo.full_name(),
            analysis,
            setup_commands: None,
            error,
        };
    }

    reporter
        .report(
            Phase::Discovery,
            ProgressStatus::Starting,
            "Discovering configuration files",
            None,
        )
        .await;
    reporter
        .report(
            Phase::Discovery,
            ProgressStatus::InProgress,
            format!("Scanning {} repository entries", data.files.len()),
            None,
        )
        .await;

    let identification = ConfigFileIdentifier::new(&ctx.runner, &ctx.prompts)
        .identify(repo, &data.files)
        .await;
    let (status, message) = match identification.origin {
        FileSetOrigin::Agent => (
            ProgressStatus::Completed,
            format!("Identified {} configuration files", identification.files.len()),
        ),
        FileSetOrigin::Fallback => (
            ProgressStatus::Failed,
            format!(
                "Agent identification unavailable, matched {} well-known files",
                identification.files.len()
            ),
        ),
    };
    reporter
        .report(
            Phase::Discovery,
            status,
            message,
            Some(json!({
                "files": identification.files,
                "source": identification.origin,
                "reason": identification.reason,
            })),
        )
        .await;

    // ── Phase 3: setup extraction ──
    reporter
        .report(
            Phase::Extraction,
            ProgressStatus::Starting,
            "Extracting setup instructions",
            None,
        )
        .await;
    let contents = config_file_contents(ctx.repos.as_ref(), repo, &identification.files, &data).await;
    reporter
        .report(
            Phase::Extraction,
            ProgressStatus::InProgress,
            format!("Reading {} configuration files", contents.len()),
            Some(json!({ "files": contents.keys().collect::<Vec<_>>() })),
        )
        .await;

    let setup_commands = match SetupInstructionExtractor::new(&ctx.runner, &ctx.prompts)
        .extract(assistant_id, repo, &contents)
        .await
    {
        Ok(commands) => {
            reporter
                .report(
                    Phase::Extraction,
                    ProgressStatus::Completed,
                    "Setup instructions extracted",
                    None,
                )
                .await;
            commands
        }
        Err(e) => {
            warn!(error = %e, "setup extraction failed, using placeholders");
            reporter
                .report(
                    Phase::Extraction,
                    ProgressStatus::Failed,
                    "Setup extraction failed, using placeholders",
                    Some(json!({ "error": e.to_string() })),
                )
                .await;
            SetupInstructionSet::extraction_failed()
        }
    };

    AnalysisResult {
        assistant_id: assistant_id.to_owned(),
        repo_name: repo.full_name(),
        analysis,
        setup_commands: Some(setup_commands),
        error,
    }
}

/// Collect metadata, README, dependency files and listing.
///
/// Provider failures are logged and treated as absent data.
pub(crate) async fn gather(repos: &dyn RepositoryProvider, repo: &RepoId) -> RepositoryData {
    let info = match repos.repository_info(repo).await {
        Ok(Some(info)) => info,
        Ok(None) => {
            warn!(repo = %repo, "repository not found, continuing with request data");
            synthesized_info(repo)
        }
        Err(e) => {
            warn!(repo = %repo, error = %e, "failed to fetch repository metadata");
            synthesized_info(repo)
        }
    };

    let readme = repos.readme(repo).await.unwrap_or_else(|e| {
        warn!(error = %e, "failed to fetch README");
        None
    });
    let dependencies = repos.dependency_files(repo).await;
    let files = repos
        .list_files(repo, &info.default_branch)
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "failed to list repository files");
            Vec::new()
        });

    debug!(
        files = files.len(),
        dependencies = dependencies.len(),
        has_readme = readme.is_some(),
        "gathered repository data"
    );
    RepositoryData {
        info,
        readme,
        dependencies,
        files,
    }
}

fn synthesized_info(repo: &RepoId) -> RepositoryInfo {
    RepositoryInfo {
        name: repo.repo.clone(),
        full_name: repo.full_name(),
        description: "No description available".to_owned(),
        default_branch: "HEAD".to_owned(),
        stars: 0,
    }
}

async fn analyze_narrative(
    ctx: &AnalyzeContext,
    assistant_id: &str,
    repo: &RepoId,
    data: &RepositoryData,
) -> Result<String, CoreError> {
    let focus = Assistant::from_id(assistant_id).map_or("", Assistant::focus);
    let instructions = ctx
        .prompts
        .render("analyze/system", &json!({ "focus": focus }))?;

    let dependencies: Vec<_> = data
        .dependencies
        .iter()
        .map(|(name, content)| json!({ "name": name, "content": content }))
        .collect();
    let prompt = ctx.prompts.render(
        "analyze/task",
        &json!({
            "repo_name": data.info.full_name,
            "readme": data.readme.as_deref().unwrap_or(NO_README),
            "dependencies": dependencies,
        }),
    )?;

    let name = format!("{}-analyzer", canonical_id(assistant_id));
    ctx.runner.run(&name, &instructions, &prompt).await
}

/// Contents of the identified files, plus the README under `README.md`.
///
/// Already fetched dependency files are reused; paths without content are
/// skipped.
pub(crate) async fn config_file_contents(
    repos: &dyn RepositoryProvider,
    repo: &RepoId,
    files: &ConfigFileSet,
    data: &RepositoryData,
) -> BTreeMap<String, String> {
    let mut contents = BTreeMap::new();
    if let Some(readme) = &data.readme {
        contents.insert("README.md".to_owned(), readme.clone());
    }

    for path in files.iter() {
        if contents.contains_key(path) {
            continue;
        }
        if let Some(content) = data.dependencies.get(path) {
            contents.insert(path.to_owned(), content.clone());
            continue;
        }
        match repos.file_content(repo, path).await {
            Ok(Some(content)) => {
                contents.insert(path.to_owned(), content);
            }
            Ok(None) => debug!(path, "identified file has no content"),
            Err(e) => debug!(path, error = %e, "failed to fetch identified file"),
        }
    }
    contents
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;

    use super::*;
    use crate::config::AgentSettings;
    use crate::events::StreamMessage;
    use crate::session::RunState;
    use crate::test_support::{ScriptedAgentsApi, StaticRepositoryProvider};

    fn context(api: Arc<ScriptedAgentsApi>, repos: StaticRepositoryProvider) -> AnalyzeContext {
        let settings = AgentSettings {
            endpoint: "https://agents.example.com".to_owned(),
            api_key: "secret".to_owned(),
            model: "gpt-4o".to_owned(),
            api_version: "v1".to_owned(),
            poll_interval: Duration::ZERO,
            run_timeout: None,
        };
        AnalyzeContext {
            runner: Arc::new(AgentRunner::new(api, &settings)),
            prompts: Arc::new(PromptManager::new().expect("built-in templates")),
            repos: Arc::new(repos),
        }
    }

    fn demo_repo() -> StaticRepositoryProvider {
        StaticRepositoryProvider::new()
            .with_info("octo", "demo")
            .with_readme("# Demo\nA demo app.")
            .with_file("package.json", r#"{"scripts": {"test": "jest"}}"#)
            .with_file("src/app.js", "console.log('hi')")
    }

    fn request(assistant_id: &str) -> AnalysisRequest {
        AnalysisRequest::new(RepoId::new("octo", "demo"), assistant_id)
    }

    async fn collect(stream: ProgressStream) -> Vec<StreamMessage> {
        stream.into_stream().collect().await
    }

    fn percentages(messages: &[StreamMessage]) -> Vec<u8> {
        messages
            .iter()
            .filter_map(|m| match m {
                StreamMessage::Progress(update) => Some(update.progress_percentage),
                StreamMessage::Signal(_) => None,
            })
            .collect()
    }

    fn final_result(messages: &[StreamMessage]) -> AnalysisResult {
        messages
            .iter()
            .find_map(|m| match m {
                StreamMessage::Signal(Signal::FinalResult { data }) => Some(data.clone()),
                _ => None,
            })
            .expect("stream should carry a final result")
    }

    #[tokio::test]
    async fn test_should_run_all_phases_with_agent_answers() {
        let api = Arc::new(ScriptedAgentsApi::new());
        api.push_run([RunState::InProgress, RunState::Completed], Some("Use Devin like this."));
        api.push_run([RunState::Completed], Some("Important: `package.json`"));
        api.push_run(
            [RunState::Completed],
            Some(r#"{"prerequisites": "Node 20", "dependencies": "npm ci", "run_app": "npm start", "linting": "npm run lint", "testing": "npm test"}"#),
        );
        let ctx = context(api.clone(), demo_repo());

        let messages = collect(start_analysis(ctx, request("devin"))).await;

        let result = final_result(&messages);
        assert_eq!(result.analysis, "Use Devin like this.");
        assert_eq!(result.repo_name, "octo/demo");
        assert!(result.error.is_none());
        let setup = result.setup_commands.expect("setup commands");
        assert_eq!(setup.dependencies, "npm ci");

        assert_eq!(
            percentages(&messages),
            vec![0, 10, 33, 35, 45, 66, 70, 80, 100]
        );
        assert_eq!(messages.last(), Some(&StreamMessage::Signal(Signal::Complete)));
        assert_eq!(api.deleted_agents().len(), 3);
        assert_eq!(api.created_agents()[0].name, "devin-analyzer");
    }

    #[tokio::test]
    async fn test_should_degrade_every_phase_when_agent_service_fails() {
        let api = Arc::new(ScriptedAgentsApi::new());
        api.push_rejected_run();
        api.push_rejected_run();
        api.push_rejected_run();
        let ctx = context(api, demo_repo());

        let messages = collect(start_analysis(ctx, request("codex-cli"))).await;

        let result = final_result(&messages);
        assert!(result.analysis.starts_with("## Codex CLI Setup for octo/demo"));
        assert!(result.analysis.contains("JavaScript/TypeScript"));
        assert!(result.error.is_none());
        let setup = result.setup_commands.expect("setup commands");
        assert_eq!(setup.dependencies, "npm install");

        let statuses: Vec<_> = messages
            .iter()
            .filter_map(|m| match m {
                StreamMessage::Progress(u) if u.status == ProgressStatus::Failed => Some(u.step),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec![1, 2]);
        let pct = percentages(&messages);
        assert!(pct.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(messages.last(), Some(&StreamMessage::Signal(Signal::Complete)));
    }

    #[tokio::test]
    async fn test_should_use_placeholders_when_setup_answer_has_no_json() {
        let api = Arc::new(ScriptedAgentsApi::new());
        api.push_run([RunState::Completed], Some("Narrative."));
        api.push_run([RunState::Completed], Some("`package.json`"));
        api.push_run([RunState::Completed], Some("Sorry, nothing to extract here."));
        let ctx = context(api, demo_repo());

        let messages = collect(start_analysis(ctx, request("devin"))).await;

        let setup = final_result(&messages).setup_commands.expect("setup commands");
        assert_eq!(setup, SetupInstructionSet::extraction_failed());
    }

    #[tokio::test]
    async fn test_should_set_error_for_unknown_assistant_after_fallback() {
        let api = Arc::new(ScriptedAgentsApi::new());
        let ctx = context(api, StaticRepositoryProvider::new());

        let messages = collect(start_analysis(ctx, request("mystery-bot"))).await;

        let result = final_result(&messages);
        assert_eq!(
            result.analysis,
            "No specific analysis available for mystery-bot and octo/demo. Please try another agent."
        );
        assert!(result.error.is_some());
        assert!(result.setup_commands.is_none());
        assert_eq!(percentages(&messages), vec![0, 10, 33]);
    }

    #[tokio::test]
    async fn test_should_survive_repository_provider_failures() {
        let api = Arc::new(ScriptedAgentsApi::new());
        api.push_run([RunState::Completed], Some("Narrative."));
        let ctx = context(api.clone(), StaticRepositoryProvider::failing());

        let mut reporter = ProgressReporter::disabled();
        let result = execute(&ctx, &request("devin"), &mut reporter).await;

        assert_eq!(result.analysis, "Narrative.");
        assert!(result.setup_commands.is_none());
        assert!(api.posted_messages()[0].contains(NO_README));
    }

    #[tokio::test]
    async fn test_should_reuse_dependencies_and_skip_missing_files() {
        let repos = StaticRepositoryProvider::new()
            .with_file("package.json", "{}")
            .with_file("Makefile", "test:\n\tnpm test")
            .with_entry(RepositoryFile::blob("Dockerfile"));
        let data = RepositoryData {
            info: synthesized_info(&RepoId::new("octo", "demo")),
            readme: Some("# Demo".to_owned()),
            dependencies: BTreeMap::from([("package.json".to_owned(), "{\"cached\": true}".to_owned())]),
            files: Vec::new(),
        };
        let files = ConfigFileSet::from_candidates(
            ["package.json", "Makefile", "Dockerfile"],
            &[
                RepositoryFile::blob("package.json"),
                RepositoryFile::blob("Makefile"),
                RepositoryFile::blob("Dockerfile"),
            ],
        );

        let contents =
            config_file_contents(&repos, &RepoId::new("octo", "demo"), &files, &data).await;

        assert_eq!(
            contents.keys().collect::<Vec<_>>(),
            vec!["Makefile", "README.md", "package.json"]
        );
        assert_eq!(contents["package.json"], "{\"cached\": true}");
    }

    #[tokio::test]
    async fn test_should_send_analysis_prompt_with_readme_and_dependencies() {
        let api = Arc::new(ScriptedAgentsApi::new());
        api.push_run([RunState::Completed], Some("Narrative."));
        let repos = StaticRepositoryProvider::new()
            .with_info("octo", "demo")
            .with_readme("# Demo")
            .with_file("requirements.txt", "flask==2.0");
        let ctx = context(api.clone(), repos);
        let data = gather(ctx.repos.as_ref(), &RepoId::new("octo", "demo")).await;

        let text = analyze_narrative(&ctx, "github-copilot", &RepoId::new("octo", "demo"), &data)
            .await
            .expect("analysis should succeed");

        assert_eq!(text, "Narrative.");
        let agent = &api.created_agents()[0];
        assert_eq!(agent.name, "github-copilot-completions-analyzer");
        assert!(agent.instructions.contains("GitHub Copilot (Code Completions)"));
        let posted = api.posted_messages();
        assert!(posted[0].contains("Repository: octo/demo"));
        assert!(posted[0].contains("requirements.txt:"));
        assert!(posted[0].contains("flask==2.0"));
    }
}
