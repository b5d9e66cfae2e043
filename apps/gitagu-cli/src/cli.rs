use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use gitagu_core::{
    AnalysisRequest, Assistant, Engine, EngineConfig, RepoId, Signal, StreamMessage,
};
use tracing::info;

use crate::logging::log_target;
use crate::tui;

/// Legacy variable names still honored when the current ones are unset.
const LEGACY_ENDPOINT_ENV: &str = "AZURE_AI_PROJECT_CONNECTION_STRING";
const LEGACY_MODEL_ENV: &str = "AZURE_AI_MODEL_DEPLOYMENT_NAME";

#[derive(Debug, Parser)]
#[command(
    name = "gitagu",
    version,
    about = "Analyze a repository for an AI coding assistant"
)]
pub struct Cli {
    /// Project config file
    #[arg(long, global = true, env = "GITAGU_CONFIG", default_value = "gitagu.yaml")]
    pub config: PathBuf,

    /// Directory for per-repository log files
    #[arg(long, global = true, env = "GITAGU_LOG_DIR", default_value = ".gitagu/logs")]
    pub log_dir: PathBuf,

    #[command(flatten)]
    pub service: ServiceArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Connection settings for the remote services.
#[derive(Debug, Args)]
pub struct ServiceArgs {
    /// Agent service project endpoint
    #[arg(long, global = true, env = "PROJECT_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Agent service API key
    #[arg(long, global = true, env = "AZURE_AI_AGENTS_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model deployment name
    #[arg(long, global = true, env = "MODEL_DEPLOYMENT_NAME")]
    pub model: Option<String>,

    /// GitHub API token
    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Per-run timeout in seconds (0 disables it)
    #[arg(long, global = true)]
    pub run_timeout: Option<u64>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Analyze a repository for an assistant
    Analyze {
        /// Repository in owner/repo form
        repo: RepoId,

        /// Assistant id (see `gitagu assistants`)
        #[arg(short, long)]
        assistant: String,

        /// Print progress messages as they arrive
        #[arg(long)]
        stream: bool,

        /// Framing of streamed messages
        #[arg(long, value_enum, default_value_t = StreamFormat::Ndjson, requires = "stream")]
        format: StreamFormat,

        /// Show an interactive progress view
        #[arg(long, conflicts_with = "stream")]
        tui: bool,
    },

    /// Print repository metadata
    RepoInfo {
        /// Repository in owner/repo form
        repo: RepoId,
    },

    /// List supported assistants
    Assistants,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StreamFormat {
    /// One JSON object per line
    Ndjson,
    /// Server-sent-event `data:` frames
    Sse,
}

impl Cli {
    /// Log file target and whether stderr logging is on.
    pub fn log_targets(&self) -> (Option<String>, bool) {
        match &self.command {
            Commands::Analyze { repo, tui, .. } => {
                (Some(log_target(&repo.owner, &repo.repo)), !tui)
            }
            _ => (None, true),
        }
    }

    fn engine_config(&self) -> EngineConfig {
        let endpoint = self
            .service
            .endpoint
            .clone()
            .or_else(|| std::env::var(LEGACY_ENDPOINT_ENV).ok());
        let model = self
            .service
            .model
            .clone()
            .or_else(|| std::env::var(LEGACY_MODEL_ENV).ok());

        EngineConfig::builder()
            .config_path(self.config.clone())
            .endpoint_opt(endpoint)
            .api_key_opt(self.service.api_key.clone())
            .model_opt(model)
            .github_token_opt(self.service.github_token.clone())
            .run_timeout_secs_opt(self.service.run_timeout)
            .build()
    }

    pub async fn run(self) -> Result<()> {
        match &self.command {
            Commands::Assistants => {
                let mut out = std::io::stdout().lock();
                for assistant in Assistant::ALL {
                    writeln!(out, "{:<28}{}", assistant.id(), assistant.display_name())?;
                }
                Ok(())
            }
            Commands::RepoInfo { repo } => {
                let engine = Engine::new(self.engine_config())?;
                let snapshot = engine
                    .repository_snapshot(repo)
                    .await?
                    .with_context(|| format!("repository {repo} not found"))?;
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
                Ok(())
            }
            Commands::Analyze {
                repo,
                assistant,
                stream,
                format,
                tui,
            } => {
                let engine = Engine::new(self.engine_config())?;
                let request = AnalysisRequest::new(repo.clone(), assistant.as_str());
                info!(repo = %repo, assistant = %assistant, "starting analysis");

                if *tui {
                    let stream = engine.analyze_stream(request)?;
                    return match tui::run(stream, repo.to_string(), assistant.clone()).await? {
                        Some(result) => {
                            println!("{}", serde_json::to_string_pretty(&result)?);
                            Ok(())
                        }
                        None => bail!("analysis did not produce a result"),
                    };
                }

                if *stream {
                    return print_stream(&engine, request, *format).await;
                }

                let result = engine.analyze(request).await?;
                println!("{}", serde_json::to_string_pretty(&result)?);
                Ok(())
            }
        }
    }
}

async fn print_stream(engine: &Engine, request: AnalysisRequest, format: StreamFormat) -> Result<()> {
    let mut stream = engine.analyze_stream(request)?;
    let mut out = std::io::stdout().lock();
    let mut failure = None;

    while let Some(message) = stream.next().await {
        let frame = match format {
            StreamFormat::Ndjson => message.to_json_line()?,
            StreamFormat::Sse => message.to_sse_frame()?,
        };
        out.write_all(frame.as_bytes())?;
        out.flush()?;
        if let StreamMessage::Signal(Signal::Error { error, .. }) = message {
            failure = Some(error);
        }
    }

    match failure {
        Some(error) => bail!("analysis failed: {error}"),
        None => Ok(()),
    }
}
