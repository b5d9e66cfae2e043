//! Setup instruction extraction (phase 3).
//!
//! The agent reads the identified configuration files and answers with a
//! JSON object of five command categories. Whatever it returns is completed
//! to the full set of categories, so a [`SetupInstructionSet`] never lacks a
//! key or holds an empty value.

use std::collections::BTreeMap;

use gitagu_pm::PromptManager;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{info, instrument, warn};

use crate::agent::AgentRunner;
use crate::error::CoreError;
use crate::repo::RepoId;
use crate::response::parse_object;

/// Command categories, in presentation order.
pub const SETUP_KEYS: [&str; 5] = [
    "prerequisites",
    "dependencies",
    "run_app",
    "linting",
    "testing",
];

/// Characters of each file included in the extraction prompt.
pub const MAX_FILE_CHARS: usize = 5000;

const AGENT_NAME: &str = "setup-instruction-extractor";

/// The five setup command categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupInstructionSet {
    pub prerequisites: String,
    pub dependencies: String,
    pub run_app: String,
    pub linting: String,
    pub testing: String,
}

#[derive(Default)]
struct Draft {
    prerequisites: Option<String>,
    dependencies: Option<String>,
    run_app: Option<String>,
    linting: Option<String>,
    testing: Option<String>,
}

impl Draft {
    fn finish(self) -> SetupInstructionSet {
        let fill = |value: Option<String>, key: &str| {
            value
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| not_identified(key).to_owned())
        };
        SetupInstructionSet {
            prerequisites: fill(self.prerequisites, "prerequisites"),
            dependencies: fill(self.dependencies, "dependencies"),
            run_app: fill(self.run_app, "run_app"),
            linting: fill(self.linting, "linting"),
            testing: fill(self.testing, "testing"),
        }
    }
}

/// Placeholder for a category the response did not cover.
pub fn not_identified(key: &str) -> &'static str {
    match key {
        "prerequisites" => "No prerequisites identified from the repository files.",
        "dependencies" => "No dependency installation commands identified.",
        "run_app" => "No commands to run the application identified.",
        "linting" => "No linting commands identified.",
        "testing" => "No testing commands identified.",
        _ => "Not identified.",
    }
}

fn category_label(key: &str) -> &str {
    match key {
        "dependencies" => "dependency installation",
        "run_app" => "application run",
        other => other,
    }
}

impl SetupInstructionSet {
    /// Every category set to its "not identified" placeholder.
    pub fn placeholders() -> Self {
        Draft::default().finish()
    }

    /// Every category set to an "unable to extract" message.
    pub fn extraction_failed() -> Self {
        let message = |key: &str| {
            format!(
                "Unable to automatically extract {} commands. Please check the repository documentation.",
                category_label(key)
            )
        };
        Self {
            prerequisites: message("prerequisites"),
            dependencies: message("dependencies"),
            run_app: message("run_app"),
            linting: message("linting"),
            testing: message("testing"),
        }
    }

    /// Complete a parsed response object to all five categories.
    ///
    /// Strings are kept, arrays of strings are joined one per line, other
    /// scalars are stringified; missing or blank values get placeholders.
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let take = |key: &str| object.get(key).and_then(value_text);
        Draft {
            prerequisites: take("prerequisites"),
            dependencies: take("dependencies"),
            run_app: take("run_app"),
            linting: take("linting"),
            testing: take("testing"),
        }
        .finish()
    }

    /// Canned commands chosen from filename evidence.
    ///
    /// Python and Node manifests select their ecosystem's commands, a Node
    /// lockfile selects the package manager, and container files override
    /// the prerequisites, dependency and run commands.
    pub fn evidence_fallback(file_contents: &BTreeMap<String, String>) -> Self {
        let has = |name: &str| {
            file_contents.keys().any(|path| {
                path == name
                    || path
                        .strip_suffix(name)
                        .is_some_and(|prefix| prefix.ends_with('/'))
            })
        };
        let content = |name: &str| {
            file_contents
                .iter()
                .find(|(path, _)| path.as_str() == name || path.ends_with(&format!("/{name}")))
                .map(|(_, c)| c.as_str())
        };
        let mut draft = Draft::default();
        let set = |slot: &mut Option<String>, value: &str| *slot = Some(value.to_owned());

        if has("requirements.txt")
            || has("pyproject.toml")
            || has("setup.py")
            || file_contents.keys().any(|p| p.ends_with(".py"))
        {
            set(&mut draft.prerequisites, "Python 3.8+ required\npip install -U pip");
            if has("requirements.txt") {
                set(&mut draft.dependencies, "pip install -r requirements.txt");
            } else {
                set(&mut draft.dependencies, "pip install -e .");
            }
            set(&mut draft.run_app, "python app.py");
            set(&mut draft.linting, "flake8 .");
            set(&mut draft.testing, "pytest");
        }

        if let Some(package_json) = content("package.json") {
            if has("pnpm-lock.yaml") {
                set(&mut draft.prerequisites, "Node.js 16+ required\nnpm install -g pnpm");
                set(&mut draft.dependencies, "pnpm install");
            } else if has("yarn.lock") {
                set(&mut draft.prerequisites, "Node.js 16+ required\nnpm install -g yarn");
                set(&mut draft.dependencies, "yarn install");
            } else {
                set(&mut draft.prerequisites, "Node.js 16+ required");
                set(&mut draft.dependencies, "npm install");
            }
            if package_json.contains("\"next\"") {
                set(&mut draft.run_app, "npm run dev");
            } else {
                set(&mut draft.run_app, "npm start");
            }
            set(&mut draft.linting, "npm run lint");
            set(&mut draft.testing, "npm test");
        }

        if has("Cargo.toml") {
            set(&mut draft.prerequisites, "Rust toolchain required (https://rustup.rs)");
            set(&mut draft.dependencies, "cargo build");
            set(&mut draft.run_app, "cargo run");
            set(&mut draft.linting, "cargo clippy --all-targets");
            set(&mut draft.testing, "cargo test");
        }

        if has("go.mod") {
            set(&mut draft.prerequisites, "Go toolchain required");
            set(&mut draft.dependencies, "go mod download");
            set(&mut draft.run_app, "go run .");
            set(&mut draft.linting, "go vet ./...");
            set(&mut draft.testing, "go test ./...");
        }

        if has("Dockerfile") || has("docker-compose.yml") || has("docker-compose.yaml") {
            set(&mut draft.prerequisites, "Docker and Docker Compose required");
            set(&mut draft.dependencies, "docker-compose build");
            set(&mut draft.run_app, "docker-compose up");
        }

        draft.finish()
    }

    /// Value of one category by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "prerequisites" => Some(&self.prerequisites),
            "dependencies" => Some(&self.dependencies),
            "run_app" => Some(&self.run_app),
            "linting" => Some(&self.linting),
            "testing" => Some(&self.testing),
            _ => None,
        }
    }

    /// `(key, value)` pairs in [`SETUP_KEYS`] order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        SETUP_KEYS
            .into_iter()
            .filter_map(move |key| self.get(key).map(|value| (key, value)))
    }
}

fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(value_text)
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Object(_) => return None,
    };
    Some(text)
}

/// First `max` characters of `text`, never splitting a character.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Extracts setup commands from configuration file contents.
#[derive(Debug)]
pub struct SetupInstructionExtractor<'a> {
    runner: &'a AgentRunner,
    prompts: &'a PromptManager,
}

impl<'a> SetupInstructionExtractor<'a> {
    pub fn new(runner: &'a AgentRunner, prompts: &'a PromptManager) -> Self {
        Self { runner, prompts }
    }

    /// Ask the agent for setup commands.
    ///
    /// A run that fails or yields no answer degrades to
    /// [`SetupInstructionSet::evidence_fallback`]; an answer without a usable
    /// JSON object degrades to [`SetupInstructionSet::extraction_failed`].
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Prompt` when a template fails to render.
    #[instrument(skip(self, file_contents), fields(repo = %repo, files = file_contents.len()))]
    pub async fn extract(
        &self,
        assistant_id: &str,
        repo: &RepoId,
        file_contents: &BTreeMap<String, String>,
    ) -> Result<SetupInstructionSet, CoreError> {
        let instructions = self.prompts.render("setup/system", &json!({}))?;
        let files: Vec<Value> = file_contents
            .iter()
            .map(|(path, content)| {
                json!({ "path": path, "content": truncate_chars(content, MAX_FILE_CHARS) })
            })
            .collect();
        let prompt = self.prompts.render(
            "setup/task",
            &json!({
                "repo_name": repo.full_name(),
                "assistant_id": assistant_id,
                "files": files,
            }),
        )?;

        let response = match self.runner.run(AGENT_NAME, &instructions, &prompt).await {
            Ok(text) => text,
            Err(e) => {
                info!(error = %e, "setup extraction run failed, using evidence fallback");
                return Ok(SetupInstructionSet::evidence_fallback(file_contents));
            }
        };

        match parse_object(&response, &SETUP_KEYS) {
            Some(object) => Ok(SetupInstructionSet::from_object(&object)),
            None => {
                warn!(chars = response.len(), "no setup command object in agent answer");
                Ok(SetupInstructionSet::extraction_failed())
            }
        }
    }
}
