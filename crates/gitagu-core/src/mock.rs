//! Fallback narrative generator.
//!
//! Used whenever the remote analysis is unavailable: picks a language label
//! from the dependency files and renders the `mock/<assistant>` template.
//! Deterministic for identical inputs and free of I/O.

use std::collections::BTreeMap;

use gitagu_pm::PromptManager;
use serde_json::json;

use crate::assistant::Assistant;
use crate::error::CoreError;
use crate::repo::RepoId;

/// Dependency file to language label, first match wins.
pub const LANGUAGE_MAP: &[(&str, &str)] = &[
    ("requirements.txt", "Python"),
    ("package.json", "JavaScript/TypeScript"),
    ("pom.xml", "Java"),
    ("build.gradle", "Java/Kotlin"),
];

/// Label used when no dependency file is recognized.
pub const DEFAULT_LANGUAGE: &str = "JavaScript";

/// Language label for the given dependency files.
pub fn detect_language(dependencies: &BTreeMap<String, String>) -> &'static str {
    LANGUAGE_MAP
        .iter()
        .find(|(file, _)| dependencies.contains_key(*file))
        .map_or(DEFAULT_LANGUAGE, |(_, language)| *language)
}

/// Message returned for assistants without a narrative.
pub fn no_analysis_message(assistant_id: &str, repo: &RepoId) -> String {
    format!(
        "No specific analysis available for {assistant_id} and {repo}. Please try another agent."
    )
}

/// Render the fallback narrative for `assistant_id`.
///
/// Legacy ids are remapped first; an unknown id yields
/// [`no_analysis_message`]. The README is accepted for parity with the remote
/// analysis but does not influence the narrative.
///
/// # Errors
///
/// Returns `CoreError::Prompt` if the assistant's template fails to render.
pub fn generate(
    prompts: &PromptManager,
    assistant_id: &str,
    repo: &RepoId,
    _readme: Option<&str>,
    dependencies: &BTreeMap<String, String>,
) -> Result<String, CoreError> {
    let Some(assistant) = Assistant::from_id(assistant_id) else {
        return Ok(no_analysis_message(assistant_id, repo));
    };

    let ctx = json!({
        "repo_name": repo.full_name(),
        "repo_short": repo.repo,
        "language": detect_language(dependencies),
    });
    Ok(prompts.render(&format!("mock/{}", assistant.id()), &ctx)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(names: &[&str]) -> BTreeMap<String, String> {
        names
            .iter()
            .map(|n| ((*n).to_owned(), String::new()))
            .collect()
    }

    #[test]
    fn test_should_detect_language_by_priority() {
        assert_eq!(detect_language(&deps(&["requirements.txt"])), "Python");
        assert_eq!(
            detect_language(&deps(&["pom.xml", "package.json"])),
            "JavaScript/TypeScript"
        );
        assert_eq!(detect_language(&deps(&["build.gradle"])), "Java/Kotlin");
        assert_eq!(detect_language(&deps(&[])), DEFAULT_LANGUAGE);
    }

    #[test]
    fn test_should_render_codex_narrative_for_python_repo() {
        let prompts = PromptManager::new().expect("built-in templates");
        let repo = RepoId::new("octo", "demo");
        let mut dependencies = BTreeMap::new();
        dependencies.insert("requirements.txt".to_owned(), "flask==2.0".to_owned());

        let text = generate(&prompts, "codex-cli", &repo, None, &dependencies).expect("render");

        assert!(text.starts_with(
            "## Codex CLI Setup for octo/demo\n\nThis guide will help you set up Codex CLI to work with this Python repository."
        ));
        assert!(text.contains("cd demo"));
    }

    #[test]
    fn test_should_be_deterministic() {
        let prompts = PromptManager::new().expect("built-in templates");
        let repo = RepoId::new("octo", "demo");
        let dependencies = deps(&["package.json"]);

        for assistant in Assistant::ALL {
            let first = generate(&prompts, assistant.id(), &repo, Some("# Demo"), &dependencies)
                .expect("render");
            let second = generate(&prompts, assistant.id(), &repo, Some("# Demo"), &dependencies)
                .expect("render");
            assert_eq!(first, second);
            assert!(first.contains("octo/demo"), "{} should name the repo", assistant.id());
        }
    }

    #[test]
    fn test_should_remap_legacy_assistant_id() {
        let prompts = PromptManager::new().expect("built-in templates");
        let repo = RepoId::new("octo", "demo");
        let legacy = generate(&prompts, "github-copilot", &repo, None, &deps(&[])).expect("render");
        let canonical = generate(&prompts, "github-copilot-completions", &repo, None, &deps(&[]))
            .expect("render");
        assert_eq!(legacy, canonical);
    }

    #[test]
    fn test_should_report_unknown_assistant() {
        let prompts = PromptManager::new().expect("built-in templates");
        let text = generate(
            &prompts,
            "clippy",
            &RepoId::new("octo", "demo"),
            None,
            &deps(&[]),
        )
        .expect("no render needed");
        assert_eq!(
            text,
            "No specific analysis available for clippy and octo/demo. Please try another agent."
        );
    }
}
