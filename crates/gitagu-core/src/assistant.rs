//! Catalog of supported AI coding assistants.
//!
//! Maps assistant ids (including legacy aliases) to a canonical [`Assistant`]
//! and provides the per-assistant focus paragraph used in analyzer
//! instructions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Legacy assistant ids and the canonical ids they resolve to.
const LEGACY_ASSISTANT_IDS: &[(&str, &str)] = &[("github-copilot", "github-copilot-completions")];

/// Resolve a legacy assistant id to its canonical id.
///
/// Ids without a legacy mapping are returned unchanged.
pub fn canonical_id(id: &str) -> &str {
    LEGACY_ASSISTANT_IDS
        .iter()
        .find(|(legacy, _)| *legacy == id)
        .map_or(id, |(_, canonical)| *canonical)
}

/// A supported AI coding assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Assistant {
    GithubCopilotCompletions,
    GithubCopilotAgent,
    Devin,
    CodexCli,
    Sreagent,
}

impl Assistant {
    /// All assistants in display order.
    pub const ALL: [Self; 5] = [
        Self::GithubCopilotCompletions,
        Self::GithubCopilotAgent,
        Self::Devin,
        Self::CodexCli,
        Self::Sreagent,
    ];

    /// Look up an assistant by id, applying the legacy remap first.
    pub fn from_id(id: &str) -> Option<Self> {
        let id = canonical_id(id);
        Self::ALL.into_iter().find(|a| a.id() == id)
    }

    /// Canonical id.
    pub fn id(self) -> &'static str {
        match self {
            Self::GithubCopilotCompletions => "github-copilot-completions",
            Self::GithubCopilotAgent => "github-copilot-agent",
            Self::Devin => "devin",
            Self::CodexCli => "codex-cli",
            Self::Sreagent => "sreagent",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::GithubCopilotCompletions => "GitHub Copilot (Code Completions)",
            Self::GithubCopilotAgent => "GitHub Copilot Coding Agent",
            Self::Devin => "Devin",
            Self::CodexCli => "Codex CLI",
            Self::Sreagent => "SREAgent",
        }
    }

    /// Paragraph appended to the base analyzer instructions for this assistant.
    pub fn focus(self) -> &'static str {
        match self {
            Self::GithubCopilotCompletions => {
                "Focus on how to set up GitHub Copilot (Code Completions) for this repository. \
                 Explain how to install GitHub Copilot in VS Code, JetBrains, or other supported \
                 IDEs, how to configure it for this specific project, and provide tips for getting \
                 the best code suggestions based on this repository's structure and languages."
            }
            Self::GithubCopilotAgent => {
                "Focus on how to set up GitHub Copilot Coding Agent for this repository. Explain \
                 how to assign issues to the agent, how it creates pull requests and runs CI/CD, \
                 and provide tips for effective use based on this repository's structure and \
                 requirements."
            }
            Self::Devin => {
                "Focus on how to set up Devin for this repository. Explain how to access Devin \
                 through Azure Marketplace, how to clone and configure this repository for Devin, \
                 and provide tips for effective collaboration with Devin based on this \
                 repository's structure and requirements."
            }
            Self::CodexCli => {
                "Focus on how to set up Codex CLI for this repository. Explain how to install and \
                 configure Codex CLI with Azure OpenAI or OpenAI, how to use it effectively with \
                 this repository, and provide example commands tailored to this repository's \
                 structure."
            }
            Self::Sreagent => {
                "Focus on how to set up SREAgent for this repository. Explain how to configure \
                 SREAgent in an Azure environment, how to connect it with this repository, and \
                 recommend monitoring metrics and alert policies based on this repository's \
                 structure and purpose."
            }
        }
    }
}

impl fmt::Display for Assistant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
