use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or rendering prompt templates.
#[derive(Debug, Error)]
pub enum PmError {
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("render failed: {0}")]
    RenderError(String),

    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    #[error("failed to read templates at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PmError {
    pub(crate) fn read(path: &std::path::Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Read {
            path: path.to_path_buf(),
            source,
        }
    }
}
