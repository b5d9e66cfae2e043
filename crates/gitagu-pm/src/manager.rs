//! Prompt template registry and renderer.
//!
//! [`PromptManager`] owns a minijinja environment preloaded with the built-in
//! templates. Additional directories can be layered on top; a template loaded
//! later replaces an earlier one with the same name.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::Path;

use minijinja::{Environment, ErrorKind, UndefinedBehavior};
use tracing::debug;

use crate::builtin::BUILTIN_TEMPLATES;
use crate::error::PmError;
use crate::template::PromptTemplate;

/// File extensions recognized by [`PromptManager::load_dir`].
const TEMPLATE_EXTENSIONS: &[&str] = &["j2", "jinja"];

/// Manages prompt templates and renders them with context variables.
pub struct PromptManager {
    env: Environment<'static>,
    names: BTreeSet<String>,
}

impl PromptManager {
    /// Create a prompt manager with all built-in templates registered.
    ///
    /// # Errors
    ///
    /// Returns `PmError::InvalidTemplate` if a built-in template fails to parse.
    pub fn new() -> Result<Self, PmError> {
        let mut pm = Self::empty();
        for (name, source) in BUILTIN_TEMPLATES {
            pm.add_template(PromptTemplate::new(*name, *source))?;
        }
        Ok(pm)
    }

    /// Create a prompt manager without any templates.
    pub fn empty() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        Self {
            env,
            names: BTreeSet::new(),
        }
    }

    /// Load all `.j2` / `.jinja` templates below a directory.
    ///
    /// The template name is the path relative to `dir` without its extension,
    /// using `/` as separator (`setup/system.j2` becomes `setup/system`).
    /// Returns the number of templates loaded.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, PmError> {
        let mut files = Vec::new();
        collect_template_files(dir, &mut files)?;
        files.sort();

        let mut loaded = 0;
        for path in files {
            let Ok(relative) = path.strip_prefix(dir) else {
                continue;
            };
            let name = relative
                .with_extension("")
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let source = fs::read_to_string(&path).map_err(PmError::read(&path))?;
            self.add_template(PromptTemplate::new(name, source))?;
            loaded += 1;
        }

        debug!(dir = %dir.display(), loaded, "loaded prompt templates");
        Ok(loaded)
    }

    /// Register a single template, replacing any template with the same name.
    pub fn add_template(&mut self, template: PromptTemplate) -> Result<(), PmError> {
        let PromptTemplate { name, source } = template;
        self.env
            .add_template_owned(name.clone(), source)
            .map_err(|e| PmError::InvalidTemplate(format!("{name}: {e}")))?;
        self.names.insert(name);
        Ok(())
    }

    /// Render a template by name with the given context.
    pub fn render(&self, name: &str, ctx: &serde_json::Value) -> Result<String, PmError> {
        let template = self.env.get_template(name).map_err(|e| {
            if e.kind() == ErrorKind::TemplateNotFound {
                PmError::TemplateNotFound(name.to_owned())
            } else {
                PmError::InvalidTemplate(format!("{name}: {e}"))
            }
        })?;
        template
            .render(ctx)
            .map_err(|e| PmError::RenderError(format!("{name}: {e}")))
    }

    /// Returns whether a template with this name is registered.
    pub fn has_template(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Names of all registered templates in sorted order.
    pub fn list_templates(&self) -> Vec<&str> {
        self.names.iter().map(String::as_str).collect()
    }
}

impl fmt::Debug for PromptManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptManager")
            .field("templates", &self.names)
            .finish()
    }
}

fn collect_template_files(dir: &Path, out: &mut Vec<std::path::PathBuf>) -> Result<(), PmError> {
    for entry in fs::read_dir(dir).map_err(PmError::read(dir))? {
        let path = entry.map_err(PmError::read(dir))?.path();
        if path.is_dir() {
            collect_template_files(&path, out)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| TEMPLATE_EXTENSIONS.contains(&ext))
        {
            out.push(path);
        }
    }
    Ok(())
}
