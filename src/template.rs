//! Prompt templates: render a JSON mapping of named values into one string.

use std::path::Path;

use minijinja::Environment;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("template error: {0}")]
    Render(#[from] minijinja::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Anything that can embed named inputs into a prompt string.
pub trait PromptTemplate: Send + Sync {
    fn embed_input(&self, inputs: &Value) -> Result<String, TemplateError>;
}

/// Jinja2-syntax template rendered with `minijinja`.
///
/// Undefined variables render as empty strings, so templates can reference
/// fields some items lack.
pub struct Jinja2PromptTemplate {
    env: Environment<'static>,
    source: String,
}

impl std::fmt::Debug for Jinja2PromptTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Jinja2PromptTemplate")
            .field("source", &self.source)
            .finish()
    }
}

impl Jinja2PromptTemplate {
    /// Compile-checks `source` so syntax errors surface at construction.
    pub fn new(source: impl Into<String>) -> Result<Self, TemplateError> {
        let source = source.into();
        let env = Environment::new();
        env.template_from_str(&source)?;
        Ok(Self { env, source })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        Self::new(std::fs::read_to_string(path)?)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl PromptTemplate for Jinja2PromptTemplate {
    fn embed_input(&self, inputs: &Value) -> Result<String, TemplateError> {
        Ok(self.env.render_str(&self.source, inputs)?)
    }
}
