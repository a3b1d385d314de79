//! Template rendering seam.
//!
//! Attribute templates are evaluated with the parsed response body bound
//! as `value_json` and must emit a JSON document. The engine sits behind
//! the [`Render`] trait so poll logic never touches a concrete
//! implementation.

use minijinja::Environment;

/// Error from the template render seam
///
/// Carries only the engine's message so callers stay independent of the
/// underlying template implementation.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct RenderError {
    message: String,
}

impl RenderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Trait for rendering an attributes template against a JSON body
pub trait Render: Send + Sync {
    /// Render `source` with the parsed response body bound as `value_json`
    fn render(&self, source: &str, value_json: &serde_json::Value)
        -> Result<String, RenderError>;
}

/// Jinja-dialect renderer backed by minijinja
///
/// Supports the constructs attribute templates rely on: conditionals,
/// loops, filters (including `tojson`), and `namespace()` accumulators.
pub struct JinjaRenderer {
    env: Environment<'static>,
}

impl JinjaRenderer {
    pub fn new() -> Self {
        Self {
            env: Environment::new(),
        }
    }
}

impl Default for JinjaRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Render for JinjaRenderer {
    fn render(
        &self,
        source: &str,
        value_json: &serde_json::Value,
    ) -> Result<String, RenderError> {
        self.env
            .render_str(source, minijinja::context! { value_json })
            .map_err(|e| RenderError::new(e.to_string()))
    }
}
