use crate::template::RenderError;

/// Everything that can fail inside one poll cycle.
///
/// Every kind is handled identically at the run-loop boundary: logged,
/// reported as unavailable for the cycle, and retried on the next tick.
/// None of them is ever fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    HttpStatus(reqwest::StatusCode),

    #[error("response body is not valid JSON: {0}")]
    JsonParse(#[source] serde_json::Error),

    #[error("attributes template failed to render: {0}")]
    TemplateRender(#[source] RenderError),

    #[error("template output is not valid JSON: {0}")]
    TemplateOutputParse(#[source] serde_json::Error),
}

impl PollError {
    /// Stable kind string for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            PollError::Transport(_) => "transport",
            PollError::HttpStatus(_) => "http_status",
            PollError::JsonParse(_) => "json_parse",
            PollError::TemplateRender(_) => "template_render",
            PollError::TemplateOutputParse(_) => "template_output_parse",
        }
    }
}
