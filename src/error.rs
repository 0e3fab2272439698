use thiserror::Error;

/// Document-level failures. Per-fragment problems never surface here; they
/// are reported as [`crate::locator::MatchStatus`] values instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("render failed: {0}")]
    RenderFailure(String),
    #[error("invalid settings: {0}")]
    Settings(String),
}

impl PipelineError {
    pub(crate) fn render(err: anyhow::Error) -> Self {
        PipelineError::RenderFailure(format!("{:#}", err))
    }

    pub(crate) fn settings(err: anyhow::Error) -> Self {
        PipelineError::Settings(format!("{:#}", err))
    }
}
