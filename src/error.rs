//! Error taxonomy for the transition renderer.

use crate::render::RendererState;
use crate::shader::{ShaderError, ShaderStage};
use std::path::PathBuf;

pub type TransitionResult<T> = Result<T, TransitionError>;

/// Everything that can go wrong while configuring or driving a [`TransitionRenderer`].
///
/// None of these are retried internally. A failed `configure` leaves the renderer in a
/// terminal state; recovering means fixing the input and building a new renderer.
///
/// [`TransitionRenderer`]: crate::render::TransitionRenderer
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("transition source {path:?} is unavailable: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} shader failed to compile:\n{diagnostic}")]
    ShaderCompileFailed { stage: ShaderStage, diagnostic: String },

    #[error("shader program failed to link: {diagnostic}")]
    ShaderLinkFailed { diagnostic: String },

    #[error("rendering context creation failed: {0}")]
    ContextCreationFailed(String),

    #[error("frame is {actual_width}x{actual_height} ({actual_len} bytes), renderer is configured for {expected_width}x{expected_height} ({expected_len} bytes)")]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        expected_len: usize,
        actual_width: u32,
        actual_height: u32,
        actual_len: usize,
    },

    #[error("renderer is not configured")]
    NotConfigured,

    #[error("renderer cannot be configured from the {0} state")]
    AlreadyConfigured(RendererState),

    #[error("GPU readback failed: {0}")]
    Readback(String),
}

impl TransitionError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigInvalid(msg.into())
    }

    pub fn context(msg: impl Into<String>) -> Self {
        Self::ContextCreationFailed(msg.into())
    }

    pub fn readback(msg: impl Into<String>) -> Self {
        Self::Readback(msg.into())
    }
}

impl From<ShaderError> for TransitionError {
    fn from(err: ShaderError) -> Self {
        match err.stage {
            ShaderStage::Link => Self::ShaderLinkFailed {
                diagnostic: err.diagnostic,
            },
            stage => Self::ShaderCompileFailed {
                stage,
                diagnostic: err.diagnostic,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_errors_map_to_their_stage() {
        let err: TransitionError = ShaderError::new(ShaderStage::Fragment, "unknown function").into();
        assert!(matches!(
            err,
            TransitionError::ShaderCompileFailed { stage: ShaderStage::Fragment, .. }
        ));

        let err: TransitionError = ShaderError::new(ShaderStage::Link, "location 0 missing").into();
        match err {
            TransitionError::ShaderLinkFailed { diagnostic } => assert_eq!(diagnostic, "location 0 missing"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn display_names_the_failure() {
        let err = TransitionError::ShaderCompileFailed {
            stage: ShaderStage::Vertex,
            diagnostic: "boom".into(),
        };
        assert!(err.to_string().starts_with("vertex shader failed to compile"));

        let err = TransitionError::AlreadyConfigured(RendererState::Ready);
        assert!(err.to_string().contains("ready"));

        let err = TransitionError::SourceUnavailable {
            path: PathBuf::from("missing.glsl"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("missing.glsl"));
    }
}
