//! GPU resources and the per-frame transition renderer.

mod geometry;
mod renderer;
mod texture;

pub use geometry::GeometryResource;
pub use renderer::TransitionRenderer;
pub use texture::{FrameTexture, RenderTarget, FRAME_TEXTURE_FORMAT};

use std::fmt;

/// Externally visible lifecycle of a [`TransitionRenderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    /// Created, `configure` not yet called.
    Uninitialized,
    /// Configured, no frame rendered yet.
    Ready,
    /// Configured and at least one frame rendered.
    Rendering,
    /// `configure` failed; the renderer is unusable.
    Failed,
    /// Torn down.
    Destroyed,
}

impl fmt::Display for RendererState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RendererState::Uninitialized => "uninitialized",
            RendererState::Ready => "ready",
            RendererState::Rendering => "rendering",
            RendererState::Failed => "failed",
            RendererState::Destroyed => "destroyed",
        })
    }
}
