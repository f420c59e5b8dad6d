//! Shader assembly, compilation and GPU program objects.

mod assemble;
mod gpu_context;
mod program;
mod uniforms;

pub use assemble::{assemble, DEFAULT_TRANSITION, VERTEX_SHADER};
pub use gpu_context::{ContextProvider, GpuContext, HeadlessContextProvider};
pub use program::{build_program, CompiledProgram, LinkedProgram, StageModule};
pub use uniforms::{ParamsBlock, UniformBindings, UniformLayout};

use std::fmt;

/// Step of the program build that produced a [`ShaderError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Link,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Link => "link",
        })
    }
}

/// A failed compile or link, with the diagnostic rendered against the offending source.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{stage} stage: {diagnostic}")]
pub struct ShaderError {
    pub stage: ShaderStage,
    pub diagnostic: String,
}

impl ShaderError {
    pub fn new(stage: ShaderStage, diagnostic: impl Into<String>) -> Self {
        Self {
            stage,
            diagnostic: diagnostic.into(),
        }
    }
}
