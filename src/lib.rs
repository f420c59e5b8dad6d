//! Segue: GPU shader transitions for video frames
//!
//! Runs a GLSL transition snippet over every frame of a stream, driving its `progress`
//! uniform from each frame's presentation time, and reads the result back into memory.

pub mod config;
pub mod error;
pub mod frame;
pub mod render;
pub mod shader;
pub mod utils;
pub mod video;

pub use config::{ConfigFile, TransitionConfig, TransitionSource};
pub use error::{TransitionError, TransitionResult};
pub use frame::{TimeBase, Timestamp, VideoFrame};
pub use render::{RendererState, TransitionRenderer};
pub use shader::{ContextProvider, HeadlessContextProvider, ShaderStage};
