//! The transition renderer: one-time setup and the per-frame render path.

use super::{FrameTexture, GeometryResource, RenderTarget, RendererState};
use crate::config::TransitionConfig;
use crate::error::{TransitionError, TransitionResult};
use crate::frame::VideoFrame;
use crate::shader::{
    assemble, build_program, CompiledProgram, ContextProvider, GpuContext, HeadlessContextProvider,
    UniformBindings, UniformLayout, VERTEX_SHADER,
};
use std::time::Instant;
use tracing::{debug, error, info};

/// Everything `configure` creates on the GPU. Dropped (and destroyed) as a unit.
struct GpuResources {
    program: CompiledProgram,
    geometry: GeometryResource,
    texture: FrameTexture,
    uniforms: UniformBindings,
    target: RenderTarget,
    context: GpuContext,
}

impl GpuResources {
    fn release(self) {
        self.texture.destroy();
        self.target.destroy();
        self.geometry.destroy();
        self.uniforms.destroy();
        drop(self.program);
        self.context.destroy();
    }
}

/// Values that change from frame to frame, plus the fixed viewport.
#[derive(Debug, Clone, Copy)]
struct RenderState {
    width: u32,
    height: u32,
    progress: f32,
    frames_rendered: u64,
}

enum Lifecycle {
    Uninitialized,
    Active {
        resources: Box<GpuResources>,
        state: RenderState,
    },
    Failed,
    Destroyed,
}

/// Renders a shader transition over a stream of frames.
///
/// Call [`configure`](Self::configure) once with the stream's dimensions, then
/// [`render`](Self::render) for every frame in presentation order. All calls must come
/// from the same thread. Each `render` blocks until the frame has been read back.
pub struct TransitionRenderer {
    config: TransitionConfig,
    provider: Box<dyn ContextProvider>,
    lifecycle: Lifecycle,
}

impl TransitionRenderer {
    /// Creates a renderer that acquires a headless hardware context on `configure`.
    pub fn new(config: TransitionConfig) -> Self {
        Self::with_provider(config, HeadlessContextProvider::default())
    }

    /// Creates a renderer that obtains its rendering context from `provider`.
    pub fn with_provider(config: TransitionConfig, provider: impl ContextProvider + 'static) -> Self {
        Self {
            config,
            provider: Box::new(provider),
            lifecycle: Lifecycle::Uninitialized,
        }
    }

    pub fn config(&self) -> &TransitionConfig {
        &self.config
    }

    pub fn state(&self) -> RendererState {
        match &self.lifecycle {
            Lifecycle::Uninitialized => RendererState::Uninitialized,
            Lifecycle::Active { state, .. } if state.frames_rendered == 0 => RendererState::Ready,
            Lifecycle::Active { .. } => RendererState::Rendering,
            Lifecycle::Failed => RendererState::Failed,
            Lifecycle::Destroyed => RendererState::Destroyed,
        }
    }

    /// Dimensions fixed by `configure`, while configured.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match &self.lifecycle {
            Lifecycle::Active { state, .. } => Some((state.width, state.height)),
            _ => None,
        }
    }

    /// Progress written by the most recent `render`.
    pub fn progress(&self) -> Option<f32> {
        match &self.lifecycle {
            Lifecycle::Active { state, .. } if state.frames_rendered > 0 => Some(state.progress),
            _ => None,
        }
    }

    /// Builds the program and every GPU resource for `width` x `height` frames.
    ///
    /// Only valid once, from the uninitialized state. On failure the renderer is left in
    /// [`RendererState::Failed`] and nothing created along the way survives.
    pub fn configure(&mut self, width: u32, height: u32) -> TransitionResult<()> {
        let current = self.state();
        if current != RendererState::Uninitialized {
            return Err(TransitionError::AlreadyConfigured(current));
        }

        info!("Configuring transition renderer for {}x{}", width, height);
        match self.build(width, height) {
            Ok(resources) => {
                self.lifecycle = Lifecycle::Active {
                    resources: Box::new(resources),
                    state: RenderState {
                        width,
                        height,
                        progress: 0.0,
                        frames_rendered: 0,
                    },
                };
                info!("Transition renderer ready");
                Ok(())
            }
            Err(e) => {
                error!("Transition renderer setup failed: {}", e);
                self.lifecycle = Lifecycle::Failed;
                Err(e)
            }
        }
    }

    fn build(&self, width: u32, height: u32) -> TransitionResult<GpuResources> {
        if width == 0 || height == 0 {
            return Err(TransitionError::config(format!(
                "frame dimensions must be non-zero, got {width}x{height}"
            )));
        }

        let snippet = self.config.source().load()?;
        if snippet.is_none() {
            info!("Using pass-through transition");
        }
        let fragment_source = assemble(snippet.as_deref());
        let linked = build_program(VERTEX_SHADER, &fragment_source)?;
        let layout = UniformLayout::resolve(&linked)?;

        let context = self.provider.acquire(width, height)?;
        let program = CompiledProgram::create(&context, &linked, &layout);
        let geometry = GeometryResource::setup(&context, &linked);
        let texture = FrameTexture::initialize(&context, width, height);
        let uniforms = UniformBindings::create(&context, &program, layout, &texture, width, height);
        let target = RenderTarget::new(&context, width, height);

        Ok(GpuResources {
            program,
            geometry,
            texture,
            uniforms,
            target,
            context,
        })
    }

    /// Renders `input` at `presentation_seconds` into a newly allocated frame.
    pub fn render(&mut self, input: &VideoFrame, presentation_seconds: f64) -> TransitionResult<VideoFrame> {
        let (width, height) = self.dimensions().ok_or(TransitionError::NotConfigured)?;
        let mut output = VideoFrame::new(width, height);
        self.render_into(input, presentation_seconds, &mut output)?;
        Ok(output)
    }

    /// Renders `input` at `presentation_seconds` into `output`, returning the progress used.
    ///
    /// Both frames must be packed RGB of the configured size; anything else is rejected
    /// before the GPU is touched. `output` is either fully written or left untouched.
    pub fn render_into(
        &mut self,
        input: &VideoFrame,
        presentation_seconds: f64,
        output: &mut VideoFrame,
    ) -> TransitionResult<f32> {
        let Lifecycle::Active { resources, state } = &mut self.lifecycle else {
            return Err(TransitionError::NotConfigured);
        };
        check_frame(input, state.width, state.height)?;
        check_frame(output, state.width, state.height)?;

        let start = Instant::now();
        let progress = self.config.progress_at(presentation_seconds);
        let GpuResources {
            program,
            geometry,
            texture,
            uniforms,
            target,
            context,
        } = resources.as_mut();

        uniforms.set_progress(&context.queue, progress);
        texture.upload(context, input);

        let mut encoder = context.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Transition Encoder"),
        });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Transition Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target.view(),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            render_pass.set_pipeline(program.pipeline());
            render_pass.set_bind_group(0, uniforms.bind_group(), &[]);
            geometry.draw(&mut render_pass);
        }
        target.copy_to_buffer(&mut encoder);
        context.queue.submit(std::iter::once(encoder.finish()));

        target.read_into(context, &mut output.data)?;
        output.pts = input.pts;

        state.progress = progress;
        state.frames_rendered += 1;
        debug!(
            "[Perf] frame {} at {:.3}s: progress {:.3}, {:?}",
            state.frames_rendered,
            presentation_seconds,
            progress,
            start.elapsed()
        );
        Ok(progress)
    }

    /// Releases every GPU resource. A no-op unless the renderer is configured.
    pub fn teardown(&mut self) {
        if !matches!(self.lifecycle, Lifecycle::Active { .. }) {
            return;
        }
        if let Lifecycle::Active { resources, state } =
            std::mem::replace(&mut self.lifecycle, Lifecycle::Destroyed)
        {
            info!("Tearing down transition renderer after {} frames", state.frames_rendered);
            let resources = *resources;
            resources.release();
        }
    }
}

impl Drop for TransitionRenderer {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn check_frame(frame: &VideoFrame, width: u32, height: u32) -> TransitionResult<()> {
    let expected_len = VideoFrame::byte_len(width, height);
    if frame.width == width
        && frame.height == height
        && frame.data.len() == expected_len
    {
        return Ok(());
    }
    Err(TransitionError::DimensionMismatch {
        expected_width: width,
        expected_height: height,
        expected_len,
        actual_width: frame.width,
        actual_height: frame.height,
        actual_len: frame.data.len(),
    })
}
