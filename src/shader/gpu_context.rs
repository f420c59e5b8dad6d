//! Headless GPU context acquisition.

use crate::error::{TransitionError, TransitionResult};
use crate::render::RenderTarget;
use tracing::{info, warn};

/// GPU resources owned by one renderer.
///
/// wgpu submits on whichever thread holds the queue, so there is no "current" context
/// to bind. Callers still drive a renderer from a single thread.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
}

impl GpuContext {
    /// Initialize a GPU context for offscreen use.
    pub fn headless(allow_fallback: bool) -> TransitionResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let request = |force_fallback_adapter| {
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter,
            }))
        };

        let adapter = match request(false) {
            Ok(adapter) => adapter,
            Err(e) if allow_fallback => {
                warn!("No hardware adapter ({}), trying the fallback adapter", e);
                request(true).map_err(|e| TransitionError::context(format!("failed to obtain GPU adapter: {e}")))?
            }
            Err(e) => return Err(TransitionError::context(format!("failed to obtain GPU adapter: {e}"))),
        };
        info!("Using GPU adapter {:?}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Segue Device"),
            required_features: wgpu::Features::empty(),
            // Texture size caps follow the hardware so large frames fit
            required_limits: wgpu::Limits {
                max_buffer_size: adapter.limits().max_buffer_size,
                ..wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits())
            },
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        }))
        .map_err(|e| TransitionError::context(format!("failed to create GPU device: {e}")))?;

        Ok(Self {
            device,
            queue,
            instance,
            adapter,
        })
    }

    /// Checks that a `width` x `height` render target and its readback buffer fit the
    /// device limits.
    pub fn check_size(&self, width: u32, height: u32) -> TransitionResult<()> {
        let limits = self.device.limits();
        let max = limits.max_texture_dimension_2d;
        if width > max || height > max {
            return Err(TransitionError::context(format!(
                "{width}x{height} exceeds the device texture limit of {max}"
            )));
        }
        let readback = RenderTarget::readback_size(width, height);
        if readback > limits.max_buffer_size {
            return Err(TransitionError::context(format!(
                "{width}x{height} needs a {readback} byte readback buffer, the device allows {}",
                limits.max_buffer_size
            )));
        }
        Ok(())
    }

    /// Releases the device. Outstanding objects become invalid.
    pub fn destroy(&self) {
        self.device.destroy();
    }
}

/// Source of rendering contexts for a renderer.
pub trait ContextProvider {
    /// Produce a context able to render `width` x `height` frames.
    fn acquire(&self, width: u32, height: u32) -> TransitionResult<GpuContext>;
}

/// Default provider: a surface-less wgpu device.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessContextProvider {
    /// Retry with the software fallback adapter when no hardware adapter is found.
    pub allow_fallback: bool,
}

impl ContextProvider for HeadlessContextProvider {
    fn acquire(&self, width: u32, height: u32) -> TransitionResult<GpuContext> {
        let context = GpuContext::headless(self.allow_fallback)?;
        context.check_size(width, height)?;
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_texture_limit_follows_the_adapter() {
        let context = match GpuContext::headless(true) {
            Ok(context) => context,
            Err(e) => {
                eprintln!("skipping GPU test: {e}");
                return;
            }
        };
        let adapter_max = context.adapter.limits().max_texture_dimension_2d;
        assert_eq!(context.device.limits().max_texture_dimension_2d, adapter_max);
        assert!(context.check_size(adapter_max, 1).is_ok());
        assert!(context.check_size(adapter_max + 1, 16).is_err());
    }

    #[test]
    fn headless_provider_accepts_frames_larger_than_2048() {
        let Ok(context) = GpuContext::headless(true) else {
            return;
        };
        if context.adapter.limits().max_texture_dimension_2d < 3840 {
            eprintln!("skipping: adapter cannot hold a 3840 wide texture");
            return;
        }
        context.destroy();

        let provider = HeadlessContextProvider { allow_fallback: true };
        for (width, height) in [(2560, 1440), (3840, 2160)] {
            let context = provider.acquire(width, height).unwrap();
            assert!(context.device.limits().max_texture_dimension_2d >= width);
        }
    }
}
