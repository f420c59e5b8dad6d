//! Frame texture upload and render-target readback.
//!
//! Frames are packed RGB, top row first. The GPU side is RGBA because wgpu has no
//! three-channel 8-bit format: channels are expanded on upload and alpha is dropped on
//! readback. Rows are reversed on upload so the snippet's `uv` has its origin at the
//! bottom-left of the image; with that, render-target rows come back top row first.

use crate::error::{TransitionError, TransitionResult};
use crate::frame::VideoFrame;
use crate::shader::GpuContext;

/// Format of the frame texture and the render target.
pub const FRAME_TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const RGB: usize = 3;
const RGBA: usize = 4;

/// The texture the snippet samples as `to`. Sized once, overwritten every frame.
pub struct FrameTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    width: u32,
    height: u32,
    staging: Vec<u8>,
}

impl FrameTexture {
    /// Allocates a `width` x `height` texture with clamp-to-edge, linear filtering and no mipmaps.
    pub fn initialize(context: &GpuContext, width: u32, height: u32) -> Self {
        let texture = context.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Frame Texture"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FRAME_TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = context.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Frame Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
            width,
            height,
            staging: vec![0; width as usize * height as usize * RGBA],
        }
    }

    /// Replaces the texture contents with `frame`.
    ///
    /// The caller guarantees `frame` matches the initialized size and is packed RGB.
    pub fn upload(&mut self, context: &GpuContext, frame: &VideoFrame) {
        debug_assert_eq!((frame.width, frame.height), (self.width, self.height));
        expand_rows_bottom_up(&frame.data, self.width as usize, self.height as usize, &mut self.staging);

        context.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &self.staging,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.width * RGBA as u32),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d { width: self.width, height: self.height, depth_or_array_layers: 1 },
        );
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    pub fn destroy(&self) {
        self.texture.destroy();
    }
}

/// The texture the program draws into, plus the buffer it is copied to for readback.
pub struct RenderTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    readback_buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_bytes_per_row: u32,
}

impl RenderTarget {
    pub fn new(context: &GpuContext, width: u32, height: u32) -> Self {
        let texture = context.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Render Target"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FRAME_TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let padded_bytes_per_row = padded_bytes_per_row(width);
        let readback_buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: Self::readback_size(width, height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            texture,
            view,
            readback_buffer,
            width,
            height,
            padded_bytes_per_row,
        }
    }

    /// Bytes of the row-padded readback buffer for a `width` x `height` target.
    pub fn readback_size(width: u32, height: u32) -> wgpu::BufferAddress {
        padded_bytes_per_row(width) as wgpu::BufferAddress * height as wgpu::BufferAddress
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Records the copy of the render target into the readback buffer.
    pub fn copy_to_buffer(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d { width: self.width, height: self.height, depth_or_array_layers: 1 },
        );
    }

    /// Blocks until the copy has landed and packs the pixels as RGB into `out`.
    pub fn read_into(&self, context: &GpuContext, out: &mut [u8]) -> TransitionResult<()> {
        let buffer_slice = self.readback_buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        context
            .device
            .poll(wgpu::PollType::Wait { submission_index: None, timeout: None })
            .map_err(|e| TransitionError::readback(format!("device poll failed: {e}")))?;
        receiver
            .recv()
            .map_err(|e| TransitionError::readback(format!("map callback dropped: {e}")))?
            .map_err(|e| TransitionError::readback(format!("buffer map failed: {e}")))?;

        {
            let data = buffer_slice.get_mapped_range();
            pack_rgb_rows(
                &data,
                self.padded_bytes_per_row as usize,
                self.width as usize,
                self.height as usize,
                out,
            );
        }
        self.readback_buffer.unmap();
        Ok(())
    }

    pub fn destroy(&self) {
        self.texture.destroy();
        self.readback_buffer.destroy();
    }
}

/// Row pitch of the readback copy, rounded up to wgpu's copy alignment.
fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * RGBA as u32;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Expands packed RGB to RGBA with opaque alpha, writing rows in reverse order.
fn expand_rows_bottom_up(rgb: &[u8], width: usize, height: usize, rgba: &mut [u8]) {
    let src_stride = width * RGB;
    let dst_stride = width * RGBA;
    for (row, src) in rgb.chunks_exact(src_stride).take(height).enumerate() {
        let dst_row = height - 1 - row;
        let dst = &mut rgba[dst_row * dst_stride..(dst_row + 1) * dst_stride];
        for (px, out) in src.chunks_exact(RGB).zip(dst.chunks_exact_mut(RGBA)) {
            out[..RGB].copy_from_slice(px);
            out[RGB] = 255;
        }
    }
}

/// Drops row padding and alpha from a readback copy.
fn pack_rgb_rows(padded: &[u8], padded_stride: usize, width: usize, height: usize, rgb: &mut [u8]) {
    let dst_stride = width * RGB;
    for (src, dst) in padded
        .chunks(padded_stride)
        .zip(rgb.chunks_exact_mut(dst_stride))
        .take(height)
    {
        for (px, out) in src[..width * RGBA].chunks_exact(RGBA).zip(dst.chunks_exact_mut(RGB)) {
            out.copy_from_slice(&px[..RGB]);
        }
    }
}
