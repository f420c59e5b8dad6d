//! Uniform resolution and binding for the transition program.
//!
//! Locations are looked up by name in the linked fragment module, the way a GL program is
//! queried after link. Anything the module does not contain resolves to `None` and writes
//! to it are dropped.

use super::{CompiledProgram, GpuContext, LinkedProgram, ShaderError, ShaderStage};
use crate::render::FrameTexture;
use naga::{AddressSpace, TypeInner};
use tracing::{debug, info};

/// Global holding the frame texture (`to` in the snippet).
pub const TEXTURE_NAME: &str = "_to_texture";
/// Global holding the frame sampler.
pub const SAMPLER_NAME: &str = "_to_sampler";
/// Parameter block member written every frame.
pub const PROGRESS_MEMBER: &str = "progress";
/// Parameter block member written once at configure time.
pub const RESOLUTION_MEMBER: &str = "resolution";

/// The uniform block carrying `progress` and `resolution`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamsBlock {
    pub binding: u32,
    pub size: u64,
    pub progress_offset: Option<u64>,
    pub resolution_offset: Option<u64>,
}

/// Resolved binding numbers and offsets, all within bind group 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UniformLayout {
    pub texture_binding: Option<u32>,
    pub sampler_binding: Option<u32>,
    pub params: Option<ParamsBlock>,
}

impl UniformLayout {
    /// Looks up the frame sampler and the transition parameters in the fragment stage.
    pub fn resolve(program: &LinkedProgram) -> Result<Self, ShaderError> {
        let module = &program.fragment.module;
        let mut layout = UniformLayout::default();

        for (_, var) in module.global_variables.iter() {
            let Some(binding) = &var.binding else {
                continue;
            };
            let ty = &module.types[var.ty].inner;

            let slot = match (var.name.as_deref(), ty) {
                (Some(TEXTURE_NAME), TypeInner::Image { .. }) => &mut layout.texture_binding,
                (Some(SAMPLER_NAME), TypeInner::Sampler { .. }) => &mut layout.sampler_binding,
                (_, TypeInner::Struct { members, span }) if var.space == AddressSpace::Uniform => {
                    let offset_of = |name: &str| {
                        members
                            .iter()
                            .find(|m| m.name.as_deref() == Some(name))
                            .map(|m| m.offset as u64)
                    };
                    let progress_offset = offset_of(PROGRESS_MEMBER);
                    let resolution_offset = offset_of(RESOLUTION_MEMBER);
                    if progress_offset.is_none() && resolution_offset.is_none() {
                        continue;
                    }
                    check_group(binding.group, "transition parameters")?;
                    layout.params = Some(ParamsBlock {
                        binding: binding.binding,
                        size: *span as u64,
                        progress_offset,
                        resolution_offset,
                    });
                    continue;
                }
                _ => continue,
            };
            check_group(binding.group, var.name.as_deref().unwrap_or("resource"))?;
            *slot = Some(binding.binding);
        }

        debug!("Resolved uniforms: {:?}", layout);
        Ok(layout)
    }

    /// Bind group layout entries for every resolved resource.
    pub fn layout_entries(&self) -> Vec<wgpu::BindGroupLayoutEntry> {
        let mut entries = Vec::with_capacity(3);
        if let Some(binding) = self.texture_binding {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        if let Some(binding) = self.sampler_binding {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
        }
        if let Some(params) = self.params {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: params.binding,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(params.size),
                },
                count: None,
            });
        }
        entries
    }
}

fn check_group(group: u32, what: &str) -> Result<(), ShaderError> {
    if group == 0 {
        Ok(())
    } else {
        Err(ShaderError::new(
            ShaderStage::Link,
            format!("{what} must live in bind group 0, found group {group}"),
        ))
    }
}

/// GPU side of the uniforms: the parameter buffer and the bind group tying it to the texture.
pub struct UniformBindings {
    layout: UniformLayout,
    uniform_buffer: Option<wgpu::Buffer>,
    bind_group: wgpu::BindGroup,
}

impl UniformBindings {
    /// Creates the bind group, writes `resolution` once and `progress` as zero.
    pub fn create(
        context: &GpuContext,
        program: &CompiledProgram,
        layout: UniformLayout,
        texture: &FrameTexture,
        width: u32,
        height: u32,
    ) -> Self {
        let uniform_buffer = layout.params.map(|params| {
            context.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Transition Uniform Buffer"),
                size: params.size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });

        let mut entries = Vec::with_capacity(3);
        if let Some(binding) = layout.texture_binding {
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::TextureView(texture.view()),
            });
        }
        if let Some(binding) = layout.sampler_binding {
            entries.push(wgpu::BindGroupEntry {
                binding,
                resource: wgpu::BindingResource::Sampler(texture.sampler()),
            });
        }
        if let (Some(params), Some(buffer)) = (layout.params, &uniform_buffer) {
            entries.push(wgpu::BindGroupEntry {
                binding: params.binding,
                resource: buffer.as_entire_binding(),
            });
        }

        let bind_group = context.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Transition Bind Group"),
            layout: program.bind_group_layout(),
            entries: &entries,
        });

        let bindings = Self {
            layout,
            uniform_buffer,
            bind_group,
        };

        info!("Resolution uniform set to {}x{}", width, height);
        bindings.write(
            &context.queue,
            layout.params.and_then(|p| p.resolution_offset),
            &[width as f32, height as f32],
        );
        bindings.set_progress(&context.queue, 0.0);
        bindings
    }

    /// Writes the per-frame progress value.
    pub fn set_progress(&self, queue: &wgpu::Queue, progress: f32) {
        self.write(queue, self.layout.params.and_then(|p| p.progress_offset), &[progress]);
    }

    fn write(&self, queue: &wgpu::Queue, offset: Option<u64>, values: &[f32]) {
        if let (Some(offset), Some(buffer)) = (offset, &self.uniform_buffer) {
            queue.write_buffer(buffer, offset, bytemuck::cast_slice(values));
        }
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    /// Releases the parameter buffer.
    pub fn destroy(&self) {
        if let Some(buffer) = &self.uniform_buffer {
            buffer.destroy();
        }
    }
}
