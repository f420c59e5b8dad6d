//! Compiling and linking the transition program.
//!
//! Both stages are GLSL, compiled on the CPU with naga and validated before anything is
//! handed to wgpu. The WGSL that naga emits for a validated module is what the GPU sees.

use super::{ShaderError, ShaderStage, UniformLayout};
use crate::frame::QuadVertex;
use crate::render::FRAME_TEXTURE_FORMAT;
use crate::shader::GpuContext;
use naga::front::glsl::{Frontend, Options};
use naga::valid::{Capabilities, ModuleInfo, ValidationFlags, Validator};
use naga::{Binding, Handle, Module, Type, TypeInner};
use std::borrow::Cow;
use tracing::{debug, info};

/// Name of the vertex attribute the quad is bound to.
const POSITION_ATTRIBUTE: &str = "position";

/// One validated shader stage.
#[derive(Debug)]
pub struct StageModule {
    pub module: Module,
    pub info: ModuleInfo,
    pub wgsl: String,
}

/// A vertex/fragment pair whose interfaces have been matched.
#[derive(Debug)]
pub struct LinkedProgram {
    pub vertex: StageModule,
    pub fragment: StageModule,
    /// Shader location of the vertex `position` attribute.
    pub position_location: u32,
}

/// Compiles both stages and links them. Any failing step aborts the whole build.
pub fn build_program(vertex_source: &str, fragment_source: &str) -> Result<LinkedProgram, ShaderError> {
    let vertex = compile_stage(vertex_source, ShaderStage::Vertex, naga::ShaderStage::Vertex)?;
    let fragment = compile_stage(fragment_source, ShaderStage::Fragment, naga::ShaderStage::Fragment)?;
    let position_location = link(&vertex, &fragment)?;
    info!("Transition program linked (position at location {})", position_location);
    Ok(LinkedProgram {
        vertex,
        fragment,
        position_location,
    })
}

fn compile_stage(
    source: &str,
    stage: ShaderStage,
    naga_stage: naga::ShaderStage,
) -> Result<StageModule, ShaderError> {
    let mut frontend = Frontend::default();
    let options = Options::from(naga_stage);
    let module = frontend
        .parse(&options, source)
        .map_err(|e| ShaderError::new(stage, e.emit_to_string(source)))?;

    if entry_point(&module, naga_stage).is_none() {
        return Err(ShaderError::new(stage, "no `main` entry point"));
    }

    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    let info = validator
        .validate(&module)
        .map_err(|e| ShaderError::new(stage, e.emit_to_string(source)))?;
    let wgsl = naga::back::wgsl::write_string(&module, &info, naga::back::wgsl::WriterFlags::empty())
        .map_err(|e| ShaderError::new(stage, format!("WGSL generation error: {e}")))?;

    debug!("Compiled {} stage ({} bytes of WGSL)", stage, wgsl.len());
    Ok(StageModule { module, info, wgsl })
}

fn entry_point(module: &Module, stage: naga::ShaderStage) -> Option<&naga::EntryPoint> {
    module
        .entry_points
        .iter()
        .find(|ep| ep.stage == stage && ep.name == "main")
}

/// Matches every fragment input to a vertex output of the same location and type,
/// and returns the location of the `position` attribute.
fn link(vertex: &StageModule, fragment: &StageModule) -> Result<u32, ShaderError> {
    let link_error = |msg: String| ShaderError::new(ShaderStage::Link, msg);

    let vs = entry_point(&vertex.module, naga::ShaderStage::Vertex)
        .ok_or_else(|| link_error("vertex stage has no entry point".into()))?;
    let fs = entry_point(&fragment.module, naga::ShaderStage::Fragment)
        .ok_or_else(|| link_error("fragment stage has no entry point".into()))?;

    let mut outputs = Vec::new();
    if let Some(result) = &vs.function.result {
        collect_locations(&vertex.module, result.ty, result.binding.as_ref(), &mut outputs);
    }

    let mut inputs = Vec::new();
    for arg in &fs.function.arguments {
        collect_locations(&fragment.module, arg.ty, arg.binding.as_ref(), &mut inputs);
    }

    for (location, ty) in &inputs {
        match outputs.iter().find(|(out_location, _)| out_location == location) {
            None => {
                return Err(link_error(format!(
                    "fragment input at location {location} is not written by the vertex stage"
                )))
            }
            Some((_, out_ty)) if out_ty != ty => {
                return Err(link_error(format!(
                    "varying at location {location} is {out_ty:?} in the vertex stage but {ty:?} in the fragment stage"
                )))
            }
            Some(_) => {}
        }
    }

    let mut attributes = Vec::new();
    for arg in &vs.function.arguments {
        if let Some(Binding::Location { location, .. }) = &arg.binding {
            attributes.push((arg.name.as_deref(), *location));
        }
    }
    let position = attributes
        .iter()
        .find(|(name, _)| *name == Some(POSITION_ATTRIBUTE))
        .or_else(|| match attributes.as_slice() {
            [only] => Some(only),
            _ => None,
        })
        .map(|(_, location)| *location);

    position.ok_or_else(|| link_error(format!("vertex stage has no `{POSITION_ATTRIBUTE}` attribute")))
}

/// Flattens location bindings, descending into the structs naga builds for GLSL interfaces.
fn collect_locations(
    module: &Module,
    ty: Handle<Type>,
    binding: Option<&Binding>,
    out: &mut Vec<(u32, TypeInner)>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => out.push((*location, module.types[ty].inner.clone())),
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    collect_locations(module, member.ty, member.binding.as_ref(), out);
                }
            }
        }
    }
}

/// The linked program as GPU objects: shader modules baked into a render pipeline.
pub struct CompiledProgram {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl CompiledProgram {
    pub fn create(context: &GpuContext, linked: &LinkedProgram, uniforms: &UniformLayout) -> Self {
        let device = &context.device;

        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Transition Vertex Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(linked.vertex.wgsl.as_str())),
        });
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Transition Fragment Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(linked.fragment.wgsl.as_str())),
        });

        let entries = uniforms.layout_entries();
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Transition Bind Group Layout"),
            entries: &entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Transition Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let attributes = QuadVertex::attributes(linked.position_location);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Transition Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("main"),
                buffers: &[QuadVertex::layout(&attributes)],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: FRAME_TEXTURE_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        Self {
            pipeline,
            bind_group_layout,
        }
    }

    pub fn pipeline(&self) -> &wgpu::RenderPipeline {
        &self.pipeline
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::{assemble, VERTEX_SHADER};

    #[test]
    fn default_program_builds() {
        let program = build_program(VERTEX_SHADER, &assemble(None)).unwrap();
        assert!(program.fragment.wgsl.contains("fn main"));
        assert!(program.vertex.wgsl.contains("fn main"));
        assert_eq!(program.position_location, 0);
    }

    #[test]
    fn snippet_using_every_uniform_builds() {
        let snippet = r"
            vec4 transition(vec2 uv) {
                vec2 px = uv * resolution;
                float edge = step(progress, uv.x);
                return mix(vec4(0.0, 0.0, 0.0, 1.0), texture2D(to, uv), edge) + vec4(px * 0.0, 0.0, 0.0);
            }
        ";
        assert!(build_program(VERTEX_SHADER, &assemble(Some(snippet))).is_ok());
    }

    #[test]
    fn parameters_named_like_uniforms_shadow_them() {
        let snippet = r"
float ease(float progress) { return progress * progress; }
vec4 transition(vec2 uv) {
    vec2 resolution = uv * 2.0;
    return texture2D(to, uv) * ease(progress) + vec4(resolution, 0.0, 0.0) * 0.0;
}
";
        let program = build_program(VERTEX_SHADER, &assemble(Some(snippet))).unwrap();
        assert!(program.fragment.wgsl.contains("fn main"));
    }

    #[test]
    fn snippet_with_its_own_uniforms_builds() {
        let snippet = r"
uniform float strength;
uniform vec2 center;
vec4 transition(vec2 uv) {
    float d = distance(uv, center) * strength;
    return mix(texture2D(to, uv), vec4(0.0), d * progress);
}
";
        assert!(build_program(VERTEX_SHADER, &assemble(Some(snippet))).is_ok());
    }

    #[test]
    fn missing_transition_function_fails_fragment_compile() {
        let snippet = "vec4 not_a_transition(vec2 uv) { return vec4(1.0); }";
        let err = build_program(VERTEX_SHADER, &assemble(Some(snippet))).unwrap_err();
        assert_eq!(err.stage, ShaderStage::Fragment);
        assert!(!err.diagnostic.is_empty());
    }

    #[test]
    fn syntax_error_fails_fragment_compile() {
        let err = build_program(VERTEX_SHADER, &assemble(Some("vec4 transition(vec2 uv) {"))).unwrap_err();
        assert_eq!(err.stage, ShaderStage::Fragment);
    }

    #[test]
    fn broken_vertex_stage_fails_first() {
        let err = build_program("#version 450\nvoid main() { oops }", "also broken").unwrap_err();
        assert_eq!(err.stage, ShaderStage::Vertex);
    }

    #[test]
    fn mismatched_varyings_fail_to_link() {
        let vertex = r"#version 450
layout(location = 0) in vec2 position;
layout(location = 1) out vec2 _other;

void main() {
    gl_Position = vec4(position, 0.0, 1.0);
    _other = position;
}
";
        let err = build_program(vertex, &assemble(None)).unwrap_err();
        assert_eq!(err.stage, ShaderStage::Link);
        assert!(err.diagnostic.contains("location 0"));
    }

    #[test]
    fn varying_type_mismatch_fails_to_link() {
        let vertex = r"#version 450
layout(location = 0) in vec2 position;
layout(location = 0) out vec4 _uv;

void main() {
    gl_Position = vec4(position, 0.0, 1.0);
    _uv = vec4(position, 0.0, 1.0);
}
";
        let err = build_program(vertex, &assemble(None)).unwrap_err();
        assert_eq!(err.stage, ShaderStage::Link);
    }
}
