//! Full-screen quad geometry.

use crate::frame::QuadVertex;
use crate::shader::{GpuContext, LinkedProgram};
use tracing::debug;
use wgpu::util::DeviceExt;

/// Static vertex buffer holding the two quad triangles.
pub struct GeometryResource {
    vertex_buffer: wgpu::Buffer,
    vertex_count: u32,
}

impl GeometryResource {
    /// Uploads the quad. The pipeline built from `program` already binds the buffer to its
    /// `position` attribute, so only the buffer is created here.
    pub fn setup(context: &GpuContext, program: &LinkedProgram) -> Self {
        let vertex_buffer = context.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Vertex Buffer"),
            contents: bytemuck::cast_slice(QuadVertex::VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });
        debug!(
            "Quad uploaded ({} vertices, position at location {})",
            QuadVertex::VERTICES.len(),
            program.position_location
        );

        Self {
            vertex_buffer,
            vertex_count: QuadVertex::VERTICES.len() as u32,
        }
    }

    /// Binds the buffer and draws both triangles.
    pub fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        render_pass.draw(0..self.vertex_count, 0..1);
    }

    pub fn destroy(&self) {
        self.vertex_buffer.destroy();
    }
}
