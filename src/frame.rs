//! Video frame types exchanged with the media pipeline.

use bytemuck::{Pod, Zeroable};

/// Bytes per pixel of packed RGB24, the only frame layout.
pub const BYTES_PER_PIXEL: usize = 3;

/// Rational unit of a presentation timestamp, e.g. `1/25` or `1/90000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    pub num: i32,
    pub den: i32,
}

impl TimeBase {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }
}

/// A presentation timestamp in time-base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub pts: i64,
    pub time_base: TimeBase,
}

impl Timestamp {
    pub const fn new(pts: i64, time_base: TimeBase) -> Self {
        Self { pts, time_base }
    }

    /// Converts to seconds: `pts * num / den`. A zero denominator yields `0.0`.
    pub fn seconds(&self) -> f64 {
        if self.time_base.den == 0 {
            return 0.0;
        }
        self.pts as f64 * self.time_base.num as f64 / self.time_base.den as f64
    }
}

/// A packed RGB24 video frame.
///
/// Rows are stored top-down: row 0 is the top row of the image.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Presentation timestamp (if available)
    pub pts: Option<Timestamp>,
    /// Raw pixel data
    pub data: Vec<u8>,
}

impl VideoFrame {
    /// Creates a black frame of the given dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pts: None,
            data: vec![0; Self::byte_len(width, height)],
        }
    }

    /// Creates a video frame from existing data.
    pub fn from_data(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pts: None,
            data,
        }
    }

    pub fn with_pts(mut self, pts: Timestamp) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Number of bytes a tightly packed frame of this shape occupies.
    pub fn byte_len(width: u32, height: u32) -> usize {
        (width as usize) * (height as usize) * BYTES_PER_PIXEL
    }

    /// True when `data` holds exactly `width * height` pixels.
    pub fn is_packed(&self) -> bool {
        self.data.len() == Self::byte_len(self.width, self.height)
    }
}

/// Vertex of the full-screen quad.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
}

impl QuadVertex {
    /// Two triangles covering normalized device coordinates `[-1, 1]²`.
    pub const VERTICES: &'static [QuadVertex] = &[
        QuadVertex { position: [-1.0, -1.0] },
        QuadVertex { position: [1.0, -1.0] },
        QuadVertex { position: [-1.0, 1.0] },
        QuadVertex { position: [-1.0, 1.0] },
        QuadVertex { position: [1.0, 1.0] },
        QuadVertex { position: [1.0, -1.0] },
    ];

    /// Vertex attributes with `position` bound to `shader_location`.
    pub fn attributes(shader_location: u32) -> [wgpu::VertexAttribute; 1] {
        [wgpu::VertexAttribute {
            offset: 0,
            shader_location,
            format: wgpu::VertexFormat::Float32x2,
        }]
    }

    /// Returns the vertex buffer layout for the given attributes.
    pub fn layout(attributes: &[wgpu::VertexAttribute]) -> wgpu::VertexBufferLayout<'_> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_uses_the_whole_time_base() {
        let ts = Timestamp::new(3, TimeBase::new(1001, 30000));
        assert!((ts.seconds() - 0.1001).abs() < 1e-12);
        assert_eq!(Timestamp::new(45000, TimeBase::new(1, 90000)).seconds(), 0.5);
        assert_eq!(Timestamp::new(10, TimeBase::new(1, 0)).seconds(), 0.0);
    }

    #[test]
    fn packed_length_is_three_bytes_per_pixel() {
        let frame = VideoFrame::new(4, 3);
        assert_eq!(frame.data.len(), 36);
        assert!(frame.is_packed());

        let short = VideoFrame::from_data(4, 3, vec![0; 35]);
        assert!(!short.is_packed());
    }

    #[test]
    fn quad_covers_clip_space() {
        assert_eq!(QuadVertex::VERTICES.len(), 6);
        for corner in [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]] {
            assert!(QuadVertex::VERTICES.iter().any(|v| v.position == corner));
        }
        let attrs = QuadVertex::attributes(3);
        let layout = QuadVertex::layout(&attrs);
        assert_eq!(layout.array_stride, 8);
        assert_eq!(layout.attributes[0].shader_location, 3);
    }
}
