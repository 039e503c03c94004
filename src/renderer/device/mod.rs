//! The GPU seam of the render model.
//!
//! The batching code drives the GPU through [`RenderDevice`], an
//! immediate-mode interface shaped after the handful of buffer, program and
//! texture calls the batches need. [`WgpuDevice`] renders with `wgpu`;
//! [`RecordingDevice`] mirrors buffers on the CPU and logs every command so
//! the model can run (and be tested) without a GPU.

pub mod recording;
pub mod wgpu_device;

pub use recording::{DeviceCommand, RecordedBuffer, RecordingDevice};
pub use wgpu_device::WgpuDevice;

use crate::renderer::geometry::DrawMode;
use crate::renderer::material::TextureUnit;
use crate::renderer::shader::{ShaderId, VertexFormat};
use crate::settings::BufferUsage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuTexture(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
    Uniform,
}

pub trait RenderDevice {
    /// Creates a buffer object. Storage is allocated by the first upload.
    fn create_buffer(&mut self, kind: BufferKind, usage: BufferUsage, label: &str) -> BufferId;

    /// Replaces the whole contents of a buffer, growing it when required.
    fn upload_buffer(&mut self, buffer: BufferId, data: &[u8]);

    fn destroy_buffer(&mut self, buffer: BufferId);

    /// Creates a 2D RGBA8 texture.
    fn create_texture(&mut self, label: &str, width: u32, height: u32, rgba: &[u8]) -> GpuTexture;

    fn bind_vertex_array(&mut self);

    fn release_vertex_array(&mut self);

    /// Makes a program current, attaching its global and local uniform
    /// blocks and enabling its vertex attributes.
    fn bind_program(&mut self, shader: ShaderId);

    fn release_program(&mut self, shader: ShaderId);

    fn bind_texture(&mut self, unit: TextureUnit, texture: GpuTexture);

    fn release_texture(&mut self, unit: TextureUnit, texture: GpuTexture);

    /// Binds `size` bytes of `buffer` starting at `offset` to a uniform
    /// block binding point.
    fn bind_uniform_range(&mut self, binding: u32, buffer: BufferId, offset: u64, size: u64);

    /// Binds an interleaved vertex buffer laid out according to `format`.
    fn bind_vertex_buffer(&mut self, buffer: BufferId, format: VertexFormat);

    /// Binds a buffer of `u32` indices.
    fn bind_index_buffer(&mut self, buffer: BufferId);

    fn draw_indexed(&mut self, mode: DrawMode, width: f32, first_index: u32, index_count: u32);
}
