use std::collections::HashMap;

use super::{BufferId, BufferKind, GpuTexture, RenderDevice};
use crate::renderer::geometry::DrawMode;
use crate::renderer::material::TextureUnit;
use crate::renderer::shader::{ShaderId, VertexFormat};
use crate::settings::BufferUsage;

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    CreateBuffer {
        buffer: BufferId,
        kind: BufferKind,
    },
    UploadBuffer {
        buffer: BufferId,
        size: usize,
    },
    DestroyBuffer {
        buffer: BufferId,
    },
    CreateTexture {
        texture: GpuTexture,
    },
    BindVertexArray,
    ReleaseVertexArray,
    BindProgram(ShaderId),
    ReleaseProgram(ShaderId),
    BindTexture {
        unit: TextureUnit,
        texture: GpuTexture,
    },
    ReleaseTexture {
        unit: TextureUnit,
        texture: GpuTexture,
    },
    BindUniformRange {
        binding: u32,
        buffer: BufferId,
        offset: u64,
        size: u64,
    },
    BindVertexBuffer {
        buffer: BufferId,
        format: VertexFormat,
    },
    BindIndexBuffer {
        buffer: BufferId,
    },
    DrawIndexed {
        mode: DrawMode,
        width: f32,
        first_index: u32,
        index_count: u32,
    },
}

#[derive(Debug, Clone)]
pub struct RecordedBuffer {
    pub kind: BufferKind,
    pub usage: BufferUsage,
    pub label: String,
    pub data: Vec<u8>,
    pub uploads: usize,
}

impl RecordedBuffer {
    pub fn as_f32(&self) -> Vec<f32> {
        self.words().map(f32::from_bits).collect()
    }

    pub fn as_u32(&self) -> Vec<u32> {
        self.words().collect()
    }

    // Byte storage carries no alignment guarantee, so decode word by word.
    fn words(&self) -> impl Iterator<Item = u32> + '_ {
        self.data
            .chunks_exact(4)
            .map(|word| u32::from_ne_bytes([word[0], word[1], word[2], word[3]]))
    }
}

/// Headless device: keeps a CPU copy of every live buffer and a log of every
/// command issued since the last [`RecordingDevice::clear_commands`].
#[derive(Debug, Default)]
pub struct RecordingDevice {
    buffers: HashMap<BufferId, RecordedBuffer>,
    textures: HashMap<GpuTexture, (u32, u32)>,
    commands: Vec<DeviceCommand>,
    next_buffer: u32,
    next_texture: u32,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[DeviceCommand] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn buffer(&self, buffer: BufferId) -> Option<&RecordedBuffer> {
        self.buffers.get(&buffer)
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn texture_size(&self, texture: GpuTexture) -> Option<(u32, u32)> {
        self.textures.get(&texture).copied()
    }

    pub fn draw_calls(&self) -> impl Iterator<Item = &DeviceCommand> {
        self.commands
            .iter()
            .filter(|cmd| matches!(cmd, DeviceCommand::DrawIndexed { .. }))
    }

    pub fn count(&self, predicate: impl Fn(&DeviceCommand) -> bool) -> usize {
        self.commands.iter().filter(|cmd| predicate(cmd)).count()
    }

    fn buffer_mut(&mut self, buffer: BufferId) -> &mut RecordedBuffer {
        match self.buffers.get_mut(&buffer) {
            Some(recorded) => recorded,
            None => panic!("{:?} used after destruction or before creation", buffer),
        }
    }

    fn assert_live(&self, buffer: BufferId) {
        assert!(
            self.buffers.contains_key(&buffer),
            "{:?} used after destruction or before creation",
            buffer
        );
    }
}

impl RenderDevice for RecordingDevice {
    fn create_buffer(&mut self, kind: BufferKind, usage: BufferUsage, label: &str) -> BufferId {
        let buffer = BufferId(self.next_buffer);
        self.next_buffer += 1;
        self.buffers.insert(
            buffer,
            RecordedBuffer {
                kind,
                usage,
                label: label.to_string(),
                data: Vec::new(),
                uploads: 0,
            },
        );
        self.commands.push(DeviceCommand::CreateBuffer { buffer, kind });
        buffer
    }

    fn upload_buffer(&mut self, buffer: BufferId, data: &[u8]) {
        let recorded = self.buffer_mut(buffer);
        recorded.data.clear();
        recorded.data.extend_from_slice(data);
        recorded.uploads += 1;
        self.commands.push(DeviceCommand::UploadBuffer {
            buffer,
            size: data.len(),
        });
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        assert!(
            self.buffers.remove(&buffer).is_some(),
            "{:?} destroyed twice",
            buffer
        );
        self.commands.push(DeviceCommand::DestroyBuffer { buffer });
    }

    fn create_texture(&mut self, _label: &str, width: u32, height: u32, rgba: &[u8]) -> GpuTexture {
        assert_eq!(
            rgba.len(),
            (width * height * 4) as usize,
            "texture data does not match its dimensions"
        );
        let texture = GpuTexture(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(texture, (width, height));
        self.commands.push(DeviceCommand::CreateTexture { texture });
        texture
    }

    fn bind_vertex_array(&mut self) {
        self.commands.push(DeviceCommand::BindVertexArray);
    }

    fn release_vertex_array(&mut self) {
        self.commands.push(DeviceCommand::ReleaseVertexArray);
    }

    fn bind_program(&mut self, shader: ShaderId) {
        self.commands.push(DeviceCommand::BindProgram(shader));
    }

    fn release_program(&mut self, shader: ShaderId) {
        self.commands.push(DeviceCommand::ReleaseProgram(shader));
    }

    fn bind_texture(&mut self, unit: TextureUnit, texture: GpuTexture) {
        self.commands.push(DeviceCommand::BindTexture { unit, texture });
    }

    fn release_texture(&mut self, unit: TextureUnit, texture: GpuTexture) {
        self.commands.push(DeviceCommand::ReleaseTexture { unit, texture });
    }

    fn bind_uniform_range(&mut self, binding: u32, buffer: BufferId, offset: u64, size: u64) {
        self.assert_live(buffer);
        self.commands.push(DeviceCommand::BindUniformRange {
            binding,
            buffer,
            offset,
            size,
        });
    }

    fn bind_vertex_buffer(&mut self, buffer: BufferId, format: VertexFormat) {
        self.assert_live(buffer);
        self.commands
            .push(DeviceCommand::BindVertexBuffer { buffer, format });
    }

    fn bind_index_buffer(&mut self, buffer: BufferId) {
        self.assert_live(buffer);
        self.commands.push(DeviceCommand::BindIndexBuffer { buffer });
    }

    fn draw_indexed(&mut self, mode: DrawMode, width: f32, first_index: u32, index_count: u32) {
        self.commands.push(DeviceCommand::DrawIndexed {
            mode,
            width,
            first_index,
            index_count,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uploads_replace_buffer_contents() {
        let mut device = RecordingDevice::new();
        let buffer = device.create_buffer(BufferKind::Index, BufferUsage::Static, "indices");

        device.upload_buffer(buffer, bytemuck::cast_slice(&[1u32, 2, 3]));
        device.upload_buffer(buffer, bytemuck::cast_slice(&[7u32]));

        let recorded = device.buffer(buffer).unwrap();
        assert_eq!(recorded.as_u32(), vec![7]);
        assert_eq!(recorded.uploads, 2);
    }

    #[test]
    fn destroyed_buffers_are_forgotten() {
        let mut device = RecordingDevice::new();
        let buffer = device.create_buffer(BufferKind::Vertex, BufferUsage::Dynamic, "vertices");
        device.destroy_buffer(buffer);

        assert_eq!(device.live_buffer_count(), 0);
        assert!(device.buffer(buffer).is_none());
    }

    #[test]
    #[should_panic]
    fn binding_a_destroyed_buffer_panics() {
        let mut device = RecordingDevice::new();
        let buffer = device.create_buffer(BufferKind::Vertex, BufferUsage::Dynamic, "vertices");
        device.destroy_buffer(buffer);
        device.bind_vertex_buffer(buffer, VertexFormat::new(3, 0, 0, 0));
    }
}
