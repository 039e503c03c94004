//! A set of matrix batches drawn from one set of GPU buffers.

use std::collections::BTreeMap;
use std::ops::Range;

use glam::Mat4;

use crate::renderer::device::{BufferId, BufferKind, RenderDevice};
use crate::renderer::geometry::DrawMode;
use crate::renderer::rendermodel::keys::MatrixBatchKey;
use crate::renderer::rendermodel::matrix_batch::MatrixBatch;
use crate::renderer::rendermodel::object_id::ObjectIdEncoding;
use crate::renderer::shader::VertexFormat;
use crate::renderer::uniforms::{LOCAL_UNIFORM_BINDING, MATRIX_BYTES};
use crate::renderer::vertex::AttributeType;
use crate::settings::BufferUsage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuBatchId(pub u32);

#[derive(Debug, Clone, Copy)]
struct GpuBatchBuffers {
    vertices: BufferId,
    indices: BufferId,
    uniforms: BufferId,
}

/// Up to `capacity` matrix batches sharing one vertex, index and uniform
/// buffer. A member's position in `members` is its slot: the index of its
/// matrix in the uniform array and the id packed into its vertices.
#[derive(Debug)]
pub struct GpuBatch {
    id: GpuBatchId,
    capacity: u32,
    uniform_slots: u32,
    members: Vec<MatrixBatchKey>,
    index_ranges: Vec<Range<u32>>,
    buffers: Option<GpuBatchBuffers>,
    needs_upload: bool,
    uploads: usize,
}

impl GpuBatch {
    pub(crate) fn new(id: GpuBatchId, capacity: u32, uniform_slots: u32) -> Self {
        debug_assert!(capacity >= 1 && capacity <= uniform_slots);
        Self {
            id,
            capacity,
            uniform_slots,
            members: Vec::with_capacity(capacity as usize),
            index_ranges: Vec::new(),
            buffers: None,
            needs_upload: true,
            uploads: 0,
        }
    }

    pub fn id(&self) -> GpuBatchId {
        self.id
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn members(&self) -> &[MatrixBatchKey] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() as u32 >= self.capacity
    }

    pub fn slot_of(&self, key: &MatrixBatchKey) -> Option<u32> {
        self.members.iter().position(|m| m == key).map(|i| i as u32)
    }

    pub fn needs_upload(&self) -> bool {
        self.needs_upload
    }

    /// Number of times this batch's buffers have been written.
    pub fn upload_count(&self) -> usize {
        self.uploads
    }

    pub fn vertex_buffer(&self) -> Option<BufferId> {
        self.buffers.map(|b| b.vertices)
    }

    pub fn index_buffer(&self) -> Option<BufferId> {
        self.buffers.map(|b| b.indices)
    }

    pub fn uniform_buffer(&self) -> Option<BufferId> {
        self.buffers.map(|b| b.uniforms)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.needs_upload = true;
    }

    pub(crate) fn add_member(&mut self, key: MatrixBatchKey) {
        assert!(
            !self.is_full(),
            "{:?} is already at its capacity of {}",
            self.id,
            self.capacity
        );
        self.members.push(key);
        self.needs_upload = true;
    }

    /// Later members shift down one slot, so the whole batch is re-uploaded.
    pub(crate) fn remove_member(&mut self, key: &MatrixBatchKey) -> bool {
        match self.members.iter().position(|m| m == key) {
            Some(index) => {
                self.members.remove(index);
                self.needs_upload = true;
                true
            }
            None => false,
        }
    }

    /// Rebuilds the interleaved vertex data, the globally numbered indices
    /// and the matrix array from the member matrix batches and writes them.
    pub(crate) fn upload(
        &mut self,
        device: &mut dyn RenderDevice,
        usage: BufferUsage,
        format: VertexFormat,
        encoding: ObjectIdEncoding,
        matrix_batches: &BTreeMap<MatrixBatchKey, MatrixBatch>,
    ) {
        let stride = format.total_components();
        let id_component = format.components(AttributeType::Position) - 1;

        let mut vertices: Vec<f32> = Vec::new();
        let mut indices: Vec<u32> = Vec::new();
        let mut matrices = vec![Mat4::IDENTITY.to_cols_array(); self.uniform_slots as usize];
        self.index_ranges.clear();

        for (slot, key) in self.members.iter().enumerate() {
            let matrix_batch = match matrix_batches.get(key) {
                Some(batch) => batch,
                None => panic!("{:?} has no matrix batch for member {:?}", self.id, key),
            };
            matrices[slot] = key.matrix().to_cols_array();

            let first_index = indices.len() as u32;
            for (_, item) in matrix_batch.items() {
                let base = (vertices.len() / stride) as u32;

                for vertex in 0..item.vertex_count() {
                    let start = vertices.len();
                    for att in AttributeType::ALL {
                        let components = format.components(att);
                        if components == 0 {
                            continue;
                        }

                        let data = item.attribute(att);
                        let from = vertex * components;
                        match data.get(from..from + components) {
                            Some(values) => vertices.extend_from_slice(values),
                            None => vertices.resize(vertices.len() + components, 0.0),
                        }
                    }

                    let tagged = &mut vertices[start + id_component];
                    *tagged = encoding.pack(*tagged, slot as u32);
                }

                indices.extend(item.indices().iter().map(|index| base + index));
            }
            self.index_ranges.push(first_index..indices.len() as u32);
        }

        let buffers = *self.buffers.get_or_insert_with(|| {
            log::debug!("Creating buffers for {:?}", self.id);
            GpuBatchBuffers {
                vertices: device.create_buffer(BufferKind::Vertex, usage, "BatchVertices"),
                indices: device.create_buffer(BufferKind::Index, usage, "BatchIndices"),
                uniforms: device.create_buffer(BufferKind::Uniform, usage, "BatchMatrices"),
            }
        });

        device.upload_buffer(buffers.vertices, bytemuck::cast_slice(&vertices));
        device.upload_buffer(buffers.indices, bytemuck::cast_slice(&indices));
        device.upload_buffer(buffers.uniforms, bytemuck::cast_slice(&matrices));

        self.needs_upload = false;
        self.uploads += 1;
    }

    /// Issues one draw per contiguous run of drawable members.
    pub(crate) fn draw(
        &self,
        device: &mut dyn RenderDevice,
        format: VertexFormat,
        mode: DrawMode,
        width: f32,
        is_drawable: impl Fn(&MatrixBatchKey) -> bool,
    ) {
        let Some(buffers) = self.buffers else {
            return;
        };
        if self.members.is_empty() {
            return;
        }

        device.bind_vertex_buffer(buffers.vertices, format);
        device.bind_index_buffer(buffers.indices);
        device.bind_uniform_range(
            LOCAL_UNIFORM_BINDING,
            buffers.uniforms,
            0,
            self.uniform_slots as u64 * MATRIX_BYTES,
        );

        let mut run: Option<Range<u32>> = None;
        for (key, range) in self.members.iter().zip(&self.index_ranges) {
            if !is_drawable(key) {
                flush_run(device, mode, width, run.take());
                continue;
            }

            run = match run {
                Some(current) => Some(current.start..range.end),
                None => Some(range.clone()),
            };
        }
        flush_run(device, mode, width, run);
    }

    pub(crate) fn destroy(&mut self, device: &mut dyn RenderDevice) {
        if let Some(buffers) = self.buffers.take() {
            log::debug!("Destroying buffers for {:?}", self.id);
            device.destroy_buffer(buffers.vertices);
            device.destroy_buffer(buffers.indices);
            device.destroy_buffer(buffers.uniforms);
        }
    }
}

fn flush_run(device: &mut dyn RenderDevice, mode: DrawMode, width: f32, run: Option<Range<u32>>) {
    if let Some(run) = run {
        if !run.is_empty() {
            device.draw_indexed(mode, width, run.start, run.end - run.start);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::device::{DeviceCommand, RecordingDevice};
    use crate::renderer::geometry::GeometrySection;
    use crate::renderer::material::MaterialId;
    use crate::renderer::rendermodel::keys::MatrixBatchItemKey;
    use crate::renderer::shader::{ShaderId, ShaderSpec};
    use glam::Vec3;

    const FORMAT: VertexFormat = VertexFormat::new(4, 0, 4, 0);

    fn matrix_batches(offsets: &[f32]) -> BTreeMap<MatrixBatchKey, MatrixBatch> {
        let mut batches = BTreeMap::new();
        for (object, x) in offsets.iter().enumerate() {
            let matrix = Mat4::from_translation(Vec3::new(*x, 0.0, 0.0));
            let mut section = GeometrySection::new(
                ShaderSpec {
                    id: ShaderId(0),
                    vertex_format: FORMAT,
                    max_batched_items: 8,
                },
                MaterialId(0),
                matrix,
            );
            section.add_positions(&[Vec3::ZERO, Vec3::X, Vec3::Y]);
            section.add_index_triangle(0, 1, 2);

            let mut batch = MatrixBatch::new();
            batch
                .create_or_fetch_item(MatrixBatchItemKey::new(object as u32, 0))
                .fill_from(&section);
            batches.insert(MatrixBatchKey::new(&matrix), batch);
        }
        batches
    }

    fn uploaded(offsets: &[f32]) -> (RecordingDevice, GpuBatch) {
        let batches = matrix_batches(offsets);
        let mut gpu = GpuBatch::new(GpuBatchId(0), 8, 8);
        for key in batches.keys() {
            gpu.add_member(*key);
        }

        let mut device = RecordingDevice::new();
        gpu.upload(
            &mut device,
            BufferUsage::Dynamic,
            FORMAT,
            ObjectIdEncoding::for_capacity(8),
            &batches,
        );
        (device, gpu)
    }

    #[test]
    fn indices_are_offset_by_preceding_vertices() {
        let (device, gpu) = uploaded(&[0.0, 1.0]);

        let indices = device.buffer(gpu.index_buffer().unwrap()).unwrap().as_u32();
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn uniform_array_holds_member_matrices_then_identity() {
        let (device, gpu) = uploaded(&[0.0, 5.0]);

        let floats = device.buffer(gpu.uniform_buffer().unwrap()).unwrap().as_f32();
        assert_eq!(floats.len(), 8 * 16);
        assert_eq!(floats[16 + 12], 5.0);
        assert_eq!(&floats[32..48], &Mat4::IDENTITY.to_cols_array());
    }

    #[test]
    fn hidden_members_split_the_draw() {
        let (mut device, gpu) = uploaded(&[0.0, 1.0, 2.0]);
        let hidden = gpu.members()[1];
        device.clear_commands();

        gpu.draw(&mut device, FORMAT, DrawMode::Triangles, 1.0, |key| *key != hidden);

        let draws: Vec<_> = device.draw_calls().cloned().collect();
        assert_eq!(
            draws,
            vec![
                DeviceCommand::DrawIndexed {
                    mode: DrawMode::Triangles,
                    width: 1.0,
                    first_index: 0,
                    index_count: 3
                },
                DeviceCommand::DrawIndexed {
                    mode: DrawMode::Triangles,
                    width: 1.0,
                    first_index: 6,
                    index_count: 3
                },
            ]
        );
    }

    #[test]
    #[should_panic]
    fn adding_past_capacity_panics() {
        let mut gpu = GpuBatch::new(GpuBatchId(0), 1, 8);
        gpu.add_member(MatrixBatchKey::new(&Mat4::IDENTITY));
        gpu.add_member(MatrixBatchKey::new(&Mat4::ZERO));
    }
}
