use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::renderer::device::RenderDevice;
use crate::renderer::rendermodel::gpu_batch::{GpuBatch, GpuBatchId};
use crate::renderer::rendermodel::keys::{BatchGroupKey, MatrixBatchItemKey, MatrixBatchKey};
use crate::renderer::rendermodel::matrix_batch::{MatrixBatch, MatrixBatchItem};
use crate::renderer::rendermodel::object_id::ObjectIdEncoding;
use crate::renderer::shader::ShaderSpec;
use crate::settings::{BatchingSettings, BufferUsage};

/// Geometry sharing one shader, material, draw mode and line width.
///
/// Matrix batches are assigned to GPU batches as they appear: a GPU batch
/// with spare slots sits in `waiting`, one at capacity in `full`. Each
/// matrix batch lives in exactly one GPU batch.
///
/// Hidden objects are tracked per matrix batch; a matrix batch draws only
/// while none of the objects sharing its transform is hidden.
#[derive(Debug)]
pub struct BatchGroup {
    key: BatchGroupKey,
    shader: ShaderSpec,
    capacity: u32,
    encoding: ObjectIdEncoding,
    usage: BufferUsage,
    matrix_batches: BTreeMap<MatrixBatchKey, MatrixBatch>,
    hidden: BTreeMap<MatrixBatchKey, BTreeSet<u32>>,
    gpu_batches: BTreeMap<GpuBatchId, GpuBatch>,
    waiting: BTreeSet<GpuBatchId>,
    full: BTreeSet<GpuBatchId>,
    matrix_to_gpu: HashMap<MatrixBatchKey, GpuBatchId>,
    next_gpu_batch: u32,
}

impl BatchGroup {
    pub fn new(key: BatchGroupKey, shader: ShaderSpec, settings: &BatchingSettings) -> Self {
        debug_assert_eq!(key.shader, shader.id);
        Self {
            key,
            shader,
            capacity: settings.effective_capacity(shader.max_batched_items),
            encoding: ObjectIdEncoding::for_capacity(shader.max_batched_items),
            usage: settings.buffer_usage,
            matrix_batches: BTreeMap::new(),
            hidden: BTreeMap::new(),
            gpu_batches: BTreeMap::new(),
            waiting: BTreeSet::new(),
            full: BTreeSet::new(),
            matrix_to_gpu: HashMap::new(),
            next_gpu_batch: 0,
        }
    }

    pub fn key(&self) -> &BatchGroupKey {
        &self.key
    }

    pub fn shader(&self) -> &ShaderSpec {
        &self.shader
    }

    /// Matrix batches per GPU batch.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn encoding(&self) -> ObjectIdEncoding {
        self.encoding
    }

    pub fn matrix_batch(&self, key: &MatrixBatchKey) -> Option<&MatrixBatch> {
        self.matrix_batches.get(key)
    }

    pub fn matrix_batches(&self) -> impl Iterator<Item = (&MatrixBatchKey, &MatrixBatch)> {
        self.matrix_batches.iter()
    }

    pub fn matrix_batch_count(&self) -> usize {
        self.matrix_batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrix_batches.is_empty()
    }

    pub fn gpu_batches(&self) -> impl Iterator<Item = &GpuBatch> {
        self.gpu_batches.values()
    }

    pub fn gpu_batch_count(&self) -> usize {
        self.gpu_batches.len()
    }

    pub fn waiting_gpu_batch_count(&self) -> usize {
        self.waiting.len()
    }

    pub fn full_gpu_batch_count(&self) -> usize {
        self.full.len()
    }

    pub fn gpu_batch_for(&self, key: &MatrixBatchKey) -> Option<&GpuBatch> {
        self.matrix_to_gpu
            .get(key)
            .and_then(|id| self.gpu_batches.get(id))
    }

    pub fn is_matrix_batch_drawable(&self, key: &MatrixBatchKey) -> bool {
        self.matrix_batches.contains_key(key) && !self.hidden.contains_key(key)
    }

    /// Marks `object_id` hidden or shown within the matrix batch at `key`.
    pub fn set_object_hidden(&mut self, key: &MatrixBatchKey, object_id: u32, hidden: bool) {
        if !self.matrix_batches.contains_key(key) {
            return;
        }

        if hidden {
            self.hidden.entry(*key).or_default().insert(object_id);
        } else {
            self.forget_hidden(key, object_id);
        }
    }

    fn forget_hidden(&mut self, key: &MatrixBatchKey, object_id: u32) {
        if let Some(objects) = self.hidden.get_mut(key) {
            objects.remove(&object_id);
            if objects.is_empty() {
                self.hidden.remove(key);
            }
        }
    }

    /// Returns the item for writing, creating the matrix batch and item as
    /// needed. The owning GPU batch is marked for re-upload.
    pub fn create_or_fetch_matrix_batch_item(
        &mut self,
        matrix_key: MatrixBatchKey,
        item_key: MatrixBatchItemKey,
    ) -> &mut MatrixBatchItem {
        if !self.matrix_batches.contains_key(&matrix_key) {
            self.assign_to_gpu_batch(matrix_key);
        }
        self.mark_dirty(&matrix_key);

        self.matrix_batches
            .entry(matrix_key)
            .or_default()
            .create_or_fetch_item(item_key)
    }

    /// Removes an item, dropping its matrix batch when that empties.
    /// Returns false if the item did not exist.
    pub fn remove_matrix_batch_item(
        &mut self,
        device: &mut dyn RenderDevice,
        matrix_key: &MatrixBatchKey,
        item_key: &MatrixBatchItemKey,
    ) -> bool {
        let Some(batch) = self.matrix_batches.get_mut(matrix_key) else {
            return false;
        };
        if batch.remove_item(item_key).is_none() {
            return false;
        }

        let object_id = item_key.object_id;
        let object_left = batch.items().any(|(key, _)| key.object_id == object_id);
        let emptied = batch.is_empty();
        if !object_left {
            self.forget_hidden(matrix_key, object_id);
        }

        if emptied {
            self.remove_matrix_batch(device, matrix_key);
        } else {
            self.mark_dirty(matrix_key);
        }
        true
    }

    fn remove_matrix_batch(&mut self, device: &mut dyn RenderDevice, key: &MatrixBatchKey) {
        self.matrix_batches.remove(key);
        self.hidden.remove(key);

        let id = match self.matrix_to_gpu.remove(key) {
            Some(id) => id,
            None => panic!("{:?} was not assigned to a GPU batch", key),
        };
        let gpu = match self.gpu_batches.get_mut(&id) {
            Some(gpu) => gpu,
            None => panic!("{:?} refers to missing {:?}", key, id),
        };
        gpu.remove_member(key);

        if gpu.is_empty() {
            gpu.destroy(device);
            self.gpu_batches.remove(&id);
            self.waiting.remove(&id);
            self.full.remove(&id);
            log::trace!("Released {:?} from {:?}", id, self.key);
        } else if self.full.remove(&id) {
            self.waiting.insert(id);
        }
    }

    fn assign_to_gpu_batch(&mut self, key: MatrixBatchKey) {
        let id = match self.waiting.iter().next().copied() {
            Some(id) => id,
            None => {
                let id = GpuBatchId(self.next_gpu_batch);
                self.next_gpu_batch += 1;
                self.gpu_batches.insert(
                    id,
                    GpuBatch::new(id, self.capacity, self.shader.max_batched_items.max(1)),
                );
                self.waiting.insert(id);
                log::trace!("Opened {:?} for {:?}", id, self.key);
                id
            }
        };

        let gpu = match self.gpu_batches.get_mut(&id) {
            Some(gpu) => gpu,
            None => panic!("waiting list refers to missing {:?}", id),
        };
        gpu.add_member(key);
        if gpu.is_full() {
            self.waiting.remove(&id);
            self.full.insert(id);
        }
        self.matrix_to_gpu.insert(key, id);
    }

    fn mark_dirty(&mut self, key: &MatrixBatchKey) {
        if let Some(gpu) = self
            .matrix_to_gpu
            .get(key)
            .and_then(|id| self.gpu_batches.get_mut(id))
        {
            gpu.mark_dirty();
        }
    }

    /// Uploads every GPU batch whose members changed since its last upload.
    pub fn ensure_uploaded(&mut self, device: &mut dyn RenderDevice) {
        let format = self.shader.vertex_format;
        for gpu in self.gpu_batches.values_mut() {
            if gpu.needs_upload() {
                gpu.upload(
                    device,
                    self.usage,
                    format,
                    self.encoding,
                    &self.matrix_batches,
                );
            }
        }
    }

    pub fn draw(&mut self, device: &mut dyn RenderDevice) {
        self.ensure_uploaded(device);

        let format = self.shader.vertex_format;
        let hidden = &self.hidden;
        for gpu in self.gpu_batches.values() {
            gpu.draw(
                device,
                format,
                self.key.draw_mode,
                self.key.draw_width(),
                |key| !hidden.contains_key(key),
            );
        }
    }

    pub fn destroy(&mut self, device: &mut dyn RenderDevice) {
        for gpu in self.gpu_batches.values_mut() {
            gpu.destroy(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::device::RecordingDevice;
    use crate::renderer::geometry::{DrawMode, GeometrySection};
    use crate::renderer::material::MaterialId;
    use crate::renderer::shader::{ShaderId, VertexFormat};
    use glam::{Mat4, Vec3};

    fn shader(max_batched_items: u32) -> ShaderSpec {
        ShaderSpec {
            id: ShaderId(0),
            vertex_format: VertexFormat::new(4, 0, 4, 0),
            max_batched_items,
        }
    }

    fn group(max_batched_items: u32) -> BatchGroup {
        BatchGroup::new(
            BatchGroupKey::new(ShaderId(0), MaterialId(0), DrawMode::Triangles, 1.0),
            shader(max_batched_items),
            &BatchingSettings::default(),
        )
    }

    fn insert(group: &mut BatchGroup, object: u32, x: f32) -> MatrixBatchKey {
        let matrix = Mat4::from_translation(Vec3::new(x, 0.0, 0.0));
        let mut section = GeometrySection::new(*group.shader(), MaterialId(0), matrix);
        section.add_positions(&[Vec3::ZERO, Vec3::X, Vec3::Y]);
        section.add_index_triangle(0, 1, 2);

        let key = MatrixBatchKey::new(&matrix);
        group
            .create_or_fetch_matrix_batch_item(key, MatrixBatchItemKey::new(object, 0))
            .fill_from(&section);
        key
    }

    #[test]
    fn gpu_batches_fill_then_open_new_ones() {
        let mut group = group(2);
        for object in 0..5 {
            insert(&mut group, object, object as f32);
        }

        assert_eq!(group.gpu_batch_count(), 3);
        assert_eq!(group.full_gpu_batch_count(), 2);
        assert_eq!(group.waiting_gpu_batch_count(), 1);
        assert!(group.gpu_batches().all(|gpu| gpu.len() as u32 <= gpu.capacity()));
    }

    #[test]
    fn removing_from_a_full_batch_makes_it_wait_again() {
        let mut device = RecordingDevice::new();
        let mut group = group(2);
        let first = insert(&mut group, 0, 0.0);
        insert(&mut group, 1, 1.0);
        assert_eq!(group.full_gpu_batch_count(), 1);

        assert!(group.remove_matrix_batch_item(&mut device, &first, &MatrixBatchItemKey::new(0, 0)));
        assert_eq!(group.full_gpu_batch_count(), 0);
        assert_eq!(group.waiting_gpu_batch_count(), 1);
        assert!(group.matrix_batch(&first).is_none());
    }

    #[test]
    fn emptied_gpu_batches_release_their_buffers() {
        let mut device = RecordingDevice::new();
        let mut group = group(8);
        let key = insert(&mut group, 0, 0.0);
        group.draw(&mut device);
        assert_eq!(device.live_buffer_count(), 3);

        group.remove_matrix_batch_item(&mut device, &key, &MatrixBatchItemKey::new(0, 0));

        assert!(group.is_empty());
        assert_eq!(group.gpu_batch_count(), 0);
        assert_eq!(device.live_buffer_count(), 0);
    }

    #[test]
    fn unknown_items_are_not_removed() {
        let mut device = RecordingDevice::new();
        let mut group = group(8);
        let key = insert(&mut group, 0, 0.0);

        assert!(!group.remove_matrix_batch_item(&mut device, &key, &MatrixBatchItemKey::new(9, 0)));
        assert!(!group.remove_matrix_batch_item(
            &mut device,
            &MatrixBatchKey::new(&Mat4::ZERO),
            &MatrixBatchItemKey::new(0, 0)
        ));
        assert_eq!(group.matrix_batch_count(), 1);
    }

    #[test]
    fn clean_groups_are_not_uploaded_again() {
        let mut device = RecordingDevice::new();
        let mut group = group(8);
        let key = insert(&mut group, 0, 0.0);

        group.draw(&mut device);
        group.set_object_hidden(&key, 0, true);
        group.draw(&mut device);

        let gpu = group.gpu_batch_for(&key).unwrap();
        assert_eq!(gpu.upload_count(), 1);
        assert!(!group.is_matrix_batch_drawable(&key));
    }

    #[test]
    fn matrix_batches_stay_hidden_until_every_hider_is_gone() {
        let mut device = RecordingDevice::new();
        let mut group = group(8);
        let key = insert(&mut group, 0, 0.0);
        insert(&mut group, 1, 0.0);

        group.set_object_hidden(&key, 0, true);
        group.set_object_hidden(&key, 1, true);
        group.set_object_hidden(&key, 0, false);
        assert!(!group.is_matrix_batch_drawable(&key));

        group.remove_matrix_batch_item(&mut device, &key, &MatrixBatchItemKey::new(1, 0));
        assert!(group.is_matrix_batch_drawable(&key));
    }
}
