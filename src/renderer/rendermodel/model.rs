use std::collections::{BTreeMap, HashMap};

use crate::renderer::device::{BufferId, BufferKind, RenderDevice};
use crate::renderer::geometry::GeometrySection;
use crate::renderer::rendermodel::batch_group::BatchGroup;
use crate::renderer::rendermodel::flags::ObjectFlags;
use crate::renderer::rendermodel::keys::{
    BatchGroupKey, MatrixBatchItemKey, MatrixBatchKey, PassKey, RenderModelKey,
};
use crate::renderer::rendermodel::matrix_batch::{MatrixBatch, MatrixBatchItem};
use crate::renderer::rendermodel::pass::RenderModelPass;
use crate::renderer::uniforms::{DrawParams, GlobalShaderUniforms, GLOBAL_UNIFORM_BINDING};
use crate::renderer::RenderLookups;
use crate::settings::{BufferUsage, RenderSettings};

const LOG_TARGET: &str = "calliper_render::render_model";

/// Counts of live containers, cheapest way to check the tree's shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderModelStats {
    pub objects: usize,
    pub passes: usize,
    pub batch_groups: usize,
    pub matrix_batches: usize,
    pub items: usize,
    pub gpu_batches: usize,
}

/// Owns every pass, batch group, matrix batch and item, and every GPU
/// buffer behind them.
///
/// Objects are registered with [`RenderModel::update_object`] and addressed
/// afterwards only by their numeric id. Containers are created on demand
/// and dropped as soon as their last child goes, so the tree never holds
/// empty nodes. GPU buffers are written lazily by [`RenderModel::draw`].
pub struct RenderModel<D: RenderDevice> {
    device: D,
    lookups: RenderLookups,
    settings: RenderSettings,
    passes: BTreeMap<PassKey, RenderModelPass>,
    stored_objects: HashMap<u32, Vec<RenderModelKey>>,
    object_flags: HashMap<u32, ObjectFlags>,
    global_uniforms: Option<BufferId>,
    draw_params: Option<DrawParams>,
}

impl<D: RenderDevice> RenderModel<D> {
    pub fn new(device: D, lookups: RenderLookups, settings: RenderSettings) -> Self {
        Self {
            device,
            lookups,
            settings,
            passes: BTreeMap::new(),
            stored_objects: HashMap::new(),
            object_flags: HashMap::new(),
            global_uniforms: None,
            draw_params: None,
        }
    }

    /// Replaces everything registered for `object_id` with `sections`.
    ///
    /// Empty sections are skipped but still consume a section index. If every
    /// section is empty the object simply ends up unregistered.
    pub fn update_object(&mut self, object_id: u32, pass_index: i32, sections: &[GeometrySection]) {
        self.remove_object(object_id);

        if sections.iter().all(GeometrySection::is_empty) {
            log::trace!(target: LOG_TARGET, "Object {} has no geometry", object_id);
            return;
        }

        let pass_key = PassKey(pass_index);
        let mut keys = Vec::with_capacity(sections.len());

        for (section_id, section) in sections.iter().enumerate() {
            if section.is_empty() {
                continue;
            }
            debug_assert!(
                section.is_consistent(),
                "object {object_id} section {section_id} has partial vertices or out of range indices"
            );

            let key = RenderModelKey {
                pass: pass_key,
                batch_group: BatchGroupKey::for_section(section),
                matrix_batch: MatrixBatchKey::new(section.model_to_world()),
                item: MatrixBatchItemKey::new(object_id, section_id as u32),
            };

            let pass = self.passes.entry(pass_key).or_insert_with(|| {
                log::trace!(target: LOG_TARGET, "Created pass {:?}", pass_key);
                RenderModelPass::new()
            });
            let group = pass.create_or_fetch_batch_group(
                key.batch_group,
                *section.shader(),
                &self.settings.batching,
            );

            group
                .create_or_fetch_matrix_batch_item(key.matrix_batch, key.item)
                .fill_from(section);

            keys.push(key);
        }

        log::trace!(
            target: LOG_TARGET,
            "Registered object {} with {} sections in {:?}",
            object_id,
            keys.len(),
            pass_key
        );
        self.stored_objects.insert(object_id, keys);
        self.object_flags.insert(object_id, ObjectFlags::empty());
    }

    /// Detaches every item registered for `object_id`. Unknown ids are
    /// ignored. The object's flags are always dropped.
    pub fn remove_object(&mut self, object_id: u32) {
        if let Some(keys) = self.stored_objects.remove(&object_id) {
            for key in &keys {
                self.clean_matrix_batch_item(key);
            }
            log::trace!(target: LOG_TARGET, "Removed object {}", object_id);
        }

        self.object_flags.remove(&object_id);
    }

    fn clean_matrix_batch_item(&mut self, key: &RenderModelKey) {
        let pass = match self.passes.get_mut(&key.pass) {
            Some(pass) => pass,
            None => panic!("{:?} is registered but its pass does not exist", key),
        };
        let group = match pass.batch_group_mut(&key.batch_group) {
            Some(group) => group,
            None => panic!("{:?} is registered but its batch group does not exist", key),
        };

        assert!(
            group.remove_matrix_batch_item(&mut self.device, &key.matrix_batch, &key.item),
            "{:?} is registered but its item does not exist",
            key
        );

        if group.is_empty() {
            pass.remove_batch_group(&mut self.device, &key.batch_group);
            log::trace!(target: LOG_TARGET, "Dropped batch group {:?}", key.batch_group);
        }

        if pass.is_empty() {
            self.passes.remove(&key.pass);
            log::trace!(target: LOG_TARGET, "Dropped pass {:?}", key.pass);
        }
    }

    /// ORs `flags` into the object's flags. Unregistered objects are ignored.
    pub fn set_object_flags(&mut self, object_id: u32, flags: ObjectFlags) {
        let Some(old) = self.object_flags.get(&object_id).copied() else {
            return;
        };
        let new = old | flags;
        self.object_flags.insert(object_id, new);

        if !old.is_hidden() && new.is_hidden() {
            self.set_object_hidden(object_id, true);
        }
    }

    /// Clears `flags` from the object's flags. Unregistered objects are ignored.
    pub fn clear_object_flags(&mut self, object_id: u32, flags: ObjectFlags) {
        let Some(old) = self.object_flags.get(&object_id).copied() else {
            return;
        };
        let new = old - flags;
        self.object_flags.insert(object_id, new);

        if old.is_hidden() && !new.is_hidden() {
            self.set_object_hidden(object_id, false);
        }
    }

    pub fn get_object_flags(&self, object_id: u32) -> ObjectFlags {
        self.object_flags
            .get(&object_id)
            .copied()
            .unwrap_or_default()
    }

    fn set_object_hidden(&mut self, object_id: u32, hidden: bool) {
        let keys = match self.stored_objects.get(&object_id) {
            Some(keys) => keys,
            None => panic!("object {} has flags but no registration", object_id),
        };

        for key in keys {
            if let Some(group) = self
                .passes
                .get_mut(&key.pass)
                .and_then(|pass| pass.batch_group_mut(&key.batch_group))
            {
                group.set_object_hidden(&key.matrix_batch, object_id, hidden);
            }
        }
        log::trace!(target: LOG_TARGET, "Object {} hidden: {}", object_id, hidden);
    }

    /// Draws every pass in ascending order.
    pub fn draw(&mut self, params: &DrawParams) {
        if self.draw_params.as_ref() != Some(params) {
            self.draw_params = Some(*params);
            self.upload_global_shader_uniforms(params);
        }

        self.device.bind_vertex_array();

        if let Some(buffer) = self.global_uniforms {
            self.device.bind_uniform_range(
                GLOBAL_UNIFORM_BINDING,
                buffer,
                0,
                std::mem::size_of::<GlobalShaderUniforms>() as u64,
            );
        }

        for pass in self.passes.values_mut() {
            pass.draw_all_batch_groups(&mut self.device, &self.lookups);
        }

        self.device.release_vertex_array();
    }

    fn upload_global_shader_uniforms(&mut self, params: &DrawParams) {
        let device = &mut self.device;
        let buffer = *self.global_uniforms.get_or_insert_with(|| {
            device.create_buffer(
                BufferKind::Uniform,
                BufferUsage::Dynamic,
                "GlobalShaderUniforms",
            )
        });

        let uniforms = GlobalShaderUniforms::from_params(params);
        self.device
            .upload_buffer(buffer, bytemuck::bytes_of(&uniforms));
    }

    pub fn stats(&self) -> RenderModelStats {
        let mut stats = RenderModelStats {
            objects: self.stored_objects.len(),
            passes: self.passes.len(),
            ..Default::default()
        };

        for pass in self.passes.values() {
            for (_, group) in pass.batch_groups() {
                stats.batch_groups += 1;
                stats.matrix_batches += group.matrix_batch_count();
                stats.gpu_batches += group.gpu_batch_count();
                stats.items += group
                    .matrix_batches()
                    .map(|(_, batch)| batch.item_count())
                    .sum::<usize>();
            }
        }
        stats
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn pass(&self, key: PassKey) -> Option<&RenderModelPass> {
        self.passes.get(&key)
    }

    pub fn passes(&self) -> impl Iterator<Item = (&PassKey, &RenderModelPass)> {
        self.passes.iter()
    }

    pub fn batch_group(&self, pass: PassKey, key: &BatchGroupKey) -> Option<&BatchGroup> {
        self.pass(pass)?.batch_group(key)
    }

    pub fn matrix_batch(&self, key: &RenderModelKey) -> Option<&MatrixBatch> {
        self.batch_group(key.pass, &key.batch_group)?
            .matrix_batch(&key.matrix_batch)
    }

    pub fn item(&self, key: &RenderModelKey) -> Option<&MatrixBatchItem> {
        self.matrix_batch(key)?.item(&key.item)
    }

    /// Keys recorded for an object by its last update.
    pub fn object_keys(&self, object_id: u32) -> Option<&[RenderModelKey]> {
        self.stored_objects.get(&object_id).map(Vec::as_slice)
    }

    pub fn lookups(&self) -> &RenderLookups {
        &self.lookups
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

impl<D: RenderDevice> Drop for RenderModel<D> {
    fn drop(&mut self) {
        for pass in self.passes.values_mut() {
            pass.destroy(&mut self.device);
        }
        if let Some(buffer) = self.global_uniforms.take() {
            self.device.destroy_buffer(buffer);
        }
    }
}
