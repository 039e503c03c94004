use std::collections::BTreeMap;
use std::rc::Rc;

use crate::renderer::device::{GpuTexture, RenderDevice};
use crate::renderer::material::{RenderMaterial, TextureUnit};
use crate::renderer::rendermodel::batch_group::BatchGroup;
use crate::renderer::rendermodel::keys::BatchGroupKey;
use crate::renderer::shader::{ShaderId, ShaderSpec};
use crate::renderer::RenderLookups;
use crate::settings::BatchingSettings;

/// One logical pass over the scene.
#[derive(Debug, Default)]
pub struct RenderModelPass {
    batch_groups: BTreeMap<BatchGroupKey, BatchGroup>,
}

impl RenderModelPass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch_group(&self, key: &BatchGroupKey) -> Option<&BatchGroup> {
        self.batch_groups.get(key)
    }

    pub(crate) fn batch_group_mut(&mut self, key: &BatchGroupKey) -> Option<&mut BatchGroup> {
        self.batch_groups.get_mut(key)
    }

    pub(crate) fn create_or_fetch_batch_group(
        &mut self,
        key: BatchGroupKey,
        shader: ShaderSpec,
        settings: &BatchingSettings,
    ) -> &mut BatchGroup {
        self.batch_groups
            .entry(key)
            .or_insert_with(|| BatchGroup::new(key, shader, settings))
    }

    pub(crate) fn remove_batch_group(
        &mut self,
        device: &mut dyn RenderDevice,
        key: &BatchGroupKey,
    ) -> bool {
        match self.batch_groups.remove(key) {
            Some(mut group) => {
                group.destroy(device);
                true
            }
            None => false,
        }
    }

    pub fn batch_groups(&self) -> impl Iterator<Item = (&BatchGroupKey, &BatchGroup)> {
        self.batch_groups.iter()
    }

    pub fn batch_group_count(&self) -> usize {
        self.batch_groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch_groups.is_empty()
    }

    /// Draws every batch group in key order. Programs are only switched when
    /// the shader differs from the previous group's, and textures only when
    /// the material does.
    pub fn draw_all_batch_groups(&mut self, device: &mut dyn RenderDevice, lookups: &RenderLookups) {
        let mut state = PassState::default();

        for (key, group) in self.batch_groups.iter_mut() {
            state.change_shader_if_different(device, key.shader);

            let material = lookups.materials.material(key.material);
            state.change_material_if_different(device, lookups, material);

            group.draw(device);
        }

        state.release(device);
    }

    pub(crate) fn destroy(&mut self, device: &mut dyn RenderDevice) {
        for group in self.batch_groups.values_mut() {
            group.destroy(device);
        }
    }
}

#[derive(Default)]
struct PassState {
    shader: Option<ShaderId>,
    material: Option<Option<Rc<RenderMaterial>>>,
    textures: Vec<(TextureUnit, GpuTexture)>,
}

impl PassState {
    fn change_shader_if_different(&mut self, device: &mut dyn RenderDevice, shader: ShaderId) {
        if self.shader == Some(shader) {
            return;
        }

        if let Some(previous) = self.shader.take() {
            device.release_program(previous);
        }
        device.bind_program(shader);
        self.shader = Some(shader);
    }

    fn change_material_if_different(
        &mut self,
        device: &mut dyn RenderDevice,
        lookups: &RenderLookups,
        material: Option<Rc<RenderMaterial>>,
    ) {
        let unchanged = match (&self.material, &material) {
            (Some(Some(current)), Some(next)) => Rc::ptr_eq(current, next),
            (Some(None), None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }

        self.release_textures(device);

        let units = match &material {
            Some(material) => material.texture_units.clone(),
            None => RenderMaterial::default_texture_units(),
        };
        for (unit, texture_id) in units {
            match lookups.textures.texture(texture_id) {
                Some(texture) => {
                    device.bind_texture(unit, texture);
                    self.textures.push((unit, texture));
                }
                None => log::debug!("Texture {:?} for unit {:?} is not loaded", texture_id, unit),
            }
        }

        self.material = Some(material);
    }

    fn release_textures(&mut self, device: &mut dyn RenderDevice) {
        for (unit, texture) in self.textures.drain(..) {
            device.release_texture(unit, texture);
        }
    }

    fn release(mut self, device: &mut dyn RenderDevice) {
        self.release_textures(device);
        if let Some(shader) = self.shader.take() {
            device.release_program(shader);
        }
    }
}
