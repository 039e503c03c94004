// renderer/material.rs
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::asset::AssetCache;
use crate::renderer::shader::ShaderTechnique;
use crate::renderer::texture::TextureId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

/// Texture units a material can populate. The discriminant is the unit index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureUnit {
    Main = 0,
    Secondary = 1,
}

impl TextureUnit {
    pub const ALL: [TextureUnit; 2] = [TextureUnit::Main, TextureUnit::Secondary];

    pub const fn index(self) -> u32 {
        self as u32
    }
}

pub type TextureUnitMap = BTreeMap<TextureUnit, TextureId>;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderMaterial {
    pub name: String,
    pub technique: ShaderTechnique,
    pub texture_units: TextureUnitMap,
}

impl RenderMaterial {
    pub fn new(name: &str, technique: ShaderTechnique) -> Self {
        Self {
            name: name.to_string(),
            technique,
            texture_units: TextureUnitMap::new(),
        }
    }

    pub fn with_texture(mut self, unit: TextureUnit, texture: TextureId) -> Self {
        self.texture_units.insert(unit, texture);
        self
    }

    /// The unit map bound when no material is active.
    pub fn default_texture_units() -> TextureUnitMap {
        let mut map = TextureUnitMap::new();
        map.insert(TextureUnit::Main, TextureId(0));
        map
    }
}

pub trait MaterialLookup {
    fn material(&self, id: MaterialId) -> Option<Rc<RenderMaterial>>;
}

/// Materials are handed out as shared pointers so the draw loop can detect
/// a material change by pointer identity.
pub struct MaterialStore {
    materials: AssetCache<Rc<RenderMaterial>>,
}

impl MaterialStore {
    pub fn new() -> Self {
        Self {
            materials: AssetCache::new(),
        }
    }

    pub fn add(&mut self, material: RenderMaterial) -> MaterialId {
        log::debug!("Registered material {}", material.name);
        MaterialId(self.materials.insert(Rc::new(material)))
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

impl Default for MaterialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MaterialLookup for MaterialStore {
    fn material(&self, id: MaterialId) -> Option<Rc<RenderMaterial>> {
        self.materials.get(id.0).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_share_the_same_allocation() {
        let mut store = MaterialStore::new();
        let id = store.add(
            RenderMaterial::new("brick", ShaderTechnique::SimpleLit)
                .with_texture(TextureUnit::Main, TextureId(3)),
        );

        let a = store.material(id).unwrap();
        let b = store.material(id).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(a.texture_units.get(&TextureUnit::Main), Some(&TextureId(3)));
    }

    #[test]
    fn unknown_material_is_none() {
        let store = MaterialStore::new();
        assert!(store.material(MaterialId(9)).is_none());
    }
}
