use std::borrow::Cow;
use std::collections::HashMap;

use crate::asset::AssetCache;
use crate::renderer::vertex::AttributeType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub u16);

/// Per-vertex float component counts a shader expects for each attribute.
/// Zero means the shader does not consume that attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VertexFormat {
    pub position: u8,
    pub normal: u8,
    pub color: u8,
    pub texture_coordinate: u8,
}

impl VertexFormat {
    pub const fn new(position: u8, normal: u8, color: u8, texture_coordinate: u8) -> Self {
        Self {
            position,
            normal,
            color,
            texture_coordinate,
        }
    }

    pub const fn components(&self, att: AttributeType) -> usize {
        match att {
            AttributeType::Position => self.position as usize,
            AttributeType::Normal => self.normal as usize,
            AttributeType::Color => self.color as usize,
            AttributeType::TextureCoordinate => self.texture_coordinate as usize,
        }
    }

    pub const fn total_components(&self) -> usize {
        self.position as usize
            + self.normal as usize
            + self.color as usize
            + self.texture_coordinate as usize
    }

    pub const fn stride_bytes(&self) -> usize {
        self.total_components() * std::mem::size_of::<f32>()
    }

    /// Float offset of an attribute within one interleaved vertex.
    pub fn offset_of(&self, att: AttributeType) -> usize {
        AttributeType::ALL
            .iter()
            .take_while(|other| **other != att)
            .map(|other| self.components(*other))
            .sum()
    }

    pub fn is_valid(&self) -> bool {
        self.position > 0 && AttributeType::ALL.iter().all(|att| self.components(*att) <= 4)
    }
}

/// What the batching core needs to know about a shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderSpec {
    pub id: ShaderId,
    pub vertex_format: VertexFormat,
    /// Matrix slots the shader's local uniform block provides. 1 means the
    /// shader does not batch.
    pub max_batched_items: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderTechnique {
    Default,
    UnlitPerVertexColor,
    SimpleLit,
}

pub trait ShaderLookup {
    fn shader(&self, id: ShaderId) -> Option<ShaderSpec>;
}

/// Maps a material's technique to the shader used by the current render mode.
pub trait ShaderPalette {
    fn shader(&self, technique: ShaderTechnique) -> Option<ShaderId>;
}

pub struct ShaderProgram {
    pub name: String,
    pub spec: ShaderSpec,
    pub source: Cow<'static, str>,
}

pub struct ShaderStore {
    programs: AssetCache<ShaderProgram>,
}

impl ShaderStore {
    pub const SIMPLE_LIT: ShaderId = ShaderId(0);
    pub const UNLIT_PER_VERTEX_COLOR: ShaderId = ShaderId(1);

    pub fn new() -> Self {
        Self {
            programs: AssetCache::new(),
        }
    }

    pub fn with_builtin_shaders() -> Self {
        let mut store = Self::new();

        let simple_lit = store.add(
            "SimpleLit",
            VertexFormat::new(4, 3, 4, 2),
            8,
            include_str!("shaders/simple_lit.wgsl"),
        );
        let unlit = store.add(
            "UnlitPerVertexColor",
            VertexFormat::new(4, 0, 4, 0),
            8,
            include_str!("shaders/unlit_per_vertex_color.wgsl"),
        );

        debug_assert_eq!(simple_lit, Self::SIMPLE_LIT);
        debug_assert_eq!(unlit, Self::UNLIT_PER_VERTEX_COLOR);
        store
    }

    pub fn add(
        &mut self,
        name: &str,
        vertex_format: VertexFormat,
        max_batched_items: u32,
        source: impl Into<Cow<'static, str>>,
    ) -> ShaderId {
        assert!(
            vertex_format.is_valid(),
            "shader {name} has an invalid vertex format {vertex_format:?}"
        );

        let id = ShaderId(self.programs.len() as u16);
        self.programs.insert(ShaderProgram {
            name: name.to_string(),
            spec: ShaderSpec {
                id,
                vertex_format,
                max_batched_items: max_batched_items.max(1),
            },
            source: source.into(),
        });
        log::debug!("Registered shader {} as {:?}", name, id);
        id
    }

    pub fn program(&self, id: ShaderId) -> Option<&ShaderProgram> {
        self.programs.get(id.0 as u32)
    }

    pub fn programs(&self) -> impl Iterator<Item = &ShaderProgram> {
        self.programs.iter().map(|(_, program)| program)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

impl Default for ShaderStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderLookup for ShaderStore {
    fn shader(&self, id: ShaderId) -> Option<ShaderSpec> {
        self.program(id).map(|program| program.spec)
    }
}

pub struct DefaultShaderPalette {
    shaders: HashMap<ShaderTechnique, ShaderId>,
}

impl DefaultShaderPalette {
    pub fn new() -> Self {
        Self {
            shaders: HashMap::new(),
        }
    }

    /// Palette for the shaders registered by [`ShaderStore::with_builtin_shaders`].
    pub fn builtin() -> Self {
        let mut palette = Self::new();
        palette.set(ShaderTechnique::Default, ShaderStore::SIMPLE_LIT);
        palette.set(ShaderTechnique::SimpleLit, ShaderStore::SIMPLE_LIT);
        palette.set(
            ShaderTechnique::UnlitPerVertexColor,
            ShaderStore::UNLIT_PER_VERTEX_COLOR,
        );
        palette
    }

    pub fn set(&mut self, technique: ShaderTechnique, shader: ShaderId) {
        self.shaders.insert(technique, shader);
    }
}

impl Default for DefaultShaderPalette {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ShaderPalette for DefaultShaderPalette {
    fn shader(&self, technique: ShaderTechnique) -> Option<ShaderId> {
        self.shaders
            .get(&technique)
            .or_else(|| self.shaders.get(&ShaderTechnique::Default))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_shaders_have_expected_formats() {
        let store = ShaderStore::with_builtin_shaders();

        let unlit = store.shader(ShaderStore::UNLIT_PER_VERTEX_COLOR).unwrap();
        assert_eq!(unlit.vertex_format, VertexFormat::new(4, 0, 4, 0));
        assert_eq!(unlit.max_batched_items, 8);

        let lit = store.shader(ShaderStore::SIMPLE_LIT).unwrap();
        assert_eq!(lit.vertex_format.total_components(), 13);
    }

    #[test]
    fn attribute_offsets_skip_absent_attributes() {
        let format = VertexFormat::new(4, 0, 4, 2);
        assert_eq!(format.offset_of(AttributeType::Position), 0);
        assert_eq!(format.offset_of(AttributeType::Color), 4);
        assert_eq!(format.offset_of(AttributeType::TextureCoordinate), 8);
        assert_eq!(format.stride_bytes(), 40);
    }

    #[test]
    fn palette_falls_back_to_default_technique() {
        let mut palette = DefaultShaderPalette::new();
        palette.set(ShaderTechnique::Default, ShaderId(3));

        assert_eq!(palette.shader(ShaderTechnique::SimpleLit), Some(ShaderId(3)));
    }
}
