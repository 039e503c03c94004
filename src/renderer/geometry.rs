//! CPU-side mesh fragments handed to the render model.

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::renderer::material::{MaterialId, MaterialLookup};
use crate::renderer::shader::{ShaderId, ShaderLookup, ShaderPalette, ShaderSpec, VertexFormat};
use crate::renderer::vertex::{AttributeType, Vertex3d};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum DrawMode {
    #[default]
    Triangles,
    Lines,
    Points,
}

/// One draw-call-compatible piece of an object's geometry.
///
/// Attribute data is stored per stream with exactly the number of
/// components the target shader expects per vertex: extra source components
/// are dropped and missing ones are zero-filled. Indices are local to the
/// section.
#[derive(Debug, Clone)]
pub struct GeometrySection {
    attributes: [Vec<f32>; 4],
    indices: Vec<u32>,
    draw_mode: DrawMode,
    draw_width: f32,
    shader: ShaderSpec,
    material_id: MaterialId,
    model_to_world: Mat4,
}

fn append(list: &mut Vec<f32>, source: &[f32], component_count: usize) {
    if component_count < 1 || source.is_empty() {
        return;
    }

    let start = list.len();
    list.resize(start + component_count, 0.0);

    let copied = component_count.min(source.len());
    list[start..start + copied].copy_from_slice(&source[..copied]);
}

impl GeometrySection {
    pub fn new(shader: ShaderSpec, material_id: MaterialId, model_to_world: Mat4) -> Self {
        Self {
            attributes: Default::default(),
            indices: Vec::new(),
            draw_mode: DrawMode::Triangles,
            draw_width: 1.0,
            shader,
            material_id,
            model_to_world,
        }
    }

    /// Resolves material -> technique -> shader and builds a section for it.
    /// Returns `None` if the material or the resulting shader is unknown.
    pub fn for_material(
        shaders: &dyn ShaderLookup,
        materials: &dyn MaterialLookup,
        palette: &dyn ShaderPalette,
        material_id: MaterialId,
        model_to_world: Mat4,
    ) -> Option<Self> {
        let material = materials.material(material_id)?;
        let shader_id = palette.shader(material.technique)?;
        let shader = shaders.shader(shader_id)?;
        Some(Self::new(shader, material_id, model_to_world))
    }

    /// Appends one vertex's worth of `att` from `data`.
    pub fn add(&mut self, att: AttributeType, data: &[f32]) {
        let components = self.shader.vertex_format.components(att);
        append(&mut self.attributes[att.index()], data, components);
    }

    /// Appends a position with an implicit `w` of 1.
    pub fn add_position(&mut self, pos: Vec3) {
        self.add(AttributeType::Position, &pos.extend(1.0).to_array());
    }

    pub fn add_position4(&mut self, pos: Vec4) {
        self.add(AttributeType::Position, &pos.to_array());
    }

    pub fn add_positions(&mut self, positions: &[Vec3]) {
        let components = self.shader.vertex_format.position as usize;
        self.attributes[AttributeType::Position.index()].reserve(positions.len() * components);

        for pos in positions {
            self.add_position(*pos);
        }
    }

    pub fn add_normal(&mut self, normal: Vec3) {
        self.add(AttributeType::Normal, &normal.to_array());
    }

    pub fn add_color(&mut self, color: [f32; 4]) {
        self.add(AttributeType::Color, &color);
    }

    pub fn add_texture_coordinate(&mut self, uv: Vec2) {
        self.add(AttributeType::TextureCoordinate, &uv.to_array());
    }

    pub fn add_vertex(&mut self, vertex: &Vertex3d) {
        self.add_position(Vec3::from(vertex.pos));
        self.add_normal(Vec3::from(vertex.normal));
        self.add_color(vertex.color);
        self.add_texture_coordinate(Vec2::from(vertex.uv));
    }

    pub fn add_index(&mut self, index: u32) {
        self.indices.push(index);
    }

    pub fn add_index_line(&mut self, i0: u32, i1: u32) {
        self.indices.extend_from_slice(&[i0, i1]);
    }

    pub fn add_index_triangle(&mut self, i0: u32, i1: u32, i2: u32) {
        self.indices.extend_from_slice(&[i0, i1, i2]);
    }

    pub fn clear_attribute(&mut self, att: AttributeType) {
        self.attributes[att.index()].clear();
    }

    pub fn float_count(&self, att: AttributeType) -> usize {
        self.attributes[att.index()].len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Number of whole vertices stored for `att`; zero when the shader does
    /// not consume the attribute.
    pub fn attribute_count(&self, att: AttributeType) -> usize {
        match self.shader.vertex_format.components(att) {
            0 => 0,
            components => self.attributes[att.index()].len() / components,
        }
    }

    /// Positions are canonical for the vertex count.
    pub fn is_empty(&self) -> bool {
        self.attribute_count(AttributeType::Position) < 1 && self.index_count() < 1
    }

    /// Every populated stream holds whole vertices and every index addresses
    /// an existing position.
    pub fn is_consistent(&self) -> bool {
        let whole_vertices = AttributeType::ALL.iter().all(|att| {
            match self.shader.vertex_format.components(*att) {
                0 => self.attributes[att.index()].is_empty(),
                components => self.attributes[att.index()].len() % components == 0,
            }
        });

        let vertex_count = self.attribute_count(AttributeType::Position) as u32;
        whole_vertices && self.indices.iter().all(|index| *index < vertex_count)
    }

    pub fn vertex_data(&self, att: AttributeType) -> &[f32] {
        &self.attributes[att.index()]
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn has_normals(&self) -> bool {
        !self.attributes[AttributeType::Normal.index()].is_empty()
    }

    pub fn has_colors(&self) -> bool {
        !self.attributes[AttributeType::Color.index()].is_empty()
    }

    pub fn has_texture_coordinates(&self) -> bool {
        !self.attributes[AttributeType::TextureCoordinate.index()].is_empty()
    }

    /// Appends this section onto the output streams. Indices are offset by
    /// the prior length of `indices`. Returns the number of indices appended.
    pub fn consolidate(
        &self,
        positions: &mut Vec<f32>,
        normals: &mut Vec<f32>,
        colors: &mut Vec<f32>,
        texture_coordinates: &mut Vec<f32>,
        indices: &mut Vec<u32>,
    ) -> usize {
        positions.extend_from_slice(self.vertex_data(AttributeType::Position));
        normals.extend_from_slice(self.vertex_data(AttributeType::Normal));
        colors.extend_from_slice(self.vertex_data(AttributeType::Color));
        texture_coordinates.extend_from_slice(self.vertex_data(AttributeType::TextureCoordinate));

        let base = indices.len() as u32;
        indices.extend(self.indices.iter().map(|index| base + index));

        self.indices.len()
    }

    pub fn shader(&self) -> &ShaderSpec {
        &self.shader
    }

    pub fn shader_id(&self) -> ShaderId {
        self.shader.id
    }

    pub fn vertex_format(&self) -> VertexFormat {
        self.shader.vertex_format
    }

    pub fn material_id(&self) -> MaterialId {
        self.material_id
    }

    pub fn set_material_id(&mut self, id: MaterialId) {
        self.material_id = id;
    }

    pub fn draw_mode(&self) -> DrawMode {
        self.draw_mode
    }

    pub fn set_draw_mode(&mut self, mode: DrawMode) {
        self.draw_mode = mode;
    }

    pub fn draw_width(&self) -> f32 {
        self.draw_width
    }

    pub fn set_draw_width(&mut self, width: f32) {
        self.draw_width = width;
    }

    pub fn model_to_world(&self) -> &Mat4 {
        &self.model_to_world
    }

    pub fn set_model_to_world(&mut self, matrix: Mat4) {
        self.model_to_world = matrix;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::material::{MaterialStore, RenderMaterial};
    use crate::renderer::shader::{DefaultShaderPalette, ShaderStore, ShaderTechnique};

    fn spec(format: VertexFormat) -> ShaderSpec {
        ShaderSpec {
            id: ShaderId(0),
            vertex_format: format,
            max_batched_items: 8,
        }
    }

    fn section(format: VertexFormat) -> GeometrySection {
        GeometrySection::new(spec(format), MaterialId(0), Mat4::IDENTITY)
    }

    #[test]
    fn add_truncates_and_zero_fills_to_shader_components() {
        let mut s = section(VertexFormat::new(4, 0, 3, 2));

        s.add(AttributeType::Position, &[1.0, 2.0]);
        s.add(AttributeType::Color, &[0.1, 0.2, 0.3, 0.4, 0.5]);
        s.add(AttributeType::Normal, &[0.0, 0.0, 1.0]);

        assert_eq!(s.vertex_data(AttributeType::Position), &[1.0, 2.0, 0.0, 0.0]);
        assert_eq!(s.vertex_data(AttributeType::Color), &[0.1, 0.2, 0.3]);
        assert!(!s.has_normals());
    }

    #[test]
    fn add_vertex_fills_every_consumed_stream() {
        let mut s = section(VertexFormat::new(4, 3, 4, 2));
        s.add_vertex(&crate::renderer::vertex::v(
            [1.0, 2.0, 3.0],
            [0.0, 1.0, 0.0],
            [1.0, 0.0, 0.0, 1.0],
            [0.5, 0.25],
        ));

        assert_eq!(s.vertex_data(AttributeType::Position), &[1.0, 2.0, 3.0, 1.0]);
        assert_eq!(s.attribute_count(AttributeType::Normal), 1);
        assert_eq!(s.attribute_count(AttributeType::Color), 1);
        assert_eq!(s.vertex_data(AttributeType::TextureCoordinate), &[0.5, 0.25]);
    }

    #[test]
    fn emptiness_and_consistency() {
        let mut s = section(VertexFormat::new(3, 0, 0, 0));
        assert!(s.is_empty());
        assert!(s.is_consistent());

        s.add_positions(&[Vec3::ZERO, Vec3::X]);
        s.add_index_line(0, 1);
        assert!(!s.is_empty());
        assert!(s.is_consistent());

        s.add_index(2);
        assert!(!s.is_consistent());
    }

    #[test]
    fn consolidate_offsets_indices_by_prior_index_count() {
        let mut s = section(VertexFormat::new(3, 0, 4, 0));
        s.add_positions(&[Vec3::ZERO, Vec3::X, Vec3::Y]);
        s.add_index_triangle(0, 1, 2);

        let (mut p, mut n, mut c, mut t) = (Vec::new(), Vec::new(), Vec::new(), Vec::new());
        let mut indices = vec![9, 9, 9, 9];

        let appended = s.consolidate(&mut p, &mut n, &mut c, &mut t, &mut indices);

        assert_eq!(appended, 3);
        assert_eq!(&indices[4..], &[4, 5, 6]);
        assert_eq!(p.len(), 9);
        assert!(c.is_empty());
    }

    #[test]
    fn consolidating_an_empty_section_is_a_no_op() {
        let s = section(VertexFormat::new(4, 0, 4, 0));
        let (mut p, mut n, mut c, mut t) = (vec![1.0], Vec::new(), Vec::new(), Vec::new());
        let mut indices = vec![0, 1];

        assert_eq!(s.consolidate(&mut p, &mut n, &mut c, &mut t, &mut indices), 0);
        assert_eq!(p, vec![1.0]);
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn for_material_resolves_through_palette() {
        let shaders = ShaderStore::with_builtin_shaders();
        let mut materials = MaterialStore::new();
        let id = materials.add(RenderMaterial::new("wire", ShaderTechnique::UnlitPerVertexColor));
        let palette = DefaultShaderPalette::builtin();

        let s = GeometrySection::for_material(&shaders, &materials, &palette, id, Mat4::IDENTITY)
            .unwrap();
        assert_eq!(s.shader_id(), ShaderStore::UNLIT_PER_VERTEX_COLOR);

        assert!(GeometrySection::for_material(
            &shaders,
            &materials,
            &palette,
            MaterialId(42),
            Mat4::IDENTITY
        )
        .is_none());
    }
}
