//! Composite keys addressing the pass → batch group → matrix batch → item tree.
//!
//! Every key is plain data compared by value. Floats are stored as their bit
//! patterns so the keys can be `Eq + Hash + Ord`.

use glam::Mat4;

use crate::renderer::geometry::{DrawMode, GeometrySection};
use crate::renderer::material::MaterialId;
use crate::renderer::shader::ShaderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassKey(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchGroupKey {
    pub shader: ShaderId,
    pub material: MaterialId,
    pub draw_mode: DrawMode,
    draw_width_bits: u32,
}

impl BatchGroupKey {
    pub fn new(shader: ShaderId, material: MaterialId, draw_mode: DrawMode, draw_width: f32) -> Self {
        Self {
            shader,
            material,
            draw_mode,
            draw_width_bits: draw_width.to_bits(),
        }
    }

    pub fn for_section(section: &GeometrySection) -> Self {
        Self::new(
            section.shader_id(),
            section.material_id(),
            section.draw_mode(),
            section.draw_width(),
        )
    }

    pub fn draw_width(&self) -> f32 {
        f32::from_bits(self.draw_width_bits)
    }
}

/// A model-to-world matrix, keyed by the bit pattern of its sixteen floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatrixBatchKey([u32; 16]);

impl MatrixBatchKey {
    pub fn new(matrix: &Mat4) -> Self {
        Self(matrix.to_cols_array().map(f32::to_bits))
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_cols_array(&self.0.map(f32::from_bits))
    }
}

impl From<Mat4> for MatrixBatchKey {
    fn from(matrix: Mat4) -> Self {
        Self::new(&matrix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatrixBatchItemKey {
    pub object_id: u32,
    pub section_id: u32,
}

impl MatrixBatchItemKey {
    pub fn new(object_id: u32, section_id: u32) -> Self {
        Self {
            object_id,
            section_id,
        }
    }
}

/// Full path from a pass down to a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderModelKey {
    pub pass: PassKey,
    pub batch_group: BatchGroupKey,
    pub matrix_batch: MatrixBatchKey,
    pub item: MatrixBatchItemKey,
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn matrix_key_round_trips_and_compares_by_value() {
        let m = Mat4::from_translation(Vec3::new(0.5, -2.0, 8.0));
        let key = MatrixBatchKey::new(&m);

        assert_eq!(key.matrix(), m);
        assert_eq!(key, MatrixBatchKey::from(m));
        assert_ne!(key, MatrixBatchKey::new(&Mat4::IDENTITY));
    }

    #[test]
    fn batch_groups_sort_by_shader_first() {
        let a = BatchGroupKey::new(ShaderId(0), MaterialId(5), DrawMode::Lines, 2.0);
        let b = BatchGroupKey::new(ShaderId(1), MaterialId(0), DrawMode::Triangles, 1.0);

        assert!(a < b);
        assert_eq!(a.draw_width(), 2.0);
    }
}
