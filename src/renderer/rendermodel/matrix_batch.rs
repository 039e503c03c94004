use std::collections::BTreeMap;

use crate::renderer::geometry::GeometrySection;
use crate::renderer::rendermodel::keys::MatrixBatchItemKey;
use crate::renderer::vertex::AttributeType;

/// One geometry section's data, copied out of the section so the caller
/// can drop it.
#[derive(Debug, Clone, Default)]
pub struct MatrixBatchItem {
    positions: Vec<f32>,
    normals: Vec<f32>,
    colors: Vec<f32>,
    texture_coordinates: Vec<f32>,
    indices: Vec<u32>,
    vertex_count: usize,
}

impl MatrixBatchItem {
    pub fn clear(&mut self) {
        self.positions.clear();
        self.normals.clear();
        self.colors.clear();
        self.texture_coordinates.clear();
        self.indices.clear();
        self.vertex_count = 0;
    }

    /// Replaces the item's contents with `section`'s.
    pub fn fill_from(&mut self, section: &GeometrySection) {
        self.clear();
        section.consolidate(
            &mut self.positions,
            &mut self.normals,
            &mut self.colors,
            &mut self.texture_coordinates,
            &mut self.indices,
        );
        self.vertex_count = section.attribute_count(AttributeType::Position);
    }

    pub fn attribute(&self, att: AttributeType) -> &[f32] {
        match att {
            AttributeType::Position => &self.positions,
            AttributeType::Normal => &self.normals,
            AttributeType::Color => &self.colors,
            AttributeType::TextureCoordinate => &self.texture_coordinates,
        }
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }
}

/// All items that share one model-to-world matrix, and hence one slot in a
/// GPU batch's matrix array.
#[derive(Debug, Default)]
pub struct MatrixBatch {
    items: BTreeMap<MatrixBatchItemKey, MatrixBatchItem>,
}

impl MatrixBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_or_fetch_item(&mut self, key: MatrixBatchItemKey) -> &mut MatrixBatchItem {
        self.items.entry(key).or_default()
    }

    pub fn item(&self, key: &MatrixBatchItemKey) -> Option<&MatrixBatchItem> {
        self.items.get(key)
    }

    pub fn remove_item(&mut self, key: &MatrixBatchItemKey) -> Option<MatrixBatchItem> {
        self.items.remove(key)
    }

    pub fn items(&self) -> impl Iterator<Item = (&MatrixBatchItemKey, &MatrixBatchItem)> {
        self.items.iter()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.items.values().map(MatrixBatchItem::vertex_count).sum()
    }

    pub fn index_count(&self) -> usize {
        self.items.values().map(MatrixBatchItem::index_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::material::MaterialId;
    use crate::renderer::shader::{ShaderId, ShaderSpec, VertexFormat};
    use glam::{Mat4, Vec3};

    fn triangle() -> GeometrySection {
        let mut section = GeometrySection::new(
            ShaderSpec {
                id: ShaderId(0),
                vertex_format: VertexFormat::new(4, 0, 4, 0),
                max_batched_items: 8,
            },
            MaterialId(0),
            Mat4::IDENTITY,
        );
        section.add_positions(&[Vec3::ZERO, Vec3::X, Vec3::Y]);
        section.add_index_triangle(0, 1, 2);
        section
    }

    #[test]
    fn refilling_an_item_replaces_its_data() {
        let mut item = MatrixBatchItem::default();
        item.fill_from(&triangle());
        item.fill_from(&triangle());

        assert_eq!(item.vertex_count(), 3);
        assert_eq!(item.indices(), &[0, 1, 2]);
        assert_eq!(item.attribute(AttributeType::Position).len(), 12);
    }

    #[test]
    fn items_are_keyed_by_object_and_section() {
        let mut batch = MatrixBatch::new();
        batch
            .create_or_fetch_item(MatrixBatchItemKey::new(1, 0))
            .fill_from(&triangle());
        batch
            .create_or_fetch_item(MatrixBatchItemKey::new(1, 0))
            .fill_from(&triangle());
        batch
            .create_or_fetch_item(MatrixBatchItemKey::new(2, 0))
            .fill_from(&triangle());

        assert_eq!(batch.item_count(), 2);
        assert_eq!(batch.vertex_count(), 6);

        batch.remove_item(&MatrixBatchItemKey::new(1, 0));
        batch.remove_item(&MatrixBatchItemKey::new(2, 0));
        assert!(batch.is_empty());
    }
}
