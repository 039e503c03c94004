use bytemuck::{Pod, Zeroable};

/// The four vertex attribute streams a geometry section can carry. The
/// discriminant doubles as the shader location of the attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttributeType {
    Position = 0,
    Normal = 1,
    Color = 2,
    TextureCoordinate = 3,
}

impl AttributeType {
    pub const ALL: [AttributeType; 4] = [
        AttributeType::Position,
        AttributeType::Normal,
        AttributeType::Color,
        AttributeType::TextureCoordinate,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn shader_location(self) -> u32 {
        self as u32
    }
}

/// A complete vertex, for callers that build sections one vertex at a time.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct Vertex3d {
    pub pos: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 4],
    pub uv: [f32; 2],
}

impl Default for Vertex3d {
    fn default() -> Self {
        Self {
            pos: [0.0; 3],
            normal: [0.0, 0.0, 1.0],
            color: [1.0; 4],
            uv: [0.0; 2],
        }
    }
}

#[inline]
pub fn v(pos: [f32; 3], normal: [f32; 3], color: [f32; 4], uv: [f32; 2]) -> Vertex3d {
    Vertex3d {
        pos,
        normal,
        color,
        uv,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_locations_follow_declaration_order() {
        let locations: Vec<u32> = AttributeType::ALL
            .iter()
            .map(|att| att.shader_location())
            .collect();
        assert_eq!(locations, vec![0, 1, 2, 3]);
    }

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex3d>(), 12 * 4);
    }
}
