//! Consolidation of geometry sections into shared streams.

use calliper_render::renderer::geometry::{DrawMode, GeometrySection};
use calliper_render::renderer::material::MaterialId;
use calliper_render::renderer::shader::{ShaderId, ShaderSpec, VertexFormat};
use calliper_render::renderer::vertex::{v, AttributeType};
use glam::{Mat4, Vec3};

fn section(format: VertexFormat) -> GeometrySection {
    GeometrySection::new(
        ShaderSpec {
            id: ShaderId(3),
            vertex_format: format,
            max_batched_items: 8,
        },
        MaterialId(1),
        Mat4::IDENTITY,
    )
}

fn fan(vertex_count: u32) -> GeometrySection {
    let mut s = section(VertexFormat::new(4, 3, 4, 2));
    for i in 0..vertex_count {
        let angle = i as f32 / vertex_count as f32 * std::f32::consts::TAU;
        s.add_vertex(&v(
            [angle.cos(), angle.sin(), 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 1.0, 1.0, 1.0],
            [angle.cos() * 0.5 + 0.5, angle.sin() * 0.5 + 0.5],
        ));
    }
    for i in 1..vertex_count - 1 {
        s.add_index_triangle(0, i, i + 1);
    }
    s
}

#[test]
fn consolidated_indices_stay_within_the_sections_window() {
    let sections = [fan(4), fan(7), fan(3)];
    let (mut p, mut n, mut c, mut t) = (Vec::new(), Vec::new(), Vec::new(), Vec::new());
    let mut indices = Vec::new();

    for s in &sections {
        let prior = indices.len() as u32;
        let vertices = s.attribute_count(AttributeType::Position) as u32;

        let appended = s.consolidate(&mut p, &mut n, &mut c, &mut t, &mut indices);

        assert_eq!(appended, s.index_count());
        assert!(indices[prior as usize..]
            .iter()
            .all(|index| (prior..prior + vertices).contains(index)));
    }

    assert_eq!(p.len(), (4 + 7 + 3) * 4);
    assert_eq!(n.len(), (4 + 7 + 3) * 3);
    assert_eq!(t.len(), (4 + 7 + 3) * 2);
}

#[test]
fn builder_sections_are_consistent() {
    let s = fan(6);

    assert!(s.is_consistent());
    assert!(s.has_normals() && s.has_colors() && s.has_texture_coordinates());
    assert_eq!(s.index_count(), 12);
}

#[test]
fn clearing_an_attribute_only_touches_that_stream() {
    let mut s = fan(3);
    s.clear_attribute(AttributeType::TextureCoordinate);

    assert!(!s.has_texture_coordinates());
    assert_eq!(s.attribute_count(AttributeType::Position), 3);
    assert!(s.is_consistent());
}

#[test]
fn line_sections_keep_their_draw_state() {
    let mut s = section(VertexFormat::new(3, 0, 4, 0));
    s.set_draw_mode(DrawMode::Lines);
    s.set_draw_width(2.5);
    s.set_model_to_world(Mat4::from_translation(Vec3::Z));
    s.add_positions(&[Vec3::ZERO, Vec3::X]);
    s.add_index_line(0, 1);

    assert_eq!(s.draw_mode(), DrawMode::Lines);
    assert_eq!(s.draw_width(), 2.5);
    assert_eq!(s.model_to_world().w_axis.z, 1.0);
    // Three position components: the implicit w is dropped.
    assert_eq!(s.vertex_data(AttributeType::Position), &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
    assert_eq!(s.material_id(), MaterialId(1));
}
