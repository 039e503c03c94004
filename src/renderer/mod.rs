pub mod device;
pub mod geometry;
pub mod material;
pub mod pipeline_builder;
pub mod rendermodel;
pub mod shader;
pub mod texture;
pub mod uniforms;
pub mod vertex;

use std::rc::Rc;

use glam::Mat4;

pub use device::{RecordingDevice, RenderDevice, WgpuDevice};
pub use geometry::{DrawMode, GeometrySection};
pub use material::{MaterialId, MaterialLookup, MaterialStore, RenderMaterial, TextureUnit};
pub use rendermodel::{ObjectFlags, RenderModel, RenderModelStats};
pub use shader::{
    DefaultShaderPalette, ShaderId, ShaderLookup, ShaderPalette, ShaderSpec, ShaderStore,
    ShaderTechnique, VertexFormat,
};
pub use texture::{TextureId, TextureLookup, TextureStore};
pub use uniforms::{DrawParams, GlobalShaderUniforms};
pub use vertex::{AttributeType, Vertex3d};

/// The registries the render model reads from while drawing.
#[derive(Clone)]
pub struct RenderLookups {
    pub shaders: Rc<dyn ShaderLookup>,
    pub materials: Rc<dyn MaterialLookup>,
    pub textures: Rc<dyn TextureLookup>,
}

impl RenderLookups {
    pub fn new(
        shaders: Rc<dyn ShaderLookup>,
        materials: Rc<dyn MaterialLookup>,
        textures: Rc<dyn TextureLookup>,
    ) -> Self {
        Self {
            shaders,
            materials,
            textures,
        }
    }

    /// Starts a section for `material_id` using the shader `palette` picks
    /// for the material's technique.
    pub fn section_for_material(
        &self,
        palette: &dyn ShaderPalette,
        material_id: MaterialId,
        model_to_world: Mat4,
    ) -> Option<GeometrySection> {
        GeometrySection::for_material(
            self.shaders.as_ref(),
            self.materials.as_ref(),
            palette,
            material_id,
            model_to_world,
        )
    }
}
