// renderer/uniforms.rs
use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Uniform block binding point of the camera/projection block.
pub const GLOBAL_UNIFORM_BINDING: u32 = 0;
/// Uniform block binding point of the per-batch matrix array.
pub const LOCAL_UNIFORM_BINDING: u32 = 1;

pub const MATRIX_BYTES: u64 = std::mem::size_of::<[[f32; 4]; 4]>() as u64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawParams {
    pub world_to_camera: Mat4,
    pub projection: Mat4,
}

impl DrawParams {
    pub fn new(world_to_camera: Mat4, projection: Mat4) -> Self {
        Self {
            world_to_camera,
            projection,
        }
    }
}

impl Default for DrawParams {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, PartialEq, Debug)]
pub struct GlobalShaderUniforms {
    pub world_to_camera: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
}

impl GlobalShaderUniforms {
    pub fn new() -> Self {
        Self::from_params(&DrawParams::default())
    }

    pub fn from_params(params: &DrawParams) -> Self {
        Self {
            world_to_camera: params.world_to_camera.to_cols_array_2d(),
            projection: params.projection.to_cols_array_2d(),
        }
    }
}

impl Default for GlobalShaderUniforms {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn global_block_is_two_column_major_matrices() {
        assert_eq!(std::mem::size_of::<GlobalShaderUniforms>(), 128);

        let params = DrawParams::new(Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)), Mat4::IDENTITY);
        let uniforms = GlobalShaderUniforms::from_params(&params);
        assert_eq!(uniforms.world_to_camera[3], [1.0, 2.0, 3.0, 1.0]);
    }
}
