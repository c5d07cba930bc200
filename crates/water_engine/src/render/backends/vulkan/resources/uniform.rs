//! GPU-visible uniform and push-constant blocks
//!
//! Layouts match the std140 blocks declared in `resources/shaders`.

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::foundation::math::Mat4;

/// Per-draw transforms, binding 0 of the object and water layouts
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    /// Object to world
    pub model: [[f32; 4]; 4],
    /// World to view
    pub view: [[f32; 4]; 4],
    /// View to clip
    pub proj: [[f32; 4]; 4],
}

impl UniformBufferObject {
    /// Pack column-major matrices
    pub fn new(model: &Mat4, view: &Mat4, proj: &Mat4) -> Self {
        Self {
            model: (*model).into(),
            view: (*view).into(),
            proj: (*proj).into(),
        }
    }

    /// Buffer size every uniform slot is allocated with
    pub const SIZE: vk::DeviceSize = std::mem::size_of::<Self>() as vk::DeviceSize;
}

/// Input to the height-field simulation, binding 2 of the compute layout
///
/// Only `mouse[2]` carries data: 1.0 while the left button is held.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct SimulationInput {
    /// `(0, 0, pressed, 0)`
    pub mouse: [f32; 4],
}

impl SimulationInput {
    /// Input for the current button state
    pub fn new(pressed: bool) -> Self {
        Self {
            mouse: [0.0, 0.0, if pressed { 1.0 } else { 0.0 }, 0.0],
        }
    }
}

/// World-space clip plane pushed to the object shaders
///
/// Fragments with `dot(plane, (p, 1)) < 0` are discarded.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct ClipPlane {
    /// `(nx, ny, nz, d)`
    pub plane: [f32; 4],
}

impl ClipPlane {
    /// Keep everything
    pub fn none() -> Self {
        Self {
            plane: [0.0, 0.0, 0.0, 1.0],
        }
    }

    /// Keep geometry below `y = height`
    pub fn below(height: f32) -> Self {
        Self {
            plane: [0.0, -1.0, 0.0, height],
        }
    }

    /// Keep geometry above `y = height`
    pub fn above(height: f32) -> Self {
        Self {
            plane: [0.0, 1.0, 0.0, -height],
        }
    }

    /// Whether `point` survives the clip
    pub fn keeps(&self, point: [f32; 3]) -> bool {
        let [a, b, c, d] = self.plane;
        a * point[0] + b * point[1] + c * point[2] + d >= 0.0
    }

    /// Push constant range covering this block
    pub fn range(stages: vk::ShaderStageFlags) -> vk::PushConstantRange {
        vk::PushConstantRange {
            stage_flags: stages,
            offset: 0,
            size: std::mem::size_of::<Self>() as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn test_ubo_is_three_mat4() {
        assert_eq!(UniformBufferObject::SIZE, 192);
    }

    #[test]
    fn test_ubo_packs_column_major() {
        let model = Mat4::new_translation(&Vector3::new(1.0, 2.0, 3.0));
        let ubo = UniformBufferObject::new(&model, &Mat4::identity(), &Mat4::identity());
        assert_eq!(ubo.model[3], [1.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn test_simulation_input_carries_only_pressed() {
        assert_eq!(SimulationInput::new(true).mouse, [0.0, 0.0, 1.0, 0.0]);
        assert_eq!(SimulationInput::new(false), SimulationInput::default());
    }

    #[test]
    fn test_clip_planes_split_at_water_height() {
        let refraction = ClipPlane::below(0.5);
        let reflection = ClipPlane::above(0.5);

        assert!(refraction.keeps([0.0, -1.0, 0.0]));
        assert!(!refraction.keeps([0.0, 1.0, 0.0]));
        assert!(reflection.keeps([0.0, 1.0, 0.0]));
        assert!(!reflection.keeps([0.0, -1.0, 0.0]));
        assert!(ClipPlane::none().keeps([0.0, 100.0, 0.0]));
        assert_eq!(ClipPlane::range(vk::ShaderStageFlags::VERTEX).size, 16);
    }
}
