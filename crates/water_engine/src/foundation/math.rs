//! Math types for the renderer
//!
//! Thin aliases over `nalgebra` plus the few matrix builders the water scene
//! needs: a zero-to-one depth perspective and a mirror about a horizontal plane.

pub use nalgebra::{
    Vector2, Vector3, Vector4,
    Matrix4,
    Quaternion,
    Unit,
};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Position, rotation and scale of a scene object
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Translation in world space
    pub position: Vec3,
    /// Orientation
    pub rotation: Quat,
    /// Per-axis scale
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Build a transform from euler angles given in degrees (applied X, then Y, then Z)
    pub fn from_euler_degrees(position: Vec3, rotation_degrees: Vec3, scale: Vec3) -> Self {
        let r = rotation_degrees.map(f32::to_radians);
        let rotation = Quat::from_axis_angle(&Vec3::x_axis(), r.x)
            * Quat::from_axis_angle(&Vec3::y_axis(), r.y)
            * Quat::from_axis_angle(&Vec3::z_axis(), r.z);
        Self { position, rotation, scale }
    }

    /// translate × rotate × scale
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }
}

/// Extra matrix constructors
pub trait Mat4Ext {
    /// Right-handed perspective projection with depth mapped to `[0, 1]`
    fn perspective_zo(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Mirror about the horizontal plane `y = height`
    fn mirror_y(height: f32) -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn perspective_zo(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        let tan_half_fovy = (fov_y * 0.5).tan();

        let mut result = Mat4::zeros();
        result[(0, 0)] = 1.0 / (aspect * tan_half_fovy);
        result[(1, 1)] = 1.0 / tan_half_fovy;
        result[(2, 2)] = far / (near - far);
        result[(2, 3)] = -(far * near) / (far - near);
        result[(3, 2)] = -1.0;
        result
    }

    fn mirror_y(height: f32) -> Mat4 {
        Mat4::new_translation(&Vec3::new(0.0, 2.0 * height, 0.0))
            * Mat4::new_nonuniform_scaling(&Vec3::new(1.0, -1.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    #[test]
    fn test_transform_applies_scale_then_rotation_then_translation() {
        let transform = Transform {
            position: Vec3::new(1.0, 0.0, 0.0),
            rotation: Quat::from_axis_angle(&Vec3::y_axis(), std::f32::consts::FRAC_PI_2),
            scale: Vec3::new(2.0, 2.0, 2.0),
        };

        let p = transform.to_matrix().transform_point(&Point3::new(1.0, 0.0, 0.0));
        // (1,0,0) scaled to (2,0,0), rotated about +Y to (0,0,-2), translated by +X
        assert_relative_eq!(p, Point3::new(1.0, 0.0, -2.0), epsilon = 1e-5);
    }

    #[test]
    fn test_perspective_maps_near_and_far_to_unit_depth() {
        let proj = Mat4::perspective_zo(90f32.to_radians(), 1.0, 0.1, 100.0);

        let near = proj * Vec4::new(0.0, 0.0, -0.1, 1.0);
        let far = proj * Vec4::new(0.0, 0.0, -100.0, 1.0);
        assert_relative_eq!(near.z / near.w, 0.0, epsilon = 1e-5);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_mirror_reflects_across_water_plane() {
        let mirror = Mat4::mirror_y(0.5);
        let p = mirror.transform_point(&Point3::new(3.0, 2.0, -1.0));
        assert_relative_eq!(p, Point3::new(3.0, -1.0, -1.0), epsilon = 1e-6);

        // Mirroring twice is the identity
        assert_relative_eq!(mirror * mirror, Mat4::identity(), epsilon = 1e-6);
    }
}
