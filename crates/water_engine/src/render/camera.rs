//! # Fly Camera
//!
//! Quaternion camera driven by polled keyboard state and cursor deltas.
//!
//! ## Controls
//! - `W`/`S`: forward/back along the view direction
//! - `A`/`D`: strafe along the view's right axis
//! - `Q`/`E`: roll
//! - `Space`/`Backspace`: up/down along world +Y
//! - mouse: yaw and pitch
//!
//! ## Orientation
//! Rotation accumulates as `delta * orientation`, renormalized every frame,
//! so there is no gimbal lock. The projection keeps +Y up in clip space; the
//! camera starts with a half turn of roll to land upright under Vulkan's
//! Y-down viewport.
//!
//! The camera never talks to GLFW directly. The window fills a
//! [`CameraInput`] each frame, which keeps this module testable.

use crate::foundation::math::{Mat4, Mat4Ext, Quat, Vec3};

/// Movement speed in world units per second
pub const MOVE_SPEED: f32 = 2.5;

/// Cursor delta scale
pub const MOUSE_SENSITIVITY: f32 = 0.5;

/// Input state sampled from the window for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CameraInput {
    /// `W`
    pub forward: bool,
    /// `S`
    pub back: bool,
    /// `A`
    pub left: bool,
    /// `D`
    pub right: bool,
    /// `Q`
    pub roll_left: bool,
    /// `E`
    pub roll_right: bool,
    /// `Space`
    pub up: bool,
    /// `Backspace`
    pub down: bool,
    /// Latest cursor position, if the cursor moved this frame
    pub cursor: Option<(f64, f64)>,
}

/// Quaternion fly camera
#[derive(Debug, Clone)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,
    orientation: Quat,
    /// Pending (pitch, yaw, roll) applied on the next update
    pending: Vec3,
    fov_degrees: f32,
    near: f32,
    far: f32,
    last_cursor: Option<(f64, f64)>,
    view: Mat4,
    projection: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.5, 3.0), 1.0)
    }
}

impl Camera {
    /// Create a camera at `position` with 90° field of view and clip range 0.1..100
    pub fn new(position: Vec3, aspect: f32) -> Self {
        let half_turn = std::f32::consts::FRAC_PI_2;
        let orientation = Quat::from_euler_angles(0.0, 0.0, half_turn);
        let mut camera = Self {
            position,
            orientation,
            pending: Vec3::new(0.0, 0.0, half_turn),
            fov_degrees: 90.0,
            near: 0.1,
            far: 100.0,
            last_cursor: None,
            view: Mat4::identity(),
            projection: Mat4::identity(),
        };
        camera.rebuild(aspect);
        camera
    }

    /// Apply one frame of input and rebuild the view and projection matrices
    pub fn update(&mut self, delta_time: f32, input: &CameraInput, aspect: f32) {
        self.apply_keys(delta_time, input);
        if let Some(cursor) = input.cursor {
            self.apply_cursor(delta_time, cursor);
        }
        self.rebuild(aspect);
    }

    /// World-to-view matrix
    pub fn view(&self) -> Mat4 {
        self.view
    }

    /// View-to-clip matrix
    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    fn basis_row(&self, row: usize) -> Vec3 {
        Vec3::new(self.view[(row, 0)], self.view[(row, 1)], self.view[(row, 2)])
    }

    fn apply_keys(&mut self, delta_time: f32, input: &CameraInput) {
        let right = self.basis_row(0);
        let front = self.basis_row(2);
        let world_up = Vec3::y();
        let speed = MOVE_SPEED * delta_time;

        if input.forward {
            self.position -= front * speed;
        }
        if input.back {
            self.position += front * speed;
        }
        if input.left {
            self.position -= right * speed;
        }
        if input.right {
            self.position += right * speed;
        }
        if input.roll_right {
            self.pending.z -= speed;
        }
        if input.roll_left {
            self.pending.z += speed;
        }
        if input.up {
            self.position += world_up * speed;
        }
        if input.down {
            self.position -= world_up * speed;
        }
    }

    fn apply_cursor(&mut self, delta_time: f32, (x, y): (f64, f64)) {
        let (last_x, last_y) = self.last_cursor.unwrap_or((x, y));
        self.last_cursor = Some((x, y));

        let x_offset = (x - last_x) as f32 * MOUSE_SENSITIVITY;
        let y_offset = (last_y - y) as f32 * MOUSE_SENSITIVITY;

        self.pending.y += x_offset * delta_time;
        self.pending.x += y_offset * delta_time;
    }

    fn rebuild(&mut self, aspect: f32) {
        let delta = Quat::from_euler_angles(self.pending.x, self.pending.y, self.pending.z);
        self.pending = Vec3::zeros();

        self.orientation = Quat::new_normalize((delta * self.orientation).into_inner());
        self.view = self.orientation.to_homogeneous() * Mat4::new_translation(&-self.position);
        self.projection = Mat4::perspective_zo(self.fov_degrees.to_radians(), aspect, self.near, self.far);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_starting_pose() {
        let camera = Camera::default();
        assert_relative_eq!(camera.position, Vec3::new(0.0, 0.5, 3.0));

        // Initial roll plus the pending roll give a half turn about Z
        let expected = Quat::from_axis_angle(&Vec3::z_axis(), std::f32::consts::PI).to_homogeneous();
        let rotation = camera.view() * Mat4::new_translation(&camera.position);
        assert_relative_eq!(rotation, expected, epsilon = 1e-5);
    }

    #[test]
    fn test_forward_moves_along_view_direction() {
        let mut camera = Camera::default();
        let input = CameraInput { forward: true, ..Default::default() };

        camera.update(1.0, &input, 1.0);

        assert_relative_eq!(camera.position, Vec3::new(0.0, 0.5, 0.5), epsilon = 1e-5);
    }

    #[test]
    fn test_vertical_movement_uses_world_up() {
        let mut camera = Camera::default();
        camera.update(0.5, &CameraInput { up: true, ..Default::default() }, 1.0);
        assert_relative_eq!(camera.position.y, 0.5 + MOVE_SPEED * 0.5, epsilon = 1e-5);

        camera.update(0.5, &CameraInput { down: true, ..Default::default() }, 1.0);
        assert_relative_eq!(camera.position.y, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_first_cursor_sample_does_not_rotate() {
        let mut camera = Camera::default();
        let before = camera.view();

        camera.update(1.0, &CameraInput { cursor: Some((400.0, 300.0)), ..Default::default() }, 1.0);

        assert_relative_eq!(camera.view(), before, epsilon = 1e-6);
    }

    #[test]
    fn test_cursor_motion_rotates_view() {
        let mut camera = Camera::default();
        camera.update(1.0, &CameraInput { cursor: Some((400.0, 300.0)), ..Default::default() }, 1.0);
        let before = camera.view();

        camera.update(0.016, &CameraInput { cursor: Some((420.0, 300.0)), ..Default::default() }, 1.0);

        assert!((camera.view() - before).norm() > 1e-4);
        // Orientation stays a pure rotation
        let r = camera.view() * Mat4::new_translation(&camera.position);
        assert_relative_eq!(r * r.transpose(), Mat4::identity(), epsilon = 1e-5);
    }

    #[test]
    fn test_projection_tracks_aspect() {
        let mut camera = Camera::default();
        camera.update(0.0, &CameraInput::default(), 2.0);
        let p = camera.projection();
        assert_relative_eq!(p[(1, 1)] / p[(0, 0)], 2.0, epsilon = 1e-5);
    }
}
