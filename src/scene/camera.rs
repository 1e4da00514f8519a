use glam::{EulerRot, Mat4, Quat, Vec3};

/// Perspective camera with GL clip conventions.
///
/// Rotation is composed yaw (Y), then pitch (X), then roll (Z, always zero).
/// With zero yaw and pitch the camera looks down -Z.
#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveCamera {
    pub position: Vec3,
    pub rotation: Quat,
    /// Vertical field of view, degrees
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl PerspectiveCamera {
    pub fn new(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            fov,
            aspect,
            near,
            far,
        }
    }

    /// Place the camera at `position` looking along `yaw`/`pitch` (radians).
    pub fn set_pose(&mut self, position: Vec3, yaw: f32, pitch: f32) {
        self.position = position;
        self.rotation = Quat::from_euler(EulerRot::YXZ, yaw, pitch, 0.0);
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position).inverse()
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh_gl(self.fov.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn zero_pose_looks_down_negative_z() {
        let cam = PerspectiveCamera::new(75.0, 16.0 / 9.0, 0.1, 1000.0);
        assert!(approx(cam.forward(), Vec3::NEG_Z));
    }

    #[test]
    fn yaw_turns_left_pitch_tilts_up() {
        let mut cam = PerspectiveCamera::new(75.0, 1.0, 0.1, 1000.0);
        cam.set_pose(Vec3::ZERO, FRAC_PI_2, 0.0);
        assert!(approx(cam.forward(), Vec3::NEG_X));

        cam.set_pose(Vec3::ZERO, 0.0, FRAC_PI_2);
        assert!(approx(cam.forward(), Vec3::Y));
    }

    #[test]
    fn point_ahead_projects_to_center() {
        let mut cam = PerspectiveCamera::new(75.0, 640.0 / 360.0, 0.1, 1000.0);
        cam.set_pose(Vec3::new(10.0, 65.6, 10.0), 0.0, 0.0);
        let clip = cam.view_proj() * Vec3::new(10.0, 65.6, 0.0).extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4);
        assert!(ndc.z > -1.0 && ndc.z < 1.0);
    }
}
