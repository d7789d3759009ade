//! Perspective camera. Supplies the view-projection and frustum the grass
//! cull pass tests against.

use crate::core::types::{Vec3, Mat4, Quat};

/// Right-handed camera looking down its local -Z
#[derive(Clone, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub rotation: Quat,
    /// Vertical field of view (radians)
    pub fov_y: f32,
    /// Width over height
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    /// `fov_y_degrees` is converted to radians. Identity rotation.
    pub fn new(position: Vec3, fov_y_degrees: f32, aspect: f32) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near: 0.05,
            far: 500.0,
        }
    }

    /// Camera at `position` facing `target`, 60 degree FOV.
    pub fn look_at(position: Vec3, target: Vec3, up: Vec3) -> Self {
        let mut camera = Self::new(position, 60.0, 16.0 / 9.0);
        camera.point_at(target, up);
        camera
    }

    /// Re-orient the camera toward `target`, keeping its position.
    pub fn point_at(&mut self, target: Vec3, up: Vec3) {
        let forward = (target - self.position).normalize();
        let right = forward.cross(up).normalize();
        let up = right.cross(forward);
        self.rotation = Quat::from_mat3(&glam::Mat3::from_cols(right, up, -forward));
    }

    /// World to view space
    pub fn view_matrix(&self) -> Mat4 {
        let rotation_matrix = Mat4::from_quat(self.rotation.conjugate());
        let translation_matrix = Mat4::from_translation(-self.position);
        rotation_matrix * translation_matrix
    }

    /// View to clip space, depth 0..1
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * -Vec3::Z
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// Ignores a zero height (minimized window)
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        if height > 0.0 {
            self.aspect = width / height;
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 5.0), 60.0, 16.0 / 9.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directions() {
        let camera = Camera::default();

        // Default camera looks down -Z
        let forward = camera.forward();
        assert!((forward.z - (-1.0)).abs() < 0.001);

        let right = camera.right();
        assert!((right.x - 1.0).abs() < 0.001);

        let up = camera.up();
        assert!((up.y - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_look_at_forward() {
        let camera = Camera::look_at(Vec3::new(0.0, 2.0, 10.0), Vec3::new(0.0, 2.0, 0.0), Vec3::Y);
        let forward = camera.forward();
        assert!((forward - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-4);
    }

    #[test]
    fn test_view_matrix_translation() {
        let mut camera = Camera::default();
        camera.position = Vec3::new(10.0, 0.0, 0.0);

        let view = camera.view_matrix();
        // View matrix should translate world origin to (-10, 0, 0) in camera space
        let origin_in_camera = view.transform_point3(Vec3::ZERO);
        assert!((origin_in_camera.x - (-10.0)).abs() < 0.001);
    }

    #[test]
    fn test_target_projects_to_screen_center() {
        let target = Vec3::new(3.0, 1.0, -4.0);
        let camera = Camera::look_at(Vec3::new(8.0, 6.0, 8.0), target, Vec3::Y);
        let clip = camera.view_projection() * target.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(ndc.x.abs() < 1e-3 && ndc.y.abs() < 1e-3);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }
}
