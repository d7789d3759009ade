//! View frustum for blade culling

use crate::core::types::{Vec3, Vec4, Mat4};

/// A plane defined by normal and distance from origin
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    pub fn new(normal: Vec3, distance: f32) -> Self {
        Self { normal, distance }
    }

    /// Signed distance from point to plane (positive = in front)
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }

    /// Packed as `normal.xyz, distance` for GPU upload
    pub fn to_array(&self) -> [f32; 4] {
        [self.normal.x, self.normal.y, self.normal.z, self.distance]
    }
}

/// View frustum with 6 planes (Near, Far, Left, Right, Top, Bottom)
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extract frustum planes from a view-projection matrix.
    ///
    /// Gribb/Hartmann extraction for a 0..1 depth range, which is what
    /// `Mat4::perspective_rh` produces and what wgpu expects.
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let row = |i: usize| Vec4::new(vp.x_axis[i], vp.y_axis[i], vp.z_axis[i], vp.w_axis[i]);
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        let near = Self::normalize_plane(r2);
        let far = Self::normalize_plane(r3 - r2);
        let left = Self::normalize_plane(r3 + r0);
        let right = Self::normalize_plane(r3 - r0);
        let top = Self::normalize_plane(r3 - r1);
        let bottom = Self::normalize_plane(r3 + r1);

        Self {
            planes: [near, far, left, right, top, bottom],
        }
    }

    fn normalize_plane(plane: Vec4) -> Plane {
        let normal = plane.truncate();
        let len = normal.length();
        if len <= f32::EPSILON {
            // Degenerate matrix: a plane that accepts everything
            return Plane::new(Vec3::ZERO, f32::MAX);
        }
        Plane {
            normal: normal / len,
            distance: plane.w / len,
        }
    }

    /// Check if point is inside frustum
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.contains_point_with_margin(point, 0.0)
    }

    /// Check if point is inside the frustum grown outward by `margin` world units
    pub fn contains_point_with_margin(&self, point: Vec3, margin: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.distance_to_point(point) >= -margin)
    }

    /// All six planes packed for a GPU uniform
    pub fn to_gpu_planes(&self) -> [[f32; 4]; 6] {
        self.planes.map(|p| p.to_array())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frustum() -> Frustum {
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_3, 1.0, 0.1, 100.0);
        Frustum::from_view_projection(&proj)
    }

    #[test]
    fn test_plane_distance() {
        let plane = Plane::new(Vec3::Y, 0.0); // XZ plane
        assert_eq!(plane.distance_to_point(Vec3::new(0.0, 5.0, 0.0)), 5.0);
        assert_eq!(plane.distance_to_point(Vec3::new(0.0, -3.0, 0.0)), -3.0);
    }

    #[test]
    fn test_planes_normalized() {
        for plane in &test_frustum().planes {
            assert!((plane.normal.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_contains_point() {
        let frustum = test_frustum();
        assert!(frustum.contains_point(Vec3::new(0.0, 0.0, -10.0)));
        // Behind the camera
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, 10.0)));
        // Beyond the far plane
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, -150.0)));
        // Far to the left
        assert!(!frustum.contains_point(Vec3::new(-100.0, 0.0, -10.0)));
    }

    #[test]
    fn test_near_plane_depth_range() {
        let frustum = test_frustum();
        assert!(frustum.contains_point(Vec3::new(0.0, 0.0, -0.11)));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, -0.09)));
    }

    #[test]
    fn test_margin_grows_frustum() {
        let frustum = test_frustum();
        let just_behind = Vec3::new(0.0, 0.0, -0.05);
        assert!(!frustum.contains_point(just_behind));
        assert!(frustum.contains_point_with_margin(just_behind, 0.1));
    }
}
