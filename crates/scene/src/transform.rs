//! Transform component for scene objects.
//!
//! Rotation is stored as Euler angles in degrees and applied in X, Y, Z
//! order, so the model matrix is `T · Rx · Ry · Rz · S`.
//!
//! # Example
//!
//! ```
//! use renderer_scene::Transform;
//! use glam::Vec3;
//!
//! let t = Transform::new()
//!     .with_position(Vec3::new(1.0, 0.0, 0.0))
//!     .with_rotation(Vec3::new(0.0, 90.0, 0.0));
//!
//! let p = t.model_matrix().transform_point3(Vec3::Z);
//! assert!((p - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-5);
//! ```

use glam::{Mat4, Vec3};

/// Position, rotation and scale of an entity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    /// Euler angles in degrees.
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Create a new transform at the origin.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    /// Set the rotation as Euler angles in degrees.
    pub fn with_rotation(mut self, rotation: Vec3) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Rotation part of the model matrix.
    pub fn rotation_matrix(&self) -> Mat4 {
        let r = self.rotation;
        Mat4::from_rotation_x(r.x.to_radians())
            * Mat4::from_rotation_y(r.y.to_radians())
            * Mat4::from_rotation_z(r.z.to_radians())
    }

    /// `T · Rx · Ry · Rz · S`.
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.position) * self.rotation_matrix() * Mat4::from_scale(self.scale)
    }

    /// Get the normal matrix (inverse transpose of the model matrix).
    ///
    /// # Non-invertible transforms
    ///
    /// A zero scale makes the model matrix singular; the identity is
    /// returned instead of NaN/Inf values.
    pub fn normal_matrix(&self) -> Mat4 {
        const EPSILON: f32 = 1e-6;
        let model = self.model_matrix();
        if model.determinant().abs() < EPSILON {
            Mat4::IDENTITY
        } else {
            model.inverse().transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    fn approx_eq_vec3(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < EPSILON
    }

    #[test]
    fn test_transform_default() {
        let t = Transform::default();
        assert_eq!(t.position, Vec3::ZERO);
        assert_eq!(t.rotation, Vec3::ZERO);
        assert_eq!(t.scale, Vec3::ONE);
        assert_eq!(t.model_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_model_matrix_scales_before_translating() {
        let t = Transform::new()
            .with_position(Vec3::new(1.0, 2.0, 3.0))
            .with_scale(Vec3::splat(2.0));
        let p = t.model_matrix().transform_point3(Vec3::ONE);
        assert!(approx_eq_vec3(p, Vec3::new(3.0, 4.0, 5.0)));
    }

    #[test]
    fn test_rotation_is_in_degrees() {
        let t = Transform::new().with_rotation(Vec3::new(0.0, 0.0, 90.0));
        let p = t.model_matrix().transform_point3(Vec3::X);
        assert!(approx_eq_vec3(p, Vec3::Y));
    }

    #[test]
    fn test_rotation_order_is_xyz() {
        let t = Transform::new().with_rotation(Vec3::new(90.0, 90.0, 0.0));
        let expected = Mat4::from_rotation_x(90f32.to_radians())
            * Mat4::from_rotation_y(90f32.to_radians());
        let p = t.model_matrix().transform_point3(Vec3::X);
        assert!(approx_eq_vec3(p, expected.transform_point3(Vec3::X)));
        // Y first takes X to -Z, then X takes -Z to +Y.
        assert!(approx_eq_vec3(p, Vec3::Y));
    }

    #[test]
    fn test_normal_matrix_with_scale() {
        let t = Transform::new().with_scale(Vec3::new(1.0, 2.0, 1.0));
        let expected = t.model_matrix().inverse().transpose();
        assert_eq!(t.normal_matrix(), expected);
    }

    #[test]
    fn test_normal_matrix_non_invertible() {
        let t = Transform::new().with_scale(Vec3::ZERO);
        let normal = t.normal_matrix();
        assert_eq!(normal, Mat4::IDENTITY);
        assert!(!normal.is_nan());
    }
}
