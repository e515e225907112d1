//! Uniform buffer and push constant layouts shared with the shaders.
//!
//! All structures are `#[repr(C)]` and std140-compatible so they can be
//! copied into mapped memory with `bytemuck`.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use renderer_scene::{Camera, DirectionalLight, PointLight};

/// Per-frame camera data (set 0, binding 0).
///
/// # Memory Layout
///
/// - Offset 0: view matrix (64 bytes)
/// - Offset 64: projection matrix (64 bytes)
/// - Offset 128: viewProjection matrix (64 bytes)
/// - Offset 192: camera position (12 bytes) + padding (4 bytes)
/// - Total size: 208 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct CameraUbo {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub camera_position: Vec3,
    pub _padding: f32,
}

impl CameraUbo {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn from_camera(camera: &Camera) -> Self {
        let view = camera.view_matrix();
        let projection = camera.projection_matrix();
        Self {
            view,
            projection,
            view_projection: projection * view,
            camera_position: camera.position(),
            _padding: 0.0,
        }
    }
}

/// Value of `LightUbo::position.w` for a directional light.
pub const LIGHT_TYPE_DIRECTIONAL: f32 = 0.0;
/// Value of `LightUbo::position.w` for a point light.
pub const LIGHT_TYPE_POINT: f32 = 1.0;

/// Per-frame data of the primary light (set 0, binding 1).
///
/// # Memory Layout
///
/// - Offset 0: light space matrix (64 bytes)
/// - Offset 64: position.xyz, w = light type
/// - Offset 80: direction.xyz, w = radius
/// - Offset 96: color.rgb, w = ambient strength
/// - Offset 112: specular, shininess, has light, has shadow map
/// - Total size: 128 bytes
///
/// With no light in the scene `params.z` is zero and the shaders fall back
/// to a dim ambient term.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct LightUbo {
    pub light_space: Mat4,
    pub position: Vec4,
    pub direction: Vec4,
    pub color: Vec4,
    pub params: Vec4,
}

impl Default for LightUbo {
    fn default() -> Self {
        Self {
            light_space: Mat4::IDENTITY,
            position: Vec4::ZERO,
            direction: Vec4::new(0.0, -1.0, 0.0, 0.0),
            color: Vec4::ZERO,
            params: Vec4::ZERO,
        }
    }
}

impl LightUbo {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn directional(light: &DirectionalLight, light_space: Option<Mat4>) -> Self {
        Self {
            light_space: light_space.unwrap_or(Mat4::IDENTITY),
            position: Vec4::new(0.0, 0.0, 0.0, LIGHT_TYPE_DIRECTIONAL),
            direction: light.normalized_direction().extend(0.0),
            color: light.color.extend(light.ambient_strength),
            params: Vec4::new(
                light.specular_strength,
                32.0,
                1.0,
                shadow_flag(light_space),
            ),
        }
    }

    pub fn point(light: &PointLight, light_space: Option<Mat4>) -> Self {
        Self {
            light_space: light_space.unwrap_or(Mat4::IDENTITY),
            position: light.position.extend(LIGHT_TYPE_POINT),
            direction: Vec4::new(0.0, -1.0, 0.0, light.radius),
            color: light.color.extend(light.ambient_strength),
            params: Vec4::new(
                light.specular_strength,
                light.shininess,
                1.0,
                shadow_flag(light_space),
            ),
        }
    }

    #[inline]
    pub fn has_light(&self) -> bool {
        self.params.z > 0.0
    }

    #[inline]
    pub fn has_shadow(&self) -> bool {
        self.params.w > 0.0
    }
}

fn shadow_flag(light_space: Option<Mat4>) -> f32 {
    if light_space.is_some() { 1.0 } else { 0.0 }
}

/// Per-draw constants of the mesh pipelines.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct MeshPushConstants {
    pub model: Mat4,
    /// Inverse transpose of `model`.
    pub normal: Mat4,
}

/// Per-draw constants of the shadow pipeline.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ShadowPushConstants {
    pub light_space: Mat4,
    pub model: Mat4,
}

#[cfg(test)]
mod tests {
    use std::mem::{align_of, offset_of};

    use super::*;

    #[test]
    fn test_camera_ubo_layout() {
        assert_eq!(CameraUbo::SIZE, 208);
        assert_eq!(align_of::<CameraUbo>(), 16);
        assert_eq!(offset_of!(CameraUbo, camera_position), 192);
    }

    #[test]
    fn test_light_ubo_layout() {
        assert_eq!(LightUbo::SIZE, 128);
        assert_eq!(offset_of!(LightUbo, position), 64);
        assert_eq!(offset_of!(LightUbo, direction), 80);
        assert_eq!(offset_of!(LightUbo, color), 96);
        assert_eq!(offset_of!(LightUbo, params), 112);
    }

    #[test]
    fn test_push_constants_fit_guaranteed_limit() {
        assert_eq!(std::mem::size_of::<MeshPushConstants>(), 128);
        assert_eq!(std::mem::size_of::<ShadowPushConstants>(), 128);
    }

    #[test]
    fn test_camera_ubo_from_camera() {
        let mut camera = Camera::default();
        camera.set_position(Vec3::new(0.0, 3.0, 5.0));
        camera.set_target(Vec3::ZERO);

        let ubo = CameraUbo::from_camera(&camera);
        assert_eq!(ubo.view_projection, ubo.projection * ubo.view);
        assert_eq!(ubo.camera_position, camera.position());
    }

    #[test]
    fn test_default_light_is_absent() {
        let ubo = LightUbo::default();
        assert!(!ubo.has_light());
        assert!(!ubo.has_shadow());
    }

    #[test]
    fn test_directional_light_ubo() {
        let light = DirectionalLight::new(Vec3::new(0.0, -2.0, 0.0), Vec3::ONE);
        let ubo = LightUbo::directional(&light, Some(Mat4::from_scale(Vec3::splat(2.0))));

        assert_eq!(ubo.position.w, LIGHT_TYPE_DIRECTIONAL);
        assert_eq!(ubo.direction.truncate(), Vec3::NEG_Y);
        assert_eq!(ubo.color.w, light.ambient_strength);
        assert!(ubo.has_light());
        assert!(ubo.has_shadow());
    }

    #[test]
    fn test_point_light_without_shadow() {
        let light = PointLight::default();
        let ubo = LightUbo::point(&light, None);

        assert_eq!(ubo.position, light.position.extend(LIGHT_TYPE_POINT));
        assert_eq!(ubo.direction.w, light.radius);
        assert_eq!(ubo.light_space, Mat4::IDENTITY);
        assert!(ubo.has_light());
        assert!(!ubo.has_shadow());
    }
}
