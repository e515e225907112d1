//! Perspective camera component.

use glam::{Mat4, Vec3};

/// Pitch is kept strictly inside ±90° so the view basis never degenerates.
const PITCH_LIMIT: f32 = 89.0;

/// A yaw/pitch perspective camera.
///
/// Angles are in degrees. Yaw -90° with zero pitch looks down -Z.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    position: Vec3,
    yaw: f32,
    pitch: f32,
    front: Vec3,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(45.0, 16.0 / 9.0, 0.1, 1000.0)
    }
}

impl Camera {
    pub fn new(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            fov,
            aspect,
            near,
            far,
            position: Vec3::new(0.0, 0.0, 1.0),
            yaw: -90.0,
            pitch: 0.0,
            front: Vec3::NEG_Z,
        };
        camera.update_front();
        camera
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    #[inline]
    pub fn front(&self) -> Vec3 {
        self.front
    }

    /// A point one unit ahead of the camera.
    pub fn target(&self) -> Vec3 {
        self.position + self.front
    }

    #[inline]
    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    #[inline]
    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    /// Points the camera at `target`. A target at the camera position is
    /// ignored.
    pub fn set_target(&mut self, target: Vec3) {
        let Some(front) = (target - self.position).try_normalize() else {
            return;
        };
        self.yaw = front.z.atan2(front.x).to_degrees();
        self.pitch = front
            .y
            .asin()
            .to_degrees()
            .clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.update_front();
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    pub fn move_forward(&mut self, distance: f32) {
        self.position += self.front * distance;
    }

    pub fn move_right(&mut self, distance: f32) {
        self.position += self.right() * distance;
    }

    pub fn move_up(&mut self, distance: f32) {
        self.position += Vec3::Y * distance;
    }

    /// Adds to yaw and pitch, clamping pitch to ±89°.
    pub fn rotate(&mut self, yaw: f32, pitch: f32) {
        self.yaw += yaw;
        self.pitch = (self.pitch + pitch).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.update_front();
    }

    pub fn right(&self) -> Vec3 {
        self.front.cross(Vec3::Y).normalize_or_zero()
    }

    fn update_front(&mut self) {
        let (yaw, pitch) = (self.yaw.to_radians(), self.pitch.to_radians());
        self.front = Vec3::new(yaw.cos() * pitch.cos(), pitch.sin(), yaw.sin() * pitch.cos())
            .normalize();
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.front, Vec3::Y)
    }

    /// Perspective projection with Vulkan's Y-flip and `[0, 1]` depth.
    pub fn projection_matrix(&self) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov.to_radians(), self.aspect, self.near, self.far);
        proj.y_axis.y *= -1.0;
        proj
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}
