//! Light components.

use glam::Vec3;

/// A sun-like light with parallel rays.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels in. Not required to be normalized.
    pub direction: Vec3,
    pub color: Vec3,
    pub ambient_strength: f32,
    pub specular_strength: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.2, -1.0, -0.3),
            color: Vec3::ONE,
            ambient_strength: 0.075,
            specular_strength: 0.5,
        }
    }
}

impl DirectionalLight {
    pub fn new(direction: Vec3, color: Vec3) -> Self {
        Self {
            direction,
            color,
            ..Self::default()
        }
    }

    /// Unit direction, or straight down if `direction` is zero.
    pub fn normalized_direction(&self) -> Vec3 {
        self.direction.try_normalize().unwrap_or(Vec3::NEG_Y)
    }
}

/// An omnidirectional light with a finite reach.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    /// Distance beyond which the light contributes nothing.
    pub radius: f32,
    pub ambient_strength: f32,
    pub specular_strength: f32,
    pub shininess: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::new(-6.0, 6.0, 6.0),
            color: Vec3::ONE,
            radius: 50.0,
            ambient_strength: 0.1,
            specular_strength: 0.5,
            shininess: 32.0,
        }
    }
}

impl PointLight {
    pub fn new(position: Vec3, color: Vec3, radius: f32) -> Self {
        Self {
            position,
            color,
            radius,
            ..Self::default()
        }
    }
}
