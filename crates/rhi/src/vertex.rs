//! Mesh vertex format and its input descriptions.
//!
//! # Memory Layout
//!
//! | offset | field | format | location |
//! |---|---|---|---|
//! | 0 | position | R32G32B32_SFLOAT | 0 |
//! | 12 | normal | R32G32B32_SFLOAT | 1 |
//! | 24 | tex_coord | R32G32_SFLOAT | 2 |
//! | 32 | tangent | R32G32B32_SFLOAT | 3 |
//! | 44 | bitangent | R32G32B32_SFLOAT | 4 |
//!
//! Total size: 56 bytes.

use std::hash::{Hash, Hasher};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Vertex used by every mesh pipeline.
///
/// Equality and hashing consider only position, normal and tex_coord:
/// tangents are derived after deduplication.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tex_coord: Vec2,
    pub tangent: Vec3,
    pub bitangent: Vec3,
}

impl Vertex {
    #[inline]
    pub const fn new(position: Vec3, normal: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position,
            normal,
            tex_coord,
            tangent: Vec3::ZERO,
            bitangent: Vec3::ZERO,
        }
    }

    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: Self::size() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 5] {
        let attr = |location, format, offset| vk::VertexInputAttributeDescription {
            binding: 0,
            location,
            format,
            offset,
        };
        [
            attr(0, vk::Format::R32G32B32_SFLOAT, 0),
            attr(1, vk::Format::R32G32B32_SFLOAT, 12),
            attr(2, vk::Format::R32G32_SFLOAT, 24),
            attr(3, vk::Format::R32G32B32_SFLOAT, 32),
            attr(4, vk::Format::R32G32B32_SFLOAT, 44),
        ]
    }

    fn key(&self) -> [u32; 8] {
        [
            self.position.x.to_bits(),
            self.position.y.to_bits(),
            self.position.z.to_bits(),
            self.normal.x.to_bits(),
            self.normal.y.to_bits(),
            self.normal.z.to_bits(),
            self.tex_coord.x.to_bits(),
            self.tex_coord.y.to_bits(),
        ]
    }
}

impl PartialEq for Vertex {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Vertex {}

impl Hash for Vertex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::mem::offset_of;

    use super::*;

    #[test]
    fn test_vertex_size_and_offsets() {
        assert_eq!(Vertex::size(), 56);
        assert_eq!(offset_of!(Vertex, position), 0);
        assert_eq!(offset_of!(Vertex, normal), 12);
        assert_eq!(offset_of!(Vertex, tex_coord), 24);
        assert_eq!(offset_of!(Vertex, tangent), 32);
        assert_eq!(offset_of!(Vertex, bitangent), 44);
    }

    #[test]
    fn test_attribute_descriptions_match_layout() {
        let binding = Vertex::binding_description();
        assert_eq!(binding.stride, 56);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);

        let attrs = Vertex::attribute_descriptions();
        let locations: Vec<u32> = attrs.iter().map(|a| a.location).collect();
        assert_eq!(locations, vec![0, 1, 2, 3, 4]);
        assert_eq!(attrs[2].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attrs[4].offset, 44);
    }

    #[test]
    fn test_equality_ignores_tangent_frame() {
        let mut a = Vertex::new(Vec3::ONE, Vec3::Y, Vec2::new(0.5, 0.25));
        let b = a;
        a.tangent = Vec3::X;
        a.bitangent = Vec3::Z;
        assert_eq!(a, b);

        let mut map = HashMap::new();
        map.insert(a, 0u32);
        assert_eq!(map.get(&b), Some(&0));
    }

    #[test]
    fn test_distinct_uv_is_distinct_vertex() {
        let a = Vertex::new(Vec3::ZERO, Vec3::Y, Vec2::ZERO);
        let b = Vertex::new(Vec3::ZERO, Vec3::Y, Vec2::X);
        assert_ne!(a, b);
    }
}
