//! Procedural meshes.
//!
//! Each generator returns finished [`MeshData`] with normals and tangent
//! frames filled in, plus the name the mesh manager stores it under.

use std::f32::consts::PI;

use glam::{Vec2, Vec3};
use renderer_rhi::vertex::Vertex;

use crate::mesh::MeshData;

/// Name of the wireframe line plane.
pub const LINE_PLANE_NAME: &str = "line_plane";

pub fn cube_name(size: f32) -> String {
    format!("cube_{}", size)
}

pub fn plane_name(size: f32, divisions: u32) -> String {
    format!("plane{}_{}", size, divisions)
}

pub fn sphere_name(radius: f32, segments: u32, rings: u32) -> String {
    format!("sphere{}_{}_{}", radius, segments, rings)
}

pub fn cylinder_name(radius: f32, height: f32, segments: u32) -> String {
    format!("cylinder{}_{}_{}", radius, height, segments)
}

fn vertex(position: Vec3, normal: Vec3, tex_coord: Vec2, tangent: Vec3, bitangent: Vec3) -> Vertex {
    Vertex {
        position,
        normal,
        tex_coord,
        tangent,
        bitangent,
    }
}

/// Axis-aligned cube of edge `size` with 24 vertices, four per face, so
/// each face carries its own normal.
pub fn cube(size: f32) -> MeshData {
    let h = size / 2.0;
    let corners = [
        Vec3::new(-h, -h, -h),
        Vec3::new(h, -h, -h),
        Vec3::new(h, h, -h),
        Vec3::new(-h, h, -h),
        Vec3::new(-h, -h, h),
        Vec3::new(h, -h, h),
        Vec3::new(h, h, h),
        Vec3::new(-h, h, h),
    ];
    // (corner indices, normal, tangent, bitangent): front, back, right,
    // left, top, bottom.
    let faces: [([usize; 4], Vec3, Vec3, Vec3); 6] = [
        ([0, 3, 2, 1], Vec3::NEG_Z, Vec3::X, Vec3::NEG_Y),
        ([5, 6, 7, 4], Vec3::Z, Vec3::X, Vec3::NEG_Y),
        ([1, 2, 6, 5], Vec3::X, Vec3::NEG_Z, Vec3::NEG_Y),
        ([4, 7, 3, 0], Vec3::NEG_X, Vec3::NEG_Z, Vec3::NEG_Y),
        ([3, 7, 6, 2], Vec3::Y, Vec3::X, Vec3::Z),
        ([4, 0, 1, 5], Vec3::NEG_Y, Vec3::X, Vec3::Z),
    ];
    let uvs = [
        Vec2::new(0.0, 1.0),
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(1.0, 1.0),
    ];

    let mut data = MeshData::default();
    for (face_corners, normal, tangent, bitangent) in faces {
        let base = data.vertices.len() as u32;
        for (corner, uv) in face_corners.iter().zip(uvs) {
            data.vertices
                .push(vertex(corners[*corner], normal, uv, tangent, bitangent));
        }
        data.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    data
}

/// Flat grid on the XZ plane, `size` wide with `divisions` quads per side.
///
/// Texture coordinates alternate per vertex so every quad spans the full
/// `[0, 1]` range.
pub fn plane(size: f32, divisions: u32) -> MeshData {
    let divisions = divisions.max(1);
    let step = size / divisions as f32;
    let row = divisions + 1;

    let mut data = MeshData::default();
    for i in 0..=divisions {
        for j in 0..=divisions {
            let x = -size / 2.0 + i as f32 * step;
            let z = -size / 2.0 + j as f32 * step;
            data.vertices.push(vertex(
                Vec3::new(x, 0.0, z),
                Vec3::Y,
                Vec2::new((i % 2) as f32, (1 - j % 2) as f32),
                Vec3::X,
                Vec3::Z,
            ));
        }
    }

    for i in 0..divisions {
        for j in 0..divisions {
            let top_left = i * row + j;
            let top_right = top_left + 1;
            let bottom_left = (i + 1) * row + j;
            let bottom_right = bottom_left + 1;
            data.indices.extend_from_slice(&[
                top_left,
                top_right,
                bottom_left,
                top_right,
                bottom_right,
                bottom_left,
            ]);
        }
    }
    data
}

/// UV sphere with `segments` around the equator and `rings` pole to pole.
pub fn sphere(radius: f32, segments: u32, rings: u32) -> MeshData {
    let segments = segments.max(3);
    let rings = rings.max(2);

    let mut data = MeshData::default();
    for ring in 0..=rings {
        let theta = ring as f32 * PI / rings as f32;
        let (sin_theta, cos_theta) = theta.sin_cos();
        for segment in 0..=segments {
            let phi = segment as f32 * 2.0 * PI / segments as f32;
            let (sin_phi, cos_phi) = phi.sin_cos();

            let normal = Vec3::new(cos_phi * sin_theta, cos_theta, sin_phi * sin_theta);
            // At the poles the tangent degenerates; fall back to +X.
            let tangent = Vec3::new(-normal.z, 0.0, normal.x)
                .try_normalize()
                .unwrap_or(Vec3::X);
            data.vertices.push(vertex(
                normal * radius,
                normal,
                Vec2::new(
                    segment as f32 / segments as f32,
                    ring as f32 / rings as f32,
                ),
                tangent,
                normal.cross(tangent),
            ));
        }
    }

    for ring in 0..rings {
        for segment in 0..segments {
            let current = ring * (segments + 1) + segment;
            let next = current + segments + 1;
            data.indices.extend_from_slice(&[
                current,
                next,
                current + 1,
                current + 1,
                next,
                next + 1,
            ]);
        }
    }
    data
}

/// Capped cylinder along Y, centred on the origin.
pub fn cylinder(radius: f32, height: f32, segments: u32) -> MeshData {
    let segments = segments.max(3);
    let half = height / 2.0;
    let angle_of = |i: u32| i as f32 * 2.0 * PI / segments as f32;

    let mut data = MeshData::default();

    // Side band: a bottom/top pair per segment boundary.
    for i in 0..=segments {
        let (sin, cos) = angle_of(i).sin_cos();
        let (x, z) = (cos * radius, sin * radius);
        let normal = Vec3::new(cos, 0.0, sin);
        let tangent = Vec3::new(-z, 0.0, x).normalize_or_zero();
        let bitangent = normal.cross(tangent);
        let u = i as f32 / segments as f32;

        data.vertices.push(vertex(
            Vec3::new(x, -half, z),
            normal,
            Vec2::new(u, 0.0),
            tangent,
            bitangent,
        ));
        data.vertices.push(vertex(
            Vec3::new(x, half, z),
            normal,
            Vec2::new(u, 1.0),
            tangent,
            bitangent,
        ));
    }
    for i in 0..segments {
        let current = i * 2;
        let next = (i + 1) * 2;
        data.indices.extend_from_slice(&[
            current,
            next,
            current + 1,
            current + 1,
            next,
            next + 1,
        ]);
    }

    // Caps: a centre vertex plus a ring, wound to face outward.
    for (y, normal) in [(-half, Vec3::NEG_Y), (half, Vec3::Y)] {
        let center = data.vertices.len() as u32;
        data.vertices.push(vertex(
            Vec3::new(0.0, y, 0.0),
            normal,
            Vec2::splat(0.5),
            Vec3::X,
            Vec3::Z,
        ));
        for i in 0..=segments {
            let (sin, cos) = angle_of(i).sin_cos();
            data.vertices.push(vertex(
                Vec3::new(cos * radius, y, sin * radius),
                normal,
                Vec2::new((cos + 1.0) / 2.0, (sin + 1.0) / 2.0),
                Vec3::X,
                Vec3::Z,
            ));
            if i < segments {
                let (a, b) = (center + i + 1, center + i + 2);
                if normal.y < 0.0 {
                    data.indices.extend_from_slice(&[center, a, b]);
                } else {
                    data.indices.extend_from_slice(&[center, b, a]);
                }
            }
        }
    }
    data
}

/// Unit square outline on the XZ plane, indexed as a line list.
pub fn line_plane() -> MeshData {
    let corners = [
        Vec3::new(-1.0, 0.0, -1.0),
        Vec3::new(1.0, 0.0, -1.0),
        Vec3::new(1.0, 0.0, 1.0),
        Vec3::new(-1.0, 0.0, 1.0),
    ];
    MeshData {
        vertices: corners
            .into_iter()
            .map(|p| vertex(p, Vec3::Y, Vec2::ZERO, Vec3::X, Vec3::Z))
            .collect(),
        indices: vec![0, 1, 1, 2, 2, 3, 3, 0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_valid_triangles(data: &MeshData) {
        assert_eq!(data.indices.len() % 3, 0);
        let count = data.vertices.len() as u32;
        assert!(data.indices.iter().all(|&i| i < count));
    }

    fn face_normal(data: &MeshData, tri: &[u32]) -> Vec3 {
        let p = |i: u32| data.vertices[i as usize].position;
        (p(tri[1]) - p(tri[0])).cross(p(tri[2]) - p(tri[0]))
    }

    #[test]
    fn test_cube_has_unique_face_vertices() {
        let data = cube(1.0);
        assert_eq!(data.vertices.len(), 24);
        assert_eq!(data.indices.len(), 36);
        assert_valid_triangles(&data);
        for v in &data.vertices {
            assert!((v.normal.length() - 1.0).abs() < 1e-6);
            assert_eq!(v.position.abs(), Vec3::splat(0.5));
        }
    }

    #[test]
    fn test_cube_faces_wind_along_their_normals() {
        let data = cube(2.0);
        for tri in data.indices.chunks_exact(3) {
            let n = data.vertices[tri[0] as usize].normal;
            assert!(face_normal(&data, tri).dot(n) > 0.0);
        }
    }

    #[test]
    fn test_plane_grid_counts() {
        let data = plane(10.0, 4);
        assert_eq!(data.vertices.len(), 25);
        assert_eq!(data.indices.len(), 4 * 4 * 6);
        assert_valid_triangles(&data);
        assert_eq!(data.vertices[0].position, Vec3::new(-5.0, 0.0, -5.0));
        assert_eq!(data.vertices[24].position, Vec3::new(5.0, 0.0, 5.0));
    }

    #[test]
    fn test_plane_zero_divisions_is_one_quad() {
        let data = plane(1.0, 0);
        assert_eq!(data.vertices.len(), 4);
        assert_eq!(data.indices.len(), 6);
    }

    #[test]
    fn test_sphere_vertices_lie_on_radius() {
        let data = sphere(2.0, 16, 8);
        assert_eq!(data.vertices.len(), 17 * 9);
        assert_eq!(data.indices.len(), 16 * 8 * 6);
        assert_valid_triangles(&data);
        for v in &data.vertices {
            assert!((v.position.length() - 2.0).abs() < 1e-4);
            assert!(!v.tangent.is_nan());
        }
    }

    #[test]
    fn test_cylinder_counts() {
        let segments = 12;
        let data = cylinder(0.5, 2.0, segments);
        let side = (segments + 1) * 2;
        let caps = 2 * (1 + segments + 1);
        assert_eq!(data.vertices.len() as u32, side + caps);
        assert_eq!(data.indices.len() as u32, segments * 6 + 2 * segments * 3);
        assert_valid_triangles(&data);
    }

    #[test]
    fn test_line_plane_is_line_list() {
        let data = line_plane();
        assert_eq!(data.vertices.len(), 4);
        assert_eq!(data.indices, vec![0, 1, 1, 2, 2, 3, 3, 0]);
    }

    #[test]
    fn test_names() {
        assert_eq!(cube_name(1.0), "cube_1");
        assert_eq!(plane_name(10.0, 4), "plane10_4");
        assert_eq!(sphere_name(0.5, 16, 8), "sphere0.5_16_8");
        assert_eq!(cylinder_name(1.0, 2.0, 12), "cylinder1_2_12");
    }
}
