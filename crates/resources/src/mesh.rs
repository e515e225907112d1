//! CPU-side mesh data and its GPU counterpart.
//!
//! [`MeshData`] holds deduplicated vertices and indices and carries the
//! processing steps applied to imported geometry: centring, planar UV
//! generation, smooth normals and tangent frames. Everything here except
//! [`Mesh::upload`] runs without a device.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glam::{Vec2, Vec3};
use renderer_rhi::buffer::{Buffer, BufferUsage};
use renderer_rhi::device::Device;
use renderer_rhi::vertex::Vertex;
use tracing::debug;

use crate::error::{ResourceError, ResourceResult};

/// Below this absolute UV determinant a triangle has no usable UV frame.
const DEGENERATE_UV_DET: f32 = 1e-6;

/// How the index buffer is assembled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeshTopology {
    TriangleList,
    LineList,
}

/// Vertex and index vectors for one mesh.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Builds an indexed mesh from triangle corners, merging corners that
    /// are equal under the vertex hash (position, normal, tex_coord).
    pub fn from_corners<I>(corners: I) -> Self
    where
        I: IntoIterator<Item = Vertex>,
    {
        let mut unique: HashMap<Vertex, u32> = HashMap::new();
        let mut data = Self::default();

        for vertex in corners {
            let index = *unique.entry(vertex).or_insert_with(|| {
                data.vertices.push(vertex);
                (data.vertices.len() - 1) as u32
            });
            data.indices.push(index);
        }

        data
    }

    /// Loads and processes a Wavefront OBJ file.
    ///
    /// A path that does not exist is retried with a lower-case file name
    /// before failing with [`ResourceError::FileNotFound`].
    pub fn load_obj(path: &Path) -> ResourceResult<Self> {
        let path = resolve_case(path)?;
        let options = tobj::LoadOptions {
            triangulate: true,
            single_index: false,
            ..Default::default()
        };
        let (models, _materials) =
            tobj::load_obj(&path, &options).map_err(|source| ResourceError::ObjLoad {
                path: path.clone(),
                source,
            })?;

        let mut has_tex_coords = false;
        let mut corners = Vec::new();
        for model in &models {
            let mesh = &model.mesh;
            let with_uv = !mesh.texcoords.is_empty() && !mesh.texcoord_indices.is_empty();
            let with_normal = !mesh.normals.is_empty() && !mesh.normal_indices.is_empty();
            has_tex_coords |= with_uv;

            for (corner, &position_index) in mesh.indices.iter().enumerate() {
                let position = vec3_at(&mesh.positions, position_index);
                let tex_coord = if with_uv {
                    let uv = vec2_at(&mesh.texcoords, mesh.texcoord_indices[corner]);
                    Vec2::new(uv.x, 1.0 - uv.y)
                } else {
                    Vec2::ZERO
                };
                let normal = if with_normal {
                    vec3_at(&mesh.normals, mesh.normal_indices[corner])
                } else {
                    Vec3::ZERO
                };
                corners.push(Vertex::new(position, normal, tex_coord));
            }
        }

        if corners.len() < 3 {
            return Err(ResourceError::EmptyMesh(path));
        }

        let mut data = Self::from_corners(corners);
        data.process(has_tex_coords);

        debug!(
            "Loaded OBJ '{}': {} vertices, {} triangles",
            path.display(),
            data.vertices.len(),
            data.triangle_count()
        );

        Ok(data)
    }

    /// Post-import processing applied to every loaded model.
    pub fn process(&mut self, has_tex_coords: bool) {
        self.center();
        if !has_tex_coords {
            self.generate_tex_coords();
        }
        if self
            .vertices
            .first()
            .is_some_and(|v| v.normal == Vec3::ZERO)
        {
            self.compute_normals();
        }
        self.compute_tangents();
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Translates the mesh so its bounding box is centred on the origin.
    pub fn center(&mut self) {
        let Some(first) = self.vertices.first() else {
            return;
        };
        let (min, max) = self
            .vertices
            .iter()
            .fold((first.position, first.position), |(min, max), v| {
                (min.min(v.position), max.max(v.position))
            });
        let center = (min + max) * 0.5;
        for vertex in &mut self.vertices {
            vertex.position -= center;
        }
    }

    /// Derives texture coordinates for geometry imported without them.
    ///
    /// Triangles with a usable UV frame project positions onto their
    /// normalized tangent and bitangent; the rest fall back to a planar
    /// projection along the dominant axis of the face normal.
    pub fn generate_tex_coords(&mut self) {
        for tri in self.indices.chunks_exact(3) {
            let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let (v0, v1, v2) = (self.vertices[i0], self.vertices[i1], self.vertices[i2]);

            let projected = match uv_frame(&v0, &v1, &v2) {
                Some((tangent, bitangent)) => {
                    let (t, b) = (tangent.normalize_or_zero(), bitangent.normalize_or_zero());
                    let project = |p: Vec3| Vec2::new(p.dot(t), p.dot(b));
                    [project(v0.position), project(v1.position), project(v2.position)]
                }
                None => {
                    let axis = dominant_axis(v0.position, v1.position, v2.position);
                    let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
                    let project = |p: Vec3| Vec2::new(p[u], p[v]);
                    [project(v0.position), project(v1.position), project(v2.position)]
                }
            };

            self.vertices[i0].tex_coord = projected[0];
            self.vertices[i1].tex_coord = projected[1];
            self.vertices[i2].tex_coord = projected[2];
        }
    }

    /// Replaces every vertex normal with the normalized sum of the unit
    /// normals of the triangles that reference it.
    pub fn compute_normals(&mut self) {
        let mut accumulated = vec![Vec3::ZERO; self.vertices.len()];

        for tri in self.indices.chunks_exact(3) {
            let p0 = self.vertices[tri[0] as usize].position;
            let p1 = self.vertices[tri[1] as usize].position;
            let p2 = self.vertices[tri[2] as usize].position;
            let face = (p1 - p0).cross(p2 - p0).normalize_or_zero();
            for &index in tri {
                accumulated[index as usize] += face;
            }
        }

        for (vertex, normal) in self.vertices.iter_mut().zip(accumulated) {
            vertex.normal = normal.normalize_or_zero();
        }
    }

    /// Accumulates per-triangle tangents and `normal × tangent`
    /// bitangents into each vertex.
    pub fn compute_tangents(&mut self) {
        for vertex in &mut self.vertices {
            vertex.tangent = Vec3::ZERO;
            vertex.bitangent = Vec3::ZERO;
        }

        for tri in self.indices.chunks_exact(3) {
            let corners = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let (v0, v1, v2) = (
                self.vertices[corners[0]],
                self.vertices[corners[1]],
                self.vertices[corners[2]],
            );
            let Some((tangent, _)) = uv_frame(&v0, &v1, &v2) else {
                continue;
            };
            for index in corners {
                let vertex = &mut self.vertices[index];
                vertex.tangent += tangent;
                vertex.bitangent += vertex.normal.cross(tangent);
            }
        }

        for vertex in &mut self.vertices {
            vertex.tangent = vertex.tangent.normalize_or_zero();
            vertex.bitangent = vertex.bitangent.normalize_or_zero();
        }
    }
}

/// Tangent and bitangent of a triangle from its edge and UV deltas, or
/// `None` when the UV determinant is degenerate.
fn uv_frame(v0: &Vertex, v1: &Vertex, v2: &Vertex) -> Option<(Vec3, Vec3)> {
    let edge1 = v1.position - v0.position;
    let edge2 = v2.position - v0.position;
    let duv1 = v1.tex_coord - v0.tex_coord;
    let duv2 = v2.tex_coord - v0.tex_coord;

    let det = duv1.x * duv2.y - duv2.x * duv1.y;
    if det.abs() < DEGENERATE_UV_DET {
        return None;
    }

    let f = 1.0 / det;
    let tangent = f * (duv2.y * edge1 - duv1.y * edge2);
    let bitangent = f * (-duv2.x * edge1 + duv1.x * edge2);
    Some((tangent, bitangent))
}

/// Axis (0 = X, 1 = Y, 2 = Z) along which the face normal is largest.
fn dominant_axis(p0: Vec3, p1: Vec3, p2: Vec3) -> usize {
    let n = (p1 - p0).cross(p2 - p0).abs();
    if n.x > n.y && n.x > n.z {
        0
    } else if n.y > n.z {
        1
    } else {
        2
    }
}

fn vec3_at(values: &[f32], index: u32) -> Vec3 {
    let i = index as usize * 3;
    values
        .get(i..i + 3)
        .map(Vec3::from_slice)
        .unwrap_or(Vec3::ZERO)
}

fn vec2_at(values: &[f32], index: u32) -> Vec2 {
    let i = index as usize * 2;
    values
        .get(i..i + 2)
        .map(Vec2::from_slice)
        .unwrap_or(Vec2::ZERO)
}

fn resolve_case(path: &Path) -> ResourceResult<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    let lowered = path
        .file_name()
        .map(|name| path.with_file_name(name.to_string_lossy().to_lowercase()));
    match lowered {
        Some(candidate) if candidate.exists() => Ok(candidate),
        _ => Err(ResourceError::FileNotFound(path.to_path_buf())),
    }
}

/// A mesh resident on the GPU together with the CPU copy it was built from.
pub struct Mesh {
    name: String,
    data: MeshData,
    topology: MeshTopology,
    pipeline_name: String,
    vertex_buffer: Buffer,
    index_buffer: Buffer,
}

impl Mesh {
    /// Copies `data` into host-visible vertex and index buffers.
    pub fn upload(
        device: Arc<Device>,
        name: &str,
        data: MeshData,
        topology: MeshTopology,
        pipeline_name: &str,
    ) -> ResourceResult<Self> {
        let vertex_buffer = Buffer::new_with_data(
            device.clone(),
            BufferUsage::Vertex,
            bytemuck::cast_slice(&data.vertices),
        )?;
        let index_buffer = Buffer::new_with_data(
            device,
            BufferUsage::Index,
            bytemuck::cast_slice(&data.indices),
        )?;

        Ok(Self {
            name: name.to_string(),
            data,
            topology,
            pipeline_name: pipeline_name.to_string(),
            vertex_buffer,
            index_buffer,
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn data(&self) -> &MeshData {
        &self.data
    }

    #[inline]
    pub fn topology(&self) -> MeshTopology {
        self.topology
    }

    /// Pipeline this mesh is drawn with.
    #[inline]
    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    pub fn set_pipeline_name(&mut self, name: &str) {
        self.pipeline_name = name.to_string();
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.data.indices.len() as u32
    }

    #[inline]
    pub fn vertex_buffer(&self) -> &Buffer {
        &self.vertex_buffer
    }

    #[inline]
    pub fn index_buffer(&self) -> &Buffer {
        &self.index_buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corner(x: f32, y: f32, z: f32) -> Vertex {
        Vertex::new(Vec3::new(x, y, z), Vec3::ZERO, Vec2::ZERO)
    }

    #[test]
    fn test_from_corners_merges_equal_vertices() {
        let quad = [
            corner(0.0, 0.0, 0.0),
            corner(1.0, 0.0, 0.0),
            corner(1.0, 1.0, 0.0),
            corner(0.0, 0.0, 0.0),
            corner(1.0, 1.0, 0.0),
            corner(0.0, 1.0, 0.0),
        ];
        let data = MeshData::from_corners(quad);
        assert_eq!(data.vertices.len(), 4);
        assert_eq!(data.indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn test_center_uses_bounding_box() {
        let mut data = MeshData::from_corners([
            corner(2.0, 2.0, 2.0),
            corner(4.0, 2.0, 2.0),
            corner(4.0, 6.0, 2.0),
        ]);
        data.center();
        assert_eq!(data.vertices[0].position, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(data.vertices[2].position, Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_compute_normals_flat_triangle() {
        let mut data = MeshData::from_corners([
            corner(0.0, 0.0, 0.0),
            corner(0.0, 0.0, 1.0),
            corner(1.0, 0.0, 0.0),
        ]);
        data.compute_normals();
        for v in &data.vertices {
            assert!((v.normal - Vec3::Y).length() < 1e-6);
        }
    }

    #[test]
    fn test_compute_normals_averages_adjacent_faces() {
        // Two faces meeting at a right angle along the Z axis.
        let mut data = MeshData::from_corners([
            corner(0.0, 0.0, 0.0),
            corner(0.0, 0.0, 1.0),
            corner(1.0, 0.0, 0.0),
            corner(0.0, 0.0, 0.0),
            corner(0.0, 1.0, 0.0),
            corner(0.0, 0.0, 1.0),
        ]);
        data.compute_normals();
        let shared = data.vertices[0].normal;
        let expected = (Vec3::Y + Vec3::X).normalize();
        assert!((shared - expected).length() < 1e-5);
        assert!((shared.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_generate_tex_coords_projects_degenerate_uvs() {
        let mut data = MeshData::from_corners([
            corner(0.0, 0.0, 0.0),
            corner(0.0, 0.0, 2.0),
            corner(3.0, 0.0, 0.0),
        ]);
        data.generate_tex_coords();
        // Normal along Y: u = Z, v = X.
        assert_eq!(data.vertices[1].tex_coord, Vec2::new(2.0, 0.0));
        assert_eq!(data.vertices[2].tex_coord, Vec2::new(0.0, 3.0));
    }

    #[test]
    fn test_tangents_follow_uv_direction() {
        let mut data = MeshData::from_corners([
            Vertex::new(Vec3::ZERO, Vec3::Z, Vec2::new(0.0, 0.0)),
            Vertex::new(Vec3::X, Vec3::Z, Vec2::new(1.0, 0.0)),
            Vertex::new(Vec3::Y, Vec3::Z, Vec2::new(0.0, 1.0)),
        ]);
        data.compute_tangents();
        for v in &data.vertices {
            assert!((v.tangent - Vec3::X).length() < 1e-6);
            assert!((v.bitangent - Vec3::Y).length() < 1e-6);
        }
    }

    #[test]
    fn test_tangents_skip_degenerate_uvs() {
        let mut data = MeshData::from_corners([
            corner(0.0, 0.0, 0.0),
            corner(1.0, 0.0, 0.0),
            corner(0.0, 1.0, 0.0),
        ]);
        data.compute_tangents();
        assert!(data.vertices.iter().all(|v| v.tangent == Vec3::ZERO));
        assert!(data.vertices.iter().all(|v| !v.tangent.is_nan()));
    }

    #[test]
    fn test_dominant_axis() {
        assert_eq!(dominant_axis(Vec3::ZERO, Vec3::Y, Vec3::Z), 0);
        assert_eq!(dominant_axis(Vec3::ZERO, Vec3::Z, Vec3::X), 1);
        assert_eq!(dominant_axis(Vec3::ZERO, Vec3::X, Vec3::Y), 2);
    }

    #[test]
    fn test_missing_obj_is_file_not_found() {
        let path = std::env::temp_dir().join("renderer_resources_missing_mesh.obj");
        let result = MeshData::load_obj(&path);
        assert!(matches!(result, Err(ResourceError::FileNotFound(_))));
    }
}
