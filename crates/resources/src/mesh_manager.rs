//! Named mesh storage.

use std::collections::HashMap;
use std::sync::Arc;

use renderer_core::ResourcePaths;
use renderer_rhi::device::Device;
use tracing::{debug, info};

use crate::error::{ResourceError, ResourceResult};
use crate::mesh::{Mesh, MeshData, MeshTopology};
use crate::primitives;

/// Pipeline used by imported models and solid primitives.
pub const DEFAULT_PIPELINE: &str = "pbr";
/// Pipeline used by line-list meshes.
pub const WIRE_PIPELINE: &str = "debug_wire";

/// Owns every GPU mesh, keyed by name.
///
/// Meshes live until [`MeshManager::unload`] or until the manager is
/// dropped at shutdown.
pub struct MeshManager {
    device: Arc<Device>,
    paths: ResourcePaths,
    meshes: HashMap<String, Mesh>,
}

impl MeshManager {
    pub fn new(device: Arc<Device>, paths: ResourcePaths) -> Self {
        Self {
            device,
            paths,
            meshes: HashMap::new(),
        }
    }

    /// Loads `<root>/models/<name>` once and returns its name.
    pub fn load_obj(&mut self, name: &str, pipeline_name: &str) -> ResourceResult<String> {
        if self.meshes.contains_key(name) {
            return Ok(name.to_string());
        }

        let data = MeshData::load_obj(&self.paths.model(name))?;
        self.insert(name, data, MeshTopology::TriangleList, pipeline_name)?;
        info!("Model '{}' loaded", name);
        Ok(name.to_string())
    }

    pub fn create_cube(&mut self, size: f32) -> ResourceResult<String> {
        let name = primitives::cube_name(size);
        self.get_or_generate(name, MeshTopology::TriangleList, DEFAULT_PIPELINE, || {
            primitives::cube(size)
        })
    }

    pub fn create_plane(&mut self, size: f32, divisions: u32) -> ResourceResult<String> {
        let name = primitives::plane_name(size, divisions);
        self.get_or_generate(name, MeshTopology::TriangleList, DEFAULT_PIPELINE, || {
            primitives::plane(size, divisions)
        })
    }

    pub fn create_sphere(&mut self, radius: f32, segments: u32, rings: u32) -> ResourceResult<String> {
        let name = primitives::sphere_name(radius, segments, rings);
        self.get_or_generate(name, MeshTopology::TriangleList, DEFAULT_PIPELINE, || {
            primitives::sphere(radius, segments, rings)
        })
    }

    pub fn create_cylinder(
        &mut self,
        radius: f32,
        height: f32,
        segments: u32,
    ) -> ResourceResult<String> {
        let name = primitives::cylinder_name(radius, height, segments);
        self.get_or_generate(name, MeshTopology::TriangleList, DEFAULT_PIPELINE, || {
            primitives::cylinder(radius, height, segments)
        })
    }

    pub fn create_line_plane(&mut self) -> ResourceResult<String> {
        self.get_or_generate(
            primitives::LINE_PLANE_NAME.to_string(),
            MeshTopology::LineList,
            WIRE_PIPELINE,
            primitives::line_plane,
        )
    }

    fn get_or_generate(
        &mut self,
        name: String,
        topology: MeshTopology,
        pipeline_name: &str,
        generate: impl FnOnce() -> MeshData,
    ) -> ResourceResult<String> {
        if !self.meshes.contains_key(&name) {
            self.insert(&name, generate(), topology, pipeline_name)?;
            debug!("{} generated", name);
        }
        Ok(name)
    }

    fn insert(
        &mut self,
        name: &str,
        data: MeshData,
        topology: MeshTopology,
        pipeline_name: &str,
    ) -> ResourceResult<()> {
        let mesh = Mesh::upload(self.device.clone(), name, data, topology, pipeline_name)?;
        self.meshes.insert(name.to_string(), mesh);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Mesh> {
        self.meshes.get(name)
    }

    /// Changes the pipeline a mesh is drawn with.
    pub fn set_pipeline(&mut self, name: &str, pipeline_name: &str) -> ResourceResult<()> {
        let mesh = self
            .meshes
            .get_mut(name)
            .ok_or_else(|| ResourceError::Unknown {
                kind: "mesh",
                name: name.to_string(),
            })?;
        mesh.set_pipeline_name(pipeline_name);
        Ok(())
    }

    /// Drops a mesh and its buffers. The caller must ensure no in-flight
    /// frame still references them.
    pub fn unload(&mut self, name: &str) -> bool {
        let removed = self.meshes.remove(name).is_some();
        if removed {
            debug!("Mesh '{}' unloaded", name);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}
