//! Resource loading and management.
//!
//! This crate owns the GPU-side assets the renderer draws with:
//! - OBJ mesh import, procedural primitives and the named mesh store
//! - Texture loading, interning and the magenta fallback
//! - Materials, their uniform buffers and material descriptor sets

pub mod error;
pub mod material;
pub mod mesh;
pub mod mesh_manager;
pub mod primitives;
pub mod texture;

pub use error::{ResourceError, ResourceResult};
pub use material::{
    BasicMaterialConfig, Material, MaterialConfig, MaterialKind, MaterialManager,
    PbrMaterialConfig, TextureSlot,
};
pub use mesh::{Mesh, MeshData, MeshTopology};
pub use mesh_manager::{DEFAULT_PIPELINE, MeshManager, WIRE_PIPELINE};
pub use texture::TextureManager;
