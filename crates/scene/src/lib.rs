//! Scene description read by the renderer.
//!
//! This crate provides:
//! - A generational entity registry with sparse-set component columns
//! - Transform, camera and light components
//! - Mesh and material references into the resource managers

pub mod camera;
pub mod components;
pub mod light;
pub mod registry;
pub mod transform;

pub use camera::Camera;
pub use components::{MaterialRef, MeshRef, Name};
pub use light::{DirectionalLight, PointLight};
pub use registry::{Component, Entity, Registry, SparseSet};
pub use transform::Transform;
