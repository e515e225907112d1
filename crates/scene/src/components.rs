//! Components that reference renderer resources.

use std::fmt;
use std::rc::Rc;

use renderer_resources::Material;

/// Names a mesh in the mesh manager.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MeshRef(pub String);

impl MeshRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Shared handle to a material.
///
/// Entities hold strong references; the material manager only keeps weak
/// ones, so a material dies with the last entity using it.
#[derive(Clone)]
pub struct MaterialRef(pub Rc<Material>);

impl MaterialRef {
    pub fn new(material: Rc<Material>) -> Self {
        Self(material)
    }

    pub fn material(&self) -> &Rc<Material> {
        &self.0
    }
}

impl fmt::Debug for MaterialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MaterialRef").field(&self.0.id()).finish()
    }
}

/// Human-readable entity name, used in logs.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Name(pub String);

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
