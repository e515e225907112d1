//! Error types for resource loading.

use std::path::PathBuf;

use renderer_rhi::RhiError;
use thiserror::Error;

/// Error type for resource loading operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// File not found under the resource root.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// The OBJ parser rejected the file.
    #[error("Failed to load OBJ file '{path}': {source}")]
    ObjLoad {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },

    /// The OBJ file parsed but yielded no triangles.
    #[error("OBJ file '{0}' contains no triangles")]
    EmptyMesh(PathBuf),

    /// Image decoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A name lookup missed.
    #[error("Unknown {kind} '{name}'")]
    Unknown { kind: &'static str, name: String },

    /// GPU object creation failed.
    #[error(transparent)]
    Rhi(#[from] RhiError),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_names_kind() {
        let err = ResourceError::Unknown {
            kind: "mesh",
            name: "teapot.obj".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown mesh 'teapot.obj'");
    }

    #[test]
    fn test_rhi_error_converts() {
        let err: ResourceError = RhiError::ResourceCreation("vertex buffer".into()).into();
        assert!(matches!(err, ResourceError::Rhi(_)));
    }
}
