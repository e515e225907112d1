//! Asset path resolution.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

const ASSET_DIR: &str = "assets";

/// Resolves shader, model and texture paths under a resource root.
///
/// Constructed once at startup and handed to whoever loads files.
#[derive(Debug, Clone)]
pub struct ResourcePaths {
    root: PathBuf,
}

impl ResourcePaths {
    /// Use an explicit root directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Find the asset directory.
    ///
    /// Search order: `override_root`, `assets/` beside the executable, then
    /// `assets/` in the current directory or any of its ancestors.
    pub fn discover(override_root: Option<&Path>) -> Self {
        if let Some(root) = override_root {
            return Self::new(root);
        }

        let beside_exe = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(ASSET_DIR)));
        if let Some(dir) = beside_exe
            && dir.is_dir()
        {
            debug!("Resource root next to executable: {:?}", dir);
            return Self::new(dir);
        }

        if let Ok(cwd) = std::env::current_dir() {
            for ancestor in cwd.ancestors() {
                let dir = ancestor.join(ASSET_DIR);
                if dir.is_dir() {
                    debug!("Resource root: {:?}", dir);
                    return Self::new(dir);
                }
            }
        }

        warn!("No '{}' directory found, using relative path", ASSET_DIR);
        Self::new(ASSET_DIR)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/shaders/<name>.spv`
    pub fn shader(&self, name: &str) -> PathBuf {
        self.root.join("shaders").join(format!("{name}.spv"))
    }

    pub fn model(&self, name: &str) -> PathBuf {
        self.root.join("models").join(name)
    }

    pub fn texture(&self, name: &str) -> PathBuf {
        self.root.join("textures").join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_paths_get_spv_extension() {
        let paths = ResourcePaths::new("/res");
        assert_eq!(paths.shader("pbr.vert"), PathBuf::from("/res/shaders/pbr.vert.spv"));
        assert_eq!(paths.texture("brick.png"), PathBuf::from("/res/textures/brick.png"));
        assert_eq!(paths.model("monkey.obj"), PathBuf::from("/res/models/monkey.obj"));
    }

    #[test]
    fn override_root_wins() {
        let paths = ResourcePaths::discover(Some(Path::new("/custom")));
        assert_eq!(paths.root(), Path::new("/custom"));
    }
}
