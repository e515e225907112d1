//! Texture loading and interning.

use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use renderer_core::ResourcePaths;
use renderer_rhi::command::CommandPool;
use renderer_rhi::debug::DebugUtils;
use renderer_rhi::device::Device;
use renderer_rhi::texture::Texture;
use tracing::{debug, info, warn};

use crate::error::{ResourceError, ResourceResult};

const FALLBACK_NAME: &str = "fallback_magenta";
const MAGENTA: [u8; 4] = [255, 0, 255, 255];

/// Decoded RGBA8 pixels.
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Reads and decodes an image file into tightly packed RGBA8.
pub fn decode_rgba8(path: &Path) -> ResourceResult<DecodedImage> {
    if !path.exists() {
        return Err(ResourceError::FileNotFound(path.to_path_buf()));
    }
    let rgba = image::open(path)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(DecodedImage {
        width,
        height,
        pixels: rgba.into_raw(),
    })
}

/// Loads textures from `<root>/textures/` and hands out shared references.
///
/// A file is decoded and uploaded once; later requests for the same name
/// return the same [`Rc`].
pub struct TextureManager {
    device: Arc<Device>,
    command_pool: Arc<CommandPool>,
    debug_utils: Arc<DebugUtils>,
    paths: ResourcePaths,
    textures: HashMap<String, Rc<Texture>>,
    fallback: Option<Rc<Texture>>,
}

impl TextureManager {
    pub fn new(
        device: Arc<Device>,
        command_pool: Arc<CommandPool>,
        debug_utils: Arc<DebugUtils>,
        paths: ResourcePaths,
    ) -> Self {
        Self {
            device,
            command_pool,
            debug_utils,
            paths,
            textures: HashMap::new(),
            fallback: None,
        }
    }

    /// Returns the texture named `name`, loading it on first use.
    pub fn load(&mut self, name: &str) -> ResourceResult<Rc<Texture>> {
        if let Some(texture) = self.textures.get(name) {
            return Ok(Rc::clone(texture));
        }

        let path = self.paths.texture(name);
        let image = decode_rgba8(&path).inspect_err(|e| {
            warn!("Failed to load texture '{}': {}", path.display(), e);
        })?;
        let texture = Rc::new(self.upload(name, &image)?);

        info!(
            "Texture '{}' loaded ({}x{})",
            name, image.width, image.height
        );
        self.textures.insert(name.to_string(), Rc::clone(&texture));
        Ok(texture)
    }

    /// Like [`load`](Self::load), but substitutes the fallback texture when
    /// the file is missing or cannot be decoded.
    pub fn load_or_fallback(&mut self, name: &str) -> ResourceResult<Rc<Texture>> {
        match self.load(name) {
            Ok(texture) => Ok(texture),
            Err(ResourceError::Rhi(e)) => Err(ResourceError::Rhi(e)),
            Err(_) => self.fallback(),
        }
    }

    /// 1×1 magenta texture, created on first request.
    pub fn fallback(&mut self) -> ResourceResult<Rc<Texture>> {
        if let Some(texture) = &self.fallback {
            return Ok(Rc::clone(texture));
        }
        let image = DecodedImage {
            width: 1,
            height: 1,
            pixels: MAGENTA.to_vec(),
        };
        let texture = Rc::new(self.upload(FALLBACK_NAME, &image)?);
        self.fallback = Some(Rc::clone(&texture));
        Ok(texture)
    }

    fn upload(&self, name: &str, image: &DecodedImage) -> ResourceResult<Texture> {
        Ok(Texture::from_rgba8(
            self.device.clone(),
            &self.command_pool,
            &self.debug_utils,
            name,
            image.width,
            image.height,
            &image.pixels,
        )?)
    }

    /// Drops textures no material holds any more. Returns how many were
    /// released.
    pub fn release_unused(&mut self) -> usize {
        let before = self.textures.len();
        self.textures.retain(|name, texture| {
            let keep = Rc::strong_count(texture) > 1;
            if !keep {
                debug!("Releasing texture '{}'", name);
            }
            keep
        });
        before - self.textures.len()
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_missing_file() {
        let path = std::env::temp_dir().join("renderer_resources_missing_texture.png");
        assert!(matches!(
            decode_rgba8(&path),
            Err(ResourceError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_decode_png_to_rgba8() {
        let path = std::env::temp_dir().join("renderer_resources_decode_test.png");
        let img = image::RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30]));
        img.save(&path).expect("write test png");

        let decoded = decode_rgba8(&path).expect("decode");
        assert_eq!((decoded.width, decoded.height), (3, 2));
        assert_eq!(decoded.pixels.len(), 3 * 2 * 4);
        assert_eq!(&decoded.pixels[..4], &[10, 20, 30, 255]);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_decode_garbage_is_image_error() {
        let path = std::env::temp_dir().join("renderer_resources_garbage.png");
        std::fs::write(&path, b"definitely not a png").expect("write");
        assert!(matches!(decode_rgba8(&path), Err(ResourceError::Image(_))));
        let _ = std::fs::remove_file(path);
    }
}
