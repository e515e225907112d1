//! Materials and their GPU resources.
//!
//! A [`Material`] is plain shared state: a uniform config, optional PBR
//! textures and a dirty flag. Scenes hold it through `Rc<Material>`.
//! [`MaterialManager`] owns everything GPU-side that belongs to a material,
//! keyed by the material's id:
//!
//! - a host-visible uniform buffer sized to the config
//! - the cached material descriptor set (set 1 of the mesh pipelines)
//!
//! Both are released by [`MaterialManager::cleanup_unused_materials`] once
//! the last `Rc` to the material is gone.

use std::cell::{Cell, Ref, RefCell};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use renderer_core::ResourcePaths;
use renderer_rhi::buffer::{Buffer, BufferUsage};
use renderer_rhi::command::CommandPool;
use renderer_rhi::debug::DebugUtils;
use renderer_rhi::descriptor::{DescriptorWriter, GrowingDescriptorPool};
use renderer_rhi::device::Device;
use renderer_rhi::texture::Texture;
use tracing::{debug, error, info};

use crate::error::ResourceResult;
use crate::texture::TextureManager;

/// Sets per material descriptor pool. More pools are added as needed.
const MATERIAL_POOL_SETS: u32 = 100;

/// Uniform binding of the material config in the material set.
pub const CONFIG_BINDING: u32 = 0;
/// Combined image sampler binding of the shadow map in the material set.
pub const SHADOW_MAP_BINDING: u32 = 1;

static NEXT_MATERIAL_ID: AtomicU64 = AtomicU64::new(1);

/// PBR uniform block, std140-compatible.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PbrMaterialConfig {
    pub albedo: Vec3,
    pub metallic: f32,
    pub roughness: f32,
    pub ao: f32,
    /// Bit `TextureSlot::bit` is set when that slot holds a texture.
    /// Filled from the material's textures on upload.
    pub texture_mask: u32,
    pub _padding: f32,
}

impl Default for PbrMaterialConfig {
    fn default() -> Self {
        Self {
            albedo: Vec3::ONE,
            metallic: 0.5,
            roughness: 0.5,
            ao: 0.5,
            texture_mask: 0,
            _padding: 0.0,
        }
    }
}

/// Unlit uniform block.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct BasicMaterialConfig {
    pub albedo: Vec4,
}

impl Default for BasicMaterialConfig {
    fn default() -> Self {
        Self {
            albedo: Vec4::new(1.0, 1.0, 0.0, 1.0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MaterialKind {
    Pbr,
    Basic,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MaterialConfig {
    Pbr(PbrMaterialConfig),
    Basic(BasicMaterialConfig),
}

impl MaterialConfig {
    pub fn kind(&self) -> MaterialKind {
        match self {
            MaterialConfig::Pbr(_) => MaterialKind::Pbr,
            MaterialConfig::Basic(_) => MaterialKind::Basic,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            MaterialConfig::Pbr(c) => bytemuck::bytes_of(c),
            MaterialConfig::Basic(c) => bytemuck::bytes_of(c),
        }
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.as_bytes().len() as vk::DeviceSize
    }
}

/// PBR texture slots, in binding order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    Albedo,
    Normal,
    Metallic,
    Roughness,
    Ao,
}

impl TextureSlot {
    pub const ALL: [TextureSlot; 5] = [
        TextureSlot::Albedo,
        TextureSlot::Normal,
        TextureSlot::Metallic,
        TextureSlot::Roughness,
        TextureSlot::Ao,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// This slot's bit in [`PbrMaterialConfig::texture_mask`].
    #[inline]
    pub fn bit(self) -> u32 {
        1 << self as u32
    }
}

/// Shared material state. No GPU handles live here.
pub struct Material {
    id: u64,
    config: RefCell<MaterialConfig>,
    textures: RefCell<[Option<Rc<Texture>>; 5]>,
    dirty: Cell<bool>,
}

impl Material {
    /// New material with a process-unique id, marked dirty.
    pub fn new(config: MaterialConfig) -> Self {
        Self {
            id: NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed),
            config: RefCell::new(config),
            textures: RefCell::new(Default::default()),
            dirty: Cell::new(true),
        }
    }

    pub fn pbr() -> Self {
        Self::new(MaterialConfig::Pbr(PbrMaterialConfig::default()))
    }

    pub fn basic() -> Self {
        Self::new(MaterialConfig::Basic(BasicMaterialConfig::default()))
    }

    /// Stable identity used for caching in place of the pointer.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> MaterialKind {
        self.config.borrow().kind()
    }

    pub fn config(&self) -> MaterialConfig {
        *self.config.borrow()
    }

    /// Replaces the config and marks the material dirty. The variant may
    /// not change: a PBR material stays PBR.
    pub fn set_config(&self, config: MaterialConfig) -> bool {
        if config.kind() != self.kind() {
            return false;
        }
        *self.config.borrow_mut() = config;
        self.dirty.set(true);
        true
    }

    /// Edits a PBR config in place. Returns false for a basic material.
    pub fn update_pbr(&self, edit: impl FnOnce(&mut PbrMaterialConfig)) -> bool {
        match &mut *self.config.borrow_mut() {
            MaterialConfig::Pbr(config) => edit(config),
            MaterialConfig::Basic(_) => return false,
        }
        self.dirty.set(true);
        true
    }

    /// Edits a basic config in place. Returns false for a PBR material.
    pub fn update_basic(&self, edit: impl FnOnce(&mut BasicMaterialConfig)) -> bool {
        match &mut *self.config.borrow_mut() {
            MaterialConfig::Basic(config) => edit(config),
            MaterialConfig::Pbr(_) => return false,
        }
        self.dirty.set(true);
        true
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }

    pub(crate) fn clear_dirty(&self) {
        self.dirty.set(false);
    }

    pub fn texture(&self, slot: TextureSlot) -> Option<Rc<Texture>> {
        self.textures.borrow()[slot.index()].clone()
    }

    pub fn textures(&self) -> Ref<'_, [Option<Rc<Texture>>; 5]> {
        self.textures.borrow()
    }

    /// Sets or clears a texture slot and marks the material dirty, since the
    /// uploaded config carries which slots are filled.
    pub fn set_texture(&self, slot: TextureSlot, texture: Option<Rc<Texture>>) {
        self.textures.borrow_mut()[slot.index()] = texture;
        self.dirty.set(true);
    }

    /// Bits of the filled texture slots.
    pub fn texture_mask(&self) -> u32 {
        slot_mask(&self.textures.borrow())
    }

    /// The config as uploaded: PBR configs get the current texture mask.
    pub fn uniform_config(&self) -> MaterialConfig {
        match self.config() {
            MaterialConfig::Pbr(mut config) => {
                config.texture_mask = self.texture_mask();
                MaterialConfig::Pbr(config)
            }
            basic => basic,
        }
    }
}

fn slot_mask<T>(slots: &[Option<T>; 5]) -> u32 {
    TextureSlot::ALL
        .into_iter()
        .filter(|slot| slots[slot.index()].is_some())
        .fold(0, |mask, slot| mask | slot.bit())
}

impl fmt::Debug for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Material")
            .field("id", &self.id)
            .field("config", &self.config())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

struct MaterialEntry {
    material: Weak<Material>,
    buffer: Buffer,
    set: Option<vk::DescriptorSet>,
}

/// Owns material uniform buffers, material descriptor sets and the
/// texture manager.
pub struct MaterialManager {
    device: Arc<Device>,
    pool: GrowingDescriptorPool,
    textures: TextureManager,
    entries: HashMap<u64, MaterialEntry>,
    magenta: Option<Rc<Material>>,
}

impl MaterialManager {
    pub fn new(
        device: Arc<Device>,
        command_pool: Arc<CommandPool>,
        debug_utils: Arc<DebugUtils>,
        paths: ResourcePaths,
    ) -> ResourceResult<Self> {
        let pool = GrowingDescriptorPool::new(device.clone(), MATERIAL_POOL_SETS)?;
        let textures = TextureManager::new(device.clone(), command_pool, debug_utils, paths);

        Ok(Self {
            device,
            pool,
            textures,
            entries: HashMap::new(),
            magenta: None,
        })
    }

    pub fn create_pbr_material(&mut self) -> ResourceResult<Rc<Material>> {
        self.register(Material::pbr())
    }

    pub fn create_basic_material(&mut self) -> ResourceResult<Rc<Material>> {
        self.register(Material::basic())
    }

    /// Wraps `material` in an `Rc` and allocates its uniform buffer.
    pub fn register(&mut self, material: Material) -> ResourceResult<Rc<Material>> {
        let material = Rc::new(material);
        self.entry(&material)?;
        Ok(material)
    }

    /// Shared basic material with albedo (1, 0, 1, 1) for entities whose
    /// own material could not be built.
    pub fn magenta(&mut self) -> ResourceResult<Rc<Material>> {
        if let Some(material) = &self.magenta {
            return Ok(Rc::clone(material));
        }
        let material = self.register(Material::new(MaterialConfig::Basic(
            BasicMaterialConfig {
                albedo: Vec4::new(1.0, 0.0, 1.0, 1.0),
            },
        )))?;
        self.magenta = Some(Rc::clone(&material));
        Ok(material)
    }

    fn entry(&mut self, material: &Rc<Material>) -> ResourceResult<&mut MaterialEntry> {
        Self::entry_in(&mut self.entries, &self.device, material)
    }

    fn entry_in<'a>(
        entries: &'a mut HashMap<u64, MaterialEntry>,
        device: &Arc<Device>,
        material: &Rc<Material>,
    ) -> ResourceResult<&'a mut MaterialEntry> {
        match entries.entry(material.id()) {
            Entry::Occupied(occupied) => Ok(occupied.into_mut()),
            Entry::Vacant(vacant) => {
                let buffer =
                    Buffer::new(device.clone(), BufferUsage::Uniform, material.config().size())?;
                debug!(
                    "Material {} ({:?}) registered",
                    material.id(),
                    material.kind()
                );
                Ok(vacant.insert(MaterialEntry {
                    material: Rc::downgrade(material),
                    buffer,
                    set: None,
                }))
            }
        }
    }

    /// Copies the config into the uniform buffer if the material is dirty.
    /// Returns whether a copy happened.
    pub fn update_material_buffer(&mut self, material: &Rc<Material>) -> ResourceResult<bool> {
        if !material.is_dirty() {
            return Ok(false);
        }
        let config = material.uniform_config();
        self.entry(material)?.buffer.write_data(0, config.as_bytes())?;
        material.clear_dirty();
        Ok(true)
    }

    /// Material descriptor set for `material`, allocated from `layout` and
    /// cached on first request.
    ///
    /// Binding 0 is the config buffer. PBR materials also bind the shadow
    /// map at binding 1 when one is given.
    pub fn get_or_create_descriptor_set(
        &mut self,
        material: &Rc<Material>,
        layout: vk::DescriptorSetLayout,
        shadow_map: Option<vk::DescriptorImageInfo>,
    ) -> ResourceResult<vk::DescriptorSet> {
        let kind = material.kind();
        let entry = Self::entry_in(&mut self.entries, &self.device, material)?;
        if let Some(set) = entry.set {
            return Ok(set);
        }

        let set = self.pool.allocate_one(layout)?;
        let mut writer = DescriptorWriter::new().buffer(
            CONFIG_BINDING,
            entry.buffer.handle(),
            entry.buffer.size(),
        );
        if let (MaterialKind::Pbr, Some(info)) = (kind, shadow_map) {
            writer = writer.image(SHADOW_MAP_BINDING, info);
        }
        writer.write(&self.device, set);
        entry.set = Some(set);

        debug!("Material {} descriptor set created", material.id());
        Ok(set)
    }

    /// Texture writes for a PBR texture set starting at `first_binding`, in
    /// [`TextureSlot`] order. Empty slots bind the fallback texture.
    pub fn texture_writes(
        &mut self,
        material: &Material,
        first_binding: u32,
    ) -> ResourceResult<DescriptorWriter> {
        let mut writer = DescriptorWriter::new();
        for (slot, texture) in self.resolved_textures(material)?.iter().enumerate() {
            writer = writer.image(first_binding + slot as u32, texture.descriptor_info());
        }
        Ok(writer)
    }

    /// The five textures a draw with `material` samples, with the fallback
    /// in place of empty slots.
    pub fn resolved_textures(&mut self, material: &Material) -> ResourceResult<[Rc<Texture>; 5]> {
        let fallback = self.textures.fallback()?;
        let textures = material.textures();
        Ok(std::array::from_fn(|i| {
            textures[i].clone().unwrap_or_else(|| Rc::clone(&fallback))
        }))
    }

    /// Loads all five PBR textures by file name. Missing files leave the
    /// slot on the fallback texture.
    pub fn set_all_textures(
        &mut self,
        material: &Material,
        albedo: &str,
        normal: &str,
        metallic: &str,
        roughness: &str,
        ao: &str,
    ) -> ResourceResult<()> {
        let names = [albedo, normal, metallic, roughness, ao];
        for (slot, name) in TextureSlot::ALL.into_iter().zip(names) {
            let texture = self.textures.load_or_fallback(name)?;
            material.set_texture(slot, Some(texture));
        }
        Ok(())
    }

    /// Frees every cached material set. They are rebuilt on next request.
    pub fn invalidate_descriptor_sets(&mut self) {
        let sets: Vec<vk::DescriptorSet> = self
            .entries
            .values_mut()
            .filter_map(|entry| entry.set.take())
            .collect();
        if let Err(e) = self.pool.free(&sets) {
            error!("Failed to free material descriptor sets: {}", e);
        }
        debug!("Invalidated {} material descriptor sets", sets.len());
    }

    /// Releases the buffer and descriptor set of every material whose last
    /// strong reference is gone. Returns how many were released.
    pub fn cleanup_unused_materials(&mut self) -> usize {
        let expired: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.material.strong_count() == 0)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            let Some(set) = self.entries.remove(id).and_then(|entry| entry.set) else {
                continue;
            };
            if let Err(e) = self.pool.free(&[set]) {
                error!("Failed to free descriptor set of material {}: {}", id, e);
            }
        }

        let released_textures = self.textures.release_unused();
        if !expired.is_empty() {
            info!(
                "Cleaned up {} unused materials, {} textures",
                expired.len(),
                released_textures
            );
        }
        expired.len()
    }

    pub fn textures_mut(&mut self) -> &mut TextureManager {
        &mut self.textures
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::mem::{offset_of, size_of};

    use super::*;

    #[test]
    fn test_config_layouts() {
        assert_eq!(size_of::<PbrMaterialConfig>(), 32);
        assert_eq!(offset_of!(PbrMaterialConfig, metallic), 12);
        assert_eq!(offset_of!(PbrMaterialConfig, roughness), 16);
        assert_eq!(offset_of!(PbrMaterialConfig, ao), 20);
        assert_eq!(offset_of!(PbrMaterialConfig, texture_mask), 24);
        assert_eq!(size_of::<BasicMaterialConfig>(), 16);
        assert_eq!(MaterialConfig::Pbr(Default::default()).size(), 32);
        assert_eq!(MaterialConfig::Basic(Default::default()).size(), 16);
    }

    #[test]
    fn test_new_material_is_dirty() {
        let material = Material::pbr();
        assert!(material.is_dirty());
        material.clear_dirty();
        assert!(!material.is_dirty());
    }

    #[test]
    fn test_update_marks_dirty() {
        let material = Material::pbr();
        material.clear_dirty();
        assert!(material.update_pbr(|c| c.roughness = 0.9));
        assert!(material.is_dirty());
        match material.config() {
            MaterialConfig::Pbr(c) => assert_eq!(c.roughness, 0.9),
            MaterialConfig::Basic(_) => panic!("kind changed"),
        }
    }

    #[test]
    fn test_update_wrong_kind_is_rejected() {
        let material = Material::basic();
        material.clear_dirty();
        assert!(!material.update_pbr(|c| c.metallic = 1.0));
        assert!(!material.set_config(MaterialConfig::Pbr(Default::default())));
        assert!(!material.is_dirty());
        assert_eq!(material.kind(), MaterialKind::Basic);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Material::pbr();
        let b = Material::pbr();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_texture_slots_start_empty() {
        let material = Material::pbr();
        for slot in TextureSlot::ALL {
            assert!(material.texture(slot).is_none());
        }
        assert_eq!(TextureSlot::Ao.index(), 4);
    }

    #[test]
    fn test_weak_reference_expires_with_last_rc() {
        let material = Rc::new(Material::pbr());
        let weak = Rc::downgrade(&material);
        let held = Rc::clone(&material);
        drop(material);
        assert_eq!(weak.strong_count(), 1);
        drop(held);
        assert_eq!(weak.strong_count(), 0);
    }

    #[test]
    fn test_texture_mask_tracks_filled_slots() {
        let material = Material::pbr();
        assert_eq!(material.texture_mask(), 0);
        match material.uniform_config() {
            MaterialConfig::Pbr(c) => assert_eq!(c.texture_mask, 0),
            MaterialConfig::Basic(_) => panic!("kind changed"),
        }
        assert_eq!(TextureSlot::Albedo.bit(), 0b00001);
        assert_eq!(TextureSlot::Ao.bit(), 0b10000);
    }

    #[test]
    fn test_slot_mask_sets_one_bit_per_filled_slot() {
        let mut slots: [Option<()>; 5] = Default::default();
        slots[TextureSlot::Albedo.index()] = Some(());
        slots[TextureSlot::Roughness.index()] = Some(());
        assert_eq!(slot_mask(&slots), 0b01001);

        slots = [Some(()); 5];
        assert_eq!(slot_mask(&slots), 0b11111);
    }

    #[test]
    fn test_clearing_a_slot_marks_dirty() {
        let material = Material::pbr();
        material.clear_dirty();
        material.set_texture(TextureSlot::Normal, None);
        assert!(material.is_dirty());
        assert_eq!(material.texture_mask() & TextureSlot::Normal.bit(), 0);
    }
}
