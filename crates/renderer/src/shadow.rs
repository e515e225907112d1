//! Shadow maps for directional and point lights.
//!
//! Every light in the scene gets a [`ShadowMap`]: a D32 depth image rendered
//! from the light's point of view, a clamp-to-edge sampler and a 4-byte
//! readback buffer for texel inspection.
//!
//! The light space matrix fits an orthographic box around the bounding
//! sphere of the camera frustum (between the shadow near and far planes).
//! It is only recomputed once the camera leaves that sphere, so a static
//! camera yields the exact same matrix every frame.
//!
//! Resolution changes are either applied at once or deferred to the start
//! of the next [`ShadowSystem::update_shadow_maps`]. Any change to the
//! shadow map sampled by materials makes that call return `true`; the
//! caller then drops every descriptor set referencing the old map.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ash::vk;
use glam::{Mat4, Vec3};
use tracing::{debug, info, trace, warn};

use renderer_core::EngineConfig;
use renderer_rhi::buffer::{Buffer, BufferUsage};
use renderer_rhi::command::{CommandBuffer, CommandPool};
use renderer_rhi::debug::{DebugUtils, colors};
use renderer_rhi::device::Device;
use renderer_rhi::image::{Image, ImageDesc, record_transition};
use renderer_rhi::rendering::{DepthAttachment, RenderingConfig};
use renderer_rhi::sampler::{Sampler, SamplerAddress};
use renderer_scene::{Camera, DirectionalLight, Entity, PointLight, Registry};

use crate::error::{RenderError, RenderResult};
use crate::ubo::LightUbo;

pub const SHADOW_MAP_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Depth returned for lights without a rendered shadow map.
pub const MAX_DEPTH: f32 = 1.0;

// =============================================================================
// Lights
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LightKind {
    Directional,
    Point,
}

/// Identifies one light component of one entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LightId {
    pub entity: Entity,
    pub kind: LightKind,
}

impl fmt::Display for LightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}Light {}", self.kind, self.entity)
    }
}

/// A snapshot of a light component.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightSource {
    Directional(DirectionalLight),
    Point(PointLight),
}

impl LightSource {
    pub fn kind(&self) -> LightKind {
        match self {
            LightSource::Directional(_) => LightKind::Directional,
            LightSource::Point(_) => LightKind::Point,
        }
    }

    pub fn ubo(&self, light_space: Option<Mat4>) -> LightUbo {
        match self {
            LightSource::Directional(light) => LightUbo::directional(light, light_space),
            LightSource::Point(light) => LightUbo::point(light, light_space),
        }
    }
}

/// Every light in the registry, directional lights first. The first entry
/// is the primary light the main pass shades with.
pub fn scene_lights(registry: &Registry) -> Vec<(LightId, LightSource)> {
    let directional = registry.view_directional_lights().map(|(entity, light)| {
        (
            LightId {
                entity,
                kind: LightKind::Directional,
            },
            LightSource::Directional(*light),
        )
    });
    let point = registry.view_point_lights().map(|(entity, light)| {
        (
            LightId {
                entity,
                kind: LightKind::Point,
            },
            LightSource::Point(*light),
        )
    });
    directional.chain(point).collect()
}

// =============================================================================
// Settings
// =============================================================================

/// Outcome of a resolution request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionRequest {
    /// Same as the current (or already pending) size.
    Unchanged,
    /// Applied; shadow maps must be rebuilt now.
    Immediate,
    /// Stored until the next shadow update.
    Deferred,
}

/// Shadow map size and the planes the light frustum is fitted to.
#[derive(Clone, Debug, PartialEq)]
pub struct ShadowSettings {
    pub width: u32,
    pub height: u32,
    pub near: f32,
    pub far: f32,
    /// Zoom of the orthographic box of directional lights.
    pub directional_light_distance: f32,
    pending: Option<(u32, u32)>,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl ShadowSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        let [width, height] = config.shadow_map_resolution;
        Self {
            width,
            height,
            near: config.shadow_near,
            far: config.shadow_far,
            directional_light_distance: config.directional_light_distance,
            pending: None,
        }
    }

    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }

    pub fn pending(&self) -> Option<(u32, u32)> {
        self.pending
    }

    #[inline]
    pub fn needs_reconstruction(&self) -> bool {
        self.pending.is_some()
    }

    pub fn request_resolution(
        &mut self,
        width: u32,
        height: u32,
        immediate: bool,
    ) -> ResolutionRequest {
        if (width, height) == (self.width, self.height) {
            self.pending = None;
            return ResolutionRequest::Unchanged;
        }
        if immediate {
            self.width = width;
            self.height = height;
            self.pending = None;
            return ResolutionRequest::Immediate;
        }
        if self.pending == Some((width, height)) {
            return ResolutionRequest::Unchanged;
        }
        self.pending = Some((width, height));
        ResolutionRequest::Deferred
    }

    /// Moves a pending size into effect. Returns whether there was one.
    pub fn apply_pending(&mut self) -> bool {
        match self.pending.take() {
            Some((width, height)) => {
                self.width = width;
                self.height = height;
                true
            }
            None => false,
        }
    }
}

// =============================================================================
// Light space matrix
// =============================================================================

/// World-space corners of the camera frustum clipped to `[near, far]`.
///
/// Order: near top-left, near top-right, near bottom-left, near
/// bottom-right, then the same for the far plane.
pub fn frustum_corners(camera: &Camera, near: f32, far: f32) -> [Vec3; 8] {
    let tan_half_fov = (camera.fov * 0.5).to_radians().tan();
    let position = camera.position();
    let forward = camera.front();
    let right = camera.right();
    let up = right.cross(forward);

    let near_center = position + forward * near;
    let far_center = position + forward * far;
    let near_half_h = tan_half_fov * near;
    let near_half_w = near_half_h * camera.aspect;
    let far_half_h = tan_half_fov * far;
    let far_half_w = far_half_h * camera.aspect;

    [
        near_center + up * near_half_h - right * near_half_w,
        near_center + up * near_half_h + right * near_half_w,
        near_center - up * near_half_h - right * near_half_w,
        near_center - up * near_half_h + right * near_half_w,
        far_center + up * far_half_h - right * far_half_w,
        far_center + up * far_half_h + right * far_half_w,
        far_center - up * far_half_h - right * far_half_w,
        far_center - up * far_half_h + right * far_half_w,
    ]
}

/// Centroid of `corners` and the largest distance from it to a corner.
pub fn frustum_sphere(corners: &[Vec3; 8]) -> (Vec3, f32) {
    let center = corners.iter().copied().sum::<Vec3>() / corners.len() as f32;
    let radius = corners
        .iter()
        .map(|corner| corner.distance(center))
        .fold(0.0, f32::max);
    (center, radius)
}

/// Flips Y and maps OpenGL clip depth `[-1, 1]` to `[0, 1]`.
pub fn vulkan_ndc_adjustment() -> Mat4 {
    let mut adjust = Mat4::IDENTITY;
    adjust.y_axis.y = -1.0;
    adjust.z_axis.z = 0.5;
    adjust.w_axis.z = 0.5;
    adjust
}

/// `adj · ortho · view` for `light` looking at the frustum sphere.
pub fn light_space_matrix(
    light: &LightSource,
    corners: &[Vec3; 8],
    center: Vec3,
    radius: f32,
    directional_light_distance: f32,
) -> Mat4 {
    let mut light_pos = match light {
        LightSource::Directional(light) => {
            let to_light = -light.normalized_direction();
            center - to_light * radius
        }
        LightSource::Point(light) => light.position,
    };
    if light_pos.distance_squared(center) < f32::EPSILON {
        light_pos = center + Vec3::Y * radius.max(1.0);
    }

    // look_at degenerates when the view direction is parallel to the up axis.
    let view_dir = (center - light_pos).normalize();
    let up = if view_dir.cross(Vec3::Y).length_squared() < 1e-6 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let view = Mat4::look_at_rh(light_pos, center, up);

    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for corner in corners {
        let p = view.transform_point3(*corner);
        min = min.min(p);
        max = max.max(p);
    }

    if matches!(light, LightSource::Directional(_)) && radius > 0.0 {
        let scale = directional_light_distance / radius;
        min.x *= scale;
        max.x *= scale;
        min.y *= scale;
        max.y *= scale;
    }

    let padding = (max.z - min.z) * 0.1;
    min -= Vec3::splat(padding);
    max += Vec3::splat(padding);

    // The light looks down -Z, so the nearest corner has the largest z.
    let z_near = -max.z;
    let z_far = -min.z;
    let projection = Mat4::orthographic_rh_gl(min.x, max.x, min.y, max.y, z_near, z_far);

    vulkan_ndc_adjustment() * projection * view
}

/// Per-light cached light space matrix.
#[derive(Clone, Debug, Default)]
pub struct LightMatrixCache {
    matrix: Mat4,
    last_camera_position: Option<Vec3>,
    frustum_radius: f32,
    light: Option<LightSource>,
    recomputations: u64,
}

impl LightMatrixCache {
    /// Recomputes the matrix unless the camera is still inside the frustum
    /// sphere of the last computation and the light is unchanged. Returns
    /// whether a new matrix was computed.
    pub fn update(
        &mut self,
        light: &LightSource,
        camera: &Camera,
        settings: &ShadowSettings,
    ) -> bool {
        if let Some(last) = self.last_camera_position {
            let moved = camera.position().distance_squared(last);
            if moved < self.frustum_radius * self.frustum_radius
                && self.light.as_ref() == Some(light)
            {
                return false;
            }
        }

        let corners = frustum_corners(camera, settings.near, settings.far);
        let (center, radius) = frustum_sphere(&corners);
        self.matrix = light_space_matrix(
            light,
            &corners,
            center,
            radius,
            settings.directional_light_distance,
        );
        self.frustum_radius = radius;
        self.last_camera_position = Some(camera.position());
        self.light = Some(*light);
        self.recomputations += 1;
        trace!("Light space matrix recomputed (radius {:.2})", radius);
        true
    }

    /// Forces the next [`update`](Self::update) to recompute.
    pub fn reset(&mut self) {
        self.last_camera_position = None;
    }

    #[inline]
    pub fn matrix(&self) -> Mat4 {
        self.matrix
    }

    #[inline]
    pub fn frustum_radius(&self) -> f32 {
        self.frustum_radius
    }

    /// Number of times a matrix was actually computed.
    #[inline]
    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }
}

/// Clamps a texel coordinate into a `width × height` image.
pub fn clamp_texel(x: i32, y: i32, width: u32, height: u32) -> (u32, u32) {
    let max_x = width.saturating_sub(1) as i64;
    let max_y = height.saturating_sub(1) as i64;
    (
        (x as i64).clamp(0, max_x) as u32,
        (y as i64).clamp(0, max_y) as u32,
    )
}

/// Tracks which shadow map view material descriptor sets sample, and
/// whether sets written against an older view must be dropped.
///
/// The flag is raised before any map is destroyed and cleared only by
/// [`take`](Self::take), so it survives a failure partway through an update.
#[derive(Debug, Default)]
pub struct SampledMapTracker {
    view: Option<vk::ImageView>,
    invalidated: bool,
}

impl SampledMapTracker {
    /// Every map is about to be destroyed.
    pub fn all_maps_destroyed(&mut self) {
        self.view = None;
        self.invalidated = true;
    }

    /// The map with `view` is about to be destroyed.
    pub fn map_destroyed(&mut self, view: vk::ImageView) {
        if self.view == Some(view) {
            self.view = None;
            self.invalidated = true;
        }
    }

    /// Records the view materials sample from this frame on.
    pub fn set_sampled(&mut self, view: Option<vk::ImageView>) {
        if view != self.view {
            self.view = view;
            self.invalidated = true;
        }
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidated
    }

    /// Returns and clears the invalidation flag.
    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.invalidated)
    }
}

// =============================================================================
// GPU resources
// =============================================================================

/// Depth image, sampler and readback buffer of one light.
pub struct ShadowMap {
    image: Image,
    sampler: Sampler,
    readback: Buffer,
    layout: vk::ImageLayout,
}

impl ShadowMap {
    pub fn new(
        device: Arc<Device>,
        debug_utils: &DebugUtils,
        extent: vk::Extent2D,
        label: &str,
    ) -> RenderResult<Self> {
        let image = Image::new(
            device.clone(),
            &ImageDesc {
                name: "ShadowMap",
                extent,
                format: SHADOW_MAP_FORMAT,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                    | vk::ImageUsageFlags::SAMPLED
                    | vk::ImageUsageFlags::TRANSFER_SRC,
            },
        )?;
        let sampler = Sampler::new(device.clone(), SamplerAddress::ClampToEdge)?;
        let readback = Buffer::new(
            device,
            BufferUsage::Readback,
            std::mem::size_of::<f32>() as vk::DeviceSize,
        )?;

        debug_utils.set_object_name(image.handle(), &format!("{label}_ShadowMap"));
        debug_utils.set_object_name(image.view(), &format!("{label}_ShadowMapView"));
        debug!(
            "Created shadow map for {} ({}x{})",
            label, extent.width, extent.height
        );

        Ok(Self {
            image,
            sampler,
            readback,
            layout: vk::ImageLayout::UNDEFINED,
        })
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }

    /// Current layout; `UNDEFINED` until first rendered.
    #[inline]
    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler.handle(),
            image_view: self.image.view(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    fn transition_to(&mut self, cmd: &CommandBuffer, new: vk::ImageLayout) -> RenderResult<()> {
        record_transition(cmd, self.image.handle(), self.image.aspect(), self.layout, new)?;
        self.layout = new;
        Ok(())
    }
}

struct ShadowData {
    map: ShadowMap,
    cache: LightMatrixCache,
}

/// Owns one shadow map per light and keeps their matrices current.
pub struct ShadowSystem {
    device: Arc<Device>,
    command_pool: Arc<CommandPool>,
    debug_utils: Arc<DebugUtils>,
    settings: ShadowSettings,
    shadows: HashMap<LightId, ShadowData>,
    sampled: SampledMapTracker,
}

impl ShadowSystem {
    pub fn new(
        device: Arc<Device>,
        command_pool: Arc<CommandPool>,
        debug_utils: Arc<DebugUtils>,
        settings: ShadowSettings,
    ) -> Self {
        info!(
            "Shadow system created ({}x{}, planes {}..{})",
            settings.width, settings.height, settings.near, settings.far
        );
        Self {
            device,
            command_pool,
            debug_utils,
            settings,
            shadows: HashMap::new(),
            sampled: SampledMapTracker::default(),
        }
    }

    pub fn settings(&self) -> &ShadowSettings {
        &self.settings
    }

    /// Number of lights with a shadow map.
    pub fn len(&self) -> usize {
        self.shadows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shadows.is_empty()
    }

    /// Requests a new shadow map size.
    ///
    /// With `immediate` the device is drained and every map rebuilt before
    /// returning; otherwise the next [`update_shadow_maps`] does it.
    ///
    /// [`update_shadow_maps`]: Self::update_shadow_maps
    pub fn set_shadow_map_resolution(
        &mut self,
        width: u32,
        height: u32,
        immediate: bool,
    ) -> RenderResult<()> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidShadowResolution { width, height });
        }
        match self.settings.request_resolution(width, height, immediate) {
            ResolutionRequest::Unchanged => {}
            ResolutionRequest::Immediate => {
                self.device.wait_idle()?;
                self.reconstruct()?;
            }
            ResolutionRequest::Deferred => {
                info!("Shadow map resolution {}x{} pending", width, height);
            }
        }
        Ok(())
    }

    pub fn set_shadow_near(&mut self, near: f32) {
        self.settings.near = near;
        self.reset_caches(|_| true);
    }

    pub fn set_shadow_far(&mut self, far: f32) {
        self.settings.far = far;
        self.reset_caches(|_| true);
    }

    pub fn set_directional_light_distance(&mut self, distance: f32) {
        self.settings.directional_light_distance = distance;
        self.reset_caches(|id| id.kind == LightKind::Directional);
    }

    fn reset_caches(&mut self, filter: impl Fn(&LightId) -> bool) {
        for (id, data) in self.shadows.iter_mut() {
            if filter(id) {
                data.cache.reset();
            }
        }
    }

    /// Destroys and recreates every shadow map at the current size. The
    /// device must be idle.
    fn reconstruct(&mut self) -> RenderResult<()> {
        self.sampled.all_maps_destroyed();
        let extent = self.settings.extent();
        for (id, data) in self.shadows.iter_mut() {
            data.map = ShadowMap::new(
                self.device.clone(),
                &self.debug_utils,
                extent,
                &id.to_string(),
            )?;
            data.cache.reset();
        }
        info!(
            "Reconstructed {} shadow maps at {}x{}",
            self.shadows.len(),
            extent.width,
            extent.height
        );
        Ok(())
    }

    /// Brings shadow maps in line with `lights` and renders each one.
    ///
    /// `draw` is called inside each light's depth-only rendering scope with
    /// the light space matrix. When the map sampled by materials changes,
    /// [`take_descriptor_invalidation`](Self::take_descriptor_invalidation)
    /// reports it afterwards, whether or not this call succeeded. The device
    /// is idle in that case, so descriptor sets referencing the old map can
    /// be freed at once.
    pub fn update_shadow_maps<F>(
        &mut self,
        cmd: &CommandBuffer,
        lights: &[(LightId, LightSource)],
        camera: &Camera,
        mut draw: F,
    ) -> RenderResult<()>
    where
        F: FnMut(&CommandBuffer, Mat4) -> RenderResult<()>,
    {
        let mut idle = false;

        if self.settings.needs_reconstruction() {
            self.device.wait_idle()?;
            idle = true;
            self.settings.apply_pending();
            self.reconstruct()?;
        }

        let stale: Vec<LightId> = self
            .shadows
            .keys()
            .filter(|id| !lights.iter().any(|(light, _)| light == *id))
            .copied()
            .collect();
        if !stale.is_empty() {
            if !idle {
                self.device.wait_idle()?;
                idle = true;
            }
            for id in &stale {
                if let Some(data) = self.shadows.remove(id) {
                    self.sampled.map_destroyed(data.map.view());
                }
                debug!("Released shadow map of removed {}", id);
            }
        }

        let extent = self.settings.extent();
        for (id, light) in lights {
            let data = match self.shadows.entry(*id) {
                std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
                std::collections::hash_map::Entry::Vacant(entry) => {
                    let map = ShadowMap::new(
                        self.device.clone(),
                        &self.debug_utils,
                        extent,
                        &id.to_string(),
                    )?;
                    entry.insert(ShadowData {
                        map,
                        cache: LightMatrixCache::default(),
                    })
                }
            };

            data.cache.update(light, camera, &self.settings);
            Self::generate_shadow_map(&self.debug_utils, cmd, *id, data, &mut draw)?;
        }

        let primary_view = self.primary_shadow_map(lights).map(ShadowMap::view);
        if primary_view != self.sampled.view {
            if !idle {
                self.device.wait_idle()?;
            }
            self.sampled.set_sampled(primary_view);
        }

        Ok(())
    }

    /// Whether descriptor sets sampling a shadow map must be rebuilt since
    /// the last call. Clears the flag.
    pub fn take_descriptor_invalidation(&mut self) -> bool {
        self.sampled.take()
    }

    fn generate_shadow_map<F>(
        debug_utils: &DebugUtils,
        cmd: &CommandBuffer,
        id: LightId,
        data: &mut ShadowData,
        draw: &mut F,
    ) -> RenderResult<()>
    where
        F: FnMut(&CommandBuffer, Mat4) -> RenderResult<()>,
    {
        debug_utils.begin_label(cmd.handle(), &format!("ShadowMap {id}"), colors::SHADOW);

        data.map
            .transition_to(cmd, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)?;

        let extent = data.map.extent();
        let bundle = RenderingConfig::new(extent)
            .with_depth_attachment(DepthAttachment::new(data.map.view()).with_clear_depth(1.0))
            .build();
        cmd.begin_rendering(&bundle.info());
        cmd.set_viewport_and_scissor(extent);
        let result = draw(cmd, data.cache.matrix());
        cmd.end_rendering();
        result?;

        data.map
            .transition_to(cmd, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)?;

        debug_utils.end_label(cmd.handle());
        Ok(())
    }

    pub fn shadow_map(&self, id: LightId) -> Option<&ShadowMap> {
        self.shadows.get(&id).map(|data| &data.map)
    }

    /// Shadow map of the first light in `lights`.
    pub fn primary_shadow_map(&self, lights: &[(LightId, LightSource)]) -> Option<&ShadowMap> {
        lights.first().and_then(|(id, _)| self.shadow_map(*id))
    }

    /// Cached light space matrix of `id`, if it has a shadow map.
    pub fn light_space_matrix(&self, id: LightId) -> Option<Mat4> {
        self.shadows.get(&id).map(|data| data.cache.matrix())
    }

    pub fn recomputations(&self, id: LightId) -> Option<u64> {
        self.shadows.get(&id).map(|data| data.cache.recomputations())
    }

    /// Reads the depth stored at texel `(x, y)` of the shadow map of `id`.
    ///
    /// Coordinates are clamped into the map. Lights without a rendered map
    /// read as [`MAX_DEPTH`]. Blocks until the copy completes.
    pub fn get_shadow_map_pixel_value(&self, id: LightId, x: i32, y: i32) -> RenderResult<f32> {
        let Some(data) = self.shadows.get(&id) else {
            warn!("No shadow map for {}", id);
            return Ok(MAX_DEPTH);
        };
        let map = &data.map;
        if map.layout != vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL {
            return Ok(MAX_DEPTH);
        }

        let extent = map.extent();
        let (x, y) = clamp_texel(x, y, extent.width, extent.height);
        let image = map.image.handle();
        let aspect = map.image.aspect();

        self.command_pool.submit_single_time(|cmd| {
            record_transition(
                cmd,
                image,
                aspect,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            )?;

            let region = vk::BufferImageCopy::default()
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::DEPTH,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_offset(vk::Offset3D {
                    x: x as i32,
                    y: y as i32,
                    z: 0,
                })
                .image_extent(vk::Extent3D {
                    width: 1,
                    height: 1,
                    depth: 1,
                });
            cmd.copy_image_to_buffer(
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                map.readback.handle(),
                std::slice::from_ref(&region),
            );

            record_transition(
                cmd,
                image,
                aspect,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )?;
            Ok(())
        })?;

        Ok(map.readback.read::<f32>()?)
    }
}

impl Drop for ShadowSystem {
    fn drop(&mut self) {
        debug!("Destroying {} shadow maps", self.shadows.len());
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;
    use glam::Vec4Swizzles;

    use super::*;

    const EPSILON: f32 = 1e-4;

    fn s1_camera() -> Camera {
        let mut camera = Camera::default();
        camera.set_position(Vec3::new(0.0, 3.0, 5.0));
        camera.set_target(Vec3::ZERO);
        camera
    }

    fn sun() -> LightSource {
        LightSource::Directional(DirectionalLight::new(Vec3::NEG_Y, Vec3::ONE))
    }

    #[test]
    fn test_frustum_corners_lie_on_planes() {
        let camera = s1_camera();
        let corners = frustum_corners(&camera, 0.1, 120.0);
        for (i, corner) in corners.iter().enumerate() {
            let depth = (*corner - camera.position()).dot(camera.front());
            let expected = if i < 4 { 0.1 } else { 120.0 };
            assert!((depth - expected).abs() < 1e-3, "corner {i} depth {depth}");
        }
    }

    #[test]
    fn test_frustum_sphere_contains_corners() {
        let corners = frustum_corners(&s1_camera(), 0.1, 120.0);
        let (center, radius) = frustum_sphere(&corners);
        assert!(radius > 0.0);
        for corner in &corners {
            assert!(corner.distance(center) <= radius + EPSILON);
        }
    }

    #[test]
    fn test_ndc_adjustment_maps_depth_to_unit_range() {
        let adjust = vulkan_ndc_adjustment();
        assert_eq!(adjust.transform_point3(Vec3::new(0.0, 0.0, -1.0)).z, 0.0);
        assert_eq!(adjust.transform_point3(Vec3::new(0.0, 0.0, 1.0)).z, 1.0);
        assert_eq!(adjust.transform_point3(Vec3::Y).y, -1.0);
    }

    #[test]
    fn test_straight_down_light_is_finite() {
        let camera = s1_camera();
        let corners = frustum_corners(&camera, 0.1, 120.0);
        let (center, radius) = frustum_sphere(&corners);
        let matrix = light_space_matrix(&sun(), &corners, center, radius, 100.0);
        assert!(matrix.is_finite());
    }

    #[test]
    fn test_frustum_projects_inside_depth_range() {
        let camera = s1_camera();
        let settings = ShadowSettings::default();
        let corners = frustum_corners(&camera, settings.near, settings.far);
        let (center, radius) = frustum_sphere(&corners);
        let light = LightSource::Directional(DirectionalLight::default());
        let matrix = light_space_matrix(&light, &corners, center, radius, radius);

        // With the distance equal to the radius no zoom is applied, so every
        // corner lands inside the light's clip volume.
        for corner in &corners {
            let clip = matrix * corner.extend(1.0);
            let ndc = clip.xyz() / clip.w;
            assert!(ndc.z >= -EPSILON && ndc.z <= 1.0 + EPSILON, "depth {}", ndc.z);
            assert!(ndc.x.abs() <= 1.0 + EPSILON && ndc.y.abs() <= 1.0 + EPSILON);
        }
    }

    #[test]
    fn test_point_light_at_center_is_finite() {
        let corners = frustum_corners(&s1_camera(), 0.1, 120.0);
        let (center, radius) = frustum_sphere(&corners);
        let light = LightSource::Point(PointLight::new(center, Vec3::ONE, 50.0));
        assert!(light_space_matrix(&light, &corners, center, radius, 100.0).is_finite());
    }

    #[test]
    fn test_static_camera_computes_once() {
        let camera = s1_camera();
        let settings = ShadowSettings::default();
        let light = sun();
        let mut cache = LightMatrixCache::default();

        assert!(cache.update(&light, &camera, &settings));
        let first = cache.matrix();
        for _ in 2..=10 {
            assert!(!cache.update(&light, &camera, &settings));
            assert_eq!(cache.matrix().to_cols_array(), first.to_cols_array());
        }
        assert_eq!(cache.recomputations(), 1);
    }

    #[test]
    fn test_camera_leaving_sphere_recomputes() {
        let mut camera = s1_camera();
        let settings = ShadowSettings::default();
        let light = sun();
        let mut cache = LightMatrixCache::default();
        cache.update(&light, &camera, &settings);

        camera.set_position(camera.position() + Vec3::X * 1.0);
        assert!(!cache.update(&light, &camera, &settings));

        camera.set_position(camera.position() + Vec3::X * (cache.frustum_radius() + 1.0));
        assert!(cache.update(&light, &camera, &settings));
        assert_eq!(cache.recomputations(), 2);
    }

    #[test]
    fn test_light_change_recomputes() {
        let camera = s1_camera();
        let settings = ShadowSettings::default();
        let mut cache = LightMatrixCache::default();
        cache.update(&sun(), &camera, &settings);

        let tilted = LightSource::Directional(DirectionalLight::new(
            Vec3::new(-0.2, -1.0, -0.3),
            Vec3::ONE,
        ));
        assert!(cache.update(&tilted, &camera, &settings));
    }

    #[test]
    fn test_reset_forces_recompute() {
        let camera = s1_camera();
        let settings = ShadowSettings::default();
        let mut cache = LightMatrixCache::default();
        cache.update(&sun(), &camera, &settings);
        cache.reset();
        assert!(cache.update(&sun(), &camera, &settings));
    }

    #[test]
    fn test_deferred_resolution_applies_once() {
        let mut settings = ShadowSettings::default();
        assert_eq!(
            settings.request_resolution(2048, 2048, false),
            ResolutionRequest::Deferred
        );
        // Frame k still renders at the old size.
        assert_eq!(settings.extent().width, 4096);
        assert!(settings.needs_reconstruction());

        assert_eq!(
            settings.request_resolution(2048, 2048, false),
            ResolutionRequest::Unchanged
        );

        assert!(settings.apply_pending());
        assert_eq!((settings.width, settings.height), (2048, 2048));
        assert!(!settings.needs_reconstruction());
        assert!(!settings.apply_pending());
    }

    #[test]
    fn test_immediate_resolution_is_idempotent() {
        let mut settings = ShadowSettings::default();
        assert_eq!(
            settings.request_resolution(1024, 512, true),
            ResolutionRequest::Immediate
        );
        assert_eq!(
            settings.request_resolution(1024, 512, true),
            ResolutionRequest::Unchanged
        );
        assert_eq!(settings.extent().height, 512);
    }

    #[test]
    fn test_requesting_current_size_cancels_pending() {
        let mut settings = ShadowSettings::default();
        settings.request_resolution(2048, 2048, false);
        assert_eq!(
            settings.request_resolution(4096, 4096, false),
            ResolutionRequest::Unchanged
        );
        assert!(!settings.needs_reconstruction());
    }

    #[test]
    fn test_reconstruction_invalidates_even_if_rendering_fails() {
        let mut sampled = SampledMapTracker::default();
        sampled.set_sampled(Some(vk::ImageView::from_raw(1)));
        sampled.take();

        // Maps rebuilt, then the first shadow render fails.
        let update = |sampled: &mut SampledMapTracker| -> RenderResult<()> {
            sampled.all_maps_destroyed();
            Err(RenderError::Internal("shadow render failed".into()))
        };
        assert!(update(&mut sampled).is_err());
        assert!(sampled.take());
        assert!(!sampled.take());
    }

    #[test]
    fn test_removing_sampled_map_invalidates() {
        let primary = vk::ImageView::from_raw(1);
        let other = vk::ImageView::from_raw(2);
        let mut sampled = SampledMapTracker::default();
        sampled.set_sampled(Some(primary));
        assert!(sampled.take());

        sampled.map_destroyed(other);
        assert!(!sampled.is_invalidated());

        sampled.map_destroyed(primary);
        assert!(sampled.take());

        // A rebuilt map that reuses the old handle still counts as new.
        sampled.set_sampled(Some(primary));
        assert!(sampled.take());
        sampled.set_sampled(Some(primary));
        assert!(!sampled.take());
    }

    #[test]
    fn test_clamp_texel() {
        assert_eq!(clamp_texel(-5, 10, 4, 4), (0, 3));
        assert_eq!(clamp_texel(2, 1, 4, 4), (2, 1));
        assert_eq!(clamp_texel(i32::MAX, i32::MIN, 2048, 1024), (2047, 0));
    }

    #[test]
    fn test_scene_lights_puts_directional_first() {
        let mut registry = Registry::new();
        let lamp = registry.spawn();
        registry.insert(lamp, PointLight::default());
        let sun_entity = registry.spawn();
        registry.insert(sun_entity, DirectionalLight::default());

        let lights = scene_lights(&registry);
        assert_eq!(lights.len(), 2);
        assert_eq!(lights[0].0.entity, sun_entity);
        assert_eq!(lights[0].1.kind(), LightKind::Directional);
        assert_eq!(lights[1].0.entity, lamp);
    }
}
