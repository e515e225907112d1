//! Entity registry backed by one sparse set per component type.
//!
//! The set of component types is closed: every type the renderer reads has
//! its own column, and [`Component`] is implemented for exactly those.
//!
//! # Example
//!
//! ```
//! use renderer_scene::{MeshRef, Registry, Transform};
//!
//! let mut registry = Registry::new();
//! let cube = registry.spawn();
//! registry.insert(cube, Transform::default());
//! registry.insert(cube, MeshRef::new("cube_1"));
//!
//! assert!(registry.get::<MeshRef>(cube).is_some());
//! registry.despawn(cube);
//! assert!(registry.get::<MeshRef>(cube).is_none());
//! ```

use std::fmt;

use tracing::{debug, warn};

use crate::camera::Camera;
use crate::components::{MaterialRef, MeshRef, Name};
use crate::light::{DirectionalLight, PointLight};
use crate::transform::Transform;

/// Generational entity handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Dense storage for one component type.
///
/// `sparse[entity.index]` points into the packed `dense` arrays. Removal
/// swaps the last element into the hole, so iteration order is not stable
/// across removals.
pub struct SparseSet<T> {
    sparse: Vec<Option<u32>>,
    dense_entities: Vec<Entity>,
    dense: Vec<T>,
}

impl<T> Default for SparseSet<T> {
    fn default() -> Self {
        Self {
            sparse: Vec::new(),
            dense_entities: Vec::new(),
            dense: Vec::new(),
        }
    }
}

impl<T> SparseSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, entity: Entity) -> Option<usize> {
        let dense = (*self.sparse.get(entity.index as usize)?)? as usize;
        (self.dense_entities[dense] == entity).then_some(dense)
    }

    /// Inserts or replaces the component of `entity`, returning the old one.
    pub fn insert(&mut self, entity: Entity, value: T) -> Option<T> {
        let index = entity.index as usize;
        if index >= self.sparse.len() {
            self.sparse.resize(index + 1, None);
        }

        if let Some(dense) = self.sparse[index] {
            let dense = dense as usize;
            // Same slot, possibly a stale generation: overwrite in place.
            self.dense_entities[dense] = entity;
            return Some(std::mem::replace(&mut self.dense[dense], value));
        }

        self.sparse[index] = Some(self.dense.len() as u32);
        self.dense_entities.push(entity);
        self.dense.push(value);
        None
    }

    pub fn remove(&mut self, entity: Entity) -> Option<T> {
        let dense = self.slot(entity)?;
        self.sparse[entity.index as usize] = None;

        let last = self.dense.len() - 1;
        if dense != last {
            let moved = self.dense_entities[last];
            self.sparse[moved.index as usize] = Some(dense as u32);
        }
        self.dense_entities.swap_remove(dense);
        Some(self.dense.swap_remove(dense))
    }

    pub fn get(&self, entity: Entity) -> Option<&T> {
        self.slot(entity).map(|dense| &self.dense[dense])
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        self.slot(entity).map(|dense| &mut self.dense[dense])
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.slot(entity).is_some()
    }

    pub fn len(&self) -> usize {
        self.dense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.dense_entities.iter().copied().zip(self.dense.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut T)> {
        self.dense_entities.iter().copied().zip(self.dense.iter_mut())
    }
}

/// Component columns of a [`Registry`].
#[doc(hidden)]
#[derive(Default)]
pub struct Columns {
    transforms: SparseSet<Transform>,
    meshes: SparseSet<MeshRef>,
    materials: SparseSet<MaterialRef>,
    cameras: SparseSet<Camera>,
    point_lights: SparseSet<PointLight>,
    directional_lights: SparseSet<DirectionalLight>,
    names: SparseSet<Name>,
}

impl Columns {
    fn remove_all(&mut self, entity: Entity) {
        self.transforms.remove(entity);
        self.meshes.remove(entity);
        self.materials.remove(entity);
        self.cameras.remove(entity);
        self.point_lights.remove(entity);
        self.directional_lights.remove(entity);
        self.names.remove(entity);
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A type the registry can store. Implemented for the renderer's component
/// types only.
pub trait Component: sealed::Sealed + Sized + 'static {
    #[doc(hidden)]
    fn column(columns: &Columns) -> &SparseSet<Self>;
    #[doc(hidden)]
    fn column_mut(columns: &mut Columns) -> &mut SparseSet<Self>;
}

macro_rules! impl_component {
    ($($ty:ty => $field:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Component for $ty {
                #[inline]
                fn column(columns: &Columns) -> &SparseSet<Self> {
                    &columns.$field
                }

                #[inline]
                fn column_mut(columns: &mut Columns) -> &mut SparseSet<Self> {
                    &mut columns.$field
                }
            }
        )*
    };
}

impl_component! {
    Transform => transforms,
    MeshRef => meshes,
    MaterialRef => materials,
    Camera => cameras,
    PointLight => point_lights,
    DirectionalLight => directional_lights,
    Name => names,
}

#[derive(Clone, Copy, Debug)]
struct Slot {
    generation: u32,
    alive: bool,
}

/// Owns entity ids and their components.
#[derive(Default)]
pub struct Registry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    columns: Columns,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a new entity, reusing a despawned index when one is free.
    pub fn spawn(&mut self) -> Entity {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.alive = true;
            return Entity {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            alive: true,
        });
        Entity {
            index,
            generation: 0,
        }
    }

    /// Removes `entity` and all its components. Returns `false` if it was
    /// already dead.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        self.columns.remove_all(entity);

        let slot = &mut self.slots[entity.index as usize];
        slot.alive = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(entity.index);
        debug!("Despawned entity {}", entity);
        true
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.slots
            .get(entity.index as usize)
            .is_some_and(|slot| slot.alive && slot.generation == entity.generation)
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attaches `component` to `entity`, replacing any previous value of
    /// the same type. Returns `false` for dead entities.
    pub fn insert<C: Component>(&mut self, entity: Entity, component: C) -> bool {
        if !self.is_alive(entity) {
            warn!("Ignoring component insert on dead entity {}", entity);
            return false;
        }
        C::column_mut(&mut self.columns).insert(entity, component);
        true
    }

    pub fn remove<C: Component>(&mut self, entity: Entity) -> Option<C> {
        C::column_mut(&mut self.columns).remove(entity)
    }

    pub fn get<C: Component>(&self, entity: Entity) -> Option<&C> {
        C::column(&self.columns).get(entity)
    }

    pub fn get_mut<C: Component>(&mut self, entity: Entity) -> Option<&mut C> {
        C::column_mut(&mut self.columns).get_mut(entity)
    }

    pub fn has<C: Component>(&self, entity: Entity) -> bool {
        C::column(&self.columns).contains(entity)
    }

    /// Column holding every component of type `C`.
    pub fn column<C: Component>(&self) -> &SparseSet<C> {
        C::column(&self.columns)
    }

    /// Entities with a transform, mesh and material.
    pub fn view_drawables(
        &self,
    ) -> impl Iterator<Item = (Entity, &Transform, &MeshRef, &MaterialRef)> {
        let columns = &self.columns;
        columns.meshes.iter().filter_map(move |(entity, mesh)| {
            let transform = columns.transforms.get(entity)?;
            let material = columns.materials.get(entity)?;
            Some((entity, transform, mesh, material))
        })
    }

    pub fn view_point_lights(&self) -> impl Iterator<Item = (Entity, &PointLight)> {
        self.columns.point_lights.iter()
    }

    pub fn view_directional_lights(&self) -> impl Iterator<Item = (Entity, &DirectionalLight)> {
        self.columns.directional_lights.iter()
    }

    /// The camera with the lowest entity index, if any.
    pub fn camera(&self) -> Option<(Entity, &Camera)> {
        self.columns
            .cameras
            .iter()
            .min_by_key(|(entity, _)| entity.index)
    }

    pub fn camera_mut(&mut self) -> Option<(Entity, &mut Camera)> {
        self.columns
            .cameras
            .iter_mut()
            .min_by_key(|(entity, _)| entity.index)
    }

    /// First entity carrying `name`.
    pub fn find_by_name(&self, name: &str) -> Option<Entity> {
        self.columns
            .names
            .iter()
            .find(|(_, n)| n.0 == name)
            .map(|(entity, _)| entity)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use glam::Vec3;
    use renderer_resources::Material;

    use super::*;

    fn drawable(registry: &mut Registry, mesh: &str) -> Entity {
        let e = registry.spawn();
        registry.insert(e, Transform::default());
        registry.insert(e, MeshRef::new(mesh));
        registry.insert(e, MaterialRef::new(Rc::new(Material::pbr())));
        e
    }

    #[test]
    fn test_sparse_set_swap_remove_keeps_lookup() {
        let mut registry = Registry::new();
        let a = registry.spawn();
        let b = registry.spawn();
        let c = registry.spawn();

        let mut set = SparseSet::new();
        set.insert(a, 1);
        set.insert(b, 2);
        set.insert(c, 3);

        assert_eq!(set.remove(a), Some(1));
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(b), Some(&2));
        assert_eq!(set.get(c), Some(&3));
        assert_eq!(set.get(a), None);
        assert_eq!(set.insert(c, 4), Some(3));
    }

    #[test]
    fn test_despawned_entity_is_stale() {
        let mut registry = Registry::new();
        let first = registry.spawn();
        registry.insert(first, Name::new("first"));
        assert!(registry.despawn(first));
        assert!(!registry.despawn(first));

        let second = registry.spawn();
        assert_eq!(second.index(), first.index());
        assert_ne!(second.generation(), first.generation());

        assert!(!registry.is_alive(first));
        assert!(registry.get::<Name>(first).is_none());
        assert!(registry.get::<Name>(second).is_none());
        assert!(!registry.insert(first, Name::new("ghost")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_view_drawables_requires_all_three() {
        let mut registry = Registry::new();
        let full = drawable(&mut registry, "cube_1");

        let no_material = registry.spawn();
        registry.insert(no_material, Transform::default());
        registry.insert(no_material, MeshRef::new("plane10_4"));

        let lonely_light = registry.spawn();
        registry.insert(lonely_light, PointLight::default());

        let drawn: Vec<Entity> = registry.view_drawables().map(|(e, ..)| e).collect();
        assert_eq!(drawn, vec![full]);
        assert_eq!(registry.view_point_lights().count(), 1);
        assert_eq!(registry.view_directional_lights().count(), 0);
    }

    #[test]
    fn test_first_camera_wins() {
        let mut registry = Registry::new();
        let _mesh = drawable(&mut registry, "cube_1");
        let main = registry.spawn();
        let other = registry.spawn();

        // Insert out of order so dense order differs from entity order.
        let mut far = Camera::default();
        far.set_position(Vec3::new(0.0, 0.0, 100.0));
        registry.insert(other, far);
        registry.insert(main, Camera::default());

        let (entity, _) = registry.camera().expect("camera");
        assert_eq!(entity, main);

        registry
            .camera_mut()
            .expect("camera")
            .1
            .set_aspect(2.0);
        assert_eq!(registry.get::<Camera>(main).map(|c| c.aspect), Some(2.0));
    }

    #[test]
    fn test_despawn_releases_material() {
        let mut registry = Registry::new();
        let material = Rc::new(Material::pbr());
        let e = registry.spawn();
        registry.insert(e, MaterialRef::new(Rc::clone(&material)));
        assert_eq!(Rc::strong_count(&material), 2);

        registry.despawn(e);
        assert_eq!(Rc::strong_count(&material), 1);
    }

    #[test]
    fn test_find_by_name() {
        let mut registry = Registry::new();
        let _ = registry.spawn();
        let cube = registry.spawn();
        registry.insert(cube, Name::new("Cube"));
        assert_eq!(registry.find_by_name("Cube"), Some(cube));
        assert_eq!(registry.find_by_name("Missing"), None);
    }
}
