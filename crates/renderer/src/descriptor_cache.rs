//! Least-recently-used cache of per-entity descriptor sets.
//!
//! The main pass binds the textures of each drawable through a set keyed by
//! [`entity_descriptor_key`]. Sets are allocated on a miss and handed back
//! to a [`DescriptorFreer`] when evicted or invalidated.
//!
//! Recency is tracked with a monotonically increasing stamp: `entries` maps
//! key → (set, stamp) and `order` maps stamp → key, so the first entry of
//! `order` is always the least recently used.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};

use ash::vk;
use tracing::{debug, error, trace};

use renderer_rhi::descriptor::DescriptorPool;

/// Default number of cached per-entity sets.
pub const DEFAULT_CAPACITY: usize = 75;

/// Takes ownership of descriptor sets leaving the cache.
pub trait DescriptorFreer {
    fn free_sets(&mut self, sets: &[vk::DescriptorSet]);
}

impl DescriptorFreer for DescriptorPool {
    fn free_sets(&mut self, sets: &[vk::DescriptorSet]) {
        if let Err(e) = self.free(sets) {
            error!("Failed to free {} descriptor sets: {}", sets.len(), e);
        }
    }
}

/// Sets retired while the frame slot that may still read them is in
/// flight. Drained once that slot's fence has been waited on.
#[derive(Debug, Default)]
pub struct RetiredSets {
    slots: Vec<Vec<vk::DescriptorSet>>,
    current: usize,
}

impl RetiredSets {
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            slots: vec![Vec::new(); frames_in_flight.max(1)],
            current: 0,
        }
    }

    /// Selects the frame slot that subsequent frees are queued on and
    /// returns the sets queued on it during its previous use.
    pub fn begin_frame(&mut self, frame_index: usize) -> Vec<vk::DescriptorSet> {
        self.current = frame_index % self.slots.len();
        std::mem::take(&mut self.slots[self.current])
    }

    /// Every queued set, for teardown or after a device-idle wait.
    pub fn drain_all(&mut self) -> Vec<vk::DescriptorSet> {
        self.slots.iter_mut().flat_map(std::mem::take).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DescriptorFreer for RetiredSets {
    fn free_sets(&mut self, sets: &[vk::DescriptorSet]) {
        self.slots[self.current].extend_from_slice(sets);
    }
}

/// Hash of everything a per-entity set depends on.
pub fn entity_descriptor_key(
    material_id: u64,
    pipeline_name: &str,
    textures: &[vk::ImageView],
) -> u64 {
    let mut hasher = DefaultHasher::new();
    material_id.hash(&mut hasher);
    pipeline_name.hash(&mut hasher);
    textures.hash(&mut hasher);
    hasher.finish()
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    set: vk::DescriptorSet,
    stamp: u64,
}

/// Whether a lookup hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup {
    Hit,
    Miss,
}

/// Hit/miss/eviction counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

pub struct DescriptorLru {
    capacity: usize,
    entries: HashMap<u64, Entry>,
    order: BTreeMap<u64, u64>,
    next_stamp: u64,
    force_invalidate: bool,
    stats: CacheStats,
}

impl Default for DescriptorLru {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl DescriptorLru {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::with_capacity(capacity),
            order: BTreeMap::new(),
            next_stamp: 0,
            force_invalidate: false,
            stats: CacheStats::default(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: u64) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Key of the entry that would be evicted next.
    pub fn least_recent(&self) -> Option<u64> {
        self.order.values().next().copied()
    }

    fn stamp(&mut self) -> u64 {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        stamp
    }

    /// Returns the set for `key`, marking it most recently used.
    pub fn get(&mut self, key: u64) -> Option<vk::DescriptorSet> {
        let stamp = self.stamp();
        let entry = self.entries.get_mut(&key)?;
        self.order.remove(&entry.stamp);
        entry.stamp = stamp;
        self.order.insert(stamp, key);
        Some(entry.set)
    }

    /// Inserts `set` as most recently used, evicting the least recently
    /// used entry when full. A set already cached under `key` is freed.
    pub fn insert(&mut self, key: u64, set: vk::DescriptorSet, freer: &mut impl DescriptorFreer) {
        if let Some(old) = self.entries.remove(&key) {
            self.order.remove(&old.stamp);
            if old.set != set {
                freer.free_sets(&[old.set]);
            }
        }

        while self.entries.len() >= self.capacity {
            let Some((_, lru_key)) = self.order.pop_first() else {
                break;
            };
            if let Some(evicted) = self.entries.remove(&lru_key) {
                freer.free_sets(&[evicted.set]);
                self.stats.evictions += 1;
                trace!("Evicted descriptor set for key {:#018x}", lru_key);
            }
        }

        let stamp = self.stamp();
        self.entries.insert(key, Entry { set, stamp });
        self.order.insert(stamp, key);
    }

    /// Returns the cached set for `key`, or creates, caches and returns a
    /// new one.
    pub fn get_or_insert_with<E>(
        &mut self,
        key: u64,
        freer: &mut impl DescriptorFreer,
        create: impl FnOnce() -> Result<vk::DescriptorSet, E>,
    ) -> Result<(vk::DescriptorSet, Lookup), E> {
        if let Some(set) = self.get(key) {
            self.stats.hits += 1;
            return Ok((set, Lookup::Hit));
        }
        let set = create()?;
        self.stats.misses += 1;
        self.insert(key, set, freer);
        Ok((set, Lookup::Miss))
    }

    /// Requests a full clear at the start of the next frame.
    pub fn request_invalidate(&mut self) {
        self.force_invalidate = true;
    }

    pub fn invalidate_requested(&self) -> bool {
        self.force_invalidate
    }

    /// Clears the cache if an invalidation was requested. Returns whether
    /// it did.
    pub fn begin_frame(&mut self, freer: &mut impl DescriptorFreer) -> bool {
        if !std::mem::take(&mut self.force_invalidate) {
            return false;
        }
        let count = self.len();
        self.clear(freer);
        debug!("Per-entity descriptor cache invalidated ({} sets)", count);
        true
    }

    /// Frees every cached set.
    pub fn clear(&mut self, freer: &mut impl DescriptorFreer) {
        let sets: Vec<vk::DescriptorSet> = self.entries.drain().map(|(_, e)| e.set).collect();
        self.order.clear();
        if !sets.is_empty() {
            freer.free_sets(&sets);
        }
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    #[derive(Default)]
    struct RecordingFreer {
        freed: Vec<vk::DescriptorSet>,
    }

    impl DescriptorFreer for RecordingFreer {
        fn free_sets(&mut self, sets: &[vk::DescriptorSet]) {
            self.freed.extend_from_slice(sets);
        }
    }

    fn set(raw: u64) -> vk::DescriptorSet {
        vk::DescriptorSet::from_raw(raw)
    }

    /// Inserts keys `1..=count` through `get_or_insert_with`, backing key
    /// `k` with set `k`.
    fn fill(lru: &mut DescriptorLru, freer: &mut RecordingFreer, keys: impl Iterator<Item = u64>) {
        for key in keys {
            lru.get_or_insert_with(key, freer, || Ok::<_, ()>(set(key)))
                .unwrap();
        }
    }

    #[test]
    fn test_hundred_combinations_stay_within_capacity() {
        let mut lru = DescriptorLru::default();
        let mut freer = RecordingFreer::default();

        for key in 1..=100 {
            lru.get_or_insert_with(key, &mut freer, || Ok::<_, ()>(set(key)))
                .unwrap();
            assert!(lru.len() <= DEFAULT_CAPACITY);
        }

        assert_eq!(lru.len(), 75);
        assert_eq!(freer.freed.len(), 25);
        assert_eq!(lru.stats().evictions, 25);
        // The oldest 25 went back to the pool in insertion order.
        let expected: Vec<_> = (1..=25).map(set).collect();
        assert_eq!(freer.freed, expected);
    }

    #[test]
    fn test_76th_insert_evicts_exactly_the_lru() {
        let mut lru = DescriptorLru::default();
        let mut freer = RecordingFreer::default();
        fill(&mut lru, &mut freer, 1..=75);
        assert!(freer.freed.is_empty());

        // Touch key 1 so key 2 becomes the least recently used.
        assert_eq!(lru.get(1), Some(set(1)));
        assert_eq!(lru.least_recent(), Some(2));

        fill(&mut lru, &mut freer, std::iter::once(76));
        assert_eq!(freer.freed, vec![set(2)]);
        assert!(!lru.contains(2));
        assert!(lru.contains(1));

        // The 77th lookup hits a recent key and evicts nothing.
        let (hit, lookup) = lru
            .get_or_insert_with(76, &mut freer, || Err("must not allocate"))
            .unwrap();
        assert_eq!(lookup, Lookup::Hit);
        assert_eq!(hit, set(76));
        assert_eq!(freer.freed.len(), 1);
        assert_eq!(lru.len(), 75);
    }

    #[test]
    fn test_hit_returns_latest_set_for_key() {
        let mut lru = DescriptorLru::new(4);
        let mut freer = RecordingFreer::default();
        lru.insert(7, set(70), &mut freer);
        lru.insert(7, set(71), &mut freer);

        assert_eq!(lru.get(7), Some(set(71)));
        assert_eq!(freer.freed, vec![set(70)]);
        assert_eq!(lru.len(), 1);
    }

    #[test]
    fn test_failed_create_leaves_cache_untouched() {
        let mut lru = DescriptorLru::new(2);
        let mut freer = RecordingFreer::default();
        fill(&mut lru, &mut freer, 1..=2);

        let result = lru.get_or_insert_with(3, &mut freer, || Err("pool exhausted"));
        assert_eq!(result, Err("pool exhausted"));
        assert_eq!(lru.len(), 2);
        assert!(freer.freed.is_empty());
    }

    #[test]
    fn test_forced_invalidate_clears_on_next_frame() {
        let mut lru = DescriptorLru::default();
        let mut freer = RecordingFreer::default();
        fill(&mut lru, &mut freer, 1..=10);

        assert!(!lru.begin_frame(&mut freer));
        lru.request_invalidate();
        assert!(lru.invalidate_requested());
        assert_eq!(lru.len(), 10);

        assert!(lru.begin_frame(&mut freer));
        assert!(lru.is_empty());
        assert_eq!(freer.freed.len(), 10);
        assert!(!lru.begin_frame(&mut freer));
    }

    #[test]
    fn test_key_depends_on_every_input() {
        let views = [vk::ImageView::from_raw(1), vk::ImageView::from_raw(2)];
        let base = entity_descriptor_key(1, "pbr", &views);

        assert_eq!(base, entity_descriptor_key(1, "pbr", &views));
        assert_ne!(base, entity_descriptor_key(2, "pbr", &views));
        assert_ne!(base, entity_descriptor_key(1, "basic", &views));
        assert_ne!(
            base,
            entity_descriptor_key(1, "pbr", &[views[1], views[0]])
        );
    }

    #[test]
    fn test_retired_sets_wait_for_their_slot() {
        let mut retired = RetiredSets::new(2);

        assert!(retired.begin_frame(0).is_empty());
        retired.free_sets(&[set(1), set(2)]);

        assert!(retired.begin_frame(1).is_empty());
        retired.free_sets(&[set(3)]);
        assert_eq!(retired.len(), 3);

        // Slot 0 comes round again: its fence has been waited on.
        assert_eq!(retired.begin_frame(2), vec![set(1), set(2)]);
        assert_eq!(retired.drain_all(), vec![set(3)]);
        assert!(retired.is_empty());
    }
}
