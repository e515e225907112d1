//! Per-entity descriptor cache under more drawables than it can hold,
//! with evictions deferred per frame slot the way the main pass frees them.

use std::collections::{HashMap, HashSet};

use ash::vk::{self, Handle};

use renderer_renderer::descriptor_cache::{
    DEFAULT_CAPACITY, DescriptorFreer, DescriptorLru, Lookup, RetiredSets, entity_descriptor_key,
};
use renderer_renderer::frame_manager::FrameSlots;

const FRAMES_IN_FLIGHT: usize = 2;

/// Stands in for the descriptor pool: hands out fresh handles and records
/// which are live.
#[derive(Default)]
struct FakePool {
    next: u64,
    live: HashSet<vk::DescriptorSet>,
    freed: u64,
}

impl FakePool {
    fn allocate(&mut self) -> Result<vk::DescriptorSet, &'static str> {
        self.next += 1;
        let set = vk::DescriptorSet::from_raw(self.next);
        self.live.insert(set);
        Ok(set)
    }
}

impl DescriptorFreer for FakePool {
    fn free_sets(&mut self, sets: &[vk::DescriptorSet]) {
        for set in sets {
            assert!(self.live.remove(set), "double free of {:?}", set);
            self.freed += 1;
        }
    }
}

fn keys(count: u64) -> Vec<u64> {
    (0..count)
        .map(|material| {
            let view = vk::ImageView::from_raw(0x1000 + material);
            entity_descriptor_key(material, "pbr", &[view; 5])
        })
        .collect()
}

/// Records one frame: frees what the slot retired last time, then binds a
/// set for every key. Returns the sets the frame's commands reference.
fn record_frame(
    frame_index: usize,
    keys: &[u64],
    lru: &mut DescriptorLru,
    retired: &mut RetiredSets,
    pool: &mut FakePool,
) -> HashSet<vk::DescriptorSet> {
    let reusable = retired.begin_frame(frame_index);
    pool.free_sets(&reusable);
    lru.begin_frame(retired);

    keys.iter()
        .map(|&key| {
            let (set, _) = lru
                .get_or_insert_with(key, retired, || pool.allocate())
                .unwrap();
            set
        })
        .collect()
}

#[test]
fn test_hundred_entities_never_free_a_set_in_flight() {
    let keys = keys(100);
    let mut lru = DescriptorLru::default();
    let mut retired = RetiredSets::new(FRAMES_IN_FLIGHT);
    let mut pool = FakePool::default();
    let mut slots = FrameSlots::new(FRAMES_IN_FLIGHT, 3);
    let mut in_flight: HashMap<usize, HashSet<vk::DescriptorSet>> = HashMap::new();

    for _ in 0..10 {
        let frame_index = slots.current();
        // The slot's fence has been waited on: its previous frame is done.
        in_flight.remove(&frame_index);

        let used = record_frame(frame_index, &keys, &mut lru, &mut retired, &mut pool);

        for (slot, sets) in &in_flight {
            assert!(
                sets.iter().all(|set| pool.live.contains(set)),
                "a set used by pending slot {slot} was freed"
            );
        }
        in_flight.insert(frame_index, used);
        slots.advance();
    }

    assert_eq!(lru.len(), DEFAULT_CAPACITY);
    assert!(lru.stats().evictions > 0);
    // Live sets are the cached ones plus those waiting on a slot.
    assert_eq!(pool.live.len(), lru.len() + retired.len());
}

#[test]
fn test_steady_scene_hits_after_first_frame() {
    let keys = keys(40);
    let mut lru = DescriptorLru::default();
    let mut retired = RetiredSets::new(FRAMES_IN_FLIGHT);
    let mut pool = FakePool::default();

    record_frame(0, &keys, &mut lru, &mut retired, &mut pool);
    assert_eq!(lru.stats().misses, 40);

    record_frame(1, &keys, &mut lru, &mut retired, &mut pool);
    assert_eq!(lru.stats().hits, 40);
    assert_eq!(lru.stats().evictions, 0);
    assert_eq!(pool.live.len(), 40);
}

#[test]
fn test_invalidation_returns_every_set_within_two_frames() {
    let keys = keys(20);
    let mut lru = DescriptorLru::default();
    let mut retired = RetiredSets::new(FRAMES_IN_FLIGHT);
    let mut pool = FakePool::default();

    record_frame(0, &keys, &mut lru, &mut retired, &mut pool);
    lru.request_invalidate();

    // Frame 1 retires the old sets onto slot 1 and allocates new ones.
    record_frame(1, &keys, &mut lru, &mut retired, &mut pool);
    assert!(!lru.invalidate_requested());
    assert_eq!(retired.len(), 20);
    assert_eq!(pool.live.len(), 40);

    record_frame(0, &keys, &mut lru, &mut retired, &mut pool);
    // Slot 1 comes round again: the old sets go back to the pool.
    record_frame(1, &keys, &mut lru, &mut retired, &mut pool);
    assert!(retired.is_empty());
    assert_eq!(pool.live.len(), 20);
    assert_eq!(pool.freed, 20);
}

#[test]
fn test_key_changes_with_textures() {
    let view = |raw| vk::ImageView::from_raw(raw);
    let a = entity_descriptor_key(7, "pbr", &[view(1), view(2)]);
    let b = entity_descriptor_key(7, "pbr", &[view(1), view(3)]);
    let c = entity_descriptor_key(7, "basic", &[view(1), view(2)]);
    assert_ne!(a, b);
    assert_ne!(a, c);
    assert_eq!(a, entity_descriptor_key(7, "pbr", &[view(1), view(2)]));

    let mut lru = DescriptorLru::new(2);
    let mut pool = FakePool::default();
    let (_, first) = lru
        .get_or_insert_with(a, &mut FakePoolFreer, || pool.allocate())
        .unwrap();
    let (_, second) = lru
        .get_or_insert_with(b, &mut FakePoolFreer, || pool.allocate())
        .unwrap();
    assert_eq!((first, second), (Lookup::Miss, Lookup::Miss));
}

/// Freer for tests that never evict.
struct FakePoolFreer;

impl DescriptorFreer for FakePoolFreer {
    fn free_sets(&mut self, sets: &[vk::DescriptorSet]) {
        panic!("unexpected free of {} sets", sets.len());
    }
}
