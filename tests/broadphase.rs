//! Heap traffic of the broad phase once its buffers are warm.
//!
//! Kept in its own test binary: the counting allocator sees every thread.

use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

use rein2d::collision::{Aabb, BroadPhase, ProxyId};
use rein2d::glam::Vec2;

struct CountingAllocator;

static ALLOCATIONS: AtomicUsize = AtomicUsize::new(0);

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        ALLOCATIONS.fetch_add(1, Ordering::SeqCst);
        System.alloc(layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout)
    }
}

#[global_allocator]
static GLOBAL: CountingAllocator = CountingAllocator;

#[test]
fn test_steady_state_update_pairs_does_not_allocate() {
    let mut broad_phase: BroadPhase<u32> = BroadPhase::new();
    let proxies: Vec<ProxyId> = (0..50)
        .map(|i| {
            let center = Vec2::new(i as f32 * 0.8, 0.0);
            broad_phase.create_proxy(
                Aabb::new(center - Vec2::splat(0.5), center + Vec2::splat(0.5)),
                i,
            )
        })
        .collect();

    // Two warm-up rounds grow the move and pair buffers to their working size.
    let mut pairs = 0usize;
    broad_phase.update_pairs(|_, _| pairs += 1);
    for &id in &proxies {
        broad_phase.touch_proxy(id);
    }
    broad_phase.update_pairs(|_, _| {});
    for &id in &proxies {
        broad_phase.touch_proxy(id);
    }

    pairs = 0;
    let before = ALLOCATIONS.load(Ordering::SeqCst);
    broad_phase.update_pairs(|_, _| pairs += 1);
    let allocations = ALLOCATIONS.load(Ordering::SeqCst) - before;

    assert_eq!(allocations, 0, "update_pairs allocated {allocations} times");
    assert_eq!(pairs, 49);
}
