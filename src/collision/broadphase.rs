//! Broad-phase pair management.
//!
//! The broad-phase buffers proxies that were created, moved or touched during
//! a step. [`BroadPhase::update_pairs`] queries each buffered proxy against the
//! spatial index and reports every new overlapping pair exactly once.

use std::marker::PhantomData;

use glam::Vec2;

use super::aabb::{Aabb, RayCastInput};
use super::dynamic_tree::DynamicTree;

/// Handle of a proxy in the spatial index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProxyId(pub usize);

/// Spatial index behind the broad-phase.
///
/// [`DynamicTree`] is the production implementation.
pub trait BroadPhaseStrategy<T> {
    fn create_proxy(&mut self, aabb: Aabb, user_data: T) -> ProxyId;
    fn destroy_proxy(&mut self, id: ProxyId);
    /// Returns true if the proxy's fat AABB changed.
    fn move_proxy(&mut self, id: ProxyId, aabb: Aabb, displacement: Vec2) -> bool;
    fn user_data(&self, id: ProxyId) -> Option<&T>;
    fn fat_aabb(&self, id: ProxyId) -> Aabb;
    /// Report every proxy whose fat AABB overlaps `aabb`. Stops when the
    /// callback returns false.
    fn query<F: FnMut(ProxyId) -> bool>(&self, aabb: &Aabb, callback: F);
    /// Report proxies along the ray. The callback returns 0 to stop, a
    /// fraction to clip the ray, or a negative value to ignore the proxy.
    fn raycast<F: FnMut(&RayCastInput, ProxyId) -> f32>(&self, input: &RayCastInput, callback: F);
    fn height(&self) -> i32;
    fn max_balance(&self) -> i32;
    /// Sum of node perimeters over the root perimeter.
    fn area_ratio(&self) -> f32;
    fn validate(&self) -> bool;
}

/// An unordered proxy pair, stored with the smaller id first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pair {
    pub proxy_a: ProxyId,
    pub proxy_b: ProxyId,
}

impl Pair {
    pub fn new(a: ProxyId, b: ProxyId) -> Self {
        Self {
            proxy_a: a.min(b),
            proxy_b: a.max(b),
        }
    }
}

pub struct BroadPhase<T, S = DynamicTree<T>> {
    tree: S,
    proxy_count: usize,
    /// Destroyed proxies leave a `None` behind.
    move_buffer: Vec<Option<ProxyId>>,
    pair_buffer: Vec<Pair>,
    _user_data: PhantomData<T>,
}

impl<T> Default for BroadPhase<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BroadPhase<T> {
    pub fn new() -> Self {
        Self::with_strategy(DynamicTree::new())
    }
}

impl<T, S: BroadPhaseStrategy<T>> BroadPhase<T, S> {
    pub fn with_strategy(tree: S) -> Self {
        Self {
            tree,
            proxy_count: 0,
            move_buffer: Vec::with_capacity(16),
            pair_buffer: Vec::with_capacity(16),
            _user_data: PhantomData,
        }
    }

    /// Create a proxy with an initial AABB. Pairs are not reported until
    /// [`Self::update_pairs`] is called.
    pub fn create_proxy(&mut self, aabb: Aabb, user_data: T) -> ProxyId {
        let id = self.tree.create_proxy(aabb, user_data);
        self.proxy_count += 1;
        self.buffer_move(id);
        id
    }

    pub fn destroy_proxy(&mut self, id: ProxyId) {
        self.unbuffer_move(id);
        self.proxy_count -= 1;
        self.tree.destroy_proxy(id);
    }

    /// Move a proxy. Only proxies whose fat AABB changed are buffered.
    pub fn move_proxy(&mut self, id: ProxyId, aabb: Aabb, displacement: Vec2) {
        if self.tree.move_proxy(id, aabb, displacement) {
            self.buffer_move(id);
        }
    }

    /// Re-check a proxy's pairs on the next update without moving it.
    pub fn touch_proxy(&mut self, id: ProxyId) {
        self.buffer_move(id);
    }

    pub fn fat_aabb(&self, id: ProxyId) -> Aabb {
        self.tree.fat_aabb(id)
    }

    pub fn user_data(&self, id: ProxyId) -> Option<&T> {
        self.tree.user_data(id)
    }

    /// Do the fat AABBs of two proxies overlap?
    pub fn test_overlap(&self, a: ProxyId, b: ProxyId) -> bool {
        self.tree.fat_aabb(a).overlaps(&self.tree.fat_aabb(b))
    }

    pub fn proxy_count(&self) -> usize {
        self.proxy_count
    }

    pub fn query<F: FnMut(ProxyId) -> bool>(&self, aabb: &Aabb, callback: F) {
        self.tree.query(aabb, callback);
    }

    pub fn raycast<F>(&self, input: &RayCastInput, callback: F)
    where
        F: FnMut(&RayCastInput, ProxyId) -> f32,
    {
        self.tree.raycast(input, callback);
    }

    pub fn tree_height(&self) -> i32 {
        self.tree.height()
    }

    pub fn tree_balance(&self) -> i32 {
        self.tree.max_balance()
    }

    pub fn tree_quality(&self) -> f32 {
        self.tree.area_ratio()
    }

    pub fn validate(&self) -> bool {
        self.tree.validate()
    }

    /// Report each new overlapping pair among the buffered proxies once.
    pub fn update_pairs<F: FnMut(&T, &T)>(&mut self, mut callback: F) {
        self.pair_buffer.clear();

        let tree = &self.tree;
        let pair_buffer = &mut self.pair_buffer;
        for query_id in self.move_buffer.iter().flatten().copied() {
            let fat = tree.fat_aabb(query_id);
            tree.query(&fat, |id| {
                // A proxy cannot form a pair with itself.
                if id != query_id {
                    pair_buffer.push(Pair::new(id, query_id));
                }
                true
            });
        }
        self.move_buffer.clear();

        // Sort so duplicates are adjacent.
        self.pair_buffer.sort_unstable();
        self.pair_buffer.dedup();

        tracing::trace!(pairs = self.pair_buffer.len(), "broad-phase pairs");

        for pair in &self.pair_buffer {
            if let (Some(a), Some(b)) = (
                self.tree.user_data(pair.proxy_a),
                self.tree.user_data(pair.proxy_b),
            ) {
                callback(a, b);
            }
        }
    }

    fn buffer_move(&mut self, id: ProxyId) {
        self.move_buffer.push(Some(id));
    }

    fn unbuffer_move(&mut self, id: ProxyId) {
        for slot in self.move_buffer.iter_mut() {
            if *slot == Some(id) {
                *slot = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    /// Linear-scan index used to check the buffering logic in isolation.
    #[derive(Default)]
    struct BruteForce {
        proxies: Vec<Option<(Aabb, u32)>>,
    }

    impl BroadPhaseStrategy<u32> for BruteForce {
        fn create_proxy(&mut self, aabb: Aabb, user_data: u32) -> ProxyId {
            self.proxies.push(Some((aabb, user_data)));
            ProxyId(self.proxies.len() - 1)
        }

        fn destroy_proxy(&mut self, id: ProxyId) {
            self.proxies[id.0] = None;
        }

        fn move_proxy(&mut self, id: ProxyId, aabb: Aabb, _displacement: Vec2) -> bool {
            if let Some((stored, _)) = self.proxies[id.0].as_mut() {
                *stored = aabb;
            }
            true
        }

        fn user_data(&self, id: ProxyId) -> Option<&u32> {
            self.proxies[id.0].as_ref().map(|(_, d)| d)
        }

        fn fat_aabb(&self, id: ProxyId) -> Aabb {
            self.proxies[id.0].map(|(a, _)| a).unwrap_or_default()
        }

        fn query<F: FnMut(ProxyId) -> bool>(&self, aabb: &Aabb, mut callback: F) {
            for (i, p) in self.proxies.iter().enumerate() {
                if let Some((b, _)) = p {
                    if b.overlaps(aabb) && !callback(ProxyId(i)) {
                        return;
                    }
                }
            }
        }

        fn raycast<F>(&self, input: &RayCastInput, mut callback: F)
        where
            F: FnMut(&RayCastInput, ProxyId) -> f32,
        {
            for (i, p) in self.proxies.iter().enumerate() {
                if p.is_some() && callback(input, ProxyId(i)) == 0.0 {
                    return;
                }
            }
        }

        fn height(&self) -> i32 {
            0
        }

        fn max_balance(&self) -> i32 {
            0
        }

        fn area_ratio(&self) -> f32 {
            0.0
        }

        fn validate(&self) -> bool {
            true
        }
    }

    fn square(x: f32, y: f32, half: f32) -> Aabb {
        Aabb::new(Vec2::new(x - half, y - half), Vec2::new(x + half, y + half))
    }

    fn collect_pairs<S: BroadPhaseStrategy<u32>>(bp: &mut BroadPhase<u32, S>) -> Vec<(u32, u32)> {
        let mut pairs = Vec::new();
        bp.update_pairs(|a, b| pairs.push(((*a).min(*b), (*a).max(*b))));
        pairs.sort();
        pairs
    }

    #[test]
    fn test_update_pairs_reports_each_pair_once() {
        let mut bp = BroadPhase::new();
        // Three mutually overlapping proxies plus one far away.
        bp.create_proxy(square(0.0, 0.0, 1.0), 0);
        bp.create_proxy(square(0.5, 0.0, 1.0), 1);
        bp.create_proxy(square(0.0, 0.5, 1.0), 2);
        bp.create_proxy(square(50.0, 0.0, 1.0), 3);

        let pairs = collect_pairs(&mut bp);
        assert_eq!(pairs, vec![(0, 1), (0, 2), (1, 2)]);

        // Nothing moved: no pairs.
        assert!(collect_pairs(&mut bp).is_empty());
        assert_eq!(bp.proxy_count(), 4);
    }

    #[test]
    fn test_pair_completeness_against_brute_force() {
        let mut bp = BroadPhase::new();
        let mut boxes = Vec::new();
        for i in 0..40u32 {
            let x = (i % 8) as f32 * 1.3;
            let y = (i / 8) as f32 * 1.1;
            let aabb = square(x, y, 0.6 + 0.05 * (i % 3) as f32);
            bp.create_proxy(aabb, i);
            boxes.push(aabb.fattened(crate::settings::AABB_EXTENSION));
        }

        let reported: HashSet<(u32, u32)> = collect_pairs(&mut bp).into_iter().collect();
        let mut expected = HashSet::new();
        for i in 0..boxes.len() {
            for j in (i + 1)..boxes.len() {
                if boxes[i].overlaps(&boxes[j]) {
                    expected.insert((i as u32, j as u32));
                }
            }
        }
        assert_eq!(reported, expected);
        assert!(bp.validate());
    }

    #[test]
    fn test_destroy_with_pending_move() {
        let mut bp = BroadPhase::new();
        let a = bp.create_proxy(square(0.0, 0.0, 1.0), 10);
        bp.create_proxy(square(0.5, 0.0, 1.0), 11);
        bp.move_proxy(a, square(5.0, 0.0, 1.0), Vec2::new(5.0, 0.0));
        bp.destroy_proxy(a);

        assert_eq!(bp.proxy_count(), 1);
        assert!(collect_pairs(&mut bp).is_empty());
    }

    #[test]
    fn test_touch_proxy_rebuffers() {
        let mut bp = BroadPhase::new();
        let a = bp.create_proxy(square(0.0, 0.0, 1.0), 1);
        bp.create_proxy(square(1.0, 0.0, 1.0), 2);
        assert_eq!(collect_pairs(&mut bp), vec![(1, 2)]);

        bp.touch_proxy(a);
        assert_eq!(collect_pairs(&mut bp), vec![(1, 2)]);
    }

    #[test]
    fn test_stub_strategy() {
        let mut bp = BroadPhase::with_strategy(BruteForce::default());
        let a = bp.create_proxy(square(0.0, 0.0, 1.0), 1);
        let b = bp.create_proxy(square(1.5, 0.0, 1.0), 2);
        let c = bp.create_proxy(square(9.0, 0.0, 1.0), 3);
        assert_eq!(collect_pairs(&mut bp), vec![(1, 2)]);
        assert!(bp.test_overlap(a, b));
        assert!(!bp.test_overlap(a, c));

        bp.move_proxy(c, square(2.5, 0.0, 1.0), Vec2::new(-6.5, 0.0));
        assert_eq!(collect_pairs(&mut bp), vec![(2, 3)]);

        bp.destroy_proxy(b);
        bp.touch_proxy(a);
        assert!(collect_pairs(&mut bp).is_empty());
    }

    #[test]
    fn test_query_and_raycast() {
        let mut bp = BroadPhase::new();
        let near = bp.create_proxy(square(3.0, 0.0, 0.5), 0u32);
        bp.create_proxy(square(8.0, 0.0, 0.5), 1u32);

        let mut found = Vec::new();
        bp.query(&square(3.0, 0.0, 0.1), |id| {
            found.push(id);
            true
        });
        assert_eq!(found, vec![near]);

        let input = RayCastInput::new(Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0));
        let mut first = None;
        bp.raycast(&input, |sub, id| match bp.fat_aabb(id).raycast(sub) {
            Some(hit) => {
                first = bp.user_data(id).copied();
                hit.fraction
            }
            None => -1.0,
        });
        assert_eq!(first, Some(0));
    }
}
