//! Dynamic AABB tree.
//!
//! A binary tree of fat AABBs. Leaves are proxies; internal nodes bound their
//! children. Insertion picks the sibling that minimizes the perimeter growth
//! of the tree and rotations keep it height-balanced. Moving a proxy only
//! touches the tree when its tight AABB escapes the fat one.

use std::cell::Cell;
use std::fmt;

use glam::Vec2;

use crate::math::cross_sv;
use crate::settings::{AABB_EXTENSION, AABB_MULTIPLIER};

use super::aabb::{Aabb, RayCastInput};
use super::broadphase::{BroadPhaseStrategy, ProxyId};

const NULL_NODE: usize = usize::MAX;

#[derive(Debug, Clone)]
struct TreeNode<T> {
    /// Fat AABB for leaves, union of the children otherwise.
    aabb: Aabb,
    /// Set on leaves only.
    user_data: Option<T>,
    parent: usize,
    child1: usize,
    child2: usize,
    /// Leaf = 0, free node = -1.
    height: i32,
}

impl<T> TreeNode<T> {
    fn free() -> Self {
        Self {
            aabb: Aabb::default(),
            user_data: None,
            parent: NULL_NODE,
            child1: NULL_NODE,
            child2: NULL_NODE,
            height: -1,
        }
    }

    #[inline]
    fn is_leaf(&self) -> bool {
        self.child1 == NULL_NODE
    }
}

/// Node stack shared by queries and ray casts. A traversal takes the buffer
/// and hands it back when done, so a query issued from inside a callback
/// starts on a fresh stack instead of clobbering the outer one.
struct TraversalStack(Cell<Vec<usize>>);

impl TraversalStack {
    fn new() -> Self {
        Self(Cell::new(Vec::with_capacity(64)))
    }

    fn take(&self) -> Vec<usize> {
        let mut stack = self.0.take();
        stack.clear();
        stack
    }

    fn restore(&self, stack: Vec<usize>) {
        self.0.set(stack);
    }

    #[cfg(test)]
    fn buffer(&self) -> (*const usize, usize) {
        let stack = self.0.take();
        let buffer = (stack.as_ptr(), stack.capacity());
        self.0.set(stack);
        buffer
    }
}

impl Clone for TraversalStack {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl fmt::Debug for TraversalStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TraversalStack")
    }
}

/// Dynamic AABB tree keyed by [`ProxyId`].
#[derive(Debug, Clone)]
pub struct DynamicTree<T> {
    nodes: Vec<TreeNode<T>>,
    free_list: Vec<usize>,
    root: usize,
    node_count: usize,
    insertion_count: usize,
    stack: TraversalStack,
}

impl<T> Default for DynamicTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DynamicTree<T> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::with_capacity(16),
            free_list: Vec::new(),
            root: NULL_NODE,
            node_count: 0,
            insertion_count: 0,
            stack: TraversalStack::new(),
        }
    }

    /// Number of leaf insertions since creation. Useful for profiling.
    pub fn insertion_count(&self) -> usize {
        self.insertion_count
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    fn allocate_node(&mut self) -> usize {
        self.node_count += 1;
        if let Some(id) = self.free_list.pop() {
            self.nodes[id] = TreeNode {
                height: 0,
                ..TreeNode::free()
            };
            id
        } else {
            self.nodes.push(TreeNode {
                height: 0,
                ..TreeNode::free()
            });
            self.nodes.len() - 1
        }
    }

    fn free_node(&mut self, id: usize) {
        debug_assert!(self.node_count > 0);
        self.nodes[id] = TreeNode::free();
        self.free_list.push(id);
        self.node_count -= 1;
    }

    fn is_live_leaf(&self, id: usize) -> bool {
        self.nodes
            .get(id)
            .is_some_and(|n| n.height >= 0 && n.is_leaf())
    }

    fn insert_leaf(&mut self, leaf: usize) {
        self.insertion_count += 1;

        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf].parent = NULL_NODE;
            return;
        }

        // Find the best sibling for this leaf.
        let leaf_aabb = self.nodes[leaf].aabb;
        let mut index = self.root;
        while !self.nodes[index].is_leaf() {
            let node = &self.nodes[index];
            let child1 = node.child1;
            let child2 = node.child2;

            let area = node.aabb.perimeter();
            let combined_area = Aabb::combine(&node.aabb, &leaf_aabb).perimeter();

            // Cost of creating a new parent for this node and the new leaf.
            let cost = 2.0 * combined_area;

            // Minimum cost of pushing the leaf further down the tree.
            let inheritance_cost = 2.0 * (combined_area - area);

            let descend_cost = |child: usize| {
                let c = &self.nodes[child];
                let combined = Aabb::combine(&leaf_aabb, &c.aabb).perimeter();
                if c.is_leaf() {
                    combined + inheritance_cost
                } else {
                    combined - c.aabb.perimeter() + inheritance_cost
                }
            };
            let cost1 = descend_cost(child1);
            let cost2 = descend_cost(child2);

            if cost < cost1 && cost < cost2 {
                break;
            }

            index = if cost1 < cost2 { child1 } else { child2 };
        }

        let sibling = index;

        // Create a new parent.
        let old_parent = self.nodes[sibling].parent;
        let new_parent = self.allocate_node();
        {
            let sibling_node = &self.nodes[sibling];
            let aabb = Aabb::combine(&leaf_aabb, &sibling_node.aabb);
            let height = sibling_node.height + 1;
            let parent = &mut self.nodes[new_parent];
            parent.parent = old_parent;
            parent.aabb = aabb;
            parent.height = height;
            parent.child1 = sibling;
            parent.child2 = leaf;
        }
        self.nodes[sibling].parent = new_parent;
        self.nodes[leaf].parent = new_parent;

        if old_parent != NULL_NODE {
            // The sibling was not the root.
            if self.nodes[old_parent].child1 == sibling {
                self.nodes[old_parent].child1 = new_parent;
            } else {
                self.nodes[old_parent].child2 = new_parent;
            }
        } else {
            // The sibling was the root.
            self.root = new_parent;
        }

        // Walk back up the tree fixing heights and AABBs.
        self.refit_from(self.nodes[leaf].parent);
    }

    fn remove_leaf(&mut self, leaf: usize) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }

        let parent = self.nodes[leaf].parent;
        let grand_parent = self.nodes[parent].parent;
        let sibling = if self.nodes[parent].child1 == leaf {
            self.nodes[parent].child2
        } else {
            self.nodes[parent].child1
        };

        if grand_parent != NULL_NODE {
            // Destroy parent and connect sibling to grand parent.
            if self.nodes[grand_parent].child1 == parent {
                self.nodes[grand_parent].child1 = sibling;
            } else {
                self.nodes[grand_parent].child2 = sibling;
            }
            self.nodes[sibling].parent = grand_parent;
            self.free_node(parent);

            self.refit_from(grand_parent);
        } else {
            self.root = sibling;
            self.nodes[sibling].parent = NULL_NODE;
            self.free_node(parent);
        }
    }

    /// Rebalance and recompute bounds from `index` up to the root.
    fn refit_from(&mut self, mut index: usize) {
        while index != NULL_NODE {
            index = self.balance(index);

            let child1 = self.nodes[index].child1;
            let child2 = self.nodes[index].child2;
            debug_assert!(child1 != NULL_NODE && child2 != NULL_NODE);

            let height = 1 + self.nodes[child1].height.max(self.nodes[child2].height);
            let aabb = Aabb::combine(&self.nodes[child1].aabb, &self.nodes[child2].aabb);
            let node = &mut self.nodes[index];
            node.height = height;
            node.aabb = aabb;

            index = node.parent;
        }
    }

    /// Perform a left or right rotation if node A is imbalanced.
    /// Returns the new root index of the subtree.
    fn balance(&mut self, i_a: usize) -> usize {
        let a = &self.nodes[i_a];
        if a.is_leaf() || a.height < 2 {
            return i_a;
        }

        let i_b = a.child1;
        let i_c = a.child2;
        let balance = self.nodes[i_c].height - self.nodes[i_b].height;

        if balance > 1 {
            // Rotate C up.
            let i_f = self.nodes[i_c].child1;
            let i_g = self.nodes[i_c].child2;

            // Swap A and C.
            let a_parent = self.nodes[i_a].parent;
            self.nodes[i_c].child1 = i_a;
            self.nodes[i_c].parent = a_parent;
            self.nodes[i_a].parent = i_c;

            // A's old parent should point to C.
            self.replace_child(a_parent, i_a, i_c);

            let (keep, moved) = if self.nodes[i_f].height > self.nodes[i_g].height {
                (i_f, i_g)
            } else {
                (i_g, i_f)
            };
            self.nodes[i_c].child2 = keep;
            self.nodes[i_a].child2 = moved;
            self.nodes[moved].parent = i_a;

            self.nodes[i_a].aabb = Aabb::combine(&self.nodes[i_b].aabb, &self.nodes[moved].aabb);
            self.nodes[i_c].aabb = Aabb::combine(&self.nodes[i_a].aabb, &self.nodes[keep].aabb);
            self.nodes[i_a].height =
                1 + self.nodes[i_b].height.max(self.nodes[moved].height);
            self.nodes[i_c].height =
                1 + self.nodes[i_a].height.max(self.nodes[keep].height);

            return i_c;
        }

        if balance < -1 {
            // Rotate B up.
            let i_d = self.nodes[i_b].child1;
            let i_e = self.nodes[i_b].child2;

            // Swap A and B.
            let a_parent = self.nodes[i_a].parent;
            self.nodes[i_b].child1 = i_a;
            self.nodes[i_b].parent = a_parent;
            self.nodes[i_a].parent = i_b;

            // A's old parent should point to B.
            self.replace_child(a_parent, i_a, i_b);

            let (keep, moved) = if self.nodes[i_d].height > self.nodes[i_e].height {
                (i_d, i_e)
            } else {
                (i_e, i_d)
            };
            self.nodes[i_b].child2 = keep;
            self.nodes[i_a].child1 = moved;
            self.nodes[moved].parent = i_a;

            self.nodes[i_a].aabb = Aabb::combine(&self.nodes[i_c].aabb, &self.nodes[moved].aabb);
            self.nodes[i_b].aabb = Aabb::combine(&self.nodes[i_a].aabb, &self.nodes[keep].aabb);
            self.nodes[i_a].height =
                1 + self.nodes[i_c].height.max(self.nodes[moved].height);
            self.nodes[i_b].height =
                1 + self.nodes[i_a].height.max(self.nodes[keep].height);

            return i_b;
        }

        i_a
    }

    fn replace_child(&mut self, parent: usize, old: usize, new: usize) {
        if parent == NULL_NODE {
            self.root = new;
        } else if self.nodes[parent].child1 == old {
            self.nodes[parent].child1 = new;
        } else {
            debug_assert_eq!(self.nodes[parent].child2, old);
            self.nodes[parent].child2 = new;
        }
    }

    fn compute_height(&self, index: usize) -> i32 {
        let node = &self.nodes[index];
        if node.is_leaf() {
            return 0;
        }
        1 + self
            .compute_height(node.child1)
            .max(self.compute_height(node.child2))
    }

    fn validate_structure(&self, index: usize) -> bool {
        if index == NULL_NODE {
            return true;
        }
        let node = &self.nodes[index];
        if index == self.root && node.parent != NULL_NODE {
            return false;
        }
        if node.is_leaf() {
            return node.child2 == NULL_NODE && node.height == 0 && node.user_data.is_some();
        }

        let (c1, c2) = (node.child1, node.child2);
        c1 < self.nodes.len()
            && c2 < self.nodes.len()
            && self.nodes[c1].parent == index
            && self.nodes[c2].parent == index
            && self.validate_structure(c1)
            && self.validate_structure(c2)
    }

    fn validate_metrics(&self, index: usize) -> bool {
        if index == NULL_NODE {
            return true;
        }
        let node = &self.nodes[index];
        if node.is_leaf() {
            return true;
        }

        let (c1, c2) = (&self.nodes[node.child1], &self.nodes[node.child2]);
        let height = 1 + c1.height.max(c2.height);
        let aabb = Aabb::combine(&c1.aabb, &c2.aabb);
        node.height == height
            && node.aabb == aabb
            && self.validate_metrics(node.child1)
            && self.validate_metrics(node.child2)
    }
}

impl<T> BroadPhaseStrategy<T> for DynamicTree<T> {
    /// Create a proxy with a fat AABB. Returns its id.
    fn create_proxy(&mut self, aabb: Aabb, user_data: T) -> ProxyId {
        let id = self.allocate_node();
        let node = &mut self.nodes[id];
        node.aabb = aabb.fattened(AABB_EXTENSION);
        node.user_data = Some(user_data);
        node.height = 0;
        self.insert_leaf(id);
        ProxyId(id)
    }

    fn destroy_proxy(&mut self, id: ProxyId) {
        debug_assert!(self.is_live_leaf(id.0));
        self.remove_leaf(id.0);
        self.free_node(id.0);
    }

    /// Re-insert the proxy if `aabb` escaped its fat AABB. The new fat AABB is
    /// extended along the predicted displacement.
    fn move_proxy(&mut self, id: ProxyId, aabb: Aabb, displacement: Vec2) -> bool {
        debug_assert!(self.is_live_leaf(id.0));

        if self.nodes[id.0].aabb.contains(&aabb) {
            return false;
        }

        self.remove_leaf(id.0);

        let mut b = aabb.fattened(AABB_EXTENSION);
        let d = displacement * AABB_MULTIPLIER;
        if d.x < 0.0 {
            b.lower.x += d.x;
        } else {
            b.upper.x += d.x;
        }
        if d.y < 0.0 {
            b.lower.y += d.y;
        } else {
            b.upper.y += d.y;
        }

        self.nodes[id.0].aabb = b;
        self.insert_leaf(id.0);
        true
    }

    fn user_data(&self, id: ProxyId) -> Option<&T> {
        self.nodes.get(id.0).and_then(|n| n.user_data.as_ref())
    }

    fn fat_aabb(&self, id: ProxyId) -> Aabb {
        debug_assert!(self.is_live_leaf(id.0));
        self.nodes[id.0].aabb
    }

    fn query<F: FnMut(ProxyId) -> bool>(&self, aabb: &Aabb, mut callback: F) {
        let mut stack = self.stack.take();
        stack.push(self.root);

        while let Some(index) = stack.pop() {
            if index == NULL_NODE {
                continue;
            }

            let node = &self.nodes[index];
            if !node.aabb.overlaps(aabb) {
                continue;
            }

            if node.is_leaf() {
                if !callback(ProxyId(index)) {
                    break;
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }

        self.stack.restore(stack);
    }

    fn raycast<F: FnMut(&RayCastInput, ProxyId) -> f32>(
        &self,
        input: &RayCastInput,
        mut callback: F,
    ) {
        let p1 = input.p1;
        let p2 = input.p2;
        let r = (p2 - p1).normalize_or_zero();
        if r == Vec2::ZERO {
            return;
        }

        // v is perpendicular to the segment.
        let v = cross_sv(1.0, r);
        let abs_v = v.abs();

        // Separating axis for segment (Gino, p80).
        // |dot(v, p1 - c)| > dot(|v|, h)

        let mut max_fraction = input.max_fraction;
        let segment_aabb = |max_fraction: f32| Aabb::from_points(p1, p1 + (p2 - p1) * max_fraction);
        let mut bounds = segment_aabb(max_fraction);

        let mut stack = self.stack.take();
        stack.push(self.root);

        while let Some(index) = stack.pop() {
            if index == NULL_NODE {
                continue;
            }

            let node = &self.nodes[index];
            if !node.aabb.overlaps(&bounds) {
                continue;
            }

            let c = node.aabb.center();
            let h = node.aabb.extents();
            let separation = v.dot(p1 - c).abs() - abs_v.dot(h);
            if separation > 0.0 {
                continue;
            }

            if node.is_leaf() {
                let sub_input = RayCastInput {
                    p1,
                    p2,
                    max_fraction,
                };

                let value = callback(&sub_input, ProxyId(index));
                if value == 0.0 {
                    // The client has terminated the ray cast.
                    break;
                }

                if value > 0.0 {
                    // Update segment bounding box.
                    max_fraction = value;
                    bounds = segment_aabb(max_fraction);
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }

        self.stack.restore(stack);
    }

    fn height(&self) -> i32 {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root].height
        }
    }

    fn max_balance(&self) -> i32 {
        self.nodes
            .iter()
            .filter(|n| n.height > 1)
            .map(|n| (self.nodes[n.child2].height - self.nodes[n.child1].height).abs())
            .max()
            .unwrap_or(0)
    }

    fn area_ratio(&self) -> f32 {
        if self.root == NULL_NODE {
            return 0.0;
        }

        let root_area = self.nodes[self.root].aabb.perimeter();
        let total_area: f32 = self
            .nodes
            .iter()
            .filter(|n| n.height >= 0)
            .map(|n| n.aabb.perimeter())
            .sum();

        total_area / root_area
    }

    fn validate(&self) -> bool {
        let structure = self.validate_structure(self.root) && self.validate_metrics(self.root);
        let height_ok = self.root == NULL_NODE || self.height() == self.compute_height(self.root);
        let counts_ok = self.node_count + self.free_list.len() == self.nodes.len();
        structure && height_ok && counts_ok
    }
}
