//! The per-world pool.

use std::collections::HashMap;

use glam::{Mat2, Mat3, Vec2, Vec3};

use crate::collision::distance::Distance;
use crate::collision::time_of_impact::TimeOfImpact;
use crate::dynamics::contact::ContactPools;
use crate::math::Rot;

use super::ordered_stack::OrderedStack;

/// Arrays of `Vec2` memoized by length.
#[derive(Debug, Default)]
pub struct Vec2ArrayCache {
    arrays: HashMap<usize, Vec<Vec2>>,
}

impl Vec2ArrayCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            arrays: HashMap::with_capacity(capacity),
        }
    }

    /// The cached array of exactly `len` elements, allocated on first use.
    pub fn get(&mut self, len: usize) -> &mut [Vec2] {
        let array = self
            .arrays
            .entry(len)
            .or_insert_with(|| vec![Vec2::ZERO; len]);
        debug_assert_eq!(array.len(), len, "vec2 array cache entry resized");
        array
    }

    /// Number of distinct lengths cached so far.
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}

/// Scoped temporaries, contact pools and the distance/TOI engines of one world.
pub struct WorldPool {
    pub vecs: OrderedStack<Vec2>,
    pub vec3s: OrderedStack<Vec3>,
    pub mats: OrderedStack<Mat2>,
    pub mat33s: OrderedStack<Mat3>,
    pub rots: OrderedStack<Rot>,
    pub vec2_arrays: Vec2ArrayCache,
    pub contacts: ContactPools,
    pub distance: Distance,
    pub toi: TimeOfImpact,
}

impl WorldPool {
    /// `stack_size` slots per ordered stack; `container_size` initial
    /// instances per contact pool.
    pub fn new(stack_size: usize, container_size: usize) -> Self {
        tracing::debug!(stack_size, container_size, "creating world pool");
        Self {
            vecs: OrderedStack::new(stack_size),
            vec3s: OrderedStack::new(stack_size),
            mats: OrderedStack::with_factory(stack_size, || Mat2::IDENTITY),
            mat33s: OrderedStack::with_factory(stack_size, || Mat3::IDENTITY),
            rots: OrderedStack::new(stack_size),
            vec2_arrays: Vec2ArrayCache::with_capacity(container_size),
            contacts: ContactPools::new(container_size),
            distance: Distance::default(),
            toi: TimeOfImpact::default(),
        }
    }

    /// True when no ordered-stack slot is checked out.
    pub fn is_balanced(&self) -> bool {
        self.vecs.index() == 0
            && self.vec3s.index() == 0
            && self.mats.index() == 0
            && self.mat33s.index() == 0
            && self.rots.index() == 0
    }
}
