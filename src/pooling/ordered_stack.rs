//! Fixed-capacity stack of pre-allocated temporaries with scoped checkout.

use std::ops::{Deref, DerefMut};

use crate::error::PoolError;

/// A fixed-size stack of reusable instances.
///
/// Slots are handed out with [`OrderedStack::checkout`] and returned when the
/// [`Checkout`] guard is dropped. A nested checkout can only be taken through
/// the outer guard ([`Checkout::split`]), so guards are always released in
/// LIFO order.
pub struct OrderedStack<T> {
    items: Vec<T>,
    index: usize,
}

impl<T: Default> OrderedStack<T> {
    /// Pre-allocate `size` default instances.
    pub fn new(size: usize) -> Self {
        Self::with_factory(size, T::default)
    }
}

impl<T> OrderedStack<T> {
    /// Pre-allocate `size` instances built by `factory`.
    pub fn with_factory(size: usize, mut factory: impl FnMut() -> T) -> Self {
        Self {
            items: (0..size).map(|_| factory()).collect(),
            index: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.items.len()
    }

    /// Number of slots currently checked out.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn available(&self) -> usize {
        self.items.len() - self.index
    }

    /// Check out `count` slots. They are returned when the guard drops.
    pub fn checkout(&mut self, count: usize) -> Result<Checkout<'_, T>, PoolError> {
        let Self { items, index } = self;
        Checkout::take(&mut items[*index..], index, count)
    }

    /// Check out a single slot.
    pub fn pop(&mut self) -> Result<Checkout<'_, T>, PoolError> {
        self.checkout(1)
    }
}

/// Scoped access to slots of an [`OrderedStack`].
pub struct Checkout<'a, T> {
    slots: &'a mut [T],
    rest: &'a mut [T],
    index: &'a mut usize,
    count: usize,
}

impl<'a, T> Checkout<'a, T> {
    fn take(
        free: &'a mut [T],
        index: &'a mut usize,
        count: usize,
    ) -> Result<Self, PoolError> {
        if count > free.len() {
            return Err(PoolError::Overflow {
                requested: count,
                available: free.len(),
            });
        }
        let (slots, rest) = free.split_at_mut(count);
        *index += count;
        Ok(Self {
            slots,
            rest,
            index,
            count,
        })
    }

    /// Depth of the owning stack while this guard is alive.
    pub fn depth(&self) -> usize {
        *self.index
    }

    /// Check out `count` more slots while keeping access to this guard's slots.
    pub fn split(&mut self, count: usize) -> Result<(&mut [T], Checkout<'_, T>), PoolError> {
        let inner = Checkout::take(&mut *self.rest, &mut *self.index, count)?;
        Ok((&mut *self.slots, inner))
    }
}

impl<T> Deref for Checkout<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.slots
    }
}

impl<T> DerefMut for Checkout<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.slots
    }
}

impl<T> Drop for Checkout<'_, T> {
    fn drop(&mut self) {
        debug_assert!(*self.index >= self.count);
        *self.index -= self.count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    #[test]
    fn test_checkout_restores_index() {
        let mut stack: OrderedStack<Vec2> = OrderedStack::new(8);
        {
            let mut slots = stack.checkout(3).unwrap();
            assert_eq!(slots.len(), 3);
            assert_eq!(slots.depth(), 3);
            slots[0] = Vec2::new(1.0, 2.0);
        }
        assert_eq!(stack.index(), 0);
        assert_eq!(stack.available(), 8);
    }

    #[test]
    fn test_nested_checkout_is_lifo() {
        let mut stack: OrderedStack<Vec2> = OrderedStack::new(6);
        {
            let mut outer = stack.checkout(2).unwrap();
            {
                let (outer_slots, mut inner) = outer.split(3).unwrap();
                outer_slots[1] = Vec2::ONE;
                inner[2] = Vec2::X;
                assert_eq!(inner.depth(), 5);
                {
                    let (_, innermost) = inner.split(1).unwrap();
                    assert_eq!(innermost.depth(), 6);
                }
                assert_eq!(inner.depth(), 5);
            }
            assert_eq!(outer.depth(), 2);
            assert_eq!(outer[1], Vec2::ONE);
        }
        assert_eq!(stack.index(), 0);
    }

    #[test]
    fn test_overflow_is_reported() {
        let mut stack: OrderedStack<f32> = OrderedStack::new(4);
        let err = stack.checkout(5).err();
        assert_eq!(
            err,
            Some(PoolError::Overflow {
                requested: 5,
                available: 4
            })
        );
        assert_eq!(stack.index(), 0);

        let mut held = stack.checkout(3).unwrap();
        assert!(held.split(2).is_err());
        assert!(held.split(1).is_ok());
    }

    #[test]
    fn test_slots_are_reused() {
        let mut stack: OrderedStack<u32> = OrderedStack::new(2);
        {
            let mut a = stack.pop().unwrap();
            a[0] = 42;
        }
        let b = stack.pop().unwrap();
        assert_eq!(b[0], 42);
    }
}
