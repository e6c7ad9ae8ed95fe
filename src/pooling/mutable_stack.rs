//! Growing free-list pool.

/// A free list of reusable instances that never runs dry.
///
/// When empty, [`MutableStack::pop`] doubles the pool by constructing fresh
/// instances with the factory.
pub struct MutableStack<T> {
    stack: Vec<T>,
    capacity: usize,
    factory: fn() -> T,
}

impl<T> MutableStack<T> {
    pub fn new(initial_size: usize, factory: fn() -> T) -> Self {
        let mut pool = Self {
            stack: Vec::with_capacity(initial_size),
            capacity: 0,
            factory,
        };
        pool.grow(initial_size.max(1));
        pool
    }

    /// Total number of instances this pool has created.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of instances currently sitting in the pool.
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Take an instance out of the pool, growing it if needed.
    pub fn pop(&mut self) -> T {
        if self.stack.is_empty() {
            self.grow(self.capacity);
        }
        self.stack.pop().unwrap_or_else(self.factory)
    }

    /// Return an instance to the pool.
    pub fn push(&mut self, item: T) {
        self.stack.push(item);
    }

    fn grow(&mut self, count: usize) {
        tracing::trace!(from = self.capacity, to = self.capacity + count, "growing pool");
        self.stack.reserve(count);
        for _ in 0..count {
            self.stack.push((self.factory)());
        }
        self.capacity += count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_grows_when_exhausted() {
        let mut pool: MutableStack<Vec<u8>> = MutableStack::new(2, Vec::new);
        assert_eq!(pool.capacity(), 2);

        let a = pool.pop();
        let b = pool.pop();
        assert!(pool.is_empty());

        let c = pool.pop();
        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.len(), 1);

        pool.push(a);
        pool.push(b);
        pool.push(c);
        assert_eq!(pool.len(), 4);
    }

    #[test]
    fn test_pushed_instances_are_reused() {
        let mut pool: MutableStack<Vec<u32>> = MutableStack::new(1, Vec::new);
        let mut v = pool.pop();
        v.reserve(64);
        pool.push(v);
        let again = pool.pop();
        assert!(again.capacity() >= 64);
        assert_eq!(pool.capacity(), 1);
    }
}
