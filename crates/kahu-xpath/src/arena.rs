//! Reusable buffers for transient evaluation data.
//!
//! The evaluator acquires scratch vectors while walking steps and
//! predicates, returns them when a frame completes, and resets the whole
//! arena at the start of each top-level evaluation.

pub struct Pool<T> {
    free: Vec<Vec<T>>,
    outstanding: usize,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self { free: Vec::new(), outstanding: 0 }
    }
}

impl<T> Pool<T> {
    pub fn acquire(&mut self, capacity: usize) -> Vec<T> {
        self.outstanding += 1;
        match self.free.pop() {
            Some(mut buffer) => {
                buffer.clear();
                if buffer.capacity() < capacity {
                    buffer.reserve(capacity - buffer.capacity());
                }
                buffer
            }
            None => Vec::with_capacity(capacity),
        }
    }

    pub fn release(&mut self, buffer: Vec<T>) {
        self.outstanding = self.outstanding.saturating_sub(1);
        self.free.push(buffer);
    }

    /// Buffers handed out and not yet returned.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn reset(&mut self) {
        self.outstanding = 0;
    }
}

#[derive(Default)]
pub struct Arena {
    pub matches: Pool<crate::axis::AxisMatch>,
}

impl Arena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.matches.reset();
    }

    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.matches.outstanding()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_are_recycled() {
        let mut pool: Pool<u32> = Pool::default();
        let mut first = pool.acquire(8);
        first.push(1);
        let capacity = first.capacity();
        pool.release(first);
        assert_eq!(pool.outstanding(), 0);
        let second = pool.acquire(4);
        assert!(second.is_empty());
        assert!(second.capacity() >= capacity.min(4));
        assert_eq!(pool.outstanding(), 1);
    }
}
