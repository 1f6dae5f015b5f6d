//! Fixed-capacity ring buffer
//!
//! Shared storage for the onset history and the inter-onset interval log.
//! Allocates once at construction and overwrites the oldest element when
//! full; all index wraparound lives here so the callers never touch modulo
//! arithmetic.

/// Overwrite-oldest ring buffer with a fixed capacity
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buf: Vec<T>,
    start: usize,
    len: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a ring holding at most `capacity` elements
    ///
    /// This is the only allocation the buffer ever performs. A zero
    /// capacity is bumped to one so `push` stays total.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: vec![T::default(); capacity],
            start: 0,
            len: 0,
        }
    }

    /// Append an element, overwriting the oldest when full
    pub fn push(&mut self, value: T) {
        let capacity = self.buf.len();
        if self.len < capacity {
            self.buf[(self.start + self.len) % capacity] = value;
            self.len += 1;
        } else {
            self.buf[self.start] = value;
            self.start = (self.start + 1) % capacity;
        }
    }

    /// Number of elements currently stored
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when the next push will overwrite the oldest element
    pub fn is_full(&self) -> bool {
        self.len == self.buf.len()
    }

    /// Maximum number of elements the ring can hold
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Element at chronological position `index` (0 = oldest)
    pub fn get(&self, index: usize) -> Option<T> {
        if index < self.len {
            Some(self.buf[(self.start + index) % self.buf.len()])
        } else {
            None
        }
    }

    /// Element counting back from the newest (0 = newest)
    pub fn recent(&self, index: usize) -> Option<T> {
        if index < self.len {
            self.get(self.len - 1 - index)
        } else {
            None
        }
    }

    /// The most recently pushed element
    pub fn latest(&self) -> Option<T> {
        self.recent(0)
    }

    /// Iterate in chronological order, oldest first
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len).map(move |i| self.buf[(self.start + i) % self.buf.len()])
    }

    /// Drop all elements without releasing storage
    pub fn clear(&mut self) {
        self.start = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_len() {
        let mut ring: RingBuffer<f32> = RingBuffer::with_capacity(4);
        assert!(ring.is_empty());
        assert_eq!(ring.capacity(), 4);

        ring.push(1.0);
        ring.push(2.0);
        assert_eq!(ring.len(), 2);
        assert!(!ring.is_full());

        ring.push(3.0);
        ring.push(4.0);
        assert!(ring.is_full());
        assert_eq!(ring.len(), 4);
    }

    #[test]
    fn test_overwrite_oldest_when_full() {
        let mut ring: RingBuffer<u16> = RingBuffer::with_capacity(3);
        for v in [1u16, 2, 3, 4, 5] {
            ring.push(v);
        }

        assert_eq!(ring.len(), 3);
        assert_eq!(ring.get(0), Some(3));
        assert_eq!(ring.get(1), Some(4));
        assert_eq!(ring.get(2), Some(5));
        assert_eq!(ring.get(3), None);
    }

    #[test]
    fn test_recent_and_latest() {
        let mut ring: RingBuffer<f32> = RingBuffer::with_capacity(4);
        assert_eq!(ring.latest(), None);

        ring.push(1.0);
        ring.push(2.0);
        ring.push(3.0);

        assert_eq!(ring.latest(), Some(3.0));
        assert_eq!(ring.recent(0), Some(3.0));
        assert_eq!(ring.recent(1), Some(2.0));
        assert_eq!(ring.recent(2), Some(1.0));
        assert_eq!(ring.recent(3), None);
    }

    #[test]
    fn test_iter_chronological_after_wrap() {
        let mut ring: RingBuffer<u16> = RingBuffer::with_capacity(3);
        for v in [10u16, 20, 30, 40] {
            ring.push(v);
        }

        let values: Vec<u16> = ring.iter().collect();
        assert_eq!(values, vec![20, 30, 40]);
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut ring: RingBuffer<f32> = RingBuffer::with_capacity(2);
        ring.push(1.0);
        ring.push(2.0);
        ring.clear();

        assert!(ring.is_empty());
        assert_eq!(ring.capacity(), 2);
        assert_eq!(ring.latest(), None);

        ring.push(5.0);
        assert_eq!(ring.latest(), Some(5.0));
    }

    #[test]
    fn test_zero_capacity_is_bumped() {
        let mut ring: RingBuffer<f32> = RingBuffer::with_capacity(0);
        assert_eq!(ring.capacity(), 1);
        ring.push(1.0);
        ring.push(2.0);
        assert_eq!(ring.latest(), Some(2.0));
        assert_eq!(ring.len(), 1);
    }
}
