//! Growable ring buffer backing process inboxes
//!
//! Pushes never block and never drop: when the write position would collide
//! with the read position the buffer doubles, copying live elements in
//! head-to-tail order into the front of a fresh allocation. Length is kept in
//! an atomic so readers can poll emptiness without taking the lock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

struct Inner<T> {
    items: Vec<Option<T>>,
    head: usize,
    tail: usize,
    len: usize,
}

/// Thread-safe growable ring buffer
pub struct RingBuffer<T> {
    inner: Mutex<Inner<T>>,
    len: AtomicUsize,
}

impl<T> RingBuffer<T> {
    /// Create a ring buffer with the given starting capacity
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut items = Vec::with_capacity(capacity);
        items.resize_with(capacity, || None);
        Self {
            inner: Mutex::new(Inner {
                items,
                head: 0,
                tail: 0,
                len: 0,
            }),
            len: AtomicUsize::new(0),
        }
    }

    /// Append an element, growing the buffer when full
    pub fn push(&self, item: T) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let cap = inner.items.len();
        if inner.len == cap {
            // Full: double and compact live elements to offsets [0..len).
            let mut items: Vec<Option<T>> = Vec::with_capacity(cap * 2);
            items.resize_with(cap * 2, || None);
            for (i, slot) in items.iter_mut().enumerate().take(inner.len) {
                let idx = (inner.head + i) % cap;
                *slot = inner.items[idx].take();
            }
            inner.items = items;
            inner.head = 0;
            inner.tail = inner.len;
        }
        let tail = inner.tail;
        inner.items[tail] = Some(item);
        inner.tail = (tail + 1) % inner.items.len();
        inner.len += 1;
        self.len.fetch_add(1, Ordering::Release);
    }

    /// Pop up to `max` elements in insertion order
    pub fn pop_n(&self, max: usize) -> Vec<T> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let n = max.min(inner.len);
        let mut out = Vec::with_capacity(n);
        let cap = inner.items.len();
        for i in 0..n {
            let idx = (inner.head + i) % cap;
            if let Some(item) = inner.items[idx].take() {
                out.push(item);
            }
        }
        inner.head = (inner.head + n) % cap;
        inner.len -= n;
        self.len.fetch_sub(n, Ordering::Release);
        debug_assert_eq!(out.len(), n);
        out
    }

    /// Number of buffered elements
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Whether the buffer holds no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_fifo() {
        let rb = RingBuffer::new(4);
        for i in 0..3 {
            rb.push(i);
        }
        assert_eq!(rb.len(), 3);
        assert_eq!(rb.pop_n(10), vec![0, 1, 2]);
        assert!(rb.is_empty());
    }

    #[test]
    fn test_growth_preserves_order() {
        let rb = RingBuffer::new(2);
        // Interleave pushes and pops so head is offset before growth.
        rb.push(0);
        rb.push(1);
        assert_eq!(rb.pop_n(1), vec![0]);
        for i in 2..20 {
            rb.push(i);
        }
        assert_eq!(rb.len(), 19);
        assert_eq!(rb.pop_n(100), (1..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_pop_n_bounded() {
        let rb = RingBuffer::new(8);
        for i in 0..6 {
            rb.push(i);
        }
        assert_eq!(rb.pop_n(4), vec![0, 1, 2, 3]);
        assert_eq!(rb.pop_n(4), vec![4, 5]);
        assert_eq!(rb.pop_n(4), Vec::<i32>::new());
    }

    #[test]
    fn test_concurrent_push() {
        let rb = std::sync::Arc::new(RingBuffer::new(4));
        let mut handles = Vec::new();
        for t in 0..4 {
            let rb = rb.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    rb.push(t * 1000 + i);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let mut all = rb.pop_n(1000);
        assert_eq!(all.len(), 400);
        // Per-thread order is preserved even though threads interleave.
        all.retain(|v| *v < 1000);
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }
}
