//! Chunk buffer reuse for one writer instance.
//!
//! Part buffers can be tens to hundreds of megabytes, so each worker reuses
//! a buffer across chunks instead of allocating per part. The pool is bound
//! to its writer: writers constructed with different (jittered) part sizes
//! never trade buffers of the wrong capacity.

use std::sync::Mutex;

struct Slots {
    free: Vec<Vec<u8>>,
    allocs: u64,
    reuses: u64,
}

/// Fixed-size buffer pool. Peak memory is bounded by
/// `max_idle × buffer_size`, i.e. the writer's concurrency times its part
/// size.
pub struct BufferPool {
    buf_size: usize,
    max_idle: usize,
    slots: Mutex<Slots>,
}

impl BufferPool {
    /// Creates a pool of `max_idle` buffers of `buf_size` bytes each.
    pub fn new(buf_size: usize, max_idle: usize) -> Self {
        Self {
            buf_size,
            max_idle,
            slots: Mutex::new(Slots {
                free: Vec::new(),
                allocs: 0,
                reuses: 0,
            }),
        }
    }

    /// The size of every buffer handed out by this pool.
    pub fn buffer_size(&self) -> usize {
        self.buf_size
    }

    /// Pops an idle buffer or allocates a fresh one.
    pub fn acquire(&self) -> Vec<u8> {
        let mut slots = self.slots.lock().unwrap();
        if let Some(buf) = slots.free.pop() {
            slots.reuses += 1;
            buf
        } else {
            slots.allocs += 1;
            vec![0u8; self.buf_size]
        }
    }

    /// Returns a buffer to the pool. Wrong-sized or excess buffers are
    /// dropped.
    pub fn release(&self, buf: Vec<u8>) {
        if buf.len() != self.buf_size {
            return;
        }
        let mut slots = self.slots.lock().unwrap();
        if slots.free.len() < self.max_idle {
            slots.free.push(buf);
        }
    }

    /// `(allocations, reuses)` counters.
    pub fn stats(&self) -> (u64, u64) {
        let slots = self.slots.lock().unwrap();
        (slots.allocs, slots.reuses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_allocates_correct_size() {
        let pool = BufferPool::new(4096, 2);
        assert_eq!(pool.acquire().len(), 4096);
    }

    #[test]
    fn test_release_and_reuse() {
        let pool = BufferPool::new(64, 2);
        let buf = pool.acquire();
        pool.release(buf);
        let _buf = pool.acquire();
        assert_eq!(pool.stats(), (1, 1));
    }

    #[test]
    fn test_excess_buffers_dropped() {
        let pool = BufferPool::new(8, 1);
        let a = pool.acquire();
        let b = pool.acquire();
        pool.release(a);
        pool.release(b);
        // Only one idle slot: the next two acquires are one reuse, one alloc.
        pool.acquire();
        pool.acquire();
        assert_eq!(pool.stats(), (3, 1));
    }

    #[test]
    fn test_wrong_size_buffer_rejected() {
        let pool = BufferPool::new(16, 2);
        pool.release(vec![0u8; 8]);
        pool.acquire();
        assert_eq!(pool.stats(), (1, 0));
    }
}
