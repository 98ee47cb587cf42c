use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::buffer::PooledBuffer;
use crate::Blank;

/// How many returned buffers a pool holds on to. Anything given back past
/// this limit is simply freed.
const MAX_FREE: usize = 8;

/// A pool of reusable arrays of `T`.
///
/// Cloning a [BufferPool] is cheap and yields a handle to the *same* pool, so
/// a host can thread one pool through every run configuration it builds.
pub struct BufferPool<T> {
    inner: Arc<Inner<T>>,
}

pub(crate) struct Inner<T> {
    /// Smallest capacity ever allocated. Renting less than this still hands
    /// out a buffer of this capacity, which is what lets differently-sized
    /// runs share one pool.
    floor: usize,
    free: Mutex<Vec<Box<[T]>>>,
    rented: AtomicUsize,
}

impl<T: Blank> BufferPool<T> {
    /// A pool whose buffers are sized exactly to each request.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// A pool whose buffers are allocated with at least `floor` elements.
    pub fn with_capacity(floor: usize) -> Self {
        BufferPool {
            inner: Arc::new(Inner {
                floor,
                free: Mutex::new(Vec::new()),
                rented: AtomicUsize::new(0),
            }),
        }
    }

    /// Rent a buffer of exactly `len` readable elements, blanked out.
    ///
    /// Reuses a returned array when one is large enough; otherwise allocates.
    pub fn rent(&self, len: usize) -> PooledBuffer<T> {
        let storage = self.inner.take_storage(len);
        self.inner.rented.fetch_add(1, Ordering::Relaxed);

        PooledBuffer::new(storage, len, Arc::clone(&self.inner))
    }

    /// Number of buffers currently out with owners.
    pub fn rented(&self) -> usize {
        self.inner.rented.load(Ordering::Relaxed)
    }

    /// Number of returned buffers waiting for reuse.
    pub fn pooled(&self) -> usize {
        self.inner.free.lock().expect("pool lock poisoned").len()
    }
}

impl<T: Blank> Default for BufferPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for BufferPool<T> {
    fn clone(&self) -> Self {
        BufferPool {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Blank> Inner<T> {
    fn take_storage(&self, len: usize) -> Box<[T]> {
        let mut free = self.free.lock().expect("pool lock poisoned");

        if let Some(at) = free.iter().position(|b| b.len() >= len) {
            let mut storage = free.swap_remove(at);
            storage.fill(T::BLANK);
            return storage;
        }

        vec![T::BLANK; len.max(self.floor)].into_boxed_slice()
    }

    pub(crate) fn give_back(&self, storage: Box<[T]>) {
        self.rented.fetch_sub(1, Ordering::Relaxed);

        let mut free = self.free.lock().expect("pool lock poisoned");
        if free.len() < MAX_FREE {
            free.push(storage);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rented_buffers_are_blank() {
        let pool: BufferPool<u8> = BufferPool::new();

        let mut first = pool.rent(4);
        first[0] = 0xAA;
        first[3] = 0xBB;
        first.release();

        let again = pool.rent(4);
        assert_eq!(&again[..], &[0, 0, 0, 0]);
    }

    #[test]
    fn released_buffers_are_reused() {
        let pool: BufferPool<u16> = BufferPool::new();
        assert_eq!(pool.pooled(), 0);

        pool.rent(16).release();
        assert_eq!(pool.pooled(), 1);
        assert_eq!(pool.rented(), 0);

        let held = pool.rent(8);
        assert_eq!(pool.pooled(), 0, "smaller rent should reuse the array");
        assert_eq!(held.capacity(), 16);
        assert_eq!(held.len(), 8);
        assert_eq!(pool.rented(), 1);
    }

    #[test]
    fn dropping_a_buffer_returns_it() {
        let pool: BufferPool<u8> = BufferPool::new();
        {
            let _buf = pool.rent(4);
            assert_eq!(pool.rented(), 1);
        }
        assert_eq!(pool.rented(), 0);
        assert_eq!(pool.pooled(), 1);
    }

    #[test]
    fn capacity_floor_applies() {
        let pool: BufferPool<u8> = BufferPool::with_capacity(64);
        let buf = pool.rent(4);
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.capacity(), 64);
    }

    #[test]
    fn undersized_buffers_are_not_reused() {
        let pool: BufferPool<u8> = BufferPool::new();
        pool.rent(4).release();

        let big = pool.rent(32);
        assert_eq!(big.len(), 32);
        // The 4-element array stays pooled for the next small rent.
        assert_eq!(pool.pooled(), 1);
    }

    #[test]
    fn shared_handles_see_one_pool() {
        let pool: BufferPool<char> = BufferPool::new();
        let other = pool.clone();

        let buf = pool.rent(8);
        assert_eq!(other.rented(), 1);
        buf.release();
        assert_eq!(other.pooled(), 1);
    }
}
