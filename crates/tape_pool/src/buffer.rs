use std::borrow::{Borrow, BorrowMut};
use std::ops::{Index, IndexMut};
use std::slice::SliceIndex;
use std::sync::Arc;

use crate::pool::Inner;
use crate::Blank;

/// An owned, fixed-capacity array on loan from a [BufferPool].
///
/// The first [len][PooledBuffer::len] elements are the buffer's readable
/// contents; the capacity underneath may be larger when the pool recycled a
/// bigger array. Giving the array back consumes the handle, so the type
/// system rules out use-after-return.
///
/// [BufferPool]: crate::BufferPool
pub struct PooledBuffer<T: Blank> {
    /// `None` only while the handle is being dismantled by `drop`.
    storage: Option<Box<[T]>>,
    len: usize,
    pool: Arc<Inner<T>>,
}

impl<T: Blank> PooledBuffer<T> {
    pub(crate) fn new(storage: Box<[T]>, len: usize, pool: Arc<Inner<T>>) -> Self {
        PooledBuffer {
            storage: Some(storage),
            len,
            pool,
        }
    }

    /// Number of readable elements.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the underlying array, which is at least [len][Self::len].
    pub fn capacity(&self) -> usize {
        self.slice_full().len()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.slice_full()[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let len = self.len;
        &mut self.slice_full_mut()[..len]
    }

    /// Copies the readable contents out into a plain vector.
    pub fn to_vec(&self) -> Vec<T> {
        self.as_slice().to_vec()
    }

    /// Returns the array to its pool. Dropping the handle does the same; this
    /// spelling exists so the hand-back can be a visible event in the code.
    pub fn release(self) {
        // Drop does the actual work.
    }

    fn slice_full(&self) -> &[T] {
        self.storage.as_ref().expect("buffer storage taken by drop")
    }

    fn slice_full_mut(&mut self) -> &mut [T] {
        self.storage.as_mut().expect("buffer storage taken by drop")
    }
}

impl<T: Blank> Drop for PooledBuffer<T> {
    fn drop(&mut self) {
        if let Some(storage) = self.storage.take() {
            self.pool.give_back(storage);
        }
    }
}

impl<T: Blank, I> Index<I> for PooledBuffer<T>
where
    I: SliceIndex<[T]>,
{
    type Output = I::Output;

    fn index(&self, index: I) -> &Self::Output {
        &self.as_slice()[index]
    }
}

impl<T: Blank, I> IndexMut<I> for PooledBuffer<T>
where
    I: SliceIndex<[T]>,
{
    fn index_mut(&mut self, index: I) -> &mut Self::Output {
        &mut self.as_mut_slice()[index]
    }
}

impl<T: Blank> Borrow<[T]> for PooledBuffer<T> {
    fn borrow(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T: Blank> BorrowMut<[T]> for PooledBuffer<T> {
    fn borrow_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}
