//! Reusable, fixed-capacity buffers with an explicit rent/return protocol.
//!
//! An interpreter run needs a couple of scratch arrays (the memory tape, the
//! captured output) that are allocated, filled, and thrown away many times a
//! second when a host re-evaluates on every keystroke. Rather than hammering
//! the allocator, a [BufferPool] keeps returned arrays around and hands them
//! back out.
//!
//! The discipline is enforced by ownership: renting gives you a
//! [PooledBuffer], an owning handle. Returning the buffer *consumes* the
//! handle (explicitly via [PooledBuffer::release], or implicitly on drop),
//! so there is no way to touch storage you have given back, and no two
//! owners can hold the same array at once.

mod buffer;
mod pool;

pub use crate::buffer::PooledBuffer;
pub use crate::pool::BufferPool;

/// Element types the pool knows how to blank out between owners.
///
/// Every freshly rented buffer is filled with [Blank::BLANK] so a renter can
/// never observe a previous owner's data.
pub trait Blank: Copy {
    const BLANK: Self;
}

impl Blank for u8 {
    const BLANK: Self = 0;
}

impl Blank for u16 {
    const BLANK: Self = 0;
}

impl Blank for char {
    const BLANK: Self = '\0';
}
