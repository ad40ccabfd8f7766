//! Fixed-capacity byte ring with delimiter framing.
//!
//! One interrupt handler writes, one task at a time reads. Each side owns
//! one index and only ever advances it, so no lock is needed between the
//! two contexts. Indices run modulo `2 * N`, which keeps "full"
//! (`len == N`) distinct from "empty" (`len == 0`) without reserving a
//! slot.

use core::fmt;
use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Circular byte buffer written from interrupt context.
pub struct FramedByteBuffer<const N: usize> {
    storage: [AtomicU8; N],
    read: AtomicUsize,
    write: AtomicUsize,
}

impl<const N: usize> FramedByteBuffer<N> {
    const VALID_CAPACITY: () = assert!(N > 0 && N <= usize::MAX / 4, "capacity out of range");

    /// Create an empty buffer
    pub const fn new() -> Self {
        let () = Self::VALID_CAPACITY;
        #[allow(clippy::declare_interior_mutable_const)]
        const ZERO: AtomicU8 = AtomicU8::new(0);
        Self {
            storage: [ZERO; N],
            read: AtomicUsize::new(0),
            write: AtomicUsize::new(0),
        }
    }

    /// Total number of bytes the buffer can hold
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Bytes currently buffered
    pub fn len(&self) -> usize {
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Acquire);
        Self::distance(read, write)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == N
    }

    /// Position of the next byte to be read, in `0..N`
    pub fn read_index(&self) -> usize {
        self.read.load(Ordering::Acquire) % N
    }

    /// Position the next byte will be written to, in `0..N`
    pub fn write_index(&self) -> usize {
        self.write.load(Ordering::Acquire) % N
    }

    /// Append one byte. Producer side only.
    ///
    /// Returns `false` without writing anything when the buffer is full.
    pub fn push_byte(&self, byte: u8) -> bool {
        let write = self.write.load(Ordering::Relaxed);
        let read = self.read.load(Ordering::Acquire);
        if Self::distance(read, write) == N {
            return false;
        }

        self.storage[write % N].store(byte, Ordering::Relaxed);
        self.write.store(Self::advance(write, 1), Ordering::Release);
        true
    }

    /// Length of the first frame ending in `delimiter`, delimiter included.
    ///
    /// Scans the buffered bytes oldest first and leaves both indices alone.
    pub fn find_delimiter(&self, delimiter: u8) -> Option<usize> {
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Acquire);

        (0..Self::distance(read, write))
            .find(|&offset| self.byte_at(read, offset) == delimiter)
            .map(|offset| offset + 1)
    }

    /// Move up to `dst.len()` of the oldest bytes into `dst`. Consumer side
    /// only.
    ///
    /// Returns the number of bytes copied; anything that did not fit stays
    /// buffered.
    pub fn drain(&self, dst: &mut [u8]) -> usize {
        let read = self.read.load(Ordering::Relaxed);
        let write = self.write.load(Ordering::Acquire);
        let count = Self::distance(read, write).min(dst.len());

        for (offset, slot) in dst[..count].iter_mut().enumerate() {
            *slot = self.byte_at(read, offset);
        }
        self.read.store(Self::advance(read, count), Ordering::Release);
        count
    }

    /// Discard everything buffered. Consumer side only.
    pub fn clear(&self) {
        let write = self.write.load(Ordering::Acquire);
        self.read.store(write, Ordering::Release);
    }

    fn byte_at(&self, read: usize, offset: usize) -> u8 {
        self.storage[(read + offset) % N].load(Ordering::Relaxed)
    }

    fn distance(read: usize, write: usize) -> usize {
        (write + 2 * N - read) % (2 * N)
    }

    fn advance(index: usize, by: usize) -> usize {
        (index + by) % (2 * N)
    }
}

impl<const N: usize> Default for FramedByteBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for FramedByteBuffer<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramedByteBuffer")
            .field("capacity", &N)
            .field("len", &self.len())
            .field("read_index", &self.read_index())
            .field("write_index", &self.write_index())
            .finish()
    }
}
