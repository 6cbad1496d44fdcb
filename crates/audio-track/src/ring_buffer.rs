//! Byte ring buffer over static PCM storage.
//!
//! `RingBuffer` is the generic software backend: a circular byte buffer over
//! a `&'static mut [u8]` region drawn from the [`PcmPool`] or handed in by the
//! caller. It is a single-producer / single-consumer (SPSC) structure shared
//! between the producer thread (writer) and the DMA refill interrupt (reader).
//!
//! # Constraints
//!
//! - No heap: the backing store is a static partition sized at build time.
//! - Writes are partial, never all-or-nothing: a write larger than the free
//!   space accepts what fits and reports the count. Nothing already buffered
//!   is ever overwritten.
//! - This implementation is **not** interrupt-safe on its own. The audio
//!   track keeps it inside a critical-section mutex.
//!
//! [`PcmPool`]: platform::PcmPool

/// A fixed-capacity ring buffer for interleaved PCM bytes.
pub struct RingBuffer {
    buf: &'static mut [u8],
    /// Index of the next byte to read.
    read: usize,
    /// Index of the next byte to write.
    write: usize,
    /// Number of valid bytes currently held.
    count: usize,
}

impl RingBuffer {
    /// Wrap `storage` as an empty ring.
    pub fn new(storage: &'static mut [u8]) -> Self {
        Self {
            buf: storage,
            read: 0,
            write: 0,
            count: 0,
        }
    }

    /// Write as much of `data` as fits. Returns the number of bytes accepted.
    #[allow(clippy::indexing_slicing)] // Safety: write < cap; each segment is bounded by cap - write and by the free space
    #[allow(clippy::arithmetic_side_effects)] // Safety: n ≤ free = cap - count; wrap via % cap with cap > 0
    pub fn write_slice(&mut self, data: &[u8]) -> usize {
        let cap = self.buf.len();
        let n = data.len().min(cap - self.count);
        if n == 0 {
            return 0;
        }
        let first = n.min(cap - self.write);
        self.buf[self.write..self.write + first].copy_from_slice(&data[..first]);
        self.buf[..n - first].copy_from_slice(&data[first..n]);
        self.write = (self.write + n) % cap;
        self.count += n;
        n
    }

    /// Read up to `out.len()` bytes into `out`.
    ///
    /// Returns the number of bytes actually read (may be less than
    /// `out.len()` if the buffer holds fewer bytes than requested).
    #[allow(clippy::indexing_slicing)] // Safety: read < cap; segments bounded by cap - read and by count
    #[allow(clippy::arithmetic_side_effects)] // Safety: n ≤ count; wrap via % cap with cap > 0
    pub fn read_slice(&mut self, out: &mut [u8]) -> usize {
        let cap = self.buf.len();
        let n = out.len().min(self.count);
        if n == 0 {
            return 0;
        }
        let first = n.min(cap - self.read);
        out[..first].copy_from_slice(&self.buf[self.read..self.read + first]);
        out[first..n].copy_from_slice(&self.buf[..n - first]);
        self.read = (self.read + n) % cap;
        self.count -= n;
        n
    }

    /// Drop up to `len` of the oldest bytes. Returns how many were dropped.
    #[allow(clippy::arithmetic_side_effects)] // Safety: n ≤ count; wrap via % cap with cap > 0
    pub fn discard(&mut self, len: usize) -> usize {
        let n = len.min(self.count);
        if n > 0 {
            self.read = (self.read + n) % self.buf.len();
            self.count -= n;
        }
        n
    }

    /// Forget everything buffered.
    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
        self.count = 0;
    }

    /// Number of bytes currently available to read.
    pub fn available(&self) -> usize {
        self.count
    }

    /// Bytes that can be written before the ring is full.
    pub fn free_space(&self) -> usize {
        self.buf.len().saturating_sub(self.count)
    }

    /// Maximum number of bytes the buffer can hold.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// `true` when no bytes are present.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// `true` when the buffer is completely full.
    pub fn is_full(&self) -> bool {
        self.count == self.buf.len()
    }

    /// Give the backing storage back.
    pub fn into_storage(self) -> &'static mut [u8] {
        self.buf
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    fn ring(len: usize) -> RingBuffer {
        RingBuffer::new(Box::leak(vec![0u8; len].into_boxed_slice()))
    }

    #[test]
    fn test_ring_buffer_write_then_read() {
        let mut rb = ring(64);
        let data: [u8; 16] = core::array::from_fn(|i| i as u8);
        assert_eq!(rb.write_slice(&data), 16);
        let mut out = [0u8; 16];
        let n = rb.read_slice(&mut out);
        assert_eq!(n, 16);
        assert_eq!(out, data);
    }

    #[test]
    fn test_ring_buffer_available_after_write() {
        let mut rb = ring(64);
        rb.write_slice(&[1u8; 20]);
        assert_eq!(rb.available(), 20);
        assert_eq!(rb.free_space(), 44);
    }

    #[test]
    fn test_ring_buffer_full_accepts_nothing_more() {
        let mut rb = ring(8);
        assert_eq!(rb.write_slice(&[0u8; 8]), 8);
        assert!(rb.is_full());
        // One more is rejected, not overwritten
        assert_eq!(rb.write_slice(&[42u8]), 0);
    }

    #[test]
    fn test_ring_buffer_partial_write() {
        let mut rb = ring(8);
        assert_eq!(rb.write_slice(&[7u8; 12]), 8);
        assert_eq!(rb.available(), 8);
    }

    #[test]
    fn test_ring_buffer_wraps_around() {
        let mut rb = ring(8);
        rb.write_slice(&[1u8; 8]);
        let mut half = [0u8; 4];
        assert_eq!(rb.read_slice(&mut half), 4);
        assert_eq!(half, [1u8; 4]);
        // Write 4 more (wrapping)
        assert_eq!(rb.write_slice(&[2u8; 4]), 4);
        let mut rest = [0u8; 8];
        assert_eq!(rb.read_slice(&mut rest), 8);
        assert_eq!(&rest[..4], &[1u8; 4]);
        assert_eq!(&rest[4..], &[2u8; 4]);
    }

    #[test]
    fn test_discard_skips_oldest() {
        let mut rb = ring(8);
        rb.write_slice(&[1, 2, 3, 4, 5]);
        assert_eq!(rb.discard(2), 2);
        let mut out = [0u8; 3];
        rb.read_slice(&mut out);
        assert_eq!(out, [3, 4, 5]);
        assert_eq!(rb.discard(10), 0);
    }

    #[test]
    fn test_clear_empties() {
        let mut rb = ring(8);
        rb.write_slice(&[9u8; 6]);
        rb.clear();
        assert!(rb.is_empty());
        assert_eq!(rb.free_space(), 8);
    }
}
