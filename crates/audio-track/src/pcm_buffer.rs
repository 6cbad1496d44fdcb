//! PCM buffer abstraction and runtime backend selection.
//!
//! Two backends implement [`PcmBuffer`]:
//!
//! | Backend        | Storage                 | Occupancy                   | `read` |
//! |----------------|-------------------------|-----------------------------|--------|
//! | [`RingBuffer`] | static byte region      | tracked locally             | copies |
//! | [`DmaRing`]    | hardware FIFO + stage   | derived from FIFO free space| none   |
//!
//! The backend is chosen per track at creation ([`BackendKind`]), not at
//! build time. Methods that need the hardware view take the output as an
//! argument so neither backend owns it.

use platform::AudioOutput;

use crate::dma_ring::DmaRing;
use crate::ring_buffer::RingBuffer;

/// Which backend a track buffers through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BackendKind {
    /// Software ring over static memory; the refill interrupt copies frames out.
    #[default]
    Ring,
    /// Writes go straight to the DMA FIFO; occupancy comes from the hardware.
    ZeroCopy,
}

/// Common contract of both backends.
pub trait PcmBuffer {
    /// Accept as much of `data` as fits; returns the number of bytes taken.
    fn write<O: AudioOutput>(&mut self, out: &mut O, data: &[u8]) -> usize;

    /// Refill path only: copy out up to `dst.len()` buffered bytes.
    fn read(&mut self, dst: &mut [u8]) -> usize;

    /// Drop up to `len` of the oldest buffered bytes.
    fn discard(&mut self, len: usize) -> usize;

    /// Bytes buffered and not yet played.
    fn occupied_len<O: AudioOutput>(&self, out: &O) -> usize;

    /// Bytes that can still be written.
    fn free_space<O: AudioOutput>(&self, out: &O) -> usize {
        self.capacity().saturating_sub(self.occupied_len(out))
    }

    /// Total capacity in bytes.
    fn capacity(&self) -> usize;

    /// Push any staged remainder to the hardware as silence-padded data.
    fn flush<O: AudioOutput>(&mut self, out: &mut O);

    /// Forget locally buffered data.
    fn clear(&mut self);
}

impl PcmBuffer for RingBuffer {
    fn write<O: AudioOutput>(&mut self, _out: &mut O, data: &[u8]) -> usize {
        self.write_slice(data)
    }

    fn read(&mut self, dst: &mut [u8]) -> usize {
        self.read_slice(dst)
    }

    fn discard(&mut self, len: usize) -> usize {
        RingBuffer::discard(self, len)
    }

    fn occupied_len<O: AudioOutput>(&self, _out: &O) -> usize {
        self.available()
    }

    fn capacity(&self) -> usize {
        RingBuffer::capacity(self)
    }

    fn flush<O: AudioOutput>(&mut self, _out: &mut O) {}

    fn clear(&mut self) {
        RingBuffer::clear(self);
    }
}

impl PcmBuffer for DmaRing {
    fn write<O: AudioOutput>(&mut self, out: &mut O, data: &[u8]) -> usize {
        self.push(out, data)
    }

    fn read(&mut self, _dst: &mut [u8]) -> usize {
        0
    }

    fn discard(&mut self, _len: usize) -> usize {
        0
    }

    fn occupied_len<O: AudioOutput>(&self, out: &O) -> usize {
        self.occupied(out)
    }

    fn capacity(&self) -> usize {
        DmaRing::capacity(self)
    }

    fn flush<O: AudioOutput>(&mut self, out: &mut O) {
        DmaRing::flush(self, out);
    }

    fn clear(&mut self) {
        DmaRing::clear(self);
    }
}

/// The backend a track was created with.
pub enum PcmBackend {
    /// Software ring.
    Ring(RingBuffer),
    /// Zero-copy DMA ring.
    Dma(DmaRing),
}

impl PcmBackend {
    /// Which variant this is.
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Ring(_) => BackendKind::Ring,
            Self::Dma(_) => BackendKind::ZeroCopy,
        }
    }

    /// The static region behind a software ring.
    pub fn into_storage(self) -> Option<&'static mut [u8]> {
        match self {
            Self::Ring(ring) => Some(ring.into_storage()),
            Self::Dma(_) => None,
        }
    }
}

impl PcmBuffer for PcmBackend {
    fn write<O: AudioOutput>(&mut self, out: &mut O, data: &[u8]) -> usize {
        match self {
            Self::Ring(b) => PcmBuffer::write(b, out, data),
            Self::Dma(b) => PcmBuffer::write(b, out, data),
        }
    }

    fn read(&mut self, dst: &mut [u8]) -> usize {
        match self {
            Self::Ring(b) => PcmBuffer::read(b, dst),
            Self::Dma(b) => PcmBuffer::read(b, dst),
        }
    }

    fn discard(&mut self, len: usize) -> usize {
        match self {
            Self::Ring(b) => PcmBuffer::discard(b, len),
            Self::Dma(b) => PcmBuffer::discard(b, len),
        }
    }

    fn occupied_len<O: AudioOutput>(&self, out: &O) -> usize {
        match self {
            Self::Ring(b) => b.occupied_len(out),
            Self::Dma(b) => b.occupied_len(out),
        }
    }

    fn capacity(&self) -> usize {
        match self {
            Self::Ring(b) => PcmBuffer::capacity(b),
            Self::Dma(b) => PcmBuffer::capacity(b),
        }
    }

    fn flush<O: AudioOutput>(&mut self, out: &mut O) {
        match self {
            Self::Ring(b) => PcmBuffer::flush(b, out),
            Self::Dma(b) => PcmBuffer::flush(b, out),
        }
    }

    fn clear(&mut self) {
        match self {
            Self::Ring(b) => PcmBuffer::clear(b),
            Self::Dma(b) => PcmBuffer::clear(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform::mocks::MockOutput;

    fn storage(len: usize) -> &'static mut [u8] {
        Box::leak(vec![0u8; len].into_boxed_slice())
    }

    #[test]
    fn ring_backend_ignores_the_output() {
        let (mut out, probe) = MockOutput::new(64);
        let mut pcm = PcmBackend::Ring(RingBuffer::new(storage(32)));
        assert_eq!(pcm.write(&mut out, &[1u8; 40]), 32);
        assert_eq!(pcm.occupied_len(&out), 32);
        assert_eq!(pcm.free_space(&out), 0);
        assert!(probe.delivered().is_empty());
        assert_eq!(pcm.kind(), BackendKind::Ring);
    }

    #[test]
    fn zero_copy_backend_never_reads_back() {
        let (mut out, probe) = MockOutput::new(64);
        let mut pcm = PcmBackend::Dma(DmaRing::new(128, 4, 2));
        assert_eq!(pcm.write(&mut out, &[3u8; 32]), 32);
        let mut dst = [0u8; 32];
        assert_eq!(pcm.read(&mut dst), 0);
        assert_eq!(probe.delivered().len(), 32);
        assert!(pcm.into_storage().is_none());
    }

    #[test]
    fn into_storage_returns_the_region() {
        let pcm = PcmBackend::Ring(RingBuffer::new(storage(16)));
        assert_eq!(pcm.into_storage().map(|s| s.len()), Some(16));
    }
}
