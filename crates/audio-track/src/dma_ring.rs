//! Zero-copy PCM backend.
//!
//! `DmaRing` keeps no local copy of the audio. Writes go straight to the
//! hardware FIFO through [`AudioOutput::write_data`] and occupancy is derived
//! from the FIFO free space the hardware reports, so data already inside the
//! DMA engine is never buffered twice.
//!
//! The DMA engine moves at least [`DMA_MIN_TRANSFER_BYTES`] per transfer.
//! Smaller remainders are staged locally until enough accumulates or the
//! stream is flushed, at which point the stage is padded with silence.
//!
//! ```text
//! write(37 B) ──► FIFO gets 32 B, stage holds 5 B
//! write(20 B) ──► stage tops up to 16 B and goes out, FIFO gets 0 B more,
//!                 stage holds 9 B
//! flush()     ──► stage padded to 16 B and written
//! ```

use platform::AudioOutput;

use crate::sample::whole_frames;

/// Smallest transfer the DMA engine accepts, in bytes.
pub const DMA_MIN_TRANSFER_BYTES: usize = 16;

const SILENCE: [u8; 64] = [0; 64];

/// DMA-occupancy-derived ring.
pub struct DmaRing {
    stage: [u8; DMA_MIN_TRANSFER_BYTES],
    staged: usize,
    capacity: usize,
    frame_size: usize,
    channels: usize,
    short_writes: u32,
}

impl DmaRing {
    /// A ring capped at `capacity` bytes (at most the hardware FIFO size).
    pub fn new(capacity: usize, frame_size: usize, channels: u8) -> Self {
        Self {
            stage: [0; DMA_MIN_TRANSFER_BYTES],
            staged: 0,
            capacity: whole_frames(capacity, frame_size),
            frame_size,
            channels: usize::from(channels.max(1)),
            short_writes: 0,
        }
    }

    /// Buffered bytes: FIFO fill plus the staged remainder.
    #[allow(clippy::arithmetic_side_effects)] // Safety: channels ≥ 1; space ≤ size after min()
    pub fn occupied<O: AudioOutput>(&self, out: &O) -> usize {
        let size = out.buffer_size() / self.channels;
        let space = (out.buffer_space() / self.channels).min(size);
        (size - space).saturating_mul(self.frame_size) + self.staged
    }

    /// Bytes that may still be written.
    pub fn free<O: AudioOutput>(&self, out: &O) -> usize {
        self.capacity.saturating_sub(self.occupied(out))
    }

    /// Forward `data` to the FIFO, clamped to the free space.
    ///
    /// Returns the number of bytes taken from `data` (staged bytes count as
    /// taken).
    #[allow(clippy::indexing_slicing)] // Safety: staged < DMA_MIN_TRANSFER_BYTES; take ≤ data.len()
    #[allow(clippy::arithmetic_side_effects)] // Safety: all sums bounded by data.len() or the stage size
    pub fn push<O: AudioOutput>(&mut self, out: &mut O, data: &[u8]) -> usize {
        let accepted = data.len().min(self.free(out));
        let mut rest = &data[..accepted];

        if self.staged > 0 {
            let take = rest.len().min(DMA_MIN_TRANSFER_BYTES - self.staged);
            self.stage[self.staged..self.staged + take].copy_from_slice(&rest[..take]);
            self.staged += take;
            rest = &rest[take..];
            if self.staged < DMA_MIN_TRANSFER_BYTES {
                return accepted;
            }
            self.send_stage(out);
        }

        let direct = rest.len() - rest.len() % DMA_MIN_TRANSFER_BYTES;
        if direct > 0 {
            self.send(out, &rest[..direct]);
        }
        let tail = &rest[direct..];
        self.stage[..tail.len()].copy_from_slice(tail);
        self.staged = tail.len();
        accepted
    }

    /// Queue `len` bytes of silence, clamped to the free space.
    #[allow(clippy::arithmetic_side_effects)] // Safety: n ≤ remaining
    pub fn push_silence<O: AudioOutput>(&mut self, out: &mut O, len: usize) -> usize {
        let mut remaining = len.min(self.free(out));
        let total = remaining;
        while remaining > 0 {
            let n = remaining.min(SILENCE.len());
            self.push(out, SILENCE.get(..n).unwrap_or(&[]));
            remaining -= n;
        }
        total
    }

    /// Pad the staged remainder with silence and send it.
    pub fn flush<O: AudioOutput>(&mut self, out: &mut O) {
        if self.staged == 0 {
            return;
        }
        if let Some(pad) = self.stage.get_mut(self.staged..) {
            pad.fill(0);
        }
        self.staged = DMA_MIN_TRANSFER_BYTES;
        self.send_stage(out);
    }

    /// Drop the staged remainder.
    pub fn clear(&mut self) {
        self.staged = 0;
    }

    /// Configured capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes waiting in the stage.
    pub fn staged(&self) -> usize {
        self.staged
    }

    /// Hardware writes that accepted fewer bytes than offered.
    pub fn short_writes(&self) -> u32 {
        self.short_writes
    }

    fn send_stage<O: AudioOutput>(&mut self, out: &mut O) {
        let stage = self.stage;
        self.send(out, &stage);
        self.staged = 0;
    }

    fn send<O: AudioOutput>(&mut self, out: &mut O, data: &[u8]) {
        let n = out.write_data(data);
        if n < data.len() {
            self.short_writes = self.short_writes.wrapping_add(1);
            warn!("dma short write {} of {}", n, data.len());
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use platform::audio::OutputParams;
    use platform::mocks::MockOutput;
    use platform::{AudioFormat, SampleRateHz};

    fn open(fifo_samples: usize) -> (MockOutput, platform::mocks::OutputProbe) {
        let (mut out, probe) = MockOutput::new(fifo_samples);
        out.open(&OutputParams {
            sample_rate: SampleRateHz::HZ_48000,
            channels: 2,
            format: AudioFormat::Pcm16,
            channel_type: 0,
            channel_id: 0,
            reload_len: None,
            initial_pa_mdb: 0,
            automute_force: false,
        })
        .unwrap();
        (out, probe)
    }

    #[test]
    fn sub_granularity_tail_is_staged() {
        let (mut out, probe) = open(1024);
        let mut ring = DmaRing::new(4096, 4, 2);
        assert_eq!(ring.push(&mut out, &[1u8; 37]), 37);
        assert_eq!(probe.lock().writes, vec![32]);
        assert_eq!(ring.staged(), 5);
        assert_eq!(ring.occupied(&out), 37);
    }

    #[test]
    fn stage_tops_up_before_direct_writes() {
        let (mut out, probe) = open(1024);
        let mut ring = DmaRing::new(4096, 4, 2);
        ring.push(&mut out, &[1u8; 5]);
        ring.push(&mut out, &[2u8; 20]);
        assert_eq!(probe.lock().writes, vec![16]);
        assert_eq!(ring.staged(), 9);
        let delivered = probe.delivered();
        assert_eq!(&delivered[..5], &[1u8; 5]);
        assert_eq!(&delivered[5..16], &[2u8; 11]);
    }

    #[test]
    fn occupancy_is_derived_from_fifo_space() {
        let (mut out, probe) = open(1024);
        let mut ring = DmaRing::new(4096, 4, 2);
        ring.push(&mut out, &[0u8; 400]);
        assert_eq!(ring.occupied(&out), 400);
        probe.drain(100);
        assert_eq!(ring.occupied(&out), 200);
    }

    #[test]
    fn writes_clamp_to_capacity() {
        let (mut out, _probe) = open(1024);
        let mut ring = DmaRing::new(256, 4, 2);
        assert_eq!(ring.push(&mut out, &[0u8; 300]), 256);
        assert_eq!(ring.free(&out), 0);
        assert_eq!(ring.push(&mut out, &[0u8; 4]), 0);
    }

    #[test]
    fn flush_pads_stage_with_silence() {
        let (mut out, probe) = open(1024);
        let mut ring = DmaRing::new(4096, 4, 2);
        ring.push(&mut out, &[7u8; 4]);
        ring.flush(&mut out);
        assert_eq!(ring.staged(), 0);
        let delivered = probe.delivered();
        assert_eq!(delivered.len(), DMA_MIN_TRANSFER_BYTES);
        assert_eq!(&delivered[..4], &[7u8; 4]);
        assert!(delivered[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn short_hardware_writes_are_counted() {
        let (mut out, probe) = open(1024);
        probe.set_write_limit(Some(8));
        let mut ring = DmaRing::new(4096, 4, 2);
        ring.push(&mut out, &[0u8; 32]);
        assert_eq!(ring.short_writes(), 1);
    }
}
