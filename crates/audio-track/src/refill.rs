//! Interrupt-side half of an audio track.
//!
//! The board places one [`TrackCell`] per output channel in static storage and
//! calls [`TrackCell::on_refill`] from the DMA interrupt. Everything the
//! interrupt touches lives here:
//!
//! - the [`Engine`] (hardware handle, PCM buffer, reload frame, fader) behind
//!   a critical-section mutex, held only for O(frame) copies;
//! - the ISR-visible flags as atomics, each with exactly one writer on the
//!   control side and one reader/writer in the interrupt.
//!
//! # Refill sequence (software ring)
//!
//! ```text
//! 1. flushed + empty?          single-shot: deliver nothing
//! 2. compensate > 0            zero-fill N frames at the front, N -= inserted
//!    compensate < 0            drop N frames if N + request are buffered
//! 3. read the rest             shortfall → zero pad (+ underrun unless flushed)
//! 4. muted?                    zero the whole region
//! 5. fading out?               apply the ramp
//! 6. deliver                   single-shot: write_data / reload: commit_reload
//! ```
//!
//! The zero-copy backend carries no data through the interrupt: the refill
//! only records underruns and wakes the producer.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU8, Ordering};
use core::task::Waker;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::waitqueue::AtomicWaker;
use platform::{AudioOutput, Half, RefillReason, SampleRateHz};

use crate::fader::{FadeMode, Fader};
use crate::pcm_buffer::{PcmBackend, PcmBuffer};
use crate::sample::whole_frames;

/// Largest hardware frame (and reload region) in bytes.
pub const MAX_FRAME_BYTES: usize = 2048;

/// Empty refills a reload-mode flush waits for, covering the in-flight
/// double buffer.
pub const RELOAD_DRAIN_REFILLS: u8 = 3;

const DRAINED_REFILLS_CAP: u8 = 10;

/// How the hardware consumes frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeliveryMode {
    /// One explicit `write_data` per refill callback.
    SingleShot,
    /// The DMA cycles one region in place, refilled half by half.
    Reload,
}

/// Hardware frame length in bytes.
///
/// Low latency: 256 B up to 16 kHz, 512 B above. Otherwise 1024 B / 2048 B.
/// Rounded down so both reload halves hold whole frames.
#[allow(clippy::arithmetic_side_effects)] // Safety: frame_size ≤ 8
pub fn hw_frame_len(low_latency: bool, rate: SampleRateHz, frame_size: usize) -> usize {
    let base = match (low_latency, rate.is_voice_band()) {
        (true, true) => 256,
        (true, false) => 512,
        (false, true) => 1024,
        (false, false) => MAX_FRAME_BYTES,
    };
    whole_frames(base, frame_size * 2)
}

/// Flags shared between the control thread and the refill interrupt.
pub(crate) struct SharedFlags {
    /// Pending drift correction in frames: > 0 insert, < 0 drop.
    pub(crate) compensate: AtomicI32,
    pub(crate) flushed: AtomicBool,
    /// Reload refills that found the buffer empty after the flush.
    pub(crate) drained_refills: AtomicU8,
    /// Soft mute: buffer keeps draining, output is zeroed.
    pub(crate) muted: AtomicBool,
    /// Frames inserted (positive) or dropped (negative) by compensation and
    /// underrun padding.
    pub(crate) fill_frames: AtomicI32,
    pub(crate) refills: AtomicU32,
    pub(crate) underruns: AtomicU32,
    pub(crate) io_errors: AtomicU32,
}

impl SharedFlags {
    const fn new() -> Self {
        Self {
            compensate: AtomicI32::new(0),
            flushed: AtomicBool::new(false),
            drained_refills: AtomicU8::new(0),
            muted: AtomicBool::new(false),
            fill_frames: AtomicI32::new(0),
            refills: AtomicU32::new(0),
            underruns: AtomicU32::new(0),
            io_errors: AtomicU32::new(0),
        }
    }

    fn reset(&self) {
        self.compensate.store(0, Ordering::Relaxed);
        self.flushed.store(false, Ordering::Relaxed);
        self.drained_refills.store(0, Ordering::Relaxed);
        self.muted.store(false, Ordering::Relaxed);
        self.fill_frames.store(0, Ordering::Relaxed);
        self.refills.store(0, Ordering::Relaxed);
        self.underruns.store(0, Ordering::Relaxed);
        self.io_errors.store(0, Ordering::Relaxed);
    }

    fn add_fill(&self, frames: usize) {
        let frames = i32::try_from(frames).unwrap_or(i32::MAX);
        self.fill_frames.fetch_add(frames, Ordering::Relaxed);
    }

    fn sub_fill(&self, frames: usize) {
        let frames = i32::try_from(frames).unwrap_or(i32::MAX);
        self.fill_frames.fetch_sub(frames, Ordering::Relaxed);
    }

    /// Move the compensation counter `frames` towards zero.
    fn consume_compensation(&self, current: i32, frames: usize) {
        let frames = i32::try_from(frames).unwrap_or(i32::MAX);
        let next = if current > 0 {
            current.saturating_sub(frames).max(0)
        } else {
            current.saturating_add(frames).min(0)
        };
        self.compensate.store(next, Ordering::Relaxed);
    }

    fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Acquire)
    }

    fn is_flushed(&self) -> bool {
        self.flushed.load(Ordering::Acquire)
    }
}

/// State shared with the refill interrupt.
pub(crate) struct Engine<O> {
    pub(crate) output: O,
    pub(crate) pcm: PcmBackend,
    pub(crate) fader: Fader,
    frame: [u8; MAX_FRAME_BYTES],
    pub(crate) frame_len: usize,
    pub(crate) frame_size: usize,
    pub(crate) delivery: DeliveryMode,
    pub(crate) started: bool,
    underrun_logged: bool,
}

impl<O: AudioOutput> Engine<O> {
    #[allow(clippy::large_stack_arrays)] // moved straight into the static TrackCell
    pub(crate) fn new(
        output: O,
        pcm: PcmBackend,
        fader: Fader,
        frame_len: usize,
        frame_size: usize,
        delivery: DeliveryMode,
    ) -> Self {
        Self {
            output,
            pcm,
            fader,
            frame: [0; MAX_FRAME_BYTES],
            frame_len: frame_len.min(MAX_FRAME_BYTES),
            frame_size,
            delivery,
            started: false,
            underrun_logged: false,
        }
    }

    pub(crate) fn occupied(&self) -> usize {
        self.pcm.occupied_len(&self.output)
    }

    pub(crate) fn free(&self) -> usize {
        self.pcm.free_space(&self.output)
    }

    pub(crate) fn is_zero_copy(&self) -> bool {
        matches!(self.pcm, PcmBackend::Dma(_))
    }

    /// Enough is buffered to start the hardware without an immediate underrun.
    pub(crate) fn ready_to_start(&self) -> bool {
        if self.is_zero_copy() {
            return self.occupied() > 0;
        }
        self.occupied() >= self.frame_len || self.free() < self.frame_size
    }

    /// A flushed stream has fully left the hardware.
    pub(crate) fn drain_settled(&self, flags: &SharedFlags) -> bool {
        if self.is_zero_copy() || self.delivery == DeliveryMode::SingleShot {
            return true;
        }
        flags.drained_refills.load(Ordering::Acquire) >= RELOAD_DRAIN_REFILLS
    }

    /// Hardware writes that came back short.
    pub(crate) fn io_errors(&self, flags: &SharedFlags) -> u32 {
        let staged = match &self.pcm {
            PcmBackend::Dma(dma) => dma.short_writes(),
            PcmBackend::Ring(_) => 0,
        };
        flags.io_errors.load(Ordering::Relaxed).wrapping_add(staged)
    }

    /// Start the hardware, priming the first frame(s) synchronously.
    #[allow(clippy::indexing_slicing)] // Safety: got ≤ len ≤ MAX_FRAME_BYTES
    #[allow(clippy::arithmetic_side_effects)] // Safety: len / 2 halves a bounded length
    pub(crate) fn start(&mut self, flags: &SharedFlags) {
        if self.started {
            return;
        }
        self.started = true;
        let muted = flags.is_muted();
        let Self {
            output,
            pcm,
            fader,
            frame,
            frame_len,
            delivery,
            ..
        } = self;

        if let PcmBackend::Dma(_) = pcm {
            output.start();
            return;
        }

        let len = *frame_len;
        let region = &mut frame[..len];
        let got = pcm.read(region);
        region[got..].fill(0);
        if muted {
            region.fill(0);
        }
        if fader.mode() == FadeMode::Out {
            fader.apply(region);
        }

        match delivery {
            DeliveryMode::SingleShot => {
                output.start();
                let n = output.write_data(region);
                if n < len {
                    flags.io_errors.fetch_add(1, Ordering::Relaxed);
                    warn!("short write on start {} of {}", n, len);
                }
            }
            DeliveryMode::Reload => {
                let (first, second) = region.split_at(len / 2);
                output.commit_reload(Half::First, first);
                output.commit_reload(Half::Second, second);
                output.start();
            }
        }
    }

    /// One refill callback.
    #[allow(clippy::indexing_slicing)] // Safety: offset + req ≤ frame_len ≤ MAX_FRAME_BYTES; filled + got ≤ req
    #[allow(clippy::arithmetic_side_effects)] // Safety: all byte counts bounded by req; fs > 0
    pub(crate) fn refill(&mut self, flags: &SharedFlags, reason: RefillReason) {
        if !self.started {
            return;
        }
        let flushed = flags.is_flushed();

        if self.is_zero_copy() {
            if reason == RefillReason::FullConsumed && !flushed {
                flags.underruns.fetch_add(1, Ordering::Relaxed);
                if !self.underrun_logged {
                    warn!("dma fifo ran dry");
                    self.underrun_logged = true;
                }
            } else {
                self.underrun_logged = false;
            }
            return;
        }

        let fs = self.frame_size.max(1);
        let (half, req) = match self.delivery {
            DeliveryMode::SingleShot => (None, self.frame_len),
            DeliveryMode::Reload => (Some(Half::consumed_by(reason)), self.frame_len / 2),
        };
        let occupied = self.occupied();
        if flushed && occupied == 0 && half.is_none() {
            return;
        }

        let offset = if half == Some(Half::Second) { req } else { 0 };
        let Self {
            output,
            pcm,
            fader,
            frame,
            underrun_logged,
            ..
        } = self;
        let region = &mut frame[offset..offset + req];

        // Drift compensation.
        let mut filled = 0;
        let comp = flags.compensate.load(Ordering::Relaxed);
        if comp > 0 {
            let insert = (comp.unsigned_abs() as usize).saturating_mul(fs).min(req);
            let insert = whole_frames(insert, fs);
            region[..insert].fill(0);
            filled = insert;
            flags.consume_compensation(comp, insert / fs);
            flags.add_fill(insert / fs);
        } else if comp < 0 {
            let drop = whole_frames((comp.unsigned_abs() as usize).saturating_mul(fs).min(req), fs);
            if occupied >= drop + req {
                let dropped = pcm.discard(drop);
                flags.consume_compensation(comp, dropped / fs);
                flags.sub_fill(dropped / fs);
            }
        }

        // Real data, padded on underrun.
        let want = req - filled;
        let got = pcm.read(&mut region[filled..]);
        let mut len = req;
        if got < want {
            if flushed {
                if half.is_none() {
                    len = filled + got;
                } else {
                    region[filled + got..].fill(0);
                    if filled == 0 && got == 0 {
                        let drained = flags.drained_refills.load(Ordering::Relaxed);
                        if drained < DRAINED_REFILLS_CAP {
                            flags.drained_refills.store(drained + 1, Ordering::Release);
                        }
                    }
                }
            } else {
                region[filled + got..].fill(0);
                flags.add_fill((want - got) / fs);
                flags.underruns.fetch_add(1, Ordering::Relaxed);
                if !*underrun_logged {
                    warn!("pcm underrun: wanted {} got {}", want, got);
                    *underrun_logged = true;
                }
            }
        } else {
            *underrun_logged = false;
        }

        let region = &mut region[..len];
        if flags.is_muted() {
            region.fill(0);
        }
        if fader.mode() == FadeMode::Out {
            fader.apply(region);
        }

        match half {
            None => {
                if len > 0 {
                    let n = output.write_data(region);
                    if n < len {
                        flags.io_errors.fetch_add(1, Ordering::Relaxed);
                        warn!("short write {} of {}", n, len);
                    }
                }
            }
            Some(h) => output.commit_reload(h, region),
        }
    }

    /// Producer path, before mixing: fade-in.
    pub(crate) fn pre_write(&mut self, chunk: &mut [u8]) {
        if self.fader.mode() == FadeMode::In {
            self.fader.apply(chunk);
        }
    }

    /// Producer path, before sizing a chunk: queue pending inserted silence.
    ///
    /// Zero-copy only. Returns false while silence is still owed, so the
    /// producer must not hand over audio yet. Running this ahead of
    /// [`Self::commit`] keeps the free space it reports fully usable by the
    /// next pre-processed chunk.
    #[allow(clippy::arithmetic_side_effects)] // Safety: fs > 0
    pub(crate) fn reserve_compensation(&mut self, flags: &SharedFlags) -> bool {
        let fs = self.frame_size.max(1);
        let Self { output, pcm, .. } = self;
        let PcmBackend::Dma(dma) = pcm else {
            return true;
        };
        let comp = flags.compensate.load(Ordering::Relaxed);
        if comp <= 0 {
            return true;
        }
        let want = (comp.unsigned_abs() as usize).saturating_mul(fs);
        let room = whole_frames(want.min(dma.free(output)), fs);
        let inserted = dma.push_silence(output, room);
        flags.consume_compensation(comp, inserted / fs);
        flags.add_fill(inserted / fs);
        inserted >= want
    }

    /// Producer path, after mixing: land `chunk` in the buffer.
    ///
    /// The zero-copy backend has no refill-time hook, so soft mute, fade-out
    /// and frame dropping are applied here instead. Inserted silence was
    /// already queued by [`Self::reserve_compensation`].
    #[allow(clippy::indexing_slicing)] // Safety: drop ≤ chunk.len()
    #[allow(clippy::arithmetic_side_effects)] // Safety: byte counts bounded by chunk.len() and free space; fs > 0
    pub(crate) fn commit(&mut self, flags: &SharedFlags, chunk: &mut [u8]) -> usize {
        let fs = self.frame_size.max(1);
        let Self {
            output,
            pcm,
            fader,
            ..
        } = self;
        let dma = match pcm {
            PcmBackend::Ring(ring) => return ring.write_slice(chunk),
            PcmBackend::Dma(dma) => dma,
        };

        if flags.is_muted() {
            chunk.fill(0);
        } else if fader.mode() == FadeMode::Out {
            fader.apply(chunk);
        }

        let comp = flags.compensate.load(Ordering::Relaxed);
        if comp < 0 {
            let drop = whole_frames((comp.unsigned_abs() as usize).saturating_mul(fs).min(chunk.len()), fs);
            flags.consume_compensation(comp, drop / fs);
            flags.sub_fill(drop / fs);
            drop + dma.push(output, &chunk[drop..])
        } else {
            dma.push(output, chunk)
        }
    }

    /// Zero-copy flush: one frame of silence, then pad out the stage.
    pub(crate) fn flush_staged(&mut self) {
        let fs = self.frame_size;
        if let PcmBackend::Dma(dma) = &mut self.pcm {
            dma.push_silence(&mut self.output, fs);
            dma.flush(&mut self.output);
        }
    }
}

/// Interrupt-visible half of a track.
///
/// `const`-constructible so it can live in a `static`. Empty until
/// [`AudioTrack::create`](crate::AudioTrack::create) installs an engine, and
/// empty again after destroy; refills on an empty cell are ignored.
pub struct TrackCell<O> {
    engine: Mutex<CriticalSectionRawMutex, RefCell<Option<Engine<O>>>>,
    pub(crate) flags: SharedFlags,
    space: AtomicWaker,
}

impl<O> TrackCell<O> {
    /// An empty cell.
    pub const fn new() -> Self {
        Self {
            engine: Mutex::new(RefCell::new(None)),
            flags: SharedFlags::new(),
            space: AtomicWaker::new(),
        }
    }

    /// Refill callbacks seen since the track was created.
    pub fn refill_count(&self) -> u32 {
        self.flags.refills.load(Ordering::Relaxed)
    }
}

impl<O> Default for TrackCell<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: AudioOutput> TrackCell<O> {
    /// DMA refill interrupt entry point.
    pub fn on_refill(&self, reason: RefillReason) {
        self.flags.refills.fetch_add(1, Ordering::Relaxed);
        self.engine.lock(|slot| {
            if let Some(engine) = slot.borrow_mut().as_mut() {
                engine.refill(&self.flags, reason);
            }
        });
        self.space.wake();
    }

    /// An engine is installed.
    pub fn is_installed(&self) -> bool {
        self.engine.lock(|slot| slot.borrow().is_some())
    }

    /// Install `engine`, resetting the shared flags. Hands it back if the
    /// cell is already in use.
    pub(crate) fn install(&self, engine: Engine<O>) -> Result<(), Engine<O>> {
        self.engine.lock(|slot| {
            let mut slot = slot.borrow_mut();
            if slot.is_some() {
                return Err(engine);
            }
            self.flags.reset();
            *slot = Some(engine);
            Ok(())
        })
    }

    /// Take the engine out; from here on refills are no-ops.
    pub(crate) fn uninstall(&self) -> Option<Engine<O>> {
        let engine = self.engine.lock(|slot| slot.borrow_mut().take());
        self.space.wake();
        engine
    }

    /// Run `f` on the engine inside the critical section.
    pub(crate) fn with_engine<R>(&self, f: impl FnOnce(&mut Engine<O>, &SharedFlags) -> R) -> Option<R> {
        self.engine
            .lock(|slot| slot.borrow_mut().as_mut().map(|engine| f(engine, &self.flags)))
    }

    /// Overwrite the drift-correction counter.
    pub(crate) fn set_compensation(&self, frames: i32) {
        self.engine
            .lock(|_| self.flags.compensate.store(frames, Ordering::Relaxed));
    }

    /// Mark the stream flushed and restart the drain count.
    pub(crate) fn mark_flushed(&self) {
        self.engine.lock(|_| {
            self.flags.drained_refills.store(0, Ordering::Relaxed);
            self.flags.flushed.store(true, Ordering::Release);
        });
    }

    pub(crate) fn register_waker(&self, waker: &Waker) {
        self.space.register(waker);
    }
}
