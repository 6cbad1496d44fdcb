//! Control-plane handle of an audio track.
//!
//! [`AudioTrack`] is owned by the producer thread. It borrows its interrupt
//! half ([`TrackCell`]) and the board's [`AudioSystem`]:
//!
//! ```text
//!  producer ──write()──▶ fade-in ─▶ mix ─▶ commit ─▶ PcmBuffer
//!                                                       │
//!  DMA IRQ ──on_refill()───────────────────────────────┘─▶ AudioOutput
//! ```
//!
//! Every hardware access goes through the cell's critical section, so the
//! output handle is never touched concurrently by both sides.

use core::future::poll_fn;
use core::task::Poll;

use embedded_hal_async::delay::DelayNs;
use platform::{
    AudioFormat, AudioMode, AudioOutput, OutputParams, SampleRateHz, StreamType, TwsObserver,
    VolumeLevel,
};

use crate::dma_ring::DmaRing;
use crate::fader::{FadeMode, Fader};
use crate::mixer::{MixError, MixSession, MixSource};
use crate::pcm_buffer::{BackendKind, PcmBackend, PcmBuffer};
use crate::refill::{hw_frame_len, DeliveryMode, Engine, TrackCell};
use crate::registry::{AudioSystem, TrackId, TrackRegistry};
use crate::ring_buffer::RingBuffer;
use crate::sample::{frame_size, whole_frames};
use crate::state::{TrackLifecycle, TrackState};
use crate::volume::{apply_gain, gain_to_level, level_to_gain};

/// Largest chunk the write path fades, mixes and commits in one pass.
pub const WRITE_CHUNK_BYTES: usize = 512;

/// Sleep between flush polls.
pub const FLUSH_POLL_MS: u32 = 2;

/// Flush gives up after this many polls.
pub const FLUSH_MAX_POLLS: u32 = 100;

/// Zero-copy buffer time when the policy does not set one.
pub const DEFAULT_ZERO_COPY_BUFFER_MS: u32 = 64;

/// Behaviour of `write` when the buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpenMode {
    /// Suspend until the refill interrupt frees space.
    #[default]
    Blocking,
    /// Return the accepted length immediately.
    NonBlocking,
}

/// Lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TrackEvent {
    /// The hardware started playing.
    Started,
    /// The hardware stopped.
    Stopped,
}

/// How a flush finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlushOutcome {
    /// Everything buffered reached the hardware.
    Drained,
    /// Data was still buffered when the poll budget ran out.
    TimedOut,
    /// Nothing was buffered before start, or the track was stopped.
    NotStarted,
}

/// Track creation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TrackError {
    /// No PCM memory for the stream, or the cell is already in use.
    Allocation,
    /// The hardware output refused to open.
    HardwareOpen,
    /// The format and channel count give no usable frame.
    InvalidParams,
}

impl core::fmt::Display for TrackError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Allocation => f.write_str("no memory for audio track"),
            Self::HardwareOpen => f.write_str("audio output open failed"),
            Self::InvalidParams => f.write_str("invalid track parameters"),
        }
    }
}

/// Timestamps (µs) at which the most recently written sample will play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PresentationTime {
    /// On the local play clock.
    pub local_us: u64,
    /// On the TWS peer clock.
    pub peer_us: u64,
}

/// Creation parameters.
///
/// ```
/// use audio_track::{BackendKind, TrackParams};
/// use platform::{SampleRateHz, StreamType};
///
/// let params = TrackParams {
///     backend: BackendKind::ZeroCopy,
///     ..TrackParams::new(StreamType::Music, SampleRateHz::HZ_48000)
/// };
/// assert_eq!(params.backend, BackendKind::ZeroCopy);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TrackParams {
    /// Stream type; selects policy tables and the pool partition.
    pub stream: StreamType,
    /// Rate the producer writes at.
    pub sample_rate: SampleRateHz,
    /// Sample width.
    pub format: AudioFormat,
    /// `AudioMode::Default` takes the policy's mode for the stream.
    pub mode: AudioMode,
    /// `None` takes the policy's routing.
    pub delivery: Option<DeliveryMode>,
    /// PCM buffer backend.
    pub backend: BackendKind,
    /// Whether `write` suspends on a full buffer.
    pub open_mode: OpenMode,
    /// Lifecycle callback.
    pub on_event: Option<fn(TrackEvent)>,
}

impl TrackParams {
    /// 16-bit PCM, policy mode and routing, software ring, blocking writes.
    pub fn new(stream: StreamType, sample_rate: SampleRateHz) -> Self {
        Self {
            stream,
            sample_rate,
            format: AudioFormat::Pcm16,
            mode: AudioMode::Default,
            delivery: None,
            backend: BackendKind::Ring,
            open_mode: OpenMode::Blocking,
            on_event: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StorageOrigin {
    Pool,
    Caller,
}

/// A PCM playback track.
pub struct AudioTrack<'a, O: AudioOutput> {
    system: &'a AudioSystem<'a>,
    cell: &'a TrackCell<O>,
    id: TrackId,
    stream: StreamType,
    sample_rate: SampleRateHz,
    output_rate: SampleRateHz,
    format: AudioFormat,
    channels: u8,
    frame_size: usize,
    backend: BackendKind,
    delivery: DeliveryMode,
    open_mode: OpenMode,
    on_event: Option<fn(TrackEvent)>,
    lifecycle: TrackLifecycle,
    volume: VolumeLevel,
    wait_to_start: bool,
    flush_outcome: Option<FlushOutcome>,
    mix: Option<MixSession<'a>>,
    origin: StorageOrigin,
    // Caller buffer not used as ring storage (zero-copy backend).
    spare: Option<&'static mut [u8]>,
    scratch: [u8; WRITE_CHUNK_BYTES],
    torn_down: bool,
}

impl<'a, O: AudioOutput> AudioTrack<'a, O> {
    /// Open the hardware output, install the engine in `cell` and register
    /// the new track as current.
    ///
    /// The software ring uses `outer_buffer` when given, else the pool
    /// partition for the stream. A caller buffer is released on failure.
    ///
    /// # Errors
    ///
    /// - [`TrackError::InvalidParams`] if no whole frame fits a hardware frame.
    /// - [`TrackError::Allocation`] if the cell is in use or no memory is free.
    /// - [`TrackError::HardwareOpen`] if the output refuses to open.
    #[allow(clippy::arithmetic_side_effects)] // Safety: u64 products of rate, ms and frame size
    #[allow(clippy::cast_possible_truncation)] // Safety: capacity bounded by the hardware FIFO size
    pub fn create(
        system: &'a AudioSystem<'a>,
        cell: &'a TrackCell<O>,
        params: TrackParams,
        mut output: O,
        outer_buffer: Option<&'static mut [u8]>,
    ) -> Result<Self, TrackError> {
        let policy = system.policy();
        let stream = params.stream;
        let channels = params
            .mode
            .channels()
            .or_else(|| policy.audio_mode(stream).channels())
            .unwrap_or(2);
        let fs = frame_size(params.format, channels);
        let output_rate = policy.output_sample_rate().unwrap_or(params.sample_rate);
        let routing = policy.routing(stream);
        let delivery = params.delivery.unwrap_or(if routing.reload {
            DeliveryMode::Reload
        } else {
            DeliveryMode::SingleShot
        });
        let frame_len = hw_frame_len(policy.low_latency(), output_rate, fs);
        if fs == 0 || frame_len == 0 {
            error!("no whole frame fits: frame size {}", fs);
            return Err(TrackError::InvalidParams);
        }
        if cell.is_installed() {
            error!("track cell for {} already in use", stream.as_str());
            return Err(TrackError::Allocation);
        }

        let (storage, origin, spare) = match (params.backend, outer_buffer) {
            (BackendKind::Ring, Some(buf)) => (Some(buf), StorageOrigin::Caller, None),
            (BackendKind::Ring, None) => match system.pool().take(stream) {
                Some(region) => (Some(region), StorageOrigin::Pool, None),
                None => {
                    error!("no pcm memory for {}", stream.as_str());
                    return Err(TrackError::Allocation);
                }
            },
            (BackendKind::ZeroCopy, buf) => (None, StorageOrigin::Caller, buf),
        };
        if let Some(region) = storage.as_deref() {
            if whole_frames(region.len(), fs) < frame_len {
                error!("pcm buffer {} smaller than frame {}", region.len(), frame_len);
                release(system, stream, storage, origin);
                return Err(TrackError::Allocation);
            }
        }

        let gain = level_to_gain(policy, stream, policy.stream_volume(stream));
        let reload_len = (params.backend == BackendKind::Ring && delivery == DeliveryMode::Reload)
            .then_some(frame_len);
        let open = output.open(&OutputParams {
            sample_rate: output_rate,
            channels,
            format: params.format,
            channel_type: routing.channel_type,
            channel_id: routing.channel_id,
            reload_len,
            initial_pa_mdb: gain.milli_db,
            automute_force: policy.automute_force(stream),
        });
        if let Err(e) = open {
            error!("output open failed for {}: {}", stream.as_str(), e);
            release(system, stream, storage, origin);
            return Err(TrackError::HardwareOpen);
        }
        apply_gain(&mut output, gain);
        let (left, right) = policy.lr_channel_enable();
        output.lr_channel_enable(left, right);

        let pcm = match storage {
            Some(region) => PcmBackend::Ring(RingBuffer::new(region)),
            None => {
                let khz = output_rate.khz();
                output.set_threshold(khz, khz.saturating_mul(2));
                let ms = match policy.pcm_buffer_time_ms(stream) {
                    0 => DEFAULT_ZERO_COPY_BUFFER_MS,
                    ms => ms,
                };
                let wanted = u64::from(ms) * u64::from(output_rate.get()) * fs as u64 / 1000;
                let hw = output.buffer_size() / usize::from(channels) * fs;
                let capacity = (wanted.min(hw as u64)) as usize;
                PcmBackend::Dma(DmaRing::new(capacity, fs, channels))
            }
        };

        let engine = Engine::new(
            output,
            pcm,
            Fader::new(params.format, channels),
            frame_len,
            fs,
            delivery,
        );
        if let Err(mut engine) = cell.install(engine) {
            error!("track cell for {} already in use", stream.as_str());
            engine.output.close();
            release(system, stream, engine.pcm.into_storage(), origin);
            return Err(TrackError::Allocation);
        }

        let registry = system.registry();
        let id = registry.allocate();
        if let Some(prev) = registry.register(id) {
            debug!("track {} replaces {} as current", id.get(), prev.get());
        }
        info!(
            "track {} created: {} {} Hz {} ch, frame {} B",
            id.get(),
            stream.as_str(),
            output_rate.get(),
            channels,
            frame_len
        );

        Ok(Self {
            system,
            cell,
            id,
            stream,
            sample_rate: params.sample_rate,
            output_rate,
            format: params.format,
            channels,
            frame_size: fs,
            backend: params.backend,
            delivery,
            open_mode: params.open_mode,
            on_event: params.on_event,
            lifecycle: TrackLifecycle::new(),
            volume: policy.stream_volume(stream),
            wait_to_start: false,
            flush_outcome: None,
            mix: None,
            origin,
            spare,
            scratch: [0; WRITE_CHUNK_BYTES],
            torn_down: false,
        })
    }

    /// Start playback as soon as a hardware frame is buffered.
    ///
    /// Idempotent. Clears [`set_wait_to_start`](Self::set_wait_to_start).
    pub fn start(&mut self) {
        self.wait_to_start = false;
        match self.lifecycle.state() {
            TrackState::Created => {
                if !self.try_start() {
                    debug!("track {} start deferred until a frame is buffered", self.id.get());
                }
            }
            state => debug!("track {} start ignored in {}", self.id.get(), state.as_str()),
        }
    }

    fn try_start(&mut self) -> bool {
        self.start_hardware(false)
    }

    /// Start the hardware once a frame is buffered, or with any data at all
    /// when `force` is set (the first frame is then zero-padded).
    fn start_hardware(&mut self, force: bool) -> bool {
        let started = self
            .cell
            .with_engine(|engine, flags| {
                if engine.ready_to_start() || (force && engine.occupied() > 0) {
                    engine.start(flags);
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);
        if started {
            if let Err(e) = self.lifecycle.start() {
                debug!("start: {}", e);
            }
            info!("track {} started", self.id.get());
            self.emit(TrackEvent::Started);
        }
        started
    }

    fn maybe_auto_start(&mut self) {
        if !self.wait_to_start && self.lifecycle.state() == TrackState::Created {
            self.try_start();
        }
    }

    /// Accept as many whole frames of `data` as fit, without suspending.
    ///
    /// Returns the number of bytes taken.
    #[allow(clippy::arithmetic_side_effects)] // Safety: accepted ≤ data.len()
    pub fn try_write(&mut self, data: &[u8]) -> usize {
        if self.torn_down || self.lifecycle.state() == TrackState::Stopped {
            return 0;
        }
        let mut accepted = 0;
        while let Some(rest) = data.get(accepted..) {
            // Owed silence goes out first so the chunk below always fits.
            let clear = self
                .cell
                .with_engine(|engine, flags| engine.reserve_compensation(flags))
                .unwrap_or(false);
            if !clear {
                break;
            }
            let n = whole_frames(rest.len().min(self.free_space()).min(WRITE_CHUNK_BYTES), self.frame_size);
            if n == 0 {
                break;
            }
            let (Some(chunk), Some(src)) = (self.scratch.get_mut(..n), rest.get(..n)) else {
                break;
            };
            chunk.copy_from_slice(src);
            self.cell.with_engine(|engine, _| engine.pre_write(chunk));
            mix_chunk(
                &mut self.mix,
                self.system.registry(),
                self.id,
                chunk,
                self.format,
                self.channels,
            );
            let wrote = self
                .cell
                .with_engine(|engine, flags| engine.commit(flags, chunk))
                .unwrap_or(0);
            accepted += wrote;
            self.maybe_auto_start();
            if wrote < n {
                break;
            }
        }
        accepted
    }

    /// Producer entry point.
    ///
    /// In [`OpenMode::Blocking`] a started track suspends until the refill
    /// interrupt frees space, until every whole frame of `data` is taken.
    /// Returns the number of bytes taken.
    #[allow(clippy::arithmetic_side_effects)] // Safety: done ≤ data.len()
    pub async fn write(&mut self, data: &[u8]) -> usize {
        let mut done = self.try_write(data);
        while data.len() - done >= self.frame_size
            && self.open_mode == OpenMode::Blocking
            && self.lifecycle.is_running()
            && !self.torn_down
        {
            self.wait_for_space().await;
            let Some(rest) = data.get(done..) else {
                break;
            };
            done += self.try_write(rest);
        }
        done
    }

    async fn wait_for_space(&self) {
        poll_fn(|cx| {
            self.cell.register_waker(cx.waker());
            if self.free_space() >= self.frame_size || !self.cell.is_installed() {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        })
        .await;
    }

    /// Drain everything written so far to the hardware.
    ///
    /// A track still waiting for its first full frame is started here, so a
    /// clip shorter than one hardware frame is still played.
    ///
    /// Idempotent: once a started track has flushed, later calls return the
    /// first outcome. Any mix stream is detached when the flush finishes.
    pub async fn flush<D: DelayNs>(&mut self, delay: &mut D) -> FlushOutcome {
        if let Some(outcome) = self.flush_outcome {
            debug!("track {} already flushed", self.id.get());
            return outcome;
        }
        if self.lifecycle.state() == TrackState::Created && self.occupied_len() > 0 {
            debug!("track {} flush starts a short stream", self.id.get());
            self.start_hardware(true);
        }
        self.cell.mark_flushed();
        let outcome = match self.lifecycle.flush() {
            Ok(()) => {
                self.cell.with_engine(|engine, _| engine.flush_staged());
                let outcome = self.drain(delay).await;
                self.flush_outcome = Some(outcome);
                outcome
            }
            Err(e) => {
                debug!("track {} flush: {}", self.id.get(), e);
                FlushOutcome::NotStarted
            }
        };
        self.clear_mix_stream();
        outcome
    }

    #[allow(clippy::arithmetic_side_effects)] // Safety: polls ≤ FLUSH_MAX_POLLS
    async fn drain<D: DelayNs>(&mut self, delay: &mut D) -> FlushOutcome {
        let mut polls = 0u32;
        loop {
            let (left, settled) = self
                .cell
                .with_engine(|engine, flags| (engine.occupied(), engine.drain_settled(flags)))
                .unwrap_or((0, true));
            if left == 0 && settled {
                info!("track {} drained after {} polls", self.id.get(), polls);
                return FlushOutcome::Drained;
            }
            if polls >= FLUSH_MAX_POLLS {
                info!("track {} flush timed out, {} B left", self.id.get(), left);
                return FlushOutcome::TimedOut;
            }
            polls += 1;
            if polls % 10 == 0 {
                info!("track {} flushing, {} B left", self.id.get(), left);
            }
            delay.delay_ms(FLUSH_POLL_MS).await;
        }
    }

    /// Ramp up from silence over `ms`.
    pub fn set_fade_in(&mut self, ms: u32) {
        let rate = self.output_rate;
        let changed = self.cell.with_engine(|engine, _| engine.fader.fade_in(ms, rate));
        if changed == Some(false) {
            debug!("track {} already fading in", self.id.get());
        }
    }

    /// Ramp down to silence over `ms`; silence holds until a fade-in.
    pub fn set_fade_out(&mut self, ms: u32) {
        let rate = self.output_rate;
        let changed = self.cell.with_engine(|engine, _| engine.fader.fade_out(ms, rate));
        if changed == Some(false) {
            debug!("track {} already fading out", self.id.get());
        }
    }

    /// Current fade direction.
    pub fn fade_mode(&self) -> FadeMode {
        self.cell
            .with_engine(|engine, _| engine.fader.mode())
            .unwrap_or_default()
    }

    /// Set the drift-correction counter in frames: positive inserts
    /// silence, negative drops buffered audio. Overwrites any pending value.
    pub fn compensate_samples(&mut self, frames: i32) {
        debug!("track {} compensate {}", self.id.get(), frames);
        self.cell.set_compensation(frames);
    }

    /// Attach an overlay stream.
    ///
    /// A track that is not current ignores the request.
    ///
    /// # Errors
    ///
    /// [`MixError`] if the session cannot convert `rate` / `channels`.
    pub fn set_mix_stream(
        &mut self,
        source: &'a mut dyn MixSource,
        rate: SampleRateHz,
        channels: u8,
        tag: StreamType,
    ) -> Result<(), MixError> {
        if !self.system.registry().is_current(self.id) {
            debug!("track {} is not current, mix attach ignored", self.id.get());
            return Ok(());
        }
        let session = MixSession::new(source, rate, channels, tag, self.output_rate)?;
        info!(
            "track {} mixing {} at {} Hz",
            self.id.get(),
            tag.as_str(),
            rate.get()
        );
        self.mix = Some(session);
        Ok(())
    }

    /// Detach the overlay stream, if any.
    pub fn clear_mix_stream(&mut self) {
        if let Some(session) = self.mix.take() {
            info!("track {} mix {} detached", self.id.get(), session.tag().as_str());
        }
    }

    /// An overlay stream is attached.
    pub fn has_mix_stream(&self) -> bool {
        self.mix.is_some()
    }

    /// Time for the newest buffered sample to reach the output; 0 before start.
    #[allow(clippy::arithmetic_side_effects)] // Safety: frame_size and rate are non-zero
    pub fn latency_us(&self) -> u32 {
        if !self.lifecycle.is_running() {
            return 0;
        }
        let frames = (self.occupied_len() / self.frame_size) as u64;
        let us = frames * 1_000_000 / u64::from(self.output_rate.get());
        u32::try_from(us).unwrap_or(u32::MAX)
    }

    /// When the newest written sample will play, on both TWS clocks.
    pub fn presentation_time_us(&self, tws: &impl TwsObserver) -> PresentationTime {
        let latency = u64::from(self.latency_us());
        PresentationTime {
            local_us: tws.play_time_us().saturating_add(latency),
            peer_us: tws.peer_clock_us().saturating_add(latency),
        }
    }

    /// Set the user volume level.
    pub fn set_volume(&mut self, level: VolumeLevel) {
        let gain = level_to_gain(self.system.policy(), self.stream, level);
        self.cell
            .with_engine(|engine, _| apply_gain(&mut engine.output, gain));
        self.volume = level;
        info!(
            "track {} volume {} ({} mdB)",
            self.id.get(),
            level.get(),
            gain.milli_db
        );
    }

    /// Write a raw PA gain, bypassing the table; the level follows.
    pub fn set_pa_volume(&mut self, milli_db: i32) {
        self.cell.with_engine(|engine, _| {
            engine.output.mute_ctl(false);
            engine.output.set_pa_vol_level(milli_db);
        });
        self.volume = gain_to_level(self.system.policy(), self.stream, milli_db);
        info!("track {} pa {} mdB", self.id.get(), milli_db);
    }

    /// Last volume level set, or synced from a raw PA gain.
    pub fn volume(&self) -> VolumeLevel {
        self.volume
    }

    /// Hardware mute.
    pub fn set_hw_mute(&mut self, mute: bool) {
        self.cell.with_engine(|engine, _| engine.output.mute_ctl(mute));
    }

    /// Soft mute: the buffer keeps draining, the output is silent.
    pub fn set_muted(&mut self, muted: bool) {
        self.cell.flags.muted.store(muted, core::sync::atomic::Ordering::Release);
    }

    /// Soft mute state.
    pub fn is_muted(&self) -> bool {
        self.cell.flags.muted.load(core::sync::atomic::Ordering::Acquire)
    }

    /// Soft mute and drop everything buffered.
    pub fn pause(&mut self) {
        self.set_muted(true);
        self.cell.with_engine(|engine, _| engine.pcm.clear());
        debug!("track {} paused", self.id.get());
    }

    /// Undo [`pause`](Self::pause).
    pub fn resume(&mut self) {
        self.set_muted(false);
        debug!("track {} resumed", self.id.get());
    }

    /// Stop the hardware. Writes are refused from here on.
    pub fn stop(&mut self) {
        if self.lifecycle.state() == TrackState::Stopped {
            debug!("track {} already stopped", self.id.get());
            return;
        }
        let was_running = self.lifecycle.is_running();
        self.cell.with_engine(|engine, _| {
            engine.output.stop();
            engine.started = false;
        });
        self.lifecycle.stop();
        info!("track {} stopped", self.id.get());
        if was_running {
            self.emit(TrackEvent::Stopped);
        }
    }

    /// Enable or disable the left and right outputs.
    pub fn set_lr_channel_enable(&mut self, left: bool, right: bool) {
        self.cell
            .with_engine(|engine, _| engine.output.lr_channel_enable(left, right));
    }

    /// Hold off the write-triggered start until [`start`](Self::start).
    pub fn set_wait_to_start(&mut self, wait: bool) {
        self.wait_to_start = wait;
    }

    /// Frames inserted (positive) or dropped (negative) by compensation and
    /// underrun padding. Reads 0 while fading out.
    pub fn fill_samples(&self) -> i32 {
        if self.fade_mode() == FadeMode::Out {
            return 0;
        }
        self.cell
            .flags
            .fill_frames
            .load(core::sync::atomic::Ordering::Relaxed)
    }

    /// Frames played by the hardware.
    pub fn play_sample_count(&self) -> u32 {
        let channels = u32::from(self.channels.max(1));
        self.cell
            .with_engine(|engine, _| engine.output.sample_count())
            .map_or(0, |samples| samples.checked_div(channels).unwrap_or(0))
    }

    /// Underrun episodes seen by the refill interrupt.
    pub fn underrun_count(&self) -> u32 {
        self.cell
            .flags
            .underruns
            .load(core::sync::atomic::Ordering::Relaxed)
    }

    /// Hardware writes that came back short.
    pub fn io_error_count(&self) -> u32 {
        self.cell
            .with_engine(|engine, flags| engine.io_errors(flags))
            .unwrap_or(0)
    }

    /// Bytes buffered and not yet played.
    pub fn occupied_len(&self) -> usize {
        self.cell.with_engine(|engine, _| engine.occupied()).unwrap_or(0)
    }

    /// Bytes `write` can accept right now.
    pub fn free_space(&self) -> usize {
        self.cell.with_engine(|engine, _| engine.free()).unwrap_or(0)
    }

    /// PCM buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.cell
            .with_engine(|engine, _| engine.pcm.capacity())
            .unwrap_or(0)
    }

    /// Hardware frame length in bytes.
    pub fn frame_len(&self) -> usize {
        self.cell
            .with_engine(|engine, _| engine.frame_len)
            .unwrap_or(0)
    }

    /// Lifecycle state.
    pub fn state(&self) -> TrackState {
        self.lifecycle.state()
    }

    /// Registry identity.
    pub fn id(&self) -> TrackId {
        self.id
    }

    /// Stream type the track was created for.
    pub fn stream_type(&self) -> StreamType {
        self.stream
    }

    /// Rate the producer writes at.
    pub fn sample_rate(&self) -> SampleRateHz {
        self.sample_rate
    }

    /// Record a new producer rate. The hardware keeps its output rate.
    pub fn set_sample_rate(&mut self, rate: SampleRateHz) {
        debug!("track {} sample rate {}", self.id.get(), rate.get());
        self.sample_rate = rate;
    }

    /// Rate the hardware runs at.
    pub fn output_sample_rate(&self) -> SampleRateHz {
        self.output_rate
    }

    /// Resolved channel count.
    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Sample width.
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// PCM buffer backend.
    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Hardware delivery mode.
    pub fn delivery(&self) -> DeliveryMode {
        self.delivery
    }

    /// Tear the track down.
    ///
    /// The engine leaves the cell first, so later refill interrupts are
    /// no-ops. Pool memory goes back to the pool; a caller buffer is returned.
    pub fn destroy(mut self) -> Option<&'static mut [u8]> {
        self.teardown()
    }

    fn teardown(&mut self) -> Option<&'static mut [u8]> {
        if self.torn_down {
            return None;
        }
        self.torn_down = true;
        let engine = self.cell.uninstall();
        self.mix = None;
        let storage = engine.and_then(|mut engine| {
            engine.output.stop();
            engine.output.close();
            engine.pcm.into_storage()
        });
        self.system.registry().unregister(self.id);
        let was_running = self.lifecycle.is_running();
        self.lifecycle.stop();
        info!("track {} destroyed", self.id.get());
        if was_running {
            self.emit(TrackEvent::Stopped);
        }
        let storage = storage.or_else(|| self.spare.take());
        match (storage, self.origin) {
            (Some(region), StorageOrigin::Pool) => {
                self.system.pool().restore(self.stream, region);
                None
            }
            (region, _) => region,
        }
    }

    fn emit(&self, event: TrackEvent) {
        if let Some(cb) = self.on_event {
            cb(event);
        }
    }
}

impl<O: AudioOutput> Drop for AudioTrack<'_, O> {
    fn drop(&mut self) {
        let _ = self.teardown();
    }
}

fn release(
    system: &AudioSystem<'_>,
    stream: StreamType,
    storage: Option<&'static mut [u8]>,
    origin: StorageOrigin,
) {
    if let (Some(region), StorageOrigin::Pool) = (storage, origin) {
        system.pool().restore(stream, region);
    }
}

/// Overlay the mix stream on `chunk`; detaches it once exhausted.
fn mix_chunk(
    mix: &mut Option<MixSession<'_>>,
    registry: &TrackRegistry,
    id: TrackId,
    chunk: &mut [u8],
    format: AudioFormat,
    channels: u8,
) {
    let Some(session) = mix.as_mut() else {
        return;
    };
    if !registry.is_current(id) {
        return;
    }
    session.mix_into(chunk, format, channels);
    if session.is_exhausted() {
        info!("track {} mix {} finished", id.get(), session.tag().as_str());
        *mix = None;
    }
}
