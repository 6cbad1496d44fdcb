//! Drift compensation, flush draining and overlay mixing through a live track.
// Integration test file: unwrap/indexing are intentional test mechanisms.
#![allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap
)]
//!
//! Run with: cargo test -p audio-track --test drift_and_flush

mod common;

use audio_track::{AudioTrack, BackendKind, DeliveryMode, FlushOutcome, TrackParams, TrackState};
use common::{cell, nonblocking, pcm16, policy, ramp, reload_policy, ring_track, system, Clip, PumpDelay};
use platform::mocks::MockOutput;
use platform::{AudioMode, RefillReason, SampleRateHz, StreamType};

// ── Drift compensation ──────────────────────────────────────────────────────

#[test]
fn test_positive_compensation_inserts_exactly_n_frames() {
    let (mut track, cell, probe) = ring_track(policy(AudioMode::Mono), nonblocking(), 8192);
    let data = ramp(4096);
    track.try_write(&pcm16(&data));
    assert_eq!(track.state(), TrackState::Started);

    track.compensate_samples(5);
    cell.on_refill(RefillReason::FullConsumed);
    cell.on_refill(RefillReason::FullConsumed);

    let out = probe.delivered_i16();
    assert_eq!(&out[..1024], &data[..1024]);
    assert_eq!(&out[1024..1029], &[0i16; 5]);
    // Playback is verbatim again right after the inserted frames.
    assert_eq!(&out[1029..3072], &data[1024..3067]);
    assert_eq!(track.fill_samples(), 5);
}

#[test]
fn test_negative_compensation_drops_exactly_n_frames() {
    let (mut track, cell, probe) = ring_track(policy(AudioMode::Mono), nonblocking(), 8192);
    let data = ramp(3072);
    track.try_write(&pcm16(&data));

    track.compensate_samples(-5);
    cell.on_refill(RefillReason::FullConsumed);

    let out = probe.delivered_i16();
    assert_eq!(&out[..1024], &data[..1024]);
    assert_eq!(&out[1024..2048], &data[1029..2053]);
    assert_eq!(track.fill_samples(), -5);
    assert_eq!(track.occupied_len(), (3072 - 2053) * 2);
}

#[test]
fn test_negative_compensation_waits_when_too_little_is_buffered() {
    let (mut track, cell, probe) = ring_track(policy(AudioMode::Mono), nonblocking(), 8192);
    let data = ramp(2048 + 10);
    track.try_write(&pcm16(&data));

    track.compensate_samples(-100);
    cell.on_refill(RefillReason::FullConsumed);
    // 100 + 1024 frames are not buffered: nothing dropped, played verbatim.
    let out = probe.delivered_i16();
    assert_eq!(&out[1024..2048], &data[1024..2048]);
    assert_eq!(track.fill_samples(), 0);
}

#[test]
fn test_compensation_overwrites_pending_value() {
    let (mut track, cell, probe) = ring_track(policy(AudioMode::Mono), nonblocking(), 8192);
    track.try_write(&pcm16(&ramp(4096)));
    track.compensate_samples(50);
    track.compensate_samples(2);
    cell.on_refill(RefillReason::FullConsumed);
    let out = probe.delivered_i16();
    assert_eq!(&out[1024..1026], &[0i16; 2]);
    assert_ne!(out[1026], 0);
    assert_eq!(track.fill_samples(), 2);
}

#[test]
fn test_reload_compensation_spans_halves() {
    let p = TrackParams {
        delivery: Some(DeliveryMode::Reload),
        ..nonblocking()
    };
    let (mut track, cell, probe) = ring_track(policy(AudioMode::Mono), p, 8192);
    track.try_write(&pcm16(&ramp(4096)));
    track.compensate_samples(700);
    // Each half is 512 frames.
    cell.on_refill(RefillReason::HalfConsumed);
    cell.on_refill(RefillReason::FullConsumed);
    let s = probe.lock();
    assert_eq!(s.reloads.len(), 4);
    assert!(s.delivered[2048..2048 + 1400].iter().all(|&b| b == 0));
    assert_ne!(s.delivered[2048 + 1400], 0);
    drop(s);
    assert_eq!(track.fill_samples(), 700);
}

// ── Flush ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_flush_single_shot_drains_short_last_frame() {
    let (mut track, cell, probe) = ring_track(policy(AudioMode::Mono), nonblocking(), 8192);
    let data = pcm16(&ramp(1500));
    track.try_write(&data);

    let mut delay = PumpDelay::new(cell);
    assert_eq!(track.flush(&mut delay).await, FlushOutcome::Drained);
    assert_eq!(track.occupied_len(), 0);
    assert_eq!(track.state(), TrackState::Flushing);
    let s = probe.lock();
    assert_eq!(s.writes, vec![2048, 952]);
    assert_eq!(s.delivered, data);
    drop(s);

    // Idempotent: no further polling.
    let mut again = PumpDelay::new(cell);
    assert_eq!(track.flush(&mut again).await, FlushOutcome::Drained);
    assert_eq!(again.sleeps, 0);
}

#[tokio::test]
async fn test_flush_reload_waits_for_three_empty_refills() {
    let (mut track, cell, probe) = ring_track(reload_policy(AudioMode::Mono), nonblocking(), 8192);
    assert_eq!(track.delivery(), DeliveryMode::Reload);
    track.try_write(&pcm16(&ramp(1500)));

    let mut delay = PumpDelay::new(cell);
    assert_eq!(track.flush(&mut delay).await, FlushOutcome::Drained);
    // One refill for the 952 B residue, three that found nothing.
    assert_eq!(delay.sleeps, 4);
    assert_eq!(probe.lock().reloads.len(), 2 + 4);
}

#[tokio::test]
async fn test_flush_times_out_on_stalled_hardware() {
    let (mut track, cell, _) = ring_track(policy(AudioMode::Mono), nonblocking(), 8192);
    track.try_write(&pcm16(&ramp(1500)));

    let mut delay = PumpDelay::stalled(cell);
    assert_eq!(track.flush(&mut delay).await, FlushOutcome::TimedOut);
    assert_eq!(delay.sleeps, audio_track::track::FLUSH_MAX_POLLS);
    assert_eq!(track.occupied_len(), 952);
}

#[tokio::test]
async fn test_flush_starts_clip_shorter_than_one_frame() {
    // 480 frames is under one 2048 B hardware frame, so writing never starts.
    let (mut track, cell, probe) = ring_track(policy(AudioMode::Mono), nonblocking(), 8192);
    let data = pcm16(&ramp(480));
    assert_eq!(track.try_write(&data), 960);
    assert_eq!(track.state(), TrackState::Created);

    let mut delay = PumpDelay::new(cell);
    assert_eq!(track.flush(&mut delay).await, FlushOutcome::Drained);
    assert_eq!(track.occupied_len(), 0);
    assert_eq!(track.state(), TrackState::Flushing);
    let s = probe.lock();
    assert!(s.started);
    // Primed as one zero-padded frame.
    assert_eq!(s.writes, vec![2048]);
    assert_eq!(&s.delivered[..960], &data[..]);
    assert!(s.delivered[960..].iter().all(|&b| b == 0));
}

#[tokio::test]
async fn test_flush_starts_short_reload_clip() {
    let (mut track, cell, probe) = ring_track(reload_policy(AudioMode::Mono), nonblocking(), 8192);
    let data = pcm16(&ramp(480));
    track.try_write(&data);
    assert_eq!(track.state(), TrackState::Created);

    let mut delay = PumpDelay::new(cell);
    assert_eq!(track.flush(&mut delay).await, FlushOutcome::Drained);
    assert_eq!(track.occupied_len(), 0);
    // Both halves primed, then three refills that found nothing.
    assert_eq!(delay.sleeps, 3);
    assert_eq!(&probe.delivered()[..960], &data[..]);
}

#[tokio::test]
async fn test_flush_with_nothing_buffered_reports_not_started() {
    let (mut track, cell, probe) = ring_track(policy(AudioMode::Mono), nonblocking(), 8192);
    track
        .set_mix_stream(Clip::leak(vec![1; 64]), SampleRateHz::HZ_48000, 1, StreamType::Tone)
        .unwrap();

    let mut delay = PumpDelay::new(cell);
    assert_eq!(track.flush(&mut delay).await, FlushOutcome::NotStarted);
    assert_eq!(delay.sleeps, 0);
    assert!(!track.has_mix_stream());
    assert!(!probe.lock().started);
}

#[tokio::test]
async fn test_flush_zero_copy_pads_stage_and_drains_fifo() {
    let c = cell();
    let (out, probe) = MockOutput::new(1024);
    let p = TrackParams {
        backend: BackendKind::ZeroCopy,
        ..nonblocking()
    };
    let mut track = AudioTrack::create(system(policy(AudioMode::Mono)), c, p, out, None).unwrap();
    track.try_write(&pcm16(&ramp(500)));
    assert_eq!(track.occupied_len(), 1000);

    let mut delay = PumpDelay::new(c).draining(probe.clone());
    assert_eq!(track.flush(&mut delay).await, FlushOutcome::Drained);
    assert_eq!(delay.sleeps, 1);
    // 992 B direct, then 8 B stage + 2 B silent frame padded to 16 B.
    let delivered = probe.delivered();
    assert_eq!(delivered.len(), 1008);
    assert!(delivered[1000..].iter().all(|&b| b == 0));
    // FIFO-empty callbacks after a flush are not underruns.
    c.on_refill(RefillReason::FullConsumed);
    assert_eq!(track.underrun_count(), 0);
}

// ── Mixing ──────────────────────────────────────────────────────────────────

fn mixed_output(main: &[i16], overlay: Vec<i16>, overlay_rate: SampleRateHz, overlay_channels: u8, mode: AudioMode) -> Vec<i16> {
    let (mut track, cell, probe) = ring_track(policy(mode), nonblocking(), 8192);
    track.set_wait_to_start(true);
    track
        .set_mix_stream(Clip::leak(overlay), overlay_rate, overlay_channels, StreamType::Tts)
        .unwrap();
    track.try_write(&pcm16(main));
    track.start();
    cell.on_refill(RefillReason::FullConsumed);
    probe.delivered_i16()
}

#[test]
fn test_silence_mixed_with_silence_is_silence() {
    let out = mixed_output(&[0; 2048], vec![0; 2048], SampleRateHz::HZ_48000, 1, AudioMode::Mono);
    assert!(out.iter().all(|&s| s == 0));
}

#[test]
fn test_phase_inverted_overlay_cancels() {
    let main: Vec<i16> = (0..2048).map(|i| ((i * 37) % 20_000 - 10_000) as i16).collect();
    let inverted: Vec<i16> = main.iter().map(|&s| -s).collect();
    let out = mixed_output(&main, inverted, SampleRateHz::HZ_48000, 1, AudioMode::Mono);
    assert!(out[..2048].iter().all(|&s| s.abs() <= 1));
}

#[test]
fn test_mono_overlay_duplicates_across_stereo() {
    let main = vec![0i16; 2048];
    let out = mixed_output(&main, vec![400; 1024], SampleRateHz::HZ_48000, 1, AudioMode::Stereo);
    assert!(out[..2048].iter().all(|&s| s == 200));
}

#[test]
fn test_resampled_overlay_mixes_and_detaches() {
    let main = vec![0i16; 2048];
    // 16 kHz → 48 kHz: 300 source frames stretch to 900 output frames,
    // including the span after the last source frame.
    let out = mixed_output(&main, vec![1000; 300], SampleRateHz::HZ_16000, 1, AudioMode::Mono);
    let touched = out[..2048].iter().filter(|&&s| s != 0).count();
    assert!((900..=901).contains(&touched), "touched {touched}");
    assert_eq!(out[touched - 1], 500);
    assert!(out[1000..2048].iter().all(|&s| s == 0));
}

#[test]
fn test_overlay_rejects_unsupported_layouts() {
    let (mut track, _, _) = ring_track(policy(AudioMode::Mono), nonblocking(), 8192);
    let err = track.set_mix_stream(Clip::leak(vec![0; 6]), SampleRateHz::HZ_48000, 3, StreamType::Tone);
    assert_eq!(err, Err(audio_track::MixError::UnsupportedChannels));
    assert!(!track.has_mix_stream());

    let p = TrackParams {
        sample_rate: SampleRateHz::new(8_000).unwrap(),
        ..nonblocking()
    };
    let (mut narrow, _, _) = ring_track(policy(AudioMode::Mono), p, 8192);
    // 96 kHz into 8 kHz is beyond the resampler's ratio.
    let err = narrow.set_mix_stream(
        Clip::leak(vec![0; 6]),
        SampleRateHz::new(96_000).unwrap(),
        1,
        StreamType::Tone,
    );
    assert_eq!(err, Err(audio_track::MixError::ScratchTooSmall));
    assert!(!narrow.has_mix_stream());
}
