//! Realtime audio analysis — running RMS, onset detection, tempo tracking.
//!
//! [`AudioAnalyzer`] is the audio-thread writer: it consumes interleaved
//! float blocks and publishes every observable through atomics. The
//! cloneable [`AnalyzerHandle`] is the main-thread reader. The analyzer
//! never allocates, locks, or fails; ill-formed input is a no-op.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::{MIN_ONSET_INTERVAL_MS, ONSET_THRESHOLD_FACTOR, TEMPO_SMOOTHING};

/// Number of block-RMS values in the running-average window.
const RMS_WINDOW: usize = 1024;

/// High-pass cutoff biasing onset detection toward percussive content.
const HIGHPASS_CUTOFF_HZ: f32 = 80.0;

/// Published tempo bounds in BPM.
const TEMPO_FLOOR: f64 = 60.0;
const TEMPO_CEILING: f64 = 200.0;

/// Inter-onset intervals outside this range (seconds) are not treated as
/// tempo candidates.
const CANDIDATE_INTERVAL_MIN_S: f64 = 0.3;
const CANDIDATE_INTERVAL_MAX_S: f64 = 2.0;

const DEFAULT_TEMPO: f64 = 120.0;

/// Published analyzer observables.
struct AnalysisState {
    rms_bits: AtomicU32,
    tempo_bits: AtomicU64,
    beat_phase_bits: AtomicU64,
    /// Sample index of the last detected onset; -1 before the first one.
    last_beat_sample: AtomicI64,
    beat_detected: AtomicBool,
}

impl AnalysisState {
    fn new() -> Self {
        Self {
            rms_bits: AtomicU32::new(0f32.to_bits()),
            tempo_bits: AtomicU64::new(DEFAULT_TEMPO.to_bits()),
            beat_phase_bits: AtomicU64::new(0f64.to_bits()),
            last_beat_sample: AtomicI64::new(-1),
            beat_detected: AtomicBool::new(false),
        }
    }
}

/// Main-thread reader for analyzer state. Cheap to clone.
#[derive(Clone)]
pub struct AnalyzerHandle {
    state: Arc<AnalysisState>,
}

impl AnalyzerHandle {
    /// Running mean of block RMS values.
    pub fn current_rms(&self) -> f32 {
        f32::from_bits(self.state.rms_bits.load(Ordering::Relaxed))
    }

    /// Smoothed tempo estimate, always within [60, 200] BPM.
    pub fn current_tempo(&self) -> f64 {
        f64::from_bits(self.state.tempo_bits.load(Ordering::Relaxed))
    }

    /// Position within the current beat, in [0, 1).
    pub fn beat_phase(&self) -> f64 {
        f64::from_bits(self.state.beat_phase_bits.load(Ordering::Relaxed))
    }

    /// Sample index of the most recent onset, if any.
    pub fn last_beat_sample(&self) -> Option<i64> {
        let sample = self.state.last_beat_sample.load(Ordering::Acquire);
        (sample >= 0).then_some(sample)
    }

    /// Whether an onset was registered during the most recent block.
    pub fn beat_detected(&self) -> bool {
        self.state.beat_detected.load(Ordering::Acquire)
    }
}

/// One-pole high-pass filter applied to the mono analysis signal. The
/// original audio is never modified.
struct Highpass {
    coeff: f32,
    prev_input: f32,
    prev_output: f32,
}

impl Highpass {
    fn new(cutoff_hz: f32, sample_rate: u32) -> Self {
        let coeff = 1.0 / (1.0 + std::f32::consts::TAU * cutoff_hz / sample_rate as f32);
        Self {
            coeff,
            prev_input: 0.0,
            prev_output: 0.0,
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let output = self.coeff * (self.prev_output + input - self.prev_input);
        self.prev_input = input;
        self.prev_output = output;
        output
    }
}

/// Audio-thread analyzer. Single writer; readers go through
/// [`AnalyzerHandle`].
pub struct AudioAnalyzer {
    state: Arc<AnalysisState>,
    sample_rate: u32,
    highpass: Highpass,
    rms_ring: [f32; RMS_WINDOW],
    ring_len: usize,
    ring_pos: usize,
    ring_sum: f64,
    /// Total frames consumed, the analyzer's clock.
    total_frames: u64,
    prev_beat_sample: i64,
    tempo: f64,
}

impl AudioAnalyzer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            state: Arc::new(AnalysisState::new()),
            sample_rate,
            highpass: Highpass::new(HIGHPASS_CUTOFF_HZ, sample_rate),
            rms_ring: [0.0; RMS_WINDOW],
            ring_len: 0,
            ring_pos: 0,
            ring_sum: 0.0,
            total_frames: 0,
            prev_beat_sample: -1,
            tempo: DEFAULT_TEMPO,
        }
    }

    /// Clone a reader handle for the main thread.
    pub fn handle(&self) -> AnalyzerHandle {
        AnalyzerHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Consume one interleaved block. Zero-length input or a zero channel
    /// count is a no-op; there is no error path on the audio thread.
    pub fn process(&mut self, input: &[f32], channels: usize) {
        if input.is_empty() || channels == 0 {
            return;
        }
        let frames = input.len() / channels;
        if frames == 0 {
            return;
        }

        // Mono-sum each frame, high-pass, accumulate energy.
        let mut energy = 0.0f64;
        for frame in input.chunks_exact(channels) {
            let mono = frame.iter().sum::<f32>() / channels as f32;
            let filtered = self.highpass.process(mono);
            energy += (filtered * filtered) as f64;
        }
        let block_rms = (energy / frames as f64).sqrt() as f32;

        self.total_frames += frames as u64;
        let running_rms = self.push_rms(block_rms);
        self.state
            .rms_bits
            .store(running_rms.to_bits(), Ordering::Relaxed);

        self.detect_onset(block_rms, running_rms);
        self.publish_beat_phase();
    }

    /// Insert a block RMS into the ring and return the running mean.
    fn push_rms(&mut self, block_rms: f32) -> f32 {
        if self.ring_len == RMS_WINDOW {
            self.ring_sum -= self.rms_ring[self.ring_pos] as f64;
        } else {
            self.ring_len += 1;
        }
        self.rms_ring[self.ring_pos] = block_rms;
        self.ring_sum += block_rms as f64;
        self.ring_pos = (self.ring_pos + 1) % RMS_WINDOW;
        (self.ring_sum / self.ring_len as f64) as f32
    }

    fn detect_onset(&mut self, block_rms: f32, running_rms: f32) {
        let now = self.total_frames as i64;
        let min_gap =
            (MIN_ONSET_INTERVAL_MS / 1000.0 * self.sample_rate as f64).round() as i64;

        let loud = block_rms > running_rms * ONSET_THRESHOLD_FACTOR;
        let spaced = self.prev_beat_sample < 0 || now - self.prev_beat_sample > min_gap;

        if loud && spaced {
            if self.prev_beat_sample >= 0 {
                let interval = (now - self.prev_beat_sample) as f64 / self.sample_rate as f64;
                if (CANDIDATE_INTERVAL_MIN_S..=CANDIDATE_INTERVAL_MAX_S).contains(&interval) {
                    let candidate = 60.0 / interval;
                    self.tempo = ((1.0 - TEMPO_SMOOTHING) * self.tempo
                        + TEMPO_SMOOTHING * candidate)
                        .clamp(TEMPO_FLOOR, TEMPO_CEILING);
                    self.state
                        .tempo_bits
                        .store(self.tempo.to_bits(), Ordering::Relaxed);
                }
            }
            self.prev_beat_sample = now;
            self.state.last_beat_sample.store(now, Ordering::Release);
            self.state.beat_detected.store(true, Ordering::Release);
        } else {
            self.state.beat_detected.store(false, Ordering::Release);
        }
    }

    fn publish_beat_phase(&self) {
        let beat_interval = 60.0 / self.tempo;
        let now = self.total_frames as f64 / self.sample_rate as f64;
        let phase = (now / beat_interval).fract();
        self.state
            .beat_phase_bits
            .store(phase.to_bits(), Ordering::Relaxed);
    }
}
