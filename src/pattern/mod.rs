//! Schillinger rhythm generation — the resultant of two pulse generators.
//!
//! A pattern is the interference of two periodic generators A and B over a
//! grid of length lcm(A, B): indices hit by both generators are strong,
//! by one are medium, by neither are weak. Patterns use fixed inline
//! storage so generation never allocates.

pub mod variation;

pub use variation::Variation;

use crate::config::MAX_PATTERN_LENGTH;
use crate::error::PipelineError;
use crate::timeline::TimeSignature;

/// Duration emitted for an index hit by both generators.
const STRONG_DURATION: f32 = 2.0;
/// Duration emitted for an index hit by exactly one generator.
const MEDIUM_DURATION: f32 = 1.0;
/// Duration emitted for an index hit by neither generator.
const WEAK_DURATION: f32 = 0.5;

/// Smallest duration a pattern element may hold after normalization.
const MIN_DURATION: f32 = 0.1;

/// Maximum effective swing elongation (30%).
const MAX_SWING_FACTOR: f32 = 0.3;

/// A bounded sequence of rhythmic durations with its musical context.
///
/// Storage is a fixed 64-slot array; patterns are cheap to copy and safe
/// to build on the audio thread.
#[derive(Debug, Clone, Copy)]
pub struct RhythmPattern {
    durations: [f32; MAX_PATTERN_LENGTH],
    len: usize,
    pub time_signature: TimeSignature,
    pub tempo: f64,
    pub swing: f32,
}

impl RhythmPattern {
    /// Create an empty pattern with the given context.
    pub(crate) fn empty(time_signature: TimeSignature, tempo: f64, swing: f32) -> Self {
        Self {
            durations: [0.0; MAX_PATTERN_LENGTH],
            len: 0,
            time_signature,
            tempo,
            swing,
        }
    }

    /// The duration sequence.
    pub fn durations(&self) -> &[f32] {
        &self.durations[..self.len]
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the pattern holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append a duration. Silently ignored once the pattern is full.
    pub(crate) fn push(&mut self, duration: f32) {
        if self.len < MAX_PATTERN_LENGTH {
            self.durations[self.len] = duration;
            self.len += 1;
        }
    }

    pub(crate) fn durations_mut(&mut self) -> &mut [f32] {
        &mut self.durations[..self.len]
    }
}

impl PartialEq for RhythmPattern {
    fn eq(&self, other: &Self) -> bool {
        self.durations() == other.durations()
            && self.time_signature == other.time_signature
            && self.tempo == other.tempo
            && self.swing == other.swing
    }
}

/// Stateless generator for Schillinger resultants.
pub struct PatternGenerator;

impl PatternGenerator {
    /// Generate the resultant of generators `a` and `b`.
    ///
    /// The grid length is `lcm(a, b)` capped at [`MAX_PATTERN_LENGTH`].
    /// `swing` in [0, 1] elongates odd-indexed elements by up to 30%.
    /// Durations are rescaled so the maximum is 2.0 and clamped to a
    /// minimum of 0.1.
    ///
    /// Fails with [`PipelineError::InvalidGenerator`] for non-positive
    /// periods and [`PipelineError::InvalidTempo`] for tempo outside
    /// (0, 300].
    pub fn generate(
        a: i32,
        b: i32,
        tempo: f64,
        time_signature: TimeSignature,
        swing: f32,
    ) -> Result<RhythmPattern, PipelineError> {
        if a <= 0 || b <= 0 {
            return Err(PipelineError::InvalidGenerator { a, b });
        }
        if tempo <= 0.0 || tempo > 300.0 {
            return Err(PipelineError::InvalidTempo(tempo));
        }

        let swing = swing.clamp(0.0, 1.0);
        let mut pattern = RhythmPattern::empty(time_signature, tempo, swing);

        let length = lcm(a as u64, b as u64).min(MAX_PATTERN_LENGTH as u64) as usize;
        let (a, b) = (a as usize, b as usize);

        for i in 0..length {
            let hit_a = i % a == 0;
            let hit_b = i % b == 0;
            let mut duration = match (hit_a, hit_b) {
                (true, true) => STRONG_DURATION,
                (true, false) | (false, true) => MEDIUM_DURATION,
                (false, false) => WEAK_DURATION,
            };
            if i % 2 == 1 {
                duration *= 1.0 + swing * MAX_SWING_FACTOR;
            }
            pattern.push(duration);
        }

        normalize(&mut pattern);
        Ok(pattern)
    }
}

/// Rescale so the maximum duration is 2.0, then clamp the minimum to 0.1.
fn normalize(pattern: &mut RhythmPattern) {
    let max = pattern
        .durations()
        .iter()
        .fold(0.0_f32, |acc, &d| acc.max(d));
    if max <= 0.0 {
        return;
    }
    let scale = STRONG_DURATION / max;
    for d in pattern.durations_mut() {
        *d = (*d * scale).max(MIN_DURATION);
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

fn lcm(a: u64, b: u64) -> u64 {
    a / gcd(a, b) * b
}
