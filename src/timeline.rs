//! Static playback-context descriptor and beat → sample conversion.
//!
//! A [`TimelineIr`] is constructed on the main thread and is immutable for
//! the lifetime of a `schedule()` call. All musical-time arithmetic converts
//! to integer sample offsets here, at the boundary, so downstream components
//! deal exclusively in samples.

use crate::error::PipelineError;

/// Musical time signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl TimeSignature {
    pub const FOUR_FOUR: TimeSignature = TimeSignature {
        numerator: 4,
        denominator: 4,
    };
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::FOUR_FOUR
    }
}

/// Immutable descriptor of a playback context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineIr {
    tempo: f64,
    time_signature: TimeSignature,
    start_beat: f64,
    /// End of the timeline in beats. `0.0` means open-ended.
    end_beat: f64,
    sample_rate: u32,
}

impl TimelineIr {
    /// Create a timeline descriptor.
    ///
    /// Fails with [`PipelineError::InvalidTimeline`] if `tempo` or
    /// `sample_rate` is non-positive.
    pub fn new(
        tempo: f64,
        time_signature: TimeSignature,
        start_beat: f64,
        end_beat: f64,
        sample_rate: u32,
    ) -> Result<Self, PipelineError> {
        if tempo <= 0.0 {
            return Err(PipelineError::InvalidTimeline(format!(
                "tempo must be positive, got {tempo}"
            )));
        }
        if sample_rate == 0 {
            return Err(PipelineError::InvalidTimeline(
                "sample rate must be positive".into(),
            ));
        }
        Ok(Self {
            tempo,
            time_signature,
            start_beat,
            end_beat,
            sample_rate,
        })
    }

    /// Tempo in beats per minute.
    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    /// Time signature.
    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    /// First beat of the playback window.
    pub fn start_beat(&self) -> f64 {
        self.start_beat
    }

    /// Last beat of the playback window (`0.0` = open-ended).
    pub fn end_beat(&self) -> f64 {
        self.end_beat
    }

    /// Audio sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Convert a beat position to a sample offset.
    ///
    /// Formula: `round(beats * 60 / tempo * sample_rate)`.
    pub fn beats_to_samples(&self, beats: f64) -> i64 {
        (beats * 60.0 / self.tempo * self.sample_rate as f64).round() as i64
    }
}
