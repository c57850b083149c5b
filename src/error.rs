//! Error types for the pipeline.
//!
//! Errors surface only on the main thread. Audio-thread paths never fail;
//! they increment atomic counters instead (see the metrics on
//! [`crate::schedule::Scheduler`] and [`crate::voice::VoiceManager`]).

use std::fmt;

/// An error raised by a main-thread pipeline operation.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// A Schillinger generator period was zero or negative.
    InvalidGenerator { a: i32, b: i32 },
    /// Tempo outside the accepted range (0, 300].
    InvalidTempo(f64),
    /// Timeline descriptor with a non-positive tempo or sample rate.
    InvalidTimeline(String),
    /// MIDI note number outside 0..=127.
    InvalidPitch(i32),
    /// Rhythm attack point at a negative beat.
    InvalidAttack(f64),
    /// Non-positive note duration.
    InvalidDuration(f64),
    /// Configuration value outside its documented range.
    InvalidConfig(String),
    /// `schedule()` or `process()` called before `prepare()`.
    NotPrepared,
    /// The generated event stream failed internal validation.
    InvariantViolation(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::InvalidGenerator { a, b } => {
                write!(f, "generator periods must be positive, got ({a}, {b})")
            }
            PipelineError::InvalidTempo(bpm) => {
                write!(f, "tempo must be in (0, 300] BPM, got {bpm}")
            }
            PipelineError::InvalidTimeline(msg) => write!(f, "invalid timeline: {msg}"),
            PipelineError::InvalidPitch(n) => {
                write!(f, "note number must be in 0..=127, got {n}")
            }
            PipelineError::InvalidAttack(beat) => {
                write!(f, "attack point must be non-negative, got beat {beat}")
            }
            PipelineError::InvalidDuration(beats) => {
                write!(f, "note duration must be positive, got {beats} beats")
            }
            PipelineError::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            PipelineError::NotPrepared => {
                write!(f, "scheduler used before prepare() was called")
            }
            PipelineError::InvariantViolation(msg) => {
                write!(f, "event stream invariant violated: {msg}")
            }
        }
    }
}

impl std::error::Error for PipelineError {}
