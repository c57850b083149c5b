//! Event data model — the units flowing from pattern derivation to dispatch.

use std::fmt;
use std::sync::Arc;

/// Opaque provenance tag linking an event back to the derivation that
/// produced it.
///
/// Backed by `Arc<str>` so clones crossing the SPSC queue are a refcount
/// bump, never a heap copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivationId(Arc<str>);

impl DerivationId {
    pub fn new(id: &str) -> Self {
        Self(Arc::from(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DerivationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Voice importance. Lower rank means more important; `Primary` is never
/// stolen while anything less important is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VoicePriority {
    Primary = 0,
    Secondary = 1,
    Tertiary = 2,
}

impl VoicePriority {
    /// Numeric rank: 0 = most important.
    pub fn rank(self) -> u8 {
        self as u8
    }
}

/// One voice's pitch line: what to play every time the rhythm attacks.
#[derive(Debug, Clone)]
pub struct PitchData {
    /// MIDI note number (0–127).
    pub note_number: u8,
    /// Velocity in 0.0–1.0.
    pub velocity: f32,
    /// Note length in beats. Must be positive.
    pub duration_beats: f64,
    pub priority: VoicePriority,
    pub derivation_id: DerivationId,
}

/// Attack points in beats (ordered, non-negative).
#[derive(Debug, Clone)]
pub struct RhythmData {
    pub attack_points: Vec<f64>,
    pub derivation_id: DerivationId,
}

/// Whether an event starts or ends a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteEventKind {
    /// Starts a note that sustains for `duration_samples`.
    NoteOn { duration_samples: i64 },
    /// Ends the note started by the matching note-on.
    NoteOff,
}

/// A single sample-accurate note event.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteEvent {
    /// Nominal time in samples from timeline start. Never negative.
    pub sample_time: i64,
    /// MIDI note number (0–127).
    pub note_number: u8,
    /// Velocity in 0.0–1.0 for note-ons; 0.0 for note-offs.
    pub velocity: f32,
    /// Voice slot this event targets, in `[0, max_polyphony)`.
    pub voice_id: usize,
    pub kind: NoteEventKind,
    pub priority: VoicePriority,
    pub derivation_id: DerivationId,
}

impl NoteEvent {
    /// Create a note-on.
    pub fn note_on(
        sample_time: i64,
        note_number: u8,
        velocity: f32,
        voice_id: usize,
        duration_samples: i64,
        priority: VoicePriority,
        derivation_id: DerivationId,
    ) -> Self {
        Self {
            sample_time,
            note_number,
            velocity,
            voice_id,
            kind: NoteEventKind::NoteOn { duration_samples },
            priority,
            derivation_id,
        }
    }

    /// Create the note-off matching a note-on.
    pub fn note_off_for(on: &NoteEvent) -> Self {
        let duration = match on.kind {
            NoteEventKind::NoteOn { duration_samples } => duration_samples,
            NoteEventKind::NoteOff => 0,
        };
        Self {
            sample_time: on.sample_time + duration,
            note_number: on.note_number,
            velocity: 0.0,
            voice_id: on.voice_id,
            kind: NoteEventKind::NoteOff,
            priority: on.priority,
            derivation_id: on.derivation_id.clone(),
        }
    }

    /// Whether this is a note-on.
    pub fn is_note_on(&self) -> bool {
        matches!(self.kind, NoteEventKind::NoteOn { .. })
    }
}

/// A note event plus the time at which the scheduler dispatches it.
///
/// The dispatch time differs from the event's nominal `sample_time`: the
/// lookahead offset (and loop wrapping, when active) shifts dispatch only.
/// Consumers reading `event.sample_time` always see the original value.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    pub event: NoteEvent,
    pub scheduled_time: i64,
}
