//! Note-event data model and main-thread event generation.
//!
//! [`NoteEventGenerator`] turns a timeline, pitch lines, and a rhythm attack
//! list into a sorted stream of note-on/note-off pairs with sample-accurate
//! times. The stream is the sole input to the scheduler; once it leaves this
//! module it is never re-sorted.

pub mod generator;
pub mod types;

pub use generator::{validate_events, NoteEventGenerator};
pub use types::{
    DerivationId, NoteEvent, NoteEventKind, PitchData, RhythmData, ScheduledEvent, VoicePriority,
};
