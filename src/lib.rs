//! Resultant — a realtime pipeline turning Schillinger interference patterns
//! into sample-accurate note events.
//!
//! The crate is split along the main-thread / audio-thread boundary:
//! pattern and event generation happen on the main thread; scheduling,
//! voice allocation, and audio analysis run on the audio thread. The two
//! sides communicate through a lock-free SPSC queue and atomic scalars.

pub mod analysis;
pub mod config;
pub mod error;
pub mod event;
pub mod pattern;
pub mod pipeline;
pub mod schedule;
pub mod timeline;
pub mod voice;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use timeline::{TimeSignature, TimelineIr};
