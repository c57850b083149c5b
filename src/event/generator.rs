//! Main-thread event generation: timeline × pitch lines × rhythm → sorted
//! note-on/note-off stream.

use super::types::{NoteEvent, NoteEventKind, PitchData, RhythmData};
use crate::error::PipelineError;
use crate::timeline::TimelineIr;

/// Stateless generator for sample-accurate note-event streams.
pub struct NoteEventGenerator;

impl NoteEventGenerator {
    /// Generate the sorted event stream for one `schedule()` batch.
    ///
    /// Every attack point triggers every pitch line. Voice ids are seeded
    /// round-robin in note-on appearance order; the runtime
    /// [`VoiceManager`](crate::voice::VoiceManager) refines them under the
    /// polyphony cap. Each note-on gets a matching note-off at
    /// `sample_time + duration_samples`.
    ///
    /// Overlapping attacks on the same pitch keep legato retrigger
    /// semantics: the earlier note-off still fires at its computed time,
    /// even if that lands after the next note-on.
    pub fn generate(
        timeline: &TimelineIr,
        pitches: &[PitchData],
        rhythm: &RhythmData,
        max_polyphony: usize,
    ) -> Result<Vec<NoteEvent>, PipelineError> {
        if max_polyphony == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_polyphony must be at least 1".into(),
            ));
        }
        for pitch in pitches {
            if pitch.duration_beats <= 0.0 {
                return Err(PipelineError::InvalidDuration(pitch.duration_beats));
            }
        }
        for &attack in &rhythm.attack_points {
            if attack < 0.0 {
                return Err(PipelineError::InvalidAttack(attack));
            }
        }

        let mut events = Vec::with_capacity(pitches.len() * rhythm.attack_points.len() * 2);

        // Pass 1: note-ons, pitch-major, with provisional voice ids.
        for (i, pitch) in pitches.iter().enumerate() {
            if pitch.note_number > 127 {
                return Err(PipelineError::InvalidPitch(pitch.note_number as i32));
            }
            let duration_samples = timeline.beats_to_samples(pitch.duration_beats);
            for &attack in &rhythm.attack_points {
                let sample_time = timeline.beats_to_samples(attack);
                events.push(NoteEvent::note_on(
                    sample_time,
                    pitch.note_number,
                    pitch.velocity.clamp(0.0, 1.0),
                    i % max_polyphony,
                    duration_samples,
                    pitch.priority,
                    pitch.derivation_id.clone(),
                ));
            }
        }

        // Pass 2: reassign voice ids round-robin in appearance order.
        for (n, event) in events.iter_mut().enumerate() {
            event.voice_id = n % max_polyphony;
        }

        // Pass 3: synthesize note-offs. Appending after all note-ons means
        // the stable sort below keeps note-ons first on time ties.
        let offs: Vec<NoteEvent> = events.iter().map(NoteEvent::note_off_for).collect();
        events.extend(offs);

        // Pass 4: stable sort by nominal time only.
        events.sort_by_key(|e| e.sample_time);

        // Pass 5: the stream must satisfy its invariants by construction;
        // a failure here is a bug, so release builds return an empty batch
        // rather than feed the scheduler a malformed stream.
        if let Err(e) = validate_events(&events, max_polyphony) {
            debug_assert!(false, "generated stream failed validation: {e}");
            return Ok(Vec::new());
        }

        Ok(events)
    }
}

/// Check a generated stream against its invariants: sorted times, fields in
/// range, and a one-to-one pairing between note-ons and note-offs.
pub fn validate_events(events: &[NoteEvent], max_polyphony: usize) -> Result<(), PipelineError> {
    let mut expected_offs: Vec<(i64, u8, usize)> = Vec::new();
    let mut actual_offs: Vec<(i64, u8, usize)> = Vec::new();

    let mut previous_time = i64::MIN;
    for event in events {
        if event.sample_time < previous_time {
            return Err(PipelineError::InvariantViolation(format!(
                "events out of order at sample {}",
                event.sample_time
            )));
        }
        previous_time = event.sample_time;

        if event.sample_time < 0 {
            return Err(PipelineError::InvariantViolation(
                "negative sample time".into(),
            ));
        }
        if event.note_number > 127 {
            return Err(PipelineError::InvariantViolation(format!(
                "note number {} out of range",
                event.note_number
            )));
        }
        if event.voice_id >= max_polyphony {
            return Err(PipelineError::InvariantViolation(format!(
                "voice id {} exceeds polyphony cap {max_polyphony}",
                event.voice_id
            )));
        }
        match event.kind {
            NoteEventKind::NoteOn { duration_samples } => {
                if !(0.0..=1.0).contains(&event.velocity) {
                    return Err(PipelineError::InvariantViolation(format!(
                        "note-on velocity {} out of range",
                        event.velocity
                    )));
                }
                expected_offs.push((
                    event.sample_time + duration_samples,
                    event.note_number,
                    event.voice_id,
                ));
            }
            NoteEventKind::NoteOff => {
                actual_offs.push((event.sample_time, event.note_number, event.voice_id));
            }
        }
    }

    expected_offs.sort_unstable();
    actual_offs.sort_unstable();
    if expected_offs != actual_offs {
        return Err(PipelineError::InvariantViolation(
            "note-on/note-off pairing mismatch".into(),
        ));
    }
    Ok(())
}
