//! Pipeline assembly — wires the scheduler, voice pool, and analyzer
//! across the thread boundary.
//!
//! [`Pipeline`] lives on the main thread; `prepare()` hands back the
//! [`AudioThread`] half, which owns everything the audio callback touches.
//! The pipeline emits note events only — an external synth consumes them
//! through the per-block callback.

use crate::analysis::{AnalyzerHandle, AudioAnalyzer};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::event::{NoteEvent, NoteEventKind};
use crate::schedule::{ScheduleConsumer, Scheduler, SchedulerMetrics};
use crate::voice::{VoiceManager, VoiceStats};

/// Main-thread half: event production, scheduling, telemetry.
pub struct Pipeline {
    scheduler: Scheduler,
    analyzer: Option<AnalyzerHandle>,
    voice_stats: Option<VoiceStats>,
    config: PipelineConfig,
}

impl Pipeline {
    /// Create an unprepared pipeline from a validated config.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            scheduler: Scheduler::new(&config),
            analyzer: None,
            voice_stats: None,
            config,
        })
    }

    /// Allocate queues and state and hand back the audio-thread half.
    pub fn prepare(
        &mut self,
        sample_rate: u32,
        channels: usize,
        max_block_size: u32,
    ) -> Result<AudioThread, PipelineError> {
        let consumer = self.scheduler.prepare(sample_rate, max_block_size)?;
        let voices = VoiceManager::new(self.config.max_polyphony);
        let analyzer = AudioAnalyzer::new(sample_rate);

        self.voice_stats = Some(voices.stats());
        self.analyzer = Some(analyzer.handle());

        Ok(AudioThread {
            consumer,
            voices,
            analyzer,
            channels,
        })
    }

    /// The scheduler (producer half).
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Push an event batch; see [`Scheduler::schedule`].
    pub fn schedule(
        &mut self,
        events: &[NoteEvent],
    ) -> Result<crate::schedule::ScheduleOutcome, PipelineError> {
        self.scheduler.schedule(events)
    }

    /// Analyzer telemetry reader. `None` until prepared.
    pub fn analyzer(&self) -> Option<&AnalyzerHandle> {
        self.analyzer.as_ref()
    }

    /// Voice occupancy and steal statistics. `None` until prepared.
    pub fn voice_stats(&self) -> Option<&VoiceStats> {
        self.voice_stats.as_ref()
    }

    /// Scheduler counters.
    pub fn scheduler_metrics(&self) -> SchedulerMetrics {
        self.scheduler.metrics()
    }
}

/// Audio-thread half: drains due events, dispatches them to the voice
/// pool, and feeds the analyzer. No allocation, locking, or error paths.
pub struct AudioThread {
    consumer: ScheduleConsumer,
    voices: VoiceManager,
    analyzer: AudioAnalyzer,
    channels: usize,
}

impl AudioThread {
    /// Run one audio callback: analyze the input block, advance the sample
    /// cursor, then drain every due event into `on_event`.
    ///
    /// Note-ons are re-homed by the voice pool (the generator's voice id is
    /// only a hint); the event passed to `on_event` carries the voice that
    /// actually sounds. Note-offs release through the note-match check, so
    /// a stale off for a stolen voice is dropped by the pool, not by us.
    pub fn process_block(
        &mut self,
        input: &[f32],
        num_frames: u32,
        on_event: &mut dyn FnMut(&NoteEvent),
    ) {
        self.analyzer.process(input, self.channels);
        self.consumer.process(num_frames);

        while let Some(scheduled) = self.consumer.next_event() {
            let mut event = scheduled.event;
            match event.kind {
                NoteEventKind::NoteOn { .. } => {
                    event.voice_id = self.voices.allocate_hinted(
                        event.voice_id,
                        event.note_number,
                        event.priority,
                        scheduled.scheduled_time,
                        event.derivation_id.clone(),
                    );
                    on_event(&event);
                }
                NoteEventKind::NoteOff => {
                    self.voices.deallocate(event.voice_id, event.note_number);
                    on_event(&event);
                }
            }
        }
    }

    /// Release every sounding voice (external cancellation).
    pub fn all_notes_off(&mut self) {
        self.voices.deallocate_all();
    }

    /// The voice pool.
    pub fn voices(&self) -> &VoiceManager {
        &self.voices
    }

    /// Current sample cursor.
    pub fn current_sample(&self) -> i64 {
        self.consumer.current_sample()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{DerivationId, NoteEventGenerator, PitchData, RhythmData, VoicePriority};
    use crate::timeline::{TimeSignature, TimelineIr};

    const SAMPLE_RATE: u32 = 44100;

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            max_polyphony: 4,
            ..PipelineConfig::default()
        }
    }

    fn one_bar_events() -> Vec<NoteEvent> {
        let timeline =
            TimelineIr::new(120.0, TimeSignature::FOUR_FOUR, 0.0, 4.0, SAMPLE_RATE).unwrap();
        let pitch = PitchData {
            note_number: 60,
            velocity: 0.8,
            duration_beats: 1.0,
            priority: VoicePriority::Primary,
            derivation_id: DerivationId::new("bar"),
        };
        let rhythm = RhythmData {
            attack_points: vec![0.0, 1.0, 2.0, 3.0],
            derivation_id: DerivationId::new("bar"),
        };
        NoteEventGenerator::generate(&timeline, &[pitch], &rhythm, 4).unwrap()
    }

    #[test]
    fn prepare_exposes_telemetry_handles() {
        let mut pipeline = Pipeline::new(small_config()).unwrap();
        assert!(pipeline.analyzer().is_none());
        assert!(pipeline.voice_stats().is_none());

        let _audio = pipeline.prepare(SAMPLE_RATE, 2, 1024).unwrap();
        assert!(pipeline.analyzer().is_some());
        assert!(pipeline.voice_stats().is_some());
    }

    #[test]
    fn rejects_invalid_config() {
        let config = PipelineConfig {
            max_polyphony: 0,
            ..PipelineConfig::default()
        };
        assert!(Pipeline::new(config).is_err());
    }

    #[test]
    fn events_flow_end_to_end() {
        let mut pipeline = Pipeline::new(small_config()).unwrap();
        let mut audio = pipeline.prepare(SAMPLE_RATE, 1, 1024).unwrap();

        pipeline.schedule(&one_bar_events()).unwrap();

        let silence = vec![0.0f32; 1024];
        let mut dispatched = Vec::new();
        // Four beats plus 200 ms lookahead is well under 3 s of audio.
        for _ in 0..(SAMPLE_RATE as usize * 3 / 1024) {
            audio.process_block(&silence, 1024, &mut |e| dispatched.push(e.clone()));
        }

        assert_eq!(dispatched.len(), 8);
        let ons = dispatched.iter().filter(|e| e.is_note_on()).count();
        assert_eq!(ons, 4);
        // Everything released by the end.
        assert_eq!(audio.voices().active_voice_count(), 0);
        assert_eq!(
            pipeline.voice_stats().unwrap().steal_stats().spurious_offs,
            0
        );
    }

    #[test]
    fn all_notes_off_silences_pool() {
        let mut pipeline = Pipeline::new(small_config()).unwrap();
        let mut audio = pipeline.prepare(SAMPLE_RATE, 1, 1024).unwrap();
        pipeline.schedule(&one_bar_events()).unwrap();

        let silence = vec![0.0f32; 1024];
        // Run just far enough for the first note-on (8820 + epsilon).
        for _ in 0..10 {
            audio.process_block(&silence, 1024, &mut |_| {});
        }
        assert!(audio.voices().active_voice_count() > 0);

        audio.all_notes_off();
        assert_eq!(audio.voices().active_voice_count(), 0);
    }
}
