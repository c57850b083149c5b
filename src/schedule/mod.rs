//! Lookahead scheduler — bridges main-thread event production and
//! audio-thread consumption over a lock-free SPSC ring buffer.
//!
//! [`Scheduler`] is the main-thread half: it owns the ring producer and the
//! control atomics (tempo, loop points). [`ScheduleConsumer`] is the
//! audio-thread half: it advances the sample cursor, handles loop
//! wrap-around, and releases events whose dispatch time has arrived. The
//! split mirrors the producer/callback pairing of a lock-free audio engine;
//! neither half ever blocks on the other.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::event::{NoteEvent, ScheduledEvent};

/// Default SPSC queue capacity in events.
pub const DEFAULT_QUEUE_CAPACITY: usize = 2048;

/// Upper bound on accepted tempo changes, in BPM.
const MAX_TEMPO: f64 = 300.0;

/// Cross-thread scalar state. Tempo and loop points are written by the main
/// thread with release ordering; the audio thread reads them relaxed.
struct Shared {
    tempo_bits: AtomicU64,
    loop_start: AtomicI64,
    loop_end: AtomicI64,
    looping: AtomicBool,
    /// Sample cursor, written only by the audio thread.
    current_sample: AtomicI64,
    /// Bumped by `reset()`; the consumer drains the queue when it changes.
    flush_epoch: AtomicU64,
    dropped_events: AtomicU64,
    rejected_tempo_changes: AtomicU64,
}

impl Shared {
    fn new(tempo: f64) -> Self {
        Self {
            tempo_bits: AtomicU64::new(tempo.to_bits()),
            loop_start: AtomicI64::new(0),
            loop_end: AtomicI64::new(0),
            looping: AtomicBool::new(false),
            current_sample: AtomicI64::new(0),
            flush_epoch: AtomicU64::new(0),
            dropped_events: AtomicU64::new(0),
            rejected_tempo_changes: AtomicU64::new(0),
        }
    }

    fn loop_window(&self) -> Option<(i64, i64)> {
        if !self.looping.load(Ordering::Relaxed) {
            return None;
        }
        let start = self.loop_start.load(Ordering::Relaxed);
        let end = self.loop_end.load(Ordering::Relaxed);
        (end > start).then_some((start, end))
    }
}

/// Result of one `schedule()` batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleOutcome {
    /// Events accepted into the queue.
    pub pushed: usize,
    /// Events dropped because the queue filled mid-batch.
    pub dropped: usize,
}

/// Counter snapshot readable from any thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerMetrics {
    pub dropped_events: u64,
    pub rejected_tempo_changes: u64,
    pub queued_events: usize,
}

/// Main-thread half of the scheduler.
pub struct Scheduler {
    producer: Option<HeapProd<ScheduledEvent>>,
    shared: Arc<Shared>,
    lookahead_ms: u32,
    lookahead_samples: i64,
    queue_capacity: usize,
}

impl Scheduler {
    /// Create an unprepared scheduler. [`Scheduler::prepare`] must run
    /// before any `schedule()` call.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            producer: None,
            shared: Arc::new(Shared::new(120.0)),
            lookahead_ms: config.lookahead_ms,
            lookahead_samples: 0,
            queue_capacity: config.queue_capacity,
        }
    }

    /// Allocate the event queue, derive the lookahead in samples, and hand
    /// back the audio-thread half. Callable once.
    pub fn prepare(
        &mut self,
        sample_rate: u32,
        _max_block_size: u32,
    ) -> Result<ScheduleConsumer, PipelineError> {
        if self.producer.is_some() {
            return Err(PipelineError::InvalidConfig(
                "scheduler is already prepared".into(),
            ));
        }
        self.lookahead_samples =
            (self.lookahead_ms as f64 / 1000.0 * sample_rate as f64).round() as i64;

        let (producer, consumer) = HeapRb::<ScheduledEvent>::new(self.queue_capacity).split();
        self.producer = Some(producer);
        Ok(ScheduleConsumer {
            consumer,
            shared: Arc::clone(&self.shared),
            pending: None,
            seen_epoch: 0,
        })
    }

    /// Lookahead offset in samples. Zero until prepared.
    pub fn lookahead_samples(&self) -> i64 {
        self.lookahead_samples
    }

    /// Push a sorted event batch into the queue.
    ///
    /// Each event's dispatch time is its nominal `sample_time` plus the
    /// lookahead; with looping active, events inside the loop window get the
    /// offset folded back into the window so dispatch stays loop-relative.
    /// Once the queue fills, the rest of the batch is dropped — pushing
    /// later events after a gap would break FIFO time ordering — and the
    /// drop is counted, never raised.
    pub fn schedule(&mut self, events: &[NoteEvent]) -> Result<ScheduleOutcome, PipelineError> {
        let lookahead = self.lookahead_samples;
        let loop_window = self.shared.loop_window();
        let producer = self.producer.as_mut().ok_or(PipelineError::NotPrepared)?;

        let mut pushed = 0;
        for (index, event) in events.iter().enumerate() {
            let scheduled_time = match loop_window {
                Some((start, end))
                    if event.sample_time >= start && event.sample_time < end =>
                {
                    start + (event.sample_time - start + lookahead) % (end - start)
                }
                _ => event.sample_time + lookahead,
            };
            let scheduled = ScheduledEvent {
                event: event.clone(),
                scheduled_time,
            };
            if producer.try_push(scheduled).is_err() {
                let dropped = events.len() - index;
                self.shared
                    .dropped_events
                    .fetch_add(dropped as u64, Ordering::Relaxed);
                return Ok(ScheduleOutcome { pushed, dropped });
            }
            pushed += 1;
        }
        Ok(ScheduleOutcome { pushed, dropped: 0 })
    }

    /// Current tempo in BPM.
    pub fn tempo(&self) -> f64 {
        f64::from_bits(self.shared.tempo_bits.load(Ordering::Acquire))
    }

    /// Set the tempo. Values outside (0, 300] are rejected silently and
    /// counted; previously scheduled events keep their sample times.
    pub fn set_tempo(&self, bpm: f64) {
        if bpm <= 0.0 || bpm > MAX_TEMPO {
            self.shared
                .rejected_tempo_changes
                .fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.shared
            .tempo_bits
            .store(bpm.to_bits(), Ordering::Release);
    }

    /// Set the loop window `[start, end)` in samples. Windows with
    /// `end <= start` or a negative start are ignored.
    pub fn set_loop_points(&self, start: i64, end: i64) {
        if start < 0 || end <= start {
            return;
        }
        self.shared.loop_start.store(start, Ordering::Release);
        self.shared.loop_end.store(end, Ordering::Release);
    }

    /// Enable or disable loop playback.
    pub fn set_looping(&self, looping: bool) {
        self.shared.looping.store(looping, Ordering::Release);
    }

    /// Disable looping and zero the loop window.
    pub fn clear_loop_points(&self) {
        self.shared.looping.store(false, Ordering::Release);
        self.shared.loop_start.store(0, Ordering::Release);
        self.shared.loop_end.store(0, Ordering::Release);
    }

    /// Request a flush: on its next `process()` the audio half drains the
    /// queue and zeroes the sample cursor. Tempo and loop points keep their
    /// values. (An SPSC queue cannot be cleared from the producer side.)
    pub fn reset(&self) {
        self.shared.flush_epoch.fetch_add(1, Ordering::Release);
    }

    /// Sample cursor as last published by the audio thread.
    pub fn current_sample(&self) -> i64 {
        self.shared.current_sample.load(Ordering::Acquire)
    }

    /// Metrics snapshot.
    pub fn metrics(&self) -> SchedulerMetrics {
        SchedulerMetrics {
            dropped_events: self.shared.dropped_events.load(Ordering::Relaxed),
            rejected_tempo_changes: self
                .shared
                .rejected_tempo_changes
                .load(Ordering::Relaxed),
            queued_events: self
                .producer
                .as_ref()
                .map_or(0, |p| p.occupied_len()),
        }
    }
}

/// Audio-thread half of the scheduler. Obtained from
/// [`Scheduler::prepare`]; the type split makes use-before-prepare
/// unrepresentable on the audio side.
pub struct ScheduleConsumer {
    consumer: HeapCons<ScheduledEvent>,
    shared: Arc<Shared>,
    /// Head of the queue, popped but not yet due.
    pending: Option<ScheduledEvent>,
    seen_epoch: u64,
}

impl ScheduleConsumer {
    /// Advance the sample cursor by one block, wrapping at the loop end
    /// when looping is active. Also applies any pending flush request.
    pub fn process(&mut self, num_samples: u32) {
        self.apply_flush();

        let mut cursor = self.shared.current_sample.load(Ordering::Relaxed) + num_samples as i64;
        if let Some((start, end)) = self.shared.loop_window() {
            while cursor >= end {
                cursor = start + (cursor - end);
            }
        }
        self.shared.current_sample.store(cursor, Ordering::Release);
    }

    /// Pop the next event whose dispatch time has arrived, or `None`.
    /// Callers drain in a loop until `None`.
    pub fn next_event(&mut self) -> Option<ScheduledEvent> {
        if self.pending.is_none() {
            self.pending = self.consumer.try_pop();
        }
        let cursor = self.shared.current_sample.load(Ordering::Relaxed);
        match &self.pending {
            Some(head) if head.scheduled_time <= cursor => self.pending.take(),
            _ => None,
        }
    }

    /// Current sample cursor.
    pub fn current_sample(&self) -> i64 {
        self.shared.current_sample.load(Ordering::Relaxed)
    }

    /// Events waiting in the queue (excluding a held-back head).
    pub fn queued_events(&self) -> usize {
        self.consumer.occupied_len()
    }

    fn apply_flush(&mut self) {
        let epoch = self.shared.flush_epoch.load(Ordering::Acquire);
        if epoch != self.seen_epoch {
            self.pending = None;
            while self.consumer.try_pop().is_some() {}
            self.shared.current_sample.store(0, Ordering::Release);
            self.seen_epoch = epoch;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{DerivationId, VoicePriority};

    const SAMPLE_RATE: u32 = 44100;

    fn config(capacity: usize) -> PipelineConfig {
        PipelineConfig {
            queue_capacity: capacity,
            ..PipelineConfig::default()
        }
    }

    fn prepared(capacity: usize) -> (Scheduler, ScheduleConsumer) {
        let mut scheduler = Scheduler::new(&config(capacity));
        let consumer = scheduler.prepare(SAMPLE_RATE, 1024).unwrap();
        (scheduler, consumer)
    }

    fn note_on_at(sample_time: i64) -> NoteEvent {
        NoteEvent::note_on(
            sample_time,
            60,
            0.8,
            0,
            22050,
            VoicePriority::Primary,
            DerivationId::new("test"),
        )
    }

    #[test]
    fn lookahead_is_derived_from_sample_rate() {
        let (scheduler, _consumer) = prepared(64);
        // 200 ms at 44100 Hz
        assert_eq!(scheduler.lookahead_samples(), 8820);
    }

    #[test]
    fn schedule_before_prepare_errors() {
        let mut scheduler = Scheduler::new(&config(64));
        let err = scheduler.schedule(&[note_on_at(0)]).unwrap_err();
        assert_eq!(err, PipelineError::NotPrepared);
    }

    #[test]
    fn prepare_twice_errors() {
        let mut scheduler = Scheduler::new(&config(64));
        let _consumer = scheduler.prepare(SAMPLE_RATE, 1024).unwrap();
        assert!(scheduler.prepare(SAMPLE_RATE, 1024).is_err());
    }

    #[test]
    fn lookahead_shifts_dispatch_not_the_event() {
        let (mut scheduler, mut consumer) = prepared(64);
        scheduler.schedule(&[note_on_at(0)]).unwrap();

        // Not due before the lookahead has elapsed.
        consumer.process(8819);
        assert!(consumer.next_event().is_none());

        // Due exactly at lookahead; the event still reads time 0.
        consumer.process(1);
        let dispatched = consumer.next_event().expect("event should be due");
        assert_eq!(dispatched.scheduled_time, 8820);
        assert_eq!(dispatched.event.sample_time, 0);
    }

    #[test]
    fn events_come_out_in_push_order() {
        let (mut scheduler, mut consumer) = prepared(64);
        let batch: Vec<NoteEvent> = (0..10).map(|i| note_on_at(i * 100)).collect();
        scheduler.schedule(&batch).unwrap();

        consumer.process(SAMPLE_RATE); // a full second, everything due
        let mut seen = Vec::new();
        while let Some(scheduled) = consumer.next_event() {
            seen.push(scheduled.event.sample_time);
        }
        let expected: Vec<i64> = (0..10).map(|i| i * 100).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn queue_full_drops_remainder_of_batch() {
        let capacity = 8;
        let (mut scheduler, _consumer) = prepared(capacity);
        let batch: Vec<NoteEvent> = (0..capacity as i64 + 1).map(note_on_at).collect();

        let outcome = scheduler.schedule(&batch).unwrap();
        assert_eq!(outcome.pushed, capacity);
        assert_eq!(outcome.dropped, 1);
        assert_eq!(scheduler.metrics().dropped_events, 1);
    }

    #[test]
    fn drop_count_covers_whole_tail() {
        let (mut scheduler, _consumer) = prepared(4);
        let batch: Vec<NoteEvent> = (0..10).map(note_on_at).collect();

        let outcome = scheduler.schedule(&batch).unwrap();
        assert_eq!(outcome.pushed, 4);
        assert_eq!(outcome.dropped, 6);
        assert_eq!(scheduler.metrics().dropped_events, 6);
    }

    #[test]
    fn tempo_changes_validated() {
        let (scheduler, _consumer) = prepared(8);
        assert_eq!(scheduler.tempo(), 120.0);

        scheduler.set_tempo(140.0);
        assert_eq!(scheduler.tempo(), 140.0);

        scheduler.set_tempo(0.0);
        scheduler.set_tempo(-5.0);
        scheduler.set_tempo(301.0);
        assert_eq!(scheduler.tempo(), 140.0);
        assert_eq!(scheduler.metrics().rejected_tempo_changes, 3);
    }

    #[test]
    fn loop_wraps_cursor_into_window() {
        let (scheduler, mut consumer) = prepared(8);
        scheduler.set_loop_points(1000, 2000);
        scheduler.set_looping(true);

        consumer.process(1500);
        assert_eq!(consumer.current_sample(), 1500);

        // 1500 + 700 = 2200 >= 2000 → wraps to 1000 + 200
        consumer.process(700);
        assert_eq!(consumer.current_sample(), 1200);
        assert!((1000..2000).contains(&consumer.current_sample()));
    }

    #[test]
    fn one_sample_loop_pins_cursor_to_start() {
        let (scheduler, mut consumer) = prepared(8);
        scheduler.set_loop_points(100, 101);
        scheduler.set_looping(true);
        // Park the cursor inside the window first.
        consumer.process(100);
        assert_eq!(consumer.current_sample(), 100);

        consumer.process(1);
        assert_eq!(consumer.current_sample(), 100);
        consumer.process(1);
        assert_eq!(consumer.current_sample(), 100);
    }

    #[test]
    fn clear_loop_points_stops_wrapping() {
        let (scheduler, mut consumer) = prepared(8);
        scheduler.set_loop_points(0, 100);
        scheduler.set_looping(true);
        scheduler.clear_loop_points();

        consumer.process(500);
        assert_eq!(consumer.current_sample(), 500);
    }

    #[test]
    fn degenerate_loop_window_is_ignored() {
        let (scheduler, mut consumer) = prepared(8);
        scheduler.set_loop_points(200, 200); // end <= start: ignored
        scheduler.set_loop_points(-5, 100); // negative start: ignored
        scheduler.set_looping(true);

        consumer.process(1000);
        assert_eq!(consumer.current_sample(), 1000);
    }

    #[test]
    fn loop_wrapped_dispatch_time() {
        // Event at sample 1000 inside a [0, 4000) loop: the 8820-sample
        // lookahead folds back into the window, (1000 + 8820) % 4000 = 1820.
        let (mut scheduler, mut consumer) = prepared(8);
        scheduler.set_loop_points(0, 4000);
        scheduler.set_looping(true);
        scheduler.schedule(&[note_on_at(1000)]).unwrap();

        consumer.process(1819);
        assert!(consumer.next_event().is_none());
        consumer.process(1);
        let scheduled = consumer.next_event().expect("due at wrapped time");
        assert_eq!(scheduled.scheduled_time, 1820);
        assert_eq!(scheduled.event.sample_time, 1000);
    }

    #[test]
    fn reset_drains_queue_and_zeroes_cursor() {
        let (mut scheduler, mut consumer) = prepared(64);
        scheduler.set_tempo(90.0);
        scheduler.schedule(&[note_on_at(0), note_on_at(100)]).unwrap();
        consumer.process(50_000);
        assert!(consumer.next_event().is_some());

        scheduler.reset();
        consumer.process(0);
        assert_eq!(consumer.current_sample(), 0);
        assert!(consumer.next_event().is_none());
        assert_eq!(consumer.queued_events(), 0);
        // Tempo survives a reset.
        assert_eq!(scheduler.tempo(), 90.0);
    }

    #[test]
    fn no_event_dispatches_early() {
        let (mut scheduler, mut consumer) = prepared(64);
        let batch: Vec<NoteEvent> = (0..20).map(|i| note_on_at(i * 500)).collect();
        scheduler.schedule(&batch).unwrap();

        for _ in 0..40 {
            consumer.process(512);
            let cursor = consumer.current_sample();
            while let Some(scheduled) = consumer.next_event() {
                assert!(scheduled.scheduled_time <= cursor);
            }
        }
    }
}
