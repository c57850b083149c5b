//! Bounded voice pool with priority-aware stealing.
//!
//! The pool is written only by the audio thread. Occupancy and steal
//! counters live in shared atomics so the main thread can poll statistics
//! without touching the pool itself.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::event::{DerivationId, VoicePriority};

/// One slot in the voice pool.
#[derive(Debug, Clone)]
pub struct Voice {
    id: usize,
    active: bool,
    note_number: u8,
    priority: VoicePriority,
    /// Sample time of the allocation, for age-based steal tie-breaks.
    allocation_sample: i64,
    derivation_id: Option<DerivationId>,
}

impl Voice {
    fn inactive(id: usize) -> Self {
        Self {
            id,
            active: false,
            note_number: 0,
            priority: VoicePriority::Tertiary,
            allocation_sample: 0,
            derivation_id: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn note_number(&self) -> u8 {
        self.note_number
    }

    pub fn priority(&self) -> VoicePriority {
        self.priority
    }

    pub fn allocation_sample(&self) -> i64 {
        self.allocation_sample
    }

    pub fn derivation_id(&self) -> Option<&DerivationId> {
        self.derivation_id.as_ref()
    }
}

/// Steal counters, keyed on the stolen voice's prior priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StealStats {
    pub total_steals: u64,
    pub primary_steals: u64,
    pub secondary_steals: u64,
    pub tertiary_steals: u64,
    pub spurious_offs: u64,
}

/// Atomic counters shared between the pool and stat readers.
#[derive(Default)]
struct Counters {
    active: AtomicUsize,
    peak_active: AtomicUsize,
    total_steals: AtomicU64,
    primary_steals: AtomicU64,
    secondary_steals: AtomicU64,
    tertiary_steals: AtomicU64,
    spurious_offs: AtomicU64,
}

/// Read-only statistics handle, cloneable onto any thread.
#[derive(Clone)]
pub struct VoiceStats {
    counters: Arc<Counters>,
    max_polyphony: usize,
}

impl VoiceStats {
    /// Voices currently sounding.
    pub fn active_voice_count(&self) -> usize {
        self.counters.active.load(Ordering::Acquire)
    }

    /// Highest simultaneous voice count observed.
    pub fn peak_voice_count(&self) -> usize {
        self.counters.peak_active.load(Ordering::Relaxed)
    }

    /// Occupancy in [0, 1].
    pub fn voice_usage(&self) -> f64 {
        self.active_voice_count() as f64 / self.max_polyphony as f64
    }

    /// Steal and spurious-off counters.
    pub fn steal_stats(&self) -> StealStats {
        StealStats {
            total_steals: self.counters.total_steals.load(Ordering::Relaxed),
            primary_steals: self.counters.primary_steals.load(Ordering::Relaxed),
            secondary_steals: self.counters.secondary_steals.load(Ordering::Relaxed),
            tertiary_steals: self.counters.tertiary_steals.load(Ordering::Relaxed),
            spurious_offs: self.counters.spurious_offs.load(Ordering::Relaxed),
        }
    }
}

/// Fixed pool of voices with priority-based stealing. Audio-thread only;
/// allocation never fails while the pool has at least one slot.
pub struct VoiceManager {
    voices: Vec<Voice>,
    counters: Arc<Counters>,
}

impl VoiceManager {
    /// Create a pool of `max_polyphony` inactive voices.
    pub fn new(max_polyphony: usize) -> Self {
        assert!(max_polyphony >= 1, "voice pool needs at least one slot");
        Self {
            voices: (0..max_polyphony).map(Voice::inactive).collect(),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Number of slots.
    pub fn max_polyphony(&self) -> usize {
        self.voices.len()
    }

    /// Clone a statistics handle for other threads.
    pub fn stats(&self) -> VoiceStats {
        VoiceStats {
            counters: Arc::clone(&self.counters),
            max_polyphony: self.voices.len(),
        }
    }

    /// Allocate a voice for a note-on. Prefers the lowest-id free slot;
    /// with the pool full, steals by priority then age:
    /// less-important-and-oldest first, then an older same-priority voice,
    /// then the globally oldest as a last resort.
    pub fn allocate(
        &mut self,
        note_number: u8,
        priority: VoicePriority,
        allocation_sample: i64,
        derivation_id: DerivationId,
    ) -> usize {
        if let Some(free) = self.voices.iter().position(|v| !v.active) {
            self.activate(free, note_number, priority, allocation_sample, derivation_id);
            self.counters.active.fetch_add(1, Ordering::Release);
            self.update_peak();
            return free;
        }

        let victim = self
            .steal_less_important(priority)
            .or_else(|| self.steal_same_priority(priority, allocation_sample))
            .unwrap_or_else(|| self.oldest_voice());

        self.record_steal(self.voices[victim].priority);
        self.activate(victim, note_number, priority, allocation_sample, derivation_id);
        victim
    }

    /// Allocate preferring a seeded slot. Event generation assigns
    /// provisional voice ids; honoring a free hint keeps the generator's
    /// note-offs pointing at the slot that actually sounds. A busy hint
    /// falls back to the normal allocation path.
    pub fn allocate_hinted(
        &mut self,
        hint: usize,
        note_number: u8,
        priority: VoicePriority,
        allocation_sample: i64,
        derivation_id: DerivationId,
    ) -> usize {
        if self.voices.get(hint).is_some_and(|v| !v.active) {
            self.activate(hint, note_number, priority, allocation_sample, derivation_id);
            self.counters.active.fetch_add(1, Ordering::Release);
            self.update_peak();
            return hint;
        }
        self.allocate(note_number, priority, allocation_sample, derivation_id)
    }

    /// Release a voice on note-off. The note number must match the voice's
    /// current note — a stale off for a voice that has since been stolen is
    /// discarded and counted as spurious.
    pub fn deallocate(&mut self, voice_id: usize, note_number: u8) {
        match self.voices.get_mut(voice_id) {
            Some(voice) if voice.active && voice.note_number == note_number => {
                voice.active = false;
                voice.derivation_id = None;
                self.counters.active.fetch_sub(1, Ordering::Release);
            }
            _ => {
                self.counters.spurious_offs.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Release every active voice. Used for external cancellation
    /// (all-notes-off); none of these count as spurious.
    pub fn deallocate_all(&mut self) {
        for voice in &mut self.voices {
            if voice.active {
                voice.active = false;
                voice.derivation_id = None;
                self.counters.active.fetch_sub(1, Ordering::Release);
            }
        }
    }

    /// Voices currently sounding.
    pub fn active_voice_count(&self) -> usize {
        self.counters.active.load(Ordering::Acquire)
    }

    /// Iterate over active voices without allocating.
    pub fn active_voices(&self) -> impl Iterator<Item = &Voice> {
        self.voices.iter().filter(|v| v.active)
    }

    fn activate(
        &mut self,
        index: usize,
        note_number: u8,
        priority: VoicePriority,
        allocation_sample: i64,
        derivation_id: DerivationId,
    ) {
        let voice = &mut self.voices[index];
        voice.active = true;
        voice.note_number = note_number;
        voice.priority = priority;
        voice.allocation_sample = allocation_sample;
        voice.derivation_id = Some(derivation_id);
    }

    /// Oldest active voice whose priority is strictly less important than
    /// the requester's.
    fn steal_less_important(&self, priority: VoicePriority) -> Option<usize> {
        self.voices
            .iter()
            .filter(|v| v.active && v.priority.rank() > priority.rank())
            .min_by_key(|v| (v.allocation_sample, v.id))
            .map(|v| v.id)
    }

    /// Oldest same-priority voice, stolen only when the requester is newer.
    fn steal_same_priority(
        &self,
        priority: VoicePriority,
        allocation_sample: i64,
    ) -> Option<usize> {
        let oldest = self
            .voices
            .iter()
            .filter(|v| v.active && v.priority == priority)
            .min_by_key(|v| (v.allocation_sample, v.id))?;
        (allocation_sample > oldest.allocation_sample).then_some(oldest.id)
    }

    /// Last resort: the globally oldest voice. The pool is full here, so a
    /// minimum always exists.
    fn oldest_voice(&self) -> usize {
        self.voices
            .iter()
            .min_by_key(|v| (v.allocation_sample, v.id))
            .map(|v| v.id)
            .unwrap_or(0)
    }

    fn record_steal(&self, prior: VoicePriority) {
        self.counters.total_steals.fetch_add(1, Ordering::Relaxed);
        let counter = match prior {
            VoicePriority::Primary => &self.counters.primary_steals,
            VoicePriority::Secondary => &self.counters.secondary_steals,
            VoicePriority::Tertiary => &self.counters.tertiary_steals,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn update_peak(&self) {
        let active = self.counters.active.load(Ordering::Relaxed);
        self.counters
            .peak_active
            .fetch_max(active, Ordering::Relaxed);
    }
}
