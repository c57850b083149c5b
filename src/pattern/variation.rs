//! Pure transformations over an existing rhythm pattern.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::RhythmPattern;
use crate::config::MAX_PATTERN_LENGTH;

/// Smallest duration a transformed element may hold.
const MIN_DURATION: f32 = 0.1;

/// A closed set of pattern transformations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variation {
    /// Double every duration.
    Augmentation,
    /// Halve every duration.
    Diminution,
    /// Reverse the element order.
    Retrograde,
    /// Rotate the sequence left by one position.
    Rotation,
    /// Split elements longer than 1.0 into two halves, while space permits.
    Fragmentation,
    /// Mirror durations around 1.0 (`d → 2 − d`) for nonzero elements.
    Inversion,
    /// Multiply each element by a uniform factor in [0.5, 1.0] drawn from
    /// a seeded ChaCha8 stream. The same seed reproduces the same result.
    Randomization { seed: u64 },
}

impl Variation {
    /// Apply this variation to `pattern`, returning the transformed copy.
    /// The input is never modified.
    pub fn apply(self, pattern: &RhythmPattern) -> RhythmPattern {
        let mut out = *pattern;
        match self {
            Variation::Augmentation => {
                for d in out.durations_mut() {
                    *d = (*d * 2.0).max(MIN_DURATION);
                }
            }
            Variation::Diminution => {
                for d in out.durations_mut() {
                    *d = (*d * 0.5).max(MIN_DURATION);
                }
            }
            Variation::Retrograde => {
                out.durations_mut().reverse();
            }
            Variation::Rotation => {
                out.durations_mut().rotate_left(1);
            }
            Variation::Fragmentation => {
                out = fragment(pattern);
            }
            Variation::Inversion => {
                for d in out.durations_mut() {
                    if *d != 0.0 {
                        *d = (2.0 - *d).max(MIN_DURATION);
                    }
                }
            }
            Variation::Randomization { seed } => {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                for d in out.durations_mut() {
                    let factor: f32 = rng.gen_range(0.5..=1.0);
                    *d = (*d * factor).max(MIN_DURATION);
                }
            }
        }
        out
    }
}

/// Split every element above 1.0 into halves, as long as the pattern has
/// room. Elements that would overflow the fixed storage stay whole.
fn fragment(pattern: &RhythmPattern) -> RhythmPattern {
    let mut out = RhythmPattern::empty(pattern.time_signature, pattern.tempo, pattern.swing);
    for &d in pattern.durations() {
        if d > 1.0 && out.len() + 2 <= MAX_PATTERN_LENGTH {
            out.push(d * 0.5);
            out.push(d * 0.5);
        } else {
            out.push(d);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::PatternGenerator;
    use crate::timeline::TimeSignature;
    use assert_approx_eq::assert_approx_eq;

    fn base() -> RhythmPattern {
        PatternGenerator::generate(3, 2, 120.0, TimeSignature::FOUR_FOUR, 0.0).unwrap()
    }

    #[test]
    fn retrograde_twice_is_identity() {
        let pattern = base();
        let back = Variation::Retrograde.apply(&Variation::Retrograde.apply(&pattern));
        assert_eq!(back, pattern);
    }

    #[test]
    fn retrograde_reverses() {
        let pattern = base();
        let rev = Variation::Retrograde.apply(&pattern);
        let expected: Vec<f32> = pattern.durations().iter().rev().copied().collect();
        assert_eq!(rev.durations(), expected.as_slice());
    }

    #[test]
    fn augmentation_then_diminution_is_identity() {
        // Clamp at 0.1 cannot trigger: every base duration is >= 0.5.
        let pattern = base();
        let round = Variation::Diminution.apply(&Variation::Augmentation.apply(&pattern));
        for (a, b) in round.durations().iter().zip(pattern.durations()) {
            assert_approx_eq!(*a, *b, 1e-6);
        }
    }

    #[test]
    fn diminution_clamps_to_minimum() {
        let pattern = base();
        let small = Variation::Diminution.apply(&Variation::Diminution.apply(&pattern));
        // 0.5 → 0.25 → 0.125; one more halving clamps.
        let tiny = Variation::Diminution.apply(&small);
        assert!(tiny.durations().iter().all(|&d| d >= 0.1));
    }

    #[test]
    fn rotation_shifts_left_by_one() {
        let pattern = base();
        let rotated = Variation::Rotation.apply(&pattern);
        assert_approx_eq!(rotated.durations()[0], pattern.durations()[1], 1e-6);
        assert_approx_eq!(
            *rotated.durations().last().unwrap(),
            pattern.durations()[0],
            1e-6
        );
    }

    #[test]
    fn inversion_mirrors_around_one() {
        let pattern = base();
        let inverted = Variation::Inversion.apply(&pattern);
        for (inv, orig) in inverted.durations().iter().zip(pattern.durations()) {
            assert_approx_eq!(*inv, (2.0 - orig).max(0.1), 1e-6);
        }
    }

    #[test]
    fn fragmentation_splits_long_elements() {
        let pattern = base(); // [2.0, 0.5, 1.0, 1.0, 1.0, 0.5]
        let fragged = Variation::Fragmentation.apply(&pattern);
        // Only the 2.0 splits; 1.0 is not strictly greater than 1.0.
        assert_eq!(fragged.len(), pattern.len() + 1);
        assert_approx_eq!(fragged.durations()[0], 1.0, 1e-6);
        assert_approx_eq!(fragged.durations()[1], 1.0, 1e-6);
    }

    #[test]
    fn fragmentation_respects_capacity() {
        let pattern =
            PatternGenerator::generate(63, 64, 120.0, TimeSignature::FOUR_FOUR, 0.0).unwrap();
        assert_eq!(pattern.len(), 64);
        let fragged = Variation::Fragmentation.apply(&pattern);
        assert_eq!(fragged.len(), 64);
    }

    #[test]
    fn randomization_is_seeded() {
        let pattern = base();
        let first = Variation::Randomization { seed: 42 }.apply(&pattern);
        let again = Variation::Randomization { seed: 42 }.apply(&pattern);
        assert_eq!(first, again);

        let other = Variation::Randomization { seed: 43 }.apply(&pattern);
        assert_ne!(first.durations(), other.durations());
    }

    #[test]
    fn randomization_factors_in_range() {
        let pattern = base();
        let random = Variation::Randomization { seed: 7 }.apply(&pattern);
        for (r, o) in random.durations().iter().zip(pattern.durations()) {
            assert!(*r <= *o + 1e-6, "factor must not exceed 1.0");
            assert!(*r >= o * 0.5 - 1e-6, "factor must not drop below 0.5");
        }
    }

    #[test]
    fn variations_do_not_mutate_input() {
        let pattern = base();
        let snapshot = pattern;
        let _ = Variation::Augmentation.apply(&pattern);
        let _ = Variation::Retrograde.apply(&pattern);
        let _ = Variation::Randomization { seed: 1 }.apply(&pattern);
        assert_eq!(pattern, snapshot);
    }
}
