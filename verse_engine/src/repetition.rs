// Repetition detection over a token history, Floyd tortoise/hare style.
//
// Only the last `max_lookback` tokens are inspected. The tortoise starts at
// offset 1 and the hare at offset 2 of that window; they advance by 1 and 2
// until the hare runs off the end. The first time both point at equal
// tokens, a cycle is reported with `length = hare - tortoise`.
//
// This is a coarse period estimate, not an exact one: the gap between the
// pointers grows by one each step, so the detector fires on the shortest
// gap at which some token recurs and is biased toward short periods. The
// search scorer and the `no-unit-cycle` constraint rely on exactly this
// behaviour, so it is kept as is.

/// Lookback used when the caller has no preference.
pub const DEFAULT_LOOKBACK: usize = 20;
/// Windows shorter than this never report a cycle.
pub const MIN_CYCLE_WINDOW: usize = 4;

/// Outcome of one detection pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub detected: bool,
    /// `hare - tortoise` at the first collision; 0 when nothing was found.
    pub length: usize,
}

impl CycleReport {
    pub const NONE: CycleReport = CycleReport {
        detected: false,
        length: 0,
    };
}

/// Detect a repeating subsequence in the last `max_lookback` tokens.
pub fn detect<T: PartialEq>(sequence: &[T], max_lookback: usize) -> CycleReport {
    let start = sequence.len().saturating_sub(max_lookback);
    let window = &sequence[start..];
    if window.len() < MIN_CYCLE_WINDOW {
        return CycleReport::NONE;
    }

    let mut tortoise = 1;
    let mut hare = 2;
    while hare < window.len() {
        if window[tortoise] == window[hare] {
            return CycleReport {
                detected: true,
                length: hare - tortoise,
            };
        }
        tortoise += 1;
        hare += 2;
    }
    CycleReport::NONE
}

/// `detect` with `DEFAULT_LOOKBACK`.
pub fn detect_default<T: PartialEq>(sequence: &[T]) -> CycleReport {
    detect(sequence, DEFAULT_LOOKBACK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alternating_pair_detected() {
        let seq = ["love", "death", "love", "death", "love", "death"];
        for _ in 0..3 {
            assert_eq!(
                detect_default(&seq),
                CycleReport {
                    detected: true,
                    length: 2
                }
            );
        }
    }

    #[test]
    fn test_distinct_tokens_not_detected() {
        let seq = ["the", "quick", "brown", "fox", "jumps"];
        assert!(!detect_default(&seq).detected);
    }

    #[test]
    fn test_short_sequences_never_detected() {
        assert_eq!(detect_default(&["a", "a", "a"]), CycleReport::NONE);
        assert_eq!(detect_default::<&str>(&[]), CycleReport::NONE);
    }

    #[test]
    fn test_adjacent_repeat_is_unit_cycle() {
        let seq = ["x", "moon", "moon", "y"];
        assert_eq!(
            detect_default(&seq),
            CycleReport {
                detected: true,
                length: 1
            }
        );
    }

    #[test]
    fn test_lookback_limits_window() {
        // The repeat sits outside the last four tokens.
        let seq = ["a", "b", "b", "c", "d", "e", "f"];
        assert!(detect(&seq, 7).detected);
        assert!(!detect(&seq, 4).detected);
    }

    #[test]
    fn test_short_period_bias() {
        // True period is 3, but the first collision reports the pointer gap.
        let seq = ["a", "b", "c", "a", "b", "c", "a", "b", "c"];
        let report = detect_default(&seq);
        assert!(report.detected);
        assert_eq!(report.length, 3);
        let seq = ["x", "a", "b", "a", "b", "a", "b"];
        assert_eq!(detect_default(&seq).length, 2);
    }
}
