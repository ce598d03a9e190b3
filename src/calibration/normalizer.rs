// Step stream normalizer
//
// Hardware step counters report a cumulative value since device boot. The
// normalizer latches the first value seen in a session and reports steps
// relative to it.

use crate::error::TrackerError;

/// Converts raw cumulative counter readings into session-relative step counts
#[derive(Debug, Clone, Default)]
pub struct StepNormalizer {
    /// Raw value of the first sample this session
    initial_raw: Option<i64>,
    /// Raw value of the last accepted sample
    last_raw: Option<i64>,
}

impl StepNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `raw` and compute its session step count without committing
    ///
    /// # Returns
    /// * `Ok(0)` - First sample of the session (will become the latch)
    /// * `Ok(steps)` - `raw - initial`
    /// * `Err(TrackerError)` - Negative or decreasing raw value
    pub fn peek(&self, raw: i64) -> Result<u64, TrackerError> {
        if raw < 0 {
            return Err(TrackerError::NegativeStepCount { raw });
        }

        match (self.initial_raw, self.last_raw) {
            (Some(initial), Some(last)) => {
                if raw < last {
                    return Err(TrackerError::NonMonotonicStepCount {
                        previous: last,
                        raw,
                    });
                }
                Ok((raw - initial) as u64)
            }
            _ => Ok(0),
        }
    }

    /// Record `raw` as accepted, latching it if this is the first sample
    ///
    /// Callers must have validated `raw` with [`peek`](Self::peek).
    pub fn commit(&mut self, raw: i64) {
        if self.initial_raw.is_none() {
            self.initial_raw = Some(raw);
        }
        self.last_raw = Some(raw);
    }

    /// Validate, commit and return the session step count
    pub fn normalize(&mut self, raw: i64) -> Result<u64, TrackerError> {
        let steps = self.peek(raw)?;
        self.commit(raw);
        Ok(steps)
    }

    /// Raw counter value latched at session start, if any
    pub fn initial_raw(&self) -> Option<i64> {
        self.initial_raw
    }

    pub fn is_latched(&self) -> bool {
        self.initial_raw.is_some()
    }

    /// Forget the latch; the next sample starts a new session at zero
    pub fn reset(&mut self) {
        self.initial_raw = None;
        self.last_raw = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_latches_and_returns_zero() {
        let mut normalizer = StepNormalizer::new();
        assert!(!normalizer.is_latched());

        assert_eq!(normalizer.normalize(4821).unwrap(), 0);
        assert_eq!(normalizer.initial_raw(), Some(4821));
        assert_eq!(normalizer.normalize(4830).unwrap(), 9);
    }

    #[test]
    fn test_latch_is_immutable_until_reset() {
        let mut normalizer = StepNormalizer::new();
        normalizer.normalize(100).unwrap();
        normalizer.normalize(150).unwrap();
        normalizer.normalize(175).unwrap();
        assert_eq!(normalizer.initial_raw(), Some(100));

        normalizer.reset();
        assert!(!normalizer.is_latched());
        assert_eq!(normalizer.normalize(175).unwrap(), 0);
        assert_eq!(normalizer.initial_raw(), Some(175));
    }

    #[test]
    fn test_non_decreasing_sequence_yields_non_decreasing_steps() {
        let mut normalizer = StepNormalizer::new();
        let raw = [100, 100, 110, 130, 130, 145, 200];
        let mut previous = 0;

        for (i, value) in raw.iter().enumerate() {
            let steps = normalizer.normalize(*value).unwrap();
            if i == 0 {
                assert_eq!(steps, 0);
            }
            assert!(steps >= previous, "steps went backwards at index {}", i);
            previous = steps;
        }
        assert_eq!(previous, 100);
    }

    #[test]
    fn test_negative_raw_rejected_without_latching() {
        let mut normalizer = StepNormalizer::new();
        let result = normalizer.normalize(-1);

        assert_eq!(result, Err(TrackerError::NegativeStepCount { raw: -1 }));
        assert!(!normalizer.is_latched());
    }

    #[test]
    fn test_decreasing_raw_rejected_and_state_kept() {
        let mut normalizer = StepNormalizer::new();
        normalizer.normalize(100).unwrap();
        normalizer.normalize(120).unwrap();

        let result = normalizer.normalize(110);
        assert_eq!(
            result,
            Err(TrackerError::NonMonotonicStepCount {
                previous: 120,
                raw: 110
            })
        );

        // Next valid sample is still measured against the original latch
        assert_eq!(normalizer.normalize(125).unwrap(), 25);
    }

    #[test]
    fn test_peek_does_not_commit() {
        let normalizer = StepNormalizer::new();
        assert_eq!(normalizer.peek(300).unwrap(), 0);
        assert!(!normalizer.is_latched());
    }
}
