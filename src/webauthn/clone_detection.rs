//! # Clone Detection
//!
//! Pure classification of a credential's signature counter after a
//! successfully verified assertion. Authenticators that count must report a
//! strictly larger value every time; anything else means two devices may
//! hold the same private key.

/// Counter value of an authenticator that does not implement counting.
pub const COUNTER_UNSUPPORTED: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterAssessment {
    /// Neither side counts. Accept and leave the stored counter alone.
    Unsupported,
    /// The counter moved forward. Accept and store the new value.
    Advanced(u32),
    /// The counter stood still or went back: possible clone.
    Regressed,
}

/// Classifies `reported` against the `stored` counter.
pub fn assess(stored: u32, reported: u32) -> CounterAssessment {
    if stored == COUNTER_UNSUPPORTED && reported == COUNTER_UNSUPPORTED {
        CounterAssessment::Unsupported
    } else if reported > stored {
        CounterAssessment::Advanced(reported)
    } else {
        CounterAssessment::Regressed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advancing_counter_is_accepted() {
        assert_eq!(assess(5, 6), CounterAssessment::Advanced(6));
        assert_eq!(assess(0, 1), CounterAssessment::Advanced(1));
        assert_eq!(assess(5, 500), CounterAssessment::Advanced(500));
    }

    #[test]
    fn test_equal_or_lower_counter_is_regression() {
        assert_eq!(assess(5, 5), CounterAssessment::Regressed);
        assert_eq!(assess(5, 3), CounterAssessment::Regressed);
    }

    #[test]
    fn test_counter_reset_to_zero_is_regression() {
        assert_eq!(assess(5, 0), CounterAssessment::Regressed);
    }

    #[test]
    fn test_non_counting_authenticator() {
        assert_eq!(assess(0, 0), CounterAssessment::Unsupported);
    }
}
