//! "Till-same-limit" counter that ends a scan after a run of unchanged items.

/// Stops a scan of a recency-ordered feed once `threshold` consecutive
/// candidates came back unchanged. Any change resets the counter.
///
/// This is a heuristic: if the feed is not strictly ordered by how recently
/// an item changed, updates beyond the run can be missed until a later run.
#[derive(Debug, Clone)]
pub struct UnchangedRunLimiter {
    threshold: usize,
    remaining: usize,
}

impl UnchangedRunLimiter {
    /// A threshold of 0 allows no fetches at all.
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            remaining: threshold,
        }
    }

    /// Record the outcome of one fetch; returns whether scanning should continue.
    pub fn observe(&mut self, changed: bool) -> bool {
        if changed {
            self.remaining = self.threshold;
        } else {
            self.remaining = self.remaining.saturating_sub(1);
        }
        self.should_continue()
    }

    /// Whether another candidate may be fetched.
    pub fn should_continue(&self) -> bool {
        self.remaining > 0
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_halts_after_threshold_unchanged() {
        let mut limiter = UnchangedRunLimiter::new(3);
        assert!(limiter.should_continue());
        assert!(limiter.observe(false));
        assert!(limiter.observe(false));
        assert!(!limiter.observe(false));
        assert_eq!(limiter.remaining(), 0);
    }

    #[test]
    fn test_zero_threshold_never_scans() {
        let limiter = UnchangedRunLimiter::new(0);
        assert!(!limiter.should_continue());
    }

    #[test]
    fn test_change_resets() {
        let mut limiter = UnchangedRunLimiter::new(2);
        limiter.observe(false);
        assert_eq!(limiter.remaining(), 1);
        assert!(limiter.observe(true));
        assert_eq!(limiter.remaining(), 2);
    }

    #[test]
    fn test_stopping_bound_all_unchanged() {
        for (m, n) in [(10usize, 4usize), (3, 5), (0, 5), (5, 5)] {
            let mut limiter = UnchangedRunLimiter::new(n);
            let mut fetched = 0;
            for _ in 0..m {
                if !limiter.should_continue() {
                    break;
                }
                fetched += 1;
                limiter.observe(false);
            }
            assert_eq!(fetched, m.min(n), "m={m} n={n}");
        }
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    #[case(4)]
    fn test_reset_on_change_does_not_halt_early(#[case] k: usize) {
        const N: usize = 5;
        let mut observations = vec![false; k];
        observations.push(true);
        observations.extend(vec![false; N - 1]);

        let mut limiter = UnchangedRunLimiter::new(N);
        let last = observations.len() - 1;
        for (i, changed) in observations.into_iter().enumerate() {
            assert!(limiter.should_continue(), "halted before observation {i}");
            let cont = limiter.observe(changed);
            if i < last {
                assert!(cont, "halted early at observation {i} (k={k})");
            }
        }
        // N-1 unchanged after the reset leaves exactly one more allowed
        assert_eq!(limiter.remaining(), 1);
    }
}
