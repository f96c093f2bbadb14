//! Record-to-Record Travel acceptance criterion.

/// Accepts a candidate when its objective is within a linearly shrinking
/// threshold of the best objective on record.
#[derive(Debug, Clone)]
pub struct RecordToRecordTravel {
    start_threshold: f64,
    end_threshold: f64,
    step: f64,
}

impl RecordToRecordTravel {
    /// Derive the thresholds from the initial objective: the threshold
    /// starts at `start_pct * initial` and decays linearly to
    /// `end_pct * initial` over `num_iterations` iterations.
    pub fn autofit(initial: f64, start_pct: f64, end_pct: f64, num_iterations: usize) -> Self {
        let start_threshold = start_pct * initial;
        let end_threshold = end_pct * initial;
        let step = if num_iterations > 0 {
            (start_threshold - end_threshold) / num_iterations as f64
        } else {
            0.0
        };
        RecordToRecordTravel {
            start_threshold,
            end_threshold,
            step,
        }
    }

    /// Threshold for the given iteration
    pub fn threshold(&self, iteration: usize) -> f64 {
        (self.start_threshold - self.step * iteration as f64).max(self.end_threshold)
    }

    /// Accept iff `candidate - best <= threshold(iteration)`
    pub fn accepts(&self, best: f64, candidate: f64, iteration: usize) -> bool {
        candidate - best <= self.threshold(iteration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_decays_linearly() {
        let rrt = RecordToRecordTravel::autofit(1000.0, 0.02, 0.0, 100);
        assert!((rrt.threshold(0) - 20.0).abs() < 1e-12);
        assert!((rrt.threshold(50) - 10.0).abs() < 1e-12);
        assert!((rrt.threshold(100) - 0.0).abs() < 1e-12);
        // Past the schedule the threshold stays at the end value
        assert!((rrt.threshold(500) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_acceptance_at_midpoint() {
        let rrt = RecordToRecordTravel::autofit(1000.0, 0.02, 0.0, 100);
        // At iteration 50 the threshold is 10
        assert!(rrt.accepts(1000.0, 1005.0, 50));
        assert!(!rrt.accepts(1000.0, 1015.0, 50));
    }

    #[test]
    fn test_improvements_always_accepted() {
        let rrt = RecordToRecordTravel::autofit(1000.0, 0.02, 0.0, 100);
        assert!(rrt.accepts(1000.0, 990.0, 100));
    }
}
