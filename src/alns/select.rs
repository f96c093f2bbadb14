//! Adaptive operator selection for the ALNS engine.

use rand::Rng;

/// Outcome bucket of an ALNS iteration, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// New global best
    Best = 0,
    /// Better than the current accepted solution
    Better = 1,
    /// Worse but accepted by the criterion
    Accepted = 2,
    /// Rejected
    Rejected = 3,
}

/// Roulette wheel over operator weights with exponential score decay.
///
/// Selection probability is proportional to the current weight; after every
/// iteration the picked operator's weight moves towards the score of the
/// observed outcome bucket: `w <- decay * w + (1 - decay) * score`.
#[derive(Debug, Clone)]
pub struct RouletteWheel {
    scores: [f64; 4],
    decay: f64,
    weights: Vec<f64>,
}

impl RouletteWheel {
    pub fn new(scores: [f64; 4], decay: f64, num_operators: usize) -> Self {
        debug_assert!((0.0..=1.0).contains(&decay));
        RouletteWheel {
            scores,
            decay,
            // Every operator starts equally likely
            weights: vec![1.0; num_operators],
        }
    }

    /// Pick an operator index proportionally to the weights
    pub fn select<R: Rng>(&self, rng: &mut R) -> usize {
        let total: f64 = self.weights.iter().sum();
        if total <= 0.0 {
            return rng.gen_range(0..self.weights.len());
        }
        let mut pick = rng.gen::<f64>() * total;
        for (index, weight) in self.weights.iter().enumerate() {
            pick -= weight;
            if pick <= 0.0 {
                return index;
            }
        }
        self.weights.len() - 1
    }

    /// Update the weight of `operator` with the observed outcome
    pub fn update(&mut self, operator: usize, outcome: Outcome) {
        let score = self.scores[outcome as usize];
        let weight = &mut self.weights[operator];
        *weight = self.decay * *weight + (1.0 - self.decay) * score;
    }

    pub fn weight(&self, operator: usize) -> f64 {
        self.weights[operator]
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_update_moves_weight_towards_score() {
        let mut wheel = RouletteWheel::new([25.0, 5.0, 1.0, 0.5], 0.8, 2);
        wheel.update(0, Outcome::Best);
        // 0.8 * 1.0 + 0.2 * 25.0 = 5.8
        assert!((wheel.weight(0) - 5.8).abs() < 1e-12);
        assert!((wheel.weight(1) - 1.0).abs() < 1e-12);

        wheel.update(1, Outcome::Rejected);
        // 0.8 * 1.0 + 0.2 * 0.5 = 0.9
        assert!((wheel.weight(1) - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_selection_favours_successful_operators() {
        let mut wheel = RouletteWheel::new([25.0, 5.0, 1.0, 0.5], 0.8, 2);
        for _ in 0..10 {
            wheel.update(0, Outcome::Best);
            wheel.update(1, Outcome::Rejected);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(17);
        let picks_of_zero = (0..200)
            .filter(|_| wheel.select(&mut rng) == 0)
            .count();
        assert!(picks_of_zero > 150);
    }

    #[test]
    fn test_selection_is_deterministic_for_a_seed() {
        let wheel = RouletteWheel::new([25.0, 5.0, 1.0, 0.5], 0.8, 3);
        let mut a = ChaCha8Rng::seed_from_u64(4);
        let mut b = ChaCha8Rng::seed_from_u64(4);
        let seq_a: Vec<usize> = (0..20).map(|_| wheel.select(&mut a)).collect();
        let seq_b: Vec<usize> = (0..20).map(|_| wheel.select(&mut b)).collect();
        assert_eq!(seq_a, seq_b);
    }
}
