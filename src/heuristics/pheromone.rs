//! Pheromone arithmetic for the Max-Min Ant System.
//!
//! Free functions implementing edge desirability, fitness-proportionate
//! selection and the tau_min/tau_max bounds that give MMAS its name.

use ordered_float::OrderedFloat;
use rand::Rng;

use crate::error::SolverError;
use crate::graph::NodeId;

/// Desirability of an edge: `tau^alpha * (1/cost)^beta`.
///
/// A zero-cost edge contributes zero desirability, which makes the
/// candidate unselectable instead of dividing by zero.
pub fn edge_desirability(pheromone: f64, cost: f64, alpha: f64, beta: f64) -> f64 {
    if cost == 0.0 {
        return 0.0;
    }
    pheromone.powf(alpha) * (1.0 / cost).powf(beta)
}

/// Fitness-proportionate selection over `(node, probability)` candidates.
///
/// Candidates are ranked by descending probability; the first node whose
/// cumulative probability strictly exceeds a uniform draw wins. A cumulative
/// sum that never exceeds the draw indicates an underflow in the
/// probabilities and is reported as a logic error.
pub fn roulette_wheel<R: Rng>(
    probabilities: &[(NodeId, f64)],
    rng: &mut R,
) -> Result<NodeId, SolverError> {
    let mut sorted: Vec<(NodeId, f64)> = probabilities.to_vec();
    sorted.sort_by_key(|&(_, p)| std::cmp::Reverse(OrderedFloat(p)));

    let pick: f64 = rng.gen();
    let mut current = 0.0;
    for (node, probability) in sorted {
        current += probability;
        if current > pick {
            return Ok(node);
        }
    }
    Err(SolverError::NumericalDegenerate(format!(
        "roulette wheel cumulative {} never exceeded draw {}",
        current, pick
    )))
}

/// Upper pheromone bound: `1 / ((1 - rho) * best_cost)`
pub fn tau_max(rho: f64, best_cost: f64) -> f64 {
    debug_assert!(rho > 0.0 && rho < 1.0, "rho must lie in (0, 1)");
    1.0 / ((1.0 - rho) * best_cost)
}

/// Lower pheromone bound derived from the n-th root of the exploration
/// probability `p_r`: `tau_max * ((1 - 1/r) / (n/2 - 1)) * (1/r)` with
/// `r = p_r^(1/n)`.
pub fn tau_min(tau_max: f64, total_nodes: usize, p_r: f64) -> f64 {
    debug_assert!(p_r > 0.0 && p_r <= 1.0, "p_r must lie in (0, 1]");
    if total_nodes <= 2 {
        return 0.0;
    }
    let n = total_nodes as f64;
    let nth_root = p_r.powf(1.0 / n);
    let numerator = 1.0 - 1.0 / nth_root;
    let denominator = n / 2.0 - 1.0;
    tau_max * (numerator / denominator) * (1.0 / nth_root)
}

/// Clamp a pheromone level into `[min_level, max_level]`
pub fn clamp_pheromone(value: f64, max_level: f64, min_level: f64) -> f64 {
    value.max(min_level).min(max_level)
}

/// New pheromone level for an edge after a deposit by a fit ant:
/// `clamp(rho * tau + 1/best_cost, tau_min, tau_max)`.
pub fn deposit(rho: f64, pheromone: f64, best_cost: f64, total_nodes: usize, p_r: f64) -> f64 {
    let value = rho * pheromone + 1.0 / best_cost;
    let max_level = tau_max(rho, best_cost);
    let min_level = tau_min(max_level, total_nodes, p_r);
    clamp_pheromone(value, max_level, min_level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_zero_cost_edge_has_zero_desirability() {
        assert_eq!(edge_desirability(5.0, 0.0, 1.0, 2.0), 0.0);
        assert!(edge_desirability(5.0, 2.0, 1.0, 2.0) > 0.0);
    }

    #[test]
    fn test_desirability_formula() {
        // tau^1 * (1/4)^2 = 2 * 0.0625
        let d = edge_desirability(2.0, 4.0, 1.0, 2.0);
        assert!((d - 0.125).abs() < 1e-12);
    }

    #[test]
    fn test_roulette_wheel_is_deterministic() {
        let candidates = vec![(0, 0.3), (1, 0.5), (2, 0.2)];
        let mut a = ChaCha8Rng::seed_from_u64(7);
        let mut b = ChaCha8Rng::seed_from_u64(7);
        let first = roulette_wheel(&candidates, &mut a).unwrap();
        let second = roulette_wheel(&candidates, &mut b).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_roulette_wheel_prefers_heavy_candidates() {
        let candidates = vec![(0, 0.999), (1, 0.001)];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut hits = 0;
        for _ in 0..100 {
            if roulette_wheel(&candidates, &mut rng).unwrap() == 0 {
                hits += 1;
            }
        }
        assert!(hits >= 95);
    }

    #[test]
    fn test_roulette_wheel_underflow_is_an_error() {
        // Probabilities that sum to zero can never exceed the draw
        let candidates = vec![(0, 0.0), (1, 0.0)];
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let err = roulette_wheel(&candidates, &mut rng).unwrap_err();
        assert!(matches!(err, SolverError::NumericalDegenerate(_)));
    }

    #[test]
    fn test_tau_max() {
        // 1 / ((1 - 0.98) * 100) = 0.5
        assert!((tau_max(0.98, 100.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_tau_min_literal() {
        let max = tau_max(0.98, 100.0);
        let n = 22usize;
        let r = 0.05_f64.powf(1.0 / 22.0);
        let expected = max * ((1.0 - 1.0 / r) / (22.0 / 2.0 - 1.0)) * (1.0 / r);
        assert!((tau_min(max, n, 0.05) - expected).abs() < 1e-12);
        // Degenerate graphs have no usable lower bound
        assert_eq!(tau_min(max, 2, 0.05), 0.0);
    }

    #[test]
    fn test_deposit_respects_bounds() {
        let rho = 0.98;
        let best = 100.0;
        let n = 22;
        let max = tau_max(rho, best);
        let min = tau_min(max, n, 0.05);

        // A huge incoming level is clamped down to tau_max
        let clamped = deposit(rho, 10.0, best, n, 0.05);
        assert!((clamped - max).abs() < 1e-12);

        // A regular deposit stays within the bounds
        let value = deposit(rho, 0.3, best, n, 0.05);
        assert!(value <= max + 1e-12);
        assert!(value >= min - 1e-12);
        assert!((value - (rho * 0.3 + 1.0 / best)).abs() < 1e-12);
    }
}
