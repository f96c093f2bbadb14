//! Error types for the CEVRP solver.

use std::fmt;

/// Terminal and logic errors surfaced by the solver.
///
/// Recoverable operator failures (e.g. a destroy operator finding fewer
/// routes than it needs) are not errors: operators signal them by returning
/// `None` and the ALNS engine silently keeps the previous state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverError {
    /// MMAS produced neither a consistent best nor a second-best solution.
    NoSolutionFound(String),
    /// Instance parsing failed or required keys were missing.
    InvalidInstance(String),
    /// Roulette wheel cumulative probability failed to exceed the draw.
    NumericalDegenerate(String),
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverError::NoSolutionFound(msg) => write!(f, "no solution found: {}", msg),
            SolverError::InvalidInstance(msg) => write!(f, "invalid instance: {}", msg),
            SolverError::NumericalDegenerate(msg) => {
                write!(f, "numerical degeneracy: {}", msg)
            }
        }
    }
}

impl std::error::Error for SolverError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = SolverError::NoSolutionFound("MMAS exhausted".to_string());
        assert!(err.to_string().contains("no solution found"));
    }
}
