//! Grid evaluation: scoring a single grid.
//!
//! A grid's score is a linear combination of five structural features:
//!
//! ```text
//! score = w_height·aggregate_height + w_holes·holes + w_bump·bumpiness
//!       + w_lines·completed_lines + w_overhang·overhangs
//! ```
//!
//! Higher is better. Penalized features carry negative weights, rewarded features positive
//! ones. The evaluator is a total, side-effect free function of the grid: an empty grid
//! is valid input and scores `0.0`.

use std::{fmt, iter};

use serde::{Deserialize, Serialize};
use tetrawatch_engine::Grid;

use crate::grid_analysis::GridAnalysis;

/// Number of features combined by [`HeuristicEvaluator`].
pub const FEATURE_COUNT: usize = 5;

/// Feature names in the order used by [`GridFeatures::as_array`].
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "aggregate_height",
    "holes",
    "bumpiness",
    "completed_lines",
    "overhangs",
];

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum InvalidWeightsError {
    #[display("weight '{name}' is not finite: {value}")]
    NotFinite { name: &'static str, value: f32 },
    #[display("all heuristic weights are zero")]
    AllZero,
}

/// Externally configurable feature weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicWeights {
    pub aggregate_height: f32,
    pub holes: f32,
    pub bumpiness: f32,
    pub completed_lines: f32,
    pub overhangs: f32,
}

impl Default for HeuristicWeights {
    fn default() -> Self {
        Self {
            aggregate_height: -0.51,
            holes: -0.36,
            bumpiness: -0.18,
            completed_lines: 0.76,
            overhangs: -0.2,
        }
    }
}

impl HeuristicWeights {
    #[must_use]
    pub fn as_array(&self) -> [f32; FEATURE_COUNT] {
        [
            self.aggregate_height,
            self.holes,
            self.bumpiness,
            self.completed_lines,
            self.overhangs,
        ]
    }

    pub fn validate(&self) -> Result<(), InvalidWeightsError> {
        for (name, value) in iter::zip(FEATURE_NAMES, self.as_array()) {
            if !value.is_finite() {
                return Err(InvalidWeightsError::NotFinite { name, value });
            }
        }
        if self.as_array().iter().all(|w| w.abs() < f32::EPSILON) {
            return Err(InvalidWeightsError::AllZero);
        }
        Ok(())
    }
}

/// Raw feature values of one grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridFeatures {
    pub aggregate_height: usize,
    pub holes: usize,
    pub bumpiness: usize,
    pub completed_lines: usize,
    pub overhangs: usize,
}

impl GridFeatures {
    /// Extracts features from a grid whose placement already cleared `cleared_lines` rows.
    #[must_use]
    pub fn from_outcome(grid: &Grid, cleared_lines: usize) -> Self {
        let analysis = GridAnalysis::new(grid);
        Self {
            aggregate_height: analysis.aggregate_height(),
            holes: analysis.num_holes(),
            bumpiness: analysis.surface_bumpiness(),
            completed_lines: analysis.completed_lines() + cleared_lines,
            overhangs: analysis.num_overhangs(),
        }
    }

    #[must_use]
    pub fn from_grid(grid: &Grid) -> Self {
        Self::from_outcome(grid, 0)
    }

    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn as_array(&self) -> [f32; FEATURE_COUNT] {
        [
            self.aggregate_height as f32,
            self.holes as f32,
            self.bumpiness as f32,
            self.completed_lines as f32,
            self.overhangs as f32,
        ]
    }
}

/// Scores grids (higher is better).
pub trait GridEvaluator: fmt::Debug + Send + Sync {
    /// Scores a grid reached by a placement that cleared `cleared_lines` rows.
    fn score_outcome(&self, grid: &Grid, cleared_lines: usize) -> f32;

    /// Scores a grid as observed.
    fn score(&self, grid: &Grid) -> f32 {
        self.score_outcome(grid, 0)
    }
}

/// Weighted-sum evaluator over [`GridFeatures`].
#[derive(Debug, Clone)]
pub struct HeuristicEvaluator {
    weights: HeuristicWeights,
}

impl Default for HeuristicEvaluator {
    fn default() -> Self {
        Self::new(HeuristicWeights::default())
    }
}

impl HeuristicEvaluator {
    #[must_use]
    pub fn new(weights: HeuristicWeights) -> Self {
        Self { weights }
    }

    #[must_use]
    pub fn weights(&self) -> &HeuristicWeights {
        &self.weights
    }

    #[must_use]
    pub fn evaluate_features(&self, features: &GridFeatures) -> f32 {
        iter::zip(features.as_array(), self.weights.as_array())
            .map(|(f, w)| f * w)
            .sum()
    }
}

impl GridEvaluator for HeuristicEvaluator {
    #[inline]
    fn score_outcome(&self, grid: &Grid, cleared_lines: usize) -> f32 {
        self.evaluate_features(&GridFeatures::from_outcome(grid, cleared_lines))
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng as _, SeedableRng as _};
    use rand_pcg::Pcg64Mcg;
    use tetrawatch_engine::Block;

    use super::*;

    fn random_grid(rng: &mut Pcg64Mcg, rows: usize, columns: usize) -> Grid {
        let mut grid = Grid::new(rows, columns);
        let fill = rng.random_range(0.0..0.7);
        for y in 0..rows {
            for x in 0..columns {
                if rng.random_bool(fill) {
                    grid.set_block(y, x, Block::Garbage);
                }
            }
        }
        grid
    }

    #[test]
    fn test_empty_grid_scores_zero() {
        let evaluator = HeuristicEvaluator::default();
        assert!(evaluator.score(&Grid::new(20, 10)).abs() < f32::EPSILON);
        assert!(evaluator.score(&Grid::new(0, 0)).abs() < f32::EPSILON);
    }

    #[test]
    fn test_score_is_deterministic() {
        let evaluator = HeuristicEvaluator::default();
        let mut rng = Pcg64Mcg::seed_from_u64(0x5eed);
        for _ in 0..200 {
            let rows = rng.random_range(1..=22);
            let columns = rng.random_range(1..=12);
            let grid = random_grid(&mut rng, rows, columns);
            let first = evaluator.score(&grid);
            for _ in 0..3 {
                assert_eq!(evaluator.score(&grid).to_bits(), first.to_bits());
            }
        }
    }

    #[test]
    fn test_weighted_sum() {
        let grid = Grid::from_ascii(
            "
            .#..
            ..#.
            ####
            ",
        );
        let features = GridFeatures::from_grid(&grid);
        assert_eq!(
            features,
            GridFeatures {
                aggregate_height: 1 + 3 + 2 + 1,
                holes: 1,
                bumpiness: 2 + 1 + 1,
                completed_lines: 1,
                overhangs: 1,
            }
        );

        let evaluator = HeuristicEvaluator::new(HeuristicWeights {
            aggregate_height: -1.0,
            holes: -10.0,
            bumpiness: -0.5,
            completed_lines: 4.0,
            overhangs: -2.0,
        });
        let expected = -7.0 - 10.0 - 2.0 + 4.0 - 2.0;
        assert!((evaluator.score(&grid) - expected).abs() < 1e-5);
    }

    #[test]
    fn test_cleared_lines_are_rewarded() {
        let evaluator = HeuristicEvaluator::default();
        let grid = Grid::new(4, 4);
        assert!(evaluator.score_outcome(&grid, 2) > evaluator.score(&grid));
    }

    #[test]
    fn test_weight_validation() {
        assert!(HeuristicWeights::default().validate().is_ok());
        let nan = HeuristicWeights {
            holes: f32::NAN,
            ..HeuristicWeights::default()
        };
        assert!(matches!(
            nan.validate(),
            Err(InvalidWeightsError::NotFinite { name: "holes", .. })
        ));
        let zero = HeuristicWeights {
            aggregate_height: 0.0,
            holes: 0.0,
            bumpiness: 0.0,
            completed_lines: 0.0,
            overhangs: 0.0,
        };
        assert!(matches!(zero.validate(), Err(InvalidWeightsError::AllZero)));
    }
}
