//! Grid scoring and placement search.
//!
//! The crate is organized in two levels:
//!
//! 1. [`heuristic`] - Scores a single grid as a weighted sum of structural features
//!    extracted by [`grid_analysis`]
//! 2. [`predictor`] - Enumerates every drop-realizable placement of the active piece,
//!    scores the resulting grids, and ranks them
//!
//! Both levels are pure: the same grid and piece always yield the same scores and order.
//!
//! # Example
//!
//! ```
//! use tetrawatch_engine::{Grid, PieceKind};
//! use tetrawatch_evaluator::{
//!     heuristic::{HeuristicEvaluator, HeuristicWeights},
//!     predictor::MovePredictor,
//! };
//!
//! let evaluator = HeuristicEvaluator::new(HeuristicWeights::default());
//! let predictor = MovePredictor::new(Box::new(evaluator));
//!
//! let grid = Grid::new(20, 10);
//! let ranked = predictor.predict(&grid, Some(PieceKind::T), None);
//! assert!(!ranked.is_empty());
//! assert!(ranked.windows(2).all(|w| w[0].rank_score() >= w[1].rank_score()));
//! ```

pub mod grid_analysis;
pub mod heuristic;
pub mod predictor;
