//! Coaching hints derived from the reconstructed game.
//!
//! [`CoachingGenerator`] keeps a short history of state samples and the set of live hints.
//! Each call to [`CoachingGenerator::generate`] checks three kinds of advice, in priority
//! order:
//!
//! - danger: the stack is close to the top, or holes keep piling up
//! - strategy: the best placement departs from the recent score trend
//! - opportunity: a placement clears lines
//!
//! Hints live for a fixed time unless a newer hint with the same message replaces them.
//!
//! ```
//! use chrono::Utc;
//! use tetrawatch_coach::{CoachingConfig, CoachingGenerator};
//! use tetrawatch_engine::{GameState, Grid};
//! use tetrawatch_evaluator::heuristic::HeuristicEvaluator;
//!
//! let mut coach = CoachingGenerator::new(
//!     CoachingConfig::default(),
//!     Box::new(HeuristicEvaluator::default()),
//! );
//! let state = GameState::new(Grid::new(20, 10), 0);
//! assert!(coach.generate(&state, &[], Utc::now()).is_empty());
//! ```

pub use self::{
    generator::{CoachingConfig, CoachingGenerator, StateSample},
    hint::{CoachingHint, HintCategory, UrgencyLevel},
};

mod generator;
mod hint;
