//! Game state reconstruction from per-frame observations.
//!
//! The [`Reconstructor`] owns the one live [`GameState`](tetrawatch_engine::GameState) of a
//! session and moves it forward only through legal transitions. Its phases:
//!
//! - [`Phase::Uninitialized`] - waiting for an observation without unknown cells
//! - [`Phase::Tracking`] - every observation is explained by the smallest legal change
//! - [`Phase::Degraded`] - an observation could not be explained; the state is held
//! - [`Phase::Faulted`] - contradictions persisted; recalibration is requested once
//!
//! A degraded or faulted machine returns to tracking after enough consecutive observations
//! agree with the held state (or with the state those observations advanced it to).
//!
//! # Example
//!
//! ```
//! use tetrawatch_tracker::{Phase, Reconstructor, TrackerConfig};
//! use tetrawatch_vision::recognizer::{CellGrid, Observation};
//!
//! let mut reconstructor = Reconstructor::new(TrackerConfig::default());
//! let cells = CellGrid::from_ascii(
//!     "
//!     ....
//!     ###.#
//!     ",
//! );
//! let outcome = reconstructor.observe(&Observation::new(1, cells));
//! assert_eq!(outcome.phase, Phase::Tracking);
//! assert_eq!(reconstructor.state().unwrap().version(), 1);
//! ```

pub use self::reconstructor::{Phase, ReconstructOutcome, Reconstructor, TrackerConfig};

mod reconstructor;
mod search;
