//! Logical game state reconstructed from observations.
//!
//! - [`GameState`] - Grid, active piece, preview queue, held piece, and counters
//! - [`Transition`] - The closed set of legal changes between two states
//!
//! A state only changes through [`GameState::apply`]. Each applied transition other than
//! [`Transition::Unchanged`] advances the state's version, so consumers holding an older
//! snapshot can tell it is stale.
//!
//! # Example
//!
//! ```
//! use tetrawatch_engine::{GameState, Grid, Piece, PieceKind, PieceRotation, Transition};
//!
//! let mut state = GameState::new(Grid::new(20, 10), 1);
//! let piece = Piece::with_cells_at(PieceKind::O, PieceRotation::SPAWN, 4, 0);
//! state.apply(&Transition::Spawn { piece }, 2).unwrap();
//!
//! let dropped = piece.simulate_drop_position(state.grid());
//! state
//!     .apply(&Transition::Lock { piece: dropped, cleared_lines: 0, spawned: None }, 3)
//!     .unwrap();
//! assert_eq!(state.version(), 3);
//! assert_eq!(state.grid().column_height(4), 2);
//! ```

pub use self::{game_state::*, transition::*};

mod game_state;
mod transition;
