use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};

use crate::{
    PieceCollisionError,
    core::{
        grid::Grid,
        piece::{Piece, PieceKind},
    },
};

use super::transition::Transition;

/// Maximum number of preview pieces a state can hold.
pub const MAX_NEXT_PIECES: usize = 6;

/// Logical state of the observed game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    grid: Grid,
    active: Option<Piece>,
    next: ArrayVec<PieceKind, MAX_NEXT_PIECES>,
    held: Option<PieceKind>,
    total_cleared_lines: usize,
    line_cleared_counter: [usize; 5],
    locked_pieces: usize,
    frame_sequence: u64,
    version: u64,
}

impl GameState {
    /// Creates the first state of a session from an observed grid.
    #[must_use]
    pub fn new(grid: Grid, frame_sequence: u64) -> Self {
        Self {
            grid,
            active: None,
            next: ArrayVec::new(),
            held: None,
            total_cleared_lines: 0,
            line_cleared_counter: [0; 5],
            locked_pieces: 0,
            frame_sequence,
            version: 1,
        }
    }

    #[must_use]
    pub fn with_active(mut self, active: Option<Piece>) -> Self {
        self.active = active;
        self
    }

    #[must_use]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    #[must_use]
    pub fn active(&self) -> Option<&Piece> {
        self.active.as_ref()
    }

    #[must_use]
    pub fn next_pieces(&self) -> &[PieceKind] {
        &self.next
    }

    #[must_use]
    pub fn held(&self) -> Option<PieceKind> {
        self.held
    }

    #[must_use]
    pub fn total_cleared_lines(&self) -> usize {
        self.total_cleared_lines
    }

    /// Number of locks that cleared 0, 1, 2, 3, and 4 rows.
    #[must_use]
    pub fn line_cleared_counter(&self) -> &[usize; 5] {
        &self.line_cleared_counter
    }

    #[must_use]
    pub fn locked_pieces(&self) -> usize {
        self.locked_pieces
    }

    /// Sequence number of the frame that produced the latest accepted change.
    #[must_use]
    pub fn frame_sequence(&self) -> u64 {
        self.frame_sequence
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Sets the preview queue and the held piece of a state that has not been published yet.
    ///
    /// Pieces beyond [`MAX_NEXT_PIECES`] are dropped. Later changes go through
    /// [`Transition::Preview`].
    #[must_use]
    pub fn with_preview(mut self, next: &[PieceKind], held: Option<PieceKind>) -> Self {
        self.replace_preview(next, held);
        self
    }

    /// Applies a transition.
    ///
    /// Fails without modifying the state if a locked piece does not fit the grid.
    pub fn apply(
        &mut self,
        transition: &Transition,
        frame_sequence: u64,
    ) -> Result<(), PieceCollisionError> {
        match transition {
            Transition::Unchanged => return Ok(()),
            Transition::Spawn { piece } | Transition::Move { to: piece, .. } => {
                self.active = Some(*piece);
            }
            Transition::Lock { piece, spawned, .. } => {
                let mut grid = self.grid.clone();
                grid.fill_piece(piece)?;
                let cleared = grid.clear_lines();
                self.grid = grid;
                self.record_cleared_lines(cleared);
                self.locked_pieces += 1;
                self.line_cleared_counter[cleared.min(4)] += 1;
                if let Some(spawned) = spawned
                    && self.next.first() == Some(&spawned.kind())
                {
                    self.next.remove(0);
                }
                self.active = *spawned;
            }
            Transition::LineClear { .. } => {
                let cleared = self.grid.clear_lines();
                self.record_cleared_lines(cleared);
            }
            Transition::Preview { next, held } => self.replace_preview(next, *held),
        }
        self.frame_sequence = frame_sequence;
        self.version += 1;
        Ok(())
    }

    /// Advances the version without changing the content.
    ///
    /// Used when a held state is confirmed again after a period of contradictory input.
    pub fn revalidate(&mut self, frame_sequence: u64) {
        self.frame_sequence = frame_sequence;
        self.version += 1;
    }

    fn replace_preview(&mut self, next: &[PieceKind], held: Option<PieceKind>) {
        self.next.clear();
        self.next.extend(next.iter().copied().take(MAX_NEXT_PIECES));
        self.held = held;
    }

    fn record_cleared_lines(&mut self, cleared: usize) {
        self.total_cleared_lines += cleared;
    }
}

#[cfg(test)]
mod tests {
    use crate::PieceRotation;

    use super::*;

    fn o_piece(left: i16, top: i16) -> Piece {
        Piece::with_cells_at(PieceKind::O, PieceRotation::SPAWN, left, top)
    }

    #[test]
    fn test_unchanged_does_not_advance_version() {
        let mut state = GameState::new(Grid::new(4, 4), 1);
        state.apply(&Transition::Unchanged, 2).unwrap();
        assert_eq!(state.version(), 1);
        assert_eq!(state.frame_sequence(), 1);
    }

    #[test]
    fn test_lock_clears_lines_and_spawns() {
        let grid = Grid::from_ascii(
            "
            ....
            ....
            ##..
            ##..
            ",
        );
        let mut state = GameState::new(grid, 1)
            .with_active(Some(o_piece(2, 0)))
            .with_preview(&[PieceKind::T, PieceKind::I], None);

        let spawned = Piece::with_cells_at(PieceKind::T, PieceRotation::SPAWN, 1, 0);
        let transition = Transition::Lock {
            piece: o_piece(2, 2),
            cleared_lines: 2,
            spawned: Some(spawned),
        };
        state.apply(&transition, 7).unwrap();

        assert_eq!(state.grid(), &Grid::new(4, 4));
        assert_eq!(state.total_cleared_lines(), 2);
        assert_eq!(state.line_cleared_counter()[2], 1);
        assert_eq!(state.locked_pieces(), 1);
        assert_eq!(state.active(), Some(&spawned));
        assert_eq!(state.next_pieces(), &[PieceKind::I]);
        assert_eq!(state.frame_sequence(), 7);
        assert_eq!(state.version(), 2);
    }

    #[test]
    fn test_failed_lock_leaves_state_untouched() {
        let grid = Grid::from_ascii(
            "
            ....
            ####
            ",
        );
        let mut state = GameState::new(grid, 1);
        let before = state.clone();
        let transition = Transition::Lock {
            piece: o_piece(0, 0),
            cleared_lines: 0,
            spawned: None,
        };
        assert!(state.apply(&transition, 2).is_err());
        assert_eq!(state, before);
    }

    #[test]
    fn test_preview_is_bounded() {
        let state =
            GameState::new(Grid::new(4, 4), 1).with_preview(&PieceKind::ALL, Some(PieceKind::Z));
        assert_eq!(state.next_pieces(), &PieceKind::ALL[..MAX_NEXT_PIECES]);
        assert_eq!(state.held(), Some(PieceKind::Z));
        assert_eq!(state.version(), 1);
    }

    #[test]
    fn test_preview_change_advances_version() {
        let mut state = GameState::new(Grid::new(4, 4), 1).with_preview(&[PieceKind::T], None);
        let preview = Transition::Preview {
            next: vec![PieceKind::I, PieceKind::L],
            held: Some(PieceKind::T),
        };
        state.apply(&preview, 5).unwrap();
        assert_eq!(state.next_pieces(), &[PieceKind::I, PieceKind::L]);
        assert_eq!(state.held(), Some(PieceKind::T));
        assert_eq!(state.frame_sequence(), 5);
        assert_eq!(state.version(), 2);
        assert_eq!(state.grid().occupied_count(), 0);
    }
}
