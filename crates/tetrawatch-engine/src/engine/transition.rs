use serde::{Deserialize, Serialize};

use crate::core::piece::{Piece, PieceKind};

/// A legal change between two consecutive game states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_more::IsVariant)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transition {
    /// Nothing changed.
    Unchanged,
    /// A new active piece appeared while the grid stayed the same.
    Spawn { piece: Piece },
    /// The active piece was translated and/or rotated.
    Move { from: Piece, to: Piece },
    /// The active piece became part of the grid, full rows were removed, and the next
    /// piece (if already visible) spawned.
    Lock {
        piece: Piece,
        cleared_lines: usize,
        spawned: Option<Piece>,
    },
    /// Full rows already on the grid were removed.
    LineClear { cleared_lines: usize },
    /// The preview queue or the held piece changed.
    Preview {
        next: Vec<PieceKind>,
        held: Option<PieceKind>,
    },
}

impl Transition {
    /// Returns `true` if applying the transition changes the state.
    #[must_use]
    pub fn changes_state(&self) -> bool {
        !self.is_unchanged()
    }

    #[must_use]
    pub fn cleared_lines(&self) -> usize {
        match self {
            Transition::Lock { cleared_lines, .. } | Transition::LineClear { cleared_lines } => {
                *cleared_lines
            }
            Transition::Unchanged
            | Transition::Spawn { .. }
            | Transition::Move { .. }
            | Transition::Preview { .. } => 0,
        }
    }
}
