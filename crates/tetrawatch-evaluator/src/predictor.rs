//! Placement search: ranking every placement of the active piece.
//!
//! # How It Works
//!
//! 1. **Enumerate placements** - every rotation and every column where the piece fits
//!    horizontally
//! 2. **Drop** - the piece descends from above the grid until the next row would collide;
//!    placements resting partly above the top row are not realizable
//! 3. **Resolve** - the piece is locked onto a copy of the grid and full rows are cleared
//! 4. **Score** - the resulting grid is scored by a [`GridEvaluator`]
//! 5. **Rank** - candidates are sorted by score, then fewer rotation turns, then the
//!    leftmost column
//!
//! # Design: One-Step Lookahead
//!
//! Only the active piece is placed. When the next piece is known and a lookahead weight is
//! configured, each candidate's rank also includes the best score the next piece can reach
//! on the candidate's resulting grid. The stored [`PlacementCandidate::score`] never
//! includes that term, so it is always reproducible from the resulting grid alone.

use std::{cmp::Ordering, collections::HashSet};

use serde::{Deserialize, Serialize};
use tetrawatch_engine::{Grid, Piece, PieceKind, PieceRotation};
use tracing::trace;

use crate::heuristic::GridEvaluator;

/// Rank penalty per unit of lookahead weight when the next piece has no placement.
const TOP_OUT_PENALTY: f32 = 1000.0;

/// A scored placement of the active piece.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacementCandidate {
    column: usize,
    rotation: PieceRotation,
    piece: Piece,
    resulting_grid: Grid,
    cleared_lines: usize,
    score: f32,
    lookahead: Option<f32>,
    rank_score: f32,
}

impl PlacementCandidate {
    /// Leftmost grid column occupied by the placed piece.
    #[must_use]
    pub fn column(&self) -> usize {
        self.column
    }

    /// Rotation with the fewest turns among those landing on the same cells.
    ///
    /// Symmetric pieces report it even when the player reached the placement another way.
    #[must_use]
    pub fn rotation(&self) -> PieceRotation {
        self.rotation
    }

    /// The piece at its resting position.
    #[must_use]
    pub fn piece(&self) -> &Piece {
        &self.piece
    }

    /// Grid after locking the piece and clearing full rows.
    #[must_use]
    pub fn resulting_grid(&self) -> &Grid {
        &self.resulting_grid
    }

    #[must_use]
    pub fn cleared_lines(&self) -> usize {
        self.cleared_lines
    }

    /// Evaluator score of [`Self::resulting_grid`] with [`Self::cleared_lines`].
    #[must_use]
    pub fn score(&self) -> f32 {
        self.score
    }

    /// Best score reachable by the next piece, when it was searched.
    #[must_use]
    pub fn lookahead(&self) -> Option<f32> {
        self.lookahead
    }

    /// Score used for ranking.
    #[must_use]
    pub fn rank_score(&self) -> f32 {
        self.rank_score
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    /// Number of candidates handed to consumers.
    pub max_suggestions: usize,
    /// Weight of the next piece's best score in the ranking; `0.0` disables lookahead.
    pub next_piece_weight: f32,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            max_suggestions: 5,
            next_piece_weight: 0.0,
        }
    }
}

/// Ranks placements of the active piece.
#[derive(Debug)]
pub struct MovePredictor {
    evaluator: Box<dyn GridEvaluator>,
    next_piece_weight: f32,
}

impl MovePredictor {
    #[must_use]
    pub fn new(evaluator: Box<dyn GridEvaluator>) -> Self {
        Self {
            evaluator,
            next_piece_weight: 0.0,
        }
    }

    #[must_use]
    pub fn with_next_piece_weight(mut self, weight: f32) -> Self {
        self.next_piece_weight = weight;
        self
    }

    #[must_use]
    pub fn evaluator(&self) -> &dyn GridEvaluator {
        self.evaluator.as_ref()
    }

    /// Returns all realizable placements of `active`, best first.
    ///
    /// Placements producing identical grids are reported once, under the fewest rotation
    /// turns and the leftmost column. An unknown piece or an empty grid yields no
    /// candidates. `grid` is never modified.
    #[must_use]
    pub fn predict(
        &self,
        grid: &Grid,
        active: Option<PieceKind>,
        next: Option<PieceKind>,
    ) -> Vec<PlacementCandidate> {
        let Some(kind) = active else {
            return Vec::new();
        };
        if grid.is_degenerate() {
            return Vec::new();
        }

        let next = next.filter(|_| self.next_piece_weight != 0.0);
        let mut candidates = available_placements(kind, grid)
            .filter_map(|piece| self.evaluate_placement(grid, piece, next))
            .collect::<Vec<_>>();
        candidates.sort_by(compare_candidates);

        let mut seen = HashSet::new();
        candidates.retain(|c| seen.insert(c.resulting_grid.clone()));
        trace!(
            piece = %kind.as_char(),
            candidates = candidates.len(),
            "ranked placements"
        );
        candidates
    }

    fn evaluate_placement(
        &self,
        grid: &Grid,
        piece: Piece,
        next: Option<PieceKind>,
    ) -> Option<PlacementCandidate> {
        let (resulting_grid, cleared_lines) = place(grid, &piece)?;
        let score = self.evaluator.score_outcome(&resulting_grid, cleared_lines);
        let lookahead = next.map(|next| self.best_score(&resulting_grid, next));
        let rank_score = match lookahead {
            None => score,
            Some(Some(best)) => score + self.next_piece_weight * best,
            Some(None) => score - self.next_piece_weight.abs() * TOP_OUT_PENALTY,
        };
        Some(PlacementCandidate {
            column: usize::try_from(piece.leftmost_column()).ok()?,
            rotation: piece.rotation(),
            piece,
            resulting_grid,
            cleared_lines,
            score,
            lookahead: lookahead.flatten(),
            rank_score,
        })
    }

    fn best_score(&self, grid: &Grid, kind: PieceKind) -> Option<f32> {
        available_placements(kind, grid)
            .filter_map(|piece| place(grid, &piece))
            .map(|(grid, cleared)| self.evaluator.score_outcome(&grid, cleared))
            .max_by(f32::total_cmp)
    }
}

/// Enumerates resting positions of `kind` dropped straight down in every rotation and
/// column.
pub fn available_placements(kind: PieceKind, grid: &Grid) -> impl Iterator<Item = Piece> + '_ {
    let columns = i16::try_from(grid.columns()).unwrap_or(i16::MAX);
    PieceRotation::ALL.into_iter().flat_map(move |rotation| {
        let extent = kind.extent(rotation);
        let min_x = -i16::from(extent.min_x);
        let max_x = columns - 1 - i16::from(extent.max_x);
        let spawn_y = -1 - i16::from(extent.max_y);
        (min_x..=max_x).filter_map(move |x| {
            let dropped = Piece::at(kind, rotation, x, spawn_y).simulate_drop_position(grid);
            grid.contains_piece(&dropped).then_some(dropped)
        })
    })
}

/// Locks `piece` onto a copy of `grid` and clears full rows.
fn place(grid: &Grid, piece: &Piece) -> Option<(Grid, usize)> {
    let mut grid = grid.clone();
    grid.fill_piece(piece).ok()?;
    let cleared = grid.clear_lines();
    Some((grid, cleared))
}

fn compare_candidates(a: &PlacementCandidate, b: &PlacementCandidate) -> Ordering {
    b.rank_score
        .total_cmp(&a.rank_score)
        .then_with(|| a.rotation.turns().cmp(&b.rotation.turns()))
        .then_with(|| a.rotation.cmp(&b.rotation))
        .then_with(|| a.column.cmp(&b.column))
}

#[cfg(test)]
mod tests {
    use rand::{Rng as _, SeedableRng as _};
    use rand_pcg::Pcg64Mcg;
    use tetrawatch_engine::Block;

    use crate::{grid_analysis::GridAnalysis, heuristic::HeuristicEvaluator};

    use super::*;

    fn predictor() -> MovePredictor {
        MovePredictor::new(Box::new(HeuristicEvaluator::default()))
    }

    #[test]
    fn test_unknown_piece_or_degenerate_grid_yields_nothing() {
        let predictor = predictor();
        assert!(predictor.predict(&Grid::new(20, 10), None, None).is_empty());
        assert!(
            predictor
                .predict(&Grid::new(0, 10), Some(PieceKind::T), None)
                .is_empty()
        );
        assert!(
            predictor
                .predict(&Grid::new(20, 0), Some(PieceKind::T), None)
                .is_empty()
        );
    }

    #[test]
    fn test_flat_i_placement_ranks_first_on_empty_grid() {
        let grid = Grid::new(20, 10);
        let ranked = predictor().predict(&grid, Some(PieceKind::I), None);
        assert!(!ranked.is_empty());

        let top = &ranked[0];
        let top_analysis = GridAnalysis::new(top.resulting_grid());
        assert_eq!(top_analysis.num_holes(), 0);
        assert_eq!(top_analysis.max_height(), 1, "top placement lies flat");
        for candidate in &ranked[1..] {
            if GridAnalysis::new(candidate.resulting_grid()).num_holes() > 0 {
                assert!(top.score() > candidate.score());
            }
        }
        // 7 horizontal columns + 10 vertical columns, duplicates removed
        assert_eq!(ranked.len(), 17);
    }

    #[test]
    fn test_hole_introducing_placements_rank_below_flat_ones() {
        let grid = Grid::from_ascii(
            "
            ....
            ....
            ....
            ....
            #...
            ",
        );
        let ranked = predictor().predict(&grid, Some(PieceKind::O), None);
        let top = &ranked[0];
        assert_eq!(GridAnalysis::new(top.resulting_grid()).num_holes(), 0);
        let holed = ranked
            .iter()
            .filter(|c| GridAnalysis::new(c.resulting_grid()).num_holes() > 0)
            .collect::<Vec<_>>();
        assert!(!holed.is_empty());
        assert!(holed.iter().all(|c| c.score() < top.score()));
    }

    #[test]
    fn test_ties_prefer_fewer_rotations_then_leftmost_column() {
        let grid = Grid::new(20, 10);
        let ranked = predictor().predict(&grid, Some(PieceKind::O), None);
        // O looks the same in every rotation
        assert_eq!(ranked.len(), 9);
        assert!(ranked.iter().all(|c| c.rotation() == PieceRotation::SPAWN));
        // both wall placements tie; the left one comes first
        assert_eq!(ranked[0].column(), 0);
        assert_eq!(ranked[1].column(), 8);
        assert_eq!(ranked[0].score().to_bits(), ranked[1].score().to_bits());
    }

    #[test]
    fn test_symmetric_rotations_report_fewest_turns() {
        let grid = Grid::new(20, 10);
        let ranked = predictor().predict(&grid, Some(PieceKind::I), None);
        let rotations = ranked.iter().map(PlacementCandidate::rotation).collect::<Vec<_>>();
        assert!(rotations.contains(&PieceRotation::SPAWN));
        assert!(rotations.contains(&PieceRotation::ALL[1]));
        assert!(
            rotations
                .iter()
                .all(|r| *r == PieceRotation::SPAWN || *r == PieceRotation::ALL[1])
        );
    }

    #[test]
    fn test_line_clear_is_resolved() {
        let grid = Grid::from_ascii(
            "
            ....
            ....
            ....
            ....
            ###.
            ###.
            ",
        );
        let ranked = predictor().predict(&grid, Some(PieceKind::I), None);
        let top = &ranked[0];
        assert_eq!(top.cleared_lines(), 2);
        assert_eq!(top.column(), 3);
        assert_eq!(
            top.resulting_grid(),
            &Grid::from_ascii(
                "
                ....
                ....
                ....
                ....
                ...I
                ...I
                "
            )
        );
    }

    #[test]
    fn test_placements_resting_above_the_top_are_not_realizable() {
        let grid = Grid::from_ascii(
            "
            .#.
            .#.
            ",
        );
        let ranked = predictor().predict(&grid, Some(PieceKind::I), None);
        for candidate in &ranked {
            assert!(grid.contains_piece(candidate.piece()));
        }
        // I needs four columns lying flat and four rows standing up
        assert!(ranked.is_empty());
    }

    #[test]
    fn test_rescoring_resulting_grid_reproduces_score() {
        let evaluator = HeuristicEvaluator::default();
        let predictor = predictor();
        let mut rng = Pcg64Mcg::seed_from_u64(7);
        for _ in 0..50 {
            let mut grid = Grid::new(20, 10);
            for y in 10..20 {
                for x in 0..10 {
                    if rng.random_bool(0.6) {
                        grid.set_block(y, x, Block::Garbage);
                    }
                }
            }
            let original = grid.clone();
            let kind = PieceKind::ALL[rng.random_range(0..PieceKind::LEN)];
            let ranked = predictor.predict(&grid, Some(kind), None);
            assert_eq!(grid, original, "input grid must not be mutated");
            for candidate in &ranked {
                let rescored =
                    evaluator.score_outcome(candidate.resulting_grid(), candidate.cleared_lines());
                assert_eq!(rescored.to_bits(), candidate.score().to_bits());
                if candidate.cleared_lines() == 0 {
                    assert_eq!(
                        evaluator.score(candidate.resulting_grid()).to_bits(),
                        candidate.score().to_bits()
                    );
                }
            }
            assert_eq!(ranked, predictor.predict(&grid, Some(kind), None));
        }
    }

    #[test]
    fn test_lookahead_affects_rank_but_not_score() {
        let grid = Grid::new(20, 10);
        let plain = predictor().predict(&grid, Some(PieceKind::T), Some(PieceKind::I));
        assert!(plain.iter().all(|c| c.lookahead().is_none()));

        let lookahead = predictor()
            .with_next_piece_weight(0.5)
            .predict(&grid, Some(PieceKind::T), Some(PieceKind::I));
        assert_eq!(plain.len(), lookahead.len());
        for candidate in &lookahead {
            let best = candidate.lookahead().unwrap();
            let expected = candidate.score() + 0.5 * best;
            assert_eq!(candidate.rank_score().to_bits(), expected.to_bits());
        }
    }
}
