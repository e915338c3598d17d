//! Transition search: which legal change explains an observation?

use arrayvec::ArrayVec;
use tetrawatch_engine::{Block, GameState, Grid, Piece, Transition};
use tetrawatch_evaluator::predictor::available_placements;
use tetrawatch_vision::recognizer::{CellGrid, Observation, Occupancy};
use tracing::trace;

/// Number of known cells that contradict `grid` with `active` drawn on it.
///
/// `Unknown` cells match anything. Returns `None` if the dimensions differ.
pub(crate) fn mismatches(cells: &CellGrid, grid: &Grid, active: Option<&Piece>) -> Option<usize> {
    if cells.rows() != grid.rows() || cells.columns() != grid.columns() {
        return None;
    }
    let active_cells = active
        .map(|p| p.occupied_positions().collect::<ArrayVec<_, 4>>())
        .unwrap_or_default();
    let covered = |row: usize, column: usize| {
        active_cells.iter().any(|&(x, y)| {
            usize::try_from(x).is_ok_and(|x| x == column)
                && usize::try_from(y).is_ok_and(|y| y == row)
        })
    };
    let count = cells
        .iter()
        .filter(|cell| {
            let expected =
                grid.is_occupied(cell.row, cell.column) || covered(cell.row, cell.column);
            match cell.occupancy {
                Occupancy::Occupied => !expected,
                Occupancy::Empty => expected,
                Occupancy::Unknown => false,
            }
        })
        .count();
    Some(count)
}

/// Whether the reported active piece agrees with the expected one.
///
/// A missing report always agrees. A reported piece lying entirely on occupied cells of
/// `grid` agrees too: locked blocks that happen to form a tetromino are indistinguishable
/// from a falling piece on a single frame.
fn active_agrees(expected: Option<&Piece>, observed: Option<&Piece>, grid: &Grid) -> bool {
    let Some(observed) = observed else {
        return true;
    };
    if expected.is_some_and(|e| e.same_footprint(observed)) {
        return true;
    }
    observed
        .occupied_positions()
        .all(|(x, y)| match (usize::try_from(x), usize::try_from(y)) {
            (Ok(x), Ok(y)) => grid.get(y, x).is_some_and(Block::is_occupied),
            _ => false,
        })
}

fn explains(
    observation: &Observation,
    grid: &Grid,
    active: Option<&Piece>,
    tolerance: usize,
) -> bool {
    let observed = observation.active.map(|a| a.piece());
    active_agrees(active, observed.as_ref(), grid)
        && mismatches(&observation.cells, grid, active).is_some_and(|n| n <= tolerance)
}

/// First legal transition from `state` that explains `observation`.
///
/// Candidates are tried from the smallest change to the largest: unchanged, move, spawn,
/// line clear, lock.
pub(crate) fn find_transition(
    state: &GameState,
    observation: &Observation,
    tolerance: usize,
) -> Option<Transition> {
    let grid = state.grid();
    let previous = state.active().copied();
    let observed = observation.active.map(|a| a.piece());

    if explains(observation, grid, previous.as_ref(), tolerance) {
        return Some(Transition::Unchanged);
    }

    if let Some(to) = observed
        && !grid.is_colliding(&to)
    {
        match previous {
            Some(from) if from.kind() == to.kind() => {
                if !from.same_footprint(&to) && explains(observation, grid, Some(&to), tolerance)
                {
                    return Some(Transition::Move { from, to });
                }
            }
            // nothing active yet, or the active piece was swapped with the held one
            _ => {
                if explains(observation, grid, Some(&to), tolerance) {
                    return Some(Transition::Spawn { piece: to });
                }
            }
        }
    }

    if grid.full_rows() > 0 {
        let mut cleared = grid.clone();
        let cleared_lines = cleared.clear_lines();
        if explains(observation, &cleared, previous.as_ref(), tolerance) {
            return Some(Transition::LineClear { cleared_lines });
        }
    }

    let previous = previous?;
    let straight = previous.simulate_drop_position(grid);
    let poses = std::iter::once(straight).chain(
        available_placements(previous.kind(), grid).filter(|p| !p.same_footprint(&straight)),
    );
    for piece in poses {
        let mut locked = grid.clone();
        if locked.fill_piece(&piece).is_err() {
            continue;
        }
        let cleared_lines = locked.clear_lines();
        let spawned = observed.filter(|p| !locked.is_colliding(p));
        if explains(observation, &locked, spawned.as_ref(), tolerance) {
            trace!(%piece, cleared_lines, "lock explains observation");
            return Some(Transition::Lock {
                piece,
                cleared_lines,
                spawned,
            });
        }
    }
    None
}
