use serde::{Deserialize, Serialize};
use tetrawatch_engine::{Block, GameState, Grid, MAX_NEXT_PIECES, PieceKind, Transition};
use tetrawatch_vision::recognizer::{Observation, Occupancy};
use tracing::{debug, info, warn};

use crate::search::find_transition;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Observations with a larger share of unknown cells are skipped.
    pub max_unknown_fraction: f32,
    /// Known cells allowed to disagree with an explanation.
    pub mismatch_tolerance: usize,
    /// Contradictory frames tolerated in [`Phase::Degraded`] before faulting.
    pub degraded_frame_limit: u32,
    /// Consistent observations needed to resume tracking.
    pub recovery_frames: u32,
    pub next_queue_len: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_unknown_fraction: 0.25,
            mismatch_tolerance: 0,
            degraded_frame_limit: 10,
            recovery_frames: 3,
            next_queue_len: 5,
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::IsVariant,
)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No trustworthy observation yet.
    #[display("uninitialized")]
    Uninitialized,
    #[display("tracking")]
    Tracking,
    /// Observations contradict the state; it is held unchanged.
    #[display("degraded")]
    Degraded,
    /// Contradictions persisted; recalibration has been requested.
    #[display("faulted")]
    Faulted,
}

/// Result of feeding one observation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconstructOutcome {
    pub phase: Phase,
    /// The transition that explained the observation, if any.
    pub transition: Option<Transition>,
    /// Set exactly once per entry into [`Phase::Faulted`].
    pub recalibration_requested: bool,
}

/// Rebuilds the game state from per-frame observations.
///
/// The state only ever changes through a legal [`Transition`]. An observation no legal
/// transition explains is treated as a recognition fault: the state is held and the
/// machine degrades until observations agree with it again.
#[derive(Debug)]
pub struct Reconstructor {
    config: TrackerConfig,
    phase: Phase,
    state: Option<GameState>,
    /// Copy of the held state advanced by the observations seen while recovering.
    staged: Option<GameState>,
    contradictions: u32,
    consistent: u32,
}

impl Reconstructor {
    #[must_use]
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            phase: Phase::Uninitialized,
            state: None,
            staged: None,
            contradictions: 0,
            consistent: 0,
        }
    }

    #[must_use]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The live state; `None` until the first confident observation.
    #[must_use]
    pub fn state(&self) -> Option<&GameState> {
        self.state.as_ref()
    }

    /// Forgets everything and waits for a new first observation.
    pub fn reset(&mut self) {
        info!(phase = %self.phase, "tracking reset");
        *self = Self::new(self.config.clone());
    }

    pub fn observe(&mut self, observation: &Observation) -> ReconstructOutcome {
        if self.phase.is_uninitialized() {
            self.initialize(observation);
            return self.outcome(None, false);
        }
        if observation.cells.unknown_fraction() > self.config.max_unknown_fraction {
            debug!(
                sequence = observation.sequence,
                unknown = observation.cells.unknown_count(),
                "observation insufficient, skipped"
            );
            return self.outcome(None, false);
        }
        match self.phase {
            Phase::Tracking => self.track(observation),
            Phase::Degraded | Phase::Faulted => self.recover(observation),
            Phase::Uninitialized => self.outcome(None, false),
        }
    }

    fn outcome(
        &self,
        transition: Option<Transition>,
        recalibration_requested: bool,
    ) -> ReconstructOutcome {
        ReconstructOutcome {
            phase: self.phase,
            transition,
            recalibration_requested,
        }
    }

    fn initialize(&mut self, observation: &Observation) {
        let cells = &observation.cells;
        if cells.rows() == 0 || cells.columns() == 0 || cells.unknown_count() > 0 {
            return;
        }
        let active = observation.active.map(|a| a.piece());
        let mut grid = Grid::new(cells.rows(), cells.columns());
        for cell in cells.iter() {
            if cell.occupancy == Occupancy::Occupied {
                let block = cell.identity.map_or(Block::Garbage, Block::Piece);
                grid.set_block(cell.row, cell.column, block);
            }
        }
        if let Some(piece) = &active {
            for (x, y) in piece.occupied_positions() {
                if let (Ok(x), Ok(y)) = (usize::try_from(x), usize::try_from(y))
                    && y < grid.rows()
                    && x < grid.columns()
                {
                    grid.set_block(y, x, Block::Empty);
                }
            }
        }
        let mut state = GameState::new(grid, observation.sequence).with_active(active);
        if let Some((next, held)) = self.observed_preview(&state, observation) {
            state = state.with_preview(&next, held);
        }
        info!(sequence = observation.sequence, "tracking started");
        self.state = Some(state);
        self.phase = Phase::Tracking;
    }

    /// Preview queue and held piece shown by the observation, if they differ from the state.
    fn observed_preview(
        &self,
        state: &GameState,
        observation: &Observation,
    ) -> Option<(Vec<PieceKind>, Option<PieceKind>)> {
        if observation.next.is_empty() && observation.held.is_none() {
            return None;
        }
        let next: Vec<PieceKind> = if observation.next.is_empty() {
            state.next_pieces().to_vec()
        } else {
            let capacity = self.config.next_queue_len.min(MAX_NEXT_PIECES);
            observation.next.iter().copied().take(capacity).collect()
        };
        let held = observation.held.or(state.held());
        (next != state.next_pieces() || held != state.held()).then_some((next, held))
    }

    fn refresh_preview(&self, state: &mut GameState, observation: &Observation) {
        let Some((next, held)) = self.observed_preview(state, observation) else {
            return;
        };
        let preview = Transition::Preview { next, held };
        if state.apply(&preview, observation.sequence).is_ok() {
            debug!(
                sequence = observation.sequence,
                version = state.version(),
                "preview changed"
            );
        }
    }

    fn track(&mut self, observation: &Observation) -> ReconstructOutcome {
        let Some(mut state) = self.state.take() else {
            return self.outcome(None, false);
        };
        let explained = find_transition(&state, observation, self.config.mismatch_tolerance);
        let applied = explained.filter(|t| {
            let mut next = state.clone();
            let ok = next.apply(t, observation.sequence).is_ok();
            if ok {
                state = next;
            }
            ok
        });
        if let Some(transition) = &applied {
            self.refresh_preview(&mut state, observation);
            if transition.changes_state() {
                debug!(
                    sequence = observation.sequence,
                    version = state.version(),
                    ?transition,
                    "transition applied"
                );
            }
        }
        self.state = Some(state);

        if applied.is_none() {
            self.phase = Phase::Degraded;
            self.contradictions = 1;
            self.consistent = 0;
            self.staged = None;
            info!(
                sequence = observation.sequence,
                "observation contradicts state, tracking degraded"
            );
        }
        self.outcome(applied, false)
    }

    fn recover(&mut self, observation: &Observation) -> ReconstructOutcome {
        let Some(held) = &self.state else {
            return self.outcome(None, false);
        };
        let tolerance = self.config.mismatch_tolerance;
        let base = self.staged.take().unwrap_or_else(|| held.clone());

        let attempt = find_transition(&base, observation, tolerance)
            .map(|t| (base, t))
            .or_else(|| find_transition(held, observation, tolerance).map(|t| (held.clone(), t)))
            .and_then(|(mut candidate, t)| {
                candidate.apply(&t, observation.sequence).ok()?;
                Some((candidate, t))
            });

        let Some((mut candidate, transition)) = attempt else {
            return self.contradict(observation);
        };
        self.refresh_preview(&mut candidate, observation);
        self.consistent += 1;
        if self.consistent < self.config.recovery_frames {
            self.staged = Some(candidate);
            return self.outcome(Some(transition), false);
        }

        candidate.revalidate(observation.sequence);
        info!(
            sequence = observation.sequence,
            version = candidate.version(),
            from = %self.phase,
            "tracking recovered"
        );
        self.state = Some(candidate);
        self.phase = Phase::Tracking;
        self.contradictions = 0;
        self.consistent = 0;
        self.outcome(Some(transition), false)
    }

    fn contradict(&mut self, observation: &Observation) -> ReconstructOutcome {
        self.consistent = 0;
        self.staged = None;
        if self.phase.is_degraded() {
            if self.contradictions >= self.config.degraded_frame_limit {
                self.phase = Phase::Faulted;
                warn!(
                    sequence = observation.sequence,
                    contradictions = self.contradictions + 1,
                    "state cannot be reconciled, recalibration requested"
                );
                return self.outcome(None, true);
            }
            self.contradictions += 1;
        }
        debug!(
            sequence = observation.sequence,
            phase = %self.phase,
            "contradictory observation"
        );
        self.outcome(None, false)
    }
}

#[cfg(test)]
mod tests {
    use tetrawatch_engine::{Piece, PieceRotation};
    use tetrawatch_vision::recognizer::CellGrid;

    use super::*;

    const START: &str = "
        ....
        ....
        ....
        ....
        #...
        ##..
    ";

    const CONTRADICTION: &str = "
        ....
        ...#
        ....
        ....
        #...
        ##..
    ";

    fn observation(sequence: u64, art: &str) -> Observation {
        Observation::new(sequence, CellGrid::from_ascii(art))
    }

    fn o_piece(left: i16, top: i16) -> Piece {
        Piece::with_cells_at(PieceKind::O, PieceRotation::SPAWN, left, top)
    }

    fn tracking() -> Reconstructor {
        let mut reconstructor = Reconstructor::new(TrackerConfig::default());
        reconstructor.observe(&observation(1, START));
        assert_eq!(reconstructor.phase(), Phase::Tracking);
        reconstructor
    }

    fn version(reconstructor: &Reconstructor) -> u64 {
        reconstructor.state().unwrap().version()
    }

    #[test]
    fn test_waits_for_a_confident_first_observation() {
        let mut reconstructor = Reconstructor::new(TrackerConfig::default());
        let outcome = reconstructor.observe(&observation(
            1,
            "
            ....
            ....
            ....
            ....
            #?..
            ##..
            ",
        ));
        assert_eq!(outcome.phase, Phase::Uninitialized);
        assert!(reconstructor.state().is_none());

        let outcome = reconstructor.observe(&observation(2, START));
        assert_eq!(outcome.phase, Phase::Tracking);
        let state = reconstructor.state().unwrap();
        assert_eq!(state.version(), 1);
        assert_eq!(state.frame_sequence(), 2);
        assert_eq!(state.grid(), &Grid::from_ascii(START));
    }

    #[test]
    fn test_first_observation_separates_active_piece() {
        let mut reconstructor = Reconstructor::new(TrackerConfig::default());
        let obs = observation(
            1,
            "
            .OO.
            .OO.
            ....
            ....
            #...
            ##..
            ",
        )
        .with_active(Some(o_piece(1, 0)));
        reconstructor.observe(&obs);
        let state = reconstructor.state().unwrap();
        assert_eq!(state.grid(), &Grid::from_ascii(START));
        assert_eq!(state.active(), Some(&o_piece(1, 0)));
    }

    #[test]
    fn test_unchanged_observation_keeps_version() {
        let mut reconstructor = tracking();
        for sequence in 2..4 {
            let outcome = reconstructor.observe(&observation(sequence, START));
            assert_eq!(outcome.transition, Some(Transition::Unchanged));
            assert_eq!(version(&reconstructor), 1);
        }
    }

    #[test]
    fn test_spawn_move_lock_sequence() {
        let mut reconstructor = tracking();

        let spawned = observation(
            2,
            "
            .OO.
            .OO.
            ....
            ....
            #...
            ##..
            ",
        )
        .with_active(Some(o_piece(1, 0)));
        let outcome = reconstructor.observe(&spawned);
        assert_eq!(
            outcome.transition,
            Some(Transition::Spawn {
                piece: o_piece(1, 0)
            })
        );
        assert_eq!(version(&reconstructor), 2);

        let moved = observation(
            3,
            "
            ....
            ....
            ..OO
            ..OO
            #...
            ##..
            ",
        )
        .with_active(Some(o_piece(2, 2)));
        let outcome = reconstructor.observe(&moved);
        assert_eq!(
            outcome.transition,
            Some(Transition::Move {
                from: o_piece(1, 0),
                to: o_piece(2, 2)
            })
        );
        assert_eq!(version(&reconstructor), 3);

        let locked = observation(
            4,
            "
            ....
            ....
            ....
            ....
            ....
            #.OO
            ",
        );
        let outcome = reconstructor.observe(&locked);
        assert_eq!(
            outcome.transition,
            Some(Transition::Lock {
                piece: o_piece(2, 4),
                cleared_lines: 1,
                spawned: None
            })
        );
        let state = reconstructor.state().unwrap();
        assert_eq!(state.version(), 4);
        assert_eq!(state.total_cleared_lines(), 1);
        assert_eq!(state.active(), None);
        assert_eq!(state.frame_sequence(), 4);
    }

    #[test]
    fn test_line_clear_of_pending_rows() {
        let mut reconstructor = Reconstructor::new(TrackerConfig::default());
        reconstructor.observe(&observation(
            1,
            "
            ....
            #...
            ####
            ",
        ));
        let outcome = reconstructor.observe(&observation(
            2,
            "
            ....
            ....
            #...
            ",
        ));
        assert_eq!(
            outcome.transition,
            Some(Transition::LineClear { cleared_lines: 1 })
        );
        let state = reconstructor.state().unwrap();
        assert_eq!(state.grid().rows(), 3);
        assert_eq!(state.total_cleared_lines(), 1);
    }

    #[test]
    fn test_locked_group_reported_as_active_is_unchanged() {
        let board = "
            ....
            ....
            .T..
            TTT.
        ";
        let mut reconstructor = Reconstructor::new(TrackerConfig::default());
        reconstructor.observe(&observation(1, board));
        let reported = observation(2, board).with_active(Some(Piece::with_cells_at(
            PieceKind::T,
            PieceRotation::SPAWN,
            0,
            2,
        )));
        let outcome = reconstructor.observe(&reported);
        assert_eq!(outcome.transition, Some(Transition::Unchanged));
        assert_eq!(version(&reconstructor), 1);
    }

    #[test]
    fn test_contradiction_degrades_and_holds_state() {
        let mut reconstructor = tracking();
        let outcome = reconstructor.observe(&observation(2, CONTRADICTION));
        assert_eq!(outcome.phase, Phase::Degraded);
        assert_eq!(outcome.transition, None);
        assert!(!outcome.recalibration_requested);
        let state = reconstructor.state().unwrap();
        assert_eq!(state.version(), 1);
        assert_eq!(state.grid(), &Grid::from_ascii(START));
    }

    #[test]
    fn test_sustained_contradictions_fault_once() {
        let mut reconstructor = tracking();
        let limit = reconstructor.config().degraded_frame_limit;
        let mut requests = 0;
        let mut sequence = 2;
        // the entering contradiction plus `limit - 1` more stay degraded
        for _ in 0..limit {
            let outcome = reconstructor.observe(&observation(sequence, CONTRADICTION));
            assert_eq!(outcome.phase, Phase::Degraded);
            requests += u32::from(outcome.recalibration_requested);
            sequence += 1;
        }
        for _ in 0..5 {
            let outcome = reconstructor.observe(&observation(sequence, CONTRADICTION));
            assert_eq!(outcome.phase, Phase::Faulted);
            requests += u32::from(outcome.recalibration_requested);
            sequence += 1;
        }
        assert_eq!(requests, 1);
        assert_eq!(version(&reconstructor), 1);
    }

    #[test]
    fn test_insufficient_observations_are_skipped() {
        let mut reconstructor = tracking();
        let blurred = observation(
            2,
            "
            ????
            ????
            ????
            ????
            #...
            ##..
            ",
        );
        let outcome = reconstructor.observe(&blurred);
        assert_eq!(outcome.phase, Phase::Tracking);
        assert_eq!(outcome.transition, None);
        assert_eq!(version(&reconstructor), 1);
    }

    #[test]
    fn test_recovery_after_fault_advances_version() {
        let mut reconstructor = tracking();
        let mut sequence = 2;
        while !reconstructor.phase().is_faulted() {
            reconstructor.observe(&observation(sequence, CONTRADICTION));
            sequence += 1;
        }
        let held = version(&reconstructor);

        // a contradiction in the middle restarts the count
        for art in [START, START, CONTRADICTION, START, START] {
            let outcome = reconstructor.observe(&observation(sequence, art));
            assert_eq!(outcome.phase, Phase::Faulted);
            sequence += 1;
        }
        let outcome = reconstructor.observe(&observation(sequence, START));
        assert_eq!(outcome.phase, Phase::Tracking);
        assert!(!outcome.recalibration_requested);

        let state = reconstructor.state().unwrap();
        assert!(state.version() > held);
        assert_eq!(state.version(), held + 1);
        assert_eq!(state.frame_sequence(), sequence);
    }

    #[test]
    fn test_recovery_counts_staged_transitions() {
        let mut reconstructor = tracking();
        reconstructor.observe(&observation(2, CONTRADICTION));
        assert!(reconstructor.phase().is_degraded());

        let spawned = "
            .OO.
            .OO.
            ....
            ....
            #...
            ##..
        ";
        let moved = "
            ....
            .OO.
            .OO.
            ....
            #...
            ##..
        ";
        reconstructor.observe(&observation(3, spawned).with_active(Some(o_piece(1, 0))));
        reconstructor.observe(&observation(4, moved).with_active(Some(o_piece(1, 1))));
        assert!(reconstructor.phase().is_degraded());
        let outcome =
            reconstructor.observe(&observation(5, moved).with_active(Some(o_piece(1, 1))));
        assert_eq!(outcome.phase, Phase::Tracking);
        assert_eq!(outcome.transition, Some(Transition::Unchanged));

        // held version 1, spawn and move staged, then revalidated
        let state = reconstructor.state().unwrap();
        assert_eq!(state.version(), 4);
        assert_eq!(state.active(), Some(&o_piece(1, 1)));
    }

    #[test]
    fn test_preview_refresh_is_bounded() {
        let mut reconstructor = tracking();
        let obs = observation(2, START).with_preview(&PieceKind::ALL, Some(PieceKind::Z));
        reconstructor.observe(&obs);
        let state = reconstructor.state().unwrap();
        assert_eq!(state.next_pieces(), &PieceKind::ALL[..5]);
        assert_eq!(state.held(), Some(PieceKind::Z));

        // an observation without preview keeps the known queue
        reconstructor.observe(&observation(3, START));
        assert_eq!(reconstructor.state().unwrap().next_pieces().len(), 5);
    }

    #[test]
    fn test_preview_change_advances_version() {
        let mut reconstructor = tracking();
        let first = [PieceKind::T, PieceKind::I];
        let outcome = reconstructor.observe(&observation(2, START).with_preview(&first, None));
        assert_eq!(outcome.transition, Some(Transition::Unchanged));
        assert_eq!(version(&reconstructor), 2);
        assert_eq!(reconstructor.state().unwrap().frame_sequence(), 2);

        // the same preview again is not a change
        reconstructor.observe(&observation(3, START).with_preview(&first, None));
        assert_eq!(version(&reconstructor), 2);

        reconstructor.observe(&observation(4, START).with_preview(&first, Some(PieceKind::L)));
        assert_eq!(version(&reconstructor), 3);
        assert_eq!(reconstructor.state().unwrap().held(), Some(PieceKind::L));
    }

    #[test]
    fn test_first_preview_keeps_initial_version() {
        let mut reconstructor = Reconstructor::new(TrackerConfig::default());
        reconstructor.observe(&observation(1, START).with_preview(&[PieceKind::S], None));
        let state = reconstructor.state().unwrap();
        assert_eq!(state.next_pieces(), &[PieceKind::S]);
        assert_eq!(state.version(), 1);
    }

    #[test]
    fn test_reset() {
        let mut reconstructor = tracking();
        reconstructor.reset();
        assert!(reconstructor.phase().is_uninitialized());
        assert!(reconstructor.state().is_none());
    }

    #[test]
    fn test_outcome_serializes() {
        let outcome = ReconstructOutcome {
            phase: Phase::Degraded,
            transition: Some(Transition::LineClear { cleared_lines: 2 }),
            recalibration_requested: false,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["phase"], "degraded");
        assert_eq!(json["transition"]["type"], "line_clear");
    }
}
