use std::{collections::VecDeque, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tetrawatch_engine::GameState;
use tetrawatch_evaluator::{
    grid_analysis::GridAnalysis, heuristic::GridEvaluator, predictor::PlacementCandidate,
};
use tracing::{debug, trace};

use crate::hint::{CoachingHint, HintCategory, UrgencyLevel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachingConfig {
    /// Fraction of the grid height above which the stack counts as dangerous.
    pub danger_height: f32,
    /// Number of recent samples used for trends.
    pub trend_window: usize,
    /// Score difference between the best placement and the trend that warrants a hint.
    pub strategy_divergence: f32,
    pub hint_ttl_ms: u64,
    pub max_live_hints: usize,
    pub min_urgency: UrgencyLevel,
    pub history_len: usize,
    pub danger_hints: bool,
    pub strategy_hints: bool,
    pub opportunity_hints: bool,
}

impl Default for CoachingConfig {
    fn default() -> Self {
        Self {
            danger_height: 0.75,
            trend_window: 3,
            strategy_divergence: 2.0,
            hint_ttl_ms: 10_000,
            max_live_hints: 5,
            min_urgency: UrgencyLevel::Low,
            history_len: 32,
            danger_hints: true,
            strategy_hints: true,
            opportunity_hints: true,
        }
    }
}

impl CoachingConfig {
    #[must_use]
    pub fn hint_ttl(&self) -> Duration {
        Duration::from_millis(self.hint_ttl_ms)
    }
}

/// Summary of one reconstructed state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StateSample {
    pub version: u64,
    pub max_height: usize,
    pub holes: usize,
    pub score: f32,
}

/// Turns state history and ranked placements into short-lived hints.
#[derive(Debug)]
pub struct CoachingGenerator {
    config: CoachingConfig,
    evaluator: Box<dyn GridEvaluator>,
    history: VecDeque<StateSample>,
    live: Vec<CoachingHint>,
}

impl CoachingGenerator {
    #[must_use]
    pub fn new(config: CoachingConfig, evaluator: Box<dyn GridEvaluator>) -> Self {
        Self {
            config,
            evaluator,
            history: VecDeque::new(),
            live: Vec::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &CoachingConfig {
        &self.config
    }

    /// Samples recorded so far, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &StateSample> {
        self.history.iter()
    }

    /// Updates the live hint set for `state` and returns it, most urgent first.
    ///
    /// `ranked` is the predictor output for `state`, best first.
    pub fn generate(
        &mut self,
        state: &GameState,
        ranked: &[PlacementCandidate],
        now: DateTime<Utc>,
    ) -> Vec<CoachingHint> {
        self.live.retain(|hint| !hint.is_expired(now));
        self.sample(state);

        let mut fresh = Vec::new();
        if self.config.danger_hints {
            fresh.extend(self.height_hint(state, now));
            fresh.extend(self.holes_hint(now));
        }
        if self.config.strategy_hints {
            fresh.extend(self.strategy_hint(ranked, now));
        }
        if self.config.opportunity_hints {
            fresh.extend(self.opportunity_hint(ranked, now));
        }

        for hint in fresh {
            if hint.level() < self.config.min_urgency {
                trace!(message = %hint.message, "hint below minimum urgency");
                continue;
            }
            self.insert(hint);
        }

        let mut live = self.live.clone();
        live.sort_by(|a, b| b.urgency.total_cmp(&a.urgency));
        live
    }

    fn sample(&mut self, state: &GameState) {
        if self
            .history
            .back()
            .is_some_and(|last| last.version == state.version())
        {
            return;
        }
        let analysis = GridAnalysis::new(state.grid());
        let sample = StateSample {
            version: state.version(),
            max_height: analysis.max_height(),
            holes: analysis.num_holes(),
            score: self.evaluator.score(state.grid()),
        };
        trace!(?sample, "state sample");
        self.history.push_back(sample);
        while self.history.len() > self.config.history_len.max(self.config.trend_window) {
            self.history.pop_front();
        }
    }

    fn recent(&self) -> impl Iterator<Item = &StateSample> {
        let skip = self.history.len().saturating_sub(self.config.trend_window);
        self.history.iter().skip(skip)
    }

    fn hint(
        &self,
        category: HintCategory,
        message: String,
        urgency: f32,
        now: DateTime<Utc>,
    ) -> CoachingHint {
        CoachingHint::new(category, message, urgency, 1.0, now, self.config.hint_ttl())
    }

    #[expect(clippy::cast_precision_loss)]
    fn height_hint(&self, state: &GameState, now: DateTime<Utc>) -> Option<CoachingHint> {
        let rows = state.grid().rows();
        let height = GridAnalysis::new(state.grid()).max_height();
        let threshold = self.config.danger_height * rows as f32;
        let excess = height as f32 - threshold;
        if excess <= 0.0 {
            return None;
        }
        let headroom = (rows as f32 - threshold).max(1.0);
        let urgency = 0.5 + 0.5 * (excess / headroom).min(1.0);
        Some(self.hint(
            HintCategory::Danger,
            format!("Stack is {height} of {rows} rows high, bring it down"),
            urgency,
            now,
        ))
    }

    #[expect(clippy::cast_precision_loss)]
    fn holes_hint(&self, now: DateTime<Utc>) -> Option<CoachingHint> {
        let holes = self.recent().map(|s| s.holes).collect::<Vec<_>>();
        if holes.len() < self.config.trend_window.max(2) {
            return None;
        }
        if !holes.windows(2).all(|w| w[0] < w[1]) {
            return None;
        }
        let (first, last) = (holes[0], holes[holes.len() - 1]);
        let rise = last - first;
        Some(self.hint(
            HintCategory::Danger,
            format!("Holes keep growing ({first} to {last}), keep the surface flat"),
            (0.5 + 0.1 * rise as f32).min(1.0),
            now,
        ))
    }

    fn strategy_hint(
        &self,
        ranked: &[PlacementCandidate],
        now: DateTime<Utc>,
    ) -> Option<CoachingHint> {
        let best = ranked.first()?;
        let trajectory = extrapolate(&self.recent().map(|s| s.score).collect::<Vec<_>>())?;
        let delta = best.score() - trajectory;
        let threshold = self.config.strategy_divergence;
        if delta.abs() <= threshold {
            return None;
        }
        let urgency = 0.3 + 0.4 * ((delta.abs() - threshold) / threshold).min(1.0);
        let message = if delta > 0.0 {
            format!(
                "Column {} rotation {} beats the recent trend",
                best.column(),
                u8::from(best.rotation())
            )
        } else {
            "Board quality is falling faster than any placement can recover".to_owned()
        };
        debug!(delta, trajectory, "strategy divergence");
        Some(self.hint(HintCategory::Strategy, message, urgency, now))
    }

    #[expect(clippy::cast_precision_loss)]
    fn opportunity_hint(
        &self,
        ranked: &[PlacementCandidate],
        now: DateTime<Utc>,
    ) -> Option<CoachingHint> {
        let candidate = ranked.iter().find(|c| c.cleared_lines() > 0)?;
        let lines = candidate.cleared_lines();
        let noun = if lines == 1 { "line" } else { "lines" };
        Some(self.hint(
            HintCategory::Opportunity,
            format!(
                "Column {} rotation {} clears {lines} {noun}",
                candidate.column(),
                u8::from(candidate.rotation())
            ),
            (0.25 + 0.15 * lines as f32).min(1.0),
            now,
        ))
    }

    fn insert(&mut self, hint: CoachingHint) {
        self.live.retain(|old| !hint.supersedes(old));
        self.live.push(hint);
        while self.live.len() > self.config.max_live_hints {
            // the oldest of the least urgent goes first
            let Some(idx) = self
                .live
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.urgency.total_cmp(&b.urgency))
                .map(|(idx, _)| idx)
            else {
                break;
            };
            let evicted = self.live.remove(idx);
            trace!(message = %evicted.message, "hint evicted");
        }
    }
}

/// Least-squares line through `scores` evaluated one step past the last sample.
#[expect(clippy::cast_precision_loss)]
fn extrapolate(scores: &[f32]) -> Option<f32> {
    if scores.len() < 2 {
        return None;
    }
    let n = scores.len() as f32;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = scores.iter().sum::<f32>() / n;
    let (mut num, mut den) = (0.0, 0.0);
    for (i, &y) in scores.iter().enumerate() {
        let dx = i as f32 - mean_x;
        num += dx * (y - mean_y);
        den += dx * dx;
    }
    let slope = num / den;
    Some(mean_y + slope * (n - mean_x))
}
