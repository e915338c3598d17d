use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use chrono::Utc;
use serde::Serialize;
use tetrawatch_coach::{CoachingGenerator, CoachingHint};
use tetrawatch_engine::GameState;
use tetrawatch_evaluator::{
    heuristic::HeuristicEvaluator,
    predictor::{MovePredictor, PlacementCandidate},
};
use tetrawatch_stats::monitor::{PerformanceMonitor, Stage};
use tetrawatch_tracker::{Phase, Reconstructor};
use tetrawatch_vision::{
    calibration::Calibration,
    frame::{CaptureFault, Frame},
    localizer::{BoardLocalizer, LocalizationFailure},
    recognizer::Recognizer,
    source::FrameSource,
};
use tracing::{debug, info, trace, warn};

use crate::{
    config::{ConfigError, FrameDropPolicy, SessionConfig},
    sink::FrameSink,
    worker::{PredictionWorker, rank},
};

/// Result of one processed frame.
#[derive(Debug, Clone, Serialize)]
pub struct FrameOutput {
    pub sequence: u64,
    /// Latest reconstructed state; `None` until tracking starts.
    pub state: Option<Arc<GameState>>,
    /// Best placements for `state`, best first.
    pub candidates: Vec<PlacementCandidate>,
    /// Live hints, most urgent first.
    pub hints: Vec<CoachingHint>,
    pub phase: Phase,
    /// The frame was read with the last known good calibration, not a confirmed one.
    pub degraded_calibration: bool,
    pub warnings: Vec<SessionWarning>,
}

/// Persistent problem worth telling the user about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, derive_more::Display, derive_more::IsVariant)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionWarning {
    #[display("capture failed {faults} times in a row")]
    SustainedCaptureFault { faults: u32 },
    #[display("observations keep contradicting the game, recalibration recommended")]
    RecalibrationRecommended,
    #[display("playfield lost, showing the last known state")]
    PlayfieldLost,
}

/// How a frame was handled.
#[derive(Debug, derive_more::IsVariant)]
pub enum FrameStatus {
    Processed,
    /// Older than the frame budget when it arrived; not emitted.
    Stale { age: Duration },
    /// Localization and recognition used up the frame budget; not emitted.
    OverBudget { elapsed: Duration },
    /// No calibration is available for the frame.
    ///
    /// Once tracking has started the held state is still emitted, flagged with
    /// [`SessionWarning::PlayfieldLost`] when the playfield is gone.
    Unlocated(LocalizationFailure),
}

/// Why [`Session::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::IsVariant)]
pub enum RunExit {
    #[display("stopped")]
    Stopped,
    #[display("source exhausted")]
    SourceExhausted,
}

#[derive(Debug)]
enum Prediction {
    Inline(MovePredictor),
    Offloaded(PredictionWorker),
}

/// One analysis session: a frame source, the perception and tracking stages, and a sink.
#[derive(Debug)]
pub struct Session<S, K> {
    config: SessionConfig,
    source: S,
    sink: K,
    localizer: BoardLocalizer,
    recognizer: Recognizer,
    reconstructor: Reconstructor,
    prediction: Prediction,
    coach: CoachingGenerator,
    monitor: Arc<PerformanceMonitor>,
    state: Option<Arc<GameState>>,
    ranked: Arc<[PlacementCandidate]>,
    ranked_version: Option<u64>,
    capture_faults: u32,
    warnings: Vec<SessionWarning>,
}

impl<S, K> Session<S, K>
where
    S: FrameSource,
    K: FrameSink,
{
    pub fn new(config: SessionConfig, source: S, sink: K) -> Result<Self, ConfigError> {
        config.validate()?;
        let predictor = MovePredictor::new(Box::new(HeuristicEvaluator::new(config.weights)))
            .with_next_piece_weight(config.predictor.next_piece_weight);
        let prediction = if config.pipeline.offload_prediction {
            Prediction::Offloaded(PredictionWorker::spawn(predictor))
        } else {
            Prediction::Inline(predictor)
        };
        let coach = CoachingGenerator::new(
            config.coaching.clone(),
            Box::new(HeuristicEvaluator::new(config.weights)),
        );
        Ok(Self {
            localizer: BoardLocalizer::new(config.localizer.clone()),
            recognizer: Recognizer::new(config.recognizer.clone()),
            reconstructor: Reconstructor::new(config.tracker.clone()),
            prediction,
            coach,
            monitor: Arc::new(PerformanceMonitor::new(config.pipeline.monitor_history)),
            state: None,
            ranked: Arc::from([]),
            ranked_version: None,
            capture_faults: 0,
            warnings: Vec::new(),
            config,
            source,
            sink,
        })
    }

    /// Records into `monitor` instead of a private one.
    #[must_use]
    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn phase(&self) -> Phase {
        self.reconstructor.phase()
    }

    pub fn state(&self) -> Option<&Arc<GameState>> {
        self.state.as_ref()
    }

    pub fn calibration(&self) -> Option<&Arc<Calibration>> {
        self.localizer.current()
    }

    /// Warnings in effect.
    pub fn warnings(&self) -> &[SessionWarning] {
        &self.warnings
    }

    pub fn set_manual_calibration(
        &mut self,
        calibration: Calibration,
    ) -> Result<(), LocalizationFailure> {
        self.localizer.set_manual_calibration(calibration)
    }

    pub fn clear_manual_calibration(&mut self) {
        self.localizer.clear_manual_calibration();
    }

    /// Seeds the last known good calibration, e.g. one loaded from a store.
    pub fn restore_calibration(
        &mut self,
        calibration: Calibration,
    ) -> Result<(), LocalizationFailure> {
        self.localizer.restore(calibration)
    }

    /// Polls the source until `stop` is set or the source is exhausted.
    pub fn run(&mut self, stop: &AtomicBool) -> RunExit {
        let interval = self.config.pipeline.frame_interval();
        let timeout = self.config.pipeline.capture_timeout();
        info!(fps = self.config.pipeline.target_fps, "session started");
        loop {
            if stop.load(Ordering::Relaxed) {
                info!("session stopped");
                return RunExit::Stopped;
            }
            let started = Instant::now();
            let captured = self
                .monitor
                .time(Stage::Capture, || self.source.next_frame(timeout));
            match captured {
                Ok(Some(frame)) => {
                    self.capture_recovered();
                    self.process_frame(&frame);
                }
                Ok(None) => trace!("no frame within capture timeout"),
                Err(fault) if fault.is_terminal() => {
                    info!(%fault, "source exhausted");
                    return RunExit::SourceExhausted;
                }
                Err(fault) => self.capture_failed(&fault),
            }
            if let Some(rest) = interval.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        }
    }

    fn capture_failed(&mut self, fault: &CaptureFault) {
        self.capture_faults += 1;
        debug!(%fault, faults = self.capture_faults, "capture fault, frame skipped");
        if self.capture_faults == self.config.pipeline.capture_fault_warning_after {
            warn!(faults = self.capture_faults, "capture keeps failing");
            self.warnings.push(SessionWarning::SustainedCaptureFault {
                faults: self.capture_faults,
            });
        }
    }

    fn capture_recovered(&mut self) {
        if self.capture_faults >= self.config.pipeline.capture_fault_warning_after {
            info!(faults = self.capture_faults, "capture recovered");
        }
        self.capture_faults = 0;
        self.warnings.retain(|w| !w.is_sustained_capture_fault());
    }

    /// Runs one frame through every stage and emits the result.
    pub fn process_frame(&mut self, frame: &Frame) -> FrameStatus {
        let monitor = Arc::clone(&self.monitor);
        let _frame_timer = monitor.start(Stage::Frame);
        let budget = self.config.pipeline.frame_budget();
        let drop_late = self.config.pipeline.drop_policy == FrameDropPolicy::DropLate;
        let sequence = frame.sequence();

        let age = frame.age();
        if drop_late && age > budget {
            debug!(sequence, ?age, "stale frame dropped");
            self.monitor.frame_dropped();
            return FrameStatus::Stale { age };
        }

        let located = match self
            .monitor
            .time(Stage::Localize, || self.localizer.locate(frame))
        {
            Ok(located) => {
                self.playfield_found();
                located
            }
            Err(failure) => {
                debug!(sequence, %failure, "frame not located");
                self.playfield_missing(sequence, &failure);
                self.monitor.frame_processed();
                return FrameStatus::Unlocated(failure);
            }
        };
        let observation = self.monitor.time(Stage::Recognize, || {
            self.recognizer.classify(frame, &located.calibration)
        });

        let elapsed = frame.age();
        if drop_late && elapsed > budget {
            debug!(sequence, ?elapsed, "frame over budget, dropped");
            self.monitor.frame_dropped();
            return FrameStatus::OverBudget { elapsed };
        }

        let outcome = self
            .monitor
            .time(Stage::Reconstruct, || self.reconstructor.observe(&observation));
        if outcome.recalibration_requested {
            warn!(sequence, "tracking faulted, recalibrating");
            self.localizer.invalidate();
            if !self.warnings.contains(&SessionWarning::RecalibrationRecommended) {
                self.warnings.push(SessionWarning::RecalibrationRecommended);
            }
        }
        if outcome.phase.is_tracking() {
            self.warnings.retain(|w| !w.is_recalibration_recommended());
        }

        self.refresh_state();
        self.refresh_predictions();
        let hints = self.coach_hints();

        let max_suggestions = self.config.predictor.max_suggestions;
        let output = FrameOutput {
            sequence,
            state: self.state.clone(),
            candidates: self.ranked.iter().take(max_suggestions).cloned().collect(),
            hints,
            phase: outcome.phase,
            degraded_calibration: located.degraded,
            warnings: self.warnings.clone(),
        };
        self.sink.emit(output);
        self.monitor.frame_processed();
        FrameStatus::Processed
    }

    /// Emits the held state for a frame the playfield could not be found in.
    fn playfield_missing(&mut self, sequence: u64, failure: &LocalizationFailure) {
        if self.state.is_none() {
            return;
        }
        let lost = match failure {
            LocalizationFailure::Invalidated { .. } | LocalizationFailure::NotFound { .. } => true,
            LocalizationFailure::ManualOutOfBounds | LocalizationFailure::GridMismatch { .. } => {
                false
            }
        };
        if lost && !self.warnings.contains(&SessionWarning::PlayfieldLost) {
            warn!(sequence, %failure, "playfield lost");
            self.warnings.push(SessionWarning::PlayfieldLost);
        }
        let max_suggestions = self.config.predictor.max_suggestions;
        let output = FrameOutput {
            sequence,
            state: self.state.clone(),
            candidates: self.ranked.iter().take(max_suggestions).cloned().collect(),
            hints: Vec::new(),
            phase: self.reconstructor.phase(),
            degraded_calibration: true,
            warnings: self.warnings.clone(),
        };
        self.sink.emit(output);
    }

    fn playfield_found(&mut self) {
        let before = self.warnings.len();
        self.warnings.retain(|w| !w.is_playfield_lost());
        if self.warnings.len() != before {
            info!("playfield found again");
        }
    }

    fn refresh_state(&mut self) {
        let Some(live) = self.reconstructor.state() else {
            self.state = None;
            return;
        };
        let current = self.state.as_ref().map(|s| s.version());
        if current != Some(live.version()) {
            self.state = Some(Arc::new(live.clone()));
        }
    }

    fn refresh_predictions(&mut self) {
        let Some(state) = &self.state else {
            self.ranked = Arc::from([]);
            self.ranked_version = None;
            return;
        };
        if !self.config.pipeline.predictions || self.ranked_version == Some(state.version()) {
            return;
        }
        let timeout = self.config.pipeline.prediction_timeout();
        let _timer = self.monitor.start(Stage::Predict);
        let ranked = match &mut self.prediction {
            Prediction::Inline(predictor) => Some(rank(predictor, state)),
            Prediction::Offloaded(worker) => worker.predict(state, timeout),
        };
        match ranked {
            Some(ranked) => {
                trace!(version = state.version(), candidates = ranked.len(), "predicted");
                self.ranked = ranked.into();
                self.ranked_version = Some(state.version());
            }
            None => self.ranked = Arc::from([]),
        }
    }

    fn coach_hints(&mut self) -> Vec<CoachingHint> {
        if !self.config.pipeline.coaching {
            return Vec::new();
        }
        let Some(state) = &self.state else {
            return Vec::new();
        };
        let _timer = self.monitor.start(Stage::Coach);
        self.coach.generate(state, &self.ranked, Utc::now())
    }
}
