use std::time::Duration;

use serde::{Deserialize, Serialize};
use tetrawatch_coach::CoachingConfig;
use tetrawatch_evaluator::{
    heuristic::{HeuristicWeights, InvalidWeightsError},
    predictor::PredictorConfig,
};
use tetrawatch_tracker::TrackerConfig;
use tetrawatch_vision::{localizer::LocalizerConfig, recognizer::RecognizerConfig};

/// Smallest grid side a tetromino fits in.
const MIN_GRID_SIDE: usize = 4;
const MAX_GRID_SIDE: usize = 64;

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ConfigError {
    #[display("invalid heuristic weights: {source}")]
    InvalidWeights { source: InvalidWeightsError },
    #[display("'{name}' is out of range: {value}")]
    InvalidThreshold { name: &'static str, value: f32 },
    #[display("grid must be between 4x4 and 64x64, got {rows}x{columns}")]
    InvalidGrid { rows: usize, columns: usize },
    #[display("'{name}' must be positive, got {value}")]
    InvalidRate { name: &'static str, value: u64 },
    #[display("board size bounds are inverted: min {min:?}, max {max:?}")]
    InvalidBoardSize { min: [u32; 2], max: [u32; 2] },
}

/// What to do with frames that cannot be processed within the frame budget.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameDropPolicy {
    /// Skip stale frames and frames whose perception overran the budget.
    #[default]
    DropLate,
    /// Process every frame regardless of latency.
    ProcessAll,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub frame_budget_ms: u64,
    pub capture_timeout_ms: u64,
    pub target_fps: u32,
    pub prediction_timeout_ms: u64,
    /// Consecutive capture faults after which a warning is raised.
    pub capture_fault_warning_after: u32,
    /// Run prediction on a worker thread.
    pub offload_prediction: bool,
    pub drop_policy: FrameDropPolicy,
    pub predictions: bool,
    pub coaching: bool,
    /// Samples kept per stage by the performance monitor.
    pub monitor_history: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_budget_ms: 50,
            capture_timeout_ms: 100,
            target_fps: 30,
            prediction_timeout_ms: 20,
            capture_fault_warning_after: 10,
            offload_prediction: false,
            drop_policy: FrameDropPolicy::DropLate,
            predictions: true,
            coaching: true,
            monitor_history: 1000,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn frame_budget(&self) -> Duration {
        Duration::from_millis(self.frame_budget_ms)
    }

    #[must_use]
    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    #[must_use]
    pub fn prediction_timeout(&self) -> Duration {
        Duration::from_millis(self.prediction_timeout_ms)
    }

    /// Minimum time between two capture polls.
    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.target_fps.max(1)
    }
}

/// Everything a session needs, loaded once and never changed while it runs.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub localizer: LocalizerConfig,
    pub recognizer: RecognizerConfig,
    pub tracker: TrackerConfig,
    pub weights: HeuristicWeights,
    pub predictor: PredictorConfig,
    pub coaching: CoachingConfig,
    pub pipeline: PipelineConfig,
}

fn unit_interval(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidThreshold { name, value })
    }
}

fn positive(name: &'static str, value: u64) -> Result<(), ConfigError> {
    if value > 0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidRate { name, value })
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights
            .validate()
            .map_err(|source| ConfigError::InvalidWeights { source })?;

        let (rows, columns) = (self.localizer.rows, self.localizer.columns);
        let side = MIN_GRID_SIDE..=MAX_GRID_SIDE;
        if !side.contains(&rows) || !side.contains(&columns) {
            return Err(ConfigError::InvalidGrid { rows, columns });
        }

        let localizer = &self.localizer;
        unit_interval("localizer.confidence_threshold", localizer.confidence_threshold)?;
        if !localizer.edge_threshold.is_finite() || localizer.edge_threshold <= 0.0 {
            return Err(ConfigError::InvalidThreshold {
                name: "localizer.edge_threshold",
                value: localizer.edge_threshold,
            });
        }
        unit_interval("localizer.aspect_tolerance", localizer.aspect_tolerance)?;
        let (min, max) = (localizer.min_board_size, localizer.max_board_size);
        if min[0] > max[0] || min[1] > max[1] {
            return Err(ConfigError::InvalidBoardSize { min, max });
        }

        let recognizer = &self.recognizer;
        unit_interval("recognizer.acceptance_threshold", recognizer.acceptance_threshold)?;
        unit_interval("recognizer.template_weight", recognizer.template_weight)?;
        unit_interval("recognizer.shape_weight", recognizer.shape_weight)?;
        unit_interval("recognizer.min_saturation", recognizer.min_saturation)?;
        unit_interval("recognizer.min_value", recognizer.min_value)?;
        unit_interval("recognizer.garbage_min_value", recognizer.garbage_min_value)?;
        if !(0.0..0.5).contains(&recognizer.cell_inset) {
            return Err(ConfigError::InvalidThreshold {
                name: "recognizer.cell_inset",
                value: recognizer.cell_inset,
            });
        }
        if !recognizer.color_tolerance.is_finite() || recognizer.color_tolerance <= 0.0 {
            return Err(ConfigError::InvalidThreshold {
                name: "recognizer.color_tolerance",
                value: recognizer.color_tolerance,
            });
        }

        unit_interval("tracker.max_unknown_fraction", self.tracker.max_unknown_fraction)?;
        positive("tracker.recovery_frames", self.tracker.recovery_frames.into())?;
        positive("tracker.degraded_frame_limit", self.tracker.degraded_frame_limit.into())?;

        if !self.predictor.next_piece_weight.is_finite() {
            return Err(ConfigError::InvalidThreshold {
                name: "predictor.next_piece_weight",
                value: self.predictor.next_piece_weight,
            });
        }

        let coaching = &self.coaching;
        unit_interval("coaching.danger_height", coaching.danger_height)?;
        if !coaching.strategy_divergence.is_finite() || coaching.strategy_divergence <= 0.0 {
            return Err(ConfigError::InvalidThreshold {
                name: "coaching.strategy_divergence",
                value: coaching.strategy_divergence,
            });
        }
        positive("coaching.hint_ttl_ms", coaching.hint_ttl_ms)?;

        let pipeline = &self.pipeline;
        positive("pipeline.target_fps", pipeline.target_fps.into())?;
        positive("pipeline.frame_budget_ms", pipeline.frame_budget_ms)?;
        positive("pipeline.capture_timeout_ms", pipeline.capture_timeout_ms)?;
        positive("pipeline.prediction_timeout_ms", pipeline.prediction_timeout_ms)?;
        positive(
            "pipeline.capture_fault_warning_after",
            pipeline.capture_fault_warning_after.into(),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        SessionConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: SessionConfig = serde_json::from_str(
            r#"{
                "pipeline": { "target_fps": 60, "drop_policy": "process_all" },
                "localizer": { "rows": 22 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.pipeline.target_fps, 60);
        assert_eq!(config.pipeline.drop_policy, FrameDropPolicy::ProcessAll);
        assert_eq!(config.pipeline.frame_budget_ms, 50);
        assert_eq!(config.localizer.rows, 22);
        assert_eq!(config.localizer.columns, 10);
        assert_eq!(config.coaching, CoachingConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_rejects_bad_weights() {
        let mut config = SessionConfig::default();
        config.weights.holes = f32::NAN;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWeights { .. })
        ));
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let mut config = SessionConfig::default();
        config.recognizer.acceptance_threshold = 1.5;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidThreshold {
                name: "recognizer.acceptance_threshold",
                ..
            }
        ));
        assert!(err.to_string().contains("acceptance_threshold"));
    }

    #[test]
    fn test_rejects_bad_grid_and_rates() {
        let mut config = SessionConfig::default();
        config.localizer.columns = 2;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidGrid {
                rows: 20,
                columns: 2
            })
        ));

        let mut config = SessionConfig::default();
        config.pipeline.target_fps = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRate {
                name: "pipeline.target_fps",
                value: 0
            })
        ));
    }

    #[test]
    fn test_rejects_silent_capture_warning() {
        let mut config = SessionConfig::default();
        config.pipeline.capture_fault_warning_after = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidRate {
                name: "pipeline.capture_fault_warning_after",
                value: 0
            }
        ));
    }

    #[test]
    fn test_rejects_inverted_board_size() {
        let mut config = SessionConfig::default();
        config.localizer.min_board_size = [400, 200];
        config.localizer.max_board_size = [300, 3200];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBoardSize {
                min: [400, 200],
                max: [300, 3200]
            })
        ));

        config.localizer.max_board_size = [400, 200];
        config.validate().unwrap();
    }

    #[test]
    fn test_frame_interval() {
        let config = PipelineConfig::default();
        assert_eq!(config.frame_interval(), Duration::from_secs(1) / 30);
        assert_eq!(config.frame_budget(), Duration::from_millis(50));
    }
}
