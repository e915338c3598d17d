//! Board localization: finding the playfield in a frame.
//!
//! # Strategies
//!
//! [`BoardLocalizer::locate`] tries, in order:
//!
//! 1. **Manual override** - a calibration set by the user wins until cleared
//! 2. **Edge detection** - the best-supported rectangle with the playfield's aspect ratio
//!    (see [`edges`])
//! 3. **Layout templates** - known frame-relative playfield placements, scored by the edge
//!    support along their sides
//!
//! # Failure Handling
//!
//! A detection below the confidence threshold is a failure. While failures are fewer than
//! `max_consecutive_failures`, the last known good calibration is returned flagged as
//! degraded. The failure that reaches the limit drops the calibration altogether.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    calibration::{Calibration, CalibrationSource, PixelRect},
    frame::Frame,
};

pub use self::template::LayoutTemplate;

pub mod edges;
mod template;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizerConfig {
    /// Playfield rows; fixed for the session.
    pub rows: usize,
    /// Playfield columns; fixed for the session.
    pub columns: usize,
    pub confidence_threshold: f32,
    pub max_consecutive_failures: u32,
    /// Minimum luma step (0-255) that counts as an edge.
    pub edge_threshold: f32,
    /// Minimum playfield `[width, height]` in pixels.
    pub min_board_size: [u32; 2],
    /// Maximum playfield `[width, height]` in pixels.
    pub max_board_size: [u32; 2],
    /// Relative aspect ratio error at which a rectangle no longer fits.
    pub aspect_tolerance: f32,
    pub templates: Vec<LayoutTemplate>,
}

impl Default for LocalizerConfig {
    fn default() -> Self {
        Self {
            rows: 20,
            columns: 10,
            confidence_threshold: 0.6,
            max_consecutive_failures: 5,
            edge_threshold: 40.0,
            min_board_size: [100, 200],
            max_board_size: [1600, 3200],
            aspect_tolerance: 0.15,
            templates: Vec::new(),
        }
    }
}

impl LocalizerConfig {
    fn rect_search(&self) -> edges::RectSearch {
        #[expect(clippy::cast_precision_loss)]
        let aspect = self.columns as f32 / self.rows.max(1) as f32;
        edges::RectSearch {
            aspect,
            aspect_tolerance: self.aspect_tolerance,
            min_size: self.min_board_size,
            max_size: self.max_board_size,
        }
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum LocalizationFailure {
    #[display("playfield not found (best confidence {confidence:.2})")]
    NotFound { confidence: f32 },
    #[display("calibration invalidated after {failures} consecutive failures")]
    Invalidated { failures: u32 },
    #[display("manual calibration lies outside the frame")]
    ManualOutOfBounds,
    #[display("calibration grid is {rows}x{columns}, expected {expected_rows}x{expected_columns}")]
    GridMismatch {
        rows: usize,
        columns: usize,
        expected_rows: usize,
        expected_columns: usize,
    },
}

/// Calibration to use for a frame.
#[derive(Debug, Clone)]
pub struct Located {
    pub calibration: Arc<Calibration>,
    /// The frame itself did not confirm the calibration; it is the last known good one.
    pub degraded: bool,
}

#[derive(Debug)]
pub struct BoardLocalizer {
    config: LocalizerConfig,
    manual: Option<Arc<Calibration>>,
    active: Option<Arc<Calibration>>,
    failures: u32,
    invalidated: bool,
}

impl BoardLocalizer {
    #[must_use]
    pub fn new(config: LocalizerConfig) -> Self {
        Self {
            config,
            manual: None,
            active: None,
            failures: 0,
            invalidated: false,
        }
    }

    #[must_use]
    pub fn config(&self) -> &LocalizerConfig {
        &self.config
    }

    /// The calibration currently in effect, if any.
    #[must_use]
    pub fn current(&self) -> Option<&Arc<Calibration>> {
        self.manual.as_ref().or(self.active.as_ref())
    }

    /// Confidence of the calibration in effect; `0.0` without one.
    #[must_use]
    pub fn current_confidence(&self) -> f32 {
        self.current().map_or(0.0, |c| c.confidence)
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    pub fn set_manual_calibration(
        &mut self,
        calibration: Calibration,
    ) -> Result<(), LocalizationFailure> {
        self.check_grid(&calibration)?;
        info!(?calibration, "manual calibration set");
        self.manual = Some(Arc::new(calibration.with_source(CalibrationSource::Manual)));
        Ok(())
    }

    pub fn clear_manual_calibration(&mut self) {
        if self.manual.take().is_some() {
            info!("manual calibration cleared");
        }
    }

    /// Seeds the last known good calibration, e.g. from persisted state.
    pub fn restore(&mut self, calibration: Calibration) -> Result<(), LocalizationFailure> {
        self.check_grid(&calibration)?;
        debug!(?calibration, "calibration restored");
        self.active = Some(Arc::new(calibration.with_source(CalibrationSource::Stored)));
        self.failures = 0;
        self.invalidated = false;
        Ok(())
    }

    /// Drops the last known good calibration so the next frame is detected from scratch.
    pub fn invalidate(&mut self) {
        if self.active.take().is_some() {
            info!("calibration invalidated");
        }
        self.invalidated = true;
    }

    fn check_grid(&self, calibration: &Calibration) -> Result<(), LocalizationFailure> {
        if calibration.rows == self.config.rows && calibration.columns == self.config.columns {
            return Ok(());
        }
        Err(LocalizationFailure::GridMismatch {
            rows: calibration.rows,
            columns: calibration.columns,
            expected_rows: self.config.rows,
            expected_columns: self.config.columns,
        })
    }

    pub fn locate(&mut self, frame: &Frame) -> Result<Located, LocalizationFailure> {
        if let Some(manual) = &self.manual {
            if !manual.fits_frame(frame.width(), frame.height()) {
                return Err(LocalizationFailure::ManualOutOfBounds);
            }
            return Ok(Located {
                calibration: Arc::clone(manual),
                degraded: false,
            });
        }

        match self.detect(frame) {
            Ok(calibration) => {
                self.failures = 0;
                self.invalidated = false;
                let calibration = match &self.active {
                    Some(active) if active.same_geometry(&calibration) => Arc::clone(active),
                    _ => {
                        info!(
                            x = calibration.origin_x,
                            y = calibration.origin_y,
                            cell_width = calibration.cell_width,
                            cell_height = calibration.cell_height,
                            confidence = calibration.confidence,
                            "playfield located"
                        );
                        let calibration = Arc::new(calibration);
                        self.active = Some(Arc::clone(&calibration));
                        calibration
                    }
                };
                Ok(Located {
                    calibration,
                    degraded: false,
                })
            }
            Err(confidence) => self.fail(frame, confidence),
        }
    }

    fn fail(&mut self, frame: &Frame, confidence: f32) -> Result<Located, LocalizationFailure> {
        self.failures += 1;
        debug!(
            sequence = frame.sequence(),
            confidence,
            failures = self.failures,
            "localization failed"
        );
        let usable = self
            .active
            .as_ref()
            .filter(|c| c.fits_frame(frame.width(), frame.height()));
        let Some(active) = usable else {
            return Err(if self.invalidated {
                LocalizationFailure::Invalidated {
                    failures: self.failures,
                }
            } else {
                LocalizationFailure::NotFound { confidence }
            });
        };
        if self.failures >= self.config.max_consecutive_failures {
            warn!(failures = self.failures, "playfield lost, calibration invalidated");
            self.active = None;
            self.invalidated = true;
            return Err(LocalizationFailure::Invalidated {
                failures: self.failures,
            });
        }
        Ok(Located {
            calibration: Arc::clone(active),
            degraded: true,
        })
    }

    /// Runs edge detection, then the layout templates; `Err` carries the best confidence.
    fn detect(&self, frame: &Frame) -> Result<Calibration, f32> {
        let threshold = self.config.confidence_threshold;
        let edges = edges::EdgeMap::from_luma(&frame.luma_plane(), self.config.edge_threshold);
        let accept = |rect: PixelRect, confidence: f32, source| {
            let calibration = Calibration::from_rect(
                rect,
                self.config.rows,
                self.config.columns,
                confidence,
                source,
            );
            calibration
                .fits_frame(frame.width(), frame.height())
                .then_some(calibration)
        };

        let mut best = 0.0_f32;
        if let Some((rect, confidence)) = edges::find_playfield(&edges, &self.config.rect_search())
        {
            debug!(?rect, confidence, "edge detection candidate");
            if confidence >= threshold
                && let Some(calibration) = accept(rect, confidence, CalibrationSource::Detected)
            {
                return Ok(calibration);
            }
            best = best.max(confidence);
        }

        let template = self
            .config
            .templates
            .iter()
            .filter_map(|t| t.rect_in(frame.width(), frame.height()))
            .map(|rect| (rect, edges.side_support(rect)))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((rect, confidence)) = template {
            debug!(?rect, confidence, "layout template candidate");
            if confidence >= threshold
                && let Some(calibration) = accept(rect, confidence, CalibrationSource::Template)
            {
                return Ok(calibration);
            }
            best = best.max(confidence);
        }
        Err(best)
    }
}
