use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a calibration was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationSource {
    Detected,
    Template,
    Manual,
    Stored,
}

/// Axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[must_use]
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    #[must_use]
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0 && self.height > 0 && self.right() <= width && self.bottom() <= height
    }
}

/// Mapping from the logical grid to frame pixels.
///
/// Cell `(row, column)` covers pixels
/// `[origin_x + column * cell_width, origin_x + (column + 1) * cell_width)` horizontally and
/// the analogous range vertically. Instances are shared as `Arc<Calibration>` and replaced
/// wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub origin_x: u32,
    pub origin_y: u32,
    pub cell_width: u32,
    pub cell_height: u32,
    pub rows: usize,
    pub columns: usize,
    pub confidence: f32,
    pub updated_at: DateTime<Utc>,
    pub source: CalibrationSource,
}

impl Calibration {
    /// Builds a calibration whose grid covers `rect`, snapped to whole cells.
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    #[must_use]
    pub fn from_rect(
        rect: PixelRect,
        rows: usize,
        columns: usize,
        confidence: f32,
        source: CalibrationSource,
    ) -> Self {
        let cell = |extent: u32, count: usize| {
            let count = u32::try_from(count.max(1)).unwrap_or(u32::MAX);
            ((f64::from(extent) / f64::from(count)).round() as u32).max(1)
        };
        Self {
            origin_x: rect.x,
            origin_y: rect.y,
            cell_width: cell(rect.width, columns),
            cell_height: cell(rect.height, rows),
            rows,
            columns,
            confidence: confidence.clamp(0.0, 1.0),
            updated_at: Utc::now(),
            source,
        }
    }

    /// Pixel bounds of the whole grid.
    #[must_use]
    pub fn grid_rect(&self) -> PixelRect {
        let span = |cell: u32, count: usize| {
            cell.saturating_mul(u32::try_from(count).unwrap_or(u32::MAX))
        };
        PixelRect::new(
            self.origin_x,
            self.origin_y,
            span(self.cell_width, self.columns),
            span(self.cell_height, self.rows),
        )
    }

    /// Pixel bounds of a cell; `row` and `column` may lie outside the grid (spawn buffer,
    /// preview panels). Returns `None` if the cell starts left of or above the frame.
    #[must_use]
    pub fn cell_rect(&self, row: i32, column: i32) -> Option<PixelRect> {
        let offset = |origin: u32, index: i32, size: u32| {
            let px = i64::from(origin) + i64::from(index) * i64::from(size);
            u32::try_from(px).ok()
        };
        Some(PixelRect::new(
            offset(self.origin_x, column, self.cell_width)?,
            offset(self.origin_y, row, self.cell_height)?,
            self.cell_width,
            self.cell_height,
        ))
    }

    /// Returns `true` if the grid lies entirely inside a `width` x `height` frame.
    #[must_use]
    pub fn fits_frame(&self, width: u32, height: u32) -> bool {
        self.rows > 0 && self.columns > 0 && self.grid_rect().fits_within(width, height)
    }

    /// Same pixel geometry, ignoring confidence, timestamp and source.
    #[must_use]
    pub fn same_geometry(&self, other: &Self) -> bool {
        self.grid_rect() == other.grid_rect()
            && self.rows == other.rows
            && self.columns == other.columns
    }

    #[must_use]
    pub fn with_source(mut self, source: CalibrationSource) -> Self {
        self.source = source;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calibration() -> Calibration {
        Calibration::from_rect(
            PixelRect::new(40, 30, 160, 320),
            20,
            10,
            0.9,
            CalibrationSource::Detected,
        )
    }

    #[test]
    fn test_from_rect_snaps_cells() {
        let cal = Calibration::from_rect(
            PixelRect::new(0, 0, 161, 319),
            20,
            10,
            1.5,
            CalibrationSource::Manual,
        );
        assert_eq!((cal.cell_width, cal.cell_height), (16, 16));
        assert!((cal.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_cells_tile_the_grid() {
        let cal = calibration();
        assert_eq!(cal.cell_rect(0, 0), Some(PixelRect::new(40, 30, 16, 16)));
        let last = cal.cell_rect(19, 9).unwrap();
        assert_eq!(last.right(), cal.grid_rect().right());
        assert_eq!(last.bottom(), cal.grid_rect().bottom());
        assert_eq!(cal.cell_rect(0, 1).unwrap().x, cal.cell_rect(0, 0).unwrap().right());
        assert_eq!(cal.cell_rect(-1, 0), Some(PixelRect::new(40, 14, 16, 16)));
        assert_eq!(cal.cell_rect(-2, 0), None);
    }

    #[test]
    fn test_frame_bounds() {
        let cal = calibration();
        assert!(cal.fits_frame(200, 350));
        assert!(!cal.fits_frame(199, 350));
        assert!(!cal.fits_frame(200, 349));
    }

    #[test]
    fn test_serde_round_trip() {
        let cal = calibration();
        let json = serde_json::to_string(&cal).unwrap();
        let back: Calibration = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cal);
    }
}
