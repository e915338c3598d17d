//! Cell and piece recognition.
//!
//! Every cell is classified from two independent signals: a luma template correlation
//! ([`template`]) and the cell's mean color ([`color`]). Their occupancy estimates are
//! combined with [`fusion::fuse`]; a cell whose fused confidence stays below the acceptance
//! threshold is reported as [`Occupancy::Unknown`] instead of guessed.
//!
//! Pieces are found on top of the cell decisions: groups of four connected occupied cells
//! laid out like a library shape, with the kind implied by the shape fused with the kind
//! implied by the cells' colors.

use serde::{Deserialize, Serialize};
use tetrawatch_engine::{Piece, PieceKind, PieceRotation};
use tracing::{debug, trace};

use crate::{
    calibration::{Calibration, PixelRect},
    frame::Frame,
};

use self::{
    color::{ColorRules, ColorSignal, Hsv, Palette},
    fusion::{Estimate, fuse},
    shape::{CellPatch, PatchCell},
    template::{SampleRect, template_signal},
};

pub mod color;
pub mod fusion;
mod shape;
mod template;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Minimum fused confidence for a cell or piece decision.
    pub acceptance_threshold: f32,
    /// Fraction of the cell size ignored on every side when sampling.
    pub cell_inset: f32,
    /// Weight of the template signal against the color signal for occupancy.
    pub template_weight: f32,
    /// Weight of the shape signal against the color signal for piece identity.
    pub shape_weight: f32,
    /// Hue distance in degrees at which a palette match has no confidence left.
    pub color_tolerance: f32,
    pub min_saturation: f32,
    pub min_value: f32,
    pub garbage_min_value: f32,
    /// Rows above the grid searched for a spawning piece.
    pub spawn_buffer_rows: usize,
    pub next_region: Option<CellRegion>,
    pub hold_region: Option<CellRegion>,
    pub palette: Palette,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.6,
            cell_inset: 0.2,
            template_weight: 0.5,
            shape_weight: 0.5,
            color_tolerance: 20.0,
            min_saturation: 0.35,
            min_value: 0.25,
            garbage_min_value: 0.55,
            spawn_buffer_rows: 2,
            next_region: None,
            hold_region: None,
            palette: Palette::default(),
        }
    }
}

impl RecognizerConfig {
    fn color_rules(&self) -> ColorRules {
        ColorRules {
            min_saturation: self.min_saturation,
            min_value: self.min_value,
            garbage_min_value: self.garbage_min_value,
            tolerance: self.color_tolerance,
        }
    }
}

/// Rectangle of cells relative to the grid origin; may lie outside the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRegion {
    pub column: i32,
    pub row: i32,
    pub columns: u32,
    pub rows: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Occupancy {
    Occupied,
    Empty,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellObservation {
    pub row: usize,
    pub column: usize,
    pub occupancy: Occupancy,
    pub identity: Option<PieceKind>,
    pub confidence: f32,
}

/// One frame's per-cell decisions, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellGrid {
    rows: usize,
    columns: usize,
    cells: Vec<CellObservation>,
}

impl CellGrid {
    /// A grid with every cell unknown.
    #[must_use]
    pub fn new(rows: usize, columns: usize) -> Self {
        let cells = (0..rows * columns)
            .map(|i| CellObservation {
                row: i / columns.max(1),
                column: i % columns.max(1),
                occupancy: Occupancy::Unknown,
                identity: None,
                confidence: 0.0,
            })
            .collect();
        Self {
            rows,
            columns,
            cells,
        }
    }

    /// Builds a grid from text, mostly for tests and replays.
    ///
    /// `.` is empty, `#` occupied without identity, a piece letter occupied with that
    /// identity, and `?` unknown. Known cells get full confidence.
    ///
    /// # Panics
    ///
    /// Panics on ragged rows or other characters.
    #[must_use]
    pub fn from_ascii(art: &str) -> Self {
        let lines = art
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>();
        let columns = lines.first().map_or(0, |l| l.chars().count());
        let mut grid = Self::new(lines.len(), columns);
        for (row, line) in lines.iter().enumerate() {
            assert_eq!(line.chars().count(), columns, "ragged row {row}");
            for (column, c) in line.chars().enumerate() {
                let (occupancy, identity) = match c {
                    '?' => (Occupancy::Unknown, None),
                    '.' => (Occupancy::Empty, None),
                    '#' => (Occupancy::Occupied, None),
                    c => {
                        let kind = PieceKind::from_char(c)
                            .unwrap_or_else(|| panic!("invalid cell '{c}' at row {row}"));
                        (Occupancy::Occupied, Some(kind))
                    }
                };
                let confidence = if occupancy == Occupancy::Unknown { 0.0 } else { 1.0 };
                grid.set(row, column, occupancy, identity, confidence);
            }
        }
        grid
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn columns(&self) -> usize {
        self.columns
    }

    #[must_use]
    pub fn get(&self, row: usize, column: usize) -> Option<&CellObservation> {
        (row < self.rows && column < self.columns).then(|| &self.cells[row * self.columns + column])
    }

    /// Occupancy of a cell; cells outside the grid are [`Occupancy::Unknown`].
    #[must_use]
    pub fn occupancy(&self, row: usize, column: usize) -> Occupancy {
        self.get(row, column).map_or(Occupancy::Unknown, |c| c.occupancy)
    }

    pub fn set(
        &mut self,
        row: usize,
        column: usize,
        occupancy: Occupancy,
        identity: Option<PieceKind>,
        confidence: f32,
    ) {
        if row < self.rows && column < self.columns {
            self.cells[row * self.columns + column] = CellObservation {
                row,
                column,
                occupancy,
                identity,
                confidence,
            };
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CellObservation> + '_ {
        self.cells.iter()
    }

    #[must_use]
    pub fn unknown_count(&self) -> usize {
        self.cells
            .iter()
            .filter(|c| c.occupancy == Occupancy::Unknown)
            .count()
    }

    /// Share of unknown cells; `1.0` for an empty grid.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn unknown_fraction(&self) -> f32 {
        if self.cells.is_empty() {
            return 1.0;
        }
        self.unknown_count() as f32 / self.cells.len() as f32
    }
}

/// A recognized piece.
///
/// `column` and `row` are the piece's bounding box anchor as in
/// [`Piece::position`]; `row` is negative while the piece is in the spawn buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PieceObservation {
    pub kind: PieceKind,
    pub rotation: PieceRotation,
    pub column: i16,
    pub row: i16,
    pub confidence: f32,
}

impl PieceObservation {
    #[must_use]
    pub fn from_piece(piece: &Piece, confidence: f32) -> Self {
        Self {
            kind: piece.kind(),
            rotation: piece.rotation(),
            column: piece.position().x(),
            row: piece.position().y(),
            confidence,
        }
    }

    #[must_use]
    pub fn piece(&self) -> Piece {
        Piece::at(self.kind, self.rotation, self.column, self.row)
    }
}

/// Recognizer output for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub sequence: u64,
    pub cells: CellGrid,
    pub active: Option<PieceObservation>,
    pub next: Vec<PieceKind>,
    pub held: Option<PieceKind>,
}

impl Observation {
    #[must_use]
    pub fn new(sequence: u64, cells: CellGrid) -> Self {
        Self {
            sequence,
            cells,
            active: None,
            next: Vec::new(),
            held: None,
        }
    }

    #[must_use]
    pub fn with_active(mut self, piece: Option<Piece>) -> Self {
        self.active = piece.map(|p| PieceObservation::from_piece(&p, 1.0));
        self
    }

    #[must_use]
    pub fn with_preview(mut self, next: &[PieceKind], held: Option<PieceKind>) -> Self {
        self.next = next.to_vec();
        self.held = held;
        self
    }
}

/// Both signals of one cell.
#[derive(Debug, Clone, Copy)]
struct CellDecision {
    occupancy: Estimate<bool>,
    identity: Estimate<PieceKind>,
}

#[derive(Debug)]
pub struct Recognizer {
    config: RecognizerConfig,
    rules: ColorRules,
}

impl Recognizer {
    #[must_use]
    pub fn new(config: RecognizerConfig) -> Self {
        let rules = config.color_rules();
        Self { config, rules }
    }

    #[must_use]
    pub fn config(&self) -> &RecognizerConfig {
        &self.config
    }

    pub fn classify(&self, frame: &Frame, calibration: &Calibration) -> Observation {
        let threshold = self.config.acceptance_threshold;
        let (rows, columns) = (calibration.rows, calibration.columns);
        let mut cells = CellGrid::new(rows, columns);

        let spawn_rows = i32::try_from(self.config.spawn_buffer_rows).unwrap_or(0);
        let field = CellRegion {
            column: 0,
            row: -spawn_rows,
            columns: u32::try_from(columns).unwrap_or(0),
            rows: u32::try_from(rows).unwrap_or(0) + spawn_rows.unsigned_abs(),
        };
        let patch = self.scan(frame, calibration, field, |row, column, decision| {
            let (Ok(row), Ok(column)) = (usize::try_from(row), usize::try_from(column)) else {
                return;
            };
            let (occupancy, identity) = match decision.occupancy.accepted(threshold) {
                Some(true) => (Occupancy::Occupied, decision.identity.accepted(threshold)),
                Some(false) => (Occupancy::Empty, None),
                None => (Occupancy::Unknown, None),
            };
            cells.set(row, column, occupancy, identity, decision.occupancy.confidence);
        });

        let active = patch
            .find_pieces(threshold, self.config.shape_weight)
            .first()
            .and_then(|m| {
                let piece = Piece::with_cells_at(
                    m.kind,
                    m.rotation,
                    i16::try_from(m.left).ok()?,
                    i16::try_from(m.top).ok()?,
                );
                Some(PieceObservation::from_piece(&piece, m.confidence))
            });

        let next = self.config.next_region.map_or_else(Vec::new, |region| {
            self.scan(frame, calibration, region, |_, _, _| {})
                .find_pieces(threshold, self.config.shape_weight)
                .into_iter()
                .map(|m| m.kind)
                .collect()
        });
        let held = self.config.hold_region.and_then(|region| {
            self.scan(frame, calibration, region, |_, _, _| {})
                .find_pieces(threshold, self.config.shape_weight)
                .first()
                .map(|m| m.kind)
        });

        debug!(
            sequence = frame.sequence(),
            unknown = cells.unknown_count(),
            active = ?active.map(|a| a.piece()),
            ?next,
            ?held,
            "frame classified"
        );
        Observation {
            sequence: frame.sequence(),
            cells,
            active,
            next,
            held,
        }
    }

    /// Classifies every cell of `region`, reporting each decision to `visit`, and returns
    /// the occupied cells as a patch for piece matching.
    fn scan(
        &self,
        frame: &Frame,
        calibration: &Calibration,
        region: CellRegion,
        mut visit: impl FnMut(i32, i32, &CellDecision),
    ) -> CellPatch {
        let threshold = self.config.acceptance_threshold;
        let (columns, rows) = (region.columns as usize, region.rows as usize);
        let mut patch = CellPatch::new(region.column, region.row, columns, rows);
        for (dy, row) in (region.row..).take(rows).enumerate() {
            for (dx, column) in (region.column..).take(columns).enumerate() {
                let Some(rect) = calibration
                    .cell_rect(row, column)
                    .filter(|r| r.fits_within(frame.width(), frame.height()))
                else {
                    continue;
                };
                let decision = self.classify_cell(frame, rect);
                visit(row, column, &decision);
                if decision.occupancy.accepted(threshold) == Some(true) {
                    patch.cells[dy * columns + dx] = Some(PatchCell {
                        confidence: decision.occupancy.confidence,
                        identity: decision.identity,
                    });
                }
            }
        }
        patch
    }

    #[expect(clippy::cast_precision_loss)]
    fn classify_cell(&self, frame: &Frame, rect: PixelRect) -> CellDecision {
        let inset = self.config.cell_inset.clamp(0.0, 0.45);
        let (w, h) = (rect.width as f32, rect.height as f32);
        let sample = SampleRect {
            x: rect.x as f32 + inset * w,
            y: rect.y as f32 + inset * h,
            width: w * (1.0 - 2.0 * inset),
            height: h * (1.0 - 2.0 * inset),
        };
        let template = template_signal(frame, sample);

        let hsv = Hsv::from_rgb(mean_rgb(frame, rect, inset));
        let color = ColorSignal::classify(hsv, &self.rules, &self.config.palette);
        let occupancy = fuse(template, color.occupied, self.config.template_weight);
        trace!(
            ?rect,
            ?template,
            color = ?color.occupied,
            ?occupancy,
            "cell signals"
        );
        CellDecision {
            occupancy,
            identity: color.identity,
        }
    }
}

/// Mean color of the whole pixels inside the inset cell rectangle.
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn mean_rgb(frame: &Frame, rect: PixelRect, inset: f32) -> [f32; 3] {
    let margin = |extent: u32| (extent as f32 * inset).round() as u32;
    let (mx, my) = (margin(rect.width), margin(rect.height));
    let (mut x0, mut x1) = (rect.x + mx, rect.right().saturating_sub(mx));
    let (mut y0, mut y1) = (rect.y + my, rect.bottom().saturating_sub(my));
    if x1 <= x0 || y1 <= y0 {
        (x0, x1, y0, y1) = (rect.x, rect.right(), rect.y, rect.bottom());
    }

    let mut sum = [0.0_f32; 3];
    for y in y0..y1 {
        for x in x0..x1 {
            for (s, c) in sum.iter_mut().zip(frame.rgb(x, y)) {
                *s += f32::from(c);
            }
        }
    }
    let n = ((x1 - x0) * (y1 - y0)).max(1) as f32;
    sum.map(|s| s / n)
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};
    use tetrawatch_engine::{Block, Grid};

    use crate::{frame::ChannelLayout, render::BoardStyle};

    use super::*;

    const BOARD: &str = "
        ..........
        ..........
        ..........
        ..........
        ..........
        ..........
        ..........
        ..........
        ..........
        ..........
        ..........
        ..........
        ..........
        ..........
        ..........
        ..........
        ..........
        ...ZZ.....
        IIII.##..O
        JJJ.SS.LLO
    ";

    fn style() -> BoardStyle {
        BoardStyle::default()
    }

    fn recognizer() -> Recognizer {
        Recognizer::new(RecognizerConfig {
            next_region: Some(CellRegion {
                column: 11,
                row: 1,
                columns: 4,
                rows: 15,
            }),
            hold_region: Some(CellRegion {
                column: -5,
                row: 1,
                columns: 4,
                rows: 3,
            }),
            ..RecognizerConfig::default()
        })
    }

    fn frame(image: &RgbImage) -> Frame {
        Frame::from_rgb_image(image, 3).unwrap()
    }

    #[test]
    fn test_cells_match_rendered_grid() {
        let grid = Grid::from_ascii(BOARD);
        let image = style().render(&grid, None);
        let observation = recognizer().classify(&frame(&image), &style().calibration(20, 10));

        assert_eq!(observation.sequence, 3);
        assert_eq!(observation.cells.unknown_count(), 0);
        for cell in observation.cells.iter() {
            let expected = grid.block(cell.row, cell.column);
            match expected {
                Block::Empty => assert_eq!(cell.occupancy, Occupancy::Empty, "{cell:?}"),
                Block::Garbage => {
                    assert_eq!(cell.occupancy, Occupancy::Occupied, "{cell:?}");
                    assert_eq!(cell.identity, None);
                }
                Block::Piece(kind) => {
                    assert_eq!(cell.occupancy, Occupancy::Occupied, "{cell:?}");
                    assert_eq!(cell.identity, Some(kind), "{cell:?}");
                }
            }
            assert!(cell.confidence >= 0.6);
        }
    }

    #[test]
    fn test_active_piece_in_spawn_buffer() {
        let grid = Grid::from_ascii(BOARD);
        let piece = Piece::with_cells_at(PieceKind::T, PieceRotation::SPAWN, 3, -2);
        let image = style().render(&grid, Some(&piece));
        let observation = recognizer().classify(&frame(&image), &style().calibration(20, 10));

        let active = observation.active.unwrap();
        assert_eq!(active.piece(), piece);
        assert!(active.confidence >= 0.6);
        // the spawn buffer is not part of the cell grid
        assert_eq!(observation.cells.occupancy(0, 4), Occupancy::Empty);
    }

    #[test]
    fn test_topmost_group_is_the_active_piece() {
        let grid = Grid::from_ascii(BOARD);
        let piece = Piece::with_cells_at(PieceKind::L, PieceRotation::ALL[1], 6, 5);
        let image = style().render(&grid, Some(&piece));
        let observation = recognizer().classify(&frame(&image), &style().calibration(20, 10));
        assert_eq!(observation.active.map(|a| a.piece()), Some(piece));
    }

    #[test]
    fn test_preview_and_hold() {
        let grid = Grid::from_ascii(BOARD);
        let next = [PieceKind::S, PieceKind::I, PieceKind::O, PieceKind::L, PieceKind::J];
        let image = style().render_with_preview(&grid, None, &next, Some(PieceKind::T));
        let observation = recognizer().classify(&frame(&image), &style().calibration(20, 10));
        assert_eq!(observation.next, next);
        assert_eq!(observation.held, Some(PieceKind::T));
    }

    #[test]
    fn test_flat_colored_cell_is_unknown() {
        let style = style();
        let mut image = style.render(&Grid::new(20, 10), None);
        // uniform red: bright and saturated but without a bevel
        let (x0, y0) = (style.origin_x + 2 * style.cell_size, style.origin_y + 5 * style.cell_size);
        for y in y0..y0 + style.cell_size {
            for x in x0..x0 + style.cell_size {
                image.put_pixel(x, y, Rgb([250, 0, 0]));
            }
        }
        let observation = recognizer().classify(&frame(&image), &style.calibration(20, 10));
        let cell = observation.cells.get(5, 2).unwrap();
        assert_eq!(cell.occupancy, Occupancy::Unknown);
        assert_eq!(cell.identity, None);
        assert_eq!(observation.cells.unknown_count(), 1);
    }

    #[test]
    fn test_bgr_frames_classify_alike() {
        let grid = Grid::from_ascii(BOARD);
        let image = style().render(&grid, None);
        let bgr = image
            .pixels()
            .flat_map(|p| [p.0[2], p.0[1], p.0[0]])
            .collect::<Vec<_>>();
        let bgr_frame =
            Frame::new(bgr, image.width(), image.height(), ChannelLayout::Bgr8, 3).unwrap();

        let calibration = style().calibration(20, 10);
        let recognizer = recognizer();
        assert_eq!(
            recognizer.classify(&bgr_frame, &calibration).cells,
            recognizer.classify(&frame(&image), &calibration).cells
        );
    }

    #[test]
    fn test_cell_grid_from_ascii() {
        let cells = CellGrid::from_ascii(
            "
            ?.#
            T..
            ",
        );
        assert_eq!((cells.rows(), cells.columns()), (2, 3));
        assert_eq!(cells.occupancy(0, 0), Occupancy::Unknown);
        assert_eq!(cells.occupancy(0, 2), Occupancy::Occupied);
        assert_eq!(cells.get(1, 0).unwrap().identity, Some(PieceKind::T));
        assert_eq!(cells.occupancy(5, 5), Occupancy::Unknown);
        assert!((cells.unknown_fraction() - 1.0 / 6.0).abs() < 1e-6);
    }
}
