//! Synthetic playfield frames.
//!
//! Draws a [`Grid`] the way a typical game client does: a dark playfield on a lighter
//! background, bevelled blocks in the standard piece colors, an optional active piece
//! (which may reach into the spawn buffer above the grid) and optional preview panels.
//! Useful wherever a frame is needed without a running game.

use image::{Rgb, RgbImage};
use tetrawatch_engine::{Block, Grid, Piece, PieceKind, PieceRotation};

use crate::calibration::{Calibration, CalibrationSource, PixelRect};

/// Rows between two consecutive next-piece slots.
const NEXT_SLOT_ROWS: i32 = 3;

/// Frame geometry and colors of a rendered board.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardStyle {
    pub frame_width: u32,
    pub frame_height: u32,
    pub origin_x: u32,
    pub origin_y: u32,
    pub cell_size: u32,
    pub background: [u8; 3],
    pub playfield: [u8; 3],
    pub garbage: [u8; 3],
    /// `(column, row)` of the held piece, in cells relative to the grid origin.
    pub hold_at: Option<(i32, i32)>,
    /// `(column, row)` of the first next piece; further pieces follow downward.
    pub next_at: Option<(i32, i32)>,
}

impl Default for BoardStyle {
    fn default() -> Self {
        Self {
            frame_width: 360,
            frame_height: 400,
            origin_x: 100,
            origin_y: 48,
            cell_size: 16,
            background: [110, 110, 110],
            playfield: [12, 12, 16],
            garbage: [200, 200, 200],
            hold_at: Some((-5, 1)),
            next_at: Some((11, 1)),
        }
    }
}

#[must_use]
pub fn piece_color(kind: PieceKind) -> [u8; 3] {
    match kind {
        PieceKind::I => [0, 250, 250],
        PieceKind::O => [250, 250, 0],
        PieceKind::T => [167, 0, 250],
        PieceKind::S => [0, 250, 0],
        PieceKind::Z => [250, 0, 0],
        PieceKind::J => [0, 0, 250],
        PieceKind::L => [250, 167, 0],
    }
}

impl BoardStyle {
    /// Pixel bounds of a `rows` x `columns` playfield.
    #[must_use]
    pub fn playfield_rect(&self, rows: usize, columns: usize) -> PixelRect {
        let span = |count: usize| {
            self.cell_size
                .saturating_mul(u32::try_from(count).unwrap_or(u32::MAX))
        };
        PixelRect::new(self.origin_x, self.origin_y, span(columns), span(rows))
    }

    /// The calibration a perfect localizer would produce for this style.
    #[must_use]
    pub fn calibration(&self, rows: usize, columns: usize) -> Calibration {
        Calibration::from_rect(
            self.playfield_rect(rows, columns),
            rows,
            columns,
            1.0,
            CalibrationSource::Manual,
        )
    }

    #[must_use]
    pub fn render(&self, grid: &Grid, active: Option<&Piece>) -> RgbImage {
        self.render_with_preview(grid, active, &[], None)
    }

    #[must_use]
    pub fn render_with_preview(
        &self,
        grid: &Grid,
        active: Option<&Piece>,
        next: &[PieceKind],
        held: Option<PieceKind>,
    ) -> RgbImage {
        let mut image =
            RgbImage::from_pixel(self.frame_width, self.frame_height, Rgb(self.background));

        let field = self.playfield_rect(grid.rows(), grid.columns());
        for y in field.y..field.bottom().min(self.frame_height) {
            for x in field.x..field.right().min(self.frame_width) {
                image.put_pixel(x, y, Rgb(self.playfield));
            }
        }

        for (row, blocks) in (0_i32..).zip(grid.iter_rows()) {
            for (column, block) in (0_i32..).zip(blocks) {
                let color = match block {
                    Block::Empty => continue,
                    Block::Garbage => self.garbage,
                    Block::Piece(kind) => piece_color(*kind),
                };
                self.draw_block(&mut image, column, row, color);
            }
        }

        if let Some(piece) = active {
            let color = piece_color(piece.kind());
            for (x, y) in piece.occupied_positions() {
                self.draw_block(&mut image, i32::from(x), i32::from(y), color);
            }
        }

        if let Some((column, row)) = self.hold_at
            && let Some(kind) = held
        {
            self.draw_shape(&mut image, kind, column, row);
        }
        if let Some((column, row)) = self.next_at {
            for (slot, &kind) in (0_i32..).zip(next) {
                self.draw_shape(&mut image, kind, column, row + slot * NEXT_SLOT_ROWS);
            }
        }
        image
    }

    fn draw_shape(&self, image: &mut RgbImage, kind: PieceKind, column: i32, row: i32) {
        let color = piece_color(kind);
        for (x, y) in kind.normalized_cells(PieceRotation::SPAWN) {
            self.draw_block(image, column + i32::from(x), row + i32::from(y), color);
        }
    }

    /// Draws a block leaving a one pixel gap on every side of the cell, shaded from the
    /// top-left corner (full color) to the bottom-right corner (60%).
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn draw_block(&self, image: &mut RgbImage, column: i32, row: i32, color: [u8; 3]) {
        let size = i64::from(self.cell_size);
        if size < 4 {
            return;
        }
        let left = i64::from(self.origin_x) + i64::from(column) * size;
        let top = i64::from(self.origin_y) + i64::from(row) * size;
        let span = (2 * (size - 3)) as f32;

        for dy in 1..size - 1 {
            for dx in 1..size - 1 {
                let (Ok(x), Ok(y)) = (u32::try_from(left + dx), u32::try_from(top + dy)) else {
                    continue;
                };
                if x >= image.width() || y >= image.height() {
                    continue;
                }
                let shade = 1.0 - 0.4 * ((dx - 1) + (dy - 1)) as f32 / span;
                let pixel = color.map(|c| (f32::from(c) * shade).round() as u8);
                image.put_pixel(x, y, Rgb(pixel));
            }
        }
    }
}
