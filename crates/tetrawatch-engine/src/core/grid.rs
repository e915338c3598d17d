use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{GridParseError, PieceCollisionError};

use super::piece::{Piece, PieceKind};

/// A single cell of the grid.
///
/// `Garbage` marks a cell that is known to be occupied while its piece identity is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Block {
    /// Empty cell.
    #[default]
    Empty,
    /// Occupied cell of unknown identity.
    Garbage,
    /// Locked cell of a specific piece type.
    Piece(PieceKind),
}

impl Block {
    #[must_use]
    pub fn is_empty(self) -> bool {
        self == Block::Empty
    }

    #[must_use]
    pub fn is_occupied(self) -> bool {
        !self.is_empty()
    }

    #[must_use]
    pub fn kind(self) -> Option<PieceKind> {
        match self {
            Block::Piece(kind) => Some(kind),
            Block::Empty | Block::Garbage => None,
        }
    }

    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            Block::Empty => '.',
            Block::Garbage => '#',
            Block::Piece(kind) => kind.as_char(),
        }
    }

    #[must_use]
    pub const fn from_char(c: char) -> Option<Self> {
        match c {
            '.' => Some(Block::Empty),
            '#' => Some(Block::Garbage),
            _ => match PieceKind::from_char(c) {
                Some(kind) => Some(Block::Piece(kind)),
                None => None,
            },
        }
    }
}

/// Occupancy and identity matrix of the playfield.
///
/// Cells are stored row-major with row 0 at the top. The dimensions come from the active
/// calibration and never change for the lifetime of a grid.
///
/// Cells above the top row (negative `y`) are treated as empty, so pieces in the spawn
/// buffer never collide with the grid. Cells left, right, or below the grid always collide.
///
/// # Example
///
/// ```
/// use tetrawatch_engine::Grid;
///
/// let mut grid = Grid::from_ascii(
///     "
///     ....
///     #.#.
///     #####
///     ",
/// );
/// assert_eq!(grid.clear_lines(), 1);
/// assert_eq!(grid.to_string(), "....\n....\n#.#.");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Grid {
    rows: usize,
    columns: usize,
    cells: Vec<Block>,
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (y, row) in self.iter_rows().enumerate() {
            if y > 0 {
                writeln!(f)?;
            }
            for block in row {
                write!(f, "{}", block.as_char())?;
            }
        }
        Ok(())
    }
}

impl Serialize for Grid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // Format: one string per row, top to bottom (e.g., ["..T..", "TTT##"])
        let rows = self
            .iter_rows()
            .map(|row| row.iter().map(|b| b.as_char()).collect::<String>());
        serializer.collect_seq(rows)
    }
}

impl<'de> Deserialize<'de> for Grid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let rows = Vec::<String>::deserialize(deserializer)?;
        Grid::from_rows(&rows).map_err(serde::de::Error::custom)
    }
}

impl Grid {
    /// Creates an empty grid.
    #[must_use]
    pub fn new(rows: usize, columns: usize) -> Self {
        Self {
            rows,
            columns,
            cells: vec![Block::Empty; rows * columns],
        }
    }

    /// Builds a grid from row strings using [`Block::from_char`] notation.
    pub fn from_rows<S>(rows: &[S]) -> Result<Self, GridParseError>
    where
        S: AsRef<str>,
    {
        let columns = rows.first().map_or(0, |row| row.as_ref().chars().count());
        let mut cells = Vec::with_capacity(rows.len() * columns);
        for (y, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            let width = row.chars().count();
            if width != columns {
                return Err(GridParseError::RaggedRow {
                    row: y,
                    expected: columns,
                    found: width,
                });
            }
            for c in row.chars() {
                let block =
                    Block::from_char(c).ok_or(GridParseError::InvalidCell { row: y, cell: c })?;
                cells.push(block);
            }
        }
        Ok(Self {
            rows: rows.len(),
            columns,
            cells,
        })
    }

    /// Creates a grid from ASCII art for tests and fixtures.
    ///
    /// `.` is empty, `#` is garbage, and piece letters are locked cells of that kind.
    /// Blank lines and surrounding whitespace are ignored. Rows are listed top to bottom.
    ///
    /// # Panics
    ///
    /// Panics if the rows have different widths or contain unknown characters.
    #[must_use]
    pub fn from_ascii(art: &str) -> Self {
        let lines = art
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>();
        match Self::from_rows(&lines) {
            Ok(grid) => grid,
            Err(e) => panic!("invalid grid art: {e}"),
        }
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
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.rows == 0 || self.columns == 0
    }

    #[must_use]
    pub fn get(&self, row: usize, column: usize) -> Option<Block> {
        (row < self.rows && column < self.columns).then(|| self.cells[row * self.columns + column])
    }

    #[must_use]
    pub fn block(&self, row: usize, column: usize) -> Block {
        assert!(column < self.columns, "column {column} out of range");
        self.cells[row * self.columns + column]
    }

    pub fn set_block(&mut self, row: usize, column: usize, block: Block) {
        assert!(column < self.columns, "column {column} out of range");
        self.cells[row * self.columns + column] = block;
    }

    #[must_use]
    pub fn is_occupied(&self, row: usize, column: usize) -> bool {
        self.block(row, column).is_occupied()
    }

    #[must_use]
    pub fn row(&self, row: usize) -> &[Block] {
        &self.cells[row * self.columns..][..self.columns]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[Block]> + '_ {
        self.cells.chunks(self.columns.max(1))
    }

    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.cells.iter().copied()
    }

    #[must_use]
    pub fn is_row_full(&self, row: usize) -> bool {
        self.columns > 0 && self.row(row).iter().all(|b| b.is_occupied())
    }

    /// Number of completely filled rows.
    #[must_use]
    pub fn full_rows(&self) -> usize {
        (0..self.rows).filter(|&y| self.is_row_full(y)).count()
    }

    #[must_use]
    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|b| b.is_occupied()).count()
    }

    /// Returns `true` if both grids have the same dimensions and occupied cells,
    /// ignoring piece identity.
    #[must_use]
    pub fn same_occupancy(&self, other: &Grid) -> bool {
        self.rows == other.rows
            && self.columns == other.columns
            && self
                .cells
                .iter()
                .zip(&other.cells)
                .all(|(a, b)| a.is_occupied() == b.is_occupied())
    }

    /// Checks if the piece overlaps an occupied cell or leaves the grid sideways or downward.
    #[must_use]
    pub fn is_colliding(&self, piece: &Piece) -> bool {
        piece.occupied_positions().any(|(x, y)| {
            let Ok(x) = usize::try_from(x) else {
                return true;
            };
            if x >= self.columns {
                return true;
            }
            match usize::try_from(y) {
                Ok(y) => y >= self.rows || self.is_occupied(y, x),
                // above the top row
                Err(_) => false,
            }
        })
    }

    /// Returns `true` if every cell of the piece lies inside the grid.
    #[must_use]
    pub fn contains_piece(&self, piece: &Piece) -> bool {
        piece.occupied_positions().all(|(x, y)| {
            usize::try_from(x).is_ok_and(|x| x < self.columns)
                && usize::try_from(y).is_ok_and(|y| y < self.rows)
        })
    }

    /// Locks a piece onto the grid by setting its occupied cells.
    ///
    /// Fails without modifying the grid if any cell is outside the grid or already occupied.
    pub fn fill_piece(&mut self, piece: &Piece) -> Result<(), PieceCollisionError> {
        if !self.contains_piece(piece) || self.is_colliding(piece) {
            return Err(PieceCollisionError);
        }
        let block = Block::Piece(piece.kind());
        for (x, y) in piece.occupied_positions() {
            #[expect(clippy::cast_sign_loss, reason = "checked by contains_piece")]
            self.set_block(y as usize, x as usize, block);
        }
        Ok(())
    }

    /// Clears filled rows and returns the number of rows cleared.
    ///
    /// Rows above each cleared row shift down; empty rows fill in at the top, so the
    /// row count never changes.
    pub fn clear_lines(&mut self) -> usize {
        let columns = self.columns;
        let mut count = 0;

        for y in (0..self.rows).rev() {
            if self.is_row_full(y) {
                count += 1;
                continue;
            }
            if count > 0 {
                self.cells
                    .copy_within(y * columns..(y + 1) * columns, (y + count) * columns);
            }
        }

        self.cells[..count * columns].fill(Block::Empty);
        count
    }

    /// Height of a column: number of rows from the bottom up to its topmost occupied cell.
    #[must_use]
    pub fn column_height(&self, column: usize) -> usize {
        (0..self.rows)
            .find(|&y| self.is_occupied(y, column))
            .map_or(0, |top| self.rows - top)
    }
}

#[cfg(test)]
mod tests {
    use crate::PieceRotation;

    use super::*;

    #[test]
    fn test_new_grid_is_empty() {
        let grid = Grid::new(20, 10);
        assert_eq!(grid.rows(), 20);
        assert_eq!(grid.columns(), 10);
        assert_eq!(grid.cell_count(), 200);
        assert_eq!(grid.occupied_count(), 0);
        assert_eq!(grid.full_rows(), 0);
    }

    #[test]
    fn test_clear_lines_single_line() {
        let mut grid = Grid::from_ascii(
            "
            .....
            ..#..
            #####
            ",
        );
        assert_eq!(grid.clear_lines(), 1);
        assert_eq!(
            grid,
            Grid::from_ascii(
                "
                .....
                .....
                ..#..
                "
            )
        );
    }

    #[test]
    fn test_clear_lines_removes_k_rows_and_shifts_by_k() {
        let mut grid = Grid::from_ascii(
            "
            .T...
            IIIII
            #.#.#
            #####
            OOOOO
            ",
        );
        assert_eq!(grid.clear_lines(), 3);
        assert_eq!(grid.rows(), 5);
        assert_eq!(
            grid,
            Grid::from_ascii(
                "
                .....
                .....
                .....
                .T...
                #.#.#
                "
            )
        );
    }

    #[test]
    fn test_clear_lines_all_filled() {
        let mut grid = Grid::from_ascii(
            "
            ###
            ###
            ",
        );
        assert_eq!(grid.clear_lines(), 2);
        assert_eq!(grid, Grid::new(2, 3));
    }

    #[test]
    fn test_clear_lines_with_partial_lines() {
        let mut grid = Grid::from_ascii(
            "
            ##.
            #.#
            ",
        );
        let before = grid.clone();
        assert_eq!(grid.clear_lines(), 0);
        assert_eq!(grid, before);
    }

    #[test]
    fn test_collision_boundaries() {
        let grid = Grid::from_ascii(
            "
            ....
            ....
            ..#.
            ",
        );
        // vertical I in column 0 reaching above the top row
        let piece = Piece::at(PieceKind::I, PieceRotation::ALL[1], -2, -2);
        assert_eq!(piece.leftmost_column(), 0);
        assert!(!grid.is_colliding(&piece));
        assert!(!grid.contains_piece(&piece));
        // one column further left leaves the grid
        assert!(grid.is_colliding(&piece.left()));
        // resting on the floor
        let dropped = piece.simulate_drop_position(&grid);
        assert_eq!(dropped.bottom_row(), 2);
        assert!(dropped.is_resting(&grid));
        // resting on the garbage cell in column 2
        let over_garbage = Piece::at(PieceKind::I, PieceRotation::ALL[1], 0, -4);
        assert_eq!(over_garbage.leftmost_column(), 2);
        assert_eq!(over_garbage.simulate_drop_position(&grid).bottom_row(), 1);
    }

    #[test]
    fn test_fill_piece_rejects_overlap() {
        let mut grid = Grid::from_ascii(
            "
            ....
            ....
            ####
            ",
        );
        let piece = Piece::with_cells_at(PieceKind::O, PieceRotation::SPAWN, 1, 1);
        assert!(grid.fill_piece(&piece).is_err());
        assert_eq!(grid.occupied_count(), 4);

        let piece = Piece::with_cells_at(PieceKind::O, PieceRotation::SPAWN, 1, 0);
        grid.fill_piece(&piece).unwrap();
        assert_eq!(grid.block(0, 1), Block::Piece(PieceKind::O));
        assert_eq!(grid.column_height(1), 3);
        assert_eq!(grid.column_height(0), 1);
    }

    #[test]
    fn test_grid_serialization() {
        let grid = Grid::from_ascii(
            "
            ..T..
            .TTT#
            ",
        );
        let serialized = serde_json::to_string(&grid).unwrap();
        assert_eq!(serialized, r#"["..T..",".TTT#"]"#);
        let deserialized: Grid = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, grid);

        assert!(serde_json::from_str::<Grid>(r#"["...", ".."]"#).is_err());
        assert!(serde_json::from_str::<Grid>(r#"["..x"]"#).is_err());
    }

    #[test]
    fn test_same_occupancy_ignores_identity() {
        let a = Grid::from_ascii("#T.\n");
        let b = Grid::from_ascii("LI.\n");
        let c = Grid::from_ascii("L.I\n");
        assert!(a.same_occupancy(&b));
        assert!(!a.same_occupancy(&c));
    }
}
