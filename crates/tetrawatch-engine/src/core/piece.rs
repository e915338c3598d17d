use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{InvalidRotationError, ParsePieceError};

use super::grid::Grid;

/// A tetromino with position, rotation, and type.
///
/// Pieces are immutable values: movement and rotation return new `Piece` instances.
///
/// # Coordinate System
///
/// - `x` is the grid column of the left edge of the piece's 4×4 bounding box
/// - `y` is the grid row of the top edge of the bounding box; row 0 is the top grid row
/// - `y` may be negative while the piece is still in the spawn buffer above the grid
///
/// # Example
///
/// ```
/// use tetrawatch_engine::{Piece, PieceKind, PieceRotation};
///
/// let piece = Piece::at(PieceKind::T, PieceRotation::SPAWN, 3, 0);
/// let moved = piece.right().rotated_right();
/// assert_eq!(moved.to_string(), "T#1@4,0");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Piece {
    position: PiecePosition,
    rotation: PieceRotation,
    kind: PieceKind,
}

impl fmt::Display for Piece {
    // Format: "kind#rotation@x,y" (e.g., "S#1@4,18")
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{}@{},{}",
            self.kind.as_char(),
            self.rotation.0,
            self.position.x,
            self.position.y
        )
    }
}

impl FromStr for Piece {
    type Err = ParsePieceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParsePieceError::new(s);

        let (kind_str, rest) = s.split_once('#').ok_or_else(invalid)?;
        let (rotation_str, position_str) = rest.split_once('@').ok_or_else(invalid)?;
        let (x_str, y_str) = position_str.split_once(',').ok_or_else(invalid)?;

        let mut kind_chars = kind_str.chars();
        let kind = match (kind_chars.next(), kind_chars.next()) {
            (Some(c), None) => PieceKind::from_char(c).ok_or_else(invalid)?,
            _ => return Err(invalid()),
        };
        let rotation = rotation_str
            .parse::<u8>()
            .ok()
            .and_then(|n| PieceRotation::try_from(n).ok())
            .ok_or_else(invalid)?;
        let x = x_str.parse::<i16>().map_err(|_| invalid())?;
        let y = y_str.parse::<i16>().map_err(|_| invalid())?;

        Ok(Self::at(kind, rotation, x, y))
    }
}

impl Serialize for Piece {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Piece {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl Piece {
    #[must_use]
    pub const fn new(kind: PieceKind, rotation: PieceRotation, position: PiecePosition) -> Self {
        Self {
            position,
            rotation,
            kind,
        }
    }

    #[must_use]
    pub const fn at(kind: PieceKind, rotation: PieceRotation, x: i16, y: i16) -> Self {
        Self::new(kind, rotation, PiecePosition::new(x, y))
    }

    /// Places `kind` so that its occupied cells start at column `left` and row `top`.
    ///
    /// This is the inverse of [`Piece::leftmost_column`] / [`Piece::top_row`].
    #[must_use]
    pub fn with_cells_at(kind: PieceKind, rotation: PieceRotation, left: i16, top: i16) -> Self {
        let extent = kind.extent(rotation);
        Self::at(
            kind,
            rotation,
            left - i16::from(extent.min_x),
            top - i16::from(extent.min_y),
        )
    }

    #[must_use]
    pub fn position(&self) -> PiecePosition {
        self.position
    }

    #[must_use]
    pub fn rotation(&self) -> PieceRotation {
        self.rotation
    }

    #[must_use]
    pub fn kind(&self) -> PieceKind {
        self.kind
    }

    /// Returns the `(x, y)` grid coordinates of the four occupied cells.
    pub fn occupied_positions(&self) -> impl Iterator<Item = (i16, i16)> + '_ {
        self.kind
            .occupied_positions(self.rotation)
            .map(move |(dx, dy)| (self.position.x + i16::from(dx), self.position.y + i16::from(dy)))
    }

    /// Occupied cells sorted in row-major order.
    ///
    /// Two pieces with equal sorted cells cover the same part of the grid even when their
    /// kind or rotation labels differ (e.g. the two horizontal I orientations).
    #[must_use]
    pub fn sorted_cells(&self) -> [(i16, i16); 4] {
        let mut cells = [(0, 0); 4];
        for (slot, cell) in cells.iter_mut().zip(self.occupied_positions()) {
            *slot = cell;
        }
        cells.sort_by_key(|&(x, y)| (y, x));
        cells
    }

    /// Returns `true` if both pieces are the same kind and cover the same cells.
    #[must_use]
    pub fn same_footprint(&self, other: &Piece) -> bool {
        self.kind == other.kind && self.sorted_cells() == other.sorted_cells()
    }

    #[must_use]
    pub fn leftmost_column(&self) -> i16 {
        self.position.x + i16::from(self.kind.extent(self.rotation).min_x)
    }

    #[must_use]
    pub fn top_row(&self) -> i16 {
        self.position.y + i16::from(self.kind.extent(self.rotation).min_y)
    }

    #[must_use]
    pub fn bottom_row(&self) -> i16 {
        self.position.y + i16::from(self.kind.extent(self.rotation).max_y)
    }

    #[must_use]
    pub fn left(&self) -> Self {
        Self {
            position: self.position.offset(-1, 0),
            ..*self
        }
    }

    #[must_use]
    pub fn right(&self) -> Self {
        Self {
            position: self.position.offset(1, 0),
            ..*self
        }
    }

    #[must_use]
    pub fn up(&self) -> Self {
        Self {
            position: self.position.offset(0, -1),
            ..*self
        }
    }

    #[must_use]
    pub fn down(&self) -> Self {
        Self {
            position: self.position.offset(0, 1),
            ..*self
        }
    }

    #[must_use]
    pub fn rotated_right(&self) -> Self {
        Self {
            rotation: self.rotation.rotated_right(),
            ..*self
        }
    }

    #[must_use]
    pub fn rotated_left(&self) -> Self {
        Self {
            rotation: self.rotation.rotated_left(),
            ..*self
        }
    }

    /// Moves the piece down until one more step would collide.
    #[must_use]
    pub fn simulate_drop_position(&self, grid: &Grid) -> Self {
        let mut dropped = *self;
        loop {
            let piece = dropped.down();
            if grid.is_colliding(&piece) {
                return dropped;
            }
            dropped = piece;
        }
    }

    /// Returns `true` if the piece cannot move one row further down.
    #[must_use]
    pub fn is_resting(&self, grid: &Grid) -> bool {
        grid.is_colliding(&self.down())
    }
}

/// Position of a piece's 4×4 bounding box on the grid.
///
/// - X increases rightward (columns)
/// - Y increases downward (rows)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct PiecePosition {
    x: i16,
    y: i16,
}

impl PiecePosition {
    #[must_use]
    pub const fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub const fn x(self) -> i16 {
        self.x
    }

    #[must_use]
    pub const fn y(self) -> i16 {
        self.y
    }

    #[must_use]
    const fn offset(self, dx: i16, dy: i16) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// Rotation state of a piece.
///
/// - `0`: 0° (spawn orientation)
/// - `1`: 90° clockwise
/// - `2`: 180°
/// - `3`: 270° clockwise (90° counterclockwise)
///
/// Rotation operations wrap around modulo 4.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PieceRotation(u8);

impl TryFrom<u8> for PieceRotation {
    type Error = InvalidRotationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value < 4 {
            Ok(Self(value))
        } else {
            Err(InvalidRotationError { value })
        }
    }
}

impl From<PieceRotation> for u8 {
    fn from(rotation: PieceRotation) -> Self {
        rotation.0
    }
}

impl PieceRotation {
    pub const SPAWN: Self = Self(0);
    pub const ALL: [Self; 4] = [Self(0), Self(1), Self(2), Self(3)];

    #[must_use]
    pub fn rotated_right(self) -> Self {
        PieceRotation((self.0 + 1) % 4)
    }

    #[must_use]
    pub fn rotated_left(self) -> Self {
        PieceRotation((self.0 + 3) % 4)
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self.0
    }

    /// Minimum number of quarter turns needed to reach this rotation from spawn.
    #[must_use]
    pub const fn turns(self) -> u8 {
        if self.0 > 2 { 4 - self.0 } else { self.0 }
    }

    const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Enum representing the type of piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[repr(u8)]
pub enum PieceKind {
    /// I-piece.
    I = 0,
    /// O-piece.
    O = 1,
    /// S-piece.
    S = 2,
    /// Z-piece.
    Z = 3,
    /// J-piece.
    J = 4,
    /// L-piece.
    L = 5,
    /// T-piece.
    T = 6,
}

/// Bounds of the occupied cells inside the 4×4 box, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeExtent {
    pub min_x: u8,
    pub max_x: u8,
    pub min_y: u8,
    pub max_y: u8,
}

impl PieceKind {
    /// Number of piece types (7).
    pub const LEN: usize = 7;

    pub const ALL: [Self; Self::LEN] = [
        PieceKind::I,
        PieceKind::O,
        PieceKind::S,
        PieceKind::Z,
        PieceKind::J,
        PieceKind::L,
        PieceKind::T,
    ];

    /// Returns an iterator of occupied `(dx, dy)` offsets inside the bounding box.
    pub fn occupied_positions(self, rotation: PieceRotation) -> impl Iterator<Item = (u8, u8)> {
        PIECE_CELLS[self as usize][rotation.as_usize()].into_iter()
    }

    #[must_use]
    pub fn extent(self, rotation: PieceRotation) -> ShapeExtent {
        PIECE_EXTENTS[self as usize][rotation.as_usize()]
    }

    /// Occupied offsets translated so the top-left occupied bound is `(0, 0)`.
    ///
    /// Two rotations with equal normalized cells look identical on screen.
    #[must_use]
    pub fn normalized_cells(self, rotation: PieceRotation) -> [(u8, u8); 4] {
        let extent = self.extent(rotation);
        let mut cells = PIECE_CELLS[self as usize][rotation.as_usize()];
        for (x, y) in &mut cells {
            *x -= extent.min_x;
            *y -= extent.min_y;
        }
        cells.sort_by_key(|&(x, y)| (y, x));
        cells
    }

    /// Returns the single character representation of this piece kind.
    ///
    /// # Examples
    ///
    /// ```
    /// use tetrawatch_engine::PieceKind;
    ///
    /// assert_eq!(PieceKind::I.as_char(), 'I');
    /// assert_eq!(PieceKind::T.as_char(), 'T');
    /// ```
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            PieceKind::I => 'I',
            PieceKind::O => 'O',
            PieceKind::S => 'S',
            PieceKind::Z => 'Z',
            PieceKind::J => 'J',
            PieceKind::L => 'L',
            PieceKind::T => 'T',
        }
    }

    /// Parses a piece kind from a single character.
    ///
    /// # Examples
    ///
    /// ```
    /// use tetrawatch_engine::PieceKind;
    ///
    /// assert_eq!(PieceKind::from_char('I'), Some(PieceKind::I));
    /// assert_eq!(PieceKind::from_char('X'), None);
    /// ```
    #[must_use]
    pub const fn from_char(c: char) -> Option<Self> {
        match c {
            'I' => Some(PieceKind::I),
            'O' => Some(PieceKind::O),
            'S' => Some(PieceKind::S),
            'Z' => Some(PieceKind::Z),
            'J' => Some(PieceKind::J),
            'L' => Some(PieceKind::L),
            'T' => Some(PieceKind::T),
            _ => None,
        }
    }
}

/// One piece rotation as four rows of 4-bit masks; bit `x` of row `y` is cell `(x, y)`.
type PieceMask = [u8; 4];

/// Occupied `(dx, dy)` offsets of one piece rotation, row-major.
type PieceCells = [(u8, u8); 4];

/// Generates all 4 rotation states of a piece mask by rotating 90° clockwise.
///
/// `size` is the effective size of the piece (3 for most pieces, 4 for I, 2 for O).
const fn mask_rotations(size: usize, mask: PieceMask) -> [PieceMask; 4] {
    let mut rotates = [mask; 4];
    let mut i = 1;
    while i < 4 {
        let mut new_mask = [0; 4];
        let mut y = 0;
        while y < size {
            let mut x = 0;
            while x < size {
                if (rotates[i - 1][size - 1 - x] & (1 << y)) != 0 {
                    new_mask[y] |= 1 << x;
                }
                x += 1;
            }
            y += 1;
        }
        rotates[i] = new_mask;
        i += 1;
    }
    rotates
}

const fn mask_cells(mask: PieceMask) -> PieceCells {
    let mut cells = [(0, 0); 4];
    let mut n = 0;
    let mut y: u8 = 0;
    while y < 4 {
        let mut x: u8 = 0;
        while x < 4 {
            if mask[y as usize] & (1 << x) != 0 {
                cells[n] = (x, y);
                n += 1;
            }
            x += 1;
        }
        y += 1;
    }
    assert!(n == 4, "tetromino must have exactly 4 cells");
    cells
}

const fn cells_extent(cells: PieceCells) -> ShapeExtent {
    let mut extent = ShapeExtent {
        min_x: 3,
        max_x: 0,
        min_y: 3,
        max_y: 0,
    };
    let mut i = 0;
    while i < 4 {
        let (x, y) = cells[i];
        if x < extent.min_x {
            extent.min_x = x;
        }
        if x > extent.max_x {
            extent.max_x = x;
        }
        if y < extent.min_y {
            extent.min_y = y;
        }
        if y > extent.max_y {
            extent.max_y = y;
        }
        i += 1;
    }
    extent
}

const PIECE_MASKS: [[PieceMask; 4]; PieceKind::LEN] = [
    // I-piece
    mask_rotations(4, [0b0000, 0b1111, 0b0000, 0b0000]),
    // O-piece
    mask_rotations(2, [0b0011, 0b0011, 0b0000, 0b0000]),
    // S-piece
    mask_rotations(3, [0b0110, 0b0011, 0b0000, 0b0000]),
    // Z-piece
    mask_rotations(3, [0b0011, 0b0110, 0b0000, 0b0000]),
    // J-piece
    mask_rotations(3, [0b0001, 0b0111, 0b0000, 0b0000]),
    // L-piece
    mask_rotations(3, [0b0100, 0b0111, 0b0000, 0b0000]),
    // T-piece
    mask_rotations(3, [0b0010, 0b0111, 0b0000, 0b0000]),
];

const PIECE_CELLS: [[PieceCells; 4]; PieceKind::LEN] = {
    let mut cells = [[[(0, 0); 4]; 4]; PieceKind::LEN];
    let mut k = 0;
    while k < PieceKind::LEN {
        let mut r = 0;
        while r < 4 {
            cells[k][r] = mask_cells(PIECE_MASKS[k][r]);
            r += 1;
        }
        k += 1;
    }
    cells
};

const PIECE_EXTENTS: [[ShapeExtent; 4]; PieceKind::LEN] = {
    let mut extents = [[cells_extent(PIECE_CELLS[0][0]); 4]; PieceKind::LEN];
    let mut k = 0;
    while k < PieceKind::LEN {
        let mut r = 0;
        while r < 4 {
            extents[k][r] = cells_extent(PIECE_CELLS[k][r]);
            r += 1;
        }
        k += 1;
    }
    extents
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_piece_string_format() {
        let piece = Piece::at(PieceKind::S, PieceRotation(1), 4, 18);
        assert_eq!(piece.to_string(), "S#1@4,18");
        assert_eq!("S#1@4,18".parse::<Piece>().unwrap(), piece);

        let buffered = Piece::at(PieceKind::I, PieceRotation(0), 3, -2);
        assert_eq!(buffered.to_string(), "I#0@3,-2");
        assert_eq!("I#0@3,-2".parse::<Piece>().unwrap(), buffered);
    }

    #[test]
    fn test_piece_serialization() {
        let piece = Piece::at(PieceKind::T, PieceRotation(2), 3, 7);
        let serialized = serde_json::to_string(&piece).unwrap();
        assert_eq!(serialized, "\"T#2@3,7\"");
        let deserialized: Piece = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, piece);
    }

    #[test]
    fn test_piece_parse_error_cases() {
        assert!("S1@4,18".parse::<Piece>().is_err());
        assert!("S#1#4,18".parse::<Piece>().is_err());
        assert!("S#1@4".parse::<Piece>().is_err());
        assert!("X#1@4,18".parse::<Piece>().is_err());
        assert!("SS#1@4,18".parse::<Piece>().is_err());
        assert!("S#4@4,18".parse::<Piece>().is_err());
        assert!("S#1@abc,18".parse::<Piece>().is_err());
    }

    #[test]
    fn test_every_rotation_has_four_distinct_cells() {
        for kind in PieceKind::ALL {
            for rotation in PieceRotation::ALL {
                let mut cells: Vec<_> = kind.occupied_positions(rotation).collect();
                cells.sort_unstable();
                cells.dedup();
                assert_eq!(cells.len(), 4, "{kind:?} rotation {rotation:?}");
            }
        }
    }

    #[test]
    fn test_normalized_shapes() {
        assert_eq!(
            PieceKind::I.normalized_cells(PieceRotation(0)),
            [(0, 0), (1, 0), (2, 0), (3, 0)]
        );
        assert_eq!(
            PieceKind::I.normalized_cells(PieceRotation(1)),
            [(0, 0), (0, 1), (0, 2), (0, 3)]
        );
        assert_eq!(
            PieceKind::T.normalized_cells(PieceRotation(0)),
            [(1, 0), (0, 1), (1, 1), (2, 1)]
        );
        // O looks the same in every rotation
        for rotation in PieceRotation::ALL {
            assert_eq!(
                PieceKind::O.normalized_cells(rotation),
                [(0, 0), (1, 0), (0, 1), (1, 1)]
            );
        }
    }

    #[test]
    fn test_with_cells_at_round_trip() {
        for kind in PieceKind::ALL {
            for rotation in PieceRotation::ALL {
                let piece = Piece::with_cells_at(kind, rotation, 2, 5);
                assert_eq!(piece.leftmost_column(), 2);
                assert_eq!(piece.top_row(), 5);
            }
        }
    }

    #[test]
    fn test_rotation_turns() {
        assert_eq!(PieceRotation(0).turns(), 0);
        assert_eq!(PieceRotation(1).turns(), 1);
        assert_eq!(PieceRotation(2).turns(), 2);
        assert_eq!(PieceRotation(3).turns(), 1);
        assert_eq!(PieceRotation(3).rotated_right(), PieceRotation(0));
        assert_eq!(PieceRotation(0).rotated_left(), PieceRotation(3));
    }

    #[test]
    fn test_piece_kind_char_conversion() {
        for kind in PieceKind::ALL {
            assert_eq!(PieceKind::from_char(kind.as_char()), Some(kind));
        }
        assert_eq!(PieceKind::from_char('x'), None);
    }
}
