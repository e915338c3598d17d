pub use self::{core::*, engine::*};

pub mod core;
pub mod engine;

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("piece colliding or outside the grid when locking")]
pub struct PieceCollisionError;

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("invalid piece format '{input}', expected 'kind#rotation@x,y'")]
pub struct ParsePieceError {
    #[error(not(source))]
    input: String,
}

impl ParsePieceError {
    pub(crate) fn new(input: &str) -> Self {
        Self {
            input: input.to_owned(),
        }
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("rotation must be 0-3, got {value}")]
pub struct InvalidRotationError {
    #[error(not(source))]
    pub value: u8,
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum GridParseError {
    #[display("row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[display("invalid cell '{cell}' at row {row}")]
    InvalidCell { row: usize, cell: char },
}
