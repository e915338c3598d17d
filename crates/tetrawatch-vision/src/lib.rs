//! Screen-side perception: frames, capture sources, board localization and cell
//! recognition.
//!
//! The flow for one frame is:
//!
//! 1. A [`FrameSource`](source::FrameSource) yields an immutable [`Frame`](frame::Frame)
//! 2. The [`BoardLocalizer`](localizer::BoardLocalizer) maps it to a
//!    [`Calibration`](calibration::Calibration): where the playfield is and how big its
//!    cells are
//! 3. The [`Recognizer`](recognizer::Recognizer) classifies every cell and looks for the
//!    active, next and held pieces, producing an
//!    [`Observation`](recognizer::Observation)
//!
//! Nothing here keeps game state between frames except the localizer's last known good
//! calibration.

pub mod calibration;
pub mod frame;
pub mod localizer;
pub mod recognizer;
pub mod render;
pub mod source;
