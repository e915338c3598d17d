use serde::{Deserialize, Serialize};

use crate::calibration::PixelRect;

/// Known playfield placement of a game layout, as fractions of the frame size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutTemplate {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl LayoutTemplate {
    /// Playfield rectangle in a `frame_width` x `frame_height` frame.
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    #[must_use]
    pub fn rect_in(&self, frame_width: u32, frame_height: u32) -> Option<PixelRect> {
        let valid = [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite() && (0.0..=1.0).contains(v));
        if !valid {
            return None;
        }
        let scale = |fraction: f32, extent: u32| (fraction * extent as f32).round() as u32;
        let rect = PixelRect::new(
            scale(self.x, frame_width),
            scale(self.y, frame_height),
            scale(self.width, frame_width),
            scale(self.height, frame_height),
        );
        rect.fits_within(frame_width, frame_height).then_some(rect)
    }
}
