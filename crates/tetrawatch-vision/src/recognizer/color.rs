use serde::{Deserialize, Serialize};
use tetrawatch_engine::PieceKind;

use super::fusion::Estimate;

/// Hue in degrees `[0, 360)`, saturation and value in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsv {
    pub h: f32,
    pub s: f32,
    pub v: f32,
}

impl Hsv {
    /// Converts an RGB color with channels in `0.0..=255.0`.
    #[must_use]
    pub fn from_rgb([r, g, b]: [f32; 3]) -> Self {
        let (r, g, b) = (r / 255.0, g / 255.0, b / 255.0);
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let h = if delta <= f32::EPSILON {
            0.0
        } else if (max - r).abs() <= f32::EPSILON {
            60.0 * ((g - b) / delta).rem_euclid(6.0)
        } else if (max - g).abs() <= f32::EPSILON {
            60.0 * ((b - r) / delta + 2.0)
        } else {
            60.0 * ((r - g) / delta + 4.0)
        };
        let s = if max <= f32::EPSILON { 0.0 } else { delta / max };
        Self { h, s, v: max }
    }
}

/// Angular distance between two hues, in degrees `[0, 180]`.
#[must_use]
pub fn hue_distance(a: f32, b: f32) -> f32 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

/// Reference hue of every piece kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Palette {
    pub hues: Vec<(PieceKind, f32)>,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            hues: vec![
                (PieceKind::Z, 0.0),
                (PieceKind::L, 40.0),
                (PieceKind::O, 60.0),
                (PieceKind::S, 120.0),
                (PieceKind::I, 180.0),
                (PieceKind::J, 240.0),
                (PieceKind::T, 280.0),
            ],
        }
    }
}

impl Palette {
    /// Closest kind to `hue` and its distance.
    #[must_use]
    pub fn nearest(&self, hue: f32) -> Option<(PieceKind, f32)> {
        self.hues
            .iter()
            .map(|&(kind, reference)| (kind, hue_distance(hue, reference)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Thresholds of the color signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorRules {
    pub min_saturation: f32,
    pub min_value: f32,
    /// Value from which an unsaturated cell counts as a gray garbage block.
    pub garbage_min_value: f32,
    /// Hue distance in degrees at which identity confidence reaches zero.
    pub tolerance: f32,
}

/// Occupancy and identity read from a cell's mean color.
#[derive(Debug, Clone, Copy)]
pub struct ColorSignal {
    pub occupied: Estimate<bool>,
    pub identity: Estimate<PieceKind>,
}

impl ColorSignal {
    #[must_use]
    pub fn classify(hsv: Hsv, rules: &ColorRules, palette: &Palette) -> Self {
        let margin = |value: f32, threshold: f32, upward: bool| {
            let m = if upward {
                (value - threshold) / (1.0 - threshold).max(f32::EPSILON)
            } else {
                (threshold - value) / threshold.max(f32::EPSILON)
            };
            m.clamp(0.0, 1.0)
        };

        let colored = hsv.s >= rules.min_saturation && hsv.v >= rules.min_value;
        if colored {
            let strength = margin(hsv.s, rules.min_saturation, true)
                .min(margin(hsv.v, rules.min_value, true));
            let identity = palette
                .nearest(hsv.h)
                .map(|(kind, distance)| {
                    let confidence = 1.0 - distance / rules.tolerance.max(f32::EPSILON);
                    (kind, confidence)
                })
                .filter(|&(_, confidence)| confidence > 0.0)
                .map_or_else(Estimate::none, |(kind, confidence)| {
                    Estimate::new(kind, confidence)
                });
            return Self {
                occupied: Estimate::new(true, 0.5 + 0.5 * strength),
                identity,
            };
        }

        if hsv.v >= rules.garbage_min_value {
            return Self {
                occupied: Estimate::new(
                    true,
                    0.5 + 0.5 * margin(hsv.v, rules.garbage_min_value, true),
                ),
                identity: Estimate::none(),
            };
        }

        let dark = margin(hsv.v, rules.min_value, false);
        let gray = margin(hsv.s, rules.min_saturation, false)
            .min(margin(hsv.v, rules.garbage_min_value, false));
        Self {
            occupied: Estimate::new(false, 0.5 + 0.5 * dark.max(gray)),
            identity: Estimate::none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> ColorRules {
        ColorRules {
            min_saturation: 0.35,
            min_value: 0.25,
            garbage_min_value: 0.55,
            tolerance: 20.0,
        }
    }

    #[test]
    fn test_hsv_conversion() {
        let red = Hsv::from_rgb([255.0, 0.0, 0.0]);
        assert!(red.h.abs() < 1e-4 && (red.s - 1.0).abs() < 1e-6 && (red.v - 1.0).abs() < 1e-6);
        let cyan = Hsv::from_rgb([0.0, 200.0, 200.0]);
        assert!((cyan.h - 180.0).abs() < 1e-3);
        let gray = Hsv::from_rgb([100.0, 100.0, 100.0]);
        assert!(gray.s.abs() < 1e-6);
        let magenta_ish = Hsv::from_rgb([255.0, 0.0, 128.0]);
        assert!(magenta_ish.h > 300.0 && magenta_ish.h < 360.0);
    }

    #[test]
    fn test_hue_distance_wraps() {
        assert!((hue_distance(350.0, 10.0) - 20.0).abs() < 1e-4);
        assert!((hue_distance(0.0, 180.0) - 180.0).abs() < 1e-4);
    }

    #[test]
    fn test_palette_identity() {
        let palette = Palette::default();
        let signal = ColorSignal::classify(Hsv::from_rgb([0.0, 0.0, 200.0]), &rules(), &palette);
        assert_eq!(signal.occupied.value, Some(true));
        assert_eq!(signal.identity.value, Some(PieceKind::J));
        assert!((signal.identity.confidence - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_dark_and_gray_cells() {
        let palette = Palette::default();
        let dark = ColorSignal::classify(Hsv::from_rgb([12.0, 12.0, 16.0]), &rules(), &palette);
        assert_eq!(dark.occupied.value, Some(false));
        assert!(dark.occupied.confidence > 0.8);

        let garbage =
            ColorSignal::classify(Hsv::from_rgb([170.0, 170.0, 170.0]), &rules(), &palette);
        assert_eq!(garbage.occupied.value, Some(true));
        assert_eq!(garbage.identity.value, None);
    }
}
