//! Confidence fusion of two independent classification signals.

/// A classification with its confidence in `[0, 1]`.
///
/// `value: None` means the signal had nothing to say.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate<T> {
    pub value: Option<T>,
    pub confidence: f32,
}

impl<T> Estimate<T> {
    #[must_use]
    pub fn new(value: T, confidence: f32) -> Self {
        Self {
            value: Some(value),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    #[must_use]
    pub fn none() -> Self {
        Self {
            value: None,
            confidence: 0.0,
        }
    }

    /// The value, if its confidence reaches `threshold`.
    #[must_use]
    pub fn accepted(self, threshold: f32) -> Option<T> {
        self.value.filter(|_| self.confidence >= threshold)
    }
}

/// Fuses a primary signal `a` (weighted by `weight_a`) with a secondary signal `b`
/// (weighted by `1 - weight_a`).
///
/// - agreeing values: the weighted mean of both confidences
/// - conflicting values: the value with the larger weighted confidence wins, with the
///   difference of the weighted confidences as its confidence
/// - a missing value defers to the other signal unchanged
#[must_use]
pub fn fuse<T: PartialEq>(a: Estimate<T>, b: Estimate<T>, weight_a: f32) -> Estimate<T> {
    let weight_a = weight_a.clamp(0.0, 1.0);
    let weight_b = 1.0 - weight_a;
    match (a.value, b.value) {
        (None, None) => Estimate::none(),
        (Some(value), None) => Estimate::new(value, a.confidence),
        (None, Some(value)) => Estimate::new(value, b.confidence),
        (Some(va), Some(vb)) => {
            let (wa, wb) = (weight_a * a.confidence, weight_b * b.confidence);
            if va == vb {
                Estimate::new(va, wa + wb)
            } else if wa >= wb {
                Estimate::new(va, wa - wb)
            } else {
                Estimate::new(vb, wb - wa)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_agreement_blends_confidence() {
        let fused = fuse(Estimate::new('x', 0.9), Estimate::new('x', 0.5), 0.5);
        assert_eq!(fused.value, Some('x'));
        assert!(close(fused.confidence, 0.7));

        let weighted = fuse(Estimate::new('x', 1.0), Estimate::new('x', 0.0), 0.8);
        assert!(close(weighted.confidence, 0.8));
    }

    #[test]
    fn test_conflict_keeps_margin() {
        let fused = fuse(Estimate::new('a', 0.9), Estimate::new('b', 0.5), 0.5);
        assert_eq!(fused.value, Some('a'));
        assert!(close(fused.confidence, 0.2));

        let fused = fuse(Estimate::new('a', 0.6), Estimate::new('b', 1.0), 0.5);
        assert_eq!(fused.value, Some('b'));
        assert!(close(fused.confidence, 0.2));
    }

    #[test]
    fn test_missing_signal_defers() {
        let fused = fuse(Estimate::none(), Estimate::new(3, 0.75), 0.9);
        assert_eq!(fused, Estimate::new(3, 0.75));
        let fused = fuse(Estimate::new(3, 0.4), Estimate::none(), 0.1);
        assert_eq!(fused, Estimate::new(3, 0.4));
        assert_eq!(fuse::<u8>(Estimate::none(), Estimate::none(), 0.5).value, None);
    }

    #[test]
    fn test_conflict_never_passes_a_strict_threshold_with_equal_weights() {
        for ca in [0.0, 0.3, 0.6, 1.0] {
            for cb in [0.0, 0.3, 0.6, 1.0] {
                let fused = fuse(Estimate::new(1, ca), Estimate::new(2, cb), 0.5);
                assert!(fused.accepted(0.6).is_none());
            }
        }
    }

    #[test]
    fn test_accepted() {
        assert_eq!(Estimate::new(1, 0.6).accepted(0.6), Some(1));
        assert_eq!(Estimate::new(1, 0.59).accepted(0.6), None);
    }
}
