/// Nearest-rank percentile of sorted data.
///
/// The `p`-th percentile of `n` values is the element at index `floor(n * p / 100)`,
/// clamped to the last element. Returns `NaN` for empty input.
///
/// ```
/// use tetrawatch_stats::percentiles::compute_percentile;
///
/// let values = [1.0, 2.0, 3.0, 4.0, 5.0];
/// assert_eq!(compute_percentile(&values, 50.0), 3.0);
/// assert_eq!(compute_percentile(&values, 95.0), 5.0);
/// ```
#[expect(
    clippy::cast_sign_loss,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss
)]
#[must_use]
pub fn compute_percentile(sorted_values: &[f32], percentile: f32) -> f32 {
    if sorted_values.is_empty() {
        return f32::NAN;
    }
    let idx = ((sorted_values.len() as f32 * percentile) / 100.0) as usize;
    sorted_values[idx.min(sorted_values.len() - 1)]
}

/// Precomputed `(percentile, value)` pairs.
#[derive(Debug, Clone)]
pub struct Percentiles {
    values: Vec<(f32, f32)>,
}

impl Percentiles {
    #[must_use]
    pub fn new(values: &[f32], percentile_points: &[f32]) -> Self {
        let mut sorted = values.to_vec();
        sorted.sort_by(f32::total_cmp);
        Self::from_sorted(&sorted, percentile_points)
    }

    #[must_use]
    pub fn from_sorted(sorted_values: &[f32], percentile_points: &[f32]) -> Self {
        assert!(
            sorted_values.is_sorted_by(|a, b| a <= b),
            "values must be sorted in ascending order"
        );
        let values = percentile_points
            .iter()
            .map(|&p| (p, compute_percentile(sorted_values, p)))
            .collect();
        Self { values }
    }

    /// Value at a precomputed percentile.
    #[must_use]
    pub fn get(&self, percentile: f32) -> Option<f32> {
        self.values
            .iter()
            .find(|(p, _)| (p - percentile).abs() < f32::EPSILON)
            .map(|&(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.values.iter().copied()
    }
}
