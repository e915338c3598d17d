//! Luma template signal.
//!
//! A filled cell shows a bevelled block: bright along its top-left edges, darker toward
//! the bottom-right. An empty cell is flat background. The patch is correlated against the
//! bevel template and its contrast decides how far the correlation can be trusted.

use crate::frame::Frame;

use super::fusion::Estimate;

/// Samples per axis.
const SAMPLES: usize = 8;
/// Relative standard deviation at which a patch counts as fully textured.
const FULL_CONTRAST: f32 = 0.03;
/// Lower bound of the mean used for the relative deviation, so near-black patches with
/// sensor noise do not count as textured.
const MIN_MEAN: f32 = 16.0;

/// Bevel template value at sample `(i, j)`: 1 at the top-left, 0 at the bottom-right.
#[expect(clippy::cast_precision_loss)]
fn bevel(i: usize, j: usize) -> f32 {
    1.0 - (i + j) as f32 / (2 * (SAMPLES - 1)) as f32
}

/// Inner region of a cell in sub-pixel coordinates.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SampleRect {
    pub(crate) x: f32,
    pub(crate) y: f32,
    pub(crate) width: f32,
    pub(crate) height: f32,
}

#[expect(clippy::cast_precision_loss)]
pub(crate) fn template_signal(frame: &Frame, rect: SampleRect) -> Estimate<bool> {
    let mut samples = [0.0_f32; SAMPLES * SAMPLES];
    let step_x = rect.width / SAMPLES as f32;
    let step_y = rect.height / SAMPLES as f32;
    for j in 0..SAMPLES {
        for i in 0..SAMPLES {
            let x = rect.x + (i as f32 + 0.5) * step_x;
            let y = rect.y + (j as f32 + 0.5) * step_y;
            samples[j * SAMPLES + i] = frame.luma_bilinear(x, y);
        }
    }

    let n = samples.len() as f32;
    let mean = samples.iter().sum::<f32>() / n;
    let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / n;
    let std_dev = variance.sqrt();
    let contrast = ((std_dev / mean.max(MIN_MEAN)) / FULL_CONTRAST).min(1.0);

    let template_mean = (0..SAMPLES * SAMPLES)
        .map(|k| bevel(k % SAMPLES, k / SAMPLES))
        .sum::<f32>()
        / n;
    let mut covariance = 0.0;
    let mut template_variance = 0.0;
    for (k, &s) in samples.iter().enumerate() {
        let t = bevel(k % SAMPLES, k / SAMPLES) - template_mean;
        covariance += (s - mean) * t;
        template_variance += t * t;
    }
    let ncc = if variance <= f32::EPSILON {
        0.0
    } else {
        covariance / (variance * n * template_variance).sqrt()
    };

    let filled = ncc.max(0.0) * contrast;
    let empty = 1.0 - contrast;
    Estimate::new(filled > empty, (filled - empty).abs())
}
