//! Playfield detection from intensity edges.
//!
//! The playfield is assumed to be an axis-aligned rectangle whose border contrasts with
//! its surroundings. Detection works on two binary edge maps (vertical and horizontal
//! intensity steps), collapses them into projection profiles, keeps the profile peaks as
//! candidate border lines and scores every rectangle spanned by two vertical and two
//! horizontal candidates.

use tracing::trace;

use crate::{calibration::PixelRect, frame::LumaPlane};

/// Number of strongest peaks kept per axis.
const MAX_PEAKS: usize = 12;
/// Half width of the non-maximum suppression window, in pixels.
const NMS_RADIUS: usize = 3;
/// Distance in pixels at which an edge pixel still supports a border line.
const SUPPORT_SLACK: usize = 1;

/// Binary maps of strong horizontal and vertical intensity steps.
///
/// `vertical[y * width + x]` is set when pixel `x` differs from pixel `x - 1` by more than
/// the threshold, i.e. a vertical boundary runs along the left side of column `x`.
#[derive(Debug)]
pub struct EdgeMap {
    width: usize,
    height: usize,
    vertical: Vec<bool>,
    horizontal: Vec<bool>,
}

impl EdgeMap {
    #[must_use]
    pub fn from_luma(luma: &LumaPlane, threshold: f32) -> Self {
        let (width, height) = (luma.width, luma.height);
        let mut vertical = vec![false; width * height];
        let mut horizontal = vec![false; width * height];
        for y in 0..height {
            for x in 0..width {
                let here = luma.get(x, y);
                if x > 0 && (here - luma.get(x - 1, y)).abs() > threshold {
                    vertical[y * width + x] = true;
                }
                if y > 0 && (here - luma.get(x, y - 1)).abs() > threshold {
                    horizontal[y * width + x] = true;
                }
            }
        }
        Self {
            width,
            height,
            vertical,
            horizontal,
        }
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    fn is_vertical_edge(&self, x: usize, y: usize) -> bool {
        let lo = x.saturating_sub(SUPPORT_SLACK);
        let hi = (x + SUPPORT_SLACK).min(self.width.saturating_sub(1));
        (lo..=hi).any(|x| self.vertical[y * self.width + x])
    }

    fn is_horizontal_edge(&self, x: usize, y: usize) -> bool {
        let lo = y.saturating_sub(SUPPORT_SLACK);
        let hi = (y + SUPPORT_SLACK).min(self.height.saturating_sub(1));
        (lo..=hi).any(|y| self.horizontal[y * self.width + x])
    }

    /// Edge pixel count of every column (vertical edges only).
    fn column_profile(&self) -> Vec<usize> {
        let mut profile = vec![0; self.width];
        for row in self.vertical.chunks(self.width.max(1)) {
            for (count, &edge) in profile.iter_mut().zip(row) {
                *count += usize::from(edge);
            }
        }
        profile
    }

    /// Edge pixel count of every row (horizontal edges only).
    fn row_profile(&self) -> Vec<usize> {
        self.horizontal
            .chunks(self.width.max(1))
            .map(|row| row.iter().filter(|&&e| e).count())
            .collect()
    }

    /// Mean fraction of each side of `rect` that lies on an edge, in `[0, 1]`.
    ///
    /// Sides are the lines `x = rect.x`, `x = rect.right()`, `y = rect.y` and
    /// `y = rect.bottom()`; a side outside the map has no support.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn side_support(&self, rect: PixelRect) -> f32 {
        let (x0, y0) = (rect.x as usize, rect.y as usize);
        let (x1, y1) = (rect.right() as usize, rect.bottom() as usize);
        if rect.width == 0 || rect.height == 0 || x1 >= self.width || y1 >= self.height {
            return 0.0;
        }
        let ratio = |hits: usize, len: usize| hits as f32 / len as f32;
        let left = ratio(
            (y0..y1).filter(|&y| self.is_vertical_edge(x0, y)).count(),
            y1 - y0,
        );
        let right = ratio(
            (y0..y1).filter(|&y| self.is_vertical_edge(x1, y)).count(),
            y1 - y0,
        );
        let top = ratio(
            (x0..x1).filter(|&x| self.is_horizontal_edge(x, y0)).count(),
            x1 - x0,
        );
        let bottom = ratio(
            (x0..x1).filter(|&x| self.is_horizontal_edge(x, y1)).count(),
            x1 - x0,
        );
        (left + right + top + bottom) / 4.0
    }
}

/// Constraints for rectangle search.
#[derive(Debug, Clone, Copy)]
pub struct RectSearch {
    /// Expected width / height of the playfield.
    pub aspect: f32,
    /// Relative aspect error at which the fit reaches zero.
    pub aspect_tolerance: f32,
    pub min_size: [u32; 2],
    pub max_size: [u32; 2],
}

impl RectSearch {
    /// Aspect fit of a `width` x `height` rectangle in `[0, 1]`.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn aspect_fit(&self, width: usize, height: usize) -> f32 {
        if height == 0 || self.aspect <= 0.0 {
            return 0.0;
        }
        let ratio = width as f32 / height as f32;
        let error = (ratio / self.aspect - 1.0).abs();
        (1.0 - error / self.aspect_tolerance.max(f32::EPSILON)).clamp(0.0, 1.0)
    }

    fn size_ok(&self, width: usize, height: usize) -> bool {
        let within = |v: usize, lo: u32, hi: u32| (lo as usize..=hi as usize).contains(&v);
        within(width, self.min_size[0], self.max_size[0])
            && within(height, self.min_size[1], self.max_size[1])
    }
}

/// Positions of the strongest local maxima of `profile` at least `min_count` high, in
/// ascending order.
fn profile_peaks(profile: &[usize], min_count: usize) -> Vec<usize> {
    let mut peaks = (0..profile.len())
        .filter(|&i| {
            let v = profile[i];
            if v < min_count.max(1) {
                return false;
            }
            let lo = i.saturating_sub(NMS_RADIUS);
            let hi = (i + NMS_RADIUS).min(profile.len() - 1);
            // first index of a plateau wins
            (lo..i).all(|j| profile[j] < v) && (i + 1..=hi).all(|j| profile[j] <= v)
        })
        .collect::<Vec<_>>();
    peaks.sort_by(|&a, &b| profile[b].cmp(&profile[a]).then(a.cmp(&b)));
    peaks.truncate(MAX_PEAKS);
    peaks.sort_unstable();
    peaks
}

/// Best-scoring rectangle and its confidence.
#[must_use]
pub fn find_playfield(edges: &EdgeMap, search: &RectSearch) -> Option<(PixelRect, f32)> {
    let columns = profile_peaks(&edges.column_profile(), search.min_size[1] as usize / 2);
    let rows = profile_peaks(&edges.row_profile(), search.min_size[0] as usize / 2);
    trace!(?columns, ?rows, "border line candidates");

    let mut best: Option<(PixelRect, f32)> = None;
    for (i, &x0) in columns.iter().enumerate() {
        for &x1 in &columns[i + 1..] {
            for (j, &y0) in rows.iter().enumerate() {
                for &y1 in &rows[j + 1..] {
                    let (width, height) = (x1 - x0, y1 - y0);
                    if !search.size_ok(width, height) {
                        continue;
                    }
                    let fit = search.aspect_fit(width, height);
                    if fit <= 0.0 {
                        continue;
                    }
                    let rect = PixelRect::new(
                        u32::try_from(x0).ok()?,
                        u32::try_from(y0).ok()?,
                        u32::try_from(width).ok()?,
                        u32::try_from(height).ok()?,
                    );
                    let score = edges.side_support(rect) * fit;
                    let better = best.is_none_or(|(b, s)| {
                        score > s
                            || ((score - s).abs() < f32::EPSILON
                                && rect.width * rect.height > b.width * b.height)
                    });
                    if better {
                        best = Some((rect, score));
                    }
                }
            }
        }
    }
    best
}
