//! Piece matching on connected groups of occupied cells.

use arrayvec::ArrayVec;
use tetrawatch_engine::{PieceKind, PieceRotation};
use tracing::trace;

use super::fusion::{Estimate, fuse};

/// An occupied cell as seen by the per-cell classifier.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PatchCell {
    pub(crate) confidence: f32,
    pub(crate) identity: Estimate<PieceKind>,
}

/// Rectangular window of cells; `left` and `top` are grid coordinates and may lie outside
/// the grid (spawn buffer, preview panels).
#[derive(Debug, Clone)]
pub(crate) struct CellPatch {
    pub(crate) left: i32,
    pub(crate) top: i32,
    pub(crate) columns: usize,
    pub(crate) rows: usize,
    /// Row-major; `None` for empty, unknown and off-frame cells.
    pub(crate) cells: Vec<Option<PatchCell>>,
}

/// A group of four cells laid out like a library shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PieceMatch {
    pub(crate) kind: PieceKind,
    pub(crate) rotation: PieceRotation,
    /// Grid column of the leftmost cell.
    pub(crate) left: i32,
    /// Grid row of the topmost cell.
    pub(crate) top: i32,
    pub(crate) confidence: f32,
}

impl CellPatch {
    pub(crate) fn new(left: i32, top: i32, columns: usize, rows: usize) -> Self {
        Self {
            left,
            top,
            columns,
            rows,
            cells: vec![None; columns * rows],
        }
    }

    fn get(&self, x: usize, y: usize) -> Option<&PatchCell> {
        self.cells[y * self.columns + x].as_ref()
    }

    fn connected(&self, a: &PatchCell, b: &PatchCell, threshold: f32) -> bool {
        match (a.identity.accepted(threshold), b.identity.accepted(threshold)) {
            (Some(x), Some(y)) => x == y,
            _ => true,
        }
    }

    /// 4-connected components in row-major order of their first cell.
    fn components(&self, threshold: f32) -> Vec<Vec<(usize, usize)>> {
        let mut seen = vec![false; self.cells.len()];
        let mut components = Vec::new();
        for start in 0..self.cells.len() {
            if seen[start] || self.cells[start].is_none() {
                continue;
            }
            seen[start] = true;
            let mut component = Vec::new();
            let mut stack = vec![(start % self.columns, start / self.columns)];
            while let Some((x, y)) = stack.pop() {
                component.push((x, y));
                let Some(here) = self.get(x, y) else {
                    continue;
                };
                let neighbours = [
                    x.checked_sub(1).map(|x| (x, y)),
                    (x + 1 < self.columns).then_some((x + 1, y)),
                    y.checked_sub(1).map(|y| (x, y)),
                    (y + 1 < self.rows).then_some((x, y + 1)),
                ];
                for (nx, ny) in neighbours.into_iter().flatten() {
                    let idx = ny * self.columns + nx;
                    if seen[idx] {
                        continue;
                    }
                    if let Some(there) = self.get(nx, ny)
                        && self.connected(here, there, threshold)
                    {
                        seen[idx] = true;
                        stack.push((nx, ny));
                    }
                }
            }
            components.push(component);
        }
        components
    }

    /// Groups matching a library shape whose fused kind reaches `threshold`, topmost
    /// first, then leftmost.
    pub(crate) fn find_pieces(&self, threshold: f32, shape_weight: f32) -> Vec<PieceMatch> {
        let mut found = self
            .components(threshold)
            .into_iter()
            .filter_map(|component| self.match_component(&component, threshold, shape_weight))
            .collect::<Vec<_>>();
        found.sort_by_key(|m| (m.top, m.left));
        found
    }

    #[expect(clippy::cast_precision_loss)]
    fn match_component(
        &self,
        component: &[(usize, usize)],
        threshold: f32,
        shape_weight: f32,
    ) -> Option<PieceMatch> {
        let cells: [(usize, usize); 4] = component.try_into().ok()?;
        let min_x = cells.iter().map(|c| c.0).min()?;
        let min_y = cells.iter().map(|c| c.1).min()?;
        let mut layout = [(0_u8, 0_u8); 4];
        for (slot, (x, y)) in layout.iter_mut().zip(cells) {
            *slot = (u8::try_from(x - min_x).ok()?, u8::try_from(y - min_y).ok()?);
        }
        layout.sort_by_key(|&(x, y)| (y, x));
        let (kind, rotation) = match_layout(layout)?;

        let patch_cells = cells
            .iter()
            .filter_map(|&(x, y)| self.get(x, y))
            .collect::<ArrayVec<_, 4>>();
        let shape_confidence =
            patch_cells.iter().map(|c| c.confidence).sum::<f32>() / patch_cells.len() as f32;
        let shape = Estimate::new(kind, shape_confidence);
        let color = majority_identity(&patch_cells, threshold);
        let fused = fuse(shape, color, shape_weight);
        trace!(?kind, ?shape, ?color, ?fused, "shape candidate");

        if fused.value != Some(kind) || fused.confidence < threshold {
            return None;
        }
        Some(PieceMatch {
            kind,
            rotation,
            left: self.left + i32::try_from(min_x).ok()?,
            top: self.top + i32::try_from(min_y).ok()?,
            confidence: fused.confidence,
        })
    }
}

/// Kind and rotation whose normalized cells equal `layout`; the rotation reachable with
/// the fewest turns wins when several look alike.
pub(crate) fn match_layout(layout: [(u8, u8); 4]) -> Option<(PieceKind, PieceRotation)> {
    PieceKind::ALL.into_iter().find_map(|kind| {
        let rotations = PieceRotation::ALL
            .into_iter()
            .filter(|&r| kind.normalized_cells(r) == layout)
            .collect::<ArrayVec<_, 4>>();
        let rotation = rotations.into_iter().min_by_key(|r| (r.turns(), *r))?;
        Some((kind, rotation))
    })
}

/// Color vote over the cells of a group: the most frequent accepted identity, weighted by
/// the share of cells voting for it.
#[expect(clippy::cast_precision_loss)]
fn majority_identity(cells: &[&PatchCell], threshold: f32) -> Estimate<PieceKind> {
    let mut votes = [(0_usize, 0.0_f32); PieceKind::LEN];
    for cell in cells {
        if let Some(kind) = cell.identity.accepted(threshold) {
            let vote = &mut votes[kind as usize];
            vote.0 += 1;
            vote.1 += cell.identity.confidence;
        }
    }
    PieceKind::ALL
        .into_iter()
        .zip(votes)
        .filter(|(_, (count, _))| *count > 0)
        .max_by(|a, b| a.1.0.cmp(&b.1.0).then(a.1.1.total_cmp(&b.1.1)))
        .map_or_else(Estimate::none, |(kind, (_, total))| {
            Estimate::new(kind, total / cells.len().max(1) as f32)
        })
}
