use std::{cell::OnceCell, iter};

use tetrawatch_engine::Grid;

/// Lazily computed structural metrics of a grid.
///
/// Each metric is computed on first access and cached, so callers that need only a few
/// metrics do not pay for the rest.
#[derive(Debug)]
pub struct GridAnalysis<'a> {
    grid: &'a Grid,
    column_heights: OnceCell<Vec<usize>>,
    column_occupied_cells: OnceCell<Vec<usize>>,
    max_height: OnceCell<usize>,
    aggregate_height: OnceCell<usize>,
    num_holes: OnceCell<usize>,
    num_overhangs: OnceCell<usize>,
    surface_bumpiness: OnceCell<usize>,
}

impl<'a> GridAnalysis<'a> {
    #[must_use]
    pub fn new(grid: &'a Grid) -> Self {
        Self {
            grid,
            column_heights: OnceCell::new(),
            column_occupied_cells: OnceCell::new(),
            max_height: OnceCell::new(),
            aggregate_height: OnceCell::new(),
            num_holes: OnceCell::new(),
            num_overhangs: OnceCell::new(),
            surface_bumpiness: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn grid(&self) -> &Grid {
        self.grid
    }

    #[must_use]
    pub fn column_heights(&self) -> &[usize] {
        self.column_heights.get_or_init(|| {
            (0..self.grid.columns())
                .map(|x| self.grid.column_height(x))
                .collect()
        })
    }

    #[must_use]
    pub fn column_occupied_cells(&self) -> &[usize] {
        self.column_occupied_cells.get_or_init(|| {
            let mut counts = vec![0; self.grid.columns()];
            for row in self.grid.iter_rows() {
                for (count, block) in iter::zip(&mut counts, row) {
                    if block.is_occupied() {
                        *count += 1;
                    }
                }
            }
            counts
        })
    }

    #[must_use]
    pub fn max_height(&self) -> usize {
        *self
            .max_height
            .get_or_init(|| self.column_heights().iter().copied().max().unwrap_or(0))
    }

    /// Sum of all column heights.
    #[must_use]
    pub fn aggregate_height(&self) -> usize {
        *self
            .aggregate_height
            .get_or_init(|| self.column_heights().iter().sum())
    }

    /// Empty cells with at least one occupied cell above them in the same column.
    #[must_use]
    pub fn num_holes(&self) -> usize {
        *self.num_holes.get_or_init(|| {
            iter::zip(self.column_heights(), self.column_occupied_cells())
                .map(|(h, occ)| h - occ)
                .sum()
        })
    }

    /// Occupied cells sitting directly on top of an empty cell.
    #[must_use]
    pub fn num_overhangs(&self) -> usize {
        *self.num_overhangs.get_or_init(|| {
            let rows = self.grid.iter_rows().collect::<Vec<_>>();
            rows.windows(2)
                .map(|pair| {
                    iter::zip(pair[0], pair[1])
                        .filter(|(upper, lower)| upper.is_occupied() && lower.is_empty())
                        .count()
                })
                .sum()
        })
    }

    /// Sum of absolute height differences between adjacent columns.
    #[must_use]
    pub fn surface_bumpiness(&self) -> usize {
        *self.surface_bumpiness.get_or_init(|| {
            self.column_heights()
                .windows(2)
                .map(|w| w[0].abs_diff(w[1]))
                .sum()
        })
    }

    /// Number of completely filled rows still present in the grid.
    #[must_use]
    pub fn completed_lines(&self) -> usize {
        self.grid.full_rows()
    }
}
