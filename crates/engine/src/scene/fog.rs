use super::grid::{GridPoint, GridSpace};

/// Per-cell player visibility, row-major. `true` means visible to players.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FogGrid {
    cols: u32,
    rows: u32,
    cells: Vec<bool>,
}

impl FogGrid {
    /// Fully visible grid of the given size.
    pub fn new(cols: u32, rows: u32) -> Self {
        let len = cols as usize * rows as usize;
        Self {
            cols,
            rows,
            cells: vec![true; len],
        }
    }

    pub fn for_grid(grid: &GridSpace) -> Self {
        Self::new(grid.cols(), grid.rows())
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn dims(&self) -> (u32, u32) {
        (self.cols, self.rows)
    }

    pub fn matches(&self, grid: &GridSpace) -> bool {
        self.dims() == grid.dims()
    }

    /// Out-of-bounds cells read as not visible.
    pub fn get(&self, x: i32, y: i32) -> bool {
        self.index(x, y)
            .and_then(|index| self.cells.get(index).copied())
            .unwrap_or(false)
    }

    /// Out-of-bounds writes are ignored.
    pub fn set(&mut self, x: i32, y: i32, visible: bool) {
        if let Some(cell) = self.index(x, y).and_then(|index| self.cells.get_mut(index)) {
            *cell = visible;
        }
    }

    pub fn get_point(&self, point: GridPoint) -> bool {
        self.get(point.x, point.y)
    }

    pub fn set_point(&mut self, point: GridPoint, visible: bool) {
        self.set(point.x, point.y, visible);
    }

    pub fn fill(&mut self, visible: bool) {
        self.cells.fill(visible);
    }

    pub fn row(&self, y: u32) -> &[bool] {
        if y >= self.rows {
            return &[];
        }
        let start = y as usize * self.cols as usize;
        &self.cells[start..start + self.cols as usize]
    }

    pub fn rows_iter(&self) -> impl Iterator<Item = &[bool]> {
        // chunks_exact panics on zero, and a zero-column grid has no rows to yield.
        let width = (self.cols as usize).max(1);
        self.cells.chunks_exact(width)
    }

    /// Copies the overlapping prefix of a stored row; extra stored columns are dropped.
    pub fn restore_row(&mut self, y: u32, stored: &[bool]) {
        if y >= self.rows {
            return;
        }
        let width = self.cols as usize;
        let start = y as usize * width;
        let take = stored.len().min(width);
        self.cells[start..start + take].copy_from_slice(&stored[..take]);
    }

    pub fn hidden_count(&self) -> usize {
        self.cells.iter().filter(|visible| !**visible).count()
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x as u32 >= self.cols || y as u32 >= self.rows {
            return None;
        }
        Some(y as usize * self.cols as usize + x as usize)
    }
}
