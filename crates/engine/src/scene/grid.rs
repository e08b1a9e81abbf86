use super::camera::{floor_world_px, CameraPose};

pub const DEFAULT_CELL_SIZE: u32 = 50;
pub const MIN_CALIBRATION_SPAN_PX: i32 = 10;

/// Discrete cell coordinate. May lie outside the grid bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GridPoint {
    pub x: i32,
    pub y: i32,
}

impl GridPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Diagonal steps count as one cell.
    pub fn chebyshev_distance(self, other: GridPoint) -> u32 {
        let dx = (self.x as i64 - other.x as i64).unsigned_abs();
        let dy = (self.y as i64 - other.y as i64).unsigned_abs();
        dx.max(dy).min(u32::MAX as u64) as u32
    }
}

/// Whole-pixel world coordinate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WorldPoint {
    pub x: i32,
    pub y: i32,
}

impl WorldPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Grid geometry: cell size, origin phase and the cell extent covering the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSpace {
    cell_size: u32,
    offset_x: u32,
    offset_y: u32,
    cols: u32,
    rows: u32,
}

impl Default for GridSpace {
    fn default() -> Self {
        Self {
            cell_size: DEFAULT_CELL_SIZE,
            offset_x: 0,
            offset_y: 0,
            cols: 0,
            rows: 0,
        }
    }
}

impl GridSpace {
    /// Offsets are reduced modulo `cell_size`. Returns `None` for a zero cell size.
    pub fn new(cell_size: u32, offset_x: i64, offset_y: i64, cols: u32, rows: u32) -> Option<Self> {
        if cell_size == 0 || cell_size > i32::MAX as u32 {
            return None;
        }
        let modulus = cell_size as i64;
        Some(Self {
            cell_size,
            offset_x: offset_x.rem_euclid(modulus) as u32,
            offset_y: offset_y.rem_euclid(modulus) as u32,
            cols,
            rows,
        })
    }

    /// Grid sized so that `cols * cell_size` exceeds the map extent even after
    /// the origin phase shifts the first column.
    pub fn covering(
        map_width: u32,
        map_height: u32,
        cell_size: u32,
        offset_x: i64,
        offset_y: i64,
    ) -> Option<Self> {
        let cell = cell_size.max(1);
        Self::new(
            cell_size,
            offset_x,
            offset_y,
            map_width / cell + 1,
            map_height / cell + 1,
        )
    }

    pub fn cell_size(&self) -> u32 {
        self.cell_size
    }

    pub fn offset(&self) -> (u32, u32) {
        (self.offset_x, self.offset_y)
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

    /// World pixel extent spanned by the current columns and rows.
    pub fn extent_px(&self) -> (u32, u32) {
        (
            self.cols.saturating_mul(self.cell_size),
            self.rows.saturating_mul(self.cell_size),
        )
    }

    pub fn with_dims(self, cols: u32, rows: u32) -> Self {
        Self { cols, rows, ..self }
    }

    pub fn contains(&self, point: GridPoint) -> bool {
        point.x >= 0 && point.y >= 0 && (point.x as u32) < self.cols && (point.y as u32) < self.rows
    }

    /// Top-left world pixel of a cell.
    pub fn grid_to_world(&self, point: GridPoint) -> WorldPoint {
        let cell = self.cell_size as i64;
        let wx = point.x as i64 * cell + self.offset_x as i64;
        let wy = point.y as i64 * cell + self.offset_y as i64;
        WorldPoint {
            x: saturate_i32(wx),
            y: saturate_i32(wy),
        }
    }

    pub fn cell_center_world(&self, point: GridPoint) -> (f64, f64) {
        let corner = self.grid_to_world(point);
        let half = self.cell_size as f64 / 2.0;
        (corner.x as f64 + half, corner.y as f64 + half)
    }

    pub fn world_to_grid(&self, world: WorldPoint) -> GridPoint {
        let cell = self.cell_size.max(1) as i64;
        GridPoint {
            x: saturate_i32((world.x as i64 - self.offset_x as i64).div_euclid(cell)),
            y: saturate_i32((world.y as i64 - self.offset_y as i64).div_euclid(cell)),
        }
    }

    pub fn world_px_to_grid(&self, wx: f64, wy: f64) -> GridPoint {
        self.world_to_grid(WorldPoint {
            x: floor_world_px(wx),
            y: floor_world_px(wy),
        })
    }

    pub fn screen_to_grid(&self, sx: f32, sy: f32, camera: &CameraPose) -> GridPoint {
        let (wx, wy) = camera.screen_to_world(sx, sy);
        self.world_px_to_grid(wx, wy)
    }

    /// Applies a calibration atomically, sizing the grid to cover `extent_px`.
    pub fn recalibrated(&self, calibration: Calibration, extent_px: (u32, u32)) -> Self {
        Self::covering(
            extent_px.0,
            extent_px.1,
            calibration.cell_size,
            calibration.offset_x as i64,
            calibration.offset_y as i64,
        )
        .unwrap_or(*self)
    }
}

fn saturate_i32(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Result of deriving cell size and origin phase from a dragged rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub cell_size: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

/// Returns `None` when the rectangle is under 10x10 px, a cell count is zero,
/// or the averaged estimate rounds to zero.
pub fn calibrate(
    corner_a: WorldPoint,
    corner_b: WorldPoint,
    cells_wide: u32,
    cells_tall: u32,
) -> Option<Calibration> {
    if cells_wide == 0 || cells_tall == 0 {
        return None;
    }
    let rect_w = (corner_b.x as i64 - corner_a.x as i64).abs();
    let rect_h = (corner_b.y as i64 - corner_a.y as i64).abs();
    if rect_w < MIN_CALIBRATION_SPAN_PX as i64 || rect_h < MIN_CALIBRATION_SPAN_PX as i64 {
        return None;
    }

    let estimate_w = rect_w as f64 / cells_wide as f64;
    let estimate_h = rect_h as f64 / cells_tall as f64;
    let cell_size = ((estimate_w + estimate_h) / 2.0).round();
    if cell_size < 1.0 || cell_size > i32::MAX as f64 {
        return None;
    }
    let cell_size = cell_size as u32;
    let modulus = cell_size as i64;
    let min_x = corner_a.x.min(corner_b.x) as i64;
    let min_y = corner_a.y.min(corner_b.y) as i64;
    Some(Calibration {
        cell_size,
        offset_x: min_x.rem_euclid(modulus) as u32,
        offset_y: min_y.rem_euclid(modulus) as u32,
    })
}
