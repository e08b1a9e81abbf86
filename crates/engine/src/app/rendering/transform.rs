use crate::scene::{CameraPose, GridPoint, GridSpace};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn center(self) -> (f32, f32) {
        (self.width as f32 * 0.5, self.height as f32 * 0.5)
    }
}

/// Half-open pixel rectangle: `left..right`, `top..bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl ScreenRect {
    pub fn from_corners(a: (i32, i32), b: (i32, i32)) -> Self {
        Self {
            left: a.0.min(b.0),
            top: a.1.min(b.1),
            right: a.0.max(b.0),
            bottom: a.1.max(b.1),
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Positive `by` shrinks, negative grows.
    pub fn inset(&self, by: i32) -> Self {
        Self {
            left: self.left.saturating_add(by),
            top: self.top.saturating_add(by),
            right: self.right.saturating_sub(by),
            bottom: self.bottom.saturating_sub(by),
        }
    }

    pub fn center(&self) -> (i32, i32) {
        (
            self.left + self.width() / 2,
            self.top + self.height() / 2,
        )
    }
}

pub fn world_to_screen_px(camera: &CameraPose, wx: f64, wy: f64) -> (i32, i32) {
    let (sx, sy) = camera.world_to_screen(wx, wy);
    (round_px(sx), round_px(sy))
}

fn round_px(value: f32) -> i32 {
    if value.is_finite() {
        value.round().clamp(i32::MIN as f32, i32::MAX as f32) as i32
    } else {
        0
    }
}

/// Screen footprint of a `span`×`span` block of cells anchored at `cell`.
pub fn cell_screen_rect(
    grid: &GridSpace,
    camera: &CameraPose,
    cell: GridPoint,
    span: u32,
) -> ScreenRect {
    let corner = grid.grid_to_world(cell);
    let extent = grid.cell_size() as f64 * span.max(1) as f64;
    let top_left = world_to_screen_px(camera, corner.x as f64, corner.y as f64);
    let bottom_right = world_to_screen_px(
        camera,
        corner.x as f64 + extent,
        corner.y as f64 + extent,
    );
    ScreenRect::from_corners(top_left, bottom_right)
}

/// Inclusive block of grid cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub min: GridPoint,
    pub max: GridPoint,
}

impl CellRange {
    pub fn iter(self) -> impl Iterator<Item = GridPoint> {
        (self.min.y..=self.max.y)
            .flat_map(move |y| (self.min.x..=self.max.x).map(move |x| GridPoint::new(x, y)))
    }
}

/// Cells of `grid` that can intersect the viewport, or `None` when the grid
/// is empty or entirely off screen.
pub fn visible_cells(
    grid: &GridSpace,
    camera: &CameraPose,
    viewport: Viewport,
) -> Option<CellRange> {
    if viewport.is_empty() || grid.cols() == 0 || grid.rows() == 0 {
        return None;
    }
    let (min_wx, min_wy) = camera.screen_to_world(0.0, 0.0);
    let (max_wx, max_wy) = camera.screen_to_world(viewport.width as f32, viewport.height as f32);
    let low = grid.world_px_to_grid(min_wx, min_wy);
    let high = grid.world_px_to_grid(max_wx, max_wy);

    let last_col = grid.cols().min(i32::MAX as u32) as i32 - 1;
    let last_row = grid.rows().min(i32::MAX as u32) as i32 - 1;
    let min = GridPoint::new(low.x.max(0), low.y.max(0));
    let max = GridPoint::new(high.x.min(last_col), high.y.min(last_row));
    if min.x > max.x || min.y > max.y {
        return None;
    }
    Some(CellRange { min, max })
}
