use super::grid::WorldPoint;
use super::token::CapacityExceeded;

pub const DRAWING_CAPACITY: usize = 256;
/// Drags shorter than this on both axes do not create a drawing.
pub const MIN_DRAG_PX: i32 = 5;
pub const COLOR_COUNT: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Rectangle,
    Circle,
}

impl Shape {
    pub fn from_wire(raw: u8) -> Self {
        if raw == 1 {
            Shape::Circle
        } else {
            Shape::Rectangle
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            Shape::Rectangle => 0,
            Shape::Circle => 1,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Shape::Rectangle => Shape::Circle,
            Shape::Circle => Shape::Rectangle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drawing {
    pub shape: Shape,
    pub start: WorldPoint,
    pub end: WorldPoint,
    color: u8,
}

impl Drawing {
    pub fn new(shape: Shape, start: WorldPoint, end: WorldPoint, color: u8) -> Self {
        Self {
            shape,
            start,
            end,
            color: color % COLOR_COUNT,
        }
    }

    /// Returns `None` when the drag is too short to be intentional.
    pub fn from_drag(shape: Shape, start: WorldPoint, end: WorldPoint, color: u8) -> Option<Self> {
        let dx = (end.x as i64 - start.x as i64).abs();
        let dy = (end.y as i64 - start.y as i64).abs();
        if dx <= MIN_DRAG_PX as i64 && dy <= MIN_DRAG_PX as i64 {
            return None;
        }
        Some(Self::new(shape, start, end, color))
    }

    pub fn color(&self) -> u8 {
        self.color
    }

    /// Inclusive `(min, max)` corners.
    pub fn bounds(&self) -> (WorldPoint, WorldPoint) {
        (
            WorldPoint::new(self.start.x.min(self.end.x), self.start.y.min(self.end.y)),
            WorldPoint::new(self.start.x.max(self.end.x), self.start.y.max(self.end.y)),
        )
    }

    /// Circle centre and radius, the radius being half the corner diagonal.
    pub fn circle(&self) -> ((f64, f64), f64) {
        let (sx, sy) = (self.start.x as f64, self.start.y as f64);
        let (ex, ey) = (self.end.x as f64, self.end.y as f64);
        let center = ((sx + ex) / 2.0, (sy + ey) / 2.0);
        let radius = ((ex - sx).powi(2) + (ey - sy).powi(2)).sqrt() / 2.0;
        (center, radius)
    }

    pub fn contains(&self, point: WorldPoint) -> bool {
        match self.shape {
            Shape::Rectangle => {
                let (min, max) = self.bounds();
                (min.x..=max.x).contains(&point.x) && (min.y..=max.y).contains(&point.y)
            }
            Shape::Circle => {
                let ((cx, cy), radius) = self.circle();
                let dx = point.x as f64 - cx;
                let dy = point.y as f64 - cy;
                dx * dx + dy * dy <= radius * radius
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DrawingRoster {
    drawings: Vec<Drawing>,
}

impl DrawingRoster {
    pub fn len(&self) -> usize {
        self.drawings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drawings.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.drawings.len() >= DRAWING_CAPACITY
    }

    pub fn push(&mut self, drawing: Drawing) -> Result<usize, CapacityExceeded> {
        if self.is_full() {
            return Err(CapacityExceeded {
                capacity: DRAWING_CAPACITY,
            });
        }
        self.drawings.push(drawing);
        Ok(self.drawings.len() - 1)
    }

    /// Removes the most recently added drawing under `point`.
    pub fn remove_topmost_at(&mut self, point: WorldPoint) -> Option<Drawing> {
        let index = self.drawings.iter().rposition(|d| d.contains(point))?;
        Some(self.drawings.remove(index))
    }

    pub fn clear(&mut self) {
        self.drawings.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Drawing> {
        self.drawings.iter()
    }
}

impl<'a> IntoIterator for &'a DrawingRoster {
    type Item = &'a Drawing;
    type IntoIter = std::slice::Iter<'a, Drawing>;

    fn into_iter(self) -> Self::IntoIter {
        self.drawings.iter()
    }
}
