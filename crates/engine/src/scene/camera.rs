/// Smoothing factor applied per frame when the live pose chases its target.
pub const CAMERA_SMOOTHING: f32 = 0.15;
pub const MIN_ZOOM: f32 = 0.25;
pub const MAX_ZOOM: f32 = 4.0;

/// Sub-pixel jitter introduced by f32 round trips is snapped to the nearest
/// pixel edge before flooring.
const WORLD_SNAP_EPSILON: f64 = 1e-3;

/// A camera position in world pixels (top-left of the viewport) plus zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub x: f32,
    pub y: f32,
    pub zoom: f32,
}

impl Default for CameraPose {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

impl CameraPose {
    pub fn effective_zoom(&self) -> f32 {
        if self.zoom.is_finite() && self.zoom > 0.0 {
            self.zoom
        } else {
            1.0
        }
    }

    pub fn screen_to_world(&self, sx: f32, sy: f32) -> (f64, f64) {
        let zoom = self.effective_zoom() as f64;
        (
            sx as f64 / zoom + self.x as f64,
            sy as f64 / zoom + self.y as f64,
        )
    }

    /// Floors a screen position to whole world pixels toward negative infinity.
    pub fn screen_to_world_px(&self, sx: f32, sy: f32) -> (i32, i32) {
        let (wx, wy) = self.screen_to_world(sx, sy);
        (floor_world_px(wx), floor_world_px(wy))
    }

    pub fn world_to_screen(&self, wx: f64, wy: f64) -> (f32, f32) {
        let zoom = self.effective_zoom() as f64;
        (
            ((wx - self.x as f64) * zoom) as f32,
            ((wy - self.y as f64) * zoom) as f32,
        )
    }

    /// Rejects non-finite components so corrupt input cannot poison later math.
    pub fn sanitized(self) -> Self {
        let zoom = if self.zoom.is_finite() {
            self.zoom.clamp(MIN_ZOOM, MAX_ZOOM)
        } else {
            1.0
        };
        Self {
            x: if self.x.is_finite() { self.x } else { 0.0 },
            y: if self.y.is_finite() { self.y } else { 0.0 },
            zoom,
        }
    }
}

pub(crate) fn floor_world_px(value: f64) -> i32 {
    let floored = (value + WORLD_SNAP_EPSILON).floor();
    floored.clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

/// Live camera for one view: the rendered pose eases toward the target pose.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SmoothedCamera {
    pub current: CameraPose,
    pub target: CameraPose,
}

impl SmoothedCamera {
    pub fn snapped_to(pose: CameraPose) -> Self {
        Self {
            current: pose,
            target: pose,
        }
    }

    pub fn update(&mut self) {
        self.current.x += (self.target.x - self.current.x) * CAMERA_SMOOTHING;
        self.current.y += (self.target.y - self.current.y) * CAMERA_SMOOTHING;
        self.current.zoom += (self.target.zoom - self.current.zoom) * CAMERA_SMOOTHING;
    }

    /// Zooms the target pose while keeping the world point under the cursor fixed.
    pub fn zoom_about(&mut self, sx: f32, sy: f32, factor: f32) {
        let old_zoom = self.target.effective_zoom();
        let new_zoom = (old_zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        let wx = sx / old_zoom + self.target.x;
        let wy = sy / old_zoom + self.target.y;
        self.target.zoom = new_zoom;
        self.target.x = wx - sx / new_zoom;
        self.target.y = wy - sy / new_zoom;
    }

    pub fn pan_by_screen_delta(&mut self, dx: f32, dy: f32) {
        let zoom = self.current.effective_zoom();
        self.target.x -= dx / zoom;
        self.target.y -= dy / zoom;
    }
}
