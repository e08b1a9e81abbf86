mod camera;
mod drawing;
mod fog;
mod grid;
mod state;
mod token;

pub use camera::{CameraPose, SmoothedCamera, CAMERA_SMOOTHING, MAX_ZOOM, MIN_ZOOM};
pub use drawing::{Drawing, DrawingRoster, Shape, COLOR_COUNT, DRAWING_CAPACITY, MIN_DRAG_PX};
pub use fog::FogGrid;
pub use grid::{
    calibrate, Calibration, GridPoint, GridSpace, WorldPoint, DEFAULT_CELL_SIZE,
    MIN_CALIBRATION_SPAN_PX,
};
pub use state::SceneState;
pub use token::{
    CapacityExceeded, Condition, ConditionSet, Squad, Token, TokenRoster, HALF_OPAQUE,
    MAX_TOKEN_SIZE, MIN_TOKEN_SIZE, OPAQUE, SQUAD_COUNT, TOKEN_CAPACITY,
};
