mod controller;
mod editing;
mod input;
mod loop_runner;
mod metrics;
mod rendering;

pub use controller::SceneController;
pub use editing::{
    wheel_condition_at, CalibrationSession, DamageEntry, Measurement, Tool, ViewKind,
    DAMAGE_ENTRY_MAX_DIGITS, WHEEL_INNER_RADIUS_PX, WHEEL_OUTER_RADIUS_PX,
};
pub use input::{Key, Modifiers, PointerButton};
pub use loop_runner::{
    run_app, run_app_with_metrics, AppError, LoopConfig, WindowConfig, SAVE_FORMAT_ENV_VAR,
};
pub use metrics::{FrameMetrics, MetricsHandle};
pub use rendering::{
    cell_screen_rect, compose, visible_cells, world_to_screen_px, FrameBuffer, OperatorOverlay,
    Renderer, ScreenRect, ViewFrame, Viewport,
};
