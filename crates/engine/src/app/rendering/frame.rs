use crate::assets::AssetLibraries;
use crate::scene::{CameraPose, ConditionSet, Drawing, SceneState};

use crate::app::editing::{CalibrationSession, Measurement, ViewKind};

/// Operator-only decorations layered over the scene.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperatorOverlay {
    pub hud: Vec<String>,
    pub calibration: Option<CalibrationSession>,
    pub measurement: Option<Measurement>,
    /// Conditions of the token the wheel is open for.
    pub wheel: Option<ConditionSet>,
    pub pending_drawing: Option<Drawing>,
}

/// Everything one view needs to draw a frame. Read-only.
#[derive(Debug, Clone, Copy)]
pub struct ViewFrame<'a> {
    pub view: ViewKind,
    pub scene: &'a SceneState,
    pub assets: &'a AssetLibraries,
    pub camera: CameraPose,
    pub show_grid: bool,
    pub overlay: Option<&'a OperatorOverlay>,
}
