use crate::assets::AssetHandle;

use super::camera::CameraPose;
use super::drawing::DrawingRoster;
use super::fog::FogGrid;
use super::grid::GridSpace;
use super::token::TokenRoster;

/// The unit written and read by a save slot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SceneState {
    /// `None` until a map is chosen, or when a load could not resolve one.
    pub map: Option<AssetHandle>,
    pub grid: GridSpace,
    pub fog: FogGrid,
    pub tokens: TokenRoster,
    pub drawings: DrawingRoster,
    /// Operator camera target at save time.
    pub camera: CameraPose,
}

impl SceneState {
    /// Replaces the grid and reinitializes fog to fully visible at the new dims.
    pub fn set_grid(&mut self, grid: GridSpace) {
        self.grid = grid;
        self.fog = FogGrid::for_grid(&grid);
    }

    pub fn fog_in_sync(&self) -> bool {
        self.fog.matches(&self.grid)
    }

    /// Same scene with transient selection flags cleared.
    pub fn without_transients(&self) -> Self {
        let mut copy = self.clone();
        copy.tokens.clear_selection();
        copy
    }
}
