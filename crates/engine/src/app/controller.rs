use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::assets::{is_supported_image, path_label, AssetLibraries};
use crate::persist::{SaveSlot, SlotOutcome, SlotStore};
use crate::scene::{
    Condition, Drawing, FogGrid, GridPoint, GridSpace, SceneState, Shape, SmoothedCamera, Squad,
    Token, WorldPoint,
};

use super::editing::{
    wheel_condition_at, CalibrationSession, DamageEntry, Measurement, Tool, ViewKind,
};
use super::input::{Key, Modifiers, PointerButton};
use super::rendering::OperatorOverlay;

const SCROLL_ZOOM_IN: f32 = 1.1;
const SCROLL_ZOOM_OUT: f32 = 0.9;

/// Pointer interaction in progress on the operator view.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Gesture {
    Idle,
    DragToken { index: usize },
    PaintFog { visible: bool },
    DrawShape { start: WorldPoint, end: WorldPoint },
    Pan { last: (f32, f32) },
}

/// Single owner of the live scene, its asset libraries and the editing
/// state. Every edit goes through here so the scene invariants hold between
/// calls.
#[derive(Debug)]
pub struct SceneController {
    scene: SceneState,
    assets: AssetLibraries,
    slots: SlotStore,
    maps: Vec<PathBuf>,
    map_index: Option<usize>,
    cameras: [SmoothedCamera; 2],
    operator_viewport: (u32, u32),
    cursor: Option<(f32, f32)>,
    tool: Tool,
    squad: Squad,
    shape: Shape,
    show_grid: bool,
    sync_views: bool,
    gesture: Gesture,
    calibration: Option<CalibrationSession>,
    damage_entry: Option<DamageEntry>,
    wheel_token: Option<usize>,
    measure_from: Option<GridPoint>,
    status: Option<String>,
}

impl SceneController {
    pub fn new(slots: SlotStore, maps: Vec<PathBuf>) -> Self {
        Self {
            scene: SceneState::default(),
            assets: AssetLibraries::default(),
            slots,
            maps,
            map_index: None,
            cameras: [SmoothedCamera::default(); 2],
            operator_viewport: (0, 0),
            cursor: None,
            tool: Tool::default(),
            squad: Squad::default(),
            shape: Shape::Rectangle,
            show_grid: true,
            sync_views: true,
            gesture: Gesture::Idle,
            calibration: None,
            damage_entry: None,
            wheel_token: None,
            measure_from: None,
            status: None,
        }
    }

    pub fn scene(&self) -> &SceneState {
        &self.scene
    }

    pub fn assets(&self) -> &AssetLibraries {
        &self.assets
    }

    pub fn slots(&self) -> &SlotStore {
        &self.slots
    }

    pub fn maps(&self) -> &[PathBuf] {
        &self.maps
    }

    pub fn map_index(&self) -> Option<usize> {
        self.map_index
    }

    pub fn camera(&self, view: ViewKind) -> &SmoothedCamera {
        &self.cameras[view.index()]
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn current_squad(&self) -> Squad {
        self.squad
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn show_grid(&self) -> bool {
        self.show_grid
    }

    pub fn sync_views(&self) -> bool {
        self.sync_views
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn calibration(&self) -> Option<&CalibrationSession> {
        self.calibration.as_ref()
    }

    pub fn damage_entry(&self) -> Option<&DamageEntry> {
        self.damage_entry.as_ref()
    }

    pub fn wheel_token(&self) -> Option<usize> {
        self.wheel_token
    }

    /// Consistent copy of the scene for saving, carrying the operator
    /// camera's target pose.
    pub fn snapshot(&self) -> SceneState {
        let mut snapshot = self.scene.clone();
        snapshot.camera = self.cameras[ViewKind::Operator.index()].target;
        snapshot
    }

    /// Swaps in a complete scene. Interaction state that referred to the old
    /// scene is dropped and the operator camera snaps to the stored pose.
    pub fn replace(&mut self, mut state: SceneState) {
        if !state.fog_in_sync() {
            state.fog = FogGrid::for_grid(&state.grid);
        }
        state.tokens.clear_selection();
        self.cameras[ViewKind::Operator.index()] = SmoothedCamera::snapped_to(state.camera);
        self.map_index = state.map.and_then(|handle| {
            let label = self.assets.maps.label(handle)?;
            self.maps.iter().position(|path| path_label(path) == label)
        });
        self.scene = state;
        self.reset_interaction();
    }

    fn reset_interaction(&mut self) {
        self.gesture = Gesture::Idle;
        self.calibration = None;
        self.damage_entry = None;
        self.wheel_token = None;
        self.measure_from = None;
    }

    pub fn save_slot(&mut self, slot: SaveSlot) -> SlotOutcome {
        let snapshot = self.snapshot();
        let outcome = self.slots.save(slot, &snapshot, &self.assets);
        if outcome.is_committed() {
            self.scene.camera = snapshot.camera;
        }
        self.status = Some(format!("save {}", outcome.summary()));
        outcome
    }

    /// Loads into a scratch copy and commits through [`Self::replace`] only
    /// when the slot was accepted.
    pub fn load_slot(&mut self, slot: SaveSlot) -> SlotOutcome {
        let mut incoming = self.scene.clone();
        let outcome = self.slots.load(slot, &mut incoming, &mut self.assets);
        if outcome.is_committed() {
            self.replace(incoming);
        }
        self.status = Some(format!("load {}", outcome.summary()));
        outcome
    }

    pub fn set_operator_viewport(&mut self, width: u32, height: u32) {
        self.operator_viewport = (width, height);
    }

    pub fn update_cameras(&mut self) {
        let operator = ViewKind::Operator.index();
        let player = ViewKind::Player.index();
        self.cameras[operator].update();
        if self.sync_views {
            self.cameras[player].target = self.cameras[operator].target;
        }
        self.cameras[player].update();
    }

    fn cell_under(&self, sx: f32, sy: f32) -> GridPoint {
        let pose = self.cameras[ViewKind::Operator.index()].current;
        self.scene.grid.screen_to_grid(sx, sy, &pose)
    }

    fn world_under(&self, sx: f32, sy: f32) -> WorldPoint {
        let pose = self.cameras[ViewKind::Operator.index()].current;
        let (x, y) = pose.screen_to_world_px(sx, sy);
        WorldPoint::new(x, y)
    }

    fn map_extent(&self) -> Option<(u32, u32)> {
        self.scene
            .map
            .and_then(|handle| self.assets.maps.dimensions(handle))
    }

    // Tokens

    /// Adds a token for the image at `path`, or `None` when the roster is
    /// full or the image cannot be decoded.
    pub fn place_token(&mut self, path: &Path, cell: GridPoint) -> Option<usize> {
        if self.scene.tokens.is_full() {
            warn!(path = %path.display(), "token_roster_full");
            return None;
        }
        let image = match self.assets.tokens.resolve(path) {
            Ok(handle) => handle,
            Err(error) => {
                warn!(path = %path.display(), error = %error, "token_image_rejected");
                return None;
            }
        };
        let index = self.scene.tokens.push(Token::new(cell, image)).ok()?;
        info!(index, x = cell.x, y = cell.y, "token_placed");
        Some(index)
    }

    /// Selects the topmost token at `cell`. Without `additive` the previous
    /// selection is cleared first; a miss clears everything.
    pub fn select_at(&mut self, cell: GridPoint, additive: bool) -> Option<usize> {
        let hit = self.scene.tokens.topmost_at(cell);
        if hit.is_none() || !additive {
            self.scene.tokens.clear_selection();
        }
        let index = hit?;
        if let Some(token) = self.scene.tokens.get_mut(index) {
            token.selected = true;
        }
        Some(index)
    }

    /// Copies the topmost token at `cell` and selects only the copy.
    pub fn duplicate_at(&mut self, cell: GridPoint) -> Option<usize> {
        let source = self.scene.tokens.topmost_at(cell)?;
        let mut copy = self.scene.tokens.get(source)?.clone();
        copy.cell = cell;
        copy.selected = true;
        if self.scene.tokens.is_full() {
            return None;
        }
        self.scene.tokens.clear_selection();
        self.scene.tokens.push(copy).ok()
    }

    pub fn move_token(&mut self, index: usize, cell: GridPoint) {
        if let Some(token) = self.scene.tokens.get_mut(index) {
            token.cell = cell;
        }
    }

    /// Removes the first selected token only.
    pub fn delete_selected(&mut self) -> Option<Token> {
        let index = self.scene.tokens.selected_indices().into_iter().next()?;
        let removed = self.scene.tokens.remove(index)?;
        self.wheel_token = None;
        self.gesture = Gesture::Idle;
        info!(index, "token_deleted");
        Some(removed)
    }

    pub fn resize_selected(&mut self, delta: i32) {
        self.for_each_selected(|token| token.grow(delta));
    }

    /// Positive amounts damage, negative amounts heal.
    pub fn damage_selected(&mut self, amount: i32) {
        self.for_each_selected(|token| token.apply_damage(amount));
    }

    pub fn toggle_hidden_selected(&mut self) {
        self.for_each_selected(|token| token.hidden = !token.hidden);
    }

    pub fn toggle_half_opacity_selected(&mut self) {
        self.for_each_selected(Token::toggle_half_opacity);
    }

    pub fn reset_opacity(&mut self) {
        for token in self.scene.tokens.iter_mut() {
            token.opacity = crate::scene::OPAQUE;
        }
    }

    fn for_each_selected(&mut self, mut edit: impl FnMut(&mut Token)) {
        for token in self.scene.tokens.iter_mut().filter(|token| token.selected) {
            edit(token);
        }
    }

    /// Every token covering `cell` joins the current squad, or leaves it if
    /// it was already a member.
    pub fn toggle_squad_at(&mut self, cell: GridPoint) {
        let squad = self.squad;
        for token in self
            .scene
            .tokens
            .iter_mut()
            .filter(|token| token.occupies(cell))
        {
            token.squad = if token.squad == Some(squad) {
                None
            } else {
                Some(squad)
            };
        }
    }

    pub fn toggle_condition(&mut self, index: usize, condition: Condition) {
        if let Some(token) = self.scene.tokens.get_mut(index) {
            token.conditions.toggle(condition);
        }
    }

    pub fn open_condition_wheel(&mut self) -> bool {
        self.wheel_token = self.scene.tokens.selected_indices().into_iter().next();
        self.wheel_token.is_some()
    }

    pub fn begin_damage_entry(&mut self) -> bool {
        if !self.scene.tokens.any_selected() {
            return false;
        }
        self.damage_entry = Some(DamageEntry::default());
        true
    }

    // Fog, drawings, measurement

    pub fn paint_fog(&mut self, cell: GridPoint, visible: bool) {
        self.scene.fog.set_point(cell, visible);
    }

    pub fn add_drawing(&mut self, start: WorldPoint, end: WorldPoint) -> bool {
        let Some(drawing) = Drawing::from_drag(self.shape, start, end, self.squad.index()) else {
            return false;
        };
        match self.scene.drawings.push(drawing) {
            Ok(_) => true,
            Err(error) => {
                debug!(error = %error, "drawing_dropped");
                false
            }
        }
    }

    pub fn remove_drawing_at(&mut self, point: WorldPoint) -> bool {
        self.scene.drawings.remove_topmost_at(point).is_some()
    }

    pub fn clear_drawings(&mut self) {
        self.scene.drawings.clear();
    }

    pub fn measurement(&self) -> Option<Measurement> {
        let from = self.measure_from?;
        let to = self
            .cursor
            .map(|(sx, sy)| self.cell_under(sx, sy))
            .unwrap_or(from);
        Some(Measurement { from, to })
    }

    // Grid and maps

    pub fn begin_calibration(&mut self) {
        self.gesture = Gesture::Idle;
        self.calibration = Some(CalibrationSession::default());
    }

    /// Ends the calibration session, applying it when the dragged rectangle
    /// is usable. The grid and fog change together or not at all.
    pub fn apply_calibration(&mut self) -> bool {
        let Some(session) = self.calibration.take() else {
            return false;
        };
        let Some(calibration) = session.calibration() else {
            info!(
                width = (session.end.x as i64 - session.start.x as i64).abs(),
                height = (session.end.y as i64 - session.start.y as i64).abs(),
                "calibration_rejected"
            );
            self.status = Some("calibration rejected".to_string());
            return false;
        };
        let extent = self
            .map_extent()
            .unwrap_or_else(|| self.scene.grid.extent_px());
        let grid = self.scene.grid.recalibrated(calibration, extent);
        self.scene.set_grid(grid);
        info!(
            cell_size = grid.cell_size(),
            offset_x = grid.offset().0,
            offset_y = grid.offset().1,
            cols = grid.cols(),
            rows = grid.rows(),
            "grid_calibrated"
        );
        self.status = Some(format!("grid {}px", grid.cell_size()));
        true
    }

    /// Shows map `index`, rebuilding the grid to cover it with fog cleared.
    /// The current map stays when the image cannot be loaded.
    pub fn show_map(&mut self, index: usize) -> bool {
        let Some(path) = self.maps.get(index).cloned() else {
            return false;
        };
        let loaded = self.assets.maps.resolve(&path).and_then(|handle| {
            self.assets.maps.ensure_loaded(handle)?;
            Ok(handle)
        });
        let handle = match loaded {
            Ok(handle) => handle,
            Err(error) => {
                warn!(path = %path.display(), error = %error, "map_switch_failed");
                self.status = Some(format!("map failed: {}", path_label(&path)));
                return false;
            }
        };
        let (width, height) = self.assets.maps.dimensions(handle).unwrap_or((0, 0));
        let (offset_x, offset_y) = self.scene.grid.offset();
        let grid = GridSpace::covering(
            width,
            height,
            self.scene.grid.cell_size(),
            offset_x as i64,
            offset_y as i64,
        )
        .unwrap_or_default();

        if let Some(previous) = self.scene.map.filter(|previous| *previous != handle) {
            self.assets.maps.evict(previous);
        }
        self.scene.map = Some(handle);
        self.scene.set_grid(grid);
        self.map_index = Some(index);
        info!(
            index,
            path = %path.display(),
            cols = grid.cols(),
            rows = grid.rows(),
            "map_switched"
        );
        self.status = Some(path_label(&path));
        true
    }

    pub fn cycle_map(&mut self, step: i32) -> bool {
        let count = self.maps.len();
        if count == 0 {
            self.status = Some("no maps".to_string());
            return false;
        }
        let next = match self.map_index {
            Some(current) => (current as i64 + step as i64).rem_euclid(count as i64) as usize,
            None if step < 0 => count - 1,
            None => 0,
        };
        self.show_map(next)
    }

    // Tools and toggles

    /// Ignored while any token is selected.
    pub fn set_tool(&mut self, tool: Tool) -> bool {
        if self.scene.tokens.any_selected() {
            debug!(tool = tool.label(), "tool_switch_blocked");
            return false;
        }
        self.tool = tool;
        self.gesture = Gesture::Idle;
        true
    }

    pub fn cycle_squad(&mut self, step: i32) {
        if matches!(self.tool, Tool::Squad | Tool::Draw) {
            self.squad = self.squad.cycled(step);
        }
    }

    pub fn toggle_shape(&mut self) {
        if self.tool == Tool::Draw {
            self.shape = self.shape.toggled();
        }
    }

    pub fn toggle_grid(&mut self) {
        self.show_grid = !self.show_grid;
    }

    pub fn toggle_sync_views(&mut self) {
        self.sync_views = !self.sync_views;
        info!(sync_views = self.sync_views, "view_sync_toggled");
    }

    // Event entry points

    pub fn handle_key(&mut self, key: Key, mods: Modifiers) {
        if self.damage_entry.is_some() {
            self.handle_damage_entry_key(key, mods);
            return;
        }
        if self.calibration.is_some() {
            self.handle_calibration_key(key);
            return;
        }
        match key {
            Key::Escape => self.escape(),
            Key::Digit(digit) => self.handle_digit(digit, mods),
            Key::Function(number) => {
                if let Some(slot) = SaveSlot::new(number) {
                    if mods.shift {
                        self.save_slot(slot);
                    } else {
                        self.load_slot(slot);
                    }
                }
            }
            Key::Letter('q') => self.cycle_squad(-1),
            Key::Letter('e') => self.cycle_squad(1),
            Key::Letter('w') => self.toggle_shape(),
            Key::Letter('x') if self.tool == Tool::Draw => self.clear_drawings(),
            Key::Letter('c') => self.begin_calibration(),
            Key::Letter('h') => self.toggle_hidden_selected(),
            Key::Letter('d') if mods.shift => self.reset_opacity(),
            Key::Letter('d') => self.toggle_half_opacity_selected(),
            Key::Letter('a') => {
                self.open_condition_wheel();
            }
            Key::Letter('m') => {
                self.cycle_map(if mods.shift { -1 } else { 1 });
            }
            Key::Letter('p') => self.toggle_sync_views(),
            Key::Letter('g') => self.toggle_grid(),
            Key::Enter => {
                self.begin_damage_entry();
            }
            Key::Delete | Key::Backspace => {
                self.delete_selected();
            }
            Key::Plus => self.resize_selected(1),
            Key::Minus => self.resize_selected(-1),
            Key::Letter(_) | Key::Up | Key::Down | Key::Left | Key::Right => {}
        }
    }

    fn escape(&mut self) {
        if self.wheel_token.take().is_some() {
            return;
        }
        if self.measure_from.take().is_some() {
            return;
        }
        self.scene.tokens.clear_selection();
    }

    /// With a selection digits damage (0 means 10, shift heals); without one
    /// 1..=4 pick a tool.
    fn handle_digit(&mut self, digit: u8, mods: Modifiers) {
        if self.scene.tokens.any_selected() {
            let amount = if digit == 0 { 10 } else { digit as i32 };
            self.damage_selected(if mods.shift { -amount } else { amount });
        } else if self.wheel_token.is_none() {
            if let Some(tool) = Tool::from_digit(digit) {
                self.set_tool(tool);
            }
        }
    }

    fn handle_damage_entry_key(&mut self, key: Key, mods: Modifiers) {
        match key {
            Key::Enter => {
                let amount = self
                    .damage_entry
                    .take()
                    .map(|entry| entry.value())
                    .unwrap_or(0);
                self.damage_selected(if mods.shift { -amount } else { amount });
            }
            Key::Escape => self.damage_entry = None,
            Key::Backspace => {
                if let Some(entry) = self.damage_entry.as_mut() {
                    entry.pop_digit();
                }
            }
            Key::Digit(digit) => {
                if let Some(entry) = self.damage_entry.as_mut() {
                    entry.push_digit(digit);
                }
            }
            _ => {}
        }
    }

    fn handle_calibration_key(&mut self, key: Key) {
        match key {
            Key::Enter => {
                self.apply_calibration();
            }
            Key::Escape => self.calibration = None,
            other => {
                if let Some(session) = self.calibration.as_mut() {
                    session.adjust_cells(other);
                }
            }
        }
    }

    pub fn pointer_pressed(&mut self, button: PointerButton, sx: f32, sy: f32, mods: Modifiers) {
        self.cursor = Some((sx, sy));
        match button {
            PointerButton::Primary => self.primary_pressed(sx, sy, mods),
            PointerButton::Secondary => {
                if self.gesture == Gesture::Idle {
                    self.gesture = Gesture::Pan { last: (sx, sy) };
                }
            }
            PointerButton::Middle => {
                if self.tool == Tool::Draw {
                    let point = self.world_under(sx, sy);
                    self.remove_drawing_at(point);
                }
            }
        }
    }

    fn primary_pressed(&mut self, sx: f32, sy: f32, mods: Modifiers) {
        let cell = self.cell_under(sx, sy);
        if mods.alt {
            self.measure_from = match self.measure_from {
                Some(_) => None,
                None => Some(cell),
            };
            return;
        }
        if self.measure_from.take().is_some() {
            return;
        }
        if self.calibration.is_some() {
            let point = self.world_under(sx, sy);
            if let Some(session) = self.calibration.as_mut() {
                session.begin_drag(point);
            }
            return;
        }
        if let Some(index) = self.wheel_token {
            let (width, height) = self.operator_viewport;
            let dx = sx - width as f32 / 2.0;
            let dy = sy - height as f32 / 2.0;
            if let Some(condition) = wheel_condition_at(dx, dy) {
                self.toggle_condition(index, condition);
            }
            return;
        }

        match self.tool {
            Tool::Select => {
                let duplicated = if mods.additive() {
                    self.duplicate_at(cell)
                } else {
                    None
                };
                let dragged = duplicated.or_else(|| self.select_at(cell, mods.additive()));
                if let Some(index) = dragged {
                    self.gesture = Gesture::DragToken { index };
                }
            }
            Tool::Fog => {
                let visible = !self.scene.fog.get_point(cell);
                self.paint_fog(cell, visible);
                self.gesture = Gesture::PaintFog { visible };
            }
            Tool::Squad => self.toggle_squad_at(cell),
            Tool::Draw => {
                let start = self.world_under(sx, sy);
                self.gesture = Gesture::DrawShape { start, end: start };
            }
        }
    }

    pub fn pointer_moved(&mut self, sx: f32, sy: f32) {
        self.cursor = Some((sx, sy));
        if let Some(session) = self.calibration.as_mut().filter(|session| session.dragging) {
            let pose = self.cameras[ViewKind::Operator.index()].current;
            let (x, y) = pose.screen_to_world_px(sx, sy);
            session.end = WorldPoint::new(x, y);
            return;
        }
        match self.gesture {
            Gesture::Idle => {}
            Gesture::DragToken { index } => {
                let cell = self.cell_under(sx, sy);
                self.move_token(index, cell);
            }
            Gesture::PaintFog { visible } => {
                let cell = self.cell_under(sx, sy);
                self.paint_fog(cell, visible);
            }
            Gesture::DrawShape { start, .. } => {
                let end = self.world_under(sx, sy);
                self.gesture = Gesture::DrawShape { start, end };
            }
            Gesture::Pan { last } => {
                self.cameras[ViewKind::Operator.index()]
                    .pan_by_screen_delta(sx - last.0, sy - last.1);
                self.gesture = Gesture::Pan { last: (sx, sy) };
            }
        }
    }

    pub fn pointer_released(&mut self, button: PointerButton, sx: f32, sy: f32) {
        self.cursor = Some((sx, sy));
        match button {
            PointerButton::Primary => {
                if let Some(session) = self.calibration.as_mut() {
                    session.dragging = false;
                    return;
                }
                if let Gesture::DrawShape { start, .. } = self.gesture {
                    let end = self.world_under(sx, sy);
                    self.add_drawing(start, end);
                }
                if !matches!(self.gesture, Gesture::Pan { .. }) {
                    self.gesture = Gesture::Idle;
                }
            }
            PointerButton::Secondary => {
                if matches!(self.gesture, Gesture::Pan { .. }) {
                    self.gesture = Gesture::Idle;
                }
            }
            PointerButton::Middle => {}
        }
    }

    pub fn pointer_left(&mut self) {
        self.cursor = None;
    }

    pub fn scroll(&mut self, sx: f32, sy: f32, steps: i32) {
        let factor = if steps > 0 {
            SCROLL_ZOOM_IN
        } else {
            SCROLL_ZOOM_OUT
        };
        let camera = &mut self.cameras[ViewKind::Operator.index()];
        for _ in 0..steps.unsigned_abs() {
            camera.zoom_about(sx, sy, factor);
        }
    }

    /// A file dropped on the operator window becomes a token under the cursor.
    pub fn file_dropped(&mut self, path: &Path) -> Option<usize> {
        if !is_supported_image(path) {
            debug!(path = %path.display(), "dropped_file_ignored");
            return None;
        }
        let cell = self
            .cursor
            .map(|(sx, sy)| self.cell_under(sx, sy))
            .unwrap_or_default();
        self.place_token(path, cell)
    }

    /// Decorations for the operator view of the current frame.
    pub fn operator_overlay(&self) -> OperatorOverlay {
        let mut hud = vec![format!(
            "{}  SQUAD {}  {}",
            self.tool.label(),
            self.squad.index() + 1,
            match self.shape {
                Shape::Rectangle => "RECT",
                Shape::Circle => "CIRCLE",
            }
        )];
        hud.push(format!(
            "TOKENS {}  SYNC {}  GRID {}",
            self.scene.tokens.len(),
            on_off(self.sync_views),
            on_off(self.show_grid)
        ));
        if let Some(session) = &self.calibration {
            hud.push(format!(
                "CALIBRATE {}x{}  ENTER APPLY",
                session.cells_wide, session.cells_tall
            ));
        }
        if let Some(entry) = &self.damage_entry {
            hud.push(format!("DAMAGE {}_", entry.as_str()));
        }
        if let Some(status) = &self.status {
            hud.push(status.clone());
        }

        let pending_drawing = match self.gesture {
            Gesture::DrawShape { start, end } => Some(Drawing::new(
                self.shape,
                start,
                end,
                self.squad.index(),
            )),
            _ => None,
        };
        OperatorOverlay {
            hud,
            calibration: self.calibration,
            measurement: self.measurement(),
            wheel: self
                .wheel_token
                .and_then(|index| self.scene.tokens.get(index))
                .map(|token| token.conditions),
            pending_drawing,
        }
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "ON"
    } else {
        "OFF"
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    use super::*;
    use crate::persist::SaveFormat;
    use crate::scene::{HALF_OPAQUE, OPAQUE};

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        RgbaImage::from_pixel(width, height, Rgba([90, 140, 200, 255]))
            .save(&path)
            .expect("save png");
        path
    }

    fn controller(temp: &TempDir) -> SceneController {
        let saves = temp.path().join("saves");
        let mut controller =
            SceneController::new(SlotStore::new(saves, SaveFormat::Embedded), Vec::new());
        controller.set_operator_viewport(800, 600);
        controller
            .scene
            .set_grid(GridSpace::new(50, 0, 0, 10, 10).expect("grid"));
        controller
    }

    fn slot(number: u8) -> SaveSlot {
        SaveSlot::new(number).expect("slot")
    }

    fn click(controller: &mut SceneController, cell: GridPoint, mods: Modifiers) {
        let (sx, sy) = (cell.x as f32 * 50.0 + 25.0, cell.y as f32 * 50.0 + 25.0);
        controller.pointer_pressed(PointerButton::Primary, sx, sy, mods);
        controller.pointer_released(PointerButton::Primary, sx, sy);
    }

    #[test]
    fn dropped_image_becomes_token_under_cursor() {
        let temp = TempDir::new().expect("temp");
        let art = write_png(temp.path(), "goblin.png", 8, 8);
        let mut controller = controller(&temp);
        controller.pointer_moved(130.0, 60.0);

        let index = controller.file_dropped(&art).expect("token");
        let token = controller.scene().tokens.get(index).expect("token");
        assert_eq!(token.cell, GridPoint::new(2, 1));
        assert_eq!(token.opacity, OPAQUE);
        assert_eq!(token.squad, None);

        assert!(controller.file_dropped(&temp.path().join("notes.txt")).is_none());
    }

    #[test]
    fn click_selects_and_drag_moves_token() {
        let temp = TempDir::new().expect("temp");
        let art = write_png(temp.path(), "knight.png", 8, 8);
        let mut controller = controller(&temp);
        controller
            .place_token(&art, GridPoint::new(1, 1))
            .expect("place");

        controller.pointer_pressed(PointerButton::Primary, 75.0, 75.0, Modifiers::NONE);
        controller.pointer_moved(175.0, 225.0);
        controller.pointer_released(PointerButton::Primary, 175.0, 225.0);

        let token = controller.scene().tokens.get(0).expect("token");
        assert!(token.selected);
        assert_eq!(token.cell, GridPoint::new(3, 4));

        click(&mut controller, GridPoint::new(8, 8), Modifiers::NONE);
        assert!(!controller.scene().tokens.any_selected());
    }

    #[test]
    fn modifier_click_duplicates_and_selects_only_the_copy() {
        let temp = TempDir::new().expect("temp");
        let art = write_png(temp.path(), "knight.png", 8, 8);
        let mut controller = controller(&temp);
        controller
            .place_token(&art, GridPoint::new(2, 2))
            .expect("place");
        click(&mut controller, GridPoint::new(2, 2), Modifiers::NONE);
        controller.damage_selected(4);

        click(&mut controller, GridPoint::new(2, 2), Modifiers::SHIFT);
        let tokens = &controller.scene().tokens;
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens.selected_indices(), vec![1]);
        assert_eq!(tokens.get(1).map(Token::damage), Some(4));
    }

    #[test]
    fn delete_removes_only_first_selected_token() {
        let temp = TempDir::new().expect("temp");
        let art = write_png(temp.path(), "knight.png", 8, 8);
        let mut controller = controller(&temp);
        for x in 0..3 {
            controller
                .place_token(&art, GridPoint::new(x, 0))
                .expect("place");
        }
        controller.select_at(GridPoint::new(0, 0), false);
        controller.select_at(GridPoint::new(2, 0), true);

        controller.handle_key(Key::Delete, Modifiers::NONE);
        let tokens = &controller.scene().tokens;
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens.get(0).map(|token| token.cell), Some(GridPoint::new(1, 0)));
        assert!(tokens.get(1).is_some_and(|token| token.selected));
    }

    #[test]
    fn digit_keys_damage_heal_or_switch_tools() {
        let temp = TempDir::new().expect("temp");
        let art = write_png(temp.path(), "knight.png", 8, 8);
        let mut controller = controller(&temp);

        controller.handle_key(Key::Digit(2), Modifiers::NONE);
        assert_eq!(controller.tool(), Tool::Fog);
        controller.handle_key(Key::Digit(1), Modifiers::NONE);

        controller
            .place_token(&art, GridPoint::new(0, 0))
            .expect("place");
        controller.select_at(GridPoint::new(0, 0), false);
        controller.handle_key(Key::Digit(0), Modifiers::NONE);
        controller.handle_key(Key::Digit(3), Modifiers::NONE);
        assert_eq!(controller.scene().tokens.get(0).map(Token::damage), Some(13));
        assert_eq!(controller.tool(), Tool::Select);

        controller.handle_key(Key::Digit(9), Modifiers::SHIFT);
        controller.handle_key(Key::Digit(9), Modifiers::SHIFT);
        assert_eq!(controller.scene().tokens.get(0).map(Token::damage), Some(0));
        assert!(!controller.set_tool(Tool::Draw));
    }

    #[test]
    fn typed_damage_entry_applies_on_enter() {
        let temp = TempDir::new().expect("temp");
        let art = write_png(temp.path(), "knight.png", 8, 8);
        let mut controller = controller(&temp);
        controller
            .place_token(&art, GridPoint::new(0, 0))
            .expect("place");
        controller.select_at(GridPoint::new(0, 0), false);

        controller.handle_key(Key::Enter, Modifiers::NONE);
        for digit in [2, 5, 7] {
            controller.handle_key(Key::Digit(digit), Modifiers::NONE);
        }
        controller.handle_key(Key::Backspace, Modifiers::NONE);
        assert_eq!(controller.damage_entry().map(DamageEntry::as_str), Some("25"));
        controller.handle_key(Key::Enter, Modifiers::NONE);
        assert_eq!(controller.scene().tokens.get(0).map(Token::damage), Some(25));
        assert!(controller.damage_entry().is_none());

        controller.handle_key(Key::Enter, Modifiers::NONE);
        controller.handle_key(Key::Digit(5), Modifiers::NONE);
        controller.handle_key(Key::Enter, Modifiers::SHIFT);
        assert_eq!(controller.scene().tokens.get(0).map(Token::damage), Some(20));
    }

    #[test]
    fn opacity_hidden_and_size_edits_apply_to_selection() {
        let temp = TempDir::new().expect("temp");
        let art = write_png(temp.path(), "knight.png", 8, 8);
        let mut controller = controller(&temp);
        controller
            .place_token(&art, GridPoint::new(0, 0))
            .expect("place");
        controller
            .place_token(&art, GridPoint::new(5, 5))
            .expect("place");
        controller.select_at(GridPoint::new(0, 0), false);

        controller.handle_key(Key::Letter('d'), Modifiers::NONE);
        controller.handle_key(Key::Letter('h'), Modifiers::NONE);
        for _ in 0..5 {
            controller.handle_key(Key::Plus, Modifiers::NONE);
        }
        let first = controller.scene().tokens.get(0).expect("token");
        assert_eq!(first.opacity, HALF_OPAQUE);
        assert!(first.hidden);
        assert_eq!(first.size(), 4);
        assert_eq!(controller.scene().tokens.get(1).map(|t| t.opacity), Some(OPAQUE));

        controller.handle_key(Key::Letter('d'), Modifiers::SHIFT);
        assert_eq!(controller.scene().tokens.get(0).map(|t| t.opacity), Some(OPAQUE));
    }

    #[test]
    fn fog_tool_paints_with_the_inverse_of_the_first_cell() {
        let temp = TempDir::new().expect("temp");
        let mut controller = controller(&temp);
        controller.set_tool(Tool::Fog);

        controller.pointer_pressed(PointerButton::Primary, 25.0, 25.0, Modifiers::NONE);
        controller.pointer_moved(75.0, 25.0);
        controller.pointer_moved(125.0, 25.0);
        controller.pointer_released(PointerButton::Primary, 125.0, 25.0);
        assert_eq!(controller.scene().fog.hidden_count(), 3);

        controller.pointer_pressed(PointerButton::Primary, 75.0, 25.0, Modifiers::NONE);
        controller.pointer_released(PointerButton::Primary, 75.0, 25.0);
        assert_eq!(controller.scene().fog.hidden_count(), 2);
        assert!(controller.scene().fog.get(1, 0));
    }

    #[test]
    fn squad_tool_toggles_membership() {
        let temp = TempDir::new().expect("temp");
        let art = write_png(temp.path(), "knight.png", 8, 8);
        let mut controller = controller(&temp);
        controller
            .place_token(&art, GridPoint::new(1, 1))
            .expect("place");
        controller.set_tool(Tool::Squad);
        controller.handle_key(Key::Letter('e'), Modifiers::NONE);
        controller.handle_key(Key::Letter('e'), Modifiers::NONE);

        click(&mut controller, GridPoint::new(1, 1), Modifiers::NONE);
        assert_eq!(
            controller.scene().tokens.get(0).and_then(|t| t.squad),
            Squad::new(2)
        );
        click(&mut controller, GridPoint::new(1, 1), Modifiers::NONE);
        assert_eq!(controller.scene().tokens.get(0).and_then(|t| t.squad), None);
    }

    #[test]
    fn draw_tool_creates_removes_and_clears_drawings() {
        let temp = TempDir::new().expect("temp");
        let mut controller = controller(&temp);
        controller.set_tool(Tool::Draw);
        controller.handle_key(Key::Letter('w'), Modifiers::NONE);
        assert_eq!(controller.shape(), Shape::Circle);

        controller.pointer_pressed(PointerButton::Primary, 100.0, 100.0, Modifiers::NONE);
        controller.pointer_moved(103.0, 102.0);
        controller.pointer_released(PointerButton::Primary, 103.0, 102.0);
        assert!(controller.scene().drawings.is_empty());

        controller.pointer_pressed(PointerButton::Primary, 100.0, 100.0, Modifiers::NONE);
        controller.pointer_moved(200.0, 200.0);
        assert!(controller.operator_overlay().pending_drawing.is_some());
        controller.pointer_released(PointerButton::Primary, 200.0, 200.0);
        assert_eq!(controller.scene().drawings.len(), 1);

        controller.pointer_pressed(PointerButton::Middle, 150.0, 150.0, Modifiers::NONE);
        assert!(controller.scene().drawings.is_empty());

        controller.add_drawing(WorldPoint::new(0, 0), WorldPoint::new(40, 40));
        controller.handle_key(Key::Letter('x'), Modifiers::NONE);
        assert!(controller.scene().drawings.is_empty());
    }

    #[test]
    fn condition_wheel_toggles_by_sector() {
        let temp = TempDir::new().expect("temp");
        let art = write_png(temp.path(), "knight.png", 8, 8);
        let mut controller = controller(&temp);
        controller
            .place_token(&art, GridPoint::new(0, 0))
            .expect("place");
        controller.select_at(GridPoint::new(0, 0), false);
        controller.handle_key(Key::Letter('a'), Modifiers::NONE);
        assert_eq!(controller.wheel_token(), Some(0));

        // 100px right of the window center is the first sector.
        controller.pointer_pressed(PointerButton::Primary, 500.0, 301.0, Modifiers::NONE);
        let conditions = controller.scene().tokens.get(0).map(|t| t.conditions);
        assert!(conditions.is_some_and(|set| set.contains(Condition::Bleeding)));
        assert_eq!(
            controller.operator_overlay().wheel,
            conditions
        );

        controller.handle_key(Key::Escape, Modifiers::NONE);
        assert_eq!(controller.wheel_token(), None);
        assert!(controller.scene().tokens.any_selected());
    }

    #[test]
    fn measurement_follows_the_cursor() {
        let temp = TempDir::new().expect("temp");
        let mut controller = controller(&temp);
        let alt = Modifiers {
            alt: true,
            ..Modifiers::NONE
        };
        controller.pointer_pressed(PointerButton::Primary, 25.0, 25.0, alt);
        controller.pointer_moved(175.0, 75.0);
        let measurement = controller.measurement().expect("measurement");
        assert_eq!(measurement.cells(), 3);

        controller.pointer_pressed(PointerButton::Primary, 175.0, 75.0, Modifiers::NONE);
        assert!(controller.measurement().is_none());
    }

    #[test]
    fn calibration_rebuilds_grid_and_fog_together() {
        let temp = TempDir::new().expect("temp");
        let map = write_png(temp.path(), "cave.png", 400, 300);
        let mut controller = SceneController::new(
            SlotStore::new(temp.path().join("saves"), SaveFormat::Embedded),
            vec![map],
        );
        assert!(controller.show_map(0));
        controller.scene.fog.set(0, 0, false);

        controller.handle_key(Key::Letter('c'), Modifiers::NONE);
        controller.pointer_pressed(PointerButton::Primary, 50.0, 50.0, Modifiers::NONE);
        controller.pointer_moved(250.0, 250.0);
        controller.pointer_released(PointerButton::Primary, 250.0, 250.0);
        controller.handle_key(Key::Enter, Modifiers::NONE);

        let grid = controller.scene().grid;
        assert_eq!(grid.cell_size(), 100);
        assert_eq!(grid.offset(), (50, 50));
        assert_eq!(grid.dims(), (5, 4));
        assert!(controller.scene().fog_in_sync());
        assert_eq!(controller.scene().fog.hidden_count(), 0);
        assert!(controller.calibration().is_none());
    }

    #[test]
    fn tiny_calibration_rect_leaves_grid_alone() {
        let temp = TempDir::new().expect("temp");
        let mut controller = controller(&temp);
        let before = controller.scene().grid;
        controller.begin_calibration();
        controller.pointer_pressed(PointerButton::Primary, 10.0, 10.0, Modifiers::NONE);
        controller.pointer_moved(15.0, 300.0);
        controller.handle_key(Key::Enter, Modifiers::NONE);
        assert_eq!(controller.scene().grid, before);
    }

    #[test]
    fn map_cycling_wraps_and_resets_fog() {
        let temp = TempDir::new().expect("temp");
        let first = write_png(temp.path(), "a.png", 120, 80);
        let second = write_png(temp.path(), "b.png", 260, 40);
        let mut controller = SceneController::new(
            SlotStore::new(temp.path().join("saves"), SaveFormat::Embedded),
            vec![first, second],
        );

        assert!(controller.cycle_map(1));
        assert_eq!(controller.map_index(), Some(0));
        assert_eq!(controller.scene().grid.dims(), (3, 2));
        controller.scene.fog.fill(false);

        controller.handle_key(Key::Letter('m'), Modifiers::NONE);
        assert_eq!(controller.map_index(), Some(1));
        assert_eq!(controller.scene().grid.dims(), (6, 1));
        assert_eq!(controller.scene().fog.hidden_count(), 0);

        controller.handle_key(Key::Letter('m'), Modifiers::NONE);
        assert_eq!(controller.map_index(), Some(0));
    }

    #[test]
    fn unreadable_map_keeps_current_map() {
        let temp = TempDir::new().expect("temp");
        let good = write_png(temp.path(), "good.png", 100, 100);
        let bad = temp.path().join("bad.png");
        std::fs::write(&bad, b"not a png").expect("write");
        let mut controller = SceneController::new(
            SlotStore::new(temp.path().join("saves"), SaveFormat::Embedded),
            vec![good, bad],
        );
        assert!(controller.show_map(0));
        let map = controller.scene().map;

        assert!(!controller.cycle_map(1));
        assert_eq!(controller.scene().map, map);
        assert_eq!(controller.map_index(), Some(0));
    }

    #[test]
    fn save_then_load_restores_scene_and_snaps_camera() {
        let temp = TempDir::new().expect("temp");
        let art = write_png(temp.path(), "knight.png", 8, 8);
        let mut controller = controller(&temp);
        controller
            .place_token(&art, GridPoint::new(3, 3))
            .expect("place");
        controller.scene.fog.set(2, 2, false);
        controller.scroll(0.0, 0.0, 3);
        let saved_target = controller.camera(ViewKind::Operator).target;

        controller.handle_key(Key::Function(1), Modifiers::SHIFT);
        assert_eq!(controller.status(), Some("save slot 1: ok"));

        controller.select_at(GridPoint::new(3, 3), false);
        controller.delete_selected();
        controller.scroll(0.0, 0.0, -6);
        assert!(controller.scene().tokens.is_empty());

        controller.handle_key(Key::Function(1), Modifiers::NONE);
        assert_eq!(controller.scene().tokens.len(), 1);
        assert!(!controller.scene().fog.get(2, 2));
        let camera = controller.camera(ViewKind::Operator);
        assert_eq!(camera.current, saved_target);
        assert_eq!(camera.target, saved_target);
        assert_eq!(controller.status(), Some("load slot 1: ok"));
    }

    #[test]
    fn loading_after_a_map_switch_brings_the_saved_map_back() {
        for format in [SaveFormat::Embedded, SaveFormat::Legacy] {
            let temp = TempDir::new().expect("temp");
            let first = write_png(temp.path(), "a.png", 120, 80);
            let second = write_png(temp.path(), "b.png", 260, 40);
            let mut controller = SceneController::new(
                SlotStore::new(temp.path().join("saves"), format),
                vec![first, second],
            );

            assert!(controller.show_map(0));
            let saved_map = controller.scene().map.expect("map");
            assert!(controller.save_slot(slot(1)).is_committed());
            assert!(controller.show_map(1));
            assert!(controller.assets().maps.pixels(saved_map).is_none(), "{format:?}");

            assert!(controller.load_slot(slot(1)).is_committed());
            let map = controller.scene().map.expect("map");
            assert_eq!(map, saved_map, "{format:?}");
            assert!(controller.assets().maps.pixels(map).is_some(), "{format:?}");
            assert_eq!(controller.scene().grid.dims(), (3, 2), "{format:?}");
        }
    }

    #[test]
    fn failed_load_keeps_the_live_scene() {
        let temp = TempDir::new().expect("temp");
        let art = write_png(temp.path(), "knight.png", 8, 8);
        let mut controller = controller(&temp);
        controller
            .place_token(&art, GridPoint::new(3, 3))
            .expect("place");
        let before = controller.snapshot();

        let outcome = controller.load_slot(slot(7));
        assert!(!outcome.is_committed());
        assert_eq!(controller.snapshot(), before);
        assert_eq!(controller.status(), Some("load slot 7: failed"));
    }

    #[test]
    fn synced_player_camera_follows_operator_target() {
        let temp = TempDir::new().expect("temp");
        let mut controller = controller(&temp);
        controller.pointer_pressed(PointerButton::Secondary, 100.0, 100.0, Modifiers::NONE);
        controller.pointer_moved(60.0, 80.0);
        controller.pointer_released(PointerButton::Secondary, 60.0, 80.0);
        controller.update_cameras();

        let operator = controller.camera(ViewKind::Operator).target;
        assert_eq!((operator.x, operator.y), (40.0, 20.0));
        assert_eq!(controller.camera(ViewKind::Player).target, operator);

        controller.handle_key(Key::Letter('p'), Modifiers::NONE);
        controller.pointer_pressed(PointerButton::Secondary, 0.0, 0.0, Modifiers::NONE);
        controller.pointer_moved(-10.0, 0.0);
        controller.update_cameras();
        assert_ne!(
            controller.camera(ViewKind::Player).target,
            controller.camera(ViewKind::Operator).target
        );
    }

    #[test]
    fn replace_resyncs_mismatched_fog() {
        let temp = TempDir::new().expect("temp");
        let mut controller = controller(&temp);
        controller.replace(SceneState {
            grid: GridSpace::new(40, 0, 0, 4, 3).expect("grid"),
            ..SceneState::default()
        });
        assert!(controller.scene().fog_in_sync());
        assert_eq!(controller.scene().fog.dims(), (4, 3));
    }
}
