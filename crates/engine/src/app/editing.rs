use std::f32::consts::TAU;

use crate::scene::{calibrate, Calibration, Condition, GridPoint, WorldPoint};

use super::input::Key;

pub const WHEEL_INNER_RADIUS_PX: f32 = 70.0;
pub const WHEEL_OUTER_RADIUS_PX: f32 = 220.0;
pub const DAMAGE_ENTRY_MAX_DIGITS: usize = 15;
const DEFAULT_CALIBRATION_CELLS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Select,
    Fog,
    Squad,
    Draw,
}

impl Tool {
    /// Tools sit on the digit keys 1..=4.
    pub fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            1 => Some(Tool::Select),
            2 => Some(Tool::Fog),
            3 => Some(Tool::Squad),
            4 => Some(Tool::Draw),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Tool::Select => "SELECT",
            Tool::Fog => "FOG",
            Tool::Squad => "SQUAD",
            Tool::Draw => "DRAW",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Operator,
    Player,
}

impl ViewKind {
    pub const fn index(self) -> usize {
        match self {
            ViewKind::Operator => 0,
            ViewKind::Player => 1,
        }
    }
}

/// Condition under a click at `(dx, dy)` from the wheel center. The ring is
/// split into eight equal sectors starting at +x and running clockwise in
/// screen space.
pub fn wheel_condition_at(dx: f32, dy: f32) -> Option<Condition> {
    let distance = (dx * dx + dy * dy).sqrt();
    if !(WHEEL_INNER_RADIUS_PX..=WHEEL_OUTER_RADIUS_PX).contains(&distance) {
        return None;
    }
    let mut angle = dy.atan2(dx);
    if angle < 0.0 {
        angle += TAU;
    }
    let sector = (angle / (TAU / Condition::ALL.len() as f32)) as usize;
    Condition::from_index(sector.min(Condition::ALL.len() - 1))
}

/// Center angle of a condition's sector, for laying out wheel labels.
pub fn wheel_sector_center(condition: Condition) -> f32 {
    let span = TAU / Condition::ALL.len() as f32;
    (condition.index() as f32 + 0.5) * span
}

/// A rectangle being dragged out to derive cell size and origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationSession {
    pub start: WorldPoint,
    pub end: WorldPoint,
    pub cells_wide: u32,
    pub cells_tall: u32,
    pub dragging: bool,
}

impl Default for CalibrationSession {
    fn default() -> Self {
        Self {
            start: WorldPoint::new(0, 0),
            end: WorldPoint::new(0, 0),
            cells_wide: DEFAULT_CALIBRATION_CELLS,
            cells_tall: DEFAULT_CALIBRATION_CELLS,
            dragging: false,
        }
    }
}

impl CalibrationSession {
    pub fn begin_drag(&mut self, at: WorldPoint) {
        self.start = at;
        self.end = at;
        self.dragging = true;
    }

    /// Arrow keys change the declared cell counts; counts never drop below one.
    pub fn adjust_cells(&mut self, key: Key) -> bool {
        match key {
            Key::Up => self.cells_tall = self.cells_tall.saturating_add(1),
            Key::Down => self.cells_tall = self.cells_tall.saturating_sub(1).max(1),
            Key::Right => self.cells_wide = self.cells_wide.saturating_add(1),
            Key::Left => self.cells_wide = self.cells_wide.saturating_sub(1).max(1),
            _ => return false,
        }
        true
    }

    pub fn calibration(&self) -> Option<Calibration> {
        calibrate(self.start, self.end, self.cells_wide, self.cells_tall)
    }
}

/// Digits typed after Enter on a selected token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DamageEntry {
    digits: String,
}

impl DamageEntry {
    pub fn push_digit(&mut self, digit: u8) {
        if digit <= 9 && self.digits.len() < DAMAGE_ENTRY_MAX_DIGITS {
            self.digits.push(char::from(b'0' + digit));
        }
    }

    pub fn pop_digit(&mut self) {
        self.digits.pop();
    }

    pub fn as_str(&self) -> &str {
        &self.digits
    }

    /// Typed amount; empty input is zero and oversized input saturates.
    pub fn value(&self) -> i32 {
        if self.digits.is_empty() {
            return 0;
        }
        self.digits
            .parse::<i64>()
            .map(|value| value.min(i32::MAX as i64) as i32)
            .unwrap_or(i32::MAX)
    }
}

/// Distance readout anchored at an alt-clicked cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    pub from: GridPoint,
    pub to: GridPoint,
}

impl Measurement {
    pub fn cells(&self) -> u32 {
        self.from.chebyshev_distance(self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wheel_sectors_run_clockwise_from_positive_x() {
        assert_eq!(wheel_condition_at(100.0, 1.0), Some(Condition::Bleeding));
        assert_eq!(wheel_condition_at(-1.0, 100.0), Some(Condition::Frightened));
        assert_eq!(wheel_condition_at(-100.0, -1.0), Some(Condition::Restrained));
        assert_eq!(wheel_condition_at(100.0, -1.0), Some(Condition::Weakened));
    }

    #[test]
    fn wheel_ignores_clicks_off_the_ring() {
        assert_eq!(wheel_condition_at(10.0, 10.0), None);
        assert_eq!(wheel_condition_at(300.0, 0.0), None);
    }

    #[test]
    fn calibration_cells_never_reach_zero() {
        let mut session = CalibrationSession::default();
        assert!(session.adjust_cells(Key::Down));
        assert!(session.adjust_cells(Key::Down));
        assert_eq!(session.cells_tall, 1);
        assert!(session.adjust_cells(Key::Right));
        assert_eq!(session.cells_wide, 3);
        assert!(!session.adjust_cells(Key::Enter));
    }

    #[test]
    fn calibration_session_applies_dragged_rect() {
        let mut session = CalibrationSession::default();
        session.begin_drag(WorldPoint::new(50, 50));
        session.end = WorldPoint::new(250, 250);
        let calibration = session.calibration().expect("calibration");
        assert_eq!(calibration.cell_size, 100);
        assert_eq!((calibration.offset_x, calibration.offset_y), (50, 50));
    }

    #[test]
    fn damage_entry_caps_digits_and_saturates() {
        let mut entry = DamageEntry::default();
        assert_eq!(entry.value(), 0);
        for _ in 0..20 {
            entry.push_digit(9);
        }
        assert_eq!(entry.as_str().len(), DAMAGE_ENTRY_MAX_DIGITS);
        assert_eq!(entry.value(), i32::MAX);

        let mut entry = DamageEntry::default();
        entry.push_digit(1);
        entry.push_digit(2);
        entry.push_digit(7);
        entry.pop_digit();
        assert_eq!(entry.value(), 12);
    }

    #[test]
    fn tool_digits_cover_four_tools() {
        assert_eq!(Tool::from_digit(4), Some(Tool::Draw));
        assert_eq!(Tool::from_digit(5), None);
    }
}
