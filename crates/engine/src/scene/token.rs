use thiserror::Error;

use crate::assets::AssetHandle;

use super::grid::GridPoint;

pub const TOKEN_CAPACITY: usize = 256;
pub const MIN_TOKEN_SIZE: u8 = 1;
pub const MAX_TOKEN_SIZE: u8 = 4;
pub const SQUAD_COUNT: u8 = 8;
pub const OPAQUE: u8 = 255;
pub const HALF_OPAQUE: u8 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Bleeding,
    Dazed,
    Frightened,
    Grabbed,
    Restrained,
    Slowed,
    Taunted,
    Weakened,
}

impl Condition {
    pub const ALL: [Condition; 8] = [
        Condition::Bleeding,
        Condition::Dazed,
        Condition::Frightened,
        Condition::Grabbed,
        Condition::Restrained,
        Condition::Slowed,
        Condition::Taunted,
        Condition::Weakened,
    ];

    pub const fn index(self) -> usize {
        match self {
            Condition::Bleeding => 0,
            Condition::Dazed => 1,
            Condition::Frightened => 2,
            Condition::Grabbed => 3,
            Condition::Restrained => 4,
            Condition::Slowed => 5,
            Condition::Taunted => 6,
            Condition::Weakened => 7,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub const fn label(self) -> &'static str {
        match self {
            Condition::Bleeding => "Bleeding",
            Condition::Dazed => "Dazed",
            Condition::Frightened => "Frightened",
            Condition::Grabbed => "Grabbed",
            Condition::Restrained => "Restrained",
            Condition::Slowed => "Slowed",
            Condition::Taunted => "Taunted",
            Condition::Weakened => "Weakened",
        }
    }

    pub const fn abbreviation(self) -> &'static str {
        match self {
            Condition::Bleeding => "BL",
            Condition::Dazed => "DZ",
            Condition::Frightened => "FR",
            Condition::Grabbed => "GR",
            Condition::Restrained => "RS",
            Condition::Slowed => "SL",
            Condition::Taunted => "TN",
            Condition::Weakened => "WK",
        }
    }
}

/// Eight independent condition flags packed into one byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ConditionSet(u8);

impl ConditionSet {
    pub const EMPTY: ConditionSet = ConditionSet(0);

    pub fn contains(self, condition: Condition) -> bool {
        self.0 & (1 << condition.index()) != 0
    }

    pub fn set(&mut self, condition: Condition, active: bool) {
        if active {
            self.0 |= 1 << condition.index();
        } else {
            self.0 &= !(1 << condition.index());
        }
    }

    pub fn toggle(&mut self, condition: Condition) {
        self.0 ^= 1 << condition.index();
    }

    pub fn with(mut self, condition: Condition) -> Self {
        self.set(condition, true);
        self
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Condition> {
        Condition::ALL
            .into_iter()
            .filter(move |condition| self.contains(*condition))
    }

    /// One byte per flag, any non-zero byte is set.
    pub fn from_flag_bytes(bytes: [u8; 8]) -> Self {
        let mut set = Self::EMPTY;
        for (index, byte) in bytes.iter().enumerate() {
            if *byte != 0 {
                set.0 |= 1 << index;
            }
        }
        set
    }

    pub fn to_flag_bytes(self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        for (index, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from(self.0 & (1 << index) != 0);
        }
        bytes
    }
}

/// Color-coded grouping tag, 0..=7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Squad(u8);

impl Squad {
    pub fn new(index: u8) -> Option<Self> {
        (index < SQUAD_COUNT).then_some(Self(index))
    }

    pub fn index(self) -> u8 {
        self.0
    }

    pub fn cycled(self, step: i32) -> Self {
        let next = (self.0 as i32 + step).rem_euclid(SQUAD_COUNT as i32);
        Self(next as u8)
    }

    /// `-1` (or anything outside 0..=7) means no squad.
    pub fn from_wire(raw: i32) -> Option<Self> {
        u8::try_from(raw).ok().and_then(Self::new)
    }

    pub fn to_wire(squad: Option<Self>) -> i32 {
        squad.map_or(-1, |squad| squad.0 as i32)
    }
}

impl Default for Squad {
    fn default() -> Self {
        Self(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub cell: GridPoint,
    size: u8,
    pub image: AssetHandle,
    damage: i32,
    pub squad: Option<Squad>,
    pub opacity: u8,
    pub hidden: bool,
    pub conditions: ConditionSet,
    /// Transient; never persisted.
    pub selected: bool,
}

impl Token {
    pub fn new(cell: GridPoint, image: AssetHandle) -> Self {
        Self {
            cell,
            size: MIN_TOKEN_SIZE,
            image,
            damage: 0,
            squad: None,
            opacity: OPAQUE,
            hidden: false,
            conditions: ConditionSet::EMPTY,
            selected: false,
        }
    }

    pub fn size(&self) -> u8 {
        self.size
    }

    pub fn set_size(&mut self, size: i32) {
        self.size = size.clamp(MIN_TOKEN_SIZE as i32, MAX_TOKEN_SIZE as i32) as u8;
    }

    pub fn grow(&mut self, delta: i32) {
        self.set_size(self.size as i32 + delta);
    }

    pub fn damage(&self) -> i32 {
        self.damage
    }

    pub fn set_damage(&mut self, damage: i32) {
        self.damage = damage.max(0);
    }

    /// Positive values damage, negative values heal; never drops below zero.
    pub fn apply_damage(&mut self, delta: i32) {
        self.set_damage(self.damage.saturating_add(delta));
    }

    pub fn toggle_half_opacity(&mut self) {
        self.opacity = if self.opacity == OPAQUE {
            HALF_OPAQUE
        } else {
            OPAQUE
        };
    }

    /// Cells covered by the token footprint, anchored at its top-left cell.
    pub fn occupies(&self, point: GridPoint) -> bool {
        let size = self.size as i64;
        let dx = point.x as i64 - self.cell.x as i64;
        let dy = point.y as i64 - self.cell.y as i64;
        (0..size).contains(&dx) && (0..size).contains(&dy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("roster is full ({capacity} entries)")]
pub struct CapacityExceeded {
    pub capacity: usize,
}

/// Ordered, bounded token roster. Index order is draw order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TokenRoster {
    tokens: Vec<Token>,
}

impl TokenRoster {
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.tokens.len() >= TOKEN_CAPACITY
    }

    pub fn push(&mut self, token: Token) -> Result<usize, CapacityExceeded> {
        if self.is_full() {
            return Err(CapacityExceeded {
                capacity: TOKEN_CAPACITY,
            });
        }
        self.tokens.push(token);
        Ok(self.tokens.len() - 1)
    }

    pub fn remove(&mut self, index: usize) -> Option<Token> {
        (index < self.tokens.len()).then(|| self.tokens.remove(index))
    }

    pub fn retain(&mut self, keep: impl FnMut(&Token) -> bool) {
        self.tokens.retain(keep);
    }

    pub fn get(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Token> {
        self.tokens.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Token> {
        self.tokens.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Token> {
        self.tokens.iter_mut()
    }

    /// Topmost (last drawn) token whose footprint covers `point`.
    pub fn topmost_at(&self, point: GridPoint) -> Option<usize> {
        self.tokens.iter().rposition(|token| token.occupies(point))
    }

    pub fn selected_indices(&self) -> Vec<usize> {
        self.tokens
            .iter()
            .enumerate()
            .filter(|(_, token)| token.selected)
            .map(|(index, _)| index)
            .collect()
    }

    pub fn any_selected(&self) -> bool {
        self.tokens.iter().any(|token| token.selected)
    }

    pub fn clear_selection(&mut self) {
        for token in &mut self.tokens {
            token.selected = false;
        }
    }
}

impl<'a> IntoIterator for &'a TokenRoster {
    type Item = &'a Token;
    type IntoIter = std::slice::Iter<'a, Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_at(x: i32, y: i32) -> Token {
        Token::new(GridPoint::new(x, y), AssetHandle::PLACEHOLDER)
    }

    #[test]
    fn damage_is_clamped_at_zero_on_heal() {
        let mut token = token_at(0, 0);
        token.apply_damage(7);
        token.apply_damage(-3);
        assert_eq!(token.damage(), 4);
        token.apply_damage(-10);
        assert_eq!(token.damage(), 0);
        token.set_damage(-5);
        assert_eq!(token.damage(), 0);
    }

    #[test]
    fn size_is_clamped_to_footprint_range() {
        let mut token = token_at(0, 0);
        token.grow(10);
        assert_eq!(token.size(), MAX_TOKEN_SIZE);
        token.grow(-10);
        assert_eq!(token.size(), MIN_TOKEN_SIZE);
    }

    #[test]
    fn footprint_covers_size_squared_cells() {
        let mut token = token_at(-1, 2);
        token.set_size(2);
        assert!(token.occupies(GridPoint::new(-1, 2)));
        assert!(token.occupies(GridPoint::new(0, 3)));
        assert!(!token.occupies(GridPoint::new(1, 3)));
        assert!(!token.occupies(GridPoint::new(-2, 2)));
    }

    #[test]
    fn condition_flags_are_independent() {
        let mut set = ConditionSet::EMPTY.with(Condition::Bleeding);
        set.toggle(Condition::Weakened);
        assert!(set.contains(Condition::Bleeding));
        assert!(set.contains(Condition::Weakened));
        assert!(!set.contains(Condition::Dazed));
        set.toggle(Condition::Bleeding);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![Condition::Weakened]);
    }

    #[test]
    fn condition_bytes_treat_any_non_zero_as_set() {
        let set = ConditionSet::from_flag_bytes([1, 0, 7, 0, 0, 0, 0, 255]);
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![Condition::Bleeding, Condition::Frightened, Condition::Weakened]
        );
        assert_eq!(set.to_flag_bytes(), [1, 0, 1, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn squad_wire_values_outside_range_mean_none() {
        assert_eq!(Squad::from_wire(-1), None);
        assert_eq!(Squad::from_wire(8), None);
        assert_eq!(Squad::from_wire(3).map(Squad::index), Some(3));
        assert_eq!(Squad::to_wire(None), -1);
        assert_eq!(Squad::new(7).map(|squad| squad.cycled(1).index()), Some(0));
        assert_eq!(Squad::new(0).map(|squad| squad.cycled(-1).index()), Some(7));
    }

    #[test]
    fn roster_rejects_push_past_capacity() {
        let mut roster = TokenRoster::default();
        for index in 0..TOKEN_CAPACITY {
            roster.push(token_at(index as i32, 0)).expect("push");
        }
        assert_eq!(
            roster.push(token_at(0, 0)),
            Err(CapacityExceeded {
                capacity: TOKEN_CAPACITY
            })
        );
        assert_eq!(roster.len(), TOKEN_CAPACITY);
    }

    #[test]
    fn topmost_hit_prefers_last_drawn() {
        let mut roster = TokenRoster::default();
        roster.push(token_at(1, 1)).expect("push");
        roster.push(token_at(1, 1)).expect("push");
        roster.push(token_at(4, 4)).expect("push");
        assert_eq!(roster.topmost_at(GridPoint::new(1, 1)), Some(1));
        assert_eq!(roster.topmost_at(GridPoint::new(2, 2)), None);
    }
}
