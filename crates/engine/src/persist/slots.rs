use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::assets::AssetLibraries;
use crate::scene::SceneState;

use super::atomic_io::write_save_atomic;
use super::error::PersistError;
use super::{decode_scene, encode_scene, SaveFormat};

pub const SLOT_COUNT: u8 = 12;
pub const SLOT_FILE_EXTENSION: &str = "vtt";

/// One of the numbered save slots, `1..=SLOT_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SaveSlot(u8);

impl SaveSlot {
    pub fn new(number: u8) -> Option<Self> {
        (1..=SLOT_COUNT).contains(&number).then_some(Self(number))
    }

    pub fn number(self) -> u8 {
        self.0
    }

    pub fn file_name(self) -> String {
        format!("slot_{}.{SLOT_FILE_EXTENSION}", self.0)
    }
}

impl fmt::Display for SaveSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

/// Terminal state of a save or load. A rejected operation changed nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotOutcome {
    Committed {
        slot: SaveSlot,
        warnings: Vec<String>,
    },
    Rejected {
        slot: SaveSlot,
        reason: String,
    },
}

impl SlotOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, SlotOutcome::Committed { .. })
    }

    pub fn slot(&self) -> SaveSlot {
        match self {
            SlotOutcome::Committed { slot, .. } | SlotOutcome::Rejected { slot, .. } => *slot,
        }
    }

    /// One-line status for the operator.
    pub fn summary(&self) -> String {
        match self {
            SlotOutcome::Committed { slot, warnings } if warnings.is_empty() => {
                format!("{slot}: ok")
            }
            SlotOutcome::Committed { slot, warnings } => {
                format!("{slot}: ok ({} warnings)", warnings.len())
            }
            SlotOutcome::Rejected { slot, .. } => format!("{slot}: failed"),
        }
    }
}

/// Save slots in one directory. All errors end at this boundary as a
/// [`SlotOutcome`].
#[derive(Debug, Clone)]
pub struct SlotStore {
    dir: PathBuf,
    format: SaveFormat,
}

impl SlotStore {
    pub fn new(dir: impl Into<PathBuf>, format: SaveFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn format(&self) -> SaveFormat {
        self.format
    }

    pub fn set_format(&mut self, format: SaveFormat) {
        self.format = format;
    }

    pub fn slot_path(&self, slot: SaveSlot) -> PathBuf {
        self.dir.join(slot.file_name())
    }

    pub fn save(&self, slot: SaveSlot, scene: &SceneState, assets: &AssetLibraries) -> SlotOutcome {
        let path = self.slot_path(slot);
        let bytes = encode_scene(scene, assets, self.format);
        match write_save_atomic(&path, &bytes) {
            Ok(()) => {
                info!(
                    slot = slot.number(),
                    path = %path.display(),
                    format = %self.format,
                    tokens = scene.tokens.len(),
                    bytes = bytes.len(),
                    "scene_saved"
                );
                SlotOutcome::Committed {
                    slot,
                    warnings: Vec::new(),
                }
            }
            Err(source) => reject(slot, PersistError::Io { path, source }),
        }
    }

    /// Parses the slot into a fresh scene and swaps it into `scene` only when
    /// the whole read succeeds. On rejection `scene` is untouched.
    pub fn load(
        &self,
        slot: SaveSlot,
        scene: &mut SceneState,
        assets: &mut AssetLibraries,
    ) -> SlotOutcome {
        let path = self.slot_path(slot);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(source) => return reject(slot, PersistError::Io { path, source }),
        };
        let decoded = match decode_scene(&bytes, assets, scene.map) {
            Ok(decoded) => decoded,
            Err(error) => return reject(slot, error),
        };

        for warning in &decoded.warnings {
            warn!(slot = slot.number(), warning = %warning, "scene_load_warning");
        }
        info!(
            slot = slot.number(),
            path = %path.display(),
            format = %decoded.format,
            legacy_version = ?decoded.legacy_version,
            tokens = decoded.state.tokens.len(),
            drawings = decoded.state.drawings.len(),
            "scene_loaded"
        );
        *scene = decoded.state;
        SlotOutcome::Committed {
            slot,
            warnings: decoded.warnings,
        }
    }
}

fn reject(slot: SaveSlot, error: PersistError) -> SlotOutcome {
    warn!(slot = slot.number(), error = %error, "slot_operation_rejected");
    SlotOutcome::Rejected {
        slot,
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    use super::*;
    use crate::assets::AssetHandle;
    use crate::scene::{Condition, ConditionSet, GridPoint, GridSpace, Token};

    fn slot(number: u8) -> SaveSlot {
        SaveSlot::new(number).expect("slot")
    }

    fn three_token_scene(dir: &Path, assets: &mut AssetLibraries) -> SceneState {
        let art = dir.join("knight.png");
        RgbaImage::from_pixel(10, 10, Rgba([200, 180, 20, 255]))
            .save(&art)
            .expect("save png");
        let knight = assets.tokens.resolve(&art).expect("knight");

        let mut scene = SceneState::default();
        scene.set_grid(GridSpace::new(50, 0, 0, 10, 10).expect("grid"));
        let mut wounded = Token::new(GridPoint::new(1, 1), knight);
        wounded.set_damage(7);
        wounded.conditions = ConditionSet::EMPTY.with(Condition::Bleeding);
        scene.tokens.push(wounded).expect("push");
        scene
            .tokens
            .push(Token::new(GridPoint::new(2, 2), knight))
            .expect("push");
        scene
            .tokens
            .push(Token::new(GridPoint::new(3, 3), knight))
            .expect("push");
        scene
    }

    #[test]
    fn slot_numbers_are_bounded() {
        assert!(SaveSlot::new(0).is_none());
        assert!(SaveSlot::new(SLOT_COUNT + 1).is_none());
        assert_eq!(slot(3).file_name(), "slot_3.vtt");
    }

    #[test]
    fn embedded_save_reloads_into_fresh_process_state() {
        let temp = TempDir::new().expect("temp");
        let store = SlotStore::new(temp.path().join("saves"), SaveFormat::Embedded);
        let mut assets = AssetLibraries::default();
        let scene = three_token_scene(temp.path(), &mut assets);

        assert!(store.save(slot(1), &scene, &assets).is_committed());

        let mut fresh_assets = AssetLibraries::default();
        let mut fresh_scene = SceneState::default();
        let outcome = store.load(slot(1), &mut fresh_scene, &mut fresh_assets);
        assert_eq!(
            outcome,
            SlotOutcome::Committed {
                slot: slot(1),
                warnings: Vec::new()
            }
        );
        assert_eq!(fresh_scene.tokens.len(), 3);
        let first = fresh_scene.tokens.get(0).expect("token");
        assert_eq!(first.damage(), 7);
        assert!(first.conditions.contains(Condition::Bleeding));
        assert_eq!(first.conditions.iter().count(), 1);
        assert_eq!(fresh_scene.fog.dims(), (10, 10));
        assert_eq!(fresh_scene.fog.hidden_count(), 0);
        assert_ne!(first.image, AssetHandle::PLACEHOLDER);
    }

    #[test]
    fn wrong_magic_is_rejected_and_scene_is_untouched() {
        let temp = TempDir::new().expect("temp");
        let store = SlotStore::new(temp.path(), SaveFormat::Embedded);
        let mut assets = AssetLibraries::default();
        let mut scene = three_token_scene(temp.path(), &mut assets);
        scene.fog.set(4, 4, false);
        let before = scene.clone();
        let library_len = assets.tokens.len();

        let mut bytes = encode_scene(&scene, &assets, SaveFormat::Embedded);
        bytes[0] ^= 0xFF;
        fs::write(store.slot_path(slot(2)), &bytes).expect("write");

        let outcome = store.load(slot(2), &mut scene, &mut assets);
        assert!(matches!(outcome, SlotOutcome::Rejected { .. }));
        assert_eq!(outcome.slot(), slot(2));
        assert_eq!(scene, before);
        assert_eq!(assets.tokens.len(), library_len);
    }

    #[test]
    fn missing_slot_file_is_rejected() {
        let temp = TempDir::new().expect("temp");
        let store = SlotStore::new(temp.path(), SaveFormat::Legacy);
        let mut scene = SceneState::default();
        let mut assets = AssetLibraries::default();
        let outcome = store.load(slot(12), &mut scene, &mut assets);
        match outcome {
            SlotOutcome::Rejected { reason, .. } => assert!(reason.contains("slot_12.vtt")),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn legacy_store_round_trips_tokens() {
        let temp = TempDir::new().expect("temp");
        let store = SlotStore::new(temp.path().join("saves"), SaveFormat::Legacy);
        let mut assets = AssetLibraries::default();
        let scene = three_token_scene(temp.path(), &mut assets);
        assert!(store.save(slot(5), &scene, &assets).is_committed());

        let mut loaded = SceneState::default();
        let mut fresh_assets = AssetLibraries::default();
        assert!(store
            .load(slot(5), &mut loaded, &mut fresh_assets)
            .is_committed());
        assert_eq!(loaded.tokens.len(), 3);
        assert_eq!(loaded.tokens.get(0).map(Token::damage), Some(7));
        assert_eq!(loaded.without_transients(), scene.without_transients());
    }

    #[test]
    fn unwritable_directory_is_rejected() {
        let temp = TempDir::new().expect("temp");
        let blocker = temp.path().join("not_a_dir");
        fs::write(&blocker, b"x").expect("write");
        let store = SlotStore::new(&blocker, SaveFormat::Embedded);
        let outcome = store.save(slot(1), &SceneState::default(), &AssetLibraries::default());
        assert!(!outcome.is_committed());
    }
}
