mod atomic_io;
mod embedded;
mod error;
mod legacy;
mod slots;
mod wire;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::assets::{AssetError, AssetHandle, AssetKind, AssetLibraries};
use crate::scene::{CameraPose, SceneState};

pub use atomic_io::write_save_atomic;
pub use error::PersistError;
pub use legacy::LegacyVersion;
pub use slots::{SaveSlot, SlotOutcome, SlotStore, SLOT_COUNT, SLOT_FILE_EXTENSION};

use wire::{peek_magic, SceneHeader, EMBEDDED_MAGIC, LEGACY_MAGIC};

/// Which on-disk family a save is written in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveFormat {
    /// Self-contained: every image is re-encoded into the file.
    #[default]
    Embedded,
    /// Fixed-width path references with appended optional trailers.
    Legacy,
}

impl SaveFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "embedded" => Some(SaveFormat::Embedded),
            "legacy" => Some(SaveFormat::Legacy),
            _ => None,
        }
    }

    pub fn magic(self) -> u32 {
        match self {
            SaveFormat::Embedded => EMBEDDED_MAGIC,
            SaveFormat::Legacy => LEGACY_MAGIC,
        }
    }

    /// Family of a save image, judged by its magic alone.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        match peek_magic(bytes)? {
            EMBEDDED_MAGIC => Some(SaveFormat::Embedded),
            LEGACY_MAGIC => Some(SaveFormat::Legacy),
            _ => None,
        }
    }
}

impl fmt::Display for SaveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveFormat::Embedded => f.write_str("embedded"),
            SaveFormat::Legacy => f.write_str("legacy"),
        }
    }
}

/// Where decoders send image references while rebuilding a scene.
pub trait AssetSink {
    fn extract(
        &mut self,
        kind: AssetKind,
        label: &str,
        blob: &[u8],
    ) -> Result<AssetHandle, AssetError>;

    fn resolve(&mut self, kind: AssetKind, path: &Path) -> Result<AssetHandle, AssetError>;

    /// Pixel extent of a resolved image, when known.
    fn extent(&self, kind: AssetKind, handle: AssetHandle) -> Option<(u32, u32)>;
}

impl AssetSink for AssetLibraries {
    fn extract(
        &mut self,
        kind: AssetKind,
        label: &str,
        blob: &[u8],
    ) -> Result<AssetHandle, AssetError> {
        self.library_mut(kind).extract(label, blob)
    }

    fn resolve(&mut self, kind: AssetKind, path: &Path) -> Result<AssetHandle, AssetError> {
        self.library_mut(kind).resolve(path)
    }

    fn extent(&self, kind: AssetKind, handle: AssetHandle) -> Option<(u32, u32)> {
        self.library(kind).dimensions(handle)
    }
}

/// Walks a save without decoding any image. Every reference resolves to the
/// placeholder; the map label is kept for reporting.
#[derive(Debug, Default)]
pub struct DetachedAssets {
    pub map_label: Option<String>,
}

impl AssetSink for DetachedAssets {
    fn extract(
        &mut self,
        kind: AssetKind,
        label: &str,
        _blob: &[u8],
    ) -> Result<AssetHandle, AssetError> {
        if kind == AssetKind::Map {
            self.map_label = Some(label.to_string());
        }
        Ok(AssetHandle::PLACEHOLDER)
    }

    fn resolve(&mut self, kind: AssetKind, path: &Path) -> Result<AssetHandle, AssetError> {
        if kind == AssetKind::Map {
            self.map_label = Some(path.display().to_string());
        }
        Ok(AssetHandle::PLACEHOLDER)
    }

    fn extent(&self, _kind: AssetKind, _handle: AssetHandle) -> Option<(u32, u32)> {
        None
    }
}

/// A fully parsed save, not yet committed anywhere.
#[derive(Debug)]
pub struct DecodedScene {
    pub state: SceneState,
    pub format: SaveFormat,
    pub legacy_version: Option<LegacyVersion>,
    pub stored_tokens: u32,
    pub stored_drawings: u32,
    /// Recoverable problems met while reading; the scene is still usable.
    pub warnings: Vec<String>,
    pub(crate) header: SceneHeader,
}

impl DecodedScene {
    pub fn stored_grid(&self) -> StoredGrid {
        StoredGrid {
            cols: self.header.cols,
            rows: self.header.rows,
            cell_size: self.header.cell_size,
            offset_x: self.header.offset_x,
            offset_y: self.header.offset_y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoredGrid {
    pub cols: u32,
    pub rows: u32,
    pub cell_size: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StoredCamera {
    pub x: f32,
    pub y: f32,
    pub zoom: f32,
}

impl From<CameraPose> for StoredCamera {
    fn from(pose: CameraPose) -> Self {
        Self {
            x: pose.x,
            y: pose.y,
            zoom: pose.zoom,
        }
    }
}

/// What `inspect` reports about a save image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveSummary {
    pub format: SaveFormat,
    pub legacy_version: Option<u8>,
    pub file_len: usize,
    pub grid: StoredGrid,
    pub camera: StoredCamera,
    pub map: Option<String>,
    pub token_count: u32,
    pub drawing_count: u32,
    pub hidden_fog_cells: usize,
    pub warnings: Vec<String>,
}

pub fn encode_scene(state: &SceneState, assets: &AssetLibraries, format: SaveFormat) -> Vec<u8> {
    match format {
        SaveFormat::Embedded => embedded::encode(state, assets),
        SaveFormat::Legacy => legacy::encode(state, assets),
    }
}

/// Parses a save image of either family. Header problems reject the whole
/// image; anything later is recorded in `warnings`.
pub fn decode_scene<A: AssetSink + ?Sized>(
    bytes: &[u8],
    assets: &mut A,
    previous_map: Option<AssetHandle>,
) -> Result<DecodedScene, PersistError> {
    match SaveFormat::detect(bytes) {
        Some(SaveFormat::Embedded) => embedded::decode(bytes, assets, previous_map),
        Some(SaveFormat::Legacy) => legacy::decode(bytes, assets, previous_map),
        None => Err(match peek_magic(bytes) {
            Some(magic) => error::invalid_format(format!("unknown magic 0x{magic:08x}")),
            None => error::invalid_format("file too short for magic"),
        }),
    }
}

pub fn inspect(bytes: &[u8]) -> Result<SaveSummary, PersistError> {
    let mut detached = DetachedAssets::default();
    let decoded = decode_scene(bytes, &mut detached, None)?;
    Ok(SaveSummary {
        format: decoded.format,
        legacy_version: decoded.legacy_version.map(LegacyVersion::number),
        file_len: bytes.len(),
        grid: decoded.stored_grid(),
        camera: decoded.header.camera.into(),
        map: detached.map_label.filter(|label| !label.is_empty()),
        token_count: decoded.stored_tokens,
        drawing_count: decoded.stored_drawings,
        hidden_fog_cells: decoded.state.fog.hidden_count(),
        warnings: decoded.warnings,
    })
}
