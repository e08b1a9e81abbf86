//! Path-referencing save family. Later writers appended optional per-token
//! trailers without a version field, so the version is inferred from the
//! file length.
//!
//! ```text
//! header            (see wire::SceneHeader)
//! map_path          [u8; 256], NUL padded
//! token_count: u32
//! tokens            grid_x, grid_y, size: i32, hidden: u8, path: [u8; 256]
//! fog               rows x cols u8, row-major
//! v2+               damage: i32 per token
//! v3+               squad: i32 per token
//! v4+               opacity: u8 per token
//! v5                conditions: [u8; 8] per token
//! ```

use std::fmt;
use std::path::Path;

use tracing::{debug, warn};

use crate::assets::{AssetHandle, AssetKind, AssetLibraries, PLACEHOLDER_LABEL};
use crate::scene::{ConditionSet, GridPoint, SceneState, Squad, Token, TOKEN_CAPACITY};

use super::error::{invalid_format, PersistError};
use super::wire::{
    clip_label, read_array, read_exact, read_fog_clipped, read_i32, read_u32, read_u8,
    write_fog, SceneHeader, HEADER_LEN, LEGACY_MAGIC,
};
use super::{AssetSink, DecodedScene, SaveFormat};

const PATH_FIELD_LEN: usize = 256;
const PREFIX_LEN: u64 = (HEADER_LEN + PATH_FIELD_LEN + 4) as u64;
const TOKEN_RECORD_LEN: u64 = (3 * 4 + 1 + PATH_FIELD_LEN) as u64;
const DAMAGE_LEN: u64 = 4;
const SQUAD_LEN: u64 = 4;
const OPACITY_LEN: u64 = 1;
const CONDITIONS_LEN: u64 = 8;
/// Bytes a file may run past a layout's expected length and still match it.
pub const VERSION_TOLERANCE: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LegacyVersion {
    V1,
    V2,
    V3,
    V4,
    V5,
}

type ExpectedLen = fn(u64, u64) -> u64;

/// Historical layouts in writing order, each with its expected file length
/// as a function of `(token_count, fog_cells)`.
const VERSION_TABLE: [(LegacyVersion, ExpectedLen); 5] = [
    (LegacyVersion::V1, v1_len),
    (LegacyVersion::V2, v2_len),
    (LegacyVersion::V3, v3_len),
    (LegacyVersion::V4, v4_len),
    (LegacyVersion::V5, v5_len),
];

fn v1_len(tokens: u64, fog_cells: u64) -> u64 {
    PREFIX_LEN + TOKEN_RECORD_LEN * tokens + fog_cells
}

fn v2_len(tokens: u64, fog_cells: u64) -> u64 {
    v1_len(tokens, fog_cells) + DAMAGE_LEN * tokens
}

fn v3_len(tokens: u64, fog_cells: u64) -> u64 {
    v2_len(tokens, fog_cells) + SQUAD_LEN * tokens
}

fn v4_len(tokens: u64, fog_cells: u64) -> u64 {
    v3_len(tokens, fog_cells) + OPACITY_LEN * tokens
}

fn v5_len(tokens: u64, fog_cells: u64) -> u64 {
    v4_len(tokens, fog_cells) + CONDITIONS_LEN * tokens
}

impl LegacyVersion {
    pub const LATEST: LegacyVersion = LegacyVersion::V5;

    pub fn number(self) -> u8 {
        match self {
            LegacyVersion::V1 => 1,
            LegacyVersion::V2 => 2,
            LegacyVersion::V3 => 3,
            LegacyVersion::V4 => 4,
            LegacyVersion::V5 => 5,
        }
    }

    pub fn expected_len(self, token_count: u64, fog_cells: u64) -> u64 {
        VERSION_TABLE
            .iter()
            .find(|(version, _)| *version == self)
            .map(|(_, expected)| expected(token_count, fog_cells))
            .unwrap_or_else(|| v1_len(token_count, fog_cells))
    }

    /// Best guess at the writer's layout: the newest version whose expected
    /// length is at most `file_len` and within [`VERSION_TOLERANCE`] of it.
    /// This is a heuristic; zero tokens make every layout the same length.
    /// Nothing matching means V1, never an error.
    pub fn detect(file_len: u64, token_count: u64, fog_cells: u64) -> Self {
        VERSION_TABLE
            .iter()
            .rev()
            .find(|(_, expected)| {
                let expected = expected(token_count, fog_cells);
                expected <= file_len && file_len - expected <= VERSION_TOLERANCE
            })
            .map(|(version, _)| *version)
            .unwrap_or(LegacyVersion::V1)
    }
}

impl fmt::Display for LegacyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.number())
    }
}

/// Always writes the newest layout. Drawings are not part of this family.
pub(crate) fn encode(state: &SceneState, assets: &AssetLibraries) -> Vec<u8> {
    let mut out = Vec::<u8>::new();
    SceneHeader::capture(&state.grid, &state.fog, state.camera).write(LEGACY_MAGIC, &mut out);

    let map_label = state
        .map
        .and_then(|handle| assets.maps.label(handle))
        .unwrap_or_default();
    write_path_field(&mut out, map_label);

    out.extend_from_slice(&(state.tokens.len() as u32).to_le_bytes());
    for token in &state.tokens {
        out.extend_from_slice(&token.cell.x.to_le_bytes());
        out.extend_from_slice(&token.cell.y.to_le_bytes());
        out.extend_from_slice(&(token.size() as i32).to_le_bytes());
        out.push(u8::from(token.hidden));
        write_path_field(&mut out, assets.tokens.label(token.image).unwrap_or_default());
    }

    write_fog(&state.fog, &mut out);

    for token in &state.tokens {
        out.extend_from_slice(&token.damage().to_le_bytes());
    }
    for token in &state.tokens {
        out.extend_from_slice(&Squad::to_wire(token.squad).to_le_bytes());
    }
    for token in &state.tokens {
        out.push(token.opacity);
    }
    for token in &state.tokens {
        out.extend_from_slice(&token.conditions.to_flag_bytes());
    }
    if !state.drawings.is_empty() {
        debug!(
            drawings = state.drawings.len(),
            "legacy_save_omits_drawings"
        );
    }
    out
}

fn write_path_field(out: &mut Vec<u8>, label: &str) {
    let label = if label == PLACEHOLDER_LABEL { "" } else { label };
    let clipped = clip_label(label, PATH_FIELD_LEN - 1);
    if clipped.len() < label.len() {
        warn!(path = label, kept = clipped.len(), "legacy_path_truncated");
    }
    let mut field = [0u8; PATH_FIELD_LEN];
    field[..clipped.len()].copy_from_slice(clipped.as_bytes());
    out.extend_from_slice(&field);
}

fn read_path_field(raw: &[u8]) -> String {
    let end = raw.iter().position(|byte| *byte == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

pub(crate) fn decode<A: AssetSink + ?Sized>(
    bytes: &[u8],
    assets: &mut A,
    previous_map: Option<AssetHandle>,
) -> Result<DecodedScene, PersistError> {
    let mut cursor = 0usize;
    let header = SceneHeader::read(bytes, &mut cursor, LEGACY_MAGIC)?;
    let map_path = read_exact(bytes, &mut cursor, PATH_FIELD_LEN, "map path")
        .map_err(|_| invalid_format("truncated map path"))?;
    let token_count = read_u32(bytes, &mut cursor, "token count")
        .map_err(|_| invalid_format("truncated token count"))?;

    let tokens = token_count as u64;
    let fog_cells = header.fog_cells();
    let version = LegacyVersion::detect(bytes.len() as u64, tokens, fog_cells);
    debug!(
        version = %version,
        token_count,
        file_len = bytes.len(),
        "legacy_version_detected"
    );

    let mut warnings = Vec::new();
    let mut state = SceneState {
        map: previous_map,
        camera: header.camera,
        ..SceneState::default()
    };

    let map_label = read_path_field(map_path);
    if map_label.is_empty() {
        state.map = None;
    } else {
        match assets.resolve(AssetKind::Map, Path::new(&map_label)) {
            Ok(handle) => state.map = Some(handle),
            Err(source) => warnings.push(
                PersistError::Decode {
                    label: map_label,
                    source,
                }
                .to_string(),
            ),
        }
    }
    let extent = state
        .map
        .and_then(|handle| assets.extent(AssetKind::Map, handle));
    state.set_grid(header.grid(extent));

    let layout = TrailerLayout::new(tokens, fog_cells);
    let kept = (token_count as usize).min(TOKEN_CAPACITY);
    for index in 0..kept {
        let record_at = PREFIX_LEN + TOKEN_RECORD_LEN * index as u64;
        let base = match read_base_record(bytes, record_at) {
            Ok(base) => base,
            Err(error) => {
                warnings.push(error.to_string());
                break;
            }
        };

        let image = if base.path.is_empty() {
            AssetHandle::PLACEHOLDER
        } else {
            match assets.resolve(AssetKind::Token, Path::new(&base.path)) {
                Ok(handle) => handle,
                Err(source) => {
                    warnings.push(
                        PersistError::Decode {
                            label: base.path.clone(),
                            source,
                        }
                        .to_string(),
                    );
                    AssetHandle::PLACEHOLDER
                }
            }
        };

        let mut token = Token::new(base.cell, image);
        token.set_size(base.size);
        token.hidden = base.hidden;
        let index = index as u64;
        if version >= LegacyVersion::V2 {
            if let Some(damage) = read_at(bytes, layout.damage + DAMAGE_LEN * index, read_i32) {
                token.set_damage(damage);
            }
        }
        if version >= LegacyVersion::V3 {
            if let Some(squad) = read_at(bytes, layout.squad + SQUAD_LEN * index, read_i32) {
                token.squad = Squad::from_wire(squad);
            }
        }
        if version >= LegacyVersion::V4 {
            if let Some(opacity) = read_at(bytes, layout.opacity + OPACITY_LEN * index, read_u8) {
                token.opacity = opacity;
            }
        }
        if version >= LegacyVersion::V5 {
            if let Some(flags) = read_at(
                bytes,
                layout.conditions + CONDITIONS_LEN * index,
                read_array::<8>,
            ) {
                token.conditions = ConditionSet::from_flag_bytes(flags);
            }
        }
        if state.tokens.push(token).is_err() {
            break;
        }
    }
    if token_count as usize > TOKEN_CAPACITY {
        warnings.push(
            PersistError::CapacityExceeded {
                what: "token roster",
                count: token_count as usize,
                capacity: TOKEN_CAPACITY,
            }
            .to_string(),
        );
    }

    match usize::try_from(layout.fog) {
        Ok(mut fog_cursor) => {
            if let Err(error) = read_fog_clipped(
                bytes,
                &mut fog_cursor,
                header.cols,
                header.rows,
                &mut state.fog,
            ) {
                warnings.push(error.to_string());
            }
        }
        Err(_) => warnings.push(
            PersistError::TruncatedRecord { record: "fog row" }.to_string(),
        ),
    }

    Ok(DecodedScene {
        state,
        format: SaveFormat::Legacy,
        legacy_version: Some(version),
        stored_tokens: token_count,
        stored_drawings: 0,
        warnings,
        header,
    })
}

struct BaseRecord {
    cell: GridPoint,
    size: i32,
    hidden: bool,
    path: String,
}

fn read_base_record(bytes: &[u8], offset: u64) -> Result<BaseRecord, PersistError> {
    let mut cursor =
        usize::try_from(offset).map_err(|_| PersistError::TruncatedRecord { record: "token" })?;
    let x = read_i32(bytes, &mut cursor, "token")?;
    let y = read_i32(bytes, &mut cursor, "token")?;
    let size = read_i32(bytes, &mut cursor, "token")?;
    let hidden = read_u8(bytes, &mut cursor, "token")? != 0;
    let path = read_path_field(read_exact(bytes, &mut cursor, PATH_FIELD_LEN, "token")?);
    Ok(BaseRecord {
        cell: GridPoint::new(x, y),
        size,
        hidden,
        path,
    })
}

/// Absolute start of each trailer for a file holding `tokens` records.
struct TrailerLayout {
    fog: u64,
    damage: u64,
    squad: u64,
    opacity: u64,
    conditions: u64,
}

impl TrailerLayout {
    fn new(tokens: u64, fog_cells: u64) -> Self {
        let fog = PREFIX_LEN + TOKEN_RECORD_LEN * tokens;
        let damage = fog + fog_cells;
        let squad = damage + DAMAGE_LEN * tokens;
        let opacity = squad + SQUAD_LEN * tokens;
        let conditions = opacity + OPACITY_LEN * tokens;
        Self {
            fog,
            damage,
            squad,
            opacity,
            conditions,
        }
    }
}

/// Reads one optional field; any failure yields `None` so the caller keeps
/// the default.
fn read_at<T>(
    bytes: &[u8],
    offset: u64,
    read: impl Fn(&[u8], &mut usize, &'static str) -> Result<T, PersistError>,
) -> Option<T> {
    let mut cursor = usize::try_from(offset).ok()?;
    read(bytes, &mut cursor, "token trailer").ok()
}
