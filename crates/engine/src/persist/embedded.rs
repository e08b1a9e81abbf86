//! Self-contained save family: every image travels inside the file as PNG.
//!
//! ```text
//! header            (see wire::SceneHeader)
//! map               asset record
//! token_count: u32
//! tokens            grid_x, grid_y, size, damage, squad: i32
//!                   opacity: u8, hidden: u8, conditions: [u8; 8], asset record
//! fog               rows x cols u8, row-major
//! drawing_count: u32 (optional; clean EOF means none)
//! drawings          shape: u8, color: u8, x1, y1, x2, y2: i32
//!
//! asset record      path_len: u32, path, blob_len: u32, blob
//! ```

use tracing::debug;

use crate::assets::{AssetHandle, AssetKind, AssetLibraries, MAX_BLOB_LEN, PLACEHOLDER_LABEL};
use crate::scene::{
    ConditionSet, Drawing, GridPoint, SceneState, Shape, Squad, Token, WorldPoint,
    DRAWING_CAPACITY, TOKEN_CAPACITY,
};

use super::error::{invalid_format, PersistError};
use super::wire::{
    clip_label, read_array, read_exact, read_fog_clipped, read_i32, read_u32, read_u8,
    write_fog, SceneHeader, EMBEDDED_MAGIC,
};
use super::{AssetSink, DecodedScene, SaveFormat};

pub(crate) const MAX_LABEL_LEN: usize = 4096;
/// Token fields ahead of the asset record.
const TOKEN_FIXED_LEN: usize = 5 * 4 + 2 + 8;

pub(crate) fn encode(state: &SceneState, assets: &AssetLibraries) -> Vec<u8> {
    let mut out = Vec::<u8>::new();
    SceneHeader::capture(&state.grid, &state.fog, state.camera).write(EMBEDDED_MAGIC, &mut out);

    match state.map {
        Some(handle) => write_asset(&mut out, assets, AssetKind::Map, handle),
        None => write_asset_record(&mut out, "", &[]),
    }

    out.extend_from_slice(&(state.tokens.len() as u32).to_le_bytes());
    for token in &state.tokens {
        out.extend_from_slice(&token.cell.x.to_le_bytes());
        out.extend_from_slice(&token.cell.y.to_le_bytes());
        out.extend_from_slice(&(token.size() as i32).to_le_bytes());
        out.extend_from_slice(&token.damage().to_le_bytes());
        out.extend_from_slice(&Squad::to_wire(token.squad).to_le_bytes());
        out.push(token.opacity);
        out.push(u8::from(token.hidden));
        out.extend_from_slice(&token.conditions.to_flag_bytes());
        write_asset(&mut out, assets, AssetKind::Token, token.image);
    }

    write_fog(&state.fog, &mut out);

    out.extend_from_slice(&(state.drawings.len() as u32).to_le_bytes());
    for drawing in &state.drawings {
        out.push(drawing.shape.to_wire());
        out.push(drawing.color());
        out.extend_from_slice(&drawing.start.x.to_le_bytes());
        out.extend_from_slice(&drawing.start.y.to_le_bytes());
        out.extend_from_slice(&drawing.end.x.to_le_bytes());
        out.extend_from_slice(&drawing.end.y.to_le_bytes());
    }
    out
}

fn write_asset(out: &mut Vec<u8>, assets: &AssetLibraries, kind: AssetKind, handle: AssetHandle) {
    let library = assets.library(kind);
    let label = library.label(handle).unwrap_or_default();
    let blob = library.embed(handle);
    write_asset_record(out, label, &blob);
}

fn write_asset_record(out: &mut Vec<u8>, label: &str, blob: &[u8]) {
    let label = clip_label(label, MAX_LABEL_LEN);
    out.extend_from_slice(&(label.len() as u32).to_le_bytes());
    out.extend_from_slice(label.as_bytes());
    out.extend_from_slice(&(blob.len() as u32).to_le_bytes());
    out.extend_from_slice(blob);
}

pub(crate) fn decode<A: AssetSink + ?Sized>(
    bytes: &[u8],
    assets: &mut A,
    previous_map: Option<AssetHandle>,
) -> Result<DecodedScene, PersistError> {
    let mut cursor = 0usize;
    let header = SceneHeader::read(bytes, &mut cursor, EMBEDDED_MAGIC)?;

    let mut state = SceneState {
        map: previous_map,
        camera: header.camera,
        ..SceneState::default()
    };
    let extent = previous_map.and_then(|handle| assets.extent(AssetKind::Map, handle));
    state.set_grid(header.grid(extent));

    let mut reader = BodyReader {
        bytes,
        cursor,
        header,
        assets,
        state,
        warnings: Vec::new(),
        stored_tokens: 0,
        stored_drawings: 0,
    };
    if let Err(error) = reader.read_body() {
        reader.warnings.push(error.to_string());
    }

    Ok(DecodedScene {
        state: reader.state,
        format: SaveFormat::Embedded,
        legacy_version: None,
        stored_tokens: reader.stored_tokens,
        stored_drawings: reader.stored_drawings,
        warnings: reader.warnings,
        header,
    })
}

struct AssetRecord<'a> {
    label: String,
    blob: &'a [u8],
}

impl AssetRecord<'_> {
    /// Records written for the placeholder or for a missing map carry no blob
    /// and need no diagnostic.
    fn is_intentionally_empty(&self) -> bool {
        self.blob.is_empty() && (self.label.is_empty() || self.label == PLACEHOLDER_LABEL)
    }
}

struct BodyReader<'a, 'b, A: AssetSink + ?Sized> {
    bytes: &'a [u8],
    cursor: usize,
    header: SceneHeader,
    assets: &'b mut A,
    state: SceneState,
    warnings: Vec<String>,
    stored_tokens: u32,
    stored_drawings: u32,
}

impl<'a, A: AssetSink + ?Sized> BodyReader<'a, '_, A> {
    /// Reads everything after the header. An error stops reading; whatever
    /// was restored before it stays in the scene.
    fn read_body(&mut self) -> Result<(), PersistError> {
        self.read_map()?;
        self.read_tokens()?;
        read_fog_clipped(
            self.bytes,
            &mut self.cursor,
            self.header.cols,
            self.header.rows,
            &mut self.state.fog,
        )?;
        self.read_drawings()
    }

    fn read_map(&mut self) -> Result<(), PersistError> {
        let record = self.read_asset_record("map")?;
        if record.label.is_empty() && record.blob.is_empty() {
            // Saved without a map: the stored grid stands on its own.
            self.state.map = None;
            self.state.set_grid(self.header.grid(None));
            return Ok(());
        }
        if record.blob.is_empty() {
            if !record.is_intentionally_empty() {
                self.warnings
                    .push(format!("map {} was saved without image data", record.label));
            }
            return Ok(());
        }
        match self.assets.extract(AssetKind::Map, &record.label, record.blob) {
            Ok(handle) => {
                self.state.map = Some(handle);
                let extent = self.assets.extent(AssetKind::Map, handle);
                self.state.set_grid(self.header.grid(extent));
            }
            Err(source) => self.warnings.push(
                PersistError::Decode {
                    label: record.label,
                    source,
                }
                .to_string(),
            ),
        }
        Ok(())
    }

    fn read_tokens(&mut self) -> Result<(), PersistError> {
        self.stored_tokens = read_u32(self.bytes, &mut self.cursor, "token count")?;
        let mut dropped = 0usize;
        for _ in 0..self.stored_tokens {
            let keep = !self.state.tokens.is_full();
            let token = self.read_token(keep)?;
            if !keep || self.state.tokens.push(token).is_err() {
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!(
                stored = self.stored_tokens,
                dropped, "embedded_tokens_dropped_over_capacity"
            );
            self.warnings.push(
                PersistError::CapacityExceeded {
                    what: "token roster",
                    count: self.stored_tokens as usize,
                    capacity: TOKEN_CAPACITY,
                }
                .to_string(),
            );
        }
        Ok(())
    }

    /// Parses one token record. Images of records that will be dropped are
    /// skipped without decoding.
    fn read_token(&mut self, keep: bool) -> Result<Token, PersistError> {
        let bytes = self.bytes;
        let cursor = &mut self.cursor;
        let x = read_i32(bytes, cursor, "token")?;
        let y = read_i32(bytes, cursor, "token")?;
        let size = read_i32(bytes, cursor, "token")?;
        let damage = read_i32(bytes, cursor, "token")?;
        let squad = read_i32(bytes, cursor, "token")?;
        let opacity = read_u8(bytes, cursor, "token")?;
        let hidden = read_u8(bytes, cursor, "token")?;
        let conditions = read_array::<8>(bytes, cursor, "token")?;
        let record = self.read_asset_record("token image")?;

        let image = if !keep {
            AssetHandle::PLACEHOLDER
        } else if record.blob.is_empty() {
            if !record.is_intentionally_empty() {
                self.warnings
                    .push(format!("token image {} was saved without data", record.label));
            }
            AssetHandle::PLACEHOLDER
        } else {
            match self.assets.extract(AssetKind::Token, &record.label, record.blob) {
                Ok(handle) => handle,
                Err(source) => {
                    self.warnings.push(
                        PersistError::Decode {
                            label: record.label,
                            source,
                        }
                        .to_string(),
                    );
                    AssetHandle::PLACEHOLDER
                }
            }
        };

        let mut token = Token::new(GridPoint::new(x, y), image);
        token.set_size(size);
        token.set_damage(damage);
        token.squad = Squad::from_wire(squad);
        token.opacity = opacity;
        token.hidden = hidden != 0;
        token.conditions = ConditionSet::from_flag_bytes(conditions);
        Ok(token)
    }

    fn read_drawings(&mut self) -> Result<(), PersistError> {
        if self.cursor == self.bytes.len() {
            return Ok(());
        }
        self.stored_drawings = read_u32(self.bytes, &mut self.cursor, "drawing count")?;
        for _ in 0..self.stored_drawings {
            let bytes = self.bytes;
            let cursor = &mut self.cursor;
            let shape = Shape::from_wire(read_u8(bytes, cursor, "drawing")?);
            let color = read_u8(bytes, cursor, "drawing")?;
            let start = WorldPoint::new(
                read_i32(bytes, cursor, "drawing")?,
                read_i32(bytes, cursor, "drawing")?,
            );
            let end = WorldPoint::new(
                read_i32(bytes, cursor, "drawing")?,
                read_i32(bytes, cursor, "drawing")?,
            );
            if self
                .state
                .drawings
                .push(Drawing::new(shape, start, end, color))
                .is_err()
            {
                self.warnings.push(
                    PersistError::CapacityExceeded {
                        what: "drawing roster",
                        count: self.stored_drawings as usize,
                        capacity: DRAWING_CAPACITY,
                    }
                    .to_string(),
                );
                break;
            }
        }
        Ok(())
    }

    fn read_asset_record(&mut self, record: &'static str) -> Result<AssetRecord<'a>, PersistError> {
        let bytes = self.bytes;
        let label_len = read_u32(bytes, &mut self.cursor, record)? as usize;
        if label_len > MAX_LABEL_LEN {
            return Err(invalid_format(format!(
                "{record} path length {label_len} exceeds {MAX_LABEL_LEN}"
            )));
        }
        let label = String::from_utf8_lossy(read_exact(bytes, &mut self.cursor, label_len, record)?)
            .into_owned();
        let blob_len = read_u32(bytes, &mut self.cursor, record)? as usize;
        if blob_len > MAX_BLOB_LEN {
            return Err(invalid_format(format!(
                "{record} {label} blob length {blob_len} exceeds {MAX_BLOB_LEN}"
            )));
        }
        let blob = read_exact(bytes, &mut self.cursor, blob_len, record)?;
        Ok(AssetRecord { label, blob })
    }
}
