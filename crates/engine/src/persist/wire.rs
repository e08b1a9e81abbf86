use crate::scene::{CameraPose, FogGrid, GridSpace};

use super::error::{invalid_format, PersistError};

pub(crate) const EMBEDDED_MAGIC: u32 = 0x5654_5402;
pub(crate) const LEGACY_MAGIC: u32 = 0x5654_5401;
/// magic + grid (5 x u32) + camera (3 x f32)
pub(crate) const HEADER_LEN: usize = 4 + 5 * 4 + 3 * 4;
pub(crate) const MAX_FOG_CELLS: u64 = 16 * 1024 * 1024;

/// Fixed leading block shared by both families.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SceneHeader {
    pub cols: u32,
    pub rows: u32,
    pub cell_size: u32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub camera: CameraPose,
}

impl SceneHeader {
    pub fn capture(grid: &GridSpace, fog: &FogGrid, camera: CameraPose) -> Self {
        let (offset_x, offset_y) = grid.offset();
        Self {
            cols: fog.cols(),
            rows: fog.rows(),
            cell_size: grid.cell_size(),
            offset_x,
            offset_y,
            camera,
        }
    }

    pub fn fog_cells(&self) -> u64 {
        self.cols as u64 * self.rows as u64
    }

    pub fn write(&self, magic: u32, out: &mut Vec<u8>) {
        out.extend_from_slice(&magic.to_le_bytes());
        out.extend_from_slice(&self.cols.to_le_bytes());
        out.extend_from_slice(&self.rows.to_le_bytes());
        out.extend_from_slice(&self.cell_size.to_le_bytes());
        out.extend_from_slice(&self.offset_x.to_le_bytes());
        out.extend_from_slice(&self.offset_y.to_le_bytes());
        out.extend_from_slice(&self.camera.x.to_le_bytes());
        out.extend_from_slice(&self.camera.y.to_le_bytes());
        out.extend_from_slice(&self.camera.zoom.to_le_bytes());
    }

    /// Reads and validates the header. Any failure here rejects the load.
    pub fn read(bytes: &[u8], cursor: &mut usize, magic: u32) -> Result<Self, PersistError> {
        let found = read_u32(bytes, cursor, "header")
            .map_err(|_| invalid_format("file too short for magic"))?;
        if found != magic {
            return Err(invalid_format(format!(
                "unexpected magic 0x{found:08x} (expected 0x{magic:08x})"
            )));
        }
        let header = Self::read_fields(bytes, cursor)
            .map_err(|_| invalid_format("truncated scene header"))?;
        if header.cell_size == 0 {
            return Err(invalid_format("grid cell size is zero"));
        }
        if header.fog_cells() > MAX_FOG_CELLS {
            return Err(invalid_format(format!(
                "fog grid {}x{} exceeds {MAX_FOG_CELLS} cells",
                header.cols, header.rows
            )));
        }
        Ok(header)
    }

    fn read_fields(bytes: &[u8], cursor: &mut usize) -> Result<Self, PersistError> {
        Ok(Self {
            cols: read_u32(bytes, cursor, "header")?,
            rows: read_u32(bytes, cursor, "header")?,
            cell_size: read_u32(bytes, cursor, "header")?,
            offset_x: read_u32(bytes, cursor, "header")?,
            offset_y: read_u32(bytes, cursor, "header")?,
            camera: CameraPose {
                x: read_f32(bytes, cursor, "header")?,
                y: read_f32(bytes, cursor, "header")?,
                zoom: read_f32(bytes, cursor, "header")?,
            }
            .sanitized(),
        })
    }

    /// Grid for the loaded scene: sized to cover the map when its extent is
    /// known, otherwise the stored dimensions.
    pub fn grid(&self, map_extent: Option<(u32, u32)>) -> GridSpace {
        let (offset_x, offset_y) = (self.offset_x as i64, self.offset_y as i64);
        let grid = match map_extent {
            Some((width, height)) => {
                GridSpace::covering(width, height, self.cell_size, offset_x, offset_y)
            }
            None => GridSpace::new(self.cell_size, offset_x, offset_y, self.cols, self.rows),
        };
        grid.unwrap_or_default()
    }
}

pub(crate) fn write_fog(fog: &FogGrid, out: &mut Vec<u8>) {
    for row in fog.rows_iter() {
        out.extend(row.iter().map(|visible| u8::from(*visible)));
    }
}

/// Restores `stored_rows x stored_cols` bytes into `fog`, clipping to its
/// dimensions. Stops quietly at the first short row; cells not restored
/// keep their current value.
pub(crate) fn read_fog_clipped(
    bytes: &[u8],
    cursor: &mut usize,
    stored_cols: u32,
    stored_rows: u32,
    fog: &mut FogGrid,
) -> Result<(), PersistError> {
    let mut scratch = Vec::with_capacity(fog.cols().min(stored_cols) as usize);
    for y in 0..stored_rows {
        let row = read_exact(bytes, cursor, stored_cols as usize, "fog row")?;
        if y >= fog.rows() {
            continue;
        }
        scratch.clear();
        scratch.extend(
            row.iter()
                .take(fog.cols() as usize)
                .map(|byte| *byte != 0),
        );
        fog.restore_row(y, &scratch);
    }
    Ok(())
}

pub(crate) fn read_u8(bytes: &[u8], cursor: &mut usize, record: &'static str) -> Result<u8, PersistError> {
    Ok(read_array::<1>(bytes, cursor, record)?[0])
}

pub(crate) fn read_u32(bytes: &[u8], cursor: &mut usize, record: &'static str) -> Result<u32, PersistError> {
    Ok(u32::from_le_bytes(read_array(bytes, cursor, record)?))
}

pub(crate) fn read_i32(bytes: &[u8], cursor: &mut usize, record: &'static str) -> Result<i32, PersistError> {
    Ok(i32::from_le_bytes(read_array(bytes, cursor, record)?))
}

pub(crate) fn read_f32(bytes: &[u8], cursor: &mut usize, record: &'static str) -> Result<f32, PersistError> {
    Ok(f32::from_le_bytes(read_array(bytes, cursor, record)?))
}

pub(crate) fn read_array<const N: usize>(
    bytes: &[u8],
    cursor: &mut usize,
    record: &'static str,
) -> Result<[u8; N], PersistError> {
    let raw = read_exact(bytes, cursor, N, record)?;
    raw.try_into()
        .map_err(|_| PersistError::TruncatedRecord { record })
}

pub(crate) fn read_exact<'a>(
    bytes: &'a [u8],
    cursor: &mut usize,
    len: usize,
    record: &'static str,
) -> Result<&'a [u8], PersistError> {
    let end = cursor.saturating_add(len);
    if end > bytes.len() {
        return Err(PersistError::TruncatedRecord { record });
    }
    let out = &bytes[*cursor..end];
    *cursor = end;
    Ok(out)
}

/// Longest prefix of `label` that fits in `max_len` bytes without splitting a
/// character.
pub(crate) fn clip_label(label: &str, max_len: usize) -> &str {
    if label.len() <= max_len {
        return label;
    }
    let mut end = max_len;
    while !label.is_char_boundary(end) {
        end -= 1;
    }
    &label[..end]
}

/// Magic of a save image, if it is long enough to carry one.
pub(crate) fn peek_magic(bytes: &[u8]) -> Option<u32> {
    let mut cursor = 0usize;
    read_u32(bytes, &mut cursor, "magic").ok()
}
