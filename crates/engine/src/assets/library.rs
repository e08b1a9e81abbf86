use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use image::{ImageError, Rgba, RgbaImage};
use thiserror::Error;
use tracing::{debug, warn};

use super::codec::{decode_bytes, decode_file, encode_png};

pub const LIBRARY_CAPACITY: usize = 256;
/// Upper bound for a single embedded image blob.
pub const MAX_BLOB_LEN: usize = 50 * 1024 * 1024;
pub const PLACEHOLDER_LABEL: &str = "<placeholder>";

const PLACEHOLDER_SIZE: u32 = 16;
const PLACEHOLDER_CHECK: u32 = 4;
const PLACEHOLDER_LIGHT: Rgba<u8> = Rgba([220, 60, 200, 255]);
const PLACEHOLDER_DARK: Rgba<u8> = Rgba([30, 30, 36, 255]);

/// Slot index into one [`AssetLibrary`]. Slot 0 is always the placeholder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetHandle(u16);

impl AssetHandle {
    pub const PLACEHOLDER: AssetHandle = AssetHandle(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_placeholder(self) -> bool {
        self == Self::PLACEHOLDER
    }
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read image {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to decode image {label}: {source}")]
    Decode {
        label: String,
        #[source]
        source: ImageError,
    },
    #[error("embedded image {label} has unusable length {len}")]
    BlobLength { label: String, len: usize },
    #[error("asset library is full ({capacity} entries)")]
    CapacityExceeded { capacity: usize },
    #[error("unknown asset handle {0}")]
    UnknownHandle(usize),
}

impl AssetError {
    fn from_image(path: &Path, source: ImageError) -> Self {
        match source {
            ImageError::IoError(source) => AssetError::Io {
                path: path.to_path_buf(),
                source,
            },
            source => AssetError::Decode {
                label: path.display().to_string(),
                source,
            },
        }
    }
}

/// Where a library slot's pixels come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetOrigin {
    Placeholder,
    /// Re-decoded from disk on demand; pixels may be evicted.
    File(PathBuf),
    /// Decoded from a save blob; the label is never read from disk.
    Embedded,
}

#[derive(Debug)]
struct AssetEntry {
    label: String,
    origin: AssetOrigin,
    width: u32,
    height: u32,
    pixels: Option<RgbaImage>,
}

/// Append-only set of decoded images, deduplicated by path label.
#[derive(Debug)]
pub struct AssetLibrary {
    name: &'static str,
    entries: Vec<AssetEntry>,
    by_label: HashMap<String, AssetHandle>,
}

impl AssetLibrary {
    pub fn new(name: &'static str) -> Self {
        let placeholder = placeholder_pixels();
        let mut by_label = HashMap::new();
        by_label.insert(PLACEHOLDER_LABEL.to_string(), AssetHandle::PLACEHOLDER);
        Self {
            name,
            entries: vec![AssetEntry {
                label: PLACEHOLDER_LABEL.to_string(),
                origin: AssetOrigin::Placeholder,
                width: placeholder.width(),
                height: placeholder.height(),
                pixels: Some(placeholder),
            }],
            by_label,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Slot count including the placeholder.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing beyond the placeholder has been loaded.
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn find(&self, label: &str) -> Option<AssetHandle> {
        self.by_label.get(label).copied()
    }

    pub fn label(&self, handle: AssetHandle) -> Option<&str> {
        self.entries
            .get(handle.index())
            .map(|entry| entry.label.as_str())
    }

    pub fn origin(&self, handle: AssetHandle) -> Option<&AssetOrigin> {
        self.entries.get(handle.index()).map(|entry| &entry.origin)
    }

    pub fn dimensions(&self, handle: AssetHandle) -> Option<(u32, u32)> {
        self.entries
            .get(handle.index())
            .map(|entry| (entry.width, entry.height))
    }

    /// Resident pixels, or `None` if the slot is unknown or evicted.
    pub fn pixels(&self, handle: AssetHandle) -> Option<&RgbaImage> {
        self.entries
            .get(handle.index())
            .and_then(|entry| entry.pixels.as_ref())
    }

    pub fn pixels_or_placeholder(&self, handle: AssetHandle) -> &RgbaImage {
        self.pixels(handle)
            .or_else(|| self.pixels(AssetHandle::PLACEHOLDER))
            .unwrap_or_else(|| placeholder_ref())
    }

    pub fn handles(&self) -> impl Iterator<Item = AssetHandle> + '_ {
        (0..self.entries.len()).map(|index| AssetHandle(index as u16))
    }

    /// Returns the existing slot for `path`, or decodes the file into a new one.
    pub fn resolve(&mut self, path: &Path) -> Result<AssetHandle, AssetError> {
        let label = path_label(path);
        if let Some(handle) = self.find(&label) {
            self.ensure_loaded(handle)?;
            return Ok(handle);
        }
        self.ensure_capacity()?;
        let pixels = decode_file(path).map_err(|source| AssetError::from_image(path, source))?;
        let handle = self.insert(label, AssetOrigin::File(path.to_path_buf()), pixels);
        debug!(library = self.name, path = %path.display(), slot = handle.index(), "asset_resolved");
        Ok(handle)
    }

    /// Self-contained PNG blob for a save record. File-backed slots are
    /// re-read from disk so edits to the source are captured; an empty blob
    /// means the asset could not be encoded.
    pub fn embed(&self, handle: AssetHandle) -> Vec<u8> {
        let Some(entry) = self.entries.get(handle.index()) else {
            return Vec::new();
        };
        let fresh = match &entry.origin {
            AssetOrigin::Placeholder => return Vec::new(),
            AssetOrigin::File(path) => match decode_file(path) {
                Ok(pixels) => Some(pixels),
                Err(error) => {
                    debug!(
                        library = self.name,
                        path = %path.display(),
                        error = %error,
                        "asset_reread_failed_using_resident_pixels"
                    );
                    None
                }
            },
            AssetOrigin::Embedded => None,
        };
        let Some(pixels) = fresh.as_ref().or(entry.pixels.as_ref()) else {
            warn!(library = self.name, label = %entry.label, "asset_embed_skipped_no_pixels");
            return Vec::new();
        };
        match encode_png(pixels) {
            Ok(bytes) if bytes.len() <= MAX_BLOB_LEN => bytes,
            Ok(bytes) => {
                warn!(library = self.name, label = %entry.label, len = bytes.len(), "asset_embed_too_large");
                Vec::new()
            }
            Err(error) => {
                warn!(library = self.name, label = %entry.label, error = %error, "asset_embed_failed");
                Vec::new()
            }
        }
    }

    /// Returns the existing slot for `label`, or decodes `bytes` into a new
    /// slot labeled `label`.
    pub fn extract(&mut self, label: &str, bytes: &[u8]) -> Result<AssetHandle, AssetError> {
        if bytes.is_empty() || bytes.len() > MAX_BLOB_LEN {
            return Err(AssetError::BlobLength {
                label: label.to_string(),
                len: bytes.len(),
            });
        }
        if let Some(handle) = self.find(label) {
            if self.ensure_loaded(handle).is_err() {
                self.refill_from_blob(handle, label, bytes)?;
            }
            return Ok(handle);
        }
        self.ensure_capacity()?;
        let pixels = decode_bytes(bytes).map_err(|source| AssetError::Decode {
            label: label.to_string(),
            source,
        })?;
        let handle = self.insert(label.to_string(), AssetOrigin::Embedded, pixels);
        debug!(library = self.name, label, slot = handle.index(), "asset_extracted");
        Ok(handle)
    }

    /// Drops resident pixels for a file-backed slot. Returns whether anything
    /// was released.
    pub fn evict(&mut self, handle: AssetHandle) -> bool {
        match self.entries.get_mut(handle.index()) {
            Some(entry) if matches!(entry.origin, AssetOrigin::File(_)) => {
                entry.pixels.take().is_some()
            }
            _ => false,
        }
    }

    /// Re-decodes an evicted file-backed slot. Leaves the slot untouched on failure.
    pub fn ensure_loaded(&mut self, handle: AssetHandle) -> Result<(), AssetError> {
        let entry = self
            .entries
            .get_mut(handle.index())
            .ok_or(AssetError::UnknownHandle(handle.index()))?;
        if entry.pixels.is_some() {
            return Ok(());
        }
        let AssetOrigin::File(path) = &entry.origin else {
            return Ok(());
        };
        let pixels = decode_file(path).map_err(|source| AssetError::from_image(path, source))?;
        entry.width = pixels.width();
        entry.height = pixels.height();
        entry.pixels = Some(pixels);
        Ok(())
    }

    /// Gives an evicted slot whose source file is gone the pixels carried by
    /// a save record.
    fn refill_from_blob(
        &mut self,
        handle: AssetHandle,
        label: &str,
        bytes: &[u8],
    ) -> Result<(), AssetError> {
        let pixels = decode_bytes(bytes).map_err(|source| AssetError::Decode {
            label: label.to_string(),
            source,
        })?;
        if let Some(entry) = self.entries.get_mut(handle.index()) {
            entry.width = pixels.width();
            entry.height = pixels.height();
            entry.pixels = Some(pixels);
        }
        debug!(library = self.name, label, slot = handle.index(), "asset_refilled_from_blob");
        Ok(())
    }

    fn ensure_capacity(&self) -> Result<(), AssetError> {
        if self.entries.len() >= LIBRARY_CAPACITY {
            return Err(AssetError::CapacityExceeded {
                capacity: LIBRARY_CAPACITY,
            });
        }
        Ok(())
    }

    fn insert(&mut self, label: String, origin: AssetOrigin, pixels: RgbaImage) -> AssetHandle {
        let handle = AssetHandle(self.entries.len() as u16);
        self.by_label.insert(label.clone(), handle);
        self.entries.push(AssetEntry {
            label,
            origin,
            width: pixels.width(),
            height: pixels.height(),
            pixels: Some(pixels),
        });
        handle
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Map,
    Token,
}

/// The two libraries a scene draws from.
#[derive(Debug)]
pub struct AssetLibraries {
    pub maps: AssetLibrary,
    pub tokens: AssetLibrary,
}

impl AssetLibraries {
    pub fn library(&self, kind: AssetKind) -> &AssetLibrary {
        match kind {
            AssetKind::Map => &self.maps,
            AssetKind::Token => &self.tokens,
        }
    }

    pub fn library_mut(&mut self, kind: AssetKind) -> &mut AssetLibrary {
        match kind {
            AssetKind::Map => &mut self.maps,
            AssetKind::Token => &mut self.tokens,
        }
    }
}

impl Default for AssetLibraries {
    fn default() -> Self {
        Self {
            maps: AssetLibrary::new("maps"),
            tokens: AssetLibrary::new("tokens"),
        }
    }
}

pub fn path_label(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn placeholder_pixels() -> RgbaImage {
    RgbaImage::from_fn(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE, |x, y| {
        if (x / PLACEHOLDER_CHECK + y / PLACEHOLDER_CHECK) % 2 == 0 {
            PLACEHOLDER_LIGHT
        } else {
            PLACEHOLDER_DARK
        }
    })
}

fn placeholder_ref() -> &'static RgbaImage {
    static PLACEHOLDER: OnceLock<RgbaImage> = OnceLock::new();
    PLACEHOLDER.get_or_init(placeholder_pixels)
}
