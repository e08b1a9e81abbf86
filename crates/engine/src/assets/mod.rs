mod codec;
mod discovery;
mod library;

pub use codec::{decode_bytes, decode_file, encode_png};
pub use discovery::{discover_images, is_supported_image};
pub use library::{
    path_label, AssetError, AssetHandle, AssetKind, AssetLibraries, AssetLibrary, AssetOrigin,
    LIBRARY_CAPACITY, MAX_BLOB_LEN, PLACEHOLDER_LABEL,
};
