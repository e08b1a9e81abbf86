use std::io::Cursor;
use std::path::Path;

use image::{ImageFormat, ImageReader, ImageResult, RgbaImage};

pub fn decode_file(path: &Path) -> ImageResult<RgbaImage> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    Ok(reader.decode()?.to_rgba8())
}

pub fn decode_bytes(bytes: &[u8]) -> ImageResult<RgbaImage> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

/// Lossless PNG. The same pixels always encode to the same bytes.
pub fn encode_png(pixels: &RgbaImage) -> ImageResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::<u8>::new());
    pixels.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}
