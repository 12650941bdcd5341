//! Image decoding.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, WebP) and produces the
//! interleaved RGBA buffer the engine's greyscale stage reads from. The
//! browser front end decodes with the canvas API instead and enters the
//! pipeline one stage later, see [`crate::Pipeline::from_rgba`].

use image::RgbaImage;

use crate::types::PipelineError;

/// Decode raw image bytes into an RGBA image.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the format is unrecognised or
/// the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<RgbaImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgba8())
}
