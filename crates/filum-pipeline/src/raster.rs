//! Conversions between engine grids and displayable images.
//!
//! The browser paints RGBA buffers straight into canvas `ImageData`, so
//! masks become an opaque red overlay on transparent black and greyscale
//! grids become opaque grey. The `image` conversions feed the bench's
//! overlay output.

use image::GrayImage;

use crate::grid::{BinaryGrid, GreyGrid};
use crate::intensity::RGBA_CHANNELS;

/// Render a mask as opaque red on a transparent background.
#[must_use]
pub fn binary_to_rgba(grid: &BinaryGrid) -> Vec<u8> {
    let mut pixels = vec![0u8; grid.len() * RGBA_CHANNELS];
    for (px, &fg) in pixels.chunks_exact_mut(RGBA_CHANNELS).zip(grid.as_slice()) {
        if fg {
            px[0] = 255;
            px[3] = 255;
        }
    }
    pixels
}

/// Render a greyscale grid as opaque grey RGBA.
#[must_use]
pub fn grey_to_rgba(grid: &GreyGrid) -> Vec<u8> {
    grid.as_slice()
        .iter()
        .flat_map(|&v| [v, v, v, 255])
        .collect()
}

/// Convert a greyscale grid to a `GrayImage`.
///
/// Returns `None` if a dimension does not fit in `u32`.
#[must_use]
pub fn grey_to_image(grid: &GreyGrid) -> Option<GrayImage> {
    let width = u32::try_from(grid.width()).ok()?;
    let height = u32::try_from(grid.height()).ok()?;
    GrayImage::from_raw(width, height, grid.as_slice().to_vec())
}

/// Convert a mask to a `GrayImage` with foreground at 255.
///
/// Returns `None` if a dimension does not fit in `u32`.
#[must_use]
pub fn binary_to_image(grid: &BinaryGrid) -> Option<GrayImage> {
    grey_to_image(&grid.map(|fg| if fg { 255 } else { 0 }))
}
