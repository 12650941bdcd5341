//! filum-pipeline: segmentation, skeletonization and length measurement
//! for elongated structures in micrographs (sans-IO).
//!
//! Converts a raster image into a one-pixel-wide skeleton and its
//! physical length through:
//! greyscale -> contrast -> threshold -> morphology -> component
//! selection -> skeletonization -> length estimation.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and grids and returns structured data. The browser worker
//! lives in `filum-worker`, the command-line front end in `filum-bench`.
//!
//! Every stage is also available as a free function over
//! [`GreyGrid`]/[`BinaryGrid`] for callers that assemble their own flow.

pub mod complex;
pub mod decode;
pub mod diagnostics;
pub mod grid;
pub mod intensity;
pub mod label;
pub mod length;
pub mod lookup;
pub mod morphology;
pub mod pipeline;
pub mod raster;
pub mod skeleton;
pub mod thin;
pub mod threshold;
pub mod types;

pub use complex::{CellComplex, CollapseThresholds};
pub use grid::{BinaryGrid, GreyGrid, Grid, LabelGrid};
pub use lookup::{LookupTable, lookup_table};
pub use morphology::{MorphologyOp, StructuringElement};
pub use pipeline::Pipeline;
pub use skeleton::{SkeletonMethod, Skeletonizer};
pub use types::{
    ContrastMethod, Dimensions, MorphologyStep, PipelineConfig, PipelineError, ProcessResult,
    StagedResult, ThresholdMethod,
};

/// Run the full measurement pipeline.
///
/// Takes raw image bytes (PNG, JPEG, BMP, WebP) and a configuration,
/// then produces a [`ProcessResult`] containing the skeleton, its length
/// and the source image dimensions.
///
/// # Pipeline steps
///
/// 1. Decode image and take the greyscale channel
/// 2. Contrast enhancement
/// 3. Threshold (optionally inverted)
/// 4. Morphological clean-up steps
/// 5. Largest-component selection
/// 6. Skeletonization (pluggable algorithm)
/// 7. Length estimation
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `config` fails validation.
/// Returns [`PipelineError::EmptyInput`] if `image_bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is unrecognized.
pub fn process(
    image_bytes: &[u8],
    config: &PipelineConfig,
) -> Result<ProcessResult, PipelineError> {
    let staged = process_staged(image_bytes, config)?;
    Ok(ProcessResult {
        skeleton: staged.skeleton,
        length: staged.length,
        dimensions: staged.dimensions,
    })
}

/// Run the full pipeline, keeping every intermediate grid.
///
/// # Errors
///
/// Same as [`process`].
pub fn process_staged(
    image_bytes: &[u8],
    config: &PipelineConfig,
) -> Result<StagedResult, PipelineError> {
    config.validate()?;
    Ok(Pipeline::new(image_bytes.to_vec(), config.clone())
        .decode()?
        .greyscale()?
        .enhance()
        .threshold()
        .clean()
        .isolate()
        .skeletonize()
        .measure()
        .into_result())
}
