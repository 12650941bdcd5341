//! Shared types for the filum measurement pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::complex::CollapseThresholds;
use crate::grid::{BinaryGrid, GreyGrid};
use crate::intensity::{adaptive_contrast, contrast_limited_adaptive};
use crate::length::DEFAULT_CALIBRATION;
use crate::morphology::{MorphologyOp, StructuringElement};
use crate::skeleton::SkeletonMethod;
use crate::threshold::{threshold_adaptive, threshold_limited_adaptive, threshold_range};

/// Re-export `RgbaImage` so downstream crates can hold decoded images
/// without depending on `image` directly.
pub use image::RgbaImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
}

/// Local contrast enhancement applied before thresholding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContrastMethod {
    /// Leave intensities untouched.
    None,
    /// Local-rank stretch over a `(2·radius+1)²` window.
    Adaptive { radius: usize },
    /// Local-rank stretch with per-intensity clipping, blended towards the
    /// global mean in flat windows.
    ClipLimited { radius: usize, clip: u32 },
}

impl ContrastMethod {
    pub const DEFAULT_RADIUS: usize = 8;
    pub const DEFAULT_CLIP: u32 = 3;

    /// Apply this enhancement.
    #[must_use = "returns the enhanced grid"]
    pub fn apply(&self, grid: &GreyGrid) -> GreyGrid {
        match *self {
            Self::None => grid.clone(),
            Self::Adaptive { radius } => adaptive_contrast(grid, radius),
            Self::ClipLimited { radius, clip } => contrast_limited_adaptive(grid, radius, clip),
        }
    }
}

impl Default for ContrastMethod {
    fn default() -> Self {
        Self::ClipLimited {
            radius: Self::DEFAULT_RADIUS,
            clip: Self::DEFAULT_CLIP,
        }
    }
}

impl fmt::Display for ContrastMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Adaptive { radius } => write!(f, "adaptive (radius {radius})"),
            Self::ClipLimited { radius, clip } => {
                write!(f, "clip-limited adaptive (radius {radius}, clip {clip})")
            }
        }
    }
}

/// Greyscale to binary conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThresholdMethod {
    /// Foreground iff `min <= value <= max`.
    Range { min: u8, max: u8 },
    /// Foreground iff `value > localMean + offset` (zero-padded window).
    Adaptive { radius: usize, offset: i32 },
    /// Foreground iff `value` exceeds the clip-limited blend of local and
    /// global mean plus `offset` (mirror-padded window).
    ClipLimited { radius: usize, offset: i32, clip: u32 },
}

impl ThresholdMethod {
    pub const DEFAULT_RADIUS: usize = 8;
    pub const DEFAULT_OFFSET: i32 = 30;

    /// Apply this threshold.
    #[must_use = "returns the binary mask"]
    pub fn apply(&self, grid: &GreyGrid) -> BinaryGrid {
        match *self {
            Self::Range { min, max } => threshold_range(grid, min, max),
            Self::Adaptive { radius, offset } => threshold_adaptive(grid, radius, offset),
            Self::ClipLimited {
                radius,
                offset,
                clip,
            } => threshold_limited_adaptive(grid, radius, offset, clip),
        }
    }
}

impl Default for ThresholdMethod {
    fn default() -> Self {
        Self::Adaptive {
            radius: Self::DEFAULT_RADIUS,
            offset: Self::DEFAULT_OFFSET,
        }
    }
}

impl fmt::Display for ThresholdMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range { min, max } => write!(f, "range {min}..={max}"),
            Self::Adaptive { radius, offset } => {
                write!(f, "adaptive (radius {radius}, offset {offset})")
            }
            Self::ClipLimited {
                radius,
                offset,
                clip,
            } => write!(
                f,
                "clip-limited adaptive (radius {radius}, offset {offset}, clip {clip})"
            ),
        }
    }
}

/// One morphological clean-up step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MorphologyStep {
    pub op: MorphologyOp,
    #[serde(default)]
    pub element: StructuringElement,
    pub iterations: usize,
}

impl MorphologyStep {
    /// Apply this step.
    #[must_use = "returns the transformed grid"]
    pub fn apply(&self, grid: &BinaryGrid) -> BinaryGrid {
        self.op.apply(grid, self.element, self.iterations)
    }
}

impl fmt::Display for MorphologyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ×{}", self.op, self.element, self.iterations)
    }
}

/// Configuration for the measurement pipeline.
///
/// Defaults reproduce the one-click automatic flow: clip-limited contrast
/// (radius 8, clip 3), adaptive threshold (radius 8, offset 30), one
/// square closing, keep the largest component, cell-complex thinning,
/// then measure at half scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Contrast enhancement before thresholding.
    pub contrast: ContrastMethod,

    /// Greyscale to binary conversion.
    pub threshold: ThresholdMethod,

    /// Swap foreground and background after thresholding. For dark
    /// structures on a bright field.
    pub invert: bool,

    /// Morphological clean-up steps, applied in order.
    pub morphology: Vec<MorphologyStep>,

    /// Keep only this many of the largest components. `None` keeps all.
    pub keep_components: Option<usize>,

    /// Adjacency used when selecting components.
    pub connectivity: StructuringElement,

    /// Thinning algorithm.
    pub skeleton: SkeletonMethod,

    /// Ratio of the analysed image size to the native imaging resolution
    /// (0.5 when the image was downsampled by half for display).
    pub scale: f64,

    /// Pixels per physical unit at native resolution.
    pub calibration: f64,
}

impl PipelineConfig {
    pub const DEFAULT_KEEP_COMPONENTS: usize = 1;
    pub const DEFAULT_SCALE: f64 = 0.5;
    pub const DEFAULT_CALIBRATION: f64 = DEFAULT_CALIBRATION;

    /// The default clean-up: one square closing.
    #[must_use]
    pub fn default_morphology() -> Vec<MorphologyStep> {
        vec![MorphologyStep {
            op: MorphologyOp::Close,
            element: StructuringElement::Square,
            iterations: 1,
        }]
    }

    /// Check the configuration for values no stage can work with.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));

        if let ContrastMethod::ClipLimited { clip: 0, .. } = self.contrast {
            return invalid("contrast clip limit must be at least 1".to_string());
        }
        match self.threshold {
            ThresholdMethod::Range { min, max } if min > max => {
                return invalid(format!("threshold min ({min}) exceeds max ({max})"));
            }
            ThresholdMethod::ClipLimited { clip: 0, .. } => {
                return invalid("threshold clip limit must be at least 1".to_string());
            }
            _ => {}
        }
        if self.keep_components == Some(0) {
            return invalid("keep_components must be at least 1".to_string());
        }
        if let SkeletonMethod::CellComplex { thresholds } = self.skeleton {
            validate_thresholds(&thresholds).or_else(invalid)?;
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return invalid(format!("scale must be positive, got {}", self.scale));
        }
        if !(self.calibration.is_finite() && self.calibration > 0.0) {
            return invalid(format!(
                "calibration must be positive, got {}",
                self.calibration
            ));
        }
        Ok(())
    }
}

fn validate_thresholds(thresholds: &CollapseThresholds) -> Result<(), String> {
    if (0.0..1.0).contains(&thresholds.min_survival) {
        Ok(())
    } else {
        Err(format!(
            "collapse min_survival must be in [0, 1), got {}",
            thresholds.min_survival
        ))
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            contrast: ContrastMethod::default(),
            threshold: ThresholdMethod::default(),
            invert: false,
            morphology: Self::default_morphology(),
            keep_components: Some(Self::DEFAULT_KEEP_COMPONENTS),
            connectivity: StructuringElement::Square,
            skeleton: SkeletonMethod::default(),
            scale: Self::DEFAULT_SCALE,
            calibration: Self::DEFAULT_CALIBRATION,
        }
    }
}

/// Every intermediate grid of one pipeline run, plus the measured length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedResult {
    /// Greyscale extracted from the source.
    pub greyscale: GreyGrid,
    /// After contrast enhancement.
    pub enhanced: GreyGrid,
    /// Thresholded (and optionally inverted) mask.
    pub thresholded: BinaryGrid,
    /// After morphological clean-up.
    pub cleaned: BinaryGrid,
    /// After largest-component selection.
    pub isolated: BinaryGrid,
    /// One-pixel-wide skeleton.
    pub skeleton: BinaryGrid,
    /// Skeleton length in physical units.
    pub length: f64,
    /// Source image dimensions in pixels.
    pub dimensions: Dimensions,
}

/// Final output of [`crate::process`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessResult {
    pub skeleton: BinaryGrid,
    pub length: f64,
    pub dimensions: Dimensions,
}

/// Errors that can occur during pipeline processing.
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde traits. The `ImageDecode` variant is
/// serialized as its `Display` string.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// An RGBA buffer does not match its stated dimensions.
    #[error("pixel buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

/// Serde-compatible proxy for `PipelineError`.
///
/// A deserialized `ImageDecode` comes back as `InvalidConfig` carrying the
/// original message, since `image::ImageError` cannot be rebuilt.
#[derive(Serialize, Deserialize)]
enum PipelineErrorProxy {
    ImageDecode(String),
    EmptyInput,
    BufferSize { expected: usize, actual: usize },
    InvalidConfig(String),
}

impl Serialize for PipelineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::ImageDecode(e) => PipelineErrorProxy::ImageDecode(e.to_string()),
            Self::EmptyInput => PipelineErrorProxy::EmptyInput,
            Self::BufferSize { expected, actual } => PipelineErrorProxy::BufferSize {
                expected: *expected,
                actual: *actual,
            },
            Self::InvalidConfig(s) => PipelineErrorProxy::InvalidConfig(s.clone()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = PipelineErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            PipelineErrorProxy::ImageDecode(msg) => {
                Self::InvalidConfig(format!("image decode error: {msg}"))
            }
            PipelineErrorProxy::EmptyInput => Self::EmptyInput,
            PipelineErrorProxy::BufferSize { expected, actual } => {
                Self::BufferSize { expected, actual }
            }
            PipelineErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_the_automatic_flow() {
        let config = PipelineConfig::default();
        assert_eq!(
            config.contrast,
            ContrastMethod::ClipLimited { radius: 8, clip: 3 }
        );
        assert_eq!(
            config.threshold,
            ThresholdMethod::Adaptive {
                radius: 8,
                offset: 30
            }
        );
        assert_eq!(config.morphology.len(), 1);
        assert_eq!(config.morphology[0].op, MorphologyOp::Close);
        assert_eq!(config.keep_components, Some(1));
        assert!((config.scale - 0.5).abs() < f64::EPSILON);
        assert!((config.calibration - 3.06).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_json_round_trip() {
        let config = PipelineConfig {
            contrast: ContrastMethod::Adaptive { radius: 3 },
            threshold: ThresholdMethod::Range { min: 40, max: 200 },
            invert: true,
            skeleton: SkeletonMethod::Pixel,
            keep_components: None,
            ..PipelineConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn partial_config_json_uses_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"threshold":{"kind":"range","min":10,"max":90}}"#).unwrap();
        assert_eq!(config.threshold, ThresholdMethod::Range { min: 10, max: 90 });
        assert_eq!(config.contrast, ContrastMethod::default());
        assert_eq!(config.morphology, PipelineConfig::default_morphology());
    }

    #[test]
    fn morphology_step_element_defaults_to_square() {
        let step: MorphologyStep =
            serde_json::from_str(r#"{"op":"open","iterations":2}"#).unwrap();
        assert_eq!(step.element, StructuringElement::Square);
        assert_eq!(step.to_string(), "open square ×2");
    }

    #[test]
    fn validate_rejects_inverted_range() {
        let config = PipelineConfig {
            threshold: ThresholdMethod::Range { min: 200, max: 100 },
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(ref s)) if s.contains("exceeds")
        ));
    }

    #[test]
    fn validate_rejects_zero_clip() {
        let config = PipelineConfig {
            contrast: ContrastMethod::ClipLimited { radius: 4, clip: 0 },
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
        let config = PipelineConfig {
            threshold: ThresholdMethod::ClipLimited {
                radius: 4,
                offset: 0,
                clip: 0,
            },
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_scale_and_calibration() {
        for scale in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let config = PipelineConfig {
                scale,
                ..PipelineConfig::default()
            };
            assert!(config.validate().is_err(), "scale {scale}");
        }
        let config = PipelineConfig {
            calibration: 0.0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_survival() {
        let config = PipelineConfig {
            skeleton: SkeletonMethod::CellComplex {
                thresholds: CollapseThresholds {
                    min_age: 4,
                    min_survival: 1.5,
                },
            },
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_keeping_zero_components() {
        let config = PipelineConfig {
            keep_components: Some(0),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn method_display() {
        assert_eq!(ContrastMethod::None.to_string(), "none");
        assert_eq!(
            ThresholdMethod::default().to_string(),
            "adaptive (radius 8, offset 30)"
        );
    }

    #[test]
    fn contrast_none_is_identity() {
        let grid = GreyGrid::from_fn(4, 4, |row, col| u8::try_from(row * 4 + col).unwrap());
        assert_eq!(ContrastMethod::None.apply(&grid), grid);
    }

    // --- PipelineError tests ---

    #[test]
    fn error_display() {
        let err = PipelineError::BufferSize {
            expected: 16,
            actual: 12,
        };
        assert_eq!(err.to_string(), "pixel buffer holds 12 bytes, expected 16");
        assert_eq!(PipelineError::EmptyInput.to_string(), "input image data is empty");
    }

    #[test]
    fn error_serde_round_trip() {
        let err = PipelineError::BufferSize {
            expected: 8,
            actual: 4,
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: PipelineError = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            back,
            PipelineError::BufferSize {
                expected: 8,
                actual: 4
            }
        ));

        let json = serde_json::to_string(&PipelineError::InvalidConfig("bad".into())).unwrap();
        let back: PipelineError = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, PipelineError::InvalidConfig(ref s) if s == "bad"));
    }

    #[test]
    fn image_decode_error_serializes_as_message() {
        let decode_err = image::load_from_memory(&[0xFF, 0x00]).unwrap_err();
        let err = PipelineError::from(decode_err);
        let json = serde_json::to_string(&err).unwrap();
        let back: PipelineError = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, PipelineError::InvalidConfig(ref s) if s.starts_with("image decode error")));
    }

    #[test]
    fn staged_result_json_round_trip() {
        let mut skeleton = BinaryGrid::new(3, 2);
        skeleton[(1, 1)] = true;
        let staged = StagedResult {
            greyscale: GreyGrid::filled(3, 2, 9),
            enhanced: GreyGrid::filled(3, 2, 0),
            thresholded: BinaryGrid::new(3, 2),
            cleaned: BinaryGrid::new(3, 2),
            isolated: skeleton.clone(),
            skeleton,
            length: 1.25,
            dimensions: Dimensions {
                width: 3,
                height: 2,
            },
        };
        let json = serde_json::to_string(&staged).unwrap();
        let back: StagedResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, staged);
    }
}
