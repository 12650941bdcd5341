//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! Unlike [`crate::process_staged`] which runs the entire pipeline in one
//! call, [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use filum_pipeline::{Pipeline, PipelineConfig, PipelineError};
//! # fn run(png: Vec<u8>) -> Result<(), PipelineError> {
//! let config = PipelineConfig::default();
//! let pipeline = Pipeline::new(png, config)
//!     .decode()?
//!     .greyscale()?
//!     .enhance()
//!     .threshold()
//!     .clean()
//!     .isolate()
//!     .skeletonize()
//!     .measure();
//!
//! let staged = pipeline.into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next pipeline state
//! (or `Result` for fallible stages), carrying all previously computed
//! intermediates. The caller can inspect the current stage's output via
//! accessor methods at any point.
//!
//! Front ends that decode images themselves (the browser canvas) enter
//! with [`Pipeline::from_rgba`], which starts at [`Decoded`].
//!
//! # Memory
//!
//! Every stage retains the grids computed before it, since
//! [`StagedResult`] hands all of them back for display. Each grid costs
//! one byte per pixel, so a 2000×2000 micrograph pins roughly 24 MB until
//! [`Measured::into_result`] consumes the final stage. Callers that only
//! need the skeleton and its length should prefer [`crate::process`].

use crate::diagnostics::{StageMetrics, mean_intensity};
use crate::grid::{BinaryGrid, GreyGrid};
use crate::label::{label_components, largest_from_labels};
use crate::length::measure_length;
use crate::lookup::lookup_table;
use crate::skeleton::Skeletonizer;
use crate::types::{Dimensions, PipelineConfig, PipelineError, StagedResult};

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// The source image bytes and config are stored but not yet touched.
/// Call [`decode`](Self::decode) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .decode() to continue"]
pub struct Pending {
    config: PipelineConfig,
    source: Vec<u8>,
}

impl Pending {
    /// The raw source image bytes.
    #[must_use]
    pub fn source(&self) -> &[u8] {
        &self.source
    }

    /// Decode the source image and advance to the [`Decoded`] stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyInput`] if the source bytes are
    /// empty. Returns [`PipelineError::ImageDecode`] if the image
    /// format is unrecognized or the data is corrupt.
    #[allow(clippy::cast_possible_truncation)]
    pub fn decode(self) -> Result<Decoded, PipelineError> {
        let source_len = self.source.len();
        let image = crate::decode::decode(&self.source)?;
        let dimensions = Dimensions {
            width: image.width() as usize,
            height: image.height() as usize,
        };
        log::debug!(
            "decoded {source_len} bytes into {}x{} image",
            dimensions.width,
            dimensions.height
        );
        Ok(Decoded {
            config: self.config,
            rgba: image.into_raw(),
            dimensions,
            source_len,
        })
    }
}

// ───────────────────────── Stage 1: Decoded ──────────────────────────

/// Pipeline state holding an interleaved RGBA buffer.
///
/// Call [`greyscale`](Self::greyscale) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .greyscale() to continue"]
pub struct Decoded {
    config: PipelineConfig,
    rgba: Vec<u8>,
    dimensions: Dimensions,
    source_len: usize,
}

impl Decoded {
    /// The interleaved RGBA pixels.
    #[must_use]
    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    /// Image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Validate the config, extract greyscale, and advance to
    /// [`Greyscaled`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the config fails
    /// [`PipelineConfig::validate`], and [`PipelineError::BufferSize`] if
    /// the RGBA buffer does not hold `width · height · 4` bytes.
    pub fn greyscale(self) -> Result<Greyscaled, PipelineError> {
        self.config.validate()?;
        let greyscale = crate::intensity::to_greyscale(
            &self.rgba,
            self.dimensions.width,
            self.dimensions.height,
        )?;
        Ok(Greyscaled {
            config: self.config,
            dimensions: self.dimensions,
            greyscale,
        })
    }
}

// ───────────────────────── Stage 2: Greyscaled ───────────────────────

/// Pipeline state after greyscale extraction.
///
/// Call [`enhance`](Self::enhance) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .enhance() to continue"]
pub struct Greyscaled {
    config: PipelineConfig,
    dimensions: Dimensions,
    greyscale: GreyGrid,
}

impl Greyscaled {
    /// The greyscale grid.
    #[must_use]
    pub const fn greyscale(&self) -> &GreyGrid {
        &self.greyscale
    }

    /// Apply contrast enhancement and advance to [`Enhanced`].
    pub fn enhance(self) -> Enhanced {
        let enhanced = self.config.contrast.apply(&self.greyscale);
        Enhanced {
            config: self.config,
            dimensions: self.dimensions,
            greyscale: self.greyscale,
            enhanced,
        }
    }
}

// ───────────────────────── Stage 3: Enhanced ─────────────────────────

/// Pipeline state after contrast enhancement.
///
/// Call [`threshold`](Self::threshold) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .threshold() to continue"]
pub struct Enhanced {
    config: PipelineConfig,
    dimensions: Dimensions,
    greyscale: GreyGrid,
    enhanced: GreyGrid,
}

impl Enhanced {
    /// The enhanced greyscale grid.
    #[must_use]
    pub const fn enhanced(&self) -> &GreyGrid {
        &self.enhanced
    }

    /// Threshold (and optionally invert) the enhanced grid, advancing to
    /// [`Thresholded`].
    pub fn threshold(self) -> Thresholded {
        let mask = self.config.threshold.apply(&self.enhanced);
        let thresholded = if self.config.invert { mask.invert() } else { mask };
        log::debug!(
            "threshold {} kept {} of {} pixels",
            self.config.threshold,
            thresholded.count_foreground(),
            thresholded.len()
        );
        Thresholded {
            config: self.config,
            dimensions: self.dimensions,
            greyscale: self.greyscale,
            enhanced: self.enhanced,
            thresholded,
        }
    }
}

// ───────────────────────── Stage 4: Thresholded ──────────────────────

/// Pipeline state after thresholding.
///
/// Call [`clean`](Self::clean) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .clean() to continue"]
pub struct Thresholded {
    config: PipelineConfig,
    dimensions: Dimensions,
    greyscale: GreyGrid,
    enhanced: GreyGrid,
    thresholded: BinaryGrid,
}

impl Thresholded {
    /// The thresholded mask.
    #[must_use]
    pub const fn thresholded(&self) -> &BinaryGrid {
        &self.thresholded
    }

    /// Run the morphological clean-up steps in order and advance to
    /// [`Cleaned`].
    pub fn clean(self) -> Cleaned {
        let cleaned = self
            .config
            .morphology
            .iter()
            .fold(self.thresholded.clone(), |grid, step| step.apply(&grid));
        Cleaned {
            config: self.config,
            dimensions: self.dimensions,
            greyscale: self.greyscale,
            enhanced: self.enhanced,
            thresholded: self.thresholded,
            cleaned,
        }
    }
}

// ───────────────────────── Stage 5: Cleaned ──────────────────────────

/// Pipeline state after morphological clean-up.
///
/// Call [`isolate`](Self::isolate) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .isolate() to continue"]
pub struct Cleaned {
    config: PipelineConfig,
    dimensions: Dimensions,
    greyscale: GreyGrid,
    enhanced: GreyGrid,
    thresholded: BinaryGrid,
    cleaned: BinaryGrid,
}

impl Cleaned {
    /// The cleaned mask.
    #[must_use]
    pub const fn cleaned(&self) -> &BinaryGrid {
        &self.cleaned
    }

    /// Keep the largest components and advance to [`Isolated`].
    ///
    /// With `keep_components == None` the cleaned mask passes through
    /// unchanged.
    pub fn isolate(self) -> Isolated {
        let connectivity = self.config.connectivity;
        let (labels, components) = label_components(&self.cleaned, connectivity);
        let isolated = match self.config.keep_components {
            Some(k) => largest_from_labels(&labels, &components, k),
            None => self.cleaned.clone(),
        };
        Isolated {
            config: self.config,
            dimensions: self.dimensions,
            greyscale: self.greyscale,
            enhanced: self.enhanced,
            thresholded: self.thresholded,
            cleaned: self.cleaned,
            isolated,
            component_count: components.len(),
        }
    }
}

// ───────────────────────── Stage 6: Isolated ─────────────────────────

/// Pipeline state after component selection.
///
/// Call [`skeletonize`](Self::skeletonize) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .skeletonize() to continue"]
pub struct Isolated {
    config: PipelineConfig,
    dimensions: Dimensions,
    greyscale: GreyGrid,
    enhanced: GreyGrid,
    thresholded: BinaryGrid,
    cleaned: BinaryGrid,
    isolated: BinaryGrid,
    component_count: usize,
}

impl Isolated {
    /// The isolated mask.
    #[must_use]
    pub const fn isolated(&self) -> &BinaryGrid {
        &self.isolated
    }

    /// Number of components found in the cleaned mask before selection.
    #[must_use]
    pub const fn component_count(&self) -> usize {
        self.component_count
    }

    /// Thin the isolated mask and advance to [`Skeletonized`].
    pub fn skeletonize(self) -> Skeletonized {
        let skeleton = self
            .config
            .skeleton
            .skeletonize(&self.isolated, lookup_table());
        log::debug!(
            "{} skeleton has {} pixels",
            self.config.skeleton,
            skeleton.count_foreground()
        );
        Skeletonized {
            config: self.config,
            dimensions: self.dimensions,
            greyscale: self.greyscale,
            enhanced: self.enhanced,
            thresholded: self.thresholded,
            cleaned: self.cleaned,
            isolated: self.isolated,
            skeleton,
        }
    }
}

// ───────────────────────── Stage 7: Skeletonized ─────────────────────

/// Pipeline state after skeletonization.
///
/// Call [`measure`](Self::measure) to advance to the final stage.
#[must_use = "pipeline stages are consumed by advancing — call .measure() to continue"]
pub struct Skeletonized {
    config: PipelineConfig,
    dimensions: Dimensions,
    greyscale: GreyGrid,
    enhanced: GreyGrid,
    thresholded: BinaryGrid,
    cleaned: BinaryGrid,
    isolated: BinaryGrid,
    skeleton: BinaryGrid,
}

impl Skeletonized {
    /// The one-pixel-wide skeleton.
    #[must_use]
    pub const fn skeleton(&self) -> &BinaryGrid {
        &self.skeleton
    }

    /// Measure the skeleton and advance to [`Measured`].
    pub fn measure(self) -> Measured {
        let length = measure_length(&self.skeleton, self.config.scale, self.config.calibration);
        Measured {
            config: self.config,
            dimensions: self.dimensions,
            greyscale: self.greyscale,
            enhanced: self.enhanced,
            thresholded: self.thresholded,
            cleaned: self.cleaned,
            isolated: self.isolated,
            skeleton: self.skeleton,
            length,
        }
    }
}

// ───────────────────────── Stage 8: Measured ─────────────────────────

/// Pipeline state after length measurement — the final stage.
///
/// Call [`into_result`](Self::into_result) to extract the
/// [`StagedResult`] containing all intermediates.
#[must_use = "call .into_result() to extract the StagedResult"]
pub struct Measured {
    config: PipelineConfig,
    dimensions: Dimensions,
    greyscale: GreyGrid,
    enhanced: GreyGrid,
    thresholded: BinaryGrid,
    cleaned: BinaryGrid,
    isolated: BinaryGrid,
    skeleton: BinaryGrid,
    length: f64,
}

impl Measured {
    /// Skeleton length in physical units.
    #[must_use]
    pub const fn length(&self) -> f64 {
        self.length
    }

    /// Image dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// Consume the pipeline and return the full [`StagedResult`].
    #[must_use]
    pub fn into_result(self) -> StagedResult {
        StagedResult {
            greyscale: self.greyscale,
            enhanced: self.enhanced,
            thresholded: self.thresholded,
            cleaned: self.cleaned,
            isolated: self.isolated,
            skeleton: self.skeleton,
            length: self.length,
            dimensions: self.dimensions,
        }
    }
}

// ──────────────────── PipelineStage trait + Stage enum ────────────────

/// Total number of stages in the pipeline.
pub const STAGE_COUNT: usize = 9;

/// The output produced by a single pipeline stage.
///
/// Each variant borrows the data that the corresponding stage computed.
/// Use this with [`PipelineStage::output`] or [`Stage::output`] to
/// inspect intermediates in a uniform, type-erased way.
#[must_use]
pub enum StageOutput<'a> {
    /// Source image bytes (not yet decoded).
    Source {
        /// The raw image bytes.
        bytes: &'a [u8],
    },
    /// Interleaved RGBA pixels.
    Decoded {
        /// The RGBA buffer.
        rgba: &'a [u8],
        /// Image dimensions.
        dimensions: Dimensions,
    },
    /// Greyscale extraction result.
    Greyscale {
        /// The greyscale grid.
        greyscale: &'a GreyGrid,
    },
    /// Contrast enhancement result.
    Enhanced {
        /// The enhanced grid.
        enhanced: &'a GreyGrid,
    },
    /// Threshold result.
    Thresholded {
        /// The binary mask.
        mask: &'a BinaryGrid,
    },
    /// Morphological clean-up result.
    Cleaned {
        /// The cleaned mask.
        mask: &'a BinaryGrid,
    },
    /// Component selection result.
    Isolated {
        /// The isolated mask.
        mask: &'a BinaryGrid,
    },
    /// Skeletonization result.
    Skeleton {
        /// The one-pixel-wide skeleton.
        skeleton: &'a BinaryGrid,
    },
    /// Length measurement result.
    Measured {
        /// The measured skeleton.
        skeleton: &'a BinaryGrid,
        /// Length in physical units.
        length: f64,
        /// Image dimensions.
        dimensions: Dimensions,
    },
}

/// Trait implemented by every pipeline stage, enabling uniform iteration.
///
/// Both the typed API (individual stage structs) and the dynamic API
/// ([`Stage`] enum) are available. This trait bridges the two: each
/// stage struct implements it, and [`Stage`] delegates to whichever
/// variant it holds.
///
/// # Loop pattern
///
/// ```rust
/// # use filum_pipeline::{Pipeline, PipelineConfig, PipelineError};
/// # use filum_pipeline::pipeline::{Stage, PipelineStage, Advance};
/// # fn run(png: Vec<u8>) -> Result<(), PipelineError> {
/// let mut stage: Stage = Pipeline::new(png, PipelineConfig::default()).into();
/// loop {
///     match stage.advance()? {
///         Advance::Next(next) => stage = next,
///         Advance::Complete(done) => { stage = done; break; }
///     }
/// }
/// let result = stage.complete()?;
/// # Ok(())
/// # }
/// ```
pub trait PipelineStage: Sized {
    /// Human-readable name of this stage (e.g. `"source"`, `"threshold"`).
    const NAME: &str;

    /// Zero-based index of this stage (`0` for Pending through `8` for
    /// Measured).
    const INDEX: usize;

    /// The output this stage produced.
    fn output(&self) -> StageOutput<'_>;

    /// Stage-specific metrics for diagnostics.
    ///
    /// Returns `None` for the initial [`Pending`] stage which has not
    /// yet performed any processing. All other stages return
    /// `Some(metrics)` describing the work done to reach this state.
    fn metrics(&self) -> Option<StageMetrics>;

    /// Advance to the next stage.
    ///
    /// Returns `Ok(Some(stage))` on success, `Ok(None)` if already at
    /// the final stage, or `Err` if the stage transition fails.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyInput`] or
    /// [`PipelineError::ImageDecode`] when decoding fails, and
    /// [`PipelineError::InvalidConfig`] or [`PipelineError::BufferSize`]
    /// when greyscale extraction fails.
    fn next(self) -> Result<Option<Stage>, PipelineError>;

    /// Run all remaining stages to completion and return the final
    /// [`StagedResult`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if any remaining fallible stage fails.
    fn complete(self) -> Result<StagedResult, PipelineError>;
}

impl PipelineStage for Pending {
    const NAME: &str = "source";
    const INDEX: usize = 0;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Source {
            bytes: &self.source,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        None
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Decoded(self.decode()?)))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.decode()?.complete()
    }
}

impl PipelineStage for Decoded {
    const NAME: &str = "decode";
    const INDEX: usize = 1;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Decoded {
            rgba: &self.rgba,
            dimensions: self.dimensions,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Decode {
            input_bytes: self.source_len,
            width: self.dimensions.width,
            height: self.dimensions.height,
            pixel_count: self.dimensions.width * self.dimensions.height,
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Greyscaled(self.greyscale()?)))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.greyscale()?.complete()
    }
}

impl PipelineStage for Greyscaled {
    const NAME: &str = "greyscale";
    const INDEX: usize = 2;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Greyscale {
            greyscale: &self.greyscale,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Greyscale {
            width: self.greyscale.width(),
            height: self.greyscale.height(),
            mean: mean_intensity(&self.greyscale),
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Enhanced(self.enhance())))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.enhance().complete()
    }
}

impl PipelineStage for Enhanced {
    const NAME: &str = "enhance";
    const INDEX: usize = 3;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Enhanced {
            enhanced: &self.enhanced,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Enhance {
            method: self.config.contrast.to_string(),
            mean_before: mean_intensity(&self.greyscale),
            mean_after: mean_intensity(&self.enhanced),
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Thresholded(self.threshold())))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.threshold().complete()
    }
}

impl PipelineStage for Thresholded {
    const NAME: &str = "threshold";
    const INDEX: usize = 4;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Thresholded {
            mask: &self.thresholded,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Threshold {
            method: self.config.threshold.to_string(),
            inverted: self.config.invert,
            foreground_pixels: self.thresholded.count_foreground(),
            total_pixels: self.thresholded.len(),
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Cleaned(self.clean())))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.clean().complete()
    }
}

impl PipelineStage for Cleaned {
    const NAME: &str = "clean";
    const INDEX: usize = 5;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Cleaned {
            mask: &self.cleaned,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Clean {
            steps: self
                .config
                .morphology
                .iter()
                .map(ToString::to_string)
                .collect(),
            foreground_before: self.thresholded.count_foreground(),
            foreground_after: self.cleaned.count_foreground(),
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Isolated(self.isolate())))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.isolate().complete()
    }
}

impl PipelineStage for Isolated {
    const NAME: &str = "isolate";
    const INDEX: usize = 6;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Isolated {
            mask: &self.isolated,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Isolate {
            component_count: self.component_count,
            kept: self.config.keep_components,
            foreground_after: self.isolated.count_foreground(),
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Skeletonized(self.skeletonize())))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.skeletonize().complete()
    }
}

impl PipelineStage for Skeletonized {
    const NAME: &str = "skeletonize";
    const INDEX: usize = 7;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Skeleton {
            skeleton: &self.skeleton,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Skeletonize {
            method: self.config.skeleton.to_string(),
            foreground_before: self.isolated.count_foreground(),
            skeleton_pixels: self.skeleton.count_foreground(),
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Measured(self.measure())))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        Ok(self.measure().into_result())
    }
}

impl PipelineStage for Measured {
    const NAME: &str = "measure";
    const INDEX: usize = 8;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Measured {
            skeleton: &self.skeleton,
            length: self.length,
            dimensions: self.dimensions,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Measure {
            length: self.length,
            scale: self.config.scale,
            calibration: self.config.calibration,
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(None)
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        Ok(self.into_result())
    }
}

/// Enum wrapping all pipeline stages for uniform, loopable access.
///
/// Use [`From`] conversions to enter the dynamic API from any typed
/// stage, then call [`advance`](Self::advance) in a loop:
///
/// ```rust
/// # use filum_pipeline::{Pipeline, PipelineConfig, PipelineError};
/// # use filum_pipeline::pipeline::{Stage, PipelineStage, Advance, STAGE_COUNT};
/// # fn run(png: Vec<u8>) -> Result<(), PipelineError> {
/// let mut stage: Stage = Pipeline::new(png, PipelineConfig::default()).into();
/// loop {
///     match stage.advance()? {
///         Advance::Next(next) => stage = next,
///         Advance::Complete(done) => { stage = done; break; }
///     }
/// }
/// let result = stage.complete()?;
/// # Ok(())
/// # }
/// ```
#[must_use]
pub enum Stage {
    /// See [`Pending`].
    Pending(Pending),
    /// See [`Decoded`].
    Decoded(Decoded),
    /// See [`Greyscaled`].
    Greyscaled(Greyscaled),
    /// See [`Enhanced`].
    Enhanced(Enhanced),
    /// See [`Thresholded`].
    Thresholded(Thresholded),
    /// See [`Cleaned`].
    Cleaned(Cleaned),
    /// See [`Isolated`].
    Isolated(Isolated),
    /// See [`Skeletonized`].
    Skeletonized(Skeletonized),
    /// See [`Measured`].
    Measured(Measured),
}

/// Compile-time guard: if a [`Stage`] variant is added, this match becomes
/// non-exhaustive and the build fails — reminding you to bump [`STAGE_COUNT`].
#[allow(dead_code, clippy::match_same_arms)]
const fn _stage_count_guard(s: &Stage) {
    match s {
        Stage::Pending(_)
        | Stage::Decoded(_)
        | Stage::Greyscaled(_)
        | Stage::Enhanced(_)
        | Stage::Thresholded(_)
        | Stage::Cleaned(_)
        | Stage::Isolated(_)
        | Stage::Skeletonized(_)
        | Stage::Measured(_) => {}
    }
}

/// Result of [`Stage::advance`]: either the next stage or the
/// completed final stage returned unchanged.
#[must_use]
pub enum Advance {
    /// The pipeline advanced to this next stage.
    Next(Stage),
    /// The pipeline was already at the final stage — returned unchanged.
    Complete(Stage),
}

/// Delegate a method call to whichever `Stage` variant is active.
macro_rules! delegate {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        match $self {
            Self::Pending(s) => s.$method($($arg),*),
            Self::Decoded(s) => s.$method($($arg),*),
            Self::Greyscaled(s) => s.$method($($arg),*),
            Self::Enhanced(s) => s.$method($($arg),*),
            Self::Thresholded(s) => s.$method($($arg),*),
            Self::Cleaned(s) => s.$method($($arg),*),
            Self::Isolated(s) => s.$method($($arg),*),
            Self::Skeletonized(s) => s.$method($($arg),*),
            Self::Measured(s) => s.$method($($arg),*),
        }
    };
}

impl Stage {
    /// Human-readable name of the current stage.
    #[must_use]
    pub fn name(&self) -> &'static str {
        delegate!(self, name)
    }

    /// Zero-based index of the current stage.
    #[must_use]
    pub fn index(&self) -> usize {
        delegate!(self, index)
    }

    /// The output this stage produced.
    pub fn output(&self) -> StageOutput<'_> {
        delegate!(self, output)
    }

    /// Stage-specific metrics for diagnostics. `None` for `Pending`.
    #[must_use]
    pub fn metrics(&self) -> Option<StageMetrics> {
        delegate!(self, metrics)
    }

    /// Whether the pipeline is at the final stage.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Measured(_))
    }

    /// Advance to the next stage.
    ///
    /// Returns `Ok(Some(next_stage))` on success, `Ok(None)` if
    /// already complete (the `Measured` value is consumed), or `Err` if
    /// the transition fails.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a fallible stage transition fails.
    pub fn next(self) -> Result<Option<Self>, PipelineError> {
        delegate!(self, next)
    }

    /// Advance to the next stage, returning `self` unchanged if
    /// already complete.
    ///
    /// This is the loop-friendly version of [`next`](Self::next).
    /// Unlike `next()`, which consumes the final stage and returns
    /// `Ok(None)`, `advance()` returns [`Advance::Complete`] with
    /// the final stage so you can still call
    /// [`complete`](Self::complete) on it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a fallible stage transition fails.
    pub fn advance(self) -> Result<Advance, PipelineError> {
        if self.is_complete() {
            return Ok(Advance::Complete(self));
        }
        // Non-complete stages always return Ok(Some(_)) from next().
        #[allow(clippy::unreachable)]
        let next = self
            .next()?
            .unwrap_or_else(|| unreachable!("non-complete stage returned None from next()"));
        Ok(Advance::Next(next))
    }

    /// Run all remaining stages to completion.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if any remaining fallible stage fails.
    pub fn complete(self) -> Result<StagedResult, PipelineError> {
        delegate!(self, complete)
    }
}

// The associated constants aren't callable as `self.NAME`, so the macro
// goes through this helper instead.
trait StageMetadata {
    fn name(&self) -> &'static str;
    fn index(&self) -> usize;
}

impl<T: PipelineStage> StageMetadata for T {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn index(&self) -> usize {
        T::INDEX
    }
}

impl From<Pending> for Stage {
    fn from(s: Pending) -> Self {
        Self::Pending(s)
    }
}

impl From<Decoded> for Stage {
    fn from(s: Decoded) -> Self {
        Self::Decoded(s)
    }
}

impl From<Greyscaled> for Stage {
    fn from(s: Greyscaled) -> Self {
        Self::Greyscaled(s)
    }
}

impl From<Enhanced> for Stage {
    fn from(s: Enhanced) -> Self {
        Self::Enhanced(s)
    }
}

impl From<Thresholded> for Stage {
    fn from(s: Thresholded) -> Self {
        Self::Thresholded(s)
    }
}

impl From<Cleaned> for Stage {
    fn from(s: Cleaned) -> Self {
        Self::Cleaned(s)
    }
}

impl From<Isolated> for Stage {
    fn from(s: Isolated) -> Self {
        Self::Isolated(s)
    }
}

impl From<Skeletonized> for Stage {
    fn from(s: Skeletonized) -> Self {
        Self::Skeletonized(s)
    }
}

impl From<Measured> for Stage {
    fn from(s: Measured) -> Self {
        Self::Measured(s)
    }
}

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental measurement pipeline.
///
/// Created via [`Pipeline::new`] (encoded image bytes) or
/// [`Pipeline::from_rgba`] (an already decoded buffer). Neither does any
/// processing; the caller chains stage methods to advance:
///
/// ```rust
/// # use filum_pipeline::{Pipeline, PipelineConfig, PipelineError};
/// # fn run(png: Vec<u8>) -> Result<(), PipelineError> {
/// let result = Pipeline::new(png, PipelineConfig::default())
///     .decode()?
///     .greyscale()?
///     .enhance()
///     .threshold()
///     .clean()
///     .isolate()
///     .skeletonize()
///     .measure()
///     .into_result();
/// # Ok(())
/// # }
/// ```
///
/// Each stage method consumes the current state and returns the next,
/// making it a compile-time error to skip stages or call them out of
/// order.
pub struct Pipeline;

impl Pipeline {
    /// Create a new pipeline from encoded image bytes and config.
    ///
    /// No processing is performed — the bytes and config are simply
    /// stored. Call [`.decode()`](Pending::decode) (or convert to a
    /// [`Stage`] and loop) to begin processing.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(image_bytes: Vec<u8>, config: PipelineConfig) -> Pending {
        Pending {
            config,
            source: image_bytes,
        }
    }

    /// Enter the pipeline with interleaved RGBA pixels.
    ///
    /// The buffer length is checked when advancing past [`Decoded`].
    pub fn from_rgba(
        rgba: Vec<u8>,
        width: usize,
        height: usize,
        config: PipelineConfig,
    ) -> Decoded {
        Decoded {
            config,
            source_len: rgba.len(),
            rgba,
            dimensions: Dimensions { width, height },
        }
    }
}
