//! Pipeline diagnostics: timing, counts, and other metrics for each stage.
//!
//! These diagnostics are permanent instrumentation intended for
//! parameter tuning. [`process_with_diagnostics`] drives the
//! [`Stage`](crate::pipeline::Stage) loop and records one
//! [`StageDiagnostics`] entry per stage after the source.
//!
//! Timestamps are captured via the `web-time` crate, which uses
//! `performance.now()` on WASM and `std::time::Instant` on native.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::grid::GreyGrid;
use crate::pipeline::{Advance, Pipeline, STAGE_COUNT, Stage};
use crate::types::{PipelineConfig, PipelineError, StagedResult};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// One entry per executed stage, in pipeline order.
    pub stages: Vec<StageDiagnostics>,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Stage name as reported by [`Stage::name`].
    pub name: String,
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics (counts, sizes, etc.).
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Image decoding metrics.
    Decode {
        /// Size of the input in bytes (encoded image or raw RGBA).
        input_bytes: usize,
        /// Image width in pixels.
        width: usize,
        /// Image height in pixels.
        height: usize,
        /// Total pixel count (`width * height`).
        pixel_count: usize,
    },
    /// Greyscale extraction metrics.
    Greyscale {
        width: usize,
        height: usize,
        /// Mean intensity of the greyscale grid.
        mean: f64,
    },
    /// Contrast enhancement metrics.
    Enhance {
        /// Enhancement method and parameters.
        method: String,
        /// Mean intensity before enhancement.
        mean_before: f64,
        /// Mean intensity after enhancement.
        mean_after: f64,
    },
    /// Threshold metrics.
    Threshold {
        /// Threshold method and parameters.
        method: String,
        /// Whether the mask was inverted afterwards.
        inverted: bool,
        /// Foreground pixels in the (possibly inverted) mask.
        foreground_pixels: usize,
        /// Total pixel count for computing coverage.
        total_pixels: usize,
    },
    /// Morphological clean-up metrics.
    Clean {
        /// The steps applied, in order.
        steps: Vec<String>,
        foreground_before: usize,
        foreground_after: usize,
    },
    /// Component selection metrics.
    Isolate {
        /// Components in the cleaned mask.
        component_count: usize,
        /// How many were kept (`None` keeps all).
        kept: Option<usize>,
        foreground_after: usize,
    },
    /// Skeletonization metrics.
    Skeletonize {
        /// Thinning algorithm and parameters.
        method: String,
        /// Foreground pixels in the isolated mask.
        foreground_before: usize,
        /// Pixels remaining in the skeleton.
        skeleton_pixels: usize,
    },
    /// Length measurement metrics.
    Measure {
        /// Length in physical units.
        length: f64,
        scale: f64,
        calibration: f64,
    },
}

/// High-level summary for the entire pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Source image width in pixels.
    pub image_width: usize,
    /// Source image height in pixels.
    pub image_height: usize,
    /// Total pixel count.
    pub pixel_count: usize,
    /// Components in the cleaned mask.
    pub component_count: usize,
    /// Pixels in the final skeleton.
    pub skeleton_pixels: usize,
    /// Measured length in physical units.
    pub length: f64,
}

/// Run the whole pipeline, timing every stage.
///
/// # Errors
///
/// Returns the first [`PipelineError`] raised by a stage.
pub fn process_with_diagnostics(
    image_bytes: &[u8],
    config: &PipelineConfig,
) -> Result<(StagedResult, PipelineDiagnostics), PipelineError> {
    let stage: Stage = Pipeline::new(image_bytes.to_vec(), config.clone()).into();
    run_with_diagnostics(stage)
}

/// Drive `stage` to completion, timing every transition.
///
/// # Errors
///
/// Returns the first [`PipelineError`] raised by a stage.
pub fn run_with_diagnostics(
    stage: Stage,
) -> Result<(StagedResult, PipelineDiagnostics), PipelineError> {
    let started = Instant::now();
    let mut stages = Vec::with_capacity(STAGE_COUNT);
    let mut stage = stage;
    loop {
        let step_started = Instant::now();
        match stage.advance()? {
            Advance::Next(next) => {
                let duration = step_started.elapsed();
                if let Some(metrics) = next.metrics() {
                    stages.push(StageDiagnostics {
                        name: next.name().to_string(),
                        duration,
                        metrics,
                    });
                }
                stage = next;
            }
            Advance::Complete(done) => {
                stage = done;
                break;
            }
        }
    }
    let staged = stage.complete()?;
    let total_duration = started.elapsed();

    let component_count = stages
        .iter()
        .find_map(|s| match s.metrics {
            StageMetrics::Isolate {
                component_count, ..
            } => Some(component_count),
            _ => None,
        })
        .unwrap_or(0);
    let summary = PipelineSummary {
        image_width: staged.dimensions.width,
        image_height: staged.dimensions.height,
        pixel_count: staged.dimensions.width * staged.dimensions.height,
        component_count,
        skeleton_pixels: staged.skeleton.count_foreground(),
        length: staged.length,
    };
    log::debug!(
        "pipeline finished in {:.3}ms over {} stages",
        duration_ms(total_duration),
        stages.len()
    );

    Ok((
        staged,
        PipelineDiagnostics {
            stages,
            total_duration,
            summary,
        },
    ))
}

impl PipelineDiagnostics {
    /// Duration of the named stage, if it ran.
    #[must_use]
    pub fn stage_duration(&self, name: &str) -> Option<Duration> {
        self.stages
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.duration)
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for diag in &self.stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{:<24} {ms:>8.3}ms {pct:>9.1}%  {details}", diag.name));
        }

        lines.push(String::new());
        lines.push(format!(
            "Components: {}  |  Skeleton pixels: {}  |  Length: {:.3}",
            self.summary.component_count, self.summary.skeleton_pixels, self.summary.length,
        ));

        lines.join("\n")
    }
}

/// Mean intensity of a greyscale grid (0 for an empty grid).
#[allow(clippy::cast_precision_loss)]
pub(crate) fn mean_intensity(grid: &GreyGrid) -> f64 {
    if grid.is_empty() {
        return 0.0;
    }
    let sum: u64 = grid.as_slice().iter().map(|&v| u64::from(v)).sum();
    sum as f64 / grid.len() as f64
}

/// Convert a `Duration` to milliseconds as `f64`.
const fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Decode {
            input_bytes,
            width,
            height,
            ..
        } => format!("{input_bytes} bytes -> {width}x{height}"),
        StageMetrics::Greyscale {
            width,
            height,
            mean,
        } => format!("{width}x{height} mean={mean:.1}"),
        StageMetrics::Enhance {
            method,
            mean_before,
            mean_after,
        } => format!("{method} mean {mean_before:.1}->{mean_after:.1}"),
        StageMetrics::Threshold {
            method,
            inverted,
            foreground_pixels,
            total_pixels,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let coverage = if *total_pixels > 0 {
                *foreground_pixels as f64 / *total_pixels as f64 * 100.0
            } else {
                0.0
            };
            let inverted = if *inverted { " inverted" } else { "" };
            format!("{method}{inverted} fg={foreground_pixels} ({coverage:.1}%)")
        }
        StageMetrics::Clean {
            steps,
            foreground_before,
            foreground_after,
        } => {
            let steps = if steps.is_empty() {
                "none".to_string()
            } else {
                steps.join(", ")
            };
            format!("{steps} fg={foreground_before}->{foreground_after}")
        }
        StageMetrics::Isolate {
            component_count,
            kept,
            foreground_after,
        } => {
            let kept = kept.map_or_else(|| "all".to_string(), |k| k.to_string());
            format!("{component_count} components, kept {kept}, fg={foreground_after}")
        }
        StageMetrics::Skeletonize {
            method,
            foreground_before,
            skeleton_pixels,
        } => format!("{method} {foreground_before}->{skeleton_pixels} px"),
        StageMetrics::Measure {
            length,
            scale,
            calibration,
        } => format!("length={length:.3} (scale={scale}, calibration={calibration})"),
    }
}
