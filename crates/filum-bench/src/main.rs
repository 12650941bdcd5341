//! filum-bench: CLI tool for measurement parameter experimentation and diagnostics.
//!
//! Runs the measurement pipeline on a given image file with configurable
//! parameters, printing detailed per-stage diagnostics. Useful for:
//!
//! - Comparing the pixel and cell-complex skeletonizers
//! - Tuning contrast radius/clip, threshold radius/offset, clean-up steps
//! - Measuring per-stage durations to identify bottlenecks
//! - Checking how parameter changes affect component and skeleton counts
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin filum-bench -- [OPTIONS] <IMAGE_PATH>
//! ```
//!
//! Set `RUST_LOG=debug` to follow thinning passes and collapse rounds.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use filum_pipeline::diagnostics::PipelineDiagnostics;
use filum_pipeline::raster::{binary_to_image, grey_to_image};
use filum_pipeline::{
    CollapseThresholds, ContrastMethod, MorphologyOp, MorphologyStep, PipelineConfig,
    SkeletonMethod, StagedResult, StructuringElement, ThresholdMethod,
};

/// Measurement parameter experimentation and diagnostics for filum.
///
/// Runs the pipeline on a given micrograph with configurable parameters
/// and prints detailed per-stage timing and count diagnostics.
#[derive(Parser)]
#[command(name = "filum-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Contrast enhancement before thresholding.
    #[arg(long, value_enum, default_value_t = Contrast::ClipLimited)]
    contrast: Contrast,

    /// Contrast window radius.
    #[arg(long, default_value_t = ContrastMethod::DEFAULT_RADIUS)]
    contrast_radius: usize,

    /// Contrast per-intensity clip limit.
    #[arg(long, default_value_t = ContrastMethod::DEFAULT_CLIP, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    contrast_clip: u32,

    /// Threshold method.
    #[arg(long, value_enum, default_value_t = Threshold::Adaptive)]
    threshold: Threshold,

    /// Lower bound for the range threshold.
    #[arg(long, default_value_t = 128)]
    min: u8,

    /// Upper bound for the range threshold.
    #[arg(long, default_value_t = 255)]
    max: u8,

    /// Adaptive threshold window radius.
    #[arg(long, default_value_t = ThresholdMethod::DEFAULT_RADIUS)]
    threshold_radius: usize,

    /// Adaptive threshold offset above the local mean.
    #[arg(long, default_value_t = ThresholdMethod::DEFAULT_OFFSET, allow_hyphen_values = true)]
    offset: i32,

    /// Clip limit for the clip-limited threshold.
    #[arg(long, default_value_t = ContrastMethod::DEFAULT_CLIP, value_parser = clap::builder::RangedU64ValueParser::<u32>::new().range(1..))]
    threshold_clip: u32,

    /// Swap foreground and background after thresholding.
    #[arg(long)]
    invert: bool,

    /// Clean-up step as `op[:element[:iterations]]`, e.g. `close:square:1`.
    /// Repeat for several steps; defaults to one square closing.
    #[arg(long = "morph", value_parser = parse_step)]
    morphology: Vec<MorphologyStep>,

    /// Skip morphological clean-up entirely.
    #[arg(long, conflicts_with = "morphology")]
    no_morph: bool,

    /// Keep this many of the largest components.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_KEEP_COMPONENTS, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    keep: usize,

    /// Keep every component.
    #[arg(long, conflicts_with = "keep")]
    keep_all: bool,

    /// Adjacency for component selection.
    #[arg(long, value_enum, default_value_t = Element::Square)]
    connectivity: Element,

    /// Skeletonization algorithm.
    #[arg(long, value_enum, default_value_t = Skeleton::CellComplex)]
    skeleton: Skeleton,

    /// Cell-complex collapse: minimum age before an edge is protected.
    #[arg(long, default_value_t = CollapseThresholds::DEFAULT_MIN_AGE)]
    min_age: u32,

    /// Cell-complex collapse: minimum surviving fraction before an edge is
    /// protected.
    #[arg(long, default_value_t = CollapseThresholds::DEFAULT_MIN_SURVIVAL)]
    min_survival: f64,

    /// Ratio of the image size to native imaging resolution.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_SCALE)]
    scale: f64,

    /// Pixels per physical unit at native resolution.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_CALIBRATION)]
    calibration: f64,

    /// Write the greyscale image with the skeleton overlaid in red.
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// The JSON must be a valid `PipelineConfig` serialization; missing
    /// fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,
}

/// Contrast enhancement selection.
#[derive(Clone, Copy, ValueEnum)]
enum Contrast {
    /// Leave intensities untouched.
    None,
    /// Local-rank stretch.
    Adaptive,
    /// Local-rank stretch with clipping, blended towards the global mean.
    ClipLimited,
}

/// Threshold selection.
#[derive(Clone, Copy, ValueEnum)]
enum Threshold {
    /// Fixed `[min, max]` band.
    Range,
    /// Local mean plus offset (zero-padded window).
    Adaptive,
    /// Clip-limited local mean plus offset (mirror-padded window).
    ClipLimited,
}

/// Structuring element selection.
#[derive(Clone, Copy, ValueEnum)]
enum Element {
    /// 8-neighbourhood.
    Square,
    /// 4-neighbourhood.
    Cross,
}

impl From<Element> for StructuringElement {
    fn from(e: Element) -> Self {
        match e {
            Element::Square => Self::Square,
            Element::Cross => Self::Cross,
        }
    }
}

/// Skeletonizer selection.
#[derive(Clone, Copy, ValueEnum)]
enum Skeleton {
    /// Serial lookup-table thinning.
    Pixel,
    /// Cell-complex collapse with medial persistence.
    CellComplex,
}

/// Parse `op[:element[:iterations]]` into a clean-up step.
fn parse_step(s: &str) -> Result<MorphologyStep, String> {
    let mut parts = s.split(':');
    let op = match parts.next().unwrap_or_default() {
        "dilate" => MorphologyOp::Dilate,
        "erode" => MorphologyOp::Erode,
        "open" => MorphologyOp::Open,
        "close" => MorphologyOp::Close,
        other => return Err(format!("unknown morphology op {other:?}")),
    };
    let element = match parts.next() {
        None | Some("square") => StructuringElement::Square,
        Some("cross") => StructuringElement::Cross,
        Some(other) => return Err(format!("unknown structuring element {other:?}")),
    };
    let iterations = match parts.next() {
        None => 1,
        Some(n) => n
            .parse()
            .map_err(|e| format!("bad iteration count {n:?}: {e}"))?,
    };
    if parts.next().is_some() {
        return Err(format!("too many fields in {s:?}"));
    }
    Ok(MorphologyStep {
        op,
        element,
        iterations,
    })
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.  Otherwise, a config is
/// assembled from the individual flags.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let morphology = if cli.no_morph {
        Vec::new()
    } else if cli.morphology.is_empty() {
        PipelineConfig::default_morphology()
    } else {
        cli.morphology.clone()
    };

    Ok(PipelineConfig {
        contrast: match cli.contrast {
            Contrast::None => ContrastMethod::None,
            Contrast::Adaptive => ContrastMethod::Adaptive {
                radius: cli.contrast_radius,
            },
            Contrast::ClipLimited => ContrastMethod::ClipLimited {
                radius: cli.contrast_radius,
                clip: cli.contrast_clip,
            },
        },
        threshold: match cli.threshold {
            Threshold::Range => ThresholdMethod::Range {
                min: cli.min,
                max: cli.max,
            },
            Threshold::Adaptive => ThresholdMethod::Adaptive {
                radius: cli.threshold_radius,
                offset: cli.offset,
            },
            Threshold::ClipLimited => ThresholdMethod::ClipLimited {
                radius: cli.threshold_radius,
                offset: cli.offset,
                clip: cli.threshold_clip,
            },
        },
        invert: cli.invert,
        morphology,
        keep_components: (!cli.keep_all).then_some(cli.keep),
        connectivity: cli.connectivity.into(),
        skeleton: match cli.skeleton {
            Skeleton::Pixel => SkeletonMethod::Pixel,
            Skeleton::CellComplex => SkeletonMethod::CellComplex {
                thresholds: CollapseThresholds {
                    min_age: cli.min_age,
                    min_survival: cli.min_survival,
                },
            },
        },
        scale: cli.scale,
        calibration: cli.calibration,
    })
}

/// Paint the skeleton red over the greyscale image.
fn overlay_image(staged: &StagedResult) -> Option<image::RgbImage> {
    let grey = grey_to_image(&staged.greyscale)?;
    let skeleton = binary_to_image(&staged.skeleton)?;
    Some(image::RgbImage::from_fn(grey.width(), grey.height(), |x, y| {
        if skeleton.get_pixel(x, y)[0] > 0 {
            image::Rgb([255, 0, 0])
        } else {
            let v = grey.get_pixel(x, y)[0];
            image::Rgb([v, v, v])
        }
    }))
}

fn write_overlay(path: &Path, staged: &StagedResult) -> Result<(), String> {
    let image = overlay_image(staged).ok_or("image too large for overlay")?;
    image
        .save(path)
        .map_err(|e| format!("Error writing overlay to {}: {e}", path.display()))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    eprintln!(
        "Image: {} ({} bytes)",
        cli.image_path.display(),
        image_bytes.len(),
    );
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        match filum_pipeline::diagnostics::process_with_diagnostics(&image_bytes, &config) {
            Ok((staged, diagnostics)) => {
                if cli.json {
                    match serde_json::to_string_pretty(&diagnostics) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Error serializing diagnostics: {e}");
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    println!("{}", diagnostics.report());
                }

                // Write the overlay on the first run only.
                if run == 0
                    && let Some(ref overlay_path) = cli.overlay
                {
                    match write_overlay(overlay_path, &staged) {
                        Ok(()) => eprintln!("Overlay written to {}", overlay_path.display()),
                        Err(msg) => eprintln!("{msg}"),
                    }
                }

                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        }

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    let Some(first) = all_diagnostics.first() else {
        println!("Warning: no diagnostics to summarize");
        return;
    };

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    for stage in &first.stages {
        let stage_durations: Vec<f64> = all_diagnostics
            .iter()
            .filter_map(|d| d.stage_duration(&stage.name))
            .map(|dur| dur.as_secs_f64() * 1000.0)
            .collect();

        if stage_durations.is_empty() {
            continue;
        }

        let stage_mean = stage_durations.iter().sum::<f64>() / stage_durations.len() as f64;
        println!("{:<24} {stage_mean:>10.3}ms", stage.name);
    }

    println!();
    println!("Length: {:.3}", first.summary.length);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use filum_pipeline::{BinaryGrid, Dimensions, GreyGrid};

    use super::*;

    #[test]
    fn parse_step_defaults() {
        let step = parse_step("open").unwrap();
        assert_eq!(step.op, MorphologyOp::Open);
        assert_eq!(step.element, StructuringElement::Square);
        assert_eq!(step.iterations, 1);
    }

    #[test]
    fn parse_step_full() {
        let step = parse_step("erode:cross:3").unwrap();
        assert_eq!(step.op, MorphologyOp::Erode);
        assert_eq!(step.element, StructuringElement::Cross);
        assert_eq!(step.iterations, 3);
    }

    #[test]
    fn parse_step_rejects_garbage() {
        assert!(parse_step("smudge").is_err());
        assert!(parse_step("close:hex").is_err());
        assert!(parse_step("close:square:x").is_err());
        assert!(parse_step("close:square:1:2").is_err());
    }

    #[test]
    fn default_flags_give_default_config() {
        let cli = Cli::parse_from(["filum-bench", "image.png"]);
        assert_eq!(config_from_cli(&cli).unwrap(), PipelineConfig::default());
    }

    #[test]
    fn flags_build_config() {
        let cli = Cli::parse_from([
            "filum-bench",
            "image.png",
            "--threshold",
            "range",
            "--min",
            "40",
            "--max",
            "200",
            "--morph",
            "open:cross:2",
            "--morph",
            "close",
            "--keep-all",
            "--skeleton",
            "pixel",
            "--offset",
            "-5",
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.threshold, ThresholdMethod::Range { min: 40, max: 200 });
        assert_eq!(config.morphology.len(), 2);
        assert_eq!(config.keep_components, None);
        assert_eq!(config.skeleton, SkeletonMethod::Pixel);
        assert_eq!(cli.offset, -5);
    }

    #[test]
    fn config_json_overrides_flags() {
        let cli = Cli::parse_from([
            "filum-bench",
            "image.png",
            "--invert",
            "--config-json",
            r#"{"skeleton":{"kind":"pixel"}}"#,
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert!(!config.invert);
        assert_eq!(config.skeleton, SkeletonMethod::Pixel);
    }

    #[test]
    fn overlay_paints_skeleton_over_greyscale() {
        let greyscale = GreyGrid::from_fn(4, 3, |row, col| u8::try_from(row * 10 + col).unwrap());
        let mut skeleton = BinaryGrid::new(4, 3);
        skeleton[(1, 2)] = true;
        let staged = StagedResult {
            enhanced: greyscale.clone(),
            greyscale,
            thresholded: skeleton.clone(),
            cleaned: skeleton.clone(),
            isolated: skeleton.clone(),
            skeleton,
            length: 1.0,
            dimensions: Dimensions {
                width: 4,
                height: 3,
            },
        };
        let overlay = overlay_image(&staged).unwrap();
        assert_eq!(overlay.dimensions(), (4, 3));
        assert_eq!(overlay.get_pixel(2, 1).0, [255, 0, 0]);
        assert_eq!(overlay.get_pixel(3, 2).0, [23, 23, 23]);
        assert_eq!(overlay.get_pixel(0, 0).0, [0, 0, 0]);
    }
}
