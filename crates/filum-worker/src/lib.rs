//! Web worker entry point for filum pipeline processing.
//!
//! This crate compiles to a standalone WASM module that runs inside a
//! `Worker`. It receives either the RGBA pixels the page already decoded
//! through a canvas or the raw image file bytes, plus a `PipelineConfig`
//! via `postMessage`, runs the staged pipeline, and posts the result back.
//!
//! Every intermediate grid is sent as a raw RGBA `Uint8Array` ready to be
//! wrapped in `ImageData`: greyscale grids as opaque grey, masks as a red
//! overlay on transparent black. The measured length and dimensions go in
//! a small JSON string.
//!
//! Running the pipeline in a worker keeps the browser's main thread
//! free for UI updates and brush editing.

use filum_pipeline::raster::{binary_to_rgba, grey_to_rgba};
use filum_pipeline::{Dimensions, Pipeline, PipelineConfig, PipelineError, StagedResult};
use serde::{Deserialize, Serialize};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

/// The scalar portion of a `StagedResult`, serialized as JSON. Grids are
/// sent separately as raw `Uint8Array` buffers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSummary {
    pub dimensions: Dimensions,
    /// Skeleton length in physical units.
    pub length: f64,
    pub skeleton_pixels: usize,
}

impl MeasurementSummary {
    #[must_use]
    pub fn new(staged: &StagedResult) -> Self {
        Self {
            dimensions: staged.dimensions,
            length: staged.length,
            skeleton_pixels: staged.skeleton.count_foreground(),
        }
    }
}

/// Render every intermediate of `staged` as an RGBA layer, keyed by the
/// response field the page reads it from.
#[must_use]
pub fn rgba_layers(staged: &StagedResult) -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("greyscalePixels", grey_to_rgba(&staged.greyscale)),
        ("enhancedPixels", grey_to_rgba(&staged.enhanced)),
        ("thresholdedPixels", binary_to_rgba(&staged.thresholded)),
        ("cleanedPixels", binary_to_rgba(&staged.cleaned)),
        ("isolatedPixels", binary_to_rgba(&staged.isolated)),
        ("skeletonPixels", binary_to_rgba(&staged.skeleton)),
    ]
}

/// Input to one pipeline run, as extracted from a worker message.
pub enum Source {
    /// Encoded image file bytes (PNG, JPEG, BMP, WebP).
    Encoded(Vec<u8>),
    /// Interleaved RGBA pixels decoded by the page.
    Rgba {
        pixels: Vec<u8>,
        width: usize,
        height: usize,
    },
}

/// Run the whole pipeline on `source`.
///
/// # Errors
///
/// Returns the first [`PipelineError`] raised by a stage.
pub fn run(source: Source, config: PipelineConfig) -> Result<StagedResult, PipelineError> {
    use filum_pipeline::pipeline::PipelineStage;

    match source {
        Source::Encoded(bytes) => Pipeline::new(bytes, config).complete(),
        Source::Rgba {
            pixels,
            width,
            height,
        } => Pipeline::from_rgba(pixels, width, height, config).complete(),
    }
}

/// Message protocol: the main thread sends a JS object with:
/// - `rgbaPixels`: `Uint8Array` of interleaved RGBA, with `width` and
///   `height` as numbers; or `imageBytes`: `Uint8Array` of the raw file
/// - `configJson`: `String` containing JSON-serialized `PipelineConfig`
/// - `generation`: `f64` generation counter (passed through to response)
///
/// On success the worker responds with a JS object containing:
/// - `generation`: `f64` matching the request generation
/// - `ok`: `true`
/// - `summaryJson`: `String` — JSON-serialized `MeasurementSummary`
/// - `width`, `height`: `f64` — grid dimensions
/// - `greyscalePixels`, `enhancedPixels`, `thresholdedPixels`,
///   `cleanedPixels`, `isolatedPixels`, `skeletonPixels`: `Uint8Array`
///   RGBA layers
///
/// On error the worker responds with:
/// - `generation`: `f64`
/// - `ok`: `false`
/// - `errorJson`: `String` — JSON-serialized `PipelineError`
///
/// # Worker entry point
///
/// Called automatically when the WASM module is instantiated in the
/// worker context.
#[wasm_bindgen(start)]
pub fn worker_main() {
    console_error_panic_hook::set_once();

    let global: web_sys::DedicatedWorkerGlobalScope = js_sys::global()
        .dyn_into()
        .expect_throw("not running in a DedicatedWorkerGlobalScope");

    let onmessage =
        Closure::<dyn FnMut(web_sys::MessageEvent)>::new(move |event: web_sys::MessageEvent| {
            handle_message(event);
        });
    global.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
    onmessage.forget(); // leak — lives for the worker lifetime
}

fn field(data: &JsValue, key: &str) -> Option<JsValue> {
    js_sys::Reflect::get(data, &JsValue::from_str(key))
        .ok()
        .filter(|v| !v.is_undefined() && !v.is_null())
}

fn bytes_field(data: &JsValue, key: &str) -> Option<Vec<u8>> {
    field(data, key)?
        .dyn_into::<js_sys::Uint8Array>()
        .ok()
        .map(|a| a.to_vec())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn dimension_field(data: &JsValue, key: &str) -> Option<usize> {
    let value = field(data, key)?.as_f64()?;
    (value.is_finite() && value >= 0.0 && value.fract() == 0.0).then_some(value as usize)
}

/// Pull the pixel source out of a message, preferring decoded RGBA.
fn extract_source(data: &JsValue) -> Result<Source, String> {
    if let Some(pixels) = bytes_field(data, "rgbaPixels") {
        let width = dimension_field(data, "width").ok_or("width is missing or not an integer")?;
        let height =
            dimension_field(data, "height").ok_or("height is missing or not an integer")?;
        return Ok(Source::Rgba {
            pixels,
            width,
            height,
        });
    }
    bytes_field(data, "imageBytes")
        .map(Source::Encoded)
        .ok_or_else(|| "message carries neither rgbaPixels nor imageBytes".to_string())
}

/// Handle an incoming message from the main thread.
#[allow(clippy::needless_pass_by_value)]
fn handle_message(event: web_sys::MessageEvent) {
    let data = event.data();
    let generation = field(&data, "generation")
        .and_then(|v| v.as_f64())
        .unwrap_or(f64::NAN);

    let source = match extract_source(&data) {
        Ok(source) => source,
        Err(msg) => {
            post_error_response(generation, &msg);
            return;
        }
    };

    let Some(config_json) = field(&data, "configJson").and_then(|v| v.as_string()) else {
        post_error_response(generation, "configJson is missing or not a string");
        return;
    };
    let config: PipelineConfig = match serde_json::from_str(&config_json) {
        Ok(c) => c,
        Err(e) => {
            post_error_response(generation, &format!("failed to parse config: {e}"));
            return;
        }
    };

    // Synchronous — blocks this worker thread only.
    match run(source, config) {
        Ok(staged) => post_success_response(generation, &staged),
        Err(e) => {
            log::debug!("pipeline failed: {e}");
            let error_json = serde_json::to_string(&e)
                .unwrap_or_else(|ser_err| format!("\"serialization error: {ser_err}\""));
            post_error_json(generation, &error_json);
        }
    }
}

/// Post a successful pipeline result back to the main thread.
#[allow(clippy::cast_precision_loss)]
fn post_success_response(generation: f64, staged: &StagedResult) {
    let summary_json = match serde_json::to_string(&MeasurementSummary::new(staged)) {
        Ok(json) => json,
        Err(e) => {
            post_error_response(generation, &format!("failed to serialize summary: {e}"));
            return;
        }
    };

    let response = js_sys::Object::new();
    let set = |key: &str, val: &JsValue| {
        js_sys::Reflect::set(&response, &JsValue::from_str(key), val)
            .expect_throw("failed to set response field");
    };

    set("generation", &JsValue::from_f64(generation));
    set("ok", &JsValue::from_bool(true));
    set("summaryJson", &JsValue::from_str(&summary_json));
    set("width", &JsValue::from_f64(staged.dimensions.width as f64));
    set("height", &JsValue::from_f64(staged.dimensions.height as f64));
    for (key, pixels) in rgba_layers(staged) {
        set(key, &js_sys::Uint8Array::from(pixels.as_slice()));
    }

    let global: web_sys::DedicatedWorkerGlobalScope = js_sys::global()
        .dyn_into()
        .expect_throw("not in worker scope");
    global
        .post_message(&response)
        .expect_throw("failed to postMessage");
}

/// Post an error response back to the main thread.
fn post_error_response(generation: f64, error_msg: &str) {
    let error = PipelineError::InvalidConfig(error_msg.to_string());
    let error_json = serde_json::to_string(&error).unwrap_or_else(|_| "\"unknown error\"".into());
    post_error_json(generation, &error_json);
}

/// Post a pre-serialized error JSON back to the main thread.
fn post_error_json(generation: f64, error_json: &str) {
    let response = js_sys::Object::new();
    let _ = js_sys::Reflect::set(
        &response,
        &JsValue::from_str("generation"),
        &JsValue::from_f64(generation),
    );
    let _ = js_sys::Reflect::set(
        &response,
        &JsValue::from_str("ok"),
        &JsValue::from_bool(false),
    );
    let _ = js_sys::Reflect::set(
        &response,
        &JsValue::from_str("errorJson"),
        &JsValue::from_str(error_json),
    );

    if let Ok(global) = js_sys::global().dyn_into::<web_sys::DedicatedWorkerGlobalScope>() {
        let _ = global.post_message(&response);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use filum_pipeline::{ContrastMethod, ThresholdMethod};

    use super::*;

    fn square_rgba(side: usize) -> Vec<u8> {
        let mut pixels = Vec::with_capacity(side * side * 4);
        for row in 0..side {
            for col in 0..side {
                let inside = (4..side - 4).contains(&row) && (4..side - 4).contains(&col);
                let v = if inside { 200 } else { 10 };
                pixels.extend_from_slice(&[v, v, v, 255]);
            }
        }
        pixels
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            contrast: ContrastMethod::None,
            threshold: ThresholdMethod::Range { min: 100, max: 255 },
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn run_rgba_source() {
        let staged = run(
            Source::Rgba {
                pixels: square_rgba(16),
                width: 16,
                height: 16,
            },
            config(),
        )
        .unwrap();
        assert_eq!(staged.dimensions.width, 16);
        assert!(staged.skeleton.count_foreground() > 0);
    }

    #[test]
    fn run_reports_buffer_mismatch() {
        let result = run(
            Source::Rgba {
                pixels: square_rgba(16),
                width: 15,
                height: 16,
            },
            config(),
        );
        assert!(matches!(result, Err(PipelineError::BufferSize { .. })));
    }

    #[test]
    fn layers_are_full_size_rgba() {
        let staged = run(
            Source::Rgba {
                pixels: square_rgba(16),
                width: 16,
                height: 16,
            },
            config(),
        )
        .unwrap();
        let layers = rgba_layers(&staged);
        assert_eq!(layers.len(), 6);
        for (key, pixels) in &layers {
            assert_eq!(pixels.len(), 16 * 16 * 4, "{key}");
        }
        // Mask overlays are transparent off the mask.
        let (_, thresholded) = &layers[2];
        assert_eq!(&thresholded[..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn summary_json_round_trip() {
        let staged = run(
            Source::Rgba {
                pixels: square_rgba(16),
                width: 16,
                height: 16,
            },
            config(),
        )
        .unwrap();
        let summary = MeasurementSummary::new(&staged);
        let json = serde_json::to_string(&summary).unwrap();
        let back: MeasurementSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, summary);
    }
}
