//! Target geometry resolution.
//!
//! Pure functions: source dimensions + transform spec + upscale policy in,
//! output box out. No I/O, no images.

use super::params::{CropMode, TransformSpec};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Invalid source dimensions {width}x{height}")]
    InvalidSourceDimensions { width: u32, height: u32 },
    #[error("Invalid transform geometry: {0}")]
    InvalidSpec(String),
}

/// Output box of a transform. Always at least 1x1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TargetGeometry {
    pub width: u32,
    pub height: u32,
}

/// Resolve the output box for a source image.
///
/// - Width and height with [`CropMode::Crop`] or [`CropMode::Stretch`]: the
///   requested box itself (crop covers it, stretch distorts into it).
/// - Width and height with [`CropMode::Fit`]: the source scaled to fit inside
///   the box, keeping the source aspect.
/// - One side only: the other side follows `spec.ratio` when set, else the
///   source aspect.
/// - Neither: the source dimensions.
///
/// When `allow_upscale` is false and the box exceeds the source on either
/// side, it is shrunk proportionally until it fits, so the requested aspect
/// survives. Results are rounded to whole pixels and floored at 1x1.
///
/// # Examples
/// ```
/// # use imager::imaging::{TransformSpec, resolve};
/// let spec = TransformSpec::sized(Some(400), Some(400));
/// // 800x600 source, upscale irrelevant: exact box
/// let g = resolve(800, 600, &spec, false).unwrap();
/// assert_eq!((g.width, g.height), (400, 400));
///
/// // 300x200 source cannot fill 400x400 without upscaling: shrink to 200x200
/// let g = resolve(300, 200, &spec, false).unwrap();
/// assert_eq!((g.width, g.height), (200, 200));
/// ```
pub fn resolve(
    source_width: u32,
    source_height: u32,
    spec: &TransformSpec,
    allow_upscale: bool,
) -> Result<TargetGeometry, GeometryError> {
    if source_width == 0 || source_height == 0 {
        return Err(GeometryError::InvalidSourceDimensions {
            width: source_width,
            height: source_height,
        });
    }
    if spec.width == Some(0) || spec.height == Some(0) {
        return Err(GeometryError::InvalidSpec(
            "width and height must be positive".into(),
        ));
    }
    if let Some(ratio) = spec.ratio
        && !(ratio.is_finite() && ratio > 0.0)
    {
        return Err(GeometryError::InvalidSpec(format!(
            "ratio must be a positive number, got {ratio}"
        )));
    }

    let src_w = source_width as f64;
    let src_h = source_height as f64;
    let src_aspect = src_w / src_h;

    let (w, h) = match (spec.width, spec.height) {
        (Some(w), Some(h)) => match spec.mode {
            CropMode::Fit => {
                let scale = (w as f64 / src_w).min(h as f64 / src_h);
                (src_w * scale, src_h * scale)
            }
            CropMode::Crop | CropMode::Stretch => (w as f64, h as f64),
        },
        (Some(w), None) => {
            let aspect = spec.ratio.unwrap_or(src_aspect);
            (w as f64, w as f64 / aspect)
        }
        (None, Some(h)) => {
            let aspect = spec.ratio.unwrap_or(src_aspect);
            (h as f64 * aspect, h as f64)
        }
        (None, None) => (src_w, src_h),
    };

    if allow_upscale || (w <= src_w && h <= src_h) {
        return Ok(TargetGeometry {
            width: round_px(w),
            height: round_px(h),
        });
    }

    // Shrink to fit inside the source, keeping the box aspect
    let scale = (src_w / w).min(src_h / h);
    Ok(TargetGeometry {
        width: round_px(w * scale).min(source_width),
        height: round_px(h * scale).min(source_height),
    })
}

fn round_px(value: f64) -> u32 {
    (value.round() as u32).max(1)
}
