//! High-level image operations.
//!
//! [`render`] is the per-item transform pipeline: decode a fresh copy of the
//! source, resolve geometry, resize, run effects on the configured engine,
//! encode. It knows nothing about caches or volumes.

use super::codec::{CodecError, ImageCodec};
use super::effects::{EffectError, apply_effects};
use super::engine::{self, BackendKind};
use super::geometry::{GeometryError, TargetGeometry, resolve};
use super::params::{CropMode, ResolvedTransform};
use image::DynamicImage;
use image::imageops::FilterType;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Effect(#[from] EffectError),
}

/// Encoded output of one transform.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub geometry: TargetGeometry,
    pub bytes: Vec<u8>,
}

/// Render `transform` for the image at `source`.
pub fn render(
    codec: &dyn ImageCodec,
    source: &Path,
    transform: &ResolvedTransform,
    backend: BackendKind,
) -> Result<Rendered, RenderError> {
    let image = codec.decode(source)?;
    let geometry = resolve(
        image.width(),
        image.height(),
        &transform.spec,
        transform.allow_upscale,
    )?;

    let mut handle = engine::open(backend, resize_to(image, geometry, transform.spec.mode));
    apply_effects(handle.as_mut(), &transform.spec.effects)?;

    let bytes = codec.encode(&handle.image(), transform.format, transform.quality)?;
    Ok(Rendered { geometry, bytes })
}

/// Resize into the resolved box. Crop fills then center-crops; fit and
/// stretch scale to the box directly (fit geometry already keeps aspect).
fn resize_to(image: DynamicImage, geometry: TargetGeometry, mode: CropMode) -> DynamicImage {
    if (image.width(), image.height()) == (geometry.width, geometry.height) {
        return image;
    }
    match mode {
        CropMode::Crop => image.resize_to_fill(geometry.width, geometry.height, FilterType::Lanczos3),
        CropMode::Fit | CropMode::Stretch => {
            image.resize_exact(geometry.width, geometry.height, FilterType::Lanczos3)
        }
    }
}
