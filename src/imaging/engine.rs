//! Imaging engine handles.
//!
//! An [`ImageEngineHandle`] owns the in-memory image for one transform and
//! executes [`RawOp`]s against it. Two engines exist and they do not share a
//! pixel representation:
//!
//! | Engine | Buffer | Operations |
//! |---|---|---|
//! | [`StandardEngine`] | `DynamicImage` (source color type kept) | `image` crate built-ins only |
//! | [`ExtendedEngine`] | `RgbaImage` (always 8-bit RGBA) | built-ins plus sepia, posterize, oil paint kernels |
//!
//! Which engine runs is a config choice ([`BackendKind`]). Effects branch on
//! [`ImageEngineHandle::kind`] to decide which raw operations to issue; an
//! engine asked for an operation it lacks answers [`EngineError::Unsupported`].

use image::{DynamicImage, Rgba, RgbaImage, imageops};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("the {backend} engine does not support {op}")]
    Unsupported { backend: BackendKind, op: &'static str },
}

/// Which engine renders transforms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Standard,
    Extended,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Standard => f.write_str("standard"),
            BackendKind::Extended => f.write_str("extended"),
        }
    }
}

/// Primitive pixel operations an engine may execute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawOp {
    Grayscale,
    Invert,
    Blur { sigma: f32 },
    Unsharpen { sigma: f32, threshold: i32 },
    Brighten(i32),
    Contrast(f32),
    HueRotate(i32),
    /// Sepia tone blended at `intensity` (0.0–1.0).
    Sepia { intensity: f32 },
    Posterize { levels: u8 },
    OilPaint { radius: u32, levels: u8 },
}

impl RawOp {
    pub fn name(&self) -> &'static str {
        match self {
            RawOp::Grayscale => "grayscale",
            RawOp::Invert => "invert",
            RawOp::Blur { .. } => "blur",
            RawOp::Unsharpen { .. } => "unsharpen",
            RawOp::Brighten(_) => "brighten",
            RawOp::Contrast(_) => "contrast",
            RawOp::HueRotate(_) => "hue-rotate",
            RawOp::Sepia { .. } => "sepia",
            RawOp::Posterize { .. } => "posterize",
            RawOp::OilPaint { .. } => "oil-paint",
        }
    }
}

/// Common surface of both engines.
pub trait ImageEngineHandle: Send {
    fn kind(&self) -> BackendKind;

    /// Current pixels, converted to a `DynamicImage` view.
    fn image(&self) -> DynamicImage;

    /// Replace the held pixels.
    fn set_image(&mut self, image: DynamicImage);

    /// Execute one raw operation in place.
    fn apply(&mut self, op: RawOp) -> Result<(), EngineError>;
}

/// Wrap an image in the engine selected by `kind`.
pub fn open(kind: BackendKind, image: DynamicImage) -> Box<dyn ImageEngineHandle> {
    match kind {
        BackendKind::Standard => Box::new(StandardEngine::new(image)),
        BackendKind::Extended => Box::new(ExtendedEngine::new(image)),
    }
}

// ============================================================================
// Standard engine
// ============================================================================

/// `image` crate built-ins over a `DynamicImage`.
pub struct StandardEngine {
    image: DynamicImage,
}

impl StandardEngine {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }
}

impl ImageEngineHandle for StandardEngine {
    fn kind(&self) -> BackendKind {
        BackendKind::Standard
    }

    fn image(&self) -> DynamicImage {
        self.image.clone()
    }

    fn set_image(&mut self, image: DynamicImage) {
        self.image = image;
    }

    fn apply(&mut self, op: RawOp) -> Result<(), EngineError> {
        let img = &mut self.image;
        match op {
            RawOp::Grayscale => *img = img.grayscale(),
            RawOp::Invert => img.invert(),
            RawOp::Blur { sigma } => *img = img.blur(sigma),
            RawOp::Unsharpen { sigma, threshold } => *img = img.unsharpen(sigma, threshold),
            RawOp::Brighten(value) => *img = img.brighten(value),
            RawOp::Contrast(value) => *img = img.adjust_contrast(value),
            RawOp::HueRotate(degrees) => *img = img.huerotate(degrees),
            RawOp::Sepia { .. } | RawOp::Posterize { .. } | RawOp::OilPaint { .. } => {
                return Err(EngineError::Unsupported {
                    backend: BackendKind::Standard,
                    op: op.name(),
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// Extended engine
// ============================================================================

/// RGBA8 buffer with hand-written kernels on top of `imageops`.
pub struct ExtendedEngine {
    buffer: RgbaImage,
}

impl ExtendedEngine {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            buffer: image.into_rgba8(),
        }
    }

    pub fn buffer(&self) -> &RgbaImage {
        &self.buffer
    }
}

impl ImageEngineHandle for ExtendedEngine {
    fn kind(&self) -> BackendKind {
        BackendKind::Extended
    }

    fn image(&self) -> DynamicImage {
        DynamicImage::ImageRgba8(self.buffer.clone())
    }

    fn set_image(&mut self, image: DynamicImage) {
        self.buffer = image.into_rgba8();
    }

    fn apply(&mut self, op: RawOp) -> Result<(), EngineError> {
        let buf = &mut self.buffer;
        match op {
            RawOp::Grayscale => map_pixels(buf, |[r, g, b, a]| {
                let l = luma(r, g, b);
                [l, l, l, a]
            }),
            RawOp::Invert => imageops::invert(buf),
            RawOp::Blur { sigma } => *buf = imageops::blur(&*buf, sigma),
            RawOp::Unsharpen { sigma, threshold } => {
                *buf = imageops::unsharpen(&*buf, sigma, threshold)
            }
            RawOp::Brighten(value) => *buf = imageops::colorops::brighten(&*buf, value),
            RawOp::Contrast(value) => *buf = imageops::colorops::contrast(&*buf, value),
            RawOp::HueRotate(degrees) => *buf = imageops::colorops::huerotate(&*buf, degrees),
            RawOp::Sepia { intensity } => sepia(buf, intensity.clamp(0.0, 1.0)),
            RawOp::Posterize { levels } => posterize(buf, levels.max(2)),
            RawOp::OilPaint { radius, levels } => *buf = oil_paint(&*buf, radius, levels.max(2)),
        }
        Ok(())
    }
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).round() as u8
}

fn map_pixels(buf: &mut RgbaImage, f: impl Fn([u8; 4]) -> [u8; 4]) {
    for pixel in buf.pixels_mut() {
        *pixel = Rgba(f(pixel.0));
    }
}

fn sepia(buf: &mut RgbaImage, intensity: f32) {
    map_pixels(buf, |[r, g, b, a]| {
        let (rf, gf, bf) = (r as f32, g as f32, b as f32);
        let tone = [
            0.393 * rf + 0.769 * gf + 0.189 * bf,
            0.349 * rf + 0.686 * gf + 0.168 * bf,
            0.272 * rf + 0.534 * gf + 0.131 * bf,
        ];
        let blend = |orig: f32, toned: f32| {
            (orig + (toned.min(255.0) - orig) * intensity).round() as u8
        };
        [blend(rf, tone[0]), blend(gf, tone[1]), blend(bf, tone[2]), a]
    });
}

fn posterize(buf: &mut RgbaImage, levels: u8) {
    let step = 255.0 / (levels - 1) as f32;
    let quantize = |c: u8| ((c as f32 / step).round() * step).round() as u8;
    map_pixels(buf, |[r, g, b, a]| [quantize(r), quantize(g), quantize(b), a]);
}

/// Oil-paint filter: every pixel takes the mean color of the most common
/// intensity bucket in its `radius` neighbourhood.
fn oil_paint(src: &RgbaImage, radius: u32, levels: u8) -> RgbaImage {
    let (width, height) = src.dimensions();
    let levels = levels as usize;
    let radius = radius as i64;
    let mut out = RgbaImage::new(width, height);
    let mut counts = vec![0u32; levels];
    let mut sums = vec![[0u32; 3]; levels];

    for y in 0..height as i64 {
        for x in 0..width as i64 {
            counts.iter_mut().for_each(|c| *c = 0);
            sums.iter_mut().for_each(|s| *s = [0; 3]);

            for ny in (y - radius).max(0)..=(y + radius).min(height as i64 - 1) {
                for nx in (x - radius).max(0)..=(x + radius).min(width as i64 - 1) {
                    let [r, g, b, _] = src.get_pixel(nx as u32, ny as u32).0;
                    let bucket = luma(r, g, b) as usize * (levels - 1) / 255;
                    counts[bucket] += 1;
                    sums[bucket][0] += r as u32;
                    sums[bucket][1] += g as u32;
                    sums[bucket][2] += b as u32;
                }
            }

            let (best, &n) = counts
                .iter()
                .enumerate()
                .max_by_key(|&(_, c)| *c)
                .unwrap_or((0, &1));
            let n = n.max(1);
            let alpha = src.get_pixel(x as u32, y as u32).0[3];
            out.put_pixel(
                x as u32,
                y as u32,
                Rgba([
                    (sums[best][0] / n) as u8,
                    (sums[best][1] / n) as u8,
                    (sums[best][2] / n) as u8,
                    alpha,
                ]),
            );
        }
    }
    out
}
